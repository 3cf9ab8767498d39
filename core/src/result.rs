//! Typed views over interpreted responses.
//!
//! `EvidenceResult` wraps one record exactly as the server sent it. Field
//! lookups never coerce: a field the server sent as `"1"` is a string.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::FlexibeeError;

/// One record of an evidence, read-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EvidenceResult {
    data: Map<String, Value>,
}

impl EvidenceResult {
    pub fn new(data: Map<String, Value>) -> Self {
        Self { data }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_data(self) -> Map<String, Value> {
        self.data
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.data.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Map<String, Value>> for EvidenceResult {
    fn from(data: Map<String, Value>) -> Self {
        Self::new(data)
    }
}

/// Outcome of a single-record lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(EvidenceResult),
    NotFound,
}

impl Lookup {
    /// `NotFound` becomes `NoEvidenceResult`.
    pub fn into_result(self) -> Result<EvidenceResult, FlexibeeError> {
        match self {
            Lookup::Found(result) => Ok(result),
            Lookup::NotFound => Err(FlexibeeError::NoEvidenceResult),
        }
    }

    /// `NotFound` becomes an empty record.
    pub fn or_empty(self) -> EvidenceResult {
        match self {
            Lookup::Found(result) => result,
            Lookup::NotFound => EvidenceResult::empty(),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// One page of records plus the total the server reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub row_count: Option<u64>,
    pub results: Vec<EvidenceResult>,
}

/// Outcome of a save call that passed every failure check.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveResponse {
    pub success: bool,
    /// Created plus updated rows.
    pub affected: u64,
    pub result: EvidenceResult,
}

impl SaveResponse {
    /// Ids of the records the server reports under `results`.
    pub fn ids(&self) -> Vec<i64> {
        self.result
            .get("results")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item.get("id")? {
                        Value::Number(n) => n.as_i64(),
                        Value::String(s) => s.parse().ok(),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
