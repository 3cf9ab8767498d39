//! Response interpretation and error classification.
//!
//! # Design
//! Interpretation is a short-circuit chain evaluated in a fixed order:
//!
//! 1. transport error -> `ConnectionFailed`
//! 2. status 401/403/405/406 -> the matching fixed error, whatever the body
//! 3. body failure (`success: "false"` or a leading `errors` list) ->
//!    `RequestFailed`
//! 4. evidence extraction
//! 5. fallback when the evidence key is missing or the status is 404
//!
//! Save responses get one more check on top. The API signals failures through
//! the status code on some paths and through the body on others, so a 200 with
//! `success: "false"` still fails at step 3.
//!
//! `Interpreter` holds only the evidence name. Every method is a pure function
//! of its inputs, so interpreting the same response twice gives equal results.

use serde_json::{Map, Value};
use tracing::warn;

use crate::envelope::{self, as_counter, is_true, scalar_string, Envelope, Response};
use crate::error::FlexibeeError;
use crate::http::RawResponse;
use crate::result::{EvidenceResult, Lookup, Page, SaveResponse};

/// How a single-record lookup treats a missing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Missing record is `Lookup::NotFound`.
    Strict,
    /// Missing record falls back to the whole envelope, or an empty record.
    Lenient,
}

/// What the extraction stage found under the evidence key.
enum Extracted {
    Records(Vec<EvidenceResult>),
    Missing(Envelope),
}

#[derive(Debug, Clone)]
pub struct Interpreter {
    evidence: String,
}

impl Interpreter {
    pub fn new(evidence: &str) -> Self {
        Self {
            evidence: evidence.to_string(),
        }
    }

    pub fn evidence(&self) -> &str {
        &self.evidence
    }

    /// Stages 1 to 3: parse and reject every failure the response signals.
    pub fn check(&self, raw: &RawResponse) -> Result<Response, FlexibeeError> {
        let response = envelope::parse(raw).inspect_err(|err| {
            warn!(error = %err, "request did not reach the server");
        })?;
        check_status(response.status)?;
        check_for_data_errors(&response)?;
        Ok(response)
    }

    /// Every record of the evidence. Nothing found is an empty list.
    pub fn results(&self, raw: &RawResponse) -> Result<Vec<EvidenceResult>, FlexibeeError> {
        let response = self.check(raw)?;
        Ok(self.results_from(response))
    }

    pub fn page(&self, raw: &RawResponse) -> Result<Page, FlexibeeError> {
        let response = self.check(raw)?;
        let row_count = response.row_count();
        Ok(Page {
            row_count,
            results: self.results_from(response),
        })
    }

    /// A single record. Strict lookups report a missing record as
    /// `Lookup::NotFound`; lenient ones never do.
    pub fn lookup(&self, raw: &RawResponse, strictness: Strictness) -> Result<Lookup, FlexibeeError> {
        let response = self.check(raw)?;
        match self.extract(response) {
            Extracted::Records(records) => match records.into_iter().next() {
                Some(record) => Ok(Lookup::Found(record)),
                None if strictness == Strictness::Strict => Ok(Lookup::NotFound),
                None => Ok(Lookup::Found(EvidenceResult::empty())),
            },
            Extracted::Missing(_) if strictness == Strictness::Strict => Ok(Lookup::NotFound),
            Extracted::Missing(envelope) => Ok(Lookup::Found(EvidenceResult::new(envelope.into_record()))),
        }
    }

    /// Interpret the response to a save call, rejecting zero-row saves and
    /// explicit failure flags.
    pub fn save_outcome(&self, raw: &RawResponse) -> Result<SaveResponse, FlexibeeError> {
        let response = self.check(raw)?;
        let status = response.status;
        let result = self.results_from(response).into_iter().next().unwrap_or_default();
        check_save(&result, status)?;

        let created = counter(&result, "created").unwrap_or(0);
        let updated = counter(&result, "updated").unwrap_or(0);
        Ok(SaveResponse {
            success: true,
            affected: created + updated,
            result,
        })
    }

    fn results_from(&self, response: Response) -> Vec<EvidenceResult> {
        match self.extract(response) {
            Extracted::Records(records) => records,
            Extracted::Missing(Envelope::Empty) => Vec::new(),
            Extracted::Missing(envelope) => vec![EvidenceResult::new(envelope.into_record())],
        }
    }

    fn extract(&self, response: Response) -> Extracted {
        if response.status == 404 {
            return Extracted::Missing(response.envelope);
        }
        let mut map = match response.envelope {
            Envelope::Record(map) => map,
            other => return Extracted::Missing(other),
        };
        match map.remove(&self.evidence) {
            Some(Value::Array(items)) => Extracted::Records(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(record) => Some(EvidenceResult::new(record)),
                        _ => None,
                    })
                    .collect(),
            ),
            Some(Value::Object(record)) => Extracted::Records(vec![EvidenceResult::new(record)]),
            Some(other) => {
                map.insert(self.evidence.clone(), other);
                Extracted::Missing(Envelope::Record(map))
            }
            None => Extracted::Missing(Envelope::Record(map)),
        }
    }
}

/// Stage 2: status codes that decide the outcome on their own.
pub fn check_status(status: u16) -> Result<(), FlexibeeError> {
    match FlexibeeError::from_status(status) {
        Some(err) => {
            warn!(status, error = %err, "request rejected");
            Err(err)
        }
        None => Ok(()),
    }
}

/// Stage 3: failures reported inside the body.
pub fn check_for_data_errors(response: &Response) -> Result<(), FlexibeeError> {
    let errors = response.envelope.first_errors();
    let failed = response
        .envelope
        .get("success")
        .is_some_and(|success| success.as_str() == Some("false"));
    if errors.is_none() && !failed {
        return Ok(());
    }

    let message = match (response.message(), errors) {
        (Some(message), _) => message,
        (None, Some(errors)) => errors
            .iter()
            .map(|error| error.get("message").map(scalar_string).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\n"),
        (None, None) => String::new(),
    };
    warn!(status = response.status, %message, "request failed");
    Err(FlexibeeError::RequestFailed {
        message,
        status: response.status,
    })
}

fn check_save(result: &EvidenceResult, status: u16) -> Result<(), FlexibeeError> {
    if counter(result, "created") == Some(0) && counter(result, "updated") == Some(0) {
        let code = result
            .get("status_code")
            .map(scalar_string)
            .unwrap_or_else(|| status.to_string());
        let message = result.get("message").map(scalar_string).unwrap_or_default();
        return Err(FlexibeeError::SaveFailed(format!("({code}) {message}")));
    }

    if let (Some(success), Some(message)) = (result.get("success"), result.get("message")) {
        if !is_true(success) {
            return Err(FlexibeeError::SaveFailed(scalar_string(message)));
        }
    }
    Ok(())
}

/// A save counter, read from the record itself or its `stats` mapping.
fn counter(result: &EvidenceResult, name: &str) -> Option<u64> {
    result.get(name).and_then(as_counter).or_else(|| {
        result
            .get("stats")
            .and_then(Value::as_object)
            .and_then(|stats: &Map<String, Value>| stats.get(name))
            .and_then(as_counter)
    })
}
