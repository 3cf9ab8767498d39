//! Response envelope parsing.
//!
//! # Design
//! The remote API wraps every document in a `winstrom` object and changes the
//! shape of what is inside depending on how many records matched. The parser
//! strips the wrapper once and classifies what is left into an `Envelope`
//! variant, so the interpreter matches on a tag instead of probing keys.
//!
//! A body that does not decode is an `Empty` envelope, never an error. Whether
//! emptiness matters is the interpreter's call.

use serde_json::{Map, Value};

use crate::error::FlexibeeError;
use crate::http::{HttpMethod, RawResponse};

/// Outer key of every document the API returns.
pub const WRAPPER_KEY: &str = "winstrom";

/// The decoded body, one wrapper level removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Envelope {
    #[default]
    Empty,
    Record(Map<String, Value>),
    List(Vec<Map<String, Value>>),
    Scalar(Value),
}

impl Envelope {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Envelope::Empty,
            Value::Object(map) if map.is_empty() => Envelope::Empty,
            Value::Object(map) => Envelope::Record(map),
            Value::Array(items) if items.is_empty() => Envelope::Empty,
            Value::Array(items) => {
                if items.iter().all(Value::is_object) {
                    Envelope::List(
                        items
                            .into_iter()
                            .filter_map(|item| match item {
                                Value::Object(map) => Some(map),
                                _ => None,
                            })
                            .collect(),
                    )
                } else {
                    Envelope::Scalar(Value::Array(items))
                }
            }
            other => Envelope::Scalar(other),
        }
    }

    /// Decode a raw body. Undecodable input yields `Empty`.
    pub fn decode(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(mut map)) if map.contains_key(WRAPPER_KEY) => {
                Envelope::from_value(map.remove(WRAPPER_KEY).unwrap_or(Value::Null))
            }
            Ok(value) => Envelope::from_value(value),
            Err(_) => Envelope::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Envelope::Empty)
    }

    /// Top-level field of a `Record` envelope.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Envelope::Record(map) => map.get(key),
            _ => None,
        }
    }

    /// The `errors` array of the first element of the indexed-list part of
    /// the envelope, if it carries one.
    pub fn first_errors(&self) -> Option<&Vec<Value>> {
        let first = match self {
            Envelope::List(items) => items.first(),
            Envelope::Record(map) => map
                .get("results")
                .and_then(Value::as_array)
                .and_then(|items| items.first())
                .and_then(Value::as_object),
            _ => None,
        }?;
        first.get("errors").and_then(Value::as_array)
    }

    /// Flatten into one mapping. Lists are keyed by position.
    pub fn into_record(self) -> Map<String, Value> {
        match self {
            Envelope::Empty => Map::new(),
            Envelope::Record(map) => map,
            Envelope::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| (index.to_string(), Value::Object(item)))
                .collect(),
            Envelope::Scalar(value) => {
                let mut map = Map::new();
                map.insert("value".to_string(), value);
                map
            }
        }
    }
}

/// A parsed API response: status code plus envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub envelope: Envelope,
}

impl Response {
    pub fn version(&self) -> Option<String> {
        self.envelope.get("@version").map(scalar_string)
    }

    /// `success` is absent or `"true"`.
    pub fn success(&self) -> bool {
        self.envelope.get("success").map_or(true, is_true)
    }

    /// A `null` message counts as absent.
    pub fn message(&self) -> Option<String> {
        self.envelope
            .get("message")
            .filter(|message| !message.is_null())
            .map(scalar_string)
    }

    pub fn row_count(&self) -> Option<u64> {
        self.envelope.get("@rowCount").and_then(as_counter)
    }

    pub fn statistics(&self) -> Map<String, Value> {
        self.envelope
            .get("stats")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }
}

/// What a request produced once transport failures are ruled out.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Pdf(Vec<u8>),
    Backup(Vec<u8>),
    Api(Response),
}

/// Parse an API response. A transport error short-circuits into
/// `ConnectionFailed`.
pub fn parse(raw: &RawResponse) -> Result<Response, FlexibeeError> {
    if let Some(error) = &raw.transport_error {
        return Err(FlexibeeError::ConnectionFailed(error.clone()));
    }
    let envelope = raw.body.as_deref().map(Envelope::decode).unwrap_or_default();
    Ok(Response {
        status: raw.status,
        envelope,
    })
}

/// Like `parse`, but binary endpoints are recognised from the target and
/// returned untouched.
pub fn parse_payload(
    method: HttpMethod,
    target: &str,
    raw: &RawResponse,
) -> Result<Payload, FlexibeeError> {
    if let Some(error) = &raw.transport_error {
        return Err(FlexibeeError::ConnectionFailed(error.clone()));
    }
    let body = || raw.body.clone().unwrap_or_default();
    if is_pdf_target(target) {
        return Ok(Payload::Pdf(body()));
    }
    if method == HttpMethod::Get && is_backup_target(target) {
        return Ok(Payload::Backup(body()));
    }
    parse(raw).map(Payload::Api)
}

pub fn is_pdf_target(target: &str) -> bool {
    target.contains(".pdf")
}

pub fn is_backup_target(target: &str) -> bool {
    target.to_lowercase().contains("/backup")
}

/// Render a scalar the way the API spells it: strings without quotes.
pub(crate) fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub(crate) fn is_true(value: &Value) -> bool {
    match value {
        Value::String(s) => s == "true",
        Value::Bool(b) => *b,
        _ => false,
    }
}

/// Counters arrive as numbers or numeric strings.
pub(crate) fn as_counter(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn wrapper_is_stripped_once() {
        let envelope = Envelope::decode(br#"{"winstrom":{"winstrom":{"a":1}}}"#);
        assert_eq!(envelope.get("winstrom"), Some(&json!({"a": 1})));
    }

    #[test]
    fn unwrapped_documents_are_taken_as_is() {
        let envelope = Envelope::decode(br#"{"adresar":[{"id":"1"}]}"#);
        assert!(envelope.get("adresar").is_some());
    }

    #[test]
    fn garbage_decodes_to_empty() {
        assert!(Envelope::decode(b"<html>502 Bad Gateway</html>").is_empty());
        assert!(Envelope::decode(b"").is_empty());
        assert!(Envelope::decode(b"null").is_empty());
        assert!(Envelope::decode(br#"{"winstrom":{}}"#).is_empty());
    }

    #[test]
    fn arrays_of_objects_are_lists() {
        let envelope = Envelope::decode(br#"[{"errors":[]},{"id":2}]"#);
        assert!(matches!(envelope, Envelope::List(ref items) if items.len() == 2));
    }

    #[test]
    fn mixed_arrays_and_primitives_are_scalars() {
        assert!(matches!(Envelope::decode(b"[1,{}]"), Envelope::Scalar(_)));
        assert!(matches!(Envelope::decode(b"\"ok\""), Envelope::Scalar(_)));
    }

    #[test]
    fn first_errors_from_list_and_results() {
        let list = Envelope::decode(br#"[{"errors":[{"message":"a"}]}]"#);
        assert_eq!(list.first_errors().map(Vec::len), Some(1));

        let record = Envelope::decode(
            br#"{"winstrom":{"success":"false","results":[{"errors":[{"message":"a"},{"message":"b"}]}]}}"#,
        );
        assert_eq!(record.first_errors().map(Vec::len), Some(2));

        assert!(Envelope::decode(br#"{"results":[{"id":"1"}]}"#).first_errors().is_none());
    }

    #[test]
    fn response_accessors() {
        let raw = RawResponse::new(
            200,
            r#"{"winstrom":{"@version":"1.0","@rowCount":"12","success":"true","message":"ok","stats":{"created":"1"}}}"#,
        );
        let response = parse(&raw).unwrap();
        assert_eq!(response.version().as_deref(), Some("1.0"));
        assert_eq!(response.row_count(), Some(12));
        assert!(response.success());
        assert_eq!(response.message().as_deref(), Some("ok"));
        assert_eq!(response.statistics().get("created"), Some(&json!("1")));
    }

    #[test]
    fn null_message_is_absent() {
        let response = parse(&RawResponse::new(200, r#"{"winstrom":{"message":null}}"#)).unwrap();
        assert_eq!(response.message(), None);
    }

    #[test]
    fn transport_error_short_circuits() {
        let raw = RawResponse {
            status: 200,
            body: Some(br#"{"winstrom":{}}"#.to_vec()),
            transport_error: Some("timeout".to_string()),
        };
        assert_eq!(
            parse(&raw).unwrap_err(),
            FlexibeeError::ConnectionFailed("timeout".to_string())
        );
    }

    #[test]
    fn missing_body_without_error_is_empty() {
        let raw = RawResponse {
            status: 204,
            body: None,
            transport_error: None,
        };
        assert!(parse(&raw).unwrap().envelope.is_empty());
    }

    #[test]
    fn binary_targets_are_detected() {
        let raw = RawResponse::new(200, b"%PDF-1.4".to_vec());
        assert_eq!(
            parse_payload(HttpMethod::Get, "https://x/c/d/faktura-vydana/1.pdf", &raw).unwrap(),
            Payload::Pdf(b"%PDF-1.4".to_vec())
        );
        assert!(matches!(
            parse_payload(HttpMethod::Get, "https://x/c/d/BACKUP", &raw).unwrap(),
            Payload::Backup(_)
        ));
        assert!(matches!(
            parse_payload(HttpMethod::Put, "https://x/c/d/backup", &raw).unwrap(),
            Payload::Api(_)
        ));
    }

    #[test]
    fn lists_flatten_by_position() {
        let record = Envelope::decode(br#"[{"id":1},{"id":2}]"#).into_record();
        assert_eq!(record.get("1"), Some(&json!({"id": 2})));
    }
}
