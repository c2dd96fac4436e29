//! Final rendering of an analyzer run: one JSON document on stdout and the
//! process exit status.

use serde_json::{json, Value};

use crate::errors::AnalyzerResult;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;

/// What the process prints and how it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub body: String,
    pub exit_code: i32,
}

/// `{"errorMessage": <message>}`
pub fn error_document(message: &str) -> Value {
    json!({ "errorMessage": message })
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    rendered.unwrap_or_else(|e| error_document(&e.to_string()).to_string())
}

impl Outcome {
    pub fn from_result(result: AnalyzerResult<Value>, pretty: bool) -> Self {
        match result {
            Ok(report) => Self {
                body: render(&report, pretty),
                exit_code: SUCCESS,
            },
            Err(e) => {
                log::error!("Analyzer failed: {}", e);
                Self {
                    body: render(&error_document(&e.to_string()), pretty),
                    exit_code: FAILURE,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AnalyzerError;

    #[test]
    fn test_missing_field_document() {
        let outcome = Outcome::from_result(Err(AnalyzerError::missing("Missing data field")), false);
        assert_eq!(outcome.body, r#"{"errorMessage":"Missing data field"}"#);
        assert_eq!(outcome.exit_code, FAILURE);
    }

    #[test]
    fn test_tlp_document() {
        let outcome = Outcome::from_result(Err(AnalyzerError::TlpPolicy { tlp: 3, max_tlp: 2 }), false);
        assert_eq!(
            outcome.body,
            r#"{"errorMessage":"Error with TLP value ; see max_tlp in config or tlp value in input data"}"#
        );
        assert_eq!(outcome.exit_code, 1);
    }

    #[test]
    fn test_success_keys_are_sorted() {
        let outcome = Outcome::from_result(Ok(json!({ "b": 1, "a": { "z": true, "y": null } })), false);
        assert_eq!(outcome.body, r#"{"a":{"y":null,"z":true},"b":1}"#);
        assert_eq!(outcome.exit_code, SUCCESS);
    }

    #[test]
    fn test_pretty_output() {
        let outcome = Outcome::from_result(Ok(json!({ "a": 1 })), true);
        assert_eq!(outcome.body, "{\n  \"a\": 1\n}");
    }
}
