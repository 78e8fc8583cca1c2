//! JSON boundary for hosts
//!
//! Every engine output serializes directly; errors become a single
//! `{ kind, status, message }` object.

use crate::error::{Error, ErrorKind, Result};
use serde::Serialize;

/// Serialize an engine result to compact JSON.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Serialize an engine result to indented JSON.
pub fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Serialize compactly, or indented when `pretty` is set.
pub fn encode<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        to_json_pretty(value)
    } else {
        to_json(value)
    }
}

/// Error body returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub kind: &'static str,
    pub status: u16,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: kind.code(),
            status: kind.status(),
            message: message.into(),
        }
    }
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        ErrorResponse::new(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RankedPage, TopReaction};

    #[test]
    fn test_page_serializes_with_snake_case_fields() {
        let page = RankedPage {
            items: vec![TopReaction {
                emoji_name: "tada".to_string(),
                count: 3,
            }],
            has_next: true,
        };

        let json = to_json(&page).unwrap();
        assert_eq!(
            json,
            r#"{"items":[{"emoji_name":"tada","count":3}],"has_next":true}"#
        );
    }

    #[test]
    fn test_error_response() {
        let err = Error::InvalidRange("\"yesterday\"".to_string());
        let body = ErrorResponse::from(&err);

        assert_eq!(body.kind, "invalid_range");
        assert_eq!(body.status, 400);
        assert!(body.message.contains("yesterday"));

        let json = to_json(&body).unwrap();
        assert!(json.starts_with(r#"{"kind":"invalid_range","status":400"#));
    }
}
