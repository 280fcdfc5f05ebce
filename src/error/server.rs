use std::fmt;

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// Structured error information extracted from a server reply whose `ok`
/// flag is not set.
///
/// This is serializable to JSON so it can be logged or shown verbatim.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(rename = "codeName", skip_serializing_if = "Option::is_none")]
    pub(crate) code_name: Option<String>,
    pub(crate) message: String,
}

impl ServerError {
    /// Build a server error from a reply document.
    ///
    /// Reads `errmsg`, `code` and `codeName`; when the server omits
    /// `codeName` a name is derived from well-known codes.
    pub fn from_reply(reply: &Document) -> Self {
        let code = reply.get("code").and_then(numeric_i32);
        let code_name = match reply.get_str("codeName") {
            Ok(name) => Some(name.to_string()),
            Err(_) => code.and_then(error_name).map(str::to_string),
        };
        let message = reply
            .get_str("errmsg")
            .map(str::to_string)
            .unwrap_or_else(|_| "command failed without an error message".to_string());

        Self {
            code,
            code_name,
            message,
        }
    }

    /// Numeric server error code, when reported.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Symbolic server error name, when known.
    pub fn code_name(&self) -> Option<&str> {
        self.code_name.as_deref()
    }

    /// Server-provided error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Convert error info to pretty-printed JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Convert error info to compact JSON string (single line).
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, &self.code_name) {
            (Some(code), Some(name)) => {
                write!(f, "Command failed ({name}, code {code}): {}", self.message)
            }
            (Some(code), None) => write!(f, "Command failed (code {code}): {}", self.message),
            _ => write!(f, "Command failed: {}", self.message),
        }
    }
}

impl std::error::Error for ServerError {}

/// Whether a reply carries a truthy `ok` flag.
///
/// Servers report `ok` as a double, but integers and booleans are accepted.
pub fn is_ok(reply: &Document) -> bool {
    match reply.get("ok") {
        Some(Bson::Double(v)) => *v == 1.0,
        Some(Bson::Int32(v)) => *v == 1,
        Some(Bson::Int64(v)) => *v == 1,
        Some(Bson::Boolean(v)) => *v,
        _ => false,
    }
}

/// Fail with a [`ServerError`] unless the reply is ok.
pub fn check_reply(reply: &Document) -> std::result::Result<(), ServerError> {
    if is_ok(reply) {
        Ok(())
    } else {
        Err(ServerError::from_reply(reply))
    }
}

fn numeric_i32(value: &Bson) -> Option<i32> {
    match value {
        Bson::Int32(v) => Some(*v),
        Bson::Int64(v) => i32::try_from(*v).ok(),
        Bson::Double(v) => Some(*v as i32),
        _ => None,
    }
}

/// Get a human-readable error name from a server error code.
fn error_name(code: i32) -> Option<&'static str> {
    let name = match code {
        11000 | 11001 => "DuplicateKey",
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        43 => "CursorNotFound",
        50 => "MaxTimeMSExpired",
        96 => "OperationFailed",
        237 => "CursorKilled",
        _ => return None,
    };

    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_is_ok_variants() {
        assert!(is_ok(&doc! { "ok": 1.0 }));
        assert!(is_ok(&doc! { "ok": 1 }));
        assert!(is_ok(&doc! { "ok": true }));
        assert!(!is_ok(&doc! { "ok": 0.0 }));
        assert!(!is_ok(&doc! {}));
    }

    #[test]
    fn test_from_reply_with_code_name() {
        let reply = doc! {
            "ok": 0.0,
            "errmsg": "cursor id 42 not found",
            "code": 43,
            "codeName": "CursorNotFound",
        };
        let err = check_reply(&reply).unwrap_err();
        assert_eq!(err.code(), Some(43));
        assert_eq!(err.code_name(), Some("CursorNotFound"));
        assert_eq!(
            err.to_string(),
            "Command failed (CursorNotFound, code 43): cursor id 42 not found"
        );
    }

    #[test]
    fn test_code_name_fallback() {
        let reply = doc! { "ok": 0, "errmsg": "too slow", "code": 50 };
        let err = ServerError::from_reply(&reply);
        assert_eq!(err.code_name(), Some("MaxTimeMSExpired"));
    }

    #[test]
    fn test_missing_errmsg() {
        let err = ServerError::from_reply(&doc! { "ok": 0 });
        assert_eq!(err.code(), None);
        assert_eq!(err.to_string(), "Command failed: command failed without an error message");
    }

    #[test]
    fn test_to_json_compact() {
        let err = ServerError::from_reply(&doc! { "ok": 0, "errmsg": "nope", "code": 13 });
        let json = err.to_json_compact().unwrap();
        assert_eq!(json, r#"{"code":13,"codeName":"Unauthorized","message":"nope"}"#);
    }
}
