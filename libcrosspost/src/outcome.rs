//! Success/message/payload envelope returned by public operations
//!
//! Internal code works with `Result`; the service layer converts to
//! `Outcome` at its boundary so callers always get a verdict and a
//! human-readable message, never an error value.

use serde::{Deserialize, Serialize};

use crate::error::{CrosspostError, PlatformError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub success: bool,
    pub message: String,
    pub payload: Option<T>,
    /// Process exit code for a failure; absent means the generic code 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

impl<T> Outcome<T> {
    pub fn ok(message: impl Into<String>, payload: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload: Some(payload),
            code: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            payload: None,
            code: None,
        }
    }

    /// Failure that still carries a payload (e.g. a sentinel value)
    pub fn fail_with(message: impl Into<String>, payload: T) -> Self {
        Self {
            success: false,
            message: message.into(),
            payload: Some(payload),
            code: None,
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// 0 on success, otherwise the recorded failure code (default 1)
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            self.code.unwrap_or(1)
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            success: self.success,
            message: self.message,
            payload: self.payload.map(f),
            code: self.code,
        }
    }
}

impl<T> From<PlatformError> for Outcome<T> {
    fn from(e: PlatformError) -> Self {
        CrosspostError::Platform(e).into()
    }
}

impl<T> From<CrosspostError> for Outcome<T> {
    fn from(e: CrosspostError) -> Self {
        Outcome::fail(e.user_message()).with_code(e.exit_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_carries_payload() {
        let outcome = Outcome::ok("done", 5);
        assert!(outcome.is_success());
        assert_eq!(outcome.message, "done");
        assert_eq!(outcome.payload, Some(5));
    }

    #[test]
    fn test_fail_has_no_payload() {
        let outcome: Outcome<i32> = Outcome::fail("nope");
        assert!(!outcome.is_success());
        assert_eq!(outcome.payload, None);
    }

    #[test]
    fn test_fail_with_keeps_sentinel() {
        let outcome = Outcome::fail_with("stats unavailable", -1);
        assert!(!outcome.success);
        assert_eq!(outcome.payload, Some(-1));
    }

    #[test]
    fn test_from_platform_error_uses_verbatim_message() {
        let outcome: Outcome<bool> = PlatformError::NoFilesToUpload.into();
        assert!(!outcome.success);
        assert_eq!(outcome.message, "No files to upload.");
    }

    #[test]
    fn test_from_crosspost_error_platform_is_unprefixed() {
        let outcome: Outcome<bool> =
            CrosspostError::Platform(PlatformError::ChatNotFound("1".to_string())).into();
        assert_eq!(outcome.message, "Chat not found: 1");
    }

    #[test]
    fn test_exit_code_follows_error_kind() {
        let ok = Outcome::ok("fine", true);
        assert_eq!(ok.exit_code(), 0);

        let generic: Outcome<bool> = Outcome::fail("nope");
        assert_eq!(generic.exit_code(), 1);

        let auth: Outcome<bool> =
            PlatformError::Authentication("token expired".to_string()).into();
        assert_eq!(auth.exit_code(), 2);

        let invalid: Outcome<bool> = CrosspostError::InvalidInput("empty".to_string()).into();
        assert_eq!(invalid.exit_code(), 3);
    }

    #[test]
    fn test_code_omitted_from_json_when_absent() {
        let json = serde_json::to_value(Outcome::ok("fine", 1)).unwrap();
        assert!(json.get("code").is_none());

        let json = serde_json::to_value(Outcome::<i32>::fail("no").with_code(2)).unwrap();
        assert_eq!(json["code"], 2);
    }

    #[test]
    fn test_map_preserves_verdict() {
        let outcome = Outcome::ok("fine", 2).map(|n| n * 10);
        assert_eq!(outcome.payload, Some(20));
        assert!(outcome.success);
    }
}
