//! Error types for Crosspost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosspostError>;

#[derive(Error, Debug)]
pub enum CrosspostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CrosspostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosspostError::InvalidInput(_) => 3,
            CrosspostError::Platform(e) if e.is_authentication() => 2,
            CrosspostError::Platform(_) => 1,
            CrosspostError::Config(_) => 1,
            CrosspostError::Database(_) => 1,
            CrosspostError::Credential(_) => 1,
        }
    }

    /// Message shown to end users.
    ///
    /// Platform errors are surfaced verbatim, without the category prefix,
    /// because provider messages are the top-level failure reason.
    pub fn user_message(&self) -> String {
        match self {
            CrosspostError::Platform(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("No credentials found")]
    NoCredentials,

    #[error("Unknown credential kind: {0}")]
    UnknownKind(String),

    #[error("Credential not found: {0}")]
    NotFound(String),
}

/// Failures raised by provider clients.
///
/// Display strings are what the orchestrator hands back to its caller, so
/// they read as complete sentences.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("{context} failed with status {status}: {body}")]
    RemoteApi {
        context: String,
        status: u16,
        body: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    #[error("No files to upload.")]
    NoFilesToUpload,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl PlatformError {
    /// Whether this error means the credentials or session are unusable
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            PlatformError::Authentication(_) | PlatformError::AuthenticationRequired(_)
        )
    }

    /// Build a `RemoteApi` error for a failed stage
    pub fn remote(context: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        PlatformError::RemoteApi {
            context: context.into(),
            status,
            body: body.into(),
        }
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PlatformError::Timeout(e.to_string())
        } else {
            PlatformError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = CrosspostError::InvalidInput("Empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_errors() {
        let error = CrosspostError::Platform(PlatformError::Authentication("bad hash".to_string()));
        assert_eq!(error.exit_code(), 2);

        let error = CrosspostError::Platform(PlatformError::AuthenticationRequired(
            "no session".to_string(),
        ));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_platform_errors() {
        let errors = vec![
            PlatformError::Validation("x".to_string()),
            PlatformError::UploadFailed("x".to_string()),
            PlatformError::remote("Publish", 500, "oops"),
            PlatformError::NotFound("x".to_string()),
            PlatformError::ChatNotFound("x".to_string()),
            PlatformError::NoFilesToUpload,
            PlatformError::Network("x".to_string()),
            PlatformError::Timeout("x".to_string()),
            PlatformError::Cancelled,
        ];

        for e in errors {
            assert_eq!(CrosspostError::Platform(e).exit_code(), 1);
        }
    }

    #[test]
    fn test_exit_code_config_and_database() {
        let error = CrosspostError::Config(ConfigError::MissingField("database.path".to_string()));
        assert_eq!(error.exit_code(), 1);

        let db_error = DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        ));
        assert_eq!(CrosspostError::Database(db_error).exit_code(), 1);
    }

    #[test]
    fn test_no_files_message_is_exact() {
        assert_eq!(PlatformError::NoFilesToUpload.to_string(), "No files to upload.");
    }

    #[test]
    fn test_remote_api_formatting() {
        let error = PlatformError::remote("Carousel creation", 400, r#"{"error":"bad"}"#);
        let message = error.to_string();
        assert!(message.contains("Carousel creation"));
        assert!(message.contains("400"));
        assert!(message.contains(r#"{"error":"bad"}"#));
    }

    #[test]
    fn test_user_message_strips_category_for_platform_errors() {
        let error = CrosspostError::Platform(PlatformError::NoFilesToUpload);
        assert_eq!(error.user_message(), "No files to upload.");
        assert_eq!(error.to_string(), "Platform error: No files to upload.");

        let error = CrosspostError::InvalidInput("Empty".to_string());
        assert_eq!(error.user_message(), "Invalid input: Empty");
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let plat: CrosspostError = PlatformError::Cancelled.into();
        match plat {
            CrosspostError::Platform(PlatformError::Cancelled) => {}
            _ => panic!("Expected CrosspostError::Platform"),
        }
    }

    #[test]
    fn test_error_conversion_from_credential_error() {
        let err: CrosspostError = CredentialError::NoCredentials.into();
        assert_eq!(err.to_string(), "Credential error: No credentials found");
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Network("Connection failed".to_string());
        let cloned = original.clone();

        assert_eq!(format!("{}", original), format!("{}", cloned));
    }
}
