use thiserror::Error;

/// Top-level error type for the pagechat service.
///
/// Subsystem crates define their own error enums and convert into this type
/// (or wrap it) so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PageChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for PageChatError {
    fn from(err: toml::de::Error) -> Self {
        PageChatError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PageChatError {
    fn from(err: serde_json::Error) -> Self {
        PageChatError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for pagechat operations.
pub type Result<T> = std::result::Result<T, PageChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PageChatError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = PageChatError::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "Storage error: disk full");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PageChatError = io_err.into();
        assert!(matches!(err, PageChatError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: PageChatError = err.unwrap_err().into();
        assert!(matches!(err, PageChatError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: PageChatError = err.unwrap_err().into();
        assert!(matches!(err, PageChatError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
