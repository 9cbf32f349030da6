use thiserror::Error;

/// Top-level error type for the unibot system.
///
/// Subsystem crates either reuse these variants directly or define their own
/// error enums with a `From<UnibotError>` conversion so that `?` works across
/// crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UnibotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Data access error: {0}")]
    DataAccess(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for UnibotError {
    fn from(err: toml::de::Error) -> Self {
        UnibotError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for UnibotError {
    fn from(err: toml::ser::Error) -> Self {
        UnibotError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for UnibotError {
    fn from(err: serde_json::Error) -> Self {
        UnibotError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for UnibotError {
    fn from(err: csv::Error) -> Self {
        UnibotError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for unibot operations.
pub type Result<T> = std::result::Result<T, UnibotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UnibotError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_error_display_all_string_variants() {
        let cases: Vec<(UnibotError, &str)> = vec![
            (
                UnibotError::Storage("disk full".into()),
                "Storage error: disk full",
            ),
            (
                UnibotError::Retrieval("index empty".into()),
                "Retrieval error: index empty",
            ),
            (
                UnibotError::Embedding("empty text".into()),
                "Embedding error: empty text",
            ),
            (
                UnibotError::Generation("timeout".into()),
                "Generation error: timeout",
            ),
            (
                UnibotError::DataAccess("no row".into()),
                "Data access error: no row",
            ),
            (
                UnibotError::Channel("closed".into()),
                "Channel error: closed",
            ),
            (
                UnibotError::Serialization("bad json".into()),
                "Serialization error: bad json",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
        assert_eq!(UnibotError::ShuttingDown.to_string(), "Shutdown in progress");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: UnibotError = io_err.into();
        assert!(matches!(err, UnibotError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: UnibotError = parsed.unwrap_err().into();
        assert!(matches!(err, UnibotError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let parsed: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: UnibotError = parsed.unwrap_err().into();
        assert!(matches!(err, UnibotError::Serialization(_)));
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
