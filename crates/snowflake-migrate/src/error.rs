//! Error types for the migration library.

use thiserror::Error;

/// Exit code for configuration errors (missing credentials, invalid YAML).
pub const EXIT_CONFIG_ERROR: u8 = 1;

/// Exit code for mapping file errors.
pub const EXIT_MAPPING_ERROR: u8 = 2;

/// Exit code for warehouse errors outside of unit execution.
pub const EXIT_WAREHOUSE_ERROR: u8 = 3;

/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing credentials, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Mapping file could not be parsed or is inconsistent
    #[error("Mapping error at line {line}: {message}")]
    Mapping { line: usize, message: String },

    /// A SQL statement was rejected by the warehouse
    #[error("Warehouse error: {message}\n  Statement: {statement}")]
    Warehouse { statement: String, message: String },

    /// HTTP transport error talking to the warehouse API
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Worker pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Warehouse error for a failed statement.
    pub fn warehouse(statement: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Warehouse {
            statement: statement.into(),
            message: message.into(),
        }
    }

    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Mapping error for a specific line of the mapping file.
    pub fn mapping(line: usize, message: impl Into<String>) -> Self {
        MigrateError::Mapping {
            line,
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            MigrateError::Mapping { .. } | MigrateError::Json(_) => EXIT_MAPPING_ERROR,
            MigrateError::Warehouse { .. } | MigrateError::Http(_) | MigrateError::Pool { .. } => {
                EXIT_WAREHOUSE_ERROR
            }
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(MigrateError::mapping(3, "bad").exit_code(), EXIT_MAPPING_ERROR);
        assert_eq!(
            MigrateError::warehouse("SELECT 1", "boom").exit_code(),
            EXIT_WAREHOUSE_ERROR
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(MigrateError::from(io).exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_warehouse_error_includes_statement() {
        let err = MigrateError::warehouse("CREATE DATABASE FOO", "insufficient privileges");
        let text = err.format_detailed();
        assert!(text.contains("CREATE DATABASE FOO"));
        assert!(text.contains("insufficient privileges"));
    }
}
