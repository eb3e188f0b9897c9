//! Error types for rule-driven campaign generation and activation.

use thiserror::Error;

/// Condition-expression errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("Unterminated string literal starting at position {0}")]
    UnterminatedString(usize),

    #[error("Invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("Unexpected token {found} at position {pos}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        pos: usize,
    },

    #[error("Unexpected end of expression, expected {0}")]
    UnexpectedEnd(String),

    #[error("Undefined symbol '{0}'")]
    UndefinedSymbol(String),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("Cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("Cannot apply '{op}' to {operand}")]
    InvalidOperand { op: String, operand: &'static str },

    #[error("Index {index} is out of range for '{path}' (length {len})")]
    IndexOutOfRange {
        path: String,
        index: i64,
        len: usize,
    },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Expression nesting exceeds {0} levels")]
    TooDeep(usize),
}

/// API-level errors surfaced by every component
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Expression \"{condition}\" can't be parsed: {source}")]
    ExpressionParse {
        condition: String,
        #[source]
        source: ExpressionError,
    },

    #[error("'{rule}' rule's evaluation failed: {source}")]
    ExpressionEval {
        rule: String,
        #[source]
        source: ExpressionError,
    },

    #[error("Format error: {0}")]
    FormatError(String),

    #[error("Platform operation {operation} timed out (timeout={timeout_secs}s)")]
    PlatformTimeout {
        operation: String,
        timeout_secs: u64,
    },

    #[error("Platform request failed: {0}")]
    PlatformApiError(String),

    #[error("Platform authentication failed: {0}")]
    PlatformAuthFailed(String),

    #[error("Platform rate limit exceeded: {0}")]
    PlatformRateLimit(String),

    #[error("Configuration validation failed:\n{}", .0.join("\n"))]
    ValidationFailed(Vec<String>),

    #[error("Archive error: {0}")]
    ArchiveError(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ApiError {
    /// Whether the error came from the remote platform rather than local data or config.
    pub fn is_platform(&self) -> bool {
        matches!(
            self,
            ApiError::PlatformTimeout { .. }
                | ApiError::PlatformApiError(_)
                | ApiError::PlatformAuthFailed(_)
                | ApiError::PlatformRateLimit(_)
        )
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigurationError(err.to_string())
    }
}

impl From<zip::result::ZipError> for ApiError {
    fn from(err: zip::result::ZipError) -> Self {
        ApiError::ArchiveError(err.to_string())
    }
}
