//! Error types for sz-quickstart.
//!
//! Errors are layered the same way the service boundary is: local input
//! problems, errors the engine reports, and failures to reach the engine at
//! all. Engine errors carry the numeric code the service uses on the wire
//! (`SENZnnnn|message`), so they survive a trip through the gRPC transport.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Validation errors that occur before anything is sent to the service.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Line {line} is not a valid JSON record: {message}")]
    InvalidJson {
        line: usize,
        message: String,
    },

    #[error("Invalid configuration document: {reason}")]
    InvalidConfigDocument {
        reason: String,
    },

    #[error("No help is available for method '{name}'")]
    UnknownMethod {
        name: String,
    },

    #[error("Invalid value '{value}' for setting {name}")]
    InvalidSetting {
        name: String,
        value: String,
    },
}

/// Numeric codes used by the engine in `SENZnnnn|message` error text.
pub mod codes {
    /// Malformed request payload.
    pub const BAD_INPUT: u32 = 2;
    /// Transient condition, the call may succeed if repeated.
    pub const RETRY_TIMEOUT: u32 = 10;
    /// Record, configuration or handle does not exist.
    pub const NOT_FOUND: u32 = 33;
    /// Record references a data source missing from the active configuration.
    pub const UNKNOWN_DATA_SOURCE: u32 = 2207;
    /// Data source code is already registered in the configuration.
    pub const DUPLICATE_DATA_SOURCE: u32 = 7217;
    /// Default configuration pointer no longer matches the expected id.
    pub const REPLACE_CONFLICT: u32 = 7245;
}

/// Errors reported by the entity-resolution service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Data source already exists: {message}")]
    DuplicateDataSource {
        message: String,
    },

    #[error("Default configuration changed concurrently: {message}")]
    ReplaceConflict {
        message: String,
    },

    #[error("Unknown data source: {message}")]
    UnknownDataSource {
        message: String,
    },

    #[error("Not found: {message}")]
    NotFound {
        message: String,
    },

    #[error("Bad input: {message}")]
    BadInput {
        message: String,
    },

    #[error("Retryable engine error: {message}")]
    Retryable {
        message: String,
    },

    #[error("Engine error (code {code}): {message}")]
    General {
        code: u32,
        message: String,
    },
}

fn senz_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)^\s*SENZ(\d{1,5})\|(.*)$").expect("static SENZ pattern is valid")
    })
}

impl EngineError {
    /// Builds the variant that corresponds to an engine error code.
    #[must_use]
    pub fn from_code(code: u32, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            codes::DUPLICATE_DATA_SOURCE => Self::DuplicateDataSource { message },
            codes::REPLACE_CONFLICT => Self::ReplaceConflict { message },
            codes::UNKNOWN_DATA_SOURCE => Self::UnknownDataSource { message },
            codes::NOT_FOUND => Self::NotFound { message },
            codes::BAD_INPUT => Self::BadInput { message },
            codes::RETRY_TIMEOUT => Self::Retryable { message },
            code => Self::General { code, message },
        }
    }

    /// Parses `SENZnnnn|message` text. Returns `None` when no code is present.
    #[must_use]
    pub fn parse_wire(text: &str) -> Option<Self> {
        let caps = senz_pattern().captures(text)?;
        let code: u32 = caps.get(1)?.as_str().parse().ok()?;
        let message = caps.get(2).map_or("", |m| m.as_str());
        Some(Self::from_code(code, message))
    }

    /// Engine code for this error.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::DuplicateDataSource { .. } => codes::DUPLICATE_DATA_SOURCE,
            Self::ReplaceConflict { .. } => codes::REPLACE_CONFLICT,
            Self::UnknownDataSource { .. } => codes::UNKNOWN_DATA_SOURCE,
            Self::NotFound { .. } => codes::NOT_FOUND,
            Self::BadInput { .. } => codes::BAD_INPUT,
            Self::Retryable { .. } => codes::RETRY_TIMEOUT,
            Self::General { code, .. } => *code,
        }
    }

    /// Message without the code prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::DuplicateDataSource { message }
            | Self::ReplaceConflict { message }
            | Self::UnknownDataSource { message }
            | Self::NotFound { message }
            | Self::BadInput { message }
            | Self::Retryable { message }
            | Self::General { message, .. } => message,
        }
    }

    /// Wire form: `SENZnnnn|message`.
    #[must_use]
    pub fn wire_message(&self) -> String {
        format!("SENZ{:04}|{}", self.code(), self.message())
    }
}

/// Transport errors for client-server communication and local I/O.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        message: String,
    },

    #[error("RPC failed ({code}): {message}")]
    Rpc {
        code: String,
        message: String,
    },

    #[error("Download of {url} failed: {message}")]
    Download {
        url: String,
        message: String,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Top-level error type for sz-quickstart.
#[derive(Debug, Error)]
pub enum SzError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl SzError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if a data source was already registered.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Engine(EngineError::DuplicateDataSource { .. }))
    }

    /// Returns true if the default configuration pointer moved underneath a replace.
    #[must_use]
    pub const fn is_replace_conflict(&self) -> bool {
        matches!(self, Self::Engine(EngineError::ReplaceConflict { .. }))
    }

    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Engine(e) => matches!(
                e,
                EngineError::Retryable { .. } | EngineError::ReplaceConflict { .. }
            ),
            Self::Transport(e) => matches!(e, TransportError::ConnectionFailed { .. }),
            Self::Validation(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for sz-quickstart operations.
pub type SzResult<T> = Result<T, SzError>;
