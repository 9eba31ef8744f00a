//! Error types for the replication library.

use std::fmt;
use thiserror::Error;

/// Main error type for clone operations.
#[derive(Error, Debug)]
pub enum CloneError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error reported by a remote store (source or destination).
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// HTTP transport error outside a remote call (client construction).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Schema could not be derived for an entity.
    #[error("Schema extraction failed for {entity}: {message}")]
    Schema { entity: String, message: String },

    /// A governed operation failed on every attempt.
    #[error("{label} failed after {attempts} attempt(s): {source}")]
    Retry {
        label: String,
        attempts: u32,
        #[source]
        source: Box<CloneError>,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Clone cancelled")]
    Cancelled,
}

impl CloneError {
    /// Create a Schema error for an entity.
    pub fn schema(entity: impl Into<String>, message: impl Into<String>) -> Self {
        CloneError::Schema {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// The remote error at the bottom of this error, if any.
    ///
    /// Looks through retry wrappers so callers can classify exhausted
    /// operations by what the store last reported.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            CloneError::Remote(e) => Some(e),
            CloneError::Retry { source, .. } => source.remote(),
            _ => None,
        }
    }

    /// Classification of the underlying remote error, `Other` when there is none.
    pub fn remote_kind(&self) -> RemoteErrorKind {
        self.remote()
            .map(RemoteError::kind)
            .unwrap_or(RemoteErrorKind::Other)
    }

    /// True when the store rejected a write as a duplicate key.
    pub fn is_unique_violation(&self) -> bool {
        self.remote_kind() == RemoteErrorKind::UniqueViolation
    }

    /// True for cancellation, including cancellation wrapped by the retry governor.
    pub fn is_cancelled(&self) -> bool {
        match self {
            CloneError::Cancelled => true,
            CloneError::Retry { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Process exit code for a fatal error.
    pub fn exit_code(&self) -> u8 {
        1
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

/// Result type alias for clone operations.
pub type Result<T> = std::result::Result<T, CloneError>;

/// Coarse classification of a remote store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Timeouts, connection resets, 5xx responses.
    Transient,
    /// Write rejected by a unique or primary key constraint.
    UniqueViolation,
    /// Entity is not known to the store.
    NotFound,
    /// Filter referenced a missing column or a value of the wrong type.
    InvalidPredicate,
    /// Anything else.
    Other,
}

/// Error reported by a remote store.
///
/// Structured codes (SQLSTATE or PostgREST `PGRST*`) are preferred for
/// classification; the message is only inspected when no code is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Human-readable message from the store.
    pub message: String,
    /// SQLSTATE or PostgREST error code, when the store supplied one.
    pub code: Option<String>,
    /// HTTP status of the failed request.
    pub status: Option<u16>,
    /// Extra detail from the store.
    pub details: Option<String>,
    /// Hint from the store.
    pub hint: Option<String>,
    transient: bool,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            status: None,
            details: None,
            hint: None,
            transient: false,
        }
    }

    /// A transport-level failure (timeout, refused connection).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            transient: true,
            ..Self::new(message)
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_details(mut self, details: Option<String>, hint: Option<String>) -> Self {
        self.details = details;
        self.hint = hint;
        self
    }

    /// Classify this error.
    pub fn kind(&self) -> RemoteErrorKind {
        if self.transient {
            return RemoteErrorKind::Transient;
        }
        if let Some(kind) = self.code.as_deref().and_then(kind_from_code) {
            return kind;
        }
        if let Some(status) = self.status {
            if status >= 500 || status == 408 || status == 429 {
                return RemoteErrorKind::Transient;
            }
            if status == 404 {
                return RemoteErrorKind::NotFound;
            }
        }
        kind_from_message(&self.message)
    }

    pub fn is_unique_violation(&self) -> bool {
        self.kind() == RemoteErrorKind::UniqueViolation
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == RemoteErrorKind::NotFound
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteError {}

fn kind_from_code(code: &str) -> Option<RemoteErrorKind> {
    let kind = match code {
        "23505" => RemoteErrorKind::UniqueViolation,
        // undefined_table, PostgREST schema-cache miss
        "42P01" | "PGRST205" | "PGRST200" => RemoteErrorKind::NotFound,
        // undefined_column, invalid_text_representation, PostgREST parse errors
        "42703" | "22P02" | "PGRST100" | "PGRST204" => RemoteErrorKind::InvalidPredicate,
        // connection_exception class, too_many_connections, query_canceled
        "08000" | "08003" | "08006" | "53300" | "57014" | "PGRST000" | "PGRST001"
        | "PGRST002" | "PGRST003" => RemoteErrorKind::Transient,
        _ => return None,
    };
    Some(kind)
}

fn kind_from_message(message: &str) -> RemoteErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("duplicate key") || lower.contains("unique constraint") {
        RemoteErrorKind::UniqueViolation
    } else if lower.contains("does not exist") && lower.contains("column") {
        RemoteErrorKind::InvalidPredicate
    } else if lower.contains("does not exist") || lower.contains("could not find the table") {
        RemoteErrorKind::NotFound
    } else if lower.contains("timed out") || lower.contains("timeout") {
        RemoteErrorKind::Transient
    } else {
        RemoteErrorKind::Other
    }
}
