//! Error types for reconciliation against the engine.
//!
//! Errors carry enough context to tell a caller whether the input was
//! wrong, the engine refused a statement, or the engine could not be
//! reached at all. Nothing here is retried inside the crate.

use thiserror::Error;

/// Categories of errors for user feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller supplied a malformed identifier or unsafe value
    Input,
    /// An entity expected to exist could not be found
    Drift,
    /// An identity-defining attribute changed
    Replacement,
    /// The engine rejected a statement
    Engine,
    /// The engine could not be reached
    Connection,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is worth retrying.
    ///
    /// The core never retries; callers that want to can consult this.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Input => "Invalid input",
            Self::Drift => "Entity missing",
            Self::Replacement => "Change requires replacement",
            Self::Engine => "Statement rejected by the engine",
            Self::Connection => "Engine unreachable",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Input => "Fix the value in the manifest and try again",
            Self::Drift => "Run refresh to drop entities that no longer exist",
            Self::Replacement => "Destroy and recreate the entity, or revert the attribute",
            Self::Engine => "Check the engine message and the permissions of the connecting login",
            Self::Connection => "Check hostname, port and credentials",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while reading or converging access-control state.
#[derive(Debug, Error)]
pub enum Error {
    /// A GUID could not be turned into a native SID
    #[error("invalid identifier format '{value}': {reason}")]
    InvalidIdentifierFormat {
        /// The offending input
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// An entity that must exist was not found
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Entity kind, e.g. "login"
        kind: &'static str,
        /// Name that was looked up
        name: String,
    },

    /// An identity-defining attribute changed and cannot be converged in place
    #[error("{address}: {} requires destroy-and-recreate", .attributes.join(", "))]
    ConflictingAttributeChange {
        /// Address of the entity
        address: String,
        /// Attributes that changed
        attributes: Vec<String>,
    },

    /// The engine rejected a statement; `message` is the engine text verbatim
    #[error("engine rejected `{statement}`: {message}")]
    EngineCommandFailure {
        /// Statement that failed, with secrets redacted
        statement: String,
        /// Engine error text
        message: String,
    },

    /// The engine could not be reached
    #[error("connection unavailable: {message}")]
    ConnectionUnavailable {
        /// Transport error text
        message: String,
    },

    /// A value would produce an unsafe or empty statement
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A catalog row had an unexpected shape
    #[error("catalog decode error: {0}")]
    Catalog(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidIdentifierFormat { .. } | Error::InvalidInput(_) => ErrorCategory::Input,
            Error::NotFound { .. } => ErrorCategory::Drift,
            Error::ConflictingAttributeChange { .. } => ErrorCategory::Replacement,
            Error::EngineCommandFailure { .. } => ErrorCategory::Engine,
            Error::ConnectionUnavailable { .. } => ErrorCategory::Connection,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Create an error from the output of a failed engine invocation.
    ///
    /// Connection-level failures are told apart from statement failures by
    /// the client library's message prefixes.
    pub fn from_engine_output(output: &str, statement: &str) -> Self {
        let lower = output.to_lowercase();

        if lower.contains("login failed")
            || lower.contains("login timeout expired")
            || lower.contains("tcp provider")
            || lower.contains("named pipes provider")
            || lower.contains("network-related or instance-specific")
            || lower.contains("unable to complete login")
            || lower.contains("ssl provider")
        {
            return Error::ConnectionUnavailable {
                message: output.trim().to_string(),
            };
        }

        Error::EngineCommandFailure {
            statement: statement.to_string(),
            message: output.trim().to_string(),
        }
    }

    /// Replace the statement attached to an engine failure.
    ///
    /// Used to swap raw SQL for its redacted rendering.
    pub fn with_statement(self, statement: impl Into<String>) -> Self {
        match self {
            Error::EngineCommandFailure { message, .. } => Error::EngineCommandFailure {
                statement: statement.into(),
                message,
            },
            other => other,
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
