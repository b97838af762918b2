//! Error types for the Impala adapter.
//!
//! Every driver failure is translated into one of five categories in exactly one
//! place, `impl From<DriverError> for AdapterError`.

use crate::services::driver::DriverError;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Main error type for the adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Bad or contradictory credentials.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Human-readable error message.
        message: String,
    },

    /// Transport-level rejection of the supplied credentials.
    #[error("Authorization error: {message}")]
    Authorization {
        /// Human-readable error message, including the driver's text.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
    },

    /// The coordinator could not be reached or refused to negotiate a session.
    #[error("Connectivity error: {message}")]
    Connectivity {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The engine was reached but rejected the statement.
    #[error("Database error: {message}")]
    Engine {
        /// Message reported by the engine.
        message: String,
    },

    /// Anything else.
    #[error("Runtime error: {message}")]
    Runtime {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Category of an [`AdapterError`], for callers that branch on the kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or contradictory credentials
    Configuration,
    /// Credentials rejected by the transport
    Authorization,
    /// Coordinator unreachable or session negotiation failed
    Connectivity,
    /// Statement rejected by the engine
    Engine,
    /// Anything else
    Runtime,
}

impl AdapterError {
    // ========== Constructors ==========

    /// Create a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a new authorization error with the default hint.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
            hint: Some("Check the username, password and auth_type in your profile".to_string()),
        }
    }

    /// Create a new connectivity error.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity { message: message.into(), source: None }
    }

    /// Create a new connectivity error with source.
    pub fn connectivity_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connectivity { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new engine error.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine { message: message.into() }
    }

    /// Create a new runtime error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime { message: message.into(), source: None }
    }

    /// Create a new runtime error with source.
    pub fn runtime_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Runtime { message: message.into(), source: Some(Box::new(source)) }
    }

    // ========== Methods ==========

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::Connectivity { .. } => ErrorKind::Connectivity,
            Self::Engine { .. } => ErrorKind::Engine,
            Self::Runtime { .. } => ErrorKind::Runtime,
        }
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Configuration => "Configuration",
            ErrorKind::Authorization => "Authorization",
            ErrorKind::Connectivity => "Connectivity",
            ErrorKind::Engine => "Database",
            ErrorKind::Runtime => "Runtime",
        }
    }

    /// Whether the failure can be fixed by the user without touching the cluster.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Authorization { .. })
    }

    /// Get the bare message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Configuration { message }
            | Self::Authorization { message, .. }
            | Self::Connectivity { message, .. }
            | Self::Engine { message }
            | Self::Runtime { message, .. } => message,
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Configuration { .. } => Some("Fix the Impala target in your profile"),
            Self::Authorization { hint, .. } => hint.as_deref(),
            Self::Connectivity { .. } => {
                Some("Check that the Impala coordinator is running and reachable")
            }
            Self::Engine { .. } => None,
            Self::Runtime { .. } => None,
        }
    }

    /// Whether the engine reported that the referenced object does not exist.
    ///
    /// The engine only exposes this through message text, so this is the single
    /// place that matches on it.
    pub fn is_object_not_found(&self) -> bool {
        match self {
            Self::Engine { message } | Self::Runtime { message, .. } => {
                let lower = message.to_lowercase();
                lower.contains("not found") || lower.contains("does not exist")
            }
            _ => false,
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        let error_type = format!("{} Error", self.category());
        let message = self.to_string();
        let hint = self.hint().map(String::from);

        let technical_detail = match self {
            Self::Connectivity { source: Some(source), .. }
            | Self::Runtime { source: Some(source), .. } => Some(format!("Cause: {source}")),
            _ => None,
        };

        ErrorInfo { error_type, message, hint, technical_detail }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Category name (e.g., "Connectivity Error").
    pub error_type: String,
    /// User-friendly message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Technical detail for "Show Details" expansion.
    pub technical_detail: Option<String>,
}

// ========== Error Conversions ==========

/// Classify a driver failure.
///
/// Total over [`DriverError`]: transport rejections are authorization problems,
/// session negotiation failures are connectivity problems, statement rejections
/// are engine errors, and everything else is a runtime failure.
impl From<DriverError> for AdapterError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Http { code, message } => AdapterError::authorization(format!(
                "HTTP {code} from Impala: {message}. Please check your credentials"
            )),
            DriverError::HiveServer2(message) | DriverError::Rpc(message) => {
                AdapterError::connectivity(format!("Failed to negotiate session: {message}"))
            }
            DriverError::Database(message)
            | DriverError::Operational(message)
            | DriverError::Programming(message)
            | DriverError::NotSupported(message) => AdapterError::engine(message),
            err @ (DriverError::Interface(_) | DriverError::Io(_) | DriverError::Other(_)) => {
                AdapterError::runtime_with_source(err.to_string(), err)
            }
        }
    }
}

/// Convert from serde_json::Error to AdapterError.
impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::configuration(format!("Invalid Impala credentials: {err}"))
    }
}
