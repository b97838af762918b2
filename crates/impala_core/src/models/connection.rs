//! Logical connection and its lifecycle state.

use crate::error::AdapterError;
use crate::models::Credentials;
use crate::services::session::Session;

use serde::Serialize;
use std::sync::Arc;

/// Lifecycle state of a connection, as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Created, never opened
    #[default]
    Init,
    /// Authenticated session available
    Open,
    /// Last open attempt failed
    Fail,
    /// Explicitly closed
    Closed,
}

impl ConnectionState {
    /// Convert to string representation for logs and telemetry.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Open => "open",
            Self::Fail => "fail",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State plus the data that only exists in that state.
///
/// The session lives inside `Open`, so a connection has a handle exactly when it
/// is open.
#[derive(Debug, Default)]
pub(crate) enum Lifecycle {
    #[default]
    Init,
    Open(Session),
    Fail(AdapterError),
    Closed,
}

/// Engine version recorded when the version probe fails.
pub const UNKNOWN_ENGINE_VERSION: &str = "unknown";

/// A logical connection to one Impala coordinator.
///
/// Owned by exactly one caller; statements on it must not overlap.
#[derive(Debug)]
pub struct Connection {
    /// Name given by the host (usually the node or thread being run)
    name: String,
    /// Target credentials
    credentials: Arc<Credentials>,
    /// Current lifecycle state
    pub(crate) lifecycle: Lifecycle,
    /// Whether the host believes a transaction is open
    pub(crate) transaction_open: bool,
    /// Cached engine version
    pub(crate) engine_version: Option<String>,
}

impl Connection {
    /// Create a connection in the `Init` state.
    pub fn new(name: impl Into<String>, credentials: Arc<Credentials>) -> Self {
        Self {
            name: name.into(),
            credentials,
            lifecycle: Lifecycle::Init,
            transaction_open: false,
            engine_version: None,
        }
    }

    /// Get the connection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the credentials.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Get the current state.
    pub fn state(&self) -> ConnectionState {
        match self.lifecycle {
            Lifecycle::Init => ConnectionState::Init,
            Lifecycle::Open(_) => ConnectionState::Open,
            Lifecycle::Fail(_) => ConnectionState::Fail,
            Lifecycle::Closed => ConnectionState::Closed,
        }
    }

    /// Check if the connection is open.
    pub fn is_open(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Open(_))
    }

    /// Get the session, present only while open.
    pub fn handle(&self) -> Option<&Session> {
        match &self.lifecycle {
            Lifecycle::Open(session) => Some(session),
            _ => None,
        }
    }

    /// Get the session mutably, present only while open.
    pub fn handle_mut(&mut self) -> Option<&mut Session> {
        match &mut self.lifecycle {
            Lifecycle::Open(session) => Some(session),
            _ => None,
        }
    }

    /// Failure recorded by the last open attempt.
    pub fn last_error(&self) -> Option<&AdapterError> {
        match &self.lifecycle {
            Lifecycle::Fail(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the host believes a transaction is open.
    pub fn transaction_open(&self) -> bool {
        self.transaction_open
    }

    /// Engine version cached by the last probe, if any.
    pub fn cached_engine_version(&self) -> Option<&str> {
        self.engine_version.as_deref()
    }
}
