//! Structured lifecycle events reported to the host.
//!
//! Events go through [`fire_event`], which never lets a sink failure reach the
//! caller.

use crate::models::{AuthMode, ConnectionState};

use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

/// Error type sinks may return.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Adapter lifecycle and query events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdapterEvent {
    /// An open attempt finished
    ConnectionOpened {
        connection_name: String,
        auth: AuthMode,
        state: ConnectionState,
        elapsed: Duration,
        error: Option<String>,
    },
    /// A connection was closed
    ConnectionClosed { connection_name: String, elapsed: Duration },
    /// A connection was picked up to run a statement
    ConnectionUsed { conn_type: &'static str, connection_name: String },
    /// A statement is about to run
    SqlQuery {
        connection_name: String,
        sql: String,
        metadata: serde_json::Map<String, serde_json::Value>,
    },
    /// A statement finished, successfully or not
    SqlQueryFinished { connection_name: String, sql: String, elapsed: Duration, status: String },
    /// Final status of a successful statement
    SqlQueryStatus { status: String, elapsed: Duration },
}

impl AdapterEvent {
    /// Short event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionOpened { .. } => "connection_opened",
            Self::ConnectionClosed { .. } => "connection_closed",
            Self::ConnectionUsed { .. } => "connection_used",
            Self::SqlQuery { .. } => "sql_query",
            Self::SqlQueryFinished { .. } => "sql_query_finished",
            Self::SqlQueryStatus { .. } => "sql_query_status",
        }
    }
}

/// Receiver of adapter events, provided by the host.
pub trait EventSink: Send + Sync {
    /// Handle one event.
    fn emit(&self, event: &AdapterEvent) -> Result<(), SinkError>;
}

/// Sink that writes events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &AdapterEvent) -> Result<(), SinkError> {
        match event {
            AdapterEvent::ConnectionOpened { connection_name, auth, state, elapsed, error } => {
                tracing::debug!(
                    connection_name = %connection_name,
                    auth = auth.as_str(),
                    state = %state,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = error.as_deref().unwrap_or(""),
                    "Connection open attempt finished"
                );
            }
            AdapterEvent::ConnectionClosed { connection_name, elapsed } => {
                tracing::debug!(
                    connection_name = %connection_name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Connection closed"
                );
            }
            AdapterEvent::ConnectionUsed { conn_type, connection_name } => {
                tracing::debug!(conn_type, connection_name = %connection_name, "Using connection");
            }
            AdapterEvent::SqlQuery { connection_name, sql, .. } => {
                tracing::debug!(connection_name = %connection_name, sql = %sql, "On connection");
            }
            AdapterEvent::SqlQueryFinished { connection_name, elapsed, status, .. } => {
                tracing::debug!(
                    connection_name = %connection_name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    status = %status,
                    "Statement finished"
                );
            }
            AdapterEvent::SqlQueryStatus { status, elapsed } => {
                tracing::debug!(
                    status = %status,
                    elapsed_secs = format!("{:.2}", elapsed.as_secs_f64()),
                    "SQL status"
                );
            }
        }
        Ok(())
    }
}

/// Deliver an event, swallowing sink errors and panics.
pub fn fire_event(sink: &dyn EventSink, event: AdapterEvent) {
    match catch_unwind(AssertUnwindSafe(|| sink.emit(&event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(event = event.name(), error = %e, "Event sink failed");
        }
        Err(_) => {
            tracing::debug!(event = event.name(), "Event sink panicked");
        }
    }
}
