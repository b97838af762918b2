//! Connection lifecycle and statement execution.
//!
//! `open` and `close` never fail: the outcome is encoded in the connection's
//! state. `execute_statement` fails at most once per call, always with a
//! classified [`AdapterError`], and only after the query-finished event went out.

use crate::error::{AdapterError, AdapterResult};
use crate::models::connection::Lifecycle;
use crate::models::query::{log_sql, query_comment_metadata};
use crate::models::{AdapterResponse, Connection, QueryResult, UNKNOWN_ENGINE_VERSION};
use crate::services::driver::{Binding, Driver, ExecuteOptions, ParamStyle};
use crate::services::events::{fire_event, AdapterEvent, EventSink};
use crate::services::session::Session;
use crate::services::telemetry::{hash_parts, TelemetryContext};

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Connection type reported in events.
pub const CONNECTION_TYPE: &str = "impala";

/// Statement used to probe the engine version.
const VERSION_QUERY: &str = "select version()";

/// Opens, closes and runs statements on [`Connection`]s.
///
/// Stateless apart from its collaborators; one manager serves any number of
/// connections.
#[derive(Clone)]
pub struct ConnectionManager {
    /// Engine driver
    driver: Arc<dyn Driver>,
    /// Host event sink
    events: Arc<dyn EventSink>,
    /// Usage telemetry
    telemetry: Arc<TelemetryContext>,
    /// Whether `open` probes the engine version
    probe_version: bool,
}

impl ConnectionManager {
    /// Create a manager.
    pub fn new(
        driver: Arc<dyn Driver>,
        events: Arc<dyn EventSink>,
        telemetry: Arc<TelemetryContext>,
    ) -> Self {
        Self { driver, events, telemetry, probe_version: true }
    }

    /// Enable or disable the version probe on open.
    ///
    /// When disabled the version is fetched on the first
    /// [`engine_version`](Self::engine_version) call instead.
    pub fn with_version_probe(mut self, enabled: bool) -> Self {
        self.probe_version = enabled;
        self
    }

    /// Get the telemetry context.
    pub fn telemetry(&self) -> &Arc<TelemetryContext> {
        &self.telemetry
    }

    /// Open a connection.
    ///
    /// A no-op on an open connection. Never fails: on error the state becomes
    /// `Fail` and the error is kept for [`Connection::last_error`].
    pub fn open<'c>(&self, conn: &'c mut Connection) -> &'c mut Connection {
        if conn.is_open() {
            tracing::debug!(connection_name = %conn.name(), "Connection is already open, skipping open");
            return conn;
        }

        let auth = conn.credentials().auth_mode();
        let params = conn.credentials().connect_params();
        tracing::debug!(
            connection_name = %conn.name(),
            host = %params.host,
            port = params.port,
            auth = auth.as_str(),
            "Opening connection"
        );

        let start = Instant::now();
        let result = self.driver.connect(&params).map_err(AdapterError::from);
        let elapsed = start.elapsed();

        let error = match result {
            Ok(handle) => {
                let mut session = Session::new(handle);
                if self.probe_version {
                    conn.engine_version = Some(Self::probe_version(&mut session));
                }
                tracing::info!(
                    connection_name = %conn.name(),
                    session_id = %session.id(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Connection opened"
                );
                conn.lifecycle = Lifecycle::Open(session);
                None
            }
            Err(err) => {
                tracing::debug!(connection_name = %conn.name(), error = %err, "Connection error");
                let message = err.to_string();
                conn.lifecycle = Lifecycle::Fail(err);
                Some(message)
            }
        };

        fire_event(
            self.events.as_ref(),
            AdapterEvent::ConnectionOpened {
                connection_name: conn.name().to_string(),
                auth,
                state: conn.state(),
                elapsed,
                error,
            },
        );

        let mut payload = self.lifecycle_payload("impala_adapter_open", conn, elapsed);
        payload.insert("auth".into(), auth.as_str().into());
        self.telemetry.track(payload);

        conn
    }

    /// Close a connection.
    ///
    /// A no-op unless the connection is open or failed. Never fails.
    pub fn close<'c>(&self, conn: &'c mut Connection) -> &'c mut Connection {
        if matches!(conn.lifecycle, Lifecycle::Init | Lifecycle::Closed) {
            return conn;
        }

        let start = Instant::now();
        if let Lifecycle::Open(session) = &mut conn.lifecycle {
            session.shutdown();
        }
        conn.lifecycle = Lifecycle::Closed;
        conn.transaction_open = false;
        let elapsed = start.elapsed();

        tracing::debug!(
            connection_name = %conn.name(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Connection closed"
        );

        fire_event(
            self.events.as_ref(),
            AdapterEvent::ConnectionClosed { connection_name: conn.name().to_string(), elapsed },
        );
        self.telemetry.track(self.lifecycle_payload("impala_adapter_close", conn, elapsed));

        conn
    }

    /// Run one statement and return the session holding its result set.
    ///
    /// Every failure, including a connection that is not open, is classified and
    /// returned after the query-finished event.
    pub fn execute_statement<'c>(
        &self,
        conn: &'c mut Connection,
        sql: &str,
        bindings: Option<&[Binding]>,
        auto_begin: bool,
        abridge: bool,
    ) -> AdapterResult<&'c mut Session> {
        if auto_begin && !conn.transaction_open() {
            self.begin(conn);
        }

        let connection_name = conn.name().to_string();
        fire_event(
            self.events.as_ref(),
            AdapterEvent::ConnectionUsed {
                conn_type: CONNECTION_TYPE,
                connection_name: connection_name.clone(),
            },
        );

        let logged_sql = log_sql(sql, abridge);
        fire_event(
            self.events.as_ref(),
            AdapterEvent::SqlQuery {
                connection_name: connection_name.clone(),
                sql: logged_sql.clone(),
                metadata: query_comment_metadata(sql),
            },
        );

        let start = Instant::now();
        let outcome = Self::run_on_cursor(conn, sql, bindings);
        let elapsed = start.elapsed();
        let status = match &outcome {
            Ok(cursor) => Self::get_response(cursor).to_string(),
            Err(e) => e.to_string(),
        };

        fire_event(
            self.events.as_ref(),
            AdapterEvent::SqlQueryFinished {
                connection_name,
                sql: logged_sql,
                elapsed,
                status: status.clone(),
            },
        );

        match outcome {
            Ok(cursor) => {
                fire_event(self.events.as_ref(), AdapterEvent::SqlQueryStatus { status, elapsed });
                Ok(cursor)
            }
            Err(err) => {
                tracing::debug!(sql = %sql, error = %err, "Error running SQL");
                Err(err)
            }
        }
    }

    /// Look up the session, get its cursor and execute on it.
    fn run_on_cursor<'c>(
        conn: &'c mut Connection,
        sql: &str,
        bindings: Option<&[Binding]>,
    ) -> AdapterResult<&'c mut Session> {
        let cursor = Self::session_mut(conn)?.cursor()?;
        cursor.execute(sql, bindings, &ExecuteOptions { paramstyle: ParamStyle::Format })?;
        Ok(cursor)
    }

    /// Run one statement and optionally fetch its result set.
    pub fn execute(
        &self,
        conn: &mut Connection,
        sql: &str,
        fetch: bool,
    ) -> AdapterResult<(AdapterResponse, QueryResult)> {
        let session = self.execute_statement(conn, sql, None, true, false)?;
        let response = Self::get_response(session);

        if !fetch {
            return Ok((response, QueryResult::default()));
        }

        let rows = session.fetch_all().map_err(AdapterError::from)?;
        let columns = session.description().unwrap_or_default();
        Ok((response, QueryResult { columns, rows }))
    }

    /// Status token for the last statement. Impala reports no detail.
    pub fn get_response(_session: &Session) -> AdapterResponse {
        AdapterResponse::ok()
    }

    /// Request cancellation of the statement running on `conn`. Best effort.
    pub fn cancel(&self, conn: &mut Connection) {
        let name = conn.name().to_string();
        match conn.handle_mut() {
            Some(session) => {
                tracing::debug!(connection_name = %name, "Cancelling query");
                session.cancel();
            }
            None => tracing::debug!(connection_name = %name, "Connection is not open, nothing to cancel"),
        }
    }

    /// Engine version, fetched and cached on first read.
    pub fn engine_version(&self, conn: &mut Connection) -> AdapterResult<String> {
        if let Some(version) = conn.cached_engine_version() {
            return Ok(version.to_string());
        }
        let version = Self::probe_version(Self::session_mut(conn)?);
        conn.engine_version = Some(version.clone());
        Ok(version)
    }

    /// Mark a transaction open. Impala has no transactions; no statement is sent.
    pub fn begin(&self, conn: &mut Connection) {
        tracing::debug!(connection_name = %conn.name(), "Begin is a no-op on Impala");
        conn.transaction_open = true;
        self.add_begin_query();
    }

    /// Mark the transaction closed. No statement is sent.
    pub fn commit(&self, conn: &mut Connection) {
        tracing::debug!(connection_name = %conn.name(), "Commit is a no-op on Impala");
        conn.transaction_open = false;
        self.add_commit_query();
    }

    /// Mark the transaction closed. No statement is sent.
    pub fn rollback(&self, conn: &mut Connection) {
        if let Some(session) = conn.handle_mut() {
            session.rollback();
        }
        conn.transaction_open = false;
    }

    /// Not implemented on Impala.
    pub fn add_begin_query(&self) {
        tracing::debug!("NotImplemented: add_begin_query");
    }

    /// Not implemented on Impala.
    pub fn add_commit_query(&self) {
        tracing::debug!("NotImplemented: add_commit_query");
    }

    fn session_mut(conn: &mut Connection) -> AdapterResult<&mut Session> {
        if !conn.is_open() {
            return Err(Self::not_open(conn));
        }
        match &mut conn.lifecycle {
            Lifecycle::Open(session) => Ok(session),
            _ => Err(AdapterError::runtime("Connection is not open")),
        }
    }

    fn not_open(conn: &Connection) -> AdapterError {
        match conn.last_error() {
            Some(err) => AdapterError::connectivity(format!(
                "Connection '{}' failed to open: {}",
                conn.name(),
                err.message()
            )),
            None => AdapterError::runtime(format!(
                "Connection '{}' is not open (state: {})",
                conn.name(),
                conn.state()
            )),
        }
    }

    fn probe_version(session: &mut Session) -> String {
        let options = ExecuteOptions::default();
        let version = session
            .execute(VERSION_QUERY, None, &options)
            .and_then(|()| session.fetch_one())
            .map(|row| {
                row.and_then(|row| row.into_iter().next())
                    .and_then(|value| value.as_str().map(str::to_string))
            });

        match version {
            Ok(Some(version)) => {
                tracing::debug!(session_id = %session.id(), version = %version, "Engine version");
                version
            }
            Ok(None) => UNKNOWN_ENGINE_VERSION.to_string(),
            Err(e) => {
                tracing::debug!(session_id = %session.id(), error = %e, "Version probe failed");
                UNKNOWN_ENGINE_VERSION.to_string()
            }
        }
    }

    fn lifecycle_payload(
        &self,
        id: &str,
        conn: &Connection,
        elapsed: Duration,
    ) -> serde_json::Map<String, serde_json::Value> {
        let credentials = conn.credentials();
        let user = credentials.username.as_deref().unwrap_or("None");

        let mut payload = serde_json::Map::new();
        payload.insert("id".into(), id.into());
        payload.insert("unique_hash".into(), hash_parts(&[credentials.host.as_str(), user]).into());
        payload.insert("connection_name".into(), conn.name().into());
        payload.insert("connection_state".into(), conn.state().as_str().into());
        payload.insert("elapsed_time".into(), format!("{:.2}", elapsed.as_secs_f64()).into());
        payload
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("telemetry", &self.telemetry)
            .field("probe_version", &self.probe_version)
            .finish()
    }
}
