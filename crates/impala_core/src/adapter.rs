//! Adapter facade.
//!
//! Owns the validated credentials, the collaborators every connection shares and
//! a registry of named connections, one per host worker.

use crate::error::{AdapterError, AdapterResult};
use crate::models::{AdapterResponse, ColumnRecord, Connection, Credentials, QueryResult, Relation, RelationType};
use crate::services::{
    Catalog, CatalogService, ConnectionManager, Driver, EventSink, HttpTelemetrySink,
    TelemetryContext, TelemetrySink, TracingEventSink,
};

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// A connection shared between the registry and the worker using it.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Impala adapter state.
///
/// Thread-safe via `parking_lot` locks. Each registered connection is used by one
/// worker at a time. Owns a tokio runtime, so it must be dropped outside of async
/// code.
pub struct ImpalaAdapter {
    /// Validated target credentials
    credentials: Arc<Credentials>,
    /// Lifecycle and execution
    manager: ConnectionManager,
    /// Introspection and catalog generation
    catalog: CatalogService,
    /// Open connections by name
    connections: RwLock<HashMap<String, SharedConnection>>,
    /// Tokio runtime for catalog fan-out and telemetry dispatch
    tokio_runtime: tokio::runtime::Runtime,
}

impl ImpalaAdapter {
    /// Create an adapter from the host's raw profile.
    ///
    /// Events are written to `tracing`; telemetry goes to the HTTP collector
    /// configured in the environment.
    pub fn new(raw: serde_json::Value, driver: Arc<dyn Driver>) -> AdapterResult<Self> {
        Self::with_collaborators(
            Credentials::from_value(raw)?,
            driver,
            Arc::new(TracingEventSink),
            Arc::new(HttpTelemetrySink::new()),
        )
    }

    /// Create an adapter with explicit collaborators.
    pub fn with_collaborators(
        credentials: Credentials,
        driver: Arc<dyn Driver>,
        events: Arc<dyn EventSink>,
        telemetry_sink: Arc<dyn TelemetrySink>,
    ) -> AdapterResult<Self> {
        let credentials = Arc::new(credentials.validated()?);

        let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("impala-adapter")
            .enable_all()
            .build()
            .map_err(|e| AdapterError::runtime_with_source("Failed to create tokio runtime", e))?;

        let telemetry = Arc::new(TelemetryContext::from_credentials(&credentials, telemetry_sink));
        let manager = ConnectionManager::new(driver, events, telemetry);
        let catalog = CatalogService::new(manager.clone(), Arc::clone(&credentials));

        tracing::info!(
            host = %credentials.host,
            port = credentials.port,
            schema = %credentials.schema,
            auth = credentials.auth_mode().as_str(),
            "ImpalaAdapter initialized"
        );

        Ok(Self {
            credentials,
            manager,
            catalog,
            connections: RwLock::new(HashMap::new()),
            tokio_runtime,
        })
    }

    /// Adapter type name.
    pub fn adapter_type(&self) -> &'static str {
        self.credentials.adapter_type()
    }

    // ========== Service Accessors ==========

    /// Get the credentials.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Get the connection manager.
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Get the catalog service.
    pub fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    /// Get the telemetry context.
    pub fn telemetry(&self) -> &TelemetryContext {
        self.manager.telemetry()
    }

    // ========== Connection Registry ==========

    /// Get the named connection, creating and opening it as needed.
    ///
    /// The returned connection may be in the `Fail` state; check
    /// [`Connection::state`].
    pub fn acquire_connection(&self, name: &str) -> SharedConnection {
        let conn = Arc::clone(self.connections.write().entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(connection_name = %name, "Acquiring new connection");
            Arc::new(Mutex::new(Connection::new(name, Arc::clone(&self.credentials))))
        }));

        let _enter = self.tokio_runtime.enter();
        self.manager.open(&mut *conn.lock());
        conn
    }

    /// Get the named connection if it is registered.
    pub fn get_connection(&self, name: &str) -> Option<SharedConnection> {
        self.connections.read().get(name).cloned()
    }

    /// Close the named connection and remove it from the registry.
    pub fn release_connection(&self, name: &str) -> Option<SharedConnection> {
        let conn = self.connections.write().remove(name)?;
        let _enter = self.tokio_runtime.enter();
        self.manager.close(&mut *conn.lock());
        tracing::debug!(connection_name = %name, "Released connection");
        Some(conn)
    }

    /// Get all registered connection names.
    pub fn connection_names(&self) -> Vec<String> {
        self.connections.read().keys().cloned().collect()
    }

    /// Close every registered connection.
    pub fn cleanup_connections(&self) {
        let drained: Vec<(String, SharedConnection)> = self.connections.write().drain().collect();
        let _enter = self.tokio_runtime.enter();
        for (name, conn) in drained {
            tracing::debug!(connection_name = %name, "Closing connection");
            self.manager.close(&mut *conn.lock());
        }
    }

    /// Run `f` on the named connection.
    pub fn with_connection<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Connection) -> AdapterResult<T>,
    ) -> AdapterResult<T> {
        let conn = self.acquire_connection(name);
        let _enter = self.tokio_runtime.enter();
        let mut guard = conn.lock();
        f(&mut *guard)
    }

    // ========== Statements and Metadata ==========

    /// Run one statement on the named connection.
    pub fn execute(
        &self,
        connection_name: &str,
        sql: &str,
        fetch: bool,
    ) -> AdapterResult<(AdapterResponse, QueryResult)> {
        self.with_connection(connection_name, |conn| self.manager.execute(conn, sql, fetch))
    }

    /// All schemas.
    pub fn list_schemas(&self) -> AdapterResult<Vec<String>> {
        self.with_connection("list_schemas", |conn| self.catalog.list_schemas(conn))
    }

    /// Check if a schema exists.
    pub fn check_schema_exists(&self, schema: &str) -> AdapterResult<bool> {
        self.with_connection("list_schemas", |conn| self.catalog.check_schema_exists(conn, schema))
    }

    /// Relations in a schema.
    pub fn list_relations(&self, schema: &str) -> AdapterResult<Vec<Relation>> {
        self.with_connection(&format!("list_{schema}"), |conn| {
            self.catalog.list_relations_without_caching(conn, schema)
        })
    }

    /// Columns of a relation.
    pub fn get_columns_in_relation(&self, relation: &Relation) -> AdapterResult<Vec<ColumnRecord>> {
        self.with_connection(&relation.render(), |conn| self.catalog.columns_in_relation(conn, relation))
    }

    /// Relation type, resolved on first access.
    pub fn relation_type(&self, relation: &Relation) -> AdapterResult<RelationType> {
        self.with_connection(&relation.render(), |conn| self.catalog.relation_type(conn, relation))
    }

    /// Catalog of every relation in `schemas`.
    ///
    /// Blocks the calling thread; must not be called from async code.
    pub fn get_catalog(&self, schemas: &[String]) -> Catalog {
        self.tokio_runtime.block_on(self.catalog.get_catalog(schemas))
    }

    // ========== Type Conversions ==========

    /// Column type for text seed columns.
    pub fn convert_text_type(&self) -> &'static str {
        "string"
    }

    /// Column type for numeric seed columns, by the largest decimal precision seen.
    pub fn convert_number_type(&self, max_precision: usize) -> &'static str {
        if max_precision > 0 {
            "real"
        } else {
            "integer"
        }
    }

    /// Column type for datetime seed columns.
    pub fn convert_datetime_type(&self) -> &'static str {
        "timestamp"
    }

    /// Column type for date seed columns.
    pub fn convert_date_type(&self) -> &'static str {
        "date"
    }

    /// Column type for time seed columns.
    pub fn convert_time_type(&self) -> &'static str {
        "time"
    }

    /// Current timestamp expression.
    pub fn date_function(&self) -> &'static str {
        "now()"
    }

    /// Identifiers are never quoted.
    pub fn quote<'a>(&self, identifier: &'a str) -> &'a str {
        identifier
    }
}

impl Drop for ImpalaAdapter {
    fn drop(&mut self) {
        self.cleanup_connections();
    }
}

impl std::fmt::Debug for ImpalaAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImpalaAdapter")
            .field("credentials", &self.credentials)
            .field("connections", &self.connection_names())
            .finish()
    }
}
