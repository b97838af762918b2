//! Core of the Impala adapter for SQL transformation tools.
//!
//! This crate connects a host framework to Apache Impala through an engine driver:
//!
//! - **error**: Error taxonomy and driver error classification
//! - **models**: Credentials, connections, relations, columns, query results
//! - **services**: Session wrapper, connection manager, metadata parsing, catalog,
//!   lifecycle events, usage telemetry
//! - **adapter**: Adapter facade and connection registry
//! - **logging**: Structured logging setup

pub mod adapter;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

#[cfg(test)]
mod testing;

pub use adapter::{ImpalaAdapter, SharedConnection};
pub use error::{AdapterError, AdapterResult, ErrorInfo, ErrorKind};
pub use models::{
    AdapterResponse, AuthMode, ColumnRecord, Connection, ConnectionState, Credentials,
    CredentialsBuilder, QueryResult, Relation, RelationType, StatEntry, TableStats,
};
pub use services::{
    Catalog, CatalogRow, CatalogService, CatalogType, ConnectionManager, DescribeRow, Driver,
    DriverCursor, DriverError, DriverHandle, EventSink, MetadataParser, Session,
    TelemetryContext, TelemetrySink,
};
