//! Backend services for the Impala adapter.
//!
//! - `driver` - Engine driver boundary (connect, cursor, errors)
//! - `session` - Session wrapper around a driver handle
//! - `connection` - Connection lifecycle and statement execution
//! - `metadata` - Parsing of `describe` output and cached table information
//! - `catalog` - Schema and relation introspection, catalog generation
//! - `events` - Lifecycle events reported to the host
//! - `telemetry` - Anonymous usage telemetry

pub mod catalog;
pub mod connection;
pub mod driver;
pub mod events;
pub mod metadata;
pub mod session;
pub mod telemetry;

pub use catalog::{Catalog, CatalogRow, CatalogService, CatalogType};
pub use connection::ConnectionManager;
pub use driver::{Driver, DriverCursor, DriverError, DriverHandle};
pub use events::{fire_event, AdapterEvent, EventSink, TracingEventSink};
pub use metadata::{DescribeRow, MetadataParser};
pub use session::Session;
pub use telemetry::{HttpTelemetrySink, NoopTelemetrySink, TelemetryContext, TelemetrySink};
