//! Data models for the Impala adapter.
//!
//! - `credentials` - Credentials, AuthMode
//! - `connection` - Connection, ConnectionState
//! - `query` - AdapterResponse, QueryResult, SQL log helpers
//! - `relation` - Relation, RelationType
//! - `column` - ColumnRecord, TableStats

pub mod column;
pub mod connection;
pub mod credentials;
pub mod query;
pub mod relation;

pub use column::{ColumnRecord, StatEntry, TableStats};
pub use connection::{Connection, ConnectionState, UNKNOWN_ENGINE_VERSION};
pub use credentials::{AuthMode, Credentials, CredentialsBuilder};
pub use query::{AdapterResponse, QueryResult};
pub use relation::{Relation, RelationType};
