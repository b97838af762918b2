//! Boundary to the Impala client driver.
//!
//! The driver itself (HiveServer2 over binary or HTTP transport) is supplied by the
//! host. It only has to implement these three traits; everything above this module
//! works against them and never sees driver-specific types.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// SASL mechanism requested from the driver when opening a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMechanism {
    /// No authentication
    NoSasl,
    /// Username/password validated against LDAP
    Ldap,
    /// Kerberos service principal
    Gssapi,
    /// Username/password without LDAP framing
    Plain,
}

impl AuthMechanism {
    /// Name understood by HiveServer2 drivers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSasl => "NOSASL",
            Self::Ldap => "LDAP",
            Self::Gssapi => "GSSAPI",
            Self::Plain => "PLAIN",
        }
    }
}

/// Everything the driver needs to open a handle.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// Coordinator hostname
    pub host: String,
    /// Coordinator port
    pub port: u16,
    /// SASL mechanism
    pub auth_mechanism: AuthMechanism,
    /// Login user (LDAP and PLAIN)
    pub user: Option<String>,
    /// Login password (LDAP and PLAIN)
    pub password: Option<String>,
    /// Kerberos service name (GSSAPI)
    pub kerberos_service_name: Option<String>,
    /// Use HTTP transport instead of binary Thrift
    pub use_http_transport: bool,
    /// Use TLS
    pub use_ssl: bool,
    /// HTTP path, used when a proxy such as Knox sits in front of the coordinator
    pub http_path: String,
    /// Connection attempts performed by the driver before giving up
    pub retries: u32,
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth_mechanism", &self.auth_mechanism)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("kerberos_service_name", &self.kerberos_service_name)
            .field("use_http_transport", &self.use_http_transport)
            .field("use_ssl", &self.use_ssl)
            .field("http_path", &self.http_path)
            .field("retries", &self.retries)
            .finish()
    }
}

/// Parameter substitution convention passed to the driver on execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamStyle {
    /// `%s` placeholders; required for datetime bindings to be quoted correctly
    #[default]
    Format,
    /// `?` placeholders
    Qmark,
    /// `:name` placeholders
    Named,
}

/// Per-statement driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecuteOptions {
    /// Binding style override
    pub paramstyle: ParamStyle,
}

/// A value bound into a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

/// Column description reported by a cursor after execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    /// Column label
    pub name: String,
    /// Engine type name (e.g. "STRING", "INT")
    pub type_name: String,
}

/// One result row. Values keep the driver's JSON-compatible representation.
pub type Row = Vec<serde_json::Value>;

/// Failures reported by the driver.
///
/// Mirrors the HiveServer2 client error hierarchy closely enough for the adapter
/// to classify every failure (see `AdapterError::from`).
#[derive(Debug, Error)]
pub enum DriverError {
    /// HTTP transport rejected the request (typically 401/403 from a proxy)
    #[error("HTTP {code}: {message}")]
    Http {
        /// HTTP status code
        code: u16,
        /// Reason or body text
        message: String,
    },

    /// Server-side session negotiation failed
    #[error("HiveServer2 error: {0}")]
    HiveServer2(String),

    /// Thrift RPC failure
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The engine rejected the statement
    #[error("{0}")]
    Database(String),

    /// Operational failure reported by the engine (missing object, cancelled query)
    #[error("{0}")]
    Operational(String),

    /// Malformed SQL or wrong number of bindings
    #[error("{0}")]
    Programming(String),

    /// Feature not supported by the engine
    #[error("{0}")]
    NotSupported(String),

    /// Misuse of the driver interface
    #[error("Interface error: {0}")]
    Interface(String),

    /// Socket-level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything the driver could not categorise
    #[error("{0}")]
    Other(String),
}

/// Opens handles.
pub trait Driver: Send + Sync {
    /// Connect, performing up to `params.retries` attempts internally.
    fn connect(&self, params: &ConnectParams) -> Result<Box<dyn DriverHandle>, DriverError>;
}

/// A live connection handle.
pub trait DriverHandle: Send {
    /// Create a new cursor on this handle.
    fn cursor(&mut self) -> Result<Box<dyn DriverCursor>, DriverError>;

    /// Close the handle.
    fn close(&mut self) -> Result<(), DriverError>;
}

/// A statement cursor.
pub trait DriverCursor: Send {
    /// Execute one statement.
    fn execute(
        &mut self,
        sql: &str,
        bindings: Option<&[Binding]>,
        options: &ExecuteOptions,
    ) -> Result<(), DriverError>;

    /// Fetch all remaining rows.
    fn fetch_all(&mut self) -> Result<Vec<Row>, DriverError>;

    /// Fetch the next row, if any.
    fn fetch_one(&mut self) -> Result<Option<Row>, DriverError>;

    /// Columns of the last result set, `None` for statements without one.
    fn description(&self) -> Option<Vec<ColumnDescription>>;

    /// Ask the engine to cancel the running operation.
    fn cancel(&mut self) -> Result<(), DriverError>;

    /// Close the cursor.
    fn close(&mut self) -> Result<(), DriverError>;
}
