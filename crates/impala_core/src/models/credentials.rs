//! Impala target credentials.

use crate::error::{AdapterError, AdapterResult};
use crate::services::driver::{AuthMechanism, ConnectParams};

use serde::{Deserialize, Serialize};

/// Default coordinator host.
pub const DEFAULT_IMPALA_HOST: &str = "localhost";

/// Default HiveServer2 port of the Impala coordinator.
pub const DEFAULT_IMPALA_PORT: u16 = 21050;

/// Default number of connection attempts performed by the driver.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Authentication mode selected by the `auth_type` profile field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// No authentication (default)
    #[default]
    None,
    /// Username/password over LDAP
    Ldap,
    /// Kerberos (GSSAPI)
    Kerberos,
    /// Username/password without LDAP framing
    Plain,
}

impl AuthMode {
    /// Convert to string representation for logs and telemetry.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "insecure",
            Self::Ldap => "ldap",
            Self::Kerberos => "kerberos",
            Self::Plain => "plain",
        }
    }

    /// Parse from the profile value, case-insensitively.
    ///
    /// Unknown values fall back to no authentication.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "ldap" => Self::Ldap,
            "gssapi" | "kerberos" => Self::Kerberos,
            "plain" => Self::Plain,
            _ => Self::None,
        }
    }

    /// SASL mechanism handed to the driver.
    pub fn mechanism(&self) -> AuthMechanism {
        match self {
            Self::None => AuthMechanism::NoSasl,
            Self::Ldap => AuthMechanism::Ldap,
            Self::Kerberos => AuthMechanism::Gssapi,
            Self::Plain => AuthMechanism::Plain,
        }
    }
}

/// Validated connection settings for one Impala target.
///
/// Impala has no database level above schemas: `schema` is the only namespace
/// selector. A `database` value is tolerated only when it equals `schema`, and is
/// dropped after validation.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Coordinator hostname
    #[serde(default = "default_host")]
    pub host: String,
    /// Coordinator port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user
    #[serde(default, alias = "user")]
    pub username: Option<String>,
    /// Login password
    #[serde(default, alias = "pass")]
    pub password: Option<String>,
    /// Raw `auth_type` value; see [`Credentials::auth_mode`]
    #[serde(default)]
    pub auth_type: Option<String>,
    /// Kerberos service name, used with GSSAPI
    #[serde(default)]
    pub kerberos_service_name: Option<String>,
    /// Use HTTP transport
    #[serde(default = "default_true")]
    pub use_http_transport: bool,
    /// Use TLS
    #[serde(default = "default_true")]
    pub use_ssl: bool,
    /// HTTP path for proxied (Knox) deployments
    #[serde(default)]
    pub http_path: String,
    /// Connection attempts delegated to the driver
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Target schema
    #[serde(default)]
    pub schema: String,
    /// Always `None` once validated
    #[serde(default, alias = "dbname")]
    pub database: Option<String>,
    /// Whether anonymous usage events may be sent
    #[serde(default = "default_true")]
    pub usage_tracking: bool,
}

fn default_host() -> String {
    DEFAULT_IMPALA_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_IMPALA_PORT
}

fn default_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_true() -> bool {
    true
}

impl Credentials {
    /// Build validated credentials from the host's raw profile mapping.
    pub fn from_value(raw: serde_json::Value) -> AdapterResult<Self> {
        let credentials: Credentials = serde_json::from_value(raw)?;
        credentials.validated()
    }

    /// Create a builder.
    pub fn builder() -> CredentialsBuilder {
        CredentialsBuilder::default()
    }

    /// Validate and normalize.
    ///
    /// Collapses an agreeing `database` into `schema` by clearing it.
    pub fn validated(mut self) -> AdapterResult<Self> {
        if self.schema.is_empty() {
            return Err(AdapterError::configuration("schema is required"));
        }
        if self.host.is_empty() {
            return Err(AdapterError::configuration("host is required"));
        }
        if self.port == 0 {
            return Err(AdapterError::configuration("port must be between 1 and 65535"));
        }
        if let Some(database) = self.database.take() {
            if database != self.schema {
                return Err(AdapterError::configuration(format!(
                    "schema: {} database: {} On Impala, database must be omitted or have the \
                     same value as schema.",
                    self.schema, database
                )));
            }
        }
        Ok(self)
    }

    /// Adapter type name reported to the host.
    pub fn adapter_type(&self) -> &'static str {
        "impala"
    }

    /// Authentication mode derived from `auth_type`.
    pub fn auth_mode(&self) -> AuthMode {
        self.auth_type.as_deref().map(AuthMode::parse).unwrap_or_default()
    }

    /// Keys shown by connection diagnostics. Never includes the password.
    pub fn connection_keys(&self) -> &'static [&'static str] {
        &["host", "port", "schema", "username"]
    }

    /// Field used for anonymous adoption counting.
    pub fn unique_field(&self) -> &str {
        &self.host
    }

    /// Driver parameters for the selected authentication mode.
    ///
    /// Only LDAP and PLAIN carry user/password, only Kerberos carries the service
    /// name. Transport settings are shared by every mode.
    pub fn connect_params(&self) -> ConnectParams {
        let mode = self.auth_mode();
        let (user, password, kerberos_service_name) = match mode {
            AuthMode::Ldap | AuthMode::Plain => {
                (self.username.clone(), self.password.clone(), None)
            }
            AuthMode::Kerberos => (None, None, self.kerberos_service_name.clone()),
            AuthMode::None => (None, None, None),
        };

        ConnectParams {
            host: self.host.clone(),
            port: self.port,
            auth_mechanism: mode.mechanism(),
            user,
            password,
            kerberos_service_name,
            use_http_transport: self.use_http_transport,
            use_ssl: self.use_ssl,
            http_path: self.http_path.clone(),
            retries: self.retries,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("auth_type", &self.auth_type)
            .field("kerberos_service_name", &self.kerberos_service_name)
            .field("use_http_transport", &self.use_http_transport)
            .field("use_ssl", &self.use_ssl)
            .field("http_path", &self.http_path)
            .field("retries", &self.retries)
            .field("schema", &self.schema)
            .field("usage_tracking", &self.usage_tracking)
            .finish()
    }
}

/// Builder for Credentials.
#[derive(Debug, Default)]
pub struct CredentialsBuilder {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    auth_type: Option<String>,
    kerberos_service_name: Option<String>,
    use_http_transport: Option<bool>,
    use_ssl: Option<bool>,
    http_path: Option<String>,
    retries: Option<u32>,
    schema: Option<String>,
    database: Option<String>,
    usage_tracking: Option<bool>,
}

impl CredentialsBuilder {
    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the raw auth type.
    pub fn auth_type(mut self, auth_type: impl Into<String>) -> Self {
        self.auth_type = Some(auth_type.into());
        self
    }

    /// Set the Kerberos service name.
    pub fn kerberos_service_name(mut self, name: impl Into<String>) -> Self {
        self.kerberos_service_name = Some(name.into());
        self
    }

    /// Enable or disable HTTP transport.
    pub fn use_http_transport(mut self, enabled: bool) -> Self {
        self.use_http_transport = Some(enabled);
        self
    }

    /// Enable or disable TLS.
    pub fn use_ssl(mut self, enabled: bool) -> Self {
        self.use_ssl = Some(enabled);
        self
    }

    /// Set the HTTP path.
    pub fn http_path(mut self, path: impl Into<String>) -> Self {
        self.http_path = Some(path.into());
        self
    }

    /// Set the retry count.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Set the schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Set the database. Must match the schema.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Enable or disable usage tracking.
    pub fn usage_tracking(mut self, enabled: bool) -> Self {
        self.usage_tracking = Some(enabled);
        self
    }

    /// Build and validate the credentials.
    pub fn build(self) -> AdapterResult<Credentials> {
        Credentials {
            host: self.host.unwrap_or_else(default_host),
            port: self.port.unwrap_or(DEFAULT_IMPALA_PORT),
            username: self.username,
            password: self.password,
            auth_type: self.auth_type,
            kerberos_service_name: self.kerberos_service_name,
            use_http_transport: self.use_http_transport.unwrap_or(true),
            use_ssl: self.use_ssl.unwrap_or(true),
            http_path: self.http_path.unwrap_or_default(),
            retries: self.retries.unwrap_or(DEFAULT_MAX_RETRIES),
            schema: self.schema.ok_or_else(|| AdapterError::configuration("schema is required"))?,
            database: self.database,
            usage_tracking: self.usage_tracking.unwrap_or(true),
        }
        .validated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let creds = Credentials::from_value(json!({"schema": "analytics"})).unwrap();
        assert_eq!(creds.host, "localhost");
        assert_eq!(creds.port, 21050);
        assert_eq!(creds.retries, 3);
        assert!(creds.use_ssl);
        assert!(creds.use_http_transport);
        assert!(creds.usage_tracking);
        assert_eq!(creds.http_path, "");
        assert_eq!(creds.auth_mode(), AuthMode::None);
    }

    #[test]
    fn test_aliases() {
        let creds = Credentials::from_value(json!({
            "host": "impala.example.com",
            "user": "alice",
            "pass": "secret",
            "schema": "s",
            "dbname": "s",
        }))
        .unwrap();
        assert_eq!(creds.username.as_deref(), Some("alice"));
        assert_eq!(creds.password.as_deref(), Some("secret"));
        assert_eq!(creds.database, None);
    }

    #[test]
    fn test_database_contradicting_schema_is_rejected() {
        let err = Credentials::from_value(json!({"schema": "y", "database": "x"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.message().contains("schema: y"));
        assert!(err.message().contains("database: x"));
    }

    #[test]
    fn test_database_equal_to_schema_collapses() {
        let creds = Credentials::builder().schema("s").database("s").build().unwrap();
        assert_eq!(creds.schema, "s");
        assert_eq!(creds.database, None);
    }

    #[test]
    fn test_missing_schema_is_rejected() {
        let err = Credentials::from_value(json!({"host": "h"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = Credentials::builder().host("h").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_malformed_value_is_configuration_error() {
        let err = Credentials::from_value(json!({"schema": "s", "port": "not-a-port"}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_auth_mode_parse() {
        assert_eq!(AuthMode::parse("LDAP"), AuthMode::Ldap);
        assert_eq!(AuthMode::parse("ldap"), AuthMode::Ldap);
        assert_eq!(AuthMode::parse("GSSAPI"), AuthMode::Kerberos);
        assert_eq!(AuthMode::parse("Kerberos"), AuthMode::Kerberos);
        assert_eq!(AuthMode::parse("plain"), AuthMode::Plain);
        assert_eq!(AuthMode::parse("insecure"), AuthMode::None);
        assert_eq!(AuthMode::parse(""), AuthMode::None);
    }

    #[test]
    fn test_connect_params_per_mode() {
        let base = || {
            Credentials::builder()
                .host("impala")
                .username("alice")
                .password("pw")
                .kerberos_service_name("impala")
                .http_path("gateway/cdp-proxy-api/impala")
                .schema("s")
        };

        let ldap = base().auth_type("LDAP").build().unwrap().connect_params();
        assert_eq!(ldap.auth_mechanism, AuthMechanism::Ldap);
        assert_eq!(ldap.user.as_deref(), Some("alice"));
        assert_eq!(ldap.password.as_deref(), Some("pw"));
        assert_eq!(ldap.kerberos_service_name, None);
        assert_eq!(ldap.http_path, "gateway/cdp-proxy-api/impala");

        let krb = base().auth_type("gssapi").build().unwrap().connect_params();
        assert_eq!(krb.auth_mechanism, AuthMechanism::Gssapi);
        assert_eq!(krb.user, None);
        assert_eq!(krb.kerberos_service_name.as_deref(), Some("impala"));

        let plain = base().auth_type("PLAIN").build().unwrap().connect_params();
        assert_eq!(plain.auth_mechanism, AuthMechanism::Plain);
        assert_eq!(plain.user.as_deref(), Some("alice"));
        assert_eq!(plain.password.as_deref(), Some("pw"));
        assert_eq!(plain.kerberos_service_name, None);

        let none = base().build().unwrap().connect_params();
        assert_eq!(none.auth_mechanism, AuthMechanism::NoSasl);
        assert_eq!(none.password, None);
        assert_eq!(none.retries, 3);
        assert!(none.use_ssl);
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::builder().password("hunter2").schema("s").build().unwrap();
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!creds.connection_keys().contains(&"password"));
    }
}
