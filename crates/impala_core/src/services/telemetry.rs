//! Anonymous usage telemetry.
//!
//! Fire-and-forget: every event is sent on a detached task, callers never wait for
//! it and never see its outcome. The first failure of any kind disables telemetry
//! for the rest of the process.

use crate::models::Credentials;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Environment variable holding the collector endpoint.
pub const ENDPOINT_ENV: &str = "SNOWPLOW_ENDPOINT";
/// Environment variable holding the request timeout in seconds.
pub const TIMEOUT_ENV: &str = "SNOWPLOW_TIMEOUT";
/// Environment variable holding the collector API key.
pub const API_KEY_ENV: &str = "SNOWPLOW_API_KEY";
/// Environment variable holding the collector environment name.
pub const ENVIRONMENT_ENV: &str = "SNOWPLOW_ENV";

/// Telemetry failures. Never surfaced to adapter callers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Sink configuration missing or invalid.
    #[error("telemetry is not configured: {0}")]
    NotConfigured(String),

    /// Transport failure.
    #[error("telemetry request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Runtime could not be created.
    #[error("telemetry runtime unavailable: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Destination of telemetry events.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Deliver one event.
    async fn send(&self, event: serde_json::Value) -> Result<(), TelemetryError>;

    /// Sink name for logging.
    fn name(&self) -> &'static str;
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetrySink;

#[async_trait]
impl TelemetrySink for NoopTelemetrySink {
    async fn send(&self, _event: serde_json::Value) -> Result<(), TelemetryError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Collector settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSinkConfig {
    /// Collector URL
    pub endpoint: String,
    /// Request timeout
    pub timeout: Duration,
    /// API key header value
    pub api_key: String,
    /// Environment header value
    pub environment: String,
}

impl HttpSinkConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, TelemetryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TelemetryError> {
        let require = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| TelemetryError::NotConfigured(format!("{key} is not set")))
        };

        let timeout_secs = require(TIMEOUT_ENV)?.trim().parse::<u64>().map_err(|e| {
            TelemetryError::NotConfigured(format!("{TIMEOUT_ENV} is not a number: {e}"))
        })?;

        Ok(Self {
            endpoint: require(ENDPOINT_ENV)?,
            timeout: Duration::from_secs(timeout_secs),
            api_key: require(API_KEY_ENV)?,
            environment: require(ENVIRONMENT_ENV)?,
        })
    }
}

/// Sink that POSTs events to an HTTP collector.
///
/// Configuration is read from the environment on first send.
#[derive(Default)]
pub struct HttpTelemetrySink {
    client: OnceCell<Option<(reqwest::Client, HttpSinkConfig)>>,
}

impl HttpTelemetrySink {
    /// Create a sink that reads its configuration lazily.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink with explicit configuration.
    pub fn with_config(config: HttpSinkConfig) -> Self {
        let client = OnceCell::new();
        let _ = client.set(Self::build_client(config).ok());
        Self { client }
    }

    fn build_client(
        config: HttpSinkConfig,
    ) -> Result<(reqwest::Client, HttpSinkConfig), TelemetryError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok((client, config))
    }

    fn client(&self) -> Option<&(reqwest::Client, HttpSinkConfig)> {
        self.client
            .get_or_init(|| {
                HttpSinkConfig::from_env()
                    .and_then(Self::build_client)
                    .map_err(|e| tracing::debug!(error = %e, "Error reading tracking config"))
                    .ok()
            })
            .as_ref()
    }
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn send(&self, event: serde_json::Value) -> Result<(), TelemetryError> {
        let Some((client, config)) = self.client() else {
            return Err(TelemetryError::NotConfigured("collector settings missing".into()));
        };

        let body = serde_json::Value::Array(vec![event]).to_string();
        tracing::trace!(body = %body, "Sending telemetry event");

        let response = client
            .post(&config.endpoint)
            .header("x-api-key", &config.api_key)
            .header("x-datacoral-environment", &config.environment)
            .header("x-datacoral-passthrough", "true")
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?;

        tracing::trace!(status = response.status().as_u16(), "Telemetry event delivered");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Hex-encoded SHA-256 of the given parts, concatenated.
pub fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Process-wide telemetry state.
///
/// Platform descriptors and anonymous ids are fixed at construction. The enable
/// flag only ever goes from on to off.
pub struct TelemetryContext {
    /// Cleared on the first failure
    enabled: Arc<AtomicBool>,
    /// OS and adapter descriptors merged into every event
    platform: serde_json::Map<String, serde_json::Value>,
    /// Hashed host/user/session ids merged into every event
    unique_ids: serde_json::Map<String, serde_json::Value>,
    /// Event destination
    sink: Arc<dyn TelemetrySink>,
    /// Runtime for callers outside of any tokio runtime, created on first use
    runtime: OnceCell<tokio::runtime::Runtime>,
}

impl TelemetryContext {
    /// Initialize telemetry for a target.
    ///
    /// Enabled according to the target's `usage_tracking` flag.
    pub fn from_credentials(credentials: &Credentials, sink: Arc<dyn TelemetrySink>) -> Self {
        Self::with_invocation_id(credentials, sink, Uuid::new_v4())
    }

    /// Initialize telemetry with the host's invocation id.
    pub fn with_invocation_id(
        credentials: &Credentials,
        sink: Arc<dyn TelemetrySink>,
        invocation_id: Uuid,
    ) -> Self {
        let host = credentials.host.as_str();
        let user = credentials.username.as_deref().unwrap_or("None");
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
            .to_string();

        let mut unique_ids = serde_json::Map::new();
        unique_ids.insert("unique_host_hash".into(), hash_parts(&[host]).into());
        unique_ids.insert("unique_user_hash".into(), hash_parts(&[user]).into());
        unique_ids.insert(
            "unique_session_hash".into(),
            hash_parts(&[host, user, timestamp.as_str()]).into(),
        );
        unique_ids.insert("id".into(), invocation_id.to_string().into());

        let context = Self {
            enabled: Arc::new(AtomicBool::new(credentials.usage_tracking)),
            platform: platform_info(credentials),
            unique_ids,
            sink,
            runtime: OnceCell::new(),
        };

        tracing::debug!(
            enabled = context.is_enabled(),
            sink = context.sink.name(),
            platform = %serde_json::Value::Object(context.platform.clone()),
            "Telemetry initialized"
        );
        context
    }

    /// A context that never sends anything.
    pub fn disabled() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(false)),
            platform: serde_json::Map::new(),
            unique_ids: serde_json::Map::new(),
            sink: Arc::new(NoopTelemetrySink),
            runtime: OnceCell::new(),
        }
    }

    /// Check if events are still being sent.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Stop sending events for the rest of the process.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Platform descriptors.
    pub fn platform(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.platform
    }

    /// Anonymous ids.
    pub fn unique_ids(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.unique_ids
    }

    /// Merge static keys into `payload` and send it in the background.
    ///
    /// Returns immediately. Never fails.
    pub fn track(&self, mut payload: serde_json::Map<String, serde_json::Value>) {
        if !self.is_enabled() {
            tracing::trace!("Usage tracking disabled, dropping event");
            return;
        }

        for (key, value) in self.platform.iter().chain(self.unique_ids.iter()) {
            payload.insert(key.clone(), value.clone());
        }
        let event = serde_json::json!({ "data": payload });

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => match self.runtime.get_or_try_init(build_runtime) {
                Ok(runtime) => runtime.handle().clone(),
                Err(e) => {
                    tracing::debug!(error = %e, "Disabling usage tracking due to error");
                    self.disable();
                    return;
                }
            },
        };

        let sink = Arc::clone(&self.sink);
        let enabled = Arc::clone(&self.enabled);
        handle.spawn(async move {
            if let Err(e) = sink.send(event).await {
                tracing::debug!(error = %e, "Usage tracking error, disabling usage tracking");
                enabled.store(false, Ordering::Release);
            }
        });
    }
}

impl Drop for TelemetryContext {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for TelemetryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryContext")
            .field("enabled", &self.is_enabled())
            .field("sink", &self.sink.name())
            .finish()
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime, TelemetryError> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("impala-telemetry")
        .enable_all()
        .build()?)
}

fn platform_info(credentials: &Credentials) -> serde_json::Map<String, serde_json::Value> {
    let mut info = serde_json::Map::new();
    info.insert("system".into(), std::env::consts::OS.into());
    info.insert("machine".into(), std::env::consts::ARCH.into());
    info.insert("platform".into(), std::env::consts::FAMILY.into());
    info.insert(
        "adapter".into(),
        format!("{}-{}", credentials.adapter_type(), env!("CARGO_PKG_VERSION")).into(),
    );
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ChannelTelemetry, FailingTelemetry};

    fn credentials(usage_tracking: bool) -> Credentials {
        Credentials::builder()
            .host("impala.example.com")
            .username("alice")
            .schema("s")
            .usage_tracking(usage_tracking)
            .build()
            .unwrap()
    }

    fn payload() -> serde_json::Map<String, serde_json::Value> {
        let mut payload = serde_json::Map::new();
        payload.insert("id".into(), "impala_adapter_open".into());
        payload.insert("auth".into(), "ldap".into());
        payload
    }

    #[tokio::test]
    async fn test_track_merges_static_keys() {
        let (sink, mut rx) = ChannelTelemetry::new();
        let context = TelemetryContext::from_credentials(&credentials(true), Arc::new(sink));

        context.track(payload());

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        let data = &event["data"];
        assert_eq!(data["auth"], "ldap");
        assert_eq!(data["system"], std::env::consts::OS);
        assert_eq!(data["unique_host_hash"], hash_parts(&["impala.example.com"]));
        assert!(data["adapter"].as_str().unwrap().starts_with("impala-"));
        // Static ids override payload keys of the same name.
        assert_ne!(data["id"], "impala_adapter_open");
    }

    #[tokio::test]
    async fn test_failure_disables_tracking() {
        let context = TelemetryContext::from_credentials(&credentials(true), Arc::new(FailingTelemetry));
        assert!(context.is_enabled());

        context.track(payload());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while context.is_enabled() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!context.is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_context_sends_nothing() {
        let (sink, mut rx) = ChannelTelemetry::new();
        let context = TelemetryContext::from_credentials(&credentials(false), Arc::new(sink));

        context.track(payload());
        drop(context);

        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_track_outside_runtime_uses_own_runtime() {
        let (sink, mut rx) = ChannelTelemetry::new();
        let context = TelemetryContext::from_credentials(&credentials(true), Arc::new(sink));

        context.track(payload());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut received = None;
        while received.is_none() && std::time::Instant::now() < deadline {
            received = rx.try_recv().ok();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(received.is_some());
    }

    #[test]
    fn test_http_config_requires_all_settings() {
        let full = |key: &str| match key {
            ENDPOINT_ENV => Some("https://collector.example.com/events".to_string()),
            TIMEOUT_ENV => Some("10".to_string()),
            API_KEY_ENV => Some("key".to_string()),
            ENVIRONMENT_ENV => Some("prod".to_string()),
            _ => None,
        };
        let config = HttpSinkConfig::from_lookup(full).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(10));

        let missing = HttpSinkConfig::from_lookup(|key| if key == API_KEY_ENV { None } else { full(key) });
        assert!(matches!(missing, Err(TelemetryError::NotConfigured(_))));

        let bad_timeout =
            HttpSinkConfig::from_lookup(|key| if key == TIMEOUT_ENV { Some("ten".into()) } else { full(key) });
        assert!(matches!(bad_timeout, Err(TelemetryError::NotConfigured(_))));
    }

    #[test]
    fn test_hash_parts_is_stable() {
        assert_eq!(hash_parts(&["a", "b"]), hash_parts(&["ab"]));
        assert_eq!(hash_parts(&["x"]).len(), 64);
    }
}
