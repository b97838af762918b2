//! Scripted in-memory driver used by the unit tests.

use crate::services::driver::{
    Binding, ColumnDescription, ConnectParams, Driver, DriverCursor, DriverError, DriverHandle,
    ExecuteOptions, Row,
};
use crate::services::events::{AdapterEvent, EventSink, SinkError};
use crate::services::telemetry::{TelemetryError, TelemetrySink};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

type ErrorFactory = Arc<dyn Fn() -> DriverError + Send + Sync>;

/// Canned answers keyed by a SQL fragment.
#[derive(Clone, Default)]
pub(crate) struct Script {
    connect_error: Option<ErrorFactory>,
    cursor_error: Option<ErrorFactory>,
    failures: Vec<(String, ErrorFactory)>,
    results: Vec<(String, Vec<ColumnDescription>, Vec<Row>)>,
    failing_close: bool,
    failing_cancel: bool,
}

impl Script {
    /// Every connect attempt fails with the given error.
    pub fn connect_error(
        mut self,
        error: impl Fn() -> DriverError + Send + Sync + 'static,
    ) -> Self {
        self.connect_error = Some(Arc::new(error));
        self
    }

    /// Every cursor creation fails with the given error.
    pub fn cursor_error(
        mut self,
        error: impl Fn() -> DriverError + Send + Sync + 'static,
    ) -> Self {
        self.cursor_error = Some(Arc::new(error));
        self
    }

    /// Statements containing `fragment` fail with the given error.
    pub fn fail_on(
        mut self,
        fragment: &str,
        error: impl Fn() -> DriverError + Send + Sync + 'static,
    ) -> Self {
        self.failures.push((fragment.to_string(), Arc::new(error)));
        self
    }

    /// Statements containing `fragment` return the given result set.
    pub fn result(mut self, fragment: &str, columns: &[&str], rows: Vec<Row>) -> Self {
        let description = columns
            .iter()
            .map(|name| ColumnDescription { name: name.to_string(), type_name: "STRING".into() })
            .collect();
        self.results.push((fragment.to_string(), description, rows));
        self
    }

    /// Cursor and handle close calls fail.
    pub fn failing_close(mut self) -> Self {
        self.failing_close = true;
        self
    }

    /// Cursor cancel calls fail.
    pub fn failing_cancel(mut self) -> Self {
        self.failing_cancel = true;
        self
    }
}

/// Counters observed by tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Stats {
    pub connects: usize,
    pub cursors_created: usize,
    pub cancels: usize,
    pub handles_closed: usize,
}

#[derive(Default)]
struct Recorded {
    stats: Stats,
    executed: Vec<String>,
    options: Vec<ExecuteOptions>,
    connect_params: Vec<ConnectParams>,
}

/// A fake Impala coordinator.
#[derive(Clone)]
pub(crate) struct FakeEngine {
    script: Arc<Script>,
    recorded: Arc<Mutex<Recorded>>,
}

impl FakeEngine {
    pub fn new(script: Script) -> Self {
        Self { script: Arc::new(script), recorded: Arc::new(Mutex::new(Recorded::default())) }
    }

    /// A handle that bypasses `connect`.
    pub fn handle(&self) -> Box<dyn DriverHandle> {
        Box::new(FakeHandle { engine: self.clone(), closed: false })
    }

    pub fn stats(&self) -> Stats {
        self.recorded.lock().stats.clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.recorded.lock().executed.clone()
    }

    pub fn options(&self) -> Vec<ExecuteOptions> {
        self.recorded.lock().options.clone()
    }

    pub fn connect_params(&self) -> Vec<ConnectParams> {
        self.recorded.lock().connect_params.clone()
    }
}

impl Driver for FakeEngine {
    fn connect(&self, params: &ConnectParams) -> Result<Box<dyn DriverHandle>, DriverError> {
        {
            let mut recorded = self.recorded.lock();
            recorded.stats.connects += 1;
            recorded.connect_params.push(params.clone());
        }
        match &self.script.connect_error {
            Some(error) => Err(error()),
            None => Ok(self.handle()),
        }
    }
}

struct FakeHandle {
    engine: FakeEngine,
    closed: bool,
}

impl DriverHandle for FakeHandle {
    fn cursor(&mut self) -> Result<Box<dyn DriverCursor>, DriverError> {
        if self.closed {
            return Err(DriverError::Interface("handle is closed".into()));
        }
        if let Some(error) = &self.engine.script.cursor_error {
            return Err(error());
        }
        self.engine.recorded.lock().stats.cursors_created += 1;
        Ok(Box::new(FakeCursor { engine: self.engine.clone(), current: None, position: 0 }))
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.closed = true;
        self.engine.recorded.lock().stats.handles_closed += 1;
        if self.engine.script.failing_close {
            return Err(DriverError::Io(std::io::Error::other("socket already closed")));
        }
        Ok(())
    }
}

struct FakeCursor {
    engine: FakeEngine,
    current: Option<(Vec<ColumnDescription>, Vec<Row>)>,
    position: usize,
}

impl DriverCursor for FakeCursor {
    fn execute(
        &mut self,
        sql: &str,
        _bindings: Option<&[Binding]>,
        options: &ExecuteOptions,
    ) -> Result<(), DriverError> {
        {
            let mut recorded = self.engine.recorded.lock();
            recorded.executed.push(sql.to_string());
            recorded.options.push(*options);
        }

        let script = &self.engine.script;
        if let Some((_, error)) = script.failures.iter().find(|(frag, _)| sql.contains(frag)) {
            return Err(error());
        }

        self.position = 0;
        self.current = script
            .results
            .iter()
            .find(|(frag, _, _)| sql.contains(frag))
            .map(|(_, description, rows)| (description.clone(), rows.clone()));
        Ok(())
    }

    fn fetch_all(&mut self) -> Result<Vec<Row>, DriverError> {
        let rows = match &self.current {
            Some((_, rows)) => rows[self.position.min(rows.len())..].to_vec(),
            None => Vec::new(),
        };
        self.position += rows.len();
        Ok(rows)
    }

    fn fetch_one(&mut self) -> Result<Option<Row>, DriverError> {
        let row = self.current.as_ref().and_then(|(_, rows)| rows.get(self.position).cloned());
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }

    fn description(&self) -> Option<Vec<ColumnDescription>> {
        self.current.as_ref().map(|(description, _)| description.clone())
    }

    fn cancel(&mut self) -> Result<(), DriverError> {
        self.engine.recorded.lock().stats.cancels += 1;
        if self.engine.script.failing_cancel {
            return Err(DriverError::Io(std::io::Error::other("cancel not delivered")));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if self.engine.script.failing_close {
            return Err(DriverError::Io(std::io::Error::other("cursor already closed")));
        }
        Ok(())
    }
}

/// Event sink that keeps everything it receives.
#[derive(Default)]
pub(crate) struct RecordingEvents(Mutex<Vec<AdapterEvent>>);

impl RecordingEvents {
    pub fn events(&self) -> Vec<AdapterEvent> {
        self.0.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.lock().iter().map(AdapterEvent::name).collect()
    }
}

impl EventSink for RecordingEvents {
    fn emit(&self, event: &AdapterEvent) -> Result<(), SinkError> {
        self.0.lock().push(event.clone());
        Ok(())
    }
}

/// Event sink that rejects every event.
pub(crate) struct FailingEvents;

impl EventSink for FailingEvents {
    fn emit(&self, _event: &AdapterEvent) -> Result<(), SinkError> {
        Err("event sink offline".into())
    }
}

/// Telemetry sink that forwards events to a channel.
pub(crate) struct ChannelTelemetry(mpsc::UnboundedSender<serde_json::Value>);

impl ChannelTelemetry {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<serde_json::Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

#[async_trait]
impl TelemetrySink for ChannelTelemetry {
    async fn send(&self, event: serde_json::Value) -> Result<(), TelemetryError> {
        let _ = self.0.send(event);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Telemetry sink that always fails.
pub(crate) struct FailingTelemetry;

#[async_trait]
impl TelemetrySink for FailingTelemetry {
    async fn send(&self, _event: serde_json::Value) -> Result<(), TelemetryError> {
        Err(TelemetryError::NotConfigured("collector unreachable".into()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}
