//! Session wrapper around a driver handle.
//!
//! Gives the connection manager one stable cursor interface regardless of the
//! driver behind it. Driver errors pass through unmodified; classification happens
//! one layer up.

use crate::services::driver::{
    Binding, ColumnDescription, DriverCursor, DriverError, DriverHandle, ExecuteOptions, Row,
};

use uuid::Uuid;

/// Owns a driver handle and at most one live cursor.
pub struct Session {
    /// Stable identifier for logs and identity checks
    id: Uuid,
    /// Underlying driver handle
    handle: Box<dyn DriverHandle>,
    /// Lazily created cursor
    cursor: Option<Box<dyn DriverCursor>>,
}

impl Session {
    /// Wrap a freshly opened driver handle.
    pub fn new(handle: Box<dyn DriverHandle>) -> Self {
        Self { id: Uuid::new_v4(), handle, cursor: None }
    }

    /// Get the session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether a cursor is currently live.
    pub fn has_cursor(&self) -> bool {
        self.cursor.is_some()
    }

    /// Return this session as a cursor handle, creating the driver cursor on first use.
    ///
    /// Idempotent: an existing cursor is reused.
    pub fn cursor(&mut self) -> Result<&mut Self, DriverError> {
        self.live_cursor()?;
        Ok(self)
    }

    fn live_cursor(&mut self) -> Result<&mut Box<dyn DriverCursor>, DriverError> {
        let cursor = match self.cursor.take() {
            Some(cursor) => cursor,
            None => {
                tracing::trace!(session_id = %self.id, "Creating cursor");
                self.handle.cursor()?
            }
        };
        Ok(self.cursor.insert(cursor))
    }

    /// Execute a statement on the cursor.
    pub fn execute(
        &mut self,
        sql: &str,
        bindings: Option<&[Binding]>,
        options: &ExecuteOptions,
    ) -> Result<(), DriverError> {
        self.live_cursor()?.execute(sql, bindings, options)
    }

    /// Fetch all remaining rows of the last result set.
    pub fn fetch_all(&mut self) -> Result<Vec<Row>, DriverError> {
        self.live_cursor()?.fetch_all()
    }

    /// Fetch the next row of the last result set.
    pub fn fetch_one(&mut self) -> Result<Option<Row>, DriverError> {
        self.live_cursor()?.fetch_one()
    }

    /// Columns of the last result set.
    pub fn description(&self) -> Option<Vec<ColumnDescription>> {
        self.cursor.as_ref().and_then(|cursor| cursor.description())
    }

    /// Request cancellation of the running statement.
    ///
    /// Advisory only; failures are logged and swallowed.
    pub fn cancel(&mut self) {
        let Some(cursor) = self.cursor.as_mut() else {
            tracing::debug!(session_id = %self.id, "No cursor to cancel");
            return;
        };
        if let Err(e) = cursor.cancel() {
            tracing::warn!(session_id = %self.id, error = %e, "Failed to cancel statement");
        }
    }

    /// Close the cursor, keeping the handle open.
    ///
    /// A later `cursor()` call creates a fresh cursor. Failures are logged and
    /// swallowed.
    pub fn close(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            if let Err(e) = cursor.close() {
                tracing::warn!(session_id = %self.id, error = %e, "Failed to close cursor");
            }
        }
    }

    /// Close the cursor and then the handle. The session is unusable afterwards.
    pub(crate) fn shutdown(&mut self) {
        self.close();
        if let Err(e) = self.handle.close() {
            tracing::warn!(session_id = %self.id, error = %e, "Failed to close handle");
        }
    }

    /// Impala only runs auto-committed statements, so there is nothing to roll back.
    pub fn rollback(&mut self) {
        tracing::debug!(session_id = %self.id, "Rollback is a no-op on Impala");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("has_cursor", &self.cursor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEngine, Script};

    #[test]
    fn test_cursor_is_lazy_and_idempotent() {
        let engine = FakeEngine::new(Script::default());
        let mut session = Session::new(engine.handle());

        assert!(!session.has_cursor());
        session.cursor().unwrap();
        session.cursor().unwrap();
        assert!(session.has_cursor());
        assert_eq!(engine.stats().cursors_created, 1);
    }

    #[test]
    fn test_execute_passes_driver_errors_through() {
        let engine = FakeEngine::new(Script::default().fail_on(
            "select broken",
            || DriverError::Database("AnalysisException: broken".to_string()),
        ));
        let mut session = Session::new(engine.handle());

        let err = session
            .execute("select broken", None, &ExecuteOptions::default())
            .unwrap_err();
        assert!(matches!(err, DriverError::Database(_)));
    }

    #[test]
    fn test_close_resets_cursor_and_swallows_errors() {
        let engine = FakeEngine::new(Script::default().failing_close());
        let mut session = Session::new(engine.handle());
        session.cursor().unwrap();

        session.close();
        assert!(!session.has_cursor());
        assert_eq!(engine.stats().handles_closed, 0);

        session.cursor().unwrap();
        assert_eq!(engine.stats().cursors_created, 2);
    }

    #[test]
    fn test_shutdown_closes_handle() {
        let engine = FakeEngine::new(Script::default());
        let mut session = Session::new(engine.handle());
        session.cursor().unwrap();

        session.shutdown();

        assert!(!session.has_cursor());
        assert_eq!(engine.stats().handles_closed, 1);
        assert!(matches!(session.cursor().unwrap_err(), DriverError::Interface(_)));
    }

    #[test]
    fn test_cancel_is_best_effort() {
        let engine = FakeEngine::new(Script::default().failing_cancel());
        let mut session = Session::new(engine.handle());

        // No cursor yet: nothing to do.
        session.cancel();

        session.cursor().unwrap();
        session.cancel();
        assert_eq!(engine.stats().cancels, 1);
    }

    #[test]
    fn test_rollback_is_noop() {
        let engine = FakeEngine::new(Script::default());
        let mut session = Session::new(engine.handle());
        session.rollback();
        assert!(engine.executed().is_empty());
    }
}
