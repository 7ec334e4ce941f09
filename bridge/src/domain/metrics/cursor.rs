//! Cursor manager
//!
//! Owns the group cursor for one drain cycle and recovers from cursor errors
//! (expired or invalid cursors). States:
//!
//! ```text
//! Uninitialized -> Active -> (Expired -> Recreating -> Active)* -> Terminal
//! ```
//!
//! Recovery rules:
//! - Opening: a cursor error falls back once to the alternate origin.
//! - A cursor error before any fetch succeeded: one create with the
//!   alternate of the origin the cursor was actually opened with, then give up.
//! - A cursor error after data was read: recreate with the configured origin,
//!   with the same one-time fallback, as often as needed. A failed create
//!   ends the drain.
//!
//! Non-cursor errors are never retried here. Replaced and finished cursors
//! are released back to the source.

use std::sync::Arc;
use std::time::Duration;

use crate::data::stream::{CursorOrigin, CursorRequest, StreamCursor, StreamError, StreamSource};

/// Fixed consumer identity used for every cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerIdentity {
    pub group: String,
    pub instance: String,
    pub read_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Uninitialized,
    Active,
    Expired,
    Recreating,
    Terminal,
}

pub struct CursorManager {
    source: Arc<dyn StreamSource>,
    identity: ConsumerIdentity,
    origin: CursorOrigin,
    opened_origin: CursorOrigin,
    state: CursorState,
    cursor: Option<StreamCursor>,
    fetched_any: bool,
    consecutive_errors: u32,
}

impl CursorManager {
    pub fn new(
        source: Arc<dyn StreamSource>,
        identity: ConsumerIdentity,
        origin: CursorOrigin,
    ) -> Self {
        Self {
            source,
            identity,
            origin,
            opened_origin: origin,
            state: CursorState::Uninitialized,
            cursor: None,
            fetched_any: false,
            consecutive_errors: 0,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Cursor for the next fetch, if one is active
    pub fn current(&self) -> Option<&StreamCursor> {
        match self.state {
            CursorState::Active => self.cursor.as_ref(),
            _ => None,
        }
    }

    /// Create the first cursor for this cycle
    pub async fn open(&mut self) -> Result<StreamCursor, StreamError> {
        let result = self.create_with_fallback(self.origin).await;
        let cursor = self.settle(result)?;
        self.opened_origin = cursor.origin;
        Ok(cursor)
    }

    /// Record a successful fetch and move to the server-supplied next cursor.
    ///
    /// Without a next cursor the manager becomes terminal.
    pub fn advance(&mut self, next: Option<StreamCursor>) {
        self.fetched_any = true;
        self.consecutive_errors = 0;
        match next {
            Some(cursor) => self.cursor = Some(cursor),
            None => self.finish(),
        }
    }

    /// Recover from a failed fetch.
    ///
    /// Returns the replacement cursor, or the error that ends the drain.
    pub async fn recover(&mut self, error: StreamError) -> Result<StreamCursor, StreamError> {
        if !error.is_cursor_error() {
            self.finish();
            return Err(error);
        }

        self.release_current();
        self.state = CursorState::Expired;
        self.consecutive_errors += 1;
        tracing::warn!(
            error = %error,
            consecutive = self.consecutive_errors,
            fetched_any = self.fetched_any,
            "Cursor expired or invalid"
        );

        let result = if !self.fetched_any {
            if self.consecutive_errors > 1 {
                self.finish();
                return Err(error);
            }
            self.state = CursorState::Recreating;
            self.create(self.opened_origin.alternate()).await
        } else {
            self.state = CursorState::Recreating;
            self.create_with_fallback(self.origin).await
        };

        self.settle(result)
    }

    /// End the cycle
    pub fn finish(&mut self) {
        self.release_current();
        self.state = CursorState::Terminal;
    }

    fn release_current(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            self.source.release_cursor(&cursor);
        }
    }

    fn settle(
        &mut self,
        result: Result<StreamCursor, StreamError>,
    ) -> Result<StreamCursor, StreamError> {
        match result {
            Ok(cursor) => {
                self.cursor = Some(cursor.clone());
                self.state = CursorState::Active;
                Ok(cursor)
            }
            Err(e) => {
                self.finish();
                Err(e)
            }
        }
    }

    async fn create_with_fallback(
        &self,
        origin: CursorOrigin,
    ) -> Result<StreamCursor, StreamError> {
        match self.create(origin).await {
            Err(e) if e.is_cursor_error() => {
                let fallback = origin.alternate();
                tracing::warn!(
                    error = %e,
                    origin = %origin,
                    fallback = %fallback,
                    "Cursor creation failed, retrying with alternate origin"
                );
                self.create(fallback).await
            }
            result => result,
        }
    }

    async fn create(&self, origin: CursorOrigin) -> Result<StreamCursor, StreamError> {
        let request = CursorRequest {
            group: self.identity.group.clone(),
            instance: self.identity.instance.clone(),
            origin,
            read_timeout: self.identity.read_timeout,
            commit_on_get: true,
        };
        let cursor = self.source.create_cursor(&request).await?;
        tracing::debug!(
            group = %request.group,
            instance = %request.instance,
            origin = %origin,
            "Group cursor created"
        );
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::testing::{ScriptedSource, cursor_error, read_error};

    fn identity() -> ConsumerIdentity {
        ConsumerIdentity {
            group: "nlb-metrics-group".to_string(),
            instance: "faas-instance-1".to_string(),
            read_timeout: Duration::from_millis(1000),
        }
    }

    fn manager(source: &Arc<ScriptedSource>, origin: CursorOrigin) -> CursorManager {
        CursorManager::new(source.clone(), identity(), origin)
    }

    #[tokio::test]
    async fn test_open_success() {
        let source = Arc::new(ScriptedSource::new());
        let mut manager = manager(&source, CursorOrigin::Earliest);
        assert_eq!(manager.state(), CursorState::Uninitialized);

        let cursor = manager.open().await.unwrap();
        assert_eq!(cursor.origin, CursorOrigin::Earliest);
        assert_eq!(manager.state(), CursorState::Active);
        assert_eq!(manager.current(), Some(&cursor));

        let requests = source.create_requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].commit_on_get);
        assert_eq!(requests[0].group, "nlb-metrics-group");
        assert_eq!(requests[0].instance, "faas-instance-1");
        assert_eq!(requests[0].read_timeout, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_open_falls_back_once_on_cursor_error() {
        let source = Arc::new(ScriptedSource::new());
        source.push_create_error(cursor_error());
        let mut manager = manager(&source, CursorOrigin::Latest);

        let cursor = manager.open().await.unwrap();
        assert_eq!(cursor.origin, CursorOrigin::Earliest);
        assert_eq!(
            source.create_origins(),
            vec![CursorOrigin::Latest, CursorOrigin::Earliest]
        );
    }

    #[tokio::test]
    async fn test_open_gives_up_after_fallback() {
        let source = Arc::new(ScriptedSource::new());
        source.push_create_error(cursor_error());
        source.push_create_error(cursor_error());
        let mut manager = manager(&source, CursorOrigin::Earliest);

        assert!(manager.open().await.is_err());
        assert_eq!(manager.state(), CursorState::Terminal);
        assert_eq!(source.create_origins().len(), 2);
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn test_open_does_not_retry_other_errors() {
        let source = Arc::new(ScriptedSource::new());
        source.push_create_error(read_error());
        let mut manager = manager(&source, CursorOrigin::Earliest);

        assert!(manager.open().await.is_err());
        assert_eq!(source.create_origins().len(), 1);
    }

    #[tokio::test]
    async fn test_first_fetch_error_uses_alternate_once() {
        let source = Arc::new(ScriptedSource::new());
        let mut manager = manager(&source, CursorOrigin::Earliest);
        manager.open().await.unwrap();

        let cursor = manager.recover(cursor_error()).await.unwrap();
        assert_eq!(cursor.origin, CursorOrigin::Latest);
        assert_eq!(manager.state(), CursorState::Active);

        assert!(manager.recover(cursor_error()).await.is_err());
        assert_eq!(manager.state(), CursorState::Terminal);
        assert_eq!(
            source.create_origins(),
            vec![CursorOrigin::Earliest, CursorOrigin::Latest]
        );
    }

    #[tokio::test]
    async fn test_mid_drain_recreates_with_configured_origin() {
        let source = Arc::new(ScriptedSource::new());
        let mut manager = manager(&source, CursorOrigin::Latest);
        let first = manager.open().await.unwrap();
        manager.advance(Some(first));

        let cursor = manager.recover(cursor_error()).await.unwrap();
        assert_eq!(cursor.origin, CursorOrigin::Latest);

        manager.advance(Some(cursor));
        let again = manager.recover(cursor_error()).await.unwrap();
        assert_eq!(again.origin, CursorOrigin::Latest);
    }

    #[tokio::test]
    async fn test_mid_drain_consecutive_errors_keep_configured_origin() {
        let source = Arc::new(ScriptedSource::new());
        let mut manager = manager(&source, CursorOrigin::Earliest);
        let first = manager.open().await.unwrap();
        manager.advance(Some(first));

        for _ in 0..5 {
            let cursor = manager.recover(cursor_error()).await.unwrap();
            assert_eq!(cursor.origin, CursorOrigin::Earliest);
            assert_eq!(manager.state(), CursorState::Active);
        }
        assert_eq!(source.create_origins(), vec![CursorOrigin::Earliest; 6]);
    }

    #[tokio::test]
    async fn test_mid_drain_gives_up_when_recreate_fails() {
        let source = Arc::new(ScriptedSource::new());
        let mut manager = manager(&source, CursorOrigin::Earliest);
        let first = manager.open().await.unwrap();
        manager.advance(Some(first));

        source.push_create_error(cursor_error());
        source.push_create_error(cursor_error());
        assert!(manager.recover(cursor_error()).await.is_err());
        assert_eq!(manager.state(), CursorState::Terminal);
        assert_eq!(source.create_origins().len(), 3);
    }

    #[tokio::test]
    async fn test_first_fetch_error_alternates_opened_origin() {
        let source = Arc::new(ScriptedSource::new());
        source.push_create_error(cursor_error());
        let mut manager = manager(&source, CursorOrigin::Latest);
        let opened = manager.open().await.unwrap();
        assert_eq!(opened.origin, CursorOrigin::Earliest);

        let cursor = manager.recover(cursor_error()).await.unwrap();
        assert_eq!(cursor.origin, CursorOrigin::Latest);
        assert_eq!(
            source.create_origins(),
            vec![
                CursorOrigin::Latest,
                CursorOrigin::Earliest,
                CursorOrigin::Latest
            ]
        );
    }

    #[tokio::test]
    async fn test_replaced_and_finished_cursors_are_released() {
        let source = Arc::new(ScriptedSource::new());
        let mut manager = manager(&source, CursorOrigin::Earliest);
        let first = manager.open().await.unwrap();
        manager.advance(Some(first.clone()));

        let second = manager.recover(cursor_error()).await.unwrap();
        manager.finish();
        manager.finish();
        assert_eq!(source.released(), vec![first.token, second.token]);
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn test_mid_drain_recreate_uses_create_fallback() {
        let source = Arc::new(ScriptedSource::new());
        let mut manager = manager(&source, CursorOrigin::Earliest);
        let first = manager.open().await.unwrap();
        manager.advance(Some(first));

        source.push_create_error(cursor_error());
        let cursor = manager.recover(cursor_error()).await.unwrap();
        assert_eq!(cursor.origin, CursorOrigin::Latest);
        assert_eq!(
            source.create_origins(),
            vec![
                CursorOrigin::Earliest,
                CursorOrigin::Earliest,
                CursorOrigin::Latest
            ]
        );
    }

    #[tokio::test]
    async fn test_non_cursor_error_is_terminal() {
        let source = Arc::new(ScriptedSource::new());
        let mut manager = manager(&source, CursorOrigin::Earliest);
        manager.open().await.unwrap();

        let err = manager.recover(read_error()).await.unwrap_err();
        assert!(!err.is_cursor_error());
        assert_eq!(manager.state(), CursorState::Terminal);
        assert_eq!(source.create_origins().len(), 1);
    }

    #[tokio::test]
    async fn test_advance_without_next_cursor_is_terminal() {
        let source = Arc::new(ScriptedSource::new());
        let mut manager = manager(&source, CursorOrigin::Earliest);
        manager.open().await.unwrap();

        manager.advance(None);
        assert_eq!(manager.state(), CursorState::Terminal);
        assert!(manager.current().is_none());
    }
}
