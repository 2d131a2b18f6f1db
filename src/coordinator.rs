//! Automation coordinator
//!
//! Owns the run state and drives the whole sequence: generate queries,
//! open one page, simulate each search, report progress, release the page,
//! emit exactly one terminal event. Only start-time failures surface to
//! the caller; everything inside the loop is log-and-continue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::browser::SearchDriver;
use crate::cancel::CancelToken;
use crate::notify::{Notifier, RunEvent};
use crate::pacing::DelayRange;
use crate::queries::{QueryError, QuerySource};
use crate::stats::StatsStore;

/// Run control errors surfaced to the caller
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Automation is already running")]
    AlreadyRunning,

    #[error("No automation is currently running")]
    NotRunning,

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl From<RunError> for String {
    fn from(err: RunError) -> String {
        err.to_string()
    }
}

/// Pure status read of the current (or last) run
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub running: bool,
    pub current_index: usize,
    pub total: usize,
}

/// Parameters for one run
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub count: usize,
    pub topics: Vec<String>,
    pub api_key: String,
    /// Randomized wait between consecutive searches
    pub search_delay: DelayRange,
}

/// Sequences query generation, page interaction and progress reporting
/// for at most one run at a time.
pub struct Coordinator {
    source: Arc<dyn QuerySource>,
    driver: Arc<dyn SearchDriver>,
    notifier: Arc<Notifier>,
    stats: Arc<StatsStore>,
    running: AtomicBool,
    current_index: AtomicUsize,
    total: AtomicUsize,
    /// Token for the active run; replaced at each start
    cancel: Mutex<CancelToken>,
}

impl Coordinator {
    pub fn new(
        source: Arc<dyn QuerySource>,
        driver: Arc<dyn SearchDriver>,
        notifier: Arc<Notifier>,
        stats: Arc<StatsStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            source,
            driver,
            notifier,
            stats,
            running: AtomicBool::new(false),
            current_index: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            cancel: Mutex::new(CancelToken::new()),
        })
    }

    /// Start a run. Returns as soon as queries are generated and the
    /// execution loop is spawned; the run continues in the background.
    pub async fn start(self: &Arc<Self>, options: StartOptions) -> Result<(), RunError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RunError::AlreadyRunning);
        }

        self.current_index.store(0, Ordering::SeqCst);
        self.total.store(options.count, Ordering::SeqCst);

        let token = CancelToken::new();
        *self.cancel.lock().await = token.clone();

        self.notifier
            .emit(RunEvent::Started {
                total: options.count,
                topics: options.topics.clone(),
            })
            .await;

        let queries = match self
            .source
            .generate(&options.topics, options.count, &options.api_key)
            .await
        {
            Ok(queries) if queries.is_empty() => {
                self.running.store(false, Ordering::SeqCst);
                let err = QueryError::NoQueries;
                self.notifier
                    .emit(RunEvent::Errored {
                        message: err.to_string(),
                    })
                    .await;
                return Err(err.into());
            }
            Ok(mut queries) => {
                // The source must never push the run past the requested count
                queries.truncate(options.count);
                queries
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.notifier
                    .emit(RunEvent::Errored {
                        message: e.to_string(),
                    })
                    .await;
                return Err(e.into());
            }
        };

        self.notifier
            .emit(RunEvent::QueriesGenerated {
                count: queries.len(),
            })
            .await;

        let coordinator = Arc::clone(self);
        let delay = options.search_delay;
        tokio::spawn(async move {
            coordinator.run_loop(queries, delay, token).await;
        });

        Ok(())
    }

    /// Request cancellation of the active run. Best-effort releases the
    /// page; always leaves the system idle. The terminal "stopped" event
    /// is emitted by the loop, not here.
    pub async fn stop(&self) -> Result<(), RunError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(RunError::NotRunning);
        }

        info!("Stop requested");
        self.cancel.lock().await.cancel();

        if let Err(e) = self.driver.close().await {
            warn!("Failed to release page during stop (ignored): {}", e);
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Pure status read, no side effects
    pub fn status(&self) -> RunStatus {
        RunStatus {
            running: self.running.load(Ordering::SeqCst),
            current_index: self.current_index.load(Ordering::SeqCst),
            total: self.total.load(Ordering::SeqCst),
        }
    }

    async fn run_loop(&self, queries: Vec<String>, delay: DelayRange, cancel: CancelToken) {
        let total = self.total.load(Ordering::SeqCst);

        if let Err(e) = self.driver.open().await {
            error!("Failed to open page for run: {}", e);
            if let Err(close_err) = self.driver.close().await {
                warn!("Failed to release page after open error (ignored): {}", close_err);
            }
            self.running.store(false, Ordering::SeqCst);
            self.notifier
                .emit(RunEvent::Errored {
                    message: e.to_string(),
                })
                .await;
            return;
        }

        let query_count = queries.len();
        for (i, query) in queries.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            match self.driver.search(query, &cancel).await {
                Ok(()) => {
                    self.stats.record_search().await;
                }
                Err(e) => {
                    // Per-query failures are non-fatal; skip and move on
                    self.notifier
                        .emit(RunEvent::SearchFailed {
                            current: i + 1,
                            total,
                            error: e.to_string(),
                        })
                        .await;
                }
            }

            let current = self.current_index.fetch_add(1, Ordering::SeqCst) + 1;
            self.notifier
                .emit(RunEvent::Progress {
                    current,
                    total,
                    query: query.clone(),
                })
                .await;

            if i + 1 < query_count {
                let wait = delay.sample(&mut rand::thread_rng());
                tokio::time::sleep(wait).await;
            }
        }

        let cancelled = cancel.is_cancelled();

        // On cancellation stop() already released the page and reset the
        // running flag; touching either here could clobber a newer run.
        if !cancelled {
            if let Err(e) = self.driver.close().await {
                warn!("Failed to release page (ignored): {}", e);
            }
        }

        let executed = self.current_index.load(Ordering::SeqCst);
        if cancelled {
            self.notifier
                .emit(RunEvent::Stopped { executed, total })
                .await;
        } else {
            self.stats.mark_completed().await;
            self.notifier
                .emit(RunEvent::Completed { executed, total })
                .await;
            self.running.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    use crate::browser::BrowserError;

    struct MockSource {
        result: AsyncMutex<Option<Result<Vec<String>, QueryError>>>,
    }

    impl MockSource {
        fn returning(queries: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                result: AsyncMutex::new(Some(Ok(queries
                    .iter()
                    .map(|q| q.to_string())
                    .collect()))),
            })
        }

        fn failing(err: QueryError) -> Arc<Self> {
            Arc::new(Self {
                result: AsyncMutex::new(Some(Err(err))),
            })
        }
    }

    #[async_trait]
    impl QuerySource for MockSource {
        async fn generate(
            &self,
            _topics: &[String],
            _count: usize,
            _api_key: &str,
        ) -> Result<Vec<String>, QueryError> {
            self.result
                .lock()
                .await
                .take()
                .expect("generate called more than once")
        }
    }

    #[derive(Default)]
    struct MockDriver {
        searched: AsyncMutex<Vec<String>>,
        fail_on: HashSet<usize>,
        close_fails: bool,
        search_delay: Duration,
    }

    impl MockDriver {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn failing_on(index: usize) -> Arc<Self> {
            Arc::new(Self {
                fail_on: HashSet::from([index]),
                ..Default::default()
            })
        }

        fn with_failing_close() -> Arc<Self> {
            Arc::new(Self {
                close_fails: true,
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl SearchDriver for MockDriver {
        async fn open(&self) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn search(&self, query: &str, _cancel: &CancelToken) -> Result<(), BrowserError> {
            if !self.search_delay.is_zero() {
                tokio::time::sleep(self.search_delay).await;
            }
            let mut searched = self.searched.lock().await;
            let index = searched.len();
            searched.push(query.to_string());
            if self.fail_on.contains(&index) {
                return Err(BrowserError::InputNotFound("input[name=\"q\"]".into()));
            }
            Ok(())
        }

        async fn close(&self) -> Result<(), BrowserError> {
            if self.close_fails {
                return Err(BrowserError::ConnectionLost("page already gone".into()));
            }
            Ok(())
        }
    }

    fn coordinator(
        source: Arc<dyn QuerySource>,
        driver: Arc<dyn SearchDriver>,
    ) -> (Arc<Coordinator>, Arc<Notifier>) {
        let notifier = Arc::new(Notifier::new());
        let stats = Arc::new(StatsStore::in_memory());
        (
            Coordinator::new(source, driver, notifier.clone(), stats),
            notifier,
        )
    }

    fn options(count: usize) -> StartOptions {
        StartOptions {
            count,
            topics: vec!["travel".into()],
            api_key: "X".into(),
            search_delay: DelayRange::new(1, 2),
        }
    }

    async fn next_terminal(rx: &mut tokio::sync::broadcast::Receiver<RunEvent>) -> RunEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for terminal event")
                .expect("event channel closed");
            if event.is_terminal() {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_start_when_idle_initializes_run_state() {
        let (coord, _notifier) =
            coordinator(MockSource::returning(&["a", "b", "c"]), MockDriver::new());

        coord.start(options(3)).await.unwrap();

        let status = coord.status();
        assert!(status.running);
        assert_eq!(status.total, 3);
    }

    #[tokio::test]
    async fn test_start_while_running_fails() {
        let driver = Arc::new(MockDriver {
            search_delay: Duration::from_millis(200),
            ..Default::default()
        });
        let (coord, _notifier) = coordinator(MockSource::returning(&["a", "b"]), driver);

        coord.start(options(2)).await.unwrap();
        let second = coord.start(options(2)).await;
        assert!(matches!(second, Err(RunError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn test_stop_when_idle_fails() {
        let (coord, _notifier) = coordinator(MockSource::returning(&["a"]), MockDriver::new());
        assert!(matches!(coord.stop().await, Err(RunError::NotRunning)));
    }

    #[tokio::test]
    async fn test_generation_failure_leaves_state_idle() {
        let (coord, _notifier) = coordinator(
            MockSource::failing(QueryError::GenerationFailed("HTTP 500".into())),
            MockDriver::new(),
        );

        let result = coord.start(options(3)).await;
        assert!(matches!(
            result,
            Err(RunError::Query(QueryError::GenerationFailed(_)))
        ));
        assert!(!coord.status().running);
    }

    #[tokio::test]
    async fn test_empty_generation_yields_no_queries() {
        let (coord, _notifier) = coordinator(MockSource::returning(&[]), MockDriver::new());

        let result = coord.start(options(3)).await;
        assert!(matches!(result, Err(RunError::Query(QueryError::NoQueries))));
        assert!(!coord.status().running);
    }

    #[tokio::test]
    async fn test_full_run_emits_progress_then_completed() {
        let driver = MockDriver::new();
        let (coord, notifier) =
            coordinator(MockSource::returning(&["a", "b", "c"]), driver.clone());
        let mut rx = notifier.subscribe();

        coord.start(options(3)).await.unwrap();

        let mut progress = Vec::new();
        let terminal = loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            match event {
                RunEvent::Progress { current, .. } => progress.push(current),
                e if e.is_terminal() => break e,
                _ => {}
            }
        };

        assert_eq!(progress, vec![1, 2, 3]);
        match terminal {
            RunEvent::Completed { executed, total } => {
                assert_eq!(executed, 3);
                assert_eq!(total, 3);
            }
            other => panic!("expected Completed, got {:?}", other),
        }

        assert_eq!(
            *driver.searched.lock().await,
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        let status = coord.status();
        assert!(!status.running);
        assert_eq!(status.current_index, 3);
    }

    #[tokio::test]
    async fn test_per_query_failure_is_skipped_not_fatal() {
        let driver = MockDriver::failing_on(1);
        let (coord, notifier) =
            coordinator(MockSource::returning(&["a", "b", "c"]), driver.clone());
        let mut rx = notifier.subscribe();

        coord.start(options(3)).await.unwrap();

        let mut failures = 0;
        let terminal = loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            match event {
                RunEvent::SearchFailed { current, .. } => {
                    failures += 1;
                    assert_eq!(current, 2);
                }
                e if e.is_terminal() => break e,
                _ => {}
            }
        };

        assert_eq!(failures, 1);
        assert!(matches!(terminal, RunEvent::Completed { executed: 3, .. }));
        assert_eq!(driver.searched.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn test_stop_mid_run_emits_single_stopped() {
        let (coord, notifier) = coordinator(
            MockSource::returning(&["a", "b", "c"]),
            MockDriver::new(),
        );
        let mut rx = notifier.subscribe();

        let mut opts = options(3);
        // Long inter-search wait so stop lands between queries
        opts.search_delay = DelayRange::new(400, 500);
        coord.start(opts).await.unwrap();

        // Wait for the first query to finish
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if matches!(event, RunEvent::Progress { current: 1, .. }) {
                break;
            }
        }

        coord.stop().await.unwrap();

        let terminal = next_terminal(&mut rx).await;
        match terminal {
            RunEvent::Stopped { executed, total } => {
                assert_eq!(executed, 1);
                assert_eq!(total, 3);
            }
            other => panic!("expected Stopped, got {:?}", other),
        }

        // Exactly one terminal event: the channel holds nothing further
        tokio::time::sleep(Duration::from_millis(700)).await;
        while let Ok(event) = rx.try_recv() {
            assert!(!event.is_terminal(), "second terminal event: {:?}", event);
        }

        let status = coord.status();
        assert!(!status.running);
        assert_eq!(status.current_index, 1);
        assert_eq!(status.total, 3);
    }

    #[tokio::test]
    async fn test_stop_succeeds_even_if_release_fails() {
        let (coord, notifier) = coordinator(
            MockSource::returning(&["a", "b"]),
            MockDriver::with_failing_close(),
        );
        let mut rx = notifier.subscribe();

        let mut opts = options(2);
        opts.search_delay = DelayRange::new(300, 400);
        coord.start(opts).await.unwrap();

        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if matches!(event, RunEvent::Progress { .. }) {
                break;
            }
        }

        assert!(coord.stop().await.is_ok());
        assert!(!coord.status().running);

        // The loop still reaches its terminal event
        assert!(matches!(
            next_terminal(&mut rx).await,
            RunEvent::Stopped { .. }
        ));
    }

    #[tokio::test]
    async fn test_index_never_exceeds_total() {
        // Source over-delivers six queries for a requested count of 4;
        // the surplus is dropped so the index stays within total
        let (coord, notifier) = coordinator(
            MockSource::returning(&["a", "b", "c", "d", "e", "f"]),
            MockDriver::new(),
        );
        let mut rx = notifier.subscribe();

        coord.start(options(4)).await.unwrap();
        let _ = next_terminal(&mut rx).await;

        let status = coord.status();
        assert!(status.current_index <= status.total);
        assert_eq!(status.current_index, 4);
    }

    #[tokio::test]
    async fn test_under_delivery_completes_short() {
        let (coord, notifier) =
            coordinator(MockSource::returning(&["a", "b"]), MockDriver::new());
        let mut rx = notifier.subscribe();

        coord.start(options(5)).await.unwrap();

        match next_terminal(&mut rx).await {
            RunEvent::Completed { executed, total } => {
                assert_eq!(executed, 2);
                assert_eq!(total, 5);
            }
            other => panic!("expected Completed, got {:?}", other),
        }
    }
}
