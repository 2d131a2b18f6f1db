//! Page resource owner
//!
//! A run owns exactly one browser page at a time. The driver holds it so
//! the coordinator's stop path can release it while the loop is mid-query;
//! release failures are for the caller to swallow.

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use super::{BrowserError, BrowserSession, BrowserSessionConfig};
use super::simulator::{SEARCH_HOME_URL, SearchSimulator};

/// Seam between the coordinator and the page it drives.
#[async_trait]
pub trait SearchDriver: Send + Sync {
    /// Open the run's page resource
    async fn open(&self) -> Result<(), BrowserError>;

    /// Simulate one search on the open page
    async fn search(&self, query: &str, cancel: &CancelToken) -> Result<(), BrowserError>;

    /// Release the page resource
    async fn close(&self) -> Result<(), BrowserError>;
}

/// Runtime-settable driver options, applied when a run starts
#[derive(Debug, Clone, Copy)]
struct DriverSettings {
    headless: bool,
    scroll_duration: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            headless: true,
            scroll_duration: Duration::from_secs(15),
        }
    }
}

/// Real driver backed by a chromiumoxide session.
pub struct BrowserDriver {
    settings: RwLock<DriverSettings>,
    session: RwLock<Option<Arc<BrowserSession>>>,
}

impl BrowserDriver {
    pub fn new() -> Self {
        Self {
            settings: RwLock::new(DriverSettings::default()),
            session: RwLock::new(None),
        }
    }

    /// Apply per-run options from the configuration
    pub async fn configure(&self, headless: bool, scroll_duration_secs: u64) {
        let mut settings = self.settings.write().await;
        settings.headless = headless;
        settings.scroll_duration = Duration::from_secs(scroll_duration_secs);
    }

    async fn current_session(&self) -> Result<Arc<BrowserSession>, BrowserError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(BrowserError::ConnectionLost("No page open".into()))
    }

    /// Selector probe of the currently open page
    pub async fn debug_current_page(&self) -> Result<serde_json::Value, BrowserError> {
        let session = self.current_session().await?;
        SearchSimulator::debug_page(&session).await
    }
}

impl Default for BrowserDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchDriver for BrowserDriver {
    async fn open(&self) -> Result<(), BrowserError> {
        let settings = *self.settings.read().await;

        // A leftover session from a previous run is stale; drop it first
        if let Some(old) = self.session.write().await.take() {
            warn!("Closing stale session {} before opening a new one", old.id);
            let _ = old.close().await;
        }

        let config = BrowserSessionConfig::for_run().headless(settings.headless);
        let session = Arc::new(BrowserSession::new(config).await?);

        session.navigate(SEARCH_HOME_URL).await?;
        session.wait_for_load(15).await?;
        debug!("Session {} ready on {}", session.id, SEARCH_HOME_URL);

        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn search(&self, query: &str, cancel: &CancelToken) -> Result<(), BrowserError> {
        let settings = *self.settings.read().await;
        let session = self.current_session().await?;

        SearchSimulator::run_search(&session, query, settings.scroll_duration, cancel).await
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let session = self.session.write().await.take();
        if let Some(session) = session {
            session.close().await?;
        }
        Ok(())
    }
}
