//! Search Automator
//!
//! A headless service that performs a configurable number of simulated
//! search-engine queries in a real browser, with human-like typing and
//! scrolling, optionally on a daily schedule.

pub mod browser;
pub mod cancel;
pub mod coordinator;
pub mod notify;
pub mod pacing;
pub mod queries;
pub mod scheduler;
pub mod stats;
pub mod web;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use browser::BrowserDriver;
use coordinator::{Coordinator, StartOptions};
use notify::{Notifier, RunEvent};
use pacing::DelayRange;
use queries::GeminiClient;
use scheduler::{DailySchedule, Scheduler};
use stats::StatsStore;

/// UI theme preference (persisted for the frontend)
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Theme {
    Dark,
    Light,
    System,
}

/// Application configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// API key for the query-generation endpoint
    #[serde(default)]
    pub api_key: String,

    /// Seconds spent scrolling each results page
    #[serde(default = "default_scroll_duration")]
    pub scroll_duration_secs: u64,

    /// Topic tags queries are generated from
    #[serde(default = "default_tags")]
    pub selected_tags: Vec<String>,

    /// Default number of searches per run
    #[serde(default = "default_search_count")]
    pub search_count: usize,

    /// Wait between consecutive searches
    #[serde(default = "default_min_search_delay")]
    pub min_search_delay_ms: u64,
    #[serde(default = "default_max_search_delay")]
    pub max_search_delay_ms: u64,

    /// Run the browser headless
    #[serde(default = "default_headless")]
    pub headless: bool,

    #[serde(default = "default_theme")]
    pub theme: Theme,

    /// Daily auto-run time (HH:MM), if scheduled
    #[serde(default)]
    pub scheduled_time: Option<String>,
}

fn default_scroll_duration() -> u64 { 15 }
fn default_search_count() -> usize { 10 }
fn default_min_search_delay() -> u64 { 5_000 }
fn default_max_search_delay() -> u64 { 10_000 }
fn default_headless() -> bool { true }
fn default_theme() -> Theme { Theme::Dark }

fn default_tags() -> Vec<String> {
    vec![
        "technology".to_string(),
        "science".to_string(),
        "travel".to_string(),
        "food".to_string(),
        "history".to_string(),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            scroll_duration_secs: default_scroll_duration(),
            selected_tags: default_tags(),
            search_count: default_search_count(),
            min_search_delay_ms: default_min_search_delay(),
            max_search_delay_ms: default_max_search_delay(),
            headless: default_headless(),
            theme: default_theme(),
            scheduled_time: None,
        }
    }
}

impl AppConfig {
    pub const MIN_SCROLL_SECS: u64 = 5;
    pub const MAX_SCROLL_SECS: u64 = 30;
    pub const MAX_SEARCH_COUNT: usize = 50;

    /// Get config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("search-automator").join("config.json"))
    }

    /// Load config from file
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => match serde_json::from_str::<Self>(&content) {
                        Ok(config) => {
                            info!("Loaded config from {:?}", path);
                            return config.normalized();
                        }
                        Err(e) => {
                            warn!("Failed to parse config file: {}", e);
                        }
                    },
                    Err(e) => {
                        warn!("Failed to read config file: {}", e);
                    }
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    error!("Failed to create config directory: {}", e);
                    return;
                }
            }

            match serde_json::to_string_pretty(self) {
                Ok(content) => {
                    if let Err(e) = std::fs::write(&path, content) {
                        error!("Failed to save config: {}", e);
                    } else {
                        info!("Config saved to {:?}", path);
                    }
                }
                Err(e) => {
                    error!("Failed to serialize config: {}", e);
                }
            }
        }
    }

    /// Clamp all user-settable values into their valid ranges
    pub fn normalized(mut self) -> Self {
        self.scroll_duration_secs = self
            .scroll_duration_secs
            .clamp(Self::MIN_SCROLL_SECS, Self::MAX_SCROLL_SECS);
        self.search_count = self.search_count.clamp(1, Self::MAX_SEARCH_COUNT);
        if self.min_search_delay_ms > self.max_search_delay_ms {
            std::mem::swap(&mut self.min_search_delay_ms, &mut self.max_search_delay_ms);
        }
        if let Some(time) = &self.scheduled_time {
            if scheduler::parse_time(time).is_none() {
                warn!("Dropping invalid scheduled time: {}", time);
                self.scheduled_time = None;
            }
        }
        self
    }
}

/// Truncate a string to at most `n` characters, safely on char boundaries
pub fn safe_truncate(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("search-automator").join("logs"))
}

/// Application state shared across the app
pub struct AppState {
    /// Application configuration
    pub config: Arc<RwLock<AppConfig>>,
    /// Run coordinator
    pub coordinator: Arc<Coordinator>,
    /// Browser driver (the run's page resource)
    pub driver: Arc<BrowserDriver>,
    /// Daily schedule
    pub scheduler: Arc<Scheduler>,
    /// Daily search stats
    pub stats: Arc<StatsStore>,
    /// Run event fan-out
    pub notifier: Arc<Notifier>,
}

impl AppState {
    /// Create new application state with loaded config
    pub fn new() -> Self {
        let config = AppConfig::load();

        let notifier = Arc::new(Notifier::new());
        let stats = Arc::new(StatsStore::load());
        let driver = Arc::new(BrowserDriver::new());
        let source = Arc::new(GeminiClient::new());

        let coordinator = Coordinator::new(
            source,
            driver.clone(),
            notifier.clone(),
            stats.clone(),
        );

        Self {
            config: Arc::new(RwLock::new(config)),
            coordinator,
            driver,
            scheduler: Arc::new(Scheduler::new()),
            stats,
            notifier,
        }
    }

    /// Configure the application with new settings
    pub async fn configure(&self, config: AppConfig) {
        let config = config.normalized();

        match &config.scheduled_time {
            Some(time) => {
                if let Ok(schedule) = DailySchedule::new(time) {
                    self.scheduler.set(schedule).await;
                }
            }
            None => self.scheduler.clear().await,
        }

        config.save();
        *self.config.write().await = config;

        info!("Application configured");
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Arm the saved schedule (if any) and start the monitor that triggers
/// scheduled runs with the persisted configuration.
pub async fn spawn_schedule_monitor(state: Arc<AppState>) {
    let saved_time = state.config.read().await.scheduled_time.clone();
    if let Some(time) = saved_time {
        match DailySchedule::new(&time) {
            Ok(schedule) => {
                info!("Re-arming saved schedule: daily at {}", schedule.time);
                state.scheduler.set(schedule).await;
            }
            Err(e) => warn!("Ignoring saved schedule: {}", e),
        }
    }

    let monitor_state = state.clone();
    state.scheduler.start_monitor(move || {
        let state = monitor_state.clone();
        async move {
            let config = state.config.read().await.clone();

            // A trigger without a complete prior configuration is a no-op
            if config.api_key.is_empty() || config.selected_tags.is_empty() {
                warn!("Scheduled run skipped: configuration incomplete");
                return;
            }

            state
                .notifier
                .emit(RunEvent::ScheduledRunStarted {
                    time: config.scheduled_time.clone().unwrap_or_default(),
                })
                .await;

            state
                .driver
                .configure(config.headless, config.scroll_duration_secs)
                .await;

            let options = StartOptions {
                count: config.search_count,
                topics: config.selected_tags.clone(),
                api_key: config.api_key.clone(),
                search_delay: DelayRange::new(
                    config.min_search_delay_ms,
                    config.max_search_delay_ms,
                ),
            };

            if let Err(e) = state.coordinator.start(options).await {
                warn!("Scheduled run failed to start: {}", e);
            }
        }
    });
}

/// Initialize logging (console + daily rolling file)
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "search-automator.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_normalization_clamps_ranges() {
        let config = AppConfig {
            scroll_duration_secs: 120,
            search_count: 500,
            ..Default::default()
        }
        .normalized();

        assert_eq!(config.scroll_duration_secs, AppConfig::MAX_SCROLL_SECS);
        assert_eq!(config.search_count, AppConfig::MAX_SEARCH_COUNT);

        let config = AppConfig {
            scroll_duration_secs: 1,
            search_count: 0,
            ..Default::default()
        }
        .normalized();

        assert_eq!(config.scroll_duration_secs, AppConfig::MIN_SCROLL_SECS);
        assert_eq!(config.search_count, 1);
    }

    #[test]
    fn test_config_normalization_fixes_inverted_delays() {
        let config = AppConfig {
            min_search_delay_ms: 9_000,
            max_search_delay_ms: 4_000,
            ..Default::default()
        }
        .normalized();

        assert_eq!(config.min_search_delay_ms, 4_000);
        assert_eq!(config.max_search_delay_ms, 9_000);
    }

    #[test]
    fn test_config_normalization_drops_bad_schedule() {
        let config = AppConfig {
            scheduled_time: Some("25:99".to_string()),
            ..Default::default()
        }
        .normalized();
        assert!(config.scheduled_time.is_none());

        let config = AppConfig {
            scheduled_time: Some("08:30".to_string()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.scheduled_time.as_deref(), Some("08:30"));
    }

    #[test]
    fn test_safe_truncate_respects_char_boundaries() {
        assert_eq!(safe_truncate("hello", 3), "hel");
        assert_eq!(safe_truncate("hi", 10), "hi");
        assert_eq!(safe_truncate("héllo", 2), "hé");
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.search_count, config.search_count);
        assert_eq!(parsed.theme, Theme::Dark);
    }

    #[test]
    fn test_config_tolerates_missing_fields() {
        let parsed: AppConfig = serde_json::from_str(r#"{"apiKey": "k"}"#).unwrap();
        assert_eq!(parsed.api_key, "k");
        assert_eq!(parsed.scroll_duration_secs, 15);
        assert!(parsed.scheduled_time.is_none());
    }
}
