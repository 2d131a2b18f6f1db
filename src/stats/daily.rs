//! Per-calendar-day search counters
//!
//! Stats roll over automatically: any mutation dated to a new day resets
//! the counter before applying. Persistence lives next to the config file
//! and is best-effort.

use std::path::PathBuf;
use chrono::{Local, NaiveDate};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Persisted per-day counters.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub date: NaiveDate,
    pub search_count: u32,
    pub completed: bool,
}

impl DailyStats {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            date: today,
            search_count: 0,
            completed: false,
        }
    }

    fn roll_over(&mut self, today: NaiveDate) {
        if self.date != today {
            *self = Self::new(today);
        }
    }

    /// Count one completed search, resetting first on a new day
    pub fn record_search(&mut self, today: NaiveDate) {
        self.roll_over(today);
        self.search_count += 1;
    }

    /// Mark the day's run as completed
    pub fn mark_completed(&mut self, today: NaiveDate) {
        self.roll_over(today);
        self.completed = true;
    }
}

/// Store keeping the current day's stats in memory and on disk.
pub struct StatsStore {
    stats: RwLock<DailyStats>,
    path: Option<PathBuf>,
}

impl StatsStore {
    /// Load persisted stats, defaulting to a fresh day
    pub fn load() -> Self {
        let path = Self::stats_path();
        let today = Local::now().date_naive();

        let stats = path
            .as_ref()
            .filter(|p| p.exists())
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|content| serde_json::from_str::<DailyStats>(&content).ok())
            .unwrap_or_else(|| DailyStats::new(today));

        Self {
            stats: RwLock::new(stats),
            path,
        }
    }

    /// In-memory store, no persistence
    pub fn in_memory() -> Self {
        Self {
            stats: RwLock::new(DailyStats::new(Local::now().date_naive())),
            path: None,
        }
    }

    fn stats_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("search-automator").join("daily_stats.json"))
    }

    pub async fn record_search(&self) {
        let mut stats = self.stats.write().await;
        stats.record_search(Local::now().date_naive());
        self.save(&stats);
    }

    pub async fn mark_completed(&self) {
        let mut stats = self.stats.write().await;
        stats.mark_completed(Local::now().date_naive());
        info!("Daily run completed ({} searches today)", stats.search_count);
        self.save(&stats);
    }

    /// Current stats, rolled over to today for reading
    pub async fn snapshot(&self) -> DailyStats {
        let mut stats = self.stats.write().await;
        stats.roll_over(Local::now().date_naive());
        stats.clone()
    }

    fn save(&self, stats: &DailyStats) {
        let Some(path) = &self.path else { return };

        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(stats) {
            Ok(content) => {
                if let Err(e) = std::fs::write(path, content) {
                    warn!("Failed to save daily stats: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize daily stats: {}", e),
        }
    }
}
