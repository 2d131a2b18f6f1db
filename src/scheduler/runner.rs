//! Schedule runner
//!
//! A single persisted time-of-day re-triggers a run once per day. The
//! monitor task polls on a coarse tick; each firing advances the target to
//! the next day.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use chrono::{DateTime, Local, NaiveTime, TimeZone};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Monitor poll interval
const MONITOR_TICK_SECS: u64 = 30;

/// Parse a strict HH:MM time-of-day
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

/// A recurring time-of-day trigger.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySchedule {
    /// Time of day in HH:MM format
    pub time: String,
}

impl DailySchedule {
    /// Validate and build a schedule
    pub fn new(time: &str) -> Result<Self, String> {
        if parse_time(time).is_none() {
            return Err(format!("Invalid time format (expected HH:MM): {}", time));
        }
        Ok(Self {
            time: time.to_string(),
        })
    }

    /// Next future occurrence of the scheduled time: today if it hasn't
    /// passed yet, otherwise tomorrow.
    pub fn next_occurrence(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let time = parse_time(&self.time)?;

        let today = Local
            .from_local_datetime(&now.date_naive().and_time(time))
            .earliest()?;
        if today > now {
            return Some(today);
        }

        Local
            .from_local_datetime(&now.date_naive().succ_opt()?.and_time(time))
            .earliest()
    }
}

/// Schedule status for the API.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ScheduleStatus {
    Disabled,
    Armed { time: String, seconds_until: i64 },
}

/// Manages the persisted schedule and its recurring trigger.
pub struct Scheduler {
    schedule: Arc<RwLock<Option<DailySchedule>>>,
    next_fire: Arc<RwLock<Option<DateTime<Local>>>>,
    monitoring: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            schedule: Arc::new(RwLock::new(None)),
            next_fire: Arc::new(RwLock::new(None)),
            monitoring: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Arm the daily trigger
    pub async fn set(&self, schedule: DailySchedule) {
        let next = schedule.next_occurrence(Local::now());
        info!("Schedule set: daily at {} (next fire: {:?})", schedule.time, next);

        *self.next_fire.write().await = next;
        *self.schedule.write().await = Some(schedule);
    }

    /// Disarm the trigger
    pub async fn clear(&self) {
        info!("Schedule cancelled");
        *self.schedule.write().await = None;
        *self.next_fire.write().await = None;
    }

    pub async fn current(&self) -> Option<DailySchedule> {
        self.schedule.read().await.clone()
    }

    pub async fn status(&self) -> ScheduleStatus {
        let schedule = self.schedule.read().await;
        let next = *self.next_fire.read().await;

        match (schedule.as_ref(), next) {
            (Some(s), Some(next)) => ScheduleStatus::Armed {
                time: s.time.clone(),
                seconds_until: (next - Local::now()).num_seconds().max(0),
            },
            _ => ScheduleStatus::Disabled,
        }
    }

    /// Start the monitoring loop. On each firing the callback is invoked
    /// and the target advances by one day.
    pub fn start_monitor<F, Fut>(&self, on_fire: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        if self.monitoring.swap(true, Ordering::Relaxed) {
            debug!("Schedule monitor already running");
            return;
        }
        info!("Starting schedule monitor");

        let schedule = self.schedule.clone();
        let next_fire = self.next_fire.clone();
        let monitoring = self.monitoring.clone();

        tokio::spawn(async move {
            while monitoring.load(Ordering::Relaxed) {
                let due = {
                    let next = next_fire.read().await;
                    matches!(*next, Some(n) if Local::now() >= n)
                };

                if due {
                    // Advance before firing so a long run can't double-fire
                    {
                        let mut next = next_fire.write().await;
                        *next = schedule
                            .read()
                            .await
                            .as_ref()
                            .and_then(|s| s.next_occurrence(Local::now()));
                        debug!("Schedule fired, next occurrence: {:?}", *next);
                    }
                    on_fire().await;
                }

                tokio::time::sleep(tokio::time::Duration::from_secs(MONITOR_TICK_SECS)).await;
            }

            info!("Schedule monitor stopped");
        });
    }

    /// Stop the monitoring loop
    pub fn stop_monitor(&self) {
        self.monitoring.store(false, Ordering::Relaxed);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_parse_time_accepts_hh_mm() {
        assert!(parse_time("09:30").is_some());
        assert!(parse_time("23:59").is_some());
        assert!(parse_time("24:00").is_none());
        assert!(parse_time("9am").is_none());
        assert!(parse_time("").is_none());
    }

    #[test]
    fn test_schedule_rejects_invalid_time() {
        assert!(DailySchedule::new("14:30").is_ok());
        assert!(DailySchedule::new("tomorrow").is_err());
    }

    #[test]
    fn test_next_occurrence_later_today() {
        let schedule = DailySchedule::new("18:00").unwrap();
        let now = local(2026, 3, 10, 9, 0);

        let next = schedule.next_occurrence(now).unwrap();
        assert_eq!(next.date_naive(), now.date_naive());
        assert_eq!(next.hour(), 18);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn test_next_occurrence_rolls_to_tomorrow() {
        let schedule = DailySchedule::new("08:00").unwrap();
        let now = local(2026, 3, 10, 9, 0);

        let next = schedule.next_occurrence(now).unwrap();
        assert_eq!(next.date_naive(), now.date_naive().succ_opt().unwrap());
        assert_eq!(next.hour(), 8);
    }

    #[test]
    fn test_next_occurrence_exact_minute_rolls_over() {
        let schedule = DailySchedule::new("09:00").unwrap();
        let now = local(2026, 3, 10, 9, 0);

        // The scheduled instant itself is not "future"
        let next = schedule.next_occurrence(now).unwrap();
        assert_eq!(next.date_naive(), now.date_naive().succ_opt().unwrap());
    }

    #[tokio::test]
    async fn test_clear_disarms() {
        let scheduler = Scheduler::new();
        scheduler.set(DailySchedule::new("12:00").unwrap()).await;
        assert!(matches!(
            scheduler.status().await,
            ScheduleStatus::Armed { .. }
        ));

        scheduler.clear().await;
        assert!(matches!(scheduler.status().await, ScheduleStatus::Disabled));
        assert!(scheduler.current().await.is_none());
    }
}
