//! Run event notifications
//!
//! Every state transition of a run (started, progress, per-query failure,
//! completed, stopped, errored) is emitted as an event: logged, fanned out
//! on a broadcast channel for live subscribers, and retained in a bounded
//! ring served by the API. A run always reaches exactly one terminal event.

use std::collections::VecDeque;
use tokio::sync::{RwLock, broadcast};
use tracing::{info, warn};

/// How many recent events the API snapshot retains
const RECENT_CAPACITY: usize = 100;

/// Notification emitted at each run state transition.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum RunEvent {
    Started {
        total: usize,
        topics: Vec<String>,
    },
    QueriesGenerated {
        count: usize,
    },
    Progress {
        current: usize,
        total: usize,
        query: String,
    },
    SearchFailed {
        current: usize,
        total: usize,
        error: String,
    },
    Completed {
        executed: usize,
        total: usize,
    },
    Stopped {
        executed: usize,
        total: usize,
    },
    Errored {
        message: String,
    },
    ScheduledRunStarted {
        time: String,
    },
}

impl RunEvent {
    /// Whether this event ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunEvent::Completed { .. } | RunEvent::Stopped { .. } | RunEvent::Errored { .. }
        )
    }
}

/// Fan-out point for run events.
pub struct Notifier {
    tx: broadcast::Sender<RunEvent>,
    recent: RwLock<VecDeque<RunEvent>>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(RECENT_CAPACITY)),
        }
    }

    /// Emit an event: log it, buffer it, broadcast it.
    pub async fn emit(&self, event: RunEvent) {
        match &event {
            RunEvent::Started { total, topics } => {
                info!("Automation started: {} searches, topics {:?}", total, topics);
            }
            RunEvent::QueriesGenerated { count } => {
                info!("Generated {} search queries", count);
            }
            RunEvent::Progress { current, total, query } => {
                info!("Search {}/{} done: {}", current, total, query);
            }
            RunEvent::SearchFailed { current, total, error } => {
                warn!("Search {}/{} failed: {}", current, total, error);
            }
            RunEvent::Completed { executed, total } => {
                info!("Automation completed: {}/{} searches", executed, total);
            }
            RunEvent::Stopped { executed, total } => {
                info!("Automation stopped at {}/{} searches", executed, total);
            }
            RunEvent::Errored { message } => {
                warn!("Automation errored: {}", message);
            }
            RunEvent::ScheduledRunStarted { time } => {
                info!("Scheduled run triggered at {}", time);
            }
        }

        {
            let mut recent = self.recent.write().await;
            if recent.len() == RECENT_CAPACITY {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }

        // No receivers is fine - the ring buffer still has the event
        let _ = self.tx.send(event);
    }

    /// Subscribe to live events
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }

    /// Snapshot of recent events, oldest first
    pub async fn recent(&self) -> Vec<RunEvent> {
        self.recent.read().await.iter().cloned().collect()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_retains_recent_events() {
        let notifier = Notifier::new();
        notifier.emit(RunEvent::QueriesGenerated { count: 3 }).await;
        notifier
            .emit(RunEvent::Progress {
                current: 1,
                total: 3,
                query: "a".into(),
            })
            .await;

        let recent = notifier.recent().await;
        assert_eq!(recent.len(), 2);
        assert!(matches!(recent[0], RunEvent::QueriesGenerated { count: 3 }));
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        notifier
            .emit(RunEvent::Completed {
                executed: 2,
                total: 2,
            })
            .await;

        let event = rx.recv().await.expect("event");
        assert!(event.is_terminal());
    }

    #[tokio::test]
    async fn test_ring_buffer_is_bounded() {
        let notifier = Notifier::new();
        for i in 0..150 {
            notifier.emit(RunEvent::QueriesGenerated { count: i }).await;
        }
        assert_eq!(notifier.recent().await.len(), RECENT_CAPACITY);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(RunEvent::Stopped {
            executed: 1,
            total: 3,
        })
        .unwrap();
        assert_eq!(json["type"], "stopped");
        assert_eq!(json["data"]["executed"], 1);
    }
}
