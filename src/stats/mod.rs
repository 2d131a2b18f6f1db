//! Daily statistics tracking

mod daily;

pub use daily::{DailyStats, StatsStore};
