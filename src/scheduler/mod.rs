//! Daily schedule management

mod runner;

pub use runner::{DailySchedule, ScheduleStatus, Scheduler, parse_time};
