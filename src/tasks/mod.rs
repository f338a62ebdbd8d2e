//! Background Tasks Module
//!
//! # Tasks
//! - Usage reporting: drains fire-and-forget usage events into counters

mod usage;

pub use usage::{spawn_usage_task, UsageCounts, UsageEvent, UsageReporter, UsageTally};
