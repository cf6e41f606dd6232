//! Scheduler layer
//!
//! Fires pipeline runs on a cron schedule and keeps runs from
//! overlapping.

pub mod trigger;

pub use trigger::{RunTrigger, parse_schedule};
