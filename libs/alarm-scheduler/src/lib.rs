//! Alarm Scheduler - time-driven task scheduler for edge devices
//!
//! A fixed-capacity alarm engine for devices whose real-time clock may be
//! missing or wrong until a time sync completes:
//! - Alarm store with system (startup) and customizable (web-editable) alarms
//! - Minute-window matching with per-alarm dedup cache
//! - Interval alarms anchored on first match
//! - Pluggable persistence for customizable alarms (JSON file by default)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ ClockSource │────▶│  Scheduler   │────▶│ AlarmAction  │
//! │ (local time)│     │ (poll/tick)  │     │ (callbacks)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//!                            │
//!                            ▼
//!                     ┌──────────────┐     ┌──────────────┐
//!                     │  AlarmStore  │────▶│ Persistence  │
//!                     │ (16 slots)   │     │ (JSON file)  │
//!                     └──────────────┘     └──────────────┘
//! ```
//!
//! All access is single-threaded: the host loop owns the scheduler and
//! serializes polls and CRUD calls.

pub mod clock;
mod error;
pub mod persistence;
pub mod report;
mod scheduler;
mod store;
pub mod types;

// Re-export public API
pub use clock::{ClockSource, ClockStatus, ManualClock, SystemClock, WallClockTime};
pub use error::{AlarmError, PersistenceError, Result};
pub use persistence::{
    AlarmDocument, AlarmPersistence, AlarmRecord, JsonFilePersistence, MemoryPersistence,
    NullPersistence,
};
pub use report::{log_all_alarms, AlarmListing, AlarmSnapshot, AlarmStats, CurrentTime};
pub use scheduler::{evaluate, poll_at, AlarmScheduler, PollOutcome, DEFAULT_POLL_MS};
pub use store::{AlarmStore, CustomAlarmSpec, SystemAlarmSpec, MAX_ALARMS};

// Re-export alarm types for convenience
pub use types::{Alarm, AlarmAction, AlarmMeta, DayMask, DedupCache, TimeField, WILDCARD};
