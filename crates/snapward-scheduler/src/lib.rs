//! `snapward-scheduler`: named periodic jobs driven by a Tokio tick loop.
//!
//! # Overview
//!
//! Jobs live in an in-memory [`registry::JobRegistry`]. The
//! [`engine::SchedulerEngine`] wakes every tick (60 s by default), runs each
//! enabled job whose `next_run` has arrived, and records the outcome. A failing
//! job is logged and counted; it never stops the loop or the jobs after it.
//! Finished runs can be appended to a SQLite run log ([`history::RunLog`]).
//!
//! # Cadence variants
//!
//! | Variant    | Behaviour                                          |
//! |------------|----------------------------------------------------|
//! | `Interval` | Repeat every N minutes from registration           |
//! | `Daily`    | Fire at HH:MM UTC every day                        |
//! | `Weekly`   | Fire at HH:MM UTC on a specific weekday            |
//! | `Monthly`  | Fire at HH:MM UTC on a day of the month (clamped)  |

pub mod cadence;
pub mod catalog;
pub mod db;
pub mod engine;
pub mod error;
pub mod history;
pub mod registry;
pub mod types;

pub use catalog::{ActionCatalog, RegistrationReport};
pub use engine::{EngineState, SchedulerEngine, TickSummary};
pub use error::{Result, SchedulerError};
pub use history::{RunLog, RunRecord};
pub use registry::JobRegistry;
pub use types::{action_fn, Cadence, Job, JobAction, JobInfo, RunStatus};
