//! Scenario-based activity monitoring.
//!
//! The [`Monitor`] consumes the raw platform event stream and accumulates
//! per-(user, scenario) analytics according to each scenario's action set and
//! channel allow-list. The [`Rebuilder`] reconstructs those counters from
//! platform history when live accumulation was missed.

mod lifecycle;
mod monitor;
mod rebuild;

pub use monitor::{Monitor, MonitorEvent};
pub use rebuild::{extract_user_id_from_title, RebuildReport, RebuildSummary, Rebuilder};
