//! Core domain types for the Outpost HR bot.
//!
//! Everything platform-facing lives behind traits in `outpost-platform`;
//! this crate only holds the data model, the error taxonomy, and the
//! process-wide configuration.

pub mod config;
pub mod error;
pub mod scenario;
pub mod session;
pub mod settings;
pub mod task;
pub mod user;

pub use config::BotConfig;
pub use error::OutpostError;
pub use scenario::{ScenarioSpec, ScenarioTag, TrackableAction};
pub use session::MonitoringSession;
pub use settings::RuntimeSettings;
pub use task::{Task, TaskKind, TaskParams};
pub use user::UserRecord;
