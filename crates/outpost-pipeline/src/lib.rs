//! The recruitment pipeline: role-diff handlers, join/leave handlers, and
//! the scheduled-task handlers that review recruits after their window.

pub mod membership;
pub mod messages;
pub mod ops;
pub mod pipeline;
pub mod role_diff;
pub mod roles_gained;
pub mod roles_lost;
pub mod tasks;

pub use pipeline::Pipeline;
pub use role_diff::diff_roles;
