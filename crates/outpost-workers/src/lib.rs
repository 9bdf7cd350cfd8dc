//! Background workers: the per-user event pool and the task-queue processor.

pub mod event_pool;
pub mod task_processor;

pub use event_pool::{EventHandler, EventPool};
pub use task_processor::{TaskHandler, TaskProcessor};
