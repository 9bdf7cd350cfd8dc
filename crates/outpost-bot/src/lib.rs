//! Runtime assembly of the Outpost HR bot.
//!
//! The chat-platform adapter is the external collaborator: it implements
//! [`outpost_platform::Gateway`], feeds [`InboundEvent`]s into the
//! [`Dispatcher`], and surfaces [`commands::AdminCommands`] replies. This
//! crate owns everything in between: store, workers, monitor, pipeline, and
//! the ordered shutdown sequence.

pub mod commands;
pub mod dispatch;
pub mod logging;
pub mod runtime;

pub use dispatch::{Dispatcher, InboundEvent};
pub use runtime::Runtime;
