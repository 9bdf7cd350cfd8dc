//! Platform-facing seam of the Outpost HR bot.
//!
//! The chat platform is an external collaborator: the core reads through the
//! [`Gateway`] trait and performs every mutation by enqueueing a thunk on the
//! [`ApiExecutor`], which serializes all outbound calls with a minimum
//! inter-call spacing.

pub mod context;
pub mod executor;
pub mod gateway;
pub mod mock;
pub mod snowflake;
pub mod thread_manager;

pub use context::EventContext;
pub use executor::{ApiExecutor, ApiThunk};
pub use gateway::{
    AuditAction, AuditEntry, ChannelInfo, ChannelKind, Embed, EmbedField, ForumTag, Gateway,
    Member, MessageRecord, ThreadEdit, ThreadInfo,
};
pub use thread_manager::ThreadManager;
