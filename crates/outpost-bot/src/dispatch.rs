use std::sync::Arc;

use tracing::error;

use outpost_monitor::{Monitor, MonitorEvent};
use outpost_pipeline::Pipeline;
use outpost_platform::Member;

/// Abstract inbound platform event, as delivered by the adapter.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A member's roles (or profile) changed; `member.roles` is the new set.
    MemberUpdate {
        member: Member,
        old_roles: Vec<String>,
    },
    MemberJoin {
        member: Member,
    },
    MemberLeave {
        user_id: String,
        display_name: String,
    },
    MessageCreate {
        user_id: String,
        channel_id: String,
        author_is_bot: bool,
    },
    MessageEdit {
        user_id: String,
        channel_id: String,
        author_is_bot: bool,
    },
    MessageDelete {
        user_id: String,
        channel_id: String,
    },
    VoiceStateChange {
        user_id: String,
        before_channel: Option<String>,
        after_channel: Option<String>,
    },
    InviteCreate {
        inviter_id: Option<String>,
    },
    ReactionAdd {
        user_id: String,
    },
    ReactionRemove {
        user_id: String,
    },
}

/// Routes inbound events: membership changes onto the per-user event pool
/// (serialized per user), activity events onto the scenario monitor.
pub struct Dispatcher {
    pipeline: Arc<Pipeline>,
    monitor: Arc<Monitor>,
}

impl Dispatcher {
    pub fn new(pipeline: Arc<Pipeline>, monitor: Arc<Monitor>) -> Self {
        Self { pipeline, monitor }
    }

    pub async fn dispatch(&self, event: InboundEvent) {
        match event {
            InboundEvent::MemberUpdate { member, old_roles } => {
                let pipeline = self.pipeline.clone();
                let user_id = member.user_id.clone();
                let submitted = self
                    .pipeline
                    .pool
                    .submit(
                        &user_id,
                        Box::new(move |ctx| {
                            Box::pin(async move {
                                pipeline.handle_role_change(&ctx, &member, &old_roles).await;
                            })
                        }),
                    )
                    .await;
                if let Err(e) = submitted {
                    error!(user_id, error = %e, "dropped member update event");
                }
            }
            InboundEvent::MemberJoin { member } => {
                let pipeline = self.pipeline.clone();
                let user_id = member.user_id.clone();
                let submitted = self
                    .pipeline
                    .pool
                    .submit(
                        &user_id,
                        Box::new(move |ctx| {
                            Box::pin(async move {
                                pipeline.handle_member_join(&ctx, &member).await;
                            })
                        }),
                    )
                    .await;
                if let Err(e) = submitted {
                    error!(user_id, error = %e, "dropped member join event");
                }
            }
            InboundEvent::MemberLeave {
                user_id,
                display_name,
            } => {
                let pipeline = self.pipeline.clone();
                let user = user_id.clone();
                let submitted = self
                    .pipeline
                    .pool
                    .submit(
                        &user_id,
                        Box::new(move |ctx| {
                            Box::pin(async move {
                                pipeline
                                    .handle_member_leave(&ctx, &user, &display_name)
                                    .await;
                            })
                        }),
                    )
                    .await;
                if let Err(e) = submitted {
                    error!(user_id, error = %e, "dropped member leave event");
                }
            }
            InboundEvent::MessageCreate {
                user_id,
                channel_id,
                author_is_bot,
            } => {
                self.monitor
                    .submit_event(MonitorEvent::MessageCreate {
                        user_id,
                        channel_id,
                        author_is_bot,
                    })
                    .await;
            }
            InboundEvent::MessageEdit {
                user_id,
                channel_id,
                author_is_bot,
            } => {
                self.monitor
                    .submit_event(MonitorEvent::MessageEdit {
                        user_id,
                        channel_id,
                        author_is_bot,
                    })
                    .await;
            }
            InboundEvent::MessageDelete { user_id, channel_id } => {
                self.monitor
                    .submit_event(MonitorEvent::MessageDelete { user_id, channel_id })
                    .await;
            }
            InboundEvent::VoiceStateChange {
                user_id,
                before_channel,
                after_channel,
            } => {
                self.monitor
                    .submit_event(MonitorEvent::VoiceStateChange {
                        user_id,
                        before_channel,
                        after_channel,
                    })
                    .await;
            }
            InboundEvent::InviteCreate { inviter_id } => {
                self.monitor
                    .submit_event(MonitorEvent::InviteCreate { inviter_id })
                    .await;
            }
            InboundEvent::ReactionAdd { user_id } => {
                self.monitor
                    .submit_event(MonitorEvent::ReactionAdd { user_id })
                    .await;
            }
            InboundEvent::ReactionRemove { user_id } => {
                self.monitor
                    .submit_event(MonitorEvent::ReactionRemove { user_id })
                    .await;
            }
        }
    }
}
