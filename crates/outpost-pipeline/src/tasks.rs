//! Handlers for the three scheduled task kinds.
//!
//! Cleanup and check-in delegate onto the per-user event pool so they
//! serialize with the user's live events; the reminder runs inline. Every
//! handler deletes its task only after doing its work, so a failed run is
//! re-fetched on a later tick.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use outpost_core::{ScenarioTag, Task, TaskKind};
use outpost_platform::EventContext;
use outpost_workers::{TaskHandler, TaskProcessor};

use crate::messages;
use crate::ops;
use crate::pipeline::Pipeline;

/// Register all task handlers on the processor.
pub fn register_task_handlers(processor: &mut TaskProcessor, pipeline: Arc<Pipeline>) {
    processor.register(
        TaskKind::RecruitmentCleanup,
        Arc::new(RecruitmentCleanupHandler {
            pipeline: pipeline.clone(),
        }),
    );
    processor.register(
        TaskKind::UserCheckin,
        Arc::new(UserCheckinHandler {
            pipeline: pipeline.clone(),
        }),
    );
    processor.register(
        TaskKind::RecruitmentReminder,
        Arc::new(RecruitmentReminderHandler { pipeline }),
    );
    info!("task handlers registered");
}

pub struct RecruitmentCleanupHandler {
    pipeline: Arc<Pipeline>,
}

#[async_trait]
impl TaskHandler for RecruitmentCleanupHandler {
    async fn handle(&self, task: Task) -> anyhow::Result<()> {
        let user_id = task.typed_params()?.target_user().to_string();
        let pipeline = self.pipeline.clone();
        self.pipeline
            .pool
            .submit(
                &user_id,
                Box::new(move |ctx| {
                    Box::pin(async move {
                        pipeline.run_recruitment_cleanup(&ctx, &task).await;
                    })
                }),
            )
            .await?;
        Ok(())
    }
}

pub struct UserCheckinHandler {
    pipeline: Arc<Pipeline>,
}

#[async_trait]
impl TaskHandler for UserCheckinHandler {
    async fn handle(&self, task: Task) -> anyhow::Result<()> {
        let user_id = task.typed_params()?.target_user().to_string();
        let pipeline = self.pipeline.clone();
        self.pipeline
            .pool
            .submit(
                &user_id,
                Box::new(move |ctx| {
                    Box::pin(async move {
                        pipeline.run_user_checkin(&ctx, &task).await;
                    })
                }),
            )
            .await?;
        Ok(())
    }
}

pub struct RecruitmentReminderHandler {
    pipeline: Arc<Pipeline>,
}

#[async_trait]
impl TaskHandler for RecruitmentReminderHandler {
    async fn handle(&self, task: Task) -> anyhow::Result<()> {
        self.pipeline.run_recruitment_reminder(&task).await
    }
}

impl Pipeline {
    /// End-of-window review of a recruit. Activity keeps the role; silence
    /// strips it and closes the thread. Either way the task and the
    /// recruitment-process scenario are retired.
    pub async fn run_recruitment_cleanup(&self, ctx: &EventContext, task: &Task) {
        let user_id = &ctx.user_id;
        let counters = match self
            .store
            .counters_for_scenario(user_id, ScenarioTag::RecruitmentProcess)
            .await
        {
            Ok(counters) => counters,
            Err(e) => {
                error!(trace_id = %ctx.trace_id, error = %e, "failed to read recruitment analytics");
                return;
            }
        };
        let has_activity = counters.get("messages").copied().unwrap_or(0) > 0;
        debug!(
            trace_id = %ctx.trace_id,
            user_id,
            has_activity,
            "recruitment cleanup check"
        );

        let thread = self.thread_manager(ctx, user_id).await;
        if has_activity {
            // Thread is optional here; roles stay untouched.
            thread.send_message(messages::CLEANUP_KEPT_MESSAGE).await;
        } else {
            ops::remove_role(
                &self.gateway,
                &self.executor,
                ctx,
                user_id,
                &self.roles.recruit,
            )
            .await;
            thread.send_message(messages::CLEANUP_REMOVED_MESSAGE).await;
            thread.close_thread(Some("Newbie role removed")).await;
        }

        if let Err(e) = self.store.delete_task(&task.task_id).await {
            error!(trace_id = %ctx.trace_id, error = %e, "failed to delete cleanup task");
            return;
        }
        if let Err(e) = self
            .monitor
            .remove_scenario(user_id, ScenarioTag::RecruitmentProcess)
            .await
        {
            debug!(trace_id = %ctx.trace_id, error = %e, "no recruitment scenario to remove");
        }
    }

    /// First-week check-in: post the activity summary to the hub and, when a
    /// thread exists, briefly reopen it to append the summary.
    pub async fn run_user_checkin(&self, ctx: &EventContext, task: &Task) {
        let user_id = &ctx.user_id;
        let member = match self.gateway.member(user_id).await {
            Ok(member) => member,
            Err(e) => {
                // Leave the task queued; the member lookup may be transient.
                error!(trace_id = %ctx.trace_id, error = %e, "failed to fetch member for checkin");
                return;
            }
        };
        let counters = match self
            .store
            .counters_for_scenario(user_id, ScenarioTag::NewRecruit)
            .await
        {
            Ok(counters) => counters,
            Err(e) => {
                error!(trace_id = %ctx.trace_id, error = %e, "failed to read new recruit analytics");
                return;
            }
        };
        let top_channel = self
            .store
            .top_channel(user_id, ScenarioTag::NewRecruit)
            .await
            .unwrap_or(None);

        let embed = messages::checkin_embed(
            member.display_name(),
            counters.get("messages").copied().unwrap_or(0),
            counters.get("voice_joins").copied().unwrap_or(0),
            counters.get("invites").copied().unwrap_or(0),
            top_channel.as_deref(),
        );

        ops::send_channel_embed(
            &self.gateway,
            &self.executor,
            ctx,
            &self.channels.recruitment_hub,
            embed.clone(),
        )
        .await;

        let thread = self.thread_manager(ctx, user_id).await;
        if thread.has_thread() {
            thread.reopen_thread().await;
            thread.send_embed(embed).await;
            thread.close_thread(None).await;
        }

        if let Err(e) = self.store.delete_task(&task.task_id).await {
            error!(trace_id = %ctx.trace_id, error = %e, "failed to delete checkin task");
            return;
        }
        if let Err(e) = self
            .monitor
            .remove_scenario(user_id, ScenarioTag::NewRecruit)
            .await
        {
            debug!(trace_id = %ctx.trace_id, error = %e, "no new recruit scenario to remove");
        }
    }

    /// Mid-window nudge for recruits who have gone quiet. Authenticated and
    /// active users need no reminder.
    pub async fn run_recruitment_reminder(&self, task: &Task) -> anyhow::Result<()> {
        let user_id = task.typed_params()?.target_user().to_string();
        let ctx = EventContext::for_task(&user_id, &task.task_id);

        let member = self.gateway.member(&user_id).await?;
        let counters = self
            .store
            .counters_for_scenario(&user_id, ScenarioTag::RecruitmentProcess)
            .await?;
        let message_count = counters.get("messages").copied().unwrap_or(0);
        let authenticated = member.has_role(&self.roles.authenticated_guest);

        if authenticated && message_count > 0 {
            info!(
                trace_id = %ctx.trace_id,
                user_id,
                message_count,
                "authenticated and active, no reminder needed"
            );
            self.store.delete_task(&task.task_id).await?;
            return Ok(());
        }

        let message = if authenticated {
            messages::reminder_authenticated(&user_id)
        } else {
            messages::reminder_unauthenticated(&user_id)
        };
        ops::send_channel_message(
            &self.gateway,
            &self.executor,
            &ctx,
            &self.channels.recruitment,
            message,
        )
        .await;

        self.store.delete_task(&task.task_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_rig::{forum_channel, pipeline};
    use chrono::Utc;
    use outpost_core::TaskParams;
    use outpost_platform::mock::{GatewayCall, MockGateway};
    use outpost_platform::{Member, ThreadInfo};
    use std::sync::Arc;

    fn thread_for(user: &str) -> ThreadInfo {
        ThreadInfo {
            id: format!("t-{user}"),
            parent_id: "c-forum".into(),
            title: format!("Rook - {user}"),
            archived: false,
            applied_tags: vec![],
            archived_at: None,
        }
    }

    fn member(user: &str, roles: &[&str]) -> Member {
        Member {
            user_id: user.into(),
            username: "rook".into(),
            global_name: "Rook".into(),
            nickname: String::new(),
            roles: roles.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn cleanup_task(user: &str) -> Task {
        Task::with_scenario(
            TaskParams::RecruitmentCleanup {
                user_id: user.into(),
            },
            Utc::now().timestamp(),
            ScenarioTag::RecruitmentProcess,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn active_recruit_keeps_role_and_gets_confirmation() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        mock.push_thread(thread_for("100"));
        let p = pipeline(mock.clone());
        p.monitor
            .add_scenario("100", ScenarioTag::RecruitmentProcess)
            .await
            .unwrap();
        p.store
            .incr_counter("100", ScenarioTag::RecruitmentProcess, "messages", 1)
            .await
            .unwrap();
        let task = cleanup_task("100");
        p.store.save_task(&task).await.unwrap();

        let handler = RecruitmentCleanupHandler { pipeline: p.clone() };
        handler.handle(task.clone()).await.unwrap();
        p.pool.shutdown().await;
        p.executor.shutdown().await;

        let calls = mock.calls();
        assert!(calls.iter().any(|c| matches!(
            c,
            GatewayCall::SendMessage { channel_id, content }
                if channel_id == "t-100" && content == messages::CLEANUP_KEPT_MESSAGE
        )));
        assert!(
            !calls
                .iter()
                .any(|c| matches!(c, GatewayCall::RemoveRole { .. })),
            "role is kept"
        );
        assert!(p.store.load_task(&task.task_id).await.unwrap().is_none());
        assert!(!p.monitor.is_tracked("100").await);
    }

    #[tokio::test]
    async fn silent_recruit_loses_role_and_thread_is_tagged() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        mock.push_thread(thread_for("100"));
        let p = pipeline(mock.clone());
        p.monitor
            .add_scenario("100", ScenarioTag::RecruitmentProcess)
            .await
            .unwrap();
        let task = cleanup_task("100");
        p.store.save_task(&task).await.unwrap();

        let handler = RecruitmentCleanupHandler { pipeline: p.clone() };
        handler.handle(task.clone()).await.unwrap();
        p.pool.shutdown().await;
        p.executor.shutdown().await;

        let calls = mock.calls();
        assert!(calls.contains(&GatewayCall::RemoveRole {
            user_id: "100".into(),
            role_id: "r-recruit".into(),
        }));
        assert!(calls.iter().any(|c| matches!(
            c,
            GatewayCall::EditThread { thread_id, edit }
                if thread_id == "t-100"
                    && edit.archived == Some(true)
                    && edit.applied_tags == Some(vec!["tag-removed".to_string()])
        )));
        assert!(p.store.load_task(&task.task_id).await.unwrap().is_none());
        assert!(!p.monitor.is_tracked("100").await);
    }

    #[tokio::test]
    async fn cleanup_without_thread_still_retires_task() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        let p = pipeline(mock.clone());
        p.monitor
            .add_scenario("100", ScenarioTag::RecruitmentProcess)
            .await
            .unwrap();
        let task = cleanup_task("100");
        p.store.save_task(&task).await.unwrap();

        let handler = RecruitmentCleanupHandler { pipeline: p.clone() };
        handler.handle(task.clone()).await.unwrap();
        p.pool.shutdown().await;
        p.executor.shutdown().await;

        assert!(p.store.load_task(&task.task_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn checkin_posts_summary_to_hub_and_thread() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        mock.push_thread(thread_for("100"));
        mock.push_member(member("100", &[]));
        let p = pipeline(mock.clone());
        p.monitor
            .add_scenario("100", ScenarioTag::NewRecruit)
            .await
            .unwrap();
        p.store
            .incr_counter("100", ScenarioTag::NewRecruit, "messages", 12)
            .await
            .unwrap();
        p.store
            .incr_channel("100", ScenarioTag::NewRecruit, "c-general", 12)
            .await
            .unwrap();

        let task = Task::with_scenario(
            TaskParams::UserCheckin {
                user_id: "100".into(),
            },
            Utc::now().timestamp(),
            ScenarioTag::NewRecruit,
        )
        .unwrap();
        p.store.save_task(&task).await.unwrap();

        let handler = UserCheckinHandler { pipeline: p.clone() };
        handler.handle(task.clone()).await.unwrap();
        p.pool.shutdown().await;
        p.executor.shutdown().await;

        let calls = mock.calls();
        assert!(calls.iter().any(|c| matches!(
            c,
            GatewayCall::SendEmbed { channel_id, title }
                if channel_id == "c-hub" && title.contains("First Week")
        )));
        // Thread cycle: reopen, embed, re-archive.
        assert!(calls.iter().any(|c| matches!(
            c,
            GatewayCall::EditThread { thread_id, edit }
                if thread_id == "t-100" && edit.archived == Some(false)
        )));
        assert!(calls.iter().any(|c| matches!(
            c,
            GatewayCall::SendEmbed { channel_id, .. } if channel_id == "t-100"
        )));
        assert!(calls.iter().any(|c| matches!(
            c,
            GatewayCall::EditThread { thread_id, edit }
                if thread_id == "t-100" && edit.archived == Some(true)
        )));
        assert!(p.store.load_task(&task.task_id).await.unwrap().is_none());
        assert!(!p.monitor.is_tracked("100").await);
    }

    #[tokio::test]
    async fn reminder_skips_authenticated_active_users() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        mock.push_member(member("100", &["r-auth-guest"]));
        let p = pipeline(mock.clone());
        p.store
            .incr_counter("100", ScenarioTag::RecruitmentProcess, "messages", 3)
            .await
            .unwrap();
        let task = Task::with_scenario(
            TaskParams::RecruitmentReminder {
                user_id: "100".into(),
            },
            Utc::now().timestamp(),
            ScenarioTag::RecruitmentProcess,
        )
        .unwrap();
        p.store.save_task(&task).await.unwrap();

        let handler = RecruitmentReminderHandler { pipeline: p.clone() };
        handler.handle(task.clone()).await.unwrap();
        p.executor.shutdown().await;

        assert!(
            !mock
                .calls()
                .iter()
                .any(|c| matches!(c, GatewayCall::SendMessage { .. })),
            "no reminder for active authenticated users"
        );
        assert!(p.store.load_task(&task.task_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reminder_wording_depends_on_authentication() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        mock.push_member(member("100", &[]));
        let p = pipeline(mock.clone());
        let task = Task::with_scenario(
            TaskParams::RecruitmentReminder {
                user_id: "100".into(),
            },
            Utc::now().timestamp(),
            ScenarioTag::RecruitmentProcess,
        )
        .unwrap();
        p.store.save_task(&task).await.unwrap();

        let handler = RecruitmentReminderHandler { pipeline: p.clone() };
        handler.handle(task.clone()).await.unwrap();
        p.executor.shutdown().await;

        assert!(mock.calls().iter().any(|c| matches!(
            c,
            GatewayCall::SendMessage { channel_id, content }
                if channel_id == "c-recruit"
                    && content.contains("<@100>")
                    && content.contains("complete the authentication steps")
        )));
        assert!(p.store.load_task(&task.task_id).await.unwrap().is_none());
    }
}
