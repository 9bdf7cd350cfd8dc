use chrono::Utc;
use tracing::{debug, error};

use outpost_core::{ScenarioTag, Task, TaskParams};
use outpost_platform::{EventContext, Member};

use crate::messages;
use crate::ops;
use crate::pipeline::Pipeline;

fn has(roles: &[String], role_id: &str) -> bool {
    !role_id.is_empty() && roles.iter().any(|r| r == role_id)
}

impl Pipeline {
    /// Gained-role rule chain, first match wins.
    pub async fn handle_roles_gained(&self, ctx: &EventContext, member: &Member, added: &[String]) {
        if self.welcome_new_recruit(ctx, member, added).await {
            return;
        }
        if self.recruit_authenticated(ctx, member, added).await {
            return;
        }
        if self.new_member_onboarding(ctx, member, added).await {
            return;
        }
        if self.member_receives_guest_role(ctx, member, added).await {
            return;
        }
    }

    /// Recruit role granted (and the user is not the server clown): welcome
    /// them, open their forum thread, start the recruitment-process window.
    async fn welcome_new_recruit(
        &self,
        ctx: &EventContext,
        member: &Member,
        added: &[String],
    ) -> bool {
        if !has(added, &self.roles.recruit) || has(&member.roles, &self.roles.server_clown) {
            return false;
        }
        debug!(trace_id = %ctx.trace_id, user_id = %member.user_id, "welcome new recruit");

        ops::send_channel_message(
            &self.gateway,
            &self.executor,
            ctx,
            &self.channels.recruitment,
            messages::recruitment_welcome(&member.user_id),
        )
        .await;

        if has(&member.roles, &self.roles.newcomer) {
            ops::remove_role(
                &self.gateway,
                &self.executor,
                ctx,
                &member.user_id,
                &self.roles.newcomer,
            )
            .await;
        }

        let thread = self.thread_manager(ctx, &member.user_id).await;
        if !thread.has_thread() {
            thread
                .create_thread(member.display_name(), &member.user_id)
                .await;
        } else {
            thread.reopen_thread().await;
            thread
                .send_message(messages::rejoined_recruitment(member.display_name()))
                .await;
            thread.remove_tags(None).await;
        }

        let now = Utc::now().timestamp();
        if let Err(e) = self.store.set_recruitment_entry(&member.user_id, Some(now)).await {
            error!(trace_id = %ctx.trace_id, error = %e, "failed to record recruitment entry");
        }

        let cleanup_at = now + self.settings.scenario_window_secs(ScenarioTag::RecruitmentProcess);
        match Task::with_scenario(
            TaskParams::RecruitmentCleanup {
                user_id: member.user_id.clone(),
            },
            cleanup_at,
            ScenarioTag::RecruitmentProcess,
        ) {
            Ok(task) => {
                if let Err(e) = self.store.save_task(&task).await {
                    error!(trace_id = %ctx.trace_id, error = %e, "failed to save cleanup task");
                }
            }
            Err(e) => error!(trace_id = %ctx.trace_id, error = %e, "failed to build cleanup task"),
        }

        if let Err(e) = self
            .monitor
            .schedule_reminder_at_midpoint(&member.user_id, now, ScenarioTag::RecruitmentProcess)
            .await
        {
            error!(trace_id = %ctx.trace_id, error = %e, "failed to schedule reminder");
        }

        if let Err(e) = self
            .monitor
            .add_scenario(&member.user_id, ScenarioTag::RecruitmentProcess)
            .await
        {
            error!(trace_id = %ctx.trace_id, error = %e, "failed to attach scenario");
        }
        true
    }

    /// Authentication completed while still a recruit: announce it and
    /// refresh the thread title with the current display name.
    async fn recruit_authenticated(
        &self,
        ctx: &EventContext,
        member: &Member,
        added: &[String],
    ) -> bool {
        if !has(added, &self.roles.authenticated_guest) || !has(&member.roles, &self.roles.recruit)
        {
            return false;
        }
        debug!(trace_id = %ctx.trace_id, user_id = %member.user_id, "recruit authenticated");

        ops::send_channel_message(
            &self.gateway,
            &self.executor,
            ctx,
            &self.channels.recruitment_hub,
            messages::authentication_complete(member.display_name()),
        )
        .await;
        ops::send_direct_message(
            &self.gateway,
            &self.executor,
            ctx,
            &member.user_id,
            messages::AUTHENTICATION_DM,
        )
        .await;

        let thread = self.thread_manager(ctx, &member.user_id).await;
        if thread.has_thread() {
            thread
                .update_title(format!("{} - {}", member.display_name(), member.user_id))
                .await;
            thread
                .send_message(messages::authentication_thread_note(member.display_name()))
                .await;
        }
        true
    }

    /// Accepted into the corporation: reshape roles, welcome them, swap the
    /// recruitment-process scenario for new-recruit tracking, archive the
    /// thread as accepted.
    async fn new_member_onboarding(
        &self,
        ctx: &EventContext,
        member: &Member,
        added: &[String],
    ) -> bool {
        if !has(added, &self.roles.authenticated_member)
            || !(has(&member.roles, &self.roles.recruit)
                || has(&member.roles, &self.roles.authenticated_guest))
        {
            return false;
        }
        debug!(trace_id = %ctx.trace_id, user_id = %member.user_id, "new member onboarding");

        let strip = [
            self.roles.newcomer.clone(),
            self.roles.recruit.clone(),
            self.roles.guest.clone(),
        ];
        ops::remove_roles(&self.gateway, &self.executor, ctx, &member.user_id, &strip).await;
        ops::add_roles(
            &self.gateway,
            &self.executor,
            ctx,
            &member.user_id,
            &self.roles.content_notification(),
        )
        .await;

        let welcome = messages::member_join_welcome(member.display_name(), &member.user_id);
        ops::send_channel_message(
            &self.gateway,
            &self.executor,
            ctx,
            &self.channels.general,
            welcome.clone(),
        )
        .await;
        ops::send_direct_message(&self.gateway, &self.executor, ctx, &member.user_id, welcome)
            .await;

        if let Err(e) = self
            .monitor
            .remove_scenario(&member.user_id, ScenarioTag::RecruitmentProcess)
            .await
        {
            // Not every new member came through recruitment tracking.
            debug!(trace_id = %ctx.trace_id, error = %e, "no recruitment scenario to revoke");
        }

        let tracking_days = self.settings.new_recruit_tracking_days();
        let tracking_secs = self.settings.scenario_window_secs(ScenarioTag::NewRecruit);
        if let Err(e) = self
            .monitor
            .add_user_tracking(&member.user_id, ScenarioTag::NewRecruit, tracking_secs)
            .await
        {
            error!(trace_id = %ctx.trace_id, error = %e, "failed to attach new recruit scenario");
        }

        let checkin_at = Utc::now().timestamp() + tracking_secs;
        match Task::with_scenario(
            TaskParams::UserCheckin {
                user_id: member.user_id.clone(),
            },
            checkin_at,
            ScenarioTag::NewRecruit,
        ) {
            Ok(task) => {
                if let Err(e) = self.store.save_task(&task).await {
                    error!(trace_id = %ctx.trace_id, error = %e, "failed to save checkin task");
                }
            }
            Err(e) => error!(trace_id = %ctx.trace_id, error = %e, "failed to build checkin task"),
        }

        let thread = self.thread_manager(ctx, &member.user_id).await;
        if thread.has_thread() {
            thread
                .send_message(messages::JOINED_CORPORATION_MESSAGE)
                .await;
            thread
                .send_message(messages::checkin_scheduled(tracking_days))
                .await;
            thread.close_thread(Some("Accepted")).await;
        }
        true
    }

    /// Guest role granted: drop the newcomer role.
    async fn member_receives_guest_role(
        &self,
        ctx: &EventContext,
        member: &Member,
        added: &[String],
    ) -> bool {
        if !has(added, &self.roles.guest) {
            return false;
        }
        debug!(trace_id = %ctx.trace_id, user_id = %member.user_id, "guest role granted");
        ops::remove_role(
            &self.gateway,
            &self.executor,
            ctx,
            &member.user_id,
            &self.roles.newcomer,
        )
        .await;
        true
    }
}
