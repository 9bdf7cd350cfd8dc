use tracing::{debug, error};

use outpost_core::ScenarioTag;
use outpost_platform::gateway::was_action_initiated_by_bot;
use outpost_platform::{AuditAction, EventContext, Member};

use crate::messages;
use crate::ops;
use crate::pipeline::Pipeline;

fn has(roles: &[String], role_id: &str) -> bool {
    !role_id.is_empty() && roles.iter().any(|r| r == role_id)
}

impl Pipeline {
    /// Lost-role rule chain, first match wins.
    pub async fn handle_roles_lost(&self, ctx: &EventContext, member: &Member, removed: &[String]) {
        if self.member_leaves_corporation(ctx, member, removed).await {
            return;
        }
        if self.member_loses_blue_role(ctx, member, removed).await {
            return;
        }
        if self.member_loses_recruit_role(ctx, member, removed).await {
            return;
        }
    }

    /// Member role lost: back to guest, all tracking revoked, HR notified.
    async fn member_leaves_corporation(
        &self,
        ctx: &EventContext,
        member: &Member,
        removed: &[String],
    ) -> bool {
        if !has(removed, &self.roles.member) {
            return false;
        }
        debug!(trace_id = %ctx.trace_id, user_id = %member.user_id, "member leaves corporation");

        ops::remove_roles(
            &self.gateway,
            &self.executor,
            ctx,
            &member.user_id,
            &self.roles.content_notification(),
        )
        .await;
        ops::remove_role(
            &self.gateway,
            &self.executor,
            ctx,
            &member.user_id,
            &self.roles.absentee,
        )
        .await;
        ops::add_role(
            &self.gateway,
            &self.executor,
            ctx,
            &member.user_id,
            &self.roles.guest,
        )
        .await;

        if let Err(e) = self.monitor.remove_all_scenarios(&member.user_id).await {
            error!(trace_id = %ctx.trace_id, error = %e, "failed to revoke scenarios");
        }

        ops::send_channel_message(
            &self.gateway,
            &self.executor,
            ctx,
            &self.channels.hr,
            messages::hr_departure_notice(member.display_name()),
        )
        .await;
        true
    }

    /// Blue standing lost: the user falls back to guest.
    async fn member_loses_blue_role(
        &self,
        ctx: &EventContext,
        member: &Member,
        removed: &[String],
    ) -> bool {
        if !has(removed, &self.roles.blue) {
            return false;
        }
        debug!(trace_id = %ctx.trace_id, user_id = %member.user_id, "blue role lost");
        ops::add_role(
            &self.gateway,
            &self.executor,
            ctx,
            &member.user_id,
            &self.roles.guest,
        )
        .await;
        true
    }

    /// Recruit role lost without becoming a member, and not by the bot's
    /// own hand: the user dropped out of recruitment.
    async fn member_loses_recruit_role(
        &self,
        ctx: &EventContext,
        member: &Member,
        removed: &[String],
    ) -> bool {
        if !has(removed, &self.roles.recruit) || has(&member.roles, &self.roles.member) {
            return false;
        }
        // The cleanup task removes this role itself; reacting to that audit
        // entry would double-revoke the scenario.
        if was_action_initiated_by_bot(
            self.gateway.as_ref(),
            &member.user_id,
            AuditAction::MemberRoleUpdate,
        )
        .await
        {
            debug!(
                trace_id = %ctx.trace_id,
                user_id = %member.user_id,
                "recruit role removed by the bot, skipping"
            );
            return true;
        }
        debug!(trace_id = %ctx.trace_id, user_id = %member.user_id, "recruit role lost");

        if let Err(e) = self.store.set_recruitment_entry(&member.user_id, None).await {
            error!(trace_id = %ctx.trace_id, error = %e, "failed to clear recruitment entry");
        }

        let thread = self.thread_manager(ctx, &member.user_id).await;
        thread
            .send_message(messages::left_recruitment(member.display_name()))
            .await;

        if let Err(e) = self
            .monitor
            .remove_scenario(&member.user_id, ScenarioTag::RecruitmentProcess)
            .await
        {
            debug!(trace_id = %ctx.trace_id, error = %e, "no recruitment scenario to revoke");
        }
        true
    }
}
