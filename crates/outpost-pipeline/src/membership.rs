use chrono::Utc;
use tracing::{error, info};

use outpost_core::UserRecord;
use outpost_platform::{EventContext, Member};

use crate::messages;
use crate::ops;
use crate::pipeline::Pipeline;

impl Pipeline {
    /// A user joined the server: roll their join timestamps and post the
    /// landing-channel welcome.
    pub async fn handle_member_join(&self, ctx: &EventContext, member: &Member) {
        let now = Utc::now().timestamp();
        let mut record = match self.store.get_user(&member.user_id).await {
            Ok(Some(record)) => record,
            Ok(None) => UserRecord::new(&member.user_id),
            Err(e) => {
                error!(trace_id = %ctx.trace_id, error = %e, "failed to load user record");
                UserRecord::new(&member.user_id)
            }
        };
        record.record_join(now);
        record.current_display_name = member.display_name().to_string();
        if let Err(e) = self.store.put_user(&record).await {
            error!(trace_id = %ctx.trace_id, error = %e, "failed to save user record");
        } else {
            info!(
                trace_id = %ctx.trace_id,
                user_id = %member.user_id,
                rejoining = record.previous_join_ts.is_some(),
                "user record updated on join"
            );
        }

        ops::send_channel_message(
            &self.gateway,
            &self.executor,
            ctx,
            &self.channels.landing,
            messages::landing_welcome(&member.user_id),
        )
        .await;
    }

    /// A user left the server entirely: notify the leavers channel, close
    /// their recruitment thread, and drop all tracking.
    pub async fn handle_member_leave(&self, ctx: &EventContext, user_id: &str, display_name: &str) {
        ops::send_channel_message(
            &self.gateway,
            &self.executor,
            ctx,
            &self.channels.leavers,
            messages::leaver_notice(display_name),
        )
        .await;

        let thread = self.thread_manager(ctx, user_id).await;
        thread
            .send_message_and_close(messages::left_server(display_name), "Left Server")
            .await;

        if let Err(e) = self.monitor.remove_all_scenarios(user_id).await {
            error!(trace_id = %ctx.trace_id, error = %e, "failed to clear scenarios on leave");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_rig::{forum_channel, pipeline};
    use outpost_core::ScenarioTag;
    use outpost_platform::mock::{GatewayCall, MockGateway};
    use outpost_platform::ThreadInfo;
    use std::sync::Arc;

    fn member(user: &str, name: &str) -> Member {
        Member {
            user_id: user.into(),
            username: name.to_lowercase(),
            global_name: name.into(),
            nickname: String::new(),
            roles: vec![],
        }
    }

    #[tokio::test]
    async fn join_rolls_timestamps_and_welcomes() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        let p = pipeline(mock.clone());
        let ctx = EventContext::new("100");

        p.handle_member_join(&ctx, &member("100", "Rook")).await;
        let first = p.store.get_user("100").await.unwrap().unwrap();
        assert!(first.current_join_ts.is_some());
        assert_eq!(first.previous_join_ts, None);
        assert_eq!(first.current_display_name, "Rook");

        p.handle_member_join(&ctx, &member("100", "Rook")).await;
        let second = p.store.get_user("100").await.unwrap().unwrap();
        assert_eq!(second.previous_join_ts, first.current_join_ts);

        p.executor.shutdown().await;
        let landings = mock
            .calls()
            .iter()
            .filter(|c| matches!(c, GatewayCall::SendMessage { channel_id, .. } if channel_id == "c-landing"))
            .count();
        assert_eq!(landings, 2);
    }

    #[tokio::test]
    async fn leave_closes_thread_and_clears_tracking() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        mock.push_thread(ThreadInfo {
            id: "t1".into(),
            parent_id: "c-forum".into(),
            title: "Rook - 100".into(),
            archived: false,
            applied_tags: vec![],
            archived_at: None,
        });
        let p = pipeline(mock.clone());
        p.monitor
            .add_scenario("100", ScenarioTag::NewRecruit)
            .await
            .unwrap();

        p.handle_member_leave(&EventContext::new("100"), "100", "Rook")
            .await;
        p.executor.shutdown().await;

        let calls = mock.calls();
        assert!(calls.iter().any(|c| matches!(
            c,
            GatewayCall::SendMessage { channel_id, .. } if channel_id == "c-leavers"
        )));
        assert!(calls.iter().any(|c| matches!(
            c,
            GatewayCall::EditThread { thread_id, edit }
                if thread_id == "t1"
                    && edit.archived == Some(true)
                    && edit.applied_tags == Some(vec!["tag-left".to_string()])
        )));
        assert!(!p.monitor.is_tracked("100").await);
    }
}
