//! In-memory gateway double for tests.
//!
//! Holds scripted members, channels, threads, messages and audit entries,
//! and records every mutation so tests can assert on the outbound traffic.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::gateway::{
    AuditAction, AuditEntry, ChannelInfo, ChannelKind, Embed, Gateway, Member, MessageRecord,
    ThreadEdit, ThreadInfo,
};
use crate::snowflake::PLATFORM_EPOCH_MS;

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    AddRole { user_id: String, role_id: String },
    RemoveRole { user_id: String, role_id: String },
    SendMessage { channel_id: String, content: String },
    SendEmbed { channel_id: String, title: String },
    SendDirectMessage { user_id: String, content: String },
    CreateThread { parent_id: String, title: String },
    EditThread { thread_id: String, edit: ThreadEdit },
}

#[derive(Default)]
struct MockState {
    members: HashMap<String, Member>,
    channels: Vec<ChannelInfo>,
    threads: Vec<ThreadInfo>,
    /// channel/thread id → messages, newest first.
    messages: HashMap<String, Vec<MessageRecord>>,
    /// action → entries, newest first.
    audit: HashMap<AuditAction, Vec<AuditEntry>>,
    calls: Vec<GatewayCall>,
    next_id: u64,
}

pub struct MockGateway {
    bot_id: String,
    state: Mutex<MockState>,
}

/// Build a snowflake id string whose decoded timestamp is `unix_secs`.
pub fn encode_snowflake(unix_secs: i64) -> String {
    let ms = unix_secs * 1000 - PLATFORM_EPOCH_MS;
    ((ms as u64) << 22).to_string()
}

impl MockGateway {
    pub fn new(bot_id: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn push_member(&self, member: Member) {
        let mut s = self.state.lock().unwrap();
        s.members.insert(member.user_id.clone(), member);
    }

    pub fn push_channel(&self, channel: ChannelInfo) {
        self.state.lock().unwrap().channels.push(channel);
    }

    pub fn push_thread(&self, thread: ThreadInfo) {
        self.state.lock().unwrap().threads.push(thread);
    }

    /// Prepend a message (messages are stored newest first).
    pub fn push_message(&self, message: MessageRecord) {
        let mut s = self.state.lock().unwrap();
        s.messages
            .entry(message.channel_id.clone())
            .or_default()
            .insert(0, message);
    }

    pub fn push_audit(&self, entry: AuditEntry) {
        let mut s = self.state.lock().unwrap();
        s.audit.entry(entry.action).or_default().insert(0, entry);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Convenience channel with no forum tags.
    pub fn text_channel(id: &str, name: &str) -> ChannelInfo {
        ChannelInfo {
            id: id.into(),
            name: name.into(),
            kind: ChannelKind::Text,
            available_tags: vec![],
        }
    }
}

#[async_trait]
impl Gateway for MockGateway {
    fn bot_user_id(&self) -> &str {
        &self.bot_id
    }

    async fn member(&self, user_id: &str) -> Result<Member> {
        self.state
            .lock()
            .unwrap()
            .members
            .get(user_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown member {user_id}"))
    }

    async fn add_role(&self, user_id: &str, role_id: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        if let Some(m) = s.members.get_mut(user_id) {
            if !m.roles.iter().any(|r| r == role_id) {
                m.roles.push(role_id.to_string());
            }
        }
        s.calls.push(GatewayCall::AddRole {
            user_id: user_id.into(),
            role_id: role_id.into(),
        });
        Ok(())
    }

    async fn remove_role(&self, user_id: &str, role_id: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        if let Some(m) = s.members.get_mut(user_id) {
            m.roles.retain(|r| r != role_id);
        }
        s.calls.push(GatewayCall::RemoveRole {
            user_id: user_id.into(),
            role_id: role_id.into(),
        });
        Ok(())
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.next_id += 1;
        let id = s.next_id.to_string();
        let bot = self.bot_id.clone();
        s.messages
            .entry(channel_id.to_string())
            .or_default()
            .insert(
                0,
                MessageRecord {
                    id,
                    channel_id: channel_id.into(),
                    author_id: bot,
                    content: content.into(),
                    timestamp: 0,
                },
            );
        s.calls.push(GatewayCall::SendMessage {
            channel_id: channel_id.into(),
            content: content.into(),
        });
        Ok(())
    }

    async fn send_embed(&self, channel_id: &str, embed: &Embed) -> Result<()> {
        self.state.lock().unwrap().calls.push(GatewayCall::SendEmbed {
            channel_id: channel_id.into(),
            title: embed.title.clone(),
        });
        Ok(())
    }

    async fn send_direct_message(&self, user_id: &str, content: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(GatewayCall::SendDirectMessage {
                user_id: user_id.into(),
                content: content.into(),
            });
        Ok(())
    }

    async fn channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .channels
            .iter()
            .find(|c| c.id == channel_id)
            .cloned())
    }

    async fn text_channels(&self) -> Result<Vec<ChannelInfo>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .channels
            .iter()
            .filter(|c| c.kind == ChannelKind::Text)
            .cloned()
            .collect())
    }

    async fn thread(&self, thread_id: &str) -> Result<Option<ThreadInfo>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .threads
            .iter()
            .find(|t| t.id == thread_id)
            .cloned())
    }

    async fn active_threads(&self) -> Result<Vec<ThreadInfo>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .threads
            .iter()
            .filter(|t| !t.archived)
            .cloned()
            .collect())
    }

    async fn archived_threads(
        &self,
        parent_id: &str,
        before: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ThreadInfo>> {
        let s = self.state.lock().unwrap();
        let mut archived: Vec<ThreadInfo> = s
            .threads
            .iter()
            .filter(|t| t.archived && t.parent_id == parent_id)
            .filter(|t| match (before, t.archived_at) {
                (Some(cursor), Some(at)) => at < cursor,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .cloned()
            .collect();
        archived.sort_by_key(|t| std::cmp::Reverse(t.archived_at.unwrap_or(0)));
        archived.truncate(limit);
        Ok(archived)
    }

    async fn create_forum_thread(
        &self,
        parent_id: &str,
        title: &str,
        body: &str,
    ) -> Result<ThreadInfo> {
        let mut s = self.state.lock().unwrap();
        s.next_id += 1;
        let thread = ThreadInfo {
            id: format!("thread-{}", s.next_id),
            parent_id: parent_id.into(),
            title: title.into(),
            archived: false,
            applied_tags: vec![],
            archived_at: None,
        };
        s.threads.push(thread.clone());
        let bot = self.bot_id.clone();
        s.next_id += 1;
        let msg_id = s.next_id.to_string();
        s.messages.entry(thread.id.clone()).or_default().insert(
            0,
            MessageRecord {
                id: msg_id,
                channel_id: thread.id.clone(),
                author_id: bot,
                content: body.into(),
                timestamp: 0,
            },
        );
        s.calls.push(GatewayCall::CreateThread {
            parent_id: parent_id.into(),
            title: title.into(),
        });
        Ok(thread)
    }

    async fn edit_thread(&self, thread_id: &str, edit: ThreadEdit) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.next_id += 1;
        let stamp = s.next_id as i64;
        if let Some(t) = s.threads.iter_mut().find(|t| t.id == thread_id) {
            if let Some(title) = &edit.title {
                t.title = title.clone();
            }
            if let Some(archived) = edit.archived {
                t.archived = archived;
                t.archived_at = archived.then_some(stamp);
            }
            if let Some(tags) = &edit.applied_tags {
                t.applied_tags = tags.clone();
            }
        }
        s.calls.push(GatewayCall::EditThread {
            thread_id: thread_id.into(),
            edit,
        });
        Ok(())
    }

    async fn channel_messages(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let s = self.state.lock().unwrap();
        let all = s.messages.get(channel_id).cloned().unwrap_or_default();
        let start = match before {
            Some(id) => match all.iter().position(|m| m.id == id) {
                Some(pos) => pos + 1,
                None => return Ok(vec![]),
            },
            None => 0,
        };
        Ok(all.into_iter().skip(start).take(limit).collect())
    }

    async fn audit_log(
        &self,
        action: AuditAction,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        let s = self.state.lock().unwrap();
        let all = s.audit.get(&action).cloned().unwrap_or_default();
        let start = match before {
            Some(id) => match all.iter().position(|e| e.id == id) {
                Some(pos) => pos + 1,
                None => return Ok(vec![]),
            },
            None => 0,
        };
        Ok(all.into_iter().skip(start).take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::was_action_initiated_by_bot;
    use crate::snowflake::snowflake_unix_secs;

    #[test]
    fn encoded_snowflakes_decode_back() {
        let id = encode_snowflake(1_700_000_000);
        assert_eq!(snowflake_unix_secs(&id), Some(1_700_000_000));
    }

    #[tokio::test]
    async fn message_pagination_walks_backwards() {
        let mock = MockGateway::new("bot");
        for n in 1..=5 {
            mock.push_message(MessageRecord {
                id: n.to_string(),
                channel_id: "c".into(),
                author_id: "u".into(),
                content: format!("m{n}"),
                timestamp: n,
            });
        }
        let first = mock.channel_messages("c", None, 2).await.unwrap();
        assert_eq!(first[0].id, "5");
        let next = mock
            .channel_messages("c", Some(&first[1].id), 2)
            .await
            .unwrap();
        assert_eq!(next[0].id, "3");
    }

    #[tokio::test]
    async fn bot_actor_detection_reads_latest_matching_entry() {
        let mock = MockGateway::new("bot");
        mock.push_audit(AuditEntry {
            id: "1".into(),
            action: AuditAction::MemberRoleUpdate,
            actor_id: "human".into(),
            target_id: "u".into(),
        });
        assert!(!was_action_initiated_by_bot(&mock, "u", AuditAction::MemberRoleUpdate).await);
        mock.push_audit(AuditEntry {
            id: "2".into(),
            action: AuditAction::MemberRoleUpdate,
            actor_id: "bot".into(),
            target_id: "u".into(),
        });
        assert!(was_action_initiated_by_bot(&mock, "u", AuditAction::MemberRoleUpdate).await);
    }
}
