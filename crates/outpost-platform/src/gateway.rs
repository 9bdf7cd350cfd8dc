use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A guild member as seen by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Member {
    pub user_id: String,
    pub username: String,
    pub global_name: String,
    pub nickname: String,
    pub roles: Vec<String>,
}

impl Member {
    /// Server nickname, then global display name, then account username.
    pub fn display_name(&self) -> &str {
        if !self.nickname.is_empty() {
            &self.nickname
        } else if !self.global_name.is_empty() {
            &self.global_name
        } else {
            &self.username
        }
    }

    pub fn has_role(&self, role_id: &str) -> bool {
        self.roles.iter().any(|r| r == role_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Forum,
    Voice,
    Other,
}

/// A label available on a forum channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumTag {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub available_tags: Vec<ForumTag>,
}

/// A forum thread (active or archived).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: String,
    pub parent_id: String,
    pub title: String,
    pub archived: bool,
    pub applied_tags: Vec<String>,
    /// Unix seconds of archival, used as the archived-listing cursor.
    pub archived_at: Option<i64>,
}

/// Partial edit applied to a thread. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadEdit {
    pub title: Option<String>,
    pub archived: Option<bool>,
    pub applied_tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Snowflake id.
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Audit-log action families the core consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    MemberRoleUpdate,
    VoiceJoin,
    InviteCreate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// Snowflake id; its high bits carry the entry timestamp.
    pub id: String,
    pub action: AuditAction,
    /// Who performed the action.
    pub actor_id: String,
    /// Who (or what) the action was applied to.
    pub target_id: String,
}

/// A structured rich-content message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub fields: Vec<EmbedField>,
    pub footer: String,
    pub color: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Read/write surface of the chat platform. A live adapter implements this
/// against the real platform API; tests use the in-tree mock.
///
/// Reads may be called from anywhere. Mutations should be performed inside
/// thunks submitted to the `ApiExecutor` so the global rate cap holds.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// The bot's own user id, resolved once at startup.
    fn bot_user_id(&self) -> &str;

    async fn member(&self, user_id: &str) -> Result<Member>;

    async fn add_role(&self, user_id: &str, role_id: &str) -> Result<()>;
    async fn remove_role(&self, user_id: &str, role_id: &str) -> Result<()>;

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<()>;
    async fn send_embed(&self, channel_id: &str, embed: &Embed) -> Result<()>;
    async fn send_direct_message(&self, user_id: &str, content: &str) -> Result<()>;

    async fn channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>>;
    async fn text_channels(&self) -> Result<Vec<ChannelInfo>>;

    async fn thread(&self, thread_id: &str) -> Result<Option<ThreadInfo>>;
    async fn active_threads(&self) -> Result<Vec<ThreadInfo>>;
    /// Archived threads of a forum channel, newest archival first, paginated
    /// by the `before` archival-time cursor.
    async fn archived_threads(
        &self,
        parent_id: &str,
        before: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ThreadInfo>>;
    async fn create_forum_thread(
        &self,
        parent_id: &str,
        title: &str,
        body: &str,
    ) -> Result<ThreadInfo>;
    async fn edit_thread(&self, thread_id: &str, edit: ThreadEdit) -> Result<()>;

    /// Messages in a channel or thread, newest first, paginated by message id.
    async fn channel_messages(
        &self,
        channel_id: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MessageRecord>>;

    /// Audit-log entries of one action family, newest first, paginated by
    /// entry id.
    async fn audit_log(
        &self,
        action: AuditAction,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>>;
}

/// Check whether the most recent audit entry targeting `user_id` was
/// performed by the bot itself. Role-change handlers use this to avoid
/// reacting to their own mutations.
pub async fn was_action_initiated_by_bot(
    gateway: &dyn Gateway,
    user_id: &str,
    action: AuditAction,
) -> bool {
    let entries = match gateway.audit_log(action, None, 10).await {
        Ok(entries) => entries,
        Err(_) => return false,
    };
    entries
        .iter()
        .find(|e| e.target_id == user_id)
        .map(|e| e.actor_id == gateway.bot_user_id())
        .unwrap_or(false)
}
