use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::EventContext;
use crate::executor::ApiExecutor;
use crate::gateway::{ChannelInfo, Embed, Gateway, ThreadEdit, ThreadInfo};

const ARCHIVED_PAGE: usize = 100;

/// Manages a single user's recruitment forum thread.
///
/// Resolution happens once up front; every mutation is enqueued on the API
/// executor so it obeys the global outbound rate cap.
pub struct ThreadManager {
    gateway: Arc<dyn Gateway>,
    executor: Arc<ApiExecutor>,
    ctx: EventContext,
    forum_channel_id: String,
    parent: Option<ChannelInfo>,
    thread: Option<ThreadInfo>,
}

/// Find a thread whose title contains `phrase` (case-insensitively): active
/// threads first, then the forum's archived pages, newest archival first.
pub async fn find_thread_by_title(
    gateway: &dyn Gateway,
    forum_channel_id: &str,
    phrase: &str,
) -> Option<ThreadInfo> {
    let phrase = phrase.to_lowercase();
    if let Ok(threads) = gateway.active_threads().await {
        if let Some(t) = threads
            .into_iter()
            .find(|t| t.title.to_lowercase().contains(&phrase))
        {
            return Some(t);
        }
    }

    let mut before: Option<i64> = None;
    loop {
        let page = match gateway
            .archived_threads(forum_channel_id, before, ARCHIVED_PAGE)
            .await
        {
            Ok(page) => page,
            Err(_) => return None,
        };
        if page.is_empty() {
            return None;
        }
        if let Some(t) = page
            .iter()
            .find(|t| t.title.to_lowercase().contains(&phrase))
        {
            return Some(t.clone());
        }
        before = page.last().and_then(|t| t.archived_at);
        if before.is_none() {
            return None;
        }
    }
}

impl ThreadManager {
    pub async fn resolve(
        gateway: Arc<dyn Gateway>,
        executor: Arc<ApiExecutor>,
        ctx: EventContext,
        forum_channel_id: impl Into<String>,
        user_id: &str,
    ) -> Self {
        let forum_channel_id = forum_channel_id.into();
        let thread = find_thread_by_title(gateway.as_ref(), &forum_channel_id, user_id).await;
        match &thread {
            Some(t) => debug!(
                trace_id = %ctx.trace_id,
                user_id,
                thread_id = %t.id,
                "resolved recruitment thread"
            ),
            None => debug!(trace_id = %ctx.trace_id, user_id, "no recruitment thread found"),
        }
        let parent = gateway.channel(&forum_channel_id).await.ok().flatten();
        Self {
            gateway,
            executor,
            ctx,
            forum_channel_id,
            parent,
            thread,
        }
    }

    pub fn has_thread(&self) -> bool {
        self.thread.is_some()
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread.as_ref().map(|t| t.id.as_str())
    }

    pub fn is_open(&self) -> bool {
        self.thread.as_ref().map(|t| !t.archived).unwrap_or(false)
    }

    /// Case-insensitive tag-name lookup against the parent forum's tags.
    fn tag_id(&self, name: &str) -> Option<String> {
        self.parent.as_ref().and_then(|c| {
            c.available_tags
                .iter()
                .find(|t| t.name.eq_ignore_ascii_case(name))
                .map(|t| t.id.clone())
        })
    }

    pub async fn send_message(&self, message: impl Into<String>) {
        let Some(thread) = &self.thread else {
            debug!(trace_id = %self.ctx.trace_id, "no thread, skipping message");
            return;
        };
        let gateway = self.gateway.clone();
        let thread_id = thread.id.clone();
        let message = message.into();
        self.executor
            .submit(
                self.ctx.clone(),
                Box::new(move || {
                    Box::pin(async move { gateway.send_message(&thread_id, &message).await })
                }),
            )
            .await;
    }

    pub async fn send_embed(&self, embed: Embed) {
        let Some(thread) = &self.thread else {
            debug!(trace_id = %self.ctx.trace_id, "no thread, skipping embed");
            return;
        };
        let gateway = self.gateway.clone();
        let thread_id = thread.id.clone();
        self.executor
            .submit(
                self.ctx.clone(),
                Box::new(move || {
                    Box::pin(async move { gateway.send_embed(&thread_id, &embed).await })
                }),
            )
            .await;
    }

    pub async fn apply_tag(&self, tag_name: &str) {
        let Some(thread) = &self.thread else {
            return;
        };
        let Some(tag_id) = self.tag_id(tag_name) else {
            warn!(trace_id = %self.ctx.trace_id, tag_name, "tag not found on forum");
            return;
        };
        self.edit(
            thread.id.clone(),
            ThreadEdit {
                applied_tags: Some(vec![tag_id]),
                ..Default::default()
            },
        )
        .await;
    }

    /// Remove one tag by name, or all tags when `tag_name` is `None`.
    pub async fn remove_tags(&self, tag_name: Option<&str>) {
        let Some(thread) = &self.thread else {
            return;
        };
        match tag_name {
            None => {
                self.edit(
                    thread.id.clone(),
                    ThreadEdit {
                        applied_tags: Some(vec![]),
                        ..Default::default()
                    },
                )
                .await;
            }
            Some(name) => {
                let Some(tag_id) = self.tag_id(name) else {
                    warn!(trace_id = %self.ctx.trace_id, tag_name = name, "tag not found on forum");
                    return;
                };
                let gateway = self.gateway.clone();
                let thread_id = thread.id.clone();
                self.executor
                    .submit(
                        self.ctx.clone(),
                        Box::new(move || {
                            Box::pin(async move {
                                // Read the live tag set so unrelated tags survive.
                                let current = gateway
                                    .thread(&thread_id)
                                    .await?
                                    .map(|t| t.applied_tags)
                                    .unwrap_or_default();
                                let kept: Vec<String> =
                                    current.into_iter().filter(|t| *t != tag_id).collect();
                                gateway
                                    .edit_thread(
                                        &thread_id,
                                        ThreadEdit {
                                            applied_tags: Some(kept),
                                            ..Default::default()
                                        },
                                    )
                                    .await
                            })
                        }),
                    )
                    .await;
            }
        }
    }

    /// Archive the thread, optionally applying one tag by name.
    pub async fn close_thread(&self, tag_name: Option<&str>) {
        let Some(thread) = &self.thread else {
            debug!(trace_id = %self.ctx.trace_id, "no thread, skipping close");
            return;
        };
        let tags = match tag_name {
            Some(name) => match self.tag_id(name) {
                Some(id) => Some(vec![id]),
                None => {
                    warn!(trace_id = %self.ctx.trace_id, tag_name = name, "tag not found, closing untagged");
                    None
                }
            },
            None => None,
        };
        self.edit(
            thread.id.clone(),
            ThreadEdit {
                archived: Some(true),
                applied_tags: tags,
                ..Default::default()
            },
        )
        .await;
    }

    pub async fn update_title(&self, new_title: impl Into<String>) {
        let Some(thread) = &self.thread else {
            return;
        };
        self.edit(
            thread.id.clone(),
            ThreadEdit {
                title: Some(new_title.into()),
                ..Default::default()
            },
        )
        .await;
    }

    pub async fn reopen_thread(&self) {
        let Some(thread) = &self.thread else {
            return;
        };
        self.edit(
            thread.id.clone(),
            ThreadEdit {
                archived: Some(false),
                ..Default::default()
            },
        )
        .await;
    }

    /// Create the thread for a user; skipped if one already resolved.
    /// Title is "`display name – user id`" so later lookups by id succeed.
    pub async fn create_thread(&self, global_name: &str, user_id: &str) {
        if self.thread.is_some() {
            debug!(trace_id = %self.ctx.trace_id, "thread already exists, skipping create");
            return;
        }
        let gateway = self.gateway.clone();
        let parent_id = self.forum_channel_id.clone();
        let title = format!("{global_name} - {user_id}");
        let body = format!("{global_name} Joined Recruitment");
        self.executor
            .submit(
                self.ctx.clone(),
                Box::new(move || {
                    Box::pin(async move {
                        gateway.create_forum_thread(&parent_id, &title, &body).await?;
                        Ok(())
                    })
                }),
            )
            .await;
    }

    pub async fn send_message_and_close(&self, message: impl Into<String>, tag_name: &str) {
        if self.thread.is_none() {
            return;
        }
        let message = message.into();
        if !message.is_empty() {
            self.send_message(message).await;
        }
        self.close_thread(Some(tag_name)).await;
    }

    async fn edit(&self, thread_id: String, edit: ThreadEdit) {
        let gateway = self.gateway.clone();
        self.executor
            .submit(
                self.ctx.clone(),
                Box::new(move || {
                    Box::pin(async move { gateway.edit_thread(&thread_id, edit).await })
                }),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ChannelKind, ForumTag};
    use crate::mock::{GatewayCall, MockGateway};
    use std::time::Duration;

    const FORUM: &str = "forum-1";

    fn forum_channel() -> ChannelInfo {
        ChannelInfo {
            id: FORUM.into(),
            name: "recruitment".into(),
            kind: ChannelKind::Forum,
            available_tags: vec![
                ForumTag {
                    id: "tag-accepted".into(),
                    name: "Accepted".into(),
                },
                ForumTag {
                    id: "tag-left".into(),
                    name: "Left Server".into(),
                },
            ],
        }
    }

    fn thread(id: &str, title: &str, archived: bool) -> ThreadInfo {
        ThreadInfo {
            id: id.into(),
            parent_id: FORUM.into(),
            title: title.into(),
            archived,
            applied_tags: vec![],
            archived_at: archived.then_some(50),
        }
    }

    async fn manager(mock: Arc<MockGateway>, user: &str) -> (ThreadManager, Arc<ApiExecutor>) {
        let executor = ApiExecutor::start(Duration::from_millis(1));
        let tm = ThreadManager::resolve(
            mock,
            executor.clone(),
            EventContext::new(user),
            FORUM,
            user,
        )
        .await;
        (tm, executor)
    }

    #[tokio::test]
    async fn resolves_active_thread_case_insensitively() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        mock.push_thread(thread("t1", "Pilot Rook - 111222333444555666", false));
        let (tm, executor) = manager(mock, "111222333444555666").await;
        assert!(tm.has_thread());
        assert!(tm.is_open());
        assert_eq!(tm.thread_id(), Some("t1"));
        executor.shutdown().await;
    }

    #[tokio::test]
    async fn falls_back_to_archived_pages() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        mock.push_thread(thread("t2", "Old Pilot - 999888777666555444", true));
        let (tm, executor) = manager(mock, "999888777666555444").await;
        assert!(tm.has_thread());
        assert!(!tm.is_open());
        executor.shutdown().await;
    }

    #[tokio::test]
    async fn close_thread_applies_named_tag() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        mock.push_thread(thread("t1", "Rook - 42", false));
        let (tm, executor) = manager(mock.clone(), "42").await;
        tm.close_thread(Some("accepted")).await;
        executor.shutdown().await;

        let calls = mock.calls();
        assert_eq!(
            calls,
            vec![GatewayCall::EditThread {
                thread_id: "t1".into(),
                edit: ThreadEdit {
                    archived: Some(true),
                    applied_tags: Some(vec!["tag-accepted".into()]),
                    ..Default::default()
                },
            }]
        );
    }

    #[tokio::test]
    async fn operations_without_thread_are_noops() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        let (tm, executor) = manager(mock.clone(), "nobody").await;
        tm.send_message("hello").await;
        tm.close_thread(Some("Accepted")).await;
        tm.reopen_thread().await;
        executor.shutdown().await;
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn create_thread_builds_title_with_user_id() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        let (tm, executor) = manager(mock.clone(), "777").await;
        tm.create_thread("Rook", "777").await;
        executor.shutdown().await;
        assert_eq!(
            mock.calls(),
            vec![GatewayCall::CreateThread {
                parent_id: FORUM.into(),
                title: "Rook - 777".into(),
            }]
        );
    }

    #[tokio::test]
    async fn remove_single_tag_keeps_others() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        let mut t = thread("t1", "Rook - 42", false);
        t.applied_tags = vec!["tag-accepted".into(), "tag-left".into()];
        mock.push_thread(t);
        let (tm, executor) = manager(mock.clone(), "42").await;
        tm.remove_tags(Some("Accepted")).await;
        executor.shutdown().await;

        match mock.calls().last().unwrap() {
            GatewayCall::EditThread { edit, .. } => {
                assert_eq!(edit.applied_tags, Some(vec!["tag-left".to_string()]));
            }
            other => panic!("unexpected call {other:?}"),
        }
    }
}
