use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use outpost_core::config::ChannelIds;
use outpost_core::{
    MonitoringSession, OutpostError, RuntimeSettings, ScenarioTag, Task, TaskParams,
    TrackableAction,
};
use outpost_platform::snowflake::snowflake_unix_secs;
use outpost_platform::{AuditAction, Gateway, ThreadInfo};
use outpost_store::Store;

use crate::monitor::Monitor;

const PAGE_SIZE: usize = 100;

/// Thread titles end in "name - <user id>"; the id is 17–19 digits.
static THREAD_TITLE_USER_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r".* - (\d{17,19})$").expect("static pattern"));

static JOINED_RECRUITMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r".+ (Joined|Rejoined) Recruitment").expect("static pattern"));

const JOINED_CORPORATION_MARKER: &str = "Character Joined Corporation.";
const ACCEPTED_TAG: &str = "accepted";

/// Extract the trailing user id from a recruitment thread title.
pub fn extract_user_id_from_title(title: &str) -> Option<String> {
    THREAD_TITLE_USER_ID
        .captures(title)
        .map(|caps| caps[1].to_string())
}

/// Computed analytics for one reconstruction window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    pub messages: i64,
    pub voice_joins: i64,
    pub invites: i64,
    pub top_channel_id: Option<String>,
    pub channels_scanned: usize,
    pub start: i64,
    pub end: i64,
}

/// Outcome of a thread-based scenario reconstruction sweep.
#[derive(Debug, Clone, Default)]
pub struct RebuildReport {
    pub threads_processed: usize,
    pub scenarios_recreated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub details: Vec<String>,
}

/// Reconstructs analytics counters and monitoring scenarios from platform
/// history: channel messages, audit-log entries, and archived forum threads.
pub struct Rebuilder {
    gateway: Arc<dyn Gateway>,
    store: Arc<Store>,
    settings: Arc<RuntimeSettings>,
    channels: ChannelIds,
}

impl Rebuilder {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        store: Arc<Store>,
        settings: Arc<RuntimeSettings>,
        channels: ChannelIds,
    ) -> Self {
        Self {
            gateway,
            store,
            settings,
            channels,
        }
    }

    /// Reconstruct counters for `[start, end]` and write them for each of
    /// the given scenarios.
    pub async fn rebuild_window(
        &self,
        user_id: &str,
        scenarios: &[ScenarioTag],
        start: i64,
        end: i64,
    ) -> Result<RebuildSummary, OutpostError> {
        let need_messages = scenarios
            .iter()
            .any(|s| s.spec().counts(TrackableAction::MessageCreate));
        let need_voice = scenarios
            .iter()
            .any(|s| s.spec().counts(TrackableAction::VoiceJoin));
        let need_invites = scenarios
            .iter()
            .any(|s| s.spec().counts(TrackableAction::InviteCreate));

        let mut messages = 0i64;
        let mut channel_counts: HashMap<String, i64> = HashMap::new();
        let mut top_channel_id: Option<String> = None;

        if need_messages {
            // Union of the scenarios' allow-lists; empty means every text
            // channel is scanned.
            let mut allowed: Vec<String> = Vec::new();
            for scenario in scenarios {
                allowed.extend(self.channels.allow_list_for(*scenario));
            }
            let channels = self
                .gateway
                .text_channels()
                .await
                .map_err(|e| OutpostError::Platform(e.to_string()))?;
            for channel in channels {
                if !allowed.is_empty() && !allowed.iter().any(|id| *id == channel.id) {
                    continue;
                }
                let count = match self
                    .count_user_messages(&channel.id, user_id, start, end)
                    .await
                {
                    Ok(count) => count,
                    Err(e) => {
                        warn!(channel_id = %channel.id, error = %e, "failed to scan channel");
                        continue;
                    }
                };
                channel_counts.insert(channel.id.clone(), count);
                messages += count;
                let best = top_channel_id
                    .as_ref()
                    .and_then(|id| channel_counts.get(id))
                    .copied()
                    .unwrap_or(0);
                if count > 0 && (top_channel_id.is_none() || count > best) {
                    top_channel_id = Some(channel.id.clone());
                }
            }
        }

        let voice_joins = if need_voice {
            self.count_audit_entries(AuditAction::VoiceJoin, user_id, false, start, end)
                .await
                .unwrap_or_else(|e| {
                    warn!(user_id, error = %e, "failed to scan voice joins");
                    0
                })
        } else {
            0
        };

        let invites = if need_invites {
            self.count_audit_entries(AuditAction::InviteCreate, user_id, true, start, end)
                .await
                .unwrap_or_else(|e| {
                    warn!(user_id, error = %e, "failed to scan invites");
                    0
                })
        } else {
            0
        };

        info!(
            user_id,
            messages,
            voice_joins,
            invites,
            channels_scanned = channel_counts.len(),
            "analytics rebuild completed"
        );

        for scenario in scenarios {
            self.store
                .set_counter(user_id, *scenario, "messages", messages)
                .await?;
            self.store
                .set_counter(user_id, *scenario, "voice_joins", voice_joins)
                .await?;
            self.store
                .set_counter(user_id, *scenario, "invites", invites)
                .await?;
            for (channel_id, count) in &channel_counts {
                if *count > 0 {
                    self.store
                        .set_channel_count(user_id, *scenario, channel_id, *count)
                        .await?;
                }
            }
        }

        Ok(RebuildSummary {
            messages,
            voice_joins,
            invites,
            top_channel_id,
            channels_scanned: channel_counts.len(),
            start,
            end,
        })
    }

    /// Rebuild each scenario of a session over that scenario's window and
    /// return the representative summary (NewRecruit preferred).
    pub async fn rebuild_for_session(
        &self,
        user_id: &str,
        session: &MonitoringSession,
    ) -> Result<RebuildSummary, OutpostError> {
        let scenarios: Vec<ScenarioTag> = session.scenarios.iter().copied().collect();
        if scenarios.is_empty() {
            return Err(OutpostError::NotMonitored(user_id.to_string()));
        }
        let representative = if scenarios.contains(&ScenarioTag::NewRecruit) {
            ScenarioTag::NewRecruit
        } else {
            scenarios[0]
        };

        let mut result = RebuildSummary::default();
        for scenario in scenarios {
            let start = session.started_at;
            let end = if session.expires_at > 0 {
                session.expires_at
            } else {
                start + self.settings.scenario_window_secs(scenario)
            };
            let summary = self.rebuild_window(user_id, &[scenario], start, end).await?;
            if scenario == representative {
                result = summary;
            }
        }
        Ok(result)
    }

    /// Count a user's messages in a channel within `[start, end]`, walking
    /// the history backwards until the window is passed.
    async fn count_user_messages(
        &self,
        channel_id: &str,
        user_id: &str,
        start: i64,
        end: i64,
    ) -> Result<i64, OutpostError> {
        let mut count = 0i64;
        let mut before: Option<String> = None;
        loop {
            let page = self
                .gateway
                .channel_messages(channel_id, before.as_deref(), PAGE_SIZE)
                .await
                .map_err(|e| OutpostError::Platform(e.to_string()))?;
            if page.is_empty() {
                break;
            }
            for msg in &page {
                if msg.author_id != user_id {
                    continue;
                }
                if msg.timestamp < start {
                    return Ok(count);
                }
                if msg.timestamp > end {
                    continue;
                }
                count += 1;
            }
            let oldest = page.last().expect("page not empty");
            if oldest.timestamp < start {
                break;
            }
            before = Some(oldest.id.clone());
        }
        Ok(count)
    }

    /// Count audit entries of one action for a user within `(start, end)`.
    /// `match_actor` selects whether the user must be the actor (invites) or
    /// the target (voice joins). Entry timestamps come from snowflake ids.
    async fn count_audit_entries(
        &self,
        action: AuditAction,
        user_id: &str,
        match_actor: bool,
        start: i64,
        end: i64,
    ) -> Result<i64, OutpostError> {
        let mut count = 0i64;
        let mut before: Option<String> = None;
        loop {
            let page = self
                .gateway
                .audit_log(action, before.as_deref(), PAGE_SIZE)
                .await
                .map_err(|e| OutpostError::Platform(e.to_string()))?;
            if page.is_empty() {
                break;
            }
            for entry in &page {
                let matches_user = if match_actor {
                    entry.actor_id == user_id
                } else {
                    entry.target_id == user_id
                };
                if !matches_user {
                    continue;
                }
                if let Some(ts) = snowflake_unix_secs(&entry.id) {
                    if ts > start && ts < end {
                        count += 1;
                    }
                }
            }
            let oldest = page.last().expect("page not empty");
            let oldest_ts = snowflake_unix_secs(&oldest.id).unwrap_or(0);
            if oldest_ts < start {
                break;
            }
            before = Some(oldest.id.clone());
        }
        Ok(count)
    }

    // -- thread-based scenario reconstruction -------------------------------

    /// Scan archived recruitment-forum threads for accepted recruits whose
    /// `NewRecruit` tracking was lost, and recreate session, check-in task,
    /// and analytics from the "Character Joined Corporation." post.
    pub async fn rebuild_new_recruit_scenarios(
        &self,
        monitor: &Monitor,
    ) -> Result<RebuildReport, OutpostError> {
        let forum = self.channels.recruitment_forum.clone();
        if forum.is_empty() {
            return Err(OutpostError::Config(
                "recruitment forum channel not configured".into(),
            ));
        }
        let tracking_days = self.settings.new_recruit_tracking_days();
        let now = Utc::now().timestamp();
        let cutoff = now - tracking_days * 86_400;

        let mut report = RebuildReport::default();
        let mut before: Option<i64> = None;
        'pages: loop {
            let page = self
                .gateway
                .archived_threads(&forum, before, PAGE_SIZE)
                .await
                .map_err(|e| OutpostError::Platform(e.to_string()))?;
            if page.is_empty() {
                break;
            }
            before = page.last().and_then(|t| t.archived_at);
            let cursor_exhausted = before.is_none();
            for thread in &page {
                if thread.parent_id != forum {
                    continue;
                }
                report.threads_processed += 1;

                let marker = match self.find_marker(thread, JOINED_CORPORATION_MARKER).await {
                    Ok(marker) => marker,
                    Err(e) => {
                        warn!(thread_id = %thread.id, error = %e, "failed to read thread messages");
                        report.errors += 1;
                        continue;
                    }
                };
                let Some(marker_ts) = marker else {
                    continue;
                };
                if marker_ts < cutoff {
                    // Archived listing is newest-first; past the cutoff
                    // everything older is out of scope too.
                    break 'pages;
                }
                if !self.has_tag(thread, ACCEPTED_TAG).await {
                    continue;
                }
                let Some(user_id) = extract_user_id_from_title(&thread.title) else {
                    warn!(thread_id = %thread.id, title = %thread.title, "no user id in thread title");
                    continue;
                };

                let expires_at = marker_ts + tracking_days * 86_400;
                if expires_at <= now {
                    report.skipped += 1;
                    continue;
                }

                // Replace any stale NewRecruit attachment with the corrected
                // window.
                if monitor
                    .scenarios_for(&user_id)
                    .await
                    .contains(&ScenarioTag::NewRecruit)
                {
                    if let Err(e) = monitor
                        .remove_scenario(&user_id, ScenarioTag::NewRecruit)
                        .await
                    {
                        warn!(user_id, error = %e, "failed to clear stale scenario");
                    }
                }
                monitor
                    .ensure_scenario_window(&user_id, ScenarioTag::NewRecruit, marker_ts, expires_at)
                    .await?;

                let task = Task::with_scenario(
                    TaskParams::UserCheckin {
                        user_id: user_id.clone(),
                    },
                    expires_at,
                    ScenarioTag::NewRecruit,
                )?;
                self.store.save_task(&task).await?;

                match self
                    .rebuild_window(&user_id, &[ScenarioTag::NewRecruit], marker_ts, expires_at)
                    .await
                {
                    Ok(summary) => {
                        report.scenarios_recreated += 1;
                        report.details.push(format!(
                            "{user_id}: new_recruit window restored ({} messages, expires {})",
                            summary.messages, expires_at
                        ));
                    }
                    Err(e) => {
                        report.errors += 1;
                        report
                            .details
                            .push(format!("{user_id}: analytics rebuild failed: {e}"));
                    }
                }
            }
            if cursor_exhausted {
                break;
            }
        }
        info!(
            processed = report.threads_processed,
            recreated = report.scenarios_recreated,
            skipped = report.skipped,
            errors = report.errors,
            "new recruit scenario rebuild finished"
        );
        Ok(report)
    }

    /// Scan open recruitment-forum threads for users still in recruitment
    /// whose `RecruitmentProcess` tracking was lost, and recreate session,
    /// cleanup task (plus midpoint reminder) and analytics from the
    /// "Joined/Rejoined Recruitment" post.
    pub async fn rebuild_recruitment_scenarios(
        &self,
        monitor: &Monitor,
    ) -> Result<RebuildReport, OutpostError> {
        let forum = self.channels.recruitment_forum.clone();
        if forum.is_empty() {
            return Err(OutpostError::Config(
                "recruitment forum channel not configured".into(),
            ));
        }
        let delay_days = self.settings.recruitment_cleanup_delay_days();
        let now = Utc::now().timestamp();

        let threads = self
            .gateway
            .active_threads()
            .await
            .map_err(|e| OutpostError::Platform(e.to_string()))?;

        let mut report = RebuildReport::default();
        for thread in threads.iter().filter(|t| t.parent_id == forum) {
            report.threads_processed += 1;

            // Tagged threads are closed or already handled.
            if !thread.applied_tags.is_empty() {
                report.skipped += 1;
                continue;
            }
            let marker = match self.find_regex_marker(thread, &JOINED_RECRUITMENT).await {
                Ok(marker) => marker,
                Err(e) => {
                    warn!(thread_id = %thread.id, error = %e, "failed to read thread messages");
                    report.errors += 1;
                    continue;
                }
            };
            let Some(marker_ts) = marker else {
                continue;
            };
            let Some(user_id) = extract_user_id_from_title(&thread.title) else {
                warn!(thread_id = %thread.id, title = %thread.title, "no user id in thread title");
                continue;
            };
            if monitor
                .scenarios_for(&user_id)
                .await
                .contains(&ScenarioTag::RecruitmentProcess)
            {
                report.skipped += 1;
                report
                    .details
                    .push(format!("{user_id}: already tracked, skipped"));
                continue;
            }

            // If the natural window already ended, give the cleanup an hour
            // of grace instead of firing immediately.
            let natural = marker_ts + delay_days * 86_400;
            let expires_at = if natural < now { now + 3_600 } else { natural };

            let task = Task::with_scenario(
                TaskParams::RecruitmentCleanup {
                    user_id: user_id.clone(),
                },
                expires_at,
                ScenarioTag::RecruitmentProcess,
            )?;
            self.store.save_task(&task).await?;
            monitor
                .ensure_scenario_window(
                    &user_id,
                    ScenarioTag::RecruitmentProcess,
                    marker_ts,
                    expires_at,
                )
                .await?;
            monitor
                .schedule_reminder_at_midpoint(&user_id, marker_ts, ScenarioTag::RecruitmentProcess)
                .await?;

            match self
                .rebuild_window(
                    &user_id,
                    &[ScenarioTag::RecruitmentProcess],
                    marker_ts,
                    expires_at,
                )
                .await
            {
                Ok(summary) => {
                    report.scenarios_recreated += 1;
                    report.details.push(format!(
                        "{user_id}: recruitment_process window restored ({} messages, expires {})",
                        summary.messages, expires_at
                    ));
                }
                Err(e) => {
                    report.errors += 1;
                    report
                        .details
                        .push(format!("{user_id}: analytics rebuild failed: {e}"));
                }
            }
        }
        info!(
            processed = report.threads_processed,
            recreated = report.scenarios_recreated,
            skipped = report.skipped,
            errors = report.errors,
            "recruitment scenario rebuild finished"
        );
        Ok(report)
    }

    /// Timestamp of the first message in the thread containing `marker`.
    async fn find_marker(
        &self,
        thread: &ThreadInfo,
        marker: &str,
    ) -> Result<Option<i64>, OutpostError> {
        let messages = self
            .gateway
            .channel_messages(&thread.id, None, PAGE_SIZE)
            .await
            .map_err(|e| OutpostError::Platform(e.to_string()))?;
        debug!(thread_id = %thread.id, messages = messages.len(), "scanning thread for marker");
        Ok(messages
            .iter()
            .find(|m| m.content.contains(marker))
            .map(|m| m.timestamp))
    }

    async fn find_regex_marker(
        &self,
        thread: &ThreadInfo,
        marker: &Regex,
    ) -> Result<Option<i64>, OutpostError> {
        let messages = self
            .gateway
            .channel_messages(&thread.id, None, PAGE_SIZE)
            .await
            .map_err(|e| OutpostError::Platform(e.to_string()))?;
        Ok(messages
            .iter()
            .find(|m| marker.is_match(&m.content))
            .map(|m| m.timestamp))
    }

    /// Whether the thread carries a tag with the given name (case-insensitive,
    /// resolved against the parent forum's available tags).
    async fn has_tag(&self, thread: &ThreadInfo, tag_name: &str) -> bool {
        let Ok(Some(parent)) = self.gateway.channel(&thread.parent_id).await else {
            return false;
        };
        thread.applied_tags.iter().any(|applied| {
            parent
                .available_tags
                .iter()
                .any(|t| t.id == *applied && t.name.eq_ignore_ascii_case(tag_name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::tests::test_channels;
    use outpost_core::TaskKind;
    use outpost_platform::mock::{encode_snowflake, MockGateway};
    use outpost_platform::{AuditEntry, ChannelInfo, ChannelKind, ForumTag, MessageRecord};

    const FORUM: &str = "c-forum";

    fn forum_channel() -> ChannelInfo {
        ChannelInfo {
            id: FORUM.into(),
            name: "recruitment forum".into(),
            kind: ChannelKind::Forum,
            available_tags: vec![ForumTag {
                id: "tag-accepted".into(),
                name: "Accepted".into(),
            }],
        }
    }

    fn channels_with_forum() -> ChannelIds {
        let mut channels = test_channels();
        channels.recruitment_forum = FORUM.to_string();
        channels
    }

    fn msg(id: u64, channel: &str, author: &str, ts: i64, content: &str) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            channel_id: channel.into(),
            author_id: author.into(),
            content: content.into(),
            timestamp: ts,
        }
    }

    fn rig(mock: Arc<MockGateway>) -> (Rebuilder, Arc<Store>, Arc<Monitor>) {
        let store = Arc::new(Store::in_memory().unwrap());
        let settings = Arc::new(RuntimeSettings::default());
        let channels = channels_with_forum();
        let monitor = Monitor::new(store.clone(), settings.clone(), channels.clone(), "bot");
        let rebuilder = Rebuilder::new(mock, store.clone(), settings, channels);
        (rebuilder, store, monitor)
    }

    #[test]
    fn user_id_extraction_matches_title_tail() {
        assert_eq!(
            extract_user_id_from_title("Alice - 123456789012345678"),
            Some("123456789012345678".to_string())
        );
        assert_eq!(extract_user_id_from_title("Alice - 123"), None);
        assert_eq!(extract_user_id_from_title("no separator"), None);
    }

    #[tokio::test]
    async fn window_rebuild_counts_messages_in_allowed_channels_only() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(MockGateway::text_channel("c-recruit", "recruitment"));
        mock.push_channel(MockGateway::text_channel("c-general", "general"));
        // Two in-window messages in the recruitment channel, one elsewhere.
        mock.push_message(msg(1, "c-recruit", "u", 150, "hello"));
        mock.push_message(msg(2, "c-recruit", "u", 160, "again"));
        mock.push_message(msg(3, "c-recruit", "other", 170, "not mine"));
        mock.push_message(msg(4, "c-general", "u", 150, "elsewhere"));

        let (rebuilder, store, _) = rig(mock);
        let summary = rebuilder
            .rebuild_window("u", &[ScenarioTag::RecruitmentProcess], 100, 200)
            .await
            .unwrap();
        assert_eq!(summary.messages, 2);
        assert_eq!(summary.top_channel_id, Some("c-recruit".to_string()));
        assert_eq!(summary.channels_scanned, 1, "general channel filtered out");
        assert_eq!(
            store
                .counters_for_scenario("u", ScenarioTag::RecruitmentProcess)
                .await
                .unwrap()
                .get("messages"),
            Some(&2)
        );
    }

    #[tokio::test]
    async fn window_rebuild_respects_time_bounds() {
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(MockGateway::text_channel("c-general", "general"));
        mock.push_message(msg(1, "c-general", "u", 50, "too old"));
        mock.push_message(msg(2, "c-general", "u", 150, "in window"));
        mock.push_message(msg(3, "c-general", "u", 250, "too new"));

        let (rebuilder, _, _) = rig(mock);
        let summary = rebuilder
            .rebuild_window("u", &[ScenarioTag::NewRecruit], 100, 200)
            .await
            .unwrap();
        assert_eq!(summary.messages, 1);
    }

    #[tokio::test]
    async fn window_rebuild_counts_audit_voice_and_invites() {
        let base = 1_700_000_000;
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_audit(AuditEntry {
            id: encode_snowflake(base + 150),
            action: AuditAction::VoiceJoin,
            actor_id: "someone".into(),
            target_id: "u".into(),
        });
        mock.push_audit(AuditEntry {
            id: encode_snowflake(base + 160),
            action: AuditAction::VoiceJoin,
            actor_id: "someone".into(),
            target_id: "not-u".into(),
        });
        mock.push_audit(AuditEntry {
            id: encode_snowflake(base + 170),
            action: AuditAction::InviteCreate,
            actor_id: "u".into(),
            target_id: String::new(),
        });

        let (rebuilder, store, _) = rig(mock);
        let summary = rebuilder
            .rebuild_window("u", &[ScenarioTag::NewRecruit], base + 100, base + 200)
            .await
            .unwrap();
        assert_eq!(summary.voice_joins, 1, "only entries targeting the user");
        assert_eq!(summary.invites, 1, "only entries performed by the user");
        let counters = store
            .counters_for_scenario("u", ScenarioTag::NewRecruit)
            .await
            .unwrap();
        assert_eq!(counters.get("voice_joins"), Some(&1));
        assert_eq!(counters.get("invites"), Some(&1));
    }

    #[tokio::test]
    async fn new_recruit_rebuild_recreates_session_task_and_analytics() {
        let now = Utc::now().timestamp();
        let joined_at = now - 2 * 86_400;

        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        mock.push_channel(MockGateway::text_channel("c-general", "general"));
        mock.push_thread(ThreadInfo {
            id: "t1".into(),
            parent_id: FORUM.into(),
            title: "Alice - 123456789012345678".into(),
            archived: true,
            applied_tags: vec!["tag-accepted".into()],
            archived_at: Some(now - 86_400),
        });
        mock.push_message(msg(10, "t1", "bot", joined_at, JOINED_CORPORATION_MARKER));
        mock.push_message(msg(
            11,
            "c-general",
            "123456789012345678",
            joined_at + 100,
            "hi all",
        ));

        let (rebuilder, store, monitor) = rig(mock);
        let report = rebuilder.rebuild_new_recruit_scenarios(&monitor).await.unwrap();
        assert_eq!(report.scenarios_recreated, 1);

        let user = "123456789012345678";
        let session = store.get_active_session(user).await.unwrap().unwrap();
        assert!(session.has_scenario(ScenarioTag::NewRecruit));
        assert_eq!(session.started_at, joined_at);
        assert_eq!(session.expires_at, joined_at + 7 * 86_400);

        let tasks = store.tasks_for_user(user).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].function_name, TaskKind::UserCheckin);
        assert_eq!(tasks[0].scheduled_time, session.expires_at);

        assert_eq!(
            store
                .counters_for_scenario(user, ScenarioTag::NewRecruit)
                .await
                .unwrap()
                .get("messages"),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn new_recruit_rebuild_ignores_unaccepted_and_expired_threads() {
        let now = Utc::now().timestamp();
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());

        // Accepted, but the marker is older than the cutoff: pagination
        // stops there and nothing is recreated.
        mock.push_thread(ThreadInfo {
            id: "t-old".into(),
            parent_id: FORUM.into(),
            title: "Old - 111111111111111111".into(),
            archived: true,
            applied_tags: vec!["tag-accepted".into()],
            archived_at: Some(now - 100),
        });
        mock.push_message(msg(
            1,
            "t-old",
            "bot",
            now - 8 * 86_400,
            JOINED_CORPORATION_MARKER,
        ));

        // Recent but never accepted.
        mock.push_thread(ThreadInfo {
            id: "t-new".into(),
            parent_id: FORUM.into(),
            title: "New - 222222222222222222".into(),
            archived: true,
            applied_tags: vec![],
            archived_at: Some(now - 50),
        });
        mock.push_message(msg(2, "t-new", "bot", now - 3_600, JOINED_CORPORATION_MARKER));

        let (rebuilder, store, monitor) = rig(mock);
        let report = rebuilder.rebuild_new_recruit_scenarios(&monitor).await.unwrap();
        assert_eq!(report.scenarios_recreated, 0);
        assert_eq!(report.threads_processed, 2);
        assert!(store.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recruitment_rebuild_scans_open_untagged_threads() {
        let now = Utc::now().timestamp();
        let joined_at = now - 86_400;

        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        mock.push_channel(MockGateway::text_channel("c-recruit", "recruitment"));
        mock.push_thread(ThreadInfo {
            id: "t1".into(),
            parent_id: FORUM.into(),
            title: "Bob - 333333333333333333".into(),
            archived: false,
            applied_tags: vec![],
            archived_at: None,
        });
        mock.push_message(msg(1, "t1", "bot", joined_at, "Bob Joined Recruitment"));

        let (rebuilder, store, monitor) = rig(mock);
        let report = rebuilder
            .rebuild_recruitment_scenarios(&monitor)
            .await
            .unwrap();
        assert_eq!(report.scenarios_recreated, 1);

        let user = "333333333333333333";
        let session = store.get_active_session(user).await.unwrap().unwrap();
        assert!(session.has_scenario(ScenarioTag::RecruitmentProcess));
        assert_eq!(session.started_at, joined_at);

        let tasks = store.tasks_for_user(user).await.unwrap();
        let kinds: Vec<TaskKind> = tasks.iter().map(|t| t.function_name).collect();
        assert!(kinds.contains(&TaskKind::RecruitmentCleanup));
        assert!(
            kinds.contains(&TaskKind::RecruitmentReminder),
            "midpoint reminder still ahead for a one-day-old thread"
        );
    }

    #[tokio::test]
    async fn recruitment_rebuild_skips_tracked_users_and_tagged_threads() {
        let now = Utc::now().timestamp();
        let mock = Arc::new(MockGateway::new("bot"));
        mock.push_channel(forum_channel());
        mock.push_thread(ThreadInfo {
            id: "t1".into(),
            parent_id: FORUM.into(),
            title: "Tagged - 444444444444444444".into(),
            archived: false,
            applied_tags: vec!["tag-accepted".into()],
            archived_at: None,
        });
        mock.push_thread(ThreadInfo {
            id: "t2".into(),
            parent_id: FORUM.into(),
            title: "Tracked - 555555555555555555".into(),
            archived: false,
            applied_tags: vec![],
            archived_at: None,
        });
        mock.push_message(msg(1, "t2", "bot", now - 100, "Tracked Joined Recruitment"));

        let (rebuilder, store, monitor) = rig(mock);
        monitor
            .add_scenario("555555555555555555", ScenarioTag::RecruitmentProcess)
            .await
            .unwrap();
        let before = store.fetch_all().await.unwrap().len();

        let report = rebuilder
            .rebuild_recruitment_scenarios(&monitor)
            .await
            .unwrap();
        assert_eq!(report.scenarios_recreated, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(store.fetch_all().await.unwrap().len(), before);
    }
}
