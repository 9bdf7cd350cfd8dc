//! Admin command handlers.
//!
//! Command registration, argument parsing and permission gating live in the
//! platform adapter; each handler here does the work and returns the
//! user-visible reply.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tracing::{error, info};

use outpost_monitor::Rebuilder;
use outpost_pipeline::{ops, Pipeline};
use outpost_platform::EventContext;

/// A text reply, possibly only visible to the invoker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub text: String,
    pub ephemeral: bool,
}

impl CommandReply {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ephemeral: false,
        }
    }

    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ephemeral: true,
        }
    }
}

pub struct AdminCommands {
    pipeline: Arc<Pipeline>,
    rebuilder: Arc<Rebuilder>,
}

fn format_ts(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

fn format_duration(mut secs: i64) -> String {
    if secs < 0 {
        secs = -secs;
    }
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

impl AdminCommands {
    pub fn new(pipeline: Arc<Pipeline>, rebuilder: Arc<Rebuilder>) -> Self {
        Self { pipeline, rebuilder }
    }

    pub fn toggle_debug_mode(&self) -> CommandReply {
        let enabled = self.pipeline.settings.toggle_debug_mode();
        CommandReply::ephemeral(if enabled {
            "Debug mode is now enabled"
        } else {
            "Debug mode is now disabled"
        })
    }

    pub fn set_recruitment_cleanup_delay(&self, days: i64) -> CommandReply {
        if days < 1 {
            return CommandReply::ephemeral("Recruitment cleanup delay must be at least 1 day");
        }
        self.pipeline.settings.set_recruitment_cleanup_delay_days(days);
        CommandReply::ephemeral(format!(
            "Recruitment cleanup delay has been set to {days} days"
        ))
    }

    pub fn set_new_member_tracking_days(&self, days: i64) -> CommandReply {
        if days < 1 {
            return CommandReply::ephemeral("Tracking window must be at least 1 day");
        }
        self.pipeline.settings.set_new_recruit_tracking_days(days);
        CommandReply::ephemeral(format!("New member tracking window set to {days} days"))
    }

    /// Current monitoring, task and analytics status for one user.
    pub async fn user_status(&self, user_id: &str) -> CommandReply {
        let session = match self.pipeline.store.get_active_session(user_id).await {
            Ok(session) => session,
            Err(e) => {
                error!(user_id, error = %e, "failed to load session");
                return CommandReply::ephemeral("Error retrieving monitoring data");
            }
        };
        let tasks = match self.pipeline.store.tasks_for_user(user_id).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(user_id, error = %e, "failed to load tasks");
                return CommandReply::ephemeral("Error retrieving task data");
            }
        };

        let mut text = format!("Status for {user_id}\n\n");
        match &session {
            Some(session) => {
                let scenarios: Vec<&str> =
                    session.scenarios.iter().map(|s| s.as_str()).collect();
                let expires = if session.expires_at > 0 {
                    format_ts(session.expires_at)
                } else {
                    "Never".to_string()
                };
                let _ = writeln!(text, "Monitoring: active");
                let _ = writeln!(text, "Scenarios: {}", scenarios.join(", "));
                let _ = writeln!(text, "Started: {}", format_ts(session.started_at));
                let _ = writeln!(text, "Expires: {expires}");
            }
            None => {
                let _ = writeln!(text, "Monitoring: not active");
            }
        }

        if tasks.is_empty() {
            let _ = writeln!(text, "\nTasks: none");
        } else {
            let _ = writeln!(text, "\nTasks ({}):", tasks.len());
            for task in &tasks {
                let _ = writeln!(
                    text,
                    "- {} [{}] scheduled {} (status {}, retries {})",
                    task.function_name,
                    if task.scenario.is_empty() {
                        "unspecified"
                    } else {
                        task.scenario.as_str()
                    },
                    format_ts(task.scheduled_time),
                    task.status,
                    task.retries,
                );
            }
        }

        if session.is_some() {
            match self.pipeline.store.get_counters(user_id).await {
                Ok(snapshot) => {
                    let _ = writeln!(
                        text,
                        "\nAnalytics: {} messages, {} voice joins, {} invites",
                        snapshot.get("messages"),
                        snapshot.get("voice_joins"),
                        snapshot.get("invites"),
                    );
                    if let Some(top) = &snapshot.top_channel_id {
                        let _ = writeln!(text, "Top channel: <#{top}>");
                    }
                }
                Err(e) => error!(user_id, error = %e, "failed to load counters"),
            }
        }

        CommandReply::ephemeral(text)
    }

    /// Overview of every monitored user: scenarios, expiry, queued tasks.
    pub async fn monitoring_status(&self) -> CommandReply {
        let tracked = match self.pipeline.store.list_tracked().await {
            Ok(tracked) => tracked,
            Err(e) => {
                error!(error = %e, "failed to list tracked users");
                return CommandReply::ephemeral("Error getting tracked users");
            }
        };
        if tracked.is_empty() {
            return CommandReply::ephemeral("No users are currently being monitored");
        }

        let now = Utc::now().timestamp();
        let mut active = 0usize;
        let mut expired = 0usize;
        let mut details = Vec::new();
        for user_id in &tracked {
            let mut line = format!("{user_id}");
            match self.pipeline.store.get_active_session(user_id).await {
                Ok(Some(session)) => {
                    let scenarios: Vec<&str> =
                        session.scenarios.iter().map(|s| s.as_str()).collect();
                    let _ = write!(line, " | scenarios: {}", scenarios.join(", "));
                    if session.expires_at > 0 {
                        if session.expires_at > now {
                            let _ = write!(
                                line,
                                " | expires {} (in {})",
                                format_ts(session.expires_at),
                                format_duration(session.expires_at - now)
                            );
                            active += 1;
                        } else {
                            let _ = write!(
                                line,
                                " | expired {} ({} ago)",
                                format_ts(session.expires_at),
                                format_duration(now - session.expires_at)
                            );
                            expired += 1;
                        }
                    } else {
                        let _ = write!(line, " | runs until task completion");
                        active += 1;
                    }
                }
                Ok(None) => {
                    let _ = write!(line, " | no monitoring data");
                }
                Err(e) => {
                    let _ = write!(line, " | error: {e}");
                }
            }
            match self.pipeline.store.tasks_for_user(user_id).await {
                Ok(tasks) if !tasks.is_empty() => {
                    let summary: Vec<String> = tasks
                        .iter()
                        .map(|t| {
                            let delta = t.scheduled_time - now;
                            if delta > 0 {
                                format!("{} (in {})", t.function_name, format_duration(delta))
                            } else {
                                format!("{} (overdue by {})", t.function_name, format_duration(delta))
                            }
                        })
                        .collect();
                    let _ = write!(line, " | tasks: {}", summary.join(", "));
                }
                _ => {
                    let _ = write!(line, " | no tasks");
                }
            }
            details.push(line);
        }

        let mut text = format!(
            "Monitored users: {} ({} active, {} expired)\n\n",
            tracked.len(),
            active,
            expired
        );
        text.push_str(&details.join("\n"));
        CommandReply::ephemeral(text)
    }

    /// Drop and recreate a user's scheduled tasks from their session,
    /// backfilling the session from tasks when durable state is missing.
    pub async fn rebuild_user_events(&self, user_id: &str) -> CommandReply {
        let tasks = match self.pipeline.store.tasks_for_user(user_id).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(user_id, error = %e, "failed to load tasks");
                return CommandReply::ephemeral("Error retrieving existing tasks");
            }
        };
        let session = match self.pipeline.store.get_active_session(user_id).await {
            Ok(session) => session,
            Err(e) => {
                error!(user_id, error = %e, "failed to load session");
                return CommandReply::ephemeral("Error retrieving monitoring data");
            }
        };

        let (session, backfilled) = match session {
            Some(session) => (session, Vec::new()),
            None => {
                if tasks.is_empty() {
                    return CommandReply::ephemeral("User is not currently being monitored");
                }
                match self
                    .pipeline
                    .monitor
                    .backfill_session_from_tasks(user_id, &tasks)
                    .await
                {
                    Ok((session, added)) => (session, added),
                    Err(e) => {
                        error!(user_id, error = %e, "failed to backfill session");
                        return CommandReply::ephemeral("Error rebuilding monitoring data");
                    }
                }
            }
        };

        let removed = match self.pipeline.monitor.revoke_all_tasks(user_id).await {
            Ok(removed) => removed,
            Err(e) => {
                error!(user_id, error = %e, "failed to clear tasks");
                return CommandReply::ephemeral("Error clearing existing tasks");
            }
        };
        if let Err(e) = self
            .pipeline
            .monitor
            .recreate_tasks_for_user(user_id, &session)
            .await
        {
            error!(user_id, error = %e, "failed to recreate tasks");
            return CommandReply::ephemeral(format!("Error recreating tasks: {e}"));
        }

        let new_tasks = self
            .pipeline
            .store
            .tasks_for_user(user_id)
            .await
            .unwrap_or_default();
        let mut text = format!(
            "Events rebuilt for {user_id}: removed {removed}, created {}\n",
            new_tasks.len()
        );
        if !backfilled.is_empty() {
            let names: Vec<&str> = backfilled.iter().map(|s| s.as_str()).collect();
            let _ = writeln!(text, "Backfilled scenarios: {}", names.join(", "));
        }
        for task in &new_tasks {
            let _ = writeln!(
                text,
                "- {} [{}] scheduled {}",
                task.function_name,
                task.scenario,
                format_ts(task.scheduled_time)
            );
        }
        CommandReply::ephemeral(text)
    }

    /// `rebuild_user_events` over every tracked user.
    pub async fn rebuild_all_user_events(&self) -> CommandReply {
        let tracked = match self.pipeline.store.list_tracked().await {
            Ok(tracked) => tracked,
            Err(e) => {
                error!(error = %e, "failed to list tracked users");
                return CommandReply::ephemeral("Error retrieving tracked users");
            }
        };
        if tracked.is_empty() {
            return CommandReply::ephemeral("No users are currently being monitored");
        }
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        for user_id in &tracked {
            let reply = self.rebuild_user_events(user_id).await;
            if reply.text.starts_with("Events rebuilt") {
                succeeded += 1;
            } else {
                failed += 1;
            }
        }
        info!(succeeded, failed, "bulk event rebuild finished");
        CommandReply::ephemeral(format!(
            "Rebuilt events for {succeeded} users ({failed} failed) out of {}",
            tracked.len()
        ))
    }

    /// Reconstruct `NewRecruit` sessions from archived forum threads.
    pub async fn rebuild_new_recruit_scenarios(&self) -> CommandReply {
        match self
            .rebuilder
            .rebuild_new_recruit_scenarios(&self.pipeline.monitor)
            .await
        {
            Ok(report) => {
                let mut text = format!(
                    "New recruit scenario rebuild complete\n\
                     Threads processed: {}\nScenarios recreated: {}\n\
                     Skipped: {}\nErrors: {}\n",
                    report.threads_processed,
                    report.scenarios_recreated,
                    report.skipped,
                    report.errors
                );
                for detail in &report.details {
                    let _ = writeln!(text, "- {detail}");
                }
                CommandReply::ephemeral(text)
            }
            Err(e) => CommandReply::ephemeral(format!("Rebuild failed: {e}")),
        }
    }

    /// Reconstruct `RecruitmentProcess` sessions from open forum threads.
    pub async fn rebuild_recruitment_scenarios(&self) -> CommandReply {
        match self
            .rebuilder
            .rebuild_recruitment_scenarios(&self.pipeline.monitor)
            .await
        {
            Ok(report) => {
                let mut text = format!(
                    "Recruitment scenario rebuild complete\n\
                     Threads processed: {}\nScenarios recreated: {}\n\
                     Skipped: {}\nErrors: {}\n",
                    report.threads_processed,
                    report.scenarios_recreated,
                    report.skipped,
                    report.errors
                );
                for detail in &report.details {
                    let _ = writeln!(text, "- {detail}");
                }
                CommandReply::ephemeral(text)
            }
            Err(e) => CommandReply::ephemeral(format!("Rebuild failed: {e}")),
        }
    }

    /// Recompute a user's analytics from platform history over their
    /// session's window.
    pub async fn rebuild_analytics(&self, user_id: &str) -> CommandReply {
        let session = match self.pipeline.store.get_active_session(user_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                return CommandReply::ephemeral("User is not currently being monitored");
            }
            Err(e) => {
                error!(user_id, error = %e, "failed to load session");
                return CommandReply::ephemeral("Error retrieving monitoring data");
            }
        };
        match self.rebuilder.rebuild_for_session(user_id, &session).await {
            Ok(summary) => CommandReply::ephemeral(format!(
                "Analytics rebuilt for {user_id}\n\
                 Messages: {}\nVoice joins: {}\nInvites: {}\n\
                 Top channel: {}\nWindow: {} → {}",
                summary.messages,
                summary.voice_joins,
                summary.invites,
                summary
                    .top_channel_id
                    .map(|id| format!("<#{id}>"))
                    .unwrap_or_else(|| "none".to_string()),
                format_ts(summary.start),
                format_ts(summary.end),
            )),
            Err(e) => {
                error!(user_id, error = %e, "analytics rebuild failed");
                CommandReply::ephemeral(format!("Analytics rebuild failed: {e}"))
            }
        }
    }

    /// Grant every content-notification role to the user.
    pub async fn assign_ping_roles(&self, user_id: &str) -> CommandReply {
        let ctx = EventContext::for_task(user_id, format!("assign_ping_roles_{user_id}"));
        let roles = self.pipeline.roles.content_notification();
        ops::add_roles(
            &self.pipeline.gateway,
            &self.pipeline.executor,
            &ctx,
            user_id,
            &roles,
        )
        .await;
        info!(user_id, roles = roles.len(), "ping roles assigned");
        CommandReply::ephemeral(format!("Assigned {} ping roles to {user_id}", roles.len()))
    }
}
