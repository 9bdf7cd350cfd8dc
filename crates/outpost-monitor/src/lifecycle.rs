use chrono::Utc;
use tracing::{debug, error, info};

use outpost_core::{MonitoringSession, OutpostError, ScenarioTag, Task, TaskKind, TaskParams};

use crate::monitor::Monitor;

impl Monitor {
    /// Attach a scenario to the user's session, creating the session if
    /// needed. Mirror and store are updated together under the write lock.
    pub async fn add_scenario(
        &self,
        user_id: &str,
        scenario: ScenarioTag,
    ) -> Result<(), OutpostError> {
        let mut mirror = self.mirror.write().await;
        let session = mirror
            .entry(user_id.to_string())
            .or_insert_with(|| MonitoringSession::new(user_id));
        session.add_scenario(scenario);
        let snapshot = session.clone();
        drop(mirror);
        self.store.save_session(&snapshot).await?;
        info!(user_id, scenario = %scenario, "scenario attached");
        Ok(())
    }

    /// Attach a scenario and set the session to expire after `duration_secs`.
    pub async fn add_user_tracking(
        &self,
        user_id: &str,
        scenario: ScenarioTag,
        duration_secs: i64,
    ) -> Result<(), OutpostError> {
        let mut mirror = self.mirror.write().await;
        let session = mirror
            .entry(user_id.to_string())
            .or_insert_with(|| MonitoringSession::new(user_id));
        session.add_scenario(scenario);
        session.set_expiration_secs(duration_secs);
        let snapshot = session.clone();
        drop(mirror);
        self.store.save_session(&snapshot).await?;
        info!(
            user_id,
            scenario = %scenario,
            duration_secs,
            "user tracking added"
        );
        Ok(())
    }

    /// Attach a scenario and pin the session to exactly this window.
    pub async fn ensure_scenario_window(
        &self,
        user_id: &str,
        scenario: ScenarioTag,
        start: i64,
        end: i64,
    ) -> Result<(), OutpostError> {
        let mut mirror = self.mirror.write().await;
        let session = mirror
            .entry(user_id.to_string())
            .or_insert_with(|| MonitoringSession::new(user_id));
        session.add_scenario(scenario);
        session.started_at = start;
        session.expires_at = end;
        let snapshot = session.clone();
        drop(mirror);
        self.store.save_session(&snapshot).await?;
        Ok(())
    }

    /// Detach a scenario: revoke its queued tasks, and if it was the last
    /// scenario, drop the session entirely (tracked entry, analytics and
    /// histograms included).
    pub async fn remove_scenario(
        &self,
        user_id: &str,
        scenario: ScenarioTag,
    ) -> Result<(), OutpostError> {
        let mut mirror = self.mirror.write().await;
        let session = mirror
            .get_mut(user_id)
            .ok_or_else(|| OutpostError::NotMonitored(user_id.to_string()))?;
        if !session.has_scenario(scenario) {
            return Err(OutpostError::ScenarioNotActive {
                user_id: user_id.to_string(),
                scenario: scenario.as_str().to_string(),
            });
        }
        session.remove_scenario(scenario);
        let emptied = session.scenarios.is_empty();
        let snapshot = session.clone();
        if emptied {
            mirror.remove(user_id);
        }
        drop(mirror);

        if let Err(e) = self.revoke_tasks_for_scenario(user_id, scenario).await {
            // Scenario removal proceeds even when the sweep fails.
            error!(user_id, scenario = %scenario, error = %e, "failed to revoke scenario tasks");
        }

        if emptied {
            if let Err(e) = self.revoke_all_tasks(user_id).await {
                error!(user_id, error = %e, "failed to revoke remaining tasks");
            }
            self.store.remove_tracked(user_id).await?;
            self.store.delete_user_data(user_id).await?;
            info!(user_id, scenario = %scenario, "last scenario removed, tracking stopped");
        } else {
            self.store.save_session(&snapshot).await?;
            info!(user_id, scenario = %scenario, "scenario removed");
        }
        Ok(())
    }

    /// Snapshot the current scenarios and remove each in turn.
    pub async fn remove_all_scenarios(&self, user_id: &str) -> Result<(), OutpostError> {
        let scenarios: Vec<ScenarioTag> = {
            let mirror = self.mirror.read().await;
            match mirror.get(user_id) {
                Some(session) => session.scenarios.iter().copied().collect(),
                None => return Ok(()),
            }
        };
        let mut first_err = None;
        for scenario in scenarios {
            if let Err(e) = self.remove_scenario(user_id, scenario).await {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Delete every queued task owned by `(user, scenario)`. The whole queue
    /// is scanned because task ids do not encode their target.
    pub async fn revoke_tasks_for_scenario(
        &self,
        user_id: &str,
        scenario: ScenarioTag,
    ) -> Result<usize, OutpostError> {
        let all = self.store.fetch_all().await?;
        let mut removed = 0usize;
        for task in all {
            if !task.is_for_user(user_id) || !task.is_for_scenario(scenario) {
                continue;
            }
            if let Err(e) = self.store.delete_task(&task.task_id).await {
                error!(task_id = %task.task_id, error = %e, "failed to delete task");
                continue;
            }
            removed += 1;
        }
        debug!(user_id, scenario = %scenario, removed, "scenario tasks revoked");
        Ok(removed)
    }

    /// Delete every queued task targeting the user, regardless of scenario.
    pub async fn revoke_all_tasks(&self, user_id: &str) -> Result<usize, OutpostError> {
        let all = self.store.fetch_all().await?;
        let mut removed = 0usize;
        for task in all {
            if !task.is_for_user(user_id) {
                continue;
            }
            if let Err(e) = self.store.delete_task(&task.task_id).await {
                error!(task_id = %task.task_id, error = %e, "failed to delete task");
                continue;
            }
            removed += 1;
        }
        debug!(user_id, removed, "user tasks revoked");
        Ok(removed)
    }

    /// Recreate the scheduled tasks implied by a session, unless the user
    /// already has queued tasks. Expired scenarios are removed instead of
    /// scheduled.
    pub async fn recreate_tasks_for_user(
        &self,
        user_id: &str,
        session: &MonitoringSession,
    ) -> Result<(), OutpostError> {
        let existing = self.store.tasks_for_user(user_id).await?;
        if !existing.is_empty() {
            debug!(
                user_id,
                task_count = existing.len(),
                "user already has tasks, skipping recreation"
            );
            return Ok(());
        }

        let now = Utc::now().timestamp();
        for scenario in session.scenarios.iter().copied().collect::<Vec<_>>() {
            let scheduled_time = if session.expires_at > 0 {
                if session.expires_at > now {
                    session.expires_at
                } else {
                    info!(
                        user_id,
                        scenario = %scenario,
                        expires_at = session.expires_at,
                        "scenario already expired, removing instead of scheduling"
                    );
                    if let Err(e) = self.remove_scenario(user_id, scenario).await {
                        error!(user_id, scenario = %scenario, error = %e, "failed to remove expired scenario");
                    }
                    continue;
                }
            } else {
                now + self.settings.scenario_window_secs(scenario)
            };

            for kind in scenario.spec().task_kinds {
                match kind {
                    TaskKind::RecruitmentReminder => {
                        self.schedule_reminder_at_midpoint(user_id, session.started_at, scenario)
                            .await?;
                    }
                    TaskKind::RecruitmentCleanup => {
                        let task = Task::with_scenario(
                            TaskParams::RecruitmentCleanup {
                                user_id: user_id.to_string(),
                            },
                            scheduled_time,
                            scenario,
                        )?;
                        self.store.save_task(&task).await?;
                        info!(user_id, task_id = %task.task_id, "task recreated");
                    }
                    TaskKind::UserCheckin => {
                        let task = Task::with_scenario(
                            TaskParams::UserCheckin {
                                user_id: user_id.to_string(),
                            },
                            scheduled_time,
                            scenario,
                        )?;
                        self.store.save_task(&task).await?;
                        info!(user_id, task_id = %task.task_id, "task recreated");
                    }
                }
            }
        }
        Ok(())
    }

    /// Enqueue the recruitment reminder at the midpoint of the cleanup
    /// window (start + delay × 12h), but only if that lies in the future.
    pub async fn schedule_reminder_at_midpoint(
        &self,
        user_id: &str,
        start_secs: i64,
        scenario: ScenarioTag,
    ) -> Result<Option<String>, OutpostError> {
        let midpoint = start_secs + self.settings.recruitment_cleanup_delay_days() * 12 * 60 * 60;
        if midpoint <= Utc::now().timestamp() {
            return Ok(None);
        }
        let task = Task::with_scenario(
            TaskParams::RecruitmentReminder {
                user_id: user_id.to_string(),
            },
            midpoint,
            scenario,
        )?;
        self.store.save_task(&task).await?;
        Ok(Some(task.task_id))
    }

    /// Infer scenarios for a user from their queued tasks when durable
    /// session state is missing, and persist the result. Returns the session
    /// and the scenarios that were added.
    pub async fn backfill_session_from_tasks(
        &self,
        user_id: &str,
        tasks: &[Task],
    ) -> Result<(MonitoringSession, Vec<ScenarioTag>), OutpostError> {
        let mut mirror = self.mirror.write().await;
        let session = mirror
            .entry(user_id.to_string())
            .or_insert_with(|| MonitoringSession::new(user_id));

        let mut added = Vec::new();
        for task in tasks {
            let scenario = match task.function_name {
                TaskKind::RecruitmentCleanup | TaskKind::RecruitmentReminder => {
                    ScenarioTag::RecruitmentProcess
                }
                TaskKind::UserCheckin => ScenarioTag::NewRecruit,
            };
            if !session.has_scenario(scenario) {
                session.add_scenario(scenario);
                added.push(scenario);
            }
        }

        if session.expires_at == 0 {
            if let Some(earliest) = tasks
                .iter()
                .map(|t| t.scheduled_time)
                .filter(|t| *t > 0)
                .min()
            {
                session.expires_at = earliest;
                let days = if session.has_scenario(ScenarioTag::NewRecruit) {
                    self.settings.new_recruit_tracking_days()
                } else if session.has_scenario(ScenarioTag::RecruitmentProcess) {
                    self.settings.recruitment_cleanup_delay_days()
                } else {
                    7
                };
                session.started_at = earliest - days * 24 * 60 * 60;
            }
        }

        let snapshot = session.clone();
        drop(mirror);
        self.store.save_session(&snapshot).await?;
        Ok((snapshot, added))
    }
}
