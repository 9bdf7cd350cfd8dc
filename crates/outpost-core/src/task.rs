use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OutpostError;
use crate::scenario::ScenarioTag;

/// The kind of scheduled work a task performs. Wire values are part of the
/// store contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "recruitmentCleanup")]
    RecruitmentCleanup,
    #[serde(rename = "userCheckin")]
    UserCheckin,
    #[serde(rename = "recruitmentReminder")]
    RecruitmentReminder,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecruitmentCleanup => "recruitmentCleanup",
            Self::UserCheckin => "userCheckin",
            Self::RecruitmentReminder => "recruitmentReminder",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed parameters for each task kind. Every kind currently targets a
/// single user; the enum keeps room for richer payloads per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskParams {
    RecruitmentCleanup { user_id: String },
    UserCheckin { user_id: String },
    RecruitmentReminder { user_id: String },
}

impl TaskParams {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::RecruitmentCleanup { .. } => TaskKind::RecruitmentCleanup,
            Self::UserCheckin { .. } => TaskKind::UserCheckin,
            Self::RecruitmentReminder { .. } => TaskKind::RecruitmentReminder,
        }
    }

    pub fn target_user(&self) -> &str {
        match self {
            Self::RecruitmentCleanup { user_id }
            | Self::UserCheckin { user_id }
            | Self::RecruitmentReminder { user_id } => user_id,
        }
    }
}

/// A persisted scheduled task. `params` stays an opaque blob on the wire;
/// `typed_params` decodes it according to `function_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub function_name: TaskKind,
    pub params: Value,
    /// Unix seconds; doubles as the queue score.
    pub scheduled_time: i64,
    pub status: String,
    /// Stored but never incremented: failed tasks stay queued and are
    /// re-fetched on the next tick until they succeed or are revoked.
    pub retries: u32,
    pub created_by: String,
    /// The scenario that owns this task, if any.
    #[serde(default)]
    pub scenario: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct UserParams {
    user_id: String,
}

impl Task {
    /// Build a task owned by a scenario. The id is derived from the kind and
    /// the scheduled time so re-creation of the same task is stable.
    pub fn with_scenario(
        params: TaskParams,
        scheduled_time: i64,
        scenario: ScenarioTag,
    ) -> Result<Self, OutpostError> {
        let kind = params.kind();
        let user_id = params.target_user();
        if user_id.is_empty() {
            return Err(OutpostError::Config("task params require a user_id".into()));
        }
        let params = serde_json::to_value(UserParams {
            user_id: user_id.to_string(),
        })
        .map_err(|e| OutpostError::Storage(e.to_string()))?;
        Ok(Self {
            task_id: format!("{}:{}", kind.as_str(), scheduled_time),
            function_name: kind,
            params,
            scheduled_time,
            status: "pending".to_string(),
            retries: 0,
            created_by: "system".to_string(),
            scenario: scenario.as_str().to_string(),
        })
    }

    /// Decode `params` according to `function_name`.
    pub fn typed_params(&self) -> Result<TaskParams, OutpostError> {
        let p: UserParams = serde_json::from_value(self.params.clone())
            .map_err(|e| OutpostError::Storage(format!("bad params for {}: {e}", self.task_id)))?;
        Ok(match self.function_name {
            TaskKind::RecruitmentCleanup => TaskParams::RecruitmentCleanup { user_id: p.user_id },
            TaskKind::UserCheckin => TaskParams::UserCheckin { user_id: p.user_id },
            TaskKind::RecruitmentReminder => TaskParams::RecruitmentReminder { user_id: p.user_id },
        })
    }

    pub fn is_for_user(&self, user_id: &str) -> bool {
        self.typed_params()
            .map(|p| p.target_user() == user_id)
            .unwrap_or(false)
    }

    pub fn is_for_scenario(&self, scenario: ScenarioTag) -> bool {
        self.scenario == scenario.as_str()
    }
}
