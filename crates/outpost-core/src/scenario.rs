use serde::{Deserialize, Serialize};

use crate::task::TaskKind;

/// A user action the monitor knows how to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackableAction {
    MessageCreate,
    MessageEdit,
    MessageDelete,
    VoiceJoin,
    VoiceLeave,
    InviteCreate,
    ReactionAdd,
    ReactionRemove,
}

impl TrackableAction {
    /// The analytics counter field this action increments.
    pub fn counter_field(&self) -> &'static str {
        match self {
            Self::MessageCreate => "messages",
            Self::MessageEdit => "message_edits",
            Self::MessageDelete => "message_deletes",
            Self::VoiceJoin => "voice_joins",
            Self::VoiceLeave => "voice_leaves",
            Self::InviteCreate => "invites",
            Self::ReactionAdd => "reactions_added",
            Self::ReactionRemove => "reactions_removed",
        }
    }

    /// Whether the per-channel allow-list applies to this action.
    /// Voice, invite and reaction events carry no meaningful channel scope.
    pub fn is_message_family(&self) -> bool {
        matches!(
            self,
            Self::MessageCreate | Self::MessageEdit | Self::MessageDelete
        )
    }
}

/// A named monitoring profile that can be attached to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioTag {
    /// A user who has just been accepted into the corporation.
    NewRecruit,
    /// A user going through the recruitment process.
    RecruitmentProcess,
}

impl ScenarioTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewRecruit => "new_recruit",
            Self::RecruitmentProcess => "recruitment_process",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new_recruit" => Some(Self::NewRecruit),
            "recruitment_process" => Some(Self::RecruitmentProcess),
            _ => None,
        }
    }

    pub fn all() -> [ScenarioTag; 2] {
        [Self::NewRecruit, Self::RecruitmentProcess]
    }

    pub fn spec(&self) -> &'static ScenarioSpec {
        match self {
            Self::NewRecruit => &NEW_RECRUIT_SPEC,
            Self::RecruitmentProcess => &RECRUITMENT_PROCESS_SPEC,
        }
    }
}

impl std::fmt::Display for ScenarioTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static configuration for one scenario: which actions it counts, where
/// message counting is allowed, and which scheduled tasks it owns.
#[derive(Debug)]
pub struct ScenarioSpec {
    pub tag: ScenarioTag,
    pub actions: &'static [TrackableAction],
    /// Logical channel names restricting where the message family counts.
    /// Empty means unrestricted. Names are resolved to ids via `BotConfig`.
    pub channel_allow_list: &'static [&'static str],
    /// Task kinds owned (and revoked together with) this scenario.
    pub task_kinds: &'static [TaskKind],
}

impl ScenarioSpec {
    pub fn counts(&self, action: TrackableAction) -> bool {
        self.actions.contains(&action)
    }

    pub fn owns(&self, kind: TaskKind) -> bool {
        self.task_kinds.contains(&kind)
    }
}

/// Logical name of the recruitment text channel, resolved through config.
pub const RECRUITMENT_CHANNEL: &str = "recruitment";

static NEW_RECRUIT_SPEC: ScenarioSpec = ScenarioSpec {
    tag: ScenarioTag::NewRecruit,
    actions: &[
        TrackableAction::MessageCreate,
        TrackableAction::VoiceJoin,
        TrackableAction::InviteCreate,
    ],
    channel_allow_list: &[],
    task_kinds: &[TaskKind::UserCheckin],
};

static RECRUITMENT_PROCESS_SPEC: ScenarioSpec = ScenarioSpec {
    tag: ScenarioTag::RecruitmentProcess,
    actions: &[TrackableAction::MessageCreate, TrackableAction::InviteCreate],
    channel_allow_list: &[RECRUITMENT_CHANNEL],
    task_kinds: &[TaskKind::RecruitmentCleanup, TaskKind::RecruitmentReminder],
};
