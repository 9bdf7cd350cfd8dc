use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::scenario::{ScenarioTag, TrackableAction};

/// The attachment of one or more scenarios to a user over a time window.
///
/// A session is keyed in the store by `(user_id, started_at)`; a user may
/// accumulate several historical slots, but only the most recent non-expired
/// one drives tracking decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringSession {
    pub user_id: String,
    pub scenarios: BTreeSet<ScenarioTag>,
    /// Unix seconds when monitoring started.
    pub started_at: i64,
    /// Unix seconds when monitoring ends; 0 means indefinite.
    pub expires_at: i64,
}

impl MonitoringSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            scenarios: BTreeSet::new(),
            started_at: Utc::now().timestamp(),
            expires_at: 0,
        }
    }

    pub fn add_scenario(&mut self, scenario: ScenarioTag) {
        self.scenarios.insert(scenario);
    }

    pub fn remove_scenario(&mut self, scenario: ScenarioTag) {
        self.scenarios.remove(&scenario);
    }

    pub fn has_scenario(&self, scenario: ScenarioTag) -> bool {
        self.scenarios.contains(&scenario)
    }

    /// Set expiry relative to now; a non-positive duration clears it.
    pub fn set_expiration_secs(&mut self, duration_secs: i64) {
        if duration_secs > 0 {
            self.expires_at = Utc::now().timestamp() + duration_secs;
        } else {
            self.expires_at = 0;
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at != 0 && now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    /// True if any attached scenario counts this action.
    pub fn tracks_action(&self, action: TrackableAction) -> bool {
        self.scenarios.iter().any(|s| s.spec().counts(action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indefinite_session_never_expires() {
        let s = MonitoringSession::new("100");
        assert_eq!(s.expires_at, 0);
        assert!(!s.is_expired_at(i64::MAX));
    }

    #[test]
    fn expiry_is_strict() {
        let mut s = MonitoringSession::new("100");
        s.expires_at = 1_000;
        assert!(!s.is_expired_at(1_000));
        assert!(s.is_expired_at(1_001));
    }

    #[test]
    fn tracks_action_unions_scenarios() {
        let mut s = MonitoringSession::new("100");
        s.add_scenario(ScenarioTag::RecruitmentProcess);
        assert!(!s.tracks_action(TrackableAction::VoiceJoin));
        s.add_scenario(ScenarioTag::NewRecruit);
        assert!(s.tracks_action(TrackableAction::VoiceJoin));
        s.remove_scenario(ScenarioTag::NewRecruit);
        assert!(!s.tracks_action(TrackableAction::VoiceJoin));
    }

    #[test]
    fn session_blob_round_trips() {
        let mut s = MonitoringSession::new("424242");
        s.add_scenario(ScenarioTag::NewRecruit);
        s.started_at = 1_700_000_000;
        s.expires_at = 1_700_604_800;
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("new_recruit"), "wire name is snake_case: {json}");
        let back: MonitoringSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
