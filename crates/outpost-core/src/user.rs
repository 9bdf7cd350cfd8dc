use serde::{Deserialize, Serialize};

/// Durable per-user record. Timestamps are unix seconds; `None` serializes
/// to an empty slot in the store (the zero-value convention of the user hash).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    #[serde(default)]
    pub current_display_name: String,
    pub current_join_ts: Option<i64>,
    pub previous_join_ts: Option<i64>,
    /// Set when the user enters recruitment, cleared when they drop out.
    pub recruitment_entry_ts: Option<i64>,
}

impl UserRecord {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Roll the join timestamps for a re-joining user.
    pub fn record_join(&mut self, now: i64) {
        self.previous_join_ts = self.current_join_ts;
        self.current_join_ts = Some(now);
    }
}
