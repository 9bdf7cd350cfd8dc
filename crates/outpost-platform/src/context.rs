use uuid::Uuid;

/// Correlation context carried by every event and outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub user_id: String,
    pub trace_id: String,
}

impl EventContext {
    /// Fresh context for an inbound event.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            trace_id: Uuid::new_v4().to_string(),
        }
    }

    /// Context for work spawned from a scheduled task; the task id doubles
    /// as the trace id so the whole chain stays correlated.
    pub fn for_task(user_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            trace_id: task_id.into(),
        }
    }
}
