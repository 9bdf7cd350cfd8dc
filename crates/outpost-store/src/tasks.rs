use rusqlite::{params, OptionalExtension};
use tracing::warn;

use outpost_core::{OutpostError, Task};

use crate::{json_err, storage_err, Store};

impl Store {
    /// Write the task body and enqueue it under its scheduled time. One row
    /// carries both, so queue membership and body presence move together.
    pub async fn save_task(&self, task: &Task) -> Result<(), OutpostError> {
        let body = serde_json::to_string(task).map_err(json_err)?;
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO tasks (task_id, scheduled_time, body)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(task_id) DO UPDATE SET
                 scheduled_time = excluded.scheduled_time,
                 body           = excluded.body",
            params![task.task_id, task.scheduled_time, body],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    /// Remove a task from the queue and the keyed store. Deleting an absent
    /// task is a no-op.
    pub async fn delete_task(&self, task_id: &str) -> Result<(), OutpostError> {
        let conn = self.lock().await;
        conn.execute("DELETE FROM tasks WHERE task_id = ?1", params![task_id])
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn load_task(&self, task_id: &str) -> Result<Option<Task>, OutpostError> {
        let conn = self.lock().await;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM tasks WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body).map_err(json_err)?)),
            None => Ok(None),
        }
    }

    /// Up to `limit` due task ids (score ≤ now), score ascending. Callers
    /// load bodies afterwards and must tolerate a body going missing between
    /// the two steps.
    pub async fn fetch_due(&self, now: i64, limit: usize) -> Result<Vec<String>, OutpostError> {
        let conn = self.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT task_id FROM tasks WHERE scheduled_time <= ?1
                 ORDER BY scheduled_time ASC LIMIT ?2",
            )
            .map_err(storage_err)?;
        let ids = stmt
            .query_map(params![now, limit as i64], |row| row.get::<_, String>(0))
            .map_err(storage_err)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    /// Every queued task, including future ones. Used by revocation sweeps.
    /// Bodies that fail to decode are skipped with a warning rather than
    /// failing the sweep.
    pub async fn fetch_all(&self) -> Result<Vec<Task>, OutpostError> {
        let conn = self.lock().await;
        let mut stmt = conn
            .prepare("SELECT task_id, body FROM tasks ORDER BY scheduled_time ASC")
            .map_err(storage_err)?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(storage_err)?
            .filter_map(|r| r.ok())
            .collect();
        let mut tasks = Vec::with_capacity(rows.len());
        for (task_id, body) in rows {
            match serde_json::from_str(&body) {
                Ok(task) => tasks.push(task),
                Err(e) => warn!(task_id, error = %e, "skipping undecodable task body"),
            }
        }
        Ok(tasks)
    }

    /// Every queued task whose typed params target the given user.
    pub async fn tasks_for_user(&self, user_id: &str) -> Result<Vec<Task>, OutpostError> {
        Ok(self
            .fetch_all()
            .await?
            .into_iter()
            .filter(|t| t.is_for_user(user_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::{ScenarioTag, TaskParams};

    fn task(user: &str, kind_time: i64) -> Task {
        Task::with_scenario(
            TaskParams::RecruitmentCleanup {
                user_id: user.into(),
            },
            kind_time,
            ScenarioTag::RecruitmentProcess,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn enqueue_then_fetch_due_round_trip() {
        let store = Store::in_memory().unwrap();
        let t = task("u1", 1_000);
        store.save_task(&t).await.unwrap();

        assert!(store.fetch_due(999, 100).await.unwrap().is_empty());
        let due = store.fetch_due(1_000, 100).await.unwrap();
        assert_eq!(due, vec![t.task_id.clone()]);
        let loaded = store.load_task(&due[0]).await.unwrap().unwrap();
        assert_eq!(loaded, t);
    }

    #[tokio::test]
    async fn fetch_due_orders_by_score_and_limits() {
        let store = Store::in_memory().unwrap();
        for ts in [30, 10, 20] {
            store.save_task(&task("u", ts)).await.unwrap();
        }
        let due = store.fetch_due(100, 2).await.unwrap();
        assert_eq!(
            due,
            vec![
                "recruitmentCleanup:10".to_string(),
                "recruitmentCleanup:20".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = Store::in_memory().unwrap();
        let t = task("u", 5);
        store.save_task(&t).await.unwrap();
        store.delete_task(&t.task_id).await.unwrap();
        store.delete_task(&t.task_id).await.unwrap();
        assert!(store.load_task(&t.task_id).await.unwrap().is_none());
        assert!(store.fetch_due(100, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tasks_for_user_filters_by_typed_params() {
        let store = Store::in_memory().unwrap();
        store.save_task(&task("alice", 1)).await.unwrap();
        store.save_task(&task("bob", 2)).await.unwrap();
        let mine = store.tasks_for_user("alice").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(mine[0].is_for_user("alice"));
    }

    #[tokio::test]
    async fn fetch_all_returns_future_tasks_too() {
        let store = Store::in_memory().unwrap();
        store.save_task(&task("u", i64::MAX / 2)).await.unwrap();
        assert_eq!(store.fetch_all().await.unwrap().len(), 1);
    }
}
