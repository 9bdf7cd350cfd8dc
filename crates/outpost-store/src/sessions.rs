use chrono::Utc;
use rusqlite::params;

use outpost_core::MonitoringSession;
use outpost_core::OutpostError;

use crate::{json_err, storage_err, Store};

impl Store {
    /// Persist a session slot. In one transaction: upsert the slot, add the
    /// user to the tracked set, and zero-initialize the counter fields for
    /// each attached scenario's action set (existing counts are never
    /// clobbered).
    pub async fn save_session(&self, session: &MonitoringSession) -> Result<(), OutpostError> {
        let body = serde_json::to_string(session).map_err(json_err)?;
        let mut conn = self.lock().await;
        let tx = conn.transaction().map_err(storage_err)?;
        tx.execute(
            "INSERT INTO sessions (user_id, started_at, expires_at, body)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, started_at) DO UPDATE SET
                 expires_at = excluded.expires_at,
                 body       = excluded.body",
            params![session.user_id, session.started_at, session.expires_at, body],
        )
        .map_err(storage_err)?;
        tx.execute(
            "INSERT OR IGNORE INTO tracked_users (user_id) VALUES (?1)",
            params![session.user_id],
        )
        .map_err(storage_err)?;
        for scenario in &session.scenarios {
            for action in scenario.spec().actions {
                tx.execute(
                    "INSERT OR IGNORE INTO analytics (user_id, scenario, field, count)
                     VALUES (?1, ?2, ?3, 0)",
                    params![session.user_id, scenario.as_str(), action.counter_field()],
                )
                .map_err(storage_err)?;
            }
        }
        tx.commit().map_err(storage_err)?;
        Ok(())
    }

    /// Scan the user's session slots, evict any that have expired, and
    /// return the most recently started of the remainder.
    pub async fn get_active_session(
        &self,
        user_id: &str,
    ) -> Result<Option<MonitoringSession>, OutpostError> {
        let now = Utc::now().timestamp();
        self.get_active_session_at(user_id, now).await
    }

    pub async fn get_active_session_at(
        &self,
        user_id: &str,
        now: i64,
    ) -> Result<Option<MonitoringSession>, OutpostError> {
        let conn = self.lock().await;
        conn.execute(
            "DELETE FROM sessions
             WHERE user_id = ?1 AND expires_at != 0 AND expires_at < ?2",
            params![user_id, now],
        )
        .map_err(storage_err)?;
        let body: Option<String> = {
            let mut stmt = conn
                .prepare(
                    "SELECT body FROM sessions WHERE user_id = ?1
                     ORDER BY started_at DESC LIMIT 1",
                )
                .map_err(storage_err)?;
            let mut rows = stmt.query(params![user_id]).map_err(storage_err)?;
            match rows.next().map_err(storage_err)? {
                Some(row) => Some(row.get(0).map_err(storage_err)?),
                None => None,
            }
        };
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body).map_err(json_err)?)),
            None => Ok(None),
        }
    }

    /// All session slots for a user, newest first. Expired slots are
    /// included; callers that care filter themselves.
    pub async fn sessions_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<MonitoringSession>, OutpostError> {
        let conn = self.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT body FROM sessions WHERE user_id = ?1
                 ORDER BY started_at DESC",
            )
            .map_err(storage_err)?;
        let bodies: Vec<String> = stmt
            .query_map(params![user_id], |row| row.get(0))
            .map_err(storage_err)?
            .filter_map(|r| r.ok())
            .collect();
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(json_err))
            .collect()
    }

    /// Remove every session slot, analytics hash, and channel histogram for
    /// the user, as one transaction.
    pub async fn delete_user_data(&self, user_id: &str) -> Result<(), OutpostError> {
        let mut conn = self.lock().await;
        let tx = conn.transaction().map_err(storage_err)?;
        tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])
            .map_err(storage_err)?;
        tx.execute("DELETE FROM analytics WHERE user_id = ?1", params![user_id])
            .map_err(storage_err)?;
        tx.execute(
            "DELETE FROM channel_counts WHERE user_id = ?1",
            params![user_id],
        )
        .map_err(storage_err)?;
        tx.commit().map_err(storage_err)?;
        Ok(())
    }
}
