use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use rusqlite::params;

use outpost_core::{MonitoringSession, OutpostError, ScenarioTag};

use crate::{json_err, storage_err, Store};

/// Aggregated analytics for a user across their active scenarios.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyticsSnapshot {
    pub user_id: String,
    /// Like-named fields summed across the active scenarios.
    pub counters: HashMap<String, i64>,
    pub top_channel_id: Option<String>,
}

impl AnalyticsSnapshot {
    pub fn get(&self, field: &str) -> i64 {
        self.counters.get(field).copied().unwrap_or(0)
    }
}

impl Store {
    /// Best-effort counter bump for one (user, scenario) hash.
    pub async fn incr_counter(
        &self,
        user_id: &str,
        scenario: ScenarioTag,
        field: &str,
        delta: i64,
    ) -> Result<(), OutpostError> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO analytics (user_id, scenario, field, count)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, scenario, field) DO UPDATE SET
                 count = count + excluded.count",
            params![user_id, scenario.as_str(), field, delta],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    /// Best-effort bump of one channel's message count in the histogram.
    pub async fn incr_channel(
        &self,
        user_id: &str,
        scenario: ScenarioTag,
        channel_id: &str,
        delta: i64,
    ) -> Result<(), OutpostError> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO channel_counts (user_id, scenario, channel_id, count)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, scenario, channel_id) DO UPDATE SET
                 count = count + excluded.count",
            params![user_id, scenario.as_str(), channel_id, delta],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    /// Overwrite a counter with an absolute value (used by rebuilds).
    pub async fn set_counter(
        &self,
        user_id: &str,
        scenario: ScenarioTag,
        field: &str,
        value: i64,
    ) -> Result<(), OutpostError> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO analytics (user_id, scenario, field, count)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, scenario, field) DO UPDATE SET
                 count = excluded.count",
            params![user_id, scenario.as_str(), field, value],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    /// Overwrite a channel histogram entry with an absolute value.
    pub async fn set_channel_count(
        &self,
        user_id: &str,
        scenario: ScenarioTag,
        channel_id: &str,
        value: i64,
    ) -> Result<(), OutpostError> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO channel_counts (user_id, scenario, channel_id, count)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, scenario, channel_id) DO UPDATE SET
                 count = excluded.count",
            params![user_id, scenario.as_str(), channel_id, value],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    /// All counter fields for one (user, scenario) hash.
    pub async fn counters_for_scenario(
        &self,
        user_id: &str,
        scenario: ScenarioTag,
    ) -> Result<HashMap<String, i64>, OutpostError> {
        let conn = self.lock().await;
        let mut stmt = conn
            .prepare("SELECT field, count FROM analytics WHERE user_id = ?1 AND scenario = ?2")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![user_id, scenario.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(storage_err)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Highest-count channel in one (user, scenario) histogram.
    pub async fn top_channel(
        &self,
        user_id: &str,
        scenario: ScenarioTag,
    ) -> Result<Option<String>, OutpostError> {
        let channels = self.top_channels(user_id, scenario, 1).await?;
        Ok(channels.into_iter().next().map(|(id, _)| id))
    }

    /// Top-K channels by message count, descending.
    pub async fn top_channels(
        &self,
        user_id: &str,
        scenario: ScenarioTag,
        limit: usize,
    ) -> Result<Vec<(String, i64)>, OutpostError> {
        let conn = self.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT channel_id, count FROM channel_counts
                 WHERE user_id = ?1 AND scenario = ?2
                 ORDER BY count DESC, channel_id ASC LIMIT ?3",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![user_id, scenario.as_str(), limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(storage_err)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Aggregate counters across every currently non-expired session's
    /// scenarios, summing like-named fields. Expired sessions encountered
    /// during the scan are evicted. The top channel comes from the first
    /// scenario of the most recent active session.
    pub async fn get_counters(&self, user_id: &str) -> Result<AnalyticsSnapshot, OutpostError> {
        self.get_counters_at(user_id, Utc::now().timestamp()).await
    }

    pub async fn get_counters_at(
        &self,
        user_id: &str,
        now: i64,
    ) -> Result<AnalyticsSnapshot, OutpostError> {
        let active: Vec<MonitoringSession> = {
            let conn = self.lock().await;
            conn.execute(
                "DELETE FROM sessions
                 WHERE user_id = ?1 AND expires_at != 0 AND expires_at < ?2",
                params![user_id, now],
            )
            .map_err(storage_err)?;
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
                .collect::<Result<_, _>>()?
        };

        let mut snapshot = AnalyticsSnapshot {
            user_id: user_id.to_string(),
            ..Default::default()
        };

        let scenarios: BTreeSet<ScenarioTag> = active
            .iter()
            .flat_map(|s| s.scenarios.iter().copied())
            .collect();
        for scenario in &scenarios {
            for (field, count) in self.counters_for_scenario(user_id, *scenario).await? {
                *snapshot.counters.entry(field).or_insert(0) += count;
            }
        }

        if let Some(latest) = active.first() {
            if let Some(first_scenario) = latest.scenarios.iter().next() {
                snapshot.top_channel_id = self.top_channel(user_id, *first_scenario).await?;
            }
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user: &str, started: i64, expires: i64, tags: &[ScenarioTag]) -> MonitoringSession {
        let mut s = MonitoringSession::new(user);
        s.started_at = started;
        s.expires_at = expires;
        for t in tags {
            s.add_scenario(*t);
        }
        s
    }

    #[tokio::test]
    async fn increments_accumulate_per_scenario() {
        let store = Store::in_memory().unwrap();
        store
            .incr_counter("u", ScenarioTag::NewRecruit, "messages", 1)
            .await
            .unwrap();
        store
            .incr_counter("u", ScenarioTag::NewRecruit, "messages", 2)
            .await
            .unwrap();
        store
            .incr_counter("u", ScenarioTag::RecruitmentProcess, "messages", 5)
            .await
            .unwrap();
        assert_eq!(
            store
                .counters_for_scenario("u", ScenarioTag::NewRecruit)
                .await
                .unwrap()
                .get("messages"),
            Some(&3)
        );
        assert_eq!(
            store
                .counters_for_scenario("u", ScenarioTag::RecruitmentProcess)
                .await
                .unwrap()
                .get("messages"),
            Some(&5)
        );
    }

    #[tokio::test]
    async fn top_channel_orders_by_count() {
        let store = Store::in_memory().unwrap();
        for (ch, n) in [("alpha", 2), ("beta", 7), ("gamma", 4)] {
            store
                .incr_channel("u", ScenarioTag::NewRecruit, ch, n)
                .await
                .unwrap();
        }
        assert_eq!(
            store.top_channel("u", ScenarioTag::NewRecruit).await.unwrap(),
            Some("beta".to_string())
        );
        let top2 = store
            .top_channels("u", ScenarioTag::NewRecruit, 2)
            .await
            .unwrap();
        assert_eq!(top2, vec![("beta".into(), 7), ("gamma".into(), 4)]);
    }

    #[tokio::test]
    async fn get_counters_sums_across_active_scenarios() {
        let store = Store::in_memory().unwrap();
        store
            .save_session(&session(
                "u",
                100,
                0,
                &[ScenarioTag::NewRecruit, ScenarioTag::RecruitmentProcess],
            ))
            .await
            .unwrap();
        store
            .incr_counter("u", ScenarioTag::NewRecruit, "messages", 4)
            .await
            .unwrap();
        store
            .incr_counter("u", ScenarioTag::RecruitmentProcess, "messages", 6)
            .await
            .unwrap();
        store
            .incr_channel("u", ScenarioTag::NewRecruit, "c-main", 4)
            .await
            .unwrap();

        let snap = store.get_counters_at("u", 200).await.unwrap();
        assert_eq!(snap.get("messages"), 10);
        assert_eq!(snap.top_channel_id, Some("c-main".to_string()));
    }

    #[tokio::test]
    async fn get_counters_evicts_expired_sessions() {
        let store = Store::in_memory().unwrap();
        store
            .save_session(&session("u", 100, 150, &[ScenarioTag::RecruitmentProcess]))
            .await
            .unwrap();
        store
            .incr_counter("u", ScenarioTag::RecruitmentProcess, "messages", 9)
            .await
            .unwrap();

        let snap = store.get_counters_at("u", 500).await.unwrap();
        assert_eq!(snap.get("messages"), 0, "expired scenario no longer aggregated");
        assert!(store.sessions_for_user("u").await.unwrap().is_empty());
    }
}
