use rusqlite::{params, OptionalExtension};

use outpost_core::{OutpostError, UserRecord};

use crate::{storage_err, Store};

impl Store {
    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, OutpostError> {
        let conn = self.lock().await;
        conn.query_row(
            "SELECT user_id, current_display_name, current_join_ts,
                    previous_join_ts, recruitment_entry_ts
             FROM users WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(UserRecord {
                    user_id: row.get(0)?,
                    current_display_name: row.get(1)?,
                    current_join_ts: row.get(2)?,
                    previous_join_ts: row.get(3)?,
                    recruitment_entry_ts: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(storage_err)
    }

    pub async fn put_user(&self, user: &UserRecord) -> Result<(), OutpostError> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO users
                 (user_id, current_display_name, current_join_ts,
                  previous_join_ts, recruitment_entry_ts)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                 current_display_name = excluded.current_display_name,
                 current_join_ts      = excluded.current_join_ts,
                 previous_join_ts     = excluded.previous_join_ts,
                 recruitment_entry_ts = excluded.recruitment_entry_ts",
            params![
                user.user_id,
                user.current_display_name,
                user.current_join_ts,
                user.previous_join_ts,
                user.recruitment_entry_ts,
            ],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    /// Set or clear the recruitment-entry timestamp without touching the
    /// rest of the record. A missing user row is created on the fly.
    pub async fn set_recruitment_entry(
        &self,
        user_id: &str,
        ts: Option<i64>,
    ) -> Result<(), OutpostError> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO users (user_id, recruitment_entry_ts) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET recruitment_entry_ts = excluded.recruitment_entry_ts",
            params![user_id, ts],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    pub async fn add_tracked(&self, user_id: &str) -> Result<(), OutpostError> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO tracked_users (user_id) VALUES (?1)",
            params![user_id],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    pub async fn remove_tracked(&self, user_id: &str) -> Result<(), OutpostError> {
        let conn = self.lock().await;
        conn.execute(
            "DELETE FROM tracked_users WHERE user_id = ?1",
            params![user_id],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    pub async fn list_tracked(&self) -> Result<Vec<String>, OutpostError> {
        let conn = self.lock().await;
        let mut stmt = conn
            .prepare("SELECT user_id FROM tracked_users ORDER BY user_id")
            .map_err(storage_err)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(storage_err)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn user_round_trip() {
        let store = Store::in_memory().unwrap();
        let mut u = UserRecord::new("1001");
        u.current_display_name = "Rook".into();
        u.record_join(500);
        store.put_user(&u).await.unwrap();

        let back = store.get_user("1001").await.unwrap().unwrap();
        assert_eq!(back, u);
        assert!(store.get_user("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_timestamps_stay_empty() {
        let store = Store::in_memory().unwrap();
        store.put_user(&UserRecord::new("2")).await.unwrap();
        let back = store.get_user("2").await.unwrap().unwrap();
        assert_eq!(back.current_join_ts, None);
        assert_eq!(back.recruitment_entry_ts, None);
    }

    #[tokio::test]
    async fn recruitment_entry_set_and_clear() {
        let store = Store::in_memory().unwrap();
        store.set_recruitment_entry("3", Some(900)).await.unwrap();
        assert_eq!(
            store.get_user("3").await.unwrap().unwrap().recruitment_entry_ts,
            Some(900)
        );
        store.set_recruitment_entry("3", None).await.unwrap();
        assert_eq!(
            store.get_user("3").await.unwrap().unwrap().recruitment_entry_ts,
            None
        );
    }

    #[tokio::test]
    async fn tracked_set_membership() {
        let store = Store::in_memory().unwrap();
        store.add_tracked("b").await.unwrap();
        store.add_tracked("a").await.unwrap();
        store.add_tracked("a").await.unwrap();
        assert_eq!(store.list_tracked().await.unwrap(), vec!["a", "b"]);
        store.remove_tracked("a").await.unwrap();
        assert_eq!(store.list_tracked().await.unwrap(), vec!["b"]);
    }
}
