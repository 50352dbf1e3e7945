//! Repository for the small `configuration` key/value table. Used by the
//! server binary to stamp an operational fingerprint (server name,
//! generated server uuid) at startup; the scheduling/storage core never
//! reads from it.

use chrono::Utc;

use crate::db::connection::DatabasePool;
use crate::db::models::Configuration;

pub struct ConfigurationRepository;

impl ConfigurationRepository {
    pub async fn get(pool: &DatabasePool, key: &str) -> Result<Option<Configuration>, sqlx::Error> {
        sqlx::query_as::<_, Configuration>("SELECT * FROM configuration WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    pub async fn set(
        pool: &DatabasePool,
        key: &str,
        value: &str,
        value_type: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO configuration (key, value, value_type, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, value_type = excluded.value_type, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(value_type)
        .bind(&now)
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> sqlx::sqlite::SqlitePool {
        let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE configuration (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                value_type TEXT NOT NULL DEFAULT 'string',
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let pool = setup_db().await;
        ConfigurationRepository::set(&pool, "server.name", "dagflow-1", "string")
            .await
            .unwrap();

        let fetched = ConfigurationRepository::get(&pool, "server.name").await.unwrap();
        assert_eq!(fetched.unwrap().value, "dagflow-1");
    }

    #[tokio::test]
    async fn set_is_idempotent_upsert() {
        let pool = setup_db().await;
        ConfigurationRepository::set(&pool, "server.uuid", "a", "string").await.unwrap();
        ConfigurationRepository::set(&pool, "server.uuid", "b", "string").await.unwrap();

        let fetched = ConfigurationRepository::get(&pool, "server.uuid").await.unwrap();
        assert_eq!(fetched.unwrap().value, "b");
    }

    #[tokio::test]
    async fn get_missing_key_is_none() {
        let pool = setup_db().await;
        assert!(ConfigurationRepository::get(&pool, "nope").await.unwrap().is_none());
    }
}
