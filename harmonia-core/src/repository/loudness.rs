//! Measured track loudness, written back from the decode pipeline at
//! stream end and read by the stream coordinator for replay-gain.

use sqlx::SqlitePool;

use crate::Result;

#[derive(Clone)]
pub struct LoudnessRepository {
    pool: SqlitePool,
}

impl LoudnessRepository {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, provider: &str, item_id: &str) -> Result<Option<f64>> {
        let loudness = sqlx::query_scalar::<_, f64>(
            "SELECT loudness_lufs FROM track_loudness WHERE provider = ? AND item_id = ?",
        )
        .bind(provider)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(loudness)
    }

    pub async fn set(&self, provider: &str, item_id: &str, loudness_lufs: f64) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO track_loudness (provider, item_id, loudness_lufs)
             VALUES (?, ?, ?)",
        )
        .bind(provider)
        .bind(item_id)
        .bind(loudness_lufs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;

    #[tokio::test]
    async fn test_set_get() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = LoudnessRepository::new(db.pool().clone());

        assert!(repo.get("spotify", "abc").await.unwrap().is_none());
        repo.set("spotify", "abc", -9.5).await.unwrap();
        assert_eq!(repo.get("spotify", "abc").await.unwrap(), Some(-9.5));
        // overwrite
        repo.set("spotify", "abc", -11.0).await.unwrap();
        assert_eq!(repo.get("spotify", "abc").await.unwrap(), Some(-11.0));
    }
}
