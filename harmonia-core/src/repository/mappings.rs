//! Provider-mapping index: fast lookups from provider ids to database ids.
//!
//! The index exists because resolving `(provider, provider_item_id)` to a
//! canonical row must not require scanning JSON columns. It is rewritten
//! together with every row update, so it is always an exact image of the
//! union of all rows' mapping sets.

use sqlx::SqlitePool;

use crate::models::MediaType;
use crate::Result;

#[derive(Clone)]
pub struct ProviderMappingRepository {
    pool: SqlitePool,
}

impl ProviderMappingRepository {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve a provider item to its database id, matching the provider by
    /// instance id or domain.
    pub async fn get_db_id(
        &self,
        media_type: MediaType,
        provider_instance_or_domain: &str,
        provider_item_id: &str,
    ) -> Result<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT item_id FROM provider_mappings
             WHERE media_type = ?
               AND (provider_instance = ? OR provider_domain = ?)
               AND provider_item_id = ?",
        )
        .bind(media_type.as_str())
        .bind(provider_instance_or_domain)
        .bind(provider_instance_or_domain)
        .bind(provider_item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    /// Remove the index rows of one provider instance for one entity.
    pub async fn delete_instance_mappings(
        &self,
        media_type: MediaType,
        db_id: i64,
        provider_instance: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM provider_mappings
             WHERE media_type = ? AND item_id = ? AND provider_instance = ?",
        )
        .bind(media_type.as_str())
        .bind(db_id)
        .bind(provider_instance)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Remove every index row of a provider instance (provider removal).
    pub async fn delete_all_for_instance(&self, provider_instance: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM provider_mappings WHERE provider_instance = ?")
            .bind(provider_instance)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::item::MediaItem;
    use crate::models::{ProviderMapping, Track};
    use crate::repository::{Database, MediaItemRepository};

    #[tokio::test]
    async fn test_get_db_id_by_instance_and_domain() {
        let db = Database::connect_in_memory().await.unwrap();
        let tracks: MediaItemRepository<Track> = MediaItemRepository::new(db.pool().clone());
        let mappings = ProviderMappingRepository::new(db.pool().clone());

        let mut track = Track::new("abc", "spotify", "Something");
        track.add_provider_mapping(ProviderMapping::new("spotify--1", "spotify", "abc"));
        let stored = tracks.insert(&track).await.unwrap();
        let db_id: i64 = stored.item_id.parse().unwrap();

        assert_eq!(
            mappings
                .get_db_id(MediaType::Track, "spotify--1", "abc")
                .await
                .unwrap(),
            Some(db_id)
        );
        assert_eq!(
            mappings
                .get_db_id(MediaType::Track, "spotify", "abc")
                .await
                .unwrap(),
            Some(db_id)
        );
        assert_eq!(
            mappings
                .get_db_id(MediaType::Album, "spotify", "abc")
                .await
                .unwrap(),
            None
        );
    }
}
