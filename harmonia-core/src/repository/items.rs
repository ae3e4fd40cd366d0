//! Generic row store for canonical media items.
//!
//! Every entity table shares the same layout: indexed scalar columns for
//! lookups (name, sort_name, library flag, external ids) plus a JSON `data`
//! column holding the full entity. On load the indexed columns are
//! authoritative: `item_id` becomes the database id, `provider` becomes
//! "database" and derived fields are regenerated.

use std::collections::HashSet;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{
    Album, Artist, Audiobook, Episode, LibraryQuery, MediaItem, PagedItems, Playlist, Podcast,
    ProviderMapping, Radio, Track,
};
use crate::uri::create_uri;
use crate::{Result, DB_PROVIDER};

/// A media item that can be persisted to its entity table.
pub trait StoredMediaItem: MediaItem + Serialize + DeserializeOwned {
    const TABLE: &'static str;

    fn musicbrainz_id(&self) -> Option<&str> {
        None
    }
    /// All ISRCs joined with ';' (tracks only).
    fn isrcs_joined(&self) -> Option<String> {
        None
    }
    fn upc(&self) -> Option<&str> {
        None
    }
}

impl StoredMediaItem for Artist {
    const TABLE: &'static str = "artists";
    fn musicbrainz_id(&self) -> Option<&str> {
        self.musicbrainz_id.as_deref()
    }
}

impl StoredMediaItem for Album {
    const TABLE: &'static str = "albums";
    fn musicbrainz_id(&self) -> Option<&str> {
        self.musicbrainz_id.as_deref()
    }
    fn upc(&self) -> Option<&str> {
        self.upc.as_deref()
    }
}

impl StoredMediaItem for Track {
    const TABLE: &'static str = "tracks";
    fn musicbrainz_id(&self) -> Option<&str> {
        self.musicbrainz_id.as_deref()
    }
    fn isrcs_joined(&self) -> Option<String> {
        if self.isrcs.is_empty() {
            None
        } else {
            Some(self.isrcs.iter().cloned().collect::<Vec<_>>().join(";"))
        }
    }
}

impl StoredMediaItem for Playlist {
    const TABLE: &'static str = "playlists";
}

impl StoredMediaItem for Radio {
    const TABLE: &'static str = "radios";
}

impl StoredMediaItem for Audiobook {
    const TABLE: &'static str = "audiobooks";
}

impl StoredMediaItem for Podcast {
    const TABLE: &'static str = "podcasts";
}

impl StoredMediaItem for Episode {
    const TABLE: &'static str = "episodes";
}

/// Row store for one entity type.
#[derive(Clone)]
pub struct MediaItemRepository<T: StoredMediaItem> {
    pool: SqlitePool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: StoredMediaItem> MediaItemRepository<T> {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    const fn select_columns() -> &'static str {
        "item_id, name, sort_name, in_library, data, timestamp_added, timestamp_modified"
    }

    /// Insert a new canonical row and its provider-mapping index rows in
    /// one transaction. Returns the stored entity.
    pub async fn insert(&self, item: &T) -> Result<T> {
        let now = chrono::Utc::now().timestamp();
        let data = serde_json::to_string(item)?;

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(&format!(
            "INSERT INTO {} (name, sort_name, in_library, musicbrainz_id, isrcs, upc,
                             data, timestamp_added, timestamp_modified)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            T::TABLE
        ))
        .bind(item.name())
        .bind(item.sort_name())
        .bind(i64::from(item.in_library()))
        .bind(item.musicbrainz_id())
        .bind(item.isrcs_joined())
        .bind(item.upc())
        .bind(&data)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let db_id = result.last_insert_rowid();

        write_mapping_index(&mut tx, T::MEDIA_TYPE.as_str(), db_id, item.provider_mappings())
            .await?;
        tx.commit().await?;

        self.get_or_err(db_id).await
    }

    /// Update an existing row, rewriting its mapping index rows in the same
    /// transaction. `timestamp_added` is preserved.
    pub async fn update(&self, db_id: i64, item: &T) -> Result<T> {
        let now = chrono::Utc::now().timestamp();
        let data = serde_json::to_string(item)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "UPDATE {} SET name = ?, sort_name = ?, in_library = ?, musicbrainz_id = ?,
                           isrcs = ?, upc = ?, data = ?, timestamp_modified = ?
             WHERE item_id = ?",
            T::TABLE
        ))
        .bind(item.name())
        .bind(item.sort_name())
        .bind(i64::from(item.in_library()))
        .bind(item.musicbrainz_id())
        .bind(item.isrcs_joined())
        .bind(item.upc())
        .bind(&data)
        .bind(now)
        .bind(db_id)
        .execute(&mut *tx)
        .await?;

        write_mapping_index(&mut tx, T::MEDIA_TYPE.as_str(), db_id, item.provider_mappings())
            .await?;
        tx.commit().await?;

        self.get_or_err(db_id).await
    }

    pub async fn get(&self, db_id: i64) -> Result<Option<T>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE item_id = ?",
            Self::select_columns(),
            T::TABLE
        ))
        .bind(db_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| self.row_to_item(&row)).transpose()
    }

    pub async fn get_or_err(&self, db_id: i64) -> Result<T> {
        self.get(db_id).await?.ok_or_else(|| {
            crate::Error::MediaNotFound(format!("{} not in database: {db_id}", T::MEDIA_TYPE))
        })
    }

    /// Rows whose sort_name matches exactly (dedup candidate lookup).
    pub async fn by_sort_name(&self, sort_name: &str) -> Result<Vec<T>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE sort_name = ?",
            Self::select_columns(),
            T::TABLE
        ))
        .bind(sort_name)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|row| self.row_to_item(row)).collect()
    }

    pub async fn by_musicbrainz_id(&self, musicbrainz_id: &str) -> Result<Option<T>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE musicbrainz_id = ?",
            Self::select_columns(),
            T::TABLE
        ))
        .bind(musicbrainz_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| self.row_to_item(&row)).transpose()
    }

    /// The isrcs column stores all ISRCs ';'-joined, so a substring match
    /// finds a track by any of them.
    pub async fn by_isrc(&self, isrc: &str) -> Result<Option<T>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE isrcs LIKE '%' || ? || '%'",
            Self::select_columns(),
            T::TABLE
        ))
        .bind(isrc)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| self.row_to_item(&row)).transpose()
    }

    pub async fn by_upc(&self, upc: &str) -> Result<Option<T>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE upc = ?",
            Self::select_columns(),
            T::TABLE
        ))
        .bind(upc)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| self.row_to_item(&row)).transpose()
    }

    /// Paged library listing.
    pub async fn library_items(&self, query: &LibraryQuery) -> Result<PagedItems<T>> {
        let mut where_parts: Vec<&str> = Vec::new();
        if query.search.is_some() {
            where_parts.push("name LIKE '%' || ? || '%'");
        }
        if query.in_library.is_some() {
            where_parts.push("in_library = ?");
        }
        let where_clause = if where_parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", where_parts.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} LIMIT ? OFFSET ?",
            Self::select_columns(),
            T::TABLE,
            where_clause,
            query.order_by.as_sql()
        );
        let mut q = sqlx::query(&sql);
        if let Some(search) = &query.search {
            q = q.bind(search);
        }
        if let Some(in_library) = query.in_library {
            q = q.bind(i64::from(in_library));
        }
        let rows = q
            .bind(query.limit as i64)
            .bind(query.offset as i64)
            .fetch_all(&self.pool)
            .await?;
        let items: Vec<T> = rows
            .iter()
            .map(|row| self.row_to_item(row))
            .collect::<Result<_>>()?;

        let count_sql = format!("SELECT COUNT(*) FROM {}{}", T::TABLE, where_clause);
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(search) = &query.search {
            count_q = count_q.bind(search);
        }
        if let Some(in_library) = query.in_library {
            count_q = count_q.bind(i64::from(in_library));
        }
        let total = count_q.fetch_one(&self.pool).await?;

        Ok(PagedItems {
            count: items.len(),
            items,
            limit: query.limit,
            offset: query.offset,
            total,
        })
    }

    /// Name search against the canonical rows.
    pub async fn search(&self, search_query: &str, limit: usize) -> Result<Vec<T>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE name LIKE '%' || ? || '%' ORDER BY sort_name LIMIT ?",
            Self::select_columns(),
            T::TABLE
        ))
        .bind(search_query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|row| self.row_to_item(row)).collect()
    }

    /// All rows holding a mapping for the given provider instance or domain,
    /// optionally restricted to specific provider item ids.
    pub async fn by_provider(
        &self,
        provider_instance_or_domain: &str,
        provider_item_ids: Option<&[String]>,
    ) -> Result<Vec<T>> {
        let mut sql = format!(
            "SELECT {} FROM {} WHERE item_id IN (
                SELECT item_id FROM provider_mappings
                WHERE media_type = ?
                  AND (provider_instance = ? OR provider_domain = ?)",
            Self::select_columns(),
            T::TABLE
        );
        if let Some(ids) = provider_item_ids {
            let placeholders = vec!["?"; ids.len()].join(", ");
            sql.push_str(&format!(" AND provider_item_id IN ({placeholders})"));
        }
        sql.push(')');

        let mut q = sqlx::query(&sql)
            .bind(T::MEDIA_TYPE.as_str())
            .bind(provider_instance_or_domain)
            .bind(provider_instance_or_domain);
        if let Some(ids) = provider_item_ids {
            for id in ids {
                q = q.bind(id);
            }
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(|row| self.row_to_item(row)).collect()
    }

    /// Database ids of all rows marked in-library that map to the given
    /// provider (sync snapshot).
    pub async fn library_ids_for_provider(
        &self,
        provider_instance_or_domain: &str,
    ) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT item_id FROM {} WHERE in_library = 1 AND item_id IN (
                SELECT item_id FROM provider_mappings
                WHERE media_type = ? AND (provider_instance = ? OR provider_domain = ?)
            )",
            T::TABLE
        ))
        .bind(T::MEDIA_TYPE.as_str())
        .bind(provider_instance_or_domain)
        .bind(provider_instance_or_domain)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Rows whose serialized form contains the given fragment. Used to find
    /// rows referencing another item by uri when breaking references.
    pub async fn by_data_substring(&self, fragment: &str) -> Result<Vec<T>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE data LIKE '%' || ? || '%'",
            Self::select_columns(),
            T::TABLE
        ))
        .bind(fragment)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|row| self.row_to_item(row)).collect()
    }

    pub async fn set_in_library(&self, db_id: i64, in_library: bool) -> Result<()> {
        sqlx::query(&format!(
            "UPDATE {} SET in_library = ?, timestamp_modified = ? WHERE item_id = ?",
            T::TABLE
        ))
        .bind(i64::from(in_library))
        .bind(chrono::Utc::now().timestamp())
        .bind(db_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete the row and its mapping index rows in one transaction.
    pub async fn delete(&self, db_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {} WHERE item_id = ?", T::TABLE))
            .bind(db_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM provider_mappings WHERE media_type = ? AND item_id = ?")
            .bind(T::MEDIA_TYPE.as_str())
            .bind(db_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Convert a database row into the entity. The database id and provider
    /// override whatever the stored JSON carries, and derived fields are
    /// regenerated.
    fn row_to_item(&self, row: &SqliteRow) -> Result<T> {
        let data: String = row.try_get("data")?;
        let mut item: T = serde_json::from_str(&data)?;
        let db_id: i64 = row.try_get("item_id")?;
        item.set_item_id(db_id.to_string());
        item.set_provider(DB_PROVIDER.to_string());
        item.set_uri(create_uri(T::MEDIA_TYPE, DB_PROVIDER, &db_id.to_string()));
        item.set_in_library(row.try_get::<i64, _>("in_library")? != 0);
        item.set_timestamps(
            row.try_get("timestamp_added")?,
            row.try_get("timestamp_modified")?,
        );
        item.regenerate_derived_fields();
        Ok(item)
    }
}

/// Rewrite the mapping index rows for one entity so the table stays an
/// exact image of the union of all rows' mapping sets.
async fn write_mapping_index(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    media_type: &str,
    db_id: i64,
    mappings: &HashSet<ProviderMapping>,
) -> Result<()> {
    sqlx::query("DELETE FROM provider_mappings WHERE media_type = ? AND item_id = ?")
        .bind(media_type)
        .bind(db_id)
        .execute(&mut **tx)
        .await?;
    for mapping in mappings {
        sqlx::query(
            "INSERT OR REPLACE INTO provider_mappings
                (media_type, item_id, provider_domain, provider_instance, provider_item_id)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(media_type)
        .bind(db_id)
        .bind(&mapping.provider_domain)
        .bind(&mapping.provider_instance)
        .bind(&mapping.item_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaType;
    use crate::repository::Database;

    fn sample_track() -> Track {
        let mut track = Track::new("abc", "spotify", "Come Together");
        track.duration = 259;
        track.isrcs.insert("GBAYE0601498".to_string());
        track.add_provider_mapping(ProviderMapping::new("spotify--1", "spotify", "abc"));
        track
    }

    #[tokio::test]
    async fn test_insert_and_roundtrip() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo: MediaItemRepository<Track> = MediaItemRepository::new(db.pool().clone());

        let stored = repo.insert(&sample_track()).await.unwrap();
        assert_eq!(stored.provider, DB_PROVIDER);
        assert_eq!(stored.name, "Come Together");
        assert_eq!(stored.sort_name, "come together");
        assert_eq!(stored.uri, format!("track://database/{}", stored.item_id));
        assert_eq!(stored.duration, 259);
        assert_eq!(stored.provider_mappings.len(), 1);
        assert!(stored.timestamp_added > 0);
    }

    #[tokio::test]
    async fn test_mapping_index_mirrors_row() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo: MediaItemRepository<Track> = MediaItemRepository::new(db.pool().clone());

        let mut track = sample_track();
        let stored = repo.insert(&track).await.unwrap();
        let db_id: i64 = stored.item_id.parse().unwrap();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM provider_mappings WHERE media_type = ? AND item_id = ?",
        )
        .bind(MediaType::Track.as_str())
        .bind(db_id)
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(count, 1);

        // second mapping: index rewritten to exactly two rows
        track.add_provider_mapping(ProviderMapping::new("qobuz--1", "qobuz", "xyz"));
        repo.update(db_id, &track).await.unwrap();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM provider_mappings WHERE media_type = ? AND item_id = ?",
        )
        .bind(MediaType::Track.as_str())
        .bind(db_id)
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_external_id_lookups() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo: MediaItemRepository<Track> = MediaItemRepository::new(db.pool().clone());
        repo.insert(&sample_track()).await.unwrap();

        assert!(repo.by_isrc("GBAYE0601498").await.unwrap().is_some());
        assert!(repo.by_isrc("USSM10000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_by_provider_lookup() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo: MediaItemRepository<Track> = MediaItemRepository::new(db.pool().clone());
        repo.insert(&sample_track()).await.unwrap();

        let by_instance = repo
            .by_provider("spotify--1", Some(&["abc".to_string()]))
            .await
            .unwrap();
        assert_eq!(by_instance.len(), 1);
        let by_domain = repo.by_provider("spotify", None).await.unwrap();
        assert_eq!(by_domain.len(), 1);
        let other = repo.by_provider("qobuz", None).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_index_rows() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo: MediaItemRepository<Track> = MediaItemRepository::new(db.pool().clone());
        let stored = repo.insert(&sample_track()).await.unwrap();
        let db_id: i64 = stored.item_id.parse().unwrap();

        repo.delete(db_id).await.unwrap();
        assert!(repo.get(db_id).await.unwrap().is_none());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM provider_mappings")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_library_items_paging_and_filter() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo: MediaItemRepository<Artist> = MediaItemRepository::new(db.pool().clone());
        for name in ["The Beatles", "Queen", "ZZ Top"] {
            let mut artist = Artist::new(name, "spotify", name);
            artist.in_library = name != "ZZ Top";
            artist.add_provider_mapping(ProviderMapping::new("spotify--1", "spotify", name));
            repo.insert(&artist).await.unwrap();
        }

        let page = repo
            .library_items(&LibraryQuery {
                in_library: Some(true),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        // sort_name ordering: "beatles" < "queen"
        assert_eq!(page.items[0].name, "The Beatles");
    }
}
