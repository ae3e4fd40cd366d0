//! Database layer: typed row stores for canonical entities, the
//! provider-mapping index and the loudness log.
//!
//! SQLite is the embedded store; the database is the single authority for
//! the canonical view. Writers serialise via the pool, and every mapping
//! index rewrite happens inside the same transaction as its row update.

pub mod items;
pub mod loudness;
pub mod mappings;

pub use items::MediaItemRepository;
pub use loudness::LoudnessRepository;
pub use mappings::ProviderMappingRepository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::config::DatabaseConfig;
use crate::Result;

/// Entity tables; every table shares the same column layout so the generic
/// repository can serve them all.
pub const ENTITY_TABLES: &[&str] = &[
    "artists",
    "albums",
    "tracks",
    "playlists",
    "radios",
    "audiobooks",
    "podcasts",
    "episodes",
];

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (and create if needed) the database and run schema setup.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(sqlx::Error::from)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// In-memory database for tests. A single connection keeps all reads
    /// and writes on the same memory store.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        for table in ENTITY_TABLES {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    item_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    sort_name TEXT NOT NULL,
                    in_library INTEGER NOT NULL DEFAULT 0,
                    musicbrainz_id TEXT,
                    isrcs TEXT,
                    upc TEXT,
                    data TEXT NOT NULL,
                    timestamp_added INTEGER NOT NULL,
                    timestamp_modified INTEGER NOT NULL
                )"
            ))
            .execute(&self.pool)
            .await?;
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_sort_name ON {table}(sort_name)"
            ))
            .execute(&self.pool)
            .await?;
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_in_library ON {table}(in_library)"
            ))
            .execute(&self.pool)
            .await?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS provider_mappings (
                media_type TEXT NOT NULL,
                item_id INTEGER NOT NULL,
                provider_domain TEXT NOT NULL,
                provider_instance TEXT NOT NULL,
                provider_item_id TEXT NOT NULL,
                PRIMARY KEY (media_type, item_id, provider_instance, provider_item_id)
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_provider_mappings_lookup
             ON provider_mappings(media_type, provider_item_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS track_loudness (
                provider TEXT NOT NULL,
                item_id TEXT NOT NULL,
                loudness_lufs REAL NOT NULL,
                PRIMARY KEY (provider, item_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}
