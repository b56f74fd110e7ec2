//! Tracked channel repository for registry queries.

use super::models::TrackedRecord;
use super::{RegistryError, timed};
use serenity::model::id::{ChannelId, GuildId};
use sqlx::SqlitePool;

/// Repository for tracked channel assignments.
pub struct TrackedRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TrackedRepository<'a> {
    /// Create a new tracked channel repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Load every tracked assignment. Rows with non-positive ids are
    /// skipped; snowflakes are always positive and a zero id would
    /// poison the in-memory state.
    pub async fn get_all(&self) -> Result<Vec<TrackedRecord>, RegistryError> {
        let rows = timed(
            sqlx::query_as::<_, (i64, i64, i64, String, i64)>(
                r#"
                SELECT source_id, guild_id, mirror_id, base_name, updated_at
                FROM tracked_channels
                "#,
            )
            .fetch_all(self.pool),
        )
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for (source_id, guild_id, mirror_id, base_name, updated_at) in rows {
            if source_id <= 0 || guild_id <= 0 || mirror_id <= 0 {
                tracing::warn!(source_id, guild_id, mirror_id, "Skipping corrupt registry row");
                continue;
            }
            records.push(TrackedRecord {
                source_id: ChannelId::new(source_id as u64),
                guild_id: GuildId::new(guild_id as u64),
                mirror_id: ChannelId::new(mirror_id as u64),
                base_name,
                updated_at,
            });
        }
        Ok(records)
    }

    /// Insert or replace an assignment, keyed by the source channel.
    pub async fn put(&self, record: &TrackedRecord) -> Result<(), RegistryError> {
        timed(
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO tracked_channels
                    (source_id, guild_id, mirror_id, base_name, updated_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.source_id.get() as i64)
            .bind(record.guild_id.get() as i64)
            .bind(record.mirror_id.get() as i64)
            .bind(&record.base_name)
            .bind(record.updated_at)
            .execute(self.pool),
        )
        .await?;
        Ok(())
    }

    /// Delete an assignment. Returns true if a row was removed.
    pub async fn delete(&self, source: ChannelId) -> Result<bool, RegistryError> {
        let result = timed(
            sqlx::query("DELETE FROM tracked_channels WHERE source_id = ?")
                .bind(source.get() as i64)
                .execute(self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
