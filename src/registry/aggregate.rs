//! Aggregate mirror repository for registry queries.

use super::models::AggregateRecord;
use super::{RegistryError, timed};
use serenity::model::id::{ChannelId, GuildId};
use sqlx::SqlitePool;

/// Repository for per-guild aggregate mirrors.
pub struct AggregateRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AggregateRepository<'a> {
    /// Create a new aggregate mirror repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Load every aggregate mirror, skipping corrupt rows.
    pub async fn get_all(&self) -> Result<Vec<AggregateRecord>, RegistryError> {
        let rows = timed(
            sqlx::query_as::<_, (i64, i64, i64)>(
                r#"
                SELECT guild_id, mirror_id, updated_at
                FROM aggregate_mirrors
                "#,
            )
            .fetch_all(self.pool),
        )
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for (guild_id, mirror_id, updated_at) in rows {
            if guild_id <= 0 || mirror_id <= 0 {
                tracing::warn!(guild_id, mirror_id, "Skipping corrupt registry row");
                continue;
            }
            records.push(AggregateRecord {
                guild_id: GuildId::new(guild_id as u64),
                mirror_id: ChannelId::new(mirror_id as u64),
                updated_at,
            });
        }
        Ok(records)
    }

    /// Insert or replace a guild's aggregate mirror.
    pub async fn put(&self, record: &AggregateRecord) -> Result<(), RegistryError> {
        timed(
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO aggregate_mirrors (guild_id, mirror_id, updated_at)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(record.guild_id.get() as i64)
            .bind(record.mirror_id.get() as i64)
            .bind(record.updated_at)
            .execute(self.pool),
        )
        .await?;
        Ok(())
    }

    /// Delete a guild's aggregate mirror. Returns true if a row was removed.
    pub async fn delete(&self, guild: GuildId) -> Result<bool, RegistryError> {
        let result = timed(
            sqlx::query("DELETE FROM aggregate_mirrors WHERE guild_id = ?")
                .bind(guild.get() as i64)
                .execute(self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
