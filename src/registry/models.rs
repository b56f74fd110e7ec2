//! Registry data models.

use serenity::model::id::{ChannelId, GuildId};

/// A voice channel whose occupancy is mirrored into a status channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedRecord {
    /// The watched voice channel.
    pub source_id: ChannelId,
    /// Guild the pair lives in.
    pub guild_id: GuildId,
    /// The read-only status channel carrying the rendered name.
    pub mirror_id: ChannelId,
    /// Display base captured at registration time, used for every rename.
    pub base_name: String,
    /// Unix timestamp of the last write.
    pub updated_at: i64,
}

/// A per-guild aggregate mirror summing occupancy across all voice channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRecord {
    pub guild_id: GuildId,
    pub mirror_id: ChannelId,
    /// Unix timestamp of the last write.
    pub updated_at: i64,
}
