//! Platform abstraction over the chat service.
//!
//! The reconciler core talks to Discord exclusively through the
//! [`Platform`] trait so tests can substitute a fake. The real adapter
//! lives in [`discord`].

pub mod discord;

use crate::error::PlatformError;
use serenity::model::id::{ChannelId, GuildId};

/// Channel classification as far as the reconciler cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Voice,
    Category,
    /// Text channels, threads, forums and anything else we never mirror.
    Other,
}

/// Point-in-time snapshot of a single channel.
#[derive(Debug, Clone)]
pub struct ChannelView {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<ChannelId>,
    /// Number of non-bot members connected. Zero for non-voice channels.
    pub occupancy: usize,
}

/// Point-in-time snapshot of a guild's channel list and voice occupancy.
///
/// Taken synchronously from the gateway cache, so a single view is
/// internally consistent even while events keep arriving.
#[derive(Debug, Clone)]
pub struct GuildView {
    pub id: GuildId,
    pub channels: Vec<ChannelView>,
}

impl GuildView {
    /// Look up a channel in this snapshot by id.
    pub fn channel(&self, id: ChannelId) -> Option<&ChannelView> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Name of the category a channel sits under, if any.
    pub fn category_name(&self, channel: ChannelId) -> Option<&str> {
        let parent = self.channel(channel)?.parent_id?;
        let cat = self.channel(parent)?;
        if cat.kind == ChannelKind::Category {
            Some(&cat.name)
        } else {
            None
        }
    }
}

/// Operations the reconciler needs from the chat platform.
///
/// Read operations return snapshots; write operations are expected to be
/// time-boxed by the implementation so a stalled HTTP call cannot wedge a
/// reconcile pass. `delete_channel` treats an already-gone channel as
/// success, every other operation surfaces [`PlatformError::NotFound`].
#[async_trait::async_trait]
pub trait Platform: Send + Sync {
    /// Snapshot a guild's channels and voice occupancy from the cache.
    async fn guild_view(&self, guild: GuildId) -> Result<GuildView, PlatformError>;

    /// Fetch a channel's current name from the API, bypassing the cache.
    async fn fetch_channel_name(&self, channel: ChannelId) -> Result<String, PlatformError>;

    /// Rename a channel.
    async fn rename_channel(
        &self,
        channel: ChannelId,
        name: &str,
        reason: &str,
    ) -> Result<(), PlatformError>;

    /// Create the read-only status category in a guild.
    async fn create_category(
        &self,
        guild: GuildId,
        name: &str,
        reason: &str,
    ) -> Result<ChannelId, PlatformError>;

    /// Create a locked voice channel under `parent` to act as a mirror.
    async fn create_status_channel(
        &self,
        guild: GuildId,
        parent: ChannelId,
        name: &str,
        reason: &str,
    ) -> Result<ChannelId, PlatformError>;

    /// Delete a channel. Deleting a channel that no longer exists is Ok.
    async fn delete_channel(&self, channel: ChannelId, reason: &str) -> Result<(), PlatformError>;
}
