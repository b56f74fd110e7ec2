//! Discord implementation of [`Platform`] backed by serenity.
//!
//! Reads come from the gateway cache, writes go through the REST API.
//! Every REST call is time-boxed so a stalled request cannot wedge the
//! reconciler, and serenity errors are collapsed into [`PlatformError`].

use super::{ChannelKind, ChannelView, GuildView, Platform};
use crate::error::PlatformError;
use crate::metrics;
use serenity::all::{
    Cache, ChannelId, ChannelType, CreateChannel, EditChannel, Guild, GuildId, Http,
    PermissionOverwrite, PermissionOverwriteType, Permissions, RoleId,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for a single REST call.
const API_TIMEOUT: Duration = Duration::from_secs(20);

/// The live Discord adapter. Cheap to clone the inner handles around.
pub struct DiscordPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }
}

/// Overwrite set that makes a channel visible but unjoinable for @everyone.
/// The @everyone role id always equals the guild id.
fn locked_overwrites(guild: GuildId) -> Vec<PermissionOverwrite> {
    vec![PermissionOverwrite {
        allow: Permissions::VIEW_CHANNEL | Permissions::READ_MESSAGE_HISTORY,
        deny: Permissions::CONNECT
            | Permissions::SPEAK
            | Permissions::STREAM
            | Permissions::SEND_MESSAGES,
        kind: PermissionOverwriteType::Role(RoleId::new(guild.get())),
    }]
}

fn snapshot_guild(guild: &Guild) -> GuildView {
    let mut occupancy: HashMap<ChannelId, usize> = HashMap::new();
    for (user_id, vs) in &guild.voice_states {
        let Some(channel_id) = vs.channel_id else {
            continue;
        };
        // Voice states do not always carry the member; fall back to the
        // member cache, and count unknown users as humans.
        let bot = vs
            .member
            .as_ref()
            .map(|m| m.user.bot)
            .or_else(|| guild.members.get(user_id).map(|m| m.user.bot))
            .unwrap_or(false);
        if !bot {
            *occupancy.entry(channel_id).or_default() += 1;
        }
    }

    let channels = guild
        .channels
        .values()
        .map(|ch| ChannelView {
            id: ch.id,
            name: ch.name.clone(),
            kind: match ch.kind {
                ChannelType::Voice => ChannelKind::Voice,
                ChannelType::Category => ChannelKind::Category,
                _ => ChannelKind::Other,
            },
            parent_id: ch.parent_id,
            occupancy: occupancy.get(&ch.id).copied().unwrap_or(0),
        })
        .collect();

    GuildView {
        id: guild.id,
        channels,
    }
}

fn map_api_error(op: &'static str, err: serenity::Error) -> PlatformError {
    use serenity::http::HttpError;
    let mapped = match &err {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) => {
            match resp.status_code.as_u16() {
                403 => PlatformError::Forbidden,
                404 => PlatformError::NotFound,
                // Serenity queues retries internally and does not expose the
                // retry_after it saw, so the caller falls back to its default.
                429 => PlatformError::RateLimited { retry_after: None },
                _ => PlatformError::Http(format!("{op}: {err}")),
            }
        }
        _ => PlatformError::Http(format!("{op}: {err}")),
    };
    metrics::record_platform_error(op, mapped.error_code());
    mapped
}

async fn timed<T>(
    op: &'static str,
    fut: impl Future<Output = serenity::Result<T>>,
) -> Result<T, PlatformError> {
    match tokio::time::timeout(API_TIMEOUT, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(map_api_error(op, err)),
        Err(_) => {
            metrics::record_platform_error(op, "timeout");
            Err(PlatformError::Timeout)
        }
    }
}

#[async_trait::async_trait]
impl Platform for DiscordPlatform {
    async fn guild_view(&self, guild: GuildId) -> Result<GuildView, PlatformError> {
        // The cache ref is not Send; snapshot synchronously and drop it
        // before anything can await.
        self.cache
            .guild(guild)
            .map(|g| snapshot_guild(&g))
            .ok_or(PlatformError::NotFound)
    }

    async fn fetch_channel_name(&self, channel: ChannelId) -> Result<String, PlatformError> {
        let fetched = timed("get_channel", self.http.get_channel(channel)).await?;
        match fetched.guild() {
            Some(guild_channel) => Ok(guild_channel.name),
            None => Err(PlatformError::NotFound),
        }
    }

    async fn rename_channel(
        &self,
        channel: ChannelId,
        name: &str,
        reason: &str,
    ) -> Result<(), PlatformError> {
        let builder = EditChannel::new().name(name).audit_log_reason(reason);
        timed("edit_channel", channel.edit(&self.http, builder)).await?;
        Ok(())
    }

    async fn create_category(
        &self,
        guild: GuildId,
        name: &str,
        reason: &str,
    ) -> Result<ChannelId, PlatformError> {
        let builder = CreateChannel::new(name)
            .kind(ChannelType::Category)
            .permissions(locked_overwrites(guild))
            .audit_log_reason(reason);
        let created = timed("create_channel", guild.create_channel(&self.http, builder)).await?;
        Ok(created.id)
    }

    async fn create_status_channel(
        &self,
        guild: GuildId,
        parent: ChannelId,
        name: &str,
        reason: &str,
    ) -> Result<ChannelId, PlatformError> {
        let builder = CreateChannel::new(name)
            .kind(ChannelType::Voice)
            .category(parent)
            .permissions(locked_overwrites(guild))
            .audit_log_reason(reason);
        let created = timed("create_channel", guild.create_channel(&self.http, builder)).await?;
        Ok(created.id)
    }

    async fn delete_channel(&self, channel: ChannelId, reason: &str) -> Result<(), PlatformError> {
        match timed(
            "delete_channel",
            self.http.delete_channel(channel, Some(reason)),
        )
        .await
        {
            Ok(_) => Ok(()),
            // Already gone is what we wanted anyway.
            Err(PlatformError::NotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
