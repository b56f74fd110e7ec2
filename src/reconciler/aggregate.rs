//! Aggregate mirror manager.
//!
//! One mirror per guild showing the summed occupancy of all voice
//! channels outside the status category. Toggled by command. There is
//! no zero-occupancy debounce here; that is a per-channel concept.

use super::Reconciler;
use super::lifecycle::ToggleError;
use crate::error::PlatformError;
use crate::metrics;
use crate::platform::{ChannelKind, GuildView};
use crate::reconciler::name;
use crate::registry::AggregateRecord;
use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const RENAME_REASON: &str = "Server occupancy changed";
const CREATE_REASON: &str = "Server occupancy mirror";
const DELETE_REASON: &str = "Server occupancy mirror removed";

/// What an aggregate toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateToggle {
    Created,
    Removed,
}

impl Reconciler {
    /// Sum of non-bot occupancy over the guild's voice channels that
    /// are neither under the status category nor mirrors themselves.
    fn aggregate_sum(&self, view: &GuildView) -> usize {
        view.channels
            .iter()
            .filter(|c| c.kind == ChannelKind::Voice)
            .filter(|c| !self.in_status_group(view, c.id))
            .filter(|c| !self.is_mirror(c.id))
            .map(|c| c.occupancy)
            .sum()
    }

    /// Run one reconciliation pass for a guild's aggregate mirror.
    pub async fn refresh_aggregate(&self, guild: GuildId) {
        let Some(_guard) = self.guild_flags.try_acquire(guild) else {
            metrics::record_busy_drop();
            debug!(guild = %guild, "aggregate pass already in flight, dropping trigger");
            return;
        };

        let Some(mirror) = self.aggregates.get(&guild).map(|e| *e.value()) else {
            return;
        };

        let view = match self.platform.guild_view(guild).await {
            Ok(view) => view,
            Err(_) => {
                debug!(guild = %guild, "guild not available, skipping aggregate pass");
                return;
            }
        };

        if view.channel(mirror).is_none() {
            self.handle_aggregate_error(guild, mirror, PlatformError::NotFound)
                .await;
            return;
        }

        let now = Instant::now();
        if let Some(until) = self.aggregate_cooldowns.get(&guild).map(|e| *e.value())
            && now < until
        {
            debug!(guild = %guild, "aggregate cooldown active, skipping pass");
            return;
        }

        let sum = self.aggregate_sum(&view);
        let desired = name::display_name(&self.config.aggregate_label, sum);

        let current = match self.platform.fetch_channel_name(mirror).await {
            Ok(current) => current,
            Err(err) => {
                self.handle_aggregate_error(guild, mirror, err).await;
                return;
            }
        };

        if current == desired {
            metrics::record_noop();
            return;
        }

        match self
            .platform
            .rename_channel(mirror, &desired, RENAME_REASON)
            .await
        {
            Ok(()) => {
                metrics::record_rename("aggregate");
                self.aggregate_cooldowns.remove(&guild);
                info!(guild = %guild, name = %desired, "Aggregate mirror renamed");
            }
            Err(err) => {
                self.handle_aggregate_error(guild, mirror, err).await;
            }
        }
    }

    /// Apply the error taxonomy to a failed aggregate read or rename.
    /// A vanished mirror is unregistered, never recreated; the toggle
    /// command is the only thing that creates aggregate mirrors.
    async fn handle_aggregate_error(&self, guild: GuildId, mirror: ChannelId, err: PlatformError) {
        match err {
            PlatformError::NotFound => {
                info!(guild = %guild, mirror = %mirror, "Aggregate mirror gone, unregistering");
                self.remove_aggregate_locked(guild).await;
            }
            PlatformError::RateLimited { retry_after } => {
                let backoff =
                    retry_after.unwrap_or(Duration::from_secs(self.config.rate_limit_backoff_secs));
                metrics::record_rate_limit();
                self.aggregate_cooldowns
                    .insert(guild, Instant::now() + backoff);
                warn!(
                    guild = %guild,
                    backoff_secs = backoff.as_secs(),
                    "Rate limited, deferring aggregate renames"
                );
            }
            PlatformError::Forbidden => {
                warn!(guild = %guild, "missing permissions to update aggregate mirror, abandoning pass");
            }
            PlatformError::Timeout => {
                warn!(guild = %guild, "platform call timed out, abandoning aggregate pass");
            }
            PlatformError::Http(msg) => {
                warn!(guild = %guild, error = %msg, "platform error, abandoning aggregate pass");
            }
        }
    }

    /// Toggle this guild's aggregate mirror: create when absent,
    /// delete when present.
    pub async fn toggle_aggregate(&self, guild: GuildId) -> Result<AggregateToggle, ToggleError> {
        let Some(_flag) = self.guild_flags.try_acquire(guild) else {
            return Err(ToggleError::Busy);
        };

        if self.aggregates.contains_key(&guild) {
            self.remove_aggregate_locked(guild).await;
            return Ok(AggregateToggle::Removed);
        }

        let view = self.platform.guild_view(guild).await?;
        let category = self.ensure_group(&view).await?;
        let sum = self.aggregate_sum(&view);
        let initial = name::display_name(&self.config.aggregate_label, sum);
        let mirror = self
            .platform
            .create_status_channel(guild, category, &initial, CREATE_REASON)
            .await?;
        metrics::record_mirror_created();

        let record = AggregateRecord {
            guild_id: guild,
            mirror_id: mirror,
            updated_at: chrono::Utc::now().timestamp(),
        };
        if let Some(db) = &self.registry
            && let Err(e) = db.aggregates().put(&record).await
        {
            warn!(guild = %guild, error = %e, "Failed to persist aggregate mirror, keeping it in memory");
        }

        self.aggregates.insert(guild, mirror);
        self.update_gauges();
        info!(guild = %guild, mirror = %mirror, "Aggregate mirror created");
        Ok(AggregateToggle::Created)
    }

    /// Delete a guild's aggregate mirror and its persisted row. The
    /// caller must hold the guild's in-flight flag. Unregistered
    /// guilds are ignored.
    pub(crate) async fn remove_aggregate_locked(&self, guild: GuildId) {
        let Some((_, mirror)) = self.aggregates.remove(&guild) else {
            return;
        };
        self.aggregate_cooldowns.remove(&guild);

        match self.platform.delete_channel(mirror, DELETE_REASON).await {
            Ok(()) => metrics::record_mirror_deleted(),
            Err(e) => {
                warn!(guild = %guild, mirror = %mirror, error = %e, "Failed to delete aggregate mirror");
            }
        }

        if let Some(db) = &self.registry
            && let Err(e) = db.aggregates().delete(guild).await
        {
            warn!(guild = %guild, error = %e, "Failed to delete persisted aggregate mirror");
        }

        self.update_gauges();
        info!(guild = %guild, mirror = %mirror, "Aggregate mirror removed");
    }

    /// Flag-acquiring removal for callers outside a running pass.
    pub async fn remove_aggregate(&self, guild: GuildId) -> Result<(), ToggleError> {
        let Some(_flag) = self.guild_flags.try_acquire(guild) else {
            return Err(ToggleError::Busy);
        };
        self.remove_aggregate_locked(guild).await;
        Ok(())
    }

    /// Startup validation for one persisted aggregate mirror.
    pub(crate) async fn reconcile_aggregate(&self, guild: GuildId, mirror: ChannelId) {
        let view = match self.platform.guild_view(guild).await {
            Ok(view) => view,
            Err(_) => {
                info!(guild = %guild, "Guild unavailable, dropping aggregate mirror");
                let _ = self.remove_aggregate(guild).await;
                return;
            }
        };

        if view.channel(mirror).is_none() {
            info!(guild = %guild, "Aggregate mirror no longer exists, dropping");
            let _ = self.remove_aggregate(guild).await;
            return;
        }

        self.refresh_aggregate(guild).await;
    }
}
