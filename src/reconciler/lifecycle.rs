//! Mirror channel lifecycle: registration, unregistration, repair.
//!
//! Outer entry points (`track`, `untrack`, `toggle_mirror`) claim the
//! per-channel in-flight flag themselves; the `_locked` variants assume
//! the caller already holds it, which is how the decision engine
//! repairs a vanished mirror mid-pass without releasing its guard.

use super::{Reconciler, TrackedChannel};
use crate::error::PlatformError;
use crate::metrics;
use crate::platform::{ChannelKind, GuildView};
use crate::reconciler::name;
use crate::registry::TrackedRecord;
use serenity::model::id::{ChannelId, GuildId};
use thiserror::Error;
use tracing::{info, warn};

const CREATE_REASON: &str = "Voice occupancy mirror";
const DELETE_REASON: &str = "Voice occupancy mirror removed";
const GROUP_REASON: &str = "Category for occupancy mirrors";

/// Why a toggle request could not complete.
#[derive(Debug, Error)]
pub enum ToggleError {
    #[error("another update for this channel is in progress")]
    Busy,
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// What a toggle request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Tracked,
    Untracked,
}

impl Reconciler {
    /// Toggle tracking for a source channel: register when untracked,
    /// unregister when tracked.
    pub async fn toggle_mirror(
        &self,
        guild: GuildId,
        source: ChannelId,
    ) -> Result<ToggleOutcome, ToggleError> {
        let outcome = {
            let Some(_flag) = self.channel_flags.try_acquire(source) else {
                return Err(ToggleError::Busy);
            };
            if self.tracked.contains_key(&source) {
                self.unregister_locked(source).await;
                ToggleOutcome::Untracked
            } else {
                self.register_locked(guild, source).await?;
                ToggleOutcome::Tracked
            }
        };
        if outcome == ToggleOutcome::Tracked {
            self.refresh_mirror(source).await;
        }
        Ok(outcome)
    }

    /// Start tracking a source channel. Already tracked is Ok.
    pub async fn track(&self, guild: GuildId, source: ChannelId) -> Result<(), ToggleError> {
        {
            let Some(_flag) = self.channel_flags.try_acquire(source) else {
                return Err(ToggleError::Busy);
            };
            if self.tracked.contains_key(&source) {
                return Ok(());
            }
            self.register_locked(guild, source).await?;
        }
        self.refresh_mirror(source).await;
        Ok(())
    }

    /// Stop tracking a source channel, deleting its mirror. Idempotent.
    pub async fn untrack(&self, source: ChannelId) -> Result<(), ToggleError> {
        let Some(_flag) = self.channel_flags.try_acquire(source) else {
            return Err(ToggleError::Busy);
        };
        self.unregister_locked(source).await;
        Ok(())
    }

    /// Find the status category in this snapshot, creating it if absent.
    pub(crate) async fn ensure_group(&self, view: &GuildView) -> Result<ChannelId, PlatformError> {
        if let Some(category) = view
            .channels
            .iter()
            .find(|c| c.kind == ChannelKind::Category && self.is_status_category(&c.name))
        {
            return Ok(category.id);
        }

        let id = self
            .platform
            .create_category(view.id, &self.config.status_category, GROUP_REASON)
            .await?;
        info!(guild = %view.id, category = %id, "Created status category");
        Ok(id)
    }

    /// Create a mirror for `source` and record the assignment. The
    /// caller must hold the in-flight flag for `source`.
    pub(crate) async fn register_locked(
        &self,
        guild: GuildId,
        source: ChannelId,
    ) -> Result<(), PlatformError> {
        let view = self.platform.guild_view(guild).await?;
        let Some(source_view) = view.channel(source) else {
            return Err(PlatformError::NotFound);
        };
        if source_view.kind != ChannelKind::Voice {
            return Err(PlatformError::NotFound);
        }

        let base = name::base_name(&source_view.name);
        let count = source_view.occupancy;
        let category = self.ensure_group(&view).await?;
        let initial = name::display_name(&base, count);
        let mirror = self
            .platform
            .create_status_channel(guild, category, &initial, CREATE_REASON)
            .await?;
        metrics::record_mirror_created();

        let record = TrackedRecord {
            source_id: source,
            guild_id: guild,
            mirror_id: mirror,
            base_name: base.clone(),
            updated_at: chrono::Utc::now().timestamp(),
        };
        if let Some(db) = &self.registry
            && let Err(e) = db.tracked().put(&record).await
        {
            warn!(source = %source, error = %e, "Failed to persist assignment, keeping it in memory");
        }

        self.tracked.insert(
            source,
            TrackedChannel {
                guild_id: guild,
                mirror_id: mirror,
                base_name: base,
            },
        );
        self.zero_streaks.remove(&source);
        self.cooldowns.remove(&source);
        self.update_gauges();
        info!(source = %source, mirror = %mirror, "Tracking voice channel");
        Ok(())
    }

    /// Drop the assignment for `source`, deleting its mirror and the
    /// persisted row. The caller must hold the in-flight flag.
    /// Untracked sources are ignored.
    pub(crate) async fn unregister_locked(&self, source: ChannelId) {
        let Some((_, entry)) = self.tracked.remove(&source) else {
            return;
        };
        self.zero_streaks.remove(&source);
        self.cooldowns.remove(&source);

        match self
            .platform
            .delete_channel(entry.mirror_id, DELETE_REASON)
            .await
        {
            Ok(()) => metrics::record_mirror_deleted(),
            Err(e) => {
                // The assignment is dropped even when the delete fails.
                warn!(source = %source, mirror = %entry.mirror_id, error = %e, "Failed to delete mirror");
            }
        }

        if let Some(db) = &self.registry
            && let Err(e) = db.tracked().delete(source).await
        {
            warn!(source = %source, error = %e, "Failed to delete persisted assignment");
        }

        self.update_gauges();
        info!(source = %source, mirror = %entry.mirror_id, "Stopped tracking voice channel");
    }
}
