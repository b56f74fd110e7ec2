//! Name update decision engine.
//!
//! One pass per trigger: read occupancy, decide whether the mirror
//! needs a rename right now, commit at most one write. A pass runs
//! under the per-channel in-flight flag; a trigger that finds the flag
//! set drops itself instead of queueing.

use super::{Reconciler, TrackedChannel, ZeroStreak};
use crate::error::PlatformError;
use crate::metrics;
use crate::platform::ChannelKind;
use crate::reconciler::name;
use serenity::model::id::ChannelId;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Audit log reason attached to occupancy renames.
const RENAME_REASON: &str = "Voice occupancy changed";

impl Reconciler {
    /// Run one reconciliation pass for a tracked source channel.
    ///
    /// Safe to call from any trigger at any time: overlapping passes
    /// for the same source are dropped, not queued, and the flag is
    /// released on every exit path.
    pub async fn refresh_mirror(&self, source: ChannelId) {
        let Some(_guard) = self.channel_flags.try_acquire(source) else {
            metrics::record_busy_drop();
            debug!(source = %source, "pass already in flight, dropping trigger");
            return;
        };

        let Some(entry) = self.tracked.get(&source).map(|e| e.value().clone()) else {
            return;
        };

        let view = match self.platform.guild_view(entry.guild_id).await {
            Ok(view) => view,
            Err(_) => {
                debug!(source = %source, "guild not available, skipping pass");
                return;
            }
        };
        let Some(source_view) = view.channel(source) else {
            // Source missing from the snapshot; the sweep decides
            // whether to unregister.
            debug!(source = %source, "source channel not in snapshot, skipping pass");
            return;
        };
        let count = source_view.occupancy;

        let now = Instant::now();
        if count == 0 {
            let window = Duration::from_secs(self.config.zero_debounce_secs);
            // Scoped so the map guard drops before the next await.
            let announce = {
                let streak = self.zero_streaks.entry(source).or_insert(ZeroStreak {
                    since: now,
                    announced: false,
                });
                !streak.announced && now.duration_since(streak.since) >= window
            };
            if !announce {
                return;
            }
        } else {
            self.zero_streaks.remove(&source);
        }

        if let Some(until) = self.cooldowns.get(&source).map(|e| *e.value())
            && now < until
        {
            debug!(source = %source, "rename cooldown active, skipping pass");
            return;
        }

        let desired = name::display_name(&entry.base_name, count);

        // Authoritative read; the cache can lag behind our own renames.
        let current = match self.platform.fetch_channel_name(entry.mirror_id).await {
            Ok(current) => current,
            Err(err) => {
                self.handle_mirror_error(source, &entry, err).await;
                return;
            }
        };

        if current == desired {
            metrics::record_noop();
            if count == 0 {
                self.mark_zero_announced(source);
            }
            return;
        }

        match self
            .platform
            .rename_channel(entry.mirror_id, &desired, RENAME_REASON)
            .await
        {
            Ok(()) => {
                metrics::record_rename("channel");
                self.cooldowns.remove(&source);
                if count == 0 {
                    self.mark_zero_announced(source);
                }
                info!(source = %source, name = %desired, "Mirror renamed");
            }
            Err(err) => {
                self.handle_mirror_error(source, &entry, err).await;
            }
        }
    }

    /// Mark the current zero streak as announced so the forced update
    /// fires once per streak.
    fn mark_zero_announced(&self, source: ChannelId) {
        if let Some(mut streak) = self.zero_streaks.get_mut(&source) {
            streak.announced = true;
        }
    }

    /// Apply the error taxonomy to a failed mirror read or rename.
    /// Runs while the caller still holds the in-flight guard, so repair
    /// goes through the locked lifecycle paths.
    async fn handle_mirror_error(
        &self,
        source: ChannelId,
        entry: &TrackedChannel,
        err: PlatformError,
    ) {
        match err {
            PlatformError::Forbidden => {
                warn!(source = %source, "missing permissions to update mirror, abandoning pass");
            }
            PlatformError::NotFound => {
                let source_alive = match self.platform.guild_view(entry.guild_id).await {
                    Ok(view) => view
                        .channel(source)
                        .is_some_and(|c| c.kind == ChannelKind::Voice),
                    Err(_) => false,
                };
                self.unregister_locked(source).await;
                if source_alive {
                    info!(source = %source, "Mirror vanished, recreating");
                    if let Err(e) = self.register_locked(entry.guild_id, source).await {
                        warn!(source = %source, error = %e, "Failed to recreate mirror");
                    }
                } else {
                    info!(source = %source, "Mirror and source both gone, untracked");
                }
            }
            PlatformError::RateLimited { retry_after } => {
                let backoff =
                    retry_after.unwrap_or(Duration::from_secs(self.config.rate_limit_backoff_secs));
                metrics::record_rate_limit();
                self.cooldowns.insert(source, Instant::now() + backoff);
                warn!(
                    source = %source,
                    backoff_secs = backoff.as_secs(),
                    "Rate limited, deferring renames"
                );
            }
            PlatformError::Timeout => {
                warn!(source = %source, "Platform call timed out, abandoning pass");
            }
            PlatformError::Http(msg) => {
                warn!(source = %source, error = %msg, "Platform error, abandoning pass");
            }
        }
    }
}
