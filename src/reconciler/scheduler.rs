//! Event-driven scheduling.
//!
//! Maps platform events onto reconciliation passes: voice-state
//! changes, channel create/delete, the startup reconciliation that
//! runs on every gateway ready, and the periodic consistency sweep.

use super::{Reconciler, TrackedChannel};
use crate::platform::ChannelKind;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl Reconciler {
    /// React to a voice-state change: refresh each affected tracked
    /// channel, then the guild's aggregate if one exists.
    pub async fn on_voice_event(
        &self,
        guild: GuildId,
        before: Option<ChannelId>,
        after: Option<ChannelId>,
    ) {
        let mut refreshed = None;
        for channel in [before, after].into_iter().flatten() {
            if refreshed == Some(channel) {
                continue;
            }
            refreshed = Some(channel);
            if self.tracked.contains_key(&channel) {
                self.refresh_mirror(channel).await;
            }
        }

        if self.aggregates.contains_key(&guild) {
            self.refresh_aggregate(guild).await;
        }
    }

    /// React to channel creation: auto-track new voice channels that
    /// are not mirrors and not under the status category.
    pub async fn on_channel_created(&self, guild: GuildId, channel: ChannelId) {
        let Ok(view) = self.platform.guild_view(guild).await else {
            return;
        };
        let Some(created) = view.channel(channel) else {
            return;
        };
        if created.kind != ChannelKind::Voice {
            return;
        }
        if self.in_status_group(&view, channel)
            || self.tracked.contains_key(&channel)
            || self.is_mirror(channel)
        {
            return;
        }

        info!(channel = %channel, name = %created.name, "New voice channel, auto-tracking");
        if let Err(e) = self.track(guild, channel).await {
            warn!(channel = %channel, error = %e, "Auto-tracking failed");
        }

        if self.aggregates.contains_key(&guild) {
            self.refresh_aggregate(guild).await;
        }
    }

    /// React to channel deletion: unregister deleted sources, recreate
    /// externally deleted mirrors, refresh the aggregate sum.
    pub async fn on_channel_deleted(&self, guild: GuildId, channel: ChannelId) {
        if self.tracked.contains_key(&channel) {
            info!(channel = %channel, "Tracked channel deleted, removing its mirror");
            if let Err(e) = self.untrack(channel).await {
                debug!(channel = %channel, error = %e, "Cleanup deferred to the sweep");
            }
        } else if let Some(source) = self.source_of_mirror(channel) {
            let source_alive = match self.platform.guild_view(guild).await {
                Ok(view) => view
                    .channel(source)
                    .is_some_and(|c| c.kind == ChannelKind::Voice),
                Err(_) => false,
            };
            if source_alive {
                info!(mirror = %channel, source = %source, "Mirror deleted externally, recreating");
                if self.untrack(source).await.is_ok()
                    && let Err(e) = self.track(guild, source).await
                {
                    warn!(source = %source, error = %e, "Failed to recreate mirror");
                }
            } else if let Err(e) = self.untrack(source).await {
                debug!(source = %source, error = %e, "Cleanup deferred to the sweep");
            }
        }

        if self.aggregates.contains_key(&guild) {
            self.refresh_aggregate(guild).await;
        }
    }

    /// Validate and repair every persisted assignment, then every
    /// aggregate mirror. Runs on every gateway ready, so it must be
    /// idempotent on an already-consistent set.
    pub async fn startup_reconcile(&self) {
        self.cooldowns.clear();
        self.aggregate_cooldowns.clear();
        self.load_assignments().await;

        let assignments: Vec<(ChannelId, TrackedChannel)> = self
            .tracked
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        for (source, entry) in assignments {
            // Debounce timers do not survive a restart or reconnect.
            self.zero_streaks.remove(&source);
            self.reconcile_assignment(source, entry).await;
        }

        let aggregates: Vec<(GuildId, ChannelId)> = self
            .aggregates
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect();
        for (guild, mirror) in aggregates {
            self.reconcile_aggregate(guild, mirror).await;
        }

        info!(
            tracked = self.tracked.len(),
            aggregates = self.aggregates.len(),
            "Reconciliation complete"
        );
    }

    /// Validate one assignment and repair or drop it: gone guild or
    /// source drops the assignment, a missing or misplaced mirror is
    /// recreated, a consistent one gets a normal refresh pass. Shared
    /// by startup reconciliation and the periodic sweep.
    async fn reconcile_assignment(&self, source: ChannelId, entry: TrackedChannel) {
        let view = match self.platform.guild_view(entry.guild_id).await {
            Ok(view) => view,
            Err(_) => {
                info!(source = %source, "Guild unavailable, dropping assignment");
                let _ = self.untrack(source).await;
                return;
            }
        };

        let source_alive = view
            .channel(source)
            .is_some_and(|c| c.kind == ChannelKind::Voice);
        if !source_alive {
            info!(source = %source, "Tracked channel no longer exists, dropping assignment");
            let _ = self.untrack(source).await;
            return;
        }

        let mirror_grouped = view.channel(entry.mirror_id).is_some()
            && self.in_status_group(&view, entry.mirror_id);
        if !mirror_grouped {
            info!(source = %source, "Mirror missing or misplaced, recreating");
            if self.untrack(source).await.is_ok()
                && let Err(e) = self.track(entry.guild_id, source).await
            {
                warn!(source = %source, error = %e, "Failed to recreate mirror");
            }
            return;
        }

        self.refresh_mirror(source).await;
    }

    /// Periodic consistency sweep over every assignment and aggregate.
    /// Unlike startup, running zero-occupancy streaks are kept, so a
    /// sweep landing mid-debounce does not restart the window.
    pub async fn sweep(&self) {
        let assignments: Vec<(ChannelId, TrackedChannel)> = self
            .tracked
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        for (source, entry) in assignments {
            self.reconcile_assignment(source, entry).await;
        }

        let aggregates: Vec<GuildId> = self.aggregates.iter().map(|e| *e.key()).collect();
        for guild in aggregates {
            if self.platform.guild_view(guild).await.is_err() {
                info!(guild = %guild, "Guild unavailable, dropping aggregate mirror");
                let _ = self.remove_aggregate(guild).await;
                continue;
            }
            self.refresh_aggregate(guild).await;
        }
    }

    /// Start the periodic sweep and the keep-alive heartbeat. Called
    /// once, after the first gateway ready.
    pub fn spawn_background_tasks(self: &Arc<Self>) {
        // Periodic consistency sweep
        {
            let state = Arc::clone(self);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
                    state.config.sweep_interval_secs,
                ));
                loop {
                    interval.tick().await;
                    state.sweep().await;
                }
            });
        }

        // Keep-alive heartbeat; some hosting platforms watch the log
        // stream for signs of life.
        {
            let state = Arc::clone(self);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
                loop {
                    interval.tick().await;
                    info!(
                        tracked = state.tracked.len(),
                        aggregates = state.aggregates.len(),
                        "Heartbeat"
                    );
                }
            });
        }
    }
}
