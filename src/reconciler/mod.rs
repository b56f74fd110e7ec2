//! The reconciliation core.
//!
//! One [`Reconciler`] owns every piece of mutable tracking state plus
//! the platform and registry handles, and is shared as `Arc` into the
//! event handlers and background tasks. Nothing in here talks to
//! serenity directly; all platform I/O goes through the
//! [`Platform`](crate::platform::Platform) trait.

pub mod aggregate;
pub mod engine;
pub mod inflight;
pub mod lifecycle;
pub mod name;
pub mod scheduler;

pub use aggregate::AggregateToggle;
pub use lifecycle::{ToggleError, ToggleOutcome};

use self::inflight::InFlight;
use crate::config::MirrorConfig;
use crate::metrics;
use crate::platform::{GuildView, Platform};
use crate::registry::Database;
use dashmap::DashMap;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Type alias for governor's direct rate limiter.
type DirectRateLimiter = governor::DefaultDirectRateLimiter;

/// In-memory record of one source-to-mirror assignment.
#[derive(Debug, Clone)]
pub struct TrackedChannel {
    pub guild_id: GuildId,
    pub mirror_id: ChannelId,
    /// Display base captured at registration, used for every rename.
    pub base_name: String,
}

/// Zero-occupancy bookkeeping for one tracked channel. Exists only
/// while the observed count is zero.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ZeroStreak {
    pub(crate) since: Instant,
    pub(crate) announced: bool,
}

/// The reconciler context object.
pub struct Reconciler {
    pub(crate) platform: Arc<dyn Platform>,
    pub(crate) registry: Option<Database>,
    pub(crate) config: MirrorConfig,

    /// Source channel -> assignment.
    pub(crate) tracked: DashMap<ChannelId, TrackedChannel>,
    /// Guild -> aggregate mirror channel.
    pub(crate) aggregates: DashMap<GuildId, ChannelId>,
    /// Source channel -> current zero-occupancy streak.
    pub(crate) zero_streaks: DashMap<ChannelId, ZeroStreak>,
    /// Source channel -> no rename attempts before this instant.
    pub(crate) cooldowns: DashMap<ChannelId, Instant>,
    /// Guild -> no aggregate rename attempts before this instant.
    pub(crate) aggregate_cooldowns: DashMap<GuildId, Instant>,
    /// Per-source in-flight markers.
    pub(crate) channel_flags: InFlight<ChannelId>,
    /// Per-guild in-flight markers for aggregate passes.
    pub(crate) guild_flags: InFlight<GuildId>,
    /// Per-guild limiters absorbing accidental toggle double-invocations.
    toggle_limiters: DashMap<GuildId, DirectRateLimiter>,
}

impl Reconciler {
    pub fn new(
        platform: Arc<dyn Platform>,
        registry: Option<Database>,
        config: MirrorConfig,
    ) -> Self {
        Self {
            platform,
            registry,
            config,
            tracked: DashMap::new(),
            aggregates: DashMap::new(),
            zero_streaks: DashMap::new(),
            cooldowns: DashMap::new(),
            aggregate_cooldowns: DashMap::new(),
            channel_flags: InFlight::new(),
            guild_flags: InFlight::new(),
            toggle_limiters: DashMap::new(),
        }
    }

    /// Rebuild the in-memory maps from the registry. Runs on every
    /// gateway ready; without a registry this is a no-op.
    pub async fn load_assignments(&self) {
        let Some(db) = &self.registry else {
            return;
        };

        match db.tracked().get_all().await {
            Ok(records) => {
                self.tracked.clear();
                for record in records {
                    self.tracked.insert(
                        record.source_id,
                        TrackedChannel {
                            guild_id: record.guild_id,
                            mirror_id: record.mirror_id,
                            base_name: record.base_name,
                        },
                    );
                }
                info!(count = self.tracked.len(), "Loaded tracked channels from registry");
            }
            Err(e) => {
                warn!(error = %e, "Failed to load tracked channels, continuing with in-memory state");
            }
        }

        match db.aggregates().get_all().await {
            Ok(records) => {
                self.aggregates.clear();
                for record in records {
                    self.aggregates.insert(record.guild_id, record.mirror_id);
                }
                info!(count = self.aggregates.len(), "Loaded aggregate mirrors from registry");
            }
            Err(e) => {
                warn!(error = %e, "Failed to load aggregate mirrors, continuing with in-memory state");
            }
        }

        self.update_gauges();
    }

    /// Single predicate deciding whether a category name marks the
    /// status group. Case-insensitive substring match.
    pub(crate) fn is_status_category(&self, name: &str) -> bool {
        name.to_lowercase()
            .contains(&self.config.status_category.to_lowercase())
    }

    /// Whether a channel sits under the status category in this snapshot.
    pub(crate) fn in_status_group(&self, view: &GuildView, channel: ChannelId) -> bool {
        view.category_name(channel)
            .is_some_and(|name| self.is_status_category(name))
    }

    /// Whether `channel` is a tracked source.
    pub fn is_tracked(&self, channel: ChannelId) -> bool {
        self.tracked.contains_key(&channel)
    }

    /// Mirror assigned to a tracked source, if any.
    pub fn mirror_of(&self, source: ChannelId) -> Option<ChannelId> {
        self.tracked.get(&source).map(|e| e.value().mirror_id)
    }

    /// Reverse lookup: the tracked source whose mirror is `channel`.
    pub(crate) fn source_of_mirror(&self, channel: ChannelId) -> Option<ChannelId> {
        self.tracked
            .iter()
            .find(|e| e.value().mirror_id == channel)
            .map(|e| *e.key())
    }

    /// Whether `channel` is any mirror we manage, status or aggregate.
    pub(crate) fn is_mirror(&self, channel: ChannelId) -> bool {
        self.source_of_mirror(channel).is_some()
            || self.aggregates.iter().any(|e| *e.value() == channel)
    }

    /// This guild's aggregate mirror, if one is registered.
    pub fn aggregate_mirror(&self, guild: GuildId) -> Option<ChannelId> {
        self.aggregates.get(&guild).map(|e| *e.value())
    }

    /// Number of currently tracked source channels.
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Command-level cooldown for toggles, roughly one invocation per
    /// five seconds per guild. Returns `true` if the toggle may run.
    pub fn toggle_allowed(&self, guild: GuildId) -> bool {
        let limiter = self.toggle_limiters.entry(guild).or_insert_with(|| {
            RateLimiter::direct(Quota::per_minute(nonzero!(12u32)).allow_burst(nonzero!(1u32)))
        });

        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(guild = %guild, "toggle cooldown active");
        }
        allowed
    }

    pub(crate) fn update_gauges(&self) {
        metrics::set_tracked_channels(self.tracked.len() as i64);
        metrics::set_aggregate_mirrors(self.aggregates.len() as i64);
    }
}
