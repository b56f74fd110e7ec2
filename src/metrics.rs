//! Prometheus metrics collection for mirrorcat.
//!
//! Tracks rename traffic, skipped passes, rate-limit pressure, and the
//! current tracked-channel population, exposed on the HTTP endpoint for
//! Prometheus scraping.

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Renames actually committed, by mirror kind (channel or aggregate).
pub static RENAMES_COMMITTED: OnceLock<IntCounterVec> = OnceLock::new();

/// Passes that found the mirror name already correct and wrote nothing.
pub static RENAMES_SKIPPED_NOOP: OnceLock<IntCounter> = OnceLock::new();

/// Passes dropped because the key was already in flight.
pub static PASSES_DROPPED_BUSY: OnceLock<IntCounter> = OnceLock::new();

/// Rate-limit responses from the platform.
pub static RATE_LIMIT_HITS: OnceLock<IntCounter> = OnceLock::new();

/// Mirror channels created (registration, repair, recreation).
pub static MIRRORS_CREATED: OnceLock<IntCounter> = OnceLock::new();

/// Mirror channels deleted (unregistration, repair).
pub static MIRRORS_DELETED: OnceLock<IntCounter> = OnceLock::new();

/// Platform call failures by operation and error kind.
pub static PLATFORM_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Text commands processed by name.
pub static COMMAND_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Currently tracked source channels.
pub static TRACKED_CHANNELS: OnceLock<IntGauge> = OnceLock::new();

/// Currently registered aggregate mirrors.
pub static AGGREGATE_MIRRORS: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(RENAMES_COMMITTED, IntCounterVec::new(Opts::new("mirrorcat_renames_committed_total", "Mirror renames committed"), &["kind"]));
    register!(RENAMES_SKIPPED_NOOP, IntCounter::new("mirrorcat_renames_skipped_noop_total", "Passes skipped because the name was already correct"));
    register!(PASSES_DROPPED_BUSY, IntCounter::new("mirrorcat_passes_dropped_busy_total", "Passes dropped because the key was in flight"));
    register!(RATE_LIMIT_HITS, IntCounter::new("mirrorcat_rate_limit_hits_total", "Rate-limit responses from the platform"));
    register!(MIRRORS_CREATED, IntCounter::new("mirrorcat_mirrors_created_total", "Mirror channels created"));
    register!(MIRRORS_DELETED, IntCounter::new("mirrorcat_mirrors_deleted_total", "Mirror channels deleted"));
    register!(PLATFORM_ERRORS, IntCounterVec::new(Opts::new("mirrorcat_platform_errors_total", "Platform call failures"), &["op", "error"]));
    register!(COMMAND_COUNTER, IntCounterVec::new(Opts::new("mirrorcat_commands_total", "Text commands processed"), &["command"]));
    register!(TRACKED_CHANNELS, IntGauge::new("mirrorcat_tracked_channels", "Currently tracked source channels"));
    register!(AGGREGATE_MIRRORS, IntGauge::new("mirrorcat_aggregate_mirrors", "Currently registered aggregate mirrors"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for metric updates
// ============================================================================

/// Record a committed rename. `kind` is "channel" or "aggregate".
#[inline]
pub fn record_rename(kind: &str) {
    if let Some(c) = RENAMES_COMMITTED.get() {
        c.with_label_values(&[kind]).inc();
    }
}

/// Record a pass that wrote nothing because the name already matched.
#[inline]
pub fn record_noop() {
    if let Some(c) = RENAMES_SKIPPED_NOOP.get() {
        c.inc();
    }
}

/// Record a trigger dropped because the key was already in flight.
#[inline]
pub fn record_busy_drop() {
    if let Some(c) = PASSES_DROPPED_BUSY.get() {
        c.inc();
    }
}

/// Record a rate-limit response.
#[inline]
pub fn record_rate_limit() {
    if let Some(c) = RATE_LIMIT_HITS.get() {
        c.inc();
    }
}

/// Record a mirror channel creation.
#[inline]
pub fn record_mirror_created() {
    if let Some(c) = MIRRORS_CREATED.get() {
        c.inc();
    }
}

/// Record a mirror channel deletion.
#[inline]
pub fn record_mirror_deleted() {
    if let Some(c) = MIRRORS_DELETED.get() {
        c.inc();
    }
}

/// Record a platform call failure.
#[inline]
pub fn record_platform_error(op: &str, error: &str) {
    if let Some(c) = PLATFORM_ERRORS.get() {
        c.with_label_values(&[op, error]).inc();
    }
}

/// Record a processed text command.
#[inline]
pub fn record_command(command: &str) {
    if let Some(c) = COMMAND_COUNTER.get() {
        c.with_label_values(&[command]).inc();
    }
}

/// Update the tracked-channel population gauge.
#[inline]
pub fn set_tracked_channels(count: i64) {
    if let Some(g) = TRACKED_CHANNELS.get() {
        g.set(count);
    }
}

/// Update the aggregate-mirror population gauge.
#[inline]
pub fn set_aggregate_mirrors(count: i64) {
    if let Some(g) = AGGREGATE_MIRRORS.get() {
        g.set(count);
    }
}
