//! mirrorcat - voice occupancy mirror bot for Discord.
//!
//! Watches tracked voice channels and mirrors their member counts into
//! read-only status channel names. The reconciliation core decides, per
//! channel, whether a rename is due right now, subject to platform rate
//! limits, a zero-occupancy debounce, and crash/restart recovery.

pub mod bot;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod platform;
pub mod reconciler;
pub mod registry;
