//! Integration test common infrastructure.
//!
//! Provides an in-memory platform fake and reconciler constructors so
//! tests can drive full reconciliation flows without Discord.

pub mod fake;

#[allow(unused_imports)]
pub use fake::{Call, FakePlatform};

use mirrorcat::config::MirrorConfig;
use mirrorcat::reconciler::Reconciler;
use mirrorcat::registry::Database;
use std::sync::Arc;

/// Reconciler over a fake platform, no persistence.
#[allow(dead_code)]
pub fn state(platform: Arc<FakePlatform>) -> Arc<Reconciler> {
    Arc::new(Reconciler::new(platform, None, MirrorConfig::default()))
}

/// Reconciler over a fake platform, backed by a registry database.
#[allow(dead_code)]
pub fn state_with_registry(platform: Arc<FakePlatform>, db: Database) -> Arc<Reconciler> {
    Arc::new(Reconciler::new(platform, Some(db), MirrorConfig::default()))
}
