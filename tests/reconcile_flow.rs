//! Integration tests for the per-channel reconciliation engine:
//! rename decisions, the zero-occupancy debounce, rate-limit backoff
//! and overlap handling.

mod common;

use common::FakePlatform;
use mirrorcat::error::PlatformError;
use mirrorcat::reconciler::Reconciler;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use std::time::Duration;

fn guild() -> GuildId {
    GuildId::new(1)
}

/// One guild with a status category and one tracked voice channel.
async fn tracked_setup(
    occupancy: usize,
) -> (Arc<FakePlatform>, Arc<Reconciler>, ChannelId, ChannelId) {
    let fake = FakePlatform::new();
    fake.add_guild(guild());
    fake.add_category(guild(), 10, "STATUS");
    let source = fake.add_voice(guild(), 20, "General", None, occupancy);
    let state = common::state(Arc::clone(&fake));
    state.track(guild(), source).await.expect("track failed");
    let mirror = state.mirror_of(source).expect("mirror assigned");
    fake.clear_calls();
    (fake, state, source, mirror)
}

#[tokio::test]
async fn test_occupancy_change_renames_mirror() {
    let (fake, state, source, mirror) = tracked_setup(2).await;

    fake.set_occupancy(guild(), source, 3);
    state.refresh_mirror(source).await;

    assert_eq!(fake.renames(), vec![(mirror, "General：3 users".to_string())]);
    assert_eq!(
        fake.channel_name(mirror).as_deref(),
        Some("General：3 users")
    );
}

#[tokio::test]
async fn test_refresh_without_change_is_noop() {
    let (fake, state, source, _mirror) = tracked_setup(2).await;

    state.refresh_mirror(source).await;
    state.refresh_mirror(source).await;

    assert!(fake.calls().is_empty(), "no writes expected: {:?}", fake.calls());
}

#[tokio::test(start_paused = true)]
async fn test_zero_occupancy_waits_for_debounce() {
    let (fake, state, source, mirror) = tracked_setup(1).await;

    fake.set_occupancy(guild(), source, 0);
    state.refresh_mirror(source).await;
    assert!(fake.renames().is_empty(), "zero must not rename immediately");

    tokio::time::advance(Duration::from_secs(299)).await;
    state.refresh_mirror(source).await;
    assert!(fake.renames().is_empty(), "still inside the debounce window");

    tokio::time::advance(Duration::from_secs(2)).await;
    state.refresh_mirror(source).await;
    assert_eq!(fake.renames(), vec![(mirror, "General：0 users".to_string())]);

    // Once announced, the streak stays quiet no matter how long it runs.
    tokio::time::advance(Duration::from_secs(3600)).await;
    state.refresh_mirror(source).await;
    assert_eq!(fake.renames().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_streak_resets_when_reoccupied() {
    let (fake, state, source, mirror) = tracked_setup(1).await;

    fake.set_occupancy(guild(), source, 0);
    state.refresh_mirror(source).await;
    tokio::time::advance(Duration::from_secs(200)).await;

    // Someone joins; the half-elapsed streak must be forgotten.
    fake.set_occupancy(guild(), source, 1);
    state.refresh_mirror(source).await;
    assert!(fake.renames().is_empty(), "name already matched");

    fake.set_occupancy(guild(), source, 0);
    state.refresh_mirror(source).await;
    tokio::time::advance(Duration::from_secs(299)).await;
    state.refresh_mirror(source).await;
    assert!(
        fake.renames().is_empty(),
        "debounce must restart from the second streak"
    );

    tokio::time::advance(Duration::from_secs(2)).await;
    state.refresh_mirror(source).await;
    assert_eq!(fake.renames(), vec![(mirror, "General：0 users".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_preserves_zero_debounce() {
    let (fake, state, source, mirror) = tracked_setup(1).await;

    fake.set_occupancy(guild(), source, 0);
    state.refresh_mirror(source).await;

    // A sweep landing mid-window must not restart the streak.
    tokio::time::advance(Duration::from_secs(200)).await;
    state.sweep().await;
    assert!(fake.renames().is_empty(), "still inside the debounce window");

    tokio::time::advance(Duration::from_secs(150)).await;
    state.sweep().await;
    assert_eq!(fake.renames(), vec![(mirror, "General：0 users".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_backoff_honors_retry_after() {
    let (fake, state, source, mirror) = tracked_setup(2).await;

    fake.queue_rename_error(PlatformError::RateLimited {
        retry_after: Some(Duration::from_secs(30)),
    });
    fake.set_occupancy(guild(), source, 3);
    state.refresh_mirror(source).await;
    assert!(fake.renames().is_empty(), "first attempt was rate limited");

    // Triggers during the backoff must not reach the platform.
    fake.set_occupancy(guild(), source, 4);
    state.refresh_mirror(source).await;
    assert!(fake.renames().is_empty());

    tokio::time::advance(Duration::from_secs(31)).await;
    state.refresh_mirror(source).await;
    assert_eq!(fake.renames(), vec![(mirror, "General：4 users".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_default_backoff() {
    let (fake, state, source, mirror) = tracked_setup(2).await;

    // No retry-after hint: the configured fallback (60s) applies.
    fake.queue_rename_error(PlatformError::RateLimited { retry_after: None });
    fake.set_occupancy(guild(), source, 3);
    state.refresh_mirror(source).await;

    tokio::time::advance(Duration::from_secs(59)).await;
    state.refresh_mirror(source).await;
    assert!(fake.renames().is_empty(), "fallback backoff still active");

    tokio::time::advance(Duration::from_secs(2)).await;
    state.refresh_mirror(source).await;
    assert_eq!(fake.renames(), vec![(mirror, "General：3 users".to_string())]);
}

#[tokio::test]
async fn test_overlapping_passes_drop() {
    let (fake, state, source, _mirror) = tracked_setup(2).await;
    fake.set_occupancy(guild(), source, 3);

    // Park the first pass at its authoritative read.
    let gate = fake.hold_fetches().await;
    let task = {
        let state = Arc::clone(&state);
        tokio::spawn(async move { state.refresh_mirror(source).await })
    };
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    // The second trigger finds the pass in flight and drops itself.
    state.refresh_mirror(source).await;
    assert!(fake.renames().is_empty());

    drop(gate);
    task.await.expect("pass panicked");
    assert_eq!(fake.renames().len(), 1, "exactly one pass committed");
}

#[tokio::test]
async fn test_flag_released_after_failed_pass() {
    let (fake, state, source, mirror) = tracked_setup(2).await;

    fake.queue_fetch_error(PlatformError::Http("boom".into()));
    fake.set_occupancy(guild(), source, 3);
    state.refresh_mirror(source).await;
    assert!(fake.renames().is_empty(), "errored pass must not commit");

    // The abandoned pass must have released the in-flight flag.
    state.refresh_mirror(source).await;
    assert_eq!(fake.renames(), vec![(mirror, "General：3 users".to_string())]);
}

#[tokio::test]
async fn test_forbidden_abandons_without_cooldown() {
    let (fake, state, source, mirror) = tracked_setup(2).await;

    fake.queue_rename_error(PlatformError::Forbidden);
    fake.set_occupancy(guild(), source, 3);
    state.refresh_mirror(source).await;
    assert!(fake.renames().is_empty());
    assert!(state.is_tracked(source), "permission errors do not untrack");

    // No cooldown either: the next natural trigger goes through.
    fake.set_occupancy(guild(), source, 4);
    state.refresh_mirror(source).await;
    assert_eq!(fake.renames(), vec![(mirror, "General：4 users".to_string())]);
}

#[tokio::test]
async fn test_vanished_mirror_recreated_on_refresh() {
    let (fake, state, source, mirror) = tracked_setup(2).await;

    // Someone deleted the mirror behind our back.
    fake.remove_channel(guild(), mirror);
    fake.set_occupancy(guild(), source, 3);
    state.refresh_mirror(source).await;

    let replacement = state.mirror_of(source).expect("still tracked");
    assert_ne!(replacement, mirror);
    assert_eq!(
        fake.channel_name(replacement).as_deref(),
        Some("General：3 users")
    );
    assert_eq!(fake.parent_of(guild(), replacement), Some(ChannelId::new(10)));
}

#[tokio::test]
async fn test_mirror_count_saturates() {
    let (fake, state, source, mirror) = tracked_setup(2).await;

    fake.set_occupancy(guild(), source, 2500);
    state.refresh_mirror(source).await;
    assert_eq!(
        fake.channel_name(mirror).as_deref(),
        Some("General：999 users")
    );
}
