//! Property-based tests for presence and typing
//!
//! 1. **Expiry**: remote typing never outlives the typing timeout without a
//!    refresh
//! 2. **Debounce**: local typing frames are at least one debounce apart
//! 3. **Idle**: local typing always stops after the idle window

use std::time::Duration;

use lawbuddy_core::{LocalTyping, PresenceConfig, PresenceTracker, PresenceUpdate};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_remote_typing_expires_after_last_refresh(
        refreshes in prop::collection::vec(0u64..2_500, 0..10),
    ) {
        let config = PresenceConfig::default();
        let mut presence = PresenceTracker::new(config.clone());
        presence.join_room("r".into());

        let mut now = Duration::ZERO;
        presence.remote_typing("r", "alice", true, now);
        for gap in &refreshes {
            now += Duration::from_millis(*gap);
            presence.remote_typing("r", "alice", true, now);
            prop_assert!(presence.sweep(now).is_empty());
        }
        let last_refresh = now;

        // Sweep every 100ms until the stop is synthesized
        let mut stopped_at = None;
        while stopped_at.is_none() && now < last_refresh + Duration::from_secs(10) {
            now += Duration::from_millis(100);
            let updates = presence.sweep(now);
            if updates.contains(&PresenceUpdate::Typing {
                room_id: "r".into(),
                user_id: "alice".into(),
                is_typing: false,
            }) {
                stopped_at = Some(now);
            }
        }

        let Some(stopped_at) = stopped_at else {
            return Err(TestCaseError::fail("typing never expired"));
        };
        prop_assert!(stopped_at - last_refresh >= config.typing_timeout);
        prop_assert!(
            stopped_at - last_refresh < config.typing_timeout + config.sweep_interval
                + Duration::from_millis(100)
        );
        prop_assert!(presence.typing_users("r", now).is_empty());
    }

    #[test]
    fn prop_local_typing_is_debounced(keystrokes in prop::collection::vec(1u64..600, 1..40)) {
        let config = PresenceConfig::default();
        let mut local = LocalTyping::new(config.clone());
        let mut now = Duration::ZERO;
        let mut sent = Vec::new();

        for gap in &keystrokes {
            now += Duration::from_millis(*gap);
            if local.tick(now).contains(&"r".to_string()) {
                sent.push((now, false));
            }
            if local.input("r", now) == Some(true) {
                sent.push((now, true));
            }
        }

        let starts: Vec<_> = sent.iter().filter(|(_, on)| *on).map(|(at, _)| *at).collect();
        for pair in starts.windows(2) {
            prop_assert!(pair[1] - pair[0] >= config.local_debounce);
        }

        now += config.local_idle;
        prop_assert_eq!(local.tick(now), vec!["r".to_string()]);
        prop_assert!(!local.is_active("r"));
    }
}
