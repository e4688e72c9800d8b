//! Property tests over arbitrary detection outcomes.

use proptest::prelude::*;
use smilebooth::orchestrator::BoothOrchestrator;
use smilebooth::testing::{ScriptedConfirm, ScriptedDetector, SyntheticSource};
use smilebooth::{BoothConfig, BoothPhase, ConnectivityStatus, Verdict};
use std::sync::Arc;
use std::time::Duration;

fn verdict_strategy() -> impl Strategy<Value = Verdict> {
    prop_oneof![
        Just(Verdict::Smile),
        Just(Verdict::NoSmile),
        Just(Verdict::NoDecision),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// For any sequence of detection results the photo sequence never
    /// exceeds three entries, and the session only leaves `Capturing`
    /// with a full strip.
    #[test]
    fn photo_sequence_never_exceeds_three(script in proptest::collection::vec(verdict_strategy(), 0..40)) {
        let smiles = script.iter().filter(|v| **v == Verdict::Smile).count();

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .expect("runtime");

        rt.block_on(async move {
            let config = BoothConfig::default();
            let source = Arc::new(SyntheticSource::new(16, 12));
            let detector = Arc::new(ScriptedDetector::new(script));
            let (_tx, rx) = tokio::sync::watch::channel(ConnectivityStatus::Connected);
            let booth = BoothOrchestrator::new(
                source.clone(),
                detector,
                rx,
                Arc::new(ScriptedConfirm::new(true)),
                &config,
            );

            booth.start().await.expect("start");

            // Step far enough for the whole script (plus countdowns and
            // cooldowns) to play out, checking the invariant throughout.
            for _ in 0..1200 {
                let count = booth.photos().len();
                assert!(count <= 3, "photo count {} exceeds cap", count);
                match booth.phase() {
                    BoothPhase::Preview => assert_eq!(count, 3),
                    BoothPhase::Capturing | BoothPhase::Idle => {}
                    BoothPhase::Final => unreachable!("nothing composes here"),
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }

            // At most one photo per smile verdict, regardless of timing.
            assert!(booth.photos().len() <= smiles.min(3));

            // Camera released exactly when the strip completes.
            if booth.phase() == BoothPhase::Preview {
                assert_eq!(source.active_streams(), 0);
            } else {
                assert_eq!(source.active_streams(), 1);
            }
        });
    }
}
