// tests/property/toggle_test.rs

//! Property-based tests for the controller's start/stop decisions

use crate::fakes::Harness;
use hbwarden::core::heartbeat::opinion::OpinionKind;
use hbwarden::core::heartbeat::types::{ClusterMode, MonitorFlag};
use proptest::prelude::*;

fn mode() -> impl Strategy<Value = ClusterMode> {
    prop_oneof![Just(ClusterMode::On), Just(ClusterMode::Off)]
}

fn flag() -> impl Strategy<Value = MonitorFlag> {
    prop_oneof![
        Just(MonitorFlag::On),
        Just(MonitorFlag::Off),
        Just(MonitorFlag::Unset)
    ]
}

/// What a controller should have done after a sequence of toggles.
#[derive(Debug, Default)]
struct Expected {
    running: bool,
    flag: Option<MonitorFlag>,
    mode: Option<ClusterMode>,
    starts: usize,
    stops: usize,
}

impl Expected {
    fn apply(&mut self, mode: ClusterMode, flag: MonitorFlag) {
        if self.flag == Some(flag) && self.mode == Some(mode) {
            return;
        }
        self.flag = Some(flag);
        match (mode, flag) {
            (ClusterMode::On, MonitorFlag::On) => {
                self.running = true;
                self.starts += 1;
            }
            (ClusterMode::On, MonitorFlag::Unset) => {}
            _ => {
                self.running = false;
                self.stops += 1;
            }
        }
        self.mode = Some(mode);
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_toggle_sequence_matches_decision_table(
        initial in (mode(), flag()),
        steps in prop::collection::vec((mode(), flag()), 0..=30)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = Harness::new();
            let c = h.controller("1", initial.0, initial.1);
            let mut expected = Expected::default();
            expected.apply(initial.0, initial.1);

            for (mode, flag) in &steps {
                c.toggle(*mode, *flag);
                expected.apply(*mode, *flag);

                assert_eq!(c.is_running(), expected.running);
                assert_eq!(h.reactor.is_active(c.id()), expected.running);
                assert_eq!(c.monitor_flag(), *flag);
                assert_eq!(c.cluster_mode(), Some(*mode));
                if *mode == ClusterMode::Off {
                    assert!(!c.is_running());
                }
            }

            assert_eq!(h.reactor.adds(), expected.starts);
            assert_eq!(h.reactor.removes(), expected.stops);
            assert_eq!(h.pipeline.count(OpinionKind::Discard), expected.stops);
            assert_eq!(h.pipeline.len(), expected.stops);
        });
    }

    #[test]
    fn test_reapplying_last_pair_is_always_a_noop(
        steps in prop::collection::vec((mode(), flag()), 1..=20)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = Harness::new();
            let (first_mode, first_flag) = steps[0];
            let c = h.controller("1", first_mode, first_flag);
            for (mode, flag) in &steps[1..] {
                c.toggle(*mode, *flag);
            }
            let events = h.reactor.event_count();
            let opinions = h.pipeline.len();
            let since = c.handler().active_since();

            let (mode, flag) = *steps.last().unwrap();
            c.toggle(mode, flag);

            assert_eq!(h.reactor.event_count(), events);
            assert_eq!(h.pipeline.len(), opinions);
            assert_eq!(c.handler().active_since(), since);
        });
    }

    #[test]
    fn test_every_discard_follows_leaving_the_dispatch_set(
        steps in prop::collection::vec((mode(), flag()), 1..=20)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = Harness::new();
            let (first_mode, first_flag) = steps[0];
            let c = h.controller("1", first_mode, first_flag);
            for (mode, flag) in &steps[1..] {
                c.toggle(*mode, *flag);
            }
            c.callback_delete();

            for opinion in h.pipeline.opinions() {
                assert_eq!(opinion.kind, OpinionKind::Discard);
                assert!(!opinion.active_at_submit.contains(&c.id()));
            }
            if c.monitor_flag() == MonitorFlag::On {
                assert!(!c.is_running());
            }
        });
    }
}
