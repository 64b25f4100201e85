//! Property tests for the hive core invariants.

use proptest::prelude::*;

use palisade_hive::{AgentStatus, Hive, ThreatEvent, ThreatLevel, ThreatType};

fn arb_level() -> impl Strategy<Value = ThreatLevel> {
    prop_oneof![
        Just(ThreatLevel::None),
        Just(ThreatLevel::Low),
        Just(ThreatLevel::Medium),
        Just(ThreatLevel::High),
        Just(ThreatLevel::Critical),
    ]
}

fn arb_status() -> impl Strategy<Value = AgentStatus> {
    prop_oneof![
        Just(AgentStatus::Online),
        Just(AgentStatus::Offline),
        Just(AgentStatus::Compromised),
        Just(AgentStatus::Quarantined),
        Just(AgentStatus::Isolated),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Event ids form a strictly increasing sequence in submission order,
    /// whatever the report mix looks like.
    #[test]
    fn event_ids_strictly_increase(
        reports in proptest::collection::vec((1u32..8, arb_level(), ".{0,40}"), 1..60)
    ) {
        let hive = Hive::with_defaults();
        let mut last = 0u64;
        for (agent, level, signature) in reports {
            let id = hive.report_threat(ThreatEvent::new(
                agent,
                level,
                ThreatType::Unknown,
                &signature,
            ));
            prop_assert!(id > last, "id {id} did not exceed {last}");
            last = id;
        }
    }

    /// Whatever sequence of registrations, status flips and heartbeats
    /// runs, the status counters never exceed the total.
    #[test]
    fn status_counters_bounded_by_total(
        ops in proptest::collection::vec((0u8..3, 1u32..6, arb_status()), 0..80)
    ) {
        let hive = Hive::with_defaults();
        for (op, agent, status) in ops {
            match op {
                0 => {
                    let _ = hive.register_agent("host", "10.0.0.1", "linux");
                }
                1 => {
                    let _ = hive.update_agent(agent, status);
                }
                _ => {
                    let _ = hive.heartbeat(agent);
                }
            }
            let stats = hive.stats();
            prop_assert!(
                stats.agents_online + stats.agents_offline + stats.agents_compromised
                    <= stats.agents_total
            );
        }
    }

    /// Level counters always sum to at most the total threat count.
    #[test]
    fn level_counters_sum_to_total(levels in proptest::collection::vec(arb_level(), 0..40)) {
        let hive = Hive::with_defaults();
        for level in levels {
            hive.report_threat(ThreatEvent::new(1, level, ThreatType::Unknown, "s"));
        }
        let stats = hive.stats();
        prop_assert!(
            stats.threats_critical + stats.threats_high + stats.threats_medium + stats.threats_low
                <= stats.threats_total
        );
    }
}
