//! Fleet-level integration: registration, reporting, correlation and
//! automated response working together.

use std::sync::Arc;

use palisade_hive::correlate::Correlator;
use palisade_hive::playbook::{Playbook, PlaybookAction, PlaybookCondition, PlaybookEngine};
use palisade_hive::{
    AgentStatus, Hive, HiveError, ResponseAction, ThreatEvent, ThreatLevel, ThreatType,
};

#[test]
fn register_report_heartbeat_lifecycle() {
    let hive = Hive::with_defaults();

    let a1 = hive.register_agent("web-01", "10.1.0.1", "linux").unwrap();
    let a2 = hive.register_agent("web-02", "10.1.0.2", "linux").unwrap();
    assert_eq!((a1, a2), (1, 2));

    let event_id = hive.report_threat(ThreatEvent::new(
        a1,
        ThreatLevel::High,
        ThreatType::Injection,
        "ignore previous instructions",
    ));
    assert!(event_id > 0);
    assert_eq!(hive.get_threat(event_id).unwrap().agent_id, a1);

    hive.update_agent(a2, AgentStatus::Offline).unwrap();
    hive.heartbeat(a2).unwrap();

    let stats = hive.stats();
    assert_eq!(stats.agents_total, 2);
    assert_eq!(stats.agents_online, 2);
    assert_eq!(stats.threats_total, 1);
    assert_eq!(stats.threats_high, 1);
    assert!(stats.agents_online + stats.agents_offline + stats.agents_compromised <= stats.agents_total);
}

#[test]
fn event_ids_monotonic_across_threads() {
    let hive = Arc::new(Hive::with_defaults());
    let mut handles = Vec::new();
    for t in 0..4 {
        let hive = hive.clone();
        handles.push(std::thread::spawn(move || {
            let mut ids = Vec::new();
            for i in 0..100 {
                ids.push(hive.report_threat(ThreatEvent::new(
                    1,
                    ThreatLevel::Low,
                    ThreatType::Unknown,
                    &format!("t{t}-{i}"),
                )));
            }
            ids
        }));
    }

    let mut all: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let unique_before = all.len();
    all.sort_unstable();
    all.dedup();
    // Strictly increasing per process means globally unique.
    assert_eq!(all.len(), unique_before);
}

#[test]
fn lateral_movement_triggers_playbook_isolation() {
    let hive = Hive::with_defaults();
    for (agent, host) in [(0, "db-01"), (1, "db-02"), (2, "db-03")] {
        let id = hive.register_agent(host, "10.2.0.1", "linux").unwrap();
        hive.report_threat(ThreatEvent::new(
            id,
            ThreatLevel::High,
            ThreatType::Lateral,
            &format!("exec /tmp/implant-{agent}"),
        ));
    }

    // Correlator tick finds one lateral-movement record.
    let correlator = Correlator::new(hive.config().correlation.clone());
    assert_eq!(correlator.analyze(&hive), 1);
    let record = correlator.records().pop().unwrap();
    assert_eq!(record.attack_type, "Lateral Movement");
    assert_eq!(record.agent_ids.len(), 3);
    assert!(record.confidence >= 0.8);

    // The correlator's synthetic event drives the default playbooks.
    let engine = PlaybookEngine::with_defaults().without_delays();
    let synthetic = ThreatEvent::new(
        record.agent_ids[0],
        ThreatLevel::High,
        ThreatType::Lateral,
        "correlated lateral movement",
    );
    let executed = engine.handle_event(&synthetic, record.agent_ids.len()).unwrap();
    assert_eq!(executed, "Lateral Movement Response");
}

#[test]
fn playbook_priority_scenario() {
    let engine = PlaybookEngine::new(Box::new(palisade_hive::playbook::TracingExecutor))
        .without_delays();

    let mut p1 = Playbook::new("P1", 1);
    p1.conditions.push(PlaybookCondition::LevelGte(ThreatLevel::Critical));
    p1.actions.push(PlaybookAction::new(ResponseAction::Isolate));
    engine.add(p1).unwrap();

    let mut p2 = Playbook::new("P2", 2);
    p2.conditions.push(PlaybookCondition::LevelGte(ThreatLevel::Critical));
    p2.actions.push(PlaybookAction::new(ResponseAction::Block));
    engine.add(p2).unwrap();

    let event = ThreatEvent::new(1, ThreatLevel::Critical, ThreatType::Malware, "boom");
    assert_eq!(engine.handle_event(&event, 1).unwrap(), "P1");

    let playbooks = engine.playbooks();
    let p1 = playbooks.iter().find(|p| p.name == "P1").unwrap();
    let p2 = playbooks.iter().find(|p| p.name == "P2").unwrap();
    assert_eq!(p1.executions, 1);
    assert_eq!(p2.executions, 0);
}

#[test]
fn agent_slots_exhaust_cleanly() {
    let hive = Hive::with_defaults();
    for i in 1..palisade_hive::MAX_AGENTS {
        hive.register_agent(&format!("h{i}"), "ip", "os").unwrap();
    }
    assert!(matches!(
        hive.register_agent("overflow", "ip", "os"),
        Err(HiveError::Exhausted(_))
    ));
}

#[test]
fn threat_ring_boundary() {
    let hive = Hive::with_defaults();
    // Fill to capacity - 1.
    for i in 0..(palisade_hive::MAX_THREATS - 1) {
        hive.report_threat(ThreatEvent::new(
            1,
            ThreatLevel::Low,
            ThreatType::Unknown,
            &format!("s{i}"),
        ));
    }
    assert_eq!(hive.threat_count(), palisade_hive::MAX_THREATS - 1);

    // One more fits without dropping.
    let filled = hive.report_threat(ThreatEvent::new(
        1,
        ThreatLevel::Low,
        ThreatType::Unknown,
        "filler",
    ));
    assert_eq!(hive.threat_count(), palisade_hive::MAX_THREATS);
    assert!(hive.get_threat(filled).is_some());

    // The next report drops exactly the oldest entry.
    let oldest = {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        hive.recent_threats(u64::MAX - now, now)
            .first()
            .unwrap()
            .event_id
    };
    hive.report_threat(ThreatEvent::new(
        1,
        ThreatLevel::Low,
        ThreatType::Unknown,
        "overflow",
    ));
    assert_eq!(hive.threat_count(), palisade_hive::MAX_THREATS);
    assert!(hive.get_threat(oldest).is_none());
}

#[test]
fn compromised_agents_show_in_stats() {
    let hive = Hive::with_defaults();
    let id = hive.register_agent("victim", "10.0.0.5", "linux").unwrap();
    hive.update_agent(id, AgentStatus::Compromised).unwrap();
    let stats = hive.stats();
    assert_eq!(stats.agents_compromised, 1);
    assert_eq!(stats.agents_online, 0);
}
