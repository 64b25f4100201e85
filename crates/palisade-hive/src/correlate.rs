//! # Correlation Engine
//!
//! Time-windowed cross-agent detection. Every tick the correlator takes a
//! snapshot of recent threats (one lock), computes detections with no lock
//! held, then installs the records under its own lock:
//!
//! - **Lateral movement** - the same signature pattern on enough distinct
//!   agents inside the window;
//! - **Exfiltration** - enough events naming the same destination port;
//! - **Attack chains** - every stage of a known chain present in the
//!   window.
//!
//! Records land in a bounded buffer; overflow drops the oldest.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::CorrelationConfig;
use crate::hive::now_secs;
use crate::threat::{ResponseAction, ThreatEvent};
use crate::Hive;

/// Correlation record buffer capacity.
pub const MAX_ATTACK_CHAINS: usize = 16;

/// Cap on contributing events/agents stored per record.
pub const MAX_CORRELATED_EVENTS: usize = 64;

/// Signature fragments that indicate lateral tooling.
const LATERAL_BANK: &[&str] = &["/tmp/", "bash -i", "nc ", "reverse", "ssh"];

/// A known multi-stage attack chain.
#[derive(Debug, Clone)]
pub struct AttackChain {
    pub name: &'static str,
    pub stages: &'static [&'static str],
    pub response: ResponseAction,
}

/// MITRE-inspired chain table.
pub const KNOWN_CHAINS: &[AttackChain] = &[
    AttackChain {
        name: "Reverse Shell Attack",
        stages: &["exec_from_tmp", "network_4444", "priv_escalation"],
        response: ResponseAction::Isolate,
    },
    AttackChain {
        name: "Credential Harvesting",
        stages: &["open_shadow", "open_ssh_keys", "network_exfil"],
        response: ResponseAction::Block,
    },
    AttackChain {
        name: "Lateral Movement",
        stages: &["ssh_connect", "exec_remote", "credential_copy"],
        response: ResponseAction::Isolate,
    },
];

/// One cross-agent finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub event_ids: Vec<u64>,
    pub agent_ids: Vec<u32>,
    pub event_count: usize,
    /// Confidence in [0, 1]; operators tune thresholds against this.
    pub confidence: f64,
    pub attack_type: String,
    pub first_seen: u64,
    pub last_seen: u64,
}

/// The correlation engine.
pub struct Correlator {
    config: CorrelationConfig,
    records: Mutex<VecDeque<CorrelationRecord>>,
}

impl Correlator {
    pub fn new(config: CorrelationConfig) -> Self {
        Self {
            config,
            records: Mutex::new(VecDeque::with_capacity(MAX_ATTACK_CHAINS)),
        }
    }

    /// One full pass over the hive's recent threats. Returns the number of
    /// new detections.
    pub fn analyze(&self, hive: &Hive) -> usize {
        let now = now_secs();
        let snapshot = hive.recent_threats(self.config.window_secs, now);

        let mut found = Vec::new();
        found.extend(self.detect_lateral(&snapshot, now));
        found.extend(self.detect_exfiltration(&snapshot, now));
        found.extend(self.detect_chains(&snapshot, now));

        let detected = found.len();
        if detected > 0 {
            let mut records = self.records.lock().expect("correlation lock");
            for record in found {
                tracing::warn!(
                    attack = %record.attack_type,
                    agents = record.agent_ids.len(),
                    confidence = record.confidence,
                    "correlation detected"
                );
                if records.len() >= MAX_ATTACK_CHAINS {
                    records.pop_front();
                }
                records.push_back(record);
            }
        }
        detected
    }

    /// Same signature fragment on >= threshold distinct agents.
    fn detect_lateral(&self, events: &[ThreatEvent], now: u64) -> Vec<CorrelationRecord> {
        let mut records = Vec::new();
        for pattern in LATERAL_BANK {
            let mut agents: Vec<u32> = Vec::new();
            let mut event_ids: Vec<u64> = Vec::new();
            for event in events {
                if event.signature.contains(pattern) {
                    if !agents.contains(&event.agent_id) && agents.len() < MAX_CORRELATED_EVENTS {
                        agents.push(event.agent_id);
                    }
                    if event_ids.len() < MAX_CORRELATED_EVENTS {
                        event_ids.push(event.event_id);
                    }
                }
            }
            if agents.len() >= self.config.lateral_threshold {
                let confidence = (0.5 + 0.1 * agents.len() as f64).min(1.0);
                records.push(CorrelationRecord {
                    event_count: agents.len(),
                    event_ids,
                    agent_ids: agents,
                    confidence,
                    attack_type: "Lateral Movement".to_string(),
                    first_seen: now,
                    last_seen: now,
                });
            }
        }
        records
    }

    /// Many events naming the same destination port ("...:4444").
    fn detect_exfiltration(&self, events: &[ThreatEvent], now: u64) -> Vec<CorrelationRecord> {
        let mut per_port: HashMap<u16, (Vec<u64>, Vec<u32>)> = HashMap::new();
        for event in events {
            let Some(port) = parse_trailing_port(&event.signature) else {
                continue;
            };
            let entry = per_port.entry(port).or_default();
            if entry.0.len() < MAX_CORRELATED_EVENTS {
                entry.0.push(event.event_id);
            }
            if !entry.1.contains(&event.agent_id) && entry.1.len() < MAX_CORRELATED_EVENTS {
                entry.1.push(event.agent_id);
            }
        }

        let mut ports: Vec<_> = per_port
            .into_iter()
            .filter(|(_, (events, _))| events.len() >= self.config.exfil_port_threshold)
            .collect();
        // Deterministic output order.
        ports.sort_by_key(|(port, _)| *port);

        ports
            .into_iter()
            .map(|(port, (event_ids, agent_ids))| CorrelationRecord {
                event_count: event_ids.len(),
                confidence: (0.5 + 0.05 * event_ids.len() as f64).min(1.0),
                attack_type: format!("Data Exfiltration (port {port})"),
                event_ids,
                agent_ids,
                first_seen: now,
                last_seen: now,
            })
            .collect()
    }

    /// Every stage of a known chain has at least one matching event.
    fn detect_chains(&self, events: &[ThreatEvent], now: u64) -> Vec<CorrelationRecord> {
        let mut records = Vec::new();
        for chain in KNOWN_CHAINS {
            let mut event_ids = Vec::new();
            let mut agent_ids: Vec<u32> = Vec::new();
            let mut stages_found = 0;
            for stage in chain.stages {
                if let Some(event) = events.iter().find(|e| e.signature.contains(stage)) {
                    stages_found += 1;
                    event_ids.push(event.event_id);
                    if !agent_ids.contains(&event.agent_id) {
                        agent_ids.push(event.agent_id);
                    }
                }
            }
            if stages_found == chain.stages.len() {
                records.push(CorrelationRecord {
                    event_count: event_ids.len(),
                    event_ids,
                    agent_ids,
                    confidence: 0.9,
                    attack_type: chain.name.to_string(),
                    first_seen: now,
                    last_seen: now,
                });
            }
        }
        records
    }

    /// Copies of the current records, newest last.
    pub fn records(&self) -> Vec<CorrelationRecord> {
        self.records
            .lock()
            .expect("correlation lock")
            .iter()
            .cloned()
            .collect()
    }

    /// Drop all records.
    pub fn clear(&self) {
        self.records.lock().expect("correlation lock").clear();
    }

    /// Spawn the periodic analysis thread. It observes `running` at least
    /// once per second and exits within one tick of shutdown.
    pub fn spawn(
        self: Arc<Self>,
        hive: Arc<Hive>,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("correlator".into())
            .spawn(move || {
                tracing::info!("correlation engine started");
                let mut elapsed = 0u64;
                while running.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_secs(1));
                    elapsed += 1;
                    if elapsed >= self.config.tick_secs {
                        elapsed = 0;
                        self.analyze(&hive);
                    }
                }
                tracing::info!("correlation engine stopped");
            })
            .expect("spawn correlator")
    }
}

/// Parse a port from the tail of a signature like "connect 1.2.3.4:4444".
fn parse_trailing_port(signature: &str) -> Option<u16> {
    let idx = signature.rfind(':')?;
    let tail = &signature[idx + 1..];
    let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let port: u32 = digits.parse().ok()?;
    if port == 0 || port > u16::MAX as u32 {
        return None;
    }
    Some(port as u16)
}
