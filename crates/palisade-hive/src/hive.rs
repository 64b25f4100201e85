//! # Hive Core
//!
//! Agent registry, bounded threat ring, signature table and statistics,
//! behind three independent locks. Helpers snapshot under their lock and
//! return copies; nothing holds one lock while taking another except the
//! documented agents → threats → signatures order in [`Hive::stats`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentStatus};
use crate::alert::AlertHub;
use crate::config::HiveConfig;
use crate::threat::{ThreatEvent, ThreatLevel, ThreatType};
use crate::{HiveError, Result, MAX_AGENTS, MAX_SIGNATURES, MAX_THREATS};

/// A fleet-shared detection signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiveSignature {
    pub id: u32,
    pub pattern: String,
    pub level: ThreatLevel,
    pub threat_type: ThreatType,
    pub matches: u64,
    pub added_at: u64,
}

/// Maximum signature pattern length.
pub const MAX_SIG_PATTERN: usize = 255;

/// Aggregate statistics, returned by copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiveStats {
    pub agents_total: u32,
    pub agents_online: u32,
    pub agents_offline: u32,
    pub agents_compromised: u32,

    pub threats_total: u64,
    pub threats_critical: u64,
    pub threats_high: u64,
    pub threats_medium: u64,
    pub threats_low: u64,

    pub signatures_total: u64,
    pub api_requests: u64,

    pub start_time: u64,
    pub last_threat: u64,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct AgentCounters {
    pub total: u32,
    pub online: u32,
    pub offline: u32,
    pub compromised: u32,
}

pub(crate) struct AgentTable {
    /// Slot 0 is reserved; a registered agent's id is its slot index.
    pub slots: Vec<Option<Agent>>,
    pub counters: AgentCounters,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ThreatCounters {
    pub total: u64,
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub last_threat: u64,
}

pub(crate) struct ThreatRing {
    pub ring: VecDeque<ThreatEvent>,
    /// Last issued event id; ids are strictly increasing per process.
    pub last_id: u64,
    pub counters: ThreatCounters,
}

pub(crate) struct SignatureTable {
    pub entries: Vec<HiveSignature>,
    pub next_id: u32,
    pub total_added: u64,
}

/// The hive core.
pub struct Hive {
    id: String,
    config: HiveConfig,
    pub(crate) agents: Mutex<AgentTable>,
    pub(crate) threats: Mutex<ThreatRing>,
    pub(crate) signatures: RwLock<SignatureTable>,
    alerts: AlertHub,
    pub(crate) api_requests: AtomicU64,
    pub(crate) start_time: u64,
}

impl Hive {
    pub fn new(config: HiveConfig) -> Self {
        let id = format!("HIVE-{:08X}", now_secs());
        tracing::info!(hive = %id, "hive initialized");
        Self {
            id,
            config,
            agents: Mutex::new(AgentTable {
                slots: (0..MAX_AGENTS).map(|_| None).collect(),
                counters: AgentCounters::default(),
            }),
            threats: Mutex::new(ThreatRing {
                ring: VecDeque::with_capacity(1024),
                last_id: 0,
                counters: ThreatCounters::default(),
            }),
            signatures: RwLock::new(SignatureTable {
                entries: Vec::new(),
                next_id: 1,
                total_added: 0,
            }),
            alerts: AlertHub::with_defaults(),
            api_requests: AtomicU64::new(0),
            start_time: now_secs(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(HiveConfig::default())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &HiveConfig {
        &self.config
    }

    pub fn alerts(&self) -> &AlertHub {
        &self.alerts
    }

    pub fn uptime_secs(&self) -> u64 {
        now_secs().saturating_sub(self.start_time)
    }

    // ---------------- Agents ----------------

    /// Register a new agent into the first free slot (1..MAX_AGENTS).
    ///
    /// Fails with `Exhausted` when every slot is taken. Slot 0 is never
    /// allocated.
    pub fn register_agent(&self, hostname: &str, ip: &str, os_type: &str) -> Result<u32> {
        let mut table = self.agents.lock().expect("agents lock");
        let slot = (1..MAX_AGENTS)
            .find(|&i| table.slots[i].is_none())
            .ok_or_else(|| HiveError::Exhausted("agent slots".into()))?;

        let mut auth_token = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut auth_token);

        let now = now_secs();
        table.slots[slot] = Some(Agent {
            id: slot as u32,
            auth_token,
            hostname: hostname.to_string(),
            ip_address: ip.to_string(),
            os_type: os_type.to_string(),
            os_version: String::new(),
            version: (0, 0, 0),
            status: AgentStatus::Online,
            capabilities: 0,
            registered_at: now,
            last_heartbeat: now,
            threats_detected: 0,
            scans_performed: 0,
            bytes_scanned: 0,
        });
        table.counters.total += 1;
        table.counters.online += 1;
        drop(table);

        tracing::info!(agent = slot, hostname, ip, "agent registered");
        Ok(slot as u32)
    }

    /// Explicit status transition, adjusting the online/offline/compromised
    /// counters as a group.
    pub fn update_agent(&self, agent_id: u32, status: AgentStatus) -> Result<()> {
        let mut table = self.agents.lock().expect("agents lock");
        let slot = valid_slot(agent_id)?;
        let agent = table.slots[slot]
            .as_mut()
            .ok_or_else(|| HiveError::NotFound(format!("agent {agent_id}")))?;
        let old = agent.status;
        agent.status = status;

        // Each agent occupies at most one status bucket; leave the old
        // bucket before entering the new one.
        let counters = &mut table.counters;
        match old {
            AgentStatus::Online => counters.online = counters.online.saturating_sub(1),
            AgentStatus::Offline => counters.offline = counters.offline.saturating_sub(1),
            AgentStatus::Compromised => {
                counters.compromised = counters.compromised.saturating_sub(1)
            }
            _ => {}
        }
        match status {
            AgentStatus::Online => counters.online += 1,
            AgentStatus::Offline => counters.offline += 1,
            AgentStatus::Compromised => counters.compromised += 1,
            _ => {}
        }
        Ok(())
    }

    /// Record a heartbeat; an offline agent comes back online.
    pub fn heartbeat(&self, agent_id: u32) -> Result<()> {
        let mut table = self.agents.lock().expect("agents lock");
        let slot = valid_slot(agent_id)?;
        let agent = table.slots[slot]
            .as_mut()
            .ok_or_else(|| HiveError::NotFound(format!("agent {agent_id}")))?;
        agent.last_heartbeat = now_secs();
        if agent.status == AgentStatus::Offline {
            agent.status = AgentStatus::Online;
            table.counters.offline = table.counters.offline.saturating_sub(1);
            table.counters.online += 1;
        }
        Ok(())
    }

    /// Copy of an agent record; `None` for slot 0, out-of-range ids and
    /// inactive slots.
    pub fn get_agent(&self, agent_id: u32) -> Option<Agent> {
        self.api_requests.fetch_add(1, Ordering::Relaxed);
        if valid_slot(agent_id).is_err() {
            return None;
        }
        let table = self.agents.lock().expect("agents lock");
        table.slots[agent_id as usize].clone()
    }

    /// Copies of all active agents.
    pub fn agents_snapshot(&self) -> Vec<Agent> {
        let table = self.agents.lock().expect("agents lock");
        table.slots.iter().flatten().cloned().collect()
    }

    /// Bump an agent's scan counters (fleet stats message).
    pub fn record_scan(&self, agent_id: u32, scans: u64, bytes: u64) -> Result<()> {
        let mut table = self.agents.lock().expect("agents lock");
        let slot = valid_slot(agent_id)?;
        let agent = table.slots[slot]
            .as_mut()
            .ok_or_else(|| HiveError::NotFound(format!("agent {agent_id}")))?;
        agent.scans_performed += scans;
        agent.bytes_scanned += bytes;
        Ok(())
    }

    /// Walk agents and mark online agents offline when their heartbeat age
    /// exceeds the configured timeout. Returns the ids transitioned.
    pub fn check_heartbeats(&self) -> Vec<u32> {
        let timeout = self.config.heartbeat_timeout_secs;
        let now = now_secs();
        let mut flipped = Vec::new();
        let mut guard = self.agents.lock().expect("agents lock");
        let table = &mut *guard;
        for slot in table.slots.iter_mut().flatten() {
            if slot.status == AgentStatus::Online && slot.heartbeat_age(now) > timeout {
                slot.status = AgentStatus::Offline;
                table.counters.online = table.counters.online.saturating_sub(1);
                table.counters.offline += 1;
                flipped.push(slot.id);
            }
        }
        drop(guard);
        for id in &flipped {
            tracing::warn!(agent = id, "agent went offline (heartbeat timeout)");
        }
        flipped
    }

    // ---------------- Threats ----------------

    /// Append a threat event to the ring, assigning its event id and
    /// timestamp. On overflow exactly the oldest entry is dropped.
    ///
    /// Ids follow `1000·wall_seconds + (count mod 1000)`, clamped to stay
    /// strictly increasing within the process.
    pub fn report_threat(&self, mut event: ThreatEvent) -> u64 {
        // Agent counter first; lock order is agents → threats.
        if valid_slot(event.agent_id).is_ok() {
            let mut table = self.agents.lock().expect("agents lock");
            if let Some(agent) = table.slots[event.agent_id as usize].as_mut() {
                agent.threats_detected += 1;
            }
        }

        let level = event.level;
        let event_id;
        {
            let mut ring = self.threats.lock().expect("threats lock");
            if ring.ring.len() >= MAX_THREATS {
                ring.ring.pop_front();
            }
            let now = now_secs();
            let raw = now * 1000 + (ring.ring.len() as u64 % 1000);
            event_id = raw.max(ring.last_id + 1);
            ring.last_id = event_id;

            event.event_id = event_id;
            event.timestamp = now;

            ring.counters.total += 1;
            match level {
                ThreatLevel::Critical => ring.counters.critical += 1,
                ThreatLevel::High => ring.counters.high += 1,
                ThreatLevel::Medium => ring.counters.medium += 1,
                ThreatLevel::Low => ring.counters.low += 1,
                ThreatLevel::None => {}
            }
            ring.counters.last_threat = now;
            ring.ring.push_back(event.clone());
        }

        // Best-effort fan-out after the lock is gone.
        self.alerts.notify_threat(&event);

        tracing::info!(
            event = event_id,
            agent = event.agent_id,
            level = ?level,
            "threat reported"
        );
        event_id
    }

    /// Mark a threat resolved. Missing ids return `NotFound`.
    pub fn resolve_threat(&self, event_id: u64) -> Result<()> {
        let mut ring = self.threats.lock().expect("threats lock");
        match ring.ring.iter_mut().find(|e| e.event_id == event_id) {
            Some(event) => {
                event.resolved = true;
                Ok(())
            }
            None => Err(HiveError::NotFound(format!("threat {event_id}"))),
        }
    }

    /// Copy of a threat by id.
    pub fn get_threat(&self, event_id: u64) -> Option<ThreatEvent> {
        self.api_requests.fetch_add(1, Ordering::Relaxed);
        let ring = self.threats.lock().expect("threats lock");
        ring.ring.iter().find(|e| e.event_id == event_id).cloned()
    }

    /// Copies of all events whose timestamp is within `window_secs` of
    /// `now`. The correlator's snapshot path.
    pub fn recent_threats(&self, window_secs: u64, now: u64) -> Vec<ThreatEvent> {
        let ring = self.threats.lock().expect("threats lock");
        ring.ring
            .iter()
            .filter(|e| now.saturating_sub(e.timestamp) <= window_secs)
            .cloned()
            .collect()
    }

    pub fn threat_count(&self) -> usize {
        self.threats.lock().expect("threats lock").ring.len()
    }

    // ---------------- Signatures ----------------

    /// Add a signature. Identical patterns are not deduplicated.
    pub fn add_signature(
        &self,
        pattern: &str,
        level: ThreatLevel,
        threat_type: ThreatType,
    ) -> Result<u32> {
        if pattern.is_empty() {
            return Err(HiveError::InvalidInput("empty signature pattern".into()));
        }
        if pattern.len() > MAX_SIG_PATTERN {
            return Err(HiveError::InvalidInput(format!(
                "signature pattern exceeds {MAX_SIG_PATTERN} bytes"
            )));
        }
        let mut table = self.signatures.write().expect("signatures lock");
        if table.entries.len() >= MAX_SIGNATURES {
            return Err(HiveError::Exhausted("signature table".into()));
        }
        let id = table.next_id;
        table.next_id += 1;
        table.entries.push(HiveSignature {
            id,
            pattern: pattern.to_string(),
            level,
            threat_type,
            matches: 0,
            added_at: now_secs(),
        });
        table.total_added += 1;
        Ok(id)
    }

    /// Remove a signature by emptying its pattern slot.
    pub fn remove_signature(&self, sig_id: u32) -> Result<()> {
        let mut table = self.signatures.write().expect("signatures lock");
        match table.entries.iter_mut().find(|s| s.id == sig_id) {
            Some(sig) if !sig.pattern.is_empty() => {
                sig.pattern.clear();
                Ok(())
            }
            _ => Err(HiveError::NotFound(format!("signature {sig_id}"))),
        }
    }

    /// Copies of all active signatures.
    pub fn signatures_snapshot(&self) -> Vec<HiveSignature> {
        self.api_requests.fetch_add(1, Ordering::Relaxed);
        let table = self.signatures.read().expect("signatures lock");
        table
            .entries
            .iter()
            .filter(|s| !s.pattern.is_empty())
            .cloned()
            .collect()
    }

    // ---------------- Stats & status ----------------

    /// Aggregate statistics copy. Locks are taken one at a time in the
    /// agents → threats → signatures order.
    pub fn stats(&self) -> HiveStats {
        let mut stats = HiveStats {
            start_time: self.start_time,
            api_requests: self.api_requests.load(Ordering::Relaxed),
            ..Default::default()
        };
        {
            let table = self.agents.lock().expect("agents lock");
            stats.agents_total = table.counters.total;
            stats.agents_online = table.counters.online;
            stats.agents_offline = table.counters.offline;
            stats.agents_compromised = table.counters.compromised;
        }
        {
            let ring = self.threats.lock().expect("threats lock");
            stats.threats_total = ring.counters.total;
            stats.threats_critical = ring.counters.critical;
            stats.threats_high = ring.counters.high;
            stats.threats_medium = ring.counters.medium;
            stats.threats_low = ring.counters.low;
            stats.last_threat = ring.counters.last_threat;
        }
        {
            let table = self.signatures.read().expect("signatures lock");
            stats.signatures_total = table.total_added;
        }
        stats
    }

    /// Multi-line status report for operators.
    pub fn status_report(&self) -> String {
        let stats = self.stats();
        format!(
            "hive {id}\n\
             uptime: {uptime}s\n\
             agents: total={at} online={aon} offline={aoff} compromised={ac}\n\
             threats: total={tt} critical={tc} high={th} medium={tm} low={tl}\n\
             signatures: {st}\n\
             api requests: {api}",
            id = self.id,
            uptime = self.uptime_secs(),
            at = stats.agents_total,
            aon = stats.agents_online,
            aoff = stats.agents_offline,
            ac = stats.agents_compromised,
            tt = stats.threats_total,
            tc = stats.threats_critical,
            th = stats.threats_high,
            tm = stats.threats_medium,
            tl = stats.threats_low,
            st = stats.signatures_total,
            api = stats.api_requests,
        )
    }
}

fn valid_slot(agent_id: u32) -> Result<usize> {
    if agent_id == 0 || agent_id as usize >= MAX_AGENTS {
        return Err(HiveError::InvalidInput(format!(
            "agent id {agent_id} out of range"
        )));
    }
    Ok(agent_id as usize)
}

pub(crate) fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
