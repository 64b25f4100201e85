//! # State Snapshot
//!
//! Best-effort persistence of the hive's durable state: active agents,
//! the signature table and the statistics blob. The threat ring is
//! intentionally not persisted.
//!
//! Layout, all little-endian:
//!
//! ```text
//! magic "HIVE" (u32) · version (u32 = 2)
//! agent_count (u32) · agent records
//! signature_count (i32) · signature records
//! stats blob
//! ```
//!
//! A mismatched magic or version fails with `InvalidState` and the
//! in-memory state is untouched - the file is parsed completely before
//! anything is applied. Loaded agents are re-marked offline until their
//! next heartbeat.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::Ordering;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use palisade_proto::frame::{read_fixed_str, write_fixed_str};

use crate::agent::{Agent, AgentStatus};
use crate::hive::{Hive, HiveSignature, HiveStats};
use crate::threat::{ThreatLevel, ThreatType};
use crate::{HiveError, Result, MAX_AGENTS, MAX_SIGNATURES};

/// Snapshot file magic, ASCII "HIVE".
pub const STATE_MAGIC: u32 = 0x4849_5645;

/// Snapshot format version.
pub const STATE_VERSION: u32 = 2;

const HOSTNAME_LEN: usize = 256;
const IP_LEN: usize = 64;
const OS_TYPE_LEN: usize = 32;
const OS_VERSION_LEN: usize = 64;
const PATTERN_LEN: usize = 256;

/// Fully parsed snapshot, applied only after a clean parse.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub agents: Vec<Agent>,
    pub signatures: Vec<HiveSignature>,
    pub stats: HiveStats,
}

impl Hive {
    /// Write the snapshot to the configured state path.
    pub fn save_state(&self) -> Result<()> {
        let path = self.config().state_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.save_state_to(&path)
    }

    /// Write the snapshot to an explicit path.
    pub fn save_state_to(&self, path: &Path) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);

        w.write_u32::<LittleEndian>(STATE_MAGIC)?;
        w.write_u32::<LittleEndian>(STATE_VERSION)?;

        // Agents, active only. Snapshot under the lock, write after.
        let agents = self.agents_snapshot();
        w.write_u32::<LittleEndian>(agents.len() as u32)?;
        for agent in &agents {
            write_agent(&mut w, agent)?;
        }

        // Signatures, active only.
        let signatures = self.signatures_snapshot();
        w.write_i32::<LittleEndian>(signatures.len() as i32)?;
        for sig in &signatures {
            write_signature(&mut w, sig)?;
        }

        write_stats(&mut w, &self.stats())?;
        w.flush()?;

        tracing::info!(path = %path.display(), agents = agents.len(), "state saved");
        Ok(())
    }

    /// Load a snapshot from the configured state path and install it.
    pub fn load_state(&self) -> Result<()> {
        self.load_state_from(&self.config().state_path())
    }

    /// Load a snapshot from an explicit path and install it. Parsing
    /// happens first; a bad file leaves the hive untouched.
    pub fn load_state_from(&self, path: &Path) -> Result<()> {
        let snapshot = read_snapshot(path)?;
        self.install(snapshot);
        tracing::info!(path = %path.display(), "state loaded");
        Ok(())
    }

    fn install(&self, snapshot: Snapshot) {
        {
            let mut guard = self.agents.lock().expect("agents lock");
            let table = &mut *guard;
            for slot in table.slots.iter_mut() {
                *slot = None;
            }
            let mut installed = 0u32;
            for mut agent in snapshot.agents {
                let slot = agent.id as usize;
                if agent.id == 0 || slot >= MAX_AGENTS {
                    continue;
                }
                // Offline until the next heartbeat proves otherwise.
                agent.status = AgentStatus::Offline;
                table.slots[slot] = Some(agent);
                installed += 1;
            }
            table.counters.total = snapshot.stats.agents_total.max(installed);
            table.counters.online = 0;
            table.counters.offline = installed;
            table.counters.compromised = 0;
        }
        {
            let mut guard = self.signatures.write().expect("signatures lock");
            let table = &mut *guard;
            table.next_id = snapshot
                .signatures
                .iter()
                .map(|s| s.id)
                .max()
                .unwrap_or(0)
                + 1;
            table.entries = snapshot.signatures;
            table.total_added = snapshot.stats.signatures_total;
        }
        {
            let mut ring = self.threats.lock().expect("threats lock");
            ring.counters.total = snapshot.stats.threats_total;
            ring.counters.critical = snapshot.stats.threats_critical;
            ring.counters.high = snapshot.stats.threats_high;
            ring.counters.medium = snapshot.stats.threats_medium;
            ring.counters.low = snapshot.stats.threats_low;
            ring.counters.last_threat = snapshot.stats.last_threat;
        }
        self.api_requests
            .store(snapshot.stats.api_requests, Ordering::Relaxed);
    }
}

/// Parse a snapshot file without touching any hive.
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let mut r = BufReader::new(File::open(path)?);

    let magic = r.read_u32::<LittleEndian>()?;
    let version = r.read_u32::<LittleEndian>()?;
    if magic != STATE_MAGIC {
        return Err(HiveError::InvalidState(format!(
            "bad magic {magic:#010x}"
        )));
    }
    if version != STATE_VERSION {
        return Err(HiveError::InvalidState(format!(
            "unsupported version {version}"
        )));
    }

    let agent_count = r.read_u32::<LittleEndian>()?;
    if agent_count as usize > MAX_AGENTS {
        return Err(HiveError::InvalidState(format!(
            "agent count {agent_count} exceeds capacity"
        )));
    }
    let mut agents = Vec::with_capacity(agent_count as usize);
    for _ in 0..agent_count {
        agents.push(read_agent(&mut r)?);
    }

    let signature_count = r.read_i32::<LittleEndian>()?;
    if signature_count < 0 || signature_count as usize > MAX_SIGNATURES {
        return Err(HiveError::InvalidState(format!(
            "signature count {signature_count} out of range"
        )));
    }
    let mut signatures = Vec::with_capacity(signature_count as usize);
    for _ in 0..signature_count {
        signatures.push(read_signature(&mut r)?);
    }

    let stats = read_stats(&mut r)?;
    Ok(Snapshot {
        agents,
        signatures,
        stats,
    })
}

fn write_agent<W: Write>(w: &mut W, agent: &Agent) -> Result<()> {
    w.write_u32::<LittleEndian>(agent.id)?;
    w.write_all(&agent.auth_token)?;
    write_fixed_str(w, &agent.hostname, HOSTNAME_LEN)?;
    write_fixed_str(w, &agent.ip_address, IP_LEN)?;
    write_fixed_str(w, &agent.os_type, OS_TYPE_LEN)?;
    write_fixed_str(w, &agent.os_version, OS_VERSION_LEN)?;
    w.write_u8(agent.version.0)?;
    w.write_u8(agent.version.1)?;
    w.write_u8(agent.version.2)?;
    w.write_u8(agent.status.as_u8())?;
    w.write_u64::<LittleEndian>(agent.capabilities)?;
    w.write_u64::<LittleEndian>(agent.registered_at)?;
    w.write_u64::<LittleEndian>(agent.last_heartbeat)?;
    w.write_u64::<LittleEndian>(agent.threats_detected)?;
    w.write_u64::<LittleEndian>(agent.scans_performed)?;
    w.write_u64::<LittleEndian>(agent.bytes_scanned)?;
    Ok(())
}

fn read_agent<R: Read>(r: &mut R) -> Result<Agent> {
    let id = r.read_u32::<LittleEndian>()?;
    let mut auth_token = [0u8; 32];
    r.read_exact(&mut auth_token)?;
    let hostname = read_fixed_str(r, HOSTNAME_LEN)?;
    let ip_address = read_fixed_str(r, IP_LEN)?;
    let os_type = read_fixed_str(r, OS_TYPE_LEN)?;
    let os_version = read_fixed_str(r, OS_VERSION_LEN)?;
    let version = (r.read_u8()?, r.read_u8()?, r.read_u8()?);
    let status = AgentStatus::from_u8(r.read_u8()?);
    Ok(Agent {
        id,
        auth_token,
        hostname,
        ip_address,
        os_type,
        os_version,
        version,
        status,
        capabilities: r.read_u64::<LittleEndian>()?,
        registered_at: r.read_u64::<LittleEndian>()?,
        last_heartbeat: r.read_u64::<LittleEndian>()?,
        threats_detected: r.read_u64::<LittleEndian>()?,
        scans_performed: r.read_u64::<LittleEndian>()?,
        bytes_scanned: r.read_u64::<LittleEndian>()?,
    })
}

fn write_signature<W: Write>(w: &mut W, sig: &HiveSignature) -> Result<()> {
    w.write_u32::<LittleEndian>(sig.id)?;
    write_fixed_str(w, &sig.pattern, PATTERN_LEN)?;
    w.write_u8(sig.level.as_u8())?;
    w.write_u8(sig.threat_type.as_u8())?;
    w.write_u64::<LittleEndian>(sig.matches)?;
    w.write_u64::<LittleEndian>(sig.added_at)?;
    Ok(())
}

fn read_signature<R: Read>(r: &mut R) -> Result<HiveSignature> {
    Ok(HiveSignature {
        id: r.read_u32::<LittleEndian>()?,
        pattern: read_fixed_str(r, PATTERN_LEN)?,
        level: ThreatLevel::from_u8(r.read_u8()?),
        threat_type: ThreatType::from_u8(r.read_u8()?),
        matches: r.read_u64::<LittleEndian>()?,
        added_at: r.read_u64::<LittleEndian>()?,
    })
}

fn write_stats<W: Write>(w: &mut W, stats: &HiveStats) -> Result<()> {
    w.write_u32::<LittleEndian>(stats.agents_total)?;
    w.write_u32::<LittleEndian>(stats.agents_online)?;
    w.write_u32::<LittleEndian>(stats.agents_offline)?;
    w.write_u32::<LittleEndian>(stats.agents_compromised)?;
    w.write_u64::<LittleEndian>(stats.threats_total)?;
    w.write_u64::<LittleEndian>(stats.threats_critical)?;
    w.write_u64::<LittleEndian>(stats.threats_high)?;
    w.write_u64::<LittleEndian>(stats.threats_medium)?;
    w.write_u64::<LittleEndian>(stats.threats_low)?;
    w.write_u64::<LittleEndian>(stats.signatures_total)?;
    w.write_u64::<LittleEndian>(stats.api_requests)?;
    w.write_u64::<LittleEndian>(stats.start_time)?;
    w.write_u64::<LittleEndian>(stats.last_threat)?;
    Ok(())
}

fn read_stats<R: Read>(r: &mut R) -> Result<HiveStats> {
    Ok(HiveStats {
        agents_total: r.read_u32::<LittleEndian>()?,
        agents_online: r.read_u32::<LittleEndian>()?,
        agents_offline: r.read_u32::<LittleEndian>()?,
        agents_compromised: r.read_u32::<LittleEndian>()?,
        threats_total: r.read_u64::<LittleEndian>()?,
        threats_critical: r.read_u64::<LittleEndian>()?,
        threats_high: r.read_u64::<LittleEndian>()?,
        threats_medium: r.read_u64::<LittleEndian>()?,
        threats_low: r.read_u64::<LittleEndian>()?,
        signatures_total: r.read_u64::<LittleEndian>()?,
        api_requests: r.read_u64::<LittleEndian>()?,
        start_time: r.read_u64::<LittleEndian>()?,
        last_threat: r.read_u64::<LittleEndian>()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threat::ThreatEvent;
    use crate::Hive;

    #[test]
    fn save_load_roundtrip_preserves_active_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.state");

        let hive = Hive::with_defaults();
        let a1 = hive.register_agent("host-a", "10.0.0.1", "linux").unwrap();
        let a2 = hive.register_agent("host-b", "10.0.0.2", "freebsd").unwrap();
        hive.add_signature("bash -i", ThreatLevel::High, ThreatType::Lateral)
            .unwrap();
        hive.add_signature("nc -e", ThreatLevel::Critical, ThreatType::Exfil)
            .unwrap();
        hive.report_threat(ThreatEvent::new(a1, ThreatLevel::High, ThreatType::Lateral, "x"));
        hive.save_state_to(&path).unwrap();

        let restored = Hive::with_defaults();
        restored.load_state_from(&path).unwrap();

        // Agents come back offline with identity intact.
        let r1 = restored.get_agent(a1).unwrap();
        assert_eq!(r1.hostname, "host-a");
        assert_eq!(r1.status, AgentStatus::Offline);
        assert_eq!(
            restored.get_agent(a2).unwrap().auth_token,
            hive.get_agent(a2).unwrap().auth_token
        );

        // Signature set is equal.
        assert_eq!(restored.signatures_snapshot(), hive.signatures_snapshot());

        // Threat/statistics blob survives.
        let stats = restored.stats();
        assert_eq!(stats.threats_total, 1);
        assert_eq!(stats.threats_high, 1);
        assert_eq!(stats.agents_total, 2);
        assert_eq!(stats.agents_offline, 2);
        assert_eq!(stats.agents_online, 0);
    }

    #[test]
    fn bad_magic_is_invalid_state_and_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.state");
        std::fs::write(&path, b"NOPE\x02\x00\x00\x00garbage").unwrap();

        let hive = Hive::with_defaults();
        hive.register_agent("keep-me", "ip", "os").unwrap();
        let err = hive.load_state_from(&path);
        assert!(matches!(err, Err(HiveError::InvalidState(_))));
        assert_eq!(hive.get_agent(1).unwrap().hostname, "keep-me");
    }

    #[test]
    fn wrong_version_is_invalid_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.state");
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(STATE_MAGIC).unwrap();
        buf.write_u32::<LittleEndian>(99).unwrap();
        std::fs::write(&path, &buf).unwrap();

        let hive = Hive::with_defaults();
        assert!(matches!(
            hive.load_state_from(&path),
            Err(HiveError::InvalidState(_))
        ));
    }

    #[test]
    fn truncated_file_is_io_error_and_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.state");
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(STATE_MAGIC).unwrap();
        buf.write_u32::<LittleEndian>(STATE_VERSION).unwrap();
        buf.write_u32::<LittleEndian>(5).unwrap(); // claims 5 agents, has none
        std::fs::write(&path, &buf).unwrap();

        let hive = Hive::with_defaults();
        hive.register_agent("survivor", "ip", "os").unwrap();
        assert!(hive.load_state_from(&path).is_err());
        assert_eq!(hive.get_agent(1).unwrap().hostname, "survivor");
    }

    #[test]
    fn signature_ids_stay_monotonic_after_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.state");

        let hive = Hive::with_defaults();
        hive.add_signature("one", ThreatLevel::Low, ThreatType::Unknown).unwrap();
        let second = hive.add_signature("two", ThreatLevel::Low, ThreatType::Unknown).unwrap();
        hive.save_state_to(&path).unwrap();

        let restored = Hive::with_defaults();
        restored.load_state_from(&path).unwrap();
        let third = restored
            .add_signature("three", ThreatLevel::Low, ThreatType::Unknown)
            .unwrap();
        assert!(third > second);
    }
}
