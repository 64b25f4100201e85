//! # State Replication
//!
//! Content-addressed replication log per state type. Mutations are
//! recorded as sequenced deltas; a peer syncing from its last known
//! sequence gets the missing deltas, or a full snapshot when its sequence
//! has aged out of the retained window. Transfers are verified with the
//! seeded FNV-1a checksum from `palisade_proto::srp`.
//!
//! A sync that fails mid-stream commits nothing: the receiving side
//! applies deltas to a staging copy and installs it only after the end
//! marker and checksum verify.

use std::collections::HashMap;
use std::sync::Mutex;

use palisade_proto::srp::{checksum, DeltaEntry, DeltaOp, StateType};

/// Deltas retained per state type before a peer is forced to full sync.
pub const RETAINED_DELTAS: usize = 4096;

/// One recorded mutation with its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedDelta {
    pub seq: u64,
    pub entry: DeltaEntry,
}

/// What a sync responder sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPlan {
    /// Peer is current.
    UpToDate,
    /// The deltas after the peer's last known sequence.
    Deltas(Vec<SequencedDelta>),
    /// Peer is too far behind; ship the whole key/value state.
    Full(Vec<(Vec<u8>, Vec<u8>)>),
}

#[derive(Default)]
struct TypeLog {
    seq: u64,
    deltas: Vec<SequencedDelta>,
    /// Current materialised state.
    state: HashMap<Vec<u8>, Vec<u8>>,
}

/// The replication log for all state types.
pub struct ReplicationLog {
    logs: Mutex<HashMap<StateType, TypeLog>>,
}

impl ReplicationLog {
    pub fn new() -> Self {
        Self {
            logs: Mutex::new(HashMap::new()),
        }
    }

    /// Record a mutation; returns its sequence number (per state type,
    /// strictly increasing).
    pub fn record(&self, state_type: StateType, op: DeltaOp, key: &[u8], value: &[u8]) -> u64 {
        let mut logs = self.logs.lock().expect("replication lock");
        let log = logs.entry(state_type).or_default();
        log.seq += 1;
        let seq = log.seq;

        match op {
            DeltaOp::Add | DeltaOp::Update => {
                log.state.insert(key.to_vec(), value.to_vec());
            }
            DeltaOp::Delete => {
                log.state.remove(key);
            }
        }

        log.deltas.push(SequencedDelta {
            seq,
            entry: DeltaEntry {
                op,
                state_type,
                key: key.to_vec(),
                value: value.to_vec(),
            },
        });
        if log.deltas.len() > RETAINED_DELTAS {
            log.deltas.remove(0);
        }
        seq
    }

    /// Latest sequence for a state type (0 when untouched).
    pub fn sequence(&self, state_type: StateType) -> u64 {
        self.logs
            .lock()
            .expect("replication lock")
            .get(&state_type)
            .map(|l| l.seq)
            .unwrap_or(0)
    }

    /// Plan a sync for a peer that has applied everything up to
    /// `last_known_seq`.
    pub fn sync_from(&self, state_type: StateType, last_known_seq: u64) -> SyncPlan {
        let logs = self.logs.lock().expect("replication lock");
        let Some(log) = logs.get(&state_type) else {
            return SyncPlan::UpToDate;
        };
        if last_known_seq >= log.seq {
            return SyncPlan::UpToDate;
        }
        // The peer needs deltas we no longer retain: full sync.
        let oldest_retained = log.deltas.first().map(|d| d.seq).unwrap_or(log.seq + 1);
        if last_known_seq + 1 < oldest_retained {
            let mut entries: Vec<(Vec<u8>, Vec<u8>)> = log
                .state
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            entries.sort();
            return SyncPlan::Full(entries);
        }
        SyncPlan::Deltas(
            log.deltas
                .iter()
                .filter(|d| d.seq > last_known_seq)
                .cloned()
                .collect(),
        )
    }

    /// Checksum of the materialised state for transfer verification.
    pub fn state_checksum(&self, state_type: StateType) -> (u64, u64) {
        let logs = self.logs.lock().expect("replication lock");
        let Some(log) = logs.get(&state_type) else {
            return (0, checksum(state_type, &[]));
        };
        let mut entries: Vec<(&Vec<u8>, &Vec<u8>)> = log.state.iter().collect();
        entries.sort();
        let mut buf = Vec::new();
        for (k, v) in &entries {
            buf.extend_from_slice(&(k.len() as u32).to_le_bytes());
            buf.extend_from_slice(k);
            buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
            buf.extend_from_slice(v);
        }
        (log.state.len() as u64, checksum(state_type, &buf))
    }

    /// Apply a full snapshot received from a peer (replaces the state and
    /// resets the delta window to the given sequence).
    pub fn install_full(&self, state_type: StateType, entries: Vec<(Vec<u8>, Vec<u8>)>, seq: u64) {
        let mut logs = self.logs.lock().expect("replication lock");
        let log = logs.entry(state_type).or_default();
        log.state = entries.into_iter().collect();
        log.deltas.clear();
        log.seq = seq;
    }
}

impl Default for ReplicationLog {
    fn default() -> Self {
        Self::new()
    }
}
