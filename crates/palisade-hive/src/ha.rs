//! # High Availability
//!
//! Peer roles, heartbeat tracking, elections and state transitions. Wire
//! formats live in `palisade_proto::hsp`; this module owns the rules:
//!
//! The election rule: each node votes for the highest
//! `(priority, config_version, node_id)` tuple it has seen in the current
//! election window, with node-id lexicographic order as the final
//! tiebreak.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use palisade_proto::hsp::{HeartbeatMsg, VoteMsg};

use crate::hive::now_secs;

/// Role of an HA node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaRole {
    Primary,
    Standby,
    Candidate,
}

impl HaRole {
    pub fn as_u32(self) -> u32 {
        match self {
            HaRole::Primary => 1,
            HaRole::Standby => 2,
            HaRole::Candidate => 3,
        }
    }

    pub fn from_u32(v: u32) -> Self {
        match v {
            1 => HaRole::Primary,
            3 => HaRole::Candidate,
            _ => HaRole::Standby,
        }
    }
}

/// Operational state of an HA node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaState {
    Init,
    Syncing,
    Active,
    Failed,
}

impl HaState {
    pub fn as_u32(self) -> u32 {
        match self {
            HaState::Init => 0,
            HaState::Syncing => 1,
            HaState::Active => 2,
            HaState::Failed => 3,
        }
    }

    pub fn from_u32(v: u32) -> Self {
        match v {
            1 => HaState::Syncing,
            2 => HaState::Active,
            3 => HaState::Failed,
            _ => HaState::Init,
        }
    }
}

/// A recorded role/state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub old_role: HaRole,
    pub new_role: HaRole,
    pub old_state: HaState,
    pub new_state: HaState,
    pub reason: String,
    pub at: u64,
}

/// Liveness and election info for one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub node_id: String,
    pub role: HaRole,
    pub state: HaState,
    pub priority: u32,
    pub config_version: u64,
    pub last_heartbeat: u64,
}

/// One HA node's view of the cluster.
pub struct HaNode {
    pub node_id: String,
    pub priority: u32,
    pub config_version: u64,
    role: HaRole,
    state: HaState,
    peers: HashMap<String, PeerInfo>,
    transitions: Vec<StateChange>,
    started_at: u64,
}

impl HaNode {
    pub fn new(node_id: &str, priority: u32, config_version: u64) -> Self {
        Self {
            node_id: node_id.to_string(),
            priority,
            config_version,
            role: HaRole::Standby,
            state: HaState::Init,
            peers: HashMap::new(),
            transitions: Vec::new(),
            started_at: now_secs(),
        }
    }

    pub fn role(&self) -> HaRole {
        self.role
    }

    pub fn state(&self) -> HaState {
        self.state
    }

    pub fn transitions(&self) -> &[StateChange] {
        &self.transitions
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerInfo> {
        self.peers.values()
    }

    /// The heartbeat payload this node broadcasts.
    pub fn heartbeat(&self) -> HeartbeatMsg {
        HeartbeatMsg {
            role: self.role.as_u32(),
            state: self.state.as_u32(),
            priority: self.priority,
            config_version: self.config_version,
            uptime_sec: now_secs().saturating_sub(self.started_at),
        }
    }

    /// Record a heartbeat received from a peer.
    pub fn record_heartbeat(&mut self, node_id: &str, hb: &HeartbeatMsg) {
        self.peers.insert(
            node_id.to_string(),
            PeerInfo {
                node_id: node_id.to_string(),
                role: HaRole::from_u32(hb.role),
                state: HaState::from_u32(hb.state),
                priority: hb.priority,
                config_version: hb.config_version,
                last_heartbeat: now_secs(),
            },
        );
    }

    /// Ids of peers whose heartbeat age exceeds `timeout_secs`.
    pub fn stale_peers(&self, timeout_secs: u64) -> Vec<String> {
        let now = now_secs();
        self.peers
            .values()
            .filter(|p| now.saturating_sub(p.last_heartbeat) > timeout_secs)
            .map(|p| p.node_id.clone())
            .collect()
    }

    /// `true` when some live peer claims the primary role.
    pub fn primary_alive(&self, timeout_secs: u64) -> bool {
        let now = now_secs();
        self.peers.values().any(|p| {
            p.role == HaRole::Primary && now.saturating_sub(p.last_heartbeat) <= timeout_secs
        })
    }

    /// This node's vote: the best candidate it knows of, itself included.
    pub fn cast_vote(&self) -> VoteMsg {
        let mut best = VoteMsg {
            candidate_id: self.node_id.clone(),
            priority: self.priority,
            config_version: self.config_version,
        };
        for peer in self.peers.values() {
            let candidate = VoteMsg {
                candidate_id: peer.node_id.clone(),
                priority: peer.priority,
                config_version: peer.config_version,
            };
            if vote_key(&candidate) > vote_key(&best) {
                best = candidate;
            }
        }
        best
    }

    /// Apply the transition chosen by an election result.
    pub fn apply_election(&mut self, winner: &str, reason: &str) {
        let new_role = if winner == self.node_id {
            HaRole::Primary
        } else {
            HaRole::Standby
        };
        let new_state = HaState::Active;
        self.transition(new_role, new_state, reason);
    }

    /// Record a role/state transition.
    pub fn transition(&mut self, new_role: HaRole, new_state: HaState, reason: &str) {
        if new_role == self.role && new_state == self.state {
            return;
        }
        let change = StateChange {
            old_role: self.role,
            new_role,
            old_state: self.state,
            new_state,
            reason: reason.to_string(),
            at: now_secs(),
        };
        tracing::info!(
            node = %self.node_id,
            from = ?(change.old_role, change.old_state),
            to = ?(change.new_role, change.new_state),
            reason,
            "ha transition"
        );
        self.role = new_role;
        self.state = new_state;
        self.transitions.push(change);
    }
}

fn vote_key(vote: &VoteMsg) -> (u32, u64, String) {
    (vote.priority, vote.config_version, vote.candidate_id.clone())
}

/// Decide an election from the collected votes: the highest
/// `(priority, config_version, node_id)` tuple wins; ties on priority and
/// config version fall back to lexicographic node-id order. Empty vote
/// sets have no winner.
pub fn decide_election(votes: &[VoteMsg]) -> Option<String> {
    votes
        .iter()
        .max_by_key(|v| vote_key(v))
        .map(|v| v.candidate_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(id: &str, priority: u32, config_version: u64) -> VoteMsg {
        VoteMsg {
            candidate_id: id.to_string(),
            priority,
            config_version,
        }
    }

    #[test]
    fn highest_priority_wins() {
        let votes = [vote("a", 100, 1), vote("b", 200, 1), vote("c", 150, 9)];
        assert_eq!(decide_election(&votes).unwrap(), "b");
    }

    #[test]
    fn config_version_breaks_priority_ties() {
        let votes = [vote("a", 100, 5), vote("b", 100, 7)];
        assert_eq!(decide_election(&votes).unwrap(), "b");
    }

    #[test]
    fn node_id_breaks_full_ties() {
        let votes = [vote("alpha", 100, 5), vote("beta", 100, 5)];
        assert_eq!(decide_election(&votes).unwrap(), "beta");
    }

    #[test]
    fn empty_election_has_no_winner() {
        assert!(decide_election(&[]).is_none());
    }

    #[test]
    fn node_votes_for_best_known_candidate() {
        let mut node = HaNode::new("node-a", 100, 1);
        node.record_heartbeat(
            "node-b",
            &HeartbeatMsg {
                role: HaRole::Standby.as_u32(),
                state: HaState::Active.as_u32(),
                priority: 200,
                config_version: 1,
                uptime_sec: 10,
            },
        );
        let vote = node.cast_vote();
        assert_eq!(vote.candidate_id, "node-b");
    }

    #[test]
    fn node_votes_for_itself_when_best() {
        let node = HaNode::new("node-a", 500, 9);
        assert_eq!(node.cast_vote().candidate_id, "node-a");
    }

    #[test]
    fn winning_election_promotes_to_primary() {
        let mut node = HaNode::new("node-a", 100, 1);
        node.apply_election("node-a", "election won");
        assert_eq!(node.role(), HaRole::Primary);
        assert_eq!(node.state(), HaState::Active);
        assert_eq!(node.transitions().len(), 1);
        let change = &node.transitions()[0];
        assert_eq!(change.old_role, HaRole::Standby);
        assert_eq!(change.new_role, HaRole::Primary);
        assert_eq!(change.reason, "election won");
    }

    #[test]
    fn losing_election_stays_standby_active() {
        let mut node = HaNode::new("node-a", 100, 1);
        node.apply_election("node-b", "lost");
        assert_eq!(node.role(), HaRole::Standby);
        assert_eq!(node.state(), HaState::Active);
    }

    #[test]
    fn no_op_transition_records_nothing() {
        let mut node = HaNode::new("node-a", 100, 1);
        node.transition(HaRole::Standby, HaState::Init, "same");
        assert!(node.transitions().is_empty());
    }

    #[test]
    fn primary_liveness_tracking() {
        let mut node = HaNode::new("node-a", 100, 1);
        assert!(!node.primary_alive(120));
        node.record_heartbeat(
            "node-p",
            &HeartbeatMsg {
                role: HaRole::Primary.as_u32(),
                state: HaState::Active.as_u32(),
                priority: 300,
                config_version: 2,
                uptime_sec: 99,
            },
        );
        assert!(node.primary_alive(120));
        assert!(node.stale_peers(120).is_empty());
    }

    #[test]
    fn role_state_u32_roundtrip() {
        for role in [HaRole::Primary, HaRole::Standby, HaRole::Candidate] {
            assert_eq!(HaRole::from_u32(role.as_u32()), role);
        }
        for state in [HaState::Init, HaState::Syncing, HaState::Active, HaState::Failed] {
            assert_eq!(HaState::from_u32(state.as_u32()), state);
        }
    }
}
