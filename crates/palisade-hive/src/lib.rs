//! # Palisade Hive - Fleet Correlator and Response Core
//!
//! The Hive aggregates threat reports from a fleet of host agents,
//! correlates them across the fleet, and drives automated response.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             Hive                                 │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  agents (mutex)   threats (mutex, ring)   signatures (rwlock)    │
//! │        │                   │                      │              │
//! │        └──── report ───────┼──────────────────────┘              │
//! │                            ▼                                     │
//! │               ┌─────────────────────────┐                        │
//! │               │  correlator (30s tick)  │──▶ correlation records │
//! │               └─────────────────────────┘                        │
//! │                            │                                     │
//! │               ┌─────────────────────────┐                        │
//! │               │     playbook engine     │──▶ response actions    │
//! │               └─────────────────────────┘                        │
//! │                                                                  │
//! │  scheduler (heartbeat monitor, snapshots)   HA node (elections)  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locking discipline
//!
//! Agents, threats and signatures each have their own lock. When two are
//! required the acquisition order is strictly agents → threats →
//! signatures; helpers take snapshots under their lock and return copies,
//! so no lock is ever held across another acquisition or across I/O.

pub mod agent;
pub mod alert;
pub mod config;
pub mod correlate;
pub mod error;
pub mod ha;
pub mod hive;
pub mod ingest;
pub mod playbook;
pub mod replicate;
pub mod scheduler;
pub mod snapshot;
pub mod threat;

pub use agent::{Agent, AgentStatus};
pub use config::HiveConfig;
pub use correlate::{CorrelationRecord, Correlator};
pub use error::HiveError;
pub use hive::{Hive, HiveStats};
pub use playbook::{Playbook, PlaybookEngine};
pub use threat::{ResponseAction, ThreatEvent, ThreatLevel, ThreatType};

/// Convenience result type for hive operations.
pub type Result<T> = std::result::Result<T, HiveError>;

/// Maximum number of agent slots (slot 0 is reserved and never allocated).
pub const MAX_AGENTS: usize = 1024;

/// Threat ring capacity.
pub const MAX_THREATS: usize = 10_000;

/// Signature table capacity.
pub const MAX_SIGNATURES: usize = 5000;

/// Seconds without a heartbeat before an agent is marked offline.
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 120;
