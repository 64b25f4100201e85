//! Configuration types for the hive.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::HEARTBEAT_TIMEOUT_SECS;

/// Top-level hive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiveConfig {
    /// Operator API port.
    pub api_port: u16,
    /// Fleet (agent) protocol port.
    pub agent_port: u16,
    /// Data directory holding the state snapshot.
    pub data_path: PathBuf,
    /// Seconds without a heartbeat before an agent goes offline.
    pub heartbeat_timeout_secs: u64,
    /// Connect/receive timeout for peer sockets.
    pub network_timeout_secs: u64,
    pub correlation: CorrelationConfig,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            api_port: 9999,
            agent_port: 9998,
            data_path: PathBuf::from("/var/lib/palisade/hive"),
            heartbeat_timeout_secs: HEARTBEAT_TIMEOUT_SECS,
            network_timeout_secs: 5,
            correlation: CorrelationConfig::default(),
        }
    }
}

impl HiveConfig {
    /// Path of the state snapshot file.
    pub fn state_path(&self) -> PathBuf {
        self.data_path.join("hive.state")
    }
}

/// Correlation engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Seconds between correlation passes.
    pub tick_secs: u64,
    /// Look-back window for all detections.
    pub window_secs: u64,
    /// Distinct agents sharing a signature to call it lateral movement.
    pub lateral_threshold: usize,
    /// Connections to one port to call it exfiltration.
    pub exfil_port_threshold: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            tick_secs: 30,
            window_secs: 300,
            lateral_threshold: 3,
            exfil_port_threshold: 5,
        }
    }
}
