//! Agent model: registration record, status lifecycle and capability
//! flags.

use serde::{Deserialize, Serialize};

/// Agent lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AgentStatus {
    #[default]
    Unknown,
    Online,
    Offline,
    Compromised,
    Quarantined,
    Isolated,
}

impl AgentStatus {
    pub fn as_u8(self) -> u8 {
        match self {
            AgentStatus::Unknown => 0,
            AgentStatus::Online => 1,
            AgentStatus::Offline => 2,
            AgentStatus::Compromised => 3,
            AgentStatus::Quarantined => 4,
            AgentStatus::Isolated => 5,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => AgentStatus::Online,
            2 => AgentStatus::Offline,
            3 => AgentStatus::Compromised,
            4 => AgentStatus::Quarantined,
            5 => AgentStatus::Isolated,
            _ => AgentStatus::Unknown,
        }
    }
}

/// Capability flags an agent advertises at registration.
pub mod capability {
    pub const AVX2: u64 = 1 << 0;
    pub const SSE42: u64 = 1 << 1;
    pub const KERNEL_HOOKS: u64 = 1 << 2;
}

/// One registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: u32,
    /// Random token issued at registration; agents present it on the
    /// fleet channel.
    pub auth_token: [u8; 32],
    pub hostname: String,
    pub ip_address: String,
    pub os_type: String,
    pub os_version: String,
    pub version: (u8, u8, u8),
    pub status: AgentStatus,
    pub capabilities: u64,
    /// Wall seconds.
    pub registered_at: u64,
    pub last_heartbeat: u64,

    // Counters.
    pub threats_detected: u64,
    pub scans_performed: u64,
    pub bytes_scanned: u64,
}

impl Agent {
    pub fn has_capability(&self, flag: u64) -> bool {
        self.capabilities & flag != 0
    }

    /// Seconds since the last heartbeat, given the current wall clock.
    pub fn heartbeat_age(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_heartbeat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_byte_roundtrip() {
        for status in [
            AgentStatus::Unknown,
            AgentStatus::Online,
            AgentStatus::Offline,
            AgentStatus::Compromised,
            AgentStatus::Quarantined,
            AgentStatus::Isolated,
        ] {
            assert_eq!(AgentStatus::from_u8(status.as_u8()), status);
        }
    }

    #[test]
    fn capability_flags() {
        let agent = Agent {
            id: 1,
            auth_token: [0; 32],
            hostname: "h".into(),
            ip_address: "127.0.0.1".into(),
            os_type: "linux".into(),
            os_version: "6.1".into(),
            version: (0, 1, 0),
            status: AgentStatus::Online,
            capabilities: capability::AVX2 | capability::KERNEL_HOOKS,
            registered_at: 0,
            last_heartbeat: 0,
            threats_detected: 0,
            scans_performed: 0,
            bytes_scanned: 0,
        };
        assert!(agent.has_capability(capability::AVX2));
        assert!(!agent.has_capability(capability::SSE42));
        assert_eq!(agent.heartbeat_age(100), 100);
    }
}
