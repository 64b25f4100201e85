//! Threat event model: levels, types, response actions and the event
//! record agents report.

use serde::{Deserialize, Serialize};

/// Threat severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum ThreatLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            ThreatLevel::None => 0,
            ThreatLevel::Low => 1,
            ThreatLevel::Medium => 2,
            ThreatLevel::High => 3,
            ThreatLevel::Critical => 4,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ThreatLevel::Low,
            2 => ThreatLevel::Medium,
            3 => ThreatLevel::High,
            4 => ThreatLevel::Critical,
            _ => ThreatLevel::None,
        }
    }
}

/// Threat category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ThreatType {
    #[default]
    Unknown,
    Jailbreak,
    Injection,
    Malware,
    Exfil,
    Lateral,
    Encoding,
}

impl ThreatType {
    pub fn as_u8(self) -> u8 {
        match self {
            ThreatType::Unknown => 0,
            ThreatType::Jailbreak => 1,
            ThreatType::Injection => 2,
            ThreatType::Malware => 3,
            ThreatType::Exfil => 4,
            ThreatType::Lateral => 5,
            ThreatType::Encoding => 6,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ThreatType::Jailbreak,
            2 => ThreatType::Injection,
            3 => ThreatType::Malware,
            4 => ThreatType::Exfil,
            5 => ThreatType::Lateral,
            6 => ThreatType::Encoding,
            _ => ThreatType::Unknown,
        }
    }
}

/// Automated response actions the hive can plan for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ResponseAction {
    #[default]
    None,
    Log,
    Alert,
    Block,
    Isolate,
    Kill,
    Quarantine,
}

impl ResponseAction {
    pub fn as_u8(self) -> u8 {
        match self {
            ResponseAction::None => 0,
            ResponseAction::Log => 1,
            ResponseAction::Alert => 2,
            ResponseAction::Block => 3,
            ResponseAction::Isolate => 4,
            ResponseAction::Kill => 5,
            ResponseAction::Quarantine => 6,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ResponseAction::Log,
            2 => ResponseAction::Alert,
            3 => ResponseAction::Block,
            4 => ResponseAction::Isolate,
            5 => ResponseAction::Kill,
            6 => ResponseAction::Quarantine,
            _ => ResponseAction::None,
        }
    }
}

/// Maximum signature string length in an event.
pub const MAX_EVENT_SIGNATURE: usize = 511;

/// One threat event in the ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ThreatEvent {
    /// Assigned by the hive on report; 0 before.
    pub event_id: u64,
    pub agent_id: u32,
    /// Wall seconds, stamped by the hive on report.
    pub timestamp: u64,
    pub level: ThreatLevel,
    pub threat_type: ThreatType,
    pub signature: String,
    pub context: String,
    pub source_file: Option<String>,
    pub source_line: Option<u32>,
    /// Planned response.
    pub action: ResponseAction,
    pub resolved: bool,
}

impl ThreatEvent {
    /// Minimal event for reporting; the hive stamps id and timestamp.
    pub fn new(agent_id: u32, level: ThreatLevel, threat_type: ThreatType, signature: &str) -> Self {
        let mut signature = signature.to_string();
        signature.truncate(MAX_EVENT_SIGNATURE);
        Self {
            agent_id,
            level,
            threat_type,
            signature,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(ThreatLevel::Critical > ThreatLevel::High);
        assert!(ThreatLevel::Low > ThreatLevel::None);
    }

    #[test]
    fn wire_byte_roundtrip() {
        for level in [
            ThreatLevel::None,
            ThreatLevel::Low,
            ThreatLevel::Medium,
            ThreatLevel::High,
            ThreatLevel::Critical,
        ] {
            assert_eq!(ThreatLevel::from_u8(level.as_u8()), level);
        }
        for t in [
            ThreatType::Unknown,
            ThreatType::Jailbreak,
            ThreatType::Injection,
            ThreatType::Malware,
            ThreatType::Exfil,
            ThreatType::Lateral,
            ThreatType::Encoding,
        ] {
            assert_eq!(ThreatType::from_u8(t.as_u8()), t);
        }
        for a in [
            ResponseAction::None,
            ResponseAction::Log,
            ResponseAction::Alert,
            ResponseAction::Block,
            ResponseAction::Isolate,
            ResponseAction::Kill,
            ResponseAction::Quarantine,
        ] {
            assert_eq!(ResponseAction::from_u8(a.as_u8()), a);
        }
    }

    #[test]
    fn oversized_signature_is_truncated() {
        let event = ThreatEvent::new(1, ThreatLevel::Low, ThreatType::Unknown, &"x".repeat(600));
        assert_eq!(event.signature.len(), MAX_EVENT_SIGNATURE);
    }
}
