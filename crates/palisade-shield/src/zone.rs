//! # Zone Registry
//!
//! A zone is a named trust boundary binding configuration - ACLs, policy,
//! trust level - to an AI-capable endpoint. The registry owns every zone;
//! callers work with borrowed handles valid until the zone is removed.

use serde::{Deserialize, Serialize};

use crate::matcher::Direction;
use crate::{Result, ShieldError};

/// Maximum zone name length in bytes.
pub const MAX_ZONE_NAME: usize = 63;

/// Kind of endpoint a zone fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ZoneType {
    #[default]
    Unknown,
    Llm,
    Rag,
    Agent,
    Tool,
    Mcp,
    Api,
    Custom,
}

/// A registered zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: u32,
    pub name: String,
    pub zone_type: ZoneType,
    pub provider: Option<String>,
    pub description: Option<String>,
    /// Trust level 0 (hostile) to 10 (fully trusted).
    pub trust_level: u8,
    pub enabled: bool,
    /// Ingress access-list number (0 = none bound).
    pub in_acl: u32,
    /// Egress access-list number (0 = none bound).
    pub out_acl: u32,
    /// Gate for the pipeline's semantic analysis step.
    pub semantic_enabled: bool,

    // Per-direction counters.
    pub requests_in: u64,
    pub requests_out: u64,
    pub blocked_in: u64,
    pub blocked_out: u64,
}

impl Zone {
    /// ACL bound for the given direction.
    pub fn acl_for(&self, direction: Direction) -> u32 {
        match direction {
            Direction::Output => self.out_acl,
            _ => self.in_acl,
        }
    }

    /// Bump the request counter for `direction`, and the blocked counter
    /// when the request was denied.
    pub fn count_request(&mut self, direction: Direction, blocked: bool) {
        match direction {
            Direction::Output => {
                self.requests_out += 1;
                if blocked {
                    self.blocked_out += 1;
                }
            }
            _ => {
                self.requests_in += 1;
                if blocked {
                    self.blocked_in += 1;
                }
            }
        }
    }

    /// Zero all four counters as a group.
    pub fn reset_stats(&mut self) {
        self.requests_in = 0;
        self.requests_out = 0;
        self.blocked_in = 0;
        self.blocked_out = 0;
    }
}

/// Owner of all zones; ids are assigned monotonically and never reused.
#[derive(Debug, Default)]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
    next_id: u32,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self {
            zones: Vec::new(),
            next_id: 1,
        }
    }

    /// Create a zone. Fails with `Exists` on a duplicate name and
    /// `InvalidInput` on an empty or over-long name.
    pub fn create(&mut self, name: &str, zone_type: ZoneType) -> Result<&mut Zone> {
        if name.is_empty() || name.len() > MAX_ZONE_NAME {
            return Err(ShieldError::InvalidInput(format!(
                "zone name must be 1..={MAX_ZONE_NAME} bytes"
            )));
        }
        if self.zones.iter().any(|z| z.name == name) {
            return Err(ShieldError::Exists(format!("zone '{name}'")));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.zones.push(Zone {
            id,
            name: name.to_string(),
            zone_type,
            provider: None,
            description: None,
            trust_level: 0,
            enabled: true,
            in_acl: 0,
            out_acl: 0,
            semantic_enabled: false,
            requests_in: 0,
            requests_out: 0,
            blocked_in: 0,
            blocked_out: 0,
        });
        tracing::info!(zone = name, id, "zone created");
        Ok(self.zones.last_mut().expect("just pushed"))
    }

    /// Remove a zone by name.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let before = self.zones.len();
        self.zones.retain(|z| z.name != name);
        if self.zones.len() == before {
            return Err(ShieldError::NotFound(format!("zone '{name}'")));
        }
        tracing::info!(zone = name, "zone removed");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Zone> {
        self.zones.iter_mut().find(|z| z.name == name)
    }

    pub fn get_by_id(&self, id: u32) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
