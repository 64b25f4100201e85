//! Hot-standby protocol: HA peer messages (magic `SHSP`).
//!
//! Three payload families: heartbeats carrying role/state/priority,
//! election votes, and state-change notifications. The election rule lives
//! in the hive crate; this module only moves the bytes.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::frame::{read_fixed_str, write_fixed_str, write_frame, Decoded};
use crate::{magic, ProtoError, Result};

/// Hot-standby protocol version (major 1, minor 0).
pub const VERSION: u16 = 0x0100;

const NODE_ID_LEN: usize = 64;
const REASON_LEN: usize = 128;

/// HSP message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MsgType {
    Heartbeat = 0x01,
    HeartbeatAck = 0x02,
    ElectionStart = 0x10,
    ElectionVote = 0x11,
    ElectionResult = 0x12,
    SyncRequest = 0x20,
    SyncAck = 0x2F,
    StateChange = 0x30,
    Takeover = 0x31,
    Handoff = 0x32,
}

impl MsgType {
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            0x01 => Self::Heartbeat,
            0x02 => Self::HeartbeatAck,
            0x10 => Self::ElectionStart,
            0x11 => Self::ElectionVote,
            0x12 => Self::ElectionResult,
            0x20 => Self::SyncRequest,
            0x2F => Self::SyncAck,
            0x30 => Self::StateChange,
            0x31 => Self::Takeover,
            0x32 => Self::Handoff,
            _ => return None,
        })
    }
}

/// Peer heartbeat: role, state, priority, config version and uptime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatMsg {
    pub role: u32,
    pub state: u32,
    pub priority: u32,
    pub config_version: u64,
    pub uptime_sec: u64,
}

impl HeartbeatMsg {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(28);
        buf.write_u32::<LittleEndian>(self.role)?;
        buf.write_u32::<LittleEndian>(self.state)?;
        buf.write_u32::<LittleEndian>(self.priority)?;
        buf.write_u64::<LittleEndian>(self.config_version)?;
        buf.write_u64::<LittleEndian>(self.uptime_sec)?;
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        ensure_len(payload, 28)?;
        let mut cur = Cursor::new(payload);
        Ok(Self {
            role: cur.read_u32::<LittleEndian>()?,
            state: cur.read_u32::<LittleEndian>()?,
            priority: cur.read_u32::<LittleEndian>()?,
            config_version: cur.read_u64::<LittleEndian>()?,
            uptime_sec: cur.read_u64::<LittleEndian>()?,
        })
    }
}

/// Election vote for a candidate node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteMsg {
    pub candidate_id: String,
    pub priority: u32,
    pub config_version: u64,
}

impl VoteMsg {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(NODE_ID_LEN + 12);
        write_fixed_str(&mut buf, &self.candidate_id, NODE_ID_LEN)?;
        buf.write_u32::<LittleEndian>(self.priority)?;
        buf.write_u64::<LittleEndian>(self.config_version)?;
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        ensure_len(payload, NODE_ID_LEN + 12)?;
        let mut cur = Cursor::new(payload);
        Ok(Self {
            candidate_id: read_fixed_str(&mut cur, NODE_ID_LEN)?,
            priority: cur.read_u32::<LittleEndian>()?,
            config_version: cur.read_u64::<LittleEndian>()?,
        })
    }
}

/// Role/state transition notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChangeMsg {
    pub old_role: u32,
    pub new_role: u32,
    pub old_state: u32,
    pub new_state: u32,
    pub reason: String,
}

impl StateChangeMsg {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(16 + REASON_LEN);
        buf.write_u32::<LittleEndian>(self.old_role)?;
        buf.write_u32::<LittleEndian>(self.new_role)?;
        buf.write_u32::<LittleEndian>(self.old_state)?;
        buf.write_u32::<LittleEndian>(self.new_state)?;
        write_fixed_str(&mut buf, &self.reason, REASON_LEN)?;
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        ensure_len(payload, 16 + REASON_LEN)?;
        let mut cur = Cursor::new(payload);
        Ok(Self {
            old_role: cur.read_u32::<LittleEndian>()?,
            new_role: cur.read_u32::<LittleEndian>()?,
            old_state: cur.read_u32::<LittleEndian>()?,
            new_state: cur.read_u32::<LittleEndian>()?,
            reason: read_fixed_str(&mut cur, REASON_LEN)?,
        })
    }
}

/// Write an HSP frame.
pub fn send<W: Write>(w: &mut W, msg_type: MsgType, sequence: u32, payload: &[u8]) -> Result<()> {
    write_frame(w, magic::HSP, VERSION, msg_type as u16, sequence, payload)
}

/// Read one HSP frame; `None` means the frame belonged to another family.
pub fn recv<R: Read>(r: &mut R) -> Result<Option<(MsgType, u32, Vec<u8>)>> {
    match crate::frame::read_frame(r, magic::HSP, VERSION)? {
        Decoded::Skip => Ok(None),
        Decoded::Frame(header, payload) => {
            let msg_type = MsgType::from_u16(header.msg_type)
                .ok_or_else(|| ProtoError::Parse(format!("unknown msg type {}", header.msg_type)))?;
            Ok(Some((msg_type, header.sequence, payload)))
        }
    }
}

fn ensure_len(payload: &[u8], need: usize) -> Result<()> {
    if payload.len() < need {
        return Err(ProtoError::Truncated {
            need,
            have: payload.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_roundtrip() {
        let hb = HeartbeatMsg {
            role: 1,
            state: 2,
            priority: 100,
            config_version: 42,
            uptime_sec: 3600,
        };
        assert_eq!(HeartbeatMsg::decode(&hb.encode().unwrap()).unwrap(), hb);
    }

    #[test]
    fn vote_roundtrip() {
        let vote = VoteMsg {
            candidate_id: "node-a".into(),
            priority: 200,
            config_version: 7,
        };
        assert_eq!(VoteMsg::decode(&vote.encode().unwrap()).unwrap(), vote);
    }

    #[test]
    fn state_change_roundtrip() {
        let sc = StateChangeMsg {
            old_role: 2,
            new_role: 1,
            old_state: 1,
            new_state: 2,
            reason: "primary heartbeat lost".into(),
        };
        assert_eq!(StateChangeMsg::decode(&sc.encode().unwrap()).unwrap(), sc);
    }

    #[test]
    fn truncated_heartbeat_is_error() {
        assert!(HeartbeatMsg::decode(&[0u8; 10]).is_err());
    }
}
