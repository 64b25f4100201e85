//! State replication protocol (magic `SSRP`).
//!
//! Replication is content-addressed per state type. A sync begins with a
//! request carrying the requester's last known sequence number; the target
//! replies with a stream of delta entries or a full snapshot, terminated by
//! an end marker. A checksum message (seeded FNV-1a over the serialized
//! state) verifies the transfer.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::frame::{write_frame, Decoded};
use crate::{magic, ProtoError, Result};

/// Replication protocol version (major 1, minor 0).
pub const VERSION: u16 = 0x0100;

const MAX_KEY_LEN: usize = 1 << 10;
const MAX_VALUE_LEN: usize = 1 << 16;

/// SRP message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MsgType {
    SyncRequest = 1,
    SyncResponse = 2,
    DeltaUpdate = 3,
    FullState = 4,
    End = 5,
    Checksum = 6,
    Ack = 7,
    Nack = 8,
}

impl MsgType {
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            1 => Self::SyncRequest,
            2 => Self::SyncResponse,
            3 => Self::DeltaUpdate,
            4 => Self::FullState,
            5 => Self::End,
            6 => Self::Checksum,
            7 => Self::Ack,
            8 => Self::Nack,
            _ => return None,
        })
    }
}

/// Replicated state classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateType {
    Sessions = 1,
    Blocklist = 2,
    Rules = 3,
    Zones = 4,
    Canaries = 5,
    Quarantine = 6,
}

impl StateType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Sessions,
            2 => Self::Blocklist,
            3 => Self::Rules,
            4 => Self::Zones,
            5 => Self::Canaries,
            6 => Self::Quarantine,
            _ => return None,
        })
    }

    pub const ALL: [StateType; 6] = [
        StateType::Sessions,
        StateType::Blocklist,
        StateType::Rules,
        StateType::Zones,
        StateType::Canaries,
        StateType::Quarantine,
    ];
}

/// Delta operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeltaOp {
    Add = 0,
    Update = 1,
    Delete = 2,
}

impl DeltaOp {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Add,
            1 => Self::Update,
            2 => Self::Delete,
            _ => return None,
        })
    }
}

/// Sync request: where the requester left off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRequest {
    pub state_type: StateType,
    pub last_known_seq: u64,
    pub full_sync: bool,
}

impl SyncRequest {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(10);
        buf.write_u8(self.state_type as u8)?;
        buf.write_u64::<LittleEndian>(self.last_known_seq)?;
        buf.write_u8(self.full_sync as u8)?;
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        ensure_len(payload, 10)?;
        let mut cur = Cursor::new(payload);
        let raw = cur.read_u8()?;
        let state_type = StateType::from_u8(raw)
            .ok_or_else(|| ProtoError::Parse(format!("unknown state type {raw}")))?;
        Ok(Self {
            state_type,
            last_known_seq: cur.read_u64::<LittleEndian>()?,
            full_sync: cur.read_u8()? != 0,
        })
    }
}

/// One replicated mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaEntry {
    pub op: DeltaOp,
    pub state_type: StateType,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl DeltaEntry {
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.key.len() > MAX_KEY_LEN {
            return Err(ProtoError::TooLarge {
                field: "key",
                len: self.key.len(),
                max: MAX_KEY_LEN,
            });
        }
        if self.value.len() > MAX_VALUE_LEN {
            return Err(ProtoError::TooLarge {
                field: "value",
                len: self.value.len(),
                max: MAX_VALUE_LEN,
            });
        }
        let mut buf = Vec::with_capacity(8 + self.key.len() + self.value.len());
        buf.write_u8(self.op as u8)?;
        buf.write_u8(self.state_type as u8)?;
        buf.write_u16::<LittleEndian>(self.key.len() as u16)?;
        buf.write_u32::<LittleEndian>(self.value.len() as u32)?;
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        ensure_len(payload, 8)?;
        let mut cur = Cursor::new(payload);
        let op_raw = cur.read_u8()?;
        let op = DeltaOp::from_u8(op_raw)
            .ok_or_else(|| ProtoError::Parse(format!("unknown delta op {op_raw}")))?;
        let st_raw = cur.read_u8()?;
        let state_type = StateType::from_u8(st_raw)
            .ok_or_else(|| ProtoError::Parse(format!("unknown state type {st_raw}")))?;
        let key_len = cur.read_u16::<LittleEndian>()? as usize;
        let value_len = cur.read_u32::<LittleEndian>()? as usize;
        if key_len > MAX_KEY_LEN || value_len > MAX_VALUE_LEN {
            return Err(ProtoError::Parse("delta entry length out of range".into()));
        }
        ensure_len(payload, 8 + key_len + value_len)?;
        let mut key = vec![0u8; key_len];
        cur.read_exact(&mut key)?;
        let mut value = vec![0u8; value_len];
        cur.read_exact(&mut value)?;
        Ok(Self {
            op,
            state_type,
            key,
            value,
        })
    }
}

/// Checksum message: entry count plus the seeded FNV-1a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumMsg {
    pub state_type: StateType,
    pub entry_count: u64,
    pub checksum: u64,
}

impl ChecksumMsg {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(17);
        buf.write_u8(self.state_type as u8)?;
        buf.write_u64::<LittleEndian>(self.entry_count)?;
        buf.write_u64::<LittleEndian>(self.checksum)?;
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        ensure_len(payload, 17)?;
        let mut cur = Cursor::new(payload);
        let raw = cur.read_u8()?;
        let state_type = StateType::from_u8(raw)
            .ok_or_else(|| ProtoError::Parse(format!("unknown state type {raw}")))?;
        Ok(Self {
            state_type,
            entry_count: cur.read_u64::<LittleEndian>()?,
            checksum: cur.read_u64::<LittleEndian>()?,
        })
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over `data`, seeded with the state-type byte so identical bytes
/// in different state classes never collide to the same digest.
pub fn checksum(state_type: StateType, data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    hash ^= state_type as u8 as u64;
    hash = hash.wrapping_mul(FNV_PRIME);
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Write an SRP frame.
pub fn send<W: Write>(w: &mut W, msg_type: MsgType, sequence: u32, payload: &[u8]) -> Result<()> {
    write_frame(w, magic::SRP, VERSION, msg_type as u16, sequence, payload)
}

/// Read one SRP frame; `None` means the frame belonged to another family.
pub fn recv<R: Read>(r: &mut R) -> Result<Option<(MsgType, u32, Vec<u8>)>> {
    match crate::frame::read_frame(r, magic::SRP, VERSION)? {
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
