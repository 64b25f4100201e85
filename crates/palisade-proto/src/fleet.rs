//! Fleet protocol: hive <-> host agent messages (magic `IMMU`).
//!
//! The fleet channel carries agent registration, liveness, threat reports,
//! signature distribution and hive-issued commands. Payloads are fixed
//! layouts with NUL-padded string fields so a frame can be parsed without
//! lookahead.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::frame::{read_fixed_str, write_fixed_str, write_frame, Decoded};
use crate::{magic, ProtoError, Result};

/// Fleet protocol version (major 1, minor 0).
pub const VERSION: u16 = 0x0100;

const HOSTNAME_LEN: usize = 256;
const OS_TYPE_LEN: usize = 32;
const VERSION_LEN: usize = 16;
const SIGNATURE_LEN: usize = 256;
const DETAILS_LEN: usize = 512;

/// Fleet message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MsgType {
    Register = 1,
    RegisterAck = 2,
    Heartbeat = 3,
    Threat = 4,
    ThreatAck = 5,
    Signature = 6,
    GetSignatures = 7,
    Signatures = 8,
    Command = 9,
    Response = 10,
    Stats = 11,
    Shutdown = 12,
}

impl MsgType {
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            1 => Self::Register,
            2 => Self::RegisterAck,
            3 => Self::Heartbeat,
            4 => Self::Threat,
            5 => Self::ThreatAck,
            6 => Self::Signature,
            7 => Self::GetSignatures,
            8 => Self::Signatures,
            9 => Self::Command,
            10 => Self::Response,
            11 => Self::Stats,
            12 => Self::Shutdown,
            _ => return None,
        })
    }
}

/// Commands the hive can issue to an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    ScanAll = 1,
    ClearMemory = 2,
    UpdatePatterns = 3,
    Isolate = 4,
    Shutdown = 5,
    Restart = 6,
}

impl Command {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::ScanAll,
            2 => Self::ClearMemory,
            3 => Self::UpdatePatterns,
            4 => Self::Isolate,
            5 => Self::Shutdown,
            6 => Self::Restart,
            _ => return None,
        })
    }
}

/// Agent registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub hostname: String,
    pub os_type: String,
    pub version: String,
    pub capabilities: u64,
}

impl Register {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(HOSTNAME_LEN + OS_TYPE_LEN + VERSION_LEN + 8);
        write_fixed_str(&mut buf, &self.hostname, HOSTNAME_LEN)?;
        write_fixed_str(&mut buf, &self.os_type, OS_TYPE_LEN)?;
        write_fixed_str(&mut buf, &self.version, VERSION_LEN)?;
        buf.write_u64::<LittleEndian>(self.capabilities)?;
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let need = HOSTNAME_LEN + OS_TYPE_LEN + VERSION_LEN + 8;
        ensure_len(payload, need)?;
        let mut cur = Cursor::new(payload);
        Ok(Self {
            hostname: read_fixed_str(&mut cur, HOSTNAME_LEN)?,
            os_type: read_fixed_str(&mut cur, OS_TYPE_LEN)?,
            version: read_fixed_str(&mut cur, VERSION_LEN)?,
            capabilities: cur.read_u64::<LittleEndian>()?,
        })
    }
}

/// Registration acknowledgment carrying the assigned agent id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterAck {
    pub agent_id: u32,
}

impl RegisterAck {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(4);
        buf.write_u32::<LittleEndian>(self.agent_id)?;
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        ensure_len(payload, 4)?;
        let mut cur = Cursor::new(payload);
        Ok(Self {
            agent_id: cur.read_u32::<LittleEndian>()?,
        })
    }
}

/// Agent heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub agent_id: u32,
}

impl Heartbeat {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(4);
        buf.write_u32::<LittleEndian>(self.agent_id)?;
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        ensure_len(payload, 4)?;
        let mut cur = Cursor::new(payload);
        Ok(Self {
            agent_id: cur.read_u32::<LittleEndian>()?,
        })
    }
}

/// Threat report from an agent.
///
/// `level` and `kind` mirror the hive's threat enums as raw bytes so the
/// protocol crate stays decoupled from the core types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatReport {
    pub agent_id: u32,
    pub level: u8,
    pub kind: u8,
    pub signature: String,
    pub details: String,
}

impl ThreatReport {
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.signature.len() > SIGNATURE_LEN {
            return Err(ProtoError::TooLarge {
                field: "signature",
                len: self.signature.len(),
                max: SIGNATURE_LEN,
            });
        }
        let mut buf = Vec::with_capacity(4 + 2 + 2 + SIGNATURE_LEN + DETAILS_LEN);
        buf.write_u32::<LittleEndian>(self.agent_id)?;
        buf.write_u8(self.level)?;
        buf.write_u8(self.kind)?;
        buf.write_u16::<LittleEndian>(self.signature.len() as u16)?;
        write_fixed_str(&mut buf, &self.signature, SIGNATURE_LEN)?;
        write_fixed_str(&mut buf, &self.details, DETAILS_LEN)?;
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let need = 4 + 2 + 2 + SIGNATURE_LEN + DETAILS_LEN;
        ensure_len(payload, need)?;
        let mut cur = Cursor::new(payload);
        let agent_id = cur.read_u32::<LittleEndian>()?;
        let level = cur.read_u8()?;
        let kind = cur.read_u8()?;
        let sig_len = cur.read_u16::<LittleEndian>()? as usize;
        if sig_len > SIGNATURE_LEN {
            return Err(ProtoError::Parse("signature length exceeds field".into()));
        }
        let signature = read_fixed_str(&mut cur, SIGNATURE_LEN)?;
        let details = read_fixed_str(&mut cur, DETAILS_LEN)?;
        Ok(Self {
            agent_id,
            level,
            kind,
            signature,
            details,
        })
    }
}

/// Hive acknowledgment of a threat report: assigned event id and the
/// planned response action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreatAck {
    pub event_id: u64,
    pub action: u8,
}

impl ThreatAck {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(9);
        buf.write_u64::<LittleEndian>(self.event_id)?;
        buf.write_u8(self.action)?;
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        ensure_len(payload, 9)?;
        let mut cur = Cursor::new(payload);
        Ok(Self {
            event_id: cur.read_u64::<LittleEndian>()?,
            action: cur.read_u8()?,
        })
    }
}

/// A single distributed signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMsg {
    pub source_agent: u32,
    pub kind: u8,
    pub severity: u8,
    pub pattern: String,
}

impl SignatureMsg {
    /// Encoded size of one signature record.
    pub const WIRE_LEN: usize = 4 + 2 + 2 + SIGNATURE_LEN;

    pub fn encode_into<W: Write>(&self, buf: &mut W) -> Result<()> {
        if self.pattern.len() > SIGNATURE_LEN {
            return Err(ProtoError::TooLarge {
                field: "pattern",
                len: self.pattern.len(),
                max: SIGNATURE_LEN,
            });
        }
        buf.write_u32::<LittleEndian>(self.source_agent)?;
        buf.write_u8(self.kind)?;
        buf.write_u8(self.severity)?;
        buf.write_u16::<LittleEndian>(self.pattern.len() as u16)?;
        write_fixed_str(buf, &self.pattern, SIGNATURE_LEN)?;
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::WIRE_LEN);
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    pub fn decode_from<R: Read>(cur: &mut R) -> Result<Self> {
        let source_agent = cur.read_u32::<LittleEndian>()?;
        let kind = cur.read_u8()?;
        let severity = cur.read_u8()?;
        let pattern_len = cur.read_u16::<LittleEndian>()? as usize;
        if pattern_len > SIGNATURE_LEN {
            return Err(ProtoError::Parse("pattern length exceeds field".into()));
        }
        let pattern = read_fixed_str(cur, SIGNATURE_LEN)?;
        Ok(Self {
            source_agent,
            kind,
            severity,
            pattern,
        })
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        ensure_len(payload, Self::WIRE_LEN)?;
        SignatureMsg::decode_from(&mut Cursor::new(payload))
    }
}

/// Encode a `Signatures` payload: an array of signature records.
pub fn encode_signature_list(sigs: &[SignatureMsg]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(sigs.len() * SignatureMsg::WIRE_LEN);
    for sig in sigs {
        sig.encode_into(&mut buf)?;
    }
    Ok(buf)
}

/// Decode a `Signatures` payload.
pub fn decode_signature_list(payload: &[u8]) -> Result<Vec<SignatureMsg>> {
    if payload.len() % SignatureMsg::WIRE_LEN != 0 {
        return Err(ProtoError::Parse(
            "signature list is not a whole number of records".into(),
        ));
    }
    let mut cur = Cursor::new(payload);
    let mut out = Vec::with_capacity(payload.len() / SignatureMsg::WIRE_LEN);
    for _ in 0..payload.len() / SignatureMsg::WIRE_LEN {
        out.push(SignatureMsg::decode_from(&mut cur)?);
    }
    Ok(out)
}

/// Hive-issued command with a free-form argument blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMsg {
    pub command: Command,
    pub args: Vec<u8>,
}

impl CommandMsg {
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.args.len() > u16::MAX as usize {
            return Err(ProtoError::TooLarge {
                field: "args",
                len: self.args.len(),
                max: u16::MAX as usize,
            });
        }
        let mut buf = Vec::with_capacity(3 + self.args.len());
        buf.write_u8(self.command as u8)?;
        buf.write_u16::<LittleEndian>(self.args.len() as u16)?;
        buf.extend_from_slice(&self.args);
        Ok(buf)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        ensure_len(payload, 3)?;
        let mut cur = Cursor::new(payload);
        let raw = cur.read_u8()?;
        let command =
            Command::from_u8(raw).ok_or_else(|| ProtoError::Parse(format!("unknown command {raw}")))?;
        let arg_len = cur.read_u16::<LittleEndian>()? as usize;
        ensure_len(payload, 3 + arg_len)?;
        let mut args = vec![0u8; arg_len];
        cur.read_exact(&mut args)?;
        Ok(Self { command, args })
    }
}

/// Write a fleet frame with the given message type and payload.
pub fn send<W: Write>(w: &mut W, msg_type: MsgType, sequence: u32, payload: &[u8]) -> Result<()> {
    write_frame(w, magic::FLEET, VERSION, msg_type as u16, sequence, payload)
}

/// Read one fleet frame; returns the message type and raw payload, or
/// `None` when the frame belonged to another protocol family.
pub fn recv<R: Read>(r: &mut R) -> Result<Option<(MsgType, u32, Vec<u8>)>> {
    match crate::frame::read_frame(r, magic::FLEET, VERSION)? {
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
    fn register_roundtrip() {
        let msg = Register {
            hostname: "edge-01.internal".into(),
            os_type: "linux".into(),
            version: "0.1.0".into(),
            capabilities: 0b101,
        };
        let decoded = Register::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn threat_report_roundtrip() {
        let msg = ThreatReport {
            agent_id: 7,
            level: 4,
            kind: 2,
            signature: "exec_from_tmp /tmp/payload".into(),
            details: "caught by inline scanner".into(),
        };
        let decoded = ThreatReport::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn oversized_signature_is_rejected() {
        let msg = ThreatReport {
            agent_id: 1,
            level: 1,
            kind: 1,
            signature: "x".repeat(300),
            details: String::new(),
        };
        assert!(msg.encode().is_err());
    }

    #[test]
    fn signature_list_roundtrip() {
        let sigs = vec![
            SignatureMsg {
                source_agent: 1,
                kind: 2,
                severity: 3,
                pattern: "bash -i".into(),
            },
            SignatureMsg {
                source_agent: 2,
                kind: 4,
                severity: 4,
                pattern: "nc -e /bin/sh".into(),
            },
        ];
        let decoded = decode_signature_list(&encode_signature_list(&sigs).unwrap()).unwrap();
        assert_eq!(decoded, sigs);
    }

    #[test]
    fn ragged_signature_list_is_parse_error() {
        let mut buf = encode_signature_list(&[SignatureMsg {
            source_agent: 1,
            kind: 1,
            severity: 1,
            pattern: "x".into(),
        }])
        .unwrap();
        buf.pop();
        assert!(decode_signature_list(&buf).is_err());
    }

    #[test]
    fn command_roundtrip() {
        let msg = CommandMsg {
            command: Command::Isolate,
            args: b"agent=3".to_vec(),
        };
        let decoded = CommandMsg::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn unknown_command_is_parse_error() {
        let payload = [99u8, 0, 0];
        assert!(CommandMsg::decode(&payload).is_err());
    }

    #[test]
    fn framed_send_recv() {
        let mut buf = Vec::new();
        let ack = ThreatAck {
            event_id: 1_700_000_000_123,
            action: 4,
        };
        send(&mut buf, MsgType::ThreatAck, 5, &ack.encode().unwrap()).unwrap();

        let mut cur = std::io::Cursor::new(buf);
        let (msg_type, seq, payload) = recv(&mut cur).unwrap().unwrap();
        assert_eq!(msg_type, MsgType::ThreatAck);
        assert_eq!(seq, 5);
        assert_eq!(ThreatAck::decode(&payload).unwrap(), ack);
    }
}
