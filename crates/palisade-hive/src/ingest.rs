//! # Fleet Ingest
//!
//! Message-level handling for the fleet channel: decoded frames from
//! agents come in, state changes and reply payloads go out. The socket
//! accept loop around this is transport plumbing; everything the protocol
//! *means* happens here.
//!
//! Malformed payloads surface as parse errors so the caller can
//! disconnect the peer; nothing is committed from a bad message.

use palisade_proto::fleet::{
    self, Command, CommandMsg, Heartbeat, MsgType, Register, RegisterAck, SignatureMsg,
    ThreatAck, ThreatReport,
};

use crate::playbook::PlaybookEngine;
use crate::threat::{ResponseAction, ThreatEvent, ThreatLevel, ThreatType};
use crate::{Hive, Result};

/// A reply to send back on the same connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub msg_type: MsgType,
    pub payload: Vec<u8>,
}

/// The response action planned for a reported threat, by severity.
///
/// Playbooks may take further action; this is the immediate answer the
/// reporting agent acts on.
pub fn planned_action(level: ThreatLevel) -> ResponseAction {
    match level {
        ThreatLevel::Critical => ResponseAction::Isolate,
        ThreatLevel::High => ResponseAction::Block,
        ThreatLevel::Medium => ResponseAction::Alert,
        ThreatLevel::Low => ResponseAction::Log,
        ThreatLevel::None => ResponseAction::None,
    }
}

/// Handle one decoded fleet message against the hive.
///
/// Returns the reply to send, when the message type has one.
pub fn handle_message(
    hive: &Hive,
    playbooks: &PlaybookEngine,
    msg_type: MsgType,
    payload: &[u8],
) -> Result<Option<Reply>> {
    match msg_type {
        MsgType::Register => {
            let msg = Register::decode(payload)?;
            let agent_id = hive.register_agent(&msg.hostname, "", &msg.os_type)?;
            let ack = RegisterAck { agent_id };
            Ok(Some(Reply {
                msg_type: MsgType::RegisterAck,
                payload: ack.encode()?,
            }))
        }

        MsgType::Heartbeat => {
            let msg = Heartbeat::decode(payload)?;
            // A heartbeat from an id the hive does not know is noise, not
            // a protocol violation.
            if let Err(err) = hive.heartbeat(msg.agent_id) {
                tracing::debug!(agent = msg.agent_id, ?err, "heartbeat for unknown agent");
            }
            Ok(None)
        }

        MsgType::Threat => {
            let msg = ThreatReport::decode(payload)?;
            let level = ThreatLevel::from_u8(msg.level);
            let mut event = ThreatEvent::new(
                msg.agent_id,
                level,
                ThreatType::from_u8(msg.kind),
                &msg.signature,
            );
            event.context = msg.details;
            event.action = planned_action(level);

            let event_id = hive.report_threat(event.clone());
            event.event_id = event_id;
            playbooks.handle_event(&event, 1);

            let ack = ThreatAck {
                event_id,
                action: planned_action(level).as_u8(),
            };
            Ok(Some(Reply {
                msg_type: MsgType::ThreatAck,
                payload: ack.encode()?,
            }))
        }

        MsgType::Signature => {
            let msg = SignatureMsg::decode(payload)?;
            let level = ThreatLevel::from_u8(msg.severity);
            let kind = ThreatType::from_u8(msg.kind);
            hive.add_signature(&msg.pattern, level, kind)?;
            Ok(None)
        }

        MsgType::GetSignatures => {
            let sigs: Vec<SignatureMsg> = hive
                .signatures_snapshot()
                .into_iter()
                .map(|s| SignatureMsg {
                    source_agent: 0,
                    kind: s.threat_type.as_u8(),
                    severity: s.level.as_u8(),
                    pattern: s.pattern,
                })
                .collect();
            Ok(Some(Reply {
                msg_type: MsgType::Signatures,
                payload: fleet::encode_signature_list(&sigs)?,
            }))
        }

        MsgType::Command => {
            // Commands originate at the hive; an agent sending one back is
            // decoded for the audit trail but otherwise ignored.
            let msg = CommandMsg::decode(payload)?;
            tracing::warn!(command = ?msg.command, "unexpected command from agent");
            Ok(None)
        }

        other => {
            tracing::debug!(msg_type = ?other, "unhandled fleet message");
            Ok(None)
        }
    }
}

/// Build an isolate command for an agent, used by playbook executors that
/// answer correlation findings.
pub fn isolate_command(agent_id: u32) -> CommandMsg {
    CommandMsg {
        command: Command::Isolate,
        args: agent_id.to_le_bytes().to_vec(),
    }
}
