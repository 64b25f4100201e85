//! # Request Log
//!
//! Structured record of every evaluated request: content length and hash
//! - never content - plus the verdict, scores and latency. Entries land
//! in a bounded in-memory ring with an optional JSON-lines file sink.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::matcher::Direction;
use crate::rule::RuleAction;
use crate::semantic::Intent;
use crate::Result;

/// Default ring capacity.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// One logged request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub id: String,
    pub timestamp: u64,
    pub zone: String,
    pub session_id: Option<String>,
    pub source_ip: Option<String>,
    pub direction: Direction,
    pub content_len: usize,
    /// SHA-256 of the payload, hex-encoded.
    pub content_hash: String,
    pub action: RuleAction,
    pub matched_rule: u32,
    pub reason: String,
    pub threat_score: f64,
    pub latency_us: u64,
    pub intent: Intent,
    pub intent_confidence: f64,
}

impl RequestLogEntry {
    /// Fresh entry with a generated id and the payload hashed.
    pub fn for_payload(zone: &str, direction: Direction, payload: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: now_secs(),
            zone: zone.to_string(),
            session_id: None,
            source_ip: None,
            direction,
            content_len: payload.len(),
            content_hash: hex::encode(Sha256::digest(payload.as_bytes())),
            action: RuleAction::Allow,
            matched_rule: 0,
            reason: String::new(),
            threat_score: 0.0,
            latency_us: 0,
            intent: Intent::Benign,
            intent_confidence: 0.0,
        }
    }
}

/// The bounded log with its optional file sink.
#[derive(Debug)]
pub struct RequestLog {
    entries: VecDeque<RequestLogEntry>,
    max_entries: usize,
    sink: Option<BufWriter<File>>,
    pub total_logged: u64,
}

impl RequestLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries.min(4096)),
            max_entries: max_entries.max(1),
            sink: None,
            total_logged: 0,
        }
    }

    /// Attach a JSON-lines file sink, appending to `path`.
    pub fn with_file_sink(mut self, path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.sink = Some(BufWriter::new(file));
        Ok(self)
    }

    /// Append an entry; the oldest entry drops when the ring is full. Sink
    /// failures are logged and do not affect the ring.
    pub fn log(&mut self, entry: RequestLogEntry) {
        if let Some(sink) = &mut self.sink {
            match serde_json::to_string(&entry) {
                Ok(line) => {
                    if writeln!(sink, "{line}").and_then(|_| sink.flush()).is_err() {
                        tracing::warn!("request log sink write failed");
                    }
                }
                Err(err) => tracing::warn!(?err, "request log entry serialization failed"),
            }
        }
        if self.entries.len() == self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.total_logged += 1;
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &RequestLogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Filter by zone, action and time range; `None` means "any".
    pub fn query(
        &self,
        zone: Option<&str>,
        action: Option<RuleAction>,
        start: Option<u64>,
        end: Option<u64>,
    ) -> Vec<&RequestLogEntry> {
        self.entries
            .iter()
            .filter(|e| zone.map_or(true, |z| e.zone == z))
            .filter(|e| action.map_or(true, |a| e.action == a))
            .filter(|e| start.map_or(true, |s| e.timestamp >= s))
            .filter(|e| end.map_or(true, |t| e.timestamp <= t))
            .collect()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
