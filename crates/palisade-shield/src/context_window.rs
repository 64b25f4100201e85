//! # Context Window
//!
//! Token-budgeted multi-turn message buffer. The pinned system prompt
//! lives outside the main queue - its tokens always count toward the
//! total but it is never evictable. When an addition would exceed the
//! budget, the oldest unpinned messages are evicted until it fits; if the
//! message alone cannot fit, the add fails and nothing changes.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, ShieldError};

/// Message roles in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One buffered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub tokens: u32,
    pub timestamp: u64,
    pub pinned: bool,
    /// Reserved for importance-aware eviction; FIFO eviction ignores it.
    pub importance: f32,
}

/// Rough token estimate: one token per four bytes, minimum one for
/// non-empty content.
pub fn estimate_tokens(content: &str) -> u32 {
    if content.is_empty() {
        return 0;
    }
    (content.len() as u32).div_ceil(4)
}

/// The token-budgeted window.
#[derive(Debug)]
pub struct ContextWindow {
    messages: VecDeque<Message>,
    system_prompt: Option<Message>,
    total_tokens: u32,
    max_tokens: u32,
    pub messages_added: u64,
    pub messages_evicted: u64,
}

impl ContextWindow {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            messages: VecDeque::new(),
            system_prompt: None,
            total_tokens: 0,
            max_tokens,
            messages_added: 0,
            messages_evicted: 0,
        }
    }

    /// Set or replace the pinned system prompt.
    ///
    /// Fails with `Exhausted` when the prompt alone exceeds the budget.
    pub fn set_system(&mut self, content: &str) -> Result<()> {
        let tokens = estimate_tokens(content);
        if tokens > self.max_tokens {
            return Err(ShieldError::Exhausted("context window".into()));
        }
        let old = self.system_tokens();
        self.system_prompt = Some(Message {
            id: Uuid::new_v4().to_string(),
            role: Role::System,
            content: content.to_string(),
            tokens,
            timestamp: now_secs(),
            pinned: true,
            importance: 1.0,
        });
        self.total_tokens = self.total_tokens - old + tokens;
        self.evict_until_fits(0);
        Ok(())
    }

    /// Append a message, evicting the oldest unpinned messages as needed.
    ///
    /// Fails with `Exhausted` when the message cannot fit even after
    /// evicting everything evictable; the window is left unchanged.
    pub fn add(&mut self, role: Role, content: &str) -> Result<()> {
        let tokens = estimate_tokens(content);
        let pinned_tokens: u32 = self.system_tokens()
            + self
                .messages
                .iter()
                .filter(|m| m.pinned)
                .map(|m| m.tokens)
                .sum::<u32>();
        if pinned_tokens + tokens > self.max_tokens {
            return Err(ShieldError::Exhausted("context window".into()));
        }

        self.evict_until_fits(tokens);

        self.messages.push_back(Message {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            tokens,
            timestamp: now_secs(),
            pinned: false,
            importance: 0.0,
        });
        self.total_tokens += tokens;
        self.messages_added += 1;
        Ok(())
    }

    /// Pin a message by id so eviction skips it.
    pub fn pin(&mut self, id: &str) -> Result<()> {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                m.pinned = true;
                Ok(())
            }
            None => Err(ShieldError::NotFound(format!("message '{id}'"))),
        }
    }

    fn evict_until_fits(&mut self, incoming_tokens: u32) {
        while self.total_tokens + incoming_tokens > self.max_tokens {
            let Some(pos) = self.messages.iter().position(|m| !m.pinned) else {
                break;
            };
            let evicted = self.messages.remove(pos).expect("position exists");
            self.total_tokens -= evicted.tokens;
            self.messages_evicted += 1;
        }
    }

    fn system_tokens(&self) -> u32 {
        self.system_prompt.as_ref().map(|m| m.tokens).unwrap_or(0)
    }

    /// Total tokens currently held, including the system prompt.
    pub fn total_tokens(&self) -> u32 {
        self.total_tokens
    }

    pub fn available_tokens(&self) -> u32 {
        self.max_tokens.saturating_sub(self.total_tokens)
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn system_prompt(&self) -> Option<&Message> {
        self.system_prompt.as_ref()
    }

    /// Messages in order, oldest first (system prompt not included).
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Drop every message except the system prompt.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.total_tokens = self.system_tokens();
    }

    /// Export the window (system prompt first) as a JSON array of
    /// role/content pairs.
    pub fn to_json(&self) -> String {
        let mut items: Vec<serde_json::Value> = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = &self.system_prompt {
            items.push(serde_json::json!({
                "role": system.role,
                "content": system.content,
            }));
        }
        for m in &self.messages {
            items.push(serde_json::json!({
                "role": m.role,
                "content": m.content,
            }));
        }
        serde_json::Value::Array(items).to_string()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
