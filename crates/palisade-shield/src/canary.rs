//! # Canary Token Manager
//!
//! Canary tokens are unique markers placed into system context whose
//! appearance in egress traffic indicates a prompt leak. The manager owns
//! the registered tokens and exposes a containment test the pipeline runs
//! on every egress payload.
//!
//! ```text
//! 1. INJECTION   [SYSTEM_CANARY:<token>] + system prompt  ──▶ model
//! 2. MONITORING  model output ──▶ contains any token? ──▶ block
//! ```
//!
//! Inspired by the Rebuff framework's canary scheme
//! (<https://github.com/protectai/rebuff>); tokens are UUID-based so they
//! carry enough entropy that a collision with legitimate output is
//! negligible.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix for generated canary tokens.
///
/// A fixed prefix reveals that canaries are in use; that trade-off is
/// deliberate - an attacker who knows about the canary still cannot filter
/// it out without knowing the random suffix.
const CANARY_PREFIX: &str = "PLSD-CANARY";

/// A registered canary token and its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canary {
    pub token: String,
    pub purpose: String,
    pub created_at: u64,
}

/// Owner of all registered canary tokens.
#[derive(Debug, Default)]
pub struct CanaryManager {
    tokens: Vec<Canary>,
}

impl CanaryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate and register a fresh token; returns the token string for
    /// injection into the protected context.
    pub fn register(&mut self, purpose: &str) -> String {
        let token = format!("{}-{}", CANARY_PREFIX, Uuid::new_v4().as_hyphenated());
        self.register_token(&token, purpose);
        token
    }

    /// Register an externally supplied token (e.g. replicated from a peer).
    ///
    /// Duplicate tokens are ignored; the containment test stays unchanged.
    pub fn register_token(&mut self, token: &str, purpose: &str) {
        if self.tokens.iter().any(|c| c.token == token) {
            return;
        }
        self.tokens.push(Canary {
            token: token.to_string(),
            purpose: purpose.to_string(),
            created_at: now_secs(),
        });
    }

    /// Remove a token by exact value.
    pub fn remove(&mut self, token: &str) -> bool {
        let before = self.tokens.len();
        self.tokens.retain(|c| c.token != token);
        self.tokens.len() != before
    }

    /// Containment test: the first registered token found in `text`.
    pub fn contains(&self, text: &str) -> Option<&Canary> {
        self.tokens.iter().find(|c| text.contains(&c.token))
    }

    /// Wrap a prompt with the given token in the injection format.
    pub fn inject(&self, prompt: &str, token: &str) -> String {
        format!("[SYSTEM_CANARY:{token}]\n{prompt}")
    }

    pub fn tokens(&self) -> &[Canary] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_unique() {
        let mut mgr = CanaryManager::new();
        let t1 = mgr.register("a");
        let t2 = mgr.register("b");
        assert_ne!(t1, t2);
        assert!(t1.starts_with(CANARY_PREFIX));
        assert_eq!(mgr.len(), 2);
    }

    #[test]
    fn containment_finds_registered_token() {
        let mut mgr = CanaryManager::new();
        let token = mgr.register("system prompt");
        let leaked = format!("the instructions mention {token} somewhere");
        assert!(mgr.contains(&leaked).is_some());
        assert!(mgr.contains("clean output").is_none());
    }

    #[test]
    fn partial_token_does_not_match() {
        let mut mgr = CanaryManager::new();
        let token = mgr.register("x");
        let partial = &token[..token.len() - 4];
        assert!(mgr.contains(partial).is_none());
    }

    #[test]
    fn external_tokens_and_duplicates() {
        let mut mgr = CanaryManager::new();
        mgr.register_token("SECRET_CANARY_TOKEN_XYZ", "test");
        mgr.register_token("SECRET_CANARY_TOKEN_XYZ", "test again");
        assert_eq!(mgr.len(), 1);
        assert!(mgr.contains("... SECRET_CANARY_TOKEN_XYZ ...").is_some());
    }

    #[test]
    fn remove_token() {
        let mut mgr = CanaryManager::new();
        let token = mgr.register("x");
        assert!(mgr.remove(&token));
        assert!(!mgr.remove(&token));
        assert!(mgr.contains(&token).is_none());
    }

    #[test]
    fn inject_wraps_prompt() {
        let mut mgr = CanaryManager::new();
        let token = mgr.register("sys");
        let injected = mgr.inject("You are a helpful assistant.", &token);
        assert!(injected.starts_with("[SYSTEM_CANARY:"));
        assert!(injected.contains(&token));
        assert!(injected.ends_with("You are a helpful assistant."));
    }
}
