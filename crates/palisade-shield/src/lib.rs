//! # Palisade Shield - Request Evaluation Pipeline
//!
//! The Shield inspects requests traversing trust boundaries between a
//! caller and an AI-capable endpoint and maps each one to an action:
//! allow, block, quarantine, analyze, log, redirect, challenge or tarpit.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                            Shield                                 │
//! ├───────────────────────────────────────────────────────────────────┤
//! │                                                                   │
//! │  payload ──▶ sanitise ──▶ decode ──▶ signatures ──▶ rules ──▶     │
//! │              policy ──▶ semantic ──▶ canary ──▶ output filter     │
//! │                                  │                                │
//! │                                  ▼                                │
//! │                              Verdict                              │
//! │                                                                   │
//! │  zone registry ─ ACLs ─ class/policy maps ─ canaries ─ log        │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every step is optional per configuration. The pipeline draws from the
//! zone and rule configuration and emits a deterministic [`Verdict`]: given
//! the same rules, policies, zones and payload bytes, the same action comes
//! out - no clock or randomness influences allow/block.
//!
//! ## Threat Model
//!
//! | Threat | Defense |
//! |--------|---------|
//! | Direct prompt injection | Rule conditions + semantic banks |
//! | Jailbreaks (DAN, role-play) | Semantic banks + keyword bags |
//! | Encoding evasion (base64, hex, rot13, leet) | Sanitiser + encoding detector |
//! | Adversarial suffixes (GCG) | Shannon entropy conditions |
//! | System prompt leaks | Canary tokens in egress |
//! | PII / secret disclosure | Output filter redaction |
//! | Payload replay / mutation | Fingerprint similarity index |
//! | Volumetric / statistical drift | Anomaly detector |
//!
//! ## References
//!
//! - Perez & Ribeiro (2022) - "Ignore This Title and HackAPrompt"
//!   <https://arxiv.org/abs/2311.16119>
//! - Zou et al. (2023) - "Universal and Transferable Adversarial Attacks
//!   on Aligned Language Models" <https://arxiv.org/abs/2307.15043>
//! - Shen et al. (2023) - "Do Anything Now: Characterizing Jailbreak
//!   Prompts" <https://arxiv.org/abs/2308.03825>
//! - OWASP LLM Top 10
//!   <https://owasp.org/www-project-top-10-for-large-language-model-applications/>

pub mod anomaly;
pub mod canary;
pub mod config;
pub mod context_window;
pub mod encoding;
pub mod entropy;
pub mod error;
pub mod fingerprint;
pub mod matcher;
pub mod output_filter;
pub mod pipeline;
pub mod policy;
pub mod request_log;
pub mod rule;
pub mod sanitizer;
pub mod semantic;
pub mod signature;
pub mod zone;

pub use config::ShieldConfig;
pub use error::ShieldError;
pub use matcher::{Direction, MatchCondition};
pub use pipeline::{Shield, Verdict};
pub use rule::RuleAction;
pub use semantic::Intent;
pub use signature::SignatureLevel;
pub use zone::ZoneType;

/// Convenience result type for shield operations.
pub type Result<T> = std::result::Result<T, ShieldError>;
