//! # The Shield Facade
//!
//! [`Shield`] owns every component - zone registry, rule engine, policy
//! engine, signature table, semantic detector, canary manager, output
//! filter and request log - and orchestrates them into the evaluation
//! pipeline:
//!
//! 1. zone lookup (disabled zones allow, but count)
//! 2. sanitise
//! 3. encoding detection
//! 4. signature scan (critical hits can short-circuit to block)
//! 5. rule evaluation (first match by rule number)
//! 6. policy evaluation (override only when strictly stricter)
//! 7. semantic analysis (per-zone opt-in; promotes to analyze/block)
//! 8. canary check (egress only)
//! 9. output filter (egress only, unless blocked)
//! 10. counters + request log
//!
//! The verdict is deterministic given the configuration and the payload
//! bytes; the clock only stamps timestamps and latency, never the
//! decision. Patterns are evaluated against both the original and the
//! peeled form, so rules bound to either representation hit.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::canary::CanaryManager;
use crate::config::ShieldConfig;
use crate::context_window::ContextWindow;
use crate::encoding;
use crate::matcher::{Direction, MatchCtx};
use crate::output_filter::OutputFilter;
use crate::policy::PolicyEngine;
use crate::request_log::{RequestLog, RequestLogEntry};
use crate::rule::{RuleAction, RuleEngine};
use crate::sanitizer;
use crate::semantic::{Intent, SemanticDetector};
use crate::signature::{SignatureLevel, SignatureStore};
use crate::zone::ZoneRegistry;
use crate::{Result, ShieldError};

/// The outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub action: RuleAction,
    /// Matched rule number; 0 when no rule matched.
    pub matched_rule: u32,
    /// Winning policy class, when a service policy contributed.
    pub matched_class: Option<String>,
    pub reason: String,
    /// Threat severity attached to the verdict.
    pub level: SignatureLevel,
    /// Aggregate threat score in [0, 1].
    pub threat_score: f64,
    pub intent: Intent,
    pub intent_confidence: f64,
    pub encoding_detected: bool,
    pub latency_us: u64,
    /// Redactions applied by the output filter.
    pub redactions: usize,
    /// Scrubbed payload, present when the output filter changed it.
    pub filtered_payload: Option<String>,
}

impl Verdict {
    fn allow(reason: &str) -> Self {
        Self {
            action: RuleAction::Allow,
            matched_rule: 0,
            matched_class: None,
            reason: reason.to_string(),
            level: SignatureLevel::None,
            threat_score: 0.0,
            intent: Intent::Benign,
            intent_confidence: 0.0,
            encoding_detected: false,
            latency_us: 0,
            redactions: 0,
            filtered_payload: None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.action == RuleAction::Block
    }

    pub fn is_allowed(&self) -> bool {
        self.action == RuleAction::Allow
    }
}

/// The Shield: component owner and pipeline orchestrator.
pub struct Shield {
    config: ShieldConfig,
    zones: ZoneRegistry,
    rules: RuleEngine,
    policies: PolicyEngine,
    signatures: SignatureStore,
    semantic: SemanticDetector,
    canaries: CanaryManager,
    output_filter: OutputFilter,
    context: ContextWindow,
    request_log: RequestLog,
}

impl Shield {
    /// Build a shield from configuration.
    ///
    /// Fails only when the request-log file sink cannot be opened.
    pub fn new(config: ShieldConfig) -> Result<Self> {
        let mut request_log = RequestLog::new(config.request_log.max_entries);
        if let Some(path) = &config.request_log.file {
            request_log = request_log.with_file_sink(path)?;
        }
        Ok(Self {
            config,
            zones: ZoneRegistry::new(),
            rules: RuleEngine::new(),
            policies: PolicyEngine::new(),
            signatures: SignatureStore::new(),
            semantic: SemanticDetector::new(),
            canaries: CanaryManager::new(),
            output_filter: OutputFilter::new(),
            context: ContextWindow::new(8192),
            request_log,
        })
    }

    /// Shield with all defaults.
    pub fn with_defaults() -> Self {
        Self::new(ShieldConfig::new()).expect("default config has no file sink")
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ShieldConfig {
        &mut self.config
    }

    pub fn zones(&self) -> &ZoneRegistry {
        &self.zones
    }

    pub fn zones_mut(&mut self) -> &mut ZoneRegistry {
        &mut self.zones
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut RuleEngine {
        &mut self.rules
    }

    pub fn policies_mut(&mut self) -> &mut PolicyEngine {
        &mut self.policies
    }

    pub fn signatures(&self) -> &SignatureStore {
        &self.signatures
    }

    pub fn signatures_mut(&mut self) -> &mut SignatureStore {
        &mut self.signatures
    }

    pub fn canaries(&self) -> &CanaryManager {
        &self.canaries
    }

    pub fn canaries_mut(&mut self) -> &mut CanaryManager {
        &mut self.canaries
    }

    pub fn output_filter_mut(&mut self) -> &mut OutputFilter {
        &mut self.output_filter
    }

    pub fn context_mut(&mut self) -> &mut ContextWindow {
        &mut self.context
    }

    pub fn request_log(&self) -> &RequestLog {
        &self.request_log
    }

    /// Evaluate a payload crossing the given zone in the given direction.
    ///
    /// Fails with `NotFound` when the zone does not exist; every other
    /// sub-component failure is folded into the verdict.
    pub fn evaluate(
        &mut self,
        payload: &str,
        zone_name: &str,
        direction: Direction,
    ) -> Result<Verdict> {
        let started = Instant::now();

        // Step 1: zone lookup.
        let zone = self
            .zones
            .get(zone_name)
            .ok_or_else(|| ShieldError::NotFound(format!("zone '{zone_name}'")))?;
        let zone_type = zone.zone_type;
        let zone_enabled = zone.enabled;
        let semantic_enabled = zone.semantic_enabled;
        let acl = zone.acl_for(direction);

        if !zone_enabled {
            let mut verdict = Verdict::allow("zone disabled");
            verdict.latency_us = started.elapsed().as_micros() as u64;
            self.finish(payload, zone_name, direction, &verdict);
            return Ok(verdict);
        }

        // Step 2: sanitise. The original form stays in play alongside the
        // peeled form.
        let sanitized = sanitizer::sanitize(&self.config.sanitizer, payload);
        let peeled = sanitized.text.as_str();
        let changed = peeled != payload;

        // Step 3: encoding detection over the original bytes.
        let encoding_detected = if self.config.detect_encoding {
            encoding::detect(payload).detected() || sanitized.layers_decoded > 0
        } else {
            false
        };

        let mut verdict = Verdict::allow("default allow");
        verdict.encoding_detected = encoding_detected;

        // Step 4: signature scan. Both forms are scanned in one pass so a
        // signature hits whichever representation it was written for.
        if self.config.signatures.enabled {
            let scan_text = if changed {
                format!("{payload}\n{peeled}")
            } else {
                payload.to_string()
            };
            let hits = self.signatures.scan(&scan_text);
            for hit in &hits {
                verdict.threat_score = verdict.threat_score.max(hit.level.weight());
                if hit.level > verdict.level {
                    verdict.level = hit.level;
                }
            }
            if self.config.signatures.block_on_critical {
                if let Some(critical) = hits
                    .iter()
                    .find(|h| h.level == SignatureLevel::Critical)
                {
                    verdict.action = RuleAction::Block;
                    verdict.reason = format!("signature {}", critical.id);
                    verdict.level = SignatureLevel::Critical;
                    verdict.latency_us = started.elapsed().as_micros() as u64;
                    self.finish(payload, zone_name, direction, &verdict);
                    return Ok(verdict);
                }
            }
        }

        // Step 5: rule evaluation, original form first.
        let ctx = MatchCtx {
            canaries: Some(&self.canaries),
        };
        let mut rule_verdict =
            self.rules
                .evaluate(acl, direction, zone_type, zone_name, payload, ctx);
        if rule_verdict.matched_rule == 0 && changed {
            rule_verdict = self
                .rules
                .evaluate(acl, direction, zone_type, zone_name, peeled, ctx);
        }
        verdict.action = rule_verdict.action;
        verdict.matched_rule = rule_verdict.matched_rule;
        if rule_verdict.matched_rule != 0 {
            verdict.reason = rule_verdict.reason;
        }

        // Step 6: policy evaluation; override only when strictly stricter.
        let policy_verdict = match self.policies.evaluate(zone_name, direction, payload, ctx) {
            Some(v) => Some(v),
            None if changed => self.policies.evaluate(zone_name, direction, peeled, ctx),
            None => None,
        };
        if let Some(policy) = policy_verdict {
            if let Some(action) = policy.strictest_action() {
                if action.stricter_than(verdict.action) {
                    verdict.action = action;
                    verdict.reason = format!("policy class '{}'", policy.class_name);
                }
            }
            if let Some(severity) = policy
                .actions
                .iter()
                .filter_map(|a| a.severity)
                .max()
            {
                if severity > verdict.level {
                    verdict.level = severity;
                }
            }
            verdict.matched_class = Some(policy.class_name.clone());
        }

        // Step 7: semantic analysis, gated per zone.
        if semantic_enabled {
            let result = self.semantic.analyze(peeled);
            verdict.intent = result.primary_intent;
            verdict.intent_confidence = result.confidence;
            verdict.threat_score = verdict.threat_score.max(result.confidence);

            if result.primary_intent != Intent::Benign {
                let semantic = &self.config.semantic;
                if result.confidence >= semantic.critical_threshold
                    && result.primary_intent.is_injection_class()
                {
                    if RuleAction::Block.stricter_than(verdict.action) {
                        verdict.action = RuleAction::Block;
                        verdict.reason =
                            format!("semantic: {}", result.primary_intent.name());
                    }
                    if SignatureLevel::Critical > verdict.level {
                        verdict.level = SignatureLevel::Critical;
                    }
                } else if result.confidence >= semantic.high_confidence_threshold
                    && RuleAction::Analyze.stricter_than(verdict.action)
                {
                    verdict.action = RuleAction::Analyze;
                    verdict.reason = format!("semantic: {}", result.primary_intent.name());
                }
            }
        }

        // Step 8: canary check, egress only.
        if direction == Direction::Output {
            let leaked = self
                .canaries
                .contains(payload)
                .or_else(|| self.canaries.contains(peeled));
            if leaked.is_some() {
                verdict.action = RuleAction::Block;
                verdict.reason = "canary".to_string();
                verdict.level = SignatureLevel::Critical;
                verdict.threat_score = 1.0;
            }
        }

        // Step 9: output filter, egress only, never on blocks.
        if direction == Direction::Output && verdict.action != RuleAction::Block {
            let filtered = self.output_filter.filter(payload);
            verdict.redactions = filtered.redactions;
            if filtered.redactions > 0 {
                verdict.filtered_payload = Some(filtered.text);
            }
        }

        // Edge case: nothing matched an empty payload.
        if payload.is_empty()
            && verdict.action == RuleAction::Allow
            && verdict.matched_rule == 0
            && verdict.matched_class.is_none()
        {
            verdict.reason = "empty payload".to_string();
        }

        // Step 10: counters, log, verdict.
        verdict.latency_us = started.elapsed().as_micros() as u64;
        self.finish(payload, zone_name, direction, &verdict);
        Ok(verdict)
    }

    fn finish(&mut self, payload: &str, zone_name: &str, direction: Direction, verdict: &Verdict) {
        if let Some(zone) = self.zones.get_mut(zone_name) {
            zone.count_request(direction, verdict.action == RuleAction::Block);
        }
        let mut entry = RequestLogEntry::for_payload(zone_name, direction, payload);
        entry.action = verdict.action;
        entry.matched_rule = verdict.matched_rule;
        entry.reason = verdict.reason.clone();
        entry.threat_score = verdict.threat_score;
        entry.latency_us = verdict.latency_us;
        entry.intent = verdict.intent;
        entry.intent_confidence = verdict.intent_confidence;
        self.request_log.log(entry);

        if verdict.action == RuleAction::Block {
            tracing::warn!(
                zone = zone_name,
                reason = %verdict.reason,
                rule = verdict.matched_rule,
                "request blocked"
            );
        } else {
            tracing::debug!(zone = zone_name, action = ?verdict.action, "request evaluated");
        }
    }
}
