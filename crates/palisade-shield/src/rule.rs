//! # Rule Engine
//!
//! Numbered rules grouped in access lists. Evaluation is first-match-wins
//! across rules in ascending number order: direction and zone filters must
//! hold, then any one of the rule's conditions (OR). A rule with no
//! conditions matches every payload that passes its filters.

use serde::{Deserialize, Serialize};

use crate::matcher::{Direction, MatchCondition, MatchCtx};
use crate::zone::ZoneType;
use crate::{Result, ShieldError};

/// Action a rule or policy can take, ordered by strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleAction {
    Log,
    Allow,
    Analyze,
    Redirect,
    Challenge,
    Tarpit,
    Quarantine,
    Block,
}

impl RuleAction {
    /// Position in the strictness lattice:
    /// log < allow < analyze < redirect < challenge < tarpit < quarantine < block.
    pub fn strictness(self) -> u8 {
        match self {
            RuleAction::Log => 0,
            RuleAction::Allow => 1,
            RuleAction::Analyze => 2,
            RuleAction::Redirect => 3,
            RuleAction::Challenge => 4,
            RuleAction::Tarpit => 5,
            RuleAction::Quarantine => 6,
            RuleAction::Block => 7,
        }
    }

    /// `true` when `self` is strictly stricter than `other`.
    pub fn stricter_than(self, other: RuleAction) -> bool {
        self.strictness() > other.strictness()
    }
}

/// A single numbered rule.
#[derive(Debug)]
pub struct Rule {
    pub number: u32,
    pub action: RuleAction,
    pub direction: Direction,
    /// `Unknown` means any zone type.
    pub zone_type: ZoneType,
    /// `None` means any zone.
    pub zone_name: Option<String>,
    /// OR-combined conditions; empty means match-all.
    pub conditions: Vec<MatchCondition>,
    pub remark: Option<String>,
    pub log_enabled: bool,
    pub matches: u64,
}

impl Rule {
    fn filters_hold(&self, direction: Direction, zone_type: ZoneType, zone_name: &str) -> bool {
        if !self.direction.covers(direction) {
            return false;
        }
        if self.zone_type != ZoneType::Unknown && self.zone_type != zone_type {
            return false;
        }
        if let Some(bound) = &self.zone_name {
            if bound != zone_name {
                return false;
            }
        }
        true
    }

    fn conditions_hold(&self, payload: &str, ctx: MatchCtx<'_>) -> bool {
        if self.conditions.is_empty() {
            return true;
        }
        self.conditions.iter().any(|c| c.matches(payload, ctx))
    }
}

/// An access list: an ordered, numbered sequence of rules.
#[derive(Debug)]
pub struct Acl {
    pub number: u32,
    rules: Vec<Rule>,
}

impl Acl {
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, number: u32) -> Option<&Rule> {
        self.rules.iter().find(|r| r.number == number)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Verdict from rule evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleVerdict {
    pub action: RuleAction,
    /// Matched rule number; 0 when no rule matched.
    pub matched_rule: u32,
    pub reason: String,
    pub log_enabled: bool,
}

impl RuleVerdict {
    fn default_allow() -> Self {
        Self {
            action: RuleAction::Allow,
            matched_rule: 0,
            reason: "default allow".to_string(),
            log_enabled: false,
        }
    }
}

/// Owner of all access lists.
#[derive(Debug, Default)]
pub struct RuleEngine {
    acls: Vec<Acl>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an ACL. Fails with `Exists` on a duplicate number.
    pub fn acl_create(&mut self, number: u32) -> Result<&mut Acl> {
        if number == 0 {
            return Err(ShieldError::InvalidInput("acl number must be non-zero".into()));
        }
        if self.acls.iter().any(|a| a.number == number) {
            return Err(ShieldError::Exists(format!("acl {number}")));
        }
        self.acls.push(Acl {
            number,
            rules: Vec::new(),
        });
        Ok(self.acls.last_mut().expect("just pushed"))
    }

    pub fn acl_delete(&mut self, number: u32) -> Result<()> {
        let before = self.acls.len();
        self.acls.retain(|a| a.number != number);
        if self.acls.len() == before {
            return Err(ShieldError::NotFound(format!("acl {number}")));
        }
        Ok(())
    }

    pub fn acl(&self, number: u32) -> Option<&Acl> {
        self.acls.iter().find(|a| a.number == number)
    }

    fn acl_mut(&mut self, number: u32) -> Option<&mut Acl> {
        self.acls.iter_mut().find(|a| a.number == number)
    }

    /// Insert a rule into an ACL, keeping rules sorted by number.
    /// Fails with `Exists` on a duplicate rule number.
    pub fn rule_add(&mut self, acl_number: u32, rule: Rule) -> Result<()> {
        let acl = self
            .acl_mut(acl_number)
            .ok_or_else(|| ShieldError::NotFound(format!("acl {acl_number}")))?;
        match acl.rules.binary_search_by_key(&rule.number, |r| r.number) {
            Ok(_) => Err(ShieldError::Exists(format!(
                "rule {} in acl {acl_number}",
                rule.number
            ))),
            Err(pos) => {
                acl.rules.insert(pos, rule);
                Ok(())
            }
        }
    }

    /// Remove a rule by number.
    pub fn rule_delete(&mut self, acl_number: u32, rule_number: u32) -> Result<()> {
        let acl = self
            .acl_mut(acl_number)
            .ok_or_else(|| ShieldError::NotFound(format!("acl {acl_number}")))?;
        let before = acl.rules.len();
        acl.rules.retain(|r| r.number != rule_number);
        if acl.rules.len() == before {
            return Err(ShieldError::NotFound(format!(
                "rule {rule_number} in acl {acl_number}"
            )));
        }
        Ok(())
    }

    /// Renumber an ACL's rules from `start` in increments of `step`,
    /// preserving order.
    pub fn resequence(&mut self, acl_number: u32, start: u32, step: u32) -> Result<()> {
        if step == 0 {
            return Err(ShieldError::InvalidInput("step must be non-zero".into()));
        }
        let acl = self
            .acl_mut(acl_number)
            .ok_or_else(|| ShieldError::NotFound(format!("acl {acl_number}")))?;
        let mut number = start;
        for rule in &mut acl.rules {
            rule.number = number;
            number += step;
        }
        Ok(())
    }

    /// Evaluate the given ACL against a payload. A missing or empty ACL
    /// yields the default allow verdict.
    pub fn evaluate(
        &mut self,
        acl_number: u32,
        direction: Direction,
        zone_type: ZoneType,
        zone_name: &str,
        payload: &str,
        ctx: MatchCtx<'_>,
    ) -> RuleVerdict {
        let Some(acl) = self.acl_mut(acl_number) else {
            return RuleVerdict::default_allow();
        };

        for rule in &mut acl.rules {
            if !rule.filters_hold(direction, zone_type, zone_name) {
                continue;
            }
            if !rule.conditions_hold(payload, ctx) {
                continue;
            }
            rule.matches += 1;
            let reason = rule
                .remark
                .clone()
                .unwrap_or_else(|| format!("rule matched: {}", rule.number));
            if rule.log_enabled {
                tracing::info!(
                    acl = acl_number,
                    rule = rule.number,
                    action = ?rule.action,
                    "rule hit"
                );
            }
            return RuleVerdict {
                action: rule.action,
                matched_rule: rule.number,
                reason,
                log_enabled: rule.log_enabled,
            };
        }

        RuleVerdict::default_allow()
    }
}

/// Builder-style constructor for a rule with no filters or conditions.
pub fn rule(number: u32, action: RuleAction, direction: Direction) -> Rule {
    Rule {
        number,
        action,
        direction,
        zone_type: ZoneType::Unknown,
        zone_name: None,
        conditions: Vec::new(),
        remark: None,
        log_enabled: false,
        matches: 0,
    }
}
