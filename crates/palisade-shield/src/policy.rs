//! # Class-Maps, Policy-Maps and Service Policies
//!
//! The composable policy layer above raw rules:
//!
//! - a **class-map** is a named, ordered list of conditions with a match
//!   mode (match-any / match-all), each condition optionally negated;
//! - a **policy-map** is a named ordered list of policy-classes, each
//!   referencing a class-map and carrying an ordered action bundle;
//! - a **service policy** binds (zone, direction) to a policy-map.
//!
//! Evaluation is first-match-wins across the classes of a policy-map. The
//! pipeline then lets a policy action override the rule action only when
//! it is strictly stricter on the action lattice.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::matcher::{Direction, MatchCondition, MatchCtx};
use crate::rule::RuleAction;
use crate::signature::SignatureLevel;
use crate::{Result, ShieldError};

/// How a class-map combines its conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassMatchMode {
    /// Any condition matching (after negation) satisfies the class.
    Any,
    /// Every condition must match (after negation).
    All,
}

/// One condition inside a class-map, with optional negation.
#[derive(Debug)]
pub struct ClassEntry {
    pub condition: MatchCondition,
    pub negate: bool,
}

impl ClassEntry {
    fn holds(&self, payload: &str, ctx: MatchCtx<'_>) -> bool {
        self.condition.matches(payload, ctx) != self.negate
    }
}

/// A named, ordered condition group.
#[derive(Debug)]
pub struct ClassMap {
    pub name: String,
    pub mode: ClassMatchMode,
    pub entries: Vec<ClassEntry>,
}

impl ClassMap {
    /// `true` when the payload satisfies this class.
    ///
    /// An empty class-map matches nothing; a class that matched everything
    /// by accident would silently shadow every class after it.
    pub fn matches(&self, payload: &str, ctx: MatchCtx<'_>) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        match self.mode {
            ClassMatchMode::Any => self.entries.iter().any(|e| e.holds(payload, ctx)),
            ClassMatchMode::All => self.entries.iter().all(|e| e.holds(payload, ctx)),
        }
    }
}

/// One action in a policy-class bundle.
#[derive(Debug, Clone)]
pub struct PolicyAction {
    pub action: RuleAction,
    /// Requests per second cap carried to the enforcement point.
    pub rate_limit: Option<u32>,
    /// Target zone for `Redirect`.
    pub redirect_zone: Option<String>,
    pub log_enabled: bool,
    /// Overrides the threat level recorded for the hit.
    pub severity: Option<SignatureLevel>,
}

impl PolicyAction {
    pub fn new(action: RuleAction) -> Self {
        Self {
            action,
            rate_limit: None,
            redirect_zone: None,
            log_enabled: false,
            severity: None,
        }
    }
}

/// A class reference plus its action bundle inside a policy-map.
#[derive(Debug)]
pub struct PolicyClass {
    pub class_name: String,
    pub actions: Vec<PolicyAction>,
    pub matches: u64,
}

/// A named ordered list of policy-classes.
#[derive(Debug)]
pub struct PolicyMap {
    pub name: String,
    pub classes: Vec<PolicyClass>,
}

/// Result of policy evaluation: the winning class and its actions.
#[derive(Debug, Clone)]
pub struct PolicyVerdict {
    pub class_name: String,
    pub actions: Vec<PolicyAction>,
}

impl PolicyVerdict {
    /// The strictest action in the bundle, used for the override decision.
    pub fn strictest_action(&self) -> Option<RuleAction> {
        self.actions
            .iter()
            .map(|a| a.action)
            .max_by_key(|a| a.strictness())
    }
}

/// Owner of class-maps, policy-maps and service-policy bindings.
#[derive(Debug, Default)]
pub struct PolicyEngine {
    class_maps: HashMap<String, ClassMap>,
    policy_maps: Vec<PolicyMap>,
    /// (zone name, direction) -> policy-map name.
    bindings: HashMap<(String, Direction), String>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a class-map. Fails with `Exists` on a duplicate name.
    pub fn class_map_create(&mut self, name: &str, mode: ClassMatchMode) -> Result<&mut ClassMap> {
        if self.class_maps.contains_key(name) {
            return Err(ShieldError::Exists(format!("class-map '{name}'")));
        }
        self.class_maps.insert(
            name.to_string(),
            ClassMap {
                name: name.to_string(),
                mode,
                entries: Vec::new(),
            },
        );
        Ok(self.class_maps.get_mut(name).expect("just inserted"))
    }

    pub fn class_map_delete(&mut self, name: &str) -> Result<()> {
        self.class_maps
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ShieldError::NotFound(format!("class-map '{name}'")))
    }

    pub fn class_map(&self, name: &str) -> Option<&ClassMap> {
        self.class_maps.get(name)
    }

    pub fn class_map_mut(&mut self, name: &str) -> Option<&mut ClassMap> {
        self.class_maps.get_mut(name)
    }

    /// Create a policy-map. Fails with `Exists` on a duplicate name.
    pub fn policy_map_create(&mut self, name: &str) -> Result<&mut PolicyMap> {
        if self.policy_maps.iter().any(|p| p.name == name) {
            return Err(ShieldError::Exists(format!("policy-map '{name}'")));
        }
        self.policy_maps.push(PolicyMap {
            name: name.to_string(),
            classes: Vec::new(),
        });
        Ok(self.policy_maps.last_mut().expect("just pushed"))
    }

    pub fn policy_map_delete(&mut self, name: &str) -> Result<()> {
        let before = self.policy_maps.len();
        self.policy_maps.retain(|p| p.name != name);
        if self.policy_maps.len() == before {
            return Err(ShieldError::NotFound(format!("policy-map '{name}'")));
        }
        Ok(())
    }

    pub fn policy_map_mut(&mut self, name: &str) -> Option<&mut PolicyMap> {
        self.policy_maps.iter_mut().find(|p| p.name == name)
    }

    /// Append a class reference to a policy-map.
    ///
    /// The referenced class-map does not have to exist yet; resolution
    /// happens at evaluation time and an unresolved class never matches.
    pub fn policy_map_add_class(
        &mut self,
        policy_name: &str,
        class_name: &str,
        actions: Vec<PolicyAction>,
    ) -> Result<()> {
        let pm = self
            .policy_map_mut(policy_name)
            .ok_or_else(|| ShieldError::NotFound(format!("policy-map '{policy_name}'")))?;
        pm.classes.push(PolicyClass {
            class_name: class_name.to_string(),
            actions,
            matches: 0,
        });
        Ok(())
    }

    /// Bind (zone, direction) to a policy-map.
    pub fn service_policy_bind(&mut self, zone: &str, direction: Direction, policy_name: &str) {
        self.bindings
            .insert((zone.to_string(), direction), policy_name.to_string());
    }

    pub fn service_policy_unbind(&mut self, zone: &str, direction: Direction) {
        self.bindings.remove(&(zone.to_string(), direction));
    }

    fn bound_policy(&self, zone: &str, direction: Direction) -> Option<&str> {
        self.bindings
            .get(&(zone.to_string(), direction))
            .or_else(|| self.bindings.get(&(zone.to_string(), Direction::Both)))
            .map(String::as_str)
    }

    /// Evaluate the policy bound for (zone, direction) against a payload.
    /// First matching class wins; `None` when nothing is bound or no class
    /// matched.
    pub fn evaluate(
        &mut self,
        zone: &str,
        direction: Direction,
        payload: &str,
        ctx: MatchCtx<'_>,
    ) -> Option<PolicyVerdict> {
        let policy_name = self.bound_policy(zone, direction)?.to_string();
        let class_maps = &self.class_maps;
        let pm = self.policy_maps.iter_mut().find(|p| p.name == policy_name)?;

        for class in &mut pm.classes {
            let Some(cm) = class_maps.get(&class.class_name) else {
                continue;
            };
            if cm.matches(payload, ctx) {
                class.matches += 1;
                return Some(PolicyVerdict {
                    class_name: class.class_name.clone(),
                    actions: class.actions.clone(),
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> MatchCtx<'static> {
        MatchCtx::default()
    }

    fn engine_with_class(name: &str, mode: ClassMatchMode) -> PolicyEngine {
        let mut engine = PolicyEngine::new();
        let cm = engine.class_map_create(name, mode).unwrap();
        cm.entries.push(ClassEntry {
            condition: MatchCondition::Contains("ignore".into()),
            negate: false,
        });
        engine
    }

    #[test]
    fn match_any_and_match_all() {
        let mut engine = PolicyEngine::new();
        let cm = engine.class_map_create("both", ClassMatchMode::All).unwrap();
        cm.entries.push(ClassEntry {
            condition: MatchCondition::Contains("alpha".into()),
            negate: false,
        });
        cm.entries.push(ClassEntry {
            condition: MatchCondition::Contains("beta".into()),
            negate: false,
        });

        assert!(!engine.class_map("both").unwrap().matches("only alpha", ctx()));
        assert!(engine
            .class_map("both")
            .unwrap()
            .matches("alpha and beta", ctx()));

        engine.class_map_mut("both").unwrap().mode = ClassMatchMode::Any;
        assert!(engine.class_map("both").unwrap().matches("only alpha", ctx()));
    }

    #[test]
    fn negation_inverts_a_condition() {
        let mut engine = PolicyEngine::new();
        let cm = engine.class_map_create("not-greet", ClassMatchMode::All).unwrap();
        cm.entries.push(ClassEntry {
            condition: MatchCondition::Contains("hello".into()),
            negate: true,
        });
        assert!(engine.class_map("not-greet").unwrap().matches("attack", ctx()));
        assert!(!engine.class_map("not-greet").unwrap().matches("hello there", ctx()));
    }

    #[test]
    fn empty_class_map_matches_nothing() {
        let mut engine = PolicyEngine::new();
        engine.class_map_create("empty", ClassMatchMode::Any).unwrap();
        assert!(!engine.class_map("empty").unwrap().matches("anything", ctx()));
    }

    #[test]
    fn duplicate_names_are_exists() {
        let mut engine = engine_with_class("c", ClassMatchMode::Any);
        assert!(matches!(
            engine.class_map_create("c", ClassMatchMode::Any),
            Err(ShieldError::Exists(_))
        ));
        engine.policy_map_create("p").unwrap();
        assert!(matches!(
            engine.policy_map_create("p"),
            Err(ShieldError::Exists(_))
        ));
    }

    #[test]
    fn first_matching_class_wins() {
        let mut engine = PolicyEngine::new();
        for (name, needle) in [("first", "ignore"), ("second", "ignore")] {
            let cm = engine.class_map_create(name, ClassMatchMode::Any).unwrap();
            cm.entries.push(ClassEntry {
                condition: MatchCondition::Contains(needle.into()),
                negate: false,
            });
        }
        engine.policy_map_create("pm").unwrap();
        engine
            .policy_map_add_class("pm", "first", vec![PolicyAction::new(RuleAction::Analyze)])
            .unwrap();
        engine
            .policy_map_add_class("pm", "second", vec![PolicyAction::new(RuleAction::Block)])
            .unwrap();
        engine.service_policy_bind("ext", Direction::Input, "pm");

        let verdict = engine
            .evaluate("ext", Direction::Input, "ignore this", ctx())
            .unwrap();
        assert_eq!(verdict.class_name, "first");
        assert_eq!(verdict.strictest_action(), Some(RuleAction::Analyze));
    }

    #[test]
    fn unbound_zone_yields_none() {
        let mut engine = engine_with_class("c", ClassMatchMode::Any);
        engine.policy_map_create("pm").unwrap();
        engine
            .policy_map_add_class("pm", "c", vec![PolicyAction::new(RuleAction::Block)])
            .unwrap();
        assert!(engine
            .evaluate("ext", Direction::Input, "ignore", ctx())
            .is_none());
    }

    #[test]
    fn both_direction_binding_covers_either() {
        let mut engine = engine_with_class("c", ClassMatchMode::Any);
        engine.policy_map_create("pm").unwrap();
        engine
            .policy_map_add_class("pm", "c", vec![PolicyAction::new(RuleAction::Block)])
            .unwrap();
        engine.service_policy_bind("ext", Direction::Both, "pm");
        assert!(engine
            .evaluate("ext", Direction::Output, "ignore", ctx())
            .is_some());
    }

    #[test]
    fn unresolved_class_reference_never_matches() {
        let mut engine = PolicyEngine::new();
        engine.policy_map_create("pm").unwrap();
        engine
            .policy_map_add_class("pm", "ghost", vec![PolicyAction::new(RuleAction::Block)])
            .unwrap();
        engine.service_policy_bind("ext", Direction::Input, "pm");
        assert!(engine
            .evaluate("ext", Direction::Input, "anything", ctx())
            .is_none());
    }

    #[test]
    fn class_hit_counter_increments() {
        let mut engine = engine_with_class("c", ClassMatchMode::Any);
        engine.policy_map_create("pm").unwrap();
        engine
            .policy_map_add_class("pm", "c", vec![PolicyAction::new(RuleAction::Block)])
            .unwrap();
        engine.service_policy_bind("ext", Direction::Input, "pm");
        engine.evaluate("ext", Direction::Input, "ignore a", ctx());
        engine.evaluate("ext", Direction::Input, "ignore b", ctx());
        let pm = engine.policy_map_mut("pm").unwrap();
        assert_eq!(pm.classes[0].matches, 2);
    }

    #[test]
    fn strictest_action_of_bundle() {
        let verdict = PolicyVerdict {
            class_name: "c".into(),
            actions: vec![
                PolicyAction::new(RuleAction::Log),
                PolicyAction::new(RuleAction::Quarantine),
                PolicyAction::new(RuleAction::Analyze),
            ],
        };
        assert_eq!(verdict.strictest_action(), Some(RuleAction::Quarantine));
    }
}
