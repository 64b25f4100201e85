//! Property tests for the quantified pipeline invariants.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use proptest::prelude::*;

use palisade_shield::fingerprint::{similarity, Fingerprint};
use palisade_shield::matcher::{Direction, MatchCondition};
use palisade_shield::rule::rule;
use palisade_shield::zone::ZoneType;
use palisade_shield::{RuleAction, Shield};

fn shield_with_zone(acl: u32) -> Shield {
    let mut shield = Shield::with_defaults();
    shield.zones_mut().create("zone", ZoneType::Llm).unwrap();
    shield.rules_mut().acl_create(acl).unwrap();
    let zone = shield.zones_mut().get_mut("zone").unwrap();
    zone.in_acl = acl;
    zone.out_acl = acl;
    shield
}

proptest! {
    /// No rules, no policy: every payload is allowed.
    #[test]
    fn empty_config_always_allows(payload in ".{0,200}") {
        let mut shield = shield_with_zone(100);
        let verdict = shield.evaluate(&payload, "zone", Direction::Input).unwrap();
        prop_assert_eq!(verdict.action, RuleAction::Allow);
        prop_assert_eq!(verdict.matched_rule, 0);
    }

    /// The matched rule number is the minimum matching number.
    ///
    /// Rules 10/20/30 match on the markers "alpha"/"beta"/"gamma"; the
    /// expected winner is the lowest-numbered rule whose marker occurs.
    #[test]
    fn matched_rule_is_minimal(
        has_alpha in any::<bool>(),
        has_beta in any::<bool>(),
        has_gamma in any::<bool>(),
        // No vowels in the filler, so the markers cannot appear by chance.
        filler in "[ bcdfghjklmnpqrstvwxz]{0,40}",
    ) {
        let mut shield = shield_with_zone(100);
        for (number, marker) in [(10u32, "alpha"), (20, "beta"), (30, "gamma")] {
            let mut r = rule(number, RuleAction::Block, Direction::Input);
            r.conditions.push(MatchCondition::Contains(marker.into()));
            shield.rules_mut().rule_add(100, r).unwrap();
        }

        let mut payload = filler;
        if has_gamma { payload.push_str(" gamma"); }
        if has_beta { payload.push_str(" beta"); }
        if has_alpha { payload.push_str(" alpha"); }

        let expected = if has_alpha { 10 } else if has_beta { 20 } else if has_gamma { 30 } else { 0 };
        let verdict = shield.evaluate(&payload, "zone", Direction::Input).unwrap();
        prop_assert_eq!(verdict.matched_rule, expected);
        if expected == 0 {
            prop_assert_eq!(verdict.action, RuleAction::Allow);
        } else {
            prop_assert_eq!(verdict.action, RuleAction::Block);
        }
    }

    /// A rule matching the raw form also matches the base64-encoded form
    /// when the sanitiser peels base64.
    #[test]
    fn base64_transparency(suffix in "[a-z]{0,12}") {
        let plain = format!("Ignore all previous {suffix}");
        let encoded = BASE64.encode(&plain);

        let mut shield = shield_with_zone(100);
        let mut r = rule(10, RuleAction::Block, Direction::Input);
        r.conditions.push(MatchCondition::Contains("ignore".into()));
        shield.rules_mut().rule_add(100, r).unwrap();

        let raw = shield.evaluate(&plain, "zone", Direction::Input).unwrap();
        prop_assert_eq!(raw.action, RuleAction::Block);

        let wrapped = shield.evaluate(&encoded, "zone", Direction::Input).unwrap();
        prop_assert_eq!(wrapped.action, RuleAction::Block);
    }

    /// Fingerprint similarity is reflexive and symmetric.
    #[test]
    fn fingerprint_similarity_properties(a in ".{0,120}", b in ".{0,120}") {
        let fa = Fingerprint::of(&a);
        let fb = Fingerprint::of(&b);

        let self_sim = similarity(&fa, &fa);
        prop_assert!((self_sim - 1.0).abs() < 1e-9, "self similarity {self_sim}");

        let ab = similarity(&fa, &fb);
        let ba = similarity(&fb, &fa);
        prop_assert!((ab - ba).abs() < 1e-9, "asymmetric: {ab} vs {ba}");
        prop_assert!((0.0..=1.0 + 1e-9).contains(&ab));
    }

    /// Verdicts are a pure function of the payload.
    #[test]
    fn evaluation_is_deterministic(payload in ".{0,120}") {
        let mut shield = shield_with_zone(100);
        let mut r = rule(10, RuleAction::Block, Direction::Input);
        r.conditions.push(MatchCondition::PromptInjection);
        shield.rules_mut().rule_add(100, r).unwrap();

        let first = shield.evaluate(&payload, "zone", Direction::Input).unwrap();
        let second = shield.evaluate(&payload, "zone", Direction::Input).unwrap();
        prop_assert_eq!(first.action, second.action);
        prop_assert_eq!(first.matched_rule, second.matched_rule);
        prop_assert_eq!(first.threat_score, second.threat_score);
        prop_assert_eq!(first.intent, second.intent);
    }
}

#[test]
fn context_window_boundary() {
    use palisade_shield::context_window::{ContextWindow, Role};

    // Budget of exactly 10 one-token messages.
    let mut ctx = ContextWindow::new(10);
    for _ in 0..10 {
        ctx.add(Role::User, "abcd").unwrap();
    }
    assert_eq!(ctx.total_tokens(), 10);
    assert_eq!(ctx.messages_evicted, 0);

    // One more token evicts exactly one message.
    ctx.add(Role::User, "efgh").unwrap();
    assert_eq!(ctx.total_tokens(), 10);
    assert_eq!(ctx.messages_evicted, 1);
}
