//! # Output Filter
//!
//! Redacts sensitive content from egress payloads: PII, secrets, HTML and
//! custom patterns. Redaction never changes the pipeline's action - a
//! blocked response stays blocked, an allowed response goes out scrubbed.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// How a matched span is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedactMode {
    /// Replace with a `[REDACTED:<name>]` marker.
    Mask,
    /// Remove entirely.
    Remove,
}

/// A custom redaction rule.
#[derive(Debug)]
pub struct FilterRule {
    pub name: String,
    pub regex: Option<Regex>,
    pub mode: RedactMode,
    pub enabled: bool,
    pub priority: i32,
    pub hits: u64,
}

/// Outcome of one filter pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filtered {
    pub text: String,
    pub redactions: usize,
}

struct BuiltinPattern {
    name: &'static str,
    regex: Regex,
}

fn builtin(name: &'static str, raw: &str) -> Option<BuiltinPattern> {
    RegexBuilder::new(raw)
        .case_insensitive(true)
        .build()
        .ok()
        .map(|regex| BuiltinPattern { name, regex })
}

static PII_BUILTINS: Lazy<Vec<BuiltinPattern>> = Lazy::new(|| {
    [
        ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
        ("card", r"\b(?:\d[ -]?){15}\d\b"),
        ("email", r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
        ("phone", r"\b\+?\d{1,3}[ .-]?\(?\d{3}\)?[ .-]?\d{3}[ .-]?\d{4}\b"),
    ]
    .iter()
    .filter_map(|&(name, raw)| builtin(name, raw))
    .collect()
});

static SECRET_BUILTINS: Lazy<Vec<BuiltinPattern>> = Lazy::new(|| {
    [
        ("api-key", r"\b(sk|pk|rk)[-_](live|test)?[-_]?[A-Za-z0-9]{16,}\b"),
        ("bearer", r"\bBearer\s+[A-Za-z0-9._~+/-]{16,}={0,2}"),
        ("aws-key", r"\bAKIA[0-9A-Z]{16}\b"),
        ("password-kv", r#"\bpassword\s*[:=]\s*\S+"#),
        ("private-key", r"-----BEGIN [A-Z ]*PRIVATE KEY-----"),
    ]
    .iter()
    .filter_map(|&(name, raw)| builtin(name, raw))
    .collect()
});

static HTML_BUILTIN: Lazy<Option<BuiltinPattern>> =
    Lazy::new(|| builtin("html-tag", r"<[^>]{1,200}>"));

/// The egress redaction filter.
#[derive(Debug)]
pub struct OutputFilter {
    pub enabled: bool,
    pub filter_pii: bool,
    pub filter_secrets: bool,
    pub filter_html: bool,
    rules: Vec<FilterRule>,
    pub total_filtered: u64,
    pub total_redactions: u64,
}

impl Default for OutputFilter {
    fn default() -> Self {
        Self {
            enabled: true,
            filter_pii: true,
            filter_secrets: true,
            filter_html: false,
            rules: Vec::new(),
            total_filtered: 0,
            total_redactions: 0,
        }
    }
}

impl OutputFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a custom rule; a pattern that fails to compile is kept disabled
    /// and never matches.
    pub fn add_rule(&mut self, name: &str, pattern: &str, mode: RedactMode, priority: i32) {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build().ok();
        if regex.is_none() {
            tracing::warn!(rule = name, pattern, "filter rule pattern failed to compile");
        }
        self.rules.push(FilterRule {
            name: name.to_string(),
            regex,
            mode,
            enabled: true,
            priority,
            hits: 0,
        });
        self.rules.sort_by_key(|r| r.priority);
    }

    pub fn remove_rule(&mut self, name: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.name != name);
        self.rules.len() != before
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    /// Check-only pass: would anything be redacted?
    pub fn contains_sensitive(&self, text: &str) -> bool {
        if !self.enabled {
            return false;
        }
        if self.filter_pii && PII_BUILTINS.iter().any(|p| p.regex.is_match(text)) {
            return true;
        }
        if self.filter_secrets && SECRET_BUILTINS.iter().any(|p| p.regex.is_match(text)) {
            return true;
        }
        if self.filter_html {
            if let Some(p) = HTML_BUILTIN.as_ref() {
                if p.regex.is_match(text) {
                    return true;
                }
            }
        }
        self.rules
            .iter()
            .filter(|r| r.enabled)
            .filter_map(|r| r.regex.as_ref())
            .any(|re| re.is_match(text))
    }

    /// Redact `text`, returning the scrubbed copy and the redaction count.
    pub fn filter(&mut self, text: &str) -> Filtered {
        if !self.enabled {
            return Filtered {
                text: text.to_string(),
                redactions: 0,
            };
        }

        let mut out = text.to_string();
        let mut redactions = 0usize;

        if self.filter_pii {
            for p in PII_BUILTINS.iter() {
                redactions += replace_counting(&mut out, &p.regex, p.name, RedactMode::Mask);
            }
        }
        if self.filter_secrets {
            for p in SECRET_BUILTINS.iter() {
                redactions += replace_counting(&mut out, &p.regex, p.name, RedactMode::Mask);
            }
        }
        if self.filter_html {
            if let Some(p) = HTML_BUILTIN.as_ref() {
                redactions += replace_counting(&mut out, &p.regex, p.name, RedactMode::Remove);
            }
        }
        for rule in &mut self.rules {
            let Some(regex) = rule.regex.as_ref() else {
                continue;
            };
            if !rule.enabled {
                continue;
            }
            let n = replace_counting(&mut out, regex, &rule.name, rule.mode);
            rule.hits += n as u64;
            redactions += n;
        }

        self.total_filtered += 1;
        self.total_redactions += redactions as u64;
        Filtered {
            text: out,
            redactions,
        }
    }
}

fn replace_counting(text: &mut String, regex: &Regex, name: &str, mode: RedactMode) -> usize {
    let count = regex.find_iter(text).count();
    if count == 0 {
        return 0;
    }
    let replacement = match mode {
        RedactMode::Mask => format!("[REDACTED:{name}]"),
        RedactMode::Remove => String::new(),
    };
    *text = regex.replace_all(text, replacement.as_str()).into_owned();
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pii_is_masked() {
        let mut filter = OutputFilter::default();
        let out = filter.filter("my ssn is 123-45-6789 and email bob@example.com");
        assert!(!out.text.contains("123-45-6789"));
        assert!(!out.text.contains("bob@example.com"));
        assert!(out.text.contains("[REDACTED:ssn]"));
        assert_eq!(out.redactions, 2);
    }

    #[test]
    fn secrets_are_masked() {
        let mut filter = OutputFilter::default();
        let out = filter.filter("use key sk-live-abcdefghijklmnop1234 and Bearer abcdefghijklmnopqrst");
        assert!(out.text.contains("[REDACTED:"));
        assert!(!out.text.contains("sk-live-abcdefghijklmnop1234"));
        assert!(out.redactions >= 2);
    }

    #[test]
    fn clean_text_is_untouched() {
        let mut filter = OutputFilter::default();
        let input = "Here is a plain answer with no sensitive content.";
        let out = filter.filter(input);
        assert_eq!(out.text, input);
        assert_eq!(out.redactions, 0);
    }

    #[test]
    fn html_removal_when_enabled() {
        let mut filter = OutputFilter {
            filter_html: true,
            ..Default::default()
        };
        let out = filter.filter("hello <script>alert(1)</script> world");
        assert!(!out.text.contains("<script>"));
        assert!(out.redactions >= 2);
    }

    #[test]
    fn custom_rule_counts_hits() {
        let mut filter = OutputFilter::default();
        filter.add_rule("codename", r"\bPROJECT-\d+\b", RedactMode::Mask, 10);
        let out = filter.filter("PROJECT-7 and PROJECT-9 are internal");
        assert_eq!(out.redactions, 2);
        assert_eq!(filter.rules()[0].hits, 2);
        assert!(out.text.contains("[REDACTED:codename]"));
    }

    #[test]
    fn disabled_filter_passes_everything() {
        let mut filter = OutputFilter {
            enabled: false,
            ..Default::default()
        };
        let input = "ssn 123-45-6789";
        assert_eq!(filter.filter(input).text, input);
        assert!(!filter.contains_sensitive(input));
    }

    #[test]
    fn contains_sensitive_detects_without_modifying() {
        let filter = OutputFilter::default();
        assert!(filter.contains_sensitive("card 4111 1111 1111 1111"));
        assert!(!filter.contains_sensitive("nothing here"));
    }

    #[test]
    fn bad_custom_pattern_never_matches() {
        let mut filter = OutputFilter::default();
        filter.add_rule("broken", "[unclosed", RedactMode::Mask, 1);
        let out = filter.filter("text with [unclosed bracket");
        assert_eq!(out.redactions, 0);
    }

    #[test]
    fn counters_accumulate() {
        let mut filter = OutputFilter::default();
        filter.filter("a@b.co first");
        filter.filter("c@d.co second");
        assert_eq!(filter.total_filtered, 2);
        assert_eq!(filter.total_redactions, 2);
    }
}
