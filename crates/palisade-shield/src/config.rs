//! Configuration types for the Shield pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::request_log::DEFAULT_MAX_ENTRIES;
use crate::sanitizer::SanitizerConfig;

/// Top-level Shield configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShieldConfig {
    /// Sanitiser passes (step 2).
    pub sanitizer: SanitizerConfig,

    /// Encoding detection (step 3).
    pub detect_encoding: bool,

    /// Signature scanning (step 4).
    pub signatures: SignatureScanConfig,

    /// Semantic analysis thresholds (step 7).
    pub semantic: SemanticConfig,

    /// Request logging (step 10).
    pub request_log: RequestLogConfig,
}

/// Signature scan behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureScanConfig {
    pub enabled: bool,
    /// A critical-level hit short-circuits the pipeline with a block.
    pub block_on_critical: bool,
}

impl Default for SignatureScanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_on_critical: true,
        }
    }
}

/// Semantic detector thresholds.
///
/// Bank scores are normalised by bank size, so well-formed attacks land in
/// the 0.15-0.5 band rather than near 1.0; the defaults are calibrated to
/// that scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticConfig {
    /// Score at which the action is promoted to at least `analyze`.
    pub high_confidence_threshold: f64,
    /// Score at which jailbreak/injection intents promote to `block`.
    pub critical_threshold: f64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            high_confidence_threshold: 0.15,
            critical_threshold: 0.30,
        }
    }
}

/// Request log sizing and sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogConfig {
    pub max_entries: usize,
    /// Optional JSON-lines sink path.
    pub file: Option<PathBuf>,
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            file: None,
        }
    }
}

impl ShieldConfig {
    /// Everything on, default thresholds.
    pub fn new() -> Self {
        Self {
            detect_encoding: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = ShieldConfig::new();
        assert!(config.detect_encoding);
        assert!(config.signatures.enabled);
        assert!(config.signatures.block_on_critical);
        assert!(config.semantic.critical_threshold > config.semantic.high_confidence_threshold);
        assert_eq!(config.request_log.max_entries, DEFAULT_MAX_ENTRIES);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = ShieldConfig::new();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ShieldConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed.semantic.critical_threshold,
            config.semantic.critical_threshold
        );
        assert_eq!(parsed.sanitizer.max_depth, config.sanitizer.max_depth);
    }
}
