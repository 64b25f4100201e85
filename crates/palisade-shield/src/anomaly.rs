//! # Anomaly Detector
//!
//! Statistical drift detection over the request stream. Three running
//! windows - payload length, payload entropy and inter-arrival interval -
//! track mean and variance; a z-score beyond the configured threshold
//! (default 3.0) reports an anomaly of the kind whose z-score is largest.
//!
//! A warm-up sample count gates detection so the first handful of requests
//! cannot trip the detector while the baselines are still meaningless.

use serde::{Deserialize, Serialize};

use crate::entropy::shannon_entropy;

/// Kinds of anomaly the detector reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyKind {
    Length,
    Entropy,
    Timing,
}

/// A detected anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    /// Normalised score in [0, 1]; 1.0 at twice the z-threshold.
    pub score: f64,
    /// Standard deviations from the running mean.
    pub z_score: f64,
    pub description: String,
}

/// Running statistics window: mean, variance, min, max, count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatWindow {
    sum: f64,
    sum_sq: f64,
    count: u64,
    min: f64,
    max: f64,
}

impl StatWindow {
    pub fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.sum_sq += value * value;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let mean = self.mean();
        (self.sum_sq / self.count as f64 - mean * mean).max(0.0)
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Z-score of `value` against this window; 0.0 while the window is
    /// degenerate (fewer than two samples or zero spread).
    pub fn z_score(&self, value: f64) -> f64 {
        let sd = self.stddev();
        if sd == 0.0 {
            0.0
        } else {
            (value - self.mean()) / sd
        }
    }
}

/// The anomaly detector.
#[derive(Debug)]
pub struct AnomalyDetector {
    length: StatWindow,
    entropy: StatWindow,
    interval: StatWindow,
    last_request_at: Option<u64>,
    /// Z-score magnitude required to report.
    pub z_threshold: f64,
    /// Samples required before anything is reported.
    pub min_samples: u64,
    pub analyzed: u64,
    pub anomalies_detected: u64,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self {
            length: StatWindow::default(),
            entropy: StatWindow::default(),
            interval: StatWindow::default(),
            last_request_at: None,
            z_threshold: 3.0,
            min_samples: 20,
            analyzed: 0,
            anomalies_detected: 0,
        }
    }
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze one request. `now_ms` is supplied by the caller so the
    /// detector itself stays clock-free and testable.
    ///
    /// The sample is scored against the windows as they stood *before*
    /// this request, then recorded.
    pub fn analyze(&mut self, payload: &[u8], now_ms: u64) -> Option<Anomaly> {
        self.analyzed += 1;

        let len = payload.len() as f64;
        let ent = shannon_entropy(payload);
        let interval = self
            .last_request_at
            .map(|prev| now_ms.saturating_sub(prev) as f64);

        let warmed = self.length.count() >= self.min_samples;
        let mut candidates: Vec<(AnomalyKind, f64)> = Vec::new();
        if warmed {
            candidates.push((AnomalyKind::Length, self.length.z_score(len)));
            candidates.push((AnomalyKind::Entropy, self.entropy.z_score(ent)));
            if let Some(iv) = interval {
                if self.interval.count() >= self.min_samples {
                    candidates.push((AnomalyKind::Timing, self.interval.z_score(iv)));
                }
            }
        }

        self.length.push(len);
        self.entropy.push(ent);
        if let Some(iv) = interval {
            self.interval.push(iv);
        }
        self.last_request_at = Some(now_ms);

        let (kind, z) = candidates
            .into_iter()
            .max_by(|a, b| {
                a.1.abs()
                    .partial_cmp(&b.1.abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })?;

        if z.abs() < self.z_threshold {
            return None;
        }

        self.anomalies_detected += 1;
        let score = (z.abs() / (2.0 * self.z_threshold)).min(1.0);
        Some(Anomaly {
            kind,
            score,
            z_score: z,
            description: format!("{kind:?} z-score {z:.2} beyond {:.1}", self.z_threshold),
        })
    }

    /// Record a sample without scoring it (baseline training).
    pub fn record(&mut self, payload: &[u8], now_ms: u64) {
        let interval = self
            .last_request_at
            .map(|prev| now_ms.saturating_sub(prev) as f64);
        self.length.push(payload.len() as f64);
        self.entropy.push(shannon_entropy(payload));
        if let Some(iv) = interval {
            self.interval.push(iv);
        }
        self.last_request_at = Some(now_ms);
    }

    pub fn mean_length(&self) -> f64 {
        self.length.mean()
    }

    pub fn stddev_length(&self) -> f64 {
        self.length.stddev()
    }

    /// Drop all learned baselines and counters.
    pub fn reset(&mut self) {
        *self = Self {
            z_threshold: self.z_threshold,
            min_samples: self.min_samples,
            ..Self::default()
        };
    }
}
