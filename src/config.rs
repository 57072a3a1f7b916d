//! Engine configuration
//!
//! All knobs are fixed at engine construction; nothing here is mutated at
//! runtime. The struct serializes into snapshots, so every field carries a
//! serde default to keep older snapshot versions loadable.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Which streaming quantile estimator backs the alert threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    /// P-square marker estimator: O(1) memory, O(1) update
    #[default]
    P2,
    /// Exact quantile over a bounded window of recent scores
    Window,
}

/// Immutable configuration for a novelty engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-line decay multiplier for the global scale factor
    #[serde(default = "default_decay")]
    pub decay: f64,
    /// Laplace smoothing constant for probability estimates
    #[serde(default = "default_laplace_k")]
    pub laplace_k: f64,
    /// Weight of the averaged token self-information component
    #[serde(default = "default_weight")]
    pub w_token: f64,
    /// Weight of the template self-information component
    #[serde(default = "default_weight")]
    pub w_template: f64,
    /// Weight of the severity bonus component
    #[serde(default = "default_w_level")]
    pub w_level: f64,
    /// Token vocabulary cap; least-recently-used entries evicted beyond it
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Template vocabulary cap
    #[serde(default = "default_max_templates")]
    pub max_templates: usize,
    /// Lines longer than this many characters are truncated
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Token lists longer than this are truncated
    #[serde(default = "default_max_tokens_per_line")]
    pub max_tokens_per_line: usize,
    /// Append adjacent-pair bigrams to the unigram token list
    #[serde(default)]
    pub with_bigrams: bool,
    /// Lines observed before alerts may fire
    #[serde(default = "default_burn_in")]
    pub burn_in: u64,
    /// Quantile estimator variant
    #[serde(default)]
    pub estimator: EstimatorKind,
    /// Window size for the [`EstimatorKind::Window`] variant
    #[serde(default = "default_window")]
    pub window: usize,
    /// Capacity of the nearest-neighbor recall ring
    #[serde(default = "default_neighbor_capacity")]
    pub neighbor_capacity: usize,
    /// Default number of neighbors returned per query
    #[serde(default = "default_neighbor_topk")]
    pub neighbor_topk: usize,
}

fn default_decay() -> f64 {
    0.9999
}
fn default_laplace_k() -> f64 {
    1.0
}
fn default_weight() -> f64 {
    1.0
}
fn default_w_level() -> f64 {
    0.25
}
fn default_max_tokens() -> usize {
    30_000
}
fn default_max_templates() -> usize {
    10_000
}
fn default_max_line_length() -> usize {
    2_000
}
fn default_max_tokens_per_line() -> usize {
    400
}
fn default_burn_in() -> u64 {
    500
}
fn default_window() -> usize {
    1_000
}
fn default_neighbor_capacity() -> usize {
    2_048
}
fn default_neighbor_topk() -> usize {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decay: default_decay(),
            laplace_k: default_laplace_k(),
            w_token: default_weight(),
            w_template: default_weight(),
            w_level: default_w_level(),
            max_tokens: default_max_tokens(),
            max_templates: default_max_templates(),
            max_line_length: default_max_line_length(),
            max_tokens_per_line: default_max_tokens_per_line(),
            with_bigrams: false,
            burn_in: default_burn_in(),
            estimator: EstimatorKind::P2,
            window: default_window(),
            neighbor_capacity: default_neighbor_capacity(),
            neighbor_topk: default_neighbor_topk(),
        }
    }
}

impl EngineConfig {
    /// Validate all values against their documented domains
    pub fn validate(&self) -> Result<()> {
        if !(self.decay > 0.0 && self.decay <= 1.0) {
            return Err(EngineError::Config(format!(
                "decay must be in (0, 1], got {}",
                self.decay
            )));
        }
        if self.laplace_k <= 0.0 || !self.laplace_k.is_finite() {
            return Err(EngineError::Config(format!(
                "laplace_k must be positive and finite, got {}",
                self.laplace_k
            )));
        }
        for (name, w) in [
            ("w_token", self.w_token),
            ("w_template", self.w_template),
            ("w_level", self.w_level),
        ] {
            if w < 0.0 || !w.is_finite() {
                return Err(EngineError::Config(format!(
                    "{name} must be non-negative, got {w}"
                )));
            }
        }
        for (name, cap) in [
            ("max_tokens", self.max_tokens),
            ("max_templates", self.max_templates),
            ("max_line_length", self.max_line_length),
            ("max_tokens_per_line", self.max_tokens_per_line),
            ("window", self.window),
            ("neighbor_capacity", self.neighbor_capacity),
        ] {
            if cap == 0 {
                return Err(EngineError::Config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    /// Builder-style override for bigram tokenization
    pub fn with_bigrams(mut self, enabled: bool) -> Self {
        self.with_bigrams = enabled;
        self
    }

    /// Builder-style override for the decay multiplier
    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    /// Builder-style override for the scoring weights
    pub fn with_weights(mut self, w_token: f64, w_template: f64, w_level: f64) -> Self {
        self.w_token = w_token;
        self.w_template = w_template;
        self.w_level = w_level;
        self
    }

    /// Builder-style override for the vocabulary caps
    pub fn with_caps(mut self, max_tokens: usize, max_templates: usize) -> Self {
        self.max_tokens = max_tokens;
        self.max_templates = max_templates;
        self
    }
}
