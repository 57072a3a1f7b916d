//! The engine facade: canonicalize, tokenize, score, observe, alert
//!
//! One engine instance is single-threaded cooperative: each line is
//! processed to completion before the next. Callers sharing an engine across
//! producers must serialize access themselves; the engine holds no internal
//! locking.

use std::path::Path;

use crate::canonical::Canonicalizer;
use crate::config::{EngineConfig, EstimatorKind};
use crate::error::Result;
use crate::metrics::EngineMetrics;
use crate::model::InfoModel;
use crate::neighbors::{Neighbor, NeighborBuffer};
use crate::quantile::{Estimator, P2Quantile, QuantileBank, RollingQuantile};
use crate::score::{score_line, LineScore};
use crate::snapshot::{Snapshot, VocabOrder, SNAPSHOT_VERSION};
use crate::tokenize::{extract_level, tokenize, Level};

/// Minimum estimator samples before alerts may fire, independent of burn-in
const MIN_ESTIMATOR_SAMPLES: u64 = 10;

struct PreparedLine {
    template: String,
    tokens: Vec<String>,
    level: Level,
    line_truncated: bool,
    tokens_truncated: bool,
}

/// Streaming novelty engine over unstructured log lines
#[derive(Debug)]
pub struct Engine {
    cfg: EngineConfig,
    canonicalizer: Canonicalizer,
    model: InfoModel,
    quantiles: QuantileBank,
    neighbors: NeighborBuffer,
}

impl Engine {
    /// Build an engine from a validated configuration
    pub fn new(cfg: EngineConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            canonicalizer: Canonicalizer::new(cfg.max_line_length),
            model: InfoModel::new(&cfg),
            quantiles: QuantileBank::new(),
            neighbors: NeighborBuffer::new(cfg.neighbor_capacity),
            cfg,
        })
    }

    fn prepare(&self, line: &str) -> PreparedLine {
        let canonical = self.canonicalizer.mask(line);
        let mut tokens = tokenize(&canonical.text, self.cfg.with_bigrams);
        let tokens_truncated = tokens.len() > self.cfg.max_tokens_per_line;
        if tokens_truncated {
            tokens.truncate(self.cfg.max_tokens_per_line);
        }
        let level = extract_level(&tokens);
        PreparedLine {
            template: canonical.text,
            tokens,
            level,
            line_truncated: canonical.truncated,
            tokens_truncated,
        }
    }

    fn apply(&mut self, line: &str, prepared: &PreparedLine) {
        if prepared.line_truncated {
            self.model.note_truncated_line();
        }
        if prepared.tokens_truncated {
            self.model.note_truncated_tokens();
        }
        self.model.observe(&prepared.template, &prepared.tokens);
        self.neighbors.push(line, &prepared.tokens);
    }

    /// Update the model with one line
    pub fn observe(&mut self, line: &str) {
        let prepared = self.prepare(line);
        self.apply(line, &prepared);
    }

    /// Score a line without mutating any state
    pub fn score(&self, line: &str) -> LineScore {
        let prepared = self.prepare(line);
        score_line(
            &self.model,
            &self.cfg,
            &prepared.template,
            &prepared.tokens,
            prepared.level,
        )
    }

    /// Score a line, feed the quantile estimators, then observe it
    pub fn score_and_observe(&mut self, line: &str) -> LineScore {
        let prepared = self.prepare(line);
        let score = score_line(
            &self.model,
            &self.cfg,
            &prepared.template,
            &prepared.tokens,
            prepared.level,
        );
        self.quantiles.update(score.novelty);
        self.apply(line, &prepared);
        score
    }

    /// Register one target quantile using the configured estimator variant
    pub fn register_quantile(&mut self, q: f64) -> Result<()> {
        let estimator = match self.cfg.estimator {
            EstimatorKind::P2 => Estimator::P2(P2Quantile::new(q)?),
            EstimatorKind::Window => {
                Estimator::Window(RollingQuantile::new(q, self.cfg.window)?)
            }
        };
        self.quantiles.register(estimator)
    }

    /// Estimate for a previously registered quantile
    pub fn quantile(&self, q: f64) -> Result<Option<f64>> {
        self.quantiles.estimate(q)
    }

    /// All registered estimates, ascending by quantile
    pub fn quantile_estimates(&self) -> Vec<(f64, Option<f64>)> {
        self.quantiles.estimates()
    }

    /// Alert threshold: the highest registered quantile's estimate
    pub fn threshold(&self) -> Option<f64> {
        self.quantiles.threshold()
    }

    /// True once burn-in has elapsed and the estimators have enough samples
    pub fn alert_ready(&self) -> bool {
        self.model.seen_lines() >= self.cfg.burn_in
            && self.quantiles.samples() >= MIN_ESTIMATOR_SAMPLES
    }

    /// Top-k context lines by cosine similarity
    pub fn neighbors(&self, tokens: &[String], k: usize) -> Vec<Neighbor> {
        self.neighbors.query(tokens, k)
    }

    /// Context for a line that was just observed, excluding the line itself
    pub fn context_neighbors(&self, tokens: &[String], k: usize) -> Vec<Neighbor> {
        self.neighbors.query_skipping_newest(tokens, k, 1)
    }

    /// Canonical template of a line, without scoring it
    pub fn template_of(&self, line: &str) -> String {
        self.canonicalizer.mask(line).text
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn seen_lines(&self) -> u64 {
        self.model.seen_lines()
    }

    /// Read-only counter snapshot
    pub fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            tokens: self.model.token_vocab(),
            templates: self.model.template_vocab(),
            seen_lines: self.model.seen_lines(),
            g: self.model.g(),
            total_token_mass: self.model.total_token_mass(),
            total_template_mass: self.model.total_template_mass(),
            truncated_lines: self.model.truncated_lines(),
            truncated_tokens: self.model.truncated_tokens(),
            renormalizations: self.model.renormalizations(),
            config: self.cfg.clone(),
        }
    }

    /// Serialize the current model state
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            config: self.cfg.clone(),
            token_counts: self.model.token_counts(),
            template_counts: self.model.template_counts(),
            g: self.model.g(),
            seen_lines: self.model.seen_lines(),
            total_token_mass: self.model.total_token_mass(),
            total_template_mass: self.model.total_template_mass(),
            truncated_lines: self.model.truncated_lines(),
            truncated_tokens: self.model.truncated_tokens(),
            renormalizations: self.model.renormalizations(),
            vocab_order: VocabOrder {
                tokens: self.model.token_order(),
                templates: self.model.template_order(),
            },
        }
    }

    /// Write a snapshot atomically to `path`
    pub fn snapshot_save(&self, path: &Path) -> Result<()> {
        self.snapshot().write(path)
    }

    /// Load a snapshot from `path` into a fresh engine
    pub fn snapshot_load(path: &Path) -> Result<Self> {
        Self::from_snapshot(Snapshot::read(path)?)
    }

    /// Rebuild an engine from a parsed snapshot, keeping its configuration
    pub fn from_snapshot(snap: Snapshot) -> Result<Self> {
        let cfg = snap.config.clone();
        Self::from_snapshot_with(snap, cfg)
    }

    /// Rebuild from a snapshot but run under `cfg` (weights, caps, decay);
    /// vocabularies beyond tighter caps are evicted by later observations
    pub fn from_snapshot_with(snap: Snapshot, cfg: EngineConfig) -> Result<Self> {
        cfg.validate()?;
        let model = InfoModel::from_snapshot_parts(
            &cfg,
            &snap.token_counts,
            &snap.template_counts,
            &snap.vocab_order.tokens,
            &snap.vocab_order.templates,
            snap.g,
            snap.seen_lines,
            snap.total_token_mass,
            snap.total_template_mass,
            snap.truncated_lines,
            snap.truncated_tokens,
            snap.renormalizations,
        );
        Ok(Self {
            canonicalizer: Canonicalizer::new(cfg.max_line_length),
            model,
            quantiles: QuantileBank::new(),
            neighbors: NeighborBuffer::new(cfg.neighbor_capacity),
            cfg,
        })
    }
}
