//! Online decayed-frequency model over tokens and templates
//!
//! Counts are stored unscaled; the effective count of an entry is
//! `stored * g` where `g` is a single model-wide scale factor multiplied by
//! the decay once per observed line. This keeps decay O(1) regardless of
//! vocabulary size. When `g` underflows the renormalization threshold the
//! scale is folded into every stored count and reset to 1.
//!
//! Vocabularies are bounded: beyond the configured caps the
//! least-recently-used entry is evicted, never touching entries of the line
//! currently being applied. Ties among equally stale entries break by lowest
//! effective count, then lexicographically.

use std::collections::{BTreeMap, BTreeSet};

use ahash::{AHashMap, AHashSet};

use crate::config::EngineConfig;

/// Renormalize once the global scale drops below this
pub(crate) const RENORM_MIN_SCALE: f64 = 1e-12;

/// Floor for probabilities fed into log2
const MIN_PROBABILITY: f64 = 1e-12;

#[derive(Debug, Clone)]
struct FeatureEntry {
    stored: f64,
    last_used: u64,
}

/// A bounded count map with O(1) touch and amortized O(1) LRU eviction
#[derive(Debug, Default)]
struct FeatureMap {
    entries: AHashMap<String, FeatureEntry>,
    /// last-use tick -> keys touched at that tick, oldest bucket first
    by_last_use: BTreeMap<u64, BTreeSet<String>>,
}

impl FeatureMap {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn stored(&self, key: &str) -> f64 {
        self.entries.get(key).map_or(0.0, |e| e.stored)
    }

    fn bump(&mut self, key: &str, increment: f64, now: u64) {
        if let Some(entry) = self.entries.get_mut(key) {
            if entry.last_used != now {
                detach(&mut self.by_last_use, entry.last_used, key);
                self.by_last_use.entry(now).or_default().insert(key.to_string());
                entry.last_used = now;
            }
            entry.stored += increment;
        } else {
            self.entries.insert(
                key.to_string(),
                FeatureEntry {
                    stored: increment,
                    last_used: now,
                },
            );
            self.by_last_use.entry(now).or_default().insert(key.to_string());
        }
    }

    /// Evict the LRU entry not in `keep`; returns the removed stored count
    fn evict_excluding(&mut self, keep: &AHashSet<&str>) -> Option<f64> {
        let mut victim: Option<(u64, String)> = None;
        for (&tick, bucket) in &self.by_last_use {
            let candidate = bucket
                .iter()
                .filter(|key| !keep.contains(key.as_str()))
                .min_by(|a, b| {
                    let (ca, cb) = (self.entries[*a].stored, self.entries[*b].stored);
                    ca.partial_cmp(&cb)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.cmp(b))
                });
            if let Some(key) = candidate {
                victim = Some((tick, key.clone()));
                break;
            }
        }
        let (tick, key) = victim?;
        detach(&mut self.by_last_use, tick, &key);
        self.entries.remove(&key).map(|e| e.stored)
    }

    fn scale_all(&mut self, factor: f64) -> f64 {
        let mut sum = 0.0;
        for entry in self.entries.values_mut() {
            entry.stored *= factor;
            sum += entry.stored;
        }
        sum
    }

    fn counts(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e.stored))
    }

    /// Keys from least to most recently used (lexicographic within a tick)
    fn order(&self) -> Vec<String> {
        self.by_last_use
            .values()
            .flat_map(|bucket| bucket.iter().cloned())
            .collect()
    }

    /// Rebuild from snapshot counts plus an LRU ordering (oldest first);
    /// counts absent from the ordering are appended as most recent
    fn from_parts(counts: &BTreeMap<String, f64>, order: &[String]) -> (Self, u64) {
        let mut map = FeatureMap::default();
        let mut tick = 0u64;
        for key in order {
            if let Some(&stored) = counts.get(key) {
                tick += 1;
                map.entries.insert(
                    key.clone(),
                    FeatureEntry {
                        stored,
                        last_used: tick,
                    },
                );
                map.by_last_use.entry(tick).or_default().insert(key.clone());
            }
        }
        for (key, &stored) in counts {
            if !map.entries.contains_key(key) {
                tick += 1;
                map.entries.insert(
                    key.clone(),
                    FeatureEntry {
                        stored,
                        last_used: tick,
                    },
                );
                map.by_last_use.entry(tick).or_default().insert(key.clone());
            }
        }
        (map, tick)
    }
}

fn detach(index: &mut BTreeMap<u64, BTreeSet<String>>, tick: u64, key: &str) {
    if let Some(bucket) = index.get_mut(&tick) {
        bucket.remove(key);
        if bucket.is_empty() {
            index.remove(&tick);
        }
    }
}

/// The streaming frequency model
#[derive(Debug)]
pub struct InfoModel {
    decay: f64,
    laplace_k: f64,
    max_tokens: usize,
    max_templates: usize,
    tokens: FeatureMap,
    templates: FeatureMap,
    g: f64,
    total_token_mass: f64,
    total_template_mass: f64,
    seen_lines: u64,
    clock: u64,
    truncated_lines: u64,
    truncated_tokens: u64,
    renormalizations: u64,
}

impl InfoModel {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            decay: cfg.decay,
            laplace_k: cfg.laplace_k,
            max_tokens: cfg.max_tokens,
            max_templates: cfg.max_templates,
            tokens: FeatureMap::default(),
            templates: FeatureMap::default(),
            g: 1.0,
            total_token_mass: 0.0,
            total_template_mass: 0.0,
            seen_lines: 0,
            clock: 0,
            truncated_lines: 0,
            truncated_tokens: 0,
            renormalizations: 0,
        }
    }

    /// Apply one line's observation: decay, count updates, then eviction
    pub fn observe(&mut self, template: &str, tokens: &[String]) {
        self.seen_lines += 1;
        self.clock += 1;

        // Decay applies before the increments; the very first observation
        // therefore runs at g = decay (snapshot compatibility).
        self.g *= self.decay;
        self.total_token_mass *= self.decay;
        self.total_template_mass *= self.decay;
        if self.g < RENORM_MIN_SCALE {
            self.renormalize();
        }

        if tokens.is_empty() {
            return;
        }

        let inv_g = 1.0 / self.g;
        self.templates.bump(template, inv_g, self.clock);
        self.total_template_mass += 1.0;
        for token in tokens {
            self.tokens.bump(token, inv_g, self.clock);
            self.total_token_mass += 1.0;
        }

        if self.tokens.len() > self.max_tokens {
            let keep: AHashSet<&str> = tokens.iter().map(String::as_str).collect();
            while self.tokens.len() > self.max_tokens {
                match self.tokens.evict_excluding(&keep) {
                    Some(stored) => {
                        self.total_token_mass = (self.total_token_mass - stored * self.g).max(0.0);
                    }
                    None => break,
                }
            }
        }
        if self.templates.len() > self.max_templates {
            let keep: AHashSet<&str> = std::iter::once(template).collect();
            while self.templates.len() > self.max_templates {
                match self.templates.evict_excluding(&keep) {
                    Some(stored) => {
                        self.total_template_mass =
                            (self.total_template_mass - stored * self.g).max(0.0);
                    }
                    None => break,
                }
            }
        }
    }

    /// Fold the scale factor into every stored count and reset it
    fn renormalize(&mut self) {
        let g = self.g;
        self.total_token_mass = self.tokens.scale_all(g);
        self.total_template_mass = self.templates.scale_all(g);
        self.g = 1.0;
        self.renormalizations += 1;
    }

    fn probability(&self, effective: f64, mass: f64, vocab: usize) -> f64 {
        (effective + self.laplace_k) / (mass + self.laplace_k * (vocab as f64 + 1.0))
    }

    /// Smoothed probability of a token; unseen tokens use a zero count
    pub fn token_probability(&self, token: &str) -> f64 {
        let effective = self.tokens.stored(token) * self.g;
        self.probability(effective, self.total_token_mass, self.tokens.len())
    }

    /// Self-information of a token in bits
    pub fn token_bits(&self, token: &str) -> f64 {
        -self.token_probability(token).max(MIN_PROBABILITY).log2()
    }

    /// Smoothed probability of a template
    pub fn template_probability(&self, template: &str) -> f64 {
        let effective = self.templates.stored(template) * self.g;
        self.probability(effective, self.total_template_mass, self.templates.len())
    }

    /// Self-information of a template in bits
    pub fn template_bits(&self, template: &str) -> f64 {
        -self.template_probability(template).max(MIN_PROBABILITY).log2()
    }

    /// Decayed count of a token as currently modeled
    pub fn token_effective_count(&self, token: &str) -> f64 {
        self.tokens.stored(token) * self.g
    }

    pub fn token_vocab(&self) -> usize {
        self.tokens.len()
    }

    pub fn template_vocab(&self) -> usize {
        self.templates.len()
    }

    pub fn seen_lines(&self) -> u64 {
        self.seen_lines
    }

    pub fn g(&self) -> f64 {
        self.g
    }

    pub fn total_token_mass(&self) -> f64 {
        self.total_token_mass
    }

    pub fn total_template_mass(&self) -> f64 {
        self.total_template_mass
    }

    pub fn truncated_lines(&self) -> u64 {
        self.truncated_lines
    }

    pub fn truncated_tokens(&self) -> u64 {
        self.truncated_tokens
    }

    pub fn renormalizations(&self) -> u64 {
        self.renormalizations
    }

    pub(crate) fn note_truncated_line(&mut self) {
        self.truncated_lines += 1;
    }

    pub(crate) fn note_truncated_tokens(&mut self) {
        self.truncated_tokens += 1;
    }

    pub(crate) fn token_counts(&self) -> BTreeMap<String, f64> {
        self.tokens.counts().map(|(k, v)| (k.to_string(), v)).collect()
    }

    pub(crate) fn template_counts(&self) -> BTreeMap<String, f64> {
        self.templates.counts().map(|(k, v)| (k.to_string(), v)).collect()
    }

    pub(crate) fn token_order(&self) -> Vec<String> {
        self.tokens.order()
    }

    pub(crate) fn template_order(&self) -> Vec<String> {
        self.templates.order()
    }

    /// Rebuild a model from snapshot fields
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_snapshot_parts(
        cfg: &EngineConfig,
        token_counts: &BTreeMap<String, f64>,
        template_counts: &BTreeMap<String, f64>,
        token_order: &[String],
        template_order: &[String],
        g: f64,
        seen_lines: u64,
        total_token_mass: f64,
        total_template_mass: f64,
        truncated_lines: u64,
        truncated_tokens: u64,
        renormalizations: u64,
    ) -> Self {
        let (tokens, token_tick) = FeatureMap::from_parts(token_counts, token_order);
        let (templates, template_tick) = FeatureMap::from_parts(template_counts, template_order);
        Self {
            decay: cfg.decay,
            laplace_k: cfg.laplace_k,
            max_tokens: cfg.max_tokens,
            max_templates: cfg.max_templates,
            tokens,
            templates,
            g,
            total_token_mass,
            total_template_mass,
            seen_lines,
            clock: seen_lines.max(token_tick).max(template_tick),
            truncated_lines,
            truncated_tokens,
            renormalizations,
        }
    }

    #[cfg(test)]
    fn mass_drift(&self) -> f64 {
        let token_sum: f64 = self.tokens.counts().map(|(_, v)| v).sum::<f64>() * self.g;
        (token_sum - self.total_token_mass).abs()
    }
}
