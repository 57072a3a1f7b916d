//! Scoring: weighted self-information combined into a bounded novelty
//!
//! The scorer is pure with respect to model state; scoring the same line
//! twice without an intervening observation yields identical payloads.

use serde::Serialize;

use crate::config::EngineConfig;
use crate::model::InfoModel;
use crate::tokenize::Level;

/// One token's share of the explanation, sorted most surprising first
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TokenContribution {
    pub token: String,
    /// Self-information of the token under the current model
    pub bits: f64,
    /// Smoothed probability backing `bits`
    #[serde(rename = "prob")]
    pub probability: f64,
    /// Decayed count of the token in the model
    #[serde(rename = "freq")]
    pub effective_count: f64,
}

/// Full score payload for one line
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LineScore {
    /// Bounded novelty in [0, 1)
    pub novelty: f64,
    /// Unbounded weighted information score
    pub raw_score: f64,
    /// Average self-information over the line's tokens
    pub token_info_bits: f64,
    /// Self-information of the canonical template
    pub template_info_bits: f64,
    /// Severity contribution
    pub level_bonus: f64,
    /// Canonical template of the line
    pub template: String,
    /// Smoothed probability of the template
    pub template_probability: f64,
    /// Tokens the line produced (bigrams included when enabled)
    pub tokens: Vec<String>,
    /// Per-token breakdown, bits descending
    pub token_contributors: Vec<TokenContribution>,
    /// Severity extracted from the leading tokens
    pub level: Level,
}

/// Score a prepared line against the model
pub(crate) fn score_line(
    model: &InfoModel,
    cfg: &EngineConfig,
    template: &str,
    tokens: &[String],
    level: Level,
) -> LineScore {
    let token_info_bits = if tokens.is_empty() {
        0.0
    } else {
        let total: f64 = tokens.iter().map(|t| model.token_bits(t)).sum();
        total / tokens.len() as f64
    };
    let template_info_bits = model.template_bits(template);
    let level_bonus = level.bonus();
    let raw_score = cfg.w_token * token_info_bits
        + cfg.w_template * template_info_bits
        + cfg.w_level * level_bonus;

    let effective_len = tokens.len().max(1) as f64;
    let novelty = 1.0 - (-raw_score.max(0.0) / effective_len).exp();

    LineScore {
        novelty,
        raw_score,
        token_info_bits,
        template_info_bits,
        level_bonus,
        template: template.to_string(),
        template_probability: model.template_probability(template),
        tokens: tokens.to_vec(),
        token_contributors: contributors(model, tokens),
        level,
    }
}

/// Unique tokens with their surprisal, sorted by bits descending then name
fn contributors(model: &InfoModel, tokens: &[String]) -> Vec<TokenContribution> {
    let mut seen = std::collections::BTreeSet::new();
    let mut out: Vec<TokenContribution> = tokens
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .map(|token| TokenContribution {
            token: token.clone(),
            bits: model.token_bits(token),
            probability: model.token_probability(token),
            effective_count: model.token_effective_count(token),
        })
        .collect();
    out.sort_by(|a, b| {
        b.bits
            .partial_cmp(&a.bits)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.token.cmp(&b.token))
    });
    out
}
