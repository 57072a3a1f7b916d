//! Alert records and sinks
//!
//! The engine provides the score payload; the tail collaborator attaches a
//! timestamp, threshold context, and neighbors, then writes the record. Sink
//! failures are the caller's to log; they must never stop the tail loop.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::neighbors::Neighbor;
use crate::score::{LineScore, TokenContribution};

/// Contributors listed per alert; the long tail adds noise, not signal
pub const MAX_ALERT_CONTRIBUTORS: usize = 10;

/// One emitted alert, serialized as a single JSON object
#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    pub timestamp: Option<String>,
    pub level: String,
    pub novelty: f64,
    pub score: f64,
    pub token_info_bits: f64,
    pub template_info_bits: f64,
    pub level_bonus: f64,
    pub template: String,
    pub template_probability: f64,
    pub tokens: Vec<String>,
    pub token_contributors: Vec<TokenContribution>,
    pub line: String,
    pub threshold: Option<f64>,
    pub quantile: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantile_estimates: Option<BTreeMap<String, f64>>,
    pub neighbors: Vec<Neighbor>,
}

impl AlertRecord {
    /// Assemble a record from the score payload and the tail-side context
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        score: &LineScore,
        line: &str,
        timestamp: Option<String>,
        level_hint: Option<&str>,
        threshold: Option<f64>,
        quantile: Option<f64>,
        quantile_estimates: Option<BTreeMap<String, f64>>,
        neighbors: Vec<Neighbor>,
    ) -> Self {
        let mut token_contributors = score.token_contributors.clone();
        token_contributors.truncate(MAX_ALERT_CONTRIBUTORS);
        Self {
            timestamp,
            level: level_hint
                .map(str::to_string)
                .unwrap_or_else(|| score.level.to_string()),
            novelty: score.novelty,
            score: score.raw_score,
            token_info_bits: score.token_info_bits,
            template_info_bits: score.template_info_bits,
            level_bonus: score.level_bonus,
            template: score.template.clone(),
            template_probability: score.template_probability,
            tokens: score.tokens.clone(),
            token_contributors,
            line: line.to_string(),
            threshold,
            quantile,
            quantile_estimates,
            neighbors,
        }
    }
}

/// Appends one JSON object per alert, flushing after each write
pub struct JsonlSink {
    writer: BufWriter<File>,
}

impl JsonlSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn emit(&mut self, alert: &AlertRecord) -> io::Result<()> {
        let json = serde_json::to_string(alert)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()
    }
}
