//! Versioned snapshot format for warm restart
//!
//! Snapshots are UTF-8 JSON. The writer always emits the current version
//! with one canonical key ordering; the reader tolerates versions 1 and 2 by
//! defaulting missing fields (and accepting the legacy mass field names).
//! Estimator and neighbor-buffer state are deliberately not persisted; they
//! rebuild from the live stream after a restart.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Version written by this build
pub const SNAPSHOT_VERSION: u64 = 3;

/// LRU orderings, least recently used first
#[derive(Debug, Clone, Default, Serialize)]
pub struct VocabOrder {
    pub tokens: Vec<String>,
    pub templates: Vec<String>,
}

/// Complete serializable model state
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub version: u64,
    pub config: EngineConfig,
    pub token_counts: BTreeMap<String, f64>,
    pub template_counts: BTreeMap<String, f64>,
    pub g: f64,
    pub seen_lines: u64,
    pub total_token_mass: f64,
    pub total_template_mass: f64,
    pub truncated_lines: u64,
    pub truncated_tokens: u64,
    pub renormalizations: u64,
    pub vocab_order: VocabOrder,
}

impl Snapshot {
    /// Serialize with the canonical key ordering
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::format("snapshot", e.to_string()))
    }

    /// Write atomically: temp file in the same directory, then rename
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Snapshot> {
        let text = fs::read_to_string(path)?;
        Snapshot::from_json(&text)
    }

    /// Parse and validate, naming the offending field on failure
    pub fn from_json(text: &str) -> Result<Snapshot> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| EngineError::format("<document>", e.to_string()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| EngineError::format("<document>", "expected a JSON object"))?;

        let version = match obj.get("version") {
            None => 1,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| EngineError::format("version", "expected an unsigned integer"))?,
        };
        if version > SNAPSHOT_VERSION {
            return Err(EngineError::format(
                "version",
                format!("unknown snapshot version {version} (newest supported is {SNAPSHOT_VERSION})"),
            ));
        }

        let config = match obj.get("config").or_else(|| obj.get("cfg")) {
            Some(v) => serde_json::from_value::<EngineConfig>(v.clone())
                .map_err(|e| EngineError::format("config", e.to_string()))?,
            None => EngineConfig::default(),
        };
        config
            .validate()
            .map_err(|e| EngineError::incompatible("config", e.to_string()))?;

        let g = opt_f64(obj, "g")?.unwrap_or(1.0);
        if !g.is_finite() || g <= 0.0 {
            return Err(EngineError::incompatible("g", format!("must be > 0, got {g}")));
        }

        let token_counts = counts(obj, "token_counts")?;
        let template_counts = counts(obj, "template_counts")?;

        let total_token_mass = mass(obj, "total_token_mass", "total_tokens")?;
        let total_template_mass = mass(obj, "total_template_mass", "total_templates")?;

        let vocab_order = match obj.get("vocab_order") {
            Some(v) => parse_vocab_order(v)?,
            None => VocabOrder {
                tokens: derived_order(&token_counts),
                templates: derived_order(&template_counts),
            },
        };

        Ok(Snapshot {
            version,
            config,
            token_counts,
            template_counts,
            g,
            seen_lines: opt_u64(obj, "seen_lines")?.unwrap_or(0),
            total_token_mass,
            total_template_mass,
            truncated_lines: opt_u64(obj, "truncated_lines")?.unwrap_or(0),
            truncated_tokens: opt_u64(obj, "truncated_tokens")?.unwrap_or(0),
            renormalizations: opt_u64(obj, "renormalizations")?.unwrap_or(0),
            vocab_order,
        })
    }
}

fn opt_f64(obj: &Map<String, Value>, field: &str) -> Result<Option<f64>> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| EngineError::format(field, "expected a number")),
    }
}

fn opt_u64(obj: &Map<String, Value>, field: &str) -> Result<Option<u64>> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| EngineError::format(field, "expected an unsigned integer")),
    }
}

fn mass(obj: &Map<String, Value>, field: &str, legacy: &str) -> Result<f64> {
    let value = match opt_f64(obj, field)? {
        Some(v) => Some(v),
        None => opt_f64(obj, legacy)?,
    };
    let value = value.unwrap_or(0.0);
    if !value.is_finite() || value < 0.0 {
        return Err(EngineError::incompatible(field, format!("must be >= 0, got {value}")));
    }
    Ok(value)
}

fn counts(obj: &Map<String, Value>, field: &str) -> Result<BTreeMap<String, f64>> {
    let Some(value) = obj.get(field) else {
        return Ok(BTreeMap::new());
    };
    let map = value
        .as_object()
        .ok_or_else(|| EngineError::format(field, "expected an object of counts"))?;
    let mut out = BTreeMap::new();
    for (key, v) in map {
        let count = v
            .as_f64()
            .ok_or_else(|| EngineError::format(field, format!("count for '{key}' is not a number")))?;
        if !count.is_finite() || count < 0.0 {
            return Err(EngineError::incompatible(
                field,
                format!("count for '{key}' must be >= 0, got {count}"),
            ));
        }
        out.insert(key.clone(), count);
    }
    Ok(out)
}

fn parse_vocab_order(value: &Value) -> Result<VocabOrder> {
    let obj = value
        .as_object()
        .ok_or_else(|| EngineError::format("vocab_order", "expected an object"))?;
    Ok(VocabOrder {
        tokens: string_list(obj, "tokens")?,
        templates: string_list(obj, "templates")?,
    })
}

fn string_list(obj: &Map<String, Value>, field: &str) -> Result<Vec<String>> {
    let Some(value) = obj.get(field) else {
        return Ok(Vec::new());
    };
    let list = value
        .as_array()
        .ok_or_else(|| EngineError::format("vocab_order", format!("'{field}' must be an array")))?;
    list.iter()
        .map(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                EngineError::format("vocab_order", format!("'{field}' entries must be strings"))
            })
        })
        .collect()
}

/// LRU order for snapshots that predate `vocab_order`: the order eviction
/// would prefer, lowest count first, then lexicographic
fn derived_order(counts: &BTreeMap<String, f64>) -> Vec<String> {
    let mut keys: Vec<&String> = counts.keys().collect();
    keys.sort_by(|a, b| {
        counts[*a]
            .partial_cmp(&counts[*b])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(b))
    });
    keys.into_iter().cloned().collect()
}
