//! Read-only counter snapshot for logging or HTTP exposure

use serde::Serialize;

use crate::config::EngineConfig;

/// Internal counters plus the active configuration; never mutates the engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineMetrics {
    pub tokens: usize,
    pub templates: usize,
    pub seen_lines: u64,
    pub g: f64,
    pub total_token_mass: f64,
    pub total_template_mass: f64,
    pub truncated_lines: u64,
    pub truncated_tokens: u64,
    pub renormalizations: u64,
    pub config: EngineConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_serialize_to_flat_json() {
        let metrics = EngineMetrics {
            tokens: 10,
            templates: 4,
            seen_lines: 25,
            g: 0.998,
            total_token_mass: 50.0,
            total_template_mass: 25.0,
            truncated_lines: 1,
            truncated_tokens: 0,
            renormalizations: 0,
            config: EngineConfig::default(),
        };
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["tokens"], 10);
        assert_eq!(json["seen_lines"], 25);
        assert!(json["config"]["decay"].as_f64().unwrap() > 0.0);
    }
}
