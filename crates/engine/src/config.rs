//! Layered solver configuration (§2.1 C9): built-in defaults, overridden by
//! an optional TOML file, overridden by `CLNSCHED_*` environment variables.
//! There is no network or secrets configuration here since the crate has no
//! HTTP layer in scope.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{EngineError, Result};

/// Per-preset seeds, in A/B/C order, matching the teacher's deterministic
/// multi-solve variety driver (§4.4).
pub const DEFAULT_PRESET_SEEDS: [u64; 3] = [42, 137, 271];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Wall-clock budget for a single-solve run, in seconds.
    pub single_solve_time_seconds: f64,
    /// Wall-clock budget for each preset in a multi-solve run, in seconds.
    pub multi_solve_time_seconds_per_preset: f64,
    /// Seeds for presets A, B, C respectively.
    pub preset_seeds: [u64; 3],
    /// Soft-constraint weight table, overridable per deployment.
    pub weights: WeightConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            single_solve_time_seconds: 30.0,
            multi_solve_time_seconds_per_preset: 20.0,
            preset_seeds: DEFAULT_PRESET_SEEDS,
            weights: WeightConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    pub min_staff_shortfall_per_head: i64,
    pub overwork_per_excess_block: i64,
    pub event_penalty_high: i64,
    pub event_penalty_medium: i64,
    pub event_penalty_low: i64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        WeightConfig {
            min_staff_shortfall_per_head: 500,
            overwork_per_excess_block: 200,
            event_penalty_high: 800,
            event_penalty_medium: 400,
            event_penalty_low: 100,
        }
    }
}

impl Config {
    /// Loads defaults, then overlays an optional TOML file, then overlays
    /// `CLNSCHED_*` environment variables. Unknown TOML keys are rejected
    /// (typo guard); unknown environment variables are ignored.
    pub fn load(toml_path: Option<&Path>) -> Result<Config> {
        let mut cfg = Config::default();

        if let Some(path) = toml_path {
            let text = std::fs::read_to_string(path).map_err(|e| EngineError::Validation {
                field: "config_path".to_string(),
                reason: format!("could not read {}: {e}", path.display()),
            })?;
            cfg = toml::from_str(&text).map_err(|e| EngineError::Validation {
                field: "config_file".to_string(),
                reason: e.to_string(),
            })?;
        }

        cfg.apply_env_overrides(&std::env::vars().collect());
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self, vars: &HashMap<String, String>) {
        if let Some(v) = vars.get("CLNSCHED_SINGLE_SOLVE_TIME_SECONDS").and_then(|s| s.parse().ok()) {
            self.single_solve_time_seconds = v;
        }
        if let Some(v) = vars
            .get("CLNSCHED_MULTI_SOLVE_TIME_SECONDS_PER_PRESET")
            .and_then(|s| s.parse().ok())
        {
            self.multi_solve_time_seconds_per_preset = v;
        }
        if let Some(v) = vars.get("CLNSCHED_PRESET_SEED_A").and_then(|s| s.parse().ok()) {
            self.preset_seeds[0] = v;
        }
        if let Some(v) = vars.get("CLNSCHED_PRESET_SEED_B").and_then(|s| s.parse().ok()) {
            self.preset_seeds[1] = v;
        }
        if let Some(v) = vars.get("CLNSCHED_PRESET_SEED_C").and_then(|s| s.parse().ok()) {
            self.preset_seeds[2] = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.single_solve_time_seconds, 30.0);
        assert_eq!(cfg.multi_solve_time_seconds_per_preset, 20.0);
        assert_eq!(cfg.preset_seeds, [42, 137, 271]);
    }

    #[test]
    fn env_override_applies() {
        let mut cfg = Config::default();
        let mut vars = HashMap::new();
        vars.insert("CLNSCHED_PRESET_SEED_A".to_string(), "7".to_string());
        cfg.apply_env_overrides(&vars);
        assert_eq!(cfg.preset_seeds[0], 7);
        assert_eq!(cfg.preset_seeds[1], 137);
    }
}
