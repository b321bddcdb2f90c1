use std::env;
use std::path::PathBuf;

use crate::error::RowError;
use crate::history::default_db_path;
use crate::poisson::validate_max_goals;
use crate::ranker::OpportunityPolicy;
use crate::team_index::DEFAULT_CUTOFF;

pub const DEFAULT_MAX_GOALS_BATCH: u32 = 5;
pub const DEFAULT_MAX_GOALS_SINGLE: u32 = 10;
const DEFAULT_PARALLELISM: usize = 4;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub db_path: Option<PathBuf>,
    /// Grid size for batch scans; larger is more accurate and slower.
    pub max_goals_batch: u32,
    /// Grid size for single-match predictions.
    pub max_goals_single: u32,
    pub resolve_cutoff: f64,
    pub policy: OpportunityPolicy,
    pub parallelism: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            max_goals_batch: DEFAULT_MAX_GOALS_BATCH,
            max_goals_single: DEFAULT_MAX_GOALS_SINGLE,
            resolve_cutoff: DEFAULT_CUTOFF,
            policy: OpportunityPolicy::default(),
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, RowError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RowError> {
        let mut cfg = EngineConfig::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(path) = get("FAIRODDS_DB") {
            cfg.db_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = get("FAIRODDS_MAX_GOALS_BATCH") {
            cfg.max_goals_batch = parse_max_goals("FAIRODDS_MAX_GOALS_BATCH", &raw)?;
        }
        if let Some(raw) = get("FAIRODDS_MAX_GOALS_SINGLE") {
            cfg.max_goals_single = parse_max_goals("FAIRODDS_MAX_GOALS_SINGLE", &raw)?;
        }
        if let Some(cutoff) = get("FAIRODDS_RESOLVE_CUTOFF").and_then(|v| v.parse::<f64>().ok()) {
            cfg.resolve_cutoff = clamp_cutoff(cutoff);
        }
        if let Some(min_over) =
            get("FAIRODDS_OPPORTUNITY_MIN_OVER").and_then(|v| v.parse::<f64>().ok())
        {
            cfg.policy.min_over_probability = min_over.clamp(0.0, 1.0);
        }
        if let Some(raw) = get("FAIRODDS_OPPORTUNITY_INCLUDE_DRAW") {
            cfg.policy.include_draw = parse_bool(&raw);
        }
        if let Some(threads) = get("FAIRODDS_PARALLELISM").and_then(|v| v.parse::<usize>().ok()) {
            cfg.parallelism = threads.clamp(1, 32);
        }
        Ok(cfg)
    }
}

pub fn parse_max_goals(key: &str, raw: &str) -> Result<u32, RowError> {
    let value = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| RowError::InvalidInput(format!("{key} must be an integer (got '{raw}')")))?;
    validate_max_goals(value)
}

/// The cutoff lives in (0, 1]; zero would accept every indexed name.
pub fn clamp_cutoff(cutoff: f64) -> f64 {
    if cutoff.is_nan() {
        return DEFAULT_CUTOFF;
    }
    cutoff.clamp(0.01, 1.0)
}

fn parse_bool(raw: &str) -> bool {
    let t = raw.trim().to_ascii_lowercase();
    !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn cfg_from(pairs: &[(&str, &str)]) -> Result<EngineConfig, RowError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = cfg_from(&[]).unwrap();
        assert_eq!(cfg.max_goals_batch, 5);
        assert_eq!(cfg.max_goals_single, 10);
        assert_eq!(cfg.resolve_cutoff, 0.4);
        assert!(!cfg.policy.include_draw);
        assert_eq!(cfg.policy.min_over_probability, 0.60);
        assert_eq!(cfg.parallelism, 4);
    }

    #[test]
    fn reads_overrides() {
        let cfg = cfg_from(&[
            ("FAIRODDS_DB", "/tmp/x.sqlite"),
            ("FAIRODDS_MAX_GOALS_BATCH", "8"),
            ("FAIRODDS_MAX_GOALS_SINGLE", " 12 "),
            ("FAIRODDS_RESOLVE_CUTOFF", "0.6"),
            ("FAIRODDS_OPPORTUNITY_MIN_OVER", "0.55"),
            ("FAIRODDS_OPPORTUNITY_INCLUDE_DRAW", "yes"),
            ("FAIRODDS_PARALLELISM", "64"),
        ])
        .unwrap();
        assert_eq!(cfg.db_path, Some(PathBuf::from("/tmp/x.sqlite")));
        assert_eq!(cfg.max_goals_batch, 8);
        assert_eq!(cfg.max_goals_single, 12);
        assert_eq!(cfg.resolve_cutoff, 0.6);
        assert_eq!(cfg.policy.min_over_probability, 0.55);
        assert!(cfg.policy.include_draw);
        assert_eq!(cfg.parallelism, 32);
    }

    #[test]
    fn negative_grid_is_an_input_error() {
        let err = cfg_from(&[("FAIRODDS_MAX_GOALS_BATCH", "-3")]).unwrap_err();
        assert!(matches!(err, RowError::InvalidInput(_)));
        assert!(cfg_from(&[("FAIRODDS_MAX_GOALS_SINGLE", "ten")]).is_err());
    }

    #[test]
    fn cutoff_is_kept_in_range() {
        assert_eq!(clamp_cutoff(0.0), 0.01);
        assert_eq!(clamp_cutoff(3.0), 1.0);
        assert_eq!(clamp_cutoff(f64::NAN), DEFAULT_CUTOFF);
    }
}
