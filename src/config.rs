// src/config.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dedup::DedupConfig;
use crate::digest::DigestConfig;
use crate::rank::RankingWeights;

pub const ENV_CONFIG_PATH: &str = "DIGEST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/digest.toml";
pub const ENV_WINDOW_DAYS: &str = "DIGEST_WINDOW_DAYS";
pub const ENV_COGNITIVE_BUDGET: &str = "DIGEST_COGNITIVE_BUDGET";
pub const ENV_TIME_BUDGET_SECS: &str = "DIGEST_TIME_BUDGET_SECS";

const MAX_WINDOW_DAYS: u32 = 365;
const MAX_COGNITIVE_BUDGET: usize = 50;
const MAX_TIME_BUDGET_SECS: f32 = 86_400.0;

/// Everything tunable about the pipeline. Every section and field is optional
/// in TOML.
///
/// ```toml
/// [dedup]
/// window_days = 7
/// title_threshold = 0.9
///
/// [ranking]
/// topic = 0.4
///
/// [digest]
/// cognitive_budget = 7
/// time_budget_secs = 180.0
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dedup: DedupConfig,
    pub ranking: RankingWeights,
    pub digest: DigestConfig,
}

impl PipelineConfig {
    /// Resolve and load config:
    /// 1) `$DIGEST_CONFIG_PATH` (must exist)
    /// 2) `config/digest.toml` (defaults when absent)
    ///
    /// then apply env overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => Self::load_from(Path::new(&p))?,
            Err(_) => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load_from(&default)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing pipeline config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: PipelineConfig = toml::from_str(s)?;
        Ok(cfg.sanitized())
    }

    /// Clamp thresholds to `[0, 1]`, weights to non-negative, budgets to sane
    /// ranges.
    pub fn sanitized(mut self) -> Self {
        let d = &mut self.dedup;
        for t in [
            &mut d.title_threshold,
            &mut d.content_threshold,
            &mut d.fuzzy_threshold,
        ] {
            *t = if t.is_finite() { (*t).clamp(0.0, 1.0) } else { 1.0 };
        }
        d.window_days = d.window_days.clamp(1, MAX_WINDOW_DAYS);
        self.ranking = self.ranking.sanitized();
        let g = &mut self.digest;
        g.cognitive_budget = g.cognitive_budget.min(MAX_COGNITIVE_BUDGET);
        if !g.time_budget_secs.is_finite() || g.time_budget_secs < 0.0 {
            g.time_budget_secs = DigestConfig::default().time_budget_secs;
        }
        g.time_budget_secs = g.time_budget_secs.min(MAX_TIME_BUDGET_SECS);
        self
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(days) = parse_u32_env(std::env::var(ENV_WINDOW_DAYS).ok()) {
            self.dedup.window_days = days.clamp(1, MAX_WINDOW_DAYS);
        }
        if let Some(n) = parse_u32_env(std::env::var(ENV_COGNITIVE_BUDGET).ok()) {
            self.digest.cognitive_budget = (n as usize).min(MAX_COGNITIVE_BUDGET);
        }
        if let Some(secs) = parse_secs_env(std::env::var(ENV_TIME_BUDGET_SECS).ok()) {
            self.digest.time_budget_secs = secs;
        }
    }
}

fn parse_u32_env(raw: Option<String>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
}

fn parse_secs_env(raw: Option<String>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, MAX_TIME_BUDGET_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_all_defaults() {
        assert_eq!(PipelineConfig::from_toml_str("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
            [dedup]
            window_days = 3
            title_threshold = 1.5

            [digest]
            cognitive_budget = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.dedup.window_days, 3);
        assert_eq!(cfg.dedup.title_threshold, 1.0);
        assert_eq!(cfg.dedup.body_candidates, 50);
        assert_eq!(cfg.digest.cognitive_budget, 5);
        assert_eq!(cfg.digest.time_budget_secs, 180.0);
        assert_eq!(cfg.ranking, RankingWeights::default());
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(PipelineConfig::from_toml_str("[dedup]\nwindow_days = \"x\"").is_err());
    }

    #[test]
    fn env_parsers_ignore_garbage() {
        assert_eq!(parse_u32_env(Some(" 14 ".into())), Some(14));
        assert_eq!(parse_u32_env(Some("-1".into())), None);
        assert_eq!(parse_u32_env(None), None);
        assert_eq!(parse_secs_env(Some("NaN".into())), None);
        assert_eq!(parse_secs_env(Some("-5".into())), Some(0.0));
        assert_eq!(parse_secs_env(Some("240".into())), Some(240.0));
    }
}
