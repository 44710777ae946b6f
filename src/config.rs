//! Workspace configuration loaded from `gradebook.toml`.
//!
//! Every section falls back to defaults field by field, so a partial file is valid.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::calc::EffortMode;
use crate::grading::GradeBandPolicy;

pub const CONFIG_FILE_NAME: &str = "gradebook.toml";

pub const DEFAULT_MAX_BATCH_SIZE: usize = 5000;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 25;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradebookConfig {
    pub grading: GradeBandPolicy,
    pub aggregation: AggregationConfig,
    pub intake: IntakeConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub effort_mode: EffortMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Largest batch accepted by `scores.ingest`.
    pub max_batch_size: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub busy_timeout_ms: u64,
    /// Attempts per write transaction before a conflict is surfaced.
    pub max_write_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl GradebookConfig {
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let cfg: GradebookConfig = toml::from_str(raw).context("parse gradebook config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.grading.validate().map_err(anyhow::Error::msg)?;
        if self.intake.max_batch_size == 0 {
            anyhow::bail!("intake.max_batch_size must be > 0");
        }
        if self.storage.max_write_attempts == 0 {
            anyhow::bail!("storage.max_write_attempts must be > 0");
        }
        Ok(())
    }

    /// Reads `<workspace>/gradebook.toml`; a missing file yields defaults.
    pub fn load(workspace: &Path) -> anyhow::Result<Self> {
        let path = workspace.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("load {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = GradebookConfig::from_toml("").expect("parse");
        assert_eq!(cfg, GradebookConfig::default());
        assert_eq!(cfg.aggregation.effort_mode, EffortMode::LastAssessment);
        assert_eq!(cfg.storage.max_write_attempts, DEFAULT_MAX_WRITE_ATTEMPTS);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = GradebookConfig::from_toml(
            r#"
            [aggregation]
            effort_mode = "pooled"

            [storage]
            max_write_attempts = 7
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.aggregation.effort_mode, EffortMode::Pooled);
        assert_eq!(cfg.storage.max_write_attempts, 7);
        assert_eq!(cfg.storage.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
        assert_eq!(cfg.intake.max_batch_size, DEFAULT_MAX_BATCH_SIZE);
        assert_eq!(cfg.grading, GradeBandPolicy::default());
    }

    #[test]
    fn custom_bands_replace_the_table() {
        let cfg = GradebookConfig::from_toml(
            r#"
            [grading]
            bands = [
              { min = 85.0, grade = "H", remark = "Honours" },
              { min = 65.0, grade = "P", remark = "Pass" },
            ]
            fallback = { grade = "R", remark = "Resubmit" }
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.grading.classify(90.0), ("H", "Honours"));
        assert_eq!(cfg.grading.classify(10.0), ("R", "Resubmit"));
    }

    #[test]
    fn rejects_ascending_bands() {
        let err = GradebookConfig::from_toml(
            r#"
            [grading]
            bands = [
              { min = 50.0, grade = "P", remark = "Pass" },
              { min = 90.0, grade = "A", remark = "Top" },
            ]
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = GradebookConfig::load(dir.path()).expect("load");
        assert_eq!(cfg, GradebookConfig::default());
    }
}
