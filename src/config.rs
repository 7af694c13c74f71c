//! Configuration for the pipeline.
//!
//! Persisted defaults live in ~/.config/taskforge/config.json; CLI flags
//! override them per run. The resulting [`PipelineConfig`] is built once
//! in `main` and passed down; nothing here is global state.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Independent retry ceilings, counted from zero per task.
///
/// Build repair after a design fix is typically smaller churn than the
/// cold-start repair, so it gets its own cap to bound total external
/// calls per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudget {
    /// Corrective generate/build rounds after the initial build check.
    pub build_repair: u32,
    /// Design-review fix iterations.
    pub design_iterations: u32,
    /// Build repair rounds nested inside a design iteration.
    pub post_design_build: u32,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            build_repair: 3,
            design_iterations: 2,
            post_design_build: 2,
        }
    }
}

/// On-disk settings, all optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FileConfig {
    #[serde(default)]
    generate_model: Option<String>,
    #[serde(default)]
    review_model: Option<String>,
    #[serde(default)]
    budgets: Option<RetryBudget>,
    #[serde(default)]
    fuzzy_threshold: Option<f64>,
    #[serde(default)]
    rerun_hook_after_fallback: Option<bool>,
    #[serde(default)]
    request_timeout_secs: Option<u64>,
    #[serde(default)]
    build_timeout_secs: Option<u64>,
    #[serde(default)]
    max_diagnostics: Option<usize>,
}

/// Everything the orchestrator and collaborator adapters need, resolved
/// once at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub budgets: RetryBudget,
    /// Acceptance threshold for the fuzzy patch tier.
    pub fuzzy_threshold: f64,
    /// Whether the full-overwrite fallback after a failed patch re-runs
    /// the content-enhancement hook.
    pub rerun_hook_after_fallback: bool,
    /// Model for generation, build fixes and design fixes.
    pub generate_model: String,
    /// Model for design review.
    pub review_model: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Ceiling for one build-validator invocation.
    pub build_timeout: Duration,
    /// Cap on diagnostic lines kept from one build run.
    pub max_diagnostics: usize,
    /// Shared attempt budget for one external round trip.
    pub call_attempts: u32,
    /// Base delay for transient-failure backoff.
    pub backoff_base: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            budgets: RetryBudget::default(),
            fuzzy_threshold: crate::patch::DEFAULT_FUZZY_THRESHOLD,
            rerun_hook_after_fallback: true,
            generate_model: crate::llm::Model::Generate.id().to_string(),
            review_model: crate::llm::Model::Review.id().to_string(),
            request_timeout: Duration::from_secs(180),
            build_timeout: Duration::from_secs(600),
            max_diagnostics: 40,
            call_attempts: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

impl PipelineConfig {
    /// Load persisted defaults, falling back to built-ins. A corrupt
    /// config file is preserved next to the original and ignored.
    pub fn load() -> Self {
        let mut config = Self::default();
        let Some(path) = config_path() else {
            return config;
        };
        let Ok(content) = fs::read_to_string(&path) else {
            return config;
        };
        match serde_json::from_str::<FileConfig>(&content) {
            Ok(file) => config.merge_file(file),
            Err(err) => {
                preserve_corrupt_config(&path, &content);
                eprintln!(
                    "  Warning: Config file was corrupted ({}). A backup was saved and defaults were loaded.",
                    err
                );
            }
        }
        config
    }

    fn merge_file(&mut self, file: FileConfig) {
        if let Some(model) = file.generate_model {
            self.generate_model = model;
        }
        if let Some(model) = file.review_model {
            self.review_model = model;
        }
        if let Some(budgets) = file.budgets {
            self.budgets = budgets;
        }
        if let Some(threshold) = file.fuzzy_threshold {
            self.fuzzy_threshold = threshold.clamp(0.0, 1.0);
        }
        if let Some(rerun) = file.rerun_hook_after_fallback {
            self.rerun_hook_after_fallback = rerun;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.build_timeout_secs {
            self.build_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = file.max_diagnostics {
            self.max_diagnostics = max.max(1);
        }
    }
}

/// The OpenRouter API key, environment only. Missing credentials are a
/// fatal startup error, checked before any task is consumed.
pub fn api_key() -> Option<String> {
    std::env::var("OPENROUTER_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("taskforge").join("config.json"))
}

fn preserve_corrupt_config(path: &std::path::Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budgets() {
        let config = PipelineConfig::default();
        assert_eq!(config.budgets.build_repair, 3);
        assert_eq!(config.budgets.design_iterations, 2);
        assert_eq!(config.budgets.post_design_build, 2);
    }

    #[test]
    fn test_merge_clamps_fuzzy_threshold() {
        let mut config = PipelineConfig::default();
        config.merge_file(FileConfig {
            fuzzy_threshold: Some(1.7),
            ..Default::default()
        });
        assert_eq!(config.fuzzy_threshold, 1.0);
    }

    #[test]
    fn test_merge_keeps_defaults_for_absent_fields() {
        let mut config = PipelineConfig::default();
        let default_model = config.generate_model.clone();
        config.merge_file(FileConfig {
            max_diagnostics: Some(10),
            ..Default::default()
        });
        assert_eq!(config.generate_model, default_model);
        assert_eq!(config.max_diagnostics, 10);
    }

    #[test]
    fn test_file_config_parses_partial_json() {
        let file: FileConfig =
            serde_json::from_str(r#"{"budgets":{"build_repair":5,"design_iterations":1,"post_design_build":1}}"#)
                .unwrap();
        assert_eq!(file.budgets.unwrap().build_repair, 5);
    }
}
