//! Run artifacts: a JSON report per task plus PR-ready text files.
//!
//! After each task the outcome is persisted three ways: a timestamped
//! report under `reports/`, a ready-to-paste PR body in
//! `last_pr_body.txt`, and a branch-safe slug in `last_branch_name.txt`.
//! The text files are overwritten each run; the reports accumulate.

use crate::build::BuildResult;
use crate::pipeline::{PipelinePhase, TaskOutcome};
use crate::review::DesignReview;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct TaskReport {
    pub run_id: Uuid,
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub phase: PipelinePhase,
    pub succeeded: bool,
    pub title: String,
    pub summary: String,
    pub files: Vec<ReportedFile>,
    pub build: BuildResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<DesignReview>,
}

#[derive(Debug, Serialize)]
pub struct ReportedFile {
    pub path: String,
    pub action: String,
}

pub struct ReportWriter {
    out_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// Persist one task outcome. Returns the path of the JSON report.
    pub fn write(&self, task_id: &str, outcome: &TaskOutcome) -> Result<PathBuf> {
        let report = TaskReport {
            run_id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            phase: outcome.phase,
            succeeded: outcome.succeeded(),
            title: outcome.title.clone(),
            summary: outcome.summary.clone(),
            files: outcome
                .changes
                .iter()
                .map(|c| ReportedFile {
                    path: c.path.display().to_string(),
                    action: c.action.as_str().to_string(),
                })
                .collect(),
            build: outcome.build.clone(),
            review: outcome.review.clone(),
        };

        let reports_dir = self.out_dir.join("reports");
        fs::create_dir_all(&reports_dir)
            .with_context(|| format!("Failed to create {}", reports_dir.display()))?;

        let report_path = reports_dir.join(format!("{}-{}.json", task_id, report.run_id));
        let body = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        fs::write(&report_path, body)
            .with_context(|| format!("Failed to write {}", report_path.display()))?;

        fs::write(self.out_dir.join("last_pr_body.txt"), pr_body(outcome))
            .context("Failed to write last_pr_body.txt")?;
        fs::write(
            self.out_dir.join("last_branch_name.txt"),
            branch_slug(&outcome.title),
        )
        .context("Failed to write last_branch_name.txt")?;

        Ok(report_path)
    }
}

/// Markdown body ready for a pull request.
fn pr_body(outcome: &TaskOutcome) -> String {
    let mut body = format!("### Agent Task\n\n**{}**\n\n{}\n", outcome.title, outcome.summary);

    body.push_str("\nFiles changed:\n");
    for change in &outcome.changes {
        body.push_str(&format!(
            "- `{}` ({})\n",
            change.path.display(),
            change.action.as_str()
        ));
    }

    body.push_str(&format!(
        "\nBuild: {}\n",
        if outcome.build.can_build {
            "passing"
        } else {
            "failing"
        }
    ));
    if let Some(review) = &outcome.review {
        body.push_str(&format!(
            "Review: {}/10 ({})\n",
            review.score,
            if review.passes { "passed" } else { "not passed" }
        ));
    }

    body
}

/// Reduce a title to a branch-safe slug. Runs of characters outside
/// `[A-Za-z0-9_.-]` collapse to single hyphens; an empty result falls
/// back to `agent-update`.
pub fn branch_slug(title: &str) -> String {
    let pattern = Regex::new(r"[^a-zA-Z0-9_.-]+").expect("valid regex");
    let slug = pattern
        .replace_all(title, "-")
        .trim_matches('-')
        .to_lowercase();
    if slug.is_empty() {
        "agent-update".to_string()
    } else {
        slug
    }
}
