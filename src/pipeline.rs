//! The task pipeline: generate, repair the build, repair the design.
//!
//! Phase order for one task:
//!
//! 1. Generate an initial change set (synthesizing a minimal fallback
//!    when the generator returns nothing).
//! 2. Apply it and run the build check; while it fails, request build
//!    fixes up to the build-repair budget.
//! 3. If the build stands, request a design review; while it fails,
//!    request design fixes up to the design budget, each followed by its
//!    own smaller build-repair loop.
//!
//! Every budget counts from zero per task. An empty corrective change
//! set is a stall and exits its loop early. Collaborator failures that
//! survive the retry policy abort the task; build and review failures
//! never do - they are recorded in the outcome.

use crate::build::{BuildChecker, BuildResult};
use crate::change::Change;
use crate::config::RetryBudget;
use crate::context::ProjectContext;
use crate::generate::{GenerationResult, Generator};
use crate::review::{DesignReview, Reviewer};
use crate::task::Task;
use crate::writer::ChangeWriter;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Terminal phase of one task run, for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    /// Build failing after the repair budget (or a stall) was spent.
    BuildAbandoned,
    /// A design fix broke the build and the nested repair could not
    /// recover it.
    DesignAbandoned,
    /// Review never passed within the design budget.
    DesignRejected,
    /// Build passing and review passed (or review produced no verdict
    /// because the build never stood).
    Completed,
}

/// Everything the run produced, pass or fail.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub title: String,
    pub summary: String,
    /// Final per-file state of every change applied, last write wins.
    pub changes: Vec<Change>,
    pub build: BuildResult,
    pub review: Option<DesignReview>,
    pub phase: PipelinePhase,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.phase == PipelinePhase::Completed && self.build.can_build
    }
}

pub struct Orchestrator {
    generator: Box<dyn Generator>,
    build: Box<dyn BuildChecker>,
    reviewer: Box<dyn Reviewer>,
    writer: ChangeWriter,
    budgets: RetryBudget,
    repo_root: PathBuf,
}

impl Orchestrator {
    pub fn new(
        generator: Box<dyn Generator>,
        build: Box<dyn BuildChecker>,
        reviewer: Box<dyn Reviewer>,
        writer: ChangeWriter,
        budgets: RetryBudget,
        repo_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            generator,
            build,
            reviewer,
            writer,
            budgets,
            repo_root: repo_root.into(),
        }
    }

    /// Run one task to a terminal phase.
    ///
    /// The returned error means a collaborator failed in a way the retry
    /// policy could not absorb; the caller should leave the task queued.
    pub async fn run_task(&self, task: &Task) -> Result<TaskOutcome> {
        info!(task = %task.id, "starting task");
        let context = ProjectContext::gather(&self.repo_root, task)?;

        let mut current = self.generator.generate(task, &context).await?;
        if current.changes.is_empty() {
            warn!(task = %task.id, "generator returned no changes, synthesizing fallback");
            current.changes = fallback_changes(task);
            if current.summary.is_empty() {
                current.summary =
                    "Generator produced no changes; placeholder deliverables were created."
                        .to_string();
            }
        }

        let mut applied: BTreeMap<PathBuf, Change> = BTreeMap::new();
        let write_errors = self.apply(&current.changes, &mut applied);
        let mut build = self.check_build(write_errors)?;

        build = self
            .repair_build(task, &mut current, &mut applied, build, self.budgets.build_repair)
            .await?;

        if !build.can_build {
            warn!(task = %task.id, "build still failing after repair budget");
            return Ok(self.outcome(current, applied, build, None, PipelinePhase::BuildAbandoned));
        }

        let mut review = self
            .reviewer
            .review(task, &collect(&applied), &self.repo_root)
            .await?;
        info!(task = %task.id, passes = review.passes, score = review.score, "initial review");

        let mut iteration = 0;
        while !review.passes && iteration < self.budgets.design_iterations {
            iteration += 1;
            let fix = self
                .generator
                .design_fix(task, &current, &review.feedback())
                .await?;
            if fix.changes.is_empty() {
                info!(task = %task.id, iteration, "design fix stalled with no changes");
                break;
            }

            let write_errors = self.apply(&fix.changes, &mut applied);
            current.changes = collect(&applied);
            build = self.check_build(write_errors)?;
            build = self
                .repair_build(
                    task,
                    &mut current,
                    &mut applied,
                    build,
                    self.budgets.post_design_build,
                )
                .await?;
            if !build.can_build {
                warn!(task = %task.id, iteration, "design fix broke the build beyond repair");
                return Ok(self.outcome(
                    current,
                    applied,
                    build,
                    Some(review),
                    PipelinePhase::DesignAbandoned,
                ));
            }

            review = self
                .reviewer
                .review(task, &collect(&applied), &self.repo_root)
                .await?;
            info!(task = %task.id, iteration, passes = review.passes, score = review.score, "re-review");
        }

        let phase = if review.passes {
            PipelinePhase::Completed
        } else {
            PipelinePhase::DesignRejected
        };
        Ok(self.outcome(current, applied, build, Some(review), phase))
    }

    /// The build-repair loop. Runs corrective rounds until the build
    /// stands, the budget is spent, or the generator stalls.
    async fn repair_build(
        &self,
        task: &Task,
        current: &mut GenerationResult,
        applied: &mut BTreeMap<PathBuf, Change>,
        mut build: BuildResult,
        budget: u32,
    ) -> Result<BuildResult> {
        let mut round = 0;
        while !build.can_build && round < budget {
            round += 1;
            info!(task = %task.id, round, errors = build.errors.len(), "requesting build fix");
            let fix = self
                .generator
                .fix(task, current, &build.errors, &self.repo_root)
                .await?;
            if fix.changes.is_empty() {
                info!(task = %task.id, round, "build fix stalled with no changes");
                break;
            }
            let write_errors = self.apply(&fix.changes, applied);
            current.changes = collect(applied);
            build = self.check_build(write_errors)?;
        }
        Ok(build)
    }

    fn apply(&self, changes: &[Change], applied: &mut BTreeMap<PathBuf, Change>) -> Vec<String> {
        let errors = self.writer.apply_all(changes);
        for change in changes {
            applied.insert(change.path.clone(), change.clone());
        }
        errors
    }

    /// Fold write failures into the build verdict: a file that could not
    /// be written is a failure the next fix request must see, even when
    /// the compiler is happy with whatever did land.
    fn check_build(&self, write_errors: Vec<String>) -> Result<BuildResult> {
        let result = self.build.check(&self.repo_root)?;
        if write_errors.is_empty() {
            return Ok(result);
        }
        let mut errors: Vec<String> = write_errors
            .into_iter()
            .map(|e| format!("write failure: {}", e))
            .collect();
        errors.extend(result.errors);
        Ok(BuildResult::failing(errors))
    }

    fn outcome(
        &self,
        current: GenerationResult,
        applied: BTreeMap<PathBuf, Change>,
        build: BuildResult,
        review: Option<DesignReview>,
        phase: PipelinePhase,
    ) -> TaskOutcome {
        TaskOutcome {
            title: current.title,
            summary: current.summary,
            changes: applied.into_values().collect(),
            build,
            review,
            phase,
        }
    }
}

fn collect(applied: &BTreeMap<PathBuf, Change>) -> Vec<Change> {
    applied.values().cloned().collect()
}

/// Minimal stand-in changes when generation yields nothing: empty files
/// for the declared new deliverables, or a notes file restating the
/// requirements when the task declares none.
fn fallback_changes(task: &Task) -> Vec<Change> {
    let changes: Vec<Change> = task
        .new_deliverables()
        .map(|d| Change::create(d.path.clone(), String::new()))
        .collect();
    if !changes.is_empty() {
        return changes;
    }
    let body = match &task.requirements {
        Some(requirements) => format!("# {}\n\n{}\n", task.id, requirements),
        None => format!("# {}\n", task.id),
    };
    vec![Change::create("NOTES.md", body)]
}
