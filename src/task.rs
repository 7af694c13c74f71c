//! Queued units of work.
//!
//! Tasks are JSON files in `<tasks>/queued/`. A task is consumed exactly
//! once: after the pipeline reaches a terminal phase it is moved to
//! `<tasks>/processed/` regardless of pass/fail, so it never re-runs. A
//! fatal error leaves the file queued for manual reattempt.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A declared intended output of a task. Used to synthesize minimal
/// fallback changes when generation yields nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliverable {
    pub path: PathBuf,
    #[serde(default)]
    pub kind: DeliverableKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliverableKind {
    #[default]
    New,
    Update,
}

/// One queued unit of work. Immutable once read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub deliverables: Vec<Deliverable>,
    #[serde(default)]
    pub requirements: Option<String>,
    /// Optional model override for this task.
    #[serde(default)]
    pub model: Option<String>,
    /// Repo-relative paths whose contents should accompany the request.
    #[serde(default, rename = "context")]
    pub context_refs: Vec<PathBuf>,
}

impl Task {
    /// Deliverables the fallback synthesizer may create from scratch.
    pub fn new_deliverables(&self) -> impl Iterator<Item = &Deliverable> {
        self.deliverables
            .iter()
            .filter(|d| d.kind == DeliverableKind::New)
    }
}

/// File-backed task queue: `queued/` in, `processed/` out.
pub struct TaskQueue {
    queued_dir: PathBuf,
    processed_dir: PathBuf,
}

impl TaskQueue {
    pub fn new(tasks_root: &Path) -> Self {
        Self {
            queued_dir: tasks_root.join("queued"),
            processed_dir: tasks_root.join("processed"),
        }
    }

    /// Next task in filename order, or `None` when the queue is empty.
    /// Does not remove the file; call [`TaskQueue::archive`] once the
    /// task reaches a terminal phase.
    pub fn next(&self) -> Result<Option<(PathBuf, Task)>> {
        let Some(path) = self.head()? else {
            return Ok(None);
        };
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read task file {}", path.display()))?;
        let task: Task = serde_json::from_str(&raw)
            .with_context(|| format!("Task file {} is not valid JSON", path.display()))?;
        Ok(Some((path, task)))
    }

    fn head(&self) -> Result<Option<PathBuf>> {
        if !self.queued_dir.exists() {
            return Ok(None);
        }
        let mut entries: Vec<PathBuf> = fs::read_dir(&self.queued_dir)
            .with_context(|| format!("Failed to scan {}", self.queued_dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();
        Ok(entries.into_iter().next())
    }

    /// Move a consumed task file out of the pending set.
    pub fn archive(&self, task_path: &Path) -> Result<()> {
        fs::create_dir_all(&self.processed_dir).with_context(|| {
            format!("Failed to create {}", self.processed_dir.display())
        })?;
        let file_name = task_path
            .file_name()
            .context("Task path has no file name")?;
        let dest = self.processed_dir.join(file_name);
        fs::rename(task_path, &dest).with_context(|| {
            format!(
                "Failed to archive {} to {}",
                task_path.display(),
                dest.display()
            )
        })?;
        Ok(())
    }
}
