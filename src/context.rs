//! Read-only project context assembled for the generator.
//!
//! A bounded snapshot of the target repository: detected toolchain, a
//! capped file inventory, and the current contents of the files the task
//! touches. Gathered once per task and rendered into the prompt.

use crate::build::{detect_toolchain, Toolchain};
use crate::llm::truncate_for_prompt;
use crate::task::{DeliverableKind, Task};
use anyhow::{Context as _, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Inventory cap. Enough to show the repo's shape without flooding the
/// prompt on large trees.
const MAX_INVENTORY_ENTRIES: usize = 200;

/// Per-file cap when embedding contents in the prompt.
const MAX_FILE_CHARS: usize = 12_000;

const SKIP_DIRS: &[&str] = &[
    "target",
    "node_modules",
    "dist",
    "build",
    "vendor",
    "__pycache__",
    ".venv",
];

pub struct ProjectContext {
    pub repo_root: PathBuf,
    pub toolchain: Option<Toolchain>,
    pub inventory: Vec<PathBuf>,
    /// Current content of update-kind deliverables, keyed by relative path.
    pub deliverable_contents: Vec<(PathBuf, String)>,
    /// Extra files the task names as background reading.
    pub reference_contents: Vec<(PathBuf, String)>,
}

impl ProjectContext {
    /// Snapshot the repository for one task. Missing update targets and
    /// missing references are skipped with a log line, not errors; the
    /// generator can still act on the rest.
    pub fn gather(repo_root: &Path, task: &Task) -> Result<Self> {
        let repo_root = repo_root
            .canonicalize()
            .with_context(|| format!("Repository root not found: {}", repo_root.display()))?;

        let toolchain = detect_toolchain(&repo_root);
        let inventory = scan_inventory(&repo_root);

        let mut deliverable_contents = Vec::new();
        for deliverable in &task.deliverables {
            if deliverable.kind != DeliverableKind::Update {
                continue;
            }
            match read_relative(&repo_root, &deliverable.path) {
                Some(content) => deliverable_contents.push((deliverable.path.clone(), content)),
                None => debug!(
                    path = %deliverable.path.display(),
                    "update deliverable missing on disk, treating as new"
                ),
            }
        }

        let mut reference_contents = Vec::new();
        for reference in &task.context_refs {
            match read_relative(&repo_root, reference) {
                Some(content) => reference_contents.push((reference.clone(), content)),
                None => debug!(path = %reference.display(), "context reference not found, skipping"),
            }
        }

        Ok(Self {
            repo_root,
            toolchain,
            inventory,
            deliverable_contents,
            reference_contents,
        })
    }

    /// Render the snapshot as prompt text.
    pub fn render(&self) -> String {
        let mut out = String::new();

        match self.toolchain {
            Some(tc) => out.push_str(&format!("Toolchain: {}\n\n", tc.label())),
            None => out.push_str("Toolchain: none detected\n\n"),
        }

        out.push_str("Repository files:\n");
        for path in &self.inventory {
            out.push_str(&format!("  {}\n", path.display()));
        }
        if self.inventory.len() >= MAX_INVENTORY_ENTRIES {
            out.push_str("  ... (inventory truncated)\n");
        }

        for (path, content) in self
            .deliverable_contents
            .iter()
            .chain(self.reference_contents.iter())
        {
            out.push_str(&format!(
                "\n--- {} ---\n{}\n",
                path.display(),
                truncate_for_prompt(content, MAX_FILE_CHARS)
            ));
        }

        out
    }
}

/// Walk the tree collecting relative file paths, sorted, capped.
/// Hidden entries and generated directories are skipped.
fn scan_inventory(repo_root: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = WalkDir::new(repo_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            if e.depth() == 0 {
                return true;
            }
            !name.starts_with('.') && !SKIP_DIRS.contains(&name.as_ref())
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(repo_root).ok().map(Path::to_path_buf))
        .collect();

    entries.sort();
    entries.truncate(MAX_INVENTORY_ENTRIES);
    entries
}

fn read_relative(repo_root: &Path, relative: &Path) -> Option<String> {
    fs::read_to_string(repo_root.join(relative)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Deliverable;
    use std::fs;

    fn task_with_update(path: &str) -> Task {
        Task {
            id: "t1".to_string(),
            deliverables: vec![Deliverable {
                path: PathBuf::from(path),
                kind: DeliverableKind::Update,
            }],
            requirements: None,
            model: None,
            context_refs: Vec::new(),
        }
    }

    #[test]
    fn test_gather_reads_update_deliverable_content() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("notes.md"), "existing notes").unwrap();

        let ctx = ProjectContext::gather(root.path(), &task_with_update("notes.md")).unwrap();
        assert_eq!(ctx.deliverable_contents.len(), 1);
        assert_eq!(ctx.deliverable_contents[0].1, "existing notes");
    }

    #[test]
    fn test_gather_skips_missing_update_target() {
        let root = tempfile::tempdir().unwrap();
        let ctx = ProjectContext::gather(root.path(), &task_with_update("missing.md")).unwrap();
        assert!(ctx.deliverable_contents.is_empty());
    }

    #[test]
    fn test_inventory_skips_hidden_and_generated_dirs() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("src")).unwrap();
        fs::create_dir_all(root.path().join("target/debug")).unwrap();
        fs::create_dir_all(root.path().join(".git")).unwrap();
        fs::write(root.path().join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(root.path().join("target/debug/junk"), "x").unwrap();
        fs::write(root.path().join(".git/HEAD"), "ref").unwrap();

        let inventory = scan_inventory(root.path());
        assert_eq!(inventory, vec![PathBuf::from("src/main.rs")]);
    }

    #[test]
    fn test_render_mentions_toolchain_and_files() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("Cargo.toml"), "[package]").unwrap();
        fs::write(root.path().join("notes.md"), "hello").unwrap();

        let ctx = ProjectContext::gather(root.path(), &task_with_update("notes.md")).unwrap();
        let rendered = ctx.render();
        assert!(rendered.contains("Toolchain: cargo"));
        assert!(rendered.contains("notes.md"));
        assert!(rendered.contains("hello"));
    }
}
