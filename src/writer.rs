//! Applying a change set to the target repository.
//!
//! The writer is the only component that touches the target tree. Every
//! path is validated before use, deletes are idempotent, and a patch that
//! cannot be matched falls back to the change's full-content overwrite
//! when one was provided. Per-file failures are collected as strings so
//! the caller can fold them into the next fix request.

use crate::change::{Change, ChangeAction};
use crate::patch::apply_patches;
use crate::util::resolve_repo_path_allow_new;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Transform content just before it hits disk. The default does nothing;
/// callers can plug in formatters or header stampers.
pub trait ContentHook: Send + Sync {
    fn process(&self, path: &Path, content: &str) -> Result<String, String>;
}

pub struct NoopHook;

impl ContentHook for NoopHook {
    fn process(&self, _path: &Path, content: &str) -> Result<String, String> {
        Ok(content.to_string())
    }
}

pub struct ChangeWriter {
    repo_root: PathBuf,
    hook: Box<dyn ContentHook>,
    fuzzy_threshold: f64,
    rerun_hook_after_fallback: bool,
}

impl ChangeWriter {
    pub fn new(repo_root: impl Into<PathBuf>, hook: Box<dyn ContentHook>) -> Self {
        Self {
            repo_root: repo_root.into(),
            hook,
            fuzzy_threshold: crate::patch::DEFAULT_FUZZY_THRESHOLD,
            rerun_hook_after_fallback: true,
        }
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    pub fn with_rerun_hook_after_fallback(mut self, rerun: bool) -> Self {
        self.rerun_hook_after_fallback = rerun;
        self
    }

    /// Apply every change, collecting one error string per failed file.
    /// An empty return means the whole set landed.
    pub fn apply_all(&self, changes: &[Change]) -> Vec<String> {
        let mut errors = Vec::new();
        for change in changes {
            if let Err(e) = self.apply(change) {
                warn!(path = %change.path.display(), "change failed: {}", e);
                errors.push(format!("{}: {}", change.path.display(), e));
            }
        }
        errors
    }

    /// Apply one change. Failures here are data for the repair loop, so
    /// they surface as strings rather than aborting the task.
    pub fn apply(&self, change: &Change) -> Result<(), String> {
        let resolved = resolve_repo_path_allow_new(&self.repo_root, &change.path)?;

        match change.action {
            ChangeAction::Delete => {
                // Idempotent: deleting a file that is already gone is fine.
                if resolved.absolute.exists() {
                    fs::remove_file(&resolved.absolute)
                        .map_err(|e| format!("Failed to delete: {}", e))?;
                }
                Ok(())
            }
            ChangeAction::Create | ChangeAction::Update => {
                let content = change
                    .content
                    .as_deref()
                    .ok_or_else(|| format!("{} change carries no content", change.action.as_str()))?;
                self.write_with_hook(&resolved.absolute, &resolved.relative, content, true)
            }
            ChangeAction::Patch => self.apply_patch_change(change, &resolved.absolute, &resolved.relative),
        }
    }

    fn apply_patch_change(
        &self,
        change: &Change,
        absolute: &Path,
        relative: &Path,
    ) -> Result<(), String> {
        let current = match fs::read_to_string(absolute) {
            Ok(text) => text,
            Err(e) => {
                // A missing target is deliberately treated like a failed
                // patch: when fallback content is present the overwrite
                // applies, otherwise the error surfaces to the repair loop.
                return match change.content.as_deref() {
                    Some(content) => {
                        warn!(
                            path = %relative.display(),
                            "patch target unreadable ({}), using full-content fallback",
                            e
                        );
                        self.write_with_hook(absolute, relative, content, self.rerun_hook_after_fallback)
                    }
                    None => Err(format!("Cannot read patch target: {}", e)),
                };
            }
        };

        match apply_patches(&current, &change.patches, self.fuzzy_threshold) {
            Ok(patched) => {
                debug!(path = %relative.display(), patches = change.patches.len(), "patched");
                self.write_with_hook(absolute, relative, &patched, true)
            }
            Err(failures) => match change.content.as_deref() {
                Some(content) => {
                    warn!(
                        path = %relative.display(),
                        failed = failures.len(),
                        "patches did not match, using full-content fallback"
                    );
                    self.write_with_hook(absolute, relative, content, self.rerun_hook_after_fallback)
                }
                None => {
                    let detail = failures
                        .iter()
                        .map(|f| format!("patch {} (`{}`)", f.index + 1, f.find_preview))
                        .collect::<Vec<_>>()
                        .join(", ");
                    Err(format!("No match for {} and no fallback content", detail))
                }
            },
        }
    }

    fn write_with_hook(
        &self,
        absolute: &Path,
        relative: &Path,
        content: &str,
        run_hook: bool,
    ) -> Result<(), String> {
        let finished = if run_hook {
            self.hook
                .process(relative, content)
                .map_err(|e| format!("Content hook failed: {}", e))?
        } else {
            content.to_string()
        };

        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create directories: {}", e))?;
        }
        fs::write(absolute, finished).map_err(|e| format!("Failed to write: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Patch;

    struct UppercaseHook;
    impl ContentHook for UppercaseHook {
        fn process(&self, _path: &Path, content: &str) -> Result<String, String> {
            Ok(content.to_uppercase())
        }
    }

    fn writer(root: &Path) -> ChangeWriter {
        ChangeWriter::new(root, Box::new(NoopHook))
    }

    fn patch_change(path: &str, find: &str, replace: &str, fallback: Option<&str>) -> Change {
        Change {
            path: PathBuf::from(path),
            action: ChangeAction::Patch,
            content: fallback.map(str::to_string),
            patches: vec![Patch {
                find: find.to_string(),
                replace: replace.to_string(),
            }],
        }
    }

    #[test]
    fn test_create_writes_through_nested_dirs() {
        let root = tempfile::tempdir().unwrap();
        let change = Change::create("a/b/c.txt", "hello");
        writer(root.path()).apply(&change).unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("a/b/c.txt")).unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_hook_transforms_written_content() {
        let root = tempfile::tempdir().unwrap();
        let writer = ChangeWriter::new(root.path(), Box::new(UppercaseHook));
        writer.apply(&Change::create("x.txt", "quiet")).unwrap();
        assert_eq!(fs::read_to_string(root.path().join("x.txt")).unwrap(), "QUIET");
    }

    #[test]
    fn test_delete_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let change = Change {
            path: PathBuf::from("gone.txt"),
            action: ChangeAction::Delete,
            content: None,
            patches: Vec::new(),
        };
        let w = writer(root.path());
        assert!(w.apply(&change).is_ok());
        fs::write(root.path().join("gone.txt"), "x").unwrap();
        assert!(w.apply(&change).is_ok());
        assert!(!root.path().join("gone.txt").exists());
    }

    #[test]
    fn test_patch_applies_in_place() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("f.rs"), "fn old() {}\n").unwrap();
        let change = patch_change("f.rs", "old", "renamed", None);
        writer(root.path()).apply(&change).unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("f.rs")).unwrap(),
            "fn renamed() {}\n"
        );
    }

    #[test]
    fn test_failed_patch_falls_back_to_content() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("f.rs"), "original\n").unwrap();
        let change = patch_change("f.rs", "text that matches nothing here", "x", Some("fallback\n"));
        writer(root.path()).apply(&change).unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("f.rs")).unwrap(),
            "fallback\n"
        );
    }

    #[test]
    fn test_missing_patch_target_uses_fallback_or_errors() {
        let root = tempfile::tempdir().unwrap();
        let w = writer(root.path());

        let with_fallback = patch_change("ghost.rs", "anything", "x", Some("recovered\n"));
        w.apply(&with_fallback).unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("ghost.rs")).unwrap(),
            "recovered\n"
        );

        let without_fallback = patch_change("ghost2.rs", "anything", "x", None);
        let err = w.apply(&without_fallback).unwrap_err();
        assert!(err.contains("Cannot read patch target"));
        assert!(!root.path().join("ghost2.rs").exists());
    }

    #[test]
    fn test_failed_patch_without_fallback_leaves_file_untouched() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("f.rs"), "original\n").unwrap();
        let change = patch_change("f.rs", "text that matches nothing here", "x", None);
        let err = writer(root.path()).apply(&change).unwrap_err();
        assert!(err.contains("No match"));
        assert_eq!(
            fs::read_to_string(root.path().join("f.rs")).unwrap(),
            "original\n"
        );
    }

    #[test]
    fn test_fallback_skips_hook_when_configured_off() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("f.txt"), "original\n").unwrap();
        let writer = ChangeWriter::new(root.path(), Box::new(UppercaseHook))
            .with_rerun_hook_after_fallback(false);
        let change = patch_change("f.txt", "no such text anywhere", "x", Some("fallback\n"));
        writer.apply(&change).unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("f.txt")).unwrap(),
            "fallback\n"
        );
    }

    #[test]
    fn test_escaping_path_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let change = Change::create("../outside.txt", "nope");
        let errors = writer(root.path()).apply_all(&[change]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("traversal"));
    }

    #[test]
    fn test_apply_all_keeps_going_after_a_failure() {
        let root = tempfile::tempdir().unwrap();
        let changes = vec![
            Change::create("../bad.txt", "x"),
            Change::create("good.txt", "y"),
        ];
        let errors = writer(root.path()).apply_all(&changes);
        assert_eq!(errors.len(), 1);
        assert!(root.path().join("good.txt").exists());
    }
}
