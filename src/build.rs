//! Build validation for the target repository.
//!
//! Runs the repository's own toolchain and reports pass/fail plus the
//! diagnostic lines the compiler printed. Failures are data, never
//! errors: a broken build drives the repair loop, it does not abort the
//! task.

use crate::util::{run_command_with_timeout, truncate};
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::debug;

/// Supported target toolchains, probed by marker file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolchain {
    Cargo,
    Go,
    TypeScript,
    Node,
    Python,
}

impl Toolchain {
    pub fn label(&self) -> &'static str {
        match self {
            Toolchain::Cargo => "cargo",
            Toolchain::Go => "go",
            Toolchain::TypeScript => "typescript",
            Toolchain::Node => "node",
            Toolchain::Python => "python",
        }
    }

    fn command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Toolchain::Cargo => ("cargo", &["check", "-q", "--all-targets"]),
            Toolchain::Go => ("go", &["build", "./..."]),
            Toolchain::TypeScript => ("npx", &["tsc", "--noEmit"]),
            Toolchain::Node => ("npm", &["run", "build", "--if-present"]),
            Toolchain::Python => ("python", &["-m", "compileall", "-q", "."]),
        }
    }
}

/// Probe for the repository's toolchain. First marker wins.
pub fn detect_toolchain(repo_root: &Path) -> Option<Toolchain> {
    if repo_root.join("Cargo.toml").exists() {
        Some(Toolchain::Cargo)
    } else if repo_root.join("go.mod").exists() {
        Some(Toolchain::Go)
    } else if repo_root.join("tsconfig.json").exists() {
        Some(Toolchain::TypeScript)
    } else if repo_root.join("package.json").exists() {
        Some(Toolchain::Node)
    } else if repo_root.join("pyproject.toml").exists() || repo_root.join("setup.py").exists() {
        Some(Toolchain::Python)
    } else {
        None
    }
}

/// Outcome of one validator invocation. Produced fresh each time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub can_build: bool,
    pub errors: Vec<String>,
}

impl BuildResult {
    pub fn passing() -> Self {
        Self {
            can_build: true,
            errors: Vec::new(),
        }
    }

    pub fn failing(errors: Vec<String>) -> Self {
        Self {
            can_build: false,
            errors,
        }
    }
}

pub trait BuildChecker: Send + Sync {
    fn check(&self, repo_root: &Path) -> Result<BuildResult>;
}

/// Default checker: run the detected toolchain with a timeout.
pub struct CommandBuildChecker {
    pub timeout: Duration,
    pub max_diagnostics: usize,
}

impl BuildChecker for CommandBuildChecker {
    fn check(&self, repo_root: &Path) -> Result<BuildResult> {
        let Some(toolchain) = detect_toolchain(repo_root) else {
            debug!(repo = %repo_root.display(), "no toolchain detected, skipping build check");
            return Ok(BuildResult::passing());
        };

        let (bin, args) = toolchain.command();
        debug!(toolchain = toolchain.label(), bin, "running build check");

        let mut command = Command::new(bin);
        command.current_dir(repo_root).args(args);
        let run = run_command_with_timeout(&mut command, self.timeout)
            .map_err(|e| anyhow::anyhow!("{} check failed to run: {}", toolchain.label(), e))?;

        if run.timed_out {
            return Ok(BuildResult::failing(vec![format!(
                "{} check timed out after {}s",
                toolchain.label(),
                self.timeout.as_secs()
            )]));
        }

        if run.status.is_some_and(|s| s.success()) {
            return Ok(BuildResult::passing());
        }

        let errors = collect_diagnostics(&run.stderr, &run.stdout, self.max_diagnostics);
        Ok(BuildResult::failing(errors))
    }
}

/// Keep the most useful diagnostic lines, capped. Stderr first - that is
/// where compilers talk.
fn collect_diagnostics(stderr: &str, stdout: &str, max: usize) -> Vec<String> {
    let mut lines: Vec<String> = stderr
        .lines()
        .chain(stdout.lines())
        .map(|l| l.trim_end())
        .filter(|l| !l.is_empty())
        .map(|l| truncate(l, 400))
        .collect();

    if lines.is_empty() {
        lines.push("build command failed with no diagnostic output".to_string());
    }
    if lines.len() > max {
        let dropped = lines.len() - max;
        lines.truncate(max);
        lines.push(format!("... ({} more diagnostic lines)", dropped));
    }
    lines
}

/// Extract repo-relative paths mentioned in diagnostic lines, so a fix
/// request can include the current content of the files the compiler is
/// complaining about.
pub fn referenced_paths(errors: &[String], repo_root: &Path) -> Vec<PathBuf> {
    // Path-shaped tokens ending in an extension, e.g. src/lib.rs:14:9
    let pattern = Regex::new(r"[A-Za-z0-9_\-./]+\.[A-Za-z0-9]{1,8}").expect("valid regex");
    let mut found = Vec::new();
    for line in errors {
        for m in pattern.find_iter(line) {
            let candidate = PathBuf::from(m.as_str().trim_start_matches("./"));
            if candidate.is_absolute() {
                continue;
            }
            if repo_root.join(&candidate).is_file() && !found.contains(&candidate) {
                found.push(candidate);
            }
        }
    }
    found
}
