//! The generation collaborator: initial change sets, build fixes, and
//! design fixes.
//!
//! All three requests share one client and retry policy. Responses are
//! validated at this boundary; a structurally invalid change set counts
//! as a malformed response so the retry policy regenerates it instead of
//! letting it reach the writer.

use crate::build::referenced_paths;
use crate::change::Change;
use crate::context::ProjectContext;
use crate::llm::{parse_response, prompts, truncate_for_prompt, ChatClient, ChatOptions, Model};
use crate::resilient::{RetryPolicy, ServiceError};
use crate::task::Task;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const MAX_FIX_FILE_CHARS: usize = 10_000;

/// One proposed change set, as returned by the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce the initial change set for a task.
    async fn generate(
        &self,
        task: &Task,
        context: &ProjectContext,
    ) -> Result<GenerationResult, ServiceError>;

    /// Produce a corrective change set for build diagnostics.
    async fn fix(
        &self,
        task: &Task,
        prior: &GenerationResult,
        diagnostics: &[String],
        repo_root: &Path,
    ) -> Result<GenerationResult, ServiceError>;

    /// Produce a corrective change set for review feedback.
    async fn design_fix(
        &self,
        task: &Task,
        prior: &GenerationResult,
        feedback: &str,
    ) -> Result<GenerationResult, ServiceError>;
}

pub struct LlmGenerator {
    client: ChatClient,
    policy: RetryPolicy,
    model: String,
}

impl LlmGenerator {
    pub fn new(client: ChatClient, policy: RetryPolicy, model: String) -> Self {
        Self {
            client,
            policy,
            model,
        }
    }

    fn options(&self, temperature: f32) -> ChatOptions {
        ChatOptions {
            model: self.model.clone(),
            temperature,
            max_tokens: Model::Generate.max_tokens(),
            json_mode: true,
        }
    }

    async fn request(
        &self,
        label: &str,
        system: &str,
        user: &str,
        opts: &ChatOptions,
    ) -> Result<GenerationResult, ServiceError> {
        self.policy
            .call(label, || async {
                let raw = self.client.chat(system, user, opts).await?;
                let result: GenerationResult = parse_response(&raw, label)?;
                validate_changes(&result.changes)?;
                Ok(result)
            })
            .await
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(
        &self,
        task: &Task,
        context: &ProjectContext,
    ) -> Result<GenerationResult, ServiceError> {
        let prompt = build_generate_prompt(task, context);
        let opts = self.options(0.2);
        self.request("generate", prompts::GENERATE_SYSTEM, &prompt, &opts)
            .await
    }

    async fn fix(
        &self,
        task: &Task,
        prior: &GenerationResult,
        diagnostics: &[String],
        repo_root: &Path,
    ) -> Result<GenerationResult, ServiceError> {
        let prompt = build_fix_prompt(task, prior, diagnostics, repo_root);
        let opts = self.options(0.2);
        self.request("fix", prompts::FIX_SYSTEM, &prompt, &opts)
            .await
    }

    async fn design_fix(
        &self,
        task: &Task,
        prior: &GenerationResult,
        feedback: &str,
    ) -> Result<GenerationResult, ServiceError> {
        let prompt = build_design_fix_prompt(task, prior, feedback);
        // Design feedback often asks for restructuring; give the model
        // more latitude than a mechanical build fix gets.
        let opts = self.options(0.7);
        self.request("design-fix", prompts::DESIGN_FIX_SYSTEM, &prompt, &opts)
            .await
    }
}

/// A change set that fails structural validation is treated as a
/// malformed response so the shared retry budget covers it.
fn validate_changes(changes: &[Change]) -> Result<(), ServiceError> {
    for change in changes {
        change.validate().map_err(ServiceError::Malformed)?;
    }
    Ok(())
}

fn describe_task(task: &Task) -> String {
    let mut out = format!("TASK: {}\n", task.id);
    if let Some(requirements) = &task.requirements {
        out.push_str(&format!("\nREQUIREMENTS:\n{}\n", requirements));
    }
    out.push_str("\nDELIVERABLES:\n");
    for deliverable in &task.deliverables {
        out.push_str(&format!(
            "- {} ({:?})\n",
            deliverable.path.display(),
            deliverable.kind
        ));
    }
    out
}

fn describe_prior(prior: &GenerationResult) -> String {
    let mut out = format!("PRIOR CHANGE SET: {}\n{}\n\nFiles:\n", prior.title, prior.summary);
    for change in &prior.changes {
        out.push_str(&format!(
            "- {} {}\n",
            change.action.as_str(),
            change.path.display()
        ));
    }
    out
}

fn build_generate_prompt(task: &Task, context: &ProjectContext) -> String {
    format!(
        "{}\nPROJECT CONTEXT:\n{}",
        describe_task(task),
        context.render()
    )
}

fn build_fix_prompt(
    task: &Task,
    prior: &GenerationResult,
    diagnostics: &[String],
    repo_root: &Path,
) -> String {
    let mut prompt = format!("{}\n{}", describe_task(task), describe_prior(prior));

    prompt.push_str("\nBUILD DIAGNOSTICS:\n");
    for line in diagnostics {
        prompt.push_str(&format!("{}\n", line));
    }

    // Current content of the files the diagnostics point at, so patches
    // can quote exact text.
    for path in referenced_paths(diagnostics, repo_root) {
        if let Ok(content) = fs::read_to_string(repo_root.join(&path)) {
            prompt.push_str(&format!(
                "\n--- {} (current) ---\n{}\n",
                path.display(),
                truncate_for_prompt(&content, MAX_FIX_FILE_CHARS)
            ));
        }
    }

    prompt
}

fn build_design_fix_prompt(task: &Task, prior: &GenerationResult, feedback: &str) -> String {
    format!(
        "{}\n{}\nREVIEW FEEDBACK:\n{}",
        describe_task(task),
        describe_prior(prior),
        feedback
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{ChangeAction, Patch};
    use crate::task::{Deliverable, DeliverableKind};
    use std::path::PathBuf;

    fn sample_task() -> Task {
        Task {
            id: "add-readme".to_string(),
            deliverables: vec![Deliverable {
                path: PathBuf::from("README.md"),
                kind: DeliverableKind::New,
            }],
            requirements: Some("Document the project".to_string()),
            model: None,
            context_refs: Vec::new(),
        }
    }

    #[test]
    fn test_generation_result_tolerates_missing_fields() {
        let parsed: GenerationResult = serde_json::from_str(r#"{"changes": []}"#).unwrap();
        assert!(parsed.title.is_empty());
        assert!(parsed.changes.is_empty());
    }

    #[test]
    fn test_invalid_change_is_malformed() {
        let changes = vec![Change {
            path: PathBuf::from("a.rs"),
            action: ChangeAction::Create,
            content: None,
            patches: Vec::new(),
        }];
        assert!(matches!(
            validate_changes(&changes),
            Err(ServiceError::Malformed(_))
        ));
    }

    #[test]
    fn test_fix_prompt_embeds_referenced_file_content() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("lib.rs"), "pub fn broken() {").unwrap();

        let prior = GenerationResult {
            title: "t".to_string(),
            summary: "s".to_string(),
            changes: vec![Change {
                path: PathBuf::from("lib.rs"),
                action: ChangeAction::Patch,
                content: None,
                patches: vec![Patch {
                    find: "x".to_string(),
                    replace: "y".to_string(),
                }],
            }],
        };
        let diagnostics = vec!["error: unclosed brace in lib.rs:1".to_string()];
        let prompt = build_fix_prompt(&sample_task(), &prior, &diagnostics, root.path());
        assert!(prompt.contains("unclosed brace"));
        assert!(prompt.contains("pub fn broken() {"));
    }

    #[test]
    fn test_design_fix_prompt_carries_feedback() {
        let prior = GenerationResult {
            title: "initial".to_string(),
            summary: "wrote files".to_string(),
            changes: Vec::new(),
        };
        let prompt = build_design_fix_prompt(&sample_task(), &prior, "Score: 5/10\n- [major] thin docs");
        assert!(prompt.contains("REVIEW FEEDBACK"));
        assert!(prompt.contains("thin docs"));
        assert!(prompt.contains("Document the project"));
    }
}
