//! Design review of an applied change set.
//!
//! The reviewer sees the task requirements and the artifacts as they now
//! exist on disk, and returns a verdict the design-repair loop acts on.

use crate::change::Change;
use crate::llm::{parse_response, prompts, truncate_for_prompt, ChatClient, ChatOptions};
use crate::resilient::{RetryPolicy, ServiceError};
use crate::task::Task;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

const MAX_REVIEW_FILE_CHARS: usize = 12_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignIssue {
    pub severity: String,
    #[serde(default)]
    pub file: Option<String>,
    pub description: String,
}

/// Reviewer verdict. `passes` is the loop's steering signal; `score` and
/// `issues` feed the fix prompt and the final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignReview {
    pub passes: bool,
    pub score: u8,
    #[serde(default)]
    pub issues: Vec<DesignIssue>,
    #[serde(default)]
    pub summary: String,
}

impl DesignReview {
    /// Render the findings as feedback for a design-fix request.
    pub fn feedback(&self) -> String {
        let mut out = format!("Score: {}/10\n{}\n", self.score, self.summary);
        for issue in &self.issues {
            match &issue.file {
                Some(file) => {
                    out.push_str(&format!("- [{}] {}: {}\n", issue.severity, file, issue.description))
                }
                None => out.push_str(&format!("- [{}] {}\n", issue.severity, issue.description)),
            }
        }
        out
    }
}

#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(
        &self,
        task: &Task,
        changes: &[Change],
        repo_root: &Path,
    ) -> Result<DesignReview, ServiceError>;
}

pub struct LlmReviewer {
    client: ChatClient,
    policy: RetryPolicy,
    model: String,
}

impl LlmReviewer {
    pub fn new(client: ChatClient, policy: RetryPolicy, model: String) -> Self {
        Self {
            client,
            policy,
            model,
        }
    }

    fn options(&self) -> ChatOptions {
        ChatOptions {
            model: self.model.clone(),
            temperature: 0.2,
            max_tokens: crate::llm::Model::Review.max_tokens(),
            json_mode: true,
        }
    }
}

#[async_trait]
impl Reviewer for LlmReviewer {
    async fn review(
        &self,
        task: &Task,
        changes: &[Change],
        repo_root: &Path,
    ) -> Result<DesignReview, ServiceError> {
        let prompt = build_review_prompt(task, changes, repo_root);
        let opts = self.options();

        let mut review: DesignReview = self
            .policy
            .call("review", || async {
                let raw = self
                    .client
                    .chat(prompts::REVIEW_SYSTEM, &prompt, &opts)
                    .await?;
                parse_response(&raw, "review")
            })
            .await?;

        if review.score > 10 {
            debug!(score = review.score, "clamping out-of-range review score");
            review.score = 10;
        }
        if review.score == 0 {
            review.score = 1;
        }
        Ok(review)
    }
}

/// Show the reviewer what is actually on disk, not what the generator
/// claimed to write.
fn build_review_prompt(task: &Task, changes: &[Change], repo_root: &Path) -> String {
    let mut prompt = format!("TASK: {}\n", task.id);
    if let Some(requirements) = &task.requirements {
        prompt.push_str(&format!("\nREQUIREMENTS:\n{}\n", requirements));
    }

    prompt.push_str("\nDELIVERABLES:\n");
    for deliverable in &task.deliverables {
        prompt.push_str(&format!("- {}\n", deliverable.path.display()));
    }

    prompt.push_str("\nCHANGED FILES (current content on disk):\n");
    for change in changes {
        let on_disk = fs::read_to_string(repo_root.join(&change.path)).ok();
        match on_disk {
            Some(content) => prompt.push_str(&format!(
                "\n--- {} ({}) ---\n{}\n",
                change.path.display(),
                change.action.as_str(),
                truncate_for_prompt(&content, MAX_REVIEW_FILE_CHARS)
            )),
            None => prompt.push_str(&format!(
                "\n--- {} ({}) ---\n[file absent]\n",
                change.path.display(),
                change.action.as_str()
            )),
        }
    }

    prompt
}
