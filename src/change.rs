//! Change records proposed by the generator.
//!
//! A `Change` is one file-level mutation of the target repository. The
//! generator returns them inside a JSON envelope; everything here is
//! validated at that boundary so downstream code never sees a half-formed
//! record.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What to do with the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
    Patch,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
            ChangeAction::Patch => "patch",
        }
    }
}

/// A single find/replace edit against one file's current text.
///
/// `find` must be non-empty; multi-line fragments should carry enough
/// surrounding context to be unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub find: String,
    pub replace: String,
}

/// One file-level mutation.
///
/// `content` carries the full text for create/update (and the overwrite
/// fallback for a failed patch); `patches` carries the ordered edit list
/// for the patch action. Exactly one of the two is meaningful per action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub path: PathBuf,
    pub action: ChangeAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<Patch>,
}

impl Change {
    pub fn create(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: ChangeAction::Create,
            content: Some(content.into()),
            patches: Vec::new(),
        }
    }

    /// Check structural validity. Called at the collaborator boundary;
    /// a violation is classified as a malformed response, not defaulted.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("change has an empty path".to_string());
        }
        match self.action {
            ChangeAction::Create | ChangeAction::Update => {
                if self.content.is_none() {
                    return Err(format!(
                        "{} change for {} is missing content",
                        self.action.as_str(),
                        self.path.display()
                    ));
                }
            }
            ChangeAction::Delete => {}
            ChangeAction::Patch => {
                if self.patches.is_empty() {
                    return Err(format!(
                        "patch change for {} has no patches",
                        self.path.display()
                    ));
                }
                if let Some(i) = self.patches.iter().position(|p| p.find.is_empty()) {
                    return Err(format!(
                        "patch {} for {} has an empty find fragment",
                        i + 1,
                        self.path.display()
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_roundtrips_through_serde() {
        let json = r#"{"path":"src/lib.rs","action":"patch","patches":[{"find":"a","replace":"b"}]}"#;
        let change: Change = serde_json::from_str(json).unwrap();
        assert_eq!(change.action, ChangeAction::Patch);
        assert!(change.validate().is_ok());
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let json = r#"{"path":"src/lib.rs","action":"rename"}"#;
        assert!(serde_json::from_str::<Change>(json).is_err());
    }

    #[test]
    fn test_create_without_content_is_invalid() {
        let change = Change {
            path: PathBuf::from("src/new.rs"),
            action: ChangeAction::Create,
            content: None,
            patches: Vec::new(),
        };
        assert!(change.validate().is_err());
    }

    #[test]
    fn test_empty_find_is_invalid() {
        let change = Change {
            path: PathBuf::from("src/lib.rs"),
            action: ChangeAction::Patch,
            content: None,
            patches: vec![Patch {
                find: String::new(),
                replace: "x".to_string(),
            }],
        };
        let err = change.validate().unwrap_err();
        assert!(err.contains("empty find"));
    }

    #[test]
    fn test_delete_needs_nothing_else() {
        let change = Change {
            path: PathBuf::from("old.rs"),
            action: ChangeAction::Delete,
            content: None,
            patches: Vec::new(),
        };
        assert!(change.validate().is_ok());
    }
}
