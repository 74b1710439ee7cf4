//! Versioned storage of workflow definitions in a git repository.
//!
//! Each workflow lives in one pretty-printed JSON file under the configured
//! workflows directory. Branches and tags are repository-wide.

pub mod git;
pub mod repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use git::Git;
pub use repository::{slugify, WorkflowRepository};

#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("git {command} failed ({code:?}): {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("no changes to commit for workflow {0}")]
    NothingToCommit(String),

    #[error("workflow {0} is not under version control")]
    WorkflowNotFound(String),

    #[error("workflow {workflow} does not exist at {revision}")]
    RevisionNotFound { workflow: String, revision: String },

    #[error("merging {source_branch} into {target_branch} conflicts in {}", .files.join(", "))]
    MergeConflict {
        source_branch: String,
        target_branch: String,
        files: Vec<String>,
    },

    #[error("{0}")]
    InvalidWorkflow(String),

    #[error("{path} already holds another workflow than {workflow}")]
    PathConflict { workflow: String, path: String },

    #[error("git executable not found: {0}")]
    GitNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid workflow JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Repository location and commit identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepositorySettings {
    pub root: PathBuf,
    /// Relative to `root`
    #[serde(alias = "workflows_dir")]
    pub workflows_dir: String,
    #[serde(alias = "default_branch")]
    pub default_branch: String,
    /// Identity for merges and tags, and for commits that name no author
    #[serde(alias = "author_name")]
    pub author_name: String,
    #[serde(alias = "author_email")]
    pub author_email: String,
    /// Explicit git executable; otherwise resolved from the environment
    #[serde(alias = "git_binary")]
    pub git_binary: Option<PathBuf>,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            workflows_dir: "workflows".to_string(),
            default_branch: "main".to_string(),
            author_name: "flowlab".to_string(),
            author_email: "flowlab@localhost".to_string(),
            git_binary: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommitOptions {
    pub message: Option<String>,
    pub author: Option<String>,
    pub email: Option<String>,
    /// Checked out (created when missing) before committing
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub hash: String,
    pub short_hash: String,
    pub author: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiffChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    /// Line number in the revision the line belongs to
    pub line: usize,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDiff {
    pub workflow_id: String,
    pub from: String,
    pub to: String,
    pub additions: usize,
    pub deletions: usize,
    pub changes: Vec<DiffChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BranchInfo {
    pub name: String,
    pub commit: String,
    pub current: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TagInfo {
    pub name: String,
    pub commit: String,
    pub message: String,
}

/// A workflow file in the working tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEntry {
    pub workflow_id: String,
    pub name: String,
    pub path: String,
}
