use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::PathBuf;
use tokio::sync::Mutex;

use super::git::{command_error, identity_args, Git};
use super::{
    BranchInfo, ChangeKind, CommitInfo, CommitOptions, DiffChange, RepositorySettings, TagInfo,
    VcsError, WorkflowDiff, WorkflowEntry,
};
use crate::utils::binary_resolver;

const FIELD: char = '\u{1f}';
const RECORD: char = '\u{1e}';
const LOG_FORMAT: &str = "--format=%H%x1f%h%x1f%an%x1f%ae%x1f%aI%x1f%B%x1e";

/// Lowercase ASCII alphanumerics, other runs collapsed to a single `-`
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

fn document_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// True when the raw file is a workflow document with this id
fn owned_by(raw: &[u8], workflow_id: &str) -> bool {
    serde_json::from_slice::<Value>(raw)
        .ok()
        .and_then(|v| document_id(&v))
        .map_or(false, |id| id == workflow_id)
}

/// The document as stored: an object carrying `workflow_id` as its id
fn stamped(data: &Value, workflow_id: &str) -> Result<Value, VcsError> {
    let Value::Object(fields) = data else {
        return Err(VcsError::InvalidWorkflow(format!(
            "workflow {} must be a JSON object",
            workflow_id
        )));
    };
    match document_id(data) {
        Some(id) if id != workflow_id => Err(VcsError::InvalidWorkflow(format!(
            "document id {} does not match workflow {}",
            id, workflow_id
        ))),
        Some(_) => Ok(data.clone()),
        None => {
            let mut fields = fields.clone();
            fields.insert("id".to_string(), Value::String(workflow_id.to_string()));
            Ok(Value::Object(fields))
        }
    }
}

/// Git-backed store of workflow snapshots.
///
/// Everything that writes the working tree or moves HEAD holds `lock`.
pub struct WorkflowRepository {
    git: Git,
    settings: RepositorySettings,
    lock: Mutex<()>,
}

impl WorkflowRepository {
    pub fn new(settings: RepositorySettings) -> Result<Self, VcsError> {
        let binary = match settings.git_binary.clone() {
            Some(path) => path,
            None => binary_resolver::find_git().map_err(|e| VcsError::GitNotFound(e.to_string()))?,
        };
        Ok(Self {
            git: Git::new(binary, settings.root.clone()),
            settings,
            lock: Mutex::new(()),
        })
    }

    pub fn settings(&self) -> &RepositorySettings {
        &self.settings
    }

    fn workflows_dir(&self) -> &str {
        self.settings.workflows_dir.trim_end_matches('/')
    }

    fn file_path(&self, workflow_id: &str, workflow_name: &str) -> String {
        format!(
            "{}/{}-{}.json",
            self.workflows_dir(),
            slugify(workflow_name),
            slugify(workflow_id)
        )
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        self.settings.root.join(relative)
    }

    fn matches_suffix(&self, path: &str, workflow_id: &str) -> bool {
        let file = path.rsplit('/').next().unwrap_or(path);
        file.ends_with(&format!("-{}.json", slugify(workflow_id)))
    }

    pub fn is_initialized(&self) -> bool {
        self.settings.root.join(".git").exists()
    }

    /// Create the repository and workflows directory when missing
    pub async fn init(&self) -> Result<(), VcsError> {
        let _guard = self.lock.lock().await;
        std::fs::create_dir_all(self.absolute(self.workflows_dir()))?;
        if self.is_initialized() {
            return Ok(());
        }

        self.git.run(&["init", "--quiet"]).await?;
        let head = format!("refs/heads/{}", self.settings.default_branch);
        self.git.run(&["symbolic-ref", "HEAD", &head]).await?;
        log::info!(
            "Initialized workflow repository at {}",
            self.settings.root.display()
        );
        Ok(())
    }

    /// The workflow's file in the working tree. A file counts only when its
    /// document carries the workflow's id.
    fn working_path(&self, workflow_id: &str) -> Option<String> {
        let dir = self.absolute(self.workflows_dir());
        let mut candidates: Vec<String> = std::fs::read_dir(dir)
            .ok()?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .map(|name| format!("{}/{}", self.workflows_dir(), name))
            .filter(|path| self.matches_suffix(path, workflow_id))
            .collect();
        candidates.sort();

        candidates.into_iter().find(|path| {
            std::fs::read(self.absolute(path))
                .map_or(false, |raw| owned_by(&raw, workflow_id))
        })
    }

    /// The workflow's file as of `revision`
    async fn path_at(&self, revision: &str, workflow_id: &str) -> Result<Option<String>, VcsError> {
        let dir = format!("{}/", self.workflows_dir());
        let listing = self
            .git
            .run(&["ls-tree", "-r", "--name-only", revision, "--", &dir])
            .await?;
        let candidates: Vec<&str> = listing
            .lines()
            .filter(|path| self.matches_suffix(path, workflow_id))
            .collect();

        for path in candidates {
            let spec = format!("{}:{}", revision, path);
            let raw = self.git.run_bytes(&["show", &spec]).await?;
            if owned_by(&raw, workflow_id) {
                return Ok(Some(path.to_string()));
            }
        }
        Ok(None)
    }

    /// Current path, falling back to the committed one
    async fn resolve_path(&self, workflow_id: &str) -> Result<Option<String>, VcsError> {
        if let Some(path) = self.working_path(workflow_id) {
            return Ok(Some(path));
        }
        if !self.git.check(&["rev-parse", "--verify", "--quiet", "HEAD"]).await? {
            return Ok(None);
        }
        self.path_at("HEAD", workflow_id).await
    }

    /// Snapshot a workflow definition and commit it
    pub async fn commit(
        &self,
        workflow_id: &str,
        workflow_name: &str,
        data: &Value,
        options: &CommitOptions,
    ) -> Result<CommitInfo, VcsError> {
        let document = stamped(data, workflow_id)?;
        let _guard = self.lock.lock().await;

        if let Some(ref branch) = options.branch {
            if self.current_branch().await.ok().as_deref() != Some(branch.as_str()) {
                self.switch_branch(branch, None).await?;
            }
        }

        let target = self.file_path(workflow_id, workflow_name);
        std::fs::create_dir_all(self.absolute(self.workflows_dir()))?;

        // Ids whose slugs collide would share a file
        if let Ok(existing) = std::fs::read(self.absolute(&target)) {
            if !owned_by(&existing, workflow_id) {
                return Err(VcsError::PathConflict {
                    workflow: workflow_id.to_string(),
                    path: target,
                });
            }
        }

        if let Some(previous) = self.working_path(workflow_id).filter(|p| *p != target) {
            let tracked = self
                .git
                .check(&["ls-files", "--error-unmatch", "--", &previous])
                .await?;
            if tracked {
                self.git.run(&["mv", "--", &previous, &target]).await?;
            } else {
                std::fs::rename(self.absolute(&previous), self.absolute(&target))?;
            }
            log::info!("Renamed {} to {}", previous, target);
        }

        let mut content = serde_json::to_string_pretty(&document)?;
        content.push('\n');
        std::fs::write(self.absolute(&target), content)?;
        self.git.run(&["add", "--", &target]).await?;

        let staged = !self.git.check(&["diff", "--cached", "--quiet"]).await?;
        if !staged {
            return Err(VcsError::NothingToCommit(workflow_id.to_string()));
        }

        let author = options
            .author
            .clone()
            .unwrap_or_else(|| self.settings.author_name.clone());
        let email = options
            .email
            .clone()
            .unwrap_or_else(|| self.settings.author_email.clone());
        let message = options
            .message
            .clone()
            .unwrap_or_else(|| format!("Update workflow {} ({})", workflow_name, workflow_id));
        let author_arg = format!("{} <{}>", author, email);

        let mut args = identity_args(&author, &email);
        args.extend(
            ["commit", "--quiet", "-m", message.as_str(), "--author", author_arg.as_str()]
                .iter()
                .map(|s| s.to_string()),
        );
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.git.run(&args).await?;

        let mut info = self.head_commit().await?;
        info.branch = self.current_branch().await.ok();
        log::info!(
            "Committed workflow {} as {} on {}",
            workflow_id,
            info.short_hash,
            info.branch.as_deref().unwrap_or("HEAD")
        );
        Ok(info)
    }

    async fn head_commit(&self) -> Result<CommitInfo, VcsError> {
        let output = self.git.run(&["log", "-1", LOG_FORMAT]).await?;
        parse_log(&output)
            .into_iter()
            .next()
            .ok_or_else(|| VcsError::Command {
                command: "log".to_string(),
                code: None,
                stderr: "no commits".to_string(),
            })
    }

    /// Commits touching the workflow's file, newest first. Empty when the
    /// workflow was never committed or git fails.
    pub async fn history(&self, workflow_id: &str, limit: usize) -> Vec<CommitInfo> {
        match self.try_history(workflow_id, limit).await {
            Ok(commits) => commits,
            Err(e) => {
                log::warn!("History for workflow {} unavailable: {}", workflow_id, e);
                Vec::new()
            }
        }
    }

    async fn try_history(&self, workflow_id: &str, limit: usize) -> Result<Vec<CommitInfo>, VcsError> {
        let Some(path) = self.resolve_path(workflow_id).await? else {
            return Ok(Vec::new());
        };
        let count = limit.to_string();
        let mut args = vec!["log", "--follow", LOG_FORMAT];
        if limit > 0 {
            args.extend(["-n", count.as_str()]);
        }
        args.extend(["--", path.as_str()]);
        let output = self.git.run(&args).await?;
        Ok(parse_log(&output))
    }

    /// Line-level changes to the workflow between two revisions
    pub async fn diff(&self, workflow_id: &str, from: &str, to: &str) -> Result<WorkflowDiff, VcsError> {
        if self.resolve_path(workflow_id).await?.is_none() {
            return Err(VcsError::WorkflowNotFound(workflow_id.to_string()));
        }
        let from_path = self.required_path_at(from, workflow_id).await?;
        let to_path = self.required_path_at(to, workflow_id).await?;

        let from_spec = format!("{}:{}", from, from_path);
        let to_spec = format!("{}:{}", to, to_path);
        let output = self
            .git
            .run(&[
                "diff",
                "--no-color",
                "--no-ext-diff",
                "--unified=0",
                &from_spec,
                &to_spec,
            ])
            .await?;

        let changes = parse_diff(&output);
        Ok(WorkflowDiff {
            workflow_id: workflow_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            additions: changes.iter().filter(|c| c.kind == ChangeKind::Add).count(),
            deletions: changes.iter().filter(|c| c.kind == ChangeKind::Remove).count(),
            changes,
        })
    }

    async fn required_path_at(&self, revision: &str, workflow_id: &str) -> Result<String, VcsError> {
        self.path_at(revision, workflow_id)
            .await?
            .ok_or_else(|| VcsError::RevisionNotFound {
                workflow: workflow_id.to_string(),
                revision: revision.to_string(),
            })
    }

    /// Exact bytes of the workflow's file at a commit
    pub async fn get_raw_at_commit(&self, workflow_id: &str, commit: &str) -> Result<Vec<u8>, VcsError> {
        let path = self.required_path_at(commit, workflow_id).await?;
        let spec = format!("{}:{}", commit, path);
        self.git.run_bytes(&["show", &spec]).await
    }

    pub async fn get_workflow_at_commit(&self, workflow_id: &str, commit: &str) -> Result<Value, VcsError> {
        let raw = self.get_raw_at_commit(workflow_id, commit).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Restore the working copy to the commit's content. Does not commit.
    pub async fn rollback(&self, workflow_id: &str, commit: &str) -> Result<Value, VcsError> {
        let _guard = self.lock.lock().await;
        let raw = self.get_raw_at_commit(workflow_id, commit).await?;
        let document: Value = serde_json::from_slice(&raw)?;

        let target = match self.working_path(workflow_id) {
            Some(path) => path,
            None => self.required_path_at(commit, workflow_id).await?,
        };
        std::fs::create_dir_all(self.absolute(self.workflows_dir()))?;
        std::fs::write(self.absolute(&target), &raw)?;
        log::info!("Rolled back workflow {} to {}", workflow_id, commit);
        Ok(document)
    }

    /// Workflow files in the working tree
    pub fn list_workflows(&self) -> Result<Vec<WorkflowEntry>, VcsError> {
        let dir = self.absolute(self.workflows_dir());
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let Ok(file) = entry.file_name().into_string() else {
                continue;
            };
            let Some(stem) = file.strip_suffix(".json") else {
                continue;
            };
            let document: Value = serde_json::from_slice(&std::fs::read(entry.path())?)?;
            let workflow_id = document_id(&document)
                .unwrap_or_else(|| stem.rsplit('-').next().unwrap_or(stem).to_string());
            entries.push(WorkflowEntry {
                workflow_id,
                name: document
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                path: format!("{}/{}", self.workflows_dir(), file),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    pub async fn current_branch(&self) -> Result<String, VcsError> {
        let name = self.git.run(&["symbolic-ref", "--short", "HEAD"]).await?;
        Ok(name.trim().to_string())
    }

    /// Empty when git fails
    pub async fn list_branches(&self) -> Vec<BranchInfo> {
        let output = match self
            .git
            .run(&[
                "for-each-ref",
                "--format=%(refname:short)%1f%(objectname:short)%1f%(HEAD)",
                "refs/heads",
            ])
            .await
        {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Listing branches failed: {}", e);
                return Vec::new();
            }
        };

        output
            .lines()
            .filter_map(|line| {
                let mut fields = line.split(FIELD);
                let name = fields.next()?.to_string();
                let commit = fields.next()?.to_string();
                let current = fields.next()?.trim() == "*";
                Some(BranchInfo {
                    name,
                    commit,
                    current,
                })
            })
            .collect()
    }

    pub async fn create_or_checkout_branch(&self, name: &str, from: Option<&str>) -> Result<String, VcsError> {
        let _guard = self.lock.lock().await;
        self.switch_branch(name, from).await
    }

    async fn switch_branch(&self, name: &str, from: Option<&str>) -> Result<String, VcsError> {
        let reference = format!("refs/heads/{}", name);
        let exists = self
            .git
            .check(&["rev-parse", "--verify", "--quiet", &reference])
            .await?;
        if exists {
            self.git.run(&["checkout", "--quiet", name]).await?;
        } else {
            let mut args = vec!["checkout", "--quiet", "-b", name];
            if let Some(start) = from {
                args.push(start);
            }
            self.git.run(&args).await?;
            log::info!("Created branch {}", name);
        }
        Ok(name.to_string())
    }

    pub async fn delete_branch(&self, name: &str, force: bool) -> Result<(), VcsError> {
        let _guard = self.lock.lock().await;
        let flag = if force { "-D" } else { "-d" };
        self.git.run(&["branch", flag, name]).await?;
        log::info!("Deleted branch {}", name);
        Ok(())
    }

    /// Merge `source` into `target` (or the current branch) with a merge
    /// commit. A conflicting merge is aborted.
    pub async fn merge(
        &self,
        source: &str,
        target: Option<&str>,
        message: Option<&str>,
    ) -> Result<CommitInfo, VcsError> {
        let _guard = self.lock.lock().await;
        if let Some(target) = target {
            self.git.run(&["checkout", "--quiet", target]).await?;
        }
        let target_branch = self.current_branch().await?;
        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| format!("Merge branch '{}' into {}", source, target_branch));

        let mut args = identity_args(&self.settings.author_name, &self.settings.author_email);
        args.extend(
            ["merge", "--no-ff", "--no-edit", "-m", message.as_str(), source]
                .iter()
                .map(|s| s.to_string()),
        );
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.git.output(&args).await?;

        if !output.status.success() {
            let conflicted = self
                .git
                .run(&["diff", "--name-only", "--diff-filter=U"])
                .await
                .unwrap_or_default();
            let files: Vec<String> = conflicted.lines().map(str::to_string).collect();
            if files.is_empty() {
                return Err(command_error(&["merge"], &output));
            }
            if let Err(e) = self.git.run(&["merge", "--abort"]).await {
                log::error!("Aborting conflicted merge failed: {}", e);
            }
            log::warn!(
                "Merge of {} into {} conflicts in {}",
                source,
                target_branch,
                files.join(", ")
            );
            return Err(VcsError::MergeConflict {
                source_branch: source.to_string(),
                target_branch,
                files,
            });
        }

        let mut info = self.head_commit().await?;
        info.branch = Some(target_branch);
        Ok(info)
    }

    /// Annotated tag on `commit` (HEAD by default)
    pub async fn create_tag(&self, name: &str, message: &str, commit: Option<&str>) -> Result<TagInfo, VcsError> {
        let _guard = self.lock.lock().await;
        let mut args = identity_args(&self.settings.author_name, &self.settings.author_email);
        args.extend(["tag", "-a", name, "-m", message].iter().map(|s| s.to_string()));
        if let Some(commit) = commit {
            args.push(commit.to_string());
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.git.run(&args).await?;

        let peeled = format!("{}^{{commit}}", name);
        let hash = self.git.run(&["rev-parse", &peeled]).await?;
        Ok(TagInfo {
            name: name.to_string(),
            commit: hash.trim().to_string(),
            message: message.to_string(),
        })
    }

    /// Empty when git fails
    pub async fn list_tags(&self) -> Vec<TagInfo> {
        let output = match self
            .git
            .run(&[
                "for-each-ref",
                "--format=%(refname:short)%1f%(*objectname)%1f%(objectname)%1f%(contents:subject)",
                "refs/tags",
            ])
            .await
        {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Listing tags failed: {}", e);
                return Vec::new();
            }
        };

        output
            .lines()
            .filter_map(|line| {
                let fields: Vec<&str> = line.split(FIELD).collect();
                let [name, peeled, object, subject] = fields.as_slice() else {
                    return None;
                };
                // Lightweight tags point at the commit directly
                let commit = if peeled.is_empty() { object } else { peeled };
                Some(TagInfo {
                    name: name.to_string(),
                    commit: commit.to_string(),
                    message: subject.to_string(),
                })
            })
            .collect()
    }
}

fn parse_log(output: &str) -> Vec<CommitInfo> {
    output
        .split(RECORD)
        .map(|record| record.trim_start_matches('\n'))
        .filter(|record| !record.trim().is_empty())
        .filter_map(|record| {
            let fields: Vec<&str> = record.splitn(6, FIELD).collect();
            let [hash, short_hash, author, email, date, message] = fields.as_slice() else {
                return None;
            };
            let timestamp = DateTime::parse_from_rfc3339(date)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            Some(CommitInfo {
                hash: hash.to_string(),
                short_hash: short_hash.to_string(),
                author: author.to_string(),
                email: email.to_string(),
                timestamp,
                message: message.trim_end().to_string(),
                branch: None,
            })
        })
        .collect()
}

fn hunk_start(range: &str) -> usize {
    range
        .split(',')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// Added and removed lines of a unified diff; headers and context are skipped
fn parse_diff(output: &str) -> Vec<DiffChange> {
    let mut changes = Vec::new();
    let mut in_hunk = false;
    let (mut old_line, mut new_line) = (0usize, 0usize);

    for line in output.lines() {
        if let Some(header) = line.strip_prefix("@@ ") {
            let mut ranges = header.split_whitespace();
            old_line = ranges
                .next()
                .and_then(|r| r.strip_prefix('-'))
                .map_or(0, hunk_start);
            new_line = ranges
                .next()
                .and_then(|r| r.strip_prefix('+'))
                .map_or(0, hunk_start);
            in_hunk = true;
            continue;
        }
        if !in_hunk {
            continue;
        }
        if let Some(content) = line.strip_prefix('+') {
            changes.push(DiffChange {
                kind: ChangeKind::Add,
                line: new_line,
                content: content.to_string(),
            });
            new_line += 1;
        } else if let Some(content) = line.strip_prefix('-') {
            changes.push(DiffChange {
                kind: ChangeKind::Remove,
                line: old_line,
                content: content.to_string(),
            });
            old_line += 1;
        } else if line.starts_with(' ') {
            old_line += 1;
            new_line += 1;
        } else if line.starts_with("diff ") {
            in_hunk = false;
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn repo() -> Option<(tempfile::TempDir, WorkflowRepository)> {
        let dir = tempfile::tempdir().unwrap();
        let settings = RepositorySettings {
            root: dir.path().join("repo"),
            ..RepositorySettings::default()
        };
        let repo = match WorkflowRepository::new(settings) {
            Ok(repo) => repo,
            Err(e) => {
                eprintln!("skipping: {}", e);
                return None;
            }
        };
        repo.init().await.unwrap();
        Some((dir, repo))
    }

    fn workflow(active: &str) -> Value {
        json!({
            "id": "42",
            "name": "Lead Intake",
            "active": active,
            "nodes": [
                {"id": "start", "name": "Start", "type": "n8n-nodes-base.manualTrigger", "parameters": {}},
                {"id": "score", "name": "Score", "type": "n8n-nodes-base.code", "parameters": {"jsCode": "return items;"}}
            ],
            "connections": {"Start": {"main": [[{"node": "Score", "type": "main", "index": 0}]]}}
        })
    }

    fn message(text: &str) -> CommitOptions {
        CommitOptions {
            message: Some(text.to_string()),
            author: Some("Ada Lovelace".to_string()),
            email: Some("ada@example.com".to_string()),
            branch: None,
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Lead Intake (v2)!"), "lead-intake-v2");
        assert_eq!(slugify("  --Already-Slugged--  "), "already-slugged");
        assert_eq!(slugify("日本"), "untitled");
        assert_eq!(slugify("aBc_123"), "abc-123");
    }

    #[test]
    fn test_parse_diff_tracks_line_numbers() {
        let output = "diff --git a/x b/x\nindex 1..2 100644\n--- a/x\n+++ b/x\n@@ -3 +3 @@\n-  \"active\": \"no\",\n+  \"active\": \"yes\",\n@@ -9,0 +10,2 @@\n+a\n+b\n\\ No newline at end of file\n";
        let changes = parse_diff(output);
        assert_eq!(changes.len(), 4);
        assert_eq!(changes[0].kind, ChangeKind::Remove);
        assert_eq!(changes[0].line, 3);
        assert_eq!(changes[1].content, "  \"active\": \"yes\",");
        assert_eq!(changes[3].line, 11);
    }

    #[test]
    fn test_parse_log_records() {
        let output = format!(
            "abc123{f}abc{f}Ada{f}ada@example.com{f}2024-03-01T10:00:00+02:00{f}Fix scoring\n\nBody{r}\n",
            f = FIELD,
            r = RECORD
        );
        let commits = parse_log(&output);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].message, "Fix scoring\n\nBody");
        assert_eq!(commits[0].timestamp.to_rfc3339(), "2024-03-01T08:00:00+00:00");
    }

    #[tokio::test]
    async fn test_commit_history_and_empty_commit() {
        let Some((_dir, repo)) = repo().await else { return };
        assert!(repo.history("42", 10).await.is_empty());

        let first = repo.commit("42", "Lead Intake", &workflow("no"), &message("first")).await.unwrap();
        assert_eq!(first.author, "Ada Lovelace");
        assert_eq!(first.email, "ada@example.com");
        assert_eq!(first.branch.as_deref(), Some("main"));
        assert_eq!(first.hash.len(), 40);

        let path = repo.settings().root.join("workflows/lead-intake-42.json");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("}\n"));

        let err = repo.commit("42", "Lead Intake", &workflow("no"), &message("again")).await.unwrap_err();
        assert!(matches!(err, VcsError::NothingToCommit(_)));

        repo.commit("42", "Lead Intake", &workflow("yes"), &message("second")).await.unwrap();
        let history = repo.history("42", 10).await;
        let messages: Vec<&str> = history.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "first"]);
        assert_eq!(repo.history("42", 1).await.len(), 1);
        assert!(repo.history("unknown", 10).await.is_empty());

        let listed = repo.list_workflows().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].workflow_id, "42");
        assert_eq!(listed[0].name, "Lead Intake");
    }

    #[tokio::test]
    async fn test_diff_of_single_field_change() {
        let Some((_dir, repo)) = repo().await else { return };
        let a = repo.commit("42", "Lead Intake", &workflow("no"), &message("a")).await.unwrap();
        let b = repo.commit("42", "Lead Intake", &workflow("yes"), &message("b")).await.unwrap();

        let diff = repo.diff("42", &a.hash, &b.hash).await.unwrap();
        assert_eq!(diff.additions, 1);
        assert_eq!(diff.deletions, 1);
        assert_eq!(diff.changes[0].kind, ChangeKind::Remove);
        assert!(diff.changes[0].content.contains("\"active\": \"no\""));
        assert!(diff.changes[1].content.contains("\"active\": \"yes\""));

        let head = repo.diff("42", &a.hash, "HEAD").await.unwrap();
        assert_eq!(head.additions, 1);

        let missing = repo.diff("nope", &a.hash, "HEAD").await.unwrap_err();
        assert!(matches!(missing, VcsError::WorkflowNotFound(_)));
    }

    #[tokio::test]
    async fn test_rollback_restores_bytes_without_committing() {
        let Some((_dir, repo)) = repo().await else { return };
        let v1 = repo.commit("42", "Lead Intake", &workflow("no"), &message("v1")).await.unwrap();
        let path = repo.settings().root.join("workflows/lead-intake-42.json");
        let v1_bytes = std::fs::read(&path).unwrap();
        repo.commit("42", "Lead Intake", &workflow("yes"), &message("v2")).await.unwrap();

        let restored = repo.rollback("42", &v1.hash).await.unwrap();
        assert_eq!(restored, workflow("no"));
        assert_eq!(std::fs::read(&path).unwrap(), v1_bytes);
        assert_eq!(repo.history("42", 10).await.len(), 2);

        let at_v1 = repo.get_workflow_at_commit("42", &v1.hash).await.unwrap();
        assert_eq!(at_v1["active"], "no");
        let raw = repo.get_raw_at_commit("42", &v1.hash).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), raw);
    }

    #[tokio::test]
    async fn test_rename_follows_history() {
        let Some((_dir, repo)) = repo().await else { return };
        let old = repo.commit("42", "Lead Intake", &workflow("no"), &message("old name")).await.unwrap();
        let mut renamed = workflow("no");
        renamed["name"] = json!("Lead Router");
        repo.commit("42", "Lead Router", &renamed, &message("rename")).await.unwrap();

        let root = &repo.settings().root;
        assert!(!root.join("workflows/lead-intake-42.json").exists());
        assert!(root.join("workflows/lead-router-42.json").exists());
        assert_eq!(repo.history("42", 10).await.len(), 2);

        let before = repo.get_workflow_at_commit("42", &old.hash).await.unwrap();
        assert_eq!(before["name"], "Lead Intake");
    }

    #[tokio::test]
    async fn test_branch_commit_and_merge() {
        let Some((_dir, repo)) = repo().await else { return };
        repo.commit("42", "Lead Intake", &workflow("no"), &message("base")).await.unwrap();

        let mut options = message("feature work");
        options.branch = Some("feature".to_string());
        repo.commit("42", "Lead Intake", &workflow("yes"), &options).await.unwrap();
        assert_eq!(repo.current_branch().await.unwrap(), "feature");

        let merged = repo.merge("feature", Some("main"), None).await.unwrap();
        assert_eq!(merged.branch.as_deref(), Some("main"));
        assert!(merged.message.starts_with("Merge branch 'feature'"));
        assert_eq!(repo.current_branch().await.unwrap(), "main");
        let content = std::fs::read_to_string(repo.settings().root.join("workflows/lead-intake-42.json")).unwrap();
        assert!(content.contains("\"active\": \"yes\""));

        let branches = repo.list_branches().await;
        let names: Vec<&str> = branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["feature", "main"]);
        assert!(branches.iter().any(|b| b.name == "main" && b.current));

        repo.delete_branch("feature", false).await.unwrap();
        assert_eq!(repo.list_branches().await.len(), 1);
    }

    #[tokio::test]
    async fn test_conflicting_merge_is_aborted() {
        let Some((_dir, repo)) = repo().await else { return };
        repo.commit("42", "Lead Intake", &workflow("base"), &message("base")).await.unwrap();

        repo.create_or_checkout_branch("left", None).await.unwrap();
        repo.commit("42", "Lead Intake", &workflow("left"), &message("left")).await.unwrap();
        repo.create_or_checkout_branch("main", None).await.unwrap();
        repo.commit("42", "Lead Intake", &workflow("right"), &message("right")).await.unwrap();

        let err = repo.merge("left", None, None).await.unwrap_err();
        match err {
            VcsError::MergeConflict { files, target_branch, .. } => {
                assert_eq!(files, vec!["workflows/lead-intake-42.json".to_string()]);
                assert_eq!(target_branch, "main");
            }
            other => panic!("expected conflict, got {other}"),
        }

        let content = std::fs::read_to_string(repo.settings().root.join("workflows/lead-intake-42.json")).unwrap();
        assert!(content.contains("\"active\": \"right\""));
        assert!(!content.contains("<<<<<<<"));
    }

    #[tokio::test]
    async fn test_tags() {
        let Some((_dir, repo)) = repo().await else { return };
        assert!(repo.list_tags().await.is_empty());
        let head = repo.commit("42", "Lead Intake", &workflow("no"), &message("release")).await.unwrap();

        let tag = repo.create_tag("v1.0", "first release", None).await.unwrap();
        assert_eq!(tag.commit, head.hash);

        let tags = repo.list_tags().await;
        assert_eq!(tags, vec![tag]);
    }

    #[tokio::test]
    async fn test_ids_sharing_a_suffix_stay_apart() {
        let Some((_dir, repo)) = repo().await else { return };
        let flow = json!({"id": "a-1", "name": "Flow", "nodes": []});
        repo.commit("a-1", "Flow", &flow, &message("flow")).await.unwrap();

        assert!(repo.history("1", 10).await.is_empty());
        assert!(matches!(
            repo.diff("1", "HEAD", "HEAD").await.unwrap_err(),
            VcsError::WorkflowNotFound(_)
        ));

        let other = json!({"id": "1", "name": "Other", "nodes": []});
        repo.commit("1", "Other", &other, &message("other")).await.unwrap();

        let root = &repo.settings().root;
        assert!(root.join("workflows/flow-a-1.json").exists());
        assert!(root.join("workflows/other-1.json").exists());
        assert_eq!(repo.history("a-1", 10).await.len(), 1);
        assert_eq!(repo.history("1", 10).await.len(), 1);
        assert_eq!(repo.get_workflow_at_commit("a-1", "HEAD").await.unwrap(), flow);
    }

    #[tokio::test]
    async fn test_colliding_slug_is_rejected() {
        let Some((_dir, repo)) = repo().await else { return };
        repo.commit("a-1", "Flow", &json!({"id": "a-1", "name": "Flow"}), &message("flow"))
            .await
            .unwrap();

        let err = repo
            .commit("A_1", "Flow", &json!({"id": "A_1", "name": "Flow"}), &message("clash"))
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::PathConflict { .. }));
        let kept = repo.get_workflow_at_commit("a-1", "HEAD").await.unwrap();
        assert_eq!(kept["id"], "a-1");
        assert!(repo.history("A_1", 10).await.is_empty());

        let mismatch = repo
            .commit("9", "Nine", &json!({"id": "10"}), &message("wrong id"))
            .await
            .unwrap_err();
        assert!(matches!(mismatch, VcsError::InvalidWorkflow(_)));
    }

    #[tokio::test]
    async fn test_missing_id_is_stamped() {
        let Some((_dir, repo)) = repo().await else { return };
        repo.commit("77", "Bare", &json!({"name": "Bare"}), &message("bare"))
            .await
            .unwrap();
        let stored = repo.get_workflow_at_commit("77", "HEAD").await.unwrap();
        assert_eq!(stored["id"], "77");
        assert_eq!(repo.history("77", 10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_branch_commits_are_serialized() {
        let Some((_dir, repo)) = repo().await else { return };
        repo.commit("42", "Lead Intake", &workflow("no"), &message("base")).await.unwrap();

        let mut alpha = message("alpha");
        alpha.branch = Some("feature-a".to_string());
        let mut beta = message("beta");
        beta.branch = Some("feature-b".to_string());
        let alpha_doc = json!({"id": "7", "name": "Alpha"});
        let beta_doc = json!({"id": "8", "name": "Beta"});

        let (a, b) = tokio::join!(
            repo.commit("7", "Alpha", &alpha_doc, &alpha),
            repo.commit("8", "Beta", &beta_doc, &beta),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.branch.as_deref(), Some("feature-a"));
        assert_eq!(b.branch.as_deref(), Some("feature-b"));

        assert_eq!(repo.get_workflow_at_commit("7", &a.hash).await.unwrap(), alpha_doc);
        assert_eq!(repo.get_workflow_at_commit("8", &b.hash).await.unwrap(), beta_doc);
        assert_eq!(repo.get_workflow_at_commit("7", "feature-a").await.unwrap(), alpha_doc);
        assert_eq!(repo.get_workflow_at_commit("8", "feature-b").await.unwrap(), beta_doc);

        let status = repo.git.run(&["status", "--porcelain"]).await.unwrap();
        assert!(status.trim().is_empty(), "dirty tree: {status}");
    }
}
