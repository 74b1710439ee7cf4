use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::process::Command;

use super::VcsError;

/// Runs git commands against one working directory
#[derive(Debug, Clone)]
pub struct Git {
    binary: PathBuf,
    workdir: PathBuf,
}

impl Git {
    pub fn new(binary: PathBuf, workdir: PathBuf) -> Self {
        Self { binary, workdir }
    }

    /// Run without checking the exit status
    pub async fn output(&self, args: &[&str]) -> Result<Output, VcsError> {
        log::debug!("git {}", args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        Ok(output)
    }

    /// Run and return raw stdout, failing on a non-zero exit
    pub async fn run_bytes(&self, args: &[&str]) -> Result<Vec<u8>, VcsError> {
        let output = self.output(args).await?;
        if !output.status.success() {
            return Err(command_error(args, &output));
        }
        Ok(output.stdout)
    }

    /// Run and return stdout as text, failing on a non-zero exit
    pub async fn run(&self, args: &[&str]) -> Result<String, VcsError> {
        let stdout = self.run_bytes(args).await?;
        Ok(String::from_utf8_lossy(&stdout).to_string())
    }

    /// Exit status only; `Ok(false)` for a non-zero exit
    pub async fn check(&self, args: &[&str]) -> Result<bool, VcsError> {
        Ok(self.output(args).await?.status.success())
    }
}

pub(crate) fn command_error(args: &[&str], output: &Output) -> VcsError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stderr = if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr
    };
    VcsError::Command {
        command: args.first().copied().unwrap_or_default().to_string(),
        code: output.status.code(),
        stderr,
    }
}

/// `-c` options that give a command an identity without touching git config
pub(crate) fn identity_args(name: &str, email: &str) -> Vec<String> {
    vec![
        "-c".to_string(),
        format!("user.name={}", name),
        "-c".to_string(),
        format!("user.email={}", email),
        "-c".to_string(),
        "commit.gpgsign=false".to_string(),
        "-c".to_string(),
        "tag.gpgsign=false".to_string(),
    ]
}
