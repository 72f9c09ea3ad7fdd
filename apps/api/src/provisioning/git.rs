//! Git transport: clone, commit and push through the `git` CLI.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Author/committer identity written into the local repository config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitFailureKind {
    /// git refused to commit because no user name/email is configured.
    IdentityUnknown,
    Other,
}

const IDENTITY_MARKERS: [&str; 5] = [
    "author identity unknown",
    "committer identity unknown",
    "please tell me who you are",
    "unable to auto-detect email address",
    "empty ident name",
];

/// Classifies git's stderr. The CLI exits 128 for most fatal errors, so the
/// message text is the only signal available.
pub fn classify_git_failure(stderr: &str) -> GitFailureKind {
    let stderr = stderr.to_lowercase();
    if IDENTITY_MARKERS.iter().any(|m| stderr.contains(m)) {
        GitFailureKind::IdentityUnknown
    } else {
        GitFailureKind::Other
    }
}

#[derive(Debug, Clone)]
pub struct GitError {
    pub operation: &'static str,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl GitError {
    pub fn kind(&self) -> GitFailureKind {
        classify_git_failure(&self.stderr)
    }

    /// Replaces every occurrence of `secret` in the captured output.
    pub fn redact(mut self, secret: &str, replacement: &str) -> Self {
        if !secret.is_empty() {
            self.stderr = self.stderr.replace(secret, replacement);
        }
        self
    }
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "git {} failed (exit {code}): {}", self.operation, self.stderr.trim()),
            None => write!(f, "git {} failed: {}", self.operation, self.stderr.trim()),
        }
    }
}

impl std::error::Error for GitError {}

#[async_trait]
pub trait GitTransport: Send + Sync {
    async fn clone_repository(&self, remote_url: &str, dest: &Path) -> Result<(), GitError>;
    async fn set_identity(&self, repo: &Path, identity: &CommitIdentity) -> Result<(), GitError>;
    async fn create_branch(&self, repo: &Path, branch: &str) -> Result<(), GitError>;
    async fn stage(&self, repo: &Path, path: &str) -> Result<(), GitError>;
    async fn commit(&self, repo: &Path, message: &str) -> Result<(), GitError>;
    async fn push(&self, repo: &Path, branch: &str) -> Result<(), GitError>;
}

/// Drives the system `git` binary.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    async fn run(
        &self,
        operation: &'static str,
        cwd: Option<&Path>,
        args: &[&str],
    ) -> Result<String, GitError> {
        let mut command = Command::new("git");
        command
            .args(args)
            // Never block on a credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| GitError {
            operation,
            exit_code: None,
            stderr: format!("failed to run git: {e}"),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(GitError {
                operation,
                exit_code: output.status.code(),
                // `git commit` reports some failures on stdout.
                stderr: if stderr.trim().is_empty() {
                    stdout.into_owned()
                } else {
                    stderr
                },
            });
        }

        debug!("git {operation} succeeded");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl GitTransport for GitCli {
    async fn clone_repository(&self, remote_url: &str, dest: &Path) -> Result<(), GitError> {
        let dest = dest.to_string_lossy();
        self.run("clone", None, &["clone", "--quiet", remote_url, dest.as_ref()])
            .await
            .map(|_| ())
    }

    async fn set_identity(&self, repo: &Path, identity: &CommitIdentity) -> Result<(), GitError> {
        self.run("config", Some(repo), &["config", "user.name", &identity.name])
            .await?;
        self.run("config", Some(repo), &["config", "user.email", &identity.email])
            .await
            .map(|_| ())
    }

    async fn create_branch(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        self.run("checkout", Some(repo), &["checkout", "-b", branch])
            .await
            .map(|_| ())
    }

    async fn stage(&self, repo: &Path, path: &str) -> Result<(), GitError> {
        self.run("add", Some(repo), &["add", "--", path])
            .await
            .map(|_| ())
    }

    async fn commit(&self, repo: &Path, message: &str) -> Result<(), GitError> {
        self.run("commit", Some(repo), &["commit", "--quiet", "-m", message])
            .await
            .map(|_| ())
    }

    async fn push(&self, repo: &Path, branch: &str) -> Result<(), GitError> {
        self.run("push", Some(repo), &["push", "--quiet", "-u", "origin", branch])
            .await
            .map(|_| ())
    }
}
