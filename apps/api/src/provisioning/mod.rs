//! Repository provisioning turns generated challenge text into a new public
//! repository with the challenge committed on a feature branch.
//!
//! Steps: name → create remote → clone → write README → identity → branch →
//! commit (one retry on unknown identity) → push → URLs.
//!
//! Nothing is rolled back. A failure after the remote repository exists leaves
//! it in the account; deleting it would need a token with `delete_repo` scope.

pub mod git;
pub mod github;
pub mod naming;

use std::path::Path;
use std::sync::Arc;

use reqwest::Url;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::GithubConfig;
use crate::intake::submission::CandidateProfile;
use git::{CommitIdentity, GitError, GitFailureKind, GitTransport};
use github::{Account, CreatedRepository, HostingApi, NewRepository};
use naming::{current_timestamp_millis, repository_name};

pub const ROOT_DOCUMENT: &str = "README.md";
const COMMIT_MESSAGE: &str = "Add generated coding challenge";
const FALLBACK_IDENTITY_NAME: &str = "Challenge Generator";
const FALLBACK_IDENTITY_EMAIL: &str = "challenge-generator@users.noreply.github.com";

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("GitHub {operation} failed (status {status}): {message}")]
    Api {
        operation: &'static str,
        status: u16,
        message: String,
    },

    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid remote URL: {0}")]
    InvalidRemote(String),
}

/// Links to a freshly provisioned challenge repository.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryHandle {
    pub name: String,
    pub html_url: String,
    pub branch_url: String,
    pub editor_url: String,
}

#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub base_name: String,
    pub branch: String,
    pub editor_base_url: String,
    /// Explicit identity; takes precedence over the account's.
    pub identity: Option<CommitIdentity>,
}

impl ProvisionSettings {
    pub fn from_config(config: &GithubConfig) -> Self {
        let identity = match (&config.author_name, &config.author_email) {
            (Some(name), Some(email)) => Some(CommitIdentity {
                name: name.clone(),
                email: email.clone(),
            }),
            _ => None,
        };
        Self {
            base_name: config.repo_base_name.clone(),
            branch: config.branch.clone(),
            editor_base_url: config.editor_base_url.trim_end_matches('/').to_string(),
            identity,
        }
    }
}

impl CommitIdentity {
    pub fn from_account(account: &Account) -> Self {
        Self {
            name: account
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| account.login.clone()),
            email: account
                .email
                .clone()
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| format!("{}+{}@users.noreply.github.com", account.id, account.login)),
        }
    }

    fn fallback() -> Self {
        Self {
            name: FALLBACK_IDENTITY_NAME.to_string(),
            email: FALLBACK_IDENTITY_EMAIL.to_string(),
        }
    }
}

pub struct RepositoryProvisioner {
    hosting: Arc<dyn HostingApi>,
    git: Arc<dyn GitTransport>,
    settings: ProvisionSettings,
}

impl RepositoryProvisioner {
    pub fn new(
        hosting: Arc<dyn HostingApi>,
        git: Arc<dyn GitTransport>,
        settings: ProvisionSettings,
    ) -> Self {
        Self {
            hosting,
            git,
            settings,
        }
    }

    /// Creates, populates and pushes a new challenge repository.
    pub async fn provision(
        &self,
        content: &str,
        profile: &CandidateProfile,
    ) -> Result<RepositoryHandle, ProvisionError> {
        let name = repository_name(
            &self.settings.base_name,
            current_timestamp_millis(),
            profile.last_name.as_deref(),
            profile.job_title.as_deref(),
        );

        let description = match &profile.job_title {
            Some(title) => format!("Coding challenge: {title}"),
            None => "Generated coding challenge".to_string(),
        };
        let repo = self
            .hosting
            .create_repository(&NewRepository::public(&name, description))
            .await?;
        info!(
            "Created repository {}/{} (default branch {})",
            repo.owner.login,
            repo.name,
            repo.default_branch.as_deref().unwrap_or("unknown")
        );

        // Removed when this invocation ends, success or not.
        let workdir = tempfile::Builder::new()
            .prefix(&format!("{}-", repo.name))
            .tempdir()?;
        let checkout = workdir.path().join(&repo.name);

        let remote = self.hosting.authenticated_remote(&repo)?;
        let scrub = |e: GitError| scrub_credentials(e, &remote, &repo.clone_url);

        self.git
            .clone_repository(&remote, &checkout)
            .await
            .map_err(scrub)?;

        tokio::fs::write(
            checkout.join(ROOT_DOCUMENT),
            render_root_document(&repo.name, content),
        )
        .await?;

        let identity = self.resolve_identity().await;
        if let Err(e) = self.git.set_identity(&checkout, &identity).await {
            warn!("Could not set local commit identity, continuing: {e}");
        }

        self.git
            .create_branch(&checkout, &self.settings.branch)
            .await?;
        self.git.stage(&checkout, ROOT_DOCUMENT).await?;
        self.commit_with_identity_retry(&checkout, &identity).await?;
        self.git
            .push(&checkout, &self.settings.branch)
            .await
            .map_err(scrub)?;
        info!("Pushed branch '{}' to {}", self.settings.branch, repo.html_url);

        Ok(self.handle_for(&repo))
    }

    async fn resolve_identity(&self) -> CommitIdentity {
        if let Some(identity) = &self.settings.identity {
            return identity.clone();
        }
        match self.hosting.authenticated_account().await {
            Ok(account) => CommitIdentity::from_account(&account),
            Err(e) => {
                warn!("Could not read account identity, using fallback: {e}");
                CommitIdentity::fallback()
            }
        }
    }

    /// Commits once; if git rejects the commit for a missing identity, writes
    /// the identity again and makes exactly one more attempt.
    async fn commit_with_identity_retry(
        &self,
        checkout: &Path,
        identity: &CommitIdentity,
    ) -> Result<(), GitError> {
        match self.git.commit(checkout, COMMIT_MESSAGE).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == GitFailureKind::IdentityUnknown => {
                warn!("Commit rejected for unknown identity; reconfiguring and retrying once");
                self.git.set_identity(checkout, identity).await?;
                self.git.commit(checkout, COMMIT_MESSAGE).await
            }
            Err(e) => Err(e),
        }
    }

    fn handle_for(&self, repo: &CreatedRepository) -> RepositoryHandle {
        let branch = &self.settings.branch;
        RepositoryHandle {
            name: repo.name.clone(),
            html_url: repo.html_url.clone(),
            branch_url: format!("{}/tree/{branch}", repo.html_url.trim_end_matches('/')),
            editor_url: format!(
                "{}/{}/{}/tree/{branch}",
                self.settings.editor_base_url, repo.owner.login, repo.name
            ),
        }
    }
}

/// Root document: the repository name as title, then the challenge text.
pub fn render_root_document(repo_name: &str, content: &str) -> String {
    format!("# {repo_name}\n\n{}\n", content.trim())
}

fn scrub_credentials(err: GitError, remote: &str, public_url: &str) -> GitError {
    let err = err.redact(remote, public_url);
    match Url::parse(remote).ok().and_then(|u| u.password().map(str::to_string)) {
        Some(password) => err.redact(&password, "***"),
        None => err,
    }
}
