//! Scripted collaborators shared by the pipeline, provisioner and route tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::challenge::pipeline::ChallengePipeline;
use crate::config::IntakeConfig;
use crate::llm_client::{CompletionError, CompletionProvider};
use crate::provisioning::git::{CommitIdentity, GitError, GitTransport};
use crate::provisioning::github::{
    with_credentials, Account, CreatedRepository, HostingApi, NewRepository, RepositoryOwner,
};
use crate::provisioning::{ProvisionError, ProvisionSettings, RepositoryProvisioner};

pub const BOUNDARY: &str = "challenge-test-boundary";

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// Builds a multipart/form-data body.
#[derive(Default)]
pub struct MultipartBuilder {
    body: String,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str, file_name: &str, content: &str) -> Self {
        self.body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: text/plain\r\n\r\n{content}\r\n"
        ));
        self
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
        self
    }

    pub fn build(mut self) -> Bytes {
        self.body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Bytes::from(self.body)
    }
}

pub fn valid_submission() -> Bytes {
    MultipartBuilder::new()
        .file("resume", "resume.txt", "Six years of Rust and Kafka.")
        .file("job_description", "jd.txt", "Senior backend engineer, payments.")
        .text("first_name", "Ada")
        .text("last_name", "O Brien")
        .text("job_title", "Senior  QA Engineer")
        .text("difficulty", "senior")
        .build()
}

type Outcome = Box<dyn Fn() -> Result<String, CompletionError> + Send + Sync>;

pub struct FakeCompletion {
    outcome: Outcome,
    prompts: Mutex<Vec<String>>,
}

impl FakeCompletion {
    pub fn ok(text: &str) -> Self {
        let text = text.to_string();
        Self::scripted(Box::new(move || Ok(text.clone())))
    }

    pub fn failing(make: fn() -> CompletionError) -> Self {
        Self::scripted(Box::new(move || Err(make())))
    }

    fn scripted(outcome: Outcome) -> Self {
        Self {
            outcome,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionProvider for FakeCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.outcome)()
    }
}

#[derive(Default)]
pub struct FakeHosting {
    created: Mutex<Vec<String>>,
    account_calls: AtomicUsize,
    fail_create: bool,
}

impl FakeHosting {
    pub fn failing_create() -> Self {
        Self {
            fail_create: true,
            ..Default::default()
        }
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn account_calls(&self) -> usize {
        self.account_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostingApi for FakeHosting {
    async fn authenticated_account(&self) -> Result<Account, ProvisionError> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Account {
            login: "acme".to_string(),
            id: 7,
            name: None,
            email: None,
        })
    }

    async fn create_repository(&self, repo: &NewRepository) -> Result<CreatedRepository, ProvisionError> {
        if self.fail_create {
            return Err(ProvisionError::Api {
                operation: "create repository",
                status: 422,
                message: "name already exists on this account".to_string(),
            });
        }
        self.created.lock().unwrap().push(repo.name.clone());
        Ok(CreatedRepository {
            name: repo.name.clone(),
            html_url: format!("https://github.com/acme/{}", repo.name),
            clone_url: format!("https://github.com/acme/{}.git", repo.name),
            default_branch: Some("main".to_string()),
            owner: RepositoryOwner {
                login: "acme".to_string(),
            },
        })
    }

    fn authenticated_remote(&self, repo: &CreatedRepository) -> Result<String, ProvisionError> {
        with_credentials(&repo.clone_url, "fake-token")
    }
}

/// Records every git call; commit outcomes can be scripted.
#[derive(Default)]
pub struct FakeGit {
    calls: Mutex<Vec<String>>,
    identities: Mutex<Vec<CommitIdentity>>,
    commit_results: Mutex<VecDeque<Result<(), GitError>>>,
    staged: Mutex<Option<String>>,
    fail_identity_once: AtomicBool,
    push_failure: Mutex<Option<String>>,
}

impl FakeGit {
    /// Commits return these results in order, then succeed.
    pub fn with_commit_results(results: Vec<Result<(), GitError>>) -> Self {
        Self {
            commit_results: Mutex::new(results.into()),
            ..Default::default()
        }
    }

    pub fn fail_set_identity_once(&self) {
        self.fail_identity_once.store(true, Ordering::SeqCst);
    }

    pub fn fail_push_with(&self, stderr: &str) {
        *self.push_failure.lock().unwrap() = Some(stderr.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn identities(&self) -> Vec<CommitIdentity> {
        self.identities.lock().unwrap().clone()
    }

    pub fn staged_document(&self) -> Option<String> {
        self.staged.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl GitTransport for FakeGit {
    async fn clone_repository(&self, _remote_url: &str, dest: &Path) -> Result<(), GitError> {
        self.record("clone");
        tokio::fs::create_dir_all(dest).await.map_err(|e| GitError {
            operation: "clone",
            exit_code: None,
            stderr: e.to_string(),
        })
    }

    async fn set_identity(&self, _repo: &Path, identity: &CommitIdentity) -> Result<(), GitError> {
        self.record("set_identity");
        if self.fail_identity_once.swap(false, Ordering::SeqCst) {
            return Err(GitError {
                operation: "config",
                exit_code: Some(255),
                stderr: "error: could not lock config file".to_string(),
            });
        }
        self.identities.lock().unwrap().push(identity.clone());
        Ok(())
    }

    async fn create_branch(&self, _repo: &Path, branch: &str) -> Result<(), GitError> {
        self.record(format!("create_branch:{branch}"));
        Ok(())
    }

    async fn stage(&self, repo: &Path, path: &str) -> Result<(), GitError> {
        self.record(format!("stage:{path}"));
        let content = tokio::fs::read_to_string(repo.join(path)).await.map_err(|e| GitError {
            operation: "add",
            exit_code: Some(128),
            stderr: e.to_string(),
        })?;
        *self.staged.lock().unwrap() = Some(content);
        Ok(())
    }

    async fn commit(&self, _repo: &Path, _message: &str) -> Result<(), GitError> {
        self.record("commit");
        self.commit_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn push(&self, _repo: &Path, branch: &str) -> Result<(), GitError> {
        self.record(format!("push:{branch}"));
        match self.push_failure.lock().unwrap().clone() {
            Some(stderr) => Err(GitError {
                operation: "push",
                exit_code: Some(128),
                stderr,
            }),
            None => Ok(()),
        }
    }
}

pub fn test_settings() -> ProvisionSettings {
    ProvisionSettings {
        base_name: "coding-challenge".to_string(),
        branch: "challenge".to_string(),
        editor_base_url: "https://github.dev".to_string(),
        identity: None,
    }
}

pub fn pipeline_with(
    completion: Arc<FakeCompletion>,
    hosting: Arc<FakeHosting>,
    git: Arc<FakeGit>,
) -> ChallengePipeline {
    ChallengePipeline::new(
        completion,
        RepositoryProvisioner::new(hosting, git, test_settings()),
        IntakeConfig::default(),
    )
}
