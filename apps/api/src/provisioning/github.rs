//! GitHub REST client: the hosting account the challenge repositories live in.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GithubConfig;
use crate::provisioning::ProvisionError;

const GITHUB_API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("challenge-api/", env!("CARGO_PKG_VERSION"));

/// The authenticated account.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub login: String,
    pub id: u64,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryOwner {
    pub login: String,
}

/// The subset of GitHub's repository object this service reads.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedRepository {
    pub name: String,
    pub html_url: String,
    pub clone_url: String,
    pub default_branch: Option<String>,
    pub owner: RepositoryOwner,
}

/// `POST /user/repos` payload.
#[derive(Debug, Clone, Serialize)]
pub struct NewRepository {
    pub name: String,
    pub description: String,
    pub private: bool,
    pub auto_init: bool,
}

impl NewRepository {
    /// Public repository initialized with a default branch.
    pub fn public(name: &str, description: String) -> Self {
        Self {
            name: name.to_string(),
            description,
            private: false,
            auto_init: true,
        }
    }
}

#[async_trait]
pub trait HostingApi: Send + Sync {
    async fn authenticated_account(&self) -> Result<Account, ProvisionError>;
    async fn create_repository(&self, repo: &NewRepository) -> Result<CreatedRepository, ProvisionError>;
    /// Remote URL with credentials embedded, for clone and push.
    fn authenticated_remote(&self, repo: &CreatedRepository) -> Result<String, ProvisionError>;
}

#[derive(Debug, Deserialize)]
struct GithubErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    token: String,
    api_url: String,
}

impl GithubClient {
    pub fn new(config: &GithubConfig) -> Result<Self, ProvisionError> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .user_agent(USER_AGENT)
                .build()?,
            token: config.token.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.api_url))
            .bearer_auth(&self.token)
            .header("accept", "application/vnd.github+json")
            .header("x-github-api-version", GITHUB_API_VERSION)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<T, ProvisionError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GithubErrorBody>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            warn!("GitHub {operation} returned {status}: {message}");
            return Err(ProvisionError::Api {
                operation,
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl HostingApi for GithubClient {
    async fn authenticated_account(&self) -> Result<Account, ProvisionError> {
        let response = self.request(reqwest::Method::GET, "/user").send().await?;
        Self::read_json("get account", response).await
    }

    async fn create_repository(&self, repo: &NewRepository) -> Result<CreatedRepository, ProvisionError> {
        debug!("Creating GitHub repository {}", repo.name);
        let response = self
            .request(reqwest::Method::POST, "/user/repos")
            .json(repo)
            .send()
            .await?;
        Self::read_json("create repository", response).await
    }

    fn authenticated_remote(&self, repo: &CreatedRepository) -> Result<String, ProvisionError> {
        with_credentials(&repo.clone_url, &self.token)
    }
}

/// Embeds `x-access-token:<token>` user info into an https clone URL.
pub fn with_credentials(clone_url: &str, token: &str) -> Result<String, ProvisionError> {
    let mut url = Url::parse(clone_url)
        .map_err(|e| ProvisionError::InvalidRemote(format!("{clone_url}: {e}")))?;
    url.set_username("x-access-token")
        .and_then(|_| url.set_password(Some(token)))
        .map_err(|_| ProvisionError::InvalidRemote(format!("{clone_url}: cannot carry credentials")))?;
    Ok(url.to_string())
}
