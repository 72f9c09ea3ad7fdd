use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Resolved once at startup and carried in `AppState`; nothing reads the
/// environment after this.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub completion: CompletionConfig,
    pub github: GithubConfig,
    pub intake: IntakeConfig,
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub token: String,
    pub api_url: String,
    pub editor_base_url: String,
    pub repo_base_name: String,
    pub branch: String,
    /// Explicit commit identity. Only used when both halves are set.
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub max_file_bytes: usize,
    pub max_files: usize,
    pub timeout_secs: u64,
}

/// Multipart framing and metadata fields on top of the file payloads.
const BODY_OVERHEAD_BYTES: usize = 1024 * 1024;

impl IntakeConfig {
    /// Largest request body accepted: every file at its ceiling plus framing.
    pub fn max_body_bytes(&self) -> usize {
        self.max_file_bytes * self.max_files + BODY_OVERHEAD_BYTES
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            max_files: 2,
            timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let intake_defaults = IntakeConfig::default();

        Ok(Config {
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            completion: CompletionConfig {
                api_key: require_env("OPENAI_API_KEY")?,
                base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
                model: env_or("OPENAI_MODEL", "gpt-4o"),
                max_tokens: parse_env("COMPLETION_MAX_TOKENS", 4096)?,
                temperature: parse_env("COMPLETION_TEMPERATURE", 0.7)?,
                timeout_secs: parse_env("COMPLETION_TIMEOUT_SECS", 300)?,
            },
            github: GithubConfig {
                token: require_env("GITHUB_TOKEN")?,
                api_url: env_or("GITHUB_API_URL", "https://api.github.com"),
                editor_base_url: env_or("EDITOR_BASE_URL", "https://github.dev"),
                repo_base_name: env_or("REPO_BASE_NAME", "coding-challenge"),
                branch: env_or("CHALLENGE_BRANCH", "challenge"),
                author_name: optional_env("GIT_AUTHOR_NAME"),
                author_email: optional_env("GIT_AUTHOR_EMAIL"),
            },
            intake: IntakeConfig {
                max_file_bytes: parse_env("MAX_UPLOAD_BYTES", intake_defaults.max_file_bytes)?,
                max_files: intake_defaults.max_files,
                timeout_secs: parse_env("MULTIPART_TIMEOUT_SECS", intake_defaults.timeout_secs)?,
            },
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Config {
            port: 0,
            rust_log: "debug".to_string(),
            completion: CompletionConfig {
                api_key: "test-key".to_string(),
                base_url: "http://127.0.0.1:9/v1".to_string(),
                model: "test-model".to_string(),
                max_tokens: 256,
                temperature: 0.0,
                timeout_secs: 5,
            },
            github: GithubConfig {
                token: "test-token".to_string(),
                api_url: "http://127.0.0.1:9".to_string(),
                editor_base_url: "https://github.dev".to_string(),
                repo_base_name: "coding-challenge".to_string(),
                branch: "challenge".to_string(),
                author_name: None,
                author_email: None,
            },
            intake: IntakeConfig::default(),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        None => Ok(default),
    }
}
