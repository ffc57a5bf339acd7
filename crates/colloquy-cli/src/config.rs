use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use colloquy_core::ChatModel;
use colloquy_core::cache::DEFAULT_CAPACITY;
use colloquy_core::providers::openai::DEFAULT_BASE_URL;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColloquyConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub task: TaskSection,
    #[serde(default)]
    pub cache: CacheSection,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl std::fmt::Debug for LlmSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSection")
            .field("base_url", &self.base_url)
            .field("api_key", &mask_secret(&self.api_key))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_model() -> String {
    ChatModel::Gpt4.as_str().to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSection {
    /// Steps the Student task may take before it is cut off
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for TaskSection {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

fn default_max_turns() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    /// Where cached responses are persisted; defaults to `~/.colloquy/cache.json`
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            path: None,
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl CacheSection {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| config_dir().join("cache.json"))
    }
}

/// The API key as shown in `Debug` output: its first 3 and last 4 characters.
fn mask_secret(key: &str) -> String {
    let len = key.chars().count();
    match len {
        0 => "(empty)".into(),
        1..=7 => "***".into(),
        _ => {
            let head: String = key.chars().take(3).collect();
            let tail: String = key.chars().skip(len - 4).collect();
            format!("{head}...{tail}")
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".colloquy")
}

impl ColloquyConfig {
    /// Load the config file, falling back to defaults when the default
    /// location has none. An explicitly given path must exist.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        let mut config = if custom_path.is_none() && !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            Self::default()
        } else {
            Self::from_file(&path)?
        };

        if config.llm.api_key.is_empty() {
            config.llm.api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        }
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        // The file may hold an API key
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow::anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;

        let expanded = expand_env_vars(&content);

        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        if config.llm.api_key.starts_with("sk-") {
            warn!(
                "API key is hardcoded in config file. For security, use environment variables: api_key = \"${{OPENAI_API_KEY}}\""
            );
        }

        Ok(config)
    }
}

/// Allowlist of environment variable names that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &["OPENAI_API_KEY", "OPENAI_BASE_URL", "HOME", "USER"];

fn expand_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + end];
        result.push_str(&rest[..start]);
        if ALLOWED_ENV_VARS.contains(&var_name) {
            result.push_str(&std::env::var(var_name).unwrap_or_default());
        } else {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // left as written so it's obvious
            result.push_str(&rest[start..start + end + 1]);
        }
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}
