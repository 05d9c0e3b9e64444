//! TOML-based configuration for lingomerge.
//!
//! Every section is optional; a missing file means all defaults. The API
//! credential is never stored in the file: `llm.api_key_env` names the
//! variable, and [`AppConfig::resolve_credentials`] looks it up in a dotenv
//! file or the process environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conflict::IncomingSide;
use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM API settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Which files are scanned.
    #[serde(default)]
    pub scan: ScanConfig,

    /// How conflict sides are interpreted.
    #[serde(default)]
    pub conflicts: ConflictsConfig,

    /// Concurrency and throttling.
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

/// Chat-completions API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API base URL; `/chat/completions` is appended.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature (0.0 - 2.0).
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on tokens generated per request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Name of the variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Resolved key (populated by `resolve_credentials`).
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
            api_key: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

/// File selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// File extensions (without the dot) that are scanned.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Glob patterns, relative to the codebase root, to skip.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Skip files larger than this (in bytes). 0 = no limit.
    #[serde(default)]
    pub max_file_size: u64,
}

fn default_extensions() -> Vec<String> {
    [
        "md", "mdx", "markdown", "txt", "json", "yml", "yaml", "js", "jsx", "ts", "tsx", "html",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            ignore_patterns: Vec::new(),
            max_file_size: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Conflicts / processing / logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConflictsConfig {
    /// `theirs` after `git merge`, `ours` after `git rebase`.
    #[serde(default)]
    pub incoming_side: IncomingSide,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Conflicts of one file processed at the same time (1 = sequential).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Minimum delay between two API calls, in milliseconds.
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
}

fn default_workers() -> usize {
    1
}
fn default_rate_limit_ms() -> u64 {
    200
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            rate_limit_ms: default_rate_limit_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to this file.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    ///
    /// Used for the implicit default location; an explicitly requested file
    /// should go through [`AppConfig::load_from_file`] so absence is an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Look up the API key named by `llm.api_key_env`.
    ///
    /// An explicitly given dotenv file is consulted first, then the process
    /// environment. A key that cannot be found is fatal.
    pub fn resolve_credentials(&mut self, env_file: Option<&Path>) -> Result<(), ConfigError> {
        let var = self.llm.api_key_env.clone();

        if let Some(path) = env_file {
            if let Some(value) = read_env_file_var(path, &var)? {
                debug!(var = %var, path = %path.display(), "credential resolved from env file");
                self.llm.api_key = Some(value);
                return Ok(());
            }
            warn!(var = %var, path = %path.display(), "credential not in env file, trying environment");
        }

        match std::env::var(&var) {
            Ok(value) if !value.trim().is_empty() => {
                debug!(var = %var, "credential resolved from environment");
                self.llm.api_key = Some(value.trim().to_string());
                Ok(())
            }
            _ => Err(ConfigError::CredentialMissing {
                var,
                source_desc: match env_file {
                    Some(path) => format!("{} and the process environment", path.display()),
                    None => "the process environment".into(),
                },
            }),
        }
    }

    /// Validate that all values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.api_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "llm.api_url".into(),
                detail: "API URL must not be empty".into(),
            });
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "llm.model".into(),
                detail: "model must not be empty".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".into(),
                detail: format!("{} is outside 0.0..=2.0", self.llm.temperature),
            });
        }
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.max_tokens".into(),
                detail: "max_tokens must be > 0".into(),
            });
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }
        if self.scan.extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "scan.extensions".into(),
                detail: "at least one extension is required".into(),
            });
        }
        if self.processing.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "processing.workers".into(),
                detail: "workers must be > 0".into(),
            });
        }
        Ok(())
    }

    /// Generate a default TOML config template string.
    pub fn default_template() -> &'static str {
        r#"# lingomerge configuration
# Every section is optional; the values below are the defaults.

[llm]
api_url = "https://api.openai.com/v1"
model = "gpt-4o-mini"
temperature = 0.2
max_tokens = 4096
timeout_secs = 120
api_key_env = "OPENAI_API_KEY"

[scan]
extensions = ["md", "mdx", "markdown", "txt", "json", "yml", "yaml", "js", "jsx", "ts", "tsx", "html"]
# ignore_patterns = ["blog/**", "**/*.generated.md"]
max_file_size = 0           # 0 = no limit

[conflicts]
incoming_side = "theirs"    # "ours" after a rebase

[processing]
workers = 1
rate_limit_ms = 200

[logging]
# file = "lingomerge.log"
"#
    }
}

/// Read one variable from a dotenv-format file without touching the
/// process environment.
fn read_env_file_var(path: &Path, var: &str) -> Result<Option<String>, ConfigError> {
    let iter = dotenv::from_path_iter(path).map_err(|e| ConfigError::CredentialFile {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;

    for item in iter {
        let (key, value) = item.map_err(|e| ConfigError::CredentialFile {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        if key == var && !value.trim().is_empty() {
            return Ok(Some(value.trim().to_string()));
        }
    }
    Ok(None)
}
