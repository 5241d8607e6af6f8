use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::AnnotError;

/// Environment variable carrying the DashScope API credential.
pub const API_KEY_ENV: &str = "DASHSCOPE_API_KEY";

/// Optional override for the API base URL.
pub const BASE_URL_ENV: &str = "DASHSCOPE_BASE_URL";

const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/api/v1";

pub const DEFAULT_MODEL: &str = "qwen-vl-max-latest";

/// Frame extraction rate requested from the service (0.1 - 10.0).
pub const DEFAULT_FPS: f64 = 1.0;

pub const DEFAULT_TEMPERATURE: f64 = 0.3;
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_TOP_P: f64 = 0.9;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Optional command-line overrides applied on top of the defaults.
#[derive(Debug, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub fps: Option<f64>,
    pub temperature: Option<f64>,
    pub timeout_secs: Option<u64>,
}

/// Immutable run configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: SecretString,
    pub base_url: Url,
    pub model: String,
    pub fps: f64,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub timeout: Duration,
}

impl Config {
    /// Build the configuration from the environment plus CLI overrides.
    ///
    /// The API key must be supplied via `DASHSCOPE_API_KEY`; there is no
    /// built-in fallback credential.
    pub fn from_env(overrides: Overrides) -> Result<Self, AnnotError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AnnotError::Config(format!("{API_KEY_ENV} is not set")))?;

        let base_url = match std::env::var(BASE_URL_ENV) {
            Ok(raw) => Url::parse(&raw)
                .map_err(|e| AnnotError::Config(format!("invalid {BASE_URL_ENV}: {e}")))?,
            Err(_) => Url::parse(DEFAULT_BASE_URL).expect("valid default URL"),
        };

        Ok(Self {
            api_key: SecretString::from(api_key),
            base_url,
            model: overrides.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            fps: overrides.fps.unwrap_or(DEFAULT_FPS),
            temperature: overrides.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: DEFAULT_TOP_P,
            timeout: Duration::from_secs(overrides.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }
}

/// The three sibling working directories used by a run.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub videos: PathBuf,
    pub outputs: PathBuf,
    pub prompts: PathBuf,
}

impl Workspace {
    pub fn at(base: &Path) -> Self {
        Self {
            videos: base.join("videos"),
            outputs: base.join("outputs"),
            prompts: base.join("prompts"),
        }
    }

    /// Create the directories if they do not already exist.
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [&self.videos, &self.outputs, &self.prompts] {
            std::fs::create_dir_all(dir)?;
            tracing::debug!(dir = %dir.display(), "checked working directory");
        }
        Ok(())
    }
}
