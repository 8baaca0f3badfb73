use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// API credential. Supports `${VAR}` environment substitution.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: default_api_key(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> String {
    "mistral".to_string()
}
fn default_model() -> String {
    "mistral-small-latest".to_string()
}
// When the config file omits the key entirely, resolve it from the
// environment directly — the `${VAR}` substitution pass only sees values
// that are present in the file.
fn default_api_key() -> String {
    std::env::var("MISTRAL_API_KEY").unwrap_or_default()
}
fn default_endpoint() -> String {
    "https://api.mistral.ai/v1/chat/completions".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}

/// Default sampling parameters. Recorded and validated here; each mode
/// profile carries its own fixed parameters on top of these.
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
        }
    }
}

fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_top_p() -> f64 {
    0.9
}

#[derive(Debug, Deserialize, Clone)]
pub struct TerminalConfig {
    /// Maximum retained conversation entries. Oldest are evicted first.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Directory for persisted context. Defaults to `~/.ai_terminal`.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            state_dir: None,
        }
    }
}

fn default_max_history() -> usize {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            generation: GenerationConfig::default(),
            terminal: TerminalConfig::default(),
        }
    }
}

impl Config {
    /// Default config file location: `~/.ai_terminal/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".ai_terminal").join("config.toml"))
    }

    /// Resolved state directory for the persisted context file.
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.terminal.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let home = dirs::home_dir().context("Could not determine home directory")?;
                Ok(home.join(".ai_terminal"))
            }
        }
    }
}

/// Load and validate the configuration.
///
/// A missing file is created with documented defaults first, so a fresh
/// install works without manual setup. `${VAR}` string values are replaced
/// with the named environment variable (empty string when unset) before
/// deserialization.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        write_default_config(path)
            .with_context(|| format!("Failed to create default config: {}", path.display()))?;
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut value: toml::Value =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    substitute_env_vars(&mut value);

    let config: Config = value
        .try_into()
        .with_context(|| "Invalid config file structure")?;

    if config.api.provider != "mistral" {
        anyhow::bail!(
            "Unknown API provider: '{}'. Only 'mistral' is supported.",
            config.api.provider
        );
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
    }

    if !(0.0..=1.0).contains(&config.generation.top_p) {
        anyhow::bail!("generation.top_p must be in [0.0, 1.0]");
    }

    if config.generation.max_tokens == 0 {
        anyhow::bail!("generation.max_tokens must be > 0");
    }

    if config.terminal.max_history == 0 {
        anyhow::bail!("terminal.max_history must be >= 1");
    }

    Ok(config)
}

/// Replace whole-string `${VAR}` values with the environment variable's
/// value, recursing through tables and arrays. Unset variables substitute
/// the empty string so a missing credential surfaces as "key not set"
/// rather than a literal `${...}` being sent upstream.
fn substitute_env_vars(value: &mut toml::Value) {
    match value {
        toml::Value::String(s) => {
            if let Some(name) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
                *s = std::env::var(name).unwrap_or_default();
            }
        }
        toml::Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                substitute_env_vars(v);
            }
        }
        toml::Value::Array(arr) => {
            for v in arr.iter_mut() {
                substitute_env_vars(v);
            }
        }
        _ => {}
    }
}

fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let default = r#"# AI Terminal configuration

[api]
provider = "mistral"
model = "mistral-small-latest"
# Resolved from the environment at load time.
api_key = "${MISTRAL_API_KEY}"

[generation]
temperature = 0.7
max_tokens = 1024
top_p = 0.9

[terminal]
max_history = 20
"#;

    std::fs::write(path, default)?;
    Ok(())
}
