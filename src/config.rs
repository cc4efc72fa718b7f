use crate::error::{HowtoError, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a CLI tool that converts user requests to shell commands or short scripts. E.g., for `bash command to tar file without compression:`, you should reply `tar -cf file.tar file`. Avoid natural language. If you have to use it, be extremely concise. Less than 5 words.";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_SHELL: &str = "bash";
pub const DEFAULT_MAX_TOKENS: u32 = 512;
pub const CONFIG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long after the last answer a new request still continues the conversation.
pub const DEFAULT_CONVERSATION_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_system_message")]
    pub system_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_window_secs: Option<u64>,
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_shell() -> String {
    DEFAULT_SHELL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_system_message() -> String {
    DEFAULT_SYSTEM_MESSAGE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            model: default_model(),
            shell: default_shell(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system_message: default_system_message(),
            openai_api_key: None,
            conversation_window_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::get_config_path()?)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from `path` without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HowtoError::Config(format!(
                "config file not found at {} (run `howto --setup`)",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)
            .map_err(|e| HowtoError::config("Failed to read config file", e))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| HowtoError::config(&format!("Failed to parse {}", path.display()), e))?;
        info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("HOWTO_MODEL") {
            debug!("Model overridden by HOWTO_MODEL");
            self.model = model;
        }
        if let Ok(shell) = std::env::var("HOWTO_SHELL") {
            debug!("Shell overridden by HOWTO_SHELL");
            self.shell = shell;
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| HowtoError::config("Failed to create config directory", e))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| HowtoError::config("Failed to serialize config", e))?;
        fs::write(path, content).map_err(|e| HowtoError::config("Failed to write config file", e))?;

        // The file may hold the API key.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .map_err(|e| HowtoError::config("Failed to restrict config permissions", e))?;
        }

        info!("Saved config to: {}", path.display());
        Ok(())
    }

    pub fn get_config_dir() -> Result<PathBuf> {
        let home = home_dir()
            .ok_or_else(|| HowtoError::Config("Could not find home directory".to_string()))?;
        Ok(home.join(".howto"))
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join("config.json"))
    }

    pub fn get_state_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join("state.json"))
    }

    pub fn conversation_window(&self) -> Duration {
        self.conversation_window_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CONVERSATION_WINDOW)
    }

    /// JSON rendering with the API key masked.
    pub fn display_masked(&self) -> String {
        let mut shown = self.clone();
        if let Some(key) = &shown.openai_api_key {
            shown.openai_api_key = Some(mask_key(key));
        }
        serde_json::to_string_pretty(&shown).unwrap_or_else(|_| format!("{:?}", shown))
    }

    pub fn show_config_info() -> Result<()> {
        let config_path = Self::get_config_path()?;
        println!("OS: {}", std::env::consts::OS);
        println!("Configuration file: {}", config_path.display());

        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => {
                    println!("Status: Found");
                    println!("Config:\n{}", config.display_masked());
                }
                Err(e) => println!("Status: Unreadable ({})", e),
            }
        } else {
            println!("Status: Not found (run `howto --setup`)");
        }

        let env_key = std::env::var("OPENAI_API_KEY").ok();
        println!(
            "OPENAI_API_KEY: {}",
            match env_key.as_deref() {
                None | Some("") => "Not set",
                Some(k) if k.starts_with("sk-") => "Set",
                Some(_) => "Invalid (does not start with sk-)",
            }
        );

        Ok(())
    }
}

fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(3).collect();
    let suffix: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if key.chars().count() <= 7 {
        "*".repeat(key.chars().count())
    } else {
        format!("{}...{}", prefix, suffix)
    }
}
