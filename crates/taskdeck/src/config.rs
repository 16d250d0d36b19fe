//! Client configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `TASKDECK__SECTION__KEY` environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "taskdeck";

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.server.url)
            .with_context(|| format!("invalid server url '{}'", self.server.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("server url must be http or https, got '{}'", url.scheme());
        }
        if self.stream.initial_delay_ms == 0 {
            bail!("stream.initial_delay_ms must be greater than zero");
        }
        if self.stream.max_delay_ms < self.stream.initial_delay_ms {
            bail!(
                "stream.max_delay_ms ({}) is below stream.initial_delay_ms ({})",
                self.stream.max_delay_ms,
                self.stream.initial_delay_ms
            );
        }
        Ok(())
    }
}

/// Orchestrator API location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
        }
    }
}

/// Credentials sent with every request.
///
/// A bearer token takes precedence over the development user header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_user: Option<String>,
}

/// Reconnect backoff for the live stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub initial_delay_ms: u64,
    pub max_exponent: u32,
    pub max_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_exponent: 4,
            max_delay_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Resolve the config file path. A directory override means `<dir>/config.toml`.
pub fn config_file_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    let config_file = match override_path {
        Some(path) => {
            let expanded = expand_path(path)?;
            if expanded.is_dir() {
                expanded.join("config.toml")
            } else {
                expanded
            }
        }
        None => default_config_dir()?.join("config.toml"),
    };

    if config_file.parent().is_none() {
        return Err(anyhow!("invalid config file path: {config_file:?}"));
    }
    Ok(config_file)
}

/// Load configuration. A missing file is not an error.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let env_prefix = env_prefix();
    let built = Config::builder()
        .set_default("server.url", DEFAULT_SERVER_URL)?
        .set_default("logging.level", "info")?
        .add_source(
            File::from(path)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(Environment::with_prefix(env_prefix.as_str()).separator("__"))
        .build()
        .with_context(|| format!("loading config from {}", path.display()))?;

    let config: AppConfig = built
        .try_deserialize()
        .context("parsing configuration")?;
    config.validate()?;
    Ok(config)
}

/// Write the default configuration to `path`, creating parent directories.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = String::new();
    body.push_str("# Configuration for ");
    body.push_str(APP_NAME);
    body.push('\n');
    body.push_str("# File: ");
    body.push_str(&path.display().to_string());
    body.push_str("\n\n");
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

/// Expand `~` and `$VARS`. Paths that are not UTF-8 are used as given.
fn expand_path(path: PathBuf) -> Result<PathBuf> {
    let Some(text) = path.to_str() else {
        return Ok(path);
    };
    let expanded =
        shellexpand::full(text).with_context(|| format!("expanding config path {text}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// `$XDG_CONFIG_HOME/taskdeck`, else the platform config dir, else `~/.config/taskdeck`.
fn default_config_dir() -> Result<PathBuf> {
    env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .map(|dir| dir.join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

fn env_prefix() -> String {
    APP_NAME
        .replace(|c: char| !c.is_ascii_alphanumeric(), "_")
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.url, DEFAULT_SERVER_URL);
        assert_eq!(config.stream, StreamConfig::default());
        assert!(config.auth.token.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[server]
url = "https://orchestrator.example.com"

[auth]
token = "secret"

[stream]
max_delay_ms = 30000
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.server.url, "https://orchestrator.example.com");
        assert_eq!(config.auth.token.as_deref(), Some("secret"));
        assert_eq!(config.stream.max_delay_ms, 30_000);
        assert_eq!(config.stream.initial_delay_ms, 1_000);
        assert_eq!(config.stream.max_exponent, 4);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[stream]\ninitial_delay_ms = 0\n").unwrap();
        assert!(load_config(&path).is_err());

        fs::write(&path, "[server]\nurl = \"not a url\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_default_config_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        write_default_config(&path).unwrap();

        let body = fs::read_to_string(&path).unwrap();
        assert!(body.starts_with("# Configuration for taskdeck"));
        assert_eq!(load_config(&path).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_directory_override_points_at_config_toml() {
        let dir = tempdir().unwrap();
        let path = config_file_path(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(path, dir.path().join("config.toml"));
    }

    #[test]
    fn test_expand_path_resolves_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let expanded = expand_path(PathBuf::from("~/taskdeck/config.toml")).unwrap();
        assert_eq!(expanded, home.join("taskdeck").join("config.toml"));
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(env_prefix(), "TASKDECK");
    }
}
