//! Configuration management for roomdeck
//!
//! Supports:
//! - TOML config file at XDG locations
//! - Environment variable overrides
//! - Command-line argument overrides
//! - Credentials saved by `roomdeck setup` as the last fallback

use std::env;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use env_logger::fmt::WriteStyle;
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::connection::HubSettings;
use crate::local_state::{CredentialStore, Credentials, StateFile};

const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Runtime context containing resolved configuration
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub global: GlobalOpts,
    pub config: AppConfig,
    config_path: PathBuf,
    state: StateFile,
}

impl RuntimeContext {
    pub fn new(global: &GlobalOpts) -> Result<Self> {
        let config_path = resolve_config_path(global.config.as_ref())?;
        let config = load_config(&config_path, global)?;
        let state = match &config.dashboard.state_file {
            Some(path) => StateFile::new(expand_path(Path::new(path))?),
            None => StateFile::open_default()?,
        };

        Ok(Self {
            global: global.clone(),
            config,
            config_path,
            state,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn state_file(&self) -> &StateFile {
        &self.state
    }

    pub fn init_logging(&self) -> Result<()> {
        if self.global.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let mut builder = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(&self.config.logging.level),
        );

        builder.filter_level(self.effective_log_level());

        let force_color = env::var_os("FORCE_COLOR").is_some();
        let disable_color = self.global.no_color
            || env::var_os("NO_COLOR").is_some()
            || (!force_color && !std::io::stderr().is_terminal());

        if disable_color {
            builder.write_style(WriteStyle::Never);
        } else if force_color {
            builder.write_style(WriteStyle::Always);
        } else {
            builder.write_style(WriteStyle::Auto);
        }

        builder.try_init().or_else(|err| {
            if self.global.verbose > 0 {
                eprintln!("logger already initialized: {err}");
            }
            Ok(())
        })
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.global.trace {
            LevelFilter::Trace
        } else if self.global.debug {
            LevelFilter::Debug
        } else {
            match self.global.verbose {
                0 => self
                    .config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::Warn),
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    /// Server and token from flags, config, or the saved state file
    pub fn credentials(&self) -> Result<Credentials> {
        let stored = self.state.stored_credentials();

        let url = self
            .global
            .server
            .clone()
            .or_else(|| self.config.homeassistant.server.clone())
            .or_else(|| stored.as_ref().map(|c| c.url.clone()))
            .ok_or_else(|| {
                anyhow!(
                    "No Home Assistant server configured.\n\
                    Run 'roomdeck setup', or set --server, HASS_SERVER, or the config file."
                )
            })?;

        let token = self
            .global
            .token
            .clone()
            .or_else(|| self.config.homeassistant.token.clone())
            .or_else(|| stored.map(|c| c.token))
            .ok_or_else(|| {
                anyhow!(
                    "No authentication token configured.\n\
                    Run 'roomdeck setup', or set --token, HASS_TOKEN, or the config file."
                )
            })?;

        Ok(Credentials { url, token })
    }

    /// Connection settings for the hub client
    pub fn hub_settings(&self) -> Result<HubSettings> {
        let credentials = self.credentials()?;
        let ws = &self.config.websocket;
        let settings = HubSettings::new(credentials.url, credentials.token).with_reconnect(
            Duration::from_secs(ws.reconnect_delay),
            ws.max_reconnect_attempts,
        );
        if ws.reconnect {
            Ok(settings)
        } else {
            Ok(settings.without_reconnect())
        }
    }

    /// Get the effective timeout in seconds
    pub fn timeout(&self) -> u64 {
        self.global
            .timeout
            .unwrap_or(self.config.homeassistant.timeout)
    }

    /// How long to wait for the initial sync
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(
            self.global
                .timeout
                .unwrap_or(self.config.websocket.sync_timeout),
        )
    }

    /// Check if SSL verification should be skipped
    pub fn insecure(&self) -> bool {
        self.global.insecure || self.config.homeassistant.insecure
    }

    pub fn optimistic_window(&self) -> Duration {
        Duration::from_millis(self.config.dashboard.optimistic_window_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.config.dashboard.debounce_ms)
    }

    /// Get the effective output format
    pub fn output_format(&self) -> OutputFormat {
        if self.global.json {
            return OutputFormat::Json;
        }
        self.global
            .output_format
            .unwrap_or(match self.config.output.format.as_str() {
                "json" => OutputFormat::Json,
                "yaml" => OutputFormat::Yaml,
                "table" => OutputFormat::Table,
                _ => OutputFormat::Auto,
            })
    }

    /// Check if output should be in table format
    pub fn is_table_output(&self) -> bool {
        match self.output_format() {
            OutputFormat::Table => true,
            OutputFormat::Auto => std::io::stdout().is_terminal(),
            _ => false,
        }
    }
}

/// Application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub homeassistant: HomeAssistantConfig,
    pub websocket: WebSocketConfig,
    pub dashboard: DashboardConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeAssistantConfig {
    pub server: Option<String>,
    pub token: Option<String>,
    pub timeout: u64,
    pub insecure: bool,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            server: None,
            token: None,
            timeout: 30,
            insecure: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub reconnect: bool,
    /// Seconds between reconnect attempts
    pub reconnect_delay: u64,
    /// 0 retries forever
    pub max_reconnect_attempts: u32,
    /// Seconds to wait for the initial sync
    pub sync_timeout: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            reconnect: true,
            reconnect_delay: 5,
            max_reconnect_attempts: 0,
            sync_timeout: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub optimistic_window_ms: u64,
    pub debounce_ms: u64,
    /// Override for the local state file
    pub state_file: Option<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            optimistic_window_ms: 5000,
            debounce_ms: 300,
            state_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: String,
    pub no_headers: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "auto".to_string(),
            no_headers: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

fn resolve_config_path(override_path: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        let expanded = expand_path(path)?;
        if expanded.is_dir() {
            return Ok(expanded.join("config.toml"));
        }
        return Ok(expanded);
    }

    Ok(default_config_dir()?.join("config.toml"))
}

fn load_config(config_path: &Path, global: &GlobalOpts) -> Result<AppConfig> {
    if !config_path.exists() {
        write_default_config(config_path)?;
    }

    let config = Config::builder()
        .set_default("homeassistant.timeout", 30_i64)?
        .set_default("homeassistant.insecure", false)?
        .set_default("websocket.reconnect", true)?
        .set_default("websocket.reconnect_delay", 5_i64)?
        .set_default("websocket.max_reconnect_attempts", 0_i64)?
        .set_default("websocket.sync_timeout", 15_i64)?
        .set_default("dashboard.optimistic_window_ms", 5000_i64)?
        .set_default("dashboard.debounce_ms", 300_i64)?
        .set_default("output.format", "auto")?
        .set_default("output.no_headers", false)?
        .set_default("logging.level", "warn")?
        .add_source(
            File::from(config_path)
                .format(FileFormat::Toml)
                .required(false),
        )
        // HASS_SERVER / HASS_TOKEN land in the homeassistant section
        .add_source(
            Environment::with_prefix("HASS")
                .try_parsing(true)
                .prefix_separator("_")
                .separator("__")
                .source(Some(hass_env())),
        )
        .add_source(
            Environment::with_prefix("ROOMDECK")
                .try_parsing(true)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let mut app_config: AppConfig = config.try_deserialize()?;

    if global.no_headers {
        app_config.output.no_headers = true;
    }

    Ok(app_config)
}

/// `HASS_SERVER` and `HASS_TOKEN` mapped to `homeassistant.*` keys
fn hass_env() -> config::Map<String, String> {
    ["SERVER", "TOKEN"]
        .into_iter()
        .filter_map(|key| {
            let value = env::var(format!("HASS_{key}")).ok()?;
            Some((format!("HASS_HOMEASSISTANT__{key}"), value))
        })
        .collect()
}

pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config")?;

    let content = format!(
        "# roomdeck configuration\n\
        # File: {}\n\
        #\n\
        # Environment variables:\n\
        #   HASS_SERVER   - Home Assistant server URL\n\
        #   HASS_TOKEN    - Long-lived access token\n\
        #   ROOMDECK__*   - Override any config value (e.g., ROOMDECK__LOGGING__LEVEL=debug)\n\
        \n\
        {toml}",
        path.display()
    );

    fs::write(path, content).with_context(|| format!("writing config to {}", path.display()))
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        let expanded = shellexpand::full(text).context("expanding path")?;
        Ok(PathBuf::from(expanded.to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn global(config: PathBuf) -> GlobalOpts {
        GlobalOpts {
            output_format: None,
            json: false,
            server: None,
            token: None,
            timeout: None,
            insecure: false,
            config: Some(config),
            quiet: false,
            verbose: 0,
            debug: false,
            trace: false,
            no_color: false,
            no_headers: false,
        }
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.homeassistant.timeout, 30);
        assert!(config.websocket.reconnect);
        assert_eq!(config.websocket.reconnect_delay, 5);
        assert_eq!(config.dashboard.debounce_ms, 300);
        assert_eq!(config.dashboard.optimistic_window_ms, 5000);
        assert_eq!(config.output.format, "auto");
    }

    #[test]
    fn test_config_serialization() {
        let toml = toml::to_string_pretty(&AppConfig::default()).unwrap();
        assert!(toml.contains("[homeassistant]"));
        assert!(toml.contains("[websocket]"));
        assert!(toml.contains("[dashboard]"));
        assert!(toml.contains("[logging]"));
    }

    #[test]
    fn test_default_file_written_and_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roomdeck").join("config.toml");
        let config = load_config(&path, &global(path.clone())).unwrap();

        assert!(path.exists());
        assert_eq!(config.websocket.sync_timeout, 15);
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# roomdeck configuration"));
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[dashboard]\ndebounce_ms = 120\n\n[websocket]\nmax_reconnect_attempts = 3\n",
        )
        .unwrap();

        let config = load_config(&path, &global(path.clone())).unwrap();
        assert_eq!(config.dashboard.debounce_ms, 120);
        assert_eq!(config.websocket.max_reconnect_attempts, 3);
    }

    #[test]
    fn test_credentials_fall_back_to_state_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let state_path = dir.path().join("state.json");
        fs::write(
            &path,
            format!("[dashboard]\nstate_file = {:?}\n", state_path.display().to_string()),
        )
        .unwrap();

        let mut opts = global(path);
        let ctx = RuntimeContext::new(&opts).unwrap();
        let hass = &ctx.config.homeassistant;
        if hass.server.is_some() || hass.token.is_some() {
            // HASS_* is set in this environment
            return;
        }
        assert!(ctx.credentials().is_err());

        ctx.state_file()
            .save_credentials("http://hass.local:8123", "stored")
            .unwrap();
        let credentials = RuntimeContext::new(&opts).unwrap().credentials().unwrap();
        assert_eq!(credentials.url, "http://hass.local:8123");
        assert_eq!(credentials.token, "stored");

        opts.server = Some("http://other:8123".to_string());
        opts.token = Some("flag".to_string());
        let credentials = RuntimeContext::new(&opts).unwrap().credentials().unwrap();
        assert_eq!(credentials.url, "http://other:8123");
        assert_eq!(credentials.token, "flag");
    }
}
