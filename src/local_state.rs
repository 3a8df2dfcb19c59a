//! Persisted local state
//!
//! A small JSON file in the user data directory
//! (`$XDG_DATA_HOME/roomdeck/state.json`) holding the hub credentials saved
//! by `roomdeck setup` and the dashboard preferences.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::rooms::{DomainFilter, DEFAULT_DOMAINS};

const APP_NAME: &str = env!("CARGO_PKG_NAME");
const STATE_FILE: &str = "state.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalState {
    pub url: Option<String>,
    pub token: Option<String>,
    pub setup_complete: bool,
    pub enabled_domains: Vec<String>,
    pub show_hidden: bool,
}

impl Default for LocalState {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            setup_complete: false,
            enabled_domains: DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect(),
            show_hidden: false,
        }
    }
}

impl LocalState {
    pub fn domain_filter(&self) -> DomainFilter {
        DomainFilter::new(&self.enabled_domains)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub url: String,
    pub token: String,
}

/// Where hub credentials are kept between runs
pub trait CredentialStore {
    fn stored_credentials(&self) -> Option<Credentials>;

    fn save_credentials(&self, url: &str, token: &str) -> Result<()>;
}

/// JSON state file on disk
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// State file in the default data directory
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(default_data_dir()?.join(STATE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state; a missing file yields the defaults
    pub fn load(&self) -> Result<LocalState> {
        if !self.path.exists() {
            return Ok(LocalState::default());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", self.path.display()))
    }

    pub fn save(&self, state: &LocalState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(state).context("serializing local state")?;
        fs::write(&self.path, content)
            .with_context(|| format!("writing {}", self.path.display()))?;
        log::debug!("Saved local state to {}", self.path.display());
        Ok(())
    }

    /// Load, modify and save in one go
    pub fn update(&self, f: impl FnOnce(&mut LocalState)) -> Result<LocalState> {
        let mut state = self.load()?;
        f(&mut state);
        self.save(&state)?;
        Ok(state)
    }
}

impl CredentialStore for StateFile {
    fn stored_credentials(&self) -> Option<Credentials> {
        let state = match self.load() {
            Ok(state) => state,
            Err(err) => {
                log::warn!("Ignoring unreadable state file: {err:#}");
                return None;
            }
        };
        match (state.url, state.token) {
            (Some(url), Some(token)) if !url.is_empty() && !token.is_empty() => {
                Some(Credentials { url, token })
            }
            _ => None,
        }
    }

    fn save_credentials(&self, url: &str, token: &str) -> Result<()> {
        self.update(|state| {
            state.url = Some(url.to_string());
            state.token = Some(token.to_string());
            state.setup_complete = true;
        })
        .map(|_| ())
    }
}

fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::data_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".local").join("share").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine data directory"))
}
