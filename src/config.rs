//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the odds API key) are referenced by env-var name in the config
//! and resolved at runtime into a `SecretString`.

use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::GroupSpec;
use crate::reconciler::{MissingPolicy, ReconcilePolicy};
use crate::storage::SheetLayout;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub app: AppSection,
    pub fetch: FetchConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
    /// Period for groups that don't set their own.
    pub default_period_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Name of the env var holding the API key. Unset means no key is sent.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 3000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GroupConfig {
    pub name: String,
    pub source: String,
    #[serde(default = "default_true")]
    pub preserve_order: bool,
    #[serde(default)]
    pub missing: MissingPolicy,
    #[serde(default)]
    pub period_secs: Option<u64>,
    #[serde(default)]
    pub layout: SheetLayout,
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    concat!("oddsheet/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.app.default_period_secs == 0 {
            bail!("app.default_period_secs must be > 0");
        }

        let mut seen = HashSet::new();
        for group in &self.groups {
            if group.name.trim().is_empty() {
                bail!("Group name must not be blank");
            }
            if !seen.insert(group.name.as_str()) {
                bail!("Duplicate group name: {}", group.name);
            }
            if group.period_secs == Some(0) {
                bail!("Group {}: period_secs must be > 0", group.name);
            }
            if group.layout.max_cols == 0 {
                bail!("Group {}: layout.max_cols must be > 0", group.name);
            }
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The odds API key, if one is configured and present in the environment.
    pub fn api_key(&self) -> Result<Option<SecretString>> {
        match &self.fetch.api_key_env {
            Some(env) => Ok(Some(SecretString::new(Self::resolve_env(env)?))),
            None => Ok(None),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    /// Engine-side description of every configured group.
    pub fn group_specs(&self) -> Vec<GroupSpec> {
        self.groups
            .iter()
            .map(|g| g.to_spec(self.app.default_period_secs))
            .collect()
    }
}

impl GroupConfig {
    pub fn to_spec(&self, default_period_secs: u64) -> GroupSpec {
        let period = Duration::from_secs(self.period_secs.unwrap_or(default_period_secs));
        GroupSpec::new(self.name.clone(), self.source.clone(), period)
            .with_policy(ReconcilePolicy {
                preserve_order: self.preserve_order,
                missing: self.missing,
            })
            .with_layout(self.layout)
    }
}
