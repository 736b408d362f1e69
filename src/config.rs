//! Client settings.
//!
//! Settings come from a YAML file (`--config`, else `crm-sync.yaml` in the
//! working directory when present), then environment overrides. The API base
//! URL is picked by [`Settings::resolve_api_url`].

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "crm-sync.yaml";
pub const DEFAULT_LOCAL_API_URL: &str = "http://localhost:8000/api";

pub const ENV_API_URL: &str = "CRM_API_URL";
pub const ENV_API_TOKEN: &str = "CRM_API_TOKEN";
pub const ENV_HOST: &str = "CRM_HOST";

const LOCAL_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    pub local_api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed_api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// How long a status message stays up before it is dismissed.
    pub status_dismiss_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: None,
            local_api_url: DEFAULT_LOCAL_API_URL.to_string(),
            deployed_api_url: None,
            host: None,
            token: None,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
            status_dismiss_ms: 6_000,
        }
    }
}

impl Settings {
    /// Loads settings and applies process environment overrides. A missing
    /// file yields defaults; `login` creates it.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut settings = match config_path(explicit) {
            Some(path) if path.is_file() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        settings.apply_env(|key| env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Reading settings from {path:?}"))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings =
            serde_yaml::from_str(&raw).with_context(|| format!("Parsing settings in {path:?}"))?;
        debug!("Loaded settings from {path:?}");
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Serializing settings")?;
        fs::write(path, yaml).with_context(|| format!("Writing settings to {path:?}"))
    }

    /// Overrides fields from `lookup` (normally the process environment).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = Some(url);
        }
        if let Some(token) = lookup(ENV_API_TOKEN) {
            self.token = Some(token);
        }
        if let Some(host) = lookup(ENV_HOST) {
            self.host = Some(host);
        }
    }

    /// Base URL for API calls.
    ///
    /// An explicit override wins, then the configured `api_url`. Otherwise
    /// the host decides: a loopback or unset host talks to the local server,
    /// any other host to the deployed one.
    pub fn resolve_api_url(&self, override_url: Option<&str>) -> String {
        let explicit = override_url
            .or(self.api_url.as_deref())
            .map(str::trim)
            .filter(|url| !url.is_empty());
        if let Some(url) = explicit {
            return url.trim_end_matches('/').to_string();
        }
        match self.host.as_deref().map(normalize_host) {
            Some(host) if !host.is_empty() && !LOCAL_HOSTS.contains(&host.as_str()) => self
                .deployed_api_url
                .as_deref()
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| format!("https://{host}/api")),
            _ => self.local_api_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Host name without scheme, port, or IPv6 brackets.
fn normalize_host(raw: &str) -> String {
    let host = raw.trim();
    let host = host
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(host);
    let host = host.split('/').next().unwrap_or_default();
    if let Some(inner) = host.strip_prefix('[') {
        return inner.split(']').next().unwrap_or_default().to_ascii_lowercase();
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            name.to_ascii_lowercase()
        }
        _ => host.to_ascii_lowercase(),
    }
}

/// The settings file to read, if any.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.is_file().then_some(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_and_unset_hosts_use_local_url() {
        let mut settings = Settings::default();
        assert_eq!(settings.resolve_api_url(None), DEFAULT_LOCAL_API_URL);
        for host in ["localhost", "127.0.0.1:5173", "[::1]:8080", "http://LOCALHOST:3000/"] {
            settings.host = Some(host.to_string());
            assert_eq!(settings.resolve_api_url(None), DEFAULT_LOCAL_API_URL, "{host}");
        }
    }

    #[test]
    fn remote_host_uses_deployed_url() {
        let mut settings = Settings {
            host: Some("crm.example.com".into()),
            ..Settings::default()
        };
        assert_eq!(settings.resolve_api_url(None), "https://crm.example.com/api");
        settings.deployed_api_url = Some("https://api.example.com/api/".into());
        assert_eq!(settings.resolve_api_url(None), "https://api.example.com/api");
    }

    #[test]
    fn explicit_override_beats_configuration() {
        let settings = Settings {
            api_url: Some("http://configured/api".into()),
            host: Some("crm.example.com".into()),
            ..Settings::default()
        };
        assert_eq!(settings.resolve_api_url(None), "http://configured/api");
        assert_eq!(settings.resolve_api_url(Some("http://flag/api/")), "http://flag/api");
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut settings = Settings {
            token: Some("from-file".into()),
            ..Settings::default()
        };
        settings.apply_env(|key| match key {
            ENV_API_TOKEN => Some("from-env".into()),
            ENV_HOST => Some("  ".into()),
            _ => None,
        });
        assert_eq!(settings.token.as_deref(), Some("from-env"));
        assert_eq!(settings.host, None);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crm-sync.yaml");
        fs::write(&path, "deployed_api_url: https://api.example.com/api\nrequest_timeout_ms: 1000\n").unwrap();
        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.request_timeout_ms, 1000);
        assert_eq!(settings.connect_timeout_ms, 5_000);
        assert_eq!(settings.local_api_url, DEFAULT_LOCAL_API_URL);

        settings.save(&path).unwrap();
        assert_eq!(Settings::from_file(&path).unwrap(), settings);
    }
}
