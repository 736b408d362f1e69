//! Everything a command needs to talk to the backend.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use log::debug;

use crate::{
    authz::Viewer,
    backend::{CrmBackend, http::HttpBackend},
    cli::GlobalArgs,
    config::{self, DEFAULT_CONFIG_FILE, Settings},
    events::{EventBus, StatusBoard},
};

pub struct Session {
    pub settings: Settings,
    pub backend: HttpBackend,
    pub events: EventBus,
    config_path: Option<PathBuf>,
}

impl Session {
    pub fn open(global: &GlobalArgs) -> Result<Self> {
        let config_path = config::config_path(global.config.as_deref());
        let mut settings = Settings::load(global.config.as_deref())?;
        if let Some(host) = &global.host {
            settings.host = Some(host.clone());
        }
        if let Some(token) = &global.token {
            settings.token = Some(token.clone());
        }
        let api_url = settings.resolve_api_url(global.api_url.as_deref());
        debug!("Using API at {api_url}");
        let backend = HttpBackend::from_settings(&settings, api_url)
            .context("Creating the API client")?;
        Ok(Self {
            settings,
            backend,
            events: EventBus::new(),
            config_path,
        })
    }

    /// The signed-in user.
    pub fn viewer(&self) -> Result<Viewer> {
        let account = self
            .backend
            .me()
            .context("Fetching the signed-in account (run `crm-sync login` first)")?;
        Ok(Viewer::from(&account))
    }

    pub fn status_board(&self) -> StatusBoard {
        StatusBoard::new(Duration::from_millis(self.settings.status_dismiss_ms))
    }

    /// Persists `token` (or its absence) to the settings file.
    pub fn store_token(&mut self, token: Option<String>) -> Result<PathBuf> {
        let path = self
            .config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut on_disk = if path.is_file() {
            Settings::from_file(&path)?
        } else {
            Settings::default()
        };
        on_disk.token = token.clone();
        on_disk.save(&path)?;
        self.settings.token = token;
        self.config_path = Some(path.clone());
        Ok(path)
    }
}
