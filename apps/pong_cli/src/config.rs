use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use client_core::channel::websocket_url;
use shared::domain::TournamentId;
use tracing::warn;
use url::Url;

pub const CONFIG_FILE: &str = "pong_cli.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    /// Path template on the API host; `{tournament_id}` is substituted.
    pub socket_path: String,
    pub token_store: PathBuf,
    pub download_dir: PathBuf,
    pub export_filename: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "https://transcendence-pong:7443".into(),
            socket_path: "/ws/tournament/{tournament_id}/".into(),
            token_store: "./data/storage.json".into(),
            download_dir: ".".into(),
            export_filename: "user_data.json".into(),
        }
    }
}

impl Settings {
    pub fn api_base_url(&self) -> anyhow::Result<Url> {
        Url::parse(&self.api_base_url)
            .with_context(|| format!("invalid api base url {:?}", self.api_base_url))
    }

    pub fn socket_url(&self, tournament_id: TournamentId) -> anyhow::Result<Url> {
        let path = self
            .socket_path
            .replace("{tournament_id}", &tournament_id.to_string());
        Ok(websocket_url(&self.api_base_url()?, &path)?)
    }
}

pub fn load_settings(path: Option<&Path>) -> Settings {
    load_settings_from(
        path.unwrap_or_else(|| Path::new(CONFIG_FILE)),
        |key| std::env::var(key).ok(),
    )
}

/// Defaults, then the TOML file (if readable), then `APP__*` variables.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => apply(&mut settings, |key| file_cfg.get(key).cloned()),
            Err(err) => warn!(path = %path.display(), error = %err, "ignoring invalid config file"),
        }
    }

    apply(&mut settings, |key| env(&format!("APP__{}", key.to_uppercase())));
    settings
}

fn apply(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("api_base_url") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("socket_path") {
        settings.socket_path = v;
    }
    if let Some(v) = lookup("token_store") {
        settings.token_store = v.into();
    }
    if let Some(v) = lookup("download_dir") {
        settings.download_dir = v.into();
    }
    if let Some(v) = lookup("export_filename") {
        settings.export_filename = v;
    }
}
