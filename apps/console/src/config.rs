use std::{
    collections::HashMap,
    fs,
    num::NonZeroU32,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use client_core::{ApiClientConfig, DEFAULT_PAGE_SIZE};

pub const DEFAULT_CONFIG_FILE: &str = "console.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub page_size: NonZeroU32,
    pub request_timeout_secs: u64,
    pub search_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/v1".into(),
            token: None,
            token_file: None,
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout_secs: 30,
            search_path: None,
        }
    }
}

impl Settings {
    pub fn api_client_config(&self) -> ApiClientConfig {
        let mut config = ApiClientConfig::new(self.api_url.clone());
        config.timeout = Duration::from_secs(self.request_timeout_secs.max(1));
        if let Some(path) = &self.search_path {
            config.endpoints.search = path.clone();
        }
        config
    }
}

/// Defaults, then the config file, then the process environment.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(err) if config_path.is_some() => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()));
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg = toml::from_str::<HashMap<String, toml::Value>>(raw)?;
    let text = |key: &str| -> Option<String> {
        file_cfg.get(key).map(|v| match v {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    };

    if let Some(v) = text("api_url") {
        settings.api_url = v;
    }
    if let Some(v) = text("token") {
        settings.token = Some(v);
    }
    if let Some(v) = text("token_file") {
        settings.token_file = Some(PathBuf::from(v));
    }
    if let Some(v) = text("page_size") {
        settings.page_size = parse_page_size(&v).context("invalid page_size")?;
    }
    if let Some(v) = text("request_timeout_secs") {
        settings.request_timeout_secs = v.parse().context("invalid request_timeout_secs")?;
    }
    if let Some(v) = text("search_path") {
        settings.search_path = Some(v);
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("OPERATE_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = lookup("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = lookup("OPERATE_TOKEN") {
        settings.token = Some(v);
    }
    if let Some(v) = lookup("APP__TOKEN") {
        settings.token = Some(v);
    }

    if let Some(v) = lookup("APP__TOKEN_FILE") {
        settings.token_file = Some(PathBuf::from(v));
    }

    if let Some(v) = lookup("APP__PAGE_SIZE") {
        if let Ok(parsed) = parse_page_size(&v) {
            settings.page_size = parsed;
        }
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    if let Some(v) = lookup("APP__SEARCH_PATH") {
        settings.search_path = Some(v);
    }
}

pub fn parse_page_size(raw: &str) -> anyhow::Result<NonZeroU32> {
    let value: u32 = raw.trim().parse()?;
    NonZeroU32::new(value).context("page size must be positive")
}

/// Explicit token first, then the persisted one.
pub fn resolve_token(settings: &Settings) -> anyhow::Result<Option<String>> {
    if let Some(token) = settings.token.as_ref().filter(|t| !t.trim().is_empty()) {
        return Ok(Some(token.clone()));
    }
    match &settings.token_file {
        Some(path) => read_token_file(path),
        None => Ok(None),
    }
}

pub fn read_token_file(path: &Path) -> anyhow::Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read token file '{}'", path.display()))?;
    let token = raw.trim();
    Ok((!token.is_empty()).then(|| token.to_string()))
}

pub fn write_token_file(path: &Path, token: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create parent directory '{}' for token file",
                parent.display()
            )
        })?;
    }
    fs::write(path, token)
        .with_context(|| format!("failed to write token file '{}'", path.display()))
}

pub fn remove_token_file(path: &Path) -> anyhow::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err)
            .with_context(|| format!("failed to remove token file '{}'", path.display())),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
