// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use dispatchdesk_app::{
    BlurPolicy, DEFAULT_DEBOUNCE, DEFAULT_PAGE_SIZE, FetchSettings, MAX_DEBOUNCE, MIN_DEBOUNCE,
    SelectionMode,
};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const MAX_PAGE_SIZE: i64 = 500;
const DEFAULT_REMOTE_BASE_URL: &str = "http://localhost:8080/api";
const DEFAULT_USER: &str = "dispatcher";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub grid: Grid,
    #[serde(default)]
    pub remote: Remote,
    #[serde(default)]
    pub user: User,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            storage: Storage::default(),
            grid: Grid::default(),
            remote: Remote::default(),
            user: User::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Grid {
    pub debounce: Option<String>,
    pub page_size: Option<i64>,
    pub blur: Option<String>,
    pub selection: Option<String>,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            debounce: Some("300ms".to_owned()),
            page_size: Some(DEFAULT_PAGE_SIZE as i64),
            blur: Some(BlurPolicy::default().as_str().to_owned()),
            selection: Some(SelectionMode::default().as_str().to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Remote {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub timeout: Option<String>,
}

impl Default for Remote {
    fn default() -> Self {
        Self {
            enabled: Some(false),
            base_url: Some(DEFAULT_REMOTE_BASE_URL.to_owned()),
            timeout: Some("5s".to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    pub name: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("DISPATCHDESK_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!(
                "cannot resolve config directory; set DISPATCHDESK_CONFIG_PATH to the config file"
            )
        })?;

        let app_dir = config_root.join(dispatchdesk_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and keep values under [storage], [grid], [remote], and [user]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1. Regenerate it with --print-example-config",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(db_path) = &self.storage.db_path {
            dispatchdesk_db::validate_db_path(db_path)?;
        }

        let debounce = self.debounce()?;
        if !(MIN_DEBOUNCE..=MAX_DEBOUNCE).contains(&debounce) {
            bail!(
                "grid.debounce in {} must lie between {}ms and {}ms, got {}ms",
                path.display(),
                MIN_DEBOUNCE.as_millis(),
                MAX_DEBOUNCE.as_millis(),
                debounce.as_millis()
            );
        }

        if let Some(page_size) = self.grid.page_size
            && !(1..=MAX_PAGE_SIZE).contains(&page_size)
        {
            bail!(
                "grid.page_size in {} must be between 1 and {MAX_PAGE_SIZE}, got {page_size}",
                path.display()
            );
        }

        self.blur_policy()
            .with_context(|| format!("invalid [grid] in {}", path.display()))?;
        self.selection_mode()
            .with_context(|| format!("invalid [grid] in {}", path.display()))?;

        if let Some(timeout) = &self.remote.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "remote.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => dispatchdesk_db::default_db_path(),
        }
    }

    pub fn debounce(&self) -> Result<Duration> {
        match &self.grid.debounce {
            Some(raw) => parse_duration(raw),
            None => Ok(DEFAULT_DEBOUNCE),
        }
    }

    pub fn page_size(&self) -> usize {
        self.grid
            .page_size
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn fetch_settings(&self) -> Result<FetchSettings> {
        Ok(FetchSettings::new(self.debounce()?, self.page_size()))
    }

    pub fn blur_policy(&self) -> Result<BlurPolicy> {
        match self.grid.blur.as_deref() {
            None => Ok(BlurPolicy::default()),
            Some(raw) => BlurPolicy::parse(raw)
                .ok_or_else(|| anyhow!("grid.blur {raw:?} must be \"cancel\" or \"commit\"")),
        }
    }

    pub fn selection_mode(&self) -> Result<SelectionMode> {
        match self.grid.selection.as_deref() {
            None => Ok(SelectionMode::default()),
            Some(raw) => SelectionMode::parse(raw).ok_or_else(|| {
                anyhow!("grid.selection {raw:?} must be \"none\", \"single\" or \"multi\"")
            }),
        }
    }

    pub fn remote_enabled(&self) -> bool {
        self.remote.enabled.unwrap_or(false)
    }

    pub fn remote_base_url(&self) -> &str {
        self.remote
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_REMOTE_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn remote_timeout(&self) -> Result<Duration> {
        parse_duration(self.remote.timeout.as_deref().unwrap_or("5s"))
    }

    /// Personalization scope user: `[user].name`, else `$USER`.
    pub fn user_name(&self) -> String {
        self.user
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| env::var("USER").ok().filter(|name| !name.is_empty()))
            .unwrap_or_else(|| DEFAULT_USER.to_owned())
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# dispatchdesk config\n# Place this file at: {}\n\nversion = 1\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/dispatchdesk/dispatchdesk.db)\n# db_path = \"/absolute/path/to/dispatchdesk.db\"\n\n[grid]\n# Search debounce for lazy selects, 250ms-400ms\ndebounce = \"300ms\"\npage_size = {}\n# What leaving an edited cell does: \"cancel\" or \"commit\"\nblur = \"cancel\"\n# \"none\", \"single\" or \"multi\"\nselection = \"single\"\n\n[remote]\nenabled = false\nbase_url = \"{}\"\ntimeout = \"5s\"\n\n[user]\n# Defaults to $USER\n# name = \"dispatcher\"\n",
            path.display(),
            DEFAULT_PAGE_SIZE,
            DEFAULT_REMOTE_BASE_URL,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }

    bail!("invalid duration {raw:?}; use <N>ms or <N>s (for example 300ms or 5s)")
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_duration};
    use anyhow::Result;
    use dispatchdesk_app::{BlurPolicy, SelectionMode};
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.debounce()?, Duration::from_millis(300));
        assert_eq!(config.page_size(), 20);
        assert_eq!(config.blur_policy()?, BlurPolicy::Cancel);
        assert_eq!(config.selection_mode()?, SelectionMode::Single);
        assert!(!config.remote_enabled());
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[grid]\npage_size = 10\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[storage], [grid], [remote], and [user]"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 2\n")?;
        let error = Config::load(&path).expect_err("v2 config should fail");
        assert!(error.to_string().contains("unsupported config version 2"));
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn full_config_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[grid]\ndebounce = \"250ms\"\npage_size = 50\nblur = \"commit\"\nselection = \"multi\"\n[remote]\nenabled = true\nbase_url = \"http://tms.local/api//\"\ntimeout = \"2s\"\n[user]\nname = \"ana\"\n",
        )?;
        let config = Config::load(&path)?;
        let fetch = config.fetch_settings()?;
        assert_eq!(fetch.debounce(), Duration::from_millis(250));
        assert_eq!(fetch.page_size(), 50);
        assert_eq!(config.blur_policy()?, BlurPolicy::Commit);
        assert_eq!(config.selection_mode()?, SelectionMode::Multi);
        assert!(config.remote_enabled());
        assert_eq!(config.remote_base_url(), "http://tms.local/api");
        assert_eq!(config.remote_timeout()?, Duration::from_secs(2));
        assert_eq!(config.user_name(), "ana");
        Ok(())
    }

    #[test]
    fn debounce_outside_window_is_rejected() -> Result<()> {
        for raw in ["100ms", "1s"] {
            let (_temp, path) = write_config(&format!("version = 1\n[grid]\ndebounce = \"{raw}\"\n"))?;
            let error = Config::load(&path).expect_err("debounce outside the window");
            assert!(
                error.to_string().contains("must lie between 250ms and 400ms"),
                "unexpected message: {error}"
            );
        }
        Ok(())
    }

    #[test]
    fn page_size_bounds_are_validated() -> Result<()> {
        for size in [0, 501] {
            let (_temp, path) = write_config(&format!("version = 1\n[grid]\npage_size = {size}\n"))?;
            let error = Config::load(&path).expect_err("page size out of range");
            assert!(error.to_string().contains("between 1 and 500"));
        }
        Ok(())
    }

    #[test]
    fn unknown_blur_and_selection_values_are_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[grid]\nblur = \"save\"\n")?;
        let error = Config::load(&path).expect_err("unknown blur policy");
        assert!(format!("{error:#}").contains("\"cancel\" or \"commit\""));

        let (_temp, path) = write_config("version = 1\n[grid]\nselection = \"all\"\n")?;
        let error = Config::load(&path).expect_err("unknown selection mode");
        assert!(format!("{error:#}").contains("\"none\", \"single\" or \"multi\""));
        Ok(())
    }

    #[test]
    fn remote_timeout_rejects_zero() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[remote]\ntimeout = \"0s\"\n")?;
        let error = Config::load(&path).expect_err("zero timeout should fail");
        assert!(error.to_string().contains("must be positive"));
        Ok(())
    }

    #[test]
    fn db_path_rejects_uri_style_storage_value() -> Result<()> {
        let (_temp, path) =
            write_config("version = 1\n[storage]\ndb_path = \"file:dispatchdesk.db\"\n")?;
        assert!(Config::load(&path).is_err());
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("DISPATCHDESK_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("DISPATCHDESK_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn db_path_uses_env_override_when_storage_db_path_missing() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("DISPATCHDESK_DB_PATH", "/from/env-only.db");
        }
        let config = Config::load(&path)?;
        let resolved = config.db_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("DISPATCHDESK_DB_PATH");
        }
        assert_eq!(resolved, PathBuf::from("/from/env-only.db"));
        Ok(())
    }

    #[test]
    fn user_name_falls_back_to_env() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n[user]\nname = \"  \"\n")?;
        let config = Config::load(&path)?;
        let previous = std::env::var_os("USER");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("USER", "ben");
        }
        let name = config.user_name();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            match previous {
                Some(value) => std::env::set_var("USER", value),
                None => std::env::remove_var("USER"),
            }
        }
        assert_eq!(name, "ben");
        Ok(())
    }

    #[test]
    fn durations_parse_ms_and_seconds() -> Result<()> {
        assert_eq!(parse_duration("300ms")?, Duration::from_millis(300));
        assert_eq!(parse_duration("5s")?, Duration::from_secs(5));
        assert!(parse_duration("2m").is_err());
        assert!(parse_duration("soon").is_err());
        Ok(())
    }

    #[test]
    fn example_config_loads_cleanly() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, Config::example_config(&path))?;
        let config = Config::load(&path)?;
        assert_eq!(config.page_size(), 20);
        Ok(())
    }
}
