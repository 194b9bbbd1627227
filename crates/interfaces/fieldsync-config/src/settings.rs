use std::fs;
use std::io::Write;

use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_PROBE_INTERVAL_SECS, DEFAULT_WRITE_TIMEOUT_SECS};

const QUALIFIER: &str = "com";
const ORG: &str = "fieldsync";
const APP: &str = "fieldsync";

const SETTINGS_FILE: &str = "settings.json";

/// Keys accepted by [`Settings::set`].
pub const SETTING_KEYS: &[&str] = &[
    "remote_url",
    "token",
    "probe_url",
    "write_timeout_secs",
    "probe_interval_secs",
    "data_dir",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the document store, e.g. `https://host/api/v1`.
    pub remote_url: Option<String>,
    pub token: Option<String>,
    /// Probed for connectivity. Falls back to `remote_url`.
    pub probe_url: Option<String>,
    pub write_timeout_secs: u64,
    pub probe_interval_secs: u64,
    /// Where the local database lives. Defaults to the platform data dir.
    pub data_dir: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote_url: None,
            token: None,
            probe_url: None,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            data_dir: None,
        }
    }
}

impl Settings {
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        let optional = || (!value.is_empty()).then(|| value.to_string());
        match key {
            "remote_url" => self.remote_url = optional(),
            "token" => self.token = optional(),
            "probe_url" => self.probe_url = optional(),
            "data_dir" => self.data_dir = optional(),
            "write_timeout_secs" => {
                self.write_timeout_secs = value
                    .parse()
                    .with_context(|| format!("write_timeout_secs must be a number, got {value:?}"))?
            }
            "probe_interval_secs" => {
                self.probe_interval_secs = value
                    .parse()
                    .with_context(|| format!("probe_interval_secs must be a number, got {value:?}"))?
            }
            other => bail!(
                "unknown setting {other:?} (expected one of: {})",
                SETTING_KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Probe target: explicit probe URL, else the remote base.
    pub fn effective_probe_url(&self) -> Option<&str> {
        self.probe_url.as_deref().or(self.remote_url.as_deref())
    }
}

/// Reads and writes `settings.json` under a config directory.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    config_dir: Utf8PathBuf,
    data_dir: Utf8PathBuf,
}

impl SettingsStore {
    /// Platform config and data directories.
    pub fn from_project_dirs() -> Result<Self> {
        let dirs = ProjectDirs::from(QUALIFIER, ORG, APP)
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        let config_dir = Utf8PathBuf::from_path_buf(dirs.config_dir().to_path_buf())
            .map_err(|p| anyhow::anyhow!("config dir is not UTF-8: {}", p.display()))?;
        let data_dir = Utf8PathBuf::from_path_buf(dirs.data_dir().to_path_buf())
            .map_err(|p| anyhow::anyhow!("data dir is not UTF-8: {}", p.display()))?;
        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Everything under one directory.
    pub fn at(dir: &Utf8Path) -> Self {
        Self {
            config_dir: dir.to_owned(),
            data_dir: dir.join("data"),
        }
    }

    pub fn settings_path(&self) -> Utf8PathBuf {
        self.config_dir.join(SETTINGS_FILE)
    }

    /// Data root for `settings`, honouring its override.
    pub fn data_dir(&self, settings: &Settings) -> Utf8PathBuf {
        match settings.data_dir.as_deref() {
            Some(dir) => Utf8PathBuf::from(dir),
            None => self.data_dir.clone(),
        }
    }

    pub fn load(&self) -> Result<Settings> {
        let path = self.settings_path();
        if !path.exists() {
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(&path).context("Failed to read settings")?;
        let settings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings {path}"))?;
        Ok(settings)
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        fs::create_dir_all(&self.config_dir)
            .with_context(|| format!("Failed to create config dir {}", self.config_dir))?;
        let json = serde_json::to_string_pretty(settings)?;
        atomic_write(&self.settings_path(), json.as_bytes()).context("Failed to write settings")?;
        Ok(())
    }
}

fn atomic_write(path: &Utf8Path, contents: &[u8]) -> Result<()> {
    let tmp_path = Utf8PathBuf::from(format!("{path}.tmp"));

    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("Failed to create temp file {tmp_path}"))?;
    file.write_all(contents)
        .with_context(|| format!("Failed to write temp file {tmp_path}"))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync temp file {tmp_path}"))?;
    drop(file);

    match fs::rename(&tmp_path, path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            fs::remove_file(path).ok();
            fs::rename(&tmp_path, path)
                .with_context(|| format!("Failed to replace destination file {path}"))
        }
        Err(e) => {
            Err(e).with_context(|| format!("Failed to rename temp file {tmp_path} to {path}"))
        }
    }
}
