use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_TARGET_BRANCH: &str = "dev";
pub const CONFIG_ENV: &str = "QUICK_MERGE_CONFIG";
const SETTINGS_FILE: &str = "settings.json";
const APP_DIR: &str = "quick-merge";

/// Read/write access to the configured target branch.
pub trait Settings {
    fn target_branch(&self) -> String;

    /// Store a new target branch. Empty or whitespace-only names are rejected.
    fn set_target_branch(&mut self, branch: &str) -> Result<()>;
}

/// Trim and validate a branch name supplied by the user.
pub fn validate_branch(branch: &str) -> Result<String> {
    let trimmed = branch.trim();
    if trimmed.is_empty() {
        bail!("target branch must not be empty");
    }
    Ok(trimmed.to_string())
}

/// Target branch for one run: the override when given, else the configured one.
pub fn resolve_target(settings: &dyn Settings, override_branch: Option<&str>) -> Result<String> {
    match override_branch {
        Some(branch) => validate_branch(branch),
        None => Ok(settings.target_branch()),
    }
}

/// Settings that live only as long as the process.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySettings {
    target_branch: String,
}

impl MemorySettings {
    pub fn new(branch: &str) -> Result<Self> {
        Ok(Self { target_branch: validate_branch(branch)? })
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self { target_branch: default_target() }
    }
}

impl Settings for MemorySettings {
    fn target_branch(&self) -> String {
        self.target_branch.clone()
    }

    fn set_target_branch(&mut self, branch: &str) -> Result<()> {
        self.target_branch = validate_branch(branch)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct SettingsData {
    #[serde(default = "default_target")]
    target_branch: String,
}

fn default_target() -> String {
    DEFAULT_TARGET_BRANCH.to_string()
}

impl Default for SettingsData {
    fn default() -> Self {
        Self { target_branch: default_target() }
    }
}

/// Settings persisted as pretty JSON, written on every change.
#[derive(Debug, Clone)]
pub struct FileSettings {
    path: PathBuf,
    data: SettingsData,
}

impl FileSettings {
    /// Where settings live: `$QUICK_MERGE_CONFIG`, else the user config dir.
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        let dir = dirs::config_dir()
            .context("No user configuration directory found. Set QUICK_MERGE_CONFIG to a settings file path.")?;
        Ok(dir.join(APP_DIR).join(SETTINGS_FILE))
    }

    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_path()?)
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read {}", path.display()))?;
            let data: SettingsData = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
            if data.target_branch.trim().is_empty() {
                SettingsData::default()
            } else {
                data
            }
        } else {
            SettingsData::default()
        };
        Ok(Self { path: path.to_path_buf(), data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the stored value and go back to the default branch.
    pub fn reset(&mut self) -> Result<()> {
        self.data = SettingsData::default();
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

impl Settings for FileSettings {
    fn target_branch(&self) -> String {
        self.data.target_branch.clone()
    }

    fn set_target_branch(&mut self, branch: &str) -> Result<()> {
        self.data.target_branch = validate_branch(branch)?;
        self.save()
    }
}
