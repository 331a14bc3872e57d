use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    diagnostics::{DEFAULT_LOG_FILE_PREFIX, DEFAULT_LOG_FILTER},
    project::{DEFAULT_AUTHOR, DEFAULT_PROJECT_NAME, Project},
    undo::DEFAULT_UNDO_DEPTH,
};

pub const CONFIG_FILE_NAME: &str = "nesforge.config.toml";
pub const CONFIG_PATH_ENV: &str = "NESFORGE_CONFIG_PATH";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub document: DocumentConfig,
    pub undo: UndoConfig,
    pub diagnostics: DiagnosticsConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub default_name: String,
    pub default_author: String,
    pub create_default_content: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    pub max_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub logs_dir: PathBuf,
    pub autosave_dir: PathBuf,
    pub sample_directories: Vec<PathBuf>,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            default_name: DEFAULT_PROJECT_NAME.to_string(),
            default_author: DEFAULT_AUTHOR.to_string(),
            create_default_content: true,
        }
    }
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_UNDO_DEPTH,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rust_log_filter: DEFAULT_LOG_FILTER.to_string(),
            trace_file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
            autosave_dir: PathBuf::from("data/autosave"),
            sample_directories: vec![PathBuf::from("data/dpcm")],
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = discover_config_path().with_context(|| {
            format!("failed to locate {CONFIG_FILE_NAME}; looked in cwd and parent directory")
        })?;
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse config TOML from {}", path.display()))?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid config TOML")
    }

    #[must_use]
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|error| {
            warn!(?error, "using default configuration");
            Self::default()
        })
    }

    #[must_use]
    pub fn new_project(&self) -> Project {
        let mut project = if self.document.create_default_content {
            Project::with_default_content()
        } else {
            Project::new()
        };
        project.name.clone_from(&self.document.default_name);
        project.author.clone_from(&self.document.default_author);
        project
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| anyhow::anyhow!("{CONFIG_FILE_NAME} not found"))
}
