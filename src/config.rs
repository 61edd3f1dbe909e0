//! Engine configuration files.
//!
//! ```toml
//! name = "pachi"
//! kind = "pachi"
//! program = "/usr/games/pachi"
//! level = 5
//! max_tree_size = 192
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::engine::launcher::{EngineLauncher, ExternalEngine, LaunchConfig, PachiEngine};
use crate::error::ConfigError;

/// Which launcher to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Program and arguments used as given.
    #[default]
    External,
    /// Pachi, with its command line derived from the level.
    Pachi,
}

/// How to start a GTP engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Display name of the engine.
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub kind: EngineKind,

    /// Path of the engine executable.
    pub program: PathBuf,

    /// Command-line arguments of an external engine.
    #[serde(default)]
    pub args: Vec<String>,

    /// Playing level, 1 to 10.
    #[serde(default = "default_level")]
    pub level: u32,

    /// Pachi tree size limit in megabytes.
    #[serde(default = "default_max_tree_size")]
    pub max_tree_size: u32,
}

fn default_name() -> String {
    "engine".to_string()
}

fn default_level() -> u32 {
    1
}

fn default_max_tree_size() -> u32 {
    PachiEngine::DEFAULT_MAX_TREE_SIZE
}

impl EngineConfig {
    /// An external engine started as `program args...`.
    pub fn external(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            name: default_name(),
            kind: EngineKind::External,
            program: program.into(),
            args,
            level: default_level(),
            max_tree_size: default_max_tree_size(),
        }
    }

    /// Parses and validates a TOML configuration.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("loading engine config");
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        info!(engine = %config.name, "engine config loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.program.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("program must not be empty".to_string()));
        }
        if !(1..=10).contains(&self.level) {
            return Err(ConfigError::Invalid(format!("level {} is not in 1..=10", self.level)));
        }
        Ok(())
    }

    pub fn launcher(&self) -> Box<dyn EngineLauncher> {
        match self.kind {
            EngineKind::External => Box::new(ExternalEngine::new(
                self.name.clone(),
                LaunchConfig::new(self.program.clone(), self.args.clone()),
            )),
            EngineKind::Pachi => Box::new(
                PachiEngine::new(self.program.clone(), self.level).with_max_tree_size(self.max_tree_size),
            ),
        }
    }
}
