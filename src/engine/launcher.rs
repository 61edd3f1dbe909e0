//! How to start an engine process.

use std::path::PathBuf;

/// Program and arguments used to spawn an engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchConfig {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Something that knows how to start a GTP engine.
///
/// The launch configuration may depend on the game being played, so it is
/// asked for again on every (re)spawn.
pub trait EngineLauncher: Send {
    /// Display name of the engine.
    fn name(&self) -> &str;

    fn launch_config(&self, board_size: usize) -> LaunchConfig;

    /// Playing level changed; engines that take their strength from the
    /// command line pick it up on the next spawn.
    fn set_level(&mut self, _level: u32) {}
}

/// Any GTP engine started with a fixed command line.
#[derive(Clone, Debug)]
pub struct ExternalEngine {
    name: String,
    config: LaunchConfig,
}

impl ExternalEngine {
    pub fn new(name: impl Into<String>, config: LaunchConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

impl EngineLauncher for ExternalEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn launch_config(&self, _board_size: usize) -> LaunchConfig {
        self.config.clone()
    }
}

/// Pachi, whose strength is set through its time budget.
#[derive(Clone, Debug)]
pub struct PachiEngine {
    program: PathBuf,
    level: u32,
    max_tree_size: u32,
}

impl PachiEngine {
    pub const DEFAULT_MAX_TREE_SIZE: u32 = 192;

    pub fn new(program: impl Into<PathBuf>, level: u32) -> Self {
        Self {
            program: program.into(),
            level,
            max_tree_size: Self::DEFAULT_MAX_TREE_SIZE,
        }
    }

    /// Tree size limit in megabytes.
    pub fn with_max_tree_size(mut self, megabytes: u32) -> Self {
        self.max_tree_size = megabytes;
        self
    }

    /// Seconds for the whole game: grows with the board area and the level.
    pub fn total_time(&self, board_size: usize) -> usize {
        let size = board_size;
        2 * size * size + 8 * size * self.level as usize
    }
}

impl EngineLauncher for PachiEngine {
    fn name(&self) -> &str {
        "Pachi"
    }

    fn launch_config(&self, board_size: usize) -> LaunchConfig {
        LaunchConfig::new(
            self.program.clone(),
            [
                "-t".to_string(),
                format!("_{}", self.total_time(board_size)),
                format!("max_tree_size={}", self.max_tree_size),
            ],
        )
    }

    fn set_level(&mut self, level: u32) {
        self.level = level;
    }
}
