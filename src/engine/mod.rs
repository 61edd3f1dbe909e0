//! External GTP engines.
//!
//! - [`launcher`] - How an engine is started
//! - [`process`] - The running process, its exit watcher and stderr drainer
//! - [`bridge`] - Commands, crash recovery and game-level operations
//! - [`worker`] - A thread that runs bridge requests in order

pub mod bridge;
pub mod launcher;
pub mod process;
pub mod worker;

pub use bridge::{EngineBridge, EngineState, FinalStatus};
pub use launcher::{EngineLauncher, ExternalEngine, LaunchConfig, PachiEngine};
pub use process::{EngineProcess, Response};
pub use worker::{EngineWorker, Pending};
