//! Error types shared by the rules engine, the codecs and the engine bridge.

use std::io;

use thiserror::Error;

/// Reason a move was rejected by the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("illegal move: point outside the board")]
    OutOfBounds,

    #[error("illegal move: point not empty")]
    Occupied,

    #[error("illegal move: suicide")]
    Suicide,

    #[error("illegal move: retakes ko")]
    Ko,
}

/// Malformed text or binary game record. A failed parse never yields a game.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    #[error("no game tree found")]
    NoGameTree,

    #[error("unexpected end of input at byte {position}")]
    UnexpectedEof { position: usize },

    #[error("unterminated value of property {property} starting at byte {position}")]
    UnterminatedValue { property: String, position: usize },

    #[error("unbalanced parentheses at byte {position}")]
    Unbalanced { position: usize },

    #[error("unexpected character '{character}' at byte {position}")]
    UnexpectedChar { character: char, position: usize },

    #[error("invalid value '{value}' for property {property}")]
    InvalidValue { property: String, value: String },

    #[error("coordinate {x},{y} outside a {size}x{size} board")]
    InvalidCoordinate { x: usize, y: usize, size: usize },

    #[error("unsupported board size {0}")]
    UnsupportedBoardSize(usize),

    #[error("binary data ends after {bits} bits")]
    Truncated { bits: usize },

    #[error("unknown binary command {0}")]
    UnknownCommand(u64),

    #[error("failed to read game record: {0}")]
    Io(#[from] io::Error),
}

/// The binary format cannot represent a game.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    #[error("board size {0} does not fit the binary format")]
    UnsupportedBoardSize(usize),

    #[error("move {0} cannot be addressed by the binary format")]
    UnsupportedMove(String),

    #[error("move at {point:?} is played out of turn; the binary format alternates colors")]
    OutOfTurn { point: (usize, usize) },

    #[error("move at {point:?} repeats an earlier variation of the same node")]
    DuplicateVariation { point: (usize, usize) },

    #[error("failed to write game record: {0}")]
    Io(#[from] io::Error),
}

/// Failure while talking to an external engine process.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Reading or writing the process streams failed.
    #[error("engine I/O failed: {0}")]
    Io(#[source] io::Error),

    /// The process could not be restarted or the game could not be replayed.
    #[error("engine respawn failed: {message}")]
    Respawn {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("engine has not been started")]
    NotStarted,

    #[error("engine rejected '{command}': {response}")]
    Rejected { command: String, response: String },

    #[error("unexpected engine response to '{command}': {response}")]
    InvalidResponse { command: String, response: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("engine worker has stopped")]
    WorkerStopped,
}

/// Invalid engine configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid engine configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid engine configuration: {0}")]
    Invalid(String),
}
