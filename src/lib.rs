//! Kifu: Go game records, rules and engine play.
//!
//! This crate keeps a game of Go as a tree of variations on top of a rules
//! engine, reads and writes it as SGF text or as the compact LRF binary
//! format, and plays it against external GTP engines.
//!
//! ## Modules
//!
//! - [`constants`] - Board size limits, defaults and binary field widths
//! - [`error`] - Error types
//! - [`board`] - Board state, captures, ko and marks
//! - [`tree`] - Arena of move nodes with variations
//! - [`info`] - Game metadata and results
//! - [`game`] - Playing, undo, navigation, handicap and scoring
//! - [`sgf`] - SGF reader and writer
//! - [`bits`] - Bit-level reader and writer
//! - [`lrf`] - LRF binary reader and writer
//! - [`gtp`] - GTP vertices and a small GTP server
//! - [`engine`] - External engine processes
//! - [`config`] - Engine configuration files
//!
//! ## Example
//!
//! ```
//! use kifu::game::GameTree;
//! use kifu::sgf::{self, WriteStyle};
//!
//! // Create a new game
//! let mut game = GameTree::new(9, 6.5, 0, "Japanese");
//!
//! // Play two moves and take one back
//! assert!(game.play(2, 2));
//! assert!(game.play(6, 6));
//! game.undo(true);
//!
//! let text = sgf::to_string(&game, WriteStyle::Compact);
//! assert_eq!(text, "(;RU[Japanese]SZ[9]KM[6.5]HA[0];B[cc])");
//! ```

pub mod bits;
pub mod board;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod game;
pub mod gtp;
pub mod info;
pub mod lrf;
pub mod sgf;
pub mod tree;
