//! Constants for board dimensions, game defaults and the binary format.
//!
//! Board sizes are runtime values, but every size must fall inside
//! [`MIN_BOARD_SIZE`, `MAX_BOARD_SIZE`] so that intersections fit the
//! 9-bit indices of the binary format.

// =============================================================================
// Board Geometry
// =============================================================================

/// Smallest supported board.
pub const MIN_BOARD_SIZE: usize = 4;

/// Largest supported board. 19x19 = 361 intersections, addressable with 9 bits.
pub const MAX_BOARD_SIZE: usize = 19;

/// Board size assumed by the text codec when `SZ` is missing.
pub const DEFAULT_BOARD_SIZE: usize = 19;

// =============================================================================
// Game Defaults
// =============================================================================

/// Komi assumed when a game record does not specify one.
pub const DEFAULT_KOMI: f64 = 6.5;

/// Rules written when a game has none.
pub const DEFAULT_RULES: &str = "Japanese";

/// Largest handicap with a fixed star-point layout.
pub const MAX_HANDICAP: usize = 9;

/// Value of a node that carries no problem annotation.
pub const VALUE_UNSET: i8 = -1;

/// Value of a node on a correct branch.
pub const VALUE_RIGHT: i8 = 100;

// =============================================================================
// Binary Format Bit Widths
// =============================================================================

/// Bits of the board-size header.
pub const BITS_BOARD_SIZE: u32 = 5;

/// Bits of an intersection index (`y * size + x`).
pub const BITS_INTERSECTION: u32 = 9;

/// Bits of the optional-data count after the board.
pub const BITS_DATA_COUNT: u32 = 9;

/// Bits of an optional-data type tag.
pub const BITS_DATA_TYPE: u32 = 2;

/// Bits of a mark type.
pub const BITS_MARK_TYPE: u32 = 8;

/// Bits of a command selector (after a clear command bit).
pub const BITS_COMMAND: u32 = 2;

/// Bits of a SET_RESULT value.
pub const BITS_RESULT: u32 = 7;

/// Bits of the type tag of the trailing extra data.
pub const BITS_EXTRA_TYPE: u32 = 4;

/// Bits of the level stored in the trailing extra data.
pub const BITS_LEVEL: u32 = 8;

/// Optional data tag for a board mark.
pub const DATA_TYPE_MARK: u64 = 1;

/// Trailing extra data tag for the engine level.
pub const EXTRA_TYPE_LEVEL: u64 = 3;

/// `GameInfo` tag under which the binary format's level is stored.
pub const TAG_LEVEL: &str = "lrf_level";

// =============================================================================
// GTP
// =============================================================================

/// Column letters used by GTP vertices ('I' is skipped).
pub const GTP_COLUMNS: &[u8] = b"ABCDEFGHJKLMNOPQRSTUVWXYZ";
