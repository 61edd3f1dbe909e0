//! Game metadata: players, komi, rules and the final result.

use std::collections::BTreeMap;
use std::fmt;

use crate::board::Color;
use crate::constants::{DEFAULT_BOARD_SIZE, DEFAULT_KOMI};

/// How a game was won.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum WinMargin {
    Points(f64),
    Resign,
    Time,
    Forfeit,
    Unknown,
}

/// Outcome of a game.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GameResult {
    Draw,
    Void,
    Unknown,
    Win { winner: Color, margin: WinMargin },
}

impl GameResult {
    pub fn win(winner: Color, margin: WinMargin) -> Self {
        GameResult::Win { winner, margin }
    }

    /// Parses the `RE` notation: `0`, `Draw`, `Void`, `?`, `B+R`, `W+3.5`, `B+T`, `W+F`, `B+`.
    ///
    /// Returns `None` for an empty string. Anything unrecognized is an unknown result.
    pub fn parse(text: &str) -> Option<GameResult> {
        let text = text.trim();
        let first = text.chars().next()?;
        let result = match first.to_ascii_uppercase() {
            '0' | 'D' | 'J' => GameResult::Draw,
            'V' => GameResult::Void,
            'B' | 'W' => {
                let winner = if first.eq_ignore_ascii_case(&'B') {
                    Color::Black
                } else {
                    Color::White
                };
                let rest = text[1..].trim_start_matches('+');
                GameResult::Win {
                    winner,
                    margin: parse_margin(rest),
                }
            }
            _ => GameResult::Unknown,
        };
        Some(result)
    }

    pub fn winner(&self) -> Option<Color> {
        match self {
            GameResult::Win { winner, .. } => Some(*winner),
            _ => None,
        }
    }
}

fn parse_margin(text: &str) -> WinMargin {
    match text.chars().next().map(|c| c.to_ascii_uppercase()) {
        None => WinMargin::Unknown,
        Some('R') => WinMargin::Resign,
        Some('T') => WinMargin::Time,
        Some('F') => WinMargin::Forfeit,
        Some(_) => {
            // Accept a numeric prefix such as "3.5 points".
            let end = text
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(text.len());
            text[..end]
                .parse()
                .map_or(WinMargin::Unknown, WinMargin::Points)
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameResult::Draw => write!(f, "0"),
            GameResult::Void => write!(f, "Void"),
            GameResult::Unknown => write!(f, "?"),
            GameResult::Win { winner, margin } => {
                let side = match winner {
                    Color::Black => 'B',
                    Color::White => 'W',
                };
                write!(f, "{side}+")?;
                match margin {
                    WinMargin::Points(points) if *points > 0.0 => write!(f, "{points}"),
                    WinMargin::Points(_) | WinMargin::Unknown => Ok(()),
                    WinMargin::Resign => write!(f, "R"),
                    WinMargin::Time => write!(f, "T"),
                    WinMargin::Forfeit => write!(f, "F"),
                }
            }
        }
    }
}

/// Metadata attached to the root of a game.
#[derive(Clone, Debug, PartialEq)]
pub struct GameInfo {
    pub board_size: usize,
    pub komi: f64,
    pub handicap: usize,
    pub rules: Option<String>,
    pub black_name: Option<String>,
    pub white_name: Option<String>,
    pub black_rank: Option<String>,
    pub white_rank: Option<String>,
    pub result: Option<GameResult>,
    /// Player to move first when it is not implied by the moves.
    pub first_player: Option<Color>,
    pub event: Option<String>,
    pub round: Option<String>,
    pub date: Option<String>,
    pub place: Option<String>,
    pub game_name: Option<String>,
    pub application: Option<String>,
    /// Free-form values, e.g. data carried by the binary format.
    pub tags: BTreeMap<String, String>,
}

impl Default for GameInfo {
    fn default() -> Self {
        Self::new(DEFAULT_BOARD_SIZE)
    }
}

impl GameInfo {
    pub fn new(board_size: usize) -> Self {
        Self {
            board_size,
            komi: DEFAULT_KOMI,
            handicap: 0,
            rules: None,
            black_name: None,
            white_name: None,
            black_rank: None,
            white_rank: None,
            result: None,
            first_player: None,
            event: None,
            round: None,
            date: None,
            place: None,
            game_name: None,
            application: None,
            tags: BTreeMap::new(),
        }
    }

    /// True for rule sets where the handicap stones are placed freely.
    pub fn has_free_handicap(&self) -> bool {
        self.rules.as_deref().is_some_and(|rules| {
            let rules = rules.to_ascii_lowercase();
            rules.starts_with("nz") || rules.starts_with("new zealand") || rules.starts_with("chinese")
        })
    }
}
