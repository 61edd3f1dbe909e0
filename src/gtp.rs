//! Go Text Protocol (GTP) text helpers and a small GTP server.
//!
//! The helpers convert between board points and GTP vertices (`D4`, `pass`,
//! `resign`) and are shared with the engine bridge. The server plays random
//! legal moves on a [`GameTree`]; it is enough to drive a GUI, and it is the
//! process the engine bridge is tested against.
//!
//! ## Supported Commands
//!
//! - `name`, `version`, `protocol_version`, `list_commands`, `known_command`, `quit`
//! - `boardsize <size>` - Set the board size (4 to 19) and clear the board
//! - `clear_board` - Reset the board to empty
//! - `komi <value>` - Set komi
//! - `play <color> <vertex>` - Play a move
//! - `genmove <color>` - Generate and play a move for the given color
//! - `undo`, `gg-undo [n]` - Take back moves
//! - `fixed_handicap <n>` - Place handicap stones on the star points
//! - `set_free_handicap <vertex>...` - Place handicap stones on the given points
//! - `level <n>` - Set the playing level (accepted, random play ignores it)
//! - `final_score`, `final_status_list <status>` - Score the position
//! - `showboard` - Print the board
//!
//! ## Example
//!
//! ```no_run
//! use kifu::gtp::GtpServer;
//! let mut server = GtpServer::new();
//! server.run(std::io::stdin().lock(), std::io::stdout()).unwrap();
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use tracing::{debug, info};

use crate::board::{Board, Color, Intersection, Point};
use crate::constants::{DEFAULT_KOMI, DEFAULT_RULES, GTP_COLUMNS, MAX_BOARD_SIZE, MIN_BOARD_SIZE};
use crate::game::GameTree;
use crate::tree::Move;

/// The list of known GTP commands.
const KNOWN_COMMANDS: &[&str] = &[
    "boardsize",
    "clear_board",
    "final_score",
    "final_status_list",
    "fixed_handicap",
    "genmove",
    "gg-undo",
    "known_command",
    "komi",
    "level",
    "list_commands",
    "name",
    "play",
    "protocol_version",
    "quit",
    "set_free_handicap",
    "showboard",
    "undo",
    "version",
];

/// Line written to the transcript each time a server starts.
pub const TRANSCRIPT_START: &str = "# start";

// =============================================================================
// Vertices and colors
// =============================================================================

/// Parses a GTP vertex such as `D4`, `pass` or `resign` (case-insensitive).
pub fn parse_vertex(text: &str, size: usize) -> Option<Move> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("pass") {
        return Some(Move::Pass);
    }
    if text.eq_ignore_ascii_case("resign") {
        return Some(Move::Resign);
    }
    let mut chars = text.chars();
    let column = chars.next()?.to_ascii_uppercase();
    let x = GTP_COLUMNS.iter().position(|&c| char::from(c) == column)?;
    let row: usize = chars.as_str().parse().ok()?;
    if x >= size || row == 0 || row > size {
        return None;
    }
    Some(Move::Play((x, size - row)))
}

/// Formats a move as a GTP vertex; rows count from the bottom of the board.
pub fn format_vertex(mv: Move, size: usize) -> String {
    match mv {
        Move::Pass => "pass".to_string(),
        Move::Resign => "resign".to_string(),
        Move::Play((x, y)) => format!("{}{}", char::from(GTP_COLUMNS[x]), size - y),
    }
}

pub fn format_point(point: Point, size: usize) -> String {
    format_vertex(Move::Play(point), size)
}

/// Parses `b`, `black`, `w` or `white` (case-insensitive).
pub fn parse_color(text: &str) -> Option<Color> {
    match text.trim().to_ascii_lowercase().as_str() {
        "b" | "black" => Some(Color::Black),
        "w" | "white" => Some(Color::White),
        _ => None,
    }
}

pub fn color_name(color: Color) -> &'static str {
    match color {
        Color::Black => "black",
        Color::White => "white",
    }
}

// =============================================================================
// Server
// =============================================================================

/// Start-up options of a [`GtpServer`].
#[derive(Clone, Debug, Default)]
pub struct ServerOptions {
    /// Seed of the move generator; random when unset.
    pub seed: Option<u64>,
    /// File every received command line is appended to.
    pub transcript: Option<PathBuf>,
    /// When this file exists as a command arrives, the file is removed and
    /// the server stops without answering.
    pub crash_file: Option<PathBuf>,
}

/// GTP server state.
pub struct GtpServer {
    game: GameTree,
    rng: fastrand::Rng,
    level: u32,
    options: ServerOptions,
}

impl Default for GtpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl GtpServer {
    pub fn new() -> Self {
        Self::with_options(ServerOptions::default())
    }

    pub fn with_options(options: ServerOptions) -> Self {
        let rng = options.seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
        Self {
            game: GameTree::new(MAX_BOARD_SIZE, DEFAULT_KOMI, 0, DEFAULT_RULES),
            rng,
            level: 1,
            options,
        }
    }

    pub fn game(&self) -> &GameTree {
        &self.game
    }

    /// Runs the command loop until `quit` or the end of `input`.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> io::Result<()> {
        self.record(TRANSCRIPT_START)?;

        for line in input.lines() {
            let line = line?;

            // Skip empty lines and comments
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            self.record(line)?;
            if self.crash_requested()? {
                info!("crash file found, stopping without a response");
                return Ok(());
            }

            let (id, command_line) = Self::parse_id(line);
            let parts: Vec<&str> = command_line.split_whitespace().collect();
            let Some((command, args)) = parts.split_first() else {
                continue;
            };
            let command = command.to_lowercase();

            let (success, message) = self.execute(&command, args);
            debug!(command = %command, success, "gtp command");
            let prefix = if success { '=' } else { '?' };
            let id_str = id.map(|i| i.to_string()).unwrap_or_default();

            writeln!(output, "\n{prefix}{id_str} {message}\n")?;
            output.flush()?;

            if command == "quit" {
                break;
            }
        }
        Ok(())
    }

    fn record(&self, line: &str) -> io::Result<()> {
        let Some(path) = &self.options.transcript else {
            return Ok(());
        };
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")?;
        file.flush()
    }

    fn crash_requested(&self) -> io::Result<bool> {
        match &self.options.crash_file {
            Some(path) if path.exists() => {
                fs::remove_file(path)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Parse an optional numeric command ID from the beginning of the line.
    fn parse_id(line: &str) -> (Option<u32>, &str) {
        let trimmed = line.trim();
        let end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        if end > 0 {
            if let Ok(id) = trimmed[..end].parse::<u32>() {
                return (Some(id), trimmed[end..].trim());
            }
        }
        (None, trimmed)
    }

    fn reset(&mut self, size: usize, komi: f64) {
        self.game = GameTree::new(size, komi, 0, DEFAULT_RULES);
    }

    /// Execute a GTP command and return (success, response).
    pub fn execute(&mut self, command: &str, args: &[&str]) -> (bool, String) {
        let size = self.game.size();
        match command {
            "name" => (true, "kifu".to_string()),

            "version" => (true, env!("CARGO_PKG_VERSION").to_string()),

            "protocol_version" => (true, "2".to_string()),

            "list_commands" => (true, KNOWN_COMMANDS.join("\n")),

            "known_command" => match args.first() {
                None => (false, "missing argument".to_string()),
                Some(name) => {
                    let known = KNOWN_COMMANDS.contains(&name.to_lowercase().as_str());
                    (true, known.to_string())
                }
            },

            "quit" => (true, String::new()),

            "boardsize" => match args.first().map(|a| a.parse::<usize>()) {
                None => (false, "missing argument".to_string()),
                Some(Ok(n)) if (MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&n) => {
                    self.reset(n, self.game.info.komi);
                    (true, String::new())
                }
                Some(Ok(_)) => (false, "unacceptable size".to_string()),
                Some(Err(_)) => (false, "invalid size".to_string()),
            },

            "clear_board" => {
                self.reset(size, self.game.info.komi);
                (true, String::new())
            }

            "komi" => match args.first().map(|a| a.parse::<f64>()) {
                None => (false, "missing argument".to_string()),
                Some(Ok(komi)) => {
                    self.game.info.komi = komi;
                    (true, String::new())
                }
                Some(Err(_)) => (false, "invalid komi".to_string()),
            },

            "play" => {
                let [color, vertex, ..] = args else {
                    return (false, "missing arguments".to_string());
                };
                let Some(color) = parse_color(color) else {
                    return (false, "invalid color".to_string());
                };
                match parse_vertex(vertex, size) {
                    None => (false, "invalid vertex".to_string()),
                    Some(Move::Resign) => {
                        self.game.resign(color);
                        (true, String::new())
                    }
                    Some(Move::Pass) => {
                        self.game.place_move(Move::Pass, color);
                        (true, String::new())
                    }
                    Some(Move::Play((x, y))) => match self.game.try_play(x, y, color) {
                        Ok(()) => (true, String::new()),
                        Err(e) => (false, e.to_string()),
                    },
                }
            }

            "genmove" => {
                let Some(color) = args.first().and_then(|a| parse_color(a)) else {
                    return (false, "invalid color".to_string());
                };
                let mv = match self.choose_random_move(color) {
                    Some(p) => Move::Play(p),
                    None => Move::Pass,
                };
                self.game.place_move(mv, color);
                (true, format_vertex(mv, size))
            }

            "undo" => match self.game.undo(true) {
                Some(_) => (true, String::new()),
                None => (false, "cannot undo".to_string()),
            },

            "gg-undo" => {
                let count = match args.first().map(|a| a.parse::<usize>()) {
                    None => 1,
                    Some(Ok(n)) => n,
                    Some(Err(_)) => return (false, "invalid count".to_string()),
                };
                if count > self.game.move_number() {
                    return (false, "cannot undo".to_string());
                }
                for _ in 0..count {
                    self.game.undo(true);
                }
                (true, String::new())
            }

            "fixed_handicap" => {
                let Some(Ok(count)) = args.first().map(|a| a.parse::<usize>()) else {
                    return (false, "invalid handicap".to_string());
                };
                if self.game.board().bounds().is_some() {
                    return (false, "board not empty".to_string());
                }
                if !(2..=9).contains(&count) {
                    return (false, "invalid handicap".to_string());
                }
                self.game.place_handicap(count);
                let stones = stones_of(self.game.board(), Intersection::Black);
                if stones.is_empty() {
                    return (false, "handicap not supported on this board".to_string());
                }
                let vertices: Vec<String> = stones.iter().map(|&p| format_point(p, size)).collect();
                (true, vertices.join(" "))
            }

            "set_free_handicap" => {
                if self.game.board().bounds().is_some() {
                    return (false, "board not empty".to_string());
                }
                let mut points = Vec::with_capacity(args.len());
                for arg in args {
                    match parse_vertex(arg, size) {
                        Some(Move::Play(p)) if !points.contains(&p) => points.push(p),
                        _ => return (false, "bad vertex list".to_string()),
                    }
                }
                if points.len() < 2 {
                    return (false, "invalid number of stones".to_string());
                }
                for &(x, y) in &points {
                    self.game.add_stone(x, y, Some(Color::Black));
                }
                self.game.info.handicap = points.len();
                self.game.set_next_player(Color::White);
                (true, String::new())
            }

            "level" => match args.first().map(|a| a.parse::<u32>()) {
                Some(Ok(level)) => {
                    self.level = level;
                    (true, String::new())
                }
                _ => (false, "invalid level".to_string()),
            },

            "final_score" => {
                let score = self.game.compute_territory();
                (true, score.result().to_string())
            }

            "final_status_list" => {
                let Some(status) = args.first() else {
                    return (false, "missing argument".to_string());
                };
                self.game.compute_territory();
                let points = match status.to_lowercase().as_str() {
                    "dead" | "seki" => Vec::new(),
                    "alive" => {
                        let mut alive = stones_of(self.game.board(), Intersection::Black);
                        alive.extend(stones_of(self.game.board(), Intersection::White));
                        alive
                    }
                    "black_territory" => {
                        stones_of(self.game.final_status_board(), Intersection::BlackTerritory)
                    }
                    "white_territory" => {
                        stones_of(self.game.final_status_board(), Intersection::WhiteTerritory)
                    }
                    _ => return (false, "invalid status".to_string()),
                };
                let vertices: Vec<String> = points.iter().map(|&p| format_point(p, size)).collect();
                (true, vertices.join(" "))
            }

            "showboard" => (true, format!("\n{}", self.game.board().to_string().trim_end())),

            _ => (false, format!("unknown command: {command}")),
        }
    }

    /// Choose a random legal move that does not fill one of `color`'s eyes.
    fn choose_random_move(&mut self, color: Color) -> Option<Point> {
        let board = self.game.board();
        let size = board.size();
        let mut candidates: Vec<Point> = (0..size * size)
            .map(|i| (i % size, i / size))
            .filter(|&(x, y)| board.is_empty_at(x, y) && board.is_eyeish(x, y) != Some(color))
            .collect();

        // Shuffle lazily and keep the first legal candidate
        let n = candidates.len();
        for i in 0..n {
            let j = i + self.rng.usize(..n - i);
            candidates.swap(i, j);
            let (x, y) = candidates[i];
            if self.game.is_legal(x, y, color) {
                return Some((x, y));
            }
        }
        None
    }
}

/// Points of `board` in the given state, row by row.
fn stones_of(board: &Board, state: Intersection) -> Vec<Point> {
    let size = board.size();
    (0..size * size)
        .map(|i| (i % size, i / size))
        .filter(|&(x, y)| board.get(x, y) == state)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> GtpServer {
        GtpServer::with_options(ServerOptions {
            seed: Some(7),
            ..ServerOptions::default()
        })
    }

    #[test]
    fn test_command_line_with_numeric_id() {
        let (id, cmd) = GtpServer::parse_id("123 name");
        assert_eq!(id, Some(123));
        assert_eq!(cmd, "name");
    }

    #[test]
    fn test_command_line_without_id() {
        let (id, cmd) = GtpServer::parse_id("name");
        assert_eq!(id, None);
        assert_eq!(cmd, "name");
    }

    #[test]
    fn test_vertices() {
        assert_eq!(parse_vertex("A1", 19), Some(Move::Play((0, 18))));
        assert_eq!(parse_vertex("j19", 19), Some(Move::Play((8, 0))));
        assert_eq!(parse_vertex("T19", 19), Some(Move::Play((18, 0))));
        assert_eq!(parse_vertex("PASS", 9), Some(Move::Pass));
        assert_eq!(parse_vertex("resign", 9), Some(Move::Resign));
        assert_eq!(parse_vertex("I5", 9), None);
        assert_eq!(parse_vertex("K5", 9), None);
        assert_eq!(parse_vertex("A10", 9), None);
        assert_eq!(format_vertex(Move::Play((8, 0)), 19), "J19");
        assert_eq!(format_vertex(Move::Play((3, 5)), 9), "D4");
        assert_eq!(format_vertex(Move::Pass, 9), "pass");
    }

    #[test]
    fn test_colors() {
        assert_eq!(parse_color("B"), Some(Color::Black));
        assert_eq!(parse_color("white"), Some(Color::White));
        assert_eq!(parse_color("red"), None);
        assert_eq!(color_name(Color::White), "white");
    }

    #[test]
    fn test_name_command() {
        let mut server = server();
        let (success, response) = server.execute("name", &[]);
        assert!(success);
        assert_eq!(response, "kifu");
    }

    #[test]
    fn test_known_command() {
        let mut server = server();
        assert_eq!(server.execute("known_command", &["gg-undo"]), (true, "true".to_string()));
        assert_eq!(server.execute("known_command", &["unknown_cmd"]), (true, "false".to_string()));
    }

    #[test]
    fn test_boardsize() {
        let mut server = server();
        assert!(server.execute("boardsize", &["9"]).0);
        assert_eq!(server.game().size(), 9);
        assert!(!server.execute("boardsize", &["3"]).0);
        assert!(!server.execute("boardsize", &["x"]).0);
    }

    #[test]
    fn test_play_undo_and_clear() {
        let mut server = server();
        server.execute("boardsize", &["9"]);
        assert!(server.execute("play", &["black", "D4"]).0);
        assert_eq!(server.game().board().get(3, 5), Intersection::Black);
        let (ok, message) = server.execute("play", &["white", "D4"]);
        assert!(!ok);
        assert!(message.contains("not empty"));

        assert!(server.execute("undo", &[]).0);
        assert!(!server.execute("undo", &[]).0);

        server.execute("play", &["b", "E5"]);
        assert!(server.execute("clear_board", &[]).0);
        assert_eq!(server.game().board().bounds(), None);
    }

    #[test]
    fn test_genmove_plays_legal_moves() {
        let mut server = server();
        server.execute("boardsize", &["5"]);
        for i in 0..10 {
            let color = if i % 2 == 0 { "black" } else { "white" };
            let (ok, vertex) = server.execute("genmove", &[color]);
            assert!(ok);
            assert!(parse_vertex(&vertex, 5).is_some());
        }
        assert_eq!(server.game().move_number(), 10);
        assert!(server.execute("gg-undo", &["4"]).0);
        assert_eq!(server.game().move_number(), 6);
        assert!(!server.execute("gg-undo", &["7"]).0);
    }

    #[test]
    fn test_fixed_handicap() {
        let mut server = server();
        server.execute("boardsize", &["9"]);
        let (ok, vertices) = server.execute("fixed_handicap", &["2"]);
        assert!(ok);
        assert_eq!(vertices, "G7 C3");
        let (ok, _) = server.execute("fixed_handicap", &["2"]);
        assert!(!ok);
    }

    #[test]
    fn test_set_free_handicap() {
        let mut server = server();
        server.execute("boardsize", &["9"]);
        assert!(!server.execute("set_free_handicap", &["E5"]).0);
        assert!(!server.execute("set_free_handicap", &["E5", "E5"]).0);
        assert!(!server.execute("set_free_handicap", &["E5", "Z1"]).0);

        assert!(server.execute("set_free_handicap", &["E5", "A1"]).0);
        let game = server.game();
        assert_eq!(game.board().get(4, 4), Intersection::Black);
        assert_eq!(game.board().get(0, 8), Intersection::Black);
        assert_eq!(game.info.handicap, 2);
        assert_eq!(game.next_player(), Color::White);
        assert!(!server.execute("set_free_handicap", &["C3", "G7"]).0);
    }

    #[test]
    fn test_final_score_and_status() {
        let mut server = server();
        server.execute("boardsize", &["5"]);
        server.execute("komi", &["0.5"]);
        for row in ["1", "2", "3", "4", "5"] {
            server.execute("play", &["black", &format!("B{row}")]);
        }
        let (ok, score) = server.execute("final_score", &[]);
        assert!(ok);
        assert_eq!(score, "B+19.5");
        let (_, territory) = server.execute("final_status_list", &["black_territory"]);
        assert_eq!(territory.split_whitespace().count(), 20);
    }

    #[test]
    fn test_run_loop_formats_responses() {
        let mut server = server();
        let input = b"1 name\nboardsize 9\n# comment\nfoo\nquit\nname\n";
        let mut output = Vec::new();
        server.run(&input[..], &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text, "\n=1 kifu\n\n\n= \n\n\n? unknown command: foo\n\n\n= \n\n");
    }

    #[test]
    fn test_crash_file_stops_without_answer() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = dir.path().join("transcript.txt");
        let crash = dir.path().join("crash");
        fs::write(&crash, "").unwrap();

        let mut server = GtpServer::with_options(ServerOptions {
            seed: Some(1),
            transcript: Some(transcript.clone()),
            crash_file: Some(crash.clone()),
        });
        let mut output = Vec::new();
        server.run(&b"name\nversion\n"[..], &mut output).unwrap();
        assert!(output.is_empty());
        assert!(!crash.exists());
        assert_eq!(fs::read_to_string(&transcript).unwrap(), "# start\nname\n");
    }
}
