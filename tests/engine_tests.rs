//! Engine bridge tests against the crate's own GTP server.
//!
//! The server is started as `kifu gtp` with a transcript file, which records
//! every command it receives, and a crash file: creating that file makes the
//! server exit on the next command without answering.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

use kifu::board::Color;
use kifu::engine::{
    EngineBridge, EngineLauncher, EngineState, EngineWorker, ExternalEngine, LaunchConfig,
};
use kifu::error::EngineError;
use kifu::game::GameTree;
use kifu::gtp::TRANSCRIPT_START;
use kifu::sgf;
use kifu::tree::Move;
use tempfile::TempDir;

// =============================================================================
// Helper functions
// =============================================================================

struct Harness {
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn transcript(&self) -> PathBuf {
        self.dir.path().join("transcript.txt")
    }

    fn crash_file(&self) -> PathBuf {
        self.dir.path().join("crash")
    }

    fn launch_config(&self) -> LaunchConfig {
        server_config(&self.transcript(), &self.crash_file())
    }

    fn bridge(&self) -> EngineBridge {
        EngineBridge::new(ExternalEngine::new("kifu", self.launch_config()))
    }

    fn crash_on_next_command(&self) {
        fs::write(self.crash_file(), "").unwrap();
    }

    /// Commands received by each server process, in order.
    fn sessions(&self) -> Vec<Vec<String>> {
        let text = fs::read_to_string(self.transcript()).unwrap();
        let mut sessions: Vec<Vec<String>> = Vec::new();
        for line in text.lines() {
            if line == TRANSCRIPT_START {
                sessions.push(Vec::new());
            } else if let Some(session) = sessions.last_mut() {
                session.push(line.to_string());
            }
        }
        sessions
    }
}

fn server_config(transcript: &Path, crash_file: &Path) -> LaunchConfig {
    LaunchConfig::new(
        env!("CARGO_BIN_EXE_kifu"),
        [
            "gtp".to_string(),
            "--seed".to_string(),
            "11".to_string(),
            "--transcript".to_string(),
            transcript.display().to_string(),
            "--crash-file".to_string(),
            crash_file.display().to_string(),
        ],
    )
}

/// First legal point for `color`, scanning row by row.
fn first_legal(game: &mut GameTree, color: Color) -> Move {
    let size = game.size();
    for y in 0..size {
        for x in 0..size {
            if game.is_legal(x, y, color) {
                return Move::Play((x, y));
            }
        }
    }
    Move::Pass
}

fn human_move(bridge: &mut EngineBridge, color: Color) -> Move {
    let mv = first_legal(bridge.game_mut(), color);
    assert!(bridge.play(mv, color).unwrap(), "{mv:?} should be legal");
    mv
}

fn play_command(color: &str, mv: Move, size: usize) -> String {
    format!("play {color} {}", kifu::gtp::format_vertex(mv, size))
}

/// The engine's board must match the local one, character for character.
fn assert_same_board(bridge: &mut EngineBridge) {
    let local = bridge.game().board().to_string();
    assert_eq!(bridge.ascii_board().unwrap(), local.trim_end());
}

// =============================================================================
// Crash recovery
// =============================================================================

#[test]
fn test_crash_respawns_once_and_replays_history() {
    let harness = Harness::new();
    let mut bridge = harness.bridge();

    bridge.new_game(9, Color::Black, 6.5, 2).unwrap();
    assert_eq!(bridge.state(), EngineState::Running);
    assert_eq!(bridge.game().info.handicap, 2);
    assert!(bridge.is_bot_turn(), "White moves first after a handicap");

    let white1 = bridge.gen_move().unwrap();
    let black1 = human_move(&mut bridge, Color::Black);
    let white2 = bridge.gen_move().unwrap();

    harness.crash_on_next_command();
    let black2 = human_move(&mut bridge, Color::Black);

    assert_eq!(bridge.respawn_count(), 1);
    assert_eq!(bridge.state(), EngineState::Running);
    assert_eq!(bridge.game().move_number(), 4);

    let sessions = harness.sessions();
    assert_eq!(sessions.len(), 2, "exactly one respawn");
    assert_eq!(
        sessions[0].last(),
        Some(&play_command("black", black2, 9)),
        "the first process received the command it died on"
    );
    assert_eq!(
        sessions[1],
        vec![
            "boardsize 9".to_string(),
            "komi 6.5".to_string(),
            "set_free_handicap G7 C3".to_string(),
            play_command("white", white1, 9),
            play_command("black", black1, 9),
            play_command("white", white2, 9),
            play_command("black", black2, 9),
        ]
    );

    // The new process carries on with the game
    bridge.gen_move().unwrap();
    assert_eq!(bridge.respawn_count(), 1);
}

#[test]
fn test_killed_engine_is_restarted() {
    let harness = Harness::new();
    let mut bridge = harness.bridge();
    bridge.new_game(7, Color::White, 0.5, 0).unwrap();

    let black1 = bridge.gen_move().unwrap();
    bridge.process().unwrap().kill().unwrap();

    let white1 = human_move(&mut bridge, Color::White);
    assert_eq!(bridge.respawn_count(), 1);
    assert_eq!(
        harness.sessions()[1],
        vec![
            "boardsize 7".to_string(),
            "komi 0.5".to_string(),
            play_command("black", black1, 7),
            play_command("white", white1, 7),
        ]
    );
}

/// Starts the real server once, then a program that does not exist.
struct FailingRespawn {
    first: LaunchConfig,
    launches: Cell<usize>,
}

impl EngineLauncher for FailingRespawn {
    fn name(&self) -> &str {
        "failing"
    }

    fn launch_config(&self, _board_size: usize) -> LaunchConfig {
        self.launches.set(self.launches.get() + 1);
        if self.launches.get() == 1 {
            self.first.clone()
        } else {
            LaunchConfig::new("/nonexistent/kifu-engine", Vec::<String>::new())
        }
    }
}

#[test]
fn test_failed_respawn_is_reported() {
    let harness = Harness::new();
    let mut bridge = EngineBridge::new(FailingRespawn {
        first: harness.launch_config(),
        launches: Cell::new(0),
    });
    bridge.new_game(9, Color::Black, 6.5, 0).unwrap();

    harness.crash_on_next_command();
    let err = bridge.send_command("name").unwrap_err();
    assert!(matches!(err, EngineError::Respawn { .. }), "got {err:?}");
    assert_eq!(bridge.state(), EngineState::Crashed);
    assert_eq!(bridge.respawn_count(), 1);
}

// =============================================================================
// Game operations
// =============================================================================

#[test]
fn test_rejected_commands_and_fallbacks() {
    let harness = Harness::new();
    let mut bridge = harness.bridge();
    bridge.new_game(9, Color::Black, 6.5, 0).unwrap();

    let response = bridge.send_command("frobnicate").unwrap();
    assert!(!response.success);
    assert!(matches!(
        bridge.command("frobnicate"),
        Err(EngineError::Rejected { .. })
    ));

    // An illegal move is refused locally and never sent
    let black = human_move(&mut bridge, Color::Black);
    assert!(!bridge.play(black, Color::White).unwrap());

    bridge.gen_move().unwrap();
    assert_eq!(bridge.undo().unwrap(), 2, "the bot's reply is taken back too");
    assert_eq!(bridge.game().move_number(), 0);
    assert!(harness.sessions()[0].contains(&"gg-undo 2".to_string()));

    assert!(bridge.set_level(3).unwrap());
    assert_eq!(bridge.name(), "kifu");
}

#[test]
fn test_scoring_through_the_engine() {
    let harness = Harness::new();
    let mut bridge = harness.bridge();
    bridge.new_game(5, Color::Black, 0.5, 0).unwrap();

    // Black walls off the left column pair
    for vertex in ["C1", "C2", "C3", "C4", "C5"] {
        let Some(mv) = kifu::gtp::parse_vertex(vertex, 5) else {
            panic!("bad vertex {vertex}");
        };
        assert!(bridge.play(mv, Color::Black).unwrap());
        bridge.play(Move::Pass, Color::White).unwrap();
    }

    let status = bridge.ask_final_status().unwrap();
    assert!(status.dead.is_empty());
    assert_eq!(status.black_territory.len(), 20);
    assert!(status.white_territory.is_empty());

    let result = bridge.compute_final_score().unwrap();
    assert_eq!(result.to_string(), "B+19.5");
    assert_eq!(bridge.game().info.result, Some(result));

    let board = bridge.ascii_board().unwrap();
    assert_eq!(board.lines().count(), 5);
}

#[test]
fn test_free_handicap_game_gets_no_fixed_stones() {
    let harness = Harness::new();
    let game = GameTree::new(9, 6.5, 2, "Chinese");
    assert_eq!(game.info.handicap, 0);

    let mut bridge = harness.bridge();
    bridge.new_game_from(game).unwrap();
    assert_same_board(&mut bridge);

    harness.crash_on_next_command();
    let black = human_move(&mut bridge, Color::Black);
    assert_same_board(&mut bridge);
    assert_eq!(
        harness.sessions()[1],
        vec![
            "boardsize 9".to_string(),
            "komi 6.5".to_string(),
            play_command("black", black, 9),
            "showboard".to_string(),
        ]
    );
}

#[test]
fn test_setup_stones_reach_the_engine() {
    let harness = Harness::new();
    let mut games = sgf::parse("(;SZ[9]KM[6.5]AB[cc][dd]AW[ee];W[ff];B[gg])").unwrap();
    let mut bridge = harness.bridge();
    bridge.new_game_from(games.remove(0)).unwrap();
    assert_eq!(bridge.game().move_number(), 2);

    let setup_and_moves = [
        "play black C7",
        "play black D6",
        "play white E5",
        "play white F4",
        "play black G3",
    ];
    let mut expected = vec!["boardsize 9", "komi 6.5", "clear_board"];
    expected.extend(setup_and_moves);
    assert_eq!(harness.sessions()[0], expected);
    assert_same_board(&mut bridge);

    // A crash replays the same position
    harness.crash_on_next_command();
    assert_same_board(&mut bridge);
    let mut expected = vec!["boardsize 9", "komi 6.5"];
    expected.extend(setup_and_moves);
    expected.push("showboard");
    assert_eq!(harness.sessions()[1], expected);
}

#[test]
fn test_new_game_from_existing_tree() {
    let harness = Harness::new();
    let mut game = GameTree::new(9, 7.5, 0, "Japanese");
    game.play(4, 4);
    game.play(2, 2);
    game.undo(false);
    game.play(6, 6);
    game.goto_first_move();

    let mut bridge = harness.bridge();
    bridge.new_game_from(game).unwrap();
    assert_eq!(bridge.game().move_number(), 2);
    assert_eq!(
        harness.sessions()[0],
        vec!["boardsize 9", "komi 7.5", "clear_board", "play black E5", "play white C7"]
    );
}

#[test]
fn test_worker_runs_requests_in_order() {
    let harness = Harness::new();
    let mut bridge = harness.bridge();
    bridge.new_game(9, Color::Black, 6.5, 0).unwrap();
    bridge.switch_colors();

    let worker = EngineWorker::start(bridge).unwrap();
    let human = worker.play(Move::Play((0, 0)), Color::White);
    let first = worker.gen_move();
    let undone = worker.undo();
    let after_undo = worker.game();
    let colors = worker.switch_colors();
    let second = worker.gen_move();
    let name = worker.command("name");
    let score = worker.final_score();

    assert!(human.wait().unwrap());
    assert!(matches!(first.wait().unwrap(), Move::Play(_)));
    assert_eq!(undone.wait().unwrap(), 2, "the human move and the reply");
    assert_eq!(after_undo.wait().unwrap().move_number(), 0);
    assert_eq!(colors.wait().unwrap(), Color::White);
    assert!(matches!(second.wait().unwrap(), Move::Play(_)));
    assert_eq!(name.wait().unwrap(), "kifu");
    assert!(score.wait().is_ok());

    let bridge = worker.shutdown().unwrap();
    assert_eq!(bridge.game().move_number(), 1);
    let session = &harness.sessions()[0];
    let tail: Vec<&str> = session[session.len() - 6..].iter().map(String::as_str).collect();
    assert_eq!(
        tail,
        vec!["play white A9", "genmove black", "gg-undo 2", "genmove white", "name", "final_score"]
    );
}
