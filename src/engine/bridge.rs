//! Playing a [`GameTree`] against an external GTP engine.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, instrument, warn};

use super::launcher::EngineLauncher;
use super::process::{EngineProcess, Response};
use crate::board::{Color, Intersection, Point};
use crate::constants::{DEFAULT_RULES, MAX_BOARD_SIZE, MAX_HANDICAP, MIN_BOARD_SIZE};
use crate::error::EngineError;
use crate::game::GameTree;
use crate::gtp::{color_name, format_point, format_vertex, parse_vertex};
use crate::info::GameResult;
use crate::tree::Move;

/// Lifecycle of the engine process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Running,
    /// The process died or its pipes failed; the next command respawns it.
    Crashed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::NotStarted => "not started",
            EngineState::Running => "running",
            EngineState::Crashed => "crashed",
        };
        f.write_str(name)
    }
}

/// Dead stones and territory as reported by the engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FinalStatus {
    pub dead: Vec<Point>,
    pub black_territory: Vec<Point>,
    pub white_territory: Vec<Point>,
}

/// Owns an engine process and the game it is playing.
///
/// Only one command is in flight at a time. When the process fails, the
/// bridge restarts it once, replays the game up to the cursor and resends
/// the command.
pub struct EngineBridge {
    launcher: Box<dyn EngineLauncher>,
    process: Option<EngineProcess>,
    state: Arc<Mutex<EngineState>>,
    game: GameTree,
    bot_color: Color,
    respawns: usize,
}

impl EngineBridge {
    pub fn new(launcher: impl EngineLauncher + 'static) -> Self {
        Self::with_launcher(Box::new(launcher))
    }

    pub fn with_launcher(launcher: Box<dyn EngineLauncher>) -> Self {
        Self {
            launcher,
            process: None,
            state: Arc::new(Mutex::new(EngineState::NotStarted)),
            game: GameTree::default(),
            bot_color: Color::White,
            respawns: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.launcher.name()
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn game(&self) -> &GameTree {
        &self.game
    }

    /// Direct access to the game. Changes are not sent to the engine.
    pub fn game_mut(&mut self) -> &mut GameTree {
        &mut self.game
    }

    pub fn into_game(self) -> GameTree {
        let mut bridge = self;
        std::mem::take(&mut bridge.game)
    }

    pub fn process(&self) -> Option<&EngineProcess> {
        self.process.as_ref()
    }

    /// How many times the engine has been restarted after a failure.
    pub fn respawn_count(&self) -> usize {
        self.respawns
    }

    pub fn bot_color(&self) -> Color {
        self.bot_color
    }

    pub fn is_bot_turn(&self) -> bool {
        self.game.next_player() == self.bot_color
    }

    pub fn switch_colors(&mut self) {
        self.bot_color = self.bot_color.opponent();
    }

    // =========================================================================
    // Process control
    // =========================================================================

    fn spawn_process(&self) -> std::io::Result<EngineProcess> {
        let config = self.launcher.launch_config(self.game.size());
        let state = Arc::clone(&self.state);
        EngineProcess::spawn(&config, move || {
            *state.lock().unwrap_or_else(PoisonError::into_inner) = EngineState::Crashed;
        })
    }

    /// Starts the engine if it is not running yet.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.process.is_some() && self.state() == EngineState::Running {
            return Ok(());
        }
        if let Some(mut old) = self.process.take() {
            old.shutdown();
        }
        let process = self.spawn_process().map_err(EngineError::Io)?;
        self.process = Some(process);
        self.set_state(EngineState::Running);
        info!(engine = self.launcher.name(), "engine running");
        Ok(())
    }

    /// Stops the engine process.
    pub fn shutdown(&mut self) {
        if let Some(mut process) = self.process.take() {
            if self.state() == EngineState::Running {
                let _ = process.send_line("quit");
            }
            process.shutdown();
        }
        self.set_state(EngineState::NotStarted);
    }

    /// Sends one command and returns the response, whether `=` or `?`.
    ///
    /// A read or write failure restarts the engine once, replays the game
    /// and resends the command. If that fails too the error is returned.
    #[instrument(skip(self), fields(engine = self.launcher.name()))]
    pub fn send_command(&mut self, command: &str) -> Result<Response, EngineError> {
        if self.state() == EngineState::Running {
            let process = self.process.as_mut().ok_or(EngineError::NotStarted)?;
            match process.exchange(command) {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(error = %e, "engine failed");
                    self.set_state(EngineState::Crashed);
                }
            }
        }
        match self.state() {
            EngineState::NotStarted => Err(EngineError::NotStarted),
            _ => {
                self.respawn()?;
                let process = self.process.as_mut().ok_or(EngineError::NotStarted)?;
                process.exchange(command).map_err(|e| {
                    self.set_state(EngineState::Crashed);
                    EngineError::Io(e)
                })
            }
        }
    }

    /// Sends a command that must succeed and returns the response text.
    pub fn command(&mut self, command: &str) -> Result<String, EngineError> {
        let response = self.send_command(command)?;
        if response.success {
            Ok(response.text)
        } else {
            Err(EngineError::Rejected {
                command: command.to_string(),
                response: response.text,
            })
        }
    }

    fn respawn(&mut self) -> Result<(), EngineError> {
        if let Some(mut old) = self.process.take() {
            old.shutdown();
        }
        self.respawns += 1;
        info!(respawns = self.respawns, "restarting engine");

        let mut process = self.spawn_process().map_err(|e| EngineError::Respawn {
            message: "cannot start engine".to_string(),
            source: Some(e),
        })?;
        for command in self.replay_commands() {
            let response = process.exchange(&command).map_err(|e| EngineError::Respawn {
                message: format!("engine failed while replaying '{command}'"),
                source: Some(e),
            })?;
            if !response.success {
                return Err(EngineError::Respawn {
                    message: format!("engine rejected '{command}' while replaying: {}", response.text),
                    source: None,
                });
            }
        }
        self.process = Some(process);
        self.set_state(EngineState::Running);
        Ok(())
    }

    /// Commands that bring a fresh engine to the position under the cursor.
    pub fn replay_commands(&self) -> Vec<String> {
        let mut commands = vec![
            format!("boardsize {}", self.game.size()),
            format!("komi {}", self.game.info.komi),
        ];
        commands.extend(self.setup_commands());
        commands.extend(self.move_commands());
        commands
    }

    /// Commands that put the root position on an empty engine board.
    ///
    /// Black stones matching the recorded handicap are sent as
    /// `set_free_handicap`; any other setup stone is played, Black first.
    fn setup_commands(&self) -> Vec<String> {
        let size = self.game.size();
        let board = self.game.initial_board();
        let (mut black, mut white) = (Vec::new(), Vec::new());
        for y in 0..size {
            for x in 0..size {
                match board.get(x, y).color() {
                    Some(Color::Black) => black.push(format_point((x, y), size)),
                    Some(Color::White) => white.push(format_point((x, y), size)),
                    None => {}
                }
            }
        }

        if white.is_empty() && black.len() >= 2 && black.len() == self.game.info.handicap {
            return vec![format!("set_free_handicap {}", black.join(" "))];
        }
        let black = black.into_iter().map(|v| format!("play black {v}"));
        let white = white.into_iter().map(|v| format!("play white {v}"));
        black.chain(white).collect()
    }

    fn move_commands(&self) -> Vec<String> {
        let size = self.game.size();
        self.game
            .moves_to_current()
            .into_iter()
            .filter(|(_, mv)| *mv != Move::Resign)
            .map(|(color, mv)| format!("play {} {}", color_name(color), format_vertex(mv, size)))
            .collect()
    }

    // =========================================================================
    // Game operations
    // =========================================================================

    /// Starts a new game in which the human plays `player_color`.
    pub fn new_game(
        &mut self,
        size: usize,
        player_color: Color,
        komi: f64,
        handicap: usize,
    ) -> Result<(), EngineError> {
        if !(MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&size) {
            return Err(EngineError::InvalidArgument(format!("board size {size}")));
        }
        if handicap == 1 || handicap > MAX_HANDICAP {
            return Err(EngineError::InvalidArgument(format!("handicap {handicap}")));
        }
        self.game = GameTree::new(size, komi, 0, DEFAULT_RULES);
        self.bot_color = player_color.opponent();
        self.start()?;

        self.command(&format!("boardsize {size}"))?;
        self.command(&format!("komi {komi}"))?;
        self.command("clear_board")?;

        let mut handicap = handicap;
        while handicap >= 2 {
            let response = self.send_command(&format!("fixed_handicap {handicap}"))?;
            if response.success {
                self.place_handicap_stones(&response.text, handicap)?;
                break;
            }
            debug!(handicap, "handicap refused, trying fewer stones");
            handicap -= 1;
        }
        Ok(())
    }

    fn place_handicap_stones(&mut self, vertices: &str, handicap: usize) -> Result<(), EngineError> {
        let points = self.parse_points("fixed_handicap", vertices)?;
        for (x, y) in points {
            self.game.add_stone(x, y, Some(Color::Black));
        }
        self.game.info.handicap = handicap;
        self.game.set_next_player(Color::White);
        Ok(())
    }

    /// Continues an existing game: the engine is reset and given the root
    /// position and every move of the main line, and the cursor moves to
    /// its end.
    pub fn new_game_from(&mut self, game: GameTree) -> Result<(), EngineError> {
        self.game = game;
        self.game.goto_first_move();
        if let Some(&last) = self.game.tree().main_line().last() {
            self.game.goto_node(last);
        }
        self.start()?;

        self.command(&format!("boardsize {}", self.game.size()))?;
        self.command(&format!("komi {}", self.game.info.komi))?;
        self.command("clear_board")?;
        for command in self.setup_commands().into_iter().chain(self.move_commands()) {
            self.command(&command)?;
        }
        Ok(())
    }

    /// Plays a move for `color`. Returns false for a move the rules reject;
    /// such a move is not sent.
    pub fn play(&mut self, mv: Move, color: Color) -> Result<bool, EngineError> {
        match mv {
            Move::Resign => {
                self.game.resign(color);
                return Ok(true);
            }
            Move::Play((x, y)) if self.game.check_move(x, y, color).is_err() => return Ok(false),
            _ => {}
        }
        let vertex = format_vertex(mv, self.game.size());
        self.command(&format!("play {} {vertex}", color_name(color)))?;
        self.game.place_move(mv, color);
        Ok(true)
    }

    /// Asks the engine for its move and plays it.
    pub fn gen_move(&mut self) -> Result<Move, EngineError> {
        let color = self.bot_color;
        let command = format!("genmove {}", color_name(color));
        let text = self.command(&command)?;
        let mv = parse_vertex(&text, self.game.size()).ok_or_else(|| EngineError::InvalidResponse {
            command,
            response: text.clone(),
        })?;
        match mv {
            Move::Resign => self.game.resign(color),
            _ => self.game.place_move(mv, color),
        }
        Ok(mv)
    }

    /// Takes back the last move, and the bot's reply before it when the
    /// human is to move. Returns the number of moves taken back.
    pub fn undo(&mut self) -> Result<usize, EngineError> {
        let wanted = if self.is_bot_turn() { 1 } else { 2 };
        let count = wanted.min(self.game.move_number());
        if count == 0 {
            return Ok(0);
        }
        let response = self.send_command(&format!("gg-undo {count}"))?;
        if !response.success {
            for _ in 0..count {
                self.command("undo")?;
            }
        }
        for _ in 0..count {
            self.game.undo(true);
        }
        Ok(count)
    }

    /// Sets the playing level. Returns whether the engine accepted it.
    pub fn set_level(&mut self, level: u32) -> Result<bool, EngineError> {
        self.launcher.set_level(level);
        Ok(self.send_command(&format!("level {level}"))?.success)
    }

    /// Asks which stones are dead and what is territory, and records the
    /// answer on the game's final status board.
    pub fn ask_final_status(&mut self) -> Result<FinalStatus, EngineError> {
        let mut status = FinalStatus::default();
        for (kind, list) in [
            ("dead", &mut status.dead),
            ("black_territory", &mut status.black_territory),
            ("white_territory", &mut status.white_territory),
        ] {
            let command = format!("final_status_list {kind}");
            let text = self.command(&command)?;
            *list = self.parse_points(&command, &text)?;
        }

        self.game.reset_final_status();
        for &(x, y) in &status.dead {
            let dead = match self.game.board().get(x, y) {
                Intersection::Black => Intersection::DeadBlack,
                Intersection::White => Intersection::DeadWhite,
                _ => continue,
            };
            self.game.set_final_status(x, y, dead);
        }
        for &(x, y) in &status.black_territory {
            self.game.set_final_status(x, y, Intersection::BlackTerritory);
        }
        for &(x, y) in &status.white_territory {
            self.game.set_final_status(x, y, Intersection::WhiteTerritory);
        }
        Ok(status)
    }

    /// Asks the engine for the score and stores it as the game result.
    pub fn compute_final_score(&mut self) -> Result<GameResult, EngineError> {
        let text = self.command("final_score")?;
        let result = GameResult::parse(&text).ok_or_else(|| EngineError::InvalidResponse {
            command: "final_score".to_string(),
            response: text.clone(),
        })?;
        self.game.info.result = Some(result);
        Ok(result)
    }

    /// The engine's own drawing of the board.
    pub fn ascii_board(&mut self) -> Result<String, EngineError> {
        self.command("showboard")
    }

    fn parse_points(&self, command: &str, text: &str) -> Result<Vec<Point>, EngineError> {
        let size = self.game.size();
        text.split_whitespace()
            .map(|vertex| match parse_vertex(vertex, size) {
                Some(Move::Play(point)) => Ok(point),
                _ => Err(EngineError::InvalidResponse {
                    command: command.to_string(),
                    response: text.to_string(),
                }),
            })
            .collect()
    }
}

impl Drop for EngineBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::launcher::{ExternalEngine, LaunchConfig};

    fn bridge() -> EngineBridge {
        EngineBridge::new(ExternalEngine::new(
            "missing",
            LaunchConfig::new("/nonexistent/kifu-engine", Vec::<String>::new()),
        ))
    }

    #[test]
    fn test_commands_need_a_started_engine() {
        let mut bridge = bridge();
        assert_eq!(bridge.state(), EngineState::NotStarted);
        assert!(matches!(bridge.send_command("name"), Err(EngineError::NotStarted)));
        assert!(matches!(bridge.start(), Err(EngineError::Io(_))));
        assert_eq!(bridge.state(), EngineState::NotStarted);
    }

    #[test]
    fn test_new_game_validates_arguments() {
        let mut bridge = bridge();
        assert!(matches!(
            bridge.new_game(3, Color::Black, 6.5, 0),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(matches!(
            bridge.new_game(9, Color::Black, 6.5, 1),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(matches!(
            bridge.new_game(19, Color::Black, 6.5, 10),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_replay_commands() {
        let mut bridge = bridge();
        let game = bridge.game_mut();
        *game = GameTree::new(9, 6.5, 0, DEFAULT_RULES);
        game.place_handicap(2);
        game.play(4, 4);
        game.pass();
        game.play(2, 2);
        game.undo(false);

        assert_eq!(
            bridge.replay_commands(),
            vec![
                "boardsize 9",
                "komi 6.5",
                "set_free_handicap G7 C3",
                "play white E5",
                "play black pass",
            ]
        );
    }

    #[test]
    fn test_replay_sends_setup_stones() {
        let mut bridge = bridge();
        let game = bridge.game_mut();
        *game = GameTree::new(9, 6.5, 2, "Chinese");
        assert!(bridge.replay_commands().iter().all(|c| !c.contains("handicap")));

        let game = bridge.game_mut();
        game.add_stone(2, 2, Some(Color::White));
        game.add_stone(6, 6, Some(Color::Black));
        game.play(4, 4);
        assert_eq!(
            bridge.replay_commands(),
            vec!["boardsize 9", "komi 6.5", "play black G3", "play white C7", "play black E5"]
        );

        // Handicap stones next to other setup stones are played one by one
        let game = bridge.game_mut();
        *game = GameTree::new(9, 6.5, 2, "Japanese");
        game.add_stone(0, 0, Some(Color::White));
        assert_eq!(
            bridge.replay_commands(),
            vec!["boardsize 9", "komi 6.5", "play black G7", "play black C3", "play white A9"]
        );
    }

    #[test]
    fn test_turns_and_colors() {
        let mut bridge = bridge();
        assert_eq!(bridge.bot_color(), Color::White);
        assert!(!bridge.is_bot_turn());
        bridge.switch_colors();
        assert!(bridge.is_bot_turn());
    }
}
