//! A dedicated thread that owns an [`EngineBridge`] and runs its commands
//! in the order they were submitted.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use super::bridge::EngineBridge;
use crate::board::Color;
use crate::error::EngineError;
use crate::game::GameTree;
use crate::info::GameResult;
use crate::tree::Move;

type Reply<T> = Sender<Result<T, EngineError>>;

enum Request {
    Play(Move, Color, Reply<bool>),
    GenMove(Reply<Move>),
    Undo(Reply<usize>),
    Game(Reply<GameTree>),
    FinalScore(Reply<GameResult>),
    SwitchColors(Reply<Color>),
    Command(String, Reply<String>),
    Shutdown,
}

/// The answer to a submitted request. Dropping it leaves the request to
/// run; only the result is discarded.
#[derive(Debug)]
pub struct Pending<T> {
    receiver: Receiver<Result<T, EngineError>>,
}

impl<T> Pending<T> {
    /// Blocks until the worker has run the request.
    pub fn wait(self) -> Result<T, EngineError> {
        self.receiver.recv().map_err(|_| EngineError::WorkerStopped)?
    }

    /// The result if the request has already run.
    pub fn try_wait(&self) -> Option<Result<T, EngineError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(EngineError::WorkerStopped)),
        }
    }
}

/// Handle to the worker thread. Dropping it stops the thread and hands
/// nothing back; use [`EngineWorker::shutdown`] to get the bridge back.
pub struct EngineWorker {
    sender: Sender<Request>,
    handle: Option<JoinHandle<EngineBridge>>,
}

impl EngineWorker {
    pub fn start(bridge: EngineBridge) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("engine-worker".to_owned())
            .spawn(move || run(bridge, receiver))?;
        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    fn submit<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Pending<T> {
        let (reply, receiver) = mpsc::channel();
        // A stopped worker drops the reply sender, which `wait` reports
        let _ = self.sender.send(make(reply));
        Pending { receiver }
    }

    /// Plays a human move; resolves to false if the rules reject it.
    pub fn play(&self, mv: Move, color: Color) -> Pending<bool> {
        self.submit(|reply| Request::Play(mv, color, reply))
    }

    /// Asks the engine for its move and plays it on the bridge's game.
    pub fn gen_move(&self) -> Pending<Move> {
        self.submit(Request::GenMove)
    }

    /// Takes back the last human move and the bot's reply to it.
    pub fn undo(&self) -> Pending<usize> {
        self.submit(Request::Undo)
    }

    /// A copy of the game as it stands once the queued requests have run.
    pub fn game(&self) -> Pending<GameTree> {
        self.submit(Request::Game)
    }

    pub fn final_score(&self) -> Pending<GameResult> {
        self.submit(Request::FinalScore)
    }

    /// Hands the other color to the engine; resolves to its new color.
    pub fn switch_colors(&self) -> Pending<Color> {
        self.submit(Request::SwitchColors)
    }

    /// Sends a raw command that must succeed.
    pub fn command(&self, command: impl Into<String>) -> Pending<String> {
        let command = command.into();
        self.submit(|reply| Request::Command(command, reply))
    }

    /// Finishes the queued requests, stops the thread and returns the bridge.
    pub fn shutdown(mut self) -> Option<EngineBridge> {
        self.stop()
    }

    fn stop(&mut self) -> Option<EngineBridge> {
        let handle = self.handle.take()?;
        let _ = self.sender.send(Request::Shutdown);
        handle.join().ok()
    }
}

impl Drop for EngineWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(mut bridge: EngineBridge, requests: Receiver<Request>) -> EngineBridge {
    info!(engine = bridge.name(), "engine worker started");
    for request in requests {
        match request {
            Request::Play(mv, color, reply) => {
                let _ = reply.send(bridge.play(mv, color));
            }
            Request::GenMove(reply) => {
                let _ = reply.send(bridge.gen_move());
            }
            Request::Undo(reply) => {
                let _ = reply.send(bridge.undo());
            }
            Request::Game(reply) => {
                let _ = reply.send(Ok(bridge.game().clone()));
            }
            Request::FinalScore(reply) => {
                let _ = reply.send(bridge.compute_final_score());
            }
            Request::SwitchColors(reply) => {
                bridge.switch_colors();
                let _ = reply.send(Ok(bridge.bot_color()));
            }
            Request::Command(command, reply) => {
                debug!(command = %command, "worker command");
                let _ = reply.send(bridge.command(&command));
            }
            Request::Shutdown => break,
        }
    }
    info!("engine worker stopped");
    bridge
}
