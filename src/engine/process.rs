//! A spawned GTP engine and its background threads.

use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::launcher::LaunchConfig;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One GTP response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// `=` rather than `?`.
    pub success: bool,
    pub id: Option<u32>,
    /// Text after the status character and id, followed by the body lines.
    pub text: String,
}

impl Response {
    /// Parses a status line such as `=12 D4` or `? illegal move`.
    fn from_status_line(line: &str) -> Option<Response> {
        let success = match line.chars().next()? {
            '=' => true,
            '?' => false,
            _ => return None,
        };
        let rest = &line[1..];
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let id = rest[..digits].parse().ok();
        Some(Response {
            success,
            id,
            text: rest[digits..].trim().to_string(),
        })
    }
}

/// A running engine: its command pipes, an exit watcher and a stderr drainer.
///
/// Both threads are stopped and joined when the process is shut down or
/// dropped.
pub struct EngineProcess {
    child: Arc<Mutex<Child>>,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stopping: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
    watcher: Option<JoinHandle<()>>,
    drainer: Option<JoinHandle<()>>,
}

fn lock(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EngineProcess {
    /// Starts the engine. `on_exit` runs on the watcher thread if the process
    /// ends by itself.
    pub fn spawn<F>(config: &LaunchConfig, on_exit: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        info!(program = %config.program.display(), pid = child.id(), "engine started");

        let missing = |name: &str| io::Error::other(format!("engine {name} not captured"));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let drainer = thread::Builder::new()
            .name("engine-stderr".to_owned())
            .spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(line) => trace!(target: "kifu::engine::stderr", "{line}"),
                        Err(_) => break,
                    }
                }
            })?;

        let child = Arc::new(Mutex::new(child));
        let stopping = Arc::new(AtomicBool::new(false));
        let exited = Arc::new(AtomicBool::new(false));

        let watcher = {
            let child = Arc::clone(&child);
            let stopping = Arc::clone(&stopping);
            let exited = Arc::clone(&exited);
            thread::Builder::new()
                .name("engine-watcher".to_owned())
                .spawn(move || {
                    while !stopping.load(Ordering::Acquire) {
                        let status = lock(&child).try_wait();
                        match status {
                            Ok(Some(status)) => {
                                exited.store(true, Ordering::Release);
                                if !stopping.load(Ordering::Acquire) {
                                    warn!(%status, "engine exited");
                                    on_exit();
                                }
                                return;
                            }
                            Ok(None) => thread::sleep(EXIT_POLL_INTERVAL),
                            Err(e) => {
                                warn!(error = %e, "cannot watch engine process");
                                return;
                            }
                        }
                    }
                })?
        };

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stopping,
            exited,
            watcher: Some(watcher),
            drainer: Some(drainer),
        })
    }

    pub fn id(&self) -> u32 {
        lock(&self.child).id()
    }

    /// True once the watcher has seen the process end.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Writes one command line.
    pub fn send_line(&mut self, line: &str) -> io::Result<()> {
        debug!(command = line, "send");
        writeln!(self.stdin, "{line}")?;
        self.stdin.flush()
    }

    /// Reads the next response. Lines before the status line are skipped;
    /// the non-empty lines after it up to a blank line form the body.
    pub fn read_response(&mut self) -> io::Result<Response> {
        let mut response = loop {
            let line = self.read_line()?.ok_or_else(closed)?;
            if let Some(response) = Response::from_status_line(&line) {
                break response;
            }
            trace!(line = %line, "skipped engine output");
        };

        while let Some(line) = self.read_line()? {
            if line.trim().is_empty() {
                break;
            }
            if !response.text.is_empty() {
                response.text.push('\n');
            }
            response.text.push_str(&line);
        }
        debug!(success = response.success, text = %response.text, "recv");
        Ok(response)
    }

    /// Writes a command and waits for its response.
    pub fn exchange(&mut self, command: &str) -> io::Result<Response> {
        self.send_line(command)?;
        self.read_response()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Kills the process without stopping the background threads, as a
    /// crash would.
    pub fn kill(&self) -> io::Result<()> {
        lock(&self.child).kill()
    }

    /// Kills the process and joins both background threads.
    pub fn shutdown(&mut self) {
        self.stopping.store(true, Ordering::Release);
        {
            let mut child = lock(&self.child);
            if let Err(e) = child.kill() {
                debug!(error = %e, "engine already stopped");
            }
            let _ = child.wait();
        }
        for handle in [self.watcher.take(), self.drainer.take()].into_iter().flatten() {
            let _ = handle.join();
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "engine closed its output")
}
