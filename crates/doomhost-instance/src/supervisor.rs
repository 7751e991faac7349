//! Process supervisor: one Tokio task per hosted engine process.
//!
//! The supervisor owns the child process. It reads the merged stdout and
//! stderr line by line, flips the instance to `Running` when the ready
//! marker shows up, and cleans up after the process exits or is killed.
//! Everyone else talks to it through a cloneable [`ServerHandle`].

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use doomhost_protocol::ServerId;
use doomhost_session::AccountStore;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};

use crate::{CloseReason, HostRequest, InstanceError, LifecycleState, ServerRegistry};

/// Buffered output lines between the pipe readers and the supervisor.
const LINE_CHANNEL_SIZE: usize = 256;

/// How long to keep reading output after the process has exited. A
/// grandchild may hold the pipes open indefinitely.
const LINE_DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Lifecycle snapshot published by a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceStatus {
    pub state: LifecycleState,
    /// Set once the ready marker was seen, and never cleared.
    pub started: bool,
    /// Set together with [`LifecycleState::Closed`].
    pub reason: Option<CloseReason>,
}

/// Result of waiting for an instance to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    /// The ready marker was seen.
    Started,
    /// The instance closed without ever becoming ready.
    Failed,
    /// Still starting when the wait ran out.
    Pending,
}

#[derive(Debug)]
enum SupervisorCommand {
    Kill { reply: oneshot::Sender<()> },
}

/// Metadata of one hosted instance, as listed by the registry.
#[derive(Debug, Clone)]
pub struct ServerSummary {
    pub id: ServerId,
    pub port: u16,
    pub owner: String,
    pub hostname: String,
    pub gamemode: String,
    pub state: LifecycleState,
    pub autorestart: bool,
}

// ---------------------------------------------------------------------------
// ServerHandle
// ---------------------------------------------------------------------------

/// Handle to a supervised instance. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    id: ServerId,
    port: u16,
    owner: String,
    pid: Option<u32>,
    request: Arc<HostRequest>,
    status: watch::Receiver<InstanceStatus>,
    commands: mpsc::Sender<SupervisorCommand>,
}

impl ServerHandle {
    pub fn id(&self) -> &ServerId {
        &self.id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Name of the account that hosted the instance.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// OS process id of the engine, if the platform reported one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn request(&self) -> &HostRequest {
        &self.request
    }

    pub fn status(&self) -> InstanceStatus {
        *self.status.borrow()
    }

    pub fn state(&self) -> LifecycleState {
        self.status.borrow().state
    }

    pub fn summary(&self) -> ServerSummary {
        ServerSummary {
            id: self.id.clone(),
            port: self.port,
            owner: self.owner.clone(),
            hostname: self.request.hostname.clone(),
            gamemode: self.request.gamemode.to_string(),
            state: self.state(),
            autorestart: self.request.autorestart,
        }
    }

    /// Waits up to `limit` for the instance to leave `Starting`.
    pub async fn wait_started(&self, limit: Duration) -> StartupOutcome {
        let mut status = self.status.clone();
        let timed_out = tokio::time::timeout(limit, status.wait_for(|s| !s.state.is_starting()))
            .await
            .is_err();
        if timed_out {
            return StartupOutcome::Pending;
        }
        let current = self.status();
        if current.started {
            StartupOutcome::Started
        } else if current.state.is_starting() {
            StartupOutcome::Pending
        } else {
            StartupOutcome::Failed
        }
    }

    /// Waits until the instance has closed.
    pub async fn wait_closed(&self) -> InstanceStatus {
        let mut status = self.status.clone();
        let _ = status.wait_for(|s| !s.state.is_live()).await;
        self.status()
    }

    /// Terminates the engine process and waits for the instance to close.
    ///
    /// Safe to call in any state and any number of times. Returns why the
    /// instance closed, which is not [`CloseReason::Killed`] if the process
    /// had already exited on its own.
    pub async fn kill(&self) -> CloseReason {
        if self.state().is_live() {
            let (reply, done) = oneshot::channel();
            // Either failure means the supervisor already finished.
            if self.commands.send(SupervisorCommand::Kill { reply }).await.is_ok() {
                let _ = done.await;
            }
        }
        self.wait_closed().await.reason.unwrap_or(CloseReason::Killed)
    }
}

// ---------------------------------------------------------------------------
// Supervisor actor
// ---------------------------------------------------------------------------

/// Everything needed to start one instance.
pub(crate) struct Launch {
    pub id: ServerId,
    pub port: u16,
    pub owner: String,
    pub request: Arc<HostRequest>,
    pub argv: Vec<String>,
    pub ready_marker: String,
}

struct Supervisor {
    id: ServerId,
    port: u16,
    ready_marker: String,
    child: Child,
    lines: mpsc::Receiver<String>,
    commands: mpsc::Receiver<SupervisorCommand>,
    status: watch::Sender<InstanceStatus>,
    registry: ServerRegistry,
    store: Arc<dyn AccountStore>,
}

impl Supervisor {
    async fn run(mut self) {
        tracing::info!(server_id = %self.id, port = self.port, pid = ?self.child.id(), "supervisor started");

        let mut lines_open = true;
        let mut commands_open = true;
        let mut kill_reply = None;

        let reason = loop {
            tokio::select! {
                biased;

                line = self.lines.recv(), if lines_open => match line {
                    Some(line) => self.on_line(&line),
                    None => lines_open = false,
                },

                command = self.commands.recv(), if commands_open => match command {
                    Some(SupervisorCommand::Kill { reply }) => {
                        if let Err(e) = self.child.kill().await {
                            tracing::warn!(server_id = %self.id, error = %e, "failed to kill engine process");
                        }
                        kill_reply = Some(reply);
                        break CloseReason::Killed;
                    }
                    None => commands_open = false,
                },

                exit = self.child.wait() => {
                    match exit {
                        Ok(status) => tracing::info!(server_id = %self.id, port = self.port, %status, "engine process exited"),
                        Err(e) => tracing::warn!(server_id = %self.id, port = self.port, error = %e, "failed to wait for engine process"),
                    }
                    if lines_open {
                        self.drain_lines().await;
                    }
                    break if self.status.borrow().started {
                        CloseReason::Stopped
                    } else {
                        CloseReason::StartupFailed
                    };
                }
            }
        };

        self.finish(reason);
        if let Some(reply) = kill_reply {
            let _ = reply.send(());
        }
    }

    fn on_line(&mut self, line: &str) {
        tracing::debug!(server_id = %self.id, port = self.port, output = line, "engine output");

        if self.status.borrow().state.is_starting() && line == self.ready_marker {
            self.status.send_replace(InstanceStatus {
                state: LifecycleState::Running,
                started: true,
                reason: None,
            });
            tracing::info!(server_id = %self.id, port = self.port, "instance running");

            if let Err(e) = self.store.set_server_online(&self.id) {
                tracing::warn!(server_id = %self.id, error = %e, "failed to mark server online");
            }
        }
    }

    /// Processes output still in flight when the process exited.
    async fn drain_lines(&mut self) {
        let drain = async {
            while let Some(line) = self.lines.recv().await {
                self.on_line(&line);
            }
        };
        let _ = tokio::time::timeout(LINE_DRAIN_GRACE, drain).await;
    }

    fn finish(&mut self, reason: CloseReason) {
        let started = self.status.borrow().started;

        self.registry.remove(self.port, &self.id);
        if started {
            if let Err(e) = self.store.toggle_online(&self.id) {
                tracing::warn!(server_id = %self.id, error = %e, "failed to toggle server offline");
            }
        }

        self.status.send_replace(InstanceStatus {
            state: LifecycleState::Closed,
            started,
            reason: Some(reason),
        });

        match reason {
            CloseReason::StartupFailed => {
                tracing::warn!(server_id = %self.id, port = self.port, "engine exited before becoming ready")
            }
            _ => tracing::info!(server_id = %self.id, port = self.port, %reason, "instance closed"),
        }
    }
}

/// Starts the engine process and its supervisor task.
///
/// # Errors
/// [`InstanceError::Spawn`] if the process could not be started. No task
/// is left behind in that case.
pub(crate) fn spawn_supervisor(
    launch: Launch,
    registry: ServerRegistry,
    store: Arc<dyn AccountStore>,
) -> Result<ServerHandle, InstanceError> {
    let Some((program, args)) = launch.argv.split_first() else {
        return Err(InstanceError::Spawn {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command line"),
        });
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| InstanceError::Spawn {
            program: program.clone(),
            source,
        })?;
    let pid = child.id();

    let (line_tx, line_rx) = mpsc::channel(LINE_CHANNEL_SIZE);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, line_tx));
    }

    let (status_tx, status_rx) = watch::channel(InstanceStatus {
        state: LifecycleState::Starting,
        started: false,
        reason: None,
    });
    let (command_tx, command_rx) = mpsc::channel(8);

    let supervisor = Supervisor {
        id: launch.id.clone(),
        port: launch.port,
        ready_marker: launch.ready_marker,
        child,
        lines: line_rx,
        commands: command_rx,
        status: status_tx,
        registry,
        store,
    };
    tokio::spawn(supervisor.run());

    Ok(ServerHandle {
        id: launch.id,
        port: launch.port,
        owner: launch.owner,
        pid,
        request: launch.request,
        status: status_rx,
        commands: command_tx,
    })
}

/// Forwards lines from one pipe until EOF. Trailing whitespace is
/// stripped and invalid UTF-8 is replaced.
async fn forward_lines<R: AsyncRead + Unpin>(pipe: R, lines: mpsc::Sender<String>) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if lines.send(line).await.is_err() {
                    break;
                }
            }
        }
    }
}
