//! # OS-backed host: one child process per worker.
//!
//! ## Wiring per worker
//! ```text
//! spawn(launch)
//!   ├─► Command(program, args, env + CLUSTERVISOR_WORKER_ID)
//!   │     stdin  = null
//!   │     stdout = piped   (control channel, NDJSON)
//!   │     stderr = inherit | null (silent)
//!   ├─► signal Fork, signal Online
//!   └─► watch task
//!         ├─► output task: stdout line ─► ControlMessage? ─► signal Message
//!         │                                  └─ otherwise ─► passthrough (unless silent)
//!         ├─► child.wait()  or  token cancelled ─► kill ─► child.wait()
//!         ├─► drain output task
//!         └─► signal Exit { code, signal }
//! ```
//!
//! ## Rules
//! - `Exit` is sent only after the output task finished, so no `Message` follows it.
//! - Every child holds a child token of the host root token; `terminate_all` cancels the root.
//! - Children are killed if their handle is dropped.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::HostError;
use crate::protocol::ControlMessage;
use crate::worker::WORKER_ID_ENV;

use super::{LifecycleSignal, ProcessHost, SignalSender, WorkerId, WorkerLaunch};

/// How long to keep reading a dead worker's stdout (grandchildren may hold it open).
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

/// Spawns each worker as `program` with the launch arguments and environment.
#[derive(Debug)]
pub struct OsProcessHost {
    program: PathBuf,
    next_id: u64,
    root: CancellationToken,
}

impl OsProcessHost {
    /// Host running `program` for every worker.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            next_id: 0,
            root: CancellationToken::new(),
        }
    }

    /// Host re-running the current executable (dual-mode binaries, see [`crate::worker`]).
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Program every worker runs.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl ProcessHost for OsProcessHost {
    fn spawn(
        &mut self,
        launch: WorkerLaunch,
        signals: SignalSender,
    ) -> Result<WorkerId, HostError> {
        self.next_id += 1;
        let id = WorkerId::new(self.next_id);

        let mut child = Command::new(&self.program)
            .args(&launch.args)
            .envs(&launch.env)
            .env(WORKER_ID_ENV, id.get().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if launch.silent {
                Stdio::null()
            } else {
                Stdio::inherit()
            })
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HostError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;
        let stdout = child.stdout.take().ok_or(HostError::MissingPipe)?;

        debug!(worker = %id, pid = ?child.id(), job = %launch.job, "worker process started");
        let _ = signals.send(LifecycleSignal::Fork { worker: id });
        let _ = signals.send(LifecycleSignal::Online { worker: id });

        let token = self.root.child_token();
        tokio::spawn(watch(id, child, stdout, launch.silent, signals, token));
        Ok(id)
    }

    fn terminate_all(&mut self) {
        std::mem::take(&mut self.root).cancel();
    }
}

/// Waits for the child to end (or kills it on cancel) and reports its exit.
async fn watch(
    id: WorkerId,
    mut child: Child,
    stdout: ChildStdout,
    silent: bool,
    signals: SignalSender,
    token: CancellationToken,
) {
    let mut output = tokio::spawn(forward_output(id, stdout, silent, signals.clone()));

    let finished = tokio::select! {
        status = child.wait() => Some(status),
        _ = token.cancelled() => None,
    };
    let status = match finished {
        Some(status) => status,
        None => {
            if let Err(e) = child.start_kill() {
                warn!(worker = %id, error = %e, "failed to kill worker");
            }
            child.wait().await
        }
    };

    if tokio::time::timeout(OUTPUT_DRAIN, &mut output).await.is_err() {
        debug!(worker = %id, "worker output still open after exit; detaching");
        output.abort();
    }

    let (code, signal) = match status {
        Ok(status) => (status.code(), exit_signal(&status)),
        Err(e) => {
            warn!(worker = %id, error = %e, "cannot collect worker exit status");
            (None, None)
        }
    };
    let _ = signals.send(LifecycleSignal::Exit {
        worker: id,
        code,
        signal,
    });
}

/// Splits worker stdout into control messages and passthrough output.
async fn forward_output(id: WorkerId, stdout: ChildStdout, silent: bool, signals: SignalSender) {
    let mut lines = BufReader::new(stdout).lines();
    let mut passthrough = tokio::io::stdout();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match ControlMessage::decode(&line) {
                Ok(message) => {
                    let _ = signals.send(LifecycleSignal::Message {
                        worker: id,
                        message,
                    });
                }
                Err(_) if silent => {}
                Err(_) => {
                    let _ = passthrough.write_all(format!("{line}\n").as_bytes()).await;
                }
            },
            Ok(None) => break,
            Err(e) => {
                debug!(worker = %id, error = %e, "worker output unreadable");
                break;
            }
        }
    }
    let _ = passthrough.flush().await;
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
