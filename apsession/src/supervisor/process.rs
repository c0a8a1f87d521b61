//! Handle on a running player process
//!
//! The child is owned by a monitor task. The task reaps it, clears the
//! health flag when it exits and reports unexpected exits through the
//! supplied callback. Termination goes through a oneshot channel so that
//! reaping always happens in the task that owns the child.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Called from the monitor task with the generation of a process that
/// exited on its own with a failure status
pub(crate) type ExitObserver = Box<dyn FnOnce(u64, ExitStatus) + Send>;

pub(crate) struct PlayerProcessHandle {
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    generation: u64,
    restarts_at_creation: u64,
    playlist: PathBuf,
    alive: Arc<AtomicBool>,
    kill_tx: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
}

impl PlayerProcessHandle {
    /// Takes ownership of a freshly spawned child and starts its monitor
    pub(crate) fn monitor(
        mut child: Child,
        generation: u64,
        restarts_at_creation: u64,
        playlist: &Path,
        on_failure: ExitObserver,
    ) -> Self {
        let pid = child.id();
        let alive = Arc::new(AtomicBool::new(true));
        let (kill_tx, kill_rx) = oneshot::channel();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(drain_output(stdout, pid, false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_output(stderr, pid, true));
        }

        let flag = alive.clone();
        let monitor = tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    flag.store(false, Ordering::SeqCst);
                    match status {
                        Ok(status) if status.success() => {
                            tracing::info!(pid, generation, "Player exited normally");
                        }
                        Ok(status) => {
                            tracing::warn!(pid, generation, %status, "Player exited unexpectedly");
                            on_failure(generation, status);
                        }
                        Err(e) => {
                            tracing::error!(pid, generation, error = %e, "Failed to wait for player");
                        }
                    }
                }
                // a dropped sender also means "terminate"
                _ = kill_rx => {
                    if let Err(e) = child.start_kill() {
                        tracing::debug!(pid, error = %e, "Kill signal not delivered");
                    }
                    let status = child.wait().await;
                    flag.store(false, Ordering::SeqCst);
                    tracing::info!(pid, generation, status = ?status.ok(), "Player stopped");
                }
            }
        });

        Self {
            pid,
            started_at: Utc::now(),
            generation,
            restarts_at_creation,
            playlist: playlist.to_path_buf(),
            alive,
            kill_tx: Some(kill_tx),
            monitor,
        }
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub(crate) fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(crate) fn restarts_at_creation(&self) -> u64 {
        self.restarts_at_creation
    }

    pub(crate) fn playlist(&self) -> &Path {
        &self.playlist
    }

    /// Time since the process was spawned
    pub(crate) fn uptime(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Kills the process and waits for the monitor to reap it
    ///
    /// Returns `false` when the process was not reaped within `timeout`;
    /// the monitor is then aborted and the child is killed on drop.
    pub(crate) async fn terminate(mut self, timeout: Duration) -> bool {
        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }

        match tokio::time::timeout(timeout, &mut self.monitor).await {
            Ok(_) => true,
            Err(_) => {
                tracing::warn!(
                    pid = self.pid,
                    generation = self.generation,
                    "Player not reaped within {:?}",
                    timeout
                );
                self.monitor.abort();
                false
            }
        }
    }
}

async fn drain_output<R>(stream: R, pid: Option<u32>, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            tracing::warn!(target: "vlc", pid, "{}", line);
        } else {
            tracing::info!(target: "vlc", pid, "{}", line);
        }
    }
}
