//! Supervision du processus lecteur
//!
//! Le [`ProcessSupervisor`] possède l'unique processus VLC :
//!
//! - `start` lance le lecteur sur un document de playlist et arme le watchdog
//! - `stop` désarme le watchdog, tue et récupère le processus (idempotent)
//! - `restart` / `restart_with` sont sérialisés par un verrou exclusif ; un
//!   appelant qui attendait un redémarrage concurrent vers la même playlist
//!   en adopte le résultat
//!
//! Le watchdog et l'observateur de sortie transmettent la génération du
//! processus qu'ils ont vu mourir : une mort produit un seul redémarrage.
//! Après `max_consecutive_failures` échecs le superviseur passe en état
//! `Degraded` et cesse les redémarrages automatiques jusqu'au prochain
//! `start`/`restart` explicite réussi.

mod launcher;
mod process;
mod watchdog;

pub use launcher::{PlayerLauncher, VlcLauncher};

use crate::error::{Error, Result};
use crate::playlist::Playlist;
use chrono::{DateTime, Utc};
use process::PlayerProcessHandle;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Délai avant la première vérification du watchdog (5 s)
pub const DEFAULT_GRACE_DELAY_MS: u64 = 5_000;
/// Intervalle entre deux vérifications (30 s)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;
/// Pause entre l'arrêt et la relance lors d'un redémarrage (2 s)
pub const DEFAULT_QUIESCENCE_DELAY_MS: u64 = 2_000;
/// Attente maximale de la fin du processus après le signal d'arrêt
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;
/// Plafond du backoff du watchdog (5 min)
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 300_000;

/// Réglages temporels du superviseur
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub grace_delay: Duration,
    pub poll_interval: Duration,
    pub quiescence_delay: Duration,
    pub stop_timeout: Duration,
    pub max_consecutive_failures: u32,
    pub max_backoff: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            grace_delay: Duration::from_millis(DEFAULT_GRACE_DELAY_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            quiescence_delay: Duration::from_millis(DEFAULT_QUIESCENCE_DELAY_MS),
            stop_timeout: Duration::from_millis(DEFAULT_STOP_TIMEOUT_MS),
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

impl SupervisorSettings {
    /// Délai avant la prochaine vérification après `failures` échecs consécutifs
    ///
    /// `poll_interval * 2^(failures-1)`, plafonné à `max_backoff`.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures <= 1 {
            return self.poll_interval;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.poll_interval
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff.max(self.poll_interval))
    }
}

/// État global du superviseur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    Stopped,
    Running,
    Restarting,
    Degraded,
}

/// Instantané de l'état du superviseur
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    pub state: SupervisorState,
    pub pid: Option<u32>,
    pub generation: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub restarts: u64,
    pub consecutive_failures: u32,
    pub playlist: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct RestartOutcome {
    epoch: u64,
    playlist: PathBuf,
    error: Option<String>,
}

#[derive(Default)]
struct State {
    handle: Option<PlayerProcessHandle>,
    /// Dernière playlist connue
    playlist: Option<PathBuf>,
    generation: u64,
    armed: bool,
    restarting: bool,
    degraded: bool,
    restarts: u64,
    consecutive_failures: u32,
    stop_epoch: u64,
    restart_epoch: u64,
    last_restart: Option<RestartOutcome>,
}

impl State {
    fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_alive())
    }

    /// Vivant depuis au moins `grace`
    fn survived(&self, grace: Duration) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.is_alive() && h.uptime() >= grace)
    }

    fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
        self.degraded = false;
    }

    fn record_failure(&mut self, max_failures: u32) {
        self.consecutive_failures += 1;
        if max_failures > 0 && self.consecutive_failures >= max_failures && !self.degraded {
            self.degraded = true;
            tracing::error!(
                failures = self.consecutive_failures,
                "Player keeps failing, automatic restarts disabled"
            );
        }
    }
}

struct Inner {
    launcher: Arc<dyn PlayerLauncher>,
    settings: SupervisorSettings,
    state: Mutex<State>,
    restart_lock: Mutex<()>,
    watchdog: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Superviseur du processus lecteur
///
/// Clonable : toutes les copies partagent le même processus.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

impl ProcessSupervisor {
    pub fn new(launcher: Arc<dyn PlayerLauncher>, settings: SupervisorSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                launcher,
                settings,
                state: Mutex::new(State::default()),
                restart_lock: Mutex::new(()),
                watchdog: std::sync::Mutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.inner.settings
    }

    /// Lance le lecteur sur `playlist` et arme le watchdog
    ///
    /// Un processus déjà en cours est arrêté d'abord.
    ///
    /// # Errors
    ///
    /// - `NotFound` si le document n'existe pas
    /// - `Validation` s'il ne contient aucune entrée
    /// - `Process` si le lancement échoue (le watchdog n'est pas armé)
    pub async fn start(&self, playlist: &Path) -> Result<()> {
        validate_document(playlist).await?;

        let _restart = self.inner.restart_lock.lock().await;
        let old = {
            let mut state = self.inner.state.lock().await;
            state.handle.take()
        };
        if let Some(old) = old {
            old.terminate(self.inner.settings.stop_timeout).await;
        }

        let mut state = self.inner.state.lock().await;
        match self.inner.launch(&mut state, playlist) {
            Ok(()) => {
                state.armed = true;
                state.reset_failures();
                drop(state);
                self.inner.arm_watchdog();
                Ok(())
            }
            Err(e) => {
                state.restarts += 1;
                state.armed = false;
                state.playlist = Some(playlist.to_path_buf());
                drop(state);
                self.inner.disarm_watchdog();
                Err(e)
            }
        }
    }

    /// Arrête le lecteur et désarme le watchdog (idempotent)
    pub async fn stop(&self) -> Result<()> {
        self.inner.disarm_watchdog();

        let handle = {
            let mut state = self.inner.state.lock().await;
            state.armed = false;
            state.restarting = false;
            state.stop_epoch += 1;
            state.handle.take()
        };

        match handle {
            Some(handle) => {
                let pid = handle.pid();
                if !handle.terminate(self.inner.settings.stop_timeout).await {
                    return Err(Error::Process(format!(
                        "player {:?} did not exit within {:?}",
                        pid, self.inner.settings.stop_timeout
                    )));
                }
                tracing::info!(pid, "Player supervisor stopped");
            }
            None => tracing::debug!("Player supervisor already stopped"),
        }
        Ok(())
    }

    /// Redémarre le lecteur sur la dernière playlist connue
    pub async fn restart(&self) -> Result<()> {
        let playlist = self
            .inner
            .state
            .lock()
            .await
            .playlist
            .clone()
            .ok_or_else(|| Error::Process("no playlist has been started".into()))?;
        self.restart_with(&playlist).await
    }

    /// Redémarre le lecteur sur une nouvelle playlist
    pub async fn restart_with(&self, playlist: &Path) -> Result<()> {
        let observed_epoch = self.inner.state.lock().await.restart_epoch;

        let _restart = self.inner.restart_lock.lock().await;
        {
            let state = self.inner.state.lock().await;
            if let Some(outcome) = &state.last_restart {
                if outcome.epoch > observed_epoch && outcome.playlist == playlist {
                    tracing::debug!(
                        playlist = %playlist.display(),
                        "Adopting result of concurrent restart"
                    );
                    return match &outcome.error {
                        None => Ok(()),
                        Some(message) => Err(Error::Process(message.clone())),
                    };
                }
            }
        }

        let epoch = self.inner.state.lock().await.stop_epoch;
        let result = self.inner.restart_locked(playlist, true, epoch).await;
        if result.is_ok() {
            self.inner.arm_watchdog();
        }
        result
    }

    /// Change la dernière playlist connue sans redémarrer
    ///
    /// Utilisé après un remplacement à chaud par l'interface HTTP du lecteur.
    pub async fn set_playlist(&self, playlist: &Path) {
        self.inner.state.lock().await.playlist = Some(playlist.to_path_buf());
    }

    /// Dernière playlist connue
    pub async fn playlist(&self) -> Option<PathBuf> {
        self.inner.state.lock().await.playlist.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.is_alive()
    }

    pub async fn status(&self) -> SupervisorStatus {
        let state = self.inner.state.lock().await;
        let alive = state.is_alive();
        let status = if state.degraded {
            SupervisorState::Degraded
        } else if state.restarting || (state.armed && !alive) {
            SupervisorState::Restarting
        } else if alive {
            SupervisorState::Running
        } else {
            SupervisorState::Stopped
        };

        SupervisorStatus {
            state: status,
            pid: state.handle.as_ref().and_then(|h| h.pid()),
            generation: state.generation,
            started_at: state.handle.as_ref().map(|h| h.started_at()),
            restarts: state.restarts,
            consecutive_failures: state.consecutive_failures,
            playlist: state.playlist.clone(),
        }
    }
}

impl Inner {
    /// Lance un processus ; `state` doit être verrouillé par l'appelant
    fn launch(self: &Arc<Self>, state: &mut State, playlist: &Path) -> Result<()> {
        state.generation += 1;
        let generation = state.generation;

        let mut command = self.launcher.command(playlist);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match command.spawn() {
            Ok(child) => {
                let weak = Arc::downgrade(self);
                let handle = PlayerProcessHandle::monitor(
                    child,
                    generation,
                    state.restarts,
                    playlist,
                    Box::new(move |generation, _status| on_unexpected_exit(weak, generation)),
                );
                tracing::info!(
                    pid = handle.pid(),
                    generation,
                    restarts = handle.restarts_at_creation(),
                    playlist = %handle.playlist().display(),
                    "Player started"
                );
                state.handle = Some(handle);
                state.playlist = Some(playlist.to_path_buf());
                Ok(())
            }
            Err(e) => {
                state.record_failure(self.settings.max_consecutive_failures);
                tracing::error!(
                    program = %self.launcher.program(),
                    generation,
                    error = %e,
                    "Failed to launch player"
                );
                Err(Error::Process(format!(
                    "failed to launch {}: {}",
                    self.launcher.program(),
                    e
                )))
            }
        }
    }

    /// Arrêt, pause, relance ; le verrou de redémarrage est tenu par l'appelant
    ///
    /// `epoch` est la valeur de `stop_epoch` vue par l'appelant : un `stop`
    /// survenu depuis annule la relance.
    ///
    /// Un redémarrage `explicit` réussi remet à zéro le compteur d'échecs ;
    /// pour un redémarrage automatique, c'est le watchdog qui le fait en
    /// constatant que le processus a survécu.
    async fn restart_locked(
        self: &Arc<Self>,
        playlist: &Path,
        explicit: bool,
        epoch: u64,
    ) -> Result<()> {
        let old = {
            let mut state = self.state.lock().await;
            state.restarting = true;
            state.handle.take()
        };
        tracing::info!(playlist = %playlist.display(), "Restarting player");

        if let Some(old) = old {
            old.terminate(self.settings.stop_timeout).await;
        }
        tokio::time::sleep(self.settings.quiescence_delay).await;

        let result = match validate_document(playlist).await {
            Ok(()) => {
                let mut state = self.state.lock().await;
                if state.stop_epoch != epoch {
                    Err(Error::Process("supervisor stopped during restart".into()))
                } else {
                    state.restarts += 1;
                    let launched = self.launch(&mut state, playlist);
                    if launched.is_ok() {
                        state.armed = true;
                        if explicit {
                            state.reset_failures();
                        }
                    }
                    launched
                }
            }
            Err(e) => {
                let mut state = self.state.lock().await;
                state.restarts += 1;
                state.playlist = Some(playlist.to_path_buf());
                state.record_failure(self.settings.max_consecutive_failures);
                Err(e)
            }
        };

        let mut state = self.state.lock().await;
        state.restarting = false;
        state.restart_epoch += 1;
        state.last_restart = Some(RestartOutcome {
            epoch: state.restart_epoch,
            playlist: playlist.to_path_buf(),
            error: result.as_ref().err().map(|e| e.to_string()),
        });
        result
    }

    /// Redémarre si le processus de la génération `observed` est mort
    ///
    /// Sans effet si un autre chemin a déjà redémarré le lecteur, si le
    /// superviseur a été arrêté ou s'il est en état dégradé.
    async fn restart_if_dead(self: &Arc<Self>, observed: u64) -> Result<bool> {
        let _restart = self.restart_lock.lock().await;
        let (playlist, epoch) = {
            let mut state = self.state.lock().await;
            if state.generation != observed || !state.armed || state.degraded || state.is_alive() {
                return Ok(false);
            }

            // mort pendant le délai de grâce : compte comme un échec de lancement
            let short_lived = state
                .handle
                .as_ref()
                .is_some_and(|h| h.uptime() < self.settings.grace_delay);
            if short_lived {
                state.record_failure(self.settings.max_consecutive_failures);
                if state.degraded {
                    state.handle = None;
                    return Ok(false);
                }
            }

            match state.playlist.clone() {
                Some(playlist) => (playlist, state.stop_epoch),
                None => return Ok(false),
            }
        };

        tracing::warn!(generation = observed, "Player is down, restarting");
        self.restart_locked(&playlist, false, epoch).await.map(|_| true)
    }

    fn arm_watchdog(self: &Arc<Self>) {
        let mut slot = match self.watchdog.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        *slot = Some(tokio::spawn(watchdog::run(Arc::downgrade(self))));
        tracing::debug!("Watchdog armed");
    }

    fn disarm_watchdog(&self) {
        let mut slot = match self.watchdog.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(task) = slot.take() {
            task.abort();
            tracing::debug!("Watchdog disarmed");
        }
    }
}

fn on_unexpected_exit(weak: Weak<Inner>, generation: u64) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    tokio::spawn(async move {
        match inner.restart_if_dead(generation).await {
            Ok(true) => tracing::info!(generation, "Player restarted after crash"),
            Ok(false) => {}
            Err(e) => tracing::error!(generation, error = %e, "Restart after crash failed"),
        }
    });
}

async fn validate_document(playlist: &Path) -> Result<()> {
    let document = Playlist::load(playlist).await?;
    if document.is_empty() {
        return Err(Error::Validation(format!(
            "playlist {} has no entries",
            playlist.display()
        )));
    }
    Ok(())
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.watchdog.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let settings = SupervisorSettings {
            poll_interval: Duration::from_secs(30),
            max_backoff: Duration::from_secs(300),
            ..Default::default()
        };
        assert_eq!(settings.backoff(0), Duration::from_secs(30));
        assert_eq!(settings.backoff(1), Duration::from_secs(30));
        assert_eq!(settings.backoff(2), Duration::from_secs(60));
        assert_eq!(settings.backoff(4), Duration::from_secs(240));
        assert_eq!(settings.backoff(5), Duration::from_secs(300));
        assert_eq!(settings.backoff(64), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_start_rejects_missing_and_empty_documents() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(
            Arc::new(VlcLauncher::new("vlc")),
            SupervisorSettings::default(),
        );

        let err = supervisor
            .start(&dir.path().join("missing.m3u"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let empty = dir.path().join("empty.m3u");
        tokio::fs::write(&empty, "#EXTM3U\n").await.unwrap();
        let err = supervisor.start(&empty).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert_eq!(supervisor.status().await.state, SupervisorState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let supervisor = ProcessSupervisor::new(
            Arc::new(VlcLauncher::new("vlc")),
            SupervisorSettings::default(),
        );
        supervisor.stop().await.unwrap();
        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.status().await.state, SupervisorState::Stopped);
    }
}
