//! Extension d'apconfig pour la session de lecture

use crate::error::Result;
use crate::manager::{ActivationStrategy, PlaybackManager};
use crate::supervisor::{
    ProcessSupervisor, SupervisorSettings, VlcLauncher, DEFAULT_GRACE_DELAY_MS,
    DEFAULT_MAX_BACKOFF_MS, DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_QUIESCENCE_DELAY_MS, DEFAULT_STOP_TIMEOUT_MS,
};
use apremote::RemoteConfigExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_PLAYLIST: &str = "videos_default/playlistDefecto/playlistDefecto.m3u";

/// Trait d'extension pour `apconfig::Config`
pub trait SessionConfigExt {
    /// Répertoire des playlists (`paths.videos`), créé si besoin
    fn videos_dir(&self) -> Result<PathBuf>;

    /// Répertoire de `activePlaylist.json` et `history.json` (`paths.state`)
    fn state_dir(&self) -> Result<PathBuf>;

    /// Répertoire de dépôt des fichiers uploadés (`paths.uploads`)
    fn uploads_dir(&self) -> Result<PathBuf>;

    fn default_playlist(&self) -> PathBuf;

    fn player_launcher(&self) -> VlcLauncher;

    fn supervisor_settings(&self) -> SupervisorSettings;

    fn activation_strategy(&self) -> ActivationStrategy;

    /// Assemble un [`PlaybackManager`] complet à partir de la configuration
    fn playback_manager(&self) -> Result<PlaybackManager>;
}

impl SessionConfigExt for apconfig::Config {
    fn videos_dir(&self) -> Result<PathBuf> {
        Ok(self.get_managed_dir(&["paths", "videos"], "videos")?)
    }

    fn state_dir(&self) -> Result<PathBuf> {
        Ok(self.get_managed_dir(&["paths", "state"], "state")?)
    }

    fn uploads_dir(&self) -> Result<PathBuf> {
        Ok(self.get_managed_dir(&["paths", "uploads"], "uploads")?)
    }

    fn default_playlist(&self) -> PathBuf {
        self.get_managed_file(&["paths", "default_playlist"], DEFAULT_PLAYLIST)
    }

    fn player_launcher(&self) -> VlcLauncher {
        VlcLauncher::new(self.get_string_or(&["player", "binary"], "vlc"))
            .http(
                self.remote_host(),
                self.remote_port(),
                self.remote_password(),
            )
            .extra_args(self.get_string_list_or(&["player", "extra_args"], &["--no-audio"]))
    }

    fn supervisor_settings(&self) -> SupervisorSettings {
        let millis = |key: &str, default: u64| {
            Duration::from_millis(self.get_u64_or(&["supervisor", key], default))
        };
        let max_failures = self.get_u64_or(
            &["supervisor", "max_consecutive_failures"],
            DEFAULT_MAX_CONSECUTIVE_FAILURES as u64,
        );

        SupervisorSettings {
            grace_delay: millis("grace_delay_ms", DEFAULT_GRACE_DELAY_MS),
            poll_interval: millis("poll_interval_ms", DEFAULT_POLL_INTERVAL_MS),
            quiescence_delay: millis("quiescence_delay_ms", DEFAULT_QUIESCENCE_DELAY_MS),
            stop_timeout: millis("stop_timeout_ms", DEFAULT_STOP_TIMEOUT_MS),
            max_consecutive_failures: u32::try_from(max_failures).unwrap_or(u32::MAX),
            max_backoff: millis("max_backoff_ms", DEFAULT_MAX_BACKOFF_MS),
        }
    }

    fn activation_strategy(&self) -> ActivationStrategy {
        let raw = self.get_string_or(&["session", "activation_strategy"], "restart");
        raw.parse().unwrap_or_else(|e| {
            tracing::warn!("{}, falling back to restart", e);
            ActivationStrategy::Restart
        })
    }

    fn playback_manager(&self) -> Result<PlaybackManager> {
        let supervisor = ProcessSupervisor::new(
            Arc::new(self.player_launcher()),
            self.supervisor_settings(),
        );

        PlaybackManager::builder()
            .videos_dir(self.videos_dir()?)
            .state_dir(self.state_dir()?)
            .default_playlist(self.default_playlist())
            .supervisor(supervisor)
            .remote(self.remote_client()?)
            .strategy(self.activation_strategy())
            .build()
    }
}
