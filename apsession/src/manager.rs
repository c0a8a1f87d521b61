//! Orchestrateur de la session de lecture
//!
//! Le [`PlaybackManager`] relie les composants : un lot d'upload terminé
//! devient la playlist active, le lecteur est redémarré (ou la playlist est
//! remplacée à chaud) puis les répertoires de playlists obsolètes sont
//! supprimés. Les activations sont sérialisées par un verrou.

use crate::active::{ActivationEntry, ActivePlaylistRecord, ActivePlaylistStore};
use crate::error::{Error, Result};
use crate::playlist::{find_document, list_playlist_dirs, playlist_name, Playlist};
use crate::supervisor::{ProcessSupervisor, SupervisorStatus};
use crate::upload::{
    UploadCoordinator, UploadLock, UploadOutcome, UploadProgress, UploadRequest, UploadSession,
};
use apremote::{PlayerStatus, VlcClient, VlcCommand};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;
use tokio::sync::Mutex;

/// Manière d'appliquer une nouvelle playlist au lecteur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationStrategy {
    /// Arrêt puis relance du processus sur le nouveau document
    #[default]
    Restart,
    /// `pl_empty` puis `in_play` via l'interface HTTP, sans relance
    HotSwap,
}

impl FromStr for ActivationStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "restart" => Ok(ActivationStrategy::Restart),
            "hotswap" | "hot-swap" | "hot_swap" => Ok(ActivationStrategy::HotSwap),
            other => Err(Error::Validation(format!(
                "unknown activation strategy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ActivationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationStrategy::Restart => f.write_str("restart"),
            ActivationStrategy::HotSwap => f.write_str("hotswap"),
        }
    }
}

/// Résultat d'une activation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub playlist: PathBuf,
    pub previous: Option<PathBuf>,
    pub strategy: ActivationStrategy,
    /// Répertoires obsolètes supprimés après l'activation
    pub removed: Vec<PathBuf>,
}

/// Description d'une playlist présente sur disque
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistSummary {
    pub name: String,
    pub directory: PathBuf,
    pub document: Option<PathBuf>,
    pub entries: usize,
    pub active: bool,
    pub uploading: bool,
}

/// Résultat de la suppression de toutes les playlists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub removed: Vec<String>,
    /// Playlists protégées (active ou lot ouvert)
    pub skipped: Vec<String>,
}

/// Vue d'ensemble de la session
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub active: ActivePlaylistRecord,
    pub strategy: ActivationStrategy,
    pub supervisor: SupervisorStatus,
    pub upload: Option<UploadSession>,
}

pub struct PlaybackManager {
    videos_dir: PathBuf,
    store: ActivePlaylistStore,
    uploads: UploadCoordinator,
    supervisor: ProcessSupervisor,
    remote: VlcClient,
    strategy: ActivationStrategy,
    activation_lock: Mutex<()>,
}

impl PlaybackManager {
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::default()
    }

    pub fn videos_dir(&self) -> &Path {
        &self.videos_dir
    }

    pub fn strategy(&self) -> ActivationStrategy {
        self.strategy
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn store(&self) -> &ActivePlaylistStore {
        &self.store
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    pub fn remote(&self) -> &VlcClient {
        &self.remote
    }

    /// Démarrage : lit (ou initialise) la playlist active et lance le lecteur
    ///
    /// Sans playlist active, le lecteur n'est pas lancé.
    pub async fn start(&self) -> Result<ActivePlaylistRecord> {
        let record = self.store.read().await?;
        match &record.active {
            Some(document) => {
                tracing::info!(playlist = %document.display(), "Starting player on active playlist");
                self.supervisor.start(document).await?;
            }
            None => tracing::warn!("No active playlist, player not started"),
        }
        Ok(record)
    }

    /// Traite un fichier uploadé ; le dernier fichier d'un lot l'active
    pub async fn handle_upload(&self, request: UploadRequest) -> Result<UploadOutcome> {
        let progress = self.uploads.begin_or_continue(request).await?;
        if let UploadProgress::Complete(playlist) = &progress {
            self.activate_playlist(playlist).await?;
        }
        Ok(UploadOutcome::from(&progress))
    }

    /// Abandonne le lot ouvert, ses fichiers restent sur disque
    pub async fn abort_upload(&self) -> Option<UploadSession> {
        self.uploads.abort().await
    }

    /// Active `<videos>/<name>/`
    pub async fn activate_by_name(&self, name: &str) -> Result<ActivationReport> {
        let directory = self.playlist_dir(name)?;
        if !fs::try_exists(&directory).await.unwrap_or(false) {
            return Err(Error::NotFound(format!("playlist '{}'", name.trim())));
        }
        let document = find_document(&directory).await?;
        self.activate_document(&document).await
    }

    /// Active un document de playlist quelconque
    pub async fn activate_document(&self, document: &Path) -> Result<ActivationReport> {
        let playlist = Playlist::load(document).await?;
        self.activate_playlist(&playlist).await
    }

    async fn activate_playlist(&self, playlist: &Playlist) -> Result<ActivationReport> {
        if playlist.is_empty() {
            return Err(Error::Validation(format!(
                "playlist '{}' has no entries",
                playlist.name()
            )));
        }
        let document = fs::canonicalize(playlist.document_path())
            .await
            .map_err(|e| Error::io_at("resolving", &playlist.document_path(), e))?;

        let _activation = self.activation_lock.lock().await;
        let previous = self.store.update(&document).await?;

        // un remplacement à chaud suppose un lecteur déjà lancé
        let strategy = match self.strategy {
            ActivationStrategy::HotSwap if !self.supervisor.is_running().await => {
                tracing::info!("Player not running, starting it on the new playlist");
                ActivationStrategy::Restart
            }
            strategy => strategy,
        };
        match strategy {
            ActivationStrategy::Restart => self.supervisor.restart_with(&document).await?,
            ActivationStrategy::HotSwap => self.hot_swap(&document).await?,
        }
        tracing::info!(
            playlist = %document.display(),
            strategy = %strategy,
            "Playlist activated"
        );

        let active_dir = document.parent();
        let keep_previous = match previous.active_dir() {
            Some(dir) if Some(dir) != active_dir => Some(dir.to_path_buf()),
            // réactivation de la même playlist : la génération précédente est dans l'historique
            _ => match self.store.history().await {
                Ok(history) => previous_dir(&history, active_dir),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not read activation history");
                    None
                }
            },
        };
        let removed = self.cleanup(active_dir, keep_previous.as_deref()).await;

        Ok(ActivationReport {
            playlist: document,
            previous: previous.active,
            strategy,
            removed,
        })
    }

    async fn hot_swap(&self, document: &Path) -> Result<()> {
        self.remote.load_playlist(document).await?;
        self.supervisor.set_playlist(document).await;

        tokio::time::sleep(self.supervisor.settings().quiescence_delay).await;
        let status = self.remote.status().await?;
        tracing::debug!(state = ?status.state, item = ?status.current_item, "Hot swap confirmed");
        Ok(())
    }

    /// Répertoires qui ne sont ni l'actif, ni le précédent, ni le lot ouvert
    pub async fn stale_playlists(&self) -> Result<Vec<PathBuf>> {
        let record = self.store.read().await?;
        let active_dir = record.active_dir().map(Path::to_path_buf);
        let history = self.store.history().await?;
        let previous_dir = previous_dir(&history, active_dir.as_deref());

        let uploads = self.uploads.lock().await;
        self.stale_dirs(active_dir.as_deref(), previous_dir.as_deref(), &uploads)
            .await
    }

    async fn stale_dirs(
        &self,
        active: Option<&Path>,
        previous: Option<&Path>,
        uploads: &UploadLock<'_>,
    ) -> Result<Vec<PathBuf>> {
        let uploading = uploads.open_directory();
        let dirs = list_playlist_dirs(&self.videos_dir).await?;
        Ok(dirs
            .into_iter()
            .filter(|dir| Some(dir.as_path()) != active)
            .filter(|dir| Some(dir.as_path()) != previous)
            .filter(|dir| uploading != Some(dir.as_path()))
            .collect())
    }

    /// Suppression best-effort : les erreurs sont journalisées
    ///
    /// La session d'upload reste verrouillée pendant toute la passe : aucun
    /// lot ne peut s'ouvrir dans un répertoire en cours de suppression.
    async fn cleanup(&self, active: Option<&Path>, previous: Option<&Path>) -> Vec<PathBuf> {
        let uploads = self.uploads.lock().await;
        let stale = match self.stale_dirs(active, previous, &uploads).await {
            Ok(stale) => stale,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list stale playlists");
                return Vec::new();
            }
        };

        let mut removed = Vec::new();
        for dir in stale {
            match fs::remove_dir_all(&dir).await {
                Ok(()) => {
                    tracing::info!(directory = %dir.display(), "Stale playlist removed");
                    removed.push(dir);
                }
                Err(e) => {
                    tracing::warn!(directory = %dir.display(), error = %e, "Failed to remove stale playlist")
                }
            }
        }
        removed
    }

    /// Liste les playlists du répertoire vidéos
    pub async fn list_playlists(&self) -> Result<Vec<PlaylistSummary>> {
        let record = self.store.read().await?;
        let active_dir = record.active_dir().map(Path::to_path_buf);
        let uploading = self.uploads.open_directory().await;

        let mut summaries = Vec::new();
        for directory in list_playlist_dirs(&self.videos_dir).await? {
            let name = directory
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let document = find_document(&directory).await.ok();
            let entries = match &document {
                Some(doc) => Playlist::load(doc).await.map(|p| p.len()).unwrap_or(0),
                None => 0,
            };
            summaries.push(PlaylistSummary {
                active: active_dir.as_deref() == Some(directory.as_path()),
                uploading: uploading.as_deref() == Some(directory.as_path()),
                name,
                directory,
                document,
                entries,
            });
        }
        Ok(summaries)
    }

    /// Supprime une playlist ; l'active et le lot ouvert sont protégés
    pub async fn delete_playlist(&self, name: &str) -> Result<()> {
        let directory = self.playlist_dir(name)?;
        let _activation = self.activation_lock.lock().await;
        let uploads = self.uploads.lock().await;

        if !fs::try_exists(&directory).await.unwrap_or(false) {
            return Err(Error::NotFound(format!("playlist '{}'", name.trim())));
        }
        if let Some(reason) = self.protection(&directory, &uploads).await? {
            return Err(Error::Conflict(format!(
                "playlist '{}' is {}",
                name.trim(),
                reason
            )));
        }

        fs::remove_dir_all(&directory)
            .await
            .map_err(|e| Error::io_at("removing", &directory, e))?;
        tracing::info!(directory = %directory.display(), "Playlist deleted");
        Ok(())
    }

    /// Supprime toutes les playlists non protégées
    pub async fn delete_all(&self) -> Result<DeletionReport> {
        let _activation = self.activation_lock.lock().await;
        let uploads = self.uploads.lock().await;
        let mut report = DeletionReport::default();

        for directory in list_playlist_dirs(&self.videos_dir).await? {
            let name = directory
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if let Some(reason) = self.protection(&directory, &uploads).await? {
                tracing::info!(playlist = %name, reason, "Playlist kept");
                report.skipped.push(name);
                continue;
            }
            fs::remove_dir_all(&directory)
                .await
                .map_err(|e| Error::io_at("removing", &directory, e))?;
            report.removed.push(name);
        }

        tracing::info!(
            removed = report.removed.len(),
            skipped = report.skipped.len(),
            "Playlists deleted"
        );
        Ok(report)
    }

    async fn protection(
        &self,
        directory: &Path,
        uploads: &UploadLock<'_>,
    ) -> Result<Option<&'static str>> {
        let record = self.store.read().await?;
        if record.active_dir() == Some(directory) {
            return Ok(Some("active"));
        }
        if uploads.open_directory() == Some(directory) {
            return Ok(Some("being uploaded"));
        }
        Ok(None)
    }

    fn playlist_dir(&self, name: &str) -> Result<PathBuf> {
        if name.trim().is_empty() {
            return Err(Error::Validation("playlist name is empty".into()));
        }
        Ok(self.videos_dir.join(playlist_name(Some(name))?))
    }

    pub async fn active(&self) -> Result<ActivePlaylistRecord> {
        self.store.read().await
    }

    pub async fn history(&self) -> Result<Vec<ActivationEntry>> {
        self.store.history().await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.store.clear_history().await
    }

    /// Statut courant du lecteur via son interface HTTP
    pub async fn player_status(&self) -> Result<PlayerStatus> {
        Ok(self.remote.status().await?)
    }

    /// Transmet une commande nommée au lecteur
    ///
    /// Les noms inconnus et les paramètres invalides sont refusés avant
    /// tout envoi.
    pub async fn send_command(
        &self,
        name: &str,
        params: &HashMap<String, String>,
    ) -> Result<PlayerStatus> {
        let command = VlcCommand::parse(name, params)?;
        Ok(self.remote.execute(&command).await?)
    }

    pub async fn status(&self) -> Result<ManagerStatus> {
        Ok(ManagerStatus {
            active: self.store.read().await?,
            strategy: self.strategy,
            supervisor: self.supervisor.status().await,
            upload: self.uploads.current().await,
        })
    }

    /// Arrête le lecteur ; un lot ouvert est conservé tel quel sur disque
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(session) = self.uploads.current().await {
            tracing::warn!(
                batch = %session.name(),
                processed = session.processed(),
                total = session.declared_total(),
                "Shutting down with an incomplete batch"
            );
        }
        self.supervisor.stop().await
    }
}

/// Répertoire de la dernière activation antérieure à la playlist active
fn previous_dir(history: &[ActivationEntry], active: Option<&Path>) -> Option<PathBuf> {
    history
        .iter()
        .rev()
        .filter_map(|entry| entry.playlist.parent())
        .find(|dir| Some(*dir) != active)
        .map(Path::to_path_buf)
}

/// Builder pour [`PlaybackManager`]
#[derive(Default)]
pub struct ManagerBuilder {
    videos_dir: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    default_playlist: Option<PathBuf>,
    supervisor: Option<ProcessSupervisor>,
    remote: Option<VlcClient>,
    strategy: ActivationStrategy,
}

impl ManagerBuilder {
    /// Répertoire contenant un sous-répertoire par playlist
    pub fn videos_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.videos_dir = Some(dir.into());
        self
    }

    /// Répertoire de `activePlaylist.json` et `history.json`
    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    pub fn default_playlist(mut self, document: impl Into<PathBuf>) -> Self {
        self.default_playlist = Some(document.into());
        self
    }

    pub fn supervisor(mut self, supervisor: ProcessSupervisor) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn remote(mut self, remote: VlcClient) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn strategy(mut self, strategy: ActivationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Crée les répertoires et assemble le gestionnaire
    pub fn build(self) -> Result<PlaybackManager> {
        let videos_dir = self
            .videos_dir
            .ok_or_else(|| Error::Validation("videos directory is required".into()))?;
        let state_dir = self
            .state_dir
            .ok_or_else(|| Error::Validation("state directory is required".into()))?;
        let supervisor = self
            .supervisor
            .ok_or_else(|| Error::Validation("process supervisor is required".into()))?;
        let remote = match self.remote {
            Some(remote) => remote,
            None => VlcClient::builder().build()?,
        };

        for dir in [&videos_dir, &state_dir] {
            std::fs::create_dir_all(dir).map_err(|e| Error::io_at("creating", dir, e))?;
        }
        let videos_dir = std::fs::canonicalize(&videos_dir)
            .map_err(|e| Error::io_at("resolving", &videos_dir, e))?;
        let default_playlist = self.default_playlist.unwrap_or_default();

        Ok(PlaybackManager {
            store: ActivePlaylistStore::new(&state_dir, &videos_dir, default_playlist),
            uploads: UploadCoordinator::new(&videos_dir),
            videos_dir,
            supervisor,
            remote,
            strategy: self.strategy,
            activation_lock: Mutex::new(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "restart".parse::<ActivationStrategy>().unwrap(),
            ActivationStrategy::Restart
        );
        assert_eq!(
            "Hot-Swap".parse::<ActivationStrategy>().unwrap(),
            ActivationStrategy::HotSwap
        );
        assert!("reload".parse::<ActivationStrategy>().is_err());
        assert_eq!(ActivationStrategy::HotSwap.to_string(), "hotswap");
    }

    #[test]
    fn test_previous_dir_skips_active() {
        let entry = |p: &str| ActivationEntry {
            playlist: PathBuf::from(p),
            activated_at: Utc::now(),
        };
        let history = vec![
            entry("/v/a/a.m3u"),
            entry("/v/b/b.m3u"),
            entry("/v/c/c.m3u"),
            entry("/v/c/c.m3u"),
        ];
        assert_eq!(
            previous_dir(&history, Some(Path::new("/v/c"))),
            Some(PathBuf::from("/v/b"))
        );
        assert_eq!(previous_dir(&[], Some(Path::new("/v/c"))), None);
    }
}
