//! Pointeur persistant vers la playlist active
//!
//! Deux documents dans le répertoire d'état :
//! - `activePlaylist.json` : `{ "active": <chemin|null>, "updatedAt": <RFC 3339> }`
//! - `history.json` : tableau des activations passées
//!
//! Toutes les lectures et écritures passent par un même verrou asynchrone,
//! qui protège aussi l'initialisation. Les écritures sur disque se font par
//! fichier temporaire puis renommage.

use crate::error::{Error, Result};
use crate::playlist::{list_playlist_dirs, write_atomic, Playlist};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

pub const ACTIVE_RECORD_FILE: &str = "activePlaylist.json";
pub const HISTORY_FILE: &str = "history.json";

/// Enregistrement de la playlist active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePlaylistRecord {
    /// Chemin absolu du document de la playlist active
    pub active: Option<PathBuf>,
    pub updated_at: DateTime<Utc>,
}

impl ActivePlaylistRecord {
    pub fn new(active: Option<PathBuf>) -> Self {
        Self {
            active,
            updated_at: Utc::now(),
        }
    }

    /// Répertoire de la playlist active
    pub fn active_dir(&self) -> Option<&Path> {
        self.active.as_deref().and_then(Path::parent)
    }
}

/// Entrée de `history.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationEntry {
    pub playlist: PathBuf,
    pub activated_at: DateTime<Utc>,
}

pub struct ActivePlaylistStore {
    record_path: PathBuf,
    history_path: PathBuf,
    videos_dir: PathBuf,
    default_playlist: PathBuf,
    current: Mutex<Option<ActivePlaylistRecord>>,
}

impl ActivePlaylistStore {
    /// Crée le store
    ///
    /// # Arguments
    ///
    /// * `state_dir` - Répertoire contenant `activePlaylist.json` et `history.json`
    /// * `videos_dir` - Répertoire des playlists, consulté à l'initialisation
    /// * `default_playlist` - Document utilisé quand rien n'a jamais été activé
    pub fn new(
        state_dir: impl AsRef<Path>,
        videos_dir: impl Into<PathBuf>,
        default_playlist: impl Into<PathBuf>,
    ) -> Self {
        let state_dir = state_dir.as_ref();
        Self {
            record_path: state_dir.join(ACTIVE_RECORD_FILE),
            history_path: state_dir.join(HISTORY_FILE),
            videos_dir: videos_dir.into(),
            default_playlist: default_playlist.into(),
            current: Mutex::new(None),
        }
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    pub fn default_playlist(&self) -> &Path {
        &self.default_playlist
    }

    /// Retourne l'enregistrement courant, en l'initialisant si besoin
    pub async fn read(&self) -> Result<ActivePlaylistRecord> {
        let mut current = self.current.lock().await;
        self.load_or_init(&mut current).await
    }

    /// Remplace la playlist active et retourne l'enregistrement précédent
    pub async fn update(&self, document: &Path) -> Result<ActivePlaylistRecord> {
        let mut current = self.current.lock().await;
        let previous = self.load_or_init(&mut current).await?;

        let record = ActivePlaylistRecord::new(Some(document.to_path_buf()));
        self.write_record(&record).await?;
        *current = Some(record.clone());

        let mut history = self.load_history().await?;
        history.push(ActivationEntry {
            playlist: document.to_path_buf(),
            activated_at: record.updated_at,
        });
        // l'enregistrement actif fait foi : un historique non écrit n'annule pas l'activation
        if let Err(e) = self.write_history(&history).await {
            tracing::warn!(error = %e, "Failed to append activation history");
        }

        tracing::info!(
            active = %document.display(),
            previous = ?previous.active,
            "Active playlist updated"
        );
        Ok(previous)
    }

    /// Historique des activations, de la plus ancienne à la plus récente
    pub async fn history(&self) -> Result<Vec<ActivationEntry>> {
        let _guard = self.current.lock().await;
        self.load_history().await
    }

    /// Vide l'historique des activations
    pub async fn clear_history(&self) -> Result<()> {
        let _guard = self.current.lock().await;
        self.write_history(&[]).await?;
        tracing::info!("Activation history cleared");
        Ok(())
    }

    async fn load_or_init(
        &self,
        current: &mut Option<ActivePlaylistRecord>,
    ) -> Result<ActivePlaylistRecord> {
        if let Some(record) = current.as_ref() {
            return Ok(record.clone());
        }

        let stored = match fs::read(&self.record_path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(
                        record = %self.record_path.display(),
                        error = %e,
                        "Unreadable active playlist record, initializing a new one"
                    );
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::io_at("reading", &self.record_path, e)),
        };
        let record = match stored {
            Some(record) => record,
            None => {
                let record = ActivePlaylistRecord::new(self.initial_active().await?);
                self.write_record(&record).await?;
                tracing::info!(active = ?record.active, "Active playlist record initialized");
                record
            }
        };

        *current = Some(record.clone());
        Ok(record)
    }

    /// Playlist par défaut, seulement sans historique ni répertoire de playlist
    async fn initial_active(&self) -> Result<Option<PathBuf>> {
        let history_empty = self.load_history().await?.is_empty();
        let dirs = list_playlist_dirs(&self.videos_dir).await?;
        if !history_empty || !dirs.is_empty() {
            return Ok(None);
        }

        match Playlist::load(&self.default_playlist).await {
            Ok(playlist) => {
                let missing = playlist.missing_entries().await;
                if playlist.is_empty() || !missing.is_empty() {
                    tracing::warn!(
                        playlist = %self.default_playlist.display(),
                        missing = missing.len(),
                        "Default playlist is unusable"
                    );
                    Ok(None)
                } else {
                    Ok(Some(self.default_playlist.clone()))
                }
            }
            Err(Error::NotFound(_)) => {
                tracing::warn!(
                    playlist = %self.default_playlist.display(),
                    "Default playlist not found"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn write_record(&self, record: &ActivePlaylistRecord) -> Result<()> {
        self.ensure_parent().await?;
        let json = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.record_path, &json).await
    }

    async fn load_history(&self) -> Result<Vec<ActivationEntry>> {
        match fs::read(&self.history_path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(history) => Ok(history),
                Err(e) => {
                    tracing::warn!(error = %e, "Unreadable activation history, starting a new one");
                    Ok(Vec::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::io_at("reading", &self.history_path, e)),
        }
    }

    async fn write_history(&self, history: &[ActivationEntry]) -> Result<()> {
        self.ensure_parent().await?;
        let json = serde_json::to_vec_pretty(history)?;
        write_atomic(&self.history_path, &json).await
    }

    async fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.record_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_at("creating", parent, e))?;
        }
        Ok(())
    }
}
