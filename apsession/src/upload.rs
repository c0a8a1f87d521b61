//! Session d'upload : accumulation ordonnée de fichiers dans une playlist
//!
//! Un seul lot peut être ouvert à la fois. La session est une valeur unique
//! détenue derrière un mutex asynchrone, verrouillé pendant tout le
//! traitement d'un fichier (déplacement puis réécriture du document).

use crate::error::{Error, Result};
use crate::playlist::{playlist_name, Playlist};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};

/// Un fichier reçu par la couche HTTP
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Libellé du lot ; absent ou vide pour continuer le lot ouvert ou
    /// générer un nom
    pub batch_label: Option<String>,
    /// Nombre total de fichiers annoncé pour le lot
    pub declared_total: usize,
    /// Position du fichier dans le lot, à partir de 0
    pub ordinal: usize,
    /// Fichier temporaire déposé par la couche HTTP
    pub temp_file: PathBuf,
    pub original_name: String,
}

/// Avancement d'un lot après un fichier
#[derive(Debug, Clone, PartialEq)]
pub enum UploadProgress {
    InProgress {
        current: usize,
        total: usize,
        filename: String,
    },
    /// Dernier fichier reçu : la session est refermée
    Complete(Playlist),
}

/// Résultat exposé aux appelants
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadOutcome {
    InProgress {
        current: usize,
        total: usize,
        filename: String,
    },
    Complete {
        name: String,
        document: PathBuf,
        total_files: usize,
    },
}

impl From<&UploadProgress> for UploadOutcome {
    fn from(progress: &UploadProgress) -> Self {
        match progress {
            UploadProgress::InProgress {
                current,
                total,
                filename,
            } => UploadOutcome::InProgress {
                current: *current,
                total: *total,
                filename: filename.clone(),
            },
            UploadProgress::Complete(playlist) => UploadOutcome::Complete {
                name: playlist.name().to_string(),
                document: playlist.document_path(),
                total_files: playlist.len(),
            },
        }
    }
}

/// Lot en cours
#[derive(Debug, Clone, Serialize)]
pub struct UploadSession {
    playlist: Playlist,
    declared_total: usize,
}

impl UploadSession {
    pub fn name(&self) -> &str {
        self.playlist.name()
    }

    pub fn directory(&self) -> &Path {
        self.playlist.directory()
    }

    pub fn declared_total(&self) -> usize {
        self.declared_total
    }

    pub fn processed(&self) -> usize {
        self.playlist.len()
    }

    pub fn is_complete(&self) -> bool {
        self.processed() == self.declared_total
    }
}

/// Détenteur de l'unique session d'upload
pub struct UploadCoordinator {
    videos_dir: PathBuf,
    session: Mutex<Option<UploadSession>>,
}

impl UploadCoordinator {
    pub fn new(videos_dir: impl Into<PathBuf>) -> Self {
        Self {
            videos_dir: videos_dir.into(),
            session: Mutex::new(None),
        }
    }

    /// Ajoute un fichier au lot ouvert, ou ouvre un lot
    ///
    /// # Errors
    ///
    /// - `Conflict` si un autre lot est ouvert, ou si le répertoire du
    ///   nouveau lot existe déjà
    /// - `Validation` pour un ordinal hors séquence, un total incohérent ou
    ///   un nom de fichier invalide (la session reste ouverte)
    /// - `NotFound` si le fichier temporaire n'existe pas
    /// - `Storage` si le déplacement ou l'écriture échoue (la session est
    ///   abandonnée, les fichiers déjà reçus restent en place)
    pub async fn begin_or_continue(&self, request: UploadRequest) -> Result<UploadProgress> {
        if request.declared_total == 0 {
            return Err(Error::Validation("declared total must be at least 1".into()));
        }
        let filename = media_file_name(&request.original_name)?;

        let mut slot = self.session.lock().await;

        let label = request
            .batch_label
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());

        if let Some(session) = slot.as_ref() {
            if let Some(label) = label {
                let name = playlist_name(Some(label))?;
                if name != session.name() {
                    return Err(Error::Conflict(format!(
                        "batch '{}' is still open ({}/{} files), cannot start '{}'",
                        session.name(),
                        session.processed(),
                        session.declared_total,
                        name
                    )));
                }
            }
            if request.declared_total != session.declared_total {
                return Err(Error::Validation(format!(
                    "batch '{}' declared {} files, got {}",
                    session.name(),
                    session.declared_total,
                    request.declared_total
                )));
            }
        } else {
            if request.ordinal != 0 {
                return Err(Error::Validation(format!(
                    "no open batch: expected ordinal 0, got {}",
                    request.ordinal
                )));
            }
            *slot = Some(self.open(label, request.declared_total).await?);
        }

        let Some(session) = slot.as_mut() else {
            return Err(Error::Conflict("upload session vanished".into()));
        };

        if request.ordinal != session.processed() {
            return Err(Error::Validation(format!(
                "batch '{}' expects ordinal {}, got {}",
                session.name(),
                session.processed(),
                request.ordinal
            )));
        }

        let target = session.directory().join(&filename);
        if clashes_with_document(&filename, &session.playlist) {
            return Err(Error::Validation(format!(
                "file name '{}' is reserved for the playlist document of batch '{}'",
                filename,
                session.name()
            )));
        }
        if fs::try_exists(&target).await.unwrap_or(false) {
            return Err(Error::Validation(format!(
                "file '{}' already exists in batch '{}'",
                filename,
                session.name()
            )));
        }
        if !fs::try_exists(&request.temp_file).await.unwrap_or(false) {
            return Err(Error::NotFound(format!(
                "uploaded file {}",
                request.temp_file.display()
            )));
        }

        if let Err(e) = move_file(&request.temp_file, &target).await {
            return Err(abort_on_storage_error(&mut slot, e));
        }
        let Some(session) = slot.as_mut() else {
            return Err(Error::Conflict("upload session vanished".into()));
        };
        session.playlist.push(&target);
        if let Err(e) = session.playlist.write().await {
            return Err(abort_on_storage_error(&mut slot, e));
        }

        let (name, processed, total) = match slot.as_ref() {
            Some(s) => (s.name().to_string(), s.processed(), s.declared_total),
            None => return Err(Error::Conflict("upload session vanished".into())),
        };
        tracing::info!(
            batch = %name,
            file = %filename,
            current = processed,
            total,
            "File added to batch"
        );

        if slot.as_ref().is_some_and(UploadSession::is_complete) {
            let Some(done) = slot.take() else {
                return Err(Error::Conflict("upload session vanished".into()));
            };
            tracing::info!(batch = %name, files = total, "Batch complete");
            return Ok(UploadProgress::Complete(done.playlist));
        }

        Ok(UploadProgress::InProgress {
            current: processed,
            total,
            filename,
        })
    }

    /// Ferme le lot ouvert sans l'activer ; ses fichiers restent sur disque
    pub async fn abort(&self) -> Option<UploadSession> {
        let aborted = self.session.lock().await.take();
        if let Some(session) = &aborted {
            tracing::warn!(
                batch = %session.name(),
                processed = session.processed(),
                total = session.declared_total,
                "Batch aborted"
            );
        }
        aborted
    }

    /// Copie du lot ouvert
    pub async fn current(&self) -> Option<UploadSession> {
        self.session.lock().await.clone()
    }

    /// Répertoire du lot ouvert
    pub async fn open_directory(&self) -> Option<PathBuf> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.directory().to_path_buf())
    }

    /// Bloque l'ouverture et l'avancement des lots tant que le verrou est tenu
    pub async fn lock(&self) -> UploadLock<'_> {
        UploadLock {
            slot: self.session.lock().await,
        }
    }

    async fn open(&self, label: Option<&str>, declared_total: usize) -> Result<UploadSession> {
        let name = playlist_name(label)?;
        let directory = self.videos_dir.join(&name);
        if fs::try_exists(&directory).await.unwrap_or(false) {
            return Err(Error::Conflict(format!("playlist '{}' already exists", name)));
        }
        fs::create_dir_all(&directory)
            .await
            .map_err(|e| Error::io_at("creating", &directory, e))?;

        tracing::info!(batch = %name, directory = %directory.display(), "Batch opened");
        Ok(UploadSession {
            playlist: Playlist::new(name, directory),
            declared_total,
        })
    }
}

/// Accès exclusif à la session d'upload, voir [`UploadCoordinator::lock`]
pub struct UploadLock<'a> {
    slot: MutexGuard<'a, Option<UploadSession>>,
}

impl UploadLock<'_> {
    /// Répertoire du lot ouvert
    pub fn open_directory(&self) -> Option<&Path> {
        self.slot.as_ref().map(UploadSession::directory)
    }
}

fn abort_on_storage_error(slot: &mut Option<UploadSession>, err: Error) -> Error {
    if let Some(session) = slot.take() {
        tracing::error!(
            batch = %session.name(),
            processed = session.processed(),
            error = %err,
            "Storage failure, batch aborted (files kept)"
        );
    }
    err
}

/// Le document de la playlist et ses fichiers temporaires d'écriture
fn clashes_with_document(filename: &str, playlist: &Playlist) -> bool {
    let document = playlist.document_path();
    let Some(document_name) = document.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    filename == document_name || filename.starts_with(&format!(".{}.", document_name))
}

/// Nom de fichier sans composant de répertoire
fn media_file_name(original: &str) -> Result<String> {
    let name = Path::new(original.trim())
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::Validation(format!(
            "invalid file name '{}'",
            original
        )));
    }
    Ok(name)
}

/// Déplace un fichier, par copie puis suppression entre systèmes de fichiers
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!(
                from = %from.display(),
                error = %rename_err,
                "Rename failed, falling back to copy"
            );
            fs::copy(from, to)
                .await
                .map_err(|e| Error::io_at("copying to", to, e))?;
            if let Err(e) = fs::remove_file(from).await {
                tracing::warn!(file = %from.display(), error = %e, "Could not remove uploaded temp file");
            }
            Ok(())
        }
    }
}
