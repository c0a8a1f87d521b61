//! Documents de playlist M3U
//!
//! Une playlist occupe un répertoire `<videos>/<nom>/` contenant ses fichiers
//! média et le document `<nom>.m3u` : l'en-tête `#EXTM3U` puis un chemin
//! absolu par ligne, dans l'ordre des ordinaux. Le document est toujours
//! réécrit en entier dans un fichier temporaire puis renommé, il n'est donc
//! jamais observable à moitié écrit.

use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// En-tête des documents M3U étendus
pub const M3U_HEADER: &str = "#EXTM3U";

/// Extension des documents de playlist
pub const PLAYLIST_EXTENSION: &str = "m3u";

/// Préfixe des noms générés (`playlist_<unix-millis>`)
pub const GENERATED_PREFIX: &str = "playlist_";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Fichier média référencé par une playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistEntry {
    /// Position dans la playlist, contiguë à partir de 0
    pub ordinal: usize,
    pub path: PathBuf,
}

/// Playlist ordonnée adossée à un répertoire
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Playlist {
    name: String,
    directory: PathBuf,
    entries: Vec<PlaylistEntry>,
}

impl Playlist {
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Chemin du document `<répertoire>/<nom>.m3u`
    pub fn document_path(&self) -> PathBuf {
        document_path(&self.directory, &self.name)
    }

    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ajoute une entrée en fin de playlist avec l'ordinal suivant
    pub fn push(&mut self, path: impl Into<PathBuf>) -> &PlaylistEntry {
        let ordinal = self.entries.len();
        self.entries.push(PlaylistEntry {
            ordinal,
            path: path.into(),
        });
        &self.entries[ordinal]
    }

    /// Contenu du document M3U
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(16 + self.entries.len() * 64);
        out.push_str(M3U_HEADER);
        out.push('\n');
        for entry in &self.entries {
            out.push_str(&entry.path.to_string_lossy());
            out.push('\n');
        }
        out
    }

    /// Écrit le document de manière atomique
    pub async fn write(&self) -> Result<PathBuf> {
        let path = self.document_path();
        write_atomic(&path, self.render().as_bytes()).await?;
        tracing::debug!(
            playlist = %self.name,
            entries = self.entries.len(),
            "Playlist document written"
        );
        Ok(path)
    }

    /// Charge un document existant
    ///
    /// Le nom est le nom du fichier sans extension, le répertoire son parent.
    pub async fn load(document: &Path) -> Result<Self> {
        let content = match fs::read_to_string(document).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "playlist document {}",
                    document.display()
                )));
            }
            Err(e) => return Err(Error::io_at("reading", document, e)),
        };

        let name = document
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let directory = document
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut playlist = Playlist::new(name, directory);
        for path in parse_document(&content) {
            playlist.push(path);
        }
        Ok(playlist)
    }

    /// Entrées dont le fichier média n'existe pas
    pub async fn missing_entries(&self) -> Vec<PathBuf> {
        let mut missing = Vec::new();
        for entry in &self.entries {
            if !fs::try_exists(&entry.path).await.unwrap_or(false) {
                missing.push(entry.path.clone());
            }
        }
        missing
    }
}

/// Chemins référencés par un document M3U (commentaires et lignes vides ignorés)
pub fn parse_document(content: &str) -> Vec<PathBuf> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| PathBuf::from(line.strip_prefix("file://").unwrap_or(line)))
        .collect()
}

pub fn document_path(directory: &Path, name: &str) -> PathBuf {
    directory.join(format!("{}.{}", name, PLAYLIST_EXTENSION))
}

/// Remplace `path` par `bytes` via un fichier temporaire du même répertoire
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let result = async {
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| Error::io_at("creating", &tmp, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| Error::io_at("writing", &tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| Error::io_at("syncing", &tmp, e))?;
        drop(file);
        fs::rename(&tmp, path)
            .await
            .map_err(|e| Error::io_at("replacing", path, e))
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    result
}

/// Nom de playlist généré : `playlist_<unix-millis>`
pub fn generated_name() -> String {
    format!(
        "{}{}",
        GENERATED_PREFIX,
        chrono::Utc::now().timestamp_millis()
    )
}

/// Normalise le libellé d'un lot en nom de playlist
///
/// Retire une extension `.m3u` éventuelle et génère un nom quand le libellé
/// est absent ou vide. Les libellés contenant un séparateur de chemin ou
/// désignant `.`/`..` sont refusés.
pub fn playlist_name(label: Option<&str>) -> Result<String> {
    let raw = label.map(str::trim).unwrap_or_default();
    let raw = raw
        .strip_suffix(&format!(".{}", PLAYLIST_EXTENSION))
        .unwrap_or(raw)
        .trim();

    if raw.is_empty() {
        return Ok(generated_name());
    }
    if raw == "." || raw == ".." || raw.contains(['/', '\\', '\0']) {
        return Err(Error::Validation(format!("invalid playlist name '{}'", raw)));
    }
    Ok(raw.to_string())
}

/// Sous-répertoires directs de `videos`, triés par nom
pub async fn list_playlist_dirs(videos: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let mut read_dir = match fs::read_dir(videos).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(dirs),
        Err(e) => return Err(Error::io_at("listing", videos, e)),
    };

    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| Error::io_at("listing", videos, e))?
    {
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        if is_dir {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Document d'une playlist dans son répertoire
///
/// `<répertoire>/<nom>.m3u` en priorité, sinon le premier `.m3u` par ordre
/// alphabétique.
pub async fn find_document(directory: &Path) -> Result<PathBuf> {
    let name = directory
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let preferred = document_path(directory, &name);
    if fs::try_exists(&preferred).await.unwrap_or(false) {
        return Ok(preferred);
    }

    let mut candidates = Vec::new();
    let mut read_dir = match fs::read_dir(directory).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(format!("playlist '{}'", name)));
        }
        Err(e) => return Err(Error::io_at("listing", directory, e)),
    };
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| Error::io_at("listing", directory, e))?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == PLAYLIST_EXTENSION) {
            candidates.push(path);
        }
    }
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound(format!("no playlist document in {}", directory.display())))
}
