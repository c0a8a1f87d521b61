//! Types d'erreurs pour apsession

use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Erreurs du gestionnaire de session de lecture
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Requête mal formée (ordinal hors séquence, total incohérent, playlist vide...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Opération incompatible avec l'état courant (lot déjà ouvert, playlist active...)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Lancement, arrêt ou redémarrage du lecteur impossible
    #[error("Player process error: {0}")]
    Process(String),

    #[error(transparent)]
    Remote(#[from] apremote::Error),

    #[error("Storage error while {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] anyhow::Error),
}

/// Type Result spécialisé pour apsession
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Construit une erreur de stockage à partir d'une erreur d'E/S
    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Storage {
            context: context.into(),
            source,
        }
    }

    /// Erreur de stockage portant sur un chemin
    pub(crate) fn io_at(action: &str, path: &Path, source: std::io::Error) -> Self {
        Error::storage(format!("{} {}", action, path.display()), source)
    }

    /// Catégorie stable exposée aux appelants
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Process(_) => ErrorKind::Process,
            Error::Remote(e) if e.is_connectivity() => ErrorKind::Connectivity,
            Error::Remote(e) if e.is_invalid_request() => ErrorKind::Validation,
            Error::Remote(_) => ErrorKind::Rejected,
            Error::Storage { .. } | Error::Serialization(_) | Error::Config(_) => {
                ErrorKind::Storage
            }
        }
    }

    /// Rapport sérialisable pour la couche HTTP
    pub fn report(&self) -> ErrorReport {
        ErrorReport::from(self)
    }
}

/// Catégories d'erreurs visibles par les appelants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Process,
    Connectivity,
    Rejected,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Process => "process",
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// `{ "kind": ..., "message": ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for ErrorReport {
    fn from(err: &Error) -> Self {
        ErrorReport {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
