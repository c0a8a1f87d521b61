//! # apsession - Gestionnaire de session de lecture d'App Player
//!
//! Cette crate pilote un lecteur VLC autonome :
//! - Écriture des documents de playlist M3U (écriture atomique)
//! - Pointeur persistant vers la playlist active, avec historique
//! - Supervision du processus VLC (watchdog, redémarrage sur crash, backoff)
//! - Sessions d'upload ordonnées, un lot à la fois
//! - Orchestration de l'activation et nettoyage des playlists obsolètes
//!
//! # Architecture
//!
//! - **PlaybackManager** : point d'entrée, sérialise les activations
//! - **UploadCoordinator** : détient l'unique session d'upload
//! - **ActivePlaylistStore** : `activePlaylist.json` et `history.json`
//! - **ProcessSupervisor** : possède le processus lecteur
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use apsession::{SessionConfigExt, UploadRequest};
//!
//! # #[tokio::main]
//! # async fn main() -> apsession::Result<()> {
//! let config = apconfig::get_config();
//! let manager = config.playback_manager()?;
//! manager.start().await?;
//!
//! let outcome = manager
//!     .handle_upload(UploadRequest {
//!         batch_label: Some("evening".into()),
//!         declared_total: 1,
//!         ordinal: 0,
//!         temp_file: "/tmp/upload-1234".into(),
//!         original_name: "intro.mp4".into(),
//!     })
//!     .await?;
//! println!("{:?}", outcome);
//!
//! manager.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod active;
mod error;
mod manager;
mod playlist;
mod supervisor;
mod upload;

#[cfg(feature = "apconfig")]
mod config_ext;

// Réexports publics
pub use active::{
    ActivationEntry, ActivePlaylistRecord, ActivePlaylistStore, ACTIVE_RECORD_FILE, HISTORY_FILE,
};
pub use error::{Error, ErrorKind, ErrorReport, Result};
pub use manager::{
    ActivationReport, ActivationStrategy, DeletionReport, ManagerBuilder, ManagerStatus,
    PlaybackManager, PlaylistSummary,
};
pub use playlist::{
    find_document, generated_name, list_playlist_dirs, parse_document, playlist_name,
    write_atomic, Playlist, PlaylistEntry, GENERATED_PREFIX, M3U_HEADER, PLAYLIST_EXTENSION,
};
pub use supervisor::{
    PlayerLauncher, ProcessSupervisor, SupervisorSettings, SupervisorState, SupervisorStatus,
    VlcLauncher,
};
pub use upload::{
    UploadCoordinator, UploadLock, UploadOutcome, UploadProgress, UploadRequest, UploadSession,
};

#[cfg(feature = "apconfig")]
pub use config_ext::SessionConfigExt;
