//! # apremote - client de contrôle à distance de VLC
//!
//! Adaptateur sans état vers l'interface web de VLC (`--intf=http`) :
//!
//! - [`VlcCommand`] : vocabulaire fermé des commandes supportées, les noms
//!   inconnus sont refusés avant tout envoi
//! - [`VlcClient`] : envoi d'une commande (GET `requests/status.xml`) avec
//!   authentification basique et timeout, décodage du statut
//! - [`PlayerStatus`] / [`PlaylistNode`] : statut et arbre de playlist décodés
//!
//! Les erreurs distinguent un lecteur injoignable ([`Error::Connectivity`],
//! [`Error::Timeout`]) d'une commande refusée par le lecteur
//! ([`Error::Rejected`]).

mod client;
mod command;
mod error;
mod status;

#[cfg(feature = "apconfig")]
mod config_ext;

pub use client::{ClientBuilder, VlcClient, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_MS};
pub use command::VlcCommand;
pub use error::{Error, Result};
pub use status::{PlaybackState, PlayerStatus, PlaylistNode};

#[cfg(feature = "apconfig")]
pub use config_ext::RemoteConfigExt;
