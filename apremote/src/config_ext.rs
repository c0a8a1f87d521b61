//! Extension d'apconfig pour le client de contrôle à distance

use crate::client::{ClientBuilder, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_MS};
use crate::{Result, VlcClient};
use std::time::Duration;

/// Trait d'extension pour `apconfig::Config`
///
/// Les valeurs sont lues sous `player.http` (hôte, port, mot de passe,
/// partagés avec les arguments de lancement de VLC) et `remote.timeout_ms`.
pub trait RemoteConfigExt {
    fn remote_host(&self) -> String;
    fn remote_port(&self) -> u16;
    fn remote_password(&self) -> String;
    fn remote_timeout(&self) -> Duration;

    /// Construit un [`VlcClient`] à partir de la configuration
    fn remote_client(&self) -> Result<VlcClient>;
}

impl RemoteConfigExt for apconfig::Config {
    fn remote_host(&self) -> String {
        self.get_string_or(&["player", "http", "host"], DEFAULT_HOST)
    }

    fn remote_port(&self) -> u16 {
        let port = self.get_u64_or(&["player", "http", "port"], DEFAULT_PORT as u64);
        u16::try_from(port).unwrap_or_else(|_| {
            tracing::warn!("Invalid VLC HTTP port {}, using default {}", port, DEFAULT_PORT);
            DEFAULT_PORT
        })
    }

    fn remote_password(&self) -> String {
        self.get_string_or(&["player", "http", "password"], "")
    }

    fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.get_u64_or(&["remote", "timeout_ms"], DEFAULT_REQUEST_TIMEOUT_MS))
    }

    fn remote_client(&self) -> Result<VlcClient> {
        ClientBuilder::new()
            .host(self.remote_host())
            .port(self.remote_port())
            .password(self.remote_password())
            .timeout(self.remote_timeout())
            .build()
    }
}
