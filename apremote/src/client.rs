//! HTTP client for the VLC web interface
//!
//! VLC answers every `requests/status.xml` call, with or without a
//! `command` parameter, with its current status document. The client is
//! therefore a thin request/response adapter: one GET per command, decoded
//! into a [`PlayerStatus`].
//!
//! # Example
//!
//! ```no_run
//! use apremote::{VlcClient, VlcCommand};
//!
//! # async fn example() -> apremote::Result<()> {
//! let client = VlcClient::builder().port(8080).password("secret").build()?;
//!
//! client.execute(&VlcCommand::ClearPlaylist).await?;
//! let status = client.status().await?;
//! println!("{:?} item {:?}", status.state, status.current_item);
//! # Ok(())
//! # }
//! ```

use crate::command::VlcCommand;
use crate::error::{Error, Result};
use crate::status::{PlayerStatus, PlaylistNode};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;

/// Default host of the VLC web interface
pub const DEFAULT_HOST: &str = "localhost";

/// Default port of the VLC web interface
pub const DEFAULT_PORT: u16 = 8080;

/// Default timeout for a remote-control round-trip (5 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

const STATUS_PATH: &str = "/requests/status.xml";
const PLAYLIST_PATH: &str = "/requests/playlist.json";

/// Stateless client for the player's remote-control endpoint
#[derive(Debug, Clone)]
pub struct VlcClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    timeout: Duration,
}

impl VlcClient {
    /// Create a builder for configuring the client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Base URL of the web interface, e.g. `http://localhost:8080`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends a command and returns the status reported afterwards
    pub async fn execute(&self, command: &VlcCommand) -> Result<PlayerStatus> {
        let url = format!("{}{}", self.base_url, STATUS_PATH);
        tracing::debug!(command = %command, "Sending VLC command");

        let body = self.get(&url, command.name(), &command.query()).await?;
        PlayerStatus::from_xml(&body)
    }

    /// Current player status
    pub async fn status(&self) -> Result<PlayerStatus> {
        self.execute(&VlcCommand::Status).await
    }

    /// Playlist tree as exposed by `requests/playlist.json`
    pub async fn playlist(&self) -> Result<PlaylistNode> {
        let url = format!("{}{}", self.base_url, PLAYLIST_PATH);
        let body = self.get(&url, "playlist", &[]).await?;
        PlaylistNode::from_json(&body)
    }

    /// Replaces the playing playlist with the given document
    ///
    /// Issues `pl_empty` then `in_play`; the second request is not sent if
    /// the first one fails.
    pub async fn load_playlist(&self, document: &Path) -> Result<PlayerStatus> {
        self.execute(&VlcCommand::ClearPlaylist).await?;
        self.execute(&VlcCommand::open_path(document)).await
    }

    async fn get(&self, url: &str, command: &str, query: &[(&str, String)]) -> Result<String> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .query(query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(e, url, self.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::from_reqwest(e, url, self.timeout))?;

        if !status.is_success() {
            tracing::warn!(command, status = status.as_u16(), "VLC rejected command");
            return Err(Error::Rejected {
                command: command.to_string(),
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        Ok(body)
    }
}

/// Builder for [`VlcClient`]
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    client: Option<Client>,
    host: String,
    port: u16,
    username: String,
    password: String,
    timeout: Duration,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            client: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom reqwest client (shared connection pool, proxy...)
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// VLC uses an empty user name by default
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Timeout applied to every round-trip
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<VlcClient> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| Error::Client(e.to_string()))?,
        };

        Ok(VlcClient {
            client,
            base_url: format!("http://{}:{}", self.host, self.port),
            username: self.username,
            password: self.password,
            timeout: self.timeout,
        })
    }
}
