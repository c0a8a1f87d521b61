//! Construction de la ligne de commande du lecteur

use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command;

/// Produit la commande qui lance le lecteur sur un document de playlist
///
/// Le superviseur complète la commande (entrées/sorties, `kill_on_drop`)
/// avant de la lancer.
pub trait PlayerLauncher: Send + Sync {
    /// Nom du programme, pour les journaux
    fn program(&self) -> String;

    fn command(&self, playlist: &Path) -> Command;
}

/// Lanceur de VLC avec son interface HTTP
#[derive(Debug, Clone)]
pub struct VlcLauncher {
    binary: String,
    http_host: String,
    http_port: u16,
    http_password: String,
    extra_args: Vec<String>,
}

impl VlcLauncher {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            http_host: apremote::DEFAULT_HOST.to_string(),
            http_port: apremote::DEFAULT_PORT,
            http_password: String::new(),
            extra_args: vec!["--no-audio".to_string()],
        }
    }

    pub fn http(mut self, host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        self.http_host = host.into();
        self.http_port = port;
        self.http_password = password.into();
        self
    }

    /// Remplace les arguments ajoutés après les options fixes
    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Arguments complets, document de playlist en dernier
    pub fn args(&self, playlist: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--loop",
            "--no-video-title-show",
            "--no-video-deco",
            "--no-mouse-events",
            "--intf=http",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        args.push(format!("--http-host={}", self.http_host).into());
        args.push(format!("--http-port={}", self.http_port).into());
        args.push(format!("--http-password={}", self.http_password).into());
        args.extend(self.extra_args.iter().map(OsString::from));
        args.push(playlist.as_os_str().to_owned());
        args
    }
}

impl PlayerLauncher for VlcLauncher {
    fn program(&self) -> String {
        self.binary.clone()
    }

    fn command(&self, playlist: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(self.args(playlist));
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlc_arguments() {
        let launcher = VlcLauncher::new("vlc").http("localhost", 8080, "tecno");
        let args: Vec<String> = launcher
            .args(Path::new("/srv/videos/evening/evening.m3u"))
            .into_iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert_eq!(
            args,
            vec![
                "--loop",
                "--no-video-title-show",
                "--no-video-deco",
                "--no-mouse-events",
                "--intf=http",
                "--http-host=localhost",
                "--http-port=8080",
                "--http-password=tecno",
                "--no-audio",
                "/srv/videos/evening/evening.m3u",
            ]
        );
    }

    #[test]
    fn test_extra_args_replace_default() {
        let launcher = VlcLauncher::new("cvlc").extra_args(vec!["--fullscreen".into()]);
        let args = launcher.args(Path::new("/p.m3u"));
        assert!(args.contains(&OsString::from("--fullscreen")));
        assert!(!args.contains(&OsString::from("--no-audio")));
        assert_eq!(launcher.program(), "cvlc");
    }
}
