mod logs;

use apsession::SessionConfigExt;
use tokio::signal::{self, unix};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = apconfig::get_config();
    let log = logs::init_logging(&config);
    info!(level = ?log.level(), "Logging initialized");

    // ========== Démarrage ==========
    let manager = config.playback_manager()?;
    info!(
        videos = %manager.videos_dir().display(),
        strategy = %manager.strategy(),
        "Playback manager ready"
    );

    let record = manager.start().await?;
    match &record.active {
        Some(playlist) => info!(playlist = %playlist.display(), "AppPlayer is running"),
        None => warn!("AppPlayer is idle: no playlist to play"),
    }

    // SIGHUP relit config.yaml et applique le niveau de log
    let mut hangup = unix::signal(unix::SignalKind::hangup())?;
    let config_dir = config.directory().to_string();
    let reloader = log.clone();
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            let applied = apconfig::Config::load_config(&config_dir)
                .map_err(|e| e.to_string())
                .and_then(|fresh| reloader.apply_config(&fresh));
            match applied {
                Ok(level) => info!(%level, "Log level reloaded"),
                Err(e) => warn!(error = %e, "Log level not reloaded"),
            }
        }
    });

    // ========== Arrêt ==========
    info!("Press Ctrl+C to stop...");
    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");

    manager.shutdown().await?;
    info!("AppPlayer stopped");
    Ok(())
}
