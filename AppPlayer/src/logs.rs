//! Initialisation du logging
//!
//! Le niveau minimal vient de `host.logger.min_level` et peut être changé à
//! chaud via [`LogControl`]. La sortie console est optionnelle
//! (`host.logger.enable_console`).

use apconfig::Config;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Registry, reload};

/// Poignée sur le filtre de niveau installé
#[derive(Clone)]
pub struct LogControl {
    handle: reload::Handle<LevelFilter, Registry>,
}

impl LogControl {
    /// Change le niveau minimal ; un nom inconnu est refusé
    pub fn set_level(&self, level: &str) -> Result<LevelFilter, String> {
        let filter = string_to_level(level)
            .map(LevelFilter::from_level)
            .ok_or_else(|| format!("unknown log level '{}'", level))?;
        self.handle
            .modify(|current| *current = filter)
            .map_err(|e| e.to_string())?;
        Ok(filter)
    }

    /// Applique `host.logger.min_level` tel qu'il est lu dans `config`
    pub fn apply_config(&self, config: &Config) -> Result<LevelFilter, String> {
        let level = config.get_log_min_level().map_err(|e| e.to_string())?;
        self.set_level(&level)
    }

    pub fn level(&self) -> Option<LevelFilter> {
        self.handle.clone_current()
    }
}

/// Installe le subscriber global
pub fn init_logging(config: &Config) -> LogControl {
    let level = config
        .get_log_min_level()
        .ok()
        .and_then(|l| string_to_level(&l))
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::INFO);

    let (filter, handle) = reload::Layer::new(level);
    let subscriber = Registry::default().with(filter);

    if config.get_log_enable_console().unwrap_or(true) {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    } else {
        subscriber.init();
    }

    LogControl { handle }
}

fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}
