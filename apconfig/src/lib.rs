//! # App Player Configuration Module
//!
//! This module provides configuration management for App Player, including:
//! - Loading configuration from YAML files
//! - Merging with the embedded default configuration
//! - Environment variable overrides
//! - Typed accessors used by the extension traits of the other crates
//! - Thread-safe singleton access pattern
//!
//! ## Usage
//!
//! ```no_run
//! use apconfig::get_config;
//!
//! let config = get_config();
//! let videos = config.get_managed_dir(&["paths", "videos"], "videos")?;
//! let level = config.get_log_min_level()?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Domain specific settings (player, watchdog, remote control) are exposed by
//! extension traits living next to the code that consumes them, e.g.
//! `apsession::SessionConfigExt` or `apremote::RemoteConfigExt`.

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::info;

// Default configuration shipped with the binary
const DEFAULT_CONFIG: &str = include_str!("appplayer.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load App Player configuration"));
}

const ENV_CONFIG_DIR: &str = "APPPLAYER_CONFIG";
const ENV_PREFIX: &str = "APPPLAYER_CONFIG__";
const CONFIG_DIR_NAME: &str = ".appplayer";

const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

/// Generates a getter/setter pair for a boolean value with a default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration manager for App Player
///
/// Holds the merged YAML tree behind a mutex and writes every modification
/// back to `config.yaml` in the configuration directory.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = match self.data.lock() {
            Ok(data) => data.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        CONFIG_DIR_NAME.to_string()
    }

    /// Creates the directory if needed and checks it is readable and writable
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let probe = path.join(".write_test");
        fs::write(&probe, b"test")?;
        fs::remove_file(&probe)?;

        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `APPPLAYER_CONFIG` environment variable
    /// 3. `.appplayer` in the current directory
    /// 4. `.appplayer` in the user's home directory
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// The embedded defaults are merged with `config.yaml` when present,
    /// keys are lower-cased, `APPPLAYER_CONFIG__*` overrides are applied and
    /// the merged tree is saved back.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut config_value = Self::lower_keys_value(serde_yaml::from_str(DEFAULT_CONFIG)?);

        if let Ok(data) = fs::read(&path) {
            info!(config_file = %path, "Loaded config file");
            let external_value = Self::lower_keys_value(serde_yaml::from_slice(&data)?);
            merge_yaml(&mut config_value, &external_value);
        } else {
            info!(config_file = %path, "Config file not found, using default embedded config");
        }

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Directory holding `config.yaml`; relative paths are resolved against it
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    fn data(&self) -> Result<MutexGuard<'_, Value>> {
        self.data
            .lock()
            .map_err(|_| anyhow!("configuration lock poisoned"))
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let data = self.data()?;
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// `path` is an array of keys such as `&["player", "http", "port"]`.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data()?;
        Self::set_value_internal(&mut data, path, value)?;
        drop(data);
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data()?;
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                match map.get(&Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                }
            } else {
                return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    /// Reads an unsigned integer, accepting numbers and numeric strings
    pub fn get_u64_or(&self, path: &[&str], default: u64) -> u64 {
        match self.get_value(path) {
            Ok(Value::Number(n)) => n.as_u64().unwrap_or_else(|| {
                tracing::warn!(path = %path.join("."), "Negative or float value, using default {}", default);
                default
            }),
            Ok(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(path = %path.join("."), value = %s, "Invalid number, using default {}", default);
                default
            }),
            _ => default,
        }
    }

    /// Reads a string value, falling back to `default` when absent or empty
    pub fn get_string_or(&self, path: &[&str], default: &str) -> String {
        match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            Ok(Value::Number(n)) => n.to_string(),
            _ => default.to_string(),
        }
    }

    /// Reads a list of strings; scalars are accepted as a one-element list
    pub fn get_string_list_or(&self, path: &[&str], default: &[&str]) -> Vec<String> {
        match self.get_value(path) {
            Ok(Value::Sequence(seq)) => seq
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            Ok(Value::String(s)) => vec![s],
            _ => default.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(e) = Self::set_value_internal(config, &key_path, yaml_value) {
                    tracing::warn!(variable = %key, "Ignoring environment override: {}", e);
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Resolves a path against the configuration directory when relative
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        }
    }

    /// Returns a directory managed by the configuration, creating it if needed
    ///
    /// When the key is missing, `default` is written into the configuration
    /// first so that the effective value is visible in `config.yaml`.
    ///
    /// ```no_run
    /// use apconfig::get_config;
    ///
    /// let config = get_config();
    /// let state_dir = config.get_managed_dir(&["paths", "state"], "state")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<PathBuf> {
        let dir_path = match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };

        let absolute_path = self.resolve_path(&dir_path);
        if !absolute_path.exists() {
            fs::create_dir_all(&absolute_path)?;
            info!(directory = %absolute_path.display(), "Created managed directory");
        }
        Ok(absolute_path)
    }

    /// Sets a directory managed by the configuration
    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    /// Returns a file path from the configuration without creating anything
    pub fn get_managed_file(&self, path: &[&str], default: &str) -> PathBuf {
        let raw = self.get_string_or(path, default);
        self.resolve_path(&raw)
    }

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    /// Minimum log level (`ERROR`, `WARN`, `INFO`, `DEBUG`, `TRACE`)
    pub fn get_log_min_level(&self) -> Result<String> {
        Ok(self.get_string_or(&["host", "logger", "min_level"], DEFAULT_LOG_MIN_LEVEL))
    }

    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }
}

/// Returns the global configuration instance
///
/// The configuration is loaded lazily on first access.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Merges external YAML configuration into default configuration
///
/// Mappings are merged key by key; scalars and sequences from `external`
/// replace the default ones.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}
