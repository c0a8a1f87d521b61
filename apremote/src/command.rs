//! Supported VLC web-interface commands
//!
//! The web interface accepts free-form `command=` strings; only the subset
//! below is forwarded. Anything else is refused before a request is built.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// A command understood by `requests/status.xml`
#[derive(Debug, Clone, PartialEq)]
pub enum VlcCommand {
    /// Plain status query (no `command` parameter)
    Status,
    /// Resume playback, or play a given playlist item
    Play { id: Option<u32> },
    Pause,
    Stop,
    Next,
    Previous,
    /// Empty the current playlist
    ClearPlaylist,
    /// Add an MRL to the playlist and play it
    OpenFile { input: String },
    /// Add an MRL to the playlist without playing it
    Enqueue { input: String },
    /// Remove a playlist item
    DeleteItem { id: u32 },
    ToggleRandom,
    ToggleLoop,
    ToggleRepeat,
    ToggleFullscreen,
    /// Absolute (`256`), relative (`+20`, `-20`) or percent (`50%`) volume
    SetVolume { value: String },
    /// Absolute or relative seek, e.g. `120`, `+10`, `-10s`, `50%`
    Seek { value: String },
    SetRate { rate: f32 },
    /// Take a snapshot of the current video frame
    Snapshot,
}

impl VlcCommand {
    /// Builds an `OpenFile` command for a local file or playlist document
    pub fn open_path(path: &Path) -> Self {
        VlcCommand::OpenFile {
            input: format!("file://{}", path.display()),
        }
    }

    /// Public name of the command, as accepted by [`VlcCommand::parse`]
    pub fn name(&self) -> &'static str {
        match self {
            VlcCommand::Status => "status",
            VlcCommand::Play { .. } => "play",
            VlcCommand::Pause => "pause",
            VlcCommand::Stop => "stop",
            VlcCommand::Next => "next",
            VlcCommand::Previous => "previous",
            VlcCommand::ClearPlaylist => "clear",
            VlcCommand::OpenFile { .. } => "open",
            VlcCommand::Enqueue { .. } => "enqueue",
            VlcCommand::DeleteItem { .. } => "delete",
            VlcCommand::ToggleRandom => "random",
            VlcCommand::ToggleLoop => "loop",
            VlcCommand::ToggleRepeat => "repeat",
            VlcCommand::ToggleFullscreen => "fullscreen",
            VlcCommand::SetVolume { .. } => "volume",
            VlcCommand::Seek { .. } => "seek",
            VlcCommand::SetRate { .. } => "rate",
            VlcCommand::Snapshot => "snapshot",
        }
    }

    /// Value of the `command` query parameter, `None` for a status query
    pub fn wire_name(&self) -> Option<&'static str> {
        let name = match self {
            VlcCommand::Status => return None,
            VlcCommand::Play { .. } => "pl_play",
            VlcCommand::Pause => "pl_pause",
            VlcCommand::Stop => "pl_stop",
            VlcCommand::Next => "pl_next",
            VlcCommand::Previous => "pl_previous",
            VlcCommand::ClearPlaylist => "pl_empty",
            VlcCommand::OpenFile { .. } => "in_play",
            VlcCommand::Enqueue { .. } => "in_enqueue",
            VlcCommand::DeleteItem { .. } => "pl_delete",
            VlcCommand::ToggleRandom => "pl_random",
            VlcCommand::ToggleLoop => "pl_loop",
            VlcCommand::ToggleRepeat => "pl_repeat",
            VlcCommand::ToggleFullscreen => "fullscreen",
            VlcCommand::SetVolume { .. } => "volume",
            VlcCommand::Seek { .. } => "seek",
            VlcCommand::SetRate { .. } => "rate",
            VlcCommand::Snapshot => "snapshot",
        };
        Some(name)
    }

    /// Full query string parameters, `command` first
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(2);
        if let Some(name) = self.wire_name() {
            params.push(("command", name.to_string()));
        }
        match self {
            VlcCommand::Play { id: Some(id) } | VlcCommand::DeleteItem { id } => {
                params.push(("id", id.to_string()));
            }
            VlcCommand::OpenFile { input } | VlcCommand::Enqueue { input } => {
                params.push(("input", input.clone()));
            }
            VlcCommand::SetVolume { value } | VlcCommand::Seek { value } => {
                params.push(("val", value.clone()));
            }
            VlcCommand::SetRate { rate } => params.push(("val", rate.to_string())),
            _ => {}
        }
        params
    }

    /// Parses a command coming from an external caller
    ///
    /// `name` is the public command name (see [`VlcCommand::name`]) and
    /// `params` its arguments (`id`, `input`, `value`, `rate`).
    pub fn parse(name: &str, params: &HashMap<String, String>) -> Result<Self> {
        let name = name.trim().to_ascii_lowercase();
        let command = match name.as_str() {
            "status" => VlcCommand::Status,
            "play" => VlcCommand::Play {
                id: optional_id(&name, params)?,
            },
            "pause" => VlcCommand::Pause,
            "stop" => VlcCommand::Stop,
            "next" => VlcCommand::Next,
            "previous" => VlcCommand::Previous,
            "clear" => VlcCommand::ClearPlaylist,
            "open" => VlcCommand::OpenFile {
                input: required(&name, params, "input")?,
            },
            "enqueue" => VlcCommand::Enqueue {
                input: required(&name, params, "input")?,
            },
            "delete" => VlcCommand::DeleteItem {
                id: optional_id(&name, params)?
                    .ok_or_else(|| Error::invalid_parameter(&name, "missing 'id'"))?,
            },
            "random" => VlcCommand::ToggleRandom,
            "loop" => VlcCommand::ToggleLoop,
            "repeat" => VlcCommand::ToggleRepeat,
            "fullscreen" => VlcCommand::ToggleFullscreen,
            "volume" => VlcCommand::SetVolume {
                value: relative_value(&name, params, &['%'])?,
            },
            "seek" => VlcCommand::Seek {
                value: relative_value(&name, params, &['%', 's', 'm', 'h', ':'])?,
            },
            "rate" => {
                let raw = required(&name, params, "rate")?;
                let rate: f32 = raw
                    .parse()
                    .map_err(|_| Error::invalid_parameter(&name, format!("'{raw}' is not a number")))?;
                if !(rate.is_finite() && rate > 0.0) {
                    return Err(Error::invalid_parameter(&name, "rate must be positive"));
                }
                VlcCommand::SetRate { rate }
            }
            "snapshot" => VlcCommand::Snapshot,
            _ => return Err(Error::UnknownCommand(name)),
        };
        Ok(command)
    }
}

impl fmt::Display for VlcCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn required(command: &str, params: &HashMap<String, String>, key: &str) -> Result<String> {
    match params.get(key).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::invalid_parameter(command, format!("missing '{key}'"))),
    }
}

fn optional_id(command: &str, params: &HashMap<String, String>) -> Result<Option<u32>> {
    match params.get("id").map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::invalid_parameter(command, format!("'{raw}' is not a valid id"))),
    }
}

/// Accepts `[+-]digits` followed by any of the allowed unit characters
fn relative_value(
    command: &str,
    params: &HashMap<String, String>,
    units: &[char],
) -> Result<String> {
    let raw = required(command, params, "value")?;
    let body = raw.strip_prefix(['+', '-']).unwrap_or(&raw);
    let valid = body.starts_with(|c: char| c.is_ascii_digit())
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || units.contains(&c));
    if valid {
        Ok(raw)
    } else {
        Err(Error::invalid_parameter(
            command,
            format!("'{raw}' is not a valid value"),
        ))
    }
}
