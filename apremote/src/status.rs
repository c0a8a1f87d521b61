//! Decoding of the player's status and playlist documents

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Playback state reported by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
    Unknown,
}

impl From<&str> for PlaybackState {
    fn from(value: &str) -> Self {
        match value.trim() {
            "playing" => PlaybackState::Playing,
            "paused" => PlaybackState::Paused,
            "stopped" | "" => PlaybackState::Stopped,
            _ => PlaybackState::Unknown,
        }
    }
}

/// Structured view of `requests/status.xml`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStatus {
    pub state: PlaybackState,
    /// Playlist id of the current item, `None` when nothing is loaded
    pub current_item: Option<i64>,
    pub fullscreen: bool,
    /// Raw VLC volume (256 = 100%)
    pub volume: u32,
    /// Position in the current item, between 0.0 and 1.0
    pub position: f64,
    /// Length of the current item in seconds
    pub length: u64,
    /// Elapsed time in seconds
    pub time: u64,
}

// Every element is optional: VLC omits most of them when idle.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatusDocument {
    state: Option<String>,
    currentplid: Option<String>,
    fullscreen: Option<String>,
    volume: Option<String>,
    length: Option<String>,
    position: Option<String>,
    time: Option<String>,
}

impl PlayerStatus {
    /// Decodes a status document
    ///
    /// Missing or malformed fields fall back to an idle value rather than
    /// failing the whole decode; only a document that is not XML is an error.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let doc: StatusDocument =
            quick_xml::de::from_str(xml).map_err(|e| Error::Decode(e.to_string()))?;

        let current_item = doc
            .currentplid
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|id| *id >= 0);

        let fullscreen = matches!(
            doc.fullscreen.as_deref().map(str::trim),
            Some("1") | Some("true")
        );

        Ok(PlayerStatus {
            state: doc
                .state
                .as_deref()
                .map(PlaybackState::from)
                .unwrap_or(PlaybackState::Stopped),
            current_item,
            fullscreen,
            volume: parse_or_zero(doc.volume.as_deref()),
            position: doc
                .position
                .as_deref()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .unwrap_or(0.0),
            length: parse_or_zero(doc.length.as_deref()),
            time: parse_or_zero(doc.time.as_deref()),
        })
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }
}

fn parse_or_zero<T: std::str::FromStr + Default>(raw: Option<&str>) -> T {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or_default()
}

/// Node of `requests/playlist.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistNode {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// `node` or `leaf`
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub duration: Option<i64>,
    /// Present (`"current"`) on the item being played
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub children: Vec<PlaylistNode>,
}

impl PlaylistNode {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Playable items, depth first
    pub fn leaves(&self) -> Vec<&PlaylistNode> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a PlaylistNode>) {
        if self.kind == "leaf" {
            out.push(self);
        }
        for child in &self.children {
            child.collect_leaves(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYING: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="yes" ?>
<root>
<fullscreen>true</fullscreen>
<aspectratio>default</aspectratio>
<audiodelay>0</audiodelay>
<apiversion>3</apiversion>
<currentplid>4</currentplid>
<time>42</time>
<volume>256</volume>
<length>120</length>
<random>false</random>
<audiofilters>
  <filter_0></filter_0>
</audiofilters>
<rate>1</rate>
<state>playing</state>
<loop>true</loop>
<version>3.0.18 Vetinari</version>
<position>0.35</position>
<repeat>false</repeat>
<information>
  <category name="meta">
    <info name='filename'>intro.mp4</info>
  </category>
</information>
</root>"#;

    #[test]
    fn test_decode_playing_status() {
        let status = PlayerStatus::from_xml(PLAYING).unwrap();
        assert_eq!(status.state, PlaybackState::Playing);
        assert_eq!(status.current_item, Some(4));
        assert!(status.fullscreen);
        assert_eq!(status.volume, 256);
        assert_eq!(status.length, 120);
        assert_eq!(status.time, 42);
        assert!((status.position - 0.35).abs() < f64::EPSILON);
        assert!(status.is_playing());
    }

    #[test]
    fn test_decode_idle_status() {
        let xml = "<root><fullscreen>0</fullscreen><currentplid>-1</currentplid><state>stopped</state></root>";
        let status = PlayerStatus::from_xml(xml).unwrap();
        assert_eq!(status.state, PlaybackState::Stopped);
        assert_eq!(status.current_item, None);
        assert!(!status.fullscreen);
        assert_eq!(status.volume, 0);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            PlayerStatus::from_xml("<root><state>"),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_playlist_leaves() {
        let json = r#"{"ro":"rw","type":"node","name":"","id":"1","children":[
            {"ro":"ro","type":"node","name":"Playlist","id":"2","children":[
                {"ro":"rw","type":"leaf","name":"a.mp4","id":"4","duration":12,"uri":"file:///v/a.mp4","current":"current"},
                {"ro":"rw","type":"leaf","name":"b.mp4","id":"5","duration":30,"uri":"file:///v/b.mp4"}
            ]},
            {"ro":"ro","type":"node","name":"Media Library","id":"3","children":[]}
        ]}"#;
        let root = PlaylistNode::from_json(json).unwrap();
        let leaves = root.leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].uri.as_deref(), Some("file:///v/a.mp4"));
        assert_eq!(leaves[0].current.as_deref(), Some("current"));
        assert_eq!(leaves[1].duration, Some(30));
    }
}
