use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Target MP3 bitrate in kbps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Bitrate {
    Kbps128,
    #[default]
    Kbps192,
    Kbps256,
    Kbps320,
}

impl Bitrate {
    pub const ALL: [Bitrate; 4] = [
        Bitrate::Kbps128,
        Bitrate::Kbps192,
        Bitrate::Kbps256,
        Bitrate::Kbps320,
    ];

    pub fn kbps(self) -> u32 {
        match self {
            Bitrate::Kbps128 => 128,
            Bitrate::Kbps192 => 192,
            Bitrate::Kbps256 => 256,
            Bitrate::Kbps320 => 320,
        }
    }
}

impl TryFrom<u32> for Bitrate {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Bitrate::ALL
            .into_iter()
            .find(|b| b.kbps() == value)
            .ok_or_else(|| format!("unsupported bitrate: {}", value))
    }
}

impl From<Bitrate> for u32 {
    fn from(bitrate: Bitrate) -> Self {
        bitrate.kbps()
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kbps", self.kbps())
    }
}

/// yt-dlp release track passed to `--update-to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateChannel {
    Stable,
    #[default]
    Nightly,
    Master,
}

impl UpdateChannel {
    pub const ALL: [UpdateChannel; 3] = [
        UpdateChannel::Stable,
        UpdateChannel::Nightly,
        UpdateChannel::Master,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UpdateChannel::Stable => "stable",
            UpdateChannel::Nightly => "nightly",
            UpdateChannel::Master => "master",
        }
    }

    /// GitHub repository publishing this channel's builds.
    pub fn release_repo(self) -> &'static str {
        match self {
            UpdateChannel::Stable => "yt-dlp/yt-dlp",
            UpdateChannel::Nightly => "yt-dlp/yt-dlp-nightly-builds",
            UpdateChannel::Master => "yt-dlp/yt-dlp-master-builds",
        }
    }
}

impl fmt::Display for UpdateChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A yt-dlp executable on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolBinary {
    pub path: PathBuf,
    pub version: Option<String>,
}

impl ToolBinary {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            version: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdaterState {
    Unresolved,
    LocalOnly,
    CheckedUpToDate,
    CheckedStale,
    Updated,
    UpdateFailed,
}

impl UpdaterState {
    /// Whether downloads may use the resolved binary.
    pub fn is_usable(self) -> bool {
        !matches!(self, UpdaterState::Unresolved)
    }
}

/// Result of one updater run, handed back to the UI.
#[derive(Debug, Clone)]
pub struct ToolResolution {
    pub state: UpdaterState,
    pub binary: Option<ToolBinary>,
    pub detail: Option<String>,
}

impl ToolResolution {
    pub fn summary(&self) -> String {
        let version = self
            .binary
            .as_ref()
            .and_then(|b| b.version.as_deref())
            .unwrap_or("unknown version");

        match self.state {
            UpdaterState::Unresolved => "yt-dlp could not be found or installed".to_string(),
            UpdaterState::LocalOnly => format!("yt-dlp ready ({})", version),
            UpdaterState::CheckedUpToDate => format!("yt-dlp is up to date ({})", version),
            UpdaterState::CheckedStale => format!("yt-dlp update available ({})", version),
            UpdaterState::Updated => format!("yt-dlp updated to {}", version),
            UpdaterState::UpdateFailed => {
                format!("yt-dlp update failed, keeping {}", version)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_from_kbps() {
        assert_eq!(Bitrate::try_from(320), Ok(Bitrate::Kbps320));
        assert!(Bitrate::try_from(160).is_err());
    }

    #[test]
    fn test_bitrate_serializes_as_integer() {
        let json = serde_json::to_value(Bitrate::Kbps256).unwrap();
        assert_eq!(json, serde_json::json!(256));
        let parsed: Bitrate = serde_json::from_value(serde_json::json!(128)).unwrap();
        assert_eq!(parsed, Bitrate::Kbps128);
    }

    #[test]
    fn test_channel_names() {
        let parsed: UpdateChannel = serde_json::from_str("\"master\"").unwrap();
        assert_eq!(parsed, UpdateChannel::Master);
        assert_eq!(UpdateChannel::Nightly.to_string(), "nightly");
        assert_eq!(
            UpdateChannel::Stable.release_repo(),
            "yt-dlp/yt-dlp"
        );
    }

    #[test]
    fn test_unresolved_is_not_usable() {
        assert!(!UpdaterState::Unresolved.is_usable());
        assert!(UpdaterState::UpdateFailed.is_usable());
    }
}
