use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};

use super::process::{query_version, run_with_timeout};
use super::{binary_name, ToolError, ToolLocator};
use crate::api::ReleaseClient;
use crate::config::Settings;
use crate::domain::{ToolBinary, ToolResolution, UpdateChannel, UpdaterState};
use crate::utils::is_executable;

/// Output fragments yt-dlp prints when it refuses to self-update because it
/// is owned by pip, Homebrew, a distro package or similar.
const PACKAGE_MANAGER_PHRASES: [&str; 4] = [
    "use that to update",
    "package manager",
    "installed yt-dlp with pip",
    "pip or setup.py",
];

#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    pub channel: UpdateChannel,
    pub auto_update: bool,
    pub managed_dir: PathBuf,
    pub version_timeout: Duration,
    pub self_update_timeout: Duration,
    pub package_manager_timeout: Duration,
}

impl UpdaterConfig {
    pub fn from_settings(settings: &Settings, managed_dir: PathBuf) -> Self {
        Self {
            channel: settings.ytdlp_update_channel,
            auto_update: settings.ytdlp_auto_update,
            managed_dir,
            ..Self::default()
        }
    }
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            channel: UpdateChannel::default(),
            auto_update: true,
            managed_dir: crate::config::managed_bin_dir(),
            version_timeout: Duration::from_secs(10),
            self_update_timeout: Duration::from_secs(30),
            package_manager_timeout: Duration::from_secs(90),
        }
    }
}

/// Package manager command used when yt-dlp cannot update itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManager {
    program: String,
    args: Vec<String>,
}

impl PackageManager {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn pip() -> Self {
        let python = if cfg!(target_os = "windows") { "python" } else { "python3" };
        Self::new(python, &["-m", "pip", "install", "--upgrade", "yt-dlp"])
    }

    pub fn homebrew() -> Self {
        Self::new("brew", &["upgrade", "yt-dlp"])
    }

    /// Picks Homebrew for binaries under a Homebrew prefix, pip otherwise.
    pub fn detect(binary: &Path) -> Self {
        let path = binary.to_string_lossy().to_lowercase();
        if ["homebrew", "cellar", "linuxbrew"]
            .iter()
            .any(|marker| path.contains(marker))
        {
            Self::homebrew()
        } else {
            Self::pip()
        }
    }

    async fn upgrade(&self, timeout: Duration) -> Result<(), ToolError> {
        info!("Updating yt-dlp via {} {}", self.program, self.args.join(" "));
        let output = run_with_timeout(&self.program, &self.args, timeout).await?;
        if output.success {
            Ok(())
        } else {
            Err(ToolError::Failed {
                program: self.program.clone(),
                message: output.diagnostic(),
            })
        }
    }
}

enum VersionCheck {
    Unknown,
    Current,
    Stale { local: String, latest: String },
}

/// Makes sure a usable yt-dlp exists and is reasonably fresh.
///
/// Network and version-check failures never block usage: the located binary
/// is accepted as-is. Update failures leave the old binary in place.
pub struct ToolUpdater {
    config: UpdaterConfig,
    locator: ToolLocator,
    client: ReleaseClient,
    package_manager: Option<PackageManager>,
}

impl ToolUpdater {
    pub fn new(config: UpdaterConfig, locator: ToolLocator, client: ReleaseClient) -> Self {
        Self {
            config,
            locator,
            client,
            package_manager: None,
        }
    }

    /// Overrides package manager detection.
    pub fn with_package_manager(mut self, package_manager: PackageManager) -> Self {
        self.package_manager = Some(package_manager);
        self
    }

    pub fn managed_path(&self) -> PathBuf {
        self.config.managed_dir.join(binary_name())
    }

    pub async fn resolve(&self) -> ToolResolution {
        let Some(mut binary) = self.acquire().await else {
            return ToolResolution {
                state: UpdaterState::Unresolved,
                binary: None,
                detail: Some(unavailable_hint()),
            };
        };

        if !self.config.auto_update {
            binary.version = self.local_version(&binary.path).await;
            return ToolResolution {
                state: UpdaterState::LocalOnly,
                binary: Some(binary),
                detail: None,
            };
        }

        match self.check(&mut binary).await {
            VersionCheck::Unknown => ToolResolution {
                state: UpdaterState::LocalOnly,
                binary: Some(binary),
                detail: Some("Could not check for yt-dlp updates".to_string()),
            },
            VersionCheck::Current => ToolResolution {
                state: UpdaterState::CheckedUpToDate,
                binary: Some(binary),
                detail: None,
            },
            VersionCheck::Stale { local, latest } => {
                info!("yt-dlp {} is stale, latest is {}", local, latest);
                match self.update(&binary.path).await {
                    Ok(()) => {
                        binary.version = self.local_version(&binary.path).await;
                        info!("yt-dlp updated to {:?}", binary.version);
                        ToolResolution {
                            state: UpdaterState::Updated,
                            binary: Some(binary),
                            detail: None,
                        }
                    }
                    Err(e) => {
                        warn!("Failed to update yt-dlp: {}", e);
                        ToolResolution {
                            state: UpdaterState::UpdateFailed,
                            binary: Some(binary),
                            detail: Some(e.to_string()),
                        }
                    }
                }
            }
        }
    }

    /// Unresolved -> LocalOnly: locate, or download into the managed dir.
    async fn acquire(&self) -> Option<ToolBinary> {
        if let Some(path) = self.locator.locate() {
            return Some(ToolBinary::new(path));
        }

        let dest = self.managed_path();
        info!("yt-dlp not found, downloading latest {} build", self.config.channel);
        match self.client.download_binary(self.config.channel, &dest).await {
            Ok(_) if is_executable(&dest) => Some(ToolBinary::new(dest)),
            Ok(_) => {
                warn!("Downloaded yt-dlp at {:?} is not executable", dest);
                None
            }
            Err(e) => {
                warn!("Failed to download yt-dlp: {}", e);
                None
            }
        }
    }

    async fn check(&self, binary: &mut ToolBinary) -> VersionCheck {
        let (local, latest) = tokio::join!(
            query_version(&binary.path, self.config.version_timeout),
            self.client.latest_version(self.config.channel)
        );

        let local = match local {
            Ok(v) => v,
            Err(e) => {
                warn!("Could not read local yt-dlp version: {}", e);
                return VersionCheck::Unknown;
            }
        };
        binary.version = Some(local.clone());

        match latest {
            Ok(latest) if latest == local => {
                info!("yt-dlp is up to date ({})", local);
                VersionCheck::Current
            }
            Ok(latest) => VersionCheck::Stale { local, latest },
            Err(e) => {
                warn!("Could not fetch latest yt-dlp release: {}", e);
                VersionCheck::Unknown
            }
        }
    }

    /// CheckedStale -> Updated: self-update, then one fallback strategy.
    async fn update(&self, path: &Path) -> Result<(), ToolError> {
        let channel = self.config.channel.as_str();
        match run_with_timeout(path, &["--update-to", channel], self.config.self_update_timeout)
            .await
        {
            Ok(output) if output.success && !mentions_package_manager(&output.combined()) => {
                return Ok(());
            }
            Ok(output) => warn!("yt-dlp self-update declined: {}", output.diagnostic()),
            Err(e) => warn!("yt-dlp self-update failed: {}", e),
        }

        if path.starts_with(&self.config.managed_dir) {
            self.client.download_binary(self.config.channel, path).await?;
            return Ok(());
        }

        let package_manager = self
            .package_manager
            .clone()
            .unwrap_or_else(|| PackageManager::detect(path));
        package_manager
            .upgrade(self.config.package_manager_timeout)
            .await
    }

    async fn local_version(&self, path: &Path) -> Option<String> {
        query_version(path, self.config.version_timeout).await.ok()
    }
}

fn mentions_package_manager(output: &str) -> bool {
    let output = output.to_lowercase();
    PACKAGE_MANAGER_PHRASES
        .iter()
        .any(|phrase| output.contains(phrase))
}

fn unavailable_hint() -> String {
    if cfg!(target_os = "windows") {
        "Download yt-dlp.exe into the program folder or add it to PATH, or install it with `pip install yt-dlp`".to_string()
    } else {
        "Install yt-dlp with `pip install yt-dlp` or your system package manager".to_string()
    }
}
