use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::binary_name;
use crate::utils::is_executable;

/// Finds an existing yt-dlp executable.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    search_path: Option<OsString>,
    probe_dirs: Vec<PathBuf>,
}

impl ToolLocator {
    /// Searches `PATH`, then the managed directory and the usual install
    /// locations.
    pub fn system(managed_dir: &Path) -> Self {
        Self {
            search_path: std::env::var_os("PATH"),
            probe_dirs: default_probe_dirs(managed_dir),
        }
    }

    pub fn with_dirs(search_path: Option<OsString>, probe_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_path,
            probe_dirs,
        }
    }

    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(found) = self.search_path_hit() {
            log::info!("Found yt-dlp on search path: {:?}", found);
            return Some(found);
        }

        let found = self
            .probe_dirs
            .iter()
            .map(|dir| dir.join(binary_name()))
            .find(|candidate| is_executable(candidate));

        match &found {
            Some(path) => log::info!("Found yt-dlp at {:?}", path),
            None => log::info!("yt-dlp not found in {} probed locations", self.probe_dirs.len()),
        }
        found
    }

    fn search_path_hit(&self) -> Option<PathBuf> {
        let paths = self.search_path.as_ref()?;
        let cwd = std::env::current_dir().ok()?;
        which::which_in(binary_name(), Some(paths), cwd)
            .ok()
            .filter(|path| is_executable(path))
    }
}

fn default_probe_dirs(managed_dir: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![managed_dir.to_path_buf()];

    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local").join("bin"));
    }
    if cfg!(unix) {
        candidates.push(PathBuf::from("/usr/local/bin"));
        candidates.push(PathBuf::from("/usr/bin"));
    }
    if cfg!(target_os = "macos") {
        candidates.push(PathBuf::from("/opt/homebrew/bin"));
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd);
    }

    candidates
}
