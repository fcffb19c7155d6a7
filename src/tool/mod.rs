//! Acquisition, update and invocation plumbing for the external yt-dlp binary.

pub mod locator;
pub mod process;
pub mod updater;

use std::time::Duration;

use thiserror::Error;

use crate::api::ApiError;

pub use locator::ToolLocator;
pub use updater::{ToolUpdater, UpdaterConfig};

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("{program} failed: {message}")]
    Failed { program: String, message: String },

    #[error("yt-dlp did not report a version")]
    NoVersion,

    #[error("Download failed: {0}")]
    Download(#[from] ApiError),
}

/// Executable name of yt-dlp on this platform.
pub fn binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else {
        "yt-dlp"
    }
}
