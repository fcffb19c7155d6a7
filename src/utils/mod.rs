use std::path::Path;

/// Hosts accepted by the download form. Matching is a plain substring test,
/// so this is an input filter and not a security boundary.
const SUPPORTED_DOMAINS: [&str; 4] = ["youtube.com", "www.youtube.com", "youtu.be", "m.youtube.com"];

/// Basic YouTube URL validation
pub fn is_supported_url(url: &str) -> bool {
    let url = url.trim().to_lowercase();
    !url.is_empty() && SUPPORTED_DOMAINS.iter().any(|domain| url.contains(domain))
}

/// True for an existing regular file that the current user may execute.
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
