use std::path::{Path, PathBuf};

use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::models::{ApiConfig, ReleaseResponse};
use crate::domain::UpdateChannel;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Release has no tag")]
    NoReleaseTag,

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Release asset name of the standalone yt-dlp build for this platform.
pub fn release_asset_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else if cfg!(target_os = "macos") {
        "yt-dlp_macos"
    } else if cfg!(target_os = "linux") {
        "yt-dlp_linux"
    } else {
        "yt-dlp"
    }
}

#[derive(Clone)]
pub struct ReleaseClient {
    config: ApiConfig,
    client: Client,
}

impl ReleaseClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn latest_release_url(&self, channel: UpdateChannel) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/repos/{}/releases/latest",
            self.config.api_base_url.trim_end_matches('/'),
            channel.release_repo()
        ))?)
    }

    pub fn binary_download_url(&self, channel: UpdateChannel) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/{}/releases/latest/download/{}",
            self.config.web_base_url.trim_end_matches('/'),
            channel.release_repo(),
            release_asset_name()
        ))?)
    }

    /// Latest published version for `channel`, e.g. "2024.08.06"
    pub async fn latest_version(&self, channel: UpdateChannel) -> Result<String> {
        let url = self.latest_release_url(channel)?;

        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .timeout(self.config.release_timeout)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ApiError::ApiError(format!("Release request failed: {}", e)))?;

        let release: ReleaseResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("JSON decode error: {}", e)))?;

        release.version().ok_or(ApiError::NoReleaseTag)
    }

    /// Download file with progress stream
    /// Returns (total_size, stream)
    pub async fn download_file_stream(
        &self,
        download_url: Url,
    ) -> Result<(Option<u64>, impl Stream<Item = Result<bytes::Bytes>>)> {
        let response = self
            .client
            .get(download_url)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .timeout(self.config.download_timeout)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ApiError::ApiError(format!("Download request failed: {}", e)))?;

        let total_size = response.content_length();
        let stream = response.bytes_stream().map_err(ApiError::RequestError);

        Ok((total_size, stream))
    }

    /// Downloads the latest binary for `channel` and atomically moves it to
    /// `dest`. The previous file at `dest` is untouched on failure.
    pub async fn download_binary(&self, channel: UpdateChannel, dest: &Path) -> Result<u64> {
        let url = self.binary_download_url(channel)?;
        log::info!("Downloading yt-dlp from {} to {:?}", url, dest);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let part_path = partial_path(dest);
        match self.write_stream_to(url, &part_path).await {
            Ok(written) => {
                tokio::fs::rename(&part_path, dest).await?;
                mark_executable(dest).await?;
                log::info!("Saved yt-dlp ({} bytes) to {:?}", written, dest);
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part_path).await;
                Err(e)
            }
        }
    }

    async fn write_stream_to(&self, url: Url, path: &Path) -> Result<u64> {
        let (total, stream) = self.download_file_stream(url).await?;
        let mut stream = stream.boxed();
        let mut file = tokio::fs::File::create(path).await?;
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }
        file.sync_all().await?;

        if downloaded == 0 {
            return Err(ApiError::InvalidResponse("empty download".to_string()));
        }
        if let Some(total) = total {
            if total != downloaded {
                return Err(ApiError::InvalidResponse(format!(
                    "expected {} bytes, got {}",
                    total, downloaded
                )));
            }
        }

        Ok(downloaded)
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

async fn mark_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(path).await?.permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(path, perms).await?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn client_for(server: &mockito::Server) -> ReleaseClient {
        ReleaseClient::new(ApiConfig {
            api_base_url: server.url(),
            web_base_url: server.url(),
            ..ApiConfig::default()
        })
    }

    #[tokio::test]
    async fn test_latest_version_strips_prefix() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/yt-dlp/yt-dlp/releases/latest")
            .match_header("user-agent", "yt2d-updater")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"tag_name": "v2024.08.06"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let version = client.latest_version(UpdateChannel::Stable).await.unwrap();
        assert_eq!(version, "2024.08.06");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_latest_version_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/yt-dlp/yt-dlp-nightly-builds/releases/latest")
            .with_status(403)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .latest_version(UpdateChannel::Nightly)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ApiError(_)));
    }

    #[tokio::test]
    async fn test_download_binary_replaces_destination() {
        let mut server = mockito::Server::new_async().await;
        let asset_path = format!(
            "/yt-dlp/yt-dlp/releases/latest/download/{}",
            release_asset_name()
        );
        let _mock = server
            .mock("GET", asset_path.as_str())
            .with_status(200)
            .with_body("#!/bin/sh\necho new\n")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("bin").join("yt-dlp");
        let client = client_for(&server);
        let written = client
            .download_binary(UpdateChannel::Stable, &dest)
            .await
            .unwrap();

        assert_eq!(written, 19);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "#!/bin/sh\necho new\n");
        assert!(!partial_path(&dest).exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[tokio::test]
    async fn test_failed_download_keeps_existing_file() {
        let mut server = mockito::Server::new_async().await;
        let asset_path = format!(
            "/yt-dlp/yt-dlp/releases/latest/download/{}",
            release_asset_name()
        );
        let _mock = server
            .mock("GET", asset_path.as_str())
            .with_status(404)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("yt-dlp");
        std::fs::write(&dest, "old").unwrap();

        let client = client_for(&server);
        assert!(client
            .download_binary(UpdateChannel::Stable, &dest)
            .await
            .is_err());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "old");
        assert!(!partial_path(&dest).exists());
    }
}
