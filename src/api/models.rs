use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Response from the GitHub `releases/latest` endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReleaseResponse {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ReleaseResponse {
    /// Release identifier with any leading `v` removed
    pub fn version(&self) -> Option<String> {
        [self.tag_name.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .map(|tag| tag.trim().trim_start_matches('v').trim().to_string())
            .find(|tag| !tag.is_empty())
    }
}

/// Configuration for the release client
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_base_url: String,
    pub web_base_url: String,
    pub user_agent: String,
    pub release_timeout: Duration,
    pub download_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            web_base_url: "https://github.com".to_string(),
            user_agent: "yt2d-updater".to_string(),
            release_timeout: Duration::from_secs(5),
            download_timeout: Duration::from_secs(60),
        }
    }
}
