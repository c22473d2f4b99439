// ─── Version Index ───
// Fetches and parses the top-level version manifest. Never cached: it is
// small and must reflect current availability.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};

/// Top-level version manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionManifest {
    #[serde(default)]
    pub latest: LatestVersions,
    pub versions: Vec<VersionSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatestVersions {
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub snapshot: Option<String>,
}

/// A single entry in the manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub release_type: String,
    /// Where the descriptor document lives.
    pub url: String,
    /// SHA-1 of the descriptor document; absent in the v1 manifest.
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(rename = "releaseTime", default)]
    pub release_time: Option<DateTime<Utc>>,
}

impl VersionManifest {
    pub async fn fetch(client: &reqwest::Client, url: &str) -> LauncherResult<Self> {
        info!("Fetching version manifest...");

        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let raw = response.bytes().await?;
        let manifest = Self::parse(&raw)?;

        info!("Loaded {} versions from manifest", manifest.versions.len());
        Ok(manifest)
    }

    pub fn parse(raw: &[u8]) -> LauncherResult<Self> {
        serde_json::from_slice(raw).map_err(|source| LauncherError::DescriptorParse {
            id: "version manifest".into(),
            source,
        })
    }

    /// Find a specific version entry by ID (e.g. "1.20.4").
    pub fn find_version(&self, id: &str) -> Option<&VersionSummary> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// All stable releases, in manifest order (newest first).
    pub fn releases(&self) -> Vec<&VersionSummary> {
        self.versions
            .iter()
            .filter(|v| v.release_type == "release")
            .collect()
    }

    pub fn latest_release(&self) -> Option<&VersionSummary> {
        self.latest
            .release
            .as_deref()
            .and_then(|id| self.find_version(id))
    }
}
