use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::core::downloader::DownloadTask;
use crate::core::error::{LauncherError, LauncherResult};

/// Asset index document: logical name → content-addressed object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetIndex {
    #[serde(default)]
    pub objects: BTreeMap<String, AssetObject>,
    /// Pre-1.7 layouts that expect assets copied under their names.
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    #[serde(default)]
    pub map_to_resources: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    #[serde(default)]
    pub size: u64,
}

/// Objects are addressed by their SHA-1: exactly 40 hex digits.
pub fn is_object_hash(hash: &str) -> bool {
    hash.len() == 40 && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

impl AssetObject {
    /// `<hh>/<hash>`, shared by the local store and the remote endpoint.
    pub fn relative_path(&self) -> Option<String> {
        if !is_object_hash(&self.hash) {
            return None;
        }
        Some(format!("{}/{}", &self.hash[..2], self.hash))
    }
}

impl AssetIndex {
    pub fn parse(id: &str, raw: &[u8]) -> LauncherResult<Self> {
        serde_json::from_slice(raw).map_err(|source| LauncherError::DescriptorParse {
            id: format!("asset index {id}"),
            source,
        })
    }

    /// Where an object with `hash` lives under `assets_dir`.
    pub fn object_path(assets_dir: &Path, hash: &str) -> Option<PathBuf> {
        if !is_object_hash(hash) {
            return None;
        }
        Some(assets_dir.join("objects").join(&hash[..2]).join(hash))
    }

    /// One task per distinct object. Names sharing content share one file.
    pub fn download_tasks(&self, assets_dir: &Path, resources_base: &str) -> Vec<DownloadTask> {
        let base = resources_base.trim_end_matches('/');
        let mut seen = HashSet::new();
        let mut tasks = Vec::new();

        for (name, object) in &self.objects {
            if !seen.insert(object.hash.as_str()) {
                continue;
            }
            let (Some(relative), Some(dest)) = (
                object.relative_path(),
                Self::object_path(assets_dir, &object.hash),
            ) else {
                debug!("Skipping asset {} with malformed hash {:?}", name, object.hash);
                continue;
            };
            tasks.push(
                DownloadTask::new(format!("{base}/{relative}"), dest)
                    .with_sha1(Some(object.hash.clone()))
                    .with_size(Some(object.size))
                    .with_label(name.clone()),
            );
        }

        tasks
    }

    pub fn total_size(&self) -> u64 {
        self.objects.values().map(|o| o.size).sum()
    }
}
