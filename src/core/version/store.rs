// ─── Metadata Store ───
// Index is always live. Descriptors are cached under versions/<id>/ next to
// a `.sha1` sidecar and honored only while the sidecar equals the hash the
// index declares.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::core::assets::AssetIndex;
use crate::core::config::LauncherConfig;
use crate::core::downloader::{sha1_hex, DownloadTask, Downloader};
use crate::core::error::{LauncherError, LauncherResult};

use super::descriptor::{AssetsReference, VersionDescriptor};
use super::manifest::{VersionManifest, VersionSummary};

pub struct MetadataStore {
    downloader: Downloader,
    manifest_url: String,
    versions_dir: PathBuf,
    assets_dir: PathBuf,
}

impl MetadataStore {
    pub fn new(config: &LauncherConfig, downloader: Downloader) -> Self {
        Self {
            downloader,
            manifest_url: config.endpoints.version_manifest.clone(),
            versions_dir: config.versions_dir(),
            assets_dir: config.assets_dir(),
        }
    }

    pub fn descriptor_path(&self, version_id: &str) -> PathBuf {
        self.versions_dir
            .join(version_id)
            .join(format!("{version_id}.json"))
    }

    fn sidecar_path(&self, version_id: &str) -> PathBuf {
        self.versions_dir
            .join(version_id)
            .join(format!("{version_id}.sha1"))
    }

    fn ensure_not_cancelled(&self) -> LauncherResult<()> {
        if self.downloader.cancellation_token().is_cancelled() {
            return Err(LauncherError::Cancelled);
        }
        Ok(())
    }

    // ── Index ───────────────────────────────────────────

    pub async fn fetch_index(&self) -> LauncherResult<VersionManifest> {
        self.ensure_not_cancelled()?;
        VersionManifest::fetch(self.downloader.http_client(), &self.manifest_url).await
    }

    // ── Descriptors ─────────────────────────────────────

    /// Fetch the index, then resolve `version_id` through it.
    pub async fn resolve_descriptor(&self, version_id: &str) -> LauncherResult<VersionDescriptor> {
        let index = self.fetch_index().await?;
        self.resolve_descriptor_in(&index, version_id).await
    }

    /// Resolve `version_id` against an index fetched earlier in the session.
    #[instrument(skip(self, index))]
    pub async fn resolve_descriptor_in(
        &self,
        index: &VersionManifest,
        version_id: &str,
    ) -> LauncherResult<VersionDescriptor> {
        let raw = self.descriptor_document(index, version_id).await?;
        VersionDescriptor::parse(version_id, &raw)
    }

    /// Raw descriptor bytes, from cache when the stored hash still matches.
    async fn descriptor_document(
        &self,
        index: &VersionManifest,
        version_id: &str,
    ) -> LauncherResult<Vec<u8>> {
        let summary = index
            .find_version(version_id)
            .ok_or_else(|| LauncherError::VersionNotFound(version_id.to_string()))?;

        if let Some(raw) = self.cached_document(summary).await {
            debug!("Descriptor cache hit for {}", version_id);
            return Ok(raw);
        }

        self.ensure_not_cancelled()?;
        info!("Fetching descriptor for {}", version_id);
        let response = self
            .downloader
            .http_client()
            .get(&summary.url)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: summary.url.clone(),
                status: status.as_u16(),
            });
        }
        let raw = response.bytes().await?.to_vec();

        let actual = sha1_hex(&raw);
        if let Some(expected) = &summary.sha1 {
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(LauncherError::IntegrityMismatch {
                    path: self.descriptor_path(version_id),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        // Refuse to cache something that cannot be read back.
        VersionDescriptor::parse(version_id, &raw)?;

        // Document first, sidecar last: a crash in between leaves a stale
        // sidecar that no longer matches, never a matching one over a
        // half-written document.
        write_atomic(&self.descriptor_path(version_id), &raw).await?;
        write_atomic(&self.sidecar_path(version_id), actual.as_bytes()).await?;
        Ok(raw)
    }

    async fn cached_document(&self, summary: &VersionSummary) -> Option<Vec<u8>> {
        let expected = summary.sha1.as_deref()?;
        let stored = tokio::fs::read_to_string(self.sidecar_path(&summary.id))
            .await
            .ok()?;
        if !stored.trim().eq_ignore_ascii_case(expected) {
            debug!("Descriptor cache stale for {}", summary.id);
            return None;
        }
        match tokio::fs::read(self.descriptor_path(&summary.id)).await {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!("Cached descriptor for {} unreadable: {}", summary.id, e);
                None
            }
        }
    }

    /// Read a descriptor an external installer left in the versions tree,
    /// merging its `inheritsFrom` parent. The parent comes from the index,
    /// or from the versions tree when the index does not list it.
    pub async fn load_installed(
        &self,
        index: &VersionManifest,
        version_id: &str,
    ) -> LauncherResult<VersionDescriptor> {
        let child = self
            .read_installed(version_id)
            .await?
            .ok_or_else(|| LauncherError::VersionNotFound(version_id.to_string()))?;

        let Some(parent_id) = child
            .get("inheritsFrom")
            .and_then(|p| p.as_str())
            .map(str::to_string)
        else {
            return VersionDescriptor::from_value(version_id, child);
        };

        info!("{} inherits from {}", version_id, parent_id);
        let parent = if index.find_version(&parent_id).is_some() {
            let raw = self.descriptor_document(index, &parent_id).await?;
            parse_value(&parent_id, &raw)?
        } else {
            self.read_installed(&parent_id)
                .await?
                .ok_or_else(|| LauncherError::VersionNotFound(parent_id.clone()))?
        };

        let merged = VersionDescriptor::merge_with_parent(&child, &parent);
        VersionDescriptor::from_value(version_id, merged)
    }

    async fn read_installed(&self, version_id: &str) -> LauncherResult<Option<serde_json::Value>> {
        let path = self.descriptor_path(version_id);
        match tokio::fs::read(&path).await {
            Ok(raw) => parse_value(version_id, &raw).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LauncherError::io(path, e)),
        }
    }

    // ── Asset index ─────────────────────────────────────

    /// Bare or missing references have no downloadable index and resolve
    /// to an empty one.
    pub async fn resolve_asset_index(&self, reference: &AssetsReference) -> LauncherResult<AssetIndex> {
        let info = match reference {
            AssetsReference::Indexed(info) => info,
            AssetsReference::Named(id) => {
                debug!("Assets '{}' carry no index document", id);
                return Ok(AssetIndex::default());
            }
            AssetsReference::None => return Ok(AssetIndex::default()),
        };

        let id = if info.id.is_empty() { "legacy" } else { info.id.as_str() };
        let dest = self.assets_dir.join("indexes").join(format!("{id}.json"));
        let task = DownloadTask::new(info.url.clone(), &dest)
            .with_sha1(info.sha1.clone())
            .with_size(info.size)
            .with_label(format!("asset index {id}"));
        self.downloader.fetch(&task).await.into_result()?;

        let raw = tokio::fs::read(&dest)
            .await
            .map_err(|e| LauncherError::io(&dest, e))?;
        let index = AssetIndex::parse(id, &raw)?;
        info!("Asset index {} lists {} objects", id, index.objects.len());
        Ok(index)
    }
}

fn parse_value(id: &str, raw: &[u8]) -> LauncherResult<serde_json::Value> {
    serde_json::from_slice(raw).map_err(|source| LauncherError::DescriptorParse {
        id: id.to_string(),
        source,
    })
}

/// Write beside the target under a unique name, then rename over it.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> LauncherResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| LauncherError::Other(format!("{path:?} has no parent directory")))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| LauncherError::io(parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));
    tokio::fs::write(&temp, bytes)
        .await
        .map_err(|e| LauncherError::io(&temp, e))?;
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(LauncherError::io(path, e));
    }
    Ok(())
}
