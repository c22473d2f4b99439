// ─── Resolve & Acquire ───
// The single entry point for launch assembly: descriptor → applicable
// libraries → downloads → natives → runtime. Per-artifact failures are
// reported; only index, descriptor and runtime failures abort.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::assets::AssetIndex;
use crate::core::auth::Credential;
use crate::core::config::LauncherConfig;
use crate::core::downloader::{DownloadReport, DownloadTask, Downloader, FetchOutcome};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;
use crate::core::java::{required_java_major, RuntimeCandidate, RuntimeProvisioner};
use crate::core::platform::Environment;
use crate::core::version::{
    applicable_libraries_from, AssetsReference, MetadataStore, ResolvedLibrary, VersionDescriptor,
};

use super::natives::{extract_natives, native_jars};

/// What the caller wants launched.
#[derive(Debug, Clone, Default)]
pub struct LaunchRequest {
    pub version_id: String,
    /// Overrides the detected environment.
    pub environment: Option<Environment>,
    pub credential: Option<Credential>,
}

impl LaunchRequest {
    pub fn new(version_id: impl Into<String>) -> Self {
        Self {
            version_id: version_id.into(),
            ..Self::default()
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }
}

/// Outcomes per download category.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionReport {
    pub client: DownloadReport,
    pub libraries: DownloadReport,
    pub assets: DownloadReport,
    /// Per-task outcomes for libraries, aligned with the library task list.
    pub library_outcomes: Vec<FetchOutcome>,
}

impl AcquisitionReport {
    pub fn failure_count(&self) -> usize {
        self.client.failures.len() + self.libraries.failures.len() + self.assets.failures.len()
    }

    pub fn fetched(&self) -> usize {
        self.client.downloaded + self.libraries.downloaded + self.assets.downloaded
    }

    pub fn skipped(&self) -> usize {
        self.client.skipped + self.libraries.skipped + self.assets.skipped
    }
}

/// Everything launch assembly needs, with verified local paths.
#[derive(Debug, Clone)]
pub struct ResolvedLaunch {
    pub descriptor: VersionDescriptor,
    pub environment: Environment,
    pub libraries: Vec<ResolvedLibrary>,
    /// Library files present on disk after acquisition, in library order.
    pub library_files: Vec<PathBuf>,
    /// `None` when the client package could not be obtained.
    pub client_jar: Option<PathBuf>,
    /// Unpacked native libraries for this version.
    pub natives_dir: PathBuf,
    pub asset_index_id: Option<String>,
    pub runtime: RuntimeCandidate,
    pub report: AcquisitionReport,
    /// No access token: the game runs in demo mode.
    pub demo: bool,
}

/// Summary safe to print or serialize.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchSummary {
    pub version_id: String,
    pub libraries: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
    pub runtime: RuntimeCandidate,
    pub demo: bool,
}

impl ResolvedLaunch {
    pub fn summary(&self) -> LaunchSummary {
        LaunchSummary {
            version_id: self.descriptor.id.clone(),
            libraries: self.libraries.len(),
            fetched: self.report.fetched(),
            skipped: self.report.skipped(),
            failed: self.report.failure_count(),
            runtime: self.runtime.clone(),
            demo: self.demo,
        }
    }
}

pub struct Resolver {
    config: LauncherConfig,
    downloader: Downloader,
    store: MetadataStore,
    provisioner: RuntimeProvisioner,
}

impl Resolver {
    /// Build with a fresh HTTP client and the configured concurrency.
    pub fn from_config(config: LauncherConfig) -> LauncherResult<Self> {
        let downloader = Downloader::new(build_http_client()?)
            .with_concurrency(config.max_concurrent_downloads);
        Ok(Self::new(config, downloader))
    }

    pub fn new(config: LauncherConfig, downloader: Downloader) -> Self {
        let store = MetadataStore::new(&config, downloader.clone());
        let provisioner = RuntimeProvisioner::new(&config, downloader.clone());
        Self {
            config,
            downloader,
            store,
            provisioner,
        }
    }

    pub fn with_provisioner(mut self, provisioner: RuntimeProvisioner) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn provisioner(&self) -> &RuntimeProvisioner {
        &self.provisioner
    }

    fn ensure_not_cancelled(&self) -> LauncherResult<()> {
        if self.downloader.cancellation_token().is_cancelled() {
            return Err(LauncherError::Cancelled);
        }
        Ok(())
    }

    /// Resolve with the detected environment and no credential.
    pub async fn resolve_version(&self, version_id: &str) -> LauncherResult<ResolvedLaunch> {
        self.resolve_and_acquire(&LaunchRequest::new(version_id))
            .await
    }

    #[instrument(skip(self, request), fields(version = %request.version_id))]
    pub async fn resolve_and_acquire(&self, request: &LaunchRequest) -> LauncherResult<ResolvedLaunch> {
        let version_id = request.version_id.as_str();
        let environment = request.environment.unwrap_or_else(Environment::detect);
        info!("Resolving {} for {}", version_id, environment);

        // ── 1. Metadata ──
        let index = self.store.fetch_index().await?;
        let descriptor = if index.find_version(version_id).is_some() {
            self.store.resolve_descriptor_in(&index, version_id).await?
        } else {
            // Installer output is not listed in the index.
            self.store.load_installed(&index, version_id).await?
        };

        // ── 2. Rules ──
        let libraries =
            applicable_libraries_from(&descriptor, &environment, &self.config.endpoints.libraries);

        let mut report = AcquisitionReport::default();

        // ── 3. Client package (best-effort) ──
        let client_task = self.client_task(&descriptor);
        let client_outcome = self.downloader.fetch(&client_task).await;
        self.ensure_not_cancelled()?;
        let client_jar = match &client_outcome {
            FetchOutcome::Failure(failure) => {
                warn!("Client package for {} unavailable: {}", version_id, failure);
                None
            }
            _ => Some(client_task.dest.clone()),
        };
        report.client = DownloadReport::from_outcomes(
            std::slice::from_ref(&client_task),
            std::slice::from_ref(&client_outcome),
        );

        // ── 4. Libraries ──
        let library_tasks = self.library_tasks(&libraries);
        let library_outcomes = self.downloader.download_all(&library_tasks).await;
        self.ensure_not_cancelled()?;
        report.libraries = DownloadReport::from_outcomes(&library_tasks, &library_outcomes);
        report.libraries.log_failures("libraries");
        let library_files = library_tasks
            .iter()
            .zip(&library_outcomes)
            .filter(|(_, outcome)| !outcome.is_failure())
            .map(|(task, _)| task.dest.clone())
            .collect();
        report.library_outcomes = library_outcomes;

        let natives_dir = self.config.versions_dir().join(version_id).join("natives");
        let jars = native_jars(&libraries, &self.config.libraries_dir());
        if let Err(e) = extract_natives(jars, &natives_dir).await {
            warn!("Natives for {} not extracted: {}", version_id, e);
        }

        // ── 5. Assets ──
        let asset_index = match self.store.resolve_asset_index(&descriptor.assets).await {
            Ok(index) => index,
            Err(LauncherError::Cancelled) => return Err(LauncherError::Cancelled),
            Err(e) => {
                warn!("Asset index for {} unavailable: {}", version_id, e);
                AssetIndex::default()
            }
        };
        let asset_tasks =
            asset_index.download_tasks(&self.config.assets_dir(), &self.config.endpoints.resources);
        let asset_outcomes = self.downloader.download_all(&asset_tasks).await;
        self.ensure_not_cancelled()?;
        report.assets = DownloadReport::from_outcomes(&asset_tasks, &asset_outcomes);
        report.assets.log_failures("assets");

        // ── 6. Runtime ──
        let runtime = self
            .provisioner
            .ensure_runtime(required_java_major(&descriptor), &environment)
            .await?;

        let demo = request
            .credential
            .as_ref()
            .map_or(true, |credential| !credential.has_token());

        info!(
            "Resolved {}: {} libraries, {} fetched, {} up to date, {} failed",
            version_id,
            libraries.len(),
            report.fetched(),
            report.skipped(),
            report.failure_count()
        );

        let asset_index_id = match &descriptor.assets {
            AssetsReference::None => None,
            other => other.id().map(str::to_string),
        };
        Ok(ResolvedLaunch {
            descriptor,
            environment,
            libraries,
            library_files,
            client_jar,
            natives_dir,
            asset_index_id,
            runtime,
            report,
            demo,
        })
    }

    /// Client package task. Descriptors predating hosted downloads fall back
    /// to the archival location with no hash.
    pub fn client_task(&self, descriptor: &VersionDescriptor) -> DownloadTask {
        let id = &descriptor.id;
        let dest = self.config.versions_dir().join(id).join(format!("{id}.jar"));
        let task = match &descriptor.downloads.client {
            Some(client) => DownloadTask::new(client.url.clone(), dest)
                .with_sha1(client.sha1.clone())
                .with_size(client.size),
            None => {
                let base = self.config.endpoints.legacy_client.trim_end_matches('/');
                DownloadTask::new(format!("{base}/{id}/{id}.jar"), dest)
            }
        };
        task.with_label(format!("{id}.jar"))
    }

    /// Primary and native files of every library, in library order.
    pub fn library_tasks(&self, libraries: &[ResolvedLibrary]) -> Vec<DownloadTask> {
        let root = self.config.libraries_dir();
        let root = root.as_path();
        libraries
            .iter()
            .flat_map(|library| {
                [library.artifact.as_ref(), library.native.as_ref()]
                    .into_iter()
                    .flatten()
                    .filter_map(move |location| {
                        let Some(dest) = local_path(root, &location.path) else {
                            debug!(
                                "Skipping {} with unsafe path {:?}",
                                library.spec.name, location.path
                            );
                            return None;
                        };
                        Some(
                            DownloadTask::new(location.url.clone(), dest)
                                .with_sha1(location.sha1.clone())
                                .with_size(location.size)
                                .with_label(library.spec.name.clone()),
                        )
                    })
            })
            .collect()
    }
}

/// Join a `/`-separated relative path onto `root`. `None` when a segment
/// would leave `root` (`..`, an absolute or drive-qualified part).
pub(crate) fn local_path(root: &Path, relative: &str) -> Option<PathBuf> {
    if relative.starts_with('/') || relative.starts_with('\\') {
        return None;
    }
    let mut path = root.to_path_buf();
    for segment in relative.split('/').filter(|segment| !segment.is_empty()) {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => path.push(part),
            (Some(Component::CurDir), None) => {}
            _ => return None,
        }
    }
    Some(path)
}
