// ─── Runtime Provisioner ───
// NotSearched → FoundSystem | FoundCached | Provisioning → Ready | Unavailable
//
// Layout: runtimes/java-<major>/ holds one extracted distribution plus a
// runtime.json describing it. Calls hold no lock; callers serialize
// concurrent requests for the same major version.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::config::{JavaSettings, LauncherConfig};
use crate::core::downloader::{DownloadTask, Downloader, FetchFailure};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::platform::{Environment, OsFamily};
use crate::core::version::VersionDescriptor;

use super::archive::extract_runtime_archive;
use super::probe::{probe_java, JavaInstallation};

const RUNTIME_METADATA_FILE: &str = "runtime.json";
const MIN_FREE_DISK_BYTES: u64 = 512 * 1024 * 1024;
const HASH_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeSource {
    System,
    Cached,
    Provisioned,
}

/// A runtime ready to launch with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeCandidate {
    pub executable: PathBuf,
    pub version: String,
    pub major: u32,
    pub vendor: String,
    pub source: RuntimeSource,
}

impl RuntimeCandidate {
    fn from_install(install: JavaInstallation, source: RuntimeSource) -> Self {
        Self {
            executable: install.path,
            version: install.version,
            major: install.major,
            vendor: install.vendor,
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProvisionState {
    NotSearched,
    FoundSystem,
    FoundCached,
    Provisioning,
    Ready,
    Unavailable,
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisionState::NotSearched => "not-searched",
            ProvisionState::FoundSystem => "found-system",
            ProvisionState::FoundCached => "found-cached",
            ProvisionState::Provisioning => "provisioning",
            ProvisionState::Ready => "ready",
            ProvisionState::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// Written next to every provisioned distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuntimeMetadata {
    major: u32,
    version: String,
    vendor: String,
    os: String,
    arch: String,
    /// Binary path relative to the runtime root, `/`-separated.
    java_bin_rel: String,
    sha256_java: String,
    source_url: String,
    installed_at: String,
}

pub struct RuntimeProvisioner {
    downloader: Downloader,
    runtimes_dir: PathBuf,
    runtime_api: String,
    java: JavaSettings,
    min_free_disk: u64,
}

impl RuntimeProvisioner {
    pub fn new(config: &LauncherConfig, downloader: Downloader) -> Self {
        Self {
            downloader,
            runtimes_dir: config.runtimes_dir(),
            runtime_api: config.endpoints.runtime_api.clone(),
            java: config.java.clone(),
            min_free_disk: MIN_FREE_DISK_BYTES,
        }
    }

    /// Free space required on the runtimes volume before provisioning.
    pub fn with_min_free_disk(mut self, bytes: u64) -> Self {
        self.min_free_disk = bytes;
        self
    }

    pub fn runtime_dir(&self, major: u32) -> PathBuf {
        self.runtimes_dir.join(format!("java-{major}"))
    }

    /// Distribution endpoint for `major` on `env`.
    pub fn distribution_url(&self, major: u32, env: &Environment) -> String {
        format!(
            "{}/binary/latest/{}/ga/{}/{}/jre/hotspot/normal/eclipse",
            self.runtime_api.trim_end_matches('/'),
            major,
            env.os.runtime_id(),
            env.arch.runtime_id()
        )
    }

    fn transition(&self, major: u32, state: ProvisionState) {
        info!(major, %state, "Java runtime state");
    }

    /// Locate or acquire a runtime whose major version is `required_major`.
    #[instrument(skip(self, env), fields(env = %env))]
    pub async fn ensure_runtime(
        &self,
        required_major: u32,
        env: &Environment,
    ) -> LauncherResult<RuntimeCandidate> {
        self.transition(required_major, ProvisionState::NotSearched);

        for install in self.system_installations(env.os).await {
            if install.major == required_major {
                self.transition(required_major, ProvisionState::FoundSystem);
                return Ok(RuntimeCandidate::from_install(install, RuntimeSource::System));
            }
        }

        if let Some(candidate) = self.cached_runtime(required_major).await {
            self.transition(required_major, ProvisionState::FoundCached);
            return Ok(candidate);
        }

        self.transition(required_major, ProvisionState::Provisioning);
        match self.provision(required_major, env).await {
            Ok(candidate) => {
                self.transition(required_major, ProvisionState::Ready);
                Ok(candidate)
            }
            Err(LauncherError::Cancelled) => Err(LauncherError::Cancelled),
            Err(e) => {
                self.transition(required_major, ProvisionState::Unavailable);
                Err(match e {
                    LauncherError::RuntimeUnavailable { .. } => e,
                    other => LauncherError::RuntimeUnavailable {
                        major: required_major,
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    /// Every runtime found on the system or in the cache, for listing.
    pub async fn detect_installations(&self, os: OsFamily) -> Vec<RuntimeCandidate> {
        let mut found: Vec<RuntimeCandidate> = self
            .system_installations(os)
            .await
            .into_iter()
            .map(|install| RuntimeCandidate::from_install(install, RuntimeSource::System))
            .collect();

        if let Ok(mut entries) = tokio::fs::read_dir(&self.runtimes_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let Some(major) = entry
                    .file_name()
                    .to_str()
                    .and_then(|n| n.strip_prefix("java-"))
                    .and_then(|m| m.parse::<u32>().ok())
                else {
                    continue;
                };
                if let Some(candidate) = self.cached_runtime(major).await {
                    found.push(candidate);
                }
            }
        }

        found.sort_by(|a, b| a.executable.cmp(&b.executable));
        found.dedup_by(|a, b| a.executable == b.executable);
        found
    }

    // ── (a) System search ───────────────────────────────

    async fn system_installations(&self, os: OsFamily) -> Vec<JavaInstallation> {
        let mut installs = Vec::new();
        let java = self.java.clone();
        let search = tokio::task::spawn_blocking(move || system_candidates(&java, os));
        let candidates = match search.await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Java search task failed: {}", e);
                Vec::new()
            }
        };
        for path in candidates {
            if let Some(install) = probe_java(&path).await {
                debug!("Found Java {} at {:?}", install.version, install.path);
                installs.push(install);
            }
        }
        installs
    }

    // ── (b) Cache ───────────────────────────────────────

    async fn read_metadata(&self, major: u32) -> Option<RuntimeMetadata> {
        let path = self.runtime_dir(major).join(RUNTIME_METADATA_FILE);
        let raw = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("Ignoring unreadable {:?}: {}", path, e);
                None
            }
        }
    }

    /// A cached runtime counts only if it still probes to the right major
    /// version and its binary hashes to the recorded value.
    async fn cached_runtime(&self, major: u32) -> Option<RuntimeCandidate> {
        let metadata = self.read_metadata(major).await?;
        let java_bin = self.runtime_dir(major).join(&metadata.java_bin_rel);

        match sha256_file(&java_bin).await {
            Ok(actual) if actual.eq_ignore_ascii_case(&metadata.sha256_java) => {}
            Ok(_) => {
                warn!("Cached runtime {:?} no longer matches its recorded hash", java_bin);
                return None;
            }
            Err(e) => {
                debug!("Cached runtime unusable: {}", e);
                return None;
            }
        }

        let install = probe_java(&java_bin).await?;
        if install.major != major {
            warn!(
                "Cached runtime {:?} reports Java {}, expected {}",
                java_bin, install.major, major
            );
            return None;
        }
        Some(RuntimeCandidate::from_install(install, RuntimeSource::Cached))
    }

    // ── (c) Provisioning ────────────────────────────────

    async fn provision(&self, major: u32, env: &Environment) -> LauncherResult<RuntimeCandidate> {
        tokio::fs::create_dir_all(&self.runtimes_dir)
            .await
            .map_err(|e| LauncherError::io(&self.runtimes_dir, e))?;
        ensure_min_disk_space(&self.runtimes_dir, self.min_free_disk)?;

        let staging_id = Uuid::new_v4();
        let archive = self.runtimes_dir.join(format!(".download-{staging_id}"));
        let staging = self.runtimes_dir.join(format!(".staging-{staging_id}"));

        let result = self.install(major, env, &archive, &staging).await;
        let _ = tokio::fs::remove_file(&archive).await;
        if result.is_err() {
            let _ = tokio::fs::remove_dir_all(&staging).await;
        }
        result
    }

    async fn install(
        &self,
        major: u32,
        env: &Environment,
        archive: &Path,
        staging: &Path,
    ) -> LauncherResult<RuntimeCandidate> {
        let url = self.distribution_url(major, env);
        info!("Downloading Java {} runtime from {}", major, url);

        // The distribution publishes no hash for this endpoint.
        let task = DownloadTask::new(url.clone(), archive).with_label(format!("Java {major} runtime"));
        let started = Instant::now();
        match self.downloader.fetch(&task).await.into_result() {
            Ok(()) => {}
            Err(FetchFailure::Cancelled) => return Err(LauncherError::Cancelled),
            Err(failure) => {
                return Err(LauncherError::RuntimeUnavailable {
                    major,
                    reason: failure.to_string(),
                })
            }
        }
        debug!("Runtime download finished in {:?}", started.elapsed());

        let (archive_owned, staging_owned) = (archive.to_path_buf(), staging.to_path_buf());
        tokio::task::spawn_blocking(move || extract_runtime_archive(&archive_owned, &staging_owned))
            .await
            .map_err(|e| LauncherError::Other(format!("Extraction task failed: {e}")))??;

        let java_bin = locate_java_binary(staging, env.os).ok_or_else(|| {
            LauncherError::RuntimeUnavailable {
                major,
                reason: "no java binary inside the downloaded archive".into(),
            }
        })?;
        make_executable(&java_bin)?;

        let install = probe_java(&java_bin).await.ok_or_else(|| LauncherError::RuntimeUnavailable {
            major,
            reason: format!("{java_bin:?} does not run"),
        })?;
        if install.major != major {
            return Err(LauncherError::RuntimeUnavailable {
                major,
                reason: format!("downloaded runtime reports Java {}", install.major),
            });
        }

        let java_bin_rel = java_bin
            .strip_prefix(staging)
            .map_err(|_| LauncherError::Other(format!("{java_bin:?} escaped staging")))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let metadata = RuntimeMetadata {
            major,
            version: install.version.clone(),
            vendor: install.vendor.clone(),
            os: env.os.runtime_id().to_string(),
            arch: env.arch.runtime_id().to_string(),
            sha256_java: sha256_file(&java_bin).await?,
            java_bin_rel,
            source_url: url,
            installed_at: Utc::now().to_rfc3339(),
        };
        let metadata_path = staging.join(RUNTIME_METADATA_FILE);
        tokio::fs::write(&metadata_path, serde_json::to_vec_pretty(&metadata)?)
            .await
            .map_err(|e| LauncherError::io(&metadata_path, e))?;

        let final_root = self.runtime_dir(major);
        swap_into_place(staging, &final_root).await?;

        let executable = final_root.join(&metadata.java_bin_rel);
        info!("Java {} ({}) ready at {:?}", major, metadata.version, executable);
        Ok(RuntimeCandidate {
            executable,
            version: metadata.version,
            major,
            vendor: metadata.vendor,
            source: RuntimeSource::Provisioned,
        })
    }
}

/// Major version a descriptor asks for, falling back to its id.
pub fn required_java_major(descriptor: &VersionDescriptor) -> u32 {
    descriptor
        .java_version
        .as_ref()
        .map(|j| j.major_version)
        .unwrap_or_else(|| required_java_for_version_id(&descriptor.id))
}

/// Heuristic for descriptors that predate `javaVersion`.
pub fn required_java_for_version_id(id: &str) -> u32 {
    if let Some(year) = snapshot_year(id) {
        return if year >= 24 {
            21
        } else if year >= 21 {
            17
        } else {
            8
        };
    }

    let numbers: Vec<u32> = id
        .split(|c: char| c == '.' || c == '-' || c == ' ')
        .map_while(|part| part.parse().ok())
        .collect();
    match numbers.as_slice() {
        [1, minor, ..] if *minor >= 21 => 21,
        [1, 20, patch, ..] if *patch >= 5 => 21,
        [1, minor, ..] if *minor >= 17 => 17,
        [major, ..] if *major > 1 => 21,
        _ => 8,
    }
}

/// `23w31a` → 23.
fn snapshot_year(id: &str) -> Option<u32> {
    let bytes = id.as_bytes();
    if bytes.len() >= 5
        && bytes[..2].iter().all(u8::is_ascii_digit)
        && bytes[2] == b'w'
        && bytes[3..5].iter().all(u8::is_ascii_digit)
    {
        id[..2].parse().ok()
    } else {
        None
    }
}

fn locate_java_binary(root: &Path, os: OsFamily) -> Option<PathBuf> {
    let exe = os.java_exe();
    let primary = root.join("bin").join(exe);
    if primary.is_file() {
        return Some(primary);
    }
    let mac_layout = root.join("Contents").join("Home").join("bin").join(exe);
    if mac_layout.is_file() {
        return Some(mac_layout);
    }
    find_java_binary_recursive(root, exe)
}

fn find_java_binary_recursive(root: &Path, exe: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(root).ok()?;
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_file() && path.file_name().and_then(|n| n.to_str()) == Some(exe) {
            if path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()) == Some("bin") {
                return Some(path);
            }
        } else if file_type.is_dir() {
            if let Some(found) = find_java_binary_recursive(&path, exe) {
                return Some(found);
            }
        }
    }
    None
}

fn make_executable(path: &Path) -> LauncherResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| LauncherError::io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Replace `final_root` with `staging`, restoring the previous tree if the
/// rename fails.
async fn swap_into_place(staging: &Path, final_root: &Path) -> LauncherResult<()> {
    let backup = final_root.with_extension(format!("old-{}", Uuid::new_v4()));
    let had_previous = tokio::fs::metadata(final_root).await.is_ok();
    if had_previous {
        tokio::fs::rename(final_root, &backup)
            .await
            .map_err(|e| LauncherError::io(final_root, e))?;
    }

    if let Err(e) = tokio::fs::rename(staging, final_root).await {
        if had_previous {
            let _ = tokio::fs::rename(&backup, final_root).await;
        }
        return Err(LauncherError::io(final_root, e));
    }

    if had_previous {
        let _ = tokio::fs::remove_dir_all(&backup).await;
    }
    Ok(())
}

/// SHA-256 of a file, read in bounded chunks.
async fn sha256_file(path: &Path) -> LauncherResult<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0_u8; HASH_CHUNK];
    loop {
        let read = file
            .read(&mut buf)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Every existing `java` binary named by the settings, in search order.
/// Touches the filesystem synchronously; run it off the async workers.
fn system_candidates(java: &JavaSettings, os: OsFamily) -> Vec<PathBuf> {
    let exe = os.java_exe();
    let mut paths = Vec::new();

    if java.use_system_path {
        if let Some(home) = std::env::var_os("JAVA_HOME") {
            paths.push(PathBuf::from(home).join("bin").join(exe));
        }
        if let Some(path_var) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&path_var).map(|dir| dir.join(exe)));
        }
    }

    for root in &java.search_roots {
        let Ok(entries) = std::fs::read_dir(root) else {
            continue;
        };
        let mut installs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        installs.sort();
        for install in installs {
            paths.push(install.join("bin").join(exe));
            paths.push(install.join("Contents").join("Home").join("bin").join(exe));
        }
    }

    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| p.is_file() && seen.insert(p.clone()))
        .collect()
}

fn ensure_min_disk_space(path: &Path, minimum_bytes: u64) -> LauncherResult<()> {
    if minimum_bytes == 0 {
        return Ok(());
    }
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

    // Longest mount point containing the path.
    let available = disks
        .list()
        .iter()
        .filter(|disk| canonical.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space());

    match available {
        Some(bytes) if bytes < minimum_bytes => Err(LauncherError::Other(format!(
            "not enough disk space for a runtime: {bytes} bytes free, {minimum_bytes} required"
        ))),
        _ => Ok(()),
    }
}
