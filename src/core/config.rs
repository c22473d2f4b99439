// ─── Launcher Configuration ───
// One explicit value threaded through construction: store roots, endpoints,
// concurrency. Nothing else in the crate computes a home-relative path.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

const APP_DIR_NAME: &str = "InterfaceOficial";
const BOOTSTRAP_FILE: &str = "launcher_bootstrap.json";
const SETTINGS_FILE: &str = "launcher_settings.json";

pub const DEFAULT_CONCURRENCY: usize = 8;

/// Remote endpoints. Overridable so tests and mirrors can point elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub version_manifest: String,
    pub resources: String,
    pub libraries: String,
    /// Archival client jars for descriptors predating `downloads.client`.
    pub legacy_client: String,
    pub runtime_api: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            version_manifest: "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json"
                .into(),
            resources: "https://resources.download.minecraft.net".into(),
            libraries: "https://libraries.minecraft.net".into(),
            legacy_client: "https://s3.amazonaws.com/Minecraft.Download/versions".into(),
            runtime_api: "https://api.adoptium.net/v3".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JavaSettings {
    /// Probe `JAVA_HOME` and every `PATH` entry.
    pub use_system_path: bool,
    /// Directories whose children are JDK/JRE installs (`<root>/<jdk>/bin/java`).
    pub search_roots: Vec<PathBuf>,
}

impl Default for JavaSettings {
    fn default() -> Self {
        Self {
            use_system_path: true,
            search_roots: default_search_roots(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub data_dir: PathBuf,
    pub max_concurrent_downloads: usize,
    pub endpoints: Endpoints,
    pub java: JavaSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BootstrapConfig {
    data_dir: PathBuf,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self::with_data_dir(default_data_dir())
    }
}

impl LauncherConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_concurrent_downloads: DEFAULT_CONCURRENCY,
            endpoints: Endpoints::default(),
            java: JavaSettings::default(),
        }
    }

    /// Load `launcher_settings.json` from `data_dir`, falling back to defaults
    /// when the file is absent. The directory given always wins over the
    /// `data_dir` stored in the file.
    pub fn load_from_data_dir(data_dir: &Path) -> LauncherResult<Self> {
        let path = data_dir.join(SETTINGS_FILE);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<LauncherConfig>(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {:?}, using defaults", path);
                LauncherConfig::default()
            }
            Err(source) => return Err(LauncherError::io(path, source)),
        };
        config.data_dir = data_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit settings file.
    pub fn load_file(path: &Path) -> LauncherResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| LauncherError::io(path, e))?;
        let config: LauncherConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> LauncherResult<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| LauncherError::io(&self.data_dir, e))?;
        let path = self.data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| LauncherError::io(&path, e))?;
        info!("Saved launcher settings to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> LauncherResult<()> {
        if self.max_concurrent_downloads == 0 {
            return Err(LauncherError::Config(
                "max_concurrent_downloads must be at least 1".into(),
            ));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(LauncherError::Config("data_dir must not be empty".into()));
        }
        Ok(())
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.data_dir.join("versions")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.data_dir.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.data_dir.join("assets")
    }

    pub fn runtimes_dir(&self) -> PathBuf {
        self.data_dir.join("runtimes")
    }
}

fn default_base_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Default data directory, honouring a bootstrap redirect left behind when
/// the user moved their launcher data elsewhere.
pub fn default_data_dir() -> PathBuf {
    let base = default_base_dir();
    let bootstrap_path = base.join(BOOTSTRAP_FILE);

    if let Ok(raw) = std::fs::read_to_string(&bootstrap_path) {
        if let Ok(cfg) = serde_json::from_str::<BootstrapConfig>(&raw) {
            return cfg.data_dir;
        }
    }

    base.join(APP_DIR_NAME)
}

fn default_search_roots() -> Vec<PathBuf> {
    if cfg!(target_os = "windows") {
        vec![
            PathBuf::from("C:/Program Files/Java"),
            PathBuf::from("C:/Program Files (x86)/Java"),
            PathBuf::from("C:/Program Files/Eclipse Adoptium"),
        ]
    } else if cfg!(target_os = "macos") {
        vec![PathBuf::from("/Library/Java/JavaVirtualMachines")]
    } else {
        vec![PathBuf::from("/usr/lib/jvm"), PathBuf::from("/opt/java")]
    }
}
