// ─── Version Descriptor ───
// Per-version document. The schema changed over the years; old documents
// omit most of what modern ones carry, so everything but `id` is optional
// and unknown fields are ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

use crate::core::error::{LauncherError, LauncherResult};

/// A parsed version descriptor.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawDescriptor")]
pub struct VersionDescriptor {
    pub id: String,
    pub release_type: Option<String>,
    pub main_class: Option<String>,
    pub inherits_from: Option<String>,
    pub assets: AssetsReference,
    pub downloads: VersionDownloads,
    pub libraries: Vec<LibrarySpec>,
    pub java_version: Option<JavaVersionInfo>,
    pub minimum_launcher_version: Option<u32>,
}

/// How a descriptor points at its assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetsReference {
    /// Ancient descriptors carry no assets at all.
    None,
    /// Bare identifier (`"pre-1.6"`, `"legacy"`) with no downloadable index.
    Named(String),
    /// Modern detailed index reference.
    Indexed(AssetIndexInfo),
}

impl AssetsReference {
    pub fn id(&self) -> Option<&str> {
        match self {
            AssetsReference::None => None,
            AssetsReference::Named(id) => Some(id),
            AssetsReference::Indexed(info) => Some(&info.id),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionDownloads {
    #[serde(default)]
    pub client: Option<DownloadArtifact>,
    #[serde(default)]
    pub server: Option<DownloadArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadArtifact {
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default, deserialize_with = "lenient_size")]
    pub size: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexInfo {
    #[serde(default)]
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default, deserialize_with = "lenient_size")]
    pub size: Option<u64>,
    #[serde(default, deserialize_with = "lenient_size")]
    pub total_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersionInfo {
    #[serde(default)]
    pub component: Option<String>,
    pub major_version: u32,
}

// ─── Libraries ───

#[derive(Debug, Clone, Deserialize)]
pub struct LibrarySpec {
    /// Coordinate, e.g. `org.lwjgl:lwjgl:3.3.1:natives-linux`.
    pub name: String,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default)]
    pub rules: Option<Vec<Rule>>,
    /// Legacy OS name → classifier map, values may contain `${arch}`.
    #[serde(default)]
    pub natives: Option<BTreeMap<String, String>>,
    /// Legacy repository base for libraries without `downloads`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub extract: Option<ExtractRules>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<LibraryArtifact>,
    #[serde(default)]
    pub classifiers: BTreeMap<String, LibraryArtifact>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LibraryArtifact {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default, deserialize_with = "lenient_size")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractRules {
    #[serde(default)]
    pub exclude: Vec<String>,
}

// ─── Rules ───

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsFilter>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OsFilter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
    /// Regex over the OS version string; not evaluated.
    #[serde(default)]
    pub version: Option<String>,
}

// ─── Parsing ───

/// Wire shape. `assets` may be a bare id or an object, and `assetIndex`
/// supersedes both when present.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDescriptor {
    id: String,
    #[serde(rename = "type", default)]
    release_type: Option<String>,
    #[serde(default)]
    main_class: Option<String>,
    #[serde(default)]
    inherits_from: Option<String>,
    #[serde(default)]
    assets: Option<RawAssets>,
    #[serde(default)]
    asset_index: Option<AssetIndexInfo>,
    #[serde(default)]
    downloads: Option<VersionDownloads>,
    #[serde(default)]
    libraries: Option<Vec<LibrarySpec>>,
    #[serde(default)]
    java_version: Option<JavaVersionInfo>,
    #[serde(default)]
    minimum_launcher_version: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAssets {
    Id(String),
    Detailed(AssetIndexInfo),
    Unknown(serde_json::Value),
}

impl From<RawDescriptor> for VersionDescriptor {
    fn from(raw: RawDescriptor) -> Self {
        let assets = match (raw.asset_index, raw.assets) {
            (Some(mut index), named) => {
                if index.id.is_empty() {
                    if let Some(RawAssets::Id(id)) = named {
                        index.id = id;
                    }
                }
                AssetsReference::Indexed(index)
            }
            (None, Some(RawAssets::Detailed(index))) => AssetsReference::Indexed(index),
            (None, Some(RawAssets::Id(id))) => AssetsReference::Named(id),
            (None, Some(RawAssets::Unknown(_)) | None) => AssetsReference::None,
        };

        Self {
            id: raw.id,
            release_type: raw.release_type,
            main_class: raw.main_class,
            inherits_from: raw.inherits_from,
            assets,
            downloads: raw.downloads.unwrap_or_default(),
            libraries: raw.libraries.unwrap_or_default(),
            java_version: raw.java_version,
            minimum_launcher_version: raw.minimum_launcher_version,
        }
    }
}

impl VersionDescriptor {
    /// Parse a raw document; `id` names it in the error.
    pub fn parse(id: &str, raw: &[u8]) -> LauncherResult<Self> {
        serde_json::from_slice(raw).map_err(|source| LauncherError::DescriptorParse {
            id: id.to_string(),
            source,
        })
    }

    pub fn from_value(id: &str, value: serde_json::Value) -> LauncherResult<Self> {
        serde_json::from_value(value).map_err(|source| LauncherError::DescriptorParse {
            id: id.to_string(),
            source,
        })
    }

    /// Overlay an installer-produced child document on its parent.
    ///
    /// Child keys replace parent keys, except `libraries`, which concatenate
    /// child-first so loader libraries shadow vanilla ones on the classpath.
    pub fn merge_with_parent(
        child: &serde_json::Value,
        parent: &serde_json::Value,
    ) -> serde_json::Value {
        let mut merged = parent.clone();
        let Some(child_obj) = child.as_object() else {
            return merged;
        };

        for (key, value) in child_obj {
            if key == "libraries" {
                let mut libraries = value.as_array().cloned().unwrap_or_default();
                if let Some(parent_libs) = parent.get("libraries").and_then(|l| l.as_array()) {
                    libraries.extend(parent_libs.iter().cloned());
                }
                merged[key] = serde_json::Value::Array(libraries);
            } else {
                merged[key] = value.clone();
            }
        }
        if let Some(obj) = merged.as_object_mut() {
            obj.remove("inheritsFrom");
        }

        merged
    }
}

/// Sizes appear as numbers in most documents and as strings in a few.
fn lenient_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(u64),
        Text(String),
        Other(serde_json::Value),
    }

    Ok(match Option::<Size>::deserialize(deserializer)? {
        Some(Size::Number(n)) => Some(n),
        Some(Size::Text(s)) => s.trim().parse().ok(),
        Some(Size::Other(_)) | None => None,
    })
}
