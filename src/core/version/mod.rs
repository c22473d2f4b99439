pub mod coordinate;
pub mod descriptor;
pub mod manifest;
pub mod rules;
pub mod store;

pub use coordinate::LibraryCoordinate;
pub use descriptor::{
    AssetIndexInfo, AssetsReference, DownloadArtifact, JavaVersionInfo, LibraryArtifact,
    LibraryDownloads, LibrarySpec, OsFilter, Rule, RuleAction, VersionDescriptor,
    VersionDownloads,
};
pub use manifest::{LatestVersions, VersionManifest, VersionSummary};
pub use rules::{
    applicable_libraries, applicable_libraries_from, rules_allow, ArtifactLocation,
    ResolvedLibrary,
};
pub use store::MetadataStore;
