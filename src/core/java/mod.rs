pub mod archive;
pub mod probe;
pub mod runtime;

pub use probe::{parse_major_version, probe_java, JavaInstallation};
pub use runtime::{
    required_java_for_version_id, required_java_major, RuntimeCandidate, RuntimeProvisioner,
    RuntimeSource,
};
