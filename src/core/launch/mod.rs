pub mod natives;
pub mod resolve;

pub use natives::{extract_natives, native_jars, NativeJar};
pub use resolve::{AcquisitionReport, LaunchRequest, LaunchSummary, ResolvedLaunch, Resolver};
