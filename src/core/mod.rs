// ─── InterfaceOficial Resolution Core ───
// Version resolution, artifact acquisition and Java runtime provisioning.
//
// Architecture:
//   core/
//     config      — Launcher settings, store roots, remote endpoints
//     platform    — OS/arch environment, detected once
//     version/    — Version index, descriptors, rule evaluation, metadata store
//     downloader/ — Integrity-checked fetches under a concurrency bound
//     assets/     — Asset index + content-addressed objects
//     java/       — Runtime probing, cache and provisioning
//     auth        — Opaque credential consumed by resolution
//     launch/     — resolve_and_acquire, the entry point for launch assembly

pub mod assets;
pub mod auth;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod java;
pub mod launch;
pub mod platform;
pub mod version;
