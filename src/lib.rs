pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::config::LauncherConfig;
pub use crate::core::error::{LauncherError, LauncherResult};
pub use crate::core::launch::{LaunchRequest, ResolvedLaunch, Resolver};
pub use crate::core::platform::Environment;

/// Initialize structured logging. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,interface_resolver=debug")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
