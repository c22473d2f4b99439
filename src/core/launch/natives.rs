// ─── Natives ───
// Platform libraries ship inside jars. Each applicable native jar is
// unpacked into one per-version directory before launch; `META-INF` and
// the library's own `extract.exclude` prefixes are left out.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::{LibraryCoordinate, ResolvedLibrary};

use super::resolve::local_path;

const ALWAYS_EXCLUDED: &str = "META-INF/";

/// A downloaded jar whose contents belong in the natives directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeJar {
    pub jar: PathBuf,
    /// Entry name prefixes to leave out.
    pub exclude: Vec<String>,
}

/// Native jars of `libraries`, in library order.
///
/// A library contributes its classified native when it has one. Otherwise
/// its primary artifact counts when the coordinate itself carries a
/// `natives-*` classifier, as modern descriptors list natives that way.
pub fn native_jars(libraries: &[ResolvedLibrary], libraries_root: &Path) -> Vec<NativeJar> {
    libraries
        .iter()
        .filter_map(|library| {
            let location = match &library.native {
                Some(native) => native,
                None if is_native_coordinate(&library.spec.name) => library.artifact.as_ref()?,
                None => return None,
            };
            let jar = local_path(libraries_root, &location.path)?;
            let exclude = library
                .spec
                .extract
                .as_ref()
                .map(|rules| rules.exclude.clone())
                .unwrap_or_default();
            Some(NativeJar { jar, exclude })
        })
        .collect()
}

fn is_native_coordinate(name: &str) -> bool {
    LibraryCoordinate::parse(name)
        .ok()
        .and_then(|c| c.classifier)
        .is_some_and(|classifier| classifier.starts_with("natives-"))
}

/// Recreate `natives_dir` and unpack every jar into it. A jar that is
/// missing or unreadable is logged and skipped. Returns the number of
/// files written.
pub async fn extract_natives(jars: Vec<NativeJar>, natives_dir: &Path) -> LauncherResult<usize> {
    let dest = natives_dir.to_path_buf();
    let extracted = tokio::task::spawn_blocking(move || extract_all(&jars, &dest))
        .await
        .map_err(|e| LauncherError::Other(format!("Natives extraction task failed: {e}")))??;
    info!("Extracted {} native files into {:?}", extracted, natives_dir);
    Ok(extracted)
}

fn extract_all(jars: &[NativeJar], natives_dir: &Path) -> LauncherResult<usize> {
    // Leftovers from another library set must not be picked up.
    match std::fs::remove_dir_all(natives_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(LauncherError::io(natives_dir, e)),
    }
    std::fs::create_dir_all(natives_dir).map_err(|e| LauncherError::io(natives_dir, e))?;

    let mut extracted = 0;
    for native in jars {
        if !native.jar.is_file() {
            debug!("Native jar {:?} not present, skipping", native.jar);
            continue;
        }
        match extract_jar(native, natives_dir) {
            Ok(count) => extracted += count,
            Err(e) => warn!("Cannot extract natives from {:?}: {}", native.jar, e),
        }
    }
    Ok(extracted)
}

fn extract_jar(native: &NativeJar, natives_dir: &Path) -> LauncherResult<usize> {
    let file = File::open(&native.jar).map_err(|e| LauncherError::io(&native.jar, e))?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut count = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.starts_with(ALWAYS_EXCLUDED)
            || native.exclude.iter().any(|prefix| name.starts_with(prefix.as_str()))
        {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            debug!("Skipping unsafe native entry {}", name);
            continue;
        };

        let out_path = natives_dir.join(relative);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        let mut out = File::create(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::io(&out_path, e))?;
        count += 1;
    }
    Ok(count)
}
