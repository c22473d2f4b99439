// ─── Runtime Archives ───
// Distributions ship as zip (Windows) or gzip tar (Linux, macOS) with one
// top-level directory. Both are unpacked with that directory stripped.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    /// Detect by magic bytes; the download URL carries no extension.
    pub fn sniff(path: &Path) -> LauncherResult<Self> {
        let mut magic = [0_u8; 4];
        let mut file = File::open(path).map_err(|e| LauncherError::io(path, e))?;
        let read = file.read(&mut magic).map_err(|e| LauncherError::io(path, e))?;
        match &magic[..read] {
            [b'P', b'K', 0x03, 0x04] => Ok(ArchiveKind::Zip),
            [0x1f, 0x8b, ..] => Ok(ArchiveKind::TarGz),
            _ => Err(LauncherError::Other(format!(
                "{path:?} is neither a zip nor a gzip archive"
            ))),
        }
    }
}

/// Unpack `archive` into `dest`, dropping the first path component.
pub fn extract_runtime_archive(archive: &Path, dest: &Path) -> LauncherResult<()> {
    std::fs::create_dir_all(dest).map_err(|e| LauncherError::io(dest, e))?;
    let kind = ArchiveKind::sniff(archive)?;
    debug!("Extracting {:?} archive {:?} into {:?}", kind, archive, dest);
    match kind {
        ArchiveKind::Zip => extract_zip(archive, dest),
        ArchiveKind::TarGz => extract_tar_gz(archive, dest),
    }
}

/// Relative path with the top-level directory removed. Entries that try
/// to escape the destination are rejected.
fn strip_top_level(path: &Path) -> LauncherResult<Option<PathBuf>> {
    let mut components = path.components();
    components.next();
    let mut stripped = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => stripped.push(part),
            Component::CurDir => {}
            _ => {
                return Err(LauncherError::Other(format!(
                    "unsafe archive entry path {path:?}"
                )))
            }
        }
    }
    Ok((!stripped.as_os_str().is_empty()).then_some(stripped))
}

/// Create the parent of `path` and require it to resolve inside `root`.
/// `root` must already be canonical.
fn create_parent(path: &Path, root: &Path) -> LauncherResult<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
    ensure_inside(parent, root)
}

fn ensure_inside(dir: &Path, root: &Path) -> LauncherResult<()> {
    let resolved = std::fs::canonicalize(dir).map_err(|e| LauncherError::io(dir, e))?;
    if !resolved.starts_with(root) {
        return Err(LauncherError::Other(format!(
            "archive entry {dir:?} resolves outside {root:?}"
        )));
    }
    Ok(())
}

/// Whether a symlink at `relative` pointing to `target` stays below the
/// extraction root, judged on path components alone.
fn link_stays_inside(relative: &Path, target: &Path) -> bool {
    let mut depth: Vec<&std::ffi::OsStr> = relative
        .parent()
        .map(|p| p.iter().collect())
        .unwrap_or_default();
    for component in target.components() {
        match component {
            Component::Normal(part) => depth.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth.pop().is_none() {
                    return false;
                }
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

fn canonical_root(dest: &Path) -> LauncherResult<PathBuf> {
    std::fs::canonicalize(dest).map_err(|e| LauncherError::io(dest, e))
}

fn extract_zip(archive: &Path, dest: &Path) -> LauncherResult<()> {
    let root = canonical_root(dest)?;
    let file = File::open(archive).map_err(|e| LauncherError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file)?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let name = entry
            .enclosed_name()
            .ok_or_else(|| LauncherError::Other(format!("invalid zip entry {}", entry.name())))?;
        let Some(relative) = strip_top_level(&name)? else {
            continue;
        };
        let out_path = root.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
            continue;
        }
        create_parent(&out_path, &root)?;
        let mut out = File::create(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::io(&out_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode & 0o777))
                    .map_err(|e| LauncherError::io(&out_path, e))?;
            }
        }
    }
    Ok(())
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> LauncherResult<()> {
    let root = canonical_root(dest)?;
    let file = File::open(archive).map_err(|e| LauncherError::io(archive, e))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));

    let entries = tar.entries().map_err(|e| LauncherError::io(archive, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| LauncherError::io(archive, e))?;
        let name = entry
            .path()
            .map_err(|e| LauncherError::io(archive, e))?
            .into_owned();
        let Some(relative) = strip_top_level(&name)? else {
            continue;
        };
        let entry_type = entry.header().entry_type();

        // Symlink targets are relative to the link; hard link targets are
        // archive paths and go through the same stripping as entry names.
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            let target = entry
                .link_name()
                .map_err(|e| LauncherError::io(archive, e))?
                .map(|t| t.into_owned())
                .ok_or_else(|| LauncherError::Other(format!("link {name:?} has no target")))?;
            let inside = if entry_type.is_symlink() {
                link_stays_inside(&relative, &target)
            } else {
                matches!(strip_top_level(&target), Ok(Some(_)))
            };
            if !inside {
                return Err(LauncherError::Other(format!(
                    "archive link {name:?} points outside the runtime ({target:?})"
                )));
            }
        }

        let out_path = root.join(&relative);
        if entry_type.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
            ensure_inside(&out_path, &root)?;
            continue;
        }
        create_parent(&out_path, &root)?;
        if entry_type.is_hard_link() {
            // `unpack` resolves hard link targets against the process cwd.
            let target = entry
                .link_name()
                .map_err(|e| LauncherError::io(archive, e))?
                .and_then(|t| strip_top_level(&t).ok().flatten())
                .ok_or_else(|| LauncherError::Other(format!("link {name:?} has no target")))?;
            let source = root.join(target);
            std::fs::hard_link(&source, &out_path).map_err(|e| LauncherError::io(&out_path, e))?;
            continue;
        }
        entry
            .unpack(&out_path)
            .map_err(|e| LauncherError::io(&out_path, e))?;
    }
    Ok(())
}
