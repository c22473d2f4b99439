use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, instrument};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// What a `java` binary reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JavaInstallation {
    pub path: PathBuf,
    pub version: String,
    pub major: u32,
    pub is_64bit: bool,
    pub vendor: String,
}

/// Run `java -XshowSettings:properties -version` and parse what it prints.
/// `None` when the binary is missing, hangs, or prints no version.
#[instrument]
pub async fn probe_java(path: &Path) -> Option<JavaInstallation> {
    let child = Command::new(path)
        .args(["-XshowSettings:properties", "-version"])
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(PROBE_TIMEOUT, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!("Cannot run {:?}: {}", path, e);
            return None;
        }
        Err(_) => {
            debug!("Probe of {:?} timed out", path);
            return None;
        }
    };

    let text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );
    parse_probe_output(path, &text)
}

pub fn parse_probe_output(path: &Path, text: &str) -> Option<JavaInstallation> {
    let version = parse_version_string(text)?;
    let major = parse_major_version(&version);
    if major == 0 {
        return None;
    }

    let lower = text.to_ascii_lowercase();
    let is_64bit = lower.contains("sun.arch.data.model = 64")
        || lower.contains("os.arch = amd64")
        || lower.contains("os.arch = x86_64")
        || lower.contains("os.arch = aarch64");

    Some(JavaInstallation {
        path: path.to_path_buf(),
        version,
        major,
        is_64bit,
        vendor: parse_vendor(text),
    })
}

/// First double-quoted token, e.g. `openjdk version "17.0.8" 2023-07-18`.
fn parse_version_string(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let start = line.find('"')?;
        let end = line[start + 1..].find('"')?;
        Some(line[start + 1..start + 1 + end].to_string())
    })
}

/// `1.8.0_392` → 8, `17.0.8` → 17, `21` → 21, `22-ea` → 22.
pub fn parse_major_version(version: &str) -> u32 {
    let leading = |s: &str| -> Option<u32> {
        let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    };

    let mut parts = version.split('.');
    match parts.next().and_then(leading) {
        Some(1) => parts.next().and_then(leading).unwrap_or(1),
        Some(major) => major,
        None => 0,
    }
}

fn parse_vendor(text: &str) -> String {
    for (needle, vendor) in [
        ("Temurin", "Temurin"),
        ("Adoptium", "Adoptium"),
        ("Zulu", "Zulu"),
        ("GraalVM", "GraalVM"),
        ("Microsoft", "Microsoft"),
        ("OpenJDK", "OpenJDK"),
        ("Java(TM)", "Oracle"),
    ] {
        if text.contains(needle) {
            return vendor.to_string();
        }
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_version_forms() {
        assert_eq!(parse_major_version("17.0.8"), 17);
        assert_eq!(parse_major_version("21"), 21);
        assert_eq!(parse_major_version("1.8.0_392"), 8);
        assert_eq!(parse_major_version("22-ea"), 22);
        assert_eq!(parse_major_version("garbage"), 0);
    }

    #[test]
    fn probe_output_is_parsed() {
        let text = "openjdk version \"17.0.8\" 2023-07-18\n\
                    OpenJDK Runtime Environment Temurin-17.0.8+7 (build 17.0.8+7)\n\
                    \x20   os.arch = amd64\n";
        let install = parse_probe_output(Path::new("/opt/jdk/bin/java"), text).unwrap();
        assert_eq!(install.major, 17);
        assert_eq!(install.version, "17.0.8");
        assert_eq!(install.vendor, "Temurin");
        assert!(install.is_64bit);
    }

    #[test]
    fn output_without_version_is_rejected() {
        assert!(parse_probe_output(Path::new("java"), "command not found").is_none());
    }

    #[tokio::test]
    async fn missing_binary_probes_to_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(probe_java(&dir.path().join("nope")).await.is_none());
    }
}
