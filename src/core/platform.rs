// ─── Platform ───
// The one place OS/arch detection happens. Built once and passed explicitly
// into rule evaluation and runtime provisioning.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::LauncherError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Windows,
    Linux,
    Macos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuArch {
    X86,
    X86_64,
    Arm,
    Aarch64,
}

/// Resolution environment: what rules and runtimes are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Environment {
    pub os: OsFamily,
    pub arch: CpuArch,
}

impl OsFamily {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => OsFamily::Windows,
            "macos" => OsFamily::Macos,
            _ => OsFamily::Linux,
        }
    }

    /// Name used by `os.name` in version descriptor rules.
    pub fn mojang_name(self) -> &'static str {
        match self {
            OsFamily::Windows => "windows",
            OsFamily::Linux => "linux",
            OsFamily::Macos => "osx",
        }
    }

    /// Fixed classifier table used when a library carries no `natives` map.
    pub fn classifier_name(self) -> &'static str {
        match self {
            OsFamily::Windows => "windows",
            OsFamily::Linux => "linux",
            OsFamily::Macos => "macos",
        }
    }

    /// OS segment of the runtime distribution API.
    pub fn runtime_id(self) -> &'static str {
        match self {
            OsFamily::Windows => "windows",
            OsFamily::Linux => "linux",
            OsFamily::Macos => "mac",
        }
    }

    pub fn java_exe(self) -> &'static str {
        match self {
            OsFamily::Windows => "java.exe",
            _ => "java",
        }
    }
}

impl CpuArch {
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "x86" => CpuArch::X86,
            "arm" => CpuArch::Arm,
            "aarch64" => CpuArch::Aarch64,
            _ => CpuArch::X86_64,
        }
    }

    pub fn is_64bit(self) -> bool {
        matches!(self, CpuArch::X86_64 | CpuArch::Aarch64)
    }

    /// Whether an `os.arch` rule filter names this architecture.
    pub fn matches_rule_name(self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        match self {
            CpuArch::X86 => matches!(name.as_str(), "x86" | "i386" | "i686"),
            CpuArch::X86_64 => matches!(name.as_str(), "x86_64" | "amd64" | "x64"),
            CpuArch::Arm => matches!(name.as_str(), "arm" | "arm32"),
            CpuArch::Aarch64 => matches!(name.as_str(), "arm64" | "aarch64"),
        }
    }

    /// Architecture segment of the runtime distribution API.
    pub fn runtime_id(self) -> &'static str {
        match self {
            CpuArch::X86 => "x86",
            CpuArch::X86_64 => "x64",
            CpuArch::Arm => "arm",
            CpuArch::Aarch64 => "aarch64",
        }
    }
}

impl Environment {
    pub fn new(os: OsFamily, arch: CpuArch) -> Self {
        Self { os, arch }
    }

    pub fn detect() -> Self {
        Self::new(OsFamily::current(), CpuArch::current())
    }

    /// Value substituted for `${arch}` in legacy `natives` classifiers.
    pub fn natives_arch_token(&self) -> &'static str {
        if self.arch.is_64bit() {
            "64"
        } else {
            "32"
        }
    }

    /// Native classifier keys derived from the fixed OS table, most specific
    /// first.
    pub fn classifier_keys(&self) -> Vec<String> {
        let base = format!("natives-{}", self.os.classifier_name());
        if self.arch.is_64bit() {
            vec![format!("{base}-64"), base]
        } else {
            vec![base]
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.runtime_id(), self.arch.runtime_id())
    }
}

impl FromStr for OsFamily {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "windows" | "win" => Ok(OsFamily::Windows),
            "linux" => Ok(OsFamily::Linux),
            "macos" | "osx" | "mac" | "darwin" => Ok(OsFamily::Macos),
            other => Err(LauncherError::Config(format!("unknown OS family '{other}'"))),
        }
    }
}

impl FromStr for CpuArch {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x86" | "i386" | "i686" => Ok(CpuArch::X86),
            "x86_64" | "amd64" | "x64" => Ok(CpuArch::X86_64),
            "arm" => Ok(CpuArch::Arm),
            "aarch64" | "arm64" => Ok(CpuArch::Aarch64),
            other => Err(LauncherError::Config(format!("unknown architecture '{other}'"))),
        }
    }
}
