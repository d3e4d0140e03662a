//! Host platform detection and the per-OS artifact naming table
//!
//! The packager embeds one shared library per target OS under a fixed file
//! name; the loader derives the same name from the host it runs on. Both sides
//! use [`OsFamily`] so the table exists once.

use std::fmt;

use crate::error::LoadError;

/// Operating system families natjar knows how to name artifacts for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OsFamily {
    Windows,
    Linux,
    MacOs,
}

impl OsFamily {
    /// All families, in declaration order
    pub const ALL: [OsFamily; 3] = [OsFamily::Windows, OsFamily::Linux, OsFamily::MacOs];

    /// File name of the embedded shared library for this family
    pub fn artifact_name(self) -> &'static str {
        match self {
            OsFamily::Windows => "win64.dll",
            OsFamily::Linux => "linux64.so",
            OsFamily::MacOs => "macosx.dylib",
        }
    }

    /// Short name used on the command line and in configuration
    pub fn name(self) -> &'static str {
        match self {
            OsFamily::Windows => "windows",
            OsFamily::Linux => "linux",
            OsFamily::MacOs => "mac",
        }
    }

    /// Parse a short family name (`windows`, `linux`, `mac`), case-insensitively
    pub fn from_name(name: &str) -> Option<OsFamily> {
        match name.to_ascii_lowercase().as_str() {
            "windows" | "win" => Some(OsFamily::Windows),
            "linux" => Some(OsFamily::Linux),
            "mac" | "macos" | "macosx" | "darwin" => Some(OsFamily::MacOs),
            _ => None,
        }
    }

    /// Families in the order a host OS name is tested against them
    pub const PROBE_ORDER: [OsFamily; 3] = [OsFamily::Linux, OsFamily::MacOs, OsFamily::Windows];

    /// Substring of a lowercased host OS name that identifies this family
    pub fn keyword(self) -> &'static str {
        match self {
            OsFamily::Windows => "win",
            OsFamily::Linux => "linux",
            OsFamily::MacOs => "mac",
        }
    }

    /// Classify a host OS name by substring: `linux`, then `mac`, then `win`
    pub fn from_os_name(os_name: &str) -> Option<OsFamily> {
        let lower = os_name.to_ascii_lowercase();
        OsFamily::PROBE_ORDER
            .into_iter()
            .find(|family| lower.contains(family.keyword()))
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// OS name and architecture of the host, as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlatform {
    pub os_name: String,
    pub arch: String,
}

impl HostPlatform {
    pub fn new(os_name: impl Into<String>, arch: impl Into<String>) -> Self {
        HostPlatform {
            os_name: os_name.into(),
            arch: arch.into(),
        }
    }

    /// Probe the running host
    pub fn detect() -> Self {
        HostPlatform::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn is_64_bit(&self) -> bool {
        self.arch.contains("64")
    }

    /// Resolve the OS family, rejecting 32-bit hosts first
    pub fn os_family(&self) -> Result<OsFamily, LoadError> {
        if !self.is_64_bit() {
            return Err(LoadError::UnsupportedArchitecture {
                arch: self.arch.clone(),
            });
        }
        OsFamily::from_os_name(&self.os_name).ok_or_else(|| LoadError::UnrecognizedOs {
            os_name: self.os_name.clone(),
        })
    }

    /// Artifact file name for this host
    pub fn artifact_name(&self) -> Result<&'static str, LoadError> {
        self.os_family().map(OsFamily::artifact_name)
    }
}
