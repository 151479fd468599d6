//! Target environment descriptor and per-platform capabilities.
//!
//! A build is parameterized by the distribution version (`dver`), the CPU
//! architecture (`basearch`), the release series and a prerelease flag.
//! Everything that differs between platform generations is expressed as a
//! [`PlatformCaps`] flag instead of comparing version strings at call sites.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Distribution version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dver {
    El6,
    El7,
    El8,
    El9,
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Basearch {
    #[serde(rename = "x86_64")]
    X86_64,
}

pub const VALID_DVERS: &[Dver] = &[Dver::El6, Dver::El7, Dver::El8, Dver::El9];
pub const VALID_BASEARCHES: &[Basearch] = &[Basearch::X86_64];
pub const DEFAULT_BASEARCH: Basearch = Basearch::X86_64;

/// Package manager front end shipped by a platform generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManagerKind {
    Yum,
    Dnf,
}

impl PackageManagerKind {
    /// Command used for install/clean.
    pub fn program(&self) -> &'static str {
        match self {
            PackageManagerKind::Yum => "yum",
            PackageManagerKind::Dnf => "dnf",
        }
    }

    /// Command and leading arguments used for download-only operations.
    pub fn download_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            PackageManagerKind::Yum => ("yumdownloader", &[]),
            PackageManagerKind::Dnf => ("dnf", &["download"]),
        }
    }

    /// Name of the package that provides the package manager itself.
    pub fn own_package(&self) -> &'static str {
        self.program()
    }
}

/// Behaviors that differ between platform generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCaps {
    /// Foundational packages need real files in stage 1 because later
    /// scriptlets run them.
    pub unpack_foundation: bool,
    /// Extra libraries force-installed (with dependencies) after coreutils.
    pub extra_foundation: &'static [&'static str],
    /// Stage 1 needs `yum-plugin-priorities` installed.
    pub priorities_plugin: bool,
    /// Stage 1 needs character devices in `/dev`.
    pub dev_nodes: bool,
    /// fetch-crl was renamed between generations; link the old and new
    /// names to each other.
    pub fetch_crl_compat_links: bool,
    /// Package database directory, relative to the staging root.
    pub rpmdb_dir: &'static str,
    pub package_manager: PackageManagerKind,
}

impl Dver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dver::El6 => "el6",
            Dver::El7 => "el7",
            Dver::El8 => "el8",
            Dver::El9 => "el9",
        }
    }

    pub fn caps(&self) -> PlatformCaps {
        match self {
            Dver::El6 => PlatformCaps {
                unpack_foundation: true,
                extra_foundation: &["coreutils-libs", "pam", "ncurses", "gmp"],
                priorities_plugin: true,
                dev_nodes: true,
                fetch_crl_compat_links: true,
                rpmdb_dir: "var/lib/rpm",
                package_manager: PackageManagerKind::Yum,
            },
            Dver::El7 => PlatformCaps {
                unpack_foundation: true,
                extra_foundation: &[],
                priorities_plugin: true,
                dev_nodes: false,
                fetch_crl_compat_links: false,
                rpmdb_dir: "var/lib/rpm",
                package_manager: PackageManagerKind::Yum,
            },
            Dver::El8 => PlatformCaps {
                unpack_foundation: false,
                extra_foundation: &[],
                priorities_plugin: false,
                dev_nodes: false,
                fetch_crl_compat_links: false,
                rpmdb_dir: "var/lib/rpm",
                package_manager: PackageManagerKind::Dnf,
            },
            Dver::El9 => PlatformCaps {
                unpack_foundation: false,
                extra_foundation: &[],
                priorities_plugin: false,
                dev_nodes: false,
                fetch_crl_compat_links: false,
                rpmdb_dir: "usr/lib/sysimage/rpm",
                package_manager: PackageManagerKind::Dnf,
            },
        }
    }
}

impl Basearch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Basearch::X86_64 => "x86_64",
        }
    }

    /// Whether the platform keeps 64-bit libraries in `lib64`.
    pub fn is_64bit(&self) -> bool {
        matches!(self, Basearch::X86_64)
    }
}

impl FromStr for Dver {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        VALID_DVERS
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| {
                Error::Config(format!(
                    "invalid dver {:?}, should be one of: {}",
                    s,
                    VALID_DVERS.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(", ")
                ))
            })
    }
}

impl FromStr for Basearch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        VALID_BASEARCHES
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| {
                Error::Config(format!(
                    "invalid basearch {:?}, should be one of: {}",
                    s,
                    VALID_BASEARCHES.iter().map(|a| a.as_str()).collect::<Vec<_>>().join(", ")
                ))
            })
    }
}

impl fmt::Display for Dver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Basearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that selects repositories and package lists for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEnv {
    pub dver: Dver,
    pub basearch: Basearch,
    /// Release series, e.g. "3.6" or "23".
    pub series: String,
    pub prerelease: bool,
}

impl TargetEnv {
    pub fn new(dver: Dver, basearch: Basearch, series: impl Into<String>) -> Self {
        Self {
            dver,
            basearch,
            series: series.into(),
            prerelease: false,
        }
    }

    /// Parse raw tokens. Fails before anything touches the filesystem.
    pub fn parse(dver: &str, basearch: &str, series: &str) -> Result<Self> {
        let dver = dver.parse()?;
        let basearch = basearch.parse()?;
        if series.trim().is_empty() {
            return Err(Error::Config("release series must not be empty".to_string()));
        }
        Ok(Self::new(dver, basearch, series.trim()))
    }

    pub fn with_prerelease(mut self, prerelease: bool) -> Self {
        self.prerelease = prerelease;
        self
    }

    pub fn caps(&self) -> PlatformCaps {
        self.dver.caps()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_tokens() {
        let env = TargetEnv::parse("el7", "x86_64", "3.6").unwrap();
        assert_eq!(env.dver, Dver::El7);
        assert_eq!(env.basearch, Basearch::X86_64);
        assert_eq!(env.series, "3.6");
        assert!(!env.prerelease);
    }

    #[test]
    fn test_parse_rejects_unknown_dver() {
        let err = TargetEnv::parse("el5", "x86_64", "3.6").unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("el5")));
    }

    #[test]
    fn test_parse_rejects_unknown_basearch() {
        let err = TargetEnv::parse("el7", "i386", "3.6").unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("i386")));
    }

    #[test]
    fn test_caps_by_generation() {
        assert!(Dver::El7.caps().unpack_foundation);
        assert!(!Dver::El8.caps().unpack_foundation);
        assert!(Dver::El6.caps().dev_nodes);
        assert!(Dver::El6.caps().fetch_crl_compat_links);
        assert!(!Dver::El9.caps().fetch_crl_compat_links);
        assert_eq!(Dver::El9.caps().rpmdb_dir, "usr/lib/sysimage/rpm");
        assert_eq!(Dver::El7.caps().package_manager.own_package(), "yum");
        assert_eq!(Dver::El8.caps().package_manager.own_package(), "dnf");
    }

    #[test]
    fn test_serde_names_match_tokens() {
        let dvers: Vec<Dver> = serde_json::from_str(r#"["el6","el9"]"#).unwrap();
        assert_eq!(dvers, vec![Dver::El6, Dver::El9]);
        let arch: Basearch = serde_json::from_str(r#""x86_64""#).unwrap();
        assert_eq!(arch, Basearch::X86_64);
    }
}
