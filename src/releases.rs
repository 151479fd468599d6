//! Per-release constants.
//!
//! Which packages come from the testing or development repositories, which
//! dvers a series supports and which bundles (metapackage + patch sets) can
//! be built are all keyed by release series. The table is loaded once at
//! startup, from the copy embedded in the binary or from an override file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::target::Dver;

const DEFAULT_RELEASES: &str = include_str!("../data/releases.json");

/// A tarball that can be built for a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// Short name used on the command line ("wn-client").
    pub name: String,
    /// Metapackage installed in stage 2; also names the tarball.
    pub metapackage: String,
    /// Installed next to the metapackage.
    #[serde(default)]
    pub extra_packages: Vec<String>,
    /// Subdirectories of the patches directory, applied in this order.
    #[serde(default)]
    pub patch_sets: Vec<String>,
}

impl Bundle {
    /// Full stage-2 package set: extras first, then the metapackage.
    pub fn packages(&self) -> Vec<String> {
        let mut packages = self.extra_packages.clone();
        packages.push(self.metapackage.clone());
        packages
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub dvers: Vec<Dver>,
    /// Packages pulled from the limited testing repository.
    #[serde(default)]
    pub testing_packages: Vec<String>,
    /// Packages pulled from the limited development repository.
    #[serde(default)]
    pub minefield_packages: Vec<String>,
    #[serde(default)]
    pub bundles: Vec<Bundle>,
}

impl Release {
    pub fn bundle(&self, name: &str) -> Option<&Bundle> {
        self.bundles
            .iter()
            .find(|b| b.name == name || b.metapackage == name)
    }

    pub fn supports(&self, dver: Dver) -> bool {
        self.dvers.contains(&dver)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseTable {
    pub releases: BTreeMap<String, Release>,
}

impl ReleaseTable {
    /// The table compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_json(DEFAULT_RELEASES)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let table: ReleaseTable = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid release table: {}", e)))?;
        for (series, release) in &table.releases {
            if release.dvers.is_empty() {
                return Err(Error::Config(format!(
                    "release {} does not list any dvers",
                    series
                )));
            }
        }
        Ok(table)
    }

    /// Load from `path` if given, otherwise use the builtin table.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let json = fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
                Self::from_json(&json)
            }
            None => Self::builtin(),
        }
    }

    pub fn get(&self, series: &str) -> Result<&Release> {
        self.releases.get(series).ok_or_else(|| {
            Error::Config(format!(
                "unknown release series {:?}, known: {}",
                series,
                self.releases.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_parses() {
        let table = ReleaseTable::builtin().unwrap();
        let release = table.get("3.6").unwrap();
        assert!(release.supports(Dver::El7));
        assert!(release.testing_packages.contains(&"osg-version".to_string()));
        let bundle = release.bundle("wn-client").unwrap();
        assert_eq!(bundle.metapackage, "osg-wn-client");
    }

    #[test]
    fn test_bundle_lookup_by_metapackage() {
        let table = ReleaseTable::builtin().unwrap();
        let release = table.get("3.6").unwrap();
        assert!(release.bundle("osg-wn-client").is_some());
        assert!(release.bundle("nope").is_none());
    }

    #[test]
    fn test_bundle_packages_end_with_metapackage() {
        let bundle = Bundle {
            name: "wn-client".to_string(),
            metapackage: "osg-wn-client".to_string(),
            extra_packages: vec!["osg-ca-scripts".to_string()],
            patch_sets: vec![],
        };
        assert_eq!(bundle.packages(), vec!["osg-ca-scripts", "osg-wn-client"]);
    }

    #[test]
    fn test_unknown_series_is_config_error() {
        let table = ReleaseTable::builtin().unwrap();
        assert!(matches!(table.get("0.1"), Err(Error::Config(_))));
    }

    #[test]
    fn test_release_without_dvers_rejected() {
        let json = r#"{"releases": {"9.9": {"dvers": []}}}"#;
        assert!(matches!(ReleaseTable::from_json(json), Err(Error::Config(_))));
    }
}
