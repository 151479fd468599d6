//! Configuration management for tarball-client.
//!
//! Reads configuration from a `.env` file and environment variables.
//! Environment variables take precedence over the `.env` file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::releases::ReleaseTable;
use crate::stage1::parse_package_list;

/// Repository template used when `TARBALL_REPO_TEMPLATE` is not set.
pub const DEFAULT_REPO_TEMPLATE: &str = include_str!("../data/osg-tarball.repo.in");

/// Stage-1 package list used when `TARBALL_STAGE1_PACKAGES` is not set.
pub const DEFAULT_STAGE1_PACKAGES: &str = include_str!("../data/stage1-packages.txt");

/// tarball-client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where stage directories are created (default: work)
    pub work_dir: PathBuf,
    /// Where finished tarballs are written (default: output)
    pub output_dir: PathBuf,
    /// Root of the patch sets (default: patches)
    pub patches_dir: PathBuf,
    /// Scripts copied into the tarball's `osg/` directory
    pub post_install_dir: Option<PathBuf>,
    /// Repository definition template; builtin if unset
    pub repo_template: Option<PathBuf>,
    /// Stage-1 package list; builtin if unset
    pub stage1_packages: Option<PathBuf>,
    /// Release table override; builtin if unset
    pub releases: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `.env` in `base_dir` and the environment.
    pub fn load(base_dir: &Path) -> Self {
        // dotenvy never overrides variables that are already set
        dotenvy::from_path(base_dir.join(".env")).ok();
        Self::from_lookup(base_dir, |key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(base_dir: &Path, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key: &str| {
            lookup(key).filter(|v| !v.is_empty()).map(|s| {
                let path = PathBuf::from(s);
                if path.is_absolute() {
                    path
                } else {
                    base_dir.join(path)
                }
            })
        };

        Self {
            work_dir: path("TARBALL_WORK_DIR").unwrap_or_else(|| base_dir.join("work")),
            output_dir: path("TARBALL_OUTPUT_DIR").unwrap_or_else(|| base_dir.join("output")),
            patches_dir: path("TARBALL_PATCHES_DIR").unwrap_or_else(|| base_dir.join("patches")),
            post_install_dir: path("TARBALL_POST_INSTALL_DIR"),
            repo_template: path("TARBALL_REPO_TEMPLATE"),
            stage1_packages: path("TARBALL_STAGE1_PACKAGES"),
            releases: path("TARBALL_RELEASES"),
        }
    }

    /// Repository template text, from `TARBALL_REPO_TEMPLATE` or builtin.
    pub fn repo_template_text(&self) -> Result<String> {
        read_or(self.repo_template.as_deref(), DEFAULT_REPO_TEMPLATE)
    }

    /// Stage 1 package list, from `TARBALL_STAGE1_PACKAGES` or builtin.
    pub fn stage1_packages(&self) -> Result<Vec<String>> {
        parse_package_list(&read_or(self.stage1_packages.as_deref(), DEFAULT_STAGE1_PACKAGES)?)
    }

    pub fn release_table(&self) -> Result<ReleaseTable> {
        ReleaseTable::load(self.releases.as_deref())
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        fn show(path: &Option<PathBuf>) -> String {
            path.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(builtin)".to_string())
        }

        println!("Configuration:");
        println!("  TARBALL_WORK_DIR: {}", self.work_dir.display());
        println!("  TARBALL_OUTPUT_DIR: {}", self.output_dir.display());
        println!("  TARBALL_PATCHES_DIR: {}", self.patches_dir.display());
        println!(
            "  TARBALL_POST_INSTALL_DIR: {}",
            self.post_install_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".to_string())
        );
        println!("  TARBALL_REPO_TEMPLATE: {}", show(&self.repo_template));
        println!("  TARBALL_STAGE1_PACKAGES: {}", show(&self.stage1_packages));
        println!("  TARBALL_RELEASES: {}", show(&self.releases));
    }
}

fn read_or(path: Option<&Path>, builtin: &str) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path).map_err(|e| Error::io_at(path, e)),
        None => Ok(builtin.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_relative_to_base_dir() {
        let config = Config::from_lookup(Path::new("/srv/tc"), |_| None);
        assert_eq!(config.work_dir, PathBuf::from("/srv/tc/work"));
        assert_eq!(config.output_dir, PathBuf::from("/srv/tc/output"));
        assert_eq!(config.patches_dir, PathBuf::from("/srv/tc/patches"));
        assert!(config.repo_template.is_none());
        assert!(config.post_install_dir.is_none());
    }

    #[test]
    fn test_overrides_resolve_relative_and_absolute() {
        let vars: HashMap<&str, &str> = [
            ("TARBALL_WORK_DIR", "/scratch/work"),
            ("TARBALL_PATCHES_DIR", "my-patches"),
            ("TARBALL_REPO_TEMPLATE", ""),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(Path::new("/srv/tc"), |k| {
            vars.get(k).map(|v| v.to_string())
        });
        assert_eq!(config.work_dir, PathBuf::from("/scratch/work"));
        assert_eq!(config.patches_dir, PathBuf::from("/srv/tc/my-patches"));
        // empty values count as unset
        assert!(config.repo_template.is_none());
    }

    #[test]
    fn test_override_files_are_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pkgs.txt"), "bash # shell\nwget\n").unwrap();
        let config = Config::from_lookup(dir.path(), |k| {
            (k == "TARBALL_STAGE1_PACKAGES").then(|| "pkgs.txt".to_string())
        });
        assert_eq!(config.stage1_packages().unwrap(), vec!["bash", "wget"]);
        assert!(config.repo_template_text().unwrap().contains("[osg-release-build]"));
        assert!(config.release_table().unwrap().get("3.6").is_ok());
    }

    #[test]
    fn test_missing_override_file_is_error() {
        let config = Config::from_lookup(Path::new("/nonexistent"), |k| {
            (k == "TARBALL_REPO_TEMPLATE").then(|| "repo.in".to_string())
        });
        assert!(matches!(config.repo_template_text(), Err(Error::IoAt { .. })));
    }

    #[test]
    #[serial_test::serial]
    fn test_load_reads_dotenv_without_overriding_env() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "TARBALL_OUTPUT_DIR=from-dotenv\nTARBALL_RELEASES=releases.json\n",
        )
        .unwrap();
        std::env::set_var("TARBALL_RELEASES", "/etc/tc/releases.json");

        let config = Config::load(dir.path());
        std::env::remove_var("TARBALL_OUTPUT_DIR");
        std::env::remove_var("TARBALL_RELEASES");

        assert_eq!(config.output_dir, dir.path().join("from-dotenv"));
        assert_eq!(config.releases, Some(PathBuf::from("/etc/tc/releases.json")));
    }

    #[test]
    fn test_builtin_data_present() {
        assert!(DEFAULT_REPO_TEMPLATE.contains("{distro_version}"));
        assert!(DEFAULT_STAGE1_PACKAGES.contains("bash"));
    }
}
