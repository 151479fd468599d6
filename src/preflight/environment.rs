//! Build environment checks (privileges, directories, configuration).

use std::fs;
use std::path::Path;

use nix::unistd::Uid;

use crate::config::Config;
use crate::releases::ReleaseTable;
use crate::target::{TargetEnv, DEFAULT_BASEARCH};
use crate::yum::YumConfig;

use super::types::CheckResult;

/// Check build environment (privileges, directories, configuration files).
pub fn check_build_environment(config: &Config) -> Vec<CheckResult> {
    let mut results = Vec::new();

    // rpm --initdb, mknod and mount all need it
    if Uid::effective().is_root() {
        results.push(CheckResult::pass("running as root"));
    } else {
        results.push(CheckResult::fail(
            "running as root",
            "Staging roots need mount, mknod and rpm --root; run with sudo",
        ));
    }

    results.push(check_writable("work dir", &config.work_dir));
    results.push(check_writable("output dir", &config.output_dir));

    if config.patches_dir.is_dir() {
        results.push(CheckResult::pass_with(
            "patches dir",
            &config.patches_dir.display().to_string(),
        ));
    } else {
        results.push(CheckResult::warn(
            "patches dir",
            &format!("{} not found - bundles will be built unpatched", config.patches_dir.display()),
        ));
    }

    match &config.post_install_dir {
        Some(dir) if dir.is_dir() => {
            results.push(CheckResult::pass_with("post-install dir", &dir.display().to_string()))
        }
        Some(dir) => results.push(CheckResult::fail(
            "post-install dir",
            &format!("{} not found", dir.display()),
        )),
        None => results.push(CheckResult::skip("post-install dir", "TARBALL_POST_INSTALL_DIR not set")),
    }

    match config.stage1_packages() {
        Ok(packages) => results.push(CheckResult::pass_with(
            "stage 1 package list",
            &format!("{} packages", packages.len()),
        )),
        Err(e) => results.push(CheckResult::fail("stage 1 package list", &e.to_string())),
    }

    match config.release_table() {
        Ok(table) => {
            results.push(CheckResult::pass_with(
                "release table",
                &table.releases.keys().cloned().collect::<Vec<_>>().join(", "),
            ));
            results.push(check_repo_template(config, &table));
        }
        Err(e) => results.push(CheckResult::fail("release table", &e.to_string())),
    }

    results
}

fn check_writable(name: &str, dir: &Path) -> CheckResult {
    if let Err(e) = fs::create_dir_all(dir) {
        return CheckResult::fail(name, &format!("Cannot create {}: {}", dir.display(), e));
    }
    let test_file = dir.join(".preflight-test");
    match fs::write(&test_file, "test") {
        Ok(_) => {
            let _ = fs::remove_file(&test_file);
            CheckResult::pass_with(name, &dir.display().to_string())
        }
        Err(e) => CheckResult::fail(name, &format!("Cannot write to {}: {}", dir.display(), e)),
    }
}

/// Render the repository template for every supported release/dver pair.
fn check_repo_template(config: &Config, table: &ReleaseTable) -> CheckResult {
    let template = match config.repo_template_text() {
        Ok(template) => template,
        Err(e) => return CheckResult::fail("repo template", &e.to_string()),
    };
    let mut rendered = 0;
    for (series, release) in &table.releases {
        for dver in &release.dvers {
            let env = TargetEnv::new(*dver, DEFAULT_BASEARCH, series.clone());
            if let Err(e) = YumConfig::with_base(&template, &env, release, None) {
                return CheckResult::fail(
                    "repo template",
                    &format!("{} {}: {}", series, dver, e),
                );
            }
            rendered += 1;
        }
    }
    CheckResult::pass_with("repo template", &format!("renders for {} targets", rendered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preflight::types::CheckStatus;

    #[test]
    fn test_builtin_configuration_checks_pass() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_lookup(dir.path(), |_| None);
        let results = check_build_environment(&config);
        let status = |name: &str| {
            results
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.status)
                .unwrap()
        };
        assert_eq!(status("work dir"), CheckStatus::Pass);
        assert_eq!(status("repo template"), CheckStatus::Pass);
        assert_eq!(status("stage 1 package list"), CheckStatus::Pass);
        assert_eq!(status("patches dir"), CheckStatus::Warn);
        assert_eq!(status("post-install dir"), CheckStatus::Skip);
    }

    #[test]
    fn test_broken_template_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.repo.in"), "[broken]\nbaseurl={nope}\n").unwrap();
        let config = Config::from_lookup(dir.path(), |k| {
            (k == "TARBALL_REPO_TEMPLATE").then(|| "bad.repo.in".to_string())
        });
        let table = config.release_table().unwrap();
        assert_eq!(check_repo_template(&config, &table).status, CheckStatus::Fail);
    }
}
