//! Host tool availability checks.

use crate::process;
use crate::target::{Dver, PackageManagerKind};

use super::types::CheckResult;

/// Tools every build shells out to: (tool, package, purpose).
const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("rpm", "rpm", "Required to initialize and query package databases"),
    ("patch", "patch", "Required to apply patch sets"),
    ("tar", "tar", "Required to create tarballs"),
    ("cp", "coreutils", "Required to seed stage 2 from stage 1"),
    ("mount", "util-linux", "Required to mount /proc in the install root"),
    ("umount", "util-linux", "Required to unmount /proc from the install root"),
];

/// Check host tools are installed.
///
/// Package manager tools are only required for the platforms in `dvers`;
/// with no platforms given, a missing package manager is a warning.
pub fn check_host_tools(dvers: &[Dver]) -> Vec<CheckResult> {
    let mut results = Vec::new();

    for (tool, package, purpose) in REQUIRED_TOOLS {
        results.push(check_tool_exists(tool, package, purpose, true));
    }

    let mut kinds: Vec<PackageManagerKind> = Vec::new();
    let candidates: Vec<Dver> = if dvers.is_empty() {
        crate::target::VALID_DVERS.to_vec()
    } else {
        dvers.to_vec()
    };
    for dver in candidates {
        let kind = dver.caps().package_manager;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    let required = !dvers.is_empty();
    for kind in kinds {
        let program = kind.program();
        results.push(check_tool_exists(
            program,
            program,
            "Required to install packages into staging roots",
            required,
        ));
        let (download, _) = kind.download_command();
        if download != program {
            results.push(check_tool_exists(
                download,
                "yum-utils",
                "Required to download packages for force installs",
                required,
            ));
        }
    }

    results
}

/// Check if a tool exists in PATH.
fn check_tool_exists(tool: &str, package: &str, purpose: &str, required: bool) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, &path.display().to_string()),
        None => {
            let msg = format!("Not found. Install '{}' package. {}", package, purpose);
            if required {
                CheckResult::fail(tool, &msg)
            } else {
                CheckResult::warn(tool, &msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preflight::types::CheckStatus;

    #[test]
    fn test_el7_checks_yum_tools() {
        let names: Vec<String> = check_host_tools(&[Dver::El7])
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert!(names.contains(&"yum".to_string()));
        assert!(names.contains(&"yumdownloader".to_string()));
        assert!(!names.contains(&"dnf".to_string()));
    }

    #[test]
    fn test_no_dver_checks_both_managers() {
        let names: Vec<String> = check_host_tools(&[]).into_iter().map(|c| c.name).collect();
        assert!(names.contains(&"yum".to_string()));
        assert!(names.contains(&"dnf".to_string()));
        assert!(names.contains(&"tar".to_string()));
    }

    #[test]
    fn test_missing_tool_severity() {
        let tool = "definitely-not-a-real-tool-xyz";
        assert_eq!(
            check_tool_exists(tool, "x", "y", true).status,
            CheckStatus::Fail
        );
        assert_eq!(
            check_tool_exists(tool, "x", "y", false).status,
            CheckStatus::Warn
        );
    }
}
