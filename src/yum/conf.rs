//! Repository configuration for isolated package manager runs.
//!
//! A template of repository sections is rendered for one target
//! environment and merged into the host's `[main]` settings. The host's own
//! repositories never take part: every invocation passes `--disablerepo=*`
//! before enabling the rendered sections one by one, because the `enabled`
//! lines alone would let host-configured repositories leak into the build.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use ini::Ini;
use regex::Regex;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::releases::Release;
use crate::target::TargetEnv;

/// Host configuration the `[main]` section is derived from.
pub const HOST_YUM_CONF: &str = "/etc/yum.conf";

/// `[main]` keys that only make sense for the host's own root.
const HOST_ONLY_KEYS: &[&str] = &[
    "distroverpkg",
    "reposdir",
    "cachedir",
    "persistdir",
    "installroot",
    "logfile",
];

const PRERELEASE_SUFFIX: &str = "-prerelease";
const TESTING_SUFFIX: &str = "-testing-limited";
const MINEFIELD_SUFFIX: &str = "-minefield-limited";

/// Same truth table libdnf uses for boolean options.
fn is_true(value: &str) -> bool {
    matches!(value.trim(), "1" | "yes" | "true" | "on" | "True")
}

/// Rendered repository configuration.
#[derive(Debug)]
pub struct YumConfig {
    merged: Ini,
    enabled: Vec<String>,
}

impl YumConfig {
    /// Render `template` for `env`, using the host's yum.conf as base.
    pub fn new(template: &str, env: &TargetEnv, release: &Release) -> Result<Self> {
        let host = match fs::read_to_string(HOST_YUM_CONF) {
            Ok(text) => Some(text),
            Err(e) => {
                debug!("not using {}: {}", HOST_YUM_CONF, e);
                None
            }
        };
        Self::with_base(template, env, release, host.as_deref())
    }

    /// Render `template` for `env` on top of an explicit base configuration.
    pub fn with_base(
        template: &str,
        env: &TargetEnv,
        release: &Release,
        base: Option<&str>,
    ) -> Result<Self> {
        let sections = render_template(template, env)?;

        let mut merged = Ini::new();
        if let Some(base) = base {
            let host = Ini::load_from_str(base)?;
            // host repositories are dropped, but a template must not reuse their names
            for section in &sections {
                if host.section(Some(section.name.as_str())).is_some() {
                    return Err(Error::Config(format!(
                        "repository {:?} conflicts with a section of the base configuration",
                        section.name
                    )));
                }
            }
            if let Some(main) = host.section(Some("main")) {
                for (key, value) in main.iter() {
                    if !HOST_ONLY_KEYS.contains(&key) {
                        merged.set_to(Some("main"), key.to_string(), value.to_string());
                    }
                }
            }
        }
        for (key, value) in [("gpgcheck", "0"), ("plugins", "1"), ("keepcache", "0")] {
            merged.set_to(Some("main"), key.to_string(), value.to_string());
        }

        let mut enabled = Vec::new();
        for section in sections {
            let on = match section.name.as_str() {
                n if n.ends_with(PRERELEASE_SUFFIX) => env.prerelease,
                n if n.ends_with(TESTING_SUFFIX) => !release.testing_packages.is_empty(),
                n if n.ends_with(MINEFIELD_SUFFIX) => !release.minefield_packages.is_empty(),
                _ => section.get("enabled").map(is_true).unwrap_or(true),
            };

            let name = Some(section.name.as_str());
            for (key, value) in &section.props {
                if key != "enabled" {
                    merged.set_to(name, key.clone(), value.clone());
                }
            }
            merged.set_to(name, "gpgcheck".to_string(), "0".to_string());
            merged.set_to(name, "enabled".to_string(), if on { "1" } else { "0" }.to_string());
            if section.name.ends_with(TESTING_SUFFIX) && on {
                merged.set_to(name, "includepkgs".to_string(), release.testing_packages.join(" "));
            }
            if section.name.ends_with(MINEFIELD_SUFFIX) && on {
                merged.set_to(name, "includepkgs".to_string(), release.minefield_packages.join(" "));
            }

            if on {
                enabled.push(section.name);
            }
        }

        if enabled.is_empty() {
            return Err(Error::Config(
                "repository template does not enable any repository".to_string(),
            ));
        }

        Ok(Self { merged, enabled })
    }

    /// Sections that will be explicitly enabled.
    pub fn enabled_repos(&self) -> &[String] {
        &self.enabled
    }

    /// `--disablerepo=*` followed by one `--enablerepo` per enabled section.
    pub fn repo_args(&self) -> Vec<String> {
        std::iter::once("--disablerepo=*".to_string())
            .chain(self.enabled.iter().map(|r| format!("--enablerepo={}", r)))
            .collect()
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.merged.get_from(Some(section), key)
    }

    /// Serialized configuration file contents.
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.merged.write_to(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Write the configuration to a temporary file, run `f` with its path,
    /// and remove the file again whatever `f` returned.
    pub fn scoped<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Path) -> Result<T>,
    {
        let mut file = tempfile::Builder::new()
            .prefix("tarball-client-")
            .suffix(".conf")
            .tempfile()?;
        file.write_all(self.render()?.as_bytes())?;
        file.flush()?;
        debug!("wrote package manager config {}", file.path().display());

        let result = f(file.path());
        close_config(file);
        result
    }
}

fn close_config(file: NamedTempFile) {
    let path = file.path().to_path_buf();
    if let Err(e) = file.close() {
        warn!("unable to remove {}: {}", path.display(), e);
    }
}

/// One rendered repository section, in template order.
struct RepoSection {
    name: String,
    props: Vec<(String, String)>,
}

impl RepoSection {
    fn get(&self, key: &str) -> Option<&str> {
        self.props
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn render_template(template: &str, env: &TargetEnv) -> Result<Vec<RepoSection>> {
    let substitute = |s: &str| {
        s.replace("{distro_version}", env.dver.as_str())
            .replace("{arch}", env.basearch.as_str())
            .replace("{release_series}", &env.series)
    };
    // Whatever is still in braces after substitution is an unknown placeholder
    let leftover = Regex::new(r"\{[A-Za-z_]+\}").map_err(|e| Error::Config(e.to_string()))?;

    let parsed = Ini::load_from_str(template)?;
    let mut seen = BTreeSet::new();
    let mut sections = Vec::new();

    for (name, props) in parsed.iter() {
        let Some(name) = name else {
            if props.iter().next().is_some() {
                return Err(Error::Config(
                    "repository template has keys outside of any section".to_string(),
                ));
            }
            continue;
        };
        let name = substitute(name);
        if let Some(m) = leftover.find(&name) {
            return Err(Error::Config(format!(
                "unknown placeholder {} in section name [{}]",
                m.as_str(),
                name
            )));
        }
        if name == "main" {
            return Err(Error::Config(
                "repository template must not define [main]".to_string(),
            ));
        }
        if !seen.insert(name.clone()) {
            return Err(Error::Config(format!(
                "repository {:?} is defined more than once",
                name
            )));
        }

        let mut section = RepoSection {
            name,
            props: Vec::new(),
        };
        for (key, value) in props.iter() {
            let value = substitute(value);
            if let Some(m) = leftover.find(&value) {
                return Err(Error::Config(format!(
                    "unknown placeholder {} in [{}] {}",
                    m.as_str(),
                    section.name,
                    key
                )));
            }
            section.props.push((key.to_string(), value));
        }

        if section.get("name").is_none() {
            return Err(Error::Config(format!(
                "repository [{}] is missing 'name'",
                section.name
            )));
        }
        if ["baseurl", "mirrorlist", "metalink"]
            .iter()
            .all(|k| section.get(k).is_none())
        {
            return Err(Error::Config(format!(
                "repository [{}] needs one of baseurl, mirrorlist or metalink",
                section.name
            )));
        }
        sections.push(section);
    }

    if sections.is_empty() {
        return Err(Error::Config(
            "repository template does not define any repository".to_string(),
        ));
    }
    Ok(sections)
}
