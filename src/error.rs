//! Error types for the tarball builder.
//!
//! Structural verification failures live in their own enum so callers can
//! tell an ordering/logic bug in the pipeline apart from a failing external
//! tool or a broken host environment.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid dver/basearch token, malformed repository template, bad release name
    #[error("Configuration error: {0}")]
    Config(String),

    /// Empty root or package list passed to the package manager
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Not enough rights to create device nodes or initialize an rpmdb
    #[error("Insufficient privileges: {0}")]
    Privilege(String),

    /// The operator declined to reuse an existing directory
    #[error("Aborted: {0}")]
    Aborted(String),

    #[error("Unable to install {} into {} (exit code {code})", .packages.join(" "), .root.display())]
    Install {
        packages: Vec<String>,
        root: PathBuf,
        code: i32,
    },

    #[error("Unable to download {} for {} (exit code {code})", .packages.join(" "), .root.display())]
    Download {
        packages: Vec<String>,
        root: PathBuf,
        code: i32,
    },

    /// A package is absent from the rpmdb after the install step
    #[error("{package} not installed in {} after package manager run", .root.display())]
    NotRegistered { package: String, root: PathBuf },

    #[error("Patch file {} failed to apply (exit code {code})", .patch.display())]
    Patch { patch: PathBuf, code: i32 },

    #[error("Unable to create tarball {} (exit code {code})", .tarball.display())]
    Archive { tarball: PathBuf, code: i32 },

    #[error("Verification failed: {0}")]
    Verify(#[from] VerifyError),

    /// Any other external command that exited non-zero
    #[error("'{program}' failed (exit code {code}){}", stderr_suffix(.stderr))]
    Command {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed to execute '{program}'. Is it installed?")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error at {}: {source}", .path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse repository template: {0}")]
    Ini(#[from] ini::ParseError),
}

/// Structural post-condition failures.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum VerifyError {
    #[error("staging root {} does not exist", .0.display())]
    MissingRoot(PathBuf),

    #[error("package database directory {} does not exist", .0.display())]
    MissingDatabase(PathBuf),

    #[error("no package database files found in {}", .0.display())]
    EmptyDatabase(PathBuf),

    #[error("{package} is not registered in the package database of {}", .root.display())]
    PackageMissing { package: String, root: PathBuf },

    #[error("unexpected top-level entry {} left in stage 1 root", .0.display())]
    UnexpectedEntry(PathBuf),

    #[error("stage 1 manifest {} not found", .0.display())]
    MissingManifest(PathBuf),
}

fn stderr_suffix(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(":\n{}", stderr)
    }
}

impl Error {
    /// Attach a path to an I/O error.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::IoAt {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;
