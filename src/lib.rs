//! tarball-client library exports.
//!
//! Builds relocatable, non-root tarball installs of RPM-packaged software in
//! two stages: a stage 1 root standing in for the target host, and a stage 2
//! root with the real install that gets patched, fixed up and archived.

pub mod common;
pub mod config;
pub mod envsetup;
pub mod error;
pub mod mount;
pub mod preflight;
pub mod process;
pub mod releases;
pub mod stage1;
pub mod stage2;
pub mod target;
pub mod verify;
pub mod yum;

pub use error::{Error, Result, VerifyError};
