//! Preflight command - runs preflight checks.

use anyhow::Result;

use tarball_client::config::Config;
use tarball_client::preflight;
use tarball_client::target::Dver;

/// Execute the preflight command.
pub fn cmd_preflight(config: &Config, dvers: &[Dver], strict: bool) -> Result<()> {
    if strict {
        preflight::run_preflight_or_fail(config, dvers)?;
    } else {
        let report = preflight::run_preflight(config, dvers);
        report.print();
        if !report.all_passed() {
            println!("Some checks failed. Use --strict to fail the build.");
        }
    }
    Ok(())
}
