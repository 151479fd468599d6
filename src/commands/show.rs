//! Show command - displays information.

use anyhow::Result;

use tarball_client::config::Config;
use tarball_client::target::TargetEnv;
use tarball_client::yum::YumConfig;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show the release table
    Releases,
    /// Show the repository configuration rendered for a target
    Repos(TargetEnv),
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Releases => {
            let table = config.release_table()?;
            for (series, release) in &table.releases {
                let dvers: Vec<&str> = release.dvers.iter().map(|d| d.as_str()).collect();
                println!("{} ({})", series, dvers.join(", "));
                if !release.testing_packages.is_empty() {
                    println!("  from testing: {}", release.testing_packages.join(" "));
                }
                if !release.minefield_packages.is_empty() {
                    println!("  from minefield: {}", release.minefield_packages.join(" "));
                }
                for bundle in &release.bundles {
                    println!("  {}: {}", bundle.name, bundle.packages().join(" "));
                }
            }
        }
        ShowTarget::Repos(env) => {
            let table = config.release_table()?;
            let release = table.get(&env.series)?;
            let yum_config = YumConfig::new(&config.repo_template_text()?, &env, release)?;
            print!("{}", yum_config.render()?);
            println!("\n# {}", yum_config.repo_args().join(" "));
        }
    }
    Ok(())
}
