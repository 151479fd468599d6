//! tarball-client - builds relocatable tarball installs.
//!
//! - Stage 1: a base root with the packages the target host already has
//! - Stage 2: the bundle installed on top, patched and fixed up
//! - Tarball: stage 2 minus everything stage 1 contributed

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info_span;

use tarball_client::common::ReusePolicy;
use tarball_client::config::Config;
use tarball_client::target::{Basearch, Dver, TargetEnv, DEFAULT_BASEARCH};

#[derive(Parser)]
#[command(name = "tarball-client")]
#[command(about = "Relocatable non-root tarball builder")]
#[command(
    after_help = "QUICK START:\n  tarball-client preflight                       Check host tools and configuration\n  tarball-client build --release 3.6 --dver el7  Build the worker node client tarball\n  tarball-client show releases                   List releases and bundles"
)]
struct Cli {
    /// Directory holding .env, work/, output/ and patches/ (default: current directory)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct TargetArgs {
    /// Release series, e.g. 3.6 or 23
    #[arg(long = "release")]
    series: String,

    /// Distribution version (el6, el7, el8, el9)
    #[arg(long)]
    dver: String,

    /// Base architecture
    #[arg(long, default_value_t = DEFAULT_BASEARCH.to_string())]
    basearch: String,

    /// Also enable the prerelease repositories
    #[arg(long)]
    prerelease: bool,
}

impl TargetArgs {
    fn parse_env(&self) -> Result<TargetEnv> {
        Ok(TargetEnv::parse(&self.dver, &self.basearch, &self.series)?.with_prerelease(self.prerelease))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build stage 1, stage 2 and the tarball for a bundle
    Build {
        #[command(flatten)]
        target: TargetArgs,

        /// Bundle name or metapackage
        #[arg(long, default_value = "wn-client")]
        bundle: String,

        /// Release number appended to the version stamp
        #[arg(long)]
        relnum: Option<u32>,

        /// Empty existing stage directories without asking
        #[arg(short, long)]
        yes: bool,

        /// Keep the stage directories after the tarball is written
        #[arg(long)]
        keep: bool,
    },

    /// Build only a stage 1 root
    Stage1 {
        /// Stage 1 directory
        dir: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Empty an existing directory without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Install a metapackage into a stage 2 root and archive it
    Stage2 {
        /// Stage 2 directory (a copy of a stage 1 root)
        dir: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Package the tarball is named after
        #[arg(long)]
        metapackage: String,

        /// Additional packages to install
        #[arg(long = "extra")]
        extra_packages: Vec<String>,

        /// Copy this stage 1 root into DIR first
        #[arg(long)]
        from_stage1: Option<PathBuf>,

        /// Tarball path (default: <output>/<metapackage>-<dver>-<basearch>-nonroot.tar.gz)
        #[arg(long)]
        tarball: Option<PathBuf>,

        /// Patch directory; may be repeated
        #[arg(long = "patch-dir")]
        patch_dirs: Vec<PathBuf>,

        /// Release number appended to the version stamp
        #[arg(long)]
        relnum: Option<u32>,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },

    /// Write setup.sh.in and setup.csh.in templates
    Envsetup {
        /// Destination directory
        dir: PathBuf,

        #[arg(long)]
        dver: String,

        #[arg(long, default_value_t = DEFAULT_BASEARCH.to_string())]
        basearch: String,
    },

    /// Run preflight checks (verify host tools and configuration before build)
    Preflight {
        /// Only require the package manager of these platforms; may be repeated
        #[arg(long)]
        dver: Vec<String>,

        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
    /// Show releases and their bundles
    Releases,
    /// Show the repository configuration rendered for a target
    Repos {
        #[command(flatten)]
        target: TargetArgs,
    },
}

fn reuse_policy(yes: bool) -> ReusePolicy {
    if yes {
        ReusePolicy::Always
    } else {
        ReusePolicy::Prompt
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let config = Config::load(&base_dir);

    match cli.command {
        Commands::Build {
            target,
            bundle,
            relnum,
            yes,
            keep,
        } => {
            let env = target.parse_env()?;
            let _span = info_span!("build", dver = %env.dver, basearch = %env.basearch).entered();
            let opts = commands::build::BuildOptions {
                bundle,
                relnum,
                reuse: reuse_policy(yes),
                keep_stage_dirs: keep,
            };
            commands::cmd_build(&config, &env, &opts)?;
        }

        Commands::Stage1 { dir, target, yes } => {
            let env = target.parse_env()?;
            let _span = info_span!("stage1", dver = %env.dver, basearch = %env.basearch).entered();
            commands::cmd_stage1(&config, &env, &dir, reuse_policy(yes))?;
        }

        Commands::Stage2 {
            dir,
            target,
            metapackage,
            extra_packages,
            from_stage1,
            tarball,
            patch_dirs,
            relnum,
        } => {
            let env = target.parse_env()?;
            let _span = info_span!("stage2", dver = %env.dver, basearch = %env.basearch).entered();
            let opts = commands::stage2::Stage2Options {
                dir,
                from_stage1,
                metapackage,
                extra_packages,
                tarball,
                patch_dirs,
                relnum,
            };
            commands::cmd_stage2(&config, &env, opts)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Releases => commands::show::ShowTarget::Releases,
                ShowTarget::Repos { target } => {
                    commands::show::ShowTarget::Repos(target.parse_env()?)
                }
            };
            commands::cmd_show(show_target, &config)?;
        }

        Commands::Envsetup { dir, dver, basearch } => {
            let dver: Dver = dver.parse()?;
            let basearch: Basearch = basearch.parse()?;
            commands::cmd_envsetup(&dir, dver, basearch)?;
        }

        Commands::Preflight { dver, strict } => {
            let dvers = dver
                .iter()
                .map(|d| d.parse::<Dver>())
                .collect::<Result<Vec<_>, _>>()?;
            commands::cmd_preflight(&config, &dvers, strict)?;
        }
    }

    Ok(())
}
