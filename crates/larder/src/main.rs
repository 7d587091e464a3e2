//! Larder command-line interface

use anyhow::Context;
use clap::{Parser, Subcommand};
use larder::{Bundle, Manifest, DEFAULT_GROUP};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "larder")]
#[command(about = "Resolve, build and lock package bundles", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a Larder.toml in a directory
    Init {
        /// Project directory
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Install the bundle and write Larder.lock
    Install {
        /// Groups to install (repeatable)
        #[arg(short, long = "group", default_value = DEFAULT_GROUP)]
        groups: Vec<String>,

        /// Install exactly the versions in Larder.lock
        #[arg(long)]
        locked: bool,

        /// Project directory (searched upwards for Larder.toml)
        #[arg(short = 'C', long)]
        dir: Option<PathBuf>,

        /// Target platform instead of the running one
        #[arg(long)]
        platform: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { dir } => {
            let path = Manifest::write_template(&dir)
                .with_context(|| format!("Failed to initialize {}", dir.display()))?;
            println!("Created {}", path.display());
        }
        Commands::Install {
            groups,
            locked,
            dir,
            platform,
        } => {
            let mut bundle = Bundle::load(dir.as_deref())?;
            if let Some(platform) = platform {
                bundle = bundle.with_platform(platform);
            }

            let groups: Vec<&str> = groups.iter().map(String::as_str).collect();
            let lock = if locked {
                bundle.install_locked(&groups)?
            } else {
                bundle.install(&groups)?
            };
            println!(
                "Locked {} packages in {}",
                lock.packages().count(),
                bundle.lockfile_path().display()
            );
        }
    }

    Ok(())
}
