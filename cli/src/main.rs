//! OpenSASE IPAM CLI
//!
//! Operator tool for the IPAM allocator and pool provisioner.
//!
//! # Usage
//!
//! ```bash
//! ipamctl next --supernet 10.0.0.0/16 --used 10.0.0.0/20 --prefix 20
//! ipamctl plan -f pools.toml --format json
//! ipamctl usage --total 65536 --free 8192
//! ipamctl simulate -f pools.toml --signal Create
//! ```

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod output;

#[derive(Parser)]
#[command(name = "ipamctl")]
#[command(author = "OpenSASE")]
#[command(version)]
#[command(about = "OpenSASE IPAM allocator and pool provisioner", long_about = None)]
struct Cli {
    /// Output format (defaults to the profile setting, then table)
    #[arg(long, global = true)]
    format: Option<output::OutputFormat>,

    /// Profile name from config file
    #[arg(long, short, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick the next free block
    Next {
        /// Supernet to carve (repeatable)
        #[arg(long = "supernet", required = true)]
        supernets: Vec<String>,
        /// Block already taken (repeatable)
        #[arg(long = "used")]
        used: Vec<String>,
        /// Prefix length of the requested block
        #[arg(long, env = "IPAM_POOL_PREFIX")]
        prefix: u8,
        /// Region label for utilization alerts
        #[arg(long, env = "IPAM_REGION", default_value = "unknown")]
        region: String,
        /// Environment label for utilization alerts
        #[arg(long, default_value = "default")]
        env: String,
        /// Alert threshold in percent
        #[arg(long)]
        threshold: Option<u8>,
    },
    /// Dry-run the region/environment hierarchy
    Plan {
        #[arg(short, long)]
        file: Option<String>,
        /// Extra top-level blocks to treat as taken (repeatable)
        #[arg(long = "used")]
        used: Vec<String>,
        /// Override region prefix length
        #[arg(long, env = "IPAM_POOL_PREFIX")]
        region_prefix: Option<u8>,
        /// Override environment prefix length
        #[arg(long, env = "IPAM_ENV_POOL_PREFIX")]
        env_prefix: Option<u8>,
        /// Override the region list (repeatable)
        #[arg(long = "region", value_delimiter = ',')]
        regions: Vec<String>,
    },
    /// Check utilization of a pool
    Usage {
        #[arg(long)]
        total: u64,
        #[arg(long)]
        free: u64,
        #[arg(long)]
        threshold: Option<u8>,
    },
    /// Run a lifecycle signal against an in-memory backend
    Simulate {
        #[arg(short, long)]
        file: Option<String>,
        /// Create, Delete, or anything else
        #[arg(long, default_value = "Create")]
        signal: String,
        /// Delay between readiness polls
        #[arg(long, default_value_t = 10)]
        poll_delay_ms: u64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let profile = match config::Profile::load(cli.profile.as_deref()) {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable profile");
            config::Profile::default()
        }
    };
    let format = cli.format.unwrap_or_else(|| profile.format());

    let result = match cli.command {
        Commands::Next {
            supernets,
            used,
            prefix,
            region,
            env,
            threshold,
        } => {
            let args = commands::next::NextArgs {
                supernets,
                used,
                prefix,
                region,
                environment: env,
                threshold: profile.threshold(threshold),
            };
            commands::next::handle(args, format).await
        }
        Commands::Plan {
            file,
            used,
            region_prefix,
            env_prefix,
            regions,
        } => {
            let overrides = commands::plan::PlanOverrides {
                used,
                region_prefix,
                env_prefix,
                regions,
            };
            profile
                .pools_file(file)
                .and_then(|path| commands::plan::handle(&path, overrides, format))
        }
        Commands::Usage {
            total,
            free,
            threshold,
        } => commands::usage::handle(total, free, profile.threshold(threshold), format).await,
        Commands::Simulate {
            file,
            signal,
            poll_delay_ms,
        } => match profile.pools_file(file) {
            Ok(path) => commands::simulate::handle(&path, &signal, poll_delay_ms, format).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
