use clap::Parser;
use ffs::common::config::{apply_overrides, load_config, ConfigOverrides};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// Clap reads this struct and creates the CLI
#[derive(Parser)]
#[command(name = "ffs")]
#[command(version)]
#[command(about = "Share a file or folder on the local network and the internet")]
struct Cli {
    #[arg(help = "Files or folders to share; several are bundled into a zip archive")]
    files: Vec<PathBuf>,

    #[arg(short, long, help = "Port to listen on (default: any free port)")]
    port: Option<u16>,

    #[arg(short = 'u', long, help = "Let visitors upload a file")]
    allow_uploads: bool,

    #[arg(long, help = "Do not ask the router for a UPnP port mapping")]
    no_nat: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ffs=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        port: cli.port,
        allow_uploads: cli.allow_uploads,
        no_nat: cli.no_nat,
    };
    let config = apply_overrides(load_config()?, &overrides);

    ffs::server::run(config, cli.files).await
}
