use clap::Parser;
use log::error;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sebak-monitor")]
#[command(
    about = "Checks that SEBAK nodes agree on the latest block and keep advancing",
    long_about = None
)]
struct Cli {
    /// Path to the INI configuration file
    config: Option<PathBuf>,

    /// Run a single check cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Some(config_path) = cli.config else {
        eprintln!("Usage: sebak-monitor <config.ini> [--once]");
        std::process::exit(1);
    };

    if let Err(e) = sebak_monitor::run(&config_path, cli.once).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
