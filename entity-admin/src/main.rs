use anyhow::Result;
use clap::Parser;

use entity_admin::Settings;
use entity_admin::cli::{Cli, run};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        settings.logging.level.as_filter()
    };
    // RUST_LOG, when set, wins over the configured level
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    run(cli, settings).await
}
