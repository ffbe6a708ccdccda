use botlog_client_core::app;
use botlog_client_core::cli::Cli;
use botlog_client_core::config::AppConfig;
use botlog_client_core::telemetry::logging;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    logging::init(&app::log_config(&cli, &config))?;
    app::run(cli, config).await?;
    Ok(())
}
