use anyhow::Result;
use clap::Parser;
use urtp_streamer::config::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = Cli::parse().into_config()?;
    log::info!(
        "streaming {:?} over {:?} until {}",
        config.coding,
        config.transport,
        if config.duration_ms > 0 {
            format!("{} ms elapse", config.duration_ms)
        } else {
            "Ctrl-C".to_string()
        }
    );

    urtp_streamer::run(config).await
}
