use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use ngof_sync::{NtfyNotifier, SyncConfig, SyncPipeline};
use ngof_web::StaticDashboard;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "ngof")]
#[command(about = "Scrape Romanian NGO funding calls, notify on new ones and rebuild the dashboard")]
struct Cli {
    /// Send a test notification and exit.
    #[arg(long)]
    test_notify: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SyncConfig::from_env();
    let outcome = if cli.test_notify {
        test_notify(&config).await
    } else {
        sync(config).await
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "ngof failed");
            ExitCode::FAILURE
        }
    }
}

async fn test_notify(config: &SyncConfig) -> Result<()> {
    info!(topic = %config.ntfy_url, "sending test notification");
    NtfyNotifier::new(config.ntfy_url.clone())?.send_test().await
}

async fn sync(config: SyncConfig) -> Result<()> {
    let dashboard = StaticDashboard::new(config.dashboard_path(), config.ntfy_url.clone());
    let pipeline = SyncPipeline::new(config)?.with_render_hook(Box::new(dashboard));
    let summary = pipeline.run_once().await?;
    info!(
        run_id = %summary.run_id,
        sources = summary.sources_run,
        scraped = summary.scraped,
        matching = summary.matching,
        new = summary.new_items,
        "done"
    );
    Ok(())
}
