//! url-dl server binary: loads configuration, recovers unfinished tasks and
//! serves the REST API until SIGINT/SIGTERM.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use url_dl::{Config, Error, Result, UrlDownloader, logging, run_with_shutdown};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML configuration file (missing file means defaults)
    #[arg(long, short, value_name = "PATH", env = "URL_DL_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    logging::init_logging(&config.logging)?;

    tracing::info!(
        download_dir = %config.download.download_dir.display(),
        task_dir = %config.persistence.task_dir.display(),
        workers = config.download.max_concurrent_downloads,
        "starting url-dl"
    );

    let downloader = Arc::new(UrlDownloader::new(config).await?);
    let mut api = downloader.spawn_api_server();

    tokio::select! {
        result = run_with_shutdown(&downloader) => result?,
        joined = &mut api => {
            // The server stopped on its own (e.g. bind failure); wind down the workers too
            let served = joined.map_err(|e| Error::ApiServerError(e.to_string()))?;
            downloader.shutdown().await?;
            return served;
        }
    }

    match api.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "API server failed"),
        Err(e) => tracing::error!(error = %e, "API server task panicked"),
    }

    tracing::info!("url-dl stopped");
    Ok(())
}
