use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use framelink::{
    AnyResult, Config, FrameStore, ServerListener,
    common::{
        banner::{BannerInfo, print_banner},
        logger,
    },
    transport,
};
use tracing::{error, info};

/// Serves preloaded video frames over TLS.
#[derive(Parser, Debug)]
#[command(name = "framelink-server", version)]
struct Args {
    /// Port to listen on.
    port: u16,

    /// Configuration file. Defaults to config.toml, then config.default.toml.
    #[arg(short, long, env = "FRAMELINK_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    logger::init(&config.logging);
    print_banner("server", &BannerInfo::default());

    let store = match FrameStore::load(&config.catalog) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("cannot start without media: {}", e);
            return Err(e.into());
        }
    };
    info!(
        "frame store ready: {} titles, {} MiB",
        store.titles().count(),
        store.total_bytes() / (1024 * 1024)
    );

    let acceptor = transport::build_acceptor(&config.tls)?;
    let listener = ServerListener::bind((config.server.host.as_str(), args.port), acceptor, store)
        .await?
        .with_stats_interval(Duration::from_secs(config.server.stats_interval_secs));

    let shutdown = listener.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down");
            shutdown.cancel();
        }
    });

    listener.run().await;
    Ok(())
}
