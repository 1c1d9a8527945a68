//! Command-line demo: download a URL with N segments.
//!
//! ```text
//! cargo run --example download -- <url> <dest> [segments]
//! ```
//!
//! Set `RUST_LOG=rangedl=debug` to see per-segment logging. Ctrl-C stops the
//! download and leaves the partial file in place.

use futures::StreamExt;
use rangedl::{DownloadEngine, DownloadOutcome, EngineConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rangedl=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(url), Some(dest)) = (args.next(), args.next()) else {
        eprintln!("usage: download <url> <dest> [segments]");
        std::process::exit(2);
    };
    let segments = match args.next() {
        Some(s) => s.parse()?,
        None => 4,
    };

    let engine = DownloadEngine::new(EngineConfig::default())?;
    let handle = engine.start(&url, &dest, segments).await?;

    let stopper = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nstopping...");
            stopper.stop().await;
        }
    });

    let mut progress = Box::pin(handle.subscribe());
    while let Some(snapshot) = progress.next().await {
        match snapshot.percentage() {
            Some(pct) => eprint!(
                "\r{:>6.2}%  {} bytes  {} KiB/s  {} workers   ",
                pct,
                snapshot.bytes_written,
                snapshot.throughput / 1024,
                snapshot.active_workers
            ),
            None => eprint!(
                "\r{} bytes  {} KiB/s   ",
                snapshot.bytes_written,
                snapshot.throughput / 1024
            ),
        }
    }
    eprintln!();

    match handle.wait().await {
        DownloadOutcome::Completed => {
            println!("saved {}", handle.job().dest_path.display());
            Ok(())
        }
        DownloadOutcome::Stopped => {
            println!("stopped; partial file left at {}", handle.job().dest_path.display());
            Ok(())
        }
        DownloadOutcome::Failed { reason } => Err(reason.into()),
    }
}
