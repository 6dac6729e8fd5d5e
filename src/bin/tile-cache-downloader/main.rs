mod args;
mod validators;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use args::Args;
use tile_cache_downloader::Downloader;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse()?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:60.cyan/blue} {pos:>7}/{len:7} ETA: {eta} {msg}")
            .context("invalid progress bar template")?
            .progress_chars("##-"),
    );

    let bar = pb.clone();
    let downloader = Downloader::new(args.config)
        .context("failed creating downloader")?
        .on_progress(move |stats, _percent| {
            bar.set_length(stats.total_tiles as u64);
            bar.set_position(stats.finished() as u64);
            if stats.failed_tiles > 0 {
                bar.set_message(format!("{} failed", stats.failed_tiles));
            }
        });

    if args.dry_run {
        let tile_count = downloader
            .plan(&args.region, args.min_zoom, args.max_zoom)?
            .len();

        eprintln!(
            "would download {} tiles (approx {}, assuming 10 kb per tile)",
            tile_count,
            pretty_bytes::converter::convert((tile_count as f64) * 10_000f64)
        );

        return Ok(());
    }

    let token = downloader.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let mut stats = downloader
        .download_region(&args.tile_map, &args.region, args.min_zoom, args.max_zoom)
        .await
        .with_context(|| format!("failed downloading tile map {}", args.tile_map))?;

    for pass in 1..=args.retries {
        if stats.failed_tiles == 0 || downloader.cancellation_token().is_cancelled() {
            break;
        }

        pb.reset();
        pb.set_message("");
        info!(pass, failed = stats.failed_tiles, "retrying failed tiles");
        stats = downloader.retry_failed().await?;
    }

    pb.finish_and_clear();

    eprintln!(
        "{} downloaded, {} already cached, {} failed of {} tiles",
        stats.downloaded_tiles, stats.skipped_tiles, stats.failed_tiles, stats.total_tiles
    );

    if stats.failed_tiles > 0 {
        for task in downloader.failed_tasks() {
            warn!("tile {} of {} failed", task.tile, task.tile_map);
        }

        bail!("{} tiles could not be downloaded", stats.failed_tiles);
    }

    Ok(())
}
