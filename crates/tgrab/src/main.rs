use std::{path::Path, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tgrab_core::{
    config::Config,
    dispatcher::{Dispatcher, ItemReport, LinkOutcome, LinkReport},
    downloader::{Downloader, ItemOutcome, TokioSleeper},
    provider::MediaProvider,
};
use tgrab_telegram::TelegramProvider;

mod progress;
mod prompt;

#[tokio::main]
async fn main() -> Result<(), tgrab_core::Error> {
    tgrab_core::logging::init("tgrab")?;

    let cfg = Arc::new(Config::load()?);

    let links = read_links(&cfg.links_file).await?;
    if links.is_empty() {
        warn!(file = %cfg.links_file.display(), "links file is empty, nothing to do");
        return Ok(());
    }

    let provider = Arc::new(TelegramProvider::connect(&cfg).await?);
    provider.ensure_authorized(&cfg, &prompt::StdinPrompt).await?;
    let provider: Arc<dyn MediaProvider> = provider;

    let downloader = Arc::new(Downloader::new(provider.clone(), Arc::new(TokioSleeper)));
    let dispatcher = Dispatcher::new(
        cfg.clone(),
        provider,
        downloader,
        progress::console_progress(),
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight work (press again to abort)");
            interrupt.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            error!("second interrupt, aborting now");
            std::process::exit(130);
        }
    });

    info!(links = links.len(), dir = %cfg.download_dir.display(), "starting run");
    let reports = dispatcher.run(links, cancel).await;
    eprintln!(); // close a dangling progress-meter line
    print_summary(&reports);

    Ok(())
}

async fn read_links(path: &Path) -> Result<Vec<String>, tgrab_core::Error> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        tgrab_core::Error::Config(format!("cannot read links file {}: {e}", path.display()))
    })?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn print_summary(reports: &[LinkReport]) {
    let mut downloaded = 0usize;
    let mut failed = 0usize;

    println!("=== run summary ===");
    for report in reports {
        match &report.outcome {
            LinkOutcome::Completed { items } => {
                for item in items {
                    print_item(report, item, &mut downloaded, &mut failed);
                }
            }
            LinkOutcome::NothingToDownload => {
                println!("skip {}: no downloadable media", report.raw);
            }
            LinkOutcome::Invalid(e) | LinkOutcome::Failed(e) => {
                failed += 1;
                println!("fail {}: {e}", report.raw);
            }
            LinkOutcome::Cancelled => {
                println!("stop {}: cancelled", report.raw);
            }
        }
    }
    println!(
        "=== {downloaded} downloaded, {failed} failed, {} links ===",
        reports.len()
    );
}

fn print_item(report: &LinkReport, item: &ItemReport, downloaded: &mut usize, failed: &mut usize) {
    match &item.outcome {
        ItemOutcome::Downloaded {
            path,
            bytes,
            flood_waits,
        } => {
            *downloaded += 1;
            let note = if *flood_waits > 0 {
                format!(" (flood waits: {flood_waits})")
            } else {
                String::new()
            };
            println!(
                "ok   {} -> {} ({bytes} bytes){note}",
                report.raw,
                path.display()
            );
        }
        ItemOutcome::Abandoned { error } => {
            *failed += 1;
            println!("fail {} message {}: {error}", report.raw, item.message);
        }
        ItemOutcome::Cancelled => {
            println!("stop {} message {}: cancelled", report.raw, item.message);
        }
    }
}
