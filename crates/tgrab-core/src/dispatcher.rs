//! Fixed-capacity worker pool over the link list.
//!
//! Exactly `workers` tasks pull from a shared queue, so the number of links
//! in flight can never exceed the configured concurrency. Every link ends in
//! a report; one bad link never sinks its siblings.

use std::{collections::VecDeque, sync::Arc};

use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    domain::MessageId,
    downloader::{self, Downloader, ItemOutcome},
    links,
    provider::{MediaProvider, ProgressFn},
    resolver, Error,
};

/// Terminal state of one input line.
#[derive(Debug)]
pub enum LinkOutcome {
    /// The line could not be parsed.
    Invalid(Error),
    /// Entity or message resolution failed; nothing was downloaded.
    Failed(Error),
    /// The message exists but carries nothing eligible.
    NothingToDownload,
    /// Per-item outcomes, ascending by message id.
    Completed { items: Vec<ItemReport> },
    /// The run was cancelled before this link started.
    Cancelled,
}

#[derive(Debug)]
pub struct ItemReport {
    pub message: MessageId,
    pub outcome: ItemOutcome,
}

#[derive(Debug)]
pub struct LinkReport {
    pub raw: String,
    pub outcome: LinkOutcome,
}

struct DispatcherInner {
    cfg: Arc<Config>,
    provider: Arc<dyn MediaProvider>,
    downloader: Arc<Downloader>,
    progress: ProgressFn,
}

/// Drives the whole run: link list in, ordered reports out.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

type JobQueue = Arc<Mutex<VecDeque<(usize, String)>>>;
type Reports = Arc<Mutex<Vec<(usize, LinkReport)>>>;

impl Dispatcher {
    pub fn new(
        cfg: Arc<Config>,
        provider: Arc<dyn MediaProvider>,
        downloader: Arc<Downloader>,
        progress: ProgressFn,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                cfg,
                provider,
                downloader,
                progress,
            }),
        }
    }

    /// Process every link and return one report per input line, in input
    /// order. Never fails: failures become reports.
    pub async fn run(&self, raw_links: Vec<String>, cancel: CancellationToken) -> Vec<LinkReport> {
        if raw_links.is_empty() {
            return Vec::new();
        }

        let total = raw_links.len();
        let capacity = self.inner.cfg.workers.max(1).min(total);
        info!(links = total, workers = capacity, "dispatching");

        let queue: JobQueue = Arc::new(Mutex::new(
            raw_links.into_iter().enumerate().collect(),
        ));
        let results: Reports = Arc::new(Mutex::new(Vec::with_capacity(total)));

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(capacity);
        for worker in 0..capacity {
            let this = self.clone();
            let queue = Arc::clone(&queue);
            let results = Arc::clone(&results);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                this.worker_loop(worker, queue, results, cancel).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task failed");
            }
        }

        let mut collected = std::mem::take(&mut *results.lock().await);
        collected.sort_by_key(|(idx, _)| *idx);
        collected.into_iter().map(|(_, report)| report).collect()
    }

    async fn worker_loop(&self, worker: usize, queue: JobQueue, results: Reports, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                // Everything still queued reports as cancelled.
                let drained: Vec<(usize, String)> =
                    { queue.lock().await.drain(..).collect() };
                if !drained.is_empty() {
                    let mut res = results.lock().await;
                    for (idx, raw) in drained {
                        res.push((
                            idx,
                            LinkReport {
                                raw,
                                outcome: LinkOutcome::Cancelled,
                            },
                        ));
                    }
                }
                break;
            }

            let Some((idx, raw)) = queue.lock().await.pop_front() else {
                break;
            };

            debug!(worker, link = raw.as_str(), "processing");
            let outcome = self.process_link(&raw, &cancel).await;
            results.lock().await.push((idx, LinkReport { raw, outcome }));
        }
    }

    async fn process_link(&self, raw: &str, cancel: &CancellationToken) -> LinkOutcome {
        let link = match links::parse_link(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(link = raw, error = %e, "invalid link");
                return LinkOutcome::Invalid(e);
            }
        };

        let entity = match self.inner.provider.resolve_entity(&link.chat).await {
            Ok(v) => v,
            Err(e) => {
                error!(link = raw, error = %e, "entity resolution failed");
                return LinkOutcome::Failed(e);
            }
        };

        let set = match resolver::resolve_media_set(
            self.inner.provider.as_ref(),
            &entity,
            link.message,
            self.inner.cfg.group_window,
        )
        .await
        {
            Ok(v) => v,
            Err(e) => {
                error!(link = raw, error = %e, "could not resolve media set");
                return LinkOutcome::Failed(e);
            }
        };

        if set.items.is_empty() {
            info!(link = raw, "nothing to download");
            return LinkOutcome::NothingToDownload;
        }

        let folder =
            downloader::target_folder(&self.inner.cfg.download_dir, &link.chat, set.group);

        let mut items = Vec::with_capacity(set.items.len());
        for item in &set.items {
            if cancel.is_cancelled() {
                items.push(ItemReport {
                    message: item.id,
                    outcome: ItemOutcome::Cancelled,
                });
                continue;
            }
            let outcome = self
                .inner
                .downloader
                .download_item(&entity, item, &folder, self.inner.progress.clone(), cancel)
                .await;
            items.push(ItemReport {
                message: item.id,
                outcome,
            });
        }

        LinkOutcome::Completed { items }
    }
}
