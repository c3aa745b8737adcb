//! Per-item download with flood-wait retry.
//!
//! One item is one media attachment. It streams into a `.part` file in the
//! target folder and lands under its final name only on success, so a failed
//! attempt never leaves a half-written file under a final name.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    domain::{ChatIdentifier, MediaGroupKey},
    provider::{EntityRef, MediaProvider, MessageEnvelope, ProgressFn},
    Error,
};

/// Suspension point used by the retry loop. Injectable so tests observe
/// flood waits instead of serving them in real time.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Outcome of a single streaming attempt. The retry loop branches on this
/// instead of inspecting raw errors at every call site.
#[derive(Debug)]
enum Attempt {
    Success { bytes: u64 },
    RateLimited { wait: Duration },
    TransientFailure(Error),
    PermanentFailure(Error),
}

impl Attempt {
    fn classify(res: crate::Result<u64>) -> Self {
        match res {
            Ok(bytes) => Attempt::Success { bytes },
            Err(Error::RateLimited { wait }) => Attempt::RateLimited { wait },
            Err(e @ Error::Transport(_)) => Attempt::TransientFailure(e),
            Err(e) => Attempt::PermanentFailure(e),
        }
    }
}

/// Terminal state of one media item.
#[derive(Debug)]
pub enum ItemOutcome {
    /// File landed at `path`.
    Downloaded {
        path: PathBuf,
        bytes: u64,
        flood_waits: u32,
    },
    /// Non-retryable failure; partial data was cleaned up.
    Abandoned { error: Error },
    /// The run was cancelled while this item waited out a flood signal.
    Cancelled,
}

/// Downloads media items; owns the retry policy and final-name generation.
pub struct Downloader {
    provider: Arc<dyn MediaProvider>,
    sleeper: Arc<dyn Sleeper>,
}

impl Downloader {
    pub fn new(provider: Arc<dyn MediaProvider>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { provider, sleeper }
    }

    /// Download one envelope's media into `folder` (created if absent).
    ///
    /// Flood-wait signals pause for exactly the demanded duration and retry
    /// from scratch, indefinitely. Any other failure abandons the item: the
    /// provisional file is deleted best-effort and siblings are unaffected.
    pub async fn download_item(
        &self,
        entity: &EntityRef,
        item: &MessageEnvelope,
        folder: &Path,
        progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> ItemOutcome {
        let Some(media) = &item.media else {
            return ItemOutcome::Abandoned {
                error: Error::Resolution(format!("message {} has no media", item.id)),
            };
        };

        if let Err(e) = tokio::fs::create_dir_all(folder).await {
            return ItemOutcome::Abandoned { error: Error::Io(e) };
        }

        let token = file_token();
        let final_path = folder.join(format!("{token}{}", media.file_name));
        let part_path = folder.join(format!("{token}{}.part", media.file_name));

        debug!(message = item.id.0, file = media.file_name.as_str(), "downloading");

        let mut flood_waits = 0u32;
        loop {
            let attempt = Attempt::classify(
                self.provider
                    .stream_media(entity, item.id, &part_path, progress.clone())
                    .await,
            );

            match attempt {
                Attempt::Success { bytes } => {
                    if let Err(e) = tokio::fs::rename(&part_path, &final_path).await {
                        remove_part(&part_path).await;
                        return ItemOutcome::Abandoned { error: Error::Io(e) };
                    }
                    info!(
                        message = item.id.0,
                        path = %final_path.display(),
                        bytes,
                        "downloaded"
                    );
                    return ItemOutcome::Downloaded {
                        path: final_path,
                        bytes,
                        flood_waits,
                    };
                }
                Attempt::RateLimited { wait } => {
                    flood_waits += 1;
                    warn!(
                        message = item.id.0,
                        wait_secs = wait.as_secs(),
                        "flood wait, retrying after pause"
                    );
                    tokio::select! {
                        _ = self.sleeper.sleep(wait) => {}
                        _ = cancel.cancelled() => {
                            remove_part(&part_path).await;
                            return ItemOutcome::Cancelled;
                        }
                    }
                }
                Attempt::TransientFailure(error) => {
                    remove_part(&part_path).await;
                    warn!(message = item.id.0, error = %error, "transient failure, abandoning item");
                    return ItemOutcome::Abandoned { error };
                }
                Attempt::PermanentFailure(error) => {
                    remove_part(&part_path).await;
                    error!(message = item.id.0, error = %error, "abandoning item");
                    return ItemOutcome::Abandoned { error };
                }
            }
        }
    }
}

/// Target folder for a chat, with an album subfolder when grouped.
pub fn target_folder(
    root: &Path,
    chat: &ChatIdentifier,
    group: Option<MediaGroupKey>,
) -> PathBuf {
    let mut dir = root.join(chat.to_string());
    if let Some(group) = group {
        dir.push(group.to_string());
    }
    dir
}

/// Short random prefix keeping concurrent downloads of equally-named files
/// from colliding.
fn file_token() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..5].to_string()
}

async fn remove_part(path: &Path) {
    // Best-effort; a leftover .part is not worth a second failure.
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "could not remove partial file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;
    use crate::provider::{MediaDescriptor, MediaKind};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    enum Script {
        Deliver(&'static [u8]),
        Flood(u64),
        Refuse,
    }

    /// Plays back a fixed sequence of attempt outcomes. Flood and refusal
    /// steps leave partial bytes behind, like an interrupted stream would.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Script>>,
    }

    impl ScriptedProvider {
        fn new(steps: Vec<Script>) -> Self {
            Self {
                script: Mutex::new(steps.into()),
            }
        }
    }

    #[async_trait]
    impl MediaProvider for ScriptedProvider {
        async fn resolve_entity(
            &self,
            _chat: &ChatIdentifier,
        ) -> crate::Result<EntityRef> {
            Ok(EntityRef("scripted".into()))
        }

        async fn fetch_message(
            &self,
            _entity: &EntityRef,
            _id: MessageId,
        ) -> crate::Result<Option<MessageEnvelope>> {
            Ok(None)
        }

        async fn fetch_window(
            &self,
            _entity: &EntityRef,
            _min_id: MessageId,
            _max_id: MessageId,
        ) -> crate::Result<Vec<MessageEnvelope>> {
            Ok(Vec::new())
        }

        async fn stream_media(
            &self,
            _entity: &EntityRef,
            _id: MessageId,
            dest: &Path,
            progress: ProgressFn,
        ) -> crate::Result<u64> {
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted");
            match step {
                Script::Deliver(bytes) => {
                    std::fs::write(dest, bytes).unwrap();
                    let total = Some(bytes.len() as u64);
                    progress(bytes.len() as u64 / 2, total);
                    progress(bytes.len() as u64, total);
                    Ok(bytes.len() as u64)
                }
                Script::Flood(secs) => {
                    std::fs::write(dest, b"part").unwrap();
                    Err(Error::RateLimited {
                        wait: Duration::from_secs(secs),
                    })
                }
                Script::Refuse => {
                    std::fs::write(dest, b"part").unwrap();
                    Err(Error::Transport("connection reset".into()))
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    /// Never wakes up; for cancellation tests.
    struct HangingSleeper;

    #[async_trait]
    impl Sleeper for HangingSleeper {
        async fn sleep(&self, _duration: Duration) {
            std::future::pending::<()>().await;
        }
    }

    fn tmp_dir(prefix: &str) -> PathBuf {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("{prefix}-{}-{ts}", std::process::id()))
    }

    fn video_item(id: i32, file_name: &str) -> MessageEnvelope {
        MessageEnvelope {
            id: MessageId(id),
            group: None,
            media: Some(MediaDescriptor {
                kind: MediaKind::Video,
                file_name: file_name.to_string(),
                total_bytes: Some(4),
            }),
        }
    }

    fn downloader(provider: ScriptedProvider, sleeper: Arc<dyn Sleeper>) -> Downloader {
        Downloader::new(Arc::new(provider), sleeper)
    }

    fn dir_entries(folder: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(folder)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn downloads_into_token_prefixed_final_name() {
        let folder = tmp_dir("tgrab-dl-ok");
        let dl = downloader(
            ScriptedProvider::new(vec![Script::Deliver(b"hello")]),
            Arc::new(RecordingSleeper::default()),
        );
        let seen: Arc<Mutex<Vec<(u64, Option<u64>)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink: ProgressFn = {
            let seen = seen.clone();
            Arc::new(move |n, total| seen.lock().unwrap().push((n, total)))
        };

        let outcome = dl
            .download_item(
                &EntityRef("scripted".into()),
                &video_item(1, "clip.mp4"),
                &folder,
                sink,
                &CancellationToken::new(),
            )
            .await;

        let ItemOutcome::Downloaded { path, bytes, flood_waits } = outcome else {
            panic!("expected success");
        };
        assert_eq!(bytes, 5);
        assert_eq!(flood_waits, 0);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("clip.mp4"));
        assert_eq!(name.len(), "clip.mp4".len() + 5);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert_eq!(dir_entries(&folder).len(), 1); // no .part left behind
        assert_eq!(*seen.lock().unwrap(), vec![(2, Some(5)), (5, Some(5))]);

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[tokio::test]
    async fn flood_waits_sleep_the_exact_duration_and_retry() {
        let folder = tmp_dir("tgrab-dl-flood");
        let sleeper = Arc::new(RecordingSleeper::default());
        let dl = downloader(
            ScriptedProvider::new(vec![
                Script::Flood(3),
                Script::Flood(1),
                Script::Deliver(b"data"),
            ]),
            sleeper.clone(),
        );

        let outcome = dl
            .download_item(
                &EntityRef("scripted".into()),
                &video_item(2, "clip.mp4"),
                &folder,
                crate::provider::progress_sink(),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(
            outcome,
            ItemOutcome::Downloaded { flood_waits: 2, .. }
        ));
        assert_eq!(
            *sleeper.slept.lock().unwrap(),
            vec![Duration::from_secs(3), Duration::from_secs(1)]
        );
        assert_eq!(dir_entries(&folder).len(), 1);

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[tokio::test]
    async fn transport_error_abandons_and_removes_partial_file() {
        let folder = tmp_dir("tgrab-dl-fail");
        let dl = downloader(
            ScriptedProvider::new(vec![Script::Refuse]),
            Arc::new(RecordingSleeper::default()),
        );

        let outcome = dl
            .download_item(
                &EntityRef("scripted".into()),
                &video_item(3, "clip.mp4"),
                &folder,
                crate::provider::progress_sink(),
                &CancellationToken::new(),
            )
            .await;

        let ItemOutcome::Abandoned { error } = outcome else {
            panic!("expected abandonment");
        };
        assert!(matches!(error, Error::Transport(_)));
        assert!(dir_entries(&folder).is_empty());

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[tokio::test]
    async fn repeated_downloads_share_the_folder_without_name_collisions() {
        let folder = tmp_dir("tgrab-dl-twice");

        for _ in 0..2 {
            let dl = downloader(
                ScriptedProvider::new(vec![Script::Deliver(b"pic!")]),
                Arc::new(RecordingSleeper::default()),
            );
            let outcome = dl
                .download_item(
                    &EntityRef("scripted".into()),
                    &video_item(4, "photo_4.jpg"),
                    &folder,
                    crate::provider::progress_sink(),
                    &CancellationToken::new(),
                )
                .await;
            assert!(matches!(outcome, ItemOutcome::Downloaded { .. }));
        }

        let names = dir_entries(&folder);
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.ends_with("photo_4.jpg")));
        assert_ne!(names[0], names[1]);

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[tokio::test]
    async fn cancellation_during_flood_wait_cleans_up() {
        let folder = tmp_dir("tgrab-dl-cancel");
        let dl = downloader(
            ScriptedProvider::new(vec![Script::Flood(3600)]),
            Arc::new(HangingSleeper),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = dl
            .download_item(
                &EntityRef("scripted".into()),
                &video_item(5, "clip.mp4"),
                &folder,
                crate::provider::progress_sink(),
                &cancel,
            )
            .await;

        assert!(matches!(outcome, ItemOutcome::Cancelled));
        assert!(dir_entries(&folder).is_empty());

        let _ = std::fs::remove_dir_all(&folder);
    }

    #[test]
    fn target_folder_appends_group_subdir_only_when_grouped() {
        let root = Path::new("downloads");
        let chat = ChatIdentifier::Username("chan".into());

        assert_eq!(
            target_folder(root, &chat, None),
            Path::new("downloads/chan")
        );
        assert_eq!(
            target_folder(root, &chat, Some(MediaGroupKey(77))),
            Path::new("downloads/chan/77")
        );
        assert_eq!(
            target_folder(root, &ChatIdentifier::Internal(999), None),
            Path::new("downloads/999")
        );
    }

    #[test]
    fn file_tokens_are_short_hex_and_vary() {
        let tokens: Vec<String> = (0..20).map(|_| file_token()).collect();
        for t in &tokens {
            assert_eq!(t.len(), 5);
            assert!(t.chars().all(|c| c.is_ascii_hexdigit()));
        }
        assert!(tokens.iter().any(|t| t != &tokens[0]));
    }
}
