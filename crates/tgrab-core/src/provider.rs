//! Provider port: everything the pipeline needs from the messaging platform.
//!
//! Telegram (grammers) is the production implementation; tests drive the
//! pipeline with scripted fakes.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;

use crate::{
    domain::{ChatIdentifier, MediaGroupKey, MessageId},
    Result,
};

/// Opaque, adapter-defined entity token.
///
/// Produced by `resolve_entity` and passed back verbatim on every later
/// call; the core never inspects it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityRef(pub String);

/// Media kinds eligible for download. Anything else never crosses the port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
}

/// One downloadable attachment.
#[derive(Clone, Debug)]
pub struct MediaDescriptor {
    pub kind: MediaKind,
    /// Original base filename; the final name prefixes it with a token.
    pub file_name: String,
    /// Total size in bytes when the provider knows it, for progress display.
    pub total_bytes: Option<u64>,
}

/// Provider view of one message: just enough for grouping and download.
#[derive(Clone, Debug)]
pub struct MessageEnvelope {
    pub id: MessageId,
    pub group: Option<MediaGroupKey>,
    pub media: Option<MediaDescriptor>,
}

/// Progress callback: (bytes so far, total bytes when known). Invoked once
/// per transferred chunk.
pub type ProgressFn = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// No-op progress observer.
pub fn progress_sink() -> ProgressFn {
    Arc::new(|_, _| {})
}

#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Resolve a chat identifier to an entity token the other calls accept.
    async fn resolve_entity(&self, chat: &ChatIdentifier) -> Result<EntityRef>;

    /// Fetch a single message. `None` when it does not exist (deleted or
    /// never posted); that is not an error at this layer.
    async fn fetch_message(
        &self,
        entity: &EntityRef,
        id: MessageId,
    ) -> Result<Option<MessageEnvelope>>;

    /// Fetch the messages with ids in `[min_id, max_id]`, both inclusive.
    /// Gaps are fine (missing ids are simply absent) and order is not
    /// guaranteed.
    async fn fetch_window(
        &self,
        entity: &EntityRef,
        min_id: MessageId,
        max_id: MessageId,
    ) -> Result<Vec<MessageEnvelope>>;

    /// Stream the message's media into `dest`, calling `progress` at each
    /// chunk boundary. Overwrites `dest` when it exists, so a retry always
    /// restarts from scratch. Returns the byte count written.
    async fn stream_media(
        &self,
        entity: &EntityRef,
        id: MessageId,
        dest: &Path,
        progress: ProgressFn,
    ) -> Result<u64>;
}
