//! Album reconstruction.
//!
//! The platform has no "fetch all messages of group X" call; the substitute
//! is a proximity window around the anchor message, filtered on the shared
//! group key. Albums wider than the window are captured incompletely, which
//! is accepted.

use tracing::warn;

use crate::{
    domain::{MediaGroupKey, MessageId},
    provider::{EntityRef, MediaProvider, MessageEnvelope},
    Error, Result,
};

/// The downloadable set for one link.
#[derive(Clone, Debug)]
pub struct ResolvedSet {
    /// Group key when the anchor belongs to an album; names the subfolder.
    pub group: Option<MediaGroupKey>,
    /// Media-bearing envelopes, ascending by message id.
    pub items: Vec<MessageEnvelope>,
}

/// Resolve the full set of media items for the message at `id`.
///
/// A missing message is a `Resolution` error and the caller abandons the
/// whole link. An existing message without eligible media resolves to an
/// empty set, which is a no-op rather than an error.
pub async fn resolve_media_set(
    provider: &dyn MediaProvider,
    entity: &EntityRef,
    id: MessageId,
    window: u32,
) -> Result<ResolvedSet> {
    let Some(anchor) = provider.fetch_message(entity, id).await? else {
        return Err(Error::Resolution(format!("message {id} not found")));
    };

    let Some(group) = anchor.group else {
        let items = if anchor.media.is_some() {
            vec![anchor]
        } else {
            Vec::new()
        };
        return Ok(ResolvedSet { group: None, items });
    };

    let min_id = MessageId(id.0.saturating_sub(window as i32).max(1));
    let max_id = MessageId(id.0.saturating_add(window as i32));

    let mut items: Vec<MessageEnvelope> = match provider
        .fetch_window(entity, min_id, max_id)
        .await
    {
        Ok(neighbors) => neighbors
            .into_iter()
            .filter(|m| m.group == Some(group) && m.media.is_some())
            .collect(),
        Err(e) => {
            // Partial albums are acceptable; a failed window fetch must not
            // sink the anchor itself.
            warn!(message = id.0, error = %e, "window fetch failed, keeping anchor only");
            Vec::new()
        }
    };

    // The anchor belongs to its own album even when the window missed it.
    if anchor.media.is_some() && !items.iter().any(|m| m.id == anchor.id) {
        items.push(anchor);
    }

    items.sort_by_key(|m| m.id);

    Ok(ResolvedSet {
        group: Some(group),
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MediaDescriptor, MediaKind, ProgressFn};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    fn photo(id: i32, group: Option<i64>) -> MessageEnvelope {
        MessageEnvelope {
            id: MessageId(id),
            group: group.map(MediaGroupKey),
            media: Some(MediaDescriptor {
                kind: MediaKind::Photo,
                file_name: format!("photo_{id}.jpg"),
                total_bytes: None,
            }),
        }
    }

    fn text_only(id: i32, group: Option<i64>) -> MessageEnvelope {
        MessageEnvelope {
            id: MessageId(id),
            group: group.map(MediaGroupKey),
            media: None,
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        messages: HashMap<i32, MessageEnvelope>,
        fail_window: bool,
        window_calls: Mutex<Vec<(i32, i32)>>,
    }

    impl FakeProvider {
        fn with(messages: Vec<MessageEnvelope>) -> Self {
            Self {
                messages: messages.into_iter().map(|m| (m.id.0, m)).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl MediaProvider for FakeProvider {
        async fn resolve_entity(&self, _chat: &crate::domain::ChatIdentifier) -> Result<EntityRef> {
            Ok(EntityRef("fake".into()))
        }

        async fn fetch_message(
            &self,
            _entity: &EntityRef,
            id: MessageId,
        ) -> Result<Option<MessageEnvelope>> {
            Ok(self.messages.get(&id.0).cloned())
        }

        async fn fetch_window(
            &self,
            _entity: &EntityRef,
            min_id: MessageId,
            max_id: MessageId,
        ) -> Result<Vec<MessageEnvelope>> {
            self.window_calls.lock().unwrap().push((min_id.0, max_id.0));
            if self.fail_window {
                return Err(Error::Transport("window fetch refused".into()));
            }
            // Deliberately newest-first to prove the caller sorts.
            let mut hits: Vec<MessageEnvelope> = self
                .messages
                .values()
                .filter(|m| m.id.0 >= min_id.0 && m.id.0 <= max_id.0)
                .cloned()
                .collect();
            hits.sort_by_key(|m| std::cmp::Reverse(m.id));
            Ok(hits)
        }

        async fn stream_media(
            &self,
            _entity: &EntityRef,
            _id: MessageId,
            _dest: &Path,
            _progress: ProgressFn,
        ) -> Result<u64> {
            Err(Error::Transport("not scripted".into()))
        }
    }

    fn entity() -> EntityRef {
        EntityRef("fake".into())
    }

    #[tokio::test]
    async fn ungrouped_message_resolves_alone_without_window_fetch() {
        let fake = FakeProvider::with(vec![photo(100, None), photo(101, None)]);

        let set = resolve_media_set(&fake, &entity(), MessageId(100), 100)
            .await
            .unwrap();

        assert_eq!(set.group, None);
        assert_eq!(set.items.len(), 1);
        assert_eq!(set.items[0].id, MessageId(100));
        assert!(fake.window_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn message_without_media_resolves_empty() {
        let fake = FakeProvider::with(vec![text_only(42, None)]);

        let set = resolve_media_set(&fake, &entity(), MessageId(42), 100)
            .await
            .unwrap();

        assert!(set.items.is_empty());
        assert!(fake.window_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_message_is_a_resolution_error() {
        let fake = FakeProvider::with(vec![]);

        let err = resolve_media_set(&fake, &entity(), MessageId(7), 100)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Resolution(_)));
    }

    #[tokio::test]
    async fn grouped_message_collects_same_key_neighbors_sorted() {
        let fake = FakeProvider::with(vec![
            photo(99, Some(5)),     // other album
            photo(101, Some(7)),    // anchor
            photo(102, Some(7)),    // sibling
            text_only(103, Some(7)), // same album but nothing to download
            photo(104, None),       // ungrouped neighbor
            photo(105, Some(7)),    // sibling
        ]);

        let set = resolve_media_set(&fake, &entity(), MessageId(101), 100)
            .await
            .unwrap();

        assert_eq!(set.group, Some(MediaGroupKey(7)));
        let ids: Vec<i32> = set.items.iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![101, 102, 105]);
    }

    #[tokio::test]
    async fn window_bounds_span_the_anchor_and_clamp_at_one() {
        let fake = FakeProvider::with(vec![photo(101, Some(7))]);
        resolve_media_set(&fake, &entity(), MessageId(101), 100)
            .await
            .unwrap();
        assert_eq!(*fake.window_calls.lock().unwrap(), vec![(1, 201)]);

        let fake = FakeProvider::with(vec![photo(300, Some(7))]);
        resolve_media_set(&fake, &entity(), MessageId(300), 50)
            .await
            .unwrap();
        assert_eq!(*fake.window_calls.lock().unwrap(), vec![(250, 350)]);
    }

    #[tokio::test]
    async fn failed_window_fetch_degrades_to_anchor_only() {
        let mut fake = FakeProvider::with(vec![photo(101, Some(7)), photo(102, Some(7))]);
        fake.fail_window = true;

        let set = resolve_media_set(&fake, &entity(), MessageId(101), 100)
            .await
            .unwrap();

        assert_eq!(set.group, Some(MediaGroupKey(7)));
        assert_eq!(set.items.len(), 1);
        assert_eq!(set.items[0].id, MessageId(101));
    }

    #[tokio::test]
    async fn grouped_anchor_without_eligible_media_resolves_empty() {
        let fake = FakeProvider::with(vec![text_only(10, Some(3)), text_only(11, Some(3))]);

        let set = resolve_media_set(&fake, &entity(), MessageId(10), 100)
            .await
            .unwrap();

        assert_eq!(set.group, Some(MediaGroupKey(3)));
        assert!(set.items.is_empty());
    }
}
