//! Telegram adapter (grammers).
//!
//! This crate implements the `tgrab-core` MediaProvider port over MTProto.

use std::{collections::HashMap, path::Path, time::Duration};

use async_trait::async_trait;
use grammers_client::{
    types::{Chat, Media, Message},
    Client, Config as ClientConfig, InitParams,
};
use grammers_mtsender::InvocationError;
use grammers_session::Session;
use tokio::{io::AsyncWriteExt, sync::Mutex};
use tracing::{debug, info};

use tgrab_core::{
    config::Config,
    domain::{ChatIdentifier, MediaGroupKey, MessageId},
    provider::{EntityRef, MediaProvider, MessageEnvelope, ProgressFn},
    Error, Result,
};

mod auth;
mod media;

pub use auth::AuthPrompt;

/// Wait applied when a flood signal arrives without a second count.
const DEFAULT_FLOOD_WAIT_SECS: u32 = 60;

/// MTProto-backed provider.
///
/// Flood sleeping inside the SDK is disabled so rate-limit signals reach the
/// caller's retry loop instead of being served invisibly.
pub struct TelegramProvider {
    client: Client,
    /// Resolved chats by entity token, so later calls can address them.
    chats: Mutex<HashMap<String, Chat>>,
    /// Media handles per (entity token, message id); `stream_media` reads
    /// from here instead of refetching the message.
    media: Mutex<HashMap<(String, i32), Media>>,
}

impl TelegramProvider {
    /// Connect, creating the session file when absent.
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let session = Session::load_file_or_create(&cfg.session_file)?;
        let client = Client::connect(ClientConfig {
            session,
            api_id: cfg.api_id,
            api_hash: cfg.api_hash.clone(),
            params: InitParams {
                // Surface FLOOD_WAIT instead of sleeping inside the library.
                flood_sleep_threshold: 0,
                ..Default::default()
            },
        })
        .await
        .map_err(|e| Error::Transport(format!("connect failed: {e}")))?;

        info!(session = %cfg.session_file.display(), "connected");
        Ok(Self {
            client,
            chats: Mutex::new(HashMap::new()),
            media: Mutex::new(HashMap::new()),
        })
    }

    /// Interactive first-run authorization; a no-op when the session file is
    /// already valid. Saves the session afterwards so the next run skips it.
    pub async fn ensure_authorized(&self, cfg: &Config, prompt: &dyn AuthPrompt) -> Result<()> {
        if self.client.is_authorized().await.map_err(map_invocation)? {
            return Ok(());
        }

        let Some(phone) = &cfg.phone else {
            return Err(Error::Config(
                "session is not authorized and TG_PHONE is not set".to_string(),
            ));
        };

        auth::sign_in(&self.client, phone, prompt).await?;
        self.client
            .session()
            .save_to_file(&cfg.session_file)
            .map_err(Error::Io)?;
        info!(session = %cfg.session_file.display(), "session saved");
        Ok(())
    }

    /// `t.me/c/...` links carry no access hash, so the chat must come from
    /// the account's own dialog list.
    async fn find_dialog(&self, id: i64) -> Result<Chat> {
        let mut dialogs = self.client.iter_dialogs();
        while let Some(dialog) = dialogs.next().await.map_err(map_invocation)? {
            let chat = dialog.chat();
            if chat.id() == id {
                return Ok(chat.clone());
            }
        }
        Err(Error::Resolution(format!(
            "chat {id} is not in this account's dialogs"
        )))
    }

    async fn chat_for(&self, entity: &EntityRef) -> Result<Chat> {
        self.chats
            .lock()
            .await
            .get(&entity.0)
            .cloned()
            .ok_or_else(|| Error::Resolution(format!("unknown entity token `{}`", entity.0)))
    }

    async fn envelope(&self, entity: &EntityRef, message: &Message) -> MessageEnvelope {
        let classified = message
            .media()
            .and_then(|m| media::classify(message.id(), &m).map(|d| (m, d)));

        let media_descriptor = match classified {
            Some((handle, descriptor)) => {
                self.media
                    .lock()
                    .await
                    .insert((entity.0.clone(), message.id()), handle);
                Some(descriptor)
            }
            None => None,
        };

        MessageEnvelope {
            id: MessageId(message.id()),
            group: message.grouped_id().map(MediaGroupKey),
            media: media_descriptor,
        }
    }

    /// The handle cached at fetch time, or a refetch when it is gone (for
    /// instance after the message was deleted mid-run).
    async fn media_for(&self, entity: &EntityRef, id: MessageId) -> Result<Media> {
        let key = (entity.0.clone(), id.0);
        if let Some(media) = self.media.lock().await.get(&key) {
            return Ok(media.clone());
        }

        if self.fetch_message(entity, id).await?.is_none() {
            return Err(Error::Resolution(format!(
                "message {id} disappeared before download"
            )));
        }
        self.media
            .lock()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::Resolution(format!("message {id} has no downloadable media")))
    }
}

#[async_trait]
impl MediaProvider for TelegramProvider {
    async fn resolve_entity(&self, chat: &ChatIdentifier) -> Result<EntityRef> {
        let found = match chat {
            ChatIdentifier::Username(name) => self
                .client
                .resolve_username(name)
                .await
                .map_err(map_invocation)?
                .ok_or_else(|| Error::Resolution(format!("no chat with username `{name}`")))?,
            ChatIdentifier::Internal(id) => self.find_dialog(*id).await?,
        };

        debug!(chat = %chat, id = found.id(), "entity resolved");
        let token = found.id().to_string();
        self.chats.lock().await.insert(token.clone(), found);
        Ok(EntityRef(token))
    }

    async fn fetch_message(
        &self,
        entity: &EntityRef,
        id: MessageId,
    ) -> Result<Option<MessageEnvelope>> {
        let chat = self.chat_for(entity).await?;
        let mut messages = self
            .client
            .get_messages_by_id(chat.pack(), &[id.0])
            .await
            .map_err(map_invocation)?;

        let Some(Some(message)) = messages.pop() else {
            return Ok(None);
        };
        Ok(Some(self.envelope(entity, &message).await))
    }

    async fn fetch_window(
        &self,
        entity: &EntityRef,
        min_id: MessageId,
        max_id: MessageId,
    ) -> Result<Vec<MessageEnvelope>> {
        let chat = self.chat_for(entity).await?;
        let span = max_id.0.saturating_sub(min_id.0).saturating_add(1).max(1) as usize;

        // History iteration walks newest to oldest; start just above the
        // window ceiling and stop once ids drop below the floor.
        let mut iter = self
            .client
            .iter_messages(chat.pack())
            .offset_id(max_id.0.saturating_add(1))
            .limit(span);

        let mut envelopes = Vec::new();
        while let Some(message) = iter.next().await.map_err(map_invocation)? {
            if message.id() < min_id.0 {
                break;
            }
            if message.id() > max_id.0 {
                continue;
            }
            envelopes.push(self.envelope(entity, &message).await);
        }
        Ok(envelopes)
    }

    async fn stream_media(
        &self,
        entity: &EntityRef,
        id: MessageId,
        dest: &Path,
        progress: ProgressFn,
    ) -> Result<u64> {
        let handle = self.media_for(entity, id).await?;
        let total = media::total_bytes(&handle);

        let mut file = tokio::fs::File::create(dest).await?;
        let mut download = self.client.iter_download(&handle);
        let mut written = 0u64;

        progress(0, total);
        while let Some(chunk) = download.next().await.map_err(map_invocation)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            progress(written, total);
        }
        file.flush().await?;

        debug!(message = id.0, bytes = written, "stream finished");
        Ok(written)
    }
}

/// Map SDK failures into the core taxonomy. Flood signals carry the seconds
/// the platform demands; everything else is transport-level.
fn map_invocation(err: InvocationError) -> Error {
    if let InvocationError::Rpc(rpc) = &err {
        if let Some(secs) = flood_wait_secs(&rpc.name, rpc.value) {
            return Error::RateLimited {
                wait: Duration::from_secs(secs),
            };
        }
    }
    Error::Transport(err.to_string())
}

/// `FLOOD_WAIT` and `FLOOD_PREMIUM_WAIT` both demand a pause; the numeric
/// suffix arrives separately as `value`.
fn flood_wait_secs(name: &str, value: Option<u32>) -> Option<u64> {
    if !name.starts_with("FLOOD") {
        return None;
    }
    Some(u64::from(value.unwrap_or(DEFAULT_FLOOD_WAIT_SECS)))
}
