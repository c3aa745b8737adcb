//! Media classification for the photo/video eligibility rule.

use grammers_client::types::Media;

use tgrab_core::provider::{MediaDescriptor, MediaKind};

/// Classify a message's media. `None` for kinds the pipeline never touches
/// (stickers, polls, contacts, plain documents, ...).
pub(crate) fn classify(message_id: i32, media: &Media) -> Option<MediaDescriptor> {
    match media {
        Media::Photo(_) => Some(MediaDescriptor {
            kind: MediaKind::Photo,
            file_name: format!("photo_{message_id}.jpg"),
            total_bytes: total_bytes(media),
        }),
        Media::Document(doc) => {
            // Videos are documents carrying duration + resolution attributes.
            if doc.duration().is_none() || doc.resolution().is_none() {
                return None;
            }
            let name = doc.name();
            let file_name = if name.is_empty() {
                let ext = doc.mime_type().map(mime_to_ext).unwrap_or("mp4");
                format!("video_{message_id}.{ext}")
            } else {
                sanitize_file_name(name)
            };
            Some(MediaDescriptor {
                kind: MediaKind::Video,
                file_name,
                total_bytes: total_bytes(media),
            })
        }
        _ => None,
    }
}

/// Byte size when the platform reports one. Photos only expose it once the
/// transfer runs, so their meter falls back to bytes-only.
pub(crate) fn total_bytes(media: &Media) -> Option<u64> {
    match media {
        Media::Document(doc) => u64::try_from(doc.size()).ok(),
        _ => None,
    }
}

fn mime_to_ext(mime: &str) -> &'static str {
    match mime {
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "video/x-matroska" => "mkv",
        _ => "bin",
    }
}

/// Server-supplied names go straight into a path; keep them to a bare,
/// safe base name.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}
