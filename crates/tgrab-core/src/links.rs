//! Message-link parsing.
//!
//! The last path segment of a link is the message id and the segment before
//! it is the chat: numeric for `t.me/c/<id>/<msg>` private links, a username
//! for public `t.me/<name>/<msg>` links. Scheme and host are irrelevant, so
//! bare `<chat>/<id>` lines work too.

use crate::{
    domain::{ChatIdentifier, MessageId, MessageLink},
    errors::Error,
    Result,
};

pub fn parse_link(raw: &str) -> Result<MessageLink> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid(raw, "empty line"));
    }

    // Keep the path only; query strings and fragments carry no address.
    let path = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    let mut segments = path.rsplit('/').filter(|s| !s.is_empty());

    let id_part = segments
        .next()
        .ok_or_else(|| invalid(raw, "missing message id"))?;
    let chat_part = segments
        .next()
        .ok_or_else(|| invalid(raw, "missing chat identifier"))?;

    let id: i32 = id_part
        .parse()
        .map_err(|_| invalid(raw, "message id is not a number"))?;
    if id <= 0 {
        return Err(invalid(raw, "message id must be positive"));
    }

    let chat = if chat_part.chars().all(|c| c.is_ascii_digit()) {
        let Ok(n) = chat_part.parse::<i64>() else {
            return Err(invalid(raw, "channel id out of range"));
        };
        ChatIdentifier::Internal(n)
    } else {
        ChatIdentifier::Username(chat_part.trim_start_matches('@').to_string())
    };

    Ok(MessageLink {
        chat,
        message: MessageId(id),
        raw: trimmed.to_string(),
    })
}

fn invalid(link: &str, reason: &str) -> Error {
    Error::InvalidLink {
        link: link.trim().to_string(),
        reason: reason.to_string(),
    }
}
