use std::fmt;

/// Telegram message id (numeric, per-chat sequence).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i32);

/// Album key shared by every message of one media group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MediaGroupKey(pub i64);

/// Chat reference as written in a message link.
///
/// `t.me/c/<id>/<msg>` links carry the internal channel id; public links
/// carry a username that needs entity resolution first.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatIdentifier {
    Username(String),
    Internal(i64),
}

/// One parsed input link: chat + message, plus the raw line for reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageLink {
    pub chat: ChatIdentifier,
    pub message: MessageId,
    pub raw: String,
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MediaGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Names the per-chat download folder.
impl fmt::Display for ChatIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatIdentifier::Username(name) => write!(f, "{name}"),
            ChatIdentifier::Internal(id) => write!(f, "{id}"),
        }
    }
}
