use std::time::Duration;

/// Core error type for the download pipeline.
///
/// Adapter crates map their SDK errors into this type so the pipeline can
/// decide what a failure means (retry after a pause vs abandon the item)
/// without knowing the transport.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid link `{link}`: {reason}")]
    InvalidLink { link: String, reason: String },

    /// Flood control: the platform demands a pause of exactly `wait` before
    /// the request may be repeated. Never a terminal failure.
    #[error("rate limited, retry in {}s", .wait.as_secs())]
    RateLimited { wait: Duration },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("resolution error: {0}")]
    Resolution(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
