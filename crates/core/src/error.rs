use thiserror::Error;

/// Failure modes of the bounded fetch layer.
///
/// `TooLarge` and `TooSlow` fire mid-stream once the byte or wall-clock
/// budget is exhausted; transport-level problems collapse into `Network`
/// so callers classify reachability without depending on the HTTP client.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("blocked by robots.txt from crawling {0}")]
    RobotsBlocked(String),

    #[error("request to `{url}` exceeded {limit} bytes")]
    TooLarge { url: String, limit: usize },

    #[error("request to `{url}` exceeded {seconds}s")]
    TooSlow { url: String, seconds: f64 },

    #[error("no content body for {0}")]
    NoContent(String),

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("decode error for {url}: {message}")]
    Decode { url: String, message: String },

    #[error("network error: {0}")]
    Network(String),
}

impl FetchError {
    /// Transport-level failures, the ones that mean the host itself could
    /// not be spoken to rather than answering badly.
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::TooSlow { .. })
    }
}
