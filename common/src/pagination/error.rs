use reqwest::Url;
use thiserror::Error;

/// Reasons a listing is abandoned.
///
/// Reaching the end of a listing is not an error: the pager simply stops
/// producing URLs.
#[derive(Error, Debug)]
pub enum ListError {
    /// The server answered 410: the revision or continue token expired,
    /// usually because the listing was slower than the server's retention.
    #[error("page {page}: listing expired on the server (410 Gone) at {url}")]
    Gone {
        /// Page that failed.
        page: usize,
        /// URL of the failed request.
        url: Url,
    },

    /// The server answered with a status other than 200 or 410.
    #[error("page {page}: unexpected status {status} from {url}")]
    Status {
        /// Page that failed.
        page: usize,
        /// Status of the response.
        status: u16,
        /// URL of the failed request.
        url: Url,
    },

    /// The request did not produce a response.
    #[error("page {page}: request failed: {source}")]
    Transport {
        /// Page that failed.
        page: usize,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// A 200 response whose body is not valid JSON for the flavor.
    #[error("page {page}: response body of {len} bytes does not parse: {source}")]
    Malformed {
        /// Page that failed.
        page: usize,
        /// Length of the body.
        len: usize,
        /// Decoding error.
        #[source]
        source: serde_json::Error,
    },

    /// The next-link of a page cannot be turned into a URL.
    #[error("page {page}: invalid next link {link:?}: {source}")]
    InvalidNextLink {
        /// Page carrying the link.
        page: usize,
        /// Link as received.
        link: String,
        /// Parse error.
        #[source]
        source: url::ParseError,
    },

    /// The listing ran past its deadline.
    #[error("page {page}: listing deadline exceeded")]
    DeadlineExceeded {
        /// Page that was about to be, or being, fetched.
        page: usize,
    },
}

impl ListError {
    /// Page of the listing the error occurred on.
    pub fn page(&self) -> usize {
        match self {
            ListError::Gone { page, .. }
            | ListError::Status { page, .. }
            | ListError::Transport { page, .. }
            | ListError::Malformed { page, .. }
            | ListError::InvalidNextLink { page, .. }
            | ListError::DeadlineExceeded { page } => *page,
        }
    }

    /// True for the 410 case, which load tests count separately.
    pub fn is_gone(&self) -> bool {
        matches!(self, ListError::Gone { .. })
    }

    /// Short tag naming the kind of failure.
    pub fn kind(&self) -> &'static str {
        match self {
            ListError::Gone { .. } => "gone",
            ListError::Status { .. } => "status",
            ListError::Transport { .. } => "transport",
            ListError::Malformed { .. } => "malformed",
            ListError::InvalidNextLink { .. } => "invalid_next_link",
            ListError::DeadlineExceeded { .. } => "deadline",
        }
    }
}
