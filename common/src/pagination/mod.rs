//! Client side of the platform's paginated listing endpoints.
//!
//! Three conventions are supported:
//!
//! * [`Flavor::Cursor`]: Kubernetes style `limit`/`continue` paging with a
//!   `revision` fence, served by the Steve API.
//! * [`Flavor::PageNumber`]: Steve's own `pagesize`/`page` paging, also fenced
//!   by `revision`.
//! * [`Flavor::NextLink`]: the legacy Norman API, where each page embeds the
//!   link to the next one.
//!
//! [`Pager`] holds the state of a single listing without doing any I/O, so the
//! same rules drive both the plain [`Lister`] and load-test transactions that
//! issue requests through their own HTTP client.
use std::time::Duration;

use reqwest::Url;
use serde_json::Value;

mod body;
mod error;
mod lister;
mod pager;
mod status;

pub use body::{CursorBody, LinkBody, LinkPagination, PagedBody};
pub use error::ListError;
pub use lister::{HttpTransport, ListSummary, Lister, PageTransport, RawResponse};
pub use pager::Pager;
pub use status::{classify, StatusClass, CONFLICT, GONE, OK};

/// Page size used when none is requested.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Pagination convention of a listing endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flavor {
    /// `limit` + `continue` token, fenced by `revision`.
    Cursor,
    /// 1-based `page` + `pagesize`, fenced by `revision`.
    PageNumber,
    /// `limit` on the first page, then the server's `pagination.next` link.
    NextLink,
}

impl Flavor {
    /// Short name used in logs and metric attributes.
    pub fn name(&self) -> &'static str {
        match self {
            Flavor::Cursor => "cursor",
            Flavor::PageNumber => "page_number",
            Flavor::NextLink => "next_link",
        }
    }
}

/// Everything needed to start a listing.
///
/// The request is a template: each [`Pager`] built from it starts at page one
/// and never mutates it.
#[derive(Clone, Debug)]
pub struct ListRequest {
    /// Collection URL, without paging parameters.
    pub url: Url,
    /// Pagination convention of the endpoint.
    pub flavor: Flavor,
    /// Items requested per page.
    pub page_size: u32,
    /// Extra query string appended verbatim to every request built from `url`
    /// (e.g. `&filter=metadata.namespace=default`).
    pub suffix: Option<String>,
    /// Upper bound on the wall time of a whole listing, measured from its
    /// first request.
    pub deadline: Option<Duration>,
}

impl ListRequest {
    /// Listing of `url` with the default page size and no deadline.
    pub fn new(url: Url, flavor: Flavor) -> Self {
        Self {
            url,
            flavor,
            page_size: DEFAULT_PAGE_SIZE,
            suffix: None,
            deadline: None,
        }
    }

    /// Set the number of items requested per page.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Append `suffix` to the query string of every request.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        self.suffix = (!suffix.is_empty()).then_some(suffix);
        self
    }

    /// Bound the whole listing by `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// A successfully decoded page of a listing.
#[derive(Clone, Debug)]
pub struct Page {
    /// 1-based position of the page within its listing.
    pub index: usize,
    /// URL the page was fetched from.
    pub url: Url,
    /// HTTP status of the response. Only 200 responses become pages.
    pub status: u16,
    /// Items of the page, left undecoded.
    pub items: Vec<Value>,
    /// Continuation token carried by the response, if any.
    pub continue_token: Option<String>,
    /// Revision carried by the response, if any.
    pub revision: Option<String>,
    /// Length of the raw response body in bytes.
    pub len: usize,
    /// True when this page ends the listing.
    pub last: bool,
}
