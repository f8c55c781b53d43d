use futures::Stream;
use reqwest::{Client, Url};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{ListError, ListRequest, Page, Pager};
use crate::session::Session;

/// Status and body of a response, as far as listings care.
#[derive(Clone, Debug)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Undecoded body.
    pub body: Vec<u8>,
}

/// Sends the GET requests of a listing.
#[async_trait::async_trait]
pub trait PageTransport: Send + Sync {
    /// Fetch `url`. Any HTTP status is a response; only failures to get one
    /// are errors.
    async fn get(&self, url: &Url) -> Result<RawResponse, reqwest::Error>;
}

/// [`PageTransport`] over a reqwest client, presenting a session on every
/// request.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    session: Session,
}

impl HttpTransport {
    /// Send requests with `client`, authenticated by `session`.
    pub fn new(client: Client, session: Session) -> Self {
        Self { client, session }
    }
}

#[async_trait::async_trait]
impl PageTransport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<RawResponse, reqwest::Error> {
        let resp = self
            .session
            .apply(self.client.get(url.clone()))
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?.to_vec();
        Ok(RawResponse { status, body })
    }
}

/// Totals of a fully drained listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListSummary {
    /// Pages received.
    pub pages: usize,
    /// Items received across all pages.
    pub items: usize,
    /// Body bytes received across all pages.
    pub bytes: usize,
    /// Revision the listing was fenced on.
    pub revision: Option<String>,
}

/// Drives a [`Pager`] over a [`PageTransport`], one page at a time.
pub struct Lister<T> {
    transport: T,
    pager: Pager,
    started: Option<Instant>,
}

impl<T: PageTransport> Lister<T> {
    /// Prepare a listing; nothing is sent until the first page is requested.
    pub fn new(transport: T, request: ListRequest) -> Self {
        Self {
            transport,
            pager: Pager::new(request),
            started: None,
        }
    }

    /// State of the current listing.
    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Start over from page one. The deadline clock restarts too.
    pub fn restart(&mut self) {
        self.pager.restart();
        self.started = None;
    }

    /// Fetch the next page. `None` once the listing completed or failed.
    pub async fn next_page(&mut self) -> Option<Result<Page, ListError>> {
        let url = self.pager.next_url()?;
        let page = self.pager.pages_seen() + 1;
        let started = *self.started.get_or_insert_with(Instant::now);

        let fetch = self.transport.get(&url);
        let response = match self.pager.request().deadline {
            None => fetch.await,
            Some(deadline) => {
                let Some(remaining) = deadline.checked_sub(started.elapsed()) else {
                    self.pager.abort();
                    return Some(Err(ListError::DeadlineExceeded { page }));
                };
                match tokio::time::timeout(remaining, fetch).await {
                    Ok(response) => response,
                    Err(_) => {
                        warn!(page, ?deadline, "listing deadline exceeded");
                        self.pager.abort();
                        return Some(Err(ListError::DeadlineExceeded { page }));
                    }
                }
            }
        };

        let response = match response {
            Ok(response) => response,
            Err(source) => {
                self.pager.abort();
                return Some(Err(ListError::Transport { page, source }));
            }
        };
        debug!(%url, status = response.status, len = response.body.len(), "fetched page");
        Some(self.pager.observe(url, response.status, &response.body))
    }

    /// The remaining pages as a stream. It ends after the last page or right
    /// after the first error.
    pub fn pages(&mut self) -> impl Stream<Item = Result<Page, ListError>> + '_ {
        futures::stream::unfold(self, |lister| async move {
            let page = lister.next_page().await?;
            Some((page, lister))
        })
    }

    /// Consume the rest of the listing.
    #[tracing::instrument(skip(self), fields(flavor = self.pager.request().flavor.name(), url = %self.pager.request().url))]
    pub async fn drain(&mut self) -> Result<ListSummary, ListError> {
        let mut summary = ListSummary::default();
        while let Some(page) = self.next_page().await {
            let page = page?;
            summary.pages += 1;
            summary.items += page.items.len();
            summary.bytes += page.len;
        }
        summary.revision = self.pager.revision().map(str::to_owned);
        Ok(summary)
    }
}
