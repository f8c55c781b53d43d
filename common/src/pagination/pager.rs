use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{
    body::{CursorBody, LinkBody, PagedBody},
    classify, Flavor, ListError, ListRequest, Page, StatusClass,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Pending,
    Done,
    Aborted,
}

/// State of one listing, independent of how requests are sent.
///
/// Callers alternate between [`Pager::next_url`] and [`Pager::observe`] until
/// `next_url` returns `None`. The first revision a response carries is kept
/// for the remainder of the listing and echoed on every later request; only
/// [`Pager::restart`] clears it.
#[derive(Clone, Debug)]
pub struct Pager {
    request: ListRequest,
    state: State,
    pages: usize,
    revision: Option<String>,
    cursor: Option<String>,
    next_link: Option<Url>,
}

impl Pager {
    /// Start a listing at page one.
    pub fn new(request: ListRequest) -> Self {
        Self {
            request,
            state: State::Pending,
            pages: 0,
            revision: None,
            cursor: None,
            next_link: None,
        }
    }

    /// Request this pager was built from.
    pub fn request(&self) -> &ListRequest {
        &self.request
    }

    /// Fencing revision of the listing, once one was received.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Number of pages accepted so far.
    pub fn pages_seen(&self) -> usize {
        self.pages
    }

    /// True once the listing reached its last page.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// True once the listing was abandoned on an error.
    pub fn is_aborted(&self) -> bool {
        self.state == State::Aborted
    }

    /// Abandon the listing. No further URLs are produced.
    pub fn abort(&mut self) {
        if self.state == State::Pending {
            self.state = State::Aborted;
        }
    }

    /// Forget all progress and start again from page one.
    pub fn restart(&mut self) {
        *self = Self::new(self.request.clone());
    }

    /// URL of the next page, or `None` once the listing is over.
    pub fn next_url(&self) -> Option<Url> {
        if self.state != State::Pending {
            return None;
        }
        let size = self.request.page_size.to_string();
        match self.request.flavor {
            Flavor::Cursor => {
                let mut params = vec![("limit", size)];
                if self.pages > 0 {
                    if let Some(revision) = &self.revision {
                        params.push(("revision", revision.clone()));
                    }
                    if let Some(cursor) = &self.cursor {
                        params.push(("continue", cursor.clone()));
                    }
                }
                Some(self.build_url(&params))
            }
            Flavor::PageNumber => {
                let mut params = vec![("pagesize", size), ("page", (self.pages + 1).to_string())];
                if self.pages > 0 {
                    if let Some(revision) = &self.revision {
                        params.push(("revision", revision.clone()));
                    }
                }
                Some(self.build_url(&params))
            }
            Flavor::NextLink => {
                if self.pages == 0 {
                    let mut url = self.request.url.clone();
                    url.query_pairs_mut().append_pair("limit", &size);
                    Some(url)
                } else {
                    self.next_link.clone()
                }
            }
        }
    }

    fn build_url(&self, params: &[(&str, String)]) -> Url {
        let mut url = self.request.url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        if let Some(suffix) = &self.request.suffix {
            let suffix = suffix.trim_start_matches(['?', '&']);
            if !suffix.is_empty() {
                let query = match url.query() {
                    Some(query) if !query.is_empty() => format!("{query}&{suffix}"),
                    _ => suffix.to_owned(),
                };
                url.set_query(Some(&query));
            }
        }
        url
    }

    /// Feed the response to the request for `url`, the value last returned by
    /// [`Pager::next_url`].
    ///
    /// Any error aborts the listing.
    pub fn observe(&mut self, url: Url, status: u16, body: &[u8]) -> Result<Page, ListError> {
        let page = self.pages + 1;
        let result = self.accept(page, url, status, body);
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn accept(&mut self, page: usize, url: Url, status: u16, body: &[u8]) -> Result<Page, ListError> {
        match classify(status) {
            StatusClass::Ok => {}
            StatusClass::Gone => return Err(ListError::Gone { page, url }),
            StatusClass::Failed(status) => return Err(ListError::Status { page, status, url }),
        }

        let (items, continue_token, revision, next_link) = match self.request.flavor {
            Flavor::Cursor => {
                let body: CursorBody = decode(page, body)?;
                let token = body.continue_token.filter(|token| !token.is_empty());
                (body.data, token, body.revision, None)
            }
            Flavor::PageNumber => {
                let body: PagedBody = decode(page, body)?;
                (body.data, None, body.revision, None)
            }
            Flavor::NextLink => {
                let body: LinkBody = decode(page, body)?;
                let next_link = body
                    .next_link()
                    .map(|link| {
                        self.request
                            .url
                            .join(link)
                            .map_err(|source| ListError::InvalidNextLink {
                                page,
                                link: link.to_owned(),
                                source,
                            })
                    })
                    .transpose()?;
                (body.data, None, None, next_link)
            }
        };

        let last = match self.request.flavor {
            Flavor::Cursor => continue_token.is_none(),
            Flavor::PageNumber => items.is_empty(),
            Flavor::NextLink => next_link.is_none(),
        };

        // An empty revision means "latest" to the server, so it is no fence.
        if self.revision.is_none() {
            self.revision = revision.clone().filter(|r| !r.is_empty());
        }
        self.pages = page;
        self.cursor = continue_token.clone();
        self.next_link = next_link;
        if last {
            self.state = State::Done;
        }
        debug!(
            flavor = self.request.flavor.name(),
            page,
            items = items.len(),
            last,
            revision = self.revision.as_deref(),
            "page received"
        );

        Ok(Page {
            index: page,
            url,
            status,
            items,
            continue_token,
            revision,
            len: body.len(),
            last,
        })
    }
}

fn decode<T: DeserializeOwned>(page: usize, body: &[u8]) -> Result<T, ListError> {
    serde_json::from_slice(body).map_err(|source| ListError::Malformed {
        page,
        len: body.len(),
        source,
    })
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    fn request(flavor: Flavor) -> ListRequest {
        ListRequest::new(
            "https://rancher.test/v1/configmaps".parse().unwrap(),
            flavor,
        )
    }

    fn params(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    fn feed(pager: &mut Pager, body: serde_json::Value) -> Result<Page, ListError> {
        let url = pager.next_url().expect("pager should have a next page");
        pager.observe(url, 200, body.to_string().as_bytes())
    }

    #[test]
    fn cursor_first_page_has_only_limit() {
        let pager = Pager::new(request(Flavor::Cursor).with_page_size(50));
        let url = pager.next_url().unwrap();
        assert_eq!(url.as_str(), "https://rancher.test/v1/configmaps?limit=50");
    }

    #[test]
    fn cursor_echoes_revision_and_continue() {
        let mut pager = Pager::new(request(Flavor::Cursor));
        feed(&mut pager, json!({"data": [1], "continue": "tok-a", "revision": "42"})).unwrap();

        let second = params(&pager.next_url().unwrap());
        assert_eq!(second["limit"], "100");
        assert_eq!(second["revision"], "42");
        assert_eq!(second["continue"], "tok-a");

        // A later revision never replaces the fence.
        feed(&mut pager, json!({"data": [2], "continue": "tok-b", "revision": "57"})).unwrap();
        let third = params(&pager.next_url().unwrap());
        assert_eq!(third["revision"], "42");
        assert_eq!(third["continue"], "tok-b");
        assert_eq!(pager.revision(), Some("42"));
    }

    #[test]
    fn cursor_stops_without_continue_even_with_data() {
        let mut pager = Pager::new(request(Flavor::Cursor));
        let page = feed(&mut pager, json!({"data": [1, 2, 3], "revision": "1"})).unwrap();
        assert!(page.last);
        assert_eq!(page.items.len(), 3);
        assert!(pager.is_done());
        assert!(pager.next_url().is_none());
    }

    #[test]
    fn cursor_treats_empty_continue_as_absent() {
        let mut pager = Pager::new(request(Flavor::Cursor));
        let page = feed(&mut pager, json!({"data": [], "continue": ""})).unwrap();
        assert!(page.last);
        assert!(pager.next_url().is_none());
    }

    #[test]
    fn page_number_counts_pages_and_fences_revision() {
        let mut pager = Pager::new(request(Flavor::PageNumber).with_page_size(10));
        let first = params(&pager.next_url().unwrap());
        assert_eq!(first["pagesize"], "10");
        assert_eq!(first["page"], "1");
        assert!(!first.contains_key("revision"));

        feed(&mut pager, json!({"data": [1], "revision": "9"})).unwrap();
        let second = params(&pager.next_url().unwrap());
        assert_eq!(second["page"], "2");
        assert_eq!(second["revision"], "9");
    }

    #[test]
    fn page_number_stops_on_empty_data_regardless_of_revision() {
        let mut pager = Pager::new(request(Flavor::PageNumber));
        feed(&mut pager, json!({"data": [1], "revision": "9"})).unwrap();
        let page = feed(&mut pager, json!({"data": [], "revision": "9"})).unwrap();
        assert!(page.last);
        assert!(pager.next_url().is_none());
        assert_eq!(pager.pages_seen(), 2);
    }

    #[test]
    fn page_number_stops_when_data_is_missing() {
        let mut pager = Pager::new(request(Flavor::PageNumber));
        let page = feed(&mut pager, json!({"count": 0})).unwrap();
        assert!(page.last);
    }

    #[test]
    fn next_link_follows_server_links() {
        let mut pager = Pager::new(ListRequest::new(
            "https://rancher.test/v3/users".parse().unwrap(),
            Flavor::NextLink,
        ));
        assert_eq!(
            pager.next_url().unwrap().as_str(),
            "https://rancher.test/v3/users?limit=100"
        );
        feed(
            &mut pager,
            json!({"data": [1], "pagination": {"next": "https://rancher.test/v3/users?limit=100&marker=u-2", "partial": true}}),
        )
        .unwrap();
        assert_eq!(
            pager.next_url().unwrap().as_str(),
            "https://rancher.test/v3/users?limit=100&marker=u-2"
        );
        let page = feed(&mut pager, json!({"data": [2], "pagination": {"limit": 100}})).unwrap();
        assert!(page.last);
        assert!(pager.next_url().is_none());
    }

    #[test]
    fn next_link_resolves_relative_links() {
        let mut pager = Pager::new(ListRequest::new(
            "https://rancher.test/v3/users".parse().unwrap(),
            Flavor::NextLink,
        ));
        feed(
            &mut pager,
            json!({"data": [1], "pagination": {"next": "/v3/users?marker=u-2", "partial": true}}),
        )
        .unwrap();
        assert_eq!(
            pager.next_url().unwrap().as_str(),
            "https://rancher.test/v3/users?marker=u-2"
        );
    }

    #[test]
    fn suffix_follows_paging_parameters() {
        let pager = Pager::new(
            request(Flavor::PageNumber).with_suffix("&filter=metadata.namespace=default"),
        );
        assert_eq!(
            pager.next_url().unwrap().as_str(),
            "https://rancher.test/v1/configmaps?pagesize=100&page=1&filter=metadata.namespace=default"
        );
    }

    #[test]
    fn gone_aborts_the_listing() {
        let mut pager = Pager::new(request(Flavor::Cursor));
        feed(&mut pager, json!({"data": [1], "continue": "a", "revision": "3"})).unwrap();
        let url = pager.next_url().unwrap();
        let err = pager.observe(url, 410, b"{}").unwrap_err();
        assert!(err.is_gone());
        assert_eq!(err.page(), 2);
        assert!(pager.is_aborted());
        assert!(pager.next_url().is_none());
    }

    #[test]
    fn server_error_is_not_gone() {
        let mut pager = Pager::new(request(Flavor::Cursor));
        let url = pager.next_url().unwrap();
        let err = pager.observe(url, 500, b"oops").unwrap_err();
        assert!(!err.is_gone());
        assert!(matches!(err, ListError::Status { status: 500, .. }));
        assert!(pager.next_url().is_none());
    }

    #[test]
    fn unparsable_body_is_malformed() {
        let mut pager = Pager::new(request(Flavor::PageNumber));
        let url = pager.next_url().unwrap();
        let err = pager.observe(url, 200, b"<html>").unwrap_err();
        assert!(matches!(err, ListError::Malformed { page: 1, len: 6, .. }));
        assert_eq!(err.kind(), "malformed");
        assert!(pager.next_url().is_none());
    }

    #[test]
    fn empty_revision_does_not_fence() {
        let mut pager = Pager::new(request(Flavor::Cursor));
        feed(&mut pager, json!({"data": [1], "continue": "a", "revision": ""})).unwrap();
        assert_eq!(pager.revision(), None);
        assert!(!params(&pager.next_url().unwrap()).contains_key("revision"));

        feed(&mut pager, json!({"data": [2], "continue": "b", "revision": "42"})).unwrap();
        let third = params(&pager.next_url().unwrap());
        assert_eq!(third["revision"], "42");
        assert_eq!(third["continue"], "b");
    }

    #[test]
    fn next_link_ignores_empty_next() {
        let mut pager = Pager::new(ListRequest::new(
            "https://rancher.test/v3/users".parse().unwrap(),
            Flavor::NextLink,
        ));
        let page = feed(
            &mut pager,
            json!({"data": [1], "pagination": {"next": "", "partial": true}}),
        )
        .unwrap();
        assert!(page.last);
        assert!(pager.is_done());
        assert!(pager.next_url().is_none());
    }

    #[test]
    fn restart_clears_fence() {
        let mut pager = Pager::new(request(Flavor::Cursor));
        feed(&mut pager, json!({"data": [1], "continue": "a", "revision": "3"})).unwrap();
        let url = pager.next_url().unwrap();
        let _ = pager.observe(url, 410, b"");
        pager.restart();
        assert_eq!(pager.revision(), None);
        assert_eq!(pager.pages_seen(), 0);
        assert_eq!(
            pager.next_url().unwrap().as_str(),
            "https://rancher.test/v1/configmaps?limit=100"
        );
    }
}
