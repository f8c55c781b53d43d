use serde::Deserialize;
use serde_json::Value;

/// Body of a cursor style page.
///
/// A missing `continue` field is a valid page: it is the last one.
#[derive(Debug, Default, Deserialize)]
pub struct CursorBody {
    /// Items of the page. Plain Kubernetes lists call them `items`.
    #[serde(default, alias = "items")]
    pub data: Vec<Value>,
    /// Token resuming the listing after this page.
    #[serde(default, rename = "continue")]
    pub continue_token: Option<String>,
    /// Revision the listing is served from.
    #[serde(default)]
    pub revision: Option<String>,
}

/// Body of a page number style page.
#[derive(Debug, Default, Deserialize)]
pub struct PagedBody {
    /// Items of the page, empty once past the last page.
    #[serde(default)]
    pub data: Vec<Value>,
    /// Revision the listing is served from.
    #[serde(default)]
    pub revision: Option<String>,
    /// Total number of items matching the query.
    #[serde(default)]
    pub count: Option<u64>,
}

/// Body of a next-link style page.
#[derive(Debug, Default, Deserialize)]
pub struct LinkBody {
    /// Items of the page.
    #[serde(default)]
    pub data: Vec<Value>,
    /// Paging block, absent when the collection fits in a single page.
    #[serde(default)]
    pub pagination: Option<LinkPagination>,
}

/// Paging block of a next-link style page.
#[derive(Debug, Default, Deserialize)]
pub struct LinkPagination {
    /// Link to the next page.
    #[serde(default)]
    pub next: Option<String>,
    /// Set while more pages follow.
    #[serde(default)]
    pub partial: Option<bool>,
    /// Page size the server applied.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Total number of items in the collection.
    #[serde(default)]
    pub total: Option<u64>,
}

impl LinkBody {
    /// Link to follow, present only while the server marks the listing partial.
    /// An empty link ends the listing like an absent one.
    pub fn next_link(&self) -> Option<&str> {
        match &self.pagination {
            Some(LinkPagination {
                next: Some(next),
                partial: Some(true),
                ..
            }) if !next.is_empty() => Some(next.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cursor_body_without_continue_is_last() {
        let body: CursorBody =
            serde_json::from_str(r#"{"data":[{"id":"a"}],"revision":"10"}"#).unwrap();
        assert_eq!(body.data.len(), 1);
        assert_eq!(body.revision.as_deref(), Some("10"));
        assert!(body.continue_token.is_none());
    }

    #[test]
    fn cursor_body_accepts_kubernetes_items() {
        let body: CursorBody =
            serde_json::from_str(r#"{"items":[1,2,3],"continue":"abc"}"#).unwrap();
        assert_eq!(body.data.len(), 3);
        assert_eq!(body.continue_token.as_deref(), Some("abc"));
    }

    #[test]
    fn paged_body_tolerates_missing_data() {
        let body: PagedBody = serde_json::from_str(r#"{"revision":"4"}"#).unwrap();
        assert!(body.data.is_empty());
        assert_eq!(body.count, None);
    }

    #[test]
    fn link_body_needs_partial_to_continue() {
        let body: LinkBody = serde_json::from_str(
            r#"{"data":[],"pagination":{"next":"https://x/v3/users?marker=b","partial":true}}"#,
        )
        .unwrap();
        assert_eq!(body.next_link(), Some("https://x/v3/users?marker=b"));

        let body: LinkBody =
            serde_json::from_str(r#"{"data":[],"pagination":{"next":"https://x/v3/users"}}"#)
                .unwrap();
        assert_eq!(body.next_link(), None);

        let body: LinkBody =
            serde_json::from_str(r#"{"data":[],"pagination":{"partial":true}}"#).unwrap();
        assert_eq!(body.next_link(), None);

        let body: LinkBody =
            serde_json::from_str(r#"{"data":[],"pagination":{"next":"","partial":true}}"#)
                .unwrap();
        assert_eq!(body.next_link(), None);
    }
}
