//! Paged list responses and client-side record caps.

use serde::Deserialize;

/// Response header carrying the continuation token of a paged list.
pub const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";

/// Query parameter the continuation token is sent back in.
pub const CONTINUATION_PARAM: &str = "continuationToken";

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Records on this page, in server order.
    pub items: Vec<T>,
    /// Token for the next page; `None` on the last page.
    pub continuation: Option<String>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.continuation.is_none()
    }
}

/// JSON envelope of Azure DevOps list responses: `{"count": n, "value": [...]}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

/// Keep only the `cap` most recent records.
///
/// The API does not guarantee descending-recency order on every endpoint, so
/// records are sorted by `recency` (newest first) before truncating. Records
/// without a recency key sort last. The sort is stable: equal keys keep their
/// server order.
pub fn retain_most_recent<T, K, F>(mut items: Vec<T>, cap: usize, recency: F) -> Vec<T>
where
    K: Ord,
    F: Fn(&T) -> Option<K>,
{
    if items.len() > 1 {
        items.sort_by(|a, b| recency(b).cmp(&recency(a)));
    }
    items.truncate(cap);
    items
}
