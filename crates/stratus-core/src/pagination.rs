//! Lazy, forward-only pagination over multi-request collections.
//!
//! A list response carries one batch of items under a collection key and,
//! when more data exists, a sibling links array with a `next` link:
//!
//! ```json
//! {
//!   "servers": [{"id": "..."}, {"id": "..."}],
//!   "servers_links": [{"rel": "next", "href": "https://api/servers?marker=..."}]
//! }
//! ```
//!
//! [`fetch_first_page`] turns that into a [`Page`] whose continuation fetches
//! the link target. [`Page::advance`] consumes the page, so a continuation runs
//! at most once and pages are requested strictly in order.

use futures::future::BoxFuture;
use futures::stream::{self, Stream};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::ServiceClient;
use crate::continuation::{try_select, Outcome};
use crate::envelope;
use crate::error::Result;
use crate::http::HttpResponse;
use crate::query::QueryParams;

type Continuation<T> =
    Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Outcome<Option<Page<T>>>> + Send>;

/// What to fetch for a paginated collection.
#[derive(Debug, Clone)]
pub struct CollectionRequest {
    target: String,
    collection_key: String,
    links_key: String,
    query: QueryParams,
}

impl CollectionRequest {
    /// List `collection_key` at `target` (relative path or absolute URL).
    ///
    /// The links array defaults to `<collection_key>_links`.
    #[must_use]
    pub fn new(target: impl Into<String>, collection_key: impl Into<String>) -> Self {
        let collection_key = collection_key.into();
        Self {
            target: target.into(),
            links_key: envelope::links_key_for(&collection_key),
            collection_key,
            query: QueryParams::new(),
        }
    }

    /// Override the name of the links array.
    #[must_use]
    pub fn with_links_key(mut self, links_key: impl Into<String>) -> Self {
        self.links_key = links_key.into();
        self
    }

    /// Query parameters for the first request only.
    ///
    /// Follow-up requests use the server's `next` link verbatim.
    #[must_use]
    pub fn with_query(mut self, params: QueryParams) -> Self {
        self.query = params;
        self
    }

    /// Name of the array holding the items.
    #[must_use]
    pub fn collection_key(&self) -> &str {
        &self.collection_key
    }

    /// Name of the links array.
    #[must_use]
    pub fn links_key(&self) -> &str {
        &self.links_key
    }

    fn follow(&self, next: String) -> Self {
        Self {
            target: next,
            collection_key: self.collection_key.clone(),
            links_key: self.links_key.clone(),
            query: QueryParams::new(),
        }
    }
}

/// One batch of a collection, plus the means to fetch the next batch.
pub struct Page<T> {
    items: Vec<T>,
    next: Option<Continuation<T>>,
}

/// Result of advancing past a page.
#[derive(Debug)]
pub enum Advance<T> {
    /// The following page.
    Next(Page<T>),
    /// No pages remain.
    Exhausted,
}

impl<T> Page<T> {
    /// A final page with no continuation.
    #[must_use]
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    /// A page whose successor is produced by `next`.
    #[must_use]
    pub fn with_next<F>(items: Vec<T>, next: F) -> Self
    where
        F: FnOnce(CancellationToken) -> BoxFuture<'static, Outcome<Option<Page<T>>>> + Send + 'static,
    {
        Self {
            items,
            next: Some(Box::new(next)),
        }
    }

    /// Items in server order.
    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Take the items, dropping the continuation.
    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Number of items on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when this page holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when another page may follow.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Split into items and the (still unused) advancement handle.
    #[must_use]
    pub fn into_parts(self) -> (Vec<T>, Page<T>) {
        (
            self.items,
            Page {
                items: Vec::new(),
                next: self.next,
            },
        )
    }

    /// Fetch the next page.
    ///
    /// Returns `Canceled` without issuing a request when `token` is already
    /// canceled.
    pub async fn advance(self, token: &CancellationToken) -> Outcome<Advance<T>> {
        let Some(next) = self.next else {
            return Outcome::Completed(Advance::Exhausted);
        };
        if token.is_cancelled() {
            return Outcome::Canceled;
        }
        next(token.clone())
            .await
            .map(|page| page.map_or(Advance::Exhausted, Advance::Next))
    }
}

impl<T: fmt::Debug> fmt::Debug for Page<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("items", &self.items)
            .field("has_next", &self.has_next())
            .finish()
    }
}

/// Fetch the first page of a collection.
///
/// An empty body, or a body without `collection_key`, yields `Completed(None)`.
/// A missing or malformed links array yields a page without continuation.
pub async fn fetch_first_page<T>(
    client: &ServiceClient,
    request: CollectionRequest,
    token: &CancellationToken,
) -> Outcome<Option<Page<T>>>
where
    T: DeserializeOwned + Send + 'static,
{
    let mut exchange = match client.exchange(Method::GET, &request.target) {
        Ok(exchange) => exchange,
        Err(err) => return Outcome::Faulted(err),
    };
    request.query.apply_to(exchange.url_mut());

    debug!(url = %exchange.url(), key = %request.collection_key, "Fetching page");

    let owner = client.clone();
    try_select(client.send(exchange, token), move |response| {
        parse_page(&owner, &request, &response)
    })
    .await
}

fn parse_page<T>(
    client: &ServiceClient,
    request: &CollectionRequest,
    response: &HttpResponse,
) -> Result<Option<Page<T>>>
where
    T: DeserializeOwned + Send + 'static,
{
    let Some(mut document) = response.document()? else {
        return Ok(None);
    };
    let next = envelope::next_link(&document, &request.links_key);
    let Some(items) = envelope::take_optional::<Vec<T>>(&mut document, &request.collection_key)?
    else {
        return Ok(None);
    };

    let Some(next) = next else {
        return Ok(Some(Page::last(items)));
    };

    let client = client.clone();
    let follow = request.follow(next);
    Ok(Some(Page::with_next(items, move |token: CancellationToken| {
        Box::pin(async move { fetch_first_page(&client, follow, &token).await })
            as BoxFuture<'static, Outcome<Option<Page<T>>>>
    })))
}

/// Walk every page starting from `first` and gather all items in order.
pub async fn collect_all<T>(first: Option<Page<T>>, token: &CancellationToken) -> Outcome<Vec<T>> {
    let mut all = Vec::new();
    let mut current = first;
    while let Some(page) = current {
        let (items, rest) = page.into_parts();
        all.extend(items);
        current = match rest.advance(token).await {
            Outcome::Completed(Advance::Next(page)) => Some(page),
            Outcome::Completed(Advance::Exhausted) => None,
            Outcome::Faulted(err) => return Outcome::Faulted(err),
            Outcome::Canceled => return Outcome::Canceled,
        };
    }
    Outcome::Completed(all)
}

/// Expose the walk as a stream of item batches.
///
/// Each page's items are yielded as `Completed` before the next page is
/// requested. A failed fetch yields one `Faulted` and a canceled walk yields
/// one `Canceled`; either ends the stream. Exhaustion ends it with no extra
/// item. Empty pages are skipped.
pub fn into_stream<T>(
    first: Option<Page<T>>,
    token: CancellationToken,
) -> impl Stream<Item = Outcome<Vec<T>>>
where
    T: Send + 'static,
{
    stream::unfold(first, move |mut current| {
        let token = token.clone();
        async move {
            loop {
                let (items, rest) = current.take()?.into_parts();
                if !items.is_empty() {
                    return Some((Outcome::Completed(items), rest.has_next().then_some(rest)));
                }
                match rest.advance(&token).await {
                    Outcome::Completed(Advance::Next(page)) => current = Some(page),
                    Outcome::Completed(Advance::Exhausted) => return None,
                    Outcome::Faulted(err) => return Some((Outcome::Faulted(err), None)),
                    Outcome::Canceled => return Some((Outcome::Canceled, None)),
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::ServiceType;
    use futures::StreamExt;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    /// Serves ids `0..total` in pages of `page_size`, marker-linked.
    struct MarkerCollection {
        base: String,
        total: u32,
        page_size: u32,
    }

    impl Respond for MarkerCollection {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let start = request
                .url
                .query_pairs()
                .find(|(key, _)| key == "marker")
                .map_or(0, |(_, value)| value.parse::<u32>().unwrap() + 1);
            let end = (start + self.page_size).min(self.total);
            let items: Vec<_> = (start..end).map(|id| json!({"id": id})).collect();

            let mut body = json!({ "items": items });
            if end < self.total {
                body["items_links"] = json!([
                    {"rel": "self", "href": format!("{}/items", self.base)},
                    {"rel": "NEXT", "href": format!("{}/items?marker={}", self.base, end - 1)}
                ]);
            }
            ResponseTemplate::new(200).set_body_json(body)
        }
    }

    fn client_for(server: &MockServer) -> ServiceClient {
        ServiceClient::builder(ServiceType::Compute, server.uri())
            .unwrap()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn missing_collection_key_is_an_absent_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"other": []})))
            .mount(&server)
            .await;

        let outcome = fetch_first_page::<Item>(
            &client_for(&server),
            CollectionRequest::new("items", "items"),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(outcome, Outcome::Completed(None)));
    }

    #[tokio::test]
    async fn empty_body_is_an_absent_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let outcome = fetch_first_page::<Item>(
            &client_for(&server),
            CollectionRequest::new("items", "items"),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(outcome, Outcome::Completed(None)));
    }

    #[tokio::test]
    async fn malformed_links_mean_last_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": 1}],
                "items_links": {"rel": "next"}
            })))
            .mount(&server)
            .await;

        let page = fetch_first_page::<Item>(
            &client_for(&server),
            CollectionRequest::new("items", "items"),
            &CancellationToken::new(),
        )
        .await
        .completed()
        .flatten()
        .unwrap();
        assert_eq!(page.items(), &[Item { id: 1 }]);
        assert!(!page.has_next());
    }

    #[tokio::test]
    async fn unacceptable_status_is_a_fault() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(ResponseTemplate::new(500).set_body_string("db down"))
            .mount(&server)
            .await;

        let outcome = fetch_first_page::<Item>(
            &client_for(&server),
            CollectionRequest::new("items", "items"),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(
            outcome,
            Outcome::Faulted(Error::TransientHttp { status: 500, ref body }) if body == "db down"
        ));
    }

    #[tokio::test]
    async fn query_applies_to_first_request_only() {
        let server = MockServer::start().await;
        let next = format!("{}/items?marker=2", server.uri());
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("marker", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"id": 3}]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": 1}, {"id": 2}],
                "items_links": [{"rel": "next", "href": next}]
            })))
            .mount(&server)
            .await;

        let mut params = QueryParams::new();
        params.push_paging(Some(2), None);
        let token = CancellationToken::new();
        let first = fetch_first_page::<Item>(
            &client_for(&server),
            CollectionRequest::new("items", "items").with_query(params),
            &token,
        )
        .await
        .completed()
        .flatten();

        let all = collect_all(first, &token).await.completed().unwrap();
        assert_eq!(all, vec![Item { id: 1 }, Item { id: 2 }, Item { id: 3 }]);
    }

    #[tokio::test]
    async fn walk_yields_ceil_n_over_p_pages_in_order() {
        for (total, page_size) in [(7, 3), (6, 3), (1, 5), (10, 1)] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/items"))
                .respond_with(MarkerCollection {
                    base: server.uri(),
                    total,
                    page_size,
                })
                .mount(&server)
                .await;

            let token = CancellationToken::new();
            let mut page = fetch_first_page::<Item>(
                &client_for(&server),
                CollectionRequest::new("items", "items"),
                &token,
            )
            .await
            .completed()
            .flatten()
            .unwrap();

            let mut pages = 1;
            let mut seen: Vec<u32> = page.items().iter().map(|item| item.id).collect();
            while page.has_next() {
                page = match page.advance(&token).await {
                    Outcome::Completed(Advance::Next(next)) => next,
                    other => panic!("unexpected advance: {other:?}"),
                };
                pages += 1;
                seen.extend(page.items().iter().map(|item| item.id));
            }

            assert_eq!(pages, total.div_ceil(page_size), "N={total} P={page_size}");
            assert_eq!(seen, (0..total).collect::<Vec<_>>());
            assert!(!page.has_next());
        }
    }

    #[tokio::test]
    async fn advance_on_last_page_is_exhausted() {
        let page = Page::last(vec![1, 2]);
        let outcome = page.advance(&CancellationToken::new()).await;
        assert!(matches!(outcome, Outcome::Completed(Advance::Exhausted)));
    }

    #[tokio::test]
    async fn advance_after_cancel_never_invokes_continuation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let page = Page::with_next(vec![1], move |_token| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Outcome::Completed(Some(Page::last(vec![2]))) })
                as BoxFuture<'static, Outcome<Option<Page<i32>>>>
        });

        let token = CancellationToken::new();
        token.cancel();
        assert!(page.advance(&token).await.is_canceled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn continuation_returning_none_is_exhausted() {
        let page = Page::with_next(vec![1], |_token| {
            Box::pin(async { Outcome::Completed(None) })
                as BoxFuture<'static, Outcome<Option<Page<i32>>>>
        });
        let outcome = page.advance(&CancellationToken::new()).await;
        assert!(matches!(outcome, Outcome::Completed(Advance::Exhausted)));
    }

    #[tokio::test]
    async fn stream_yields_batches_then_error() {
        let page = Page::with_next(vec![1, 2], |_token| {
            Box::pin(async { Outcome::Faulted(Error::http(reqwest::StatusCode::BAD_GATEWAY, "")) })
                as BoxFuture<'static, Outcome<Option<Page<i32>>>>
        });
        let batches: Vec<_> = into_stream(Some(page), CancellationToken::new())
            .collect()
            .await;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], Outcome::Completed(vec![1, 2]));
        assert!(matches!(
            batches[1],
            Outcome::Faulted(Error::TransientHttp { status: 502, .. })
        ));
    }

    #[tokio::test]
    async fn stream_reports_cancellation_after_first_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let page = Page::with_next(vec![1, 2], move |_token| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Outcome::Completed(Some(Page::last(vec![3, 4]))) })
                as BoxFuture<'static, Outcome<Option<Page<i32>>>>
        });
        let token = CancellationToken::new();
        let mut stream = Box::pin(into_stream(Some(page), token.clone()));

        assert_eq!(stream.next().await, Some(Outcome::Completed(vec![1, 2])));
        token.cancel();

        let rest: Vec<_> = stream.collect().await;
        assert_eq!(rest, vec![Outcome::Canceled]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_stream_has_no_terminal_item() {
        let page = Page::with_next(vec![1, 2], |_token| {
            Box::pin(async { Outcome::Completed(Some(Page::last(vec![3, 4]))) })
                as BoxFuture<'static, Outcome<Option<Page<i32>>>>
        });
        let batches: Vec<_> = into_stream(Some(page), CancellationToken::new())
            .collect()
            .await;
        assert_eq!(
            batches,
            vec![Outcome::Completed(vec![1, 2]), Outcome::Completed(vec![3, 4])]
        );
    }

    #[tokio::test]
    async fn stream_of_absent_first_page_is_empty() {
        let batches: Vec<_> = into_stream::<i32>(None, CancellationToken::new())
            .collect()
            .await;
        assert!(batches.is_empty());
    }
}
