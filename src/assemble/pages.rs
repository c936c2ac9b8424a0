//! Continuation-token walks for aggregation operations.
//!
//! Pages are pulled lazily through a [`futures::Stream`]: the next request is only issued when
//! the consumer asks for it, and each request asks for no more records than the cap still
//! allows. Upstream occasionally ignores `pageSize`; surplus records are dropped so the cap is
//! exact.

use crate::query::QuerySpec;
use crate::study::{Study, UpstreamPage};
use crate::GatewayError;
use async_trait::async_trait;
use futures::stream::{self, Stream, TryStreamExt};
use tracing::debug;

/// Source of listing pages; the gateway implements it over the dispatcher.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, spec: &QuerySpec) -> Result<UpstreamPage, GatewayError>;
}

/// One page as yielded by [`page_stream`], already clipped to the cap.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub studies: Vec<Study>,
    pub total_hint: Option<u64>,
    pub next_page_token: Option<String>,
    /// Upstream returned more records than requested and some were dropped.
    pub clipped: bool,
}

/// Summary of a finished walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageWalk {
    pub records: usize,
    pub pages: usize,
    pub truncated: bool,
    pub upstream_total: Option<u64>,
    pub next_page_token: Option<String>,
}

#[derive(Debug)]
struct Cursor {
    token: Option<String>,
    fetched: usize,
    done: bool,
}

/// Lazy stream of pages for `spec`, stopping at `cap` records, an empty page, or the last page.
pub fn page_stream<'a, S>(
    source: &'a S,
    spec: &'a QuerySpec,
    cap: usize,
) -> impl Stream<Item = Result<FetchedPage, GatewayError>> + Send + 'a
where
    S: PageSource + ?Sized,
{
    let start = Cursor { token: spec.page.token.clone(), fetched: 0, done: false };
    stream::try_unfold(start, move |cursor| async move {
        if cursor.done || cursor.fetched >= cap {
            return Ok(None);
        }
        let remaining = cap - cursor.fetched;
        let size = (spec.page.size as usize).min(remaining).max(1) as u32;
        let page = source.fetch_page(&spec.next_page(cursor.token.clone(), size)).await?;

        let mut studies = page.studies;
        let clipped = studies.len() > remaining;
        studies.truncate(remaining);
        let fetched = cursor.fetched + studies.len();
        let done = studies.is_empty() || page.next_page_token.is_none();
        debug!(
            operation = %spec.operation,
            records = studies.len(),
            fetched,
            cap,
            more = !done,
            "fetched page"
        );

        let next = Cursor { token: page.next_page_token.clone(), fetched, done };
        let fetched_page = FetchedPage {
            studies,
            total_hint: page.total_count,
            next_page_token: page.next_page_token,
            clipped,
        };
        Ok(Some((fetched_page, next)))
    })
}

/// Drive [`page_stream`] to completion, handing every page's studies to `on_page`.
pub async fn walk_pages<S, F>(
    source: &S,
    spec: &QuerySpec,
    cap: usize,
    mut on_page: F,
) -> Result<PageWalk, GatewayError>
where
    S: PageSource + ?Sized,
    F: FnMut(&[Study]) + Send,
{
    let pages = page_stream(source, spec, cap);
    futures::pin_mut!(pages);

    let mut walk = PageWalk::default();
    let mut clipped = false;
    while let Some(page) = pages.try_next().await? {
        walk.pages += 1;
        walk.records += page.studies.len();
        if walk.upstream_total.is_none() {
            walk.upstream_total = page.total_hint;
        }
        walk.next_page_token = page.next_page_token;
        clipped |= page.clipped;
        on_page(&page.studies);
    }

    if walk.records >= cap {
        let more_pages = walk.next_page_token.is_some()
            && walk.upstream_total.map_or(true, |total| total > walk.records as u64);
        walk.truncated = clipped || more_pages;
    }
    if !walk.truncated {
        walk.next_page_token = None;
    }
    Ok(walk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryBuilder, ToolArgs};
    use crate::Operation;
    use std::sync::Mutex;

    /// Serves `total` records in pages of at most `serve` (ignoring the requested size when
    /// `ignore_size` is set).
    #[derive(Debug)]
    struct FakeSource {
        total: usize,
        serve: usize,
        ignore_size: bool,
        requests: Mutex<Vec<(Option<String>, u32)>>,
    }

    impl FakeSource {
        fn new(total: usize, serve: usize, ignore_size: bool) -> Self {
            Self { total, serve, ignore_size, requests: Mutex::new(Vec::new()) }
        }

        fn requests(&self) -> Vec<(Option<String>, u32)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for FakeSource {
        async fn fetch_page(&self, spec: &QuerySpec) -> Result<UpstreamPage, GatewayError> {
            self.requests.lock().unwrap().push((spec.page.token.clone(), spec.page.size));
            let offset: usize = spec.page.token.as_deref().map_or(0, |t| t.parse().unwrap());
            let want = if self.ignore_size { self.serve } else { self.serve.min(spec.page.size as usize) };
            let end = (offset + want).min(self.total);
            Ok(UpstreamPage {
                studies: vec![Study::default(); end - offset],
                total_count: Some(self.total as u64),
                next_page_token: (end < self.total).then(|| end.to_string()),
            })
        }
    }

    fn spec() -> QuerySpec {
        let args = ToolArgs::new();
        QueryBuilder::default().build(Operation::GetEnrollmentDistribution, &args).unwrap()
    }

    #[tokio::test]
    async fn stops_at_last_page_without_truncation() {
        let source = FakeSource::new(250, 100, false);
        let mut seen = 0;
        let walk = walk_pages(&source, &spec(), 1000, |s| seen += s.len()).await.unwrap();
        assert_eq!(seen, 250);
        assert_eq!(walk.pages, 3);
        assert!(!walk.truncated);
        assert_eq!(walk.upstream_total, Some(250));
        assert!(walk.next_page_token.is_none());
    }

    #[tokio::test]
    async fn cap_truncates_and_shrinks_last_request() {
        let source = FakeSource::new(5000, 400, false);
        let walk = walk_pages(&source, &spec(), 1000, |_| {}).await.unwrap();
        assert_eq!(walk.records, 1000);
        assert!(walk.truncated);
        assert_eq!(walk.next_page_token.as_deref(), Some("1000"));
        let sizes: Vec<u32> = source.requests().into_iter().map(|(_, size)| size).collect();
        assert_eq!(sizes, vec![1000, 600, 200]);
    }

    #[tokio::test]
    async fn oversized_pages_are_clipped_to_the_cap() {
        let source = FakeSource::new(5000, 300, true);
        let mut spec = spec();
        spec.page.size = 100;
        let walk = walk_pages(&source, &spec, 250, |_| {}).await.unwrap();
        assert_eq!(walk.records, 250);
        assert_eq!(walk.pages, 1);
        assert!(walk.truncated);
    }

    #[tokio::test]
    async fn exact_fit_is_not_truncated() {
        let source = FakeSource::new(200, 100, false);
        let walk = walk_pages(&source, &spec(), 200, |_| {}).await.unwrap();
        assert_eq!(walk.records, 200);
        assert!(!walk.truncated);
    }

    #[tokio::test]
    async fn empty_first_page_ends_walk() {
        let source = FakeSource::new(0, 100, false);
        let walk = walk_pages(&source, &spec(), 1000, |_| {}).await.unwrap();
        assert_eq!(walk.pages, 1);
        assert_eq!(walk.records, 0);
    }

    #[tokio::test]
    async fn stream_is_lazy() {
        let source = FakeSource::new(5000, 100, false);
        let spec = spec();
        let pages = page_stream(&source, &spec, 1000);
        futures::pin_mut!(pages);
        pages.try_next().await.unwrap();
        assert_eq!(source.requests().len(), 1);
    }
}
