/// Paginated walk over a pool's finalized bundles.
///
/// Pages are fetched strictly in order: the cursor returned with page N is
/// the only way to request page N+1, so no page is ever skipped. A walk can
/// be resumed from any cursor observed earlier.
use futures::stream::{self, Stream};
use tracing::debug;
use types::{BundlePage, FinalizedBundle, PageCursor};

use crate::client::Registry;
use crate::error::ArchiveError;

pub struct BundleIndex<'a, R: ?Sized> {
    registry: &'a R,
    pool_id: u64,
    page_limit: u32,
    cursor: Option<PageCursor>,
    exhausted: bool,
    pages_fetched: usize,
}

impl<'a, R: Registry + ?Sized> BundleIndex<'a, R> {
    pub fn new(registry: &'a R, pool_id: u64, page_limit: u32) -> Self {
        Self {
            registry,
            pool_id,
            page_limit: page_limit.max(1),
            cursor: None,
            exhausted: false,
            pages_fetched: 0,
        }
    }

    /// Continue a walk from a cursor returned by an earlier page.
    pub fn resume_from(registry: &'a R, pool_id: u64, page_limit: u32, cursor: PageCursor) -> Self {
        Self {
            cursor: Some(cursor),
            ..Self::new(registry, pool_id, page_limit)
        }
    }

    /// Cursor the next call to `next_page` will use.
    pub fn cursor(&self) -> Option<&PageCursor> {
        self.cursor.as_ref()
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetch the next page, or `None` once the registry reported no further
    /// cursor.
    pub async fn next_page(&mut self) -> Result<Option<BundlePage>, ArchiveError> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .registry
            .finalized_bundles(self.pool_id, self.page_limit, self.cursor.as_ref())
            .await?;
        self.pages_fetched += 1;

        debug!(
            pool_id = self.pool_id,
            page = self.pages_fetched,
            bundles = page.bundles.len(),
            last = page.next.is_none(),
            "Fetched bundle index page"
        );

        match &page.next {
            Some(next) => self.cursor = Some(next.clone()),
            None => self.exhausted = true,
        }

        Ok(Some(page))
    }

    /// The remaining pages as a stream.
    pub fn into_pages(self) -> impl Stream<Item = Result<BundlePage, ArchiveError>> + 'a
    where
        R: 'a,
    {
        stream::try_unfold(self, |mut index| async move {
            let page = index.next_page().await?;
            Ok::<_, ArchiveError>(page.map(|page| (page, index)))
        })
    }

    /// Walk to the end of the index and return every bundle.
    pub async fn collect_all(mut self) -> Result<Vec<FinalizedBundle>, ArchiveError> {
        let mut bundles = Vec::new();
        while let Some(page) = self.next_page().await? {
            bundles.extend(page.bundles);
        }
        Ok(bundles)
    }
}
