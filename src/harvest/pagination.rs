use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{FetchError, HarvestError},
    spotify::SpotifyClient,
    types::Page,
};

use super::{guard::AuthGuard, pacer::Pacer, session::Session};

/// All items of a cursor-paginated collection, in provider order.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedCollection<T> {
    pub items: Vec<T>,
    /// Requests that produced a page.
    pub pages: usize,
    /// False when the walk stopped before the provider's last page.
    pub complete: bool,
}

/// Follows `next` cursors of a full-collection endpoint until exhausted.
///
/// [`PaginationWalker::next_page`] hands out one page at a time, for
/// callers that want to stream pages instead of buffering the collection;
/// [`PaginationWalker::collect`] keeps everything resident.
pub struct PaginationWalker<'a, T> {
    client: &'a SpotifyClient,
    guard: &'a AuthGuard,
    cancel: &'a CancellationToken,
    next: Option<String>,
    pages: usize,
    max_pages: usize,
    truncated: bool,
    _item: PhantomData<T>,
}

impl<'a, T: DeserializeOwned> PaginationWalker<'a, T> {
    pub fn new(
        client: &'a SpotifyClient,
        guard: &'a AuthGuard,
        cancel: &'a CancellationToken,
        start_url: String,
        max_pages: usize,
    ) -> Self {
        Self {
            client,
            guard,
            cancel,
            next: Some(start_url),
            pages: 0,
            max_pages,
            truncated: false,
            _item: PhantomData,
        }
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Fetches the next page, or `None` once the cursor is exhausted.
    pub async fn next_page(
        &mut self,
        session: &mut Session,
        pacer: &mut Pacer,
    ) -> Result<Option<Vec<T>>, HarvestError> {
        let Some(url) = self.next.clone() else {
            return Ok(None);
        };
        if self.pages >= self.max_pages {
            tracing::warn!(pages = self.pages, "page limit reached, stopping walk");
            self.truncated = true;
            self.next = None;
            return Ok(None);
        }

        tokio::select! {
            _ = self.cancel.cancelled() => return Err(FetchError::Cancelled.into()),
            _ = pacer.wait() => {}
        }

        let client = self.client;
        let url = url.as_str();
        let page: Page<T> = self
            .guard
            .with_refresh(session, move |token| async move {
                client.get_json(url, &[], &token).await
            })
            .await?;

        self.pages += 1;
        self.next = page.next.filter(|n| !n.is_empty());
        tracing::debug!(page = self.pages, items = page.items.len(), "page fetched");
        Ok(Some(page.items))
    }

    /// Walks every page and concatenates the items.
    ///
    /// A failure on the first page is an error. A failure on a later page
    /// ends the walk with what was gathered so far and `complete = false`.
    pub async fn collect(
        mut self,
        session: &mut Session,
        pacer: &mut Pacer,
    ) -> Result<PaginatedCollection<T>, HarvestError> {
        let mut items = Vec::new();
        let mut complete = true;

        loop {
            match self.next_page(session, pacer).await {
                Ok(Some(page)) => items.extend(page),
                Ok(None) => break,
                Err(HarvestError::Upstream(err)) if self.pages > 0 => {
                    tracing::warn!(
                        pages = self.pages,
                        error = %err,
                        "page failed, keeping partial collection"
                    );
                    complete = false;
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(PaginatedCollection {
            items,
            pages: self.pages,
            complete: complete && !self.truncated,
        })
    }
}
