use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::{
    config::PROVIDER_MAX_BATCH,
    error::{FetchError, HarvestError, UpstreamError},
    spotify::{SpotifyClient, catalog::BatchResource},
};

use super::{
    escalator::{FallbackEscalator, Tier},
    guard::AuthGuard,
    pacer::Pacer,
    session::Session,
};

/// IDs to resolve and the chunk size to resolve them in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub resource_ids: Vec<String>,
    pub batch_size: usize,
}

impl FetchRequest {
    /// `batch_size` is clamped to `1..=PROVIDER_MAX_BATCH`.
    pub fn new(resource_ids: Vec<String>, batch_size: usize) -> Self {
        Self {
            resource_ids,
            batch_size: batch_size.clamp(1, PROVIDER_MAX_BATCH),
        }
    }

    pub fn chunks(&self) -> std::slice::Chunks<'_, String> {
        self.resource_ids.chunks(self.batch_size)
    }

    pub fn chunk_count(&self) -> usize {
        self.resource_ids.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.resource_ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub item: T,
    pub tier: Tier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub id: String,
    pub reason: String,
}

/// Items resolved by one fetch operation.
///
/// Entries keep request order. A result covering fewer IDs than requested
/// is still a success; [`FetchResult::is_partial`] reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult<T> {
    entries: Vec<(String, Resolved<T>)>,
    index: HashMap<String, usize>,
    unresolved: Vec<Unresolved>,
    calls: usize,
}

impl<T> Default for FetchResult<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            unresolved: Vec::new(),
            calls: 0,
        }
    }
}

impl<T> FetchResult<T> {
    /// A result in which every requested ID is unresolved.
    pub fn unresolved_all(ids: &[String], reason: &str) -> Self {
        let mut result = Self::default();
        for id in ids {
            result.unresolve(id, reason);
        }
        result
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.index.get(id).map(|&i| &self.entries[i].1.item)
    }

    pub fn tier_of(&self, id: &str) -> Option<Tier> {
        self.index.get(id).map(|&i| self.entries[i].1.tier)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Resolved<T>)> {
        self.entries.iter().map(|(id, r)| (id.as_str(), r))
    }

    /// `(id, tier)` pairs in resolution order.
    pub fn tiers(&self) -> Vec<(String, Tier)> {
        self.entries
            .iter()
            .map(|(id, r)| (id.clone(), r.tier))
            .collect()
    }

    pub fn unresolved(&self) -> &[Unresolved] {
        &self.unresolved
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        !self.unresolved.is_empty()
    }

    /// Number of upstream requests the operation issued.
    pub fn calls(&self) -> usize {
        self.calls
    }

    fn insert(&mut self, id: String, item: T, tier: Tier) {
        if self.index.contains_key(&id) {
            return;
        }
        self.index.insert(id.clone(), self.entries.len());
        self.entries.push((id, Resolved { item, tier }));
    }

    fn unresolve(&mut self, id: &str, reason: &str) {
        if self.index.contains_key(id) || self.unresolved.iter().any(|u| u.id == id) {
            return;
        }
        self.unresolved.push(Unresolved {
            id: id.to_string(),
            reason: reason.to_string(),
        });
    }
}

impl<T: BatchResource> FetchResult<T> {
    /// Merges one successful batch response. `null` slots and IDs missing
    /// from the response are recorded as unresolved.
    fn merge_batch(&mut self, chunk: &[String], items: Vec<Option<T>>, tier: Tier) {
        let mut found: HashMap<String, T> = items
            .into_iter()
            .flatten()
            .map(|item| (item.id().to_string(), item))
            .collect();

        for id in chunk {
            match found.remove(id) {
                Some(item) => self.insert(id.clone(), item, tier),
                None => {
                    tracing::debug!(%id, %tier, "id not found upstream");
                    self.unresolve(id, "not found");
                }
            }
        }
    }
}

/// Position of the chunk walk: which chunk is next and whether the one
/// allowed mid-walk token refresh was spent.
#[derive(Debug, Default)]
struct WalkState {
    chunk: usize,
    refreshed: bool,
}

/// Resolves ID collections against a batch endpoint, one chunk at a time.
pub struct BatchFetcher<'a> {
    client: &'a SpotifyClient,
    guard: &'a AuthGuard,
    cancel: &'a CancellationToken,
}

impl<'a> BatchFetcher<'a> {
    pub fn new(
        client: &'a SpotifyClient,
        guard: &'a AuthGuard,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            client,
            guard,
            cancel,
        }
    }

    /// Walks the request chunk by chunk.
    ///
    /// A failed chunk escalates the tier and is re-issued; it is never
    /// skipped. At [`Tier::PerItem`] every ID is requested alone and IDs
    /// that still fail are recorded as unresolved. The operation only fails
    /// with [`FetchError::NoDataAvailable`] when escalation is exhausted and
    /// nothing at all was resolved.
    pub async fn fetch<T: BatchResource>(
        &self,
        request: &FetchRequest,
        session: &mut Session,
        escalator: &mut FallbackEscalator,
        pacer: &mut Pacer,
    ) -> Result<FetchResult<T>, HarvestError> {
        let chunks: Vec<&[String]> = request.chunks().collect();
        let mut result = FetchResult::default();
        let mut state = WalkState::default();

        while state.chunk < chunks.len() {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled.into());
            }

            let chunk = chunks[state.chunk];
            let tier = escalator.tier();
            let token = match escalator.credential(session, self.guard.refresher()).await {
                Ok(token) => token,
                Err(err) => {
                    tracing::warn!(%tier, error = %err, "no credential for tier");
                    if escalator.is_terminal() {
                        for id in chunks[state.chunk..].iter().flat_map(|c| c.iter()) {
                            result.unresolve(id, "no credential available");
                        }
                        break;
                    }
                    escalator.advance();
                    continue;
                }
            };

            if tier == Tier::PerItem {
                self.fetch_each(chunk, &token, pacer, &mut result).await?;
                state.chunk += 1;
                continue;
            }

            self.paced(pacer).await?;
            result.calls += 1;
            match self.client.get_batch::<T>(chunk, &token).await {
                Ok(items) => {
                    tracing::debug!(chunk = state.chunk, %tier, size = chunk.len(), "chunk resolved");
                    result.merge_batch(chunk, items, tier);
                    state.chunk += 1;
                }
                Err(UpstreamError::Unauthorized) if tier == Tier::UserToken && !state.refreshed => {
                    state.refreshed = true;
                    self.guard.refresh(session).await?;
                }
                Err(err) => {
                    if let UpstreamError::RateLimited {
                        retry_after: Some(delay),
                    } = err
                    {
                        pacer.penalize(delay);
                    }
                    let (next, _) = escalator.advance();
                    tracing::warn!(
                        chunk = state.chunk,
                        %tier,
                        %next,
                        error = %err,
                        "chunk failed, re-issuing at next tier"
                    );
                }
            }
        }

        if result.is_empty() && !request.is_empty() && escalator.is_exhausted() {
            return Err(FetchError::NoDataAvailable.into());
        }
        if result.is_partial() {
            tracing::info!(
                resolved = result.len(),
                unresolved = result.unresolved().len(),
                "fetch finished with partial coverage"
            );
        }
        Ok(result)
    }

    async fn fetch_each<T: BatchResource>(
        &self,
        chunk: &[String],
        token: &str,
        pacer: &mut Pacer,
        result: &mut FetchResult<T>,
    ) -> Result<(), FetchError> {
        for id in chunk {
            self.paced(pacer).await?;
            result.calls += 1;
            match self.client.get_one::<T>(id, token).await {
                Ok(item) => result.insert(id.clone(), item, Tier::PerItem),
                Err(err) => {
                    if let UpstreamError::RateLimited {
                        retry_after: Some(delay),
                    } = err
                    {
                        pacer.penalize(delay);
                    }
                    tracing::warn!(%id, error = %err, "item unresolved at per-item tier");
                    result.unresolve(id, &err.to_string());
                }
            }
        }
        Ok(())
    }

    async fn paced(&self, pacer: &mut Pacer) -> Result<(), FetchError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            _ = pacer.wait() => Ok(()),
        }
    }
}
