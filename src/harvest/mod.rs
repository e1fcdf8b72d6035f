//! # Harvest Engine
//!
//! Keeps a user's token pair valid across a multi-call harvest and pulls
//! listening data from the provider without letting one bad batch sink the
//! whole run.
//!
//! ```text
//! AuthGuard ── probe /me, refresh once ──┐
//!                                        ↓
//! Harvester ── top tracks ── PaginationWalker (saved tracks)
//!          └── BatchFetcher (artists, audio features)
//!                 ├── FallbackEscalator  UserToken → ClientCredentials → PerItem
//!                 └── Pacer              fixed gap between calls
//! ```
//!
//! All calls are sequential. The [`Session`] is passed down explicitly as
//! `&mut`, so whoever holds the [`SharedSession`] lock is the only writer.
//! The whole run is bounded by a deadline and a [`CancellationToken`].

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error::{FetchError, HarvestError, UpstreamError},
    spotify::{SpotifyClient, auth::TokenRefresher},
    types::{Artist, AudioFeatures, Coverage, RecommendedTrack, SavedTrack, Snapshot, SnapshotTrack, Track, UserProfile},
    utils,
};

pub mod batch;
pub mod escalator;
pub mod guard;
pub mod pacer;
pub mod pagination;
pub mod session;

pub use batch::{BatchFetcher, FetchRequest, FetchResult, Resolved, Unresolved};
pub use escalator::{Acquire, FallbackEscalator, Tier};
pub use guard::{AuthGuard, AuthState};
pub use pacer::Pacer;
pub use pagination::{PaginatedCollection, PaginationWalker};
pub use session::{Session, SessionRegistry, SharedSession};

/// Tuning knobs of a harvest run.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub batch_size: usize,
    pub pacer_interval: Duration,
    pub deadline: Duration,
    pub max_pages: usize,
}

impl From<&Config> for HarvestSettings {
    fn from(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size,
            pacer_interval: config.pacer_interval,
            deadline: config.harvest_deadline,
            max_pages: config.max_pages,
        }
    }
}

/// What a successful harvest produced.
#[derive(Debug, Clone)]
pub struct HarvestOutcome {
    pub profile: UserProfile,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone)]
pub struct Harvester {
    client: SpotifyClient,
    guard: AuthGuard,
    settings: HarvestSettings,
}

impl Harvester {
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        let client = SpotifyClient::new(config)?;
        let refresher = TokenRefresher::new(client.http().clone(), config);
        let guard = AuthGuard::new(client.clone(), refresher);
        Ok(Self::from_parts(client, guard, HarvestSettings::from(config)))
    }

    pub fn from_parts(client: SpotifyClient, guard: AuthGuard, settings: HarvestSettings) -> Self {
        Self {
            client,
            guard,
            settings,
        }
    }

    pub fn guard(&self) -> &AuthGuard {
        &self.guard
    }

    pub fn client(&self) -> &SpotifyClient {
        &self.client
    }

    pub fn settings(&self) -> &HarvestSettings {
        &self.settings
    }

    /// Runs one full harvest for the session's user.
    ///
    /// Exceeding the deadline cancels `cancel` and fails with
    /// [`FetchError::DeadlineExceeded`].
    pub async fn harvest(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<HarvestOutcome, HarvestError> {
        let deadline = self.settings.deadline;
        match tokio::time::timeout(deadline, self.run(session, cancel)).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                tracing::warn!(?deadline, "harvest deadline exceeded");
                Err(FetchError::DeadlineExceeded(deadline).into())
            }
        }
    }

    async fn run(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<HarvestOutcome, HarvestError> {
        let profile = self.guard.ensure(session).await?;
        tracing::info!(user = %profile.id, "harvest started");

        let mut pacer = Pacer::new(self.settings.pacer_interval);

        let client = &self.client;
        let top: Vec<Track> = self
            .guard
            .with_refresh(session, move |token| async move { client.top_tracks(&token).await })
            .await?;
        if top.is_empty() {
            tracing::warn!(user = %profile.id, "provider returned no top tracks");
            return Err(FetchError::NoDataAvailable.into());
        }

        let saved = PaginationWalker::<SavedTrack>::new(
            &self.client,
            &self.guard,
            cancel,
            self.client.saved_tracks_url(),
            self.settings.max_pages,
        )
        .collect(session, &mut pacer)
        .await?;
        let saved_track_ids: Vec<String> = saved
            .items
            .into_iter()
            .filter_map(|s| s.track.map(|t| t.id))
            .collect();

        let artist_ids = utils::dedup_preserving_order(
            top.iter().flat_map(|t| t.artists.iter().map(|a| a.id.clone())),
        );
        let track_ids: Vec<String> = top.iter().map(|t| t.id.clone()).collect();

        let artists: FetchResult<Artist> = self
            .enrich(&artist_ids, session, &mut pacer, cancel)
            .await?;
        let features: FetchResult<AudioFeatures> = self
            .enrich(&track_ids, session, &mut pacer, cancel)
            .await?;

        let coverage = Coverage {
            artists_requested: artist_ids.len(),
            artists_resolved: artists.len(),
            features_requested: track_ids.len(),
            features_resolved: features.len(),
            saved_tracks_complete: saved.complete,
        };
        let tracks = assemble_tracks(&top, &artists, &features);
        tracing::info!(
            user = %profile.id,
            tracks = tracks.len(),
            saved = saved_track_ids.len(),
            partial = coverage.is_partial(),
            "harvest finished"
        );

        Ok(HarvestOutcome {
            snapshot: Snapshot {
                generated_at: Utc::now(),
                user_id: profile.id.clone(),
                tracks,
                saved_track_ids,
                coverage,
            },
            profile,
        })
    }

    /// Batch-resolves IDs for enrichment. An exhausted fetch degrades to an
    /// all-unresolved result rather than failing the harvest.
    async fn enrich<T: crate::spotify::catalog::BatchResource>(
        &self,
        ids: &[String],
        session: &mut Session,
        pacer: &mut Pacer,
        cancel: &CancellationToken,
    ) -> Result<FetchResult<T>, HarvestError> {
        let request = FetchRequest::new(ids.to_vec(), self.settings.batch_size);
        let mut escalator = FallbackEscalator::new();
        let fetcher = BatchFetcher::new(&self.client, &self.guard, cancel);

        match fetcher.fetch::<T>(&request, session, &mut escalator, pacer).await {
            Ok(result) => Ok(result),
            Err(HarvestError::Fetch(FetchError::NoDataAvailable)) => {
                tracing::warn!(
                    resource = T::COLLECTION,
                    "enrichment unavailable, continuing without it"
                );
                Ok(FetchResult::unresolved_all(ids, "no data available"))
            }
            Err(err) => Err(err),
        }
    }

    /// Resolves recommended IDs into displayable tracks.
    ///
    /// Works without a logged-in user: an unauthenticated session simply
    /// starts the escalation at the application token.
    pub async fn resolve_tracks(
        &self,
        session: &mut Session,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<RecommendedTrack>, HarvestError> {
        let request = FetchRequest::new(ids.to_vec(), self.settings.batch_size);
        let mut escalator = FallbackEscalator::new();
        let mut pacer = Pacer::new(self.settings.pacer_interval);
        let fetcher = BatchFetcher::new(&self.client, &self.guard, cancel);

        let tracks: FetchResult<Track> = fetcher
            .fetch(&request, session, &mut escalator, &mut pacer)
            .await?;

        Ok(tracks
            .iter()
            .map(|(_, resolved)| RecommendedTrack {
                id: resolved.item.id.clone(),
                name: resolved.item.name.clone(),
                artist: join_artist_names(&resolved.item),
                album_image: resolved.item.album.images.first().map(|i| i.url.clone()),
            })
            .collect())
    }
}

fn join_artist_names(track: &Track) -> String {
    track
        .artists
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn assemble_tracks(
    top: &[Track],
    artists: &FetchResult<Artist>,
    features: &FetchResult<AudioFeatures>,
) -> Vec<SnapshotTrack> {
    top.iter()
        .map(|track| {
            let genres = track
                .artists
                .iter()
                .filter_map(|a| artists.get(&a.id))
                .flat_map(|a| a.genres.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(", ");

            SnapshotTrack {
                id: track.id.clone(),
                name: track.name.clone(),
                artists: join_artist_names(track),
                album: track.album.name.clone(),
                popularity: track.popularity,
                genres,
                duration_ms: track.duration_ms,
                audio_features: features.get(&track.id).cloned(),
            }
        })
        .collect()
}
