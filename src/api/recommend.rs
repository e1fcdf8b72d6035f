use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{HarvestError, PersistenceError},
    management::{SnapshotHandle, SnapshotRef},
};

use super::{ApiError, AppState, cookies, sync_session};

#[derive(Debug, Deserialize)]
pub struct RunParams {
    snapshot: Option<String>,
}

/// Runs the recommendation engine on a snapshot and resolves its picks.
pub async fn run_algorithm(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<RunParams>,
) -> Response {
    let reference = SnapshotRef::from_query(params.snapshot);
    let handle = match snapshot_handle(&state, &reference).await {
        Ok(handle) => handle,
        Err(err) => return (jar, err).into_response(),
    };

    let ids = match state.recommender.run(&handle.path).await {
        Ok(ids) => ids,
        Err(err) => {
            tracing::warn!(error = %err, snapshot = %handle.file_name(), "recommender failed");
            return (jar, ApiError::from(HarvestError::from(err))).into_response();
        }
    };
    if ids.is_empty() {
        return (jar, ApiError::NotFound("No recommendations available")).into_response();
    }

    let shared = state.session_for(&jar).await;
    let mut session = shared.lock().await;
    let before = session.clone();

    let cancel = CancellationToken::new();
    let result = state
        .harvester
        .resolve_tracks(&mut session, &ids, &cancel)
        .await;

    // catalog lookups don't probe the user, so only a refresh registers it
    let jar = sync_session(&state, jar, &shared, &before, &session, false).await;
    drop(session);

    match result {
        Ok(tracks) if tracks.is_empty() => {
            (jar, ApiError::NotFound("No recommendations available")).into_response()
        }
        Ok(tracks) => (jar, Json(json!({ "recommendedTracks": tracks }))).into_response(),
        Err(err) if err.requires_reauth() => {
            (cookies::clear_session(jar), Redirect::to("/login")).into_response()
        }
        Err(err) => (jar, ApiError::from(err)).into_response(),
    }
}

/// Resolves the snapshot to read. When nothing is on disk yet but a harvest
/// result is cached in memory, that result is written out first.
async fn snapshot_handle(
    state: &AppState,
    reference: &SnapshotRef,
) -> Result<SnapshotHandle, ApiError> {
    match state.snapshots.resolve(reference).await {
        Ok(handle) => Ok(handle),
        Err(PersistenceError::NoSnapshot(dir)) => {
            let cached = state.last_snapshot.lock().await.clone();
            match cached {
                Some(snapshot) => Ok(state.snapshots.write(&snapshot).await?),
                None => Err(PersistenceError::NoSnapshot(dir).into()),
            }
        }
        Err(err) => Err(err.into()),
    }
}
