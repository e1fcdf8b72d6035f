use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    error::HarvestError,
    types::{Coverage, UserProfile},
};

use super::{ApiError, AppState, cookies, sync_session};

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub user_id: String,
    pub display_name: Option<String>,
    pub track_count: usize,
    pub saved_track_count: usize,
    pub coverage: Coverage,
    pub partial: bool,
    pub snapshot: String,
}

/// Harvests the cookie user's data and writes a new snapshot.
pub async fn dashboard(State(state): State<AppState>, jar: CookieJar) -> Response {
    let shared = state.session_for(&jar).await;
    let mut session = shared.lock().await;
    let before = session.clone();

    let cancel = CancellationToken::new();
    let result = state.harvester.harvest(&mut session, &cancel).await;

    let jar = sync_session(&state, jar, &shared, &before, &session, result.is_ok()).await;
    drop(session);

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) if err.requires_reauth() => {
            tracing::info!(error = %err, "harvest needs re-authorization");
            return (cookies::clear_session(jar), Redirect::to("/login")).into_response();
        }
        Err(err) => return (jar, ApiError::from(err)).into_response(),
    };

    *state.last_snapshot.lock().await = Some(outcome.snapshot.clone());

    let handle = match state.snapshots.write(&outcome.snapshot).await {
        Ok(handle) => handle,
        Err(err) => {
            tracing::error!(error = %err, "snapshot kept in memory only");
            return (jar, ApiError::from(HarvestError::from(err))).into_response();
        }
    };

    let snapshot = &outcome.snapshot;
    let summary = DashboardSummary {
        user_id: outcome.profile.id.clone(),
        display_name: outcome.profile.display_name.clone(),
        track_count: snapshot.tracks.len(),
        saved_track_count: snapshot.saved_track_ids.len(),
        partial: snapshot.coverage.is_partial(),
        coverage: snapshot.coverage.clone(),
        snapshot: handle.file_name(),
    };
    (jar, Json(summary)).into_response()
}

pub async fn me(State(state): State<AppState>, jar: CookieJar) -> Response {
    let shared = state.session_for(&jar).await;
    let mut session = shared.lock().await;
    let before = session.clone();

    let result: Result<UserProfile, HarvestError> = state.harvester.guard().ensure(&mut session).await;

    let jar = sync_session(&state, jar, &shared, &before, &session, result.is_ok()).await;
    drop(session);

    match result {
        Ok(profile) => (jar, Json(profile)).into_response(),
        Err(err) => (jar, ApiError::from(err)).into_response(),
    }
}
