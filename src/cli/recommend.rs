use tabled::Table;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error,
    harvest::{Harvester, Session},
    info,
    management::{SnapshotManager, SnapshotRef, TokenManager},
    recommend::Recommender,
    success,
    types::RecommendationTableRow,
    warning,
};

use super::spinner;

/// Runs the recommendation engine on a snapshot and prints the picks.
///
/// Resolving the picked IDs works without a stored session; the catalog
/// lookups then use an application token.
pub async fn recommend(config: &Config, snapshot: Option<String>) {
    let snapshots = SnapshotManager::new(config.snapshot_dir.clone());
    let handle = match snapshots.resolve(&SnapshotRef::from_query(snapshot)).await {
        Ok(handle) => handle,
        Err(e) => error!("No snapshot to work with: {}\nRun harvestify harvest.", e),
    };
    info!("Using snapshot {}", handle.file_name());

    let pb = spinner("Running recommendation engine...");
    let ids = match Recommender::from_config(config).run(&handle.path).await {
        Ok(ids) => ids,
        Err(e) => {
            pb.finish_and_clear();
            error!("Recommendation engine failed: {}", e)
        }
    };
    if ids.is_empty() {
        pb.finish_and_clear();
        warning!("No recommendations available.");
        return;
    }

    let harvester = match Harvester::new(config) {
        Ok(h) => h,
        Err(e) => error!("Failed to set up the API client: {}", e),
    };
    let mut session = match TokenManager::load().await {
        Ok(manager) => manager.session().clone(),
        Err(_) => Session::default(),
    };

    pb.set_message(format!("Resolving {} tracks...", ids.len()));
    let result = harvester
        .resolve_tracks(&mut session, &ids, &CancellationToken::new())
        .await;
    pb.finish_and_clear();

    let tracks = match result {
        Ok(tracks) => tracks,
        Err(e) => error!("Failed to resolve recommended tracks: {}", e),
    };
    if tracks.is_empty() {
        warning!("No recommendations available.");
        return;
    }

    let rows: Vec<RecommendationTableRow> = tracks
        .iter()
        .map(|t| RecommendationTableRow {
            name: t.name.clone(),
            artist: t.artist.clone(),
            id: t.id.clone(),
        })
        .collect();
    println!("{}", Table::new(rows));
    success!("{} recommendations", tracks.len());
}
