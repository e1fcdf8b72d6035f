use tabled::Table;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{self, Config},
    error,
    harvest::{HarvestOutcome, Harvester},
    info,
    management::{SnapshotManager, Written},
    success,
    types::SnapshotTableRow,
    warning,
};

use super::{load_token_manager, spinner};

/// Harvests the stored user's listening data into a new snapshot.
///
/// The stored session is refreshed ahead of expiry, and whatever the
/// harvest did to it (a refresh mid-run) is written back. Ctrl-C cancels
/// the run between two upstream calls.
pub async fn harvest(config: &Config, show: usize) {
    let harvester = match Harvester::new(config) {
        Ok(h) => h,
        Err(e) => error!("Failed to set up the API client: {}", e),
    };

    let mut manager = load_token_manager().await;
    if let Err(e) = manager.ensure_fresh(harvester.guard().refresher()).await {
        if let Err(clear) = manager.clear().await {
            warning!("Failed to remove expired session: {}", clear);
        }
        error!("Session could not be refreshed: {}\nRun harvestify auth.", e);
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut session = manager.session().clone();
    let pb = spinner("Harvesting listening data...");
    let result = harvester.harvest(&mut session, &cancel).await;
    pb.finish_and_clear();

    if session.is_authenticated() {
        if let Err(e) = manager.update(session).await {
            warning!("Failed to save refreshed session: {}", e);
        }
    } else if let Err(e) = manager.clear().await {
        warning!("Failed to remove expired session: {}", e);
    }

    let outcome: HarvestOutcome = match result {
        Ok(outcome) => outcome,
        Err(e) if e.requires_reauth() => error!("{}\nRun harvestify auth.", e),
        Err(e) => error!("Harvest failed: {}", e),
    };

    let snapshot = &outcome.snapshot;
    let rows: Vec<SnapshotTableRow> = snapshot
        .tracks
        .iter()
        .take(show)
        .map(|t| SnapshotTableRow {
            name: t.name.clone(),
            artists: t.artists.clone(),
            genres: t.genres.split(", ").take(3).collect::<Vec<_>>().join(","),
        })
        .collect();
    if !rows.is_empty() {
        println!("{}", Table::new(rows));
    }

    info!(
        "{} top tracks, {} saved tracks",
        snapshot.tracks.len(),
        snapshot.saved_track_ids.len()
    );
    let coverage = &snapshot.coverage;
    if coverage.is_partial() {
        warning!(
            "Partial data: genres for {}/{} artists, audio features for {}/{} tracks{}",
            coverage.artists_resolved,
            coverage.artists_requested,
            coverage.features_resolved,
            coverage.features_requested,
            if coverage.saved_tracks_complete {
                ""
            } else {
                ", saved tracks incomplete"
            }
        );
    }

    let snapshots = SnapshotManager::new(config.snapshot_dir.clone());
    let recovery = SnapshotManager::new(config::data_dir().join("recovered"));
    match snapshots.write_or_recover(snapshot, &recovery).await {
        Ok(Written::Primary(handle)) => {
            success!("Snapshot written to {}", handle.path.display())
        }
        Ok(Written::Recovered { handle, error }) => error!(
            "Failed to write snapshot to {}: {}\nIt was saved to {} instead.",
            snapshots.dir().display(),
            error,
            handle.path.display()
        ),
        Err(e) => {
            // stdout is the last place left for the data
            if let Ok(json) = serde_json::to_string_pretty(snapshot) {
                println!("{json}");
            }
            error!("Failed to write snapshot: {}", e)
        }
    }
}
