use chrono::Utc;

use crate::{
    config::Config,
    info,
    management::{SnapshotManager, TokenManager},
    warning,
};

/// Shows the stored session and the snapshots on disk.
pub async fn info(config: &Config, session: bool, snapshots: bool) {
    let all = !session && !snapshots;

    if session || all {
        match TokenManager::load().await {
            Ok(manager) => {
                let s = manager.session();
                let now = Utc::now();
                info!("Session file: {}", manager.path().display());
                info!("Scopes: {}", s.scopes.iter().cloned().collect::<Vec<_>>().join(" "));
                if s.is_expiring(now) {
                    warning!("Access token expired or expiring, it is refreshed on next use.");
                } else {
                    info!("Access token valid for {} more seconds.", s.remaining_secs(now));
                }
                if !s.has_refresh_token() {
                    warning!("No refresh token stored; run harvestify auth when it expires.");
                }
            }
            Err(_) => warning!("Not logged in. Run harvestify auth."),
        }
    }

    if snapshots || all {
        let manager = SnapshotManager::new(config.snapshot_dir.clone());
        match manager.list().await {
            Ok(handles) if handles.is_empty() => {
                warning!("No snapshots in {}.", manager.dir().display())
            }
            Ok(handles) => {
                info!("{} snapshots in {}", handles.len(), manager.dir().display());
                for handle in handles.iter().take(5) {
                    info!("{}  {}", handle.created_at.format("%Y-%m-%d %H:%M:%S"), handle.file_name());
                }
            }
            Err(e) => warning!("Failed to list snapshots: {}", e),
        }
    }
}
