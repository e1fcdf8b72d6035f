use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use chrono::{DateTime, Utc};

use crate::{error::PersistenceError, types::Snapshot, utils};

/// Which snapshot a recommendation run should read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotRef {
    /// Most recently modified snapshot in the directory.
    Latest,
    /// A file name inside the snapshot directory.
    Named(String),
}

impl SnapshotRef {
    pub fn from_query(name: Option<String>) -> Self {
        match name.filter(|n| !n.trim().is_empty()) {
            Some(name) => SnapshotRef::Named(name),
            None => SnapshotRef::Latest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHandle {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl SnapshotHandle {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Where [`SnapshotManager::write_or_recover`] put a snapshot.
#[derive(Debug)]
pub enum Written {
    Primary(SnapshotHandle),
    /// The managed directory failed with `error`; the snapshot went to the
    /// recovery directory instead.
    Recovered {
        handle: SnapshotHandle,
        error: PersistenceError,
    },
}

/// Writes and finds harvest snapshots in one directory.
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    dir: PathBuf,
}

impl SnapshotManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the snapshot as `top_tracks_<millis>.json`.
    pub async fn write(&self, snapshot: &Snapshot) -> Result<SnapshotHandle, PersistenceError> {
        async_fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| io_error(&self.dir, source))?;

        let created_at = snapshot.generated_at;
        let path = self.dir.join(utils::snapshot_file_name(created_at));
        let json = serde_json::to_string_pretty(snapshot)?;
        async_fs::write(&path, json)
            .await
            .map_err(|source| io_error(&path, source))?;

        tracing::info!(path = %path.display(), tracks = snapshot.tracks.len(), "snapshot written");
        Ok(SnapshotHandle { path, created_at })
    }

    /// Writes the snapshot, falling back to `recovery` when the managed
    /// directory can't be written. Fails only when both writes fail, with
    /// the error of the managed directory.
    pub async fn write_or_recover(
        &self,
        snapshot: &Snapshot,
        recovery: &SnapshotManager,
    ) -> Result<Written, PersistenceError> {
        let error = match self.write(snapshot).await {
            Ok(handle) => return Ok(Written::Primary(handle)),
            Err(error) => error,
        };
        tracing::warn!(dir = %self.dir.display(), error = %error, "snapshot write failed, trying recovery dir");

        match recovery.write(snapshot).await {
            Ok(handle) => Ok(Written::Recovered { handle, error }),
            Err(recovery_error) => {
                tracing::error!(error = %recovery_error, "recovery write failed too");
                Err(error)
            }
        }
    }

    pub async fn resolve(&self, reference: &SnapshotRef) -> Result<SnapshotHandle, PersistenceError> {
        match reference {
            SnapshotRef::Named(name) => self.named(name).await,
            SnapshotRef::Latest => self
                .list()
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| PersistenceError::NoSnapshot(self.dir.clone())),
        }
    }

    pub async fn load(&self, handle: &SnapshotHandle) -> Result<Snapshot, PersistenceError> {
        let content = async_fs::read_to_string(&handle.path)
            .await
            .map_err(|source| io_error(&handle.path, source))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Snapshots in the directory, newest first (ties broken by file name).
    ///
    /// A missing directory just means nothing was harvested yet.
    pub async fn list(&self) -> Result<Vec<SnapshotHandle>, PersistenceError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(io_error(&self.dir, source)),
        };

        let mut found: Vec<(SystemTime, SnapshotHandle)> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| io_error(&self.dir, source))?
        {
            let path = entry.path();
            if !is_snapshot_file(&path) {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((
                modified,
                SnapshotHandle {
                    path,
                    created_at: DateTime::<Utc>::from(modified),
                },
            ));
        }

        found.sort_by(|(a_time, a), (b_time, b)| {
            b_time.cmp(a_time).then_with(|| b.path.cmp(&a.path))
        });
        Ok(found.into_iter().map(|(_, handle)| handle).collect())
    }

    async fn named(&self, name: &str) -> Result<SnapshotHandle, PersistenceError> {
        if !is_plain_file_name(name) {
            return Err(PersistenceError::InvalidName(name.to_string()));
        }

        let path = self.dir.join(name);
        let metadata = async_fs::metadata(&path)
            .await
            .map_err(|source| io_error(&path, source))?;
        let created_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(SnapshotHandle { path, created_at })
    }
}

fn is_snapshot_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(utils::SNAPSHOT_PREFIX))
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some_and(|n| n == name)
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_traversal() {
        assert!(is_plain_file_name("top_tracks_1.json"));
        assert!(!is_plain_file_name("../secret.json"));
        assert!(!is_plain_file_name("a/b.json"));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name(""));
    }

    #[test]
    fn only_prefixed_json_files_are_snapshots() {
        assert!(is_snapshot_file(Path::new("/data/top_tracks_1700000000000.json")));
        assert!(!is_snapshot_file(Path::new("/data/package.json")));
        assert!(!is_snapshot_file(Path::new("/data/top_tracks_1.txt")));
    }

    #[test]
    fn empty_query_means_latest() {
        assert_eq!(SnapshotRef::from_query(None), SnapshotRef::Latest);
        assert_eq!(SnapshotRef::from_query(Some(" ".into())), SnapshotRef::Latest);
        assert_eq!(
            SnapshotRef::from_query(Some("x.json".into())),
            SnapshotRef::Named("x.json".into())
        );
    }
}
