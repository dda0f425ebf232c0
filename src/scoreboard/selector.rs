//! Finds the scoreboard CSV the game server wrote for the round that just ended.
//!
//! The newest `.csv` by modification time wins; equal times fall back to the
//! greater file name so the choice is stable. Every failure is logged and
//! reported as "not found".

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::transport::{EntryKind, RemoteConnector, RemoteSession, TransportError};

/// Extension the game server gives scoreboard exports.
pub const SCOREBOARD_EXTENSION: &str = ".csv";

/// A scoreboard ready to be read from the local filesystem.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreboardFile {
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
}

/// A file that might be the scoreboard.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub modified: DateTime<Utc>,
}

pub fn is_scoreboard_name(name: &str) -> bool {
    name.ends_with(SCOREBOARD_EXTENSION)
}

/// Pick the newest candidate; ties go to the greater name.
pub fn pick_latest<I>(candidates: I) -> Option<Candidate>
where
    I: IntoIterator<Item = Candidate>,
{
    candidates
        .into_iter()
        .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)))
}

/// Where scoreboards are read from.
pub enum ScoreboardSource {
    Local,
    Remote {
        connector: Arc<dyn RemoteConnector>,
        /// Local directory downloads are written to
        staging_dir: PathBuf,
    },
}

pub struct ScoreboardLocator {
    dir: PathBuf,
    source: ScoreboardSource,
}

impl ScoreboardLocator {
    pub fn new(dir: impl Into<PathBuf>, source: ScoreboardSource) -> Self {
        ScoreboardLocator {
            dir: dir.into(),
            source,
        }
    }

    /// The newest scoreboard, or `None` when there is none or it can't be reached.
    pub async fn find_latest(&self) -> Option<ScoreboardFile> {
        let result = match &self.source {
            ScoreboardSource::Local => find_latest_local(&self.dir).await,
            ScoreboardSource::Remote {
                connector,
                staging_dir,
            } => find_latest_remote(connector.as_ref(), &self.dir, staging_dir)
                .await
                .map_err(anyhow::Error::from),
        };

        match result {
            Ok(found) => found,
            Err(e) => {
                warn!("Error finding latest scoreboard file: {:#}", e);
                None
            }
        }
    }
}

/// Scan a directory on this machine.
pub async fn find_latest_local(dir: &Path) -> Result<Option<ScoreboardFile>> {
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        info!("Scoreboard directory does not exist: {}", dir.display());
        return Ok(None);
    }

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_scoreboard_name(&name) {
            continue;
        }
        // Follows symlinks; a dangling link is skipped rather than failing the scan
        let meta = match tokio::fs::metadata(entry.path()).await {
            Ok(meta) => meta,
            Err(e) => {
                debug!("Skipping {}: {}", name, e);
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }
        candidates.push(Candidate {
            name,
            modified: meta.modified()?.into(),
        });
    }

    let Some(latest) = pick_latest(candidates) else {
        info!("No CSV files found in scoreboard directory");
        return Ok(None);
    };

    Ok(Some(ScoreboardFile {
        path: dir.join(&latest.name),
        modified: latest.modified,
    }))
}

/// Scan a remote directory and download the newest scoreboard into `staging_dir`.
///
/// The session is closed whether the lookup succeeds, finds nothing, or fails.
pub async fn find_latest_remote(
    connector: &dyn RemoteConnector,
    dir: &Path,
    staging_dir: &Path,
) -> Result<Option<ScoreboardFile>, TransportError> {
    let mut session = connector.connect().await?;
    info!("Connected to SFTP server, checking directory: {}", dir.display());

    let result = lookup_in_session(session.as_mut(), dir, staging_dir).await;

    if let Err(e) = session.close().await {
        debug!("Error closing SFTP session: {}", e);
    }
    result
}

async fn lookup_in_session(
    session: &mut dyn RemoteSession,
    dir: &Path,
    staging_dir: &Path,
) -> Result<Option<ScoreboardFile>, TransportError> {
    if !session.exists(dir).await? {
        info!("Scoreboard directory does not exist: {}", dir.display());
        return Ok(None);
    }

    let candidates = session
        .list(dir)
        .await?
        .into_iter()
        .filter(|e| e.kind == EntryKind::File && is_scoreboard_name(&e.name))
        .map(|e| Candidate {
            modified: e.modified.unwrap_or(DateTime::<Utc>::MIN_UTC),
            name: e.name,
        });

    let Some(latest) = pick_latest(candidates) else {
        info!("No CSV files found in scoreboard directory");
        return Ok(None);
    };
    info!("Found latest scoreboard file: {}", latest.name);

    tokio::fs::create_dir_all(staging_dir).await?;
    let local_path = staging_dir.join(&latest.name);
    session.download(&dir.join(&latest.name), &local_path).await?;
    info!("Downloaded scoreboard file to: {}", local_path.display());

    Ok(Some(ScoreboardFile {
        path: local_path,
        modified: latest.modified,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoreboard::transport::RemoteEntry;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::time::{Duration, SystemTime};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn candidate(name: &str, secs: i64) -> Candidate {
        Candidate {
            name: name.into(),
            modified: at(secs),
        }
    }

    fn write_with_mtime(dir: &Path, name: &str, secs: u64) {
        let path = dir.join(name);
        std::fs::write(&path, "name,kills\n").unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs))
            .unwrap();
    }

    #[test]
    fn test_pick_latest_by_mtime() {
        let picked = pick_latest(vec![
            candidate("c.csv", 5),
            candidate("a.csv", 30),
            candidate("b.csv", 10),
        ]);
        assert_eq!(picked.unwrap().name, "a.csv");
        assert!(pick_latest(Vec::new()).is_none());
    }

    #[test]
    fn test_pick_latest_tie_uses_name() {
        let picked = pick_latest(vec![candidate("b.csv", 7), candidate("a.csv", 7)]);
        assert_eq!(picked.unwrap().name, "b.csv");
    }

    #[test]
    fn test_scoreboard_name_filter() {
        assert!(is_scoreboard_name("Scoreboard_2024.csv"));
        assert!(!is_scoreboard_name("Scoreboard_2024.csv.tmp"));
        assert!(!is_scoreboard_name("notes.txt"));
    }

    #[tokio::test]
    async fn test_local_returns_newest_csv() {
        let tmp = tempfile::tempdir().unwrap();
        write_with_mtime(tmp.path(), "a.csv", 10);
        write_with_mtime(tmp.path(), "b.csv", 20);
        write_with_mtime(tmp.path(), "z.txt", 99);
        std::fs::create_dir(tmp.path().join("dir.csv")).unwrap();

        let found = find_latest_local(tmp.path()).await.unwrap().unwrap();
        assert_eq!(found.path, tmp.path().join("b.csv"));
        assert_eq!(found.modified, at(20));
    }

    #[tokio::test]
    async fn test_local_missing_dir_and_no_matches() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(find_latest_local(&tmp.path().join("nope")).await.unwrap().is_none());

        write_with_mtime(tmp.path(), "readme.md", 1);
        assert!(find_latest_local(tmp.path()).await.unwrap().is_none());

        let locator = ScoreboardLocator::new(tmp.path().join("nope"), ScoreboardSource::Local);
        assert!(locator.find_latest().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_follows_symlinks() {
        let tmp = tempfile::tempdir().unwrap();
        let scores = tmp.path().join("scores");
        std::fs::create_dir(&scores).unwrap();
        write_with_mtime(&scores, "a.csv", 10);
        write_with_mtime(tmp.path(), "exported.dat", 40);
        std::os::unix::fs::symlink(tmp.path().join("exported.dat"), scores.join("link.csv"))
            .unwrap();
        std::os::unix::fs::symlink(tmp.path().join("gone"), scores.join("dangling.csv")).unwrap();

        let found = find_latest_local(&scores).await.unwrap().unwrap();
        assert_eq!(found.path, scores.join("link.csv"));
        assert_eq!(found.modified, at(40));
    }

    // ── Remote ───────────────────────────────────────────────────────────────

    #[derive(Default)]
    struct RemoteLog {
        closed: bool,
        downloads: Vec<(PathBuf, PathBuf)>,
    }

    struct FakeConnector {
        dir_exists: bool,
        entries: Vec<RemoteEntry>,
        fail_list: bool,
        log: Arc<Mutex<RemoteLog>>,
    }

    struct FakeSession {
        dir_exists: bool,
        entries: Vec<RemoteEntry>,
        fail_list: bool,
        log: Arc<Mutex<RemoteLog>>,
    }

    #[async_trait]
    impl RemoteConnector for FakeConnector {
        async fn connect(&self) -> Result<Box<dyn RemoteSession>, TransportError> {
            Ok(Box::new(FakeSession {
                dir_exists: self.dir_exists,
                entries: self.entries.clone(),
                fail_list: self.fail_list,
                log: self.log.clone(),
            }))
        }
    }

    #[async_trait]
    impl RemoteSession for FakeSession {
        async fn exists(&mut self, _path: &Path) -> Result<bool, TransportError> {
            Ok(self.dir_exists)
        }

        async fn list(&mut self, _path: &Path) -> Result<Vec<RemoteEntry>, TransportError> {
            if self.fail_list {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                )));
            }
            Ok(self.entries.clone())
        }

        async fn download(&mut self, remote: &Path, local: &Path) -> Result<(), TransportError> {
            std::fs::write(local, "name,kills\n")?;
            self.log
                .lock()
                .unwrap()
                .downloads
                .push((remote.to_path_buf(), local.to_path_buf()));
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<(), TransportError> {
            self.log.lock().unwrap().closed = true;
            Ok(())
        }
    }

    fn entry(name: &str, kind: EntryKind, secs: i64) -> RemoteEntry {
        RemoteEntry {
            name: name.into(),
            kind,
            modified: Some(at(secs)),
        }
    }

    fn connector(dir_exists: bool, entries: Vec<RemoteEntry>, fail_list: bool) -> FakeConnector {
        FakeConnector {
            dir_exists,
            entries,
            fail_list,
            log: Arc::new(Mutex::new(RemoteLog::default())),
        }
    }

    #[tokio::test]
    async fn test_remote_downloads_newest_regular_csv() {
        let staging = tempfile::tempdir().unwrap();
        let staging_dir = staging.path().join("scoreboards");
        let conn = connector(
            true,
            vec![
                entry("a.csv", EntryKind::File, 10),
                entry("b.csv", EntryKind::File, 20),
                entry("c.csv", EntryKind::Directory, 99),
                entry("d.log", EntryKind::File, 50),
            ],
            false,
        );

        let found = find_latest_remote(&conn, Path::new("/remote/scores"), &staging_dir)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.path, staging_dir.join("b.csv"));
        assert!(found.path.exists());
        let log = conn.log.lock().unwrap();
        assert!(log.closed);
        assert_eq!(
            log.downloads,
            vec![(PathBuf::from("/remote/scores/b.csv"), staging_dir.join("b.csv"))]
        );
    }

    #[tokio::test]
    async fn test_remote_missing_dir_closes_session() {
        let staging = tempfile::tempdir().unwrap();
        let conn = connector(false, vec![entry("a.csv", EntryKind::File, 1)], false);

        let found = find_latest_remote(&conn, Path::new("/remote"), staging.path())
            .await
            .unwrap();

        assert!(found.is_none());
        assert!(conn.log.lock().unwrap().closed);
    }

    #[tokio::test]
    async fn test_remote_empty_listing_closes_session() {
        let staging = tempfile::tempdir().unwrap();
        let conn = connector(true, vec![entry("x.txt", EntryKind::File, 1)], false);

        let found = find_latest_remote(&conn, Path::new("/remote"), staging.path())
            .await
            .unwrap();

        assert!(found.is_none());
        let log = conn.log.lock().unwrap();
        assert!(log.closed);
        assert!(log.downloads.is_empty());
    }

    #[tokio::test]
    async fn test_remote_error_closes_session_and_degrades() {
        let staging = tempfile::tempdir().unwrap();
        let conn = Arc::new(connector(true, Vec::new(), true));

        let err = find_latest_remote(conn.as_ref(), Path::new("/remote"), staging.path()).await;
        assert!(err.is_err());
        assert!(conn.log.lock().unwrap().closed);

        let locator = ScoreboardLocator::new(
            "/remote",
            ScoreboardSource::Remote {
                connector: conn.clone(),
                staging_dir: staging.path().to_path_buf(),
            },
        );
        assert!(locator.find_latest().await.is_none());
    }
}
