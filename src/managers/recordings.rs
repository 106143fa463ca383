use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Database migrations for slot recordings.
/// Each migration is applied in order. The library tracks which migrations
/// have been applied using SQLite's user_version pragma.
static MIGRATIONS: &[M] = &[M::up(
    "CREATE TABLE IF NOT EXISTS recordings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        uri TEXT,
        buttonIndex INTEGER UNIQUE
    );",
)];

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Slot index -> recording locator, as stored.
pub type Recordings = BTreeMap<usize, String>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("schema migration failed: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct RecordingStats {
    pub total_size_bytes: u64,
    pub total_entries: i64,
}

/// Durable slot -> locator mapping, at most one row per slot.
///
/// The store also owns the recordings directory: files it replaced or
/// removed from the table are deleted from disk.
#[derive(Clone, Debug)]
pub struct RecordingStore {
    recordings_dir: PathBuf,
    db_path: PathBuf,
}

impl RecordingStore {
    pub fn new(
        recordings_dir: impl Into<PathBuf>,
        db_path: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        let recordings_dir = recordings_dir.into();

        if !recordings_dir.exists() {
            fs::create_dir_all(&recordings_dir)?;
            debug!("Created recordings directory: {:?}", recordings_dir);
        }

        Ok(Self {
            recordings_dir,
            db_path: db_path.into(),
        })
    }

    pub fn recordings_dir(&self) -> &Path {
        &self.recordings_dir
    }

    /// Create the recordings table if it is missing. Safe to call on every
    /// startup.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        info!("Initializing database at {:?}", self.db_path);

        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || migrate(&db_path)).await?
    }

    /// All stored recordings. A failed read is logged and yields an empty
    /// mapping.
    pub async fn list_all(&self) -> Recordings {
        match self.load_all().await {
            Ok(recordings) => recordings,
            Err(e) => {
                error!("Failed to load recordings: {}", e);
                Recordings::new()
            }
        }
    }

    /// Insert or replace the recording of `slot`, then reload everything from
    /// the database. The reloaded mapping is returned so callers never keep
    /// state the database does not have.
    pub async fn upsert(&self, slot: usize, locator: &str) -> Result<Recordings, StoreError> {
        let db_path = self.db_path.clone();
        let new_locator = locator.to_string();
        let replaced = tokio::task::spawn_blocking(move || {
            let mut conn = open_connection(&db_path)?;
            upsert_with_conn(&mut conn, slot, &new_locator)
        })
        .await??;

        debug!(slot, "Saved recording {}", locator);

        if let Some(previous) = replaced {
            self.delete_recording_file(&previous);
        }

        self.load_all().await
    }

    /// Delete the recording of `slot`. Deleting an empty slot is not an error.
    pub async fn remove(&self, slot: usize) -> Result<(), StoreError> {
        let db_path = self.db_path.clone();
        let removed = tokio::task::spawn_blocking(move || {
            let conn = open_connection(&db_path)?;
            remove_with_conn(&conn, slot)
        })
        .await??;

        match removed {
            Some(locator) => {
                debug!(slot, "Deleted recording {}", locator);
                self.delete_recording_file(&locator);
            }
            None => debug!(slot, "No recording to delete"),
        }

        Ok(())
    }

    pub async fn storage_usage(&self) -> Result<RecordingStats, StoreError> {
        let db_path = self.db_path.clone();
        let recordings_dir = self.recordings_dir.clone();
        tokio::task::spawn_blocking(move || read_storage_usage(&db_path, &recordings_dir)).await?
    }

    /// Delete a recording file no row refers to, such as one whose save
    /// failed.
    pub fn discard_file(&self, locator: &str) {
        self.delete_recording_file(locator);
    }

    async fn load_all(&self) -> Result<Recordings, StoreError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_connection(&db_path)?;
            read_recordings(&conn)
        })
        .await?
    }

    /// Only files inside the recordings directory are ever deleted.
    fn delete_recording_file(&self, locator: &str) {
        let path = Path::new(locator);
        if !is_inside(path, &self.recordings_dir) || !path.exists() {
            return;
        }

        if let Err(e) = fs::remove_file(path) {
            error!("Failed to delete recording file {}: {}", locator, e);
        } else {
            debug!("Deleted recording file: {}", locator);
        }
    }
}

fn migrate(db_path: &Path) -> Result<(), StoreError> {
    let mut conn = open_connection(db_path)?;
    let migrations = Migrations::new(MIGRATIONS.to_vec());

    let version_before: i32 =
        conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    migrations.to_latest(&mut conn)?;

    let version_after: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version_after > version_before {
        info!(
            "Database migrated from version {} to {}",
            version_before, version_after
        );
    } else {
        debug!("Database already at latest version {}", version_after);
    }

    Ok(())
}

fn read_storage_usage(db_path: &Path, recordings_dir: &Path) -> Result<RecordingStats, StoreError> {
    let conn = open_connection(db_path)?;

    let total_entries: i64 =
        conn.query_row("SELECT COUNT(*) FROM recordings", [], |row| row.get(0))?;

    let mut total_size_bytes: u64 = 0;
    if recordings_dir.exists() {
        match fs::read_dir(recordings_dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    if let Ok(metadata) = entry.metadata() {
                        if metadata.is_file() {
                            total_size_bytes += metadata.len();
                        }
                    }
                }
            }
            Err(e) => error!("Failed to read recordings directory: {}", e),
        }
    }

    Ok(RecordingStats {
        total_size_bytes,
        total_entries,
    })
}

/// `path` lies under `dir` without climbing out through `..`.
fn is_inside(path: &Path, dir: &Path) -> bool {
    path.starts_with(dir)
        && !path
            .components()
            .any(|component| matches!(component, Component::ParentDir))
}

fn open_connection(db_path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn read_recordings(conn: &Connection) -> Result<Recordings, StoreError> {
    let mut stmt = conn.prepare("SELECT buttonIndex, uri FROM recordings ORDER BY buttonIndex")?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, Option<i64>>("buttonIndex")?,
            row.get::<_, Option<String>>("uri")?,
        ))
    })?;

    let mut recordings = Recordings::new();
    for row in rows {
        match row? {
            (Some(index), Some(uri)) => match usize::try_from(index) {
                Ok(slot) => {
                    recordings.insert(slot, uri);
                }
                Err(_) => warn!("Skipping recording with invalid slot index {}", index),
            },
            (index, uri) => warn!(?index, ?uri, "Skipping incomplete recording row"),
        }
    }

    Ok(recordings)
}

/// Returns the locator that was replaced, if it differs from the new one.
fn upsert_with_conn(
    conn: &mut Connection,
    slot: usize,
    locator: &str,
) -> Result<Option<String>, StoreError> {
    let tx = conn.transaction()?;

    let previous: Option<String> = tx
        .query_row(
            "SELECT uri FROM recordings WHERE buttonIndex = ?1",
            params![slot as i64],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .flatten();

    tx.execute(
        "INSERT INTO recordings (uri, buttonIndex) VALUES (?1, ?2)
         ON CONFLICT(buttonIndex) DO UPDATE SET uri = excluded.uri",
        params![locator, slot as i64],
    )?;

    tx.commit()?;

    Ok(previous.filter(|previous| previous != locator))
}

/// Returns the locator of the deleted row, if there was one.
fn remove_with_conn(conn: &Connection, slot: usize) -> Result<Option<String>, StoreError> {
    let previous: Option<String> = conn
        .query_row(
            "SELECT uri FROM recordings WHERE buttonIndex = ?1",
            params![slot as i64],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .flatten();

    conn.execute(
        "DELETE FROM recordings WHERE buttonIndex = ?1",
        params![slot as i64],
    )?;

    Ok(previous)
}
