//! Single-file MBTiles storage.
//!
//! Tiles go into the `tiles` table of an SQLite database following the
//! MBTiles 1.3 layout. Rows are addressed in the TMS scheme, so the stored
//! `tile_row` is the XYZ `y` flipped at its zoom level:
//!
//! ```text
//! tile_row = 2^zoom - 1 - y
//! ```
//!
//! Writes between two [`commit`](TileStorage::commit) calls share one
//! transaction, so a metatile lands in the file as a whole. An extra
//! `stored_at` column (unix milliseconds) backs [`TileStorage::newer_than`].

use super::{StorageError, TileStorage};
use crate::coord::TileCoord;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};

/// How long a writer waits for another process's transaction.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metadata (name TEXT, value TEXT);
CREATE UNIQUE INDEX IF NOT EXISTS metadata_name ON metadata (name);
CREATE TABLE IF NOT EXISTS tiles (
    zoom_level INTEGER,
    tile_column INTEGER,
    tile_row INTEGER,
    tile_data BLOB,
    stored_at INTEGER
);
CREATE UNIQUE INDEX IF NOT EXISTS tile_index ON tiles (zoom_level, tile_column, tile_row);
";

struct Database {
    conn: Connection,
    /// A write transaction is open
    in_batch: bool,
}

/// Tile storage in one MBTiles (SQLite) file.
///
/// The connection is shared behind a lock, so thread workers serialize
/// their writes. Child processes each open their own connection and wait
/// on each other through SQLite's busy timeout.
pub struct MbTilesStorage {
    path: PathBuf,
    db: Mutex<Database>,
    commits: AtomicU64,
}

impl MbTilesStorage {
    /// Opens or creates the database at `path`.
    pub fn open(path: PathBuf) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let conn = Connection::open(&path).map_err(|e| StorageError::database(&path, e))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .and_then(|()| conn.execute_batch(SCHEMA))
            .map_err(|e| StorageError::database(&path, e))?;

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tiles".to_string());
        for (key, value) in [("name", name.as_str()), ("format", "png"), ("type", "baselayer")] {
            conn.execute(
                "INSERT OR IGNORE INTO metadata (name, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| StorageError::database(&path, e))?;
        }

        debug!(path = %path.display(), "mbtiles opened");
        Ok(Self {
            path,
            db: Mutex::new(Database {
                conn,
                in_batch: false,
            }),
            commits: AtomicU64::new(0),
        })
    }

    /// Database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of committed batches.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Number of stored tiles.
    pub fn len(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .db
            .lock()
            .conn
            .query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))
            .map_err(|e| StorageError::database(&self.path, e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Encoded tile data, if stored.
    pub fn get(&self, tile: TileCoord) -> Result<Option<Vec<u8>>, StorageError> {
        let (row, column) = tms_row(tile);
        self.db
            .lock()
            .conn
            .query_row(
                "SELECT tile_data FROM tiles
                 WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
                params![tile.zoom, column, row],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| StorageError::database(&self.path, e))
    }

    fn stored_at(&self, tile: TileCoord) -> Option<i64> {
        let (row, column) = tms_row(tile);
        let result = self
            .db
            .lock()
            .conn
            .query_row(
                "SELECT stored_at FROM tiles
                 WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
                params![tile.zoom, column, row],
                |r| r.get::<_, Option<i64>>(0),
            )
            .optional();

        match result {
            Ok(stored_at) => stored_at.flatten(),
            Err(err) => {
                warn!(%tile, error = %err, "mbtiles lookup failed");
                None
            }
        }
    }
}

impl TileStorage for MbTilesStorage {
    fn exists(&self, tile: TileCoord) -> bool {
        let (row, column) = tms_row(tile);
        let result = self.db.lock().conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM tiles
             WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3)",
            params![tile.zoom, column, row],
            |r| r.get::<_, bool>(0),
        );

        result.unwrap_or_else(|err| {
            warn!(%tile, error = %err, "mbtiles lookup failed");
            false
        })
    }

    fn newer_than(&self, tile: TileCoord, cutoff: SystemTime) -> bool {
        self.stored_at(tile)
            .is_some_and(|stored_at| stored_at > unix_millis(cutoff))
    }

    fn store(&self, tile: TileCoord, data: &[u8]) -> Result<(), StorageError> {
        let (row, column) = tms_row(tile);
        let mut db = self.db.lock();

        if !db.in_batch {
            db.conn
                .execute_batch("BEGIN IMMEDIATE")
                .map_err(|e| StorageError::database(&self.path, e))?;
            db.in_batch = true;
        }

        db.conn
            .execute(
                "INSERT OR REPLACE INTO tiles
                 (zoom_level, tile_column, tile_row, tile_data, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![tile.zoom, column, row, data, unix_millis(SystemTime::now())],
            )
            .map_err(|e| StorageError::database(&self.path, e))?;

        debug!(%tile, bytes = data.len(), "tile stored");
        Ok(())
    }

    fn commit(&self) -> Result<(), StorageError> {
        let mut db = self.db.lock();
        if db.in_batch {
            db.in_batch = false;
            db.conn
                .execute_batch("COMMIT")
                .map_err(|e| StorageError::database(&self.path, e))?;
        }
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for MbTilesStorage {
    fn drop(&mut self) {
        let db = self.db.get_mut();
        if db.in_batch {
            if let Err(err) = db.conn.execute_batch("COMMIT") {
                error!(path = %self.path.display(), error = %err, "final mbtiles commit failed");
            }
        }
    }
}

/// TMS row and column of an XYZ tile.
fn tms_row(tile: TileCoord) -> (i64, i64) {
    let row = (1i64 << tile.zoom) - 1 - i64::from(tile.y);
    (row, i64::from(tile.x))
}

fn unix_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
