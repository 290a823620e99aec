//! Directory-per-zoom PNG storage.

use super::{StorageError, TileStorage};
use crate::coord::TileCoord;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::debug;

/// Construct the path of a stored tile.
///
/// ```text
/// <root>/<zoom>/<x>/<y>.png
/// ```
///
/// # Example
///
/// ```
/// use std::path::{Path, PathBuf};
/// use tilepyramid::coord::TileCoord;
/// use tilepyramid::storage::tile_path;
///
/// let path = tile_path(Path::new("/tiles"), TileCoord::new(5, 16, 11));
/// assert_eq!(path, PathBuf::from("/tiles/5/16/11.png"));
/// ```
pub fn tile_path(root: &Path, tile: TileCoord) -> PathBuf {
    root.join(tile.zoom.to_string())
        .join(tile.x.to_string())
        .join(format!("{}.png", tile.y))
}

/// Tile storage on the local filesystem.
///
/// Each tile is written as soon as it is stored, so `commit` only marks a
/// batch boundary. Several processes may open the same root; they never
/// write the same tile.
#[derive(Debug)]
pub struct DiskStorage {
    root: PathBuf,
    commits: AtomicU64,
}

impl DiskStorage {
    /// Opens storage at `root`, creating the directory if needed.
    pub fn new(root: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;
        Ok(Self {
            root,
            commits: AtomicU64::new(0),
        })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of committed batches.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    fn modified(&self, tile: TileCoord) -> Option<SystemTime> {
        fs::metadata(tile_path(&self.root, tile))
            .and_then(|meta| meta.modified())
            .ok()
    }
}

impl TileStorage for DiskStorage {
    fn exists(&self, tile: TileCoord) -> bool {
        tile_path(&self.root, tile).is_file()
    }

    fn newer_than(&self, tile: TileCoord, cutoff: SystemTime) -> bool {
        self.modified(tile).is_some_and(|modified| modified > cutoff)
    }

    fn store(&self, tile: TileCoord, data: &[u8]) -> Result<(), StorageError> {
        let path = tile_path(&self.root, tile);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        fs::write(&path, data).map_err(|e| StorageError::io(&path, e))?;
        debug!(%tile, path = %path.display(), bytes = data.len(), "tile stored");
        Ok(())
    }

    fn commit(&self) -> Result<(), StorageError> {
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_temp_storage() -> (DiskStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp_dir.path().join("tiles")).unwrap();
        (storage, temp_dir)
    }

    #[test]
    fn test_new_creates_root() {
        let (storage, _temp) = create_temp_storage();
        assert!(storage.root().is_dir());
        assert_eq!(storage.commits(), 0);
    }

    #[test]
    fn test_store_writes_zoom_x_y_layout() {
        let (storage, _temp) = create_temp_storage();
        let tile = TileCoord::new(3, 5, 2);

        storage.store(tile, &[1, 2, 3]).unwrap();

        let path = storage.root().join("3").join("5").join("2.png");
        assert_eq!(fs::read(path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_exists() {
        let (storage, _temp) = create_temp_storage();
        let tile = TileCoord::new(2, 1, 1);

        assert!(!storage.exists(tile));
        storage.store(tile, b"png").unwrap();
        assert!(storage.exists(tile));
        assert!(!storage.exists(TileCoord::new(2, 1, 2)));
    }

    #[test]
    fn test_store_overwrites() {
        let (storage, _temp) = create_temp_storage();
        let tile = TileCoord::new(1, 0, 0);

        storage.store(tile, b"old").unwrap();
        storage.store(tile, b"new").unwrap();

        assert_eq!(fs::read(tile_path(storage.root(), tile)).unwrap(), b"new");
    }

    #[test]
    fn test_newer_than() {
        let (storage, _temp) = create_temp_storage();
        let tile = TileCoord::new(4, 3, 3);
        let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);

        assert!(!storage.newer_than(tile, an_hour_ago), "missing tiles are never newer");

        storage.store(tile, b"png").unwrap();
        assert!(storage.newer_than(tile, an_hour_ago));
        assert!(!storage.newer_than(tile, SystemTime::now() + Duration::from_secs(3600)));
    }

    #[test]
    fn test_commit_counts_batches() {
        let (storage, _temp) = create_temp_storage();
        storage.commit().unwrap();
        storage.commit().unwrap();
        assert_eq!(storage.commits(), 2);
    }

    #[test]
    fn test_reopen_sees_existing_tiles() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("tiles");
        let tile = TileCoord::new(6, 10, 20);

        {
            let storage = DiskStorage::new(root.clone()).unwrap();
            storage.store(tile, b"png").unwrap();
        }

        let storage = DiskStorage::new(root).unwrap();
        assert!(storage.exists(tile));
    }

    #[test]
    fn test_store_error_carries_path() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("tiles");
        let storage = DiskStorage::new(root.clone()).unwrap();
        // a file where the zoom directory should be
        fs::write(root.join("7"), b"not a directory").unwrap();

        let err = storage.store(TileCoord::new(7, 1, 1), b"png").unwrap_err();

        assert!(err.to_string().contains("7"), "unexpected message: {}", err);
    }
}
