//! In-memory tile storage.

use super::{StorageError, TileStorage};
use crate::coord::TileCoord;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct StoredTile {
    data: Vec<u8>,
    stored_at: SystemTime,
}

/// Tile storage kept in a process-local map.
///
/// Child worker processes each get their own empty map, so this backend is
/// only meaningful for thread and inline execution.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tiles: Mutex<HashMap<TileCoord, StoredTile>>,
    commits: AtomicU64,
}

impl MemoryStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a tile with an explicit timestamp.
    pub fn insert_at(&self, tile: TileCoord, data: Vec<u8>, stored_at: SystemTime) {
        self.tiles.lock().insert(tile, StoredTile { data, stored_at });
    }

    /// Returns a copy of a stored tile.
    pub fn get(&self, tile: TileCoord) -> Option<Vec<u8>> {
        self.tiles.lock().get(&tile).map(|stored| stored.data.clone())
    }

    /// Number of stored tiles.
    pub fn len(&self) -> usize {
        self.tiles.lock().len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored coordinates, sorted.
    pub fn tiles(&self) -> Vec<TileCoord> {
        let mut tiles: Vec<_> = self.tiles.lock().keys().copied().collect();
        tiles.sort();
        tiles
    }

    /// Number of committed batches.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }
}

impl TileStorage for MemoryStorage {
    fn exists(&self, tile: TileCoord) -> bool {
        self.tiles.lock().contains_key(&tile)
    }

    fn newer_than(&self, tile: TileCoord, cutoff: SystemTime) -> bool {
        self.tiles
            .lock()
            .get(&tile)
            .is_some_and(|stored| stored.stored_at > cutoff)
    }

    fn store(&self, tile: TileCoord, data: &[u8]) -> Result<(), StorageError> {
        self.insert_at(tile, data.to_vec(), SystemTime::now());
        Ok(())
    }

    fn commit(&self) -> Result<(), StorageError> {
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
