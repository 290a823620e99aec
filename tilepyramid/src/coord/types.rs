//! Coordinate type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Side of a single rendered tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Highest zoom level the pyramid can reach.
///
/// Children of a tile at this zoom still fit in `u32` coordinates.
pub const MAX_ZOOM: u8 = 30;

/// Largest metatile side in tiles.
///
/// A metatile image is `TILE_SIZE * size` pixels per side; at 64 that is
/// already a 1 GiB RGBA buffer.
pub const MAX_METATILE_SIZE: u32 = 64;

/// Tile coordinates in the slippy map (XYZ) scheme.
///
/// When used as a unit of work the coordinate names the top-left tile of a
/// metatile: a square block of `metatile_size` tiles per axis rendered as a
/// single image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level (0-30)
    pub zoom: u8,
    /// X coordinate (west-east), 0 at west
    pub x: u32,
    /// Y coordinate (north-south), 0 at north
    pub y: u32,
}

impl TileCoord {
    /// Creates a coordinate without validation.
    #[inline]
    pub const fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Creates a coordinate, checking that it lies inside the world at its zoom.
    pub fn try_new(zoom: u8, x: u32, y: u32) -> Result<Self, CoordError> {
        if zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(zoom));
        }
        let tile = Self { zoom, x, y };
        if !tile.is_within_world() {
            return Err(CoordError::OutOfRange(tile));
        }
        Ok(tile)
    }

    /// Number of tiles per axis at this coordinate's zoom level.
    #[inline]
    pub fn world_span(&self) -> u64 {
        1u64 << self.zoom
    }

    /// Returns true if `0 <= x, y < 2^zoom`.
    #[inline]
    pub fn is_within_world(&self) -> bool {
        u64::from(self.x) < self.world_span() && u64::from(self.y) < self.world_span()
    }

    /// Tiles per axis actually covered by a metatile rooted here.
    ///
    /// Low zoom levels hold fewer than `metatile_size` tiles per axis, so
    /// the metatile is clipped to the world.
    #[inline]
    pub fn span(&self, metatile_size: u32) -> u32 {
        let world = self.world_span().min(u64::from(u32::MAX)) as u32;
        metatile_size.min(world)
    }

    /// The four child metatiles at `zoom + 1`.
    ///
    /// Offsets `(0,0)`, `(0,m)`, `(m,0)`, `(m,m)` are applied to `(2x, 2y)`
    /// in that order; the first offset moves along x, the second along y.
    /// With `metatile_size == 1` this is the plain quad-tree rule.
    pub fn children(&self, metatile_size: u32) -> [TileCoord; 4] {
        let zoom = self.zoom + 1;
        let (x, y) = (self.x * 2, self.y * 2);
        let m = metatile_size;
        [
            TileCoord::new(zoom, x, y),
            TileCoord::new(zoom, x, y + m),
            TileCoord::new(zoom, x + m, y),
            TileCoord::new(zoom, x + m, y + m),
        ]
    }

    /// Iterates the single tiles that make up a metatile rooted here.
    ///
    /// Yields `span * span` coordinates in column-major order (x outer).
    pub fn footprint(&self, metatile_size: u32) -> Footprint {
        Footprint {
            origin: *self,
            span: self.span(metatile_size),
            current: 0,
        }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.zoom, self.x, self.y)
    }
}

impl FromStr for TileCoord {
    type Err = CoordError;

    /// Parses the `Z,X,Y` form used on the command line.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [zoom, x, y] = parts.as_slice() else {
            return Err(CoordError::Malformed(s.to_string()));
        };
        let zoom = zoom
            .parse::<u8>()
            .map_err(|_| CoordError::Malformed(s.to_string()))?;
        let x = x
            .parse::<u32>()
            .map_err(|_| CoordError::Malformed(s.to_string()))?;
        let y = y
            .parse::<u32>()
            .map_err(|_| CoordError::Malformed(s.to_string()))?;
        TileCoord::try_new(zoom, x, y)
    }
}

/// Iterator over the single tiles of a metatile.
#[derive(Debug, Clone)]
pub struct Footprint {
    origin: TileCoord,
    span: u32,
    current: u64,
}

impl Iterator for Footprint {
    type Item = TileCoord;

    fn next(&mut self) -> Option<Self::Item> {
        let total = u64::from(self.span) * u64::from(self.span);
        if self.current >= total {
            return None;
        }

        let i = (self.current / u64::from(self.span)) as u32;
        let j = (self.current % u64::from(self.span)) as u32;
        self.current += 1;

        Some(TileCoord::new(
            self.origin.zoom,
            self.origin.x + i,
            self.origin.y + j,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let total = u64::from(self.span) * u64::from(self.span);
        let remaining = (total - self.current) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Footprint {}

/// Errors that can occur when building or parsing coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    /// Zoom level is outside the supported range
    #[error("Invalid zoom level: {0} (must be between 0 and {MAX_ZOOM})")]
    InvalidZoom(u8),

    /// Tile lies outside the world at its zoom level
    #[error("Tile {0} is outside the world at its zoom level")]
    OutOfRange(TileCoord),

    /// Text could not be parsed as `Z,X,Y`
    #[error("Invalid tile '{0}' (expected Z,X,Y)")]
    Malformed(String),

    /// Metatile size is zero, too large or not a power of two
    #[error("Invalid metatile size: {0} (must be a power of two up to {MAX_METATILE_SIZE})")]
    InvalidMetatileSize(u32),
}

/// Checks that a metatile size is a power of two (1 included) no larger
/// than [`MAX_METATILE_SIZE`].
pub fn validate_metatile_size(size: u32) -> Result<u32, CoordError> {
    if size.is_power_of_two() && size <= MAX_METATILE_SIZE {
        Ok(size)
    } else {
        Err(CoordError::InvalidMetatileSize(size))
    }
}
