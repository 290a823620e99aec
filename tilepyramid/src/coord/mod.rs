//! Tile coordinate types.
//!
//! A [`TileCoord`] names one tile in the XYZ scheme, or, as a unit of work,
//! the top-left tile of a metatile. Parent/child arithmetic for the render
//! quad-tree lives here so that the tracker and the workers agree on it.

mod types;

pub use types::{
    validate_metatile_size, CoordError, Footprint, TileCoord, MAX_METATILE_SIZE, MAX_ZOOM, TILE_SIZE,
};
