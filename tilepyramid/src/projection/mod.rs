//! Spherical mercator pixel projection.
//!
//! Converts between longitude/latitude and global pixel coordinates at a
//! zoom level, using 256 pixel tiles and the pixel origin at the north-west
//! corner of the world. This is the projection classic slippy-map tile
//! renderers use to turn a tile into a geographic box.

mod bounds;

pub use bounds::{GeoBounds, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};

use crate::coord::{TileCoord, TILE_SIZE};
use std::f64::consts::PI;
use thiserror::Error;

/// Sine clamp that keeps the poles at a finite pixel distance.
const SIN_LIMIT: f64 = 0.9999;

/// Errors from bounding box parsing and validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    /// Text could not be parsed as four comma separated numbers
    #[error("Invalid bounding box '{0}' (expected minlon,minlat,maxlon,maxlat)")]
    Malformed(String),

    /// Bounds are not a valid rectangle
    #[error("Invalid bounding box {0}: {1}")]
    InvalidBounds(GeoBounds, &'static str),
}

/// World size in pixels at the given zoom.
#[inline]
fn world_pixels(zoom: u8) -> f64 {
    f64::from(TILE_SIZE) * 2.0_f64.powi(i32::from(zoom))
}

/// Converts longitude/latitude (degrees) to global pixel coordinates.
///
/// Pixel values are rounded to the nearest integer.
#[inline]
pub fn lat_lon_to_pixel(lon: f64, lat: f64, zoom: u8) -> (f64, f64) {
    let size = world_pixels(zoom);
    let half = size / 2.0;

    let px = (half + lon * size / 360.0).round();

    let f = lat.to_radians().sin().clamp(-SIN_LIMIT, SIN_LIMIT);
    let py = (half - 0.5 * ((1.0 + f) / (1.0 - f)).ln() * size / (2.0 * PI)).round();

    (px, py)
}

/// Converts global pixel coordinates back to longitude/latitude (degrees).
#[inline]
pub fn pixel_to_lat_lon(px: f64, py: f64, zoom: u8) -> (f64, f64) {
    let size = world_pixels(zoom);
    let half = size / 2.0;

    let lon = (px - half) * 360.0 / size;
    let g = (py - half) / -(size / (2.0 * PI));
    let lat = (2.0 * g.exp().atan() - 0.5 * PI).to_degrees();

    (lon, lat)
}

/// Geographic box covered by a metatile rooted at `tile`.
///
/// The box is computed from the full `metatile_size` extent, even at zoom
/// levels where part of it falls outside the world.
pub fn metatile_bounds(tile: TileCoord, metatile_size: u32) -> GeoBounds {
    let size = f64::from(TILE_SIZE);
    let m = f64::from(metatile_size);
    let (x, y) = (f64::from(tile.x), f64::from(tile.y));

    // bottom-left and top-right pixel corners
    let (min_lon, min_lat) = pixel_to_lat_lon(x * size, (y + m) * size, tile.zoom);
    let (max_lon, max_lat) = pixel_to_lat_lon((x + m) * size, y * size, tile.zoom);

    GeoBounds {
        min_lon,
        min_lat,
        max_lon,
        max_lat,
    }
}

/// Metatile roots covering `bounds` at `zoom`.
///
/// Indexes come from dividing the pixel corners by the metatile image size,
/// truncated toward zero. Indexes outside the world are dropped. Roots are
/// returned x-major, matching the order they are seeded in.
pub fn covering_metatiles(bounds: &GeoBounds, zoom: u8, metatile_size: u32) -> Vec<TileCoord> {
    let image_size = f64::from(TILE_SIZE * metatile_size);
    let world = 1i64 << zoom;
    let m = i64::from(metatile_size);

    let (px0, py0) = lat_lon_to_pixel(bounds.min_lon, bounds.max_lat, zoom);
    let (px1, py1) = lat_lon_to_pixel(bounds.max_lon, bounds.min_lat, zoom);

    let (x0, x1) = ((px0 / image_size) as i64, (px1 / image_size) as i64);
    let (y0, y1) = ((py0 / image_size) as i64, (py1 / image_size) as i64);

    let mut roots = Vec::new();
    for x in x0..=x1 {
        if x < 0 || x * m >= world {
            continue;
        }
        for y in y0..=y1 {
            if y < 0 || y * m >= world {
                continue;
            }
            roots.push(TileCoord::new(zoom, (x * m) as u32, (y * m) as u32));
        }
    }
    roots
}
