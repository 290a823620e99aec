//! Deterministic coverage renderer.

use super::{MetatileRequest, RenderError, Renderer};
use crate::coord::TILE_SIZE;
use crate::projection::{pixel_to_lat_lon, GeoBounds};
use image::{Rgba, RgbaImage};

/// Paints every pixel whose centre lies inside a coverage area.
///
/// Pixels outside all areas stay fully transparent, so tiles away from the
/// areas come out empty and their subtrees are pruned. Stands in for a real
/// map engine.
#[derive(Debug, Clone)]
pub struct CoverageRenderer {
    areas: Vec<GeoBounds>,
    color: Rgba<u8>,
}

impl CoverageRenderer {
    pub fn new(areas: Vec<GeoBounds>, color: [u8; 4]) -> Self {
        Self {
            areas,
            color: Rgba(color),
        }
    }
}

impl Renderer for CoverageRenderer {
    fn render(&mut self, request: &MetatileRequest) -> Result<RgbaImage, RenderError> {
        let size = request.image_size;
        let mut image = RgbaImage::new(size, size);

        // whole metatile misses every area
        if !self.areas.iter().any(|area| area.intersects(&request.bounds)) {
            return Ok(image);
        }

        let zoom = request.tile.zoom;
        let origin_x = f64::from(request.tile.x) * f64::from(TILE_SIZE);
        let origin_y = f64::from(request.tile.y) * f64::from(TILE_SIZE);

        // the projection is separable: longitude depends on px only,
        // latitude on py only
        let lons: Vec<f64> = (0..size)
            .map(|px| pixel_to_lat_lon(origin_x + f64::from(px) + 0.5, 0.0, zoom).0)
            .collect();
        let lats: Vec<f64> = (0..size)
            .map(|py| pixel_to_lat_lon(0.0, origin_y + f64::from(py) + 0.5, zoom).1)
            .collect();

        for (py, lat) in lats.iter().enumerate() {
            for (px, lon) in lons.iter().enumerate() {
                if self.areas.iter().any(|area| area.contains(*lon, *lat)) {
                    image.put_pixel(px as u32, py as u32, self.color);
                }
            }
        }

        Ok(image)
    }
}
