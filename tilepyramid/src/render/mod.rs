//! Metatile rendering abstraction.
//!
//! Workers never rasterize anything themselves. They hand a
//! [`MetatileRequest`] to a [`Renderer`] and slice the image they get back.
//!
//! ```text
//! ┌──────────────┐  MetatileRequest   ┌──────────────────────┐
//! │    Worker    │ ─────────────────► │   dyn Renderer       │
//! │ (slice, store│ ◄───────────────── │ (one per worker)     │
//! │  and prune)  │     RgbaImage      └──────────────────────┘
//! └──────────────┘                              ▲
//!                                               │ create()
//!                                    ┌──────────────────────┐
//!                                    │ dyn RendererFactory  │
//!                                    └──────────────────────┘
//! ```
//!
//! Renderers are not assumed to be thread-safe, so each worker gets its
//! own instance from a shared factory.

mod coverage;

pub use coverage::CoverageRenderer;

use crate::coord::{TileCoord, TILE_SIZE};
use crate::projection::{metatile_bounds, GeoBounds};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a renderer.
///
/// A failed render is logged by the worker and the metatile produces no
/// tiles; it never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The engine could not produce the image
    #[error("Render failed for {tile}: {reason}")]
    Failed { tile: TileCoord, reason: String },

    /// The engine could not be initialized
    #[error("Renderer unavailable: {0}")]
    Unavailable(String),

    /// The returned image does not have the requested size
    #[error("Renderer returned a {width}x{height} image, expected {expected}x{expected}")]
    WrongSize {
        width: u32,
        height: u32,
        expected: u32,
    },
}

/// One metatile to render.
#[derive(Debug, Clone, PartialEq)]
pub struct MetatileRequest {
    /// Top-left tile of the metatile
    pub tile: TileCoord,
    /// Metatile side in tiles
    pub metatile_size: u32,
    /// Geographic box covered by the full metatile
    pub bounds: GeoBounds,
    /// Side of the requested square image in pixels
    pub image_size: u32,
}

impl MetatileRequest {
    /// Builds the request for the metatile rooted at `tile`.
    pub fn new(tile: TileCoord, metatile_size: u32) -> Self {
        Self {
            tile,
            metatile_size,
            bounds: metatile_bounds(tile, metatile_size),
            image_size: TILE_SIZE * metatile_size,
        }
    }
}

/// A map rendering engine.
pub trait Renderer: Send {
    /// Renders the metatile into an `image_size` square RGBA image.
    ///
    /// Fully transparent pixels mean "no content".
    fn render(&mut self, request: &MetatileRequest) -> Result<RgbaImage, RenderError>;
}

/// Creates one renderer per worker.
pub trait RendererFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn Renderer>, RenderError>;
}

/// Serializable renderer selection, handed to child worker processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RendererConfig {
    /// Paints `color` wherever a pixel falls inside one of `areas`
    Coverage { areas: Vec<GeoBounds>, color: [u8; 4] },
}

impl RendererConfig {
    /// Default paint colour for coverage rendering.
    pub const DEFAULT_COLOR: [u8; 4] = [0x2e, 0x7d, 0x32, 0xff];

    /// Coverage of the given areas in the default colour.
    pub fn coverage(areas: Vec<GeoBounds>) -> Self {
        RendererConfig::Coverage {
            areas,
            color: Self::DEFAULT_COLOR,
        }
    }
}

impl RendererFactory for RendererConfig {
    fn create(&self) -> Result<Box<dyn Renderer>, RenderError> {
        match self {
            RendererConfig::Coverage { areas, color } => {
                if areas.is_empty() {
                    return Err(RenderError::Unavailable(
                        "coverage renderer needs at least one area".to_string(),
                    ));
                }
                Ok(Box::new(CoverageRenderer::new(areas.clone(), *color)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_image_size() {
        let request = MetatileRequest::new(TileCoord::new(4, 8, 0), 8);
        assert_eq!(request.image_size, 2048);
        assert_eq!(request.bounds, metatile_bounds(TileCoord::new(4, 8, 0), 8));
    }

    #[test]
    fn test_factory_builds_coverage_renderer() {
        let config = RendererConfig::coverage(vec![GeoBounds::world()]);
        let mut renderer = config.create().unwrap();

        let image = renderer
            .render(&MetatileRequest::new(TileCoord::new(0, 0, 0), 1))
            .unwrap();
        assert_eq!(image.dimensions(), (256, 256));
    }

    #[test]
    fn test_factory_rejects_empty_coverage() {
        let config = RendererConfig::coverage(Vec::new());
        assert!(matches!(config.create(), Err(RenderError::Unavailable(_))));
    }

    #[test]
    fn test_config_json_shape() {
        let config = RendererConfig::Coverage {
            areas: vec![GeoBounds::world()],
            color: [1, 2, 3, 4],
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"kind\":\"coverage\""));

        let back: RendererConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
