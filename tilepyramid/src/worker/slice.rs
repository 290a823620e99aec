//! Cutting a rendered metatile into single tiles.

use crate::coord::TILE_SIZE;
use image::{imageops, DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

/// Extracts tile `(i, j)` from a metatile image.
///
/// `i` is the column (x) and `j` the row (y) within the metatile.
pub(crate) fn tile_view(metatile: &RgbaImage, i: u32, j: u32) -> RgbaImage {
    imageops::crop_imm(metatile, i * TILE_SIZE, j * TILE_SIZE, TILE_SIZE, TILE_SIZE).to_image()
}

/// Returns true if every pixel is fully transparent.
pub(crate) fn is_empty(tile: &RgbaImage) -> bool {
    tile.pixels().all(|pixel| pixel.0[3] == 0)
}

/// Encodes a tile as PNG.
pub(crate) fn encode_png(tile: RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(tile).write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}
