/// Greyscale raster to height grid.
///
/// Swiss-cheese layer: **Geometry Input** (image sources)
/// Transformations run in a fixed order: invert, flip, rotate, resample.
/// Rotation grows the canvas, so the grid geometry is re-derived from the
/// rotated image rather than patched in place.
use crate::error::{ReliefError, Result};
use crate::grid::{GridGeometry, HeightGrid};
use image::{GrayImage, Luma};
use tracing::debug;

/// Bit in `flip` that mirrors the image left to right.
pub const FLIP_HORIZONTAL: u8 = 2;
/// Bit in `flip` that mirrors the image top to bottom.
pub const FLIP_VERTICAL: u8 = 1;

const RIGHT_ANGLE_TOLERANCE: f64 = 1e-9;

/// Decode PNG/JPEG bytes into 8-bit greyscale.
pub fn decode_greyscale(bytes: &[u8]) -> Result<GrayImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ReliefError::ImageLoadFailed(e.to_string()))?;
    Ok(img.to_luma8())
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RasterOptions {
    pub invert: bool,
    /// Bitmask of [`FLIP_HORIZONTAL`] and [`FLIP_VERTICAL`].
    pub flip: u8,
    /// Counter-clockwise rotation of the placed image, in radians.
    pub rotation_z: f64,
}

/// Resamples a decoded image onto a height grid.
#[derive(Debug, Clone, Copy)]
pub struct RasterSampler {
    options: RasterOptions,
}

impl RasterSampler {
    pub fn new(options: RasterOptions) -> Self {
        Self { options }
    }

    /// Sample `image` onto a grid sized for `geometry`. The returned grid
    /// carries the geometry of the rotated image.
    pub fn sample(&self, image: &GrayImage, geometry: GridGeometry) -> Result<HeightGrid> {
        let original = image.dimensions();
        let prepared = self.prepare(image.clone());
        let geometry = geometry.rescaled(original, prepared.dimensions());
        if geometry.is_empty() || prepared.width() == 0 || prepared.height() == 0 {
            return Err(ReliefError::EmptyGrid(format!(
                "raster {}x{} sampled to {}x{} cells",
                prepared.width(),
                prepared.height(),
                geometry.columns,
                geometry.rows
            )));
        }

        let (w, h) = prepared.dimensions();
        let grid = HeightGrid::from_fn(geometry, |i, j| {
            let x = (i as f64 / geometry.columns as f64 * w as f64).floor() as u32;
            let y = (j as f64 / geometry.rows as f64 * h as f64).floor() as u32;
            Some(f64::from(prepared.get_pixel(x.min(w - 1), y.min(h - 1))[0]))
        });
        debug!(
            image_width = w,
            image_height = h,
            columns = geometry.columns,
            rows = geometry.rows,
            "raster sampled"
        );
        Ok(grid)
    }

    fn prepare(&self, mut img: GrayImage) -> GrayImage {
        if self.options.invert {
            image::imageops::invert(&mut img);
        }
        if self.options.flip & FLIP_HORIZONTAL != 0 {
            image::imageops::flip_horizontal_in_place(&mut img);
        }
        if self.options.flip & FLIP_VERTICAL != 0 {
            image::imageops::flip_vertical_in_place(&mut img);
        }
        rotate_ccw(img, self.options.rotation_z)
    }
}

/// Rotate counter-clockwise as seen on screen. Quarter turns are exact;
/// other angles land on an enlarged white canvas.
pub fn rotate_ccw(img: GrayImage, radians: f64) -> GrayImage {
    let turns = radians / std::f64::consts::FRAC_PI_2;
    if (turns - turns.round()).abs() < RIGHT_ANGLE_TOLERANCE {
        return match (turns.round() as i64).rem_euclid(4) {
            0 => img,
            1 => image::imageops::rotate270(&img),
            2 => image::imageops::rotate180(&img),
            _ => image::imageops::rotate90(&img),
        };
    }

    let (w, h) = (img.width() as f64, img.height() as f64);
    let (sin, cos) = radians.sin_cos();
    let out_w = (w * cos.abs() + h * sin.abs()).ceil().max(1.0) as u32;
    let out_h = (w * sin.abs() + h * cos.abs()).ceil().max(1.0) as u32;
    let mut out = GrayImage::from_pixel(out_w, out_h, Luma([255]));
    let (cx, cy) = (w / 2.0, h / 2.0);
    let (ox, oy) = (out_w as f64 / 2.0, out_h as f64 / 2.0);
    for (x, y, px) in out.enumerate_pixels_mut() {
        let dx = x as f64 + 0.5 - ox;
        let dy = y as f64 + 0.5 - oy;
        // inverse rotation, image rows grow downwards
        let sx = dx * cos - dy * sin + cx;
        let sy = dx * sin + dy * cos + cy;
        if sx >= 0.0 && sy >= 0.0 && sx < w && sy < h {
            *px = *img.get_pixel(sx as u32, sy as u32);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    fn gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| Luma([(x * 10) as u8]))
    }

    #[test]
    fn test_sample_identity() {
        let img = gradient(10, 4);
        let grid = RasterSampler::new(RasterOptions::default())
            .sample(&img, GridGeometry::new(10, 4, 1.0))
            .unwrap();
        assert_eq!(grid.get(3, 2), Some(30.0));
        assert_eq!(grid.columns(), 10);
    }

    #[test]
    fn test_downsample_uses_floor() {
        let img = gradient(10, 4);
        let grid = RasterSampler::new(RasterOptions::default())
            .sample(&img, GridGeometry::new(5, 2, 0.5))
            .unwrap();
        // column 2 of 5 reads pixel floor(2/5·10) = 4
        assert_eq!(grid.get(2, 0), Some(40.0));
    }

    #[test]
    fn test_invert_and_flip() {
        let img = gradient(10, 1);
        let options = RasterOptions {
            invert: true,
            flip: FLIP_HORIZONTAL,
            rotation_z: 0.0,
        };
        let grid = RasterSampler::new(options)
            .sample(&img, GridGeometry::new(10, 1, 1.0))
            .unwrap();
        // flipped: column 0 reads the old pixel 9 (90), inverted to 165
        assert_eq!(grid.get(0, 0), Some(165.0));
    }

    #[test]
    fn test_quarter_turn_rederives_geometry() {
        let img = gradient(10, 4);
        let options = RasterOptions {
            rotation_z: FRAC_PI_2,
            ..RasterOptions::default()
        };
        let geometry = GridGeometry::new(20, 8, 2.0);
        let grid = RasterSampler::new(options).sample(&img, geometry).unwrap();
        assert_eq!(grid.columns(), 8);
        assert_eq!(grid.rows(), 20);
        // counter-clockwise: the old right edge is now the top row
        assert_eq!(grid.get(0, 0), Some(90.0));
    }

    #[test]
    fn test_oblique_rotation_grows_white_canvas() {
        let img = GrayImage::from_pixel(10, 10, Luma([0]));
        let rotated = rotate_ccw(img, FRAC_PI_4);
        assert_eq!(rotated.width(), 15);
        assert_eq!(rotated.height(), 15);
        assert_eq!(rotated.get_pixel(0, 0)[0], 255);
        assert_eq!(rotated.get_pixel(7, 7)[0], 0);
    }

    #[test]
    fn test_decode_garbage_is_load_failure() {
        let err = decode_greyscale(b"not an image").unwrap_err();
        assert!(matches!(err, ReliefError::ImageLoadFailed(_)));
    }
}
