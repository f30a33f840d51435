// convert.rs — Conversions between pixel types and between Image<T> and
// ndarray batches.
//
// Public operations take B×C×H×W `ndarray` arrays; the per-plane kernels
// work on `Image<f32>`. These helpers are the only place the two meet:
//
//   ArrayView2<f32>  ──array_to_image──▶  Image<f32>
//   Image<f32>       ──image_to_array──▶  Array2<f32>
//   Image<f32>       ──image_to_batch──▶  Array4<f32>  (1×1×H×W)
//
// Pixel-type conversions:
//   u8  → f32 normalized to [0, 1]   (what the descriptors expect)
//   f32 → u8  denormalized, clamped  (for saving results)

use ndarray::{Array2, Array4, ArrayView2, ArrayView4};

use crate::error::{self, Result};
use crate::image::{Image, Pixel};

/// Convert an Image<u8> to Image<f32> with values in [0.0, 1.0].
pub fn u8_to_f32_normalized(src: &Image<u8>) -> Image<f32> {
    src.map(|v| v as f32 / 255.0)
}

/// Convert an Image<f32> (assumed [0.0, 1.0]) to Image<u8>.
/// Values are clamped to [0, 255] and rounded.
pub fn f32_normalized_to_u8(src: &Image<f32>) -> Image<u8> {
    src.map(|v| u8::from_f32(v * 255.0))
}

/// Copy a 2-D array view into a tightly packed `Image<f32>`.
///
/// Works for any memory order: the view is read in logical (row, col)
/// order, so sliced or transposed views are fine.
pub fn array_to_image(view: ArrayView2<'_, f32>) -> Image<f32> {
    let (h, w) = view.dim();
    Image::from_vec(w, h, view.iter().copied().collect())
}

/// Copy an `Image<f32>` into an owned `H × W` array.
pub fn image_to_array(img: &Image<f32>) -> Array2<f32> {
    Array2::from_shape_fn((img.height(), img.width()), |(y, x)| img.get(x, y))
}

/// Wrap a single image as a `1 × 1 × H × W` batch.
pub fn image_to_batch(img: &Image<f32>) -> Array4<f32> {
    Array4::from_shape_fn((1, 1, img.height(), img.width()), |(_, _, y, x)| img.get(x, y))
}

/// Extract plane `(b, c)` of a batch as an `Image<f32>`.
pub fn batch_plane(batch: ArrayView4<'_, f32>, b: usize, c: usize) -> Result<Image<f32>> {
    let (nb, nc, _, _) = batch.dim();
    if b >= nb || c >= nc {
        return Err(error::shape(format!(
            "plane ({b}, {c}) out of range for batch with {nb} images × {nc} channels"
        )));
    }
    Ok(array_to_image(batch.slice(ndarray::s![b, c, .., ..])))
}
