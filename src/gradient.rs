// gradient.rs — First-order image gradients.
//
// Two operators, both separable and both built on convolution.rs, so the
// clamp/replicate border is inherited:
//
//   Diff   central difference     row: [-0.5, 0, 0.5]   col: [1]
//   Sobel  derivative + smoothing row: [-1, 0, 1]       col: [1, 2, 1]
//
// (swap row/col for the vertical gradient)
//
// `normalized` divides by the L1 norm of the full 2D kernel: 1 for Diff,
// 8 for Sobel. Diff is what the SIFT descriptor uses.
//
// The batched entry point returns B×C×2×H×W with [gx, gy] stacked on the
// third axis.

use ndarray::{s, Array5, ArrayBase, Data, Dimension};
use tracing::debug;

use crate::convert::{array_to_image, image_to_array};
use crate::convolution::{convolve_cols, convolve_rows, convolve_separable};
use crate::error::Result;
use crate::image::{Image, Pixel};
use crate::tensor::as_bchw;

const DIFF_DERIV: [f32; 3] = [-0.5, 0.0, 0.5];
const SOBEL_DERIV: [f32; 3] = [-1.0, 0.0, 1.0];
const SOBEL_SMOOTH: [f32; 3] = [1.0, 2.0, 1.0];

/// Which derivative operator to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradientMode {
    /// Central difference.
    #[default]
    Diff,
    /// 3×3 Sobel.
    Sobel,
}

impl GradientMode {
    /// Sum of absolute values of the 2D kernel.
    fn l1_norm(self) -> f32 {
        match self {
            GradientMode::Diff => 1.0,
            GradientMode::Sobel => 8.0,
        }
    }
}

/// Horizontal and vertical gradients of a single plane.
///
/// Positive gx means intensity increases to the right, positive gy means it
/// increases downward.
pub fn image_gradients<T: Pixel>(
    src: &Image<T>,
    mode: GradientMode,
    normalized: bool,
) -> (Image<f32>, Image<f32>) {
    let (mut gx, mut gy) = match mode {
        GradientMode::Diff => (convolve_rows(src, &DIFF_DERIV), convolve_cols(src, &DIFF_DERIV)),
        GradientMode::Sobel => (
            convolve_separable(src, &SOBEL_DERIV, &SOBEL_SMOOTH),
            convolve_separable(src, &SOBEL_SMOOTH, &SOBEL_DERIV),
        ),
    };

    let norm = mode.l1_norm();
    if normalized && norm != 1.0 {
        for img in [&mut gx, &mut gy] {
            for v in img.as_mut_slice() {
                *v /= norm;
            }
        }
    }
    (gx, gy)
}

/// Gradients of every plane in a `B × C × H × W` batch.
///
/// Returns `B × C × 2 × H × W`: index 0 on the third axis is gx, 1 is gy.
pub fn spatial_gradient<S, D>(
    input: &ArrayBase<S, D>,
    mode: GradientMode,
    normalized: bool,
) -> Result<Array5<f32>>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let x = as_bchw(input, "input")?;
    let (b, c, h, w) = x.dim();
    debug!(b, c, h, w, ?mode, normalized, "spatial_gradient");

    let mut out = Array5::<f32>::zeros((b, c, 2, h, w));
    for bi in 0..b {
        for ci in 0..c {
            let plane = array_to_image(x.slice(s![bi, ci, .., ..]));
            let (gx, gy) = image_gradients(&plane, mode, normalized);
            out.slice_mut(s![bi, ci, 0, .., ..]).assign(&image_to_array(&gx));
            out.slice_mut(s![bi, ci, 1, .., ..]).assign(&image_to_array(&gy));
        }
    }
    Ok(out)
}
