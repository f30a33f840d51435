// convolution.rs — Correlation primitives for Image<T>.
//
// Three shapes of filter are needed by the rest of the crate:
//
//   convolve_rows / convolve_cols  — 1D passes, clamp (replicate) border.
//                                    Gradients are built from these.
//   convolve_separable             — both passes, e.g. Sobel.
//   correlate_2d_strided           — dense 2D kernel, zero padding, stride.
//                                    SIFT spatial pooling uses this.
//
// All of them compute *correlation* (the kernel is not flipped), the same
// convention a deep-learning conv2d uses. For the derivative taps
// [-0.5, 0, 0.5] that yields (I(x+1) - I(x-1)) / 2.
//
// BORDER HANDLING for the 1D passes: out-of-bounds indices are clamped to
// the nearest edge pixel, which matches "replicate" padding.

use crate::image::{Image, Pixel};

#[inline]
fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

/// Correlate each row of `src` with a centered odd-length 1D kernel
/// (horizontal pass).
///
/// Interior pixels, where the whole kernel fits inside the row, skip the
/// per-tap clamp and bounds check.
///
/// # Panics
/// Panics if the kernel is empty or has even length.
pub fn convolve_rows<T: Pixel>(src: &Image<T>, kernel: &[f32]) -> Image<f32> {
    assert!(!kernel.is_empty(), "kernel must not be empty");
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());

    let w = src.width();
    let h = src.height();
    let half = kernel.len() / 2;
    let mut dst = Image::<f32>::new(w, h);

    let clamped = |x: usize, y: usize| -> f32 {
        kernel
            .iter()
            .enumerate()
            .map(|(ki, &kv)| {
                let sx = clamp_index(x as isize + ki as isize - half as isize, w);
                src.get(sx, y).to_f32() * kv
            })
            .sum()
    };

    for y in 0..h {
        for x in 0..w {
            let interior = x >= half && x + half < w;
            let acc = if interior {
                let mut acc = 0.0f32;
                // SAFETY: x - half >= 0 and x + half < w.
                unsafe {
                    for (ki, &kv) in kernel.iter().enumerate() {
                        acc += src.get_unchecked(x + ki - half, y).to_f32() * kv;
                    }
                }
                acc
            } else {
                clamped(x, y)
            };
            // SAFETY: x < w, y < h.
            unsafe { dst.set_unchecked(x, y, acc) };
        }
    }
    dst
}

/// Correlate each column of `src` with a centered odd-length 1D kernel
/// (vertical pass). Same border rule as `convolve_rows`.
///
/// # Panics
/// Panics if the kernel is empty or has even length.
pub fn convolve_cols<T: Pixel>(src: &Image<T>, kernel: &[f32]) -> Image<f32> {
    assert!(!kernel.is_empty(), "kernel must not be empty");
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());

    let w = src.width();
    let h = src.height();
    let half = kernel.len() / 2;
    let mut dst = Image::<f32>::new(w, h);

    for y in 0..h {
        let interior = y >= half && y + half < h;
        for x in 0..w {
            let mut acc = 0.0f32;
            if interior {
                // SAFETY: y - half >= 0 and y + half < h.
                unsafe {
                    for (ki, &kv) in kernel.iter().enumerate() {
                        acc += src.get_unchecked(x, y + ki - half).to_f32() * kv;
                    }
                }
            } else {
                for (ki, &kv) in kernel.iter().enumerate() {
                    let sy = clamp_index(y as isize + ki as isize - half as isize, h);
                    acc += src.get(x, sy).to_f32() * kv;
                }
            }
            // SAFETY: x < w, y < h.
            unsafe { dst.set_unchecked(x, y, acc) };
        }
    }
    dst
}

/// Separable 2D correlation: horizontal pass then vertical pass.
///
/// # Panics
/// Panics if either kernel is empty or has even length.
pub fn convolve_separable<T: Pixel>(
    src: &Image<T>,
    kernel_row: &[f32],
    kernel_col: &[f32],
) -> Image<f32> {
    let intermediate = convolve_rows(src, kernel_row);
    convolve_cols(&intermediate, kernel_col)
}

/// Output extent of a strided, zero-padded correlation along one axis:
/// `(len + 2 * pad - ksize) / stride + 1`, or `None` when the padded input
/// is shorter than the kernel.
pub fn strided_output_len(len: usize, ksize: usize, stride: usize, pad: usize) -> Option<usize> {
    if stride == 0 || ksize == 0 {
        return None;
    }
    (len + 2 * pad)
        .checked_sub(ksize)
        .map(|span| span / stride + 1)
}

/// Dense 2D correlation with zero padding and a uniform stride.
///
/// Output pixel (ox, oy) is the sum over the kernel window whose top-left
/// corner sits at (ox * stride - pad, oy * stride - pad) in the input.
/// Taps that fall outside the input read zero.
///
/// # Panics
/// Panics if the padded input is smaller than the kernel or `stride == 0`.
pub fn correlate_2d_strided(
    src: &Image<f32>,
    kernel: &Image<f32>,
    stride: usize,
    pad: usize,
) -> Image<f32> {
    let out_w = strided_output_len(src.width(), kernel.width(), stride, pad)
        .expect("padded input narrower than kernel (or zero stride)");
    let out_h = strided_output_len(src.height(), kernel.height(), stride, pad)
        .expect("padded input shorter than kernel (or zero stride)");

    let mut dst = Image::<f32>::new(out_w, out_h);
    for oy in 0..out_h {
        for ox in 0..out_w {
            let mut acc = 0.0f32;
            for ky in 0..kernel.height() {
                let Some(sy) = (oy * stride + ky).checked_sub(pad) else { continue };
                if sy >= src.height() {
                    break;
                }
                let src_row = src.row(sy);
                let k_row = kernel.row(ky);
                for (kx, &kv) in k_row.iter().enumerate() {
                    let Some(sx) = (ox * stride + kx).checked_sub(pad) else { continue };
                    if sx >= src.width() {
                        break;
                    }
                    acc += src_row[sx] * kv;
                }
            }
            dst.set(ox, oy, acc);
        }
    }
    dst
}

/// 1D Gaussian of length `ksize`, normalized to sum to 1.
///
/// Taps sit at `i - ksize / 2`; even lengths shift by +0.5 so the window
/// stays centered between the two middle taps. Even sizes are accepted
/// because SIFT weights a patch of arbitrary side length.
///
/// # Examples
/// ```
/// let k = morphsift::convolution::gaussian_kernel_1d(5, 1.0);
/// assert_eq!(k.len(), 5);
/// assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
/// ```
///
/// # Panics
/// Panics if `ksize == 0` or `sigma <= 0`.
pub fn gaussian_kernel_1d(ksize: usize, sigma: f32) -> Vec<f32> {
    assert!(ksize > 0, "kernel size must be positive");
    assert!(sigma > 0.0, "sigma must be positive");
    let two_sigma_sq = 2.0 * sigma * sigma;
    let shift = if ksize % 2 == 0 { 0.5 } else { 0.0 };

    let mut kernel: Vec<f32> = (0..ksize)
        .map(|i| {
            let x = i as f32 - (ksize / 2) as f32 + shift;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();

    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// 2D Gaussian window `kh × kw` as the outer product of two 1D kernels.
/// Sums to 1.
pub fn gaussian_kernel_2d(kw: usize, kh: usize, sigma_x: f32, sigma_y: f32) -> Image<f32> {
    let gx = gaussian_kernel_1d(kw, sigma_x);
    let gy = gaussian_kernel_1d(kh, sigma_y);
    Image::from_fn(kw, kh, |x, y| gy[y] * gx[x])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussian_odd_properties() {
        let k = gaussian_kernel_1d(5, 1.0);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!((k[0] - k[4]).abs() < 1e-6);
        assert!((k[1] - k[3]).abs() < 1e-6);
        assert!(k[2] > k[1] && k[1] > k[0]);
    }

    #[test]
    fn test_gaussian_even_is_symmetric_with_two_peaks() {
        let k = gaussian_kernel_1d(6, 2.0);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        for i in 0..3 {
            assert!((k[i] - k[5 - i]).abs() < 1e-6, "tap {i} not mirrored");
        }
        assert!((k[2] - k[3]).abs() < 1e-7);
        assert!(k[2] > k[1]);
    }

    #[test]
    fn test_gaussian_2d_sums_to_one() {
        let g = gaussian_kernel_2d(7, 4, 2.0, 1.5);
        assert_eq!((g.width(), g.height()), (7, 4));
        let total: f32 = g.pixels().map(|(_, _, v)| v).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_identity_kernel() {
        let img = Image::from_vec(4, 3, (0..12u8).collect());
        let kernel = [0.0, 0.0, 1.0, 0.0, 0.0];
        let out = convolve_separable(&img, &kernel, &kernel);
        for (x, y, v) in out.pixels() {
            assert!((v - img.get(x, y).to_f32()).abs() < 1e-6, "mismatch at ({x}, {y})");
        }
    }

    #[test]
    fn test_clamp_border_rows_and_cols() {
        // [10, 20, 30] with [0.25, 0.5, 0.25]: x=0 reads 10, 10, 20.
        let img = Image::from_vec(3, 1, vec![10.0f32, 20.0, 30.0]);
        let out = convolve_rows(&img, &[0.25, 0.5, 0.25]);
        assert!((out.get(0, 0) - 12.5).abs() < 1e-6);
        assert!((out.get(2, 0) - 27.5).abs() < 1e-6);

        let col = Image::from_vec(1, 3, vec![10.0f32, 20.0, 30.0]);
        let out = convolve_cols(&col, &[0.25, 0.5, 0.25]);
        assert!((out.get(0, 0) - 12.5).abs() < 1e-6);
    }

    #[test]
    fn test_derivative_taps_are_correlation() {
        let img = Image::from_fn(5, 1, |x, _| (x * x) as f32);
        let d = convolve_rows(&img, &[-0.5, 0.0, 0.5]);
        // (I(2) - I(0)) / 2 = (4 - 0) / 2
        assert!((d.get(1, 0) - 2.0).abs() < 1e-6);
        // replicate at the right edge: (I(4) - I(3)) / 2
        assert!((d.get(4, 0) - 3.5).abs() < 1e-6);
    }

    #[test]
    fn test_strided_output_len() {
        assert_eq!(strided_output_len(41, 20, 13, 5), Some(3));
        assert_eq!(strided_output_len(32, 12, 8, 3), Some(4));
        assert_eq!(strided_output_len(3, 8, 1, 0), None);
        assert_eq!(strided_output_len(3, 3, 0, 0), None);
    }

    #[test]
    fn test_correlate_2d_strided_box() {
        // 4×4 ones, 2×2 box, stride 2, no padding → four sums of 4.
        let img = Image::from_vec(4, 4, vec![1.0f32; 16]);
        let k = Image::from_vec(2, 2, vec![1.0f32; 4]);
        let out = correlate_2d_strided(&img, &k, 2, 0);
        assert_eq!((out.width(), out.height()), (2, 2));
        assert!(out.pixels().all(|(_, _, v)| (v - 4.0).abs() < 1e-6));
    }

    #[test]
    fn test_correlate_2d_strided_zero_padding() {
        // 2×2 ones, 3×3 ones, pad 1, stride 1 → each output sees all 4 pixels.
        let img = Image::from_vec(2, 2, vec![1.0f32; 4]);
        let k = Image::from_vec(3, 3, vec![1.0f32; 9]);
        let out = correlate_2d_strided(&img, &k, 1, 1);
        assert_eq!((out.width(), out.height()), (2, 2));
        assert!(out.pixels().all(|(_, _, v)| (v - 4.0).abs() < 1e-6));
    }

    #[test]
    #[should_panic(expected = "odd")]
    fn test_even_kernel_panics() {
        let img = Image::from_vec(4, 4, vec![0.0f32; 16]);
        convolve_rows(&img, &[0.5, 0.5]);
    }
}
