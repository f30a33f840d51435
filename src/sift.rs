// sift.rs — SIFT-style descriptor for square grayscale patches.
//
// Pipeline for one PS×PS patch:
//
//   1. Central-difference gradients gx, gy (replicate border).
//   2. Magnitude sqrt(gx² + gy² + eps), orientation atan2(gy, gx + eps) + 2π.
//   3. Magnitude weighted by a PS×PS Gaussian, sigma = PS / √2.
//   4. Soft orientation binning: each pixel splits its magnitude between
//      the two nearest of `num_ang_bins` orientation bins, linearly.
//   5. Each orientation map is pooled by a triangular (tent) kernel with
//      stride and zero padding chosen so that exactly
//      num_spatial_bins × num_spatial_bins cells come out.
//   6. Concatenate [angle][cell_y][cell_x], L2-normalize, clip at
//      `clipval`, L2-normalize again, optionally RootSIFT.
//
// The descriptor length is num_ang_bins * num_spatial_bins².
// Defaults (8 angles, 4×4 cells) give the classic 128.
//
// Pooling geometry for a patch size PS and n spatial bins:
//
//   ksize  = 2 * floor(PS / (n + 1))
//   stride = PS / n
//   pad    = ksize / 4
//
// e.g. PS = 41, n = 3 →  ksize 20, stride 13, pad 5 → 3 cells per side.
//      PS = 32, n = 4 →  ksize 12, stride  8, pad 3 → 4 cells per side.

use std::f32::consts::PI;
use std::fmt;

use ndarray::{Array2, Array4, ArrayBase, Data, Dimension};
use tracing::debug;

use crate::convert::{array_to_image, u8_to_f32_normalized};
use crate::convolution::{correlate_2d_strided, gaussian_kernel_2d, strided_output_len};
use crate::error::{self, Result};
use crate::gradient::{image_gradients, GradientMode};
use crate::image::Image;
use crate::tensor::as_bchw;

const EPS: f32 = 1e-10;
/// Lower bound on a vector norm before division.
const NORM_FLOOR: f32 = 1e-12;

/// Triangular pooling kernel of side `ksize`.
///
/// With k2 = ksize / 2, the 1D profile is `k2 - |i + 0.5 - k2|` and the 2D
/// kernel is the outer product scaled by 1 / k2².
///
/// # Errors
/// `ksize == 0` is an invalid argument.
pub fn get_sift_pooling_kernel(ksize: usize) -> Result<Array2<f32>> {
    if ksize == 0 {
        return Err(error::invalid("pooling kernel size must be positive"));
    }
    let k2 = ksize as f32 / 2.0;
    let profile: Vec<f32> = (0..ksize)
        .map(|i| k2 - (i as f32 + 0.5 - k2).abs())
        .collect();
    Ok(Array2::from_shape_fn((ksize, ksize), |(y, x)| {
        profile[y] * profile[x] / (k2 * k2)
    }))
}

/// Pooling kernel size, stride and padding that split a `patch_size` patch
/// into `num_spatial_bins` cells per side.
///
/// # Errors
/// Returns `InvalidArgument` when `num_spatial_bins` is zero or when the
/// patch is too small for the requested number of bins (the strided
/// output would not have exactly `num_spatial_bins` cells).
pub fn get_sift_bin_ksize_stride_pad(
    patch_size: usize,
    num_spatial_bins: usize,
) -> Result<(usize, usize, usize)> {
    if num_spatial_bins == 0 {
        return Err(error::invalid("number of spatial bins must be positive"));
    }
    let ksize = 2 * (patch_size / (num_spatial_bins + 1));
    let stride = patch_size / num_spatial_bins;
    let pad = ksize / 4;

    let out_size = strided_output_len(patch_size, ksize, stride, pad);
    if out_size != Some(num_spatial_bins) {
        return Err(error::invalid(format!(
            "patch size {patch_size} is incompatible with {num_spatial_bins} spatial bins \
             for the SIFT descriptor; usually the patch is too small for the bin count"
        )));
    }
    Ok((ksize, stride, pad))
}

/// SIFT descriptor configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiftConfig {
    /// Side length of the square input patches.
    pub patch_size: usize,
    /// Number of orientation bins.
    pub num_ang_bins: usize,
    /// Number of spatial cells per side.
    pub num_spatial_bins: usize,
    /// Apply RootSIFT (L1-normalize, then square root).
    pub rootsift: bool,
    /// Clip value applied after the first L2 normalization.
    pub clipval: f32,
}

impl Default for SiftConfig {
    /// The classic 41×41 patch, 8 orientations, 4×4 cells → 128 values.
    fn default() -> Self {
        SiftConfig {
            patch_size: 41,
            num_ang_bins: 8,
            num_spatial_bins: 4,
            rootsift: true,
            clipval: 0.2,
        }
    }
}

impl SiftConfig {
    /// Default configuration for a given patch size.
    pub fn new(patch_size: usize) -> Self {
        SiftConfig { patch_size, ..Default::default() }
    }

    pub fn with_ang_bins(mut self, num_ang_bins: usize) -> Self {
        self.num_ang_bins = num_ang_bins;
        self
    }

    pub fn with_spatial_bins(mut self, num_spatial_bins: usize) -> Self {
        self.num_spatial_bins = num_spatial_bins;
        self
    }

    pub fn with_rootsift(mut self, rootsift: bool) -> Self {
        self.rootsift = rootsift;
        self
    }

    pub fn with_clipval(mut self, clipval: f32) -> Self {
        self.clipval = clipval;
        self
    }

    /// Length of the descriptor this configuration produces.
    pub fn descriptor_len(&self) -> usize {
        self.num_ang_bins * self.num_spatial_bins * self.num_spatial_bins
    }
}

/// A SIFT descriptor extractor with its weighting and pooling windows
/// precomputed.
///
/// Construct once, call [`SiftDescriptor::describe`] for each batch.
#[derive(Clone)]
pub struct SiftDescriptor {
    config: SiftConfig,
    /// PS×PS Gaussian magnitude weighting.
    gaussian: Image<f32>,
    /// ksize×ksize tent kernel.
    pooling: Image<f32>,
    bin_stride: usize,
    pad: usize,
}

impl SiftDescriptor {
    /// Validate `config` and precompute the windows.
    ///
    /// # Errors
    /// `InvalidArgument` for a zero patch size or angle-bin count, a
    /// negative or non-finite clip value, or an incompatible
    /// patch size / spatial bin combination.
    pub fn new(config: SiftConfig) -> Result<Self> {
        if config.patch_size == 0 {
            return Err(error::invalid("patch size must be positive"));
        }
        if config.num_ang_bins == 0 {
            return Err(error::invalid("number of angular bins must be positive"));
        }
        if !(config.clipval.is_finite() && config.clipval >= 0.0) {
            return Err(error::invalid(format!(
                "clip value must be finite and non-negative, got {}",
                config.clipval
            )));
        }

        let (ksize, bin_stride, pad) =
            get_sift_bin_ksize_stride_pad(config.patch_size, config.num_spatial_bins)?;
        let pooling = array_to_image(get_sift_pooling_kernel(ksize)?.view());

        let ps = config.patch_size;
        let sigma = ps as f32 / std::f32::consts::SQRT_2;
        let gaussian = gaussian_kernel_2d(ps, ps, sigma, sigma);

        debug!(
            patch_size = ps,
            ksize, bin_stride, pad,
            descriptor_len = config.descriptor_len(),
            "built SIFT descriptor"
        );

        Ok(SiftDescriptor { config, gaussian, pooling, bin_stride, pad })
    }

    pub fn config(&self) -> &SiftConfig {
        &self.config
    }

    /// Length of each output descriptor.
    pub fn descriptor_len(&self) -> usize {
        self.config.descriptor_len()
    }

    /// Describe a batch of patches.
    ///
    /// `patches` must be `B × 1 × PS × PS` with PS equal to the configured
    /// patch size. Returns `B × D`.
    ///
    /// # Errors
    /// `Shape` if the input does not have that layout.
    pub fn describe<S, D>(&self, patches: &ArrayBase<S, D>) -> Result<Array2<f32>>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let x = as_bchw(patches, "patches")?;
        let (b, c, h, w) = x.dim();
        let ps = self.config.patch_size;
        if c != 1 || h != ps || w != ps {
            return Err(error::shape(format!(
                "invalid input shape {:?}, expected B×1×{ps}×{ps}",
                x.shape()
            )));
        }
        debug!(batch = b, patch_size = ps, "describe");

        let dim = self.descriptor_len();
        let mut out = Array2::<f32>::zeros((b, dim));
        for (bi, mut row) in out.outer_iter_mut().enumerate() {
            let patch = array_to_image(x.slice(ndarray::s![bi, 0, .., ..]));
            let desc = self.describe_patch(&patch);
            for (dst, src) in row.iter_mut().zip(desc) {
                *dst = src;
            }
        }
        Ok(out)
    }

    /// Describe a single PS×PS patch that has already been validated.
    fn describe_patch(&self, patch: &Image<f32>) -> Vec<f32> {
        let n_ang = self.config.num_ang_bins;
        let (gx, gy) = image_gradients(patch, GradientMode::Diff, true);

        let ps = self.config.patch_size;
        // For every pixel: lower bin index, and the magnitude going to the
        // lower and upper bins.
        let mut bin0 = vec![0usize; ps * ps];
        let mut w0 = vec![0.0f32; ps * ps];
        let mut w1 = vec![0.0f32; ps * ps];
        for y in 0..ps {
            for x in 0..ps {
                let dx = gx.get(x, y);
                let dy = gy.get(x, y);
                let mag = (dx * dx + dy * dy + EPS).sqrt() * self.gaussian.get(x, y);
                let ori = dy.atan2(dx + EPS) + 2.0 * PI;

                let o = n_ang as f32 * ori / (2.0 * PI);
                let o_floor = o.floor();
                let frac = o - o_floor;
                let i = y * ps + x;
                bin0[i] = (o_floor as i64).rem_euclid(n_ang as i64) as usize;
                w0[i] = (1.0 - frac) * mag;
                w1[i] = frac * mag;
            }
        }

        let mut desc = Vec::with_capacity(self.descriptor_len());
        for a in 0..n_ang {
            let weights = Image::from_fn(ps, ps, |x, y| {
                let i = y * ps + x;
                let lo = bin0[i];
                let hi = (lo + 1) % n_ang;
                let mut v = 0.0;
                if lo == a {
                    v += w0[i];
                }
                if hi == a {
                    v += w1[i];
                }
                v
            });
            let pooled = correlate_2d_strided(&weights, &self.pooling, self.bin_stride, self.pad);
            desc.extend(pooled.pixels().map(|(_, _, v)| v));
        }

        l2_normalize(&mut desc);
        for v in &mut desc {
            *v = v.clamp(0.0, self.config.clipval);
        }
        l2_normalize(&mut desc);

        if self.config.rootsift {
            l1_normalize(&mut desc);
            for v in &mut desc {
                *v = (*v + EPS).sqrt();
            }
        }
        desc
    }
}

impl fmt::Display for SiftDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.config;
        write!(
            f,
            "SiftDescriptor(num_ang_bins={}, num_spatial_bins={}, patch_size={}, rootsift={}, clipval={})",
            c.num_ang_bins, c.num_spatial_bins, c.patch_size, c.rootsift, c.clipval
        )
    }
}

impl fmt::Debug for SiftDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiftDescriptor")
            .field("config", &self.config)
            .field("pooling_ksize", &self.pooling.width())
            .field("bin_stride", &self.bin_stride)
            .field("pad", &self.pad)
            .finish()
    }
}

/// One-shot helper: build a descriptor for `config` and describe `patches`.
pub fn sift_describe<S, D>(patches: &ArrayBase<S, D>, config: SiftConfig) -> Result<Array2<f32>>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    SiftDescriptor::new(config)?.describe(patches)
}

/// Cut `patch_size × patch_size` patches centered on `centers` (x, y) out of
/// a grayscale image, normalized to [0, 1], as a `N × 1 × PS × PS` batch.
///
/// For even patch sizes the center is the pixel just right of / below the
/// geometric middle.
///
/// # Errors
/// `Shape` if any patch would extend beyond the image.
pub fn extract_patches(
    image: &Image<u8>,
    centers: &[(usize, usize)],
    patch_size: usize,
) -> Result<Array4<f32>> {
    if patch_size == 0 {
        return Err(error::invalid("patch size must be positive"));
    }
    let half = patch_size / 2;
    let mut out = Array4::<f32>::zeros((centers.len(), 1, patch_size, patch_size));
    for (i, &(cx, cy)) in centers.iter().enumerate() {
        let fits = cx >= half
            && cy >= half
            && cx - half + patch_size <= image.width()
            && cy - half + patch_size <= image.height();
        if !fits {
            return Err(error::shape(format!(
                "{patch_size}×{patch_size} patch at ({cx}, {cy}) leaves the {}×{} image",
                image.width(),
                image.height()
            )));
        }
        let patch = image
            .sub_image(cx - half, cy - half, patch_size, patch_size)
            .to_owned_image();
        let patch = u8_to_f32_normalized(&patch);
        for (x, y, v) in patch.pixels() {
            out[[i, 0, y, x]] = v;
        }
    }
    Ok(out)
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(NORM_FLOOR);
    for x in v.iter_mut() {
        *x /= norm;
    }
}

fn l1_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x.abs()).sum::<f32>().max(NORM_FLOOR);
    for x in v.iter_mut() {
        *x /= norm;
    }
}
