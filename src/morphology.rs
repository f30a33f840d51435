// morphology.rs — Grayscale erosion and dilation by a flat kernel plus an
// optional non-flat structuring element.
//
// The kernel selects which taps of the kh×kw window take part; the
// structuring element adds a per-tap offset. Both are folded into one
// "neighbourhood" array up front:
//
//   nb[i, j] = se[i, j]     where kernel[i, j] != 0
//            = -max_val     where kernel[i, j] == 0
//
// so an inactive tap can never win the min/max:
//
//   erosion   out[y, x] = min_{i,j}  in[y + i - oy, x + j - ox] - nb[i, j]
//   dilation  out[y, x] = max_{i,j}  in[y + i - oy, x + j - ox] + nb[kh-1-i, kw-1-j]
//
// (oy, ox) is the origin: the tap that sits on the output pixel. Dilation
// reflects the neighbourhood, erosion does not.
//
// Samples outside the image are resolved by the border mode:
//
//   Geodesic     never wins: +max_val for erosion, -max_val for dilation
//   Constant(v)  v
//   Replicate    nearest edge pixel        aaa|abcd|ddd
//   Reflect      mirror, edge not repeated dcb|abcd|cba
//
// Reflect only works while the padding on each side is smaller than the
// image extent on that axis.
//
// Ties resolve to the first tap in raster order; the backward pass routes
// gradients to that same tap. A NaN anywhere in the window is the result,
// and the first NaN tap is the one the backward pass credits.

use ndarray::{s, Array2, Array4, ArrayBase, ArrayView4, Data, Dimension};
use tracing::debug;

use crate::convert::{array_to_image, image_to_array};
use crate::error::{self, Result};
use crate::image::Image;
use crate::tensor::{as_bchw, as_kernel};

/// How samples outside the image are filled.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BorderType {
    /// Out-of-image samples never influence the result.
    #[default]
    Geodesic,
    /// Out-of-image samples read a fixed value.
    Constant(f32),
    /// Clamp to the nearest edge pixel.
    Replicate,
    /// Mirror about the edge pixel, without repeating it.
    Reflect,
}

/// Options shared by every morphological operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MorphologyConfig {
    /// `(row, col)` of the kernel tap anchored on the output pixel.
    /// `None` means the kernel centre `(kh / 2, kw / 2)`.
    pub origin: Option<(usize, usize)>,
    pub border: BorderType,
    /// Magnitude used for inactive taps and geodesic padding.
    pub max_val: f32,
}

impl Default for MorphologyConfig {
    fn default() -> Self {
        MorphologyConfig {
            origin: None,
            border: BorderType::Geodesic,
            max_val: 1e4,
        }
    }
}

impl MorphologyConfig {
    pub fn with_origin(mut self, row: usize, col: usize) -> Self {
        self.origin = Some((row, col));
        self
    }

    pub fn with_border(mut self, border: BorderType) -> Self {
        self.border = border;
        self
    }

    pub fn with_max_val(mut self, max_val: f32) -> Self {
        self.max_val = max_val;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MorphOp {
    Erode,
    Dilate,
}

impl MorphOp {
    fn name(self) -> &'static str {
        match self {
            MorphOp::Erode => "erode",
            MorphOp::Dilate => "dilate",
        }
    }
}

/// Gradients of a scalar loss with respect to the inputs of an erosion or
/// dilation.
#[derive(Debug, Clone)]
pub struct MorphologyGrad {
    /// Same shape as the input batch.
    pub input: Array4<f32>,
    /// Same shape as the kernel. Zero at inactive taps.
    pub structuring_element: Array2<f32>,
}

/// The sample that won the min/max for one output pixel.
struct Winner {
    value: f32,
    /// Raster index into the kh×kw window.
    tap: usize,
    /// Image pixel `(x, y)` the value was read from; `None` for fill values.
    source: Option<(usize, usize)>,
}

/// A reusable morphological operator.
///
/// ```
/// use ndarray::{array, Array4};
/// use morphsift::morphology::Morphology;
///
/// let cross = array![[0.0f32, 1.0, 0.0], [1.0, 1.0, 1.0], [0.0, 1.0, 0.0]];
/// let op = Morphology::new(&cross).unwrap();
/// let x = Array4::<f32>::ones((1, 1, 5, 5));
/// assert_eq!(op.erode(&x).unwrap().dim(), (1, 1, 5, 5));
/// ```
#[derive(Debug, Clone)]
pub struct Morphology {
    kh: usize,
    kw: usize,
    kernel: Vec<f32>,
    structuring: Vec<f32>,
    neighborhood: Vec<f32>,
    origin: (usize, usize),
    config: MorphologyConfig,
}

impl Morphology {
    /// Flat operator from a 2-D kernel. Non-zero entries are active taps.
    ///
    /// # Errors
    /// `Shape` if `kernel` is not a non-empty 2-D array.
    pub fn new<S, D>(kernel: &ArrayBase<S, D>) -> Result<Self>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let k = as_kernel(kernel, "kernel")?;
        let (kh, kw) = k.dim();
        let mut op = Morphology {
            kh,
            kw,
            kernel: k.iter().copied().collect(),
            structuring: vec![0.0; kh * kw],
            neighborhood: Vec::new(),
            origin: (kh / 2, kw / 2),
            config: MorphologyConfig::default(),
        };
        op.rebuild_neighborhood();
        Ok(op)
    }

    /// Attach a non-flat structuring element of the kernel's shape.
    ///
    /// # Errors
    /// `Shape` if the element is not 2-D or its shape differs from the kernel.
    pub fn with_structuring_element<S, D>(mut self, se: &ArrayBase<S, D>) -> Result<Self>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let se = as_kernel(se, "structuring element")?;
        if se.dim() != (self.kh, self.kw) {
            return Err(error::shape(format!(
                "structuring element shape {:?} does not match kernel shape {:?}",
                se.shape(),
                [self.kh, self.kw]
            )));
        }
        self.structuring = se.iter().copied().collect();
        self.rebuild_neighborhood();
        Ok(self)
    }

    /// Replace the origin / border / max_val options.
    ///
    /// # Errors
    /// `InvalidArgument` if the origin lies outside the kernel or `max_val`
    /// is not finite and positive.
    pub fn with_config(mut self, config: MorphologyConfig) -> Result<Self> {
        if !(config.max_val.is_finite() && config.max_val > 0.0) {
            return Err(error::invalid(format!(
                "max_val must be finite and positive, got {}",
                config.max_val
            )));
        }
        let origin = config.origin.unwrap_or((self.kh / 2, self.kw / 2));
        if origin.0 >= self.kh || origin.1 >= self.kw {
            return Err(error::invalid(format!(
                "origin {origin:?} lies outside the {}×{} kernel",
                self.kh, self.kw
            )));
        }
        self.origin = origin;
        self.config = config;
        self.rebuild_neighborhood();
        Ok(self)
    }

    /// `(rows, cols)` of the kernel.
    pub fn kernel_size(&self) -> (usize, usize) {
        (self.kh, self.kw)
    }

    /// Resolved `(row, col)` origin.
    pub fn origin(&self) -> (usize, usize) {
        self.origin
    }

    pub fn config(&self) -> &MorphologyConfig {
        &self.config
    }

    /// Row-major kh×kw neighbourhood (structuring element with inactive taps
    /// set to `-max_val`).
    pub(crate) fn neighborhood(&self) -> &[f32] {
        &self.neighborhood
    }

    fn rebuild_neighborhood(&mut self) {
        let inactive = -self.config.max_val;
        self.neighborhood = self
            .kernel
            .iter()
            .zip(&self.structuring)
            .map(|(&k, &se)| if k == 0.0 { inactive } else { se })
            .collect();
    }

    /// Value read for an out-of-image sample under geodesic / constant
    /// borders.
    pub(crate) fn fill_value(&self, op: MorphOp) -> f32 {
        match (self.config.border, op) {
            (BorderType::Constant(v), _) => v,
            (_, MorphOp::Erode) => self.config.max_val,
            (_, MorphOp::Dilate) => -self.config.max_val,
        }
    }

    /// Reflect padding must be narrower than the image on every side.
    pub(crate) fn check_border_fits(&self, height: usize, width: usize) -> Result<()> {
        if self.config.border != BorderType::Reflect {
            return Ok(());
        }
        let (oy, ox) = self.origin;
        let pad_y = oy.max(self.kh - oy - 1);
        let pad_x = ox.max(self.kw - ox - 1);
        if pad_y >= height || pad_x >= width {
            return Err(error::invalid(format!(
                "reflect padding ({pad_y}, {pad_x}) must be smaller than the image extent ({height}, {width})"
            )));
        }
        Ok(())
    }

    #[inline]
    fn flipped(&self, tap: usize) -> usize {
        self.kh * self.kw - 1 - tap
    }

    /// Map a possibly out-of-range coordinate to an image coordinate, or
    /// `None` when the border mode fills instead.
    #[inline]
    fn resolve(&self, c: isize, len: usize) -> Option<usize> {
        let last = len as isize - 1;
        if (0..=last).contains(&c) {
            return Some(c as usize);
        }
        match self.config.border {
            BorderType::Replicate => Some(c.clamp(0, last) as usize),
            BorderType::Reflect => Some((if c < 0 { -c } else { 2 * last - c }) as usize),
            BorderType::Geodesic | BorderType::Constant(_) => None,
        }
    }

    fn window(&self, plane: &Image<f32>, op: MorphOp, x: usize, y: usize) -> Winner {
        let (oy, ox) = self.origin;
        let fill = self.fill_value(op);
        let mut best = Winner {
            value: match op {
                MorphOp::Erode => f32::INFINITY,
                MorphOp::Dilate => f32::NEG_INFINITY,
            },
            tap: 0,
            source: None,
        };

        for i in 0..self.kh {
            let sy = self.resolve(y as isize + i as isize - oy as isize, plane.height());
            for j in 0..self.kw {
                let sx = self.resolve(x as isize + j as isize - ox as isize, plane.width());
                let source = sx.zip(sy);
                let v = source.map_or(fill, |(sx, sy)| plane.get(sx, sy));
                let tap = i * self.kw + j;

                let (candidate, better) = match op {
                    MorphOp::Erode => {
                        let c = v - self.neighborhood[tap];
                        (c, c < best.value)
                    }
                    MorphOp::Dilate => {
                        let c = v + self.neighborhood[self.flipped(tap)];
                        (c, c > best.value)
                    }
                };
                if candidate.is_nan() {
                    return Winner { value: candidate, tap, source };
                }
                if better {
                    best = Winner { value: candidate, tap, source };
                }
            }
        }
        best
    }

    fn apply_plane(&self, plane: &Image<f32>, op: MorphOp) -> Image<f32> {
        Image::from_fn(plane.width(), plane.height(), |x, y| {
            self.window(plane, op, x, y).value
        })
    }

    fn apply<S, D>(&self, tensor: &ArrayBase<S, D>, op: MorphOp) -> Result<Array4<f32>>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let x = as_bchw(tensor, "tensor")?;
        let (b, c, h, w) = x.dim();
        self.check_border_fits(h, w)?;
        debug!(op = op.name(), b, c, h, w, kh = self.kh, kw = self.kw, "morphology");

        let mut out = Array4::<f32>::zeros((b, c, h, w));
        for bi in 0..b {
            for ci in 0..c {
                let plane = array_to_image(x.slice(s![bi, ci, .., ..]));
                let result = self.apply_plane(&plane, op);
                out.slice_mut(s![bi, ci, .., ..]).assign(&image_to_array(&result));
            }
        }
        Ok(out)
    }

    /// Erode a single plane.
    pub fn erode_image(&self, plane: &Image<f32>) -> Result<Image<f32>> {
        self.check_border_fits(plane.height(), plane.width())?;
        Ok(self.apply_plane(plane, MorphOp::Erode))
    }

    /// Dilate a single plane.
    pub fn dilate_image(&self, plane: &Image<f32>) -> Result<Image<f32>> {
        self.check_border_fits(plane.height(), plane.width())?;
        Ok(self.apply_plane(plane, MorphOp::Dilate))
    }

    /// Erode a `B × C × H × W` batch. Output has the input's shape.
    pub fn erode<S, D>(&self, tensor: &ArrayBase<S, D>) -> Result<Array4<f32>>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        self.apply(tensor, MorphOp::Erode)
    }

    /// Dilate a `B × C × H × W` batch. Output has the input's shape.
    pub fn dilate<S, D>(&self, tensor: &ArrayBase<S, D>) -> Result<Array4<f32>>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        self.apply(tensor, MorphOp::Dilate)
    }

    /// Erosion followed by dilation.
    pub fn open<S, D>(&self, tensor: &ArrayBase<S, D>) -> Result<Array4<f32>>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let eroded = self.erode(tensor)?;
        self.dilate(&eroded)
    }

    /// Dilation followed by erosion.
    pub fn close<S, D>(&self, tensor: &ArrayBase<S, D>) -> Result<Array4<f32>>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let dilated = self.dilate(tensor)?;
        self.erode(&dilated)
    }

    /// `dilate(x) - erode(x)`.
    pub fn gradient<S, D>(&self, tensor: &ArrayBase<S, D>) -> Result<Array4<f32>>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        Ok(&self.dilate(tensor)? - &self.erode(tensor)?)
    }

    /// White top-hat: `x - open(x)`.
    pub fn top_hat<S, D>(&self, tensor: &ArrayBase<S, D>) -> Result<Array4<f32>>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let opened = self.open(tensor)?;
        let x = as_bchw(tensor, "tensor")?;
        Ok(&x - &opened)
    }

    /// Black top-hat: `close(x) - x`.
    pub fn bottom_hat<S, D>(&self, tensor: &ArrayBase<S, D>) -> Result<Array4<f32>>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let closed = self.close(tensor)?;
        let x = as_bchw(tensor, "tensor")?;
        Ok(&closed - &x)
    }

    /// Gradient of `sum(grad_output * erode(tensor))` with respect to the
    /// input and the structuring element.
    pub fn erode_backward<S, D, S2, D2>(
        &self,
        tensor: &ArrayBase<S, D>,
        grad_output: &ArrayBase<S2, D2>,
    ) -> Result<MorphologyGrad>
    where
        S: Data<Elem = f32>,
        D: Dimension,
        S2: Data<Elem = f32>,
        D2: Dimension,
    {
        let x = as_bchw(tensor, "tensor")?;
        let g = as_bchw(grad_output, "grad_output")?;
        self.backward(x, g, MorphOp::Erode)
    }

    /// Gradient of `sum(grad_output * dilate(tensor))` with respect to the
    /// input and the structuring element.
    pub fn dilate_backward<S, D, S2, D2>(
        &self,
        tensor: &ArrayBase<S, D>,
        grad_output: &ArrayBase<S2, D2>,
    ) -> Result<MorphologyGrad>
    where
        S: Data<Elem = f32>,
        D: Dimension,
        S2: Data<Elem = f32>,
        D2: Dimension,
    {
        let x = as_bchw(tensor, "tensor")?;
        let g = as_bchw(grad_output, "grad_output")?;
        self.backward(x, g, MorphOp::Dilate)
    }

    fn backward(
        &self,
        x: ArrayView4<'_, f32>,
        g: ArrayView4<'_, f32>,
        op: MorphOp,
    ) -> Result<MorphologyGrad> {
        if x.dim() != g.dim() {
            return Err(error::shape(format!(
                "grad_output shape {:?} does not match tensor shape {:?}",
                g.shape(),
                x.shape()
            )));
        }
        let (b, c, h, w) = x.dim();
        self.check_border_fits(h, w)?;
        debug!(op = op.name(), b, c, h, w, "morphology backward");

        let mut grad_input = Array4::<f32>::zeros((b, c, h, w));
        let mut grad_se = vec![0.0f32; self.kh * self.kw];
        for bi in 0..b {
            for ci in 0..c {
                let plane = array_to_image(x.slice(s![bi, ci, .., ..]));
                for y in 0..h {
                    for xx in 0..w {
                        let go = g[[bi, ci, y, xx]];
                        if go == 0.0 {
                            continue;
                        }
                        let win = self.window(&plane, op, xx, y);
                        if let Some((sx, sy)) = win.source {
                            grad_input[[bi, ci, sy, sx]] += go;
                        }
                        match op {
                            MorphOp::Erode if self.kernel[win.tap] != 0.0 => {
                                grad_se[win.tap] -= go;
                            }
                            MorphOp::Dilate => {
                                let t = self.flipped(win.tap);
                                if self.kernel[t] != 0.0 {
                                    grad_se[t] += go;
                                }
                            }
                            MorphOp::Erode => {}
                        }
                    }
                }
            }
        }

        let kw = self.kw;
        Ok(MorphologyGrad {
            input: grad_input,
            structuring_element: Array2::from_shape_fn((self.kh, kw), |(i, j)| grad_se[i * kw + j]),
        })
    }
}

/// Flat erosion of a `B × C × H × W` batch with default options.
pub fn erosion<S, D, SK, DK>(tensor: &ArrayBase<S, D>, kernel: &ArrayBase<SK, DK>) -> Result<Array4<f32>>
where
    S: Data<Elem = f32>,
    D: Dimension,
    SK: Data<Elem = f32>,
    DK: Dimension,
{
    Morphology::new(kernel)?.erode(tensor)
}

/// Flat dilation of a `B × C × H × W` batch with default options.
pub fn dilation<S, D, SK, DK>(tensor: &ArrayBase<S, D>, kernel: &ArrayBase<SK, DK>) -> Result<Array4<f32>>
where
    S: Data<Elem = f32>,
    D: Dimension,
    SK: Data<Elem = f32>,
    DK: Dimension,
{
    Morphology::new(kernel)?.dilate(tensor)
}

pub fn opening<S, D, SK, DK>(tensor: &ArrayBase<S, D>, kernel: &ArrayBase<SK, DK>) -> Result<Array4<f32>>
where
    S: Data<Elem = f32>,
    D: Dimension,
    SK: Data<Elem = f32>,
    DK: Dimension,
{
    Morphology::new(kernel)?.open(tensor)
}

pub fn closing<S, D, SK, DK>(tensor: &ArrayBase<S, D>, kernel: &ArrayBase<SK, DK>) -> Result<Array4<f32>>
where
    S: Data<Elem = f32>,
    D: Dimension,
    SK: Data<Elem = f32>,
    DK: Dimension,
{
    Morphology::new(kernel)?.close(tensor)
}

pub fn morphological_gradient<S, D, SK, DK>(
    tensor: &ArrayBase<S, D>,
    kernel: &ArrayBase<SK, DK>,
) -> Result<Array4<f32>>
where
    S: Data<Elem = f32>,
    D: Dimension,
    SK: Data<Elem = f32>,
    DK: Dimension,
{
    Morphology::new(kernel)?.gradient(tensor)
}

pub fn top_hat<S, D, SK, DK>(tensor: &ArrayBase<S, D>, kernel: &ArrayBase<SK, DK>) -> Result<Array4<f32>>
where
    S: Data<Elem = f32>,
    D: Dimension,
    SK: Data<Elem = f32>,
    DK: Dimension,
{
    Morphology::new(kernel)?.top_hat(tensor)
}

pub fn bottom_hat<S, D, SK, DK>(tensor: &ArrayBase<S, D>, kernel: &ArrayBase<SK, DK>) -> Result<Array4<f32>>
where
    S: Data<Elem = f32>,
    D: Dimension,
    SK: Data<Elem = f32>,
    DK: Dimension,
{
    Morphology::new(kernel)?.bottom_hat(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ramp(h: usize, w: usize) -> Image<f32> {
        Image::from_fn(w, h, |x, y| (y * w + x) as f32)
    }

    #[test]
    fn test_neighborhood_masks_inactive_taps() {
        let k = array![[0.0f32, 1.0], [1.0, 0.0]];
        let se = array![[5.0f32, 2.0], [3.0, 7.0]];
        let op = Morphology::new(&k).unwrap().with_structuring_element(&se).unwrap();
        assert_eq!(op.neighborhood(), &[-1e4, 2.0, 3.0, -1e4]);
    }

    #[test]
    fn test_default_origin_is_centre() {
        let op = Morphology::new(&Array2::<f32>::ones((4, 5))).unwrap();
        assert_eq!(op.origin(), (2, 2));
    }

    #[test]
    fn test_origin_shifts_window() {
        // 1×2 kernel anchored at its left tap: out[x] = min(in[x], in[x+1]).
        let op = Morphology::new(&array![[1.0f32, 1.0]])
            .unwrap()
            .with_config(MorphologyConfig::default().with_origin(0, 0))
            .unwrap();
        let img = Image::from_vec(4, 1, vec![4.0f32, 2.0, 3.0, 1.0]);
        let out = op.erode_image(&img).unwrap();
        assert_eq!(out.row(0), &[2.0, 2.0, 1.0, 1.0]);
    }

    #[test]
    fn test_constant_border_erodes_edges() {
        let op = Morphology::new(&Array2::<f32>::ones((3, 3)))
            .unwrap()
            .with_config(MorphologyConfig::default().with_border(BorderType::Constant(0.0)))
            .unwrap();
        let img = Image::from_fn(4, 4, |_, _| 1.0f32);
        let out = op.erode_image(&img).unwrap();
        assert_eq!(out.get(0, 0), 0.0);
        assert_eq!(out.get(1, 1), 1.0);
        assert_eq!(out.get(3, 2), 0.0);
    }

    #[test]
    fn test_replicate_and_reflect_differ_at_edges() {
        let k = array![[1.0f32, 1.0, 1.0]];
        let img = Image::from_vec(4, 1, vec![1.0f32, 5.0, 2.0, 0.5]);

        let rep = Morphology::new(&k)
            .unwrap()
            .with_config(MorphologyConfig::default().with_border(BorderType::Replicate))
            .unwrap();
        // left edge window: [1, 1, 5]
        assert_eq!(rep.dilate_image(&img).unwrap().get(0, 0), 5.0);

        let refl = Morphology::new(&k)
            .unwrap()
            .with_config(MorphologyConfig::default().with_border(BorderType::Reflect))
            .unwrap();
        // right edge window: [2, 0.5, 2]
        assert_eq!(refl.erode_image(&img).unwrap().get(3, 0), 0.5);
        assert_eq!(refl.dilate_image(&img).unwrap().get(3, 0), 2.0);
    }

    #[test]
    fn test_reflect_padding_too_wide() {
        let op = Morphology::new(&Array2::<f32>::ones((5, 5)))
            .unwrap()
            .with_config(MorphologyConfig::default().with_border(BorderType::Reflect))
            .unwrap();
        assert!(op.erode_image(&ramp(2, 8)).is_err());
        assert!(op.erode_image(&ramp(3, 3)).is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let op = Morphology::new(&Array2::<f32>::ones((3, 3))).unwrap();
        assert!(op.clone().with_config(MorphologyConfig::default().with_origin(3, 0)).is_err());
        assert!(op.clone().with_config(MorphologyConfig::default().with_max_val(0.0)).is_err());
        assert!(op.with_structuring_element(&Array2::<f32>::zeros((3, 2))).is_err());
    }

    #[test]
    fn test_opening_removes_bright_speck() {
        let mut img = Image::<f32>::new(7, 7);
        img.set(3, 3, 1.0);
        let x = crate::convert::image_to_batch(&img);
        let k = Array2::<f32>::ones((3, 3));
        let opened = opening(&x, &k).unwrap();
        assert!(opened.iter().all(|&v| v == 0.0));
        let th = top_hat(&x, &k).unwrap();
        assert_eq!(th[[0, 0, 3, 3]], 1.0);
    }

    #[test]
    fn test_gradient_is_dilate_minus_erode() {
        let x = crate::convert::image_to_batch(&ramp(5, 6));
        let k = Array2::<f32>::ones((3, 3));
        let g = morphological_gradient(&x, &k).unwrap();
        let d = dilation(&x, &k).unwrap();
        let e = erosion(&x, &k).unwrap();
        assert_eq!(g, &d - &e);
        assert!(g.iter().all(|&v| v >= 0.0));
    }
}
