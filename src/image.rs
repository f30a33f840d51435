// image.rs — Runtime-sized single-plane image, generic over pixel type.
//
// Every per-plane computation in this crate runs on `Image<T>`:
//   - gradients and separable correlation (gradient.rs, convolution.rs)
//   - SIFT orientation maps and pooling (sift.rs)
//   - windowed min/max for erosion and dilation (morphology.rs)
//
// Batched data (B×C×H×W) lives in `ndarray` arrays at the public API;
// convert.rs moves planes between the two representations. Planes are
// always tightly packed: pixel (x, y) sits at `y * width + x`.

use std::fmt;

// ---------------------------------------------------------------------------
// Pixel Trait
// ---------------------------------------------------------------------------

/// Trait for types that can serve as pixel values in an Image.
pub trait Pixel: Copy + Default + Send + Sync + PartialOrd + 'static {
    /// Convert this pixel value to f32 (raw, not normalized).
    fn to_f32(self) -> f32;

    /// Construct a pixel from an f32 value (with appropriate clamping/rounding).
    fn from_f32(v: f32) -> Self;
}

impl Pixel for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        // Raw cast. Use convert::u8_to_f32_normalized() for [0,1] mapping.
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v.clamp(0.0, 255.0).round() as u8
    }
}

impl Pixel for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------

/// A 2D plane with runtime dimensions, generic over pixel type `T`.
#[derive(Clone)]
pub struct Image<T: Pixel> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Pixel> Image<T> {
    /// Zero-initialized plane, used as an output buffer by the correlation passes.
    pub fn new(width: usize, height: usize) -> Self {
        Image {
            data: vec![T::default(); width * height],
            width,
            height,
        }
    }

    /// Wrap a row-major pixel vector.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image { data, width, height }
    }

    /// Build a plane by evaluating `f(x, y)` at every pixel.
    ///
    /// Used for analytic windows (Gaussian weighting, pooling kernels) and
    /// for every per-pixel morphology output.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Image { data, width, height }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at (x, y). x is column, y is row.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.width + x]
    }

    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn get_unchecked(&self, x: usize, y: usize) -> T {
        debug_assert!(x < self.width && y < self.height,
            "get_unchecked({x},{y}) out of bounds for {}x{}", self.width, self.height);
        *self.data.get_unchecked(y * self.width + x)
    }

    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn set_unchecked(&mut self, x: usize, y: usize, value: T) {
        debug_assert!(x < self.width && y < self.height);
        *self.data.get_unchecked_mut(y * self.width + x) = value;
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.bounds_check(x, y);
        self.data[y * self.width + x] = value;
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    /// Borrow a rectangular sub-region without copying.
    ///
    /// # Panics
    /// Panics if the sub-region extends beyond image bounds.
    pub fn sub_image(&self, x: usize, y: usize, w: usize, h: usize) -> ImageView<'_, T> {
        assert!(
            x + w <= self.width && y + h <= self.height,
            "sub_image region ({x},{y},{w},{h}) exceeds image bounds ({},{})",
            self.width,
            self.height,
        );
        ImageView {
            parent: self,
            x0: x,
            y0: y,
            width: w,
            height: h,
        }
    }

    /// All pixels as `(x, y, value)`, row-major.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let w = self.width.max(1);
        self.data.iter().enumerate().map(move |(i, &v)| (i % w, i / w, v))
    }

    /// Apply `f` to every pixel, possibly changing the pixel type.
    pub fn map<U: Pixel>(&self, f: impl FnMut(T) -> U) -> Image<U> {
        Image {
            data: self.data.iter().copied().map(f).collect(),
            width: self.width,
            height: self.height,
        }
    }

    /// Row-major pixel buffer, for in-place elementwise passes.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image<{}> {{ {}×{} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
        )?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(16) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > 16 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ImageView<'a, T>
// ---------------------------------------------------------------------------

/// Borrowed read-only window into an `Image<T>`; patch extraction copies
/// it out with [`to_owned_image`](Self::to_owned_image).
pub struct ImageView<'a, T: Pixel> {
    parent: &'a Image<T>,
    x0: usize,
    y0: usize,
    width: usize,
    height: usize,
}

impl<'a, T: Pixel> ImageView<'a, T> {
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at (x, y) in the view's coordinate system.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        assert!(
            x < self.width && y < self.height,
            "ImageView pixel ({x},{y}) out of bounds for view {}×{}",
            self.width,
            self.height,
        );
        self.parent.get(self.x0 + x, self.y0 + y)
    }

    pub fn to_owned_image(&self) -> Image<T> {
        Image::from_fn(self.width, self.height, |x, y| self.get(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fn_layout() {
        let img = Image::from_fn(3, 2, |x, y| (y * 10 + x) as f32);
        assert_eq!(img.row(0), &[0.0, 1.0, 2.0]);
        assert_eq!(img.row(1), &[10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_map_changes_pixel_type() {
        let img = Image::from_vec(2, 1, vec![0.25f32, 300.0]);
        let bytes: Image<u8> = img.map(u8::from_f32);
        assert_eq!(bytes.get(0, 0), 0);
        assert_eq!(bytes.get(1, 0), 255);
    }

    #[test]
    fn test_pixels_report_coordinates() {
        let img = Image::from_fn(3, 2, |x, y| (x + 3 * y) as u8);
        let px: Vec<_> = img.pixels().collect();
        assert_eq!(px.len(), 6);
        assert_eq!(px[4], (1, 1, 4));
        assert!(Image::<u8>::new(0, 5).pixels().next().is_none());
    }

    #[test]
    fn test_sub_image_touching_last_column() {
        let img = Image::from_vec(3, 3, (0..9u8).collect());
        let view = img.sub_image(1, 1, 2, 2);
        assert_eq!(view.get(1, 1), 8);
        assert_eq!(view.to_owned_image().row(0), &[4, 5]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_get_out_of_bounds() {
        let img: Image<u8> = Image::new(4, 4);
        img.get(4, 0);
    }

    #[test]
    #[should_panic(expected = "exceeds image bounds")]
    fn test_sub_image_past_edge() {
        let img: Image<f32> = Image::new(4, 4);
        img.sub_image(2, 2, 3, 1);
    }
}
