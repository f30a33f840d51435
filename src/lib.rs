// morphsift: SIFT patch descriptors and grayscale morphology.
//
// CPU reference implementations on `ndarray` batches (B×C×H×W, f32), with
// per-plane work done on the small `Image<T>` container. The optional
// `gpu` feature adds a wgpu compute path for morphology.

pub mod image;
pub mod convert;
pub mod convolution;
pub mod error;
pub mod gradient;
pub mod morphology;
pub mod sift;
pub mod telemetry;
pub mod tensor;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use error::{Error, Result};
pub use morphology::{BorderType, Morphology, MorphologyConfig, MorphologyGrad};
pub use sift::{SiftConfig, SiftDescriptor};
