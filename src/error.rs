// error.rs — Crate-wide error type.
//
// Two families of failure:
//   Shape           — an input has the wrong rank or extent
//                     (e.g. a B×C×H tensor where B×C×H×W is required).
//   InvalidArgument — a parameter combination that can never work
//                     (patch too small for the bin count, origin outside
//                     the kernel, reflect padding wider than the image).
//
// Everything is reported eagerly at call time. Nothing here is retryable.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("shape error: {0}")]
    Shape(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[cfg(feature = "gpu")]
    #[error("gpu error: {0}")]
    Gpu(#[from] crate::gpu::device::GpuError),
}

pub(crate) fn shape(msg: impl Into<String>) -> Error {
    Error::Shape(msg.into())
}

pub(crate) fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidArgument(msg.into())
}
