// tensor.rs — Rank validation for ndarray inputs.
//
// Public operations accept any `ndarray` array or view of f32, whatever its
// dimensionality type. A statically typed `Array4` passes through unchanged;
// a dynamic `ArrayD` is checked here at call time. Either way the caller gets
// a `Shape` error naming the expected layout instead of a panic deep inside
// an indexing loop.

use ndarray::{ArrayBase, ArrayView2, ArrayView4, Data, Dimension, Ix2, Ix4};

use crate::error::{self, Result};

/// View `x` as a `B × C × H × W` batch.
pub fn as_bchw<'a, S, D>(x: &'a ArrayBase<S, D>, what: &str) -> Result<ArrayView4<'a, f32>>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    x.view().into_dimensionality::<Ix4>().map_err(|_| {
        error::shape(format!(
            "{what} must have 4 dimensions (B, C, H, W), got shape {:?}",
            x.shape()
        ))
    })
}

/// View `x` as a 2-D `rows × cols` kernel.
pub fn as_kernel<'a, S, D>(x: &'a ArrayBase<S, D>, what: &str) -> Result<ArrayView2<'a, f32>>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let view = x.view().into_dimensionality::<Ix2>().map_err(|_| {
        error::shape(format!(
            "{what} must have 2 dimensions, got shape {:?}",
            x.shape()
        ))
    })?;
    if view.is_empty() {
        return Err(error::shape(format!("{what} must not be empty, got shape {:?}", x.shape())));
    }
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3, Array4, ArrayD, IxDyn};

    #[test]
    fn test_static_rank_passes() {
        let x = Array4::<f32>::zeros((2, 3, 4, 5));
        assert_eq!(as_bchw(&x, "input").unwrap().dim(), (2, 3, 4, 5));
    }

    #[test]
    fn test_dynamic_rank_checked() {
        let ok = ArrayD::<f32>::zeros(IxDyn(&[1, 1, 3, 3]));
        assert!(as_bchw(&ok, "input").is_ok());

        let bad = ArrayD::<f32>::zeros(IxDyn(&[1, 3, 3]));
        let err = as_bchw(&bad, "input").unwrap_err();
        assert!(err.to_string().contains("4 dimensions"), "{err}");
    }

    #[test]
    fn test_kernel_rank_and_emptiness() {
        assert!(as_kernel(&Array2::<f32>::ones((3, 5)), "kernel").is_ok());
        assert!(as_kernel(&Array3::<f32>::ones((2, 3, 4)), "kernel").is_err());
        assert!(as_kernel(&Array2::<f32>::ones((0, 3)), "kernel").is_err());
    }
}
