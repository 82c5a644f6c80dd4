use crate::error::{check_grad_shape, Result};
use ndarray::{Array, Dimension, Zip};

/// Pre-activation values kept by [`relu_forward`].
///
/// The raw input is kept instead of a boolean mask because the gradient is
/// gated on the sign of the original value.
#[derive(Debug, Clone)]
pub struct ReluCache<D: Dimension> {
    x: Array<f64, D>,
}

/// Elementwise `max(0, x)` over an array of any shape.
pub fn relu_forward<D: Dimension>(x: &Array<f64, D>) -> (Array<f64, D>, ReluCache<D>) {
    let out = x.mapv(|v| v.max(0.0));
    (out, ReluCache { x: x.clone() })
}

/// Pass `dout` through where the cached input is positive, zero elsewhere
/// (including exactly zero inputs).
pub fn relu_backward<D: Dimension>(
    dout: &Array<f64, D>,
    cache: &ReluCache<D>,
) -> Result<Array<f64, D>> {
    check_grad_shape("relu", cache.x.shape(), dout.shape())?;
    Ok(Zip::from(dout)
        .and(&cache.x)
        .map_collect(|&d, &x| if x > 0.0 { d } else { 0.0 }))
}
