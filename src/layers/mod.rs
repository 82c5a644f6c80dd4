//! Forward/backward primitives, one module per layer family.
//!
//! Each forward function returns `(output, cache)`; the matching backward
//! function takes the upstream gradient and a reference to that cache and
//! returns one gradient per differentiable input.

pub mod activation;
pub mod affine;
pub mod conv;
pub mod dropout;
pub mod norm;
pub mod pool;


pub use activation::{relu_backward, relu_forward, ReluCache};
pub use affine::{affine_backward, affine_forward, AffineCache};
pub use conv::{
    conv_backward_im2col, conv_backward_naive, conv_forward_im2col, conv_forward_naive,
    ConvCache, Im2ColCache,
};
pub use dropout::{dropout_backward, dropout_forward, DropoutCache};
pub use norm::{
    batchnorm_backward, batchnorm_backward_alt, batchnorm_forward, layernorm_backward,
    layernorm_forward, spatial_batchnorm_backward, spatial_batchnorm_forward,
    spatial_groupnorm_backward, spatial_groupnorm_forward, BatchNormCache, GroupNormCache,
    LayerNormCache, SpatialBatchNormCache,
};
pub use pool::{max_pool_backward_naive, max_pool_forward_naive, MaxPoolCache};

use crate::error::{Error, Result};
use ndarray::{s, Array4};

/// Number of window positions along one spatial axis:
/// `1 + (input + 2 * pad - window) / stride`.
pub(crate) fn sliding_windows(
    op: &'static str,
    input: usize,
    window: usize,
    pad: usize,
    stride: usize,
) -> Result<usize> {
    if stride == 0 {
        return Err(Error::geometry(op, "stride must be positive"));
    }
    if window == 0 {
        return Err(Error::geometry(op, "window size must be positive"));
    }
    let padded = input + 2 * pad;
    if padded < window {
        return Err(Error::geometry(
            op,
            format!("window {} larger than padded input {}", window, padded),
        ));
    }
    Ok(1 + (padded - window) / stride)
}

/// Zero-pad the two spatial axes of an NCHW array symmetrically.
pub(crate) fn zero_pad(x: &Array4<f64>, pad: usize) -> Array4<f64> {
    if pad == 0 {
        return x.clone();
    }
    let (n, c, h, w) = x.dim();
    let mut padded = Array4::<f64>::zeros((n, c, h + 2 * pad, w + 2 * pad));
    padded
        .slice_mut(s![.., .., pad..pad + h, pad..pad + w])
        .assign(x);
    padded
}

/// Crop the padding added by [`zero_pad`].
pub(crate) fn crop(padded: Array4<f64>, pad: usize) -> Array4<f64> {
    if pad == 0 {
        return padded;
    }
    let (_, _, hp, wp) = padded.dim();
    padded
        .slice(s![.., .., pad..hp - pad, pad..wp - pad])
        .to_owned()
}
