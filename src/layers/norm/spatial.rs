use super::batchnorm::{batchnorm_backward, batchnorm_forward, BatchNormCache};
use crate::config::BatchNormParam;
use crate::error::{check_grad_shape, Result};
use ndarray::{Array1, Array2, Array4};

/// Batch-norm cache plus the NCHW dimensions needed to undo the reshape.
#[derive(Debug, Clone)]
pub struct SpatialBatchNormCache {
    bn: BatchNormCache,
    dims: (usize, usize, usize, usize),
}

// (N, C, H, W) -> (N*H*W, C)
fn channels_last(x: &Array4<f64>) -> Result<Array2<f64>> {
    let (n, c, h, w) = x.dim();
    let nhwc = x.view().permuted_axes([0, 2, 3, 1]);
    Ok(nhwc.to_shape((n * h * w, c))?.into_owned())
}

// (N*H*W, C) -> (N, C, H, W)
fn channels_first(y: Array2<f64>, (n, c, h, w): (usize, usize, usize, usize)) -> Result<Array4<f64>> {
    let nhwc = y.to_shape((n, h, w, c))?;
    Ok(nhwc.view().permuted_axes([0, 3, 1, 2]).as_standard_layout().into_owned())
}

/// Batch normalization for NCHW inputs: every channel is a feature and the
/// batch and spatial axes together form the batch. `gamma` and `beta` are
/// `(C,)`, and `param` carries `(C,)` running statistics.
pub fn spatial_batchnorm_forward(
    x: &Array4<f64>,
    gamma: &Array1<f64>,
    beta: &Array1<f64>,
    param: &mut BatchNormParam,
) -> Result<(Array4<f64>, Option<SpatialBatchNormCache>)> {
    let dims = x.dim();
    log::debug!("spatial_batchnorm_forward: x {:?}", x.shape());
    let (out, bn) = batchnorm_forward(&channels_last(x)?, gamma, beta, param)?;
    let out = channels_first(out, dims)?;
    Ok((out, bn.map(|bn| SpatialBatchNormCache { bn, dims })))
}

/// Backward pass for [`spatial_batchnorm_forward`]. Returns `(dx, dgamma,
/// dbeta)` with `dx` in NCHW and the parameter gradients `(C,)`.
pub fn spatial_batchnorm_backward(
    dout: &Array4<f64>,
    cache: &SpatialBatchNormCache,
) -> Result<(Array4<f64>, Array1<f64>, Array1<f64>)> {
    let (n, c, h, w) = cache.dims;
    check_grad_shape("spatial_batchnorm", &[n, c, h, w], dout.shape())?;
    let (dx, dgamma, dbeta) = batchnorm_backward(&channels_last(dout)?, &cache.bn)?;
    Ok((channels_first(dx, cache.dims)?, dgamma, dbeta))
}
