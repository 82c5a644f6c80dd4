use super::{check_scale_shift, GradForm, NormState};
use crate::config::LayerNormParam;
use crate::error::{check_eps, check_grad_shape, Error, Result};
use ndarray::{Array1, Array2, Axis};

/// Intermediates of [`layernorm_forward`]; statistics are per example.
#[derive(Debug, Clone)]
pub struct LayerNormCache {
    state: NormState,
}

/// Layer normalization over an `(N, D)` input.
///
/// Each example is normalized across its own `D` features, then scaled by
/// `gamma` and shifted by `beta` (both `(D,)`). Training and inference
/// behave identically and no running statistics are kept.
pub fn layernorm_forward(
    x: &Array2<f64>,
    gamma: &Array1<f64>,
    beta: &Array1<f64>,
    param: &LayerNormParam,
) -> Result<(Array2<f64>, LayerNormCache)> {
    let d = x.ncols();
    check_eps("layernorm", param.eps)?;
    check_scale_shift("layernorm", d, gamma.view(), beta.view())?;
    if d == 0 {
        return Err(Error::shape("layernorm", "input has no features"));
    }
    log::debug!("layernorm_forward: x {:?}", x.shape());

    let (out, state) = NormState::forward(x, gamma, beta, param.eps, Axis(1));
    Ok((out, LayerNormCache { state }))
}

/// Backward pass for [`layernorm_forward`]. Returns `(dx, dgamma, dbeta)`;
/// `dgamma` and `dbeta` are summed over the batch axis.
pub fn layernorm_backward(
    dout: &Array2<f64>,
    cache: &LayerNormCache,
) -> Result<(Array2<f64>, Array1<f64>, Array1<f64>)> {
    check_grad_shape("layernorm", cache.state.input_shape(), dout.shape())?;
    Ok(cache.state.backward(dout, GradForm::Direct))
}
