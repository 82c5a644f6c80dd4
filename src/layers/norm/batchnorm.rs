use super::{check_scale_shift, GradForm, NormState};
use crate::config::{BatchNormParam, Mode};
use crate::error::{check_eps, check_grad_shape, Error, Result};
use ndarray::{Array1, Array2, Axis};

/// Train-mode intermediates of [`batchnorm_forward`]: sample mean and
/// variance, raw and normalized input, gamma and eps. `beta` is not kept,
/// since no gradient depends on its value.
#[derive(Debug, Clone)]
pub struct BatchNormCache {
    state: NormState,
}

fn running_stat(
    stat: &Option<Array1<f64>>,
    features: usize,
    name: &str,
) -> Result<Array1<f64>> {
    match stat {
        Some(s) if s.len() == features => Ok(s.clone()),
        Some(s) => Err(Error::shape(
            "batchnorm",
            format!("{} has {} entries, input has {} features", name, s.len(), features),
        )),
        None => Ok(Array1::zeros(features)),
    }
}

// running = momentum * running + (1 - momentum) * sample
fn update_running(running: &mut Array1<f64>, sample: &Array1<f64>, momentum: f64) {
    running.zip_mut_with(sample, |r, &s| *r = momentum * *r + (1.0 - momentum) * s);
}

/// Batch normalization over an `(N, D)` input.
///
/// Train mode normalizes each feature with the batch's mean and biased
/// variance, then updates `param.running_mean` / `param.running_var` with
/// `running = momentum * running + (1 - momentum) * sample`. Test mode
/// normalizes with the running statistics and returns no cache, as there is
/// no backward pass at test time.
///
/// Missing running statistics are initialised to zeros and written back to
/// `param` in both modes.
pub fn batchnorm_forward(
    x: &Array2<f64>,
    gamma: &Array1<f64>,
    beta: &Array1<f64>,
    param: &mut BatchNormParam,
) -> Result<(Array2<f64>, Option<BatchNormCache>)> {
    let (n, d) = x.dim();
    check_eps("batchnorm", param.eps)?;
    check_scale_shift("batchnorm", d, gamma.view(), beta.view())?;
    let mut running_mean = running_stat(&param.running_mean, d, "running_mean")?;
    let mut running_var = running_stat(&param.running_var, d, "running_var")?;
    log::debug!("batchnorm_forward: mode {} x {:?}", param.mode, x.shape());

    match param.mode {
        Mode::Train => {
            if n == 0 {
                return Err(Error::shape("batchnorm", "train mode needs a non-empty batch"));
            }
            let (out, state) = NormState::forward(x, gamma, beta, param.eps, Axis(0));
            update_running(&mut running_mean, state.mean(), param.momentum);
            update_running(&mut running_var, state.var(), param.momentum);
            log::trace!("batchnorm_forward: running mean {:?}", running_mean);
            param.running_mean = Some(running_mean);
            param.running_var = Some(running_var);
            Ok((out, Some(BatchNormCache { state })))
        }
        Mode::Test => {
            if param.running_mean.is_none() || param.running_var.is_none() {
                log::warn!("batchnorm_forward: test mode without running statistics, using zeros");
            }
            let std = running_var.mapv(|v| (v + param.eps).sqrt());
            let x_hat = (x - &running_mean) / &std;
            let out = x_hat * gamma + beta;
            param.running_mean = Some(running_mean);
            param.running_var = Some(running_var);
            Ok((out, None))
        }
    }
}

/// Backward pass for [`batchnorm_forward`], propagating through each node of
/// the computation graph (normalization, variance, mean) in turn.
///
/// Returns `(dx, dgamma, dbeta)` shaped like `x`, `gamma` and `beta`.
pub fn batchnorm_backward(
    dout: &Array2<f64>,
    cache: &BatchNormCache,
) -> Result<(Array2<f64>, Array1<f64>, Array1<f64>)> {
    check_grad_shape("batchnorm", cache.state.input_shape(), dout.shape())?;
    Ok(cache.state.backward(dout, GradForm::Direct))
}

/// Same gradients as [`batchnorm_backward`] using the simplified closed form
/// `dx = (N * dx_hat - sum(dx_hat) - x_hat * sum(dx_hat * x_hat)) / (N * std)`.
pub fn batchnorm_backward_alt(
    dout: &Array2<f64>,
    cache: &BatchNormCache,
) -> Result<(Array2<f64>, Array1<f64>, Array1<f64>)> {
    check_grad_shape("batchnorm", cache.state.input_shape(), dout.shape())?;
    Ok(cache.state.backward(dout, GradForm::Simplified))
}
