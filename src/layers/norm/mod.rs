//! Normalization family: batch, layer, spatial batch and spatial group norm.
//!
//! All variants share one center/scale kernel operating on a 2-D array and
//! parameterised by the axis the statistics are reduced over:
//!
//! - batch norm reduces over rows (`Axis(0)`), one mean/variance per feature;
//! - layer norm reduces over columns (`Axis(1)`), one mean/variance per example;
//! - spatial batch norm reshapes NCHW to `(N*H*W, C)` and runs batch norm;
//! - group norm reshapes NCHW to `(N*G, C/G*H*W)` and reduces over columns.
//!
//! Running statistics are a batch-norm concern only and are updated by
//! [`batchnorm_forward`] after the kernel returns.

mod batchnorm;
mod groupnorm;
mod layernorm;
mod spatial;

pub use batchnorm::{batchnorm_backward, batchnorm_backward_alt, batchnorm_forward, BatchNormCache};
pub use groupnorm::{spatial_groupnorm_backward, spatial_groupnorm_forward, GroupNormCache};
pub use layernorm::{layernorm_backward, layernorm_forward, LayerNormCache};
pub use spatial::{spatial_batchnorm_backward, spatial_batchnorm_forward, SpatialBatchNormCache};

use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// View a per-lane statistic so it broadcasts against the 2-D array it was
/// reduced from.
fn lanes(stat: &Array1<f64>, axis: Axis) -> ArrayView2<'_, f64> {
    stat.view().insert_axis(axis)
}

/// Mean and biased (divide-by-count) variance along `axis`.
pub(crate) fn moments(x: ArrayView2<'_, f64>, axis: Axis) -> (Array1<f64>, Array1<f64>) {
    let count = x.len_of(axis) as f64;
    let mean = x.sum_axis(axis) / count;
    let centered = &x - &lanes(&mean, axis);
    let var = centered.mapv(|v| v * v).sum_axis(axis) / count;
    (mean, var)
}

/// Normalize to zero mean and unit variance along `axis`.
/// Returns `(mean, var, x_hat)`.
pub(crate) fn standardize(
    x: ArrayView2<'_, f64>,
    axis: Axis,
    eps: f64,
) -> (Array1<f64>, Array1<f64>, Array2<f64>) {
    let (mean, var) = moments(x, axis);
    let std = var.mapv(|v| (v + eps).sqrt());
    let x_hat = (&x - &lanes(&mean, axis)) / &lanes(&std, axis);
    (mean, var, x_hat)
}

/// Gradient w.r.t. the input of [`standardize`], backpropagated node by node
/// through the normalization, variance and mean.
pub(crate) fn input_grad_direct(
    dx_hat: ArrayView2<'_, f64>,
    x: ArrayView2<'_, f64>,
    mean: &Array1<f64>,
    var: &Array1<f64>,
    eps: f64,
    axis: Axis,
) -> Array2<f64> {
    let count = x.len_of(axis) as f64;
    let xmu = &x - &lanes(mean, axis);
    let inv_std = var.mapv(|v| 1.0 / (v + eps).sqrt());
    let inv_std_cubed = var.mapv(|v| (v + eps).powf(-1.5));

    let dvar = (&dx_hat * &xmu * &lanes(&inv_std_cubed, axis)).sum_axis(axis) * -0.5;
    let dmean = (&dx_hat * &lanes(&inv_std, axis)).sum_axis(axis) * -1.0
        + &dvar * &(xmu.sum_axis(axis) * (-2.0 / count));

    let through_x_hat = &dx_hat * &lanes(&inv_std, axis);
    let through_var = &xmu * &lanes(&dvar, axis) * (2.0 / count);
    let through_mean = &lanes(&dmean, axis) / count;
    through_x_hat + &through_var + &through_mean
}

/// Closed form of [`input_grad_direct`]:
/// `dx = (m * dx_hat - sum(dx_hat) - x_hat * sum(dx_hat * x_hat)) / (m * std)`.
pub(crate) fn input_grad_simplified(
    dx_hat: ArrayView2<'_, f64>,
    x_hat: ArrayView2<'_, f64>,
    var: &Array1<f64>,
    eps: f64,
    axis: Axis,
) -> Array2<f64> {
    let count = x_hat.len_of(axis) as f64;
    let sum_dx_hat = dx_hat.sum_axis(axis);
    let sum_dx_hat_x_hat = (&dx_hat * &x_hat).sum_axis(axis);
    let scale = var.mapv(|v| 1.0 / (count * (v + eps).sqrt()));

    let numer = &dx_hat * count
        - &lanes(&sum_dx_hat, axis)
        - &(&x_hat * &lanes(&sum_dx_hat_x_hat, axis));
    numer * &lanes(&scale, axis)
}

/// Everything a train-mode normalization keeps for its backward pass.
#[derive(Debug, Clone)]
pub(crate) struct NormState {
    axis: Axis,
    mean: Array1<f64>,
    var: Array1<f64>,
    x: Array2<f64>,
    x_hat: Array2<f64>,
    gamma: Array1<f64>,
    eps: f64,
}

/// Which input-gradient formula a backward call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GradForm {
    Direct,
    Simplified,
}

impl NormState {
    /// Center and scale `x` along `axis`, then apply per-column `gamma` and
    /// `beta`.
    pub(crate) fn forward(
        x: &Array2<f64>,
        gamma: &Array1<f64>,
        beta: &Array1<f64>,
        eps: f64,
        axis: Axis,
    ) -> (Array2<f64>, NormState) {
        let (mean, var, x_hat) = standardize(x.view(), axis, eps);
        let out = &x_hat * gamma + beta;
        let state = NormState {
            axis,
            mean,
            var,
            x: x.clone(),
            x_hat,
            gamma: gamma.clone(),
            eps,
        };
        (out, state)
    }

    pub(crate) fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub(crate) fn var(&self) -> &Array1<f64> {
        &self.var
    }

    pub(crate) fn input_shape(&self) -> &[usize] {
        self.x.shape()
    }

    /// Returns `(dx, dgamma, dbeta)`; parameter gradients are always summed
    /// over the batch axis since gamma and beta are per column.
    pub(crate) fn backward(
        &self,
        dout: &Array2<f64>,
        form: GradForm,
    ) -> (Array2<f64>, Array1<f64>, Array1<f64>) {
        let dx_hat = dout * &self.gamma;
        let dx = match form {
            GradForm::Direct => input_grad_direct(
                dx_hat.view(),
                self.x.view(),
                &self.mean,
                &self.var,
                self.eps,
                self.axis,
            ),
            GradForm::Simplified => input_grad_simplified(
                dx_hat.view(),
                self.x_hat.view(),
                &self.var,
                self.eps,
                self.axis,
            ),
        };
        let dgamma = (dout * &self.x_hat).sum_axis(Axis(0));
        let dbeta = dout.sum_axis(Axis(0));
        (dx, dgamma, dbeta)
    }
}

/// Check that gamma and beta both have `features` entries.
pub(crate) fn check_scale_shift(
    op: &'static str,
    features: usize,
    gamma: ArrayView1<'_, f64>,
    beta: ArrayView1<'_, f64>,
) -> Result<()> {
    if gamma.len() != features || beta.len() != features {
        return Err(Error::shape(
            op,
            format!(
                "gamma {:?} and beta {:?} must both have {} entries",
                gamma.shape(),
                beta.shape(),
                features
            ),
        ));
    }
    Ok(())
}
