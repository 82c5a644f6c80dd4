use super::{input_grad_simplified, standardize};
use crate::config::GroupNormParam;
use crate::error::{check_eps, check_grad_shape, Error, Result};
use ndarray::{Array1, Array4, ArrayView4, Axis};

/// Intermediates of [`spatial_groupnorm_forward`]. `var` holds one entry
/// per (example, group) pair, example-major.
#[derive(Debug, Clone)]
pub struct GroupNormCache {
    groups: usize,
    var: Array1<f64>,
    x_hat: Array4<f64>,
    gamma: Array1<f64>,
    eps: f64,
}

// (C,) -> (1, C, 1, 1)
fn per_channel(p: &Array1<f64>) -> ArrayView4<'_, f64> {
    p.view()
        .insert_axis(Axis(0))
        .insert_axis(Axis(2))
        .insert_axis(Axis(3))
}

// Sum over batch and spatial axes, keeping them as singletons.
fn sum_keep_channels(a: &Array4<f64>) -> Result<Array4<f64>> {
    let c = a.dim().1;
    let summed = a.sum_axis(Axis(3)).sum_axis(Axis(2)).sum_axis(Axis(0));
    Ok(summed.into_shape_with_order((1, c, 1, 1))?)
}

/// Spatial group normalization over an NCHW input.
///
/// The channel axis is split into `param.groups` contiguous groups; each
/// (example, group) block of `C / G * H * W` values is normalized on its own.
/// Per-channel `gamma` and `beta` (`(C,)`) are applied afterwards.
pub fn spatial_groupnorm_forward(
    x: &Array4<f64>,
    gamma: &Array1<f64>,
    beta: &Array1<f64>,
    param: &GroupNormParam,
) -> Result<(Array4<f64>, GroupNormCache)> {
    let (n, c, h, w) = x.dim();
    let groups = param.groups;
    check_eps("groupnorm", param.eps)?;
    if groups == 0 {
        return Err(Error::geometry("groupnorm", "group count must be positive"));
    }
    if c % groups != 0 {
        return Err(Error::shape(
            "groupnorm",
            format!("{} groups do not evenly divide {} channels", groups, c),
        ));
    }
    super::check_scale_shift("groupnorm", c, gamma.view(), beta.view())?;
    let group_len = c / groups * h * w;
    if group_len == 0 {
        return Err(Error::shape("groupnorm", format!("empty groups for input {:?}", x.shape())));
    }
    log::debug!("spatial_groupnorm_forward: x {:?} groups {}", x.shape(), groups);

    let rows = x.to_shape((n * groups, group_len))?;
    let (_, var, x_hat_rows) = standardize(rows.view(), Axis(1), param.eps);
    let x_hat = x_hat_rows.to_shape((n, c, h, w))?.into_owned();
    let out = &x_hat * &per_channel(gamma) + &per_channel(beta);

    let cache = GroupNormCache {
        groups,
        var,
        x_hat,
        gamma: gamma.clone(),
        eps: param.eps,
    };
    Ok((out, cache))
}

/// Backward pass for [`spatial_groupnorm_forward`].
///
/// Returns `(dx, dgamma, dbeta)`. Unlike the other normalizations, `dgamma`
/// and `dbeta` keep explicit singleton batch and spatial axes: their shape is
/// `(1, C, 1, 1)`.
pub fn spatial_groupnorm_backward(
    dout: &Array4<f64>,
    cache: &GroupNormCache,
) -> Result<(Array4<f64>, Array4<f64>, Array4<f64>)> {
    check_grad_shape("groupnorm", cache.x_hat.shape(), dout.shape())?;
    let (n, c, h, w) = cache.x_hat.dim();
    let rows = n * cache.groups;
    let group_len = c / cache.groups * h * w;

    let dgamma = sum_keep_channels(&(dout * &cache.x_hat))?;
    let dbeta = sum_keep_channels(dout)?;

    let dx_hat = dout * &per_channel(&cache.gamma);
    let dx_hat_rows = dx_hat.to_shape((rows, group_len))?;
    let x_hat_rows = cache.x_hat.to_shape((rows, group_len))?;
    let dx_rows = input_grad_simplified(
        dx_hat_rows.view(),
        x_hat_rows.view(),
        &cache.var,
        cache.eps,
        Axis(1),
    );
    let dx = dx_rows.to_shape((n, c, h, w))?.into_owned();
    Ok((dx, dgamma, dbeta))
}
