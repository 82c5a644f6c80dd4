use super::sliding_windows;
use crate::config::PoolParam;
use crate::error::{check_grad_shape, Result};
use ndarray::{s, Array4, Zip};

/// Input and geometry kept by [`max_pool_forward_naive`].
#[derive(Debug, Clone)]
pub struct MaxPoolCache {
    x: Array4<f64>,
    param: PoolParam,
}

fn output_size(x: &Array4<f64>, param: &PoolParam) -> Result<(usize, usize)> {
    let (_, _, h, w) = x.dim();
    let h_out = sliding_windows("max_pool", h, param.pool_height, 0, param.stride)?;
    let w_out = sliding_windows("max_pool", w, param.pool_width, 0, param.stride)?;
    Ok((h_out, w_out))
}

/// Max pooling over each `(pool_height, pool_width)` window of every channel.
/// No padding is applied; the output is `(N, C, H', W')` with
/// `H' = 1 + (H - pool_height) / stride`.
pub fn max_pool_forward_naive(
    x: &Array4<f64>,
    param: &PoolParam,
) -> Result<(Array4<f64>, MaxPoolCache)> {
    let (h_out, w_out) = output_size(x, param)?;
    let (n, c, _, _) = x.dim();
    let (ph, pw, stride) = (param.pool_height, param.pool_width, param.stride);
    log::debug!("max_pool_forward_naive: x {:?} -> ({}, {})", x.shape(), h_out, w_out);

    let mut out = Array4::<f64>::zeros((n, c, h_out, w_out));
    for img in 0..n {
        for ch in 0..c {
            for i in 0..h_out {
                let hs = i * stride;
                for j in 0..w_out {
                    let ws = j * stride;
                    let window = x.slice(s![img, ch, hs..hs + ph, ws..ws + pw]);
                    out[[img, ch, i, j]] = window.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
                }
            }
        }
    }
    Ok((out, MaxPoolCache { x: x.clone(), param: *param }))
}

/// Backward pass for [`max_pool_forward_naive`].
///
/// Each upstream value is routed to the position(s) holding its window's
/// maximum. On ties every maximal position receives the full value. When
/// windows overlap, contributions from different windows add up.
pub fn max_pool_backward_naive(dout: &Array4<f64>, cache: &MaxPoolCache) -> Result<Array4<f64>> {
    let MaxPoolCache { x, param } = cache;
    let (h_out, w_out) = output_size(x, param)?;
    let (n, c, _, _) = x.dim();
    check_grad_shape("max_pool", &[n, c, h_out, w_out], dout.shape())?;
    let (ph, pw, stride) = (param.pool_height, param.pool_width, param.stride);

    let mut dx = Array4::<f64>::zeros(x.raw_dim());
    for img in 0..n {
        for ch in 0..c {
            for i in 0..h_out {
                let hs = i * stride;
                for j in 0..w_out {
                    let ws = j * stride;
                    let window = x.slice(s![img, ch, hs..hs + ph, ws..ws + pw]);
                    let max = window.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
                    let g = dout[[img, ch, i, j]];
                    Zip::from(dx.slice_mut(s![img, ch, hs..hs + ph, ws..ws + pw]))
                        .and(&window)
                        .for_each(|d, &v| {
                            if v == max {
                                *d += g;
                            }
                        });
                }
            }
        }
    }
    Ok(dx)
}
