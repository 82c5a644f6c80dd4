//! 2-D convolution over NCHW inputs with `(F, C, HH, WW)` filters.
//!
//! Two implementations with identical results:
//! - the direct sliding-window loops ([`conv_forward_naive`]), and
//! - a matrix-unrolled version ([`conv_forward_im2col`]) that gathers every
//!   receptive field into a column and does one matrix product.

use super::{crop, sliding_windows, zero_pad};
use crate::config::ConvParam;
use crate::error::{check_grad_shape, Error, Result};
use ndarray::{s, Array1, Array2, Array4, Axis};

/// Values kept by [`conv_forward_naive`].
#[derive(Debug, Clone)]
pub struct ConvCache {
    x: Array4<f64>,
    w: Array4<f64>,
    param: ConvParam,
}

/// Values kept by [`conv_forward_im2col`]: the unrolled input columns
/// replace the raw input.
#[derive(Debug, Clone)]
pub struct Im2ColCache {
    x_dims: (usize, usize, usize, usize),
    w: Array4<f64>,
    param: ConvParam,
    cols: Array2<f64>,
}

/// Validate shapes and return the output spatial size `(H', W')`.
fn output_size(
    x: &Array4<f64>,
    w: &Array4<f64>,
    b: &Array1<f64>,
    param: &ConvParam,
) -> Result<(usize, usize)> {
    let (_, c, h, width) = x.dim();
    let (f, wc, hh, ww) = w.dim();
    if c != wc {
        return Err(Error::shape(
            "conv",
            format!("input has {} channels, filters expect {}", c, wc),
        ));
    }
    if b.len() != f {
        return Err(Error::shape(
            "conv",
            format!("bias has {} entries for {} filters", b.len(), f),
        ));
    }
    let h_out = sliding_windows("conv", h, hh, param.pad, param.stride)?;
    let w_out = sliding_windows("conv", width, ww, param.pad, param.stride)?;
    Ok((h_out, w_out))
}

/// Sum of `dout` over batch and spatial axes.
fn bias_grad(dout: &Array4<f64>) -> Array1<f64> {
    dout.sum_axis(Axis(3)).sum_axis(Axis(2)).sum_axis(Axis(0))
}

/// Naive convolution forward pass.
///
/// The input is zero-padded by `param.pad` on both spatial axes; every
/// output value is the product-sum of one filter against one receptive
/// field across all channels, plus that filter's bias. The output is
/// `(N, F, H', W')` with `H' = 1 + (H + 2 * pad - HH) / stride` and likewise
/// for `W'`.
pub fn conv_forward_naive(
    x: &Array4<f64>,
    w: &Array4<f64>,
    b: &Array1<f64>,
    param: &ConvParam,
) -> Result<(Array4<f64>, ConvCache)> {
    let (h_out, w_out) = output_size(x, w, b, param)?;
    let n = x.dim().0;
    let (f, _, hh, ww) = w.dim();
    let stride = param.stride;
    log::debug!(
        "conv_forward_naive: x {:?} w {:?} -> ({}, {}, {}, {})",
        x.shape(),
        w.shape(),
        n,
        f,
        h_out,
        w_out
    );

    let xp = zero_pad(x, param.pad);
    let mut out = Array4::<f64>::zeros((n, f, h_out, w_out));
    for img in 0..n {
        for k in 0..f {
            let filter = w.slice(s![k, .., .., ..]);
            for i in 0..h_out {
                let hs = i * stride;
                for j in 0..w_out {
                    let ws = j * stride;
                    let field = xp.slice(s![img, .., hs..hs + hh, ws..ws + ww]);
                    out[[img, k, i, j]] = (&field * &filter).sum() + b[k];
                }
            }
        }
    }

    let cache = ConvCache {
        x: x.clone(),
        w: w.clone(),
        param: *param,
    };
    Ok((out, cache))
}

/// Naive convolution backward pass. Returns `(dx, dw, db)`.
///
/// `dw` accumulates each padded receptive field scaled by the upstream
/// gradient at its output position; `dx` accumulates the filter scaled the
/// same way into a padded buffer that is cropped at the end.
pub fn conv_backward_naive(
    dout: &Array4<f64>,
    cache: &ConvCache,
) -> Result<(Array4<f64>, Array4<f64>, Array1<f64>)> {
    let ConvCache { x, w, param } = cache;
    let (n, _, h, width) = x.dim();
    let (f, _, hh, ww) = w.dim();
    let h_out = sliding_windows("conv", h, hh, param.pad, param.stride)?;
    let w_out = sliding_windows("conv", width, ww, param.pad, param.stride)?;
    check_grad_shape("conv", &[n, f, h_out, w_out], dout.shape())?;
    let stride = param.stride;

    let xp = zero_pad(x, param.pad);
    let db = bias_grad(dout);
    let mut dw = Array4::<f64>::zeros(w.raw_dim());
    let mut dxp = Array4::<f64>::zeros(xp.raw_dim());
    for k in 0..f {
        let filter = w.slice(s![k, .., .., ..]);
        for img in 0..n {
            for i in 0..h_out {
                let hs = i * stride;
                for j in 0..w_out {
                    let ws = j * stride;
                    let g = dout[[img, k, i, j]];
                    dw.slice_mut(s![k, .., .., ..])
                        .scaled_add(g, &xp.slice(s![img, .., hs..hs + hh, ws..ws + ww]));
                    dxp.slice_mut(s![img, .., hs..hs + hh, ws..ws + ww])
                        .scaled_add(g, &filter);
                }
            }
        }
    }

    Ok((crop(dxp, param.pad), dw, db))
}

// Column `(img * h_out + i) * w_out + j` holds the receptive field of output
// position (i, j) of image `img`, flattened in (channel, row, col) order.
fn im2col(
    xp: &Array4<f64>,
    hh: usize,
    ww: usize,
    stride: usize,
    h_out: usize,
    w_out: usize,
) -> Array2<f64> {
    let (n, c, _, _) = xp.dim();
    let mut cols = Array2::<f64>::zeros((c * hh * ww, n * h_out * w_out));
    for img in 0..n {
        for i in 0..h_out {
            let hs = i * stride;
            for j in 0..w_out {
                let ws = j * stride;
                let col = (img * h_out + i) * w_out + j;
                let field = xp.slice(s![img, .., hs..hs + hh, ws..ws + ww]);
                for (dst, &src) in cols.column_mut(col).iter_mut().zip(field.iter()) {
                    *dst = src;
                }
            }
        }
    }
    cols
}

// Inverse of `im2col`: overlapping fields are summed.
fn col2im(
    cols: &Array2<f64>,
    padded_dims: (usize, usize, usize, usize),
    hh: usize,
    ww: usize,
    stride: usize,
    h_out: usize,
    w_out: usize,
) -> Array4<f64> {
    let mut dxp = Array4::<f64>::zeros(padded_dims);
    for img in 0..padded_dims.0 {
        for i in 0..h_out {
            let hs = i * stride;
            for j in 0..w_out {
                let ws = j * stride;
                let col = (img * h_out + i) * w_out + j;
                let mut field = dxp.slice_mut(s![img, .., hs..hs + hh, ws..ws + ww]);
                for (dst, &src) in field.iter_mut().zip(cols.column(col).iter()) {
                    *dst += src;
                }
            }
        }
    }
    dxp
}

/// Convolution forward pass via im2col and a single matrix product.
/// Same contract and results as [`conv_forward_naive`].
pub fn conv_forward_im2col(
    x: &Array4<f64>,
    w: &Array4<f64>,
    b: &Array1<f64>,
    param: &ConvParam,
) -> Result<(Array4<f64>, Im2ColCache)> {
    let (h_out, w_out) = output_size(x, w, b, param)?;
    let n = x.dim().0;
    let (f, c, hh, ww) = w.dim();
    log::debug!("conv_forward_im2col: x {:?} w {:?}", x.shape(), w.shape());

    let xp = zero_pad(x, param.pad);
    let cols = im2col(&xp, hh, ww, param.stride, h_out, w_out);
    let w2 = w.to_shape((f, c * hh * ww))?;
    let out2 = w2.dot(&cols) + &b.view().insert_axis(Axis(1));
    let out = out2
        .to_shape((f, n, h_out, w_out))?
        .view()
        .permuted_axes([1, 0, 2, 3])
        .as_standard_layout()
        .into_owned();

    let cache = Im2ColCache {
        x_dims: x.dim(),
        w: w.clone(),
        param: *param,
        cols,
    };
    Ok((out, cache))
}

/// Convolution backward pass for [`conv_forward_im2col`]. Returns
/// `(dx, dw, db)` matching [`conv_backward_naive`].
pub fn conv_backward_im2col(
    dout: &Array4<f64>,
    cache: &Im2ColCache,
) -> Result<(Array4<f64>, Array4<f64>, Array1<f64>)> {
    let Im2ColCache {
        x_dims,
        w,
        param,
        cols,
    } = cache;
    let (n, c, h, width) = *x_dims;
    let (f, _, hh, ww) = w.dim();
    let h_out = sliding_windows("conv", h, hh, param.pad, param.stride)?;
    let w_out = sliding_windows("conv", width, ww, param.pad, param.stride)?;
    check_grad_shape("conv", &[n, f, h_out, w_out], dout.shape())?;

    let db = bias_grad(dout);
    let dout2 = dout
        .view()
        .permuted_axes([1, 0, 2, 3])
        .to_shape((f, n * h_out * w_out))?
        .into_owned();
    let dw = dout2.dot(&cols.t()).to_shape((f, c, hh, ww))?.into_owned();

    let w2 = w.to_shape((f, c * hh * ww))?;
    let dcols = w2.t().dot(&dout2);
    let padded_dims = (n, c, h + 2 * param.pad, width + 2 * param.pad);
    let dxp = col2im(&dcols, padded_dims, hh, ww, param.stride, h_out, w_out);
    Ok((crop(dxp, param.pad), dw, db))
}
