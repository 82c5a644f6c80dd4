use crate::error::{check_grad_shape, Error, Result};
use ndarray::{Array1, Array2, ArrayD, Axis};

/// Values kept by [`affine_forward`] for [`affine_backward`].
#[derive(Debug, Clone)]
pub struct AffineCache {
    x: ArrayD<f64>,
    w: Array2<f64>,
    b: Array1<f64>,
}

// (N, d1, .., dk) -> (N, d1 * .. * dk)
fn flatten_rows(x: &ArrayD<f64>) -> Result<Array2<f64>> {
    let n = match x.shape().first() {
        Some(&n) => n,
        None => return Err(Error::shape("affine", "input must have a batch axis")),
    };
    let d = x.shape()[1..].iter().product::<usize>();
    Ok(x.to_shape((n, d))?.into_owned())
}

/// Fully-connected layer: `out = flatten(x) . w + b`.
///
/// `x` has shape `(N, d1, .., dk)` and is flattened per example to
/// `(N, D)` with `D = d1 * .. * dk`; `w` is `(D, M)` and `b` is `(M,)`.
/// Returns the `(N, M)` output and the cache for [`affine_backward`].
pub fn affine_forward(
    x: &ArrayD<f64>,
    w: &Array2<f64>,
    b: &Array1<f64>,
) -> Result<(Array2<f64>, AffineCache)> {
    let x2 = flatten_rows(x)?;
    let (d, m) = w.dim();
    if x2.ncols() != d {
        return Err(Error::shape(
            "affine",
            format!(
                "input {:?} flattens to {} features but weights are {:?}",
                x.shape(),
                x2.ncols(),
                w.shape()
            ),
        ));
    }
    if b.len() != m {
        return Err(Error::shape(
            "affine",
            format!("bias has {} entries, weights have {} outputs", b.len(), m),
        ));
    }
    log::debug!("affine_forward: x {:?} w {:?}", x.shape(), w.shape());

    let out = x2.dot(w) + b;
    let cache = AffineCache {
        x: x.clone(),
        w: w.clone(),
        b: b.clone(),
    };
    Ok((out, cache))
}

/// Backward pass for [`affine_forward`].
///
/// Returns `(dx, dw, db)` where `dx` has exactly the shape of the original
/// (unflattened) input.
pub fn affine_backward(
    dout: &Array2<f64>,
    cache: &AffineCache,
) -> Result<(ArrayD<f64>, Array2<f64>, Array1<f64>)> {
    let AffineCache { x, w, b } = cache;
    let n = x.shape()[0];
    check_grad_shape("affine", &[n, b.len()], dout.shape())?;

    let x2 = flatten_rows(x)?;
    let db = dout.sum_axis(Axis(0));
    let dw = x2.t().dot(dout);
    let dx = dout.dot(&w.t()).to_shape(x.raw_dim())?.into_owned();
    Ok((dx, dw, db))
}
