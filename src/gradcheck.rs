//! Centered finite-difference gradients for checking backward passes.

use crate::error::Result;
use ndarray::{Array, Dimension, Zip};

/// Numerical gradient of a scalar function `f` at `x`.
///
/// Each element is perturbed by `±h` in turn and the gradient estimated as
/// `(f(x + h) - f(x - h)) / 2h`.
pub fn eval_numerical_gradient<D, F>(mut f: F, x: &Array<f64, D>, h: f64) -> Result<Array<f64, D>>
where
    D: Dimension,
    F: FnMut(&Array<f64, D>) -> f64,
{
    let dim = x.raw_dim();
    let mut data: Vec<f64> = x.iter().copied().collect();
    let mut grad = Vec::with_capacity(data.len());
    for i in 0..data.len() {
        let orig = data[i];
        data[i] = orig + h;
        let pos = f(&Array::from_shape_vec(dim.clone(), data.clone())?);
        data[i] = orig - h;
        let neg = f(&Array::from_shape_vec(dim.clone(), data.clone())?);
        data[i] = orig;
        grad.push((pos - neg) / (2.0 * h));
    }
    Ok(Array::from_shape_vec(dim, grad)?)
}

/// Numerical gradient of an array-valued `f` at `x`, contracted against the
/// upstream gradient `df`: element `i` is
/// `sum((f(x + h e_i) - f(x - h e_i)) * df) / 2h`.
///
/// Panics if the output of `f` does not have the shape of `df`.
pub fn eval_numerical_gradient_array<D, E, F>(
    mut f: F,
    x: &Array<f64, D>,
    df: &Array<f64, E>,
    h: f64,
) -> Result<Array<f64, D>>
where
    D: Dimension,
    E: Dimension,
    F: FnMut(&Array<f64, D>) -> Array<f64, E>,
{
    eval_numerical_gradient(
        |xp| {
            let out = f(xp);
            Zip::from(&out).and(df).fold(0.0, |acc, &o, &d| acc + o * d)
        },
        x,
        h,
    )
}

/// Largest elementwise relative error `|a - b| / max(1e-8, |a| + |b|)`.
///
/// Panics if the shapes differ.
pub fn rel_error<D: Dimension>(a: &Array<f64, D>, b: &Array<f64, D>) -> f64 {
    Zip::from(a).and(b).fold(0.0, |worst: f64, &x, &y| {
        let err = (x - y).abs() / ((x.abs() + y.abs()).max(1e-8));
        worst.max(err)
    })
}
