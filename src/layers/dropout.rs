use crate::config::{DropoutParam, Mode};
use crate::error::{check_grad_shape, Error, Result};
use ndarray::{Array, Dimension};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// State kept by [`dropout_forward`]. In train mode this is the scaling
/// mask (entries are `0` or `1 / p`); test mode keeps nothing.
#[derive(Debug, Clone)]
pub struct DropoutCache<D: Dimension> {
    mask: Option<Array<f64, D>>,
}

fn keep_mask<D, R>(dim: D, p: f64, rng: &mut R) -> Array<f64, D>
where
    D: Dimension,
    R: Rng + ?Sized,
{
    let scale = 1.0 / p;
    Array::from_shape_simple_fn(dim, || {
        if rng.random::<f64>() < p {
            scale
        } else {
            0.0
        }
    })
}

/// Inverted dropout.
///
/// In train mode every element is kept independently with probability
/// `param.p` and kept elements are scaled by `1 / p`, so nothing needs to be
/// rescaled at test time. In test mode the input is returned unchanged.
/// Passing `param.seed` makes the mask reproducible.
pub fn dropout_forward<D: Dimension>(
    x: &Array<f64, D>,
    param: &DropoutParam,
) -> Result<(Array<f64, D>, DropoutCache<D>)> {
    let p = param.p;
    if !(p > 0.0 && p <= 1.0) {
        return Err(Error::InvalidProbability(p));
    }

    match param.mode {
        Mode::Train => {
            let mask = match param.seed {
                Some(seed) => keep_mask(x.raw_dim(), p, &mut StdRng::seed_from_u64(seed)),
                None => keep_mask(x.raw_dim(), p, &mut rand::rng()),
            };
            log::trace!(
                "dropout_forward: kept {} of {} units",
                mask.iter().filter(|&&m| m != 0.0).count(),
                mask.len()
            );
            let out = x * &mask;
            Ok((out, DropoutCache { mask: Some(mask) }))
        }
        Mode::Test => Ok((x.clone(), DropoutCache { mask: None })),
    }
}

/// Backward pass for [`dropout_forward`]: reapply the train-mode mask, or
/// pass the gradient through in test mode.
pub fn dropout_backward<D: Dimension>(
    dout: &Array<f64, D>,
    cache: &DropoutCache<D>,
) -> Result<Array<f64, D>> {
    match &cache.mask {
        Some(mask) => {
            check_grad_shape("dropout", mask.shape(), dout.shape())?;
            Ok(dout * mask)
        }
        None => Ok(dout.clone()),
    }
}
