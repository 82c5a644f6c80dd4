//! Forward and backward primitives for common neural-network layers.
//!
//! Every layer is a pair of plain functions over `ndarray` arrays of `f64`:
//! the forward function returns the output plus a cache, and the backward
//! function turns an upstream gradient and that cache into gradients for
//! each input. Composition, optimizers and training loops live with the
//! caller.
//!
//! ```no_run
//! use ndarray::{Array1, Array2};
//! use tensor_layers::config::{BatchNormParam, Mode};
//! use tensor_layers::layers::{batchnorm_backward, batchnorm_forward};
//!
//! # fn main() -> tensor_layers::Result<()> {
//! let x = Array2::from_shape_fn((4, 3), |(i, j)| (i * 3 + j) as f64);
//! let (gamma, beta) = (Array1::ones(3), Array1::zeros(3));
//! let mut param = BatchNormParam::new(Mode::Train);
//! let (out, cache) = batchnorm_forward(&x, &gamma, &beta, &mut param)?;
//! if let Some(cache) = cache {
//!     let (_dx, _dgamma, _dbeta) = batchnorm_backward(&Array2::ones(out.raw_dim()), &cache)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gradcheck;
pub mod layers;
pub mod loss;

pub use config::Mode;
pub use error::{Error, Result};
pub use loss::{softmax_loss, svm_loss};
