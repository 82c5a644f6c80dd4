//! Per-call configuration records.
//!
//! These are plain structs with public fields and `Default` impls. The only
//! record a forward call writes to is [`BatchNormParam`], whose running
//! statistics are updated in place during training.

use crate::error::Error;
use ndarray::Array1;
use std::fmt;
use std::str::FromStr;

/// Default epsilon added to the variance before taking its square root.
pub const DEFAULT_EPS: f64 = 1e-5;
/// Default momentum for the running-statistics moving average.
pub const DEFAULT_MOMENTUM: f64 = 0.9;

/// Whether a layer runs with training or inference semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Train,
    Test,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Mode::Train),
            "test" => Ok(Mode::Test),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => f.write_str("train"),
            Mode::Test => f.write_str("test"),
        }
    }
}

/// Batch normalization options and caller-owned running statistics.
///
/// `running_mean` / `running_var` start as `None` and are set to zeros of
/// the feature dimension on the first forward call. After every call they
/// hold the statistics the next call should see.
#[derive(Debug, Clone)]
pub struct BatchNormParam {
    pub mode: Mode,
    pub eps: f64,
    pub momentum: f64,
    pub running_mean: Option<Array1<f64>>,
    pub running_var: Option<Array1<f64>>,
}

impl Default for BatchNormParam {
    fn default() -> Self {
        BatchNormParam {
            mode: Mode::Train,
            eps: DEFAULT_EPS,
            momentum: DEFAULT_MOMENTUM,
            running_mean: None,
            running_var: None,
        }
    }
}

impl BatchNormParam {
    pub fn new(mode: Mode) -> Self {
        BatchNormParam {
            mode,
            ..Default::default()
        }
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    /// Seed the running statistics explicitly.
    pub fn with_running_stats(mut self, mean: Array1<f64>, var: Array1<f64>) -> Self {
        self.running_mean = Some(mean);
        self.running_var = Some(var);
        self
    }
}

/// Layer normalization options. There is no mode: layer norm behaves the
/// same at training and inference time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerNormParam {
    pub eps: f64,
}

impl Default for LayerNormParam {
    fn default() -> Self {
        LayerNormParam { eps: DEFAULT_EPS }
    }
}

/// Inverted dropout options. `p` is the probability of *keeping* a unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropoutParam {
    pub p: f64,
    pub mode: Mode,
    pub seed: Option<u64>,
}

impl DropoutParam {
    pub fn new(p: f64, mode: Mode) -> Self {
        DropoutParam {
            p,
            mode,
            seed: None,
        }
    }

    /// Fix the mask generator so repeated calls draw the same mask.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Convolution geometry: stride between receptive fields and symmetric
/// zero padding on both spatial axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvParam {
    pub stride: usize,
    pub pad: usize,
}

impl Default for ConvParam {
    fn default() -> Self {
        ConvParam { stride: 1, pad: 0 }
    }
}

/// Max pooling window and stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolParam {
    pub pool_height: usize,
    pub pool_width: usize,
    pub stride: usize,
}

impl Default for PoolParam {
    fn default() -> Self {
        PoolParam {
            pool_height: 2,
            pool_width: 2,
            stride: 2,
        }
    }
}

/// Spatial group normalization options. `groups` must divide the channel
/// count of the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupNormParam {
    pub groups: usize,
    pub eps: f64,
}

impl GroupNormParam {
    pub fn new(groups: usize) -> Self {
        GroupNormParam {
            groups,
            eps: DEFAULT_EPS,
        }
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }
}
