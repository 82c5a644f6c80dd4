/// Errors produced by the layer primitives.
///
/// Every forward and backward function validates its arguments before
/// allocating outputs, so an `Err` never leaves a partially written array.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A mode string other than `train` or `test`.
    #[error("invalid mode \"{0}\": expected \"train\" or \"test\"")]
    InvalidMode(String),

    /// Incompatible array shapes between inputs, parameters, caches or
    /// upstream gradients.
    #[error("{op}: shape mismatch: {detail}")]
    ShapeMismatch { op: &'static str, detail: String },

    /// Normalization epsilon must be strictly positive.
    #[error("{op}: eps must be positive, got {eps}")]
    InvalidEpsilon { op: &'static str, eps: f64 },

    /// Dropout retention probability outside `(0, 1]`.
    #[error("dropout: keep probability must be in (0, 1], got {0}")]
    InvalidProbability(f64),

    /// Window, stride or group settings that cannot produce an output.
    #[error("{op}: invalid geometry: {detail}")]
    InvalidGeometry { op: &'static str, detail: String },

    #[error("{op}: label {label} out of range for {classes} classes")]
    LabelOutOfRange {
        op: &'static str,
        label: usize,
        classes: usize,
    },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl Error {
    pub(crate) fn shape(op: &'static str, detail: impl Into<String>) -> Self {
        Error::ShapeMismatch {
            op,
            detail: detail.into(),
        }
    }

    pub(crate) fn geometry(op: &'static str, detail: impl Into<String>) -> Self {
        Error::InvalidGeometry {
            op,
            detail: detail.into(),
        }
    }
}

/// Convenience Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Reject a non-positive (or NaN) epsilon.
pub(crate) fn check_eps(op: &'static str, eps: f64) -> Result<()> {
    if eps > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidEpsilon { op, eps })
    }
}

/// Reject an upstream gradient whose shape differs from the forward output.
pub(crate) fn check_grad_shape(op: &'static str, expected: &[usize], got: &[usize]) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(Error::shape(
            op,
            format!("upstream gradient {:?} does not match output {:?}", got, expected),
        ))
    }
}
