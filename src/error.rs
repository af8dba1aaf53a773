use thiserror::Error;

/// Result alias for `mixfit`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by model construction, training and prediction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Dataset has no rows or no columns.
    #[error("empty input provided")]
    EmptyInput,

    /// Dataset or query point contains NaN or an infinity.
    #[error("input contains non-finite values")]
    NonFiniteInput,

    /// Vector length does not match the dataset's column count.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// More clusters requested than there are rows.
    #[error("cannot create {requested} clusters from {n_items} items")]
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of items.
        n_items: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// A component covariance is singular or not positive definite.
    #[error("covariance of component {component} is not invertible")]
    NonInvertibleCovariance {
        /// Mixture component index.
        component: usize,
    },

    /// A component lost (almost) all of its responsibility mass.
    #[error("component {component} collapsed (effective count {effective_count:e})")]
    DegenerateComponent {
        /// Mixture component index.
        component: usize,
        /// Σₙ γ(n, k) at the time of the collapse.
        effective_count: f64,
    },
}
