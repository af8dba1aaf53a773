//! # mixfit
//!
//! Classical clustering on dense `ndarray` matrices: Lloyd's K-means and a
//! full-covariance Gaussian mixture fitted by Expectation-Maximization.
//!
//! The mixture is seeded from a K-means run over the same data, so the two
//! are built to be used together; both also stand alone behind the shared
//! [`Trainable`] and [`PointClassifier`] traits.
//!
//! ```rust
//! use mixfit::{GmmConfig, PointClassifier, Trainable};
//! use ndarray::array;
//!
//! let data = array![
//!     [0.0, 0.0], [0.4, 0.1], [0.1, 0.5], [0.5, 0.4],
//!     [8.0, 8.0], [8.4, 8.1], [8.1, 8.5], [8.5, 8.4],
//! ];
//! let mut gmm = GmmConfig::new(2).with_seed(3).build(data).unwrap();
//! gmm.train().unwrap();
//!
//! let k = gmm.predict(array![8.2, 8.2].view()).unwrap();
//! assert!(k < 2);
//! println!("log-likelihood per sweep: {:?}", gmm.log_likelihood_history());
//! ```
//!
//! Numerical failures (singular covariance, collapsed component) come back as
//! [`Error`] values from `build` or `train`; fitted parameters never hold NaN.

pub mod cluster;
/// Error types used across `mixfit`.
pub mod error;
pub mod linalg;
pub mod metrics;

pub use cluster::{
    DegeneratePolicy, EmptyClusterPolicy, Gmm, GmmConfig, Kmeans, KmeansConfig, KmeansInit,
    PointClassifier, Trainable,
};
pub use error::{Error, Result};
pub use metrics::{ari, purity};
