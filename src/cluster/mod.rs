//! Clustering models: K-means and an EM-fitted Gaussian mixture.
//!
//! ## Hard vs Soft Clustering
//!
//! **Hard clustering** assigns each item to exactly one cluster. Simple, but
//! loses information when items genuinely sit between groups.
//!
//! **Soft clustering** gives each item a probability distribution over clusters.
//! The mixture's responsibilities γₙₖ are exactly that.
//!
//! ## Algorithms
//!
//! ### K-means
//!
//! Assign each point to the nearest centroid, move each centroid to the mean
//! of its points, repeat until the centroids stop moving.
//!
//! ```text
//! J = Σ_k Σ_{x ∈ C_k} ||x - μ_k||²
//! ```
//!
//! ### Gaussian Mixture Model (GMM)
//!
//! ```text
//! P(x) = Σ π_k × N(x | μ_k, Σ_k)
//! ```
//!
//! Seeded from a k-means run (means, per-cluster scatter, cluster shares),
//! then refined by EM with full covariances.
//!
//! ## Usage
//!
//! ```rust
//! use mixfit::cluster::{GmmConfig, KmeansConfig, PointClassifier, Trainable};
//! use ndarray::array;
//!
//! let data = array![
//!     [0.0, 0.0],
//!     [0.1, 0.1],
//!     [10.0, 10.0],
//!     [10.1, 10.1],
//! ];
//!
//! let mut kmeans = KmeansConfig::new(2).with_seed(42).build(data).unwrap();
//! kmeans.train().unwrap();
//! let a = kmeans.predict(array![0.05, 0.0].view()).unwrap();
//! let b = kmeans.predict(array![10.0, 10.05].view()).unwrap();
//! assert_ne!(a, b);
//!
//! let data = array![
//!     [0.0, 0.0], [0.4, 0.1], [0.1, 0.5], [0.5, 0.4],
//!     [10.0, 10.0], [10.4, 10.1], [10.1, 10.5], [10.5, 10.4],
//! ];
//! let mut gmm = GmmConfig::new(2).with_seed(7).build(data).unwrap();
//! gmm.train().unwrap();
//! assert!((gmm.weights().sum() - 1.0).abs() < 1e-9);
//! ```

mod gmm;
mod kmeans;
mod traits;


pub use gmm::{DegeneratePolicy, Gmm, GmmConfig, DEGENERATE_MASS};
pub use kmeans::{EmptyClusterPolicy, Kmeans, KmeansConfig, KmeansInit};
pub use traits::{PointClassifier, Trainable};
