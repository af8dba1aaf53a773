//! Model traits.

use crate::error::Result;
use ndarray::{ArrayView1, ArrayView2};

/// Uniform training surface shared by every model in the library.
///
/// Harness code (plotting, benchmarking, early-stopping reports) only needs
/// this trait, never the concrete model.
pub trait Trainable {
    /// Run the model's iterative fit until convergence or its iteration cap.
    ///
    /// Hitting the cap is a normal return, not an error; compare the history
    /// length with the configured cap to tell the two apart.
    fn train(&mut self) -> Result<()>;

    /// Per-iteration convergence quantity, in iteration order.
    fn error_history(&self) -> &[f64];

    /// Per-iteration objective value, in iteration order.
    fn loss_history(&self) -> &[f64];
}

/// Assigns a single point to one of `n_clusters()` groups.
pub trait PointClassifier {
    /// Cluster index of `point`, always in `0..n_clusters()`.
    fn predict(&self, point: ArrayView1<'_, f64>) -> Result<usize>;

    /// Get the number of clusters.
    fn n_clusters(&self) -> usize;

    /// Classify every row of `points`.
    fn predict_batch(&self, points: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        points.rows().into_iter().map(|row| self.predict(row)).collect()
    }
}
