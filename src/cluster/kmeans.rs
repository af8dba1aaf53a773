//! K-means clustering.
//!
//! Partitions data into k clusters by minimizing **within-cluster sum of squares**
//! (WCSS, "inertia"). The foundational clustering algorithm, dating to 1957 (Lloyd).
//!
//! # The Objective
//!
//! ```text
//! WCSS = Σₖ Σᵢ∈Cₖ ||xᵢ - μₖ||²
//! ```
//!
//! # Lloyd's Algorithm
//!
//! 1. Initialize k centroids (k-means++ or k distinct random rows)
//! 2. **Assign**: Each point → nearest centroid (lowest index on ties)
//! 3. **Update**: Each centroid → mean of assigned points
//! 4. Stop once the centroid matrix moves less than the shift threshold
//!
//! The shift is the Frobenius norm `||C_curr − C_prev||`, recorded every
//! iteration so callers can plot it or compare its length with the cap.
//!
//! # Empty Clusters
//!
//! A centroid can end up with no points (duplicate rows, bad seeding). What
//! happens then is an explicit [`EmptyClusterPolicy`] rather than a 0/0 mean.
//!
//! # Failure Modes
//!
//! - **Local optima**: NP-hard problem; Lloyd finds local minimum only
//! - **Wrong k**: Must specify k in advance
//! - **Non-spherical clusters**: Assumes roughly spherical, equal-sized clusters

use super::traits::{PointClassifier, Trainable};
use crate::error::{Error, Result};
use crate::linalg::{squared_distance, validate_dataset, validate_point};
use ndarray::{Array2, ArrayView1, Axis};
use rand::prelude::*;
use tracing::{debug, info};

/// How the initial centroids are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KmeansInit {
    /// k-means++: first centroid uniform, the rest proportional to D(x)².
    #[default]
    PlusPlus,
    /// k distinct rows sampled uniformly without replacement.
    RandomPoints,
}

/// What the update step does with a centroid that received no points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyClusterPolicy {
    /// Move the centroid onto a uniformly random data row.
    #[default]
    Reseed,
    /// Leave the centroid where it was.
    KeepPrevious,
}

/// K-means configuration.
#[derive(Debug, Clone)]
pub struct KmeansConfig {
    /// Number of clusters.
    k: usize,
    /// Maximum iterations.
    max_iter: usize,
    /// Stop once the centroid shift drops below this.
    shift_threshold: f64,
    /// Random seed.
    seed: Option<u64>,
    init: KmeansInit,
    empty_policy: EmptyClusterPolicy,
}

impl KmeansConfig {
    /// Create a configuration for `k` clusters with default settings.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 100,
            shift_threshold: 0.005,
            seed: None,
            init: KmeansInit::default(),
            empty_policy: EmptyClusterPolicy::default(),
        }
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the centroid-shift convergence threshold.
    pub fn with_shift_threshold(mut self, shift_threshold: f64) -> Self {
        self.shift_threshold = shift_threshold;
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the initialization scheme.
    pub fn with_init(mut self, init: KmeansInit) -> Self {
        self.init = init;
        self
    }

    /// Set the empty-cluster policy.
    pub fn with_empty_cluster_policy(mut self, policy: EmptyClusterPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    /// Number of clusters.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Override the cluster count (used when a mixture model drives k-means).
    pub(crate) fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    fn validate(&self, data: &Array2<f64>) -> Result<()> {
        if self.k < 2 {
            return Err(Error::InvalidParameter {
                name: "k",
                message: "must be >= 2",
            });
        }
        if self.max_iter < 1 {
            return Err(Error::InvalidParameter {
                name: "max_iter",
                message: "must be >= 1",
            });
        }
        if !self.shift_threshold.is_finite() || self.shift_threshold < 0.0 {
            return Err(Error::InvalidParameter {
                name: "shift_threshold",
                message: "must be finite and >= 0",
            });
        }
        validate_dataset(data)?;
        if self.k > data.nrows() {
            return Err(Error::InvalidClusterCount {
                requested: self.k,
                n_items: data.nrows(),
            });
        }
        Ok(())
    }

    /// Validate, seed the centroids and return an untrained model.
    ///
    /// Uses the configured seed, or a thread-local generator when unset.
    pub fn build(&self, data: Array2<f64>) -> Result<Kmeans> {
        let rng = match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        self.build_with_rng(data, rng)
    }

    /// Like [`build`](Self::build), with an injected random source.
    pub fn build_with_rng(&self, data: Array2<f64>, mut rng: StdRng) -> Result<Kmeans> {
        self.validate(&data)?;

        let centroids = match self.init {
            KmeansInit::PlusPlus => init_plus_plus(&data, self.k, &mut rng),
            KmeansInit::RandomPoints => init_random_points(&data, self.k, &mut rng),
        };
        let previous_centroids = centroids.clone();

        Ok(Kmeans {
            config: self.clone(),
            data,
            rng,
            centroids,
            previous_centroids,
            members: vec![Vec::new(); self.k],
            shift_history: Vec::new(),
            inertia_history: Vec::new(),
            converged: false,
        })
    }
}

/// k-means++ seeding.
///
/// Rows already at distance zero from a chosen centroid are never picked
/// again, so the result holds k distinct rows whenever the data has them.
fn init_plus_plus(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = data.nrows();
    let d = data.ncols();
    let mut centroids = Array2::zeros((k, d));

    // First centroid: random point
    let first = rng.random_range(0..n);
    centroids.row_mut(0).assign(&data.row(first));

    for i in 1..k {
        let distances: Vec<f64> = data
            .rows()
            .into_iter()
            .map(|point| {
                (0..i)
                    .map(|c| squared_distance(&point, &centroids.row(c)))
                    .fold(f64::MAX, f64::min)
            })
            .collect();

        // Sample proportional to squared distance
        let total: f64 = distances.iter().sum();
        if total == 0.0 {
            let idx = rng.random_range(0..n);
            centroids.row_mut(i).assign(&data.row(idx));
            continue;
        }

        let threshold = rng.random::<f64>() * total;
        let mut cumsum = 0.0;
        // Rounding can leave cumsum just short of threshold; fall back to the
        // last row that carries weight.
        let mut selected = distances.iter().rposition(|&w| w > 0.0).unwrap_or(0);

        for (j, &w) in distances.iter().enumerate() {
            cumsum += w;
            if w > 0.0 && cumsum > threshold {
                selected = j;
                break;
            }
        }

        centroids.row_mut(i).assign(&data.row(selected));
    }

    centroids
}

fn init_random_points(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let picks = rand::seq::index::sample(rng, data.nrows(), k);
    let mut centroids = Array2::zeros((k, data.ncols()));
    for (c, idx) in picks.iter().enumerate() {
        centroids.row_mut(c).assign(&data.row(idx));
    }
    centroids
}

/// Index of the centroid nearest to `point`, lowest index on ties.
fn nearest_centroid(point: &ArrayView1<'_, f64>, centroids: &Array2<f64>) -> (usize, f64) {
    let mut best_cluster = 0;
    let mut best_dist = f64::INFINITY;
    for (c, centroid) in centroids.rows().into_iter().enumerate() {
        let dist = squared_distance(point, &centroid);
        if dist < best_dist {
            best_dist = dist;
            best_cluster = c;
        }
    }
    (best_cluster, best_dist)
}

/// A K-means model bound to its dataset.
///
/// Built by [`KmeansConfig::build`]; fitted by [`Trainable::train`].
#[derive(Debug, Clone)]
pub struct Kmeans {
    config: KmeansConfig,
    data: Array2<f64>,
    rng: StdRng,
    /// K×D, one row per cluster.
    centroids: Array2<f64>,
    /// Centroids before the latest update.
    previous_centroids: Array2<f64>,
    /// Row indices per cluster from the latest assignment pass.
    members: Vec<Vec<usize>>,
    shift_history: Vec<f64>,
    inertia_history: Vec<f64>,
    converged: bool,
}

impl Kmeans {
    /// Current centroids (K×D).
    pub fn centroids(&self) -> &Array2<f64> {
        &self.centroids
    }

    /// Row indices assigned to each cluster by the latest assignment pass.
    pub fn members(&self) -> &[Vec<usize>] {
        &self.members
    }

    /// The dataset the model was built on.
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Centroid shift per iteration.
    pub fn shift_history(&self) -> &[f64] {
        &self.shift_history
    }

    /// Within-cluster sum of squares per iteration.
    pub fn inertia_history(&self) -> &[f64] {
        &self.inertia_history
    }

    /// Whether the last `train()` stopped on the shift threshold.
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Iterations run so far, across all `train()` calls.
    pub fn n_iter(&self) -> usize {
        self.shift_history.len()
    }

    /// Hand back the dataset, centroids and member sets, dropping the model.
    pub(crate) fn into_parts(self) -> (Array2<f64>, Array2<f64>, Vec<Vec<usize>>) {
        (self.data, self.centroids, self.members)
    }

    /// Rebuild `members` from the current centroids; returns the inertia.
    fn assign(&mut self) -> f64 {
        for m in &mut self.members {
            m.clear();
        }
        let mut inertia = 0.0;
        for (i, point) in self.data.rows().into_iter().enumerate() {
            let (c, dist) = nearest_centroid(&point, &self.centroids);
            self.members[c].push(i);
            inertia += dist;
        }
        inertia
    }

    /// Move every centroid to the mean of its members.
    fn update(&mut self) {
        let n = self.data.nrows();
        for c in 0..self.config.k {
            let rows = &self.members[c];
            if rows.is_empty() {
                match self.config.empty_policy {
                    EmptyClusterPolicy::Reseed => {
                        let idx = self.rng.random_range(0..n);
                        debug!(cluster = c, row = idx, "empty cluster reseeded");
                        self.centroids.row_mut(c).assign(&self.data.row(idx));
                    }
                    EmptyClusterPolicy::KeepPrevious => {
                        debug!(cluster = c, "empty cluster kept at previous centroid");
                    }
                }
                continue;
            }

            let mean = self
                .data
                .select(Axis(0), rows)
                .mean_axis(Axis(0))
                .unwrap_or_else(|| self.centroids.row(c).to_owned());
            self.centroids.row_mut(c).assign(&mean);
        }
    }
}

impl Trainable for Kmeans {
    fn train(&mut self) -> Result<()> {
        self.converged = false;

        for iter in 0..self.config.max_iter {
            self.previous_centroids.assign(&self.centroids);

            let inertia = self.assign();
            self.update();

            let shift = (&self.centroids - &self.previous_centroids)
                .iter()
                .map(|v| v * v)
                .sum::<f64>()
                .sqrt();
            self.shift_history.push(shift);
            self.inertia_history.push(inertia);

            debug!(iteration = iter + 1, shift, inertia, "k-means iteration");

            if shift < self.config.shift_threshold {
                self.converged = true;
                break;
            }
        }

        info!(
            k = self.config.k,
            iterations = self.shift_history.len(),
            converged = self.converged,
            "k-means finished"
        );
        Ok(())
    }

    fn error_history(&self) -> &[f64] {
        &self.shift_history
    }

    fn loss_history(&self) -> &[f64] {
        &self.inertia_history
    }
}

impl PointClassifier for Kmeans {
    fn predict(&self, point: ArrayView1<'_, f64>) -> Result<usize> {
        validate_point(&point, self.data.ncols())?;
        Ok(nearest_centroid(&point, &self.centroids).0)
    }

    fn n_clusters(&self) -> usize {
        self.config.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::dataset_from_rows;
    use ndarray::array;

    fn four_points() -> Array2<f64> {
        array![[0.0, 0.0], [0.1, 0.1], [10.0, 10.0], [10.1, 10.1]]
    }

    fn labels(model: &Kmeans) -> Vec<usize> {
        model.predict_batch(model.data().view()).unwrap()
    }

    #[test]
    fn test_kmeans_basic() {
        let mut kmeans = KmeansConfig::new(2).with_seed(42).build(four_points()).unwrap();
        kmeans.train().unwrap();
        let labels = labels(&kmeans);

        // Points 0,1 should be in same cluster, points 2,3 in another
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
        assert!(kmeans.converged());
    }

    #[test]
    fn test_kmeans_rejects_small_k() {
        let err = KmeansConfig::new(1).build(four_points()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "k", .. }));
    }

    #[test]
    fn test_kmeans_rejects_bad_threshold_and_cap() {
        let err = KmeansConfig::new(2)
            .with_shift_threshold(-1.0)
            .build(four_points())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidParameter {
                name: "shift_threshold",
                ..
            }
        ));

        let err = KmeansConfig::new(2)
            .with_max_iter(0)
            .build(four_points())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "max_iter", .. }));
    }

    #[test]
    fn test_kmeans_empty_input_error() {
        let result = KmeansConfig::new(2).build(Array2::zeros((0, 2)));
        assert_eq!(result.unwrap_err(), Error::EmptyInput);
    }

    #[test]
    fn test_kmeans_k_larger_than_n_error() {
        let data = array![[0.0, 0.0], [1.0, 1.0]];
        let result = KmeansConfig::new(5).build(data);
        assert_eq!(
            result.unwrap_err(),
            Error::InvalidClusterCount {
                requested: 5,
                n_items: 2
            }
        );
    }

    #[test]
    fn test_kmeans_every_point_in_exactly_one_cluster() {
        let rows: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![i as f64 * 0.1, (i % 5) as f64])
            .collect();
        let data = dataset_from_rows(&rows).unwrap();

        let mut kmeans = KmeansConfig::new(5).with_seed(123).build(data).unwrap();
        kmeans.train().unwrap();

        let mut seen = vec![0usize; 50];
        for members in kmeans.members() {
            for &i in members {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_kmeans_ties_do_not_drop_points() {
        // Every point is equidistant from both centroids.
        let data = array![[0.0, 1.0], [0.0, -1.0], [0.0, 2.0], [0.0, -2.0]];
        let mut kmeans = KmeansConfig::new(2)
            .with_max_iter(1)
            .build(data)
            .unwrap();
        kmeans.centroids = array![[-1.0, 0.0], [1.0, 0.0]];
        kmeans.assign();

        assert_eq!(kmeans.members()[0], vec![0, 1, 2, 3]);
        assert!(kmeans.members()[1].is_empty());
    }

    #[test]
    fn test_kmeans_one_iteration_for_k_separated_points() {
        let data = array![[0.0, 0.0], [100.0, 0.0], [0.0, 100.0]];
        let mut kmeans = KmeansConfig::new(3).with_seed(7).build(data).unwrap();
        kmeans.train().unwrap();

        assert_eq!(kmeans.shift_history(), &[0.0]);
        assert_eq!(kmeans.n_iter(), 1);
        assert!(kmeans.converged());
        for members in kmeans.members() {
            assert_eq!(members.len(), 1);
        }
    }

    #[test]
    fn test_kmeans_random_points_init_is_distinct() {
        let data = array![[0.0, 0.0], [100.0, 0.0], [0.0, 100.0]];
        let kmeans = KmeansConfig::new(3)
            .with_init(KmeansInit::RandomPoints)
            .with_seed(3)
            .build(data)
            .unwrap();
        let c = kmeans.centroids();
        for a in 0..3 {
            for b in (a + 1)..3 {
                assert!(squared_distance(&c.row(a), &c.row(b)) > 0.0);
            }
        }
    }

    #[test]
    fn test_kmeans_predict_nearest_centroid() {
        let mut kmeans = KmeansConfig::new(2).with_seed(42).build(four_points()).unwrap();
        kmeans.train().unwrap();

        let near_origin = kmeans.predict(array![0.2, -0.1].view()).unwrap();
        let near_far = kmeans.predict(array![9.0, 9.5].view()).unwrap();
        let labels = labels(&kmeans);
        assert_eq!(near_origin, labels[0]);
        assert_eq!(near_far, labels[2]);
    }

    #[test]
    fn test_kmeans_predict_dimension_mismatch() {
        let kmeans = KmeansConfig::new(2).build(four_points()).unwrap();
        let err = kmeans.predict(array![1.0, 2.0, 3.0].view()).unwrap_err();
        assert_eq!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn test_kmeans_empty_cluster_policies() {
        // All rows identical: both seeds coincide, cluster 1 never wins a tie.
        let data = Array2::from_elem((4, 2), 3.0);

        let mut keep = KmeansConfig::new(2)
            .with_empty_cluster_policy(EmptyClusterPolicy::KeepPrevious)
            .with_seed(1)
            .build(data.clone())
            .unwrap();
        keep.train().unwrap();
        assert!(keep.members()[1].is_empty());
        assert!(keep.centroids().iter().all(|v| v.is_finite()));

        let mut reseed = KmeansConfig::new(2).with_seed(1).build(data).unwrap();
        reseed.train().unwrap();
        assert!(reseed.members()[1].is_empty());
        assert_eq!(reseed.centroids().row(1), array![3.0, 3.0]);
    }

    #[test]
    fn test_kmeans_deterministic_with_seed() {
        let mut a = KmeansConfig::new(2).with_seed(42).build(four_points()).unwrap();
        let mut b = KmeansConfig::new(2).with_seed(42).build(four_points()).unwrap();
        a.train().unwrap();
        b.train().unwrap();
        assert_eq!(a.centroids(), b.centroids());
        assert_eq!(a.shift_history(), b.shift_history());
    }

    #[test]
    fn test_kmeans_cap_reached_is_not_an_error() {
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![(i * 7 % 13) as f64, i as f64]).collect();
        let data = dataset_from_rows(&rows).unwrap();
        let mut kmeans = KmeansConfig::new(3)
            .with_shift_threshold(0.0)
            .with_max_iter(4)
            .with_seed(9)
            .build(data)
            .unwrap();
        kmeans.train().unwrap();
        assert_eq!(kmeans.error_history().len(), 4);
        assert_eq!(kmeans.loss_history().len(), 4);
        assert!(!kmeans.converged());
    }

    #[test]
    fn test_kmeans_inertia_non_increasing() {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![(i % 4) as f64 * 5.0 + (i as f64 * 0.37).sin(), (i / 10) as f64])
            .collect();
        let data = dataset_from_rows(&rows).unwrap();
        let mut kmeans = KmeansConfig::new(4)
            .with_shift_threshold(0.0)
            .with_max_iter(20)
            .with_seed(5)
            .build(data)
            .unwrap();
        kmeans.train().unwrap();
        for w in kmeans.inertia_history().windows(2) {
            assert!(w[1] <= w[0] + 1e-9, "inertia rose: {:?}", w);
        }
    }
}
