//! Gaussian Mixture Model clustering.
//!
//! GMM provides **soft clustering** with probabilistic assignments,
//! allowing items to belong to multiple clusters with different probabilities.
//!
//! # The Probabilistic Model
//!
//! GMM assumes data is generated from K Gaussian distributions:
//!
//! ```text
//! P(x) = Σₖ πₖ × N(x | μₖ, Σₖ)
//! ```
//!
//! Where:
//! - πₖ = mixing weight (probability of cluster k)
//! - μₖ = mean of cluster k
//! - Σₖ = full covariance matrix of cluster k
//!
//! # Initialization
//!
//! A [`Kmeans`](super::Kmeans) run over the same data with the same K seeds
//! the mixture: μₖ is the centroid, Σₖ the scatter of the hard cluster,
//! πₖ its share of the points. The k-means model is consumed by that step.
//!
//! # The EM Algorithm
//!
//! **M-step**: Update parameters using responsibilities:
//! - Nₖ = Σₙ γₙₖ
//! - πₖ = Nₖ / N
//! - μₖ = Σₙ γₙₖ xₙ / Nₖ
//! - Σₖ = Σₙ γₙₖ (xₙ − μₖ)(xₙ − μₖ)ᵀ / Nₖ
//!
//! **E-step**: Compute "responsibilities" (soft assignments):
//! ```text
//! γₙₖ = πₖ × N(xₙ | μₖ, Σₖ) / Σⱼ πⱼ × N(xₙ | μⱼ, Σⱼ)
//! ```
//!
//! The E-step works in log space (log-sum-exp) so far-away points do not
//! underflow every component to zero.
//!
//! # Convergence
//!
//! The incomplete-data log-likelihood `Σₙ ln Σₖ πₖ N(xₙ | μₖ, Σₖ)` is recorded
//! once at initialization and after every sweep. A run stops when
//! `|curr − prev| / |prev| < epsilon`. The test is symmetric: a small *drop*
//! stops the run just like a small rise. Exact EM never decreases the
//! likelihood, but reseeding a collapsed component can.
//!
//! # Failure Modes
//!
//! - **Singular covariance**: surfaced as [`Error::NonInvertibleCovariance`];
//!   there is no covariance regularization.
//! - **Collapsed component**: Nₖ below [`DEGENERATE_MASS`] is handled by the
//!   configured [`DegeneratePolicy`].
//! - **Local optima**: EM converges to local maxima; initialization matters.

use super::kmeans::KmeansConfig;
use super::traits::{PointClassifier, Trainable};
use crate::error::{Error, Result};
use crate::linalg::{
    add_weighted_outer, invert_spd, mahalanobis_sq, pooled_covariance, scatter,
    validate_dataset, validate_point, SpdInverse,
};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::prelude::*;
use std::f64::consts::PI;
use tracing::{debug, info, warn};

/// Effective count below which a component counts as collapsed.
pub const DEGENERATE_MASS: f64 = 1e-8;

/// What to do with a component that has lost its responsibility mass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegeneratePolicy {
    /// Fail with [`Error::DegenerateComponent`].
    #[default]
    Abort,
    /// Restart the component at a random data row with the pooled dataset
    /// covariance and weight 1/K, then renormalize the weights.
    Reseed,
}

/// Gaussian mixture configuration.
#[derive(Debug, Clone)]
pub struct GmmConfig {
    /// Number of components (clusters).
    n_components: usize,
    /// Maximum EM sweeps per `train()`.
    max_iter: usize,
    /// Relative log-likelihood change that counts as converged.
    epsilon: f64,
    /// Random seed.
    seed: Option<u64>,
    degenerate_policy: DegeneratePolicy,
    /// Settings for the seeding k-means run; its k is overridden.
    kmeans: Option<KmeansConfig>,
}

impl GmmConfig {
    /// Create a configuration with `n_components` components.
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            max_iter: 100,
            epsilon: 0.01,
            seed: None,
            degenerate_policy: DegeneratePolicy::default(),
            kmeans: None,
        }
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the relative log-likelihood tolerance.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the collapsed-component policy.
    pub fn with_degenerate_policy(mut self, policy: DegeneratePolicy) -> Self {
        self.degenerate_policy = policy;
        self
    }

    /// Tune the k-means run used for initialization.
    pub fn with_kmeans(mut self, kmeans: KmeansConfig) -> Self {
        self.kmeans = Some(kmeans);
        self
    }

    /// Number of components.
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    fn validate(&self, data: &Array2<f64>) -> Result<()> {
        if self.n_components < 2 {
            return Err(Error::InvalidParameter {
                name: "n_components",
                message: "must be >= 2",
            });
        }
        if self.max_iter < 2 {
            return Err(Error::InvalidParameter {
                name: "max_iter",
                message: "must be >= 2",
            });
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "epsilon",
                message: "must be finite and > 0",
            });
        }
        validate_dataset(data)?;
        if self.n_components > data.nrows() {
            return Err(Error::InvalidClusterCount {
                requested: self.n_components,
                n_items: data.nrows(),
            });
        }
        Ok(())
    }

    /// Validate, run k-means, seed the mixture and record the first
    /// log-likelihood.
    pub fn build(&self, data: Array2<f64>) -> Result<Gmm> {
        let rng = match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        self.build_with_rng(data, rng)
    }

    /// Like [`build`](Self::build), with an injected random source.
    ///
    /// The seeding k-means run draws its own generator from `rng`.
    pub fn build_with_rng(&self, data: Array2<f64>, mut rng: StdRng) -> Result<Gmm> {
        self.validate(&data)?;
        let k = self.n_components;

        let kmeans_rng = StdRng::from_rng(&mut rng);
        let mut kmeans = self
            .kmeans
            .clone()
            .unwrap_or_else(|| KmeansConfig::new(k))
            .with_k(k)
            .build_with_rng(data, kmeans_rng)?;
        kmeans.train()?;
        let (data, centroids, members) = kmeans.into_parts();

        let (n, d) = data.dim();
        let mut gmm = Gmm {
            config: self.clone(),
            data,
            rng,
            weights: Array1::zeros(k),
            means: Array2::zeros((k, d)),
            covariances: vec![Array2::zeros((d, d)); k],
            precisions: vec![Array2::zeros((d, d)); k],
            determinants: Array1::zeros(k),
            log_determinants: Array1::zeros(k),
            responsibilities: Array2::zeros((n, k)),
            row_likelihoods: Array1::zeros(n),
            effective_counts: Array1::zeros(k),
            log_likelihood_history: Vec::new(),
            loss_history: Vec::new(),
            converged: false,
        };

        gmm.seed_from_clusters(&centroids, &members)?;
        let ll = gmm.e_step();
        gmm.record(ll);

        debug!(
            n_components = k,
            n_samples = n,
            log_likelihood = ll,
            "mixture initialized from k-means"
        );
        Ok(gmm)
    }
}

/// Log-sum-exp for numerical stability.
fn logsumexp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_val.is_infinite() {
        return max_val;
    }
    max_val
        + values
            .iter()
            .map(|&v| (v - max_val).exp())
            .sum::<f64>()
            .ln()
}

/// `|curr − prev| / |prev|`, or the absolute change when `prev` is zero.
fn relative_change(prev: f64, curr: f64) -> f64 {
    if prev == 0.0 {
        (curr - prev).abs()
    } else {
        ((curr - prev) / prev).abs()
    }
}

/// A Gaussian mixture bound to its dataset.
///
/// Built (and initialized) by [`GmmConfig::build`]; refined by
/// [`Trainable::train`].
#[derive(Debug, Clone)]
pub struct Gmm {
    config: GmmConfig,
    data: Array2<f64>,
    rng: StdRng,
    /// πₖ.
    weights: Array1<f64>,
    /// μₖ, K×D.
    means: Array2<f64>,
    covariances: Vec<Array2<f64>>,
    /// Σₖ⁻¹.
    precisions: Vec<Array2<f64>>,
    /// |Σₖ|.
    determinants: Array1<f64>,
    log_determinants: Array1<f64>,
    /// γ, N×K.
    responsibilities: Array2<f64>,
    /// Σₖ πₖ N(xₙ | μₖ, Σₖ) per row, from the latest E-step.
    row_likelihoods: Array1<f64>,
    /// Nₖ.
    effective_counts: Array1<f64>,
    log_likelihood_history: Vec<f64>,
    loss_history: Vec<f64>,
    converged: bool,
}

impl Gmm {
    /// Mixing weights πₖ (sum to 1).
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Component means (K×D).
    pub fn means(&self) -> &Array2<f64> {
        &self.means
    }

    /// Component covariances.
    pub fn covariances(&self) -> &[Array2<f64>] {
        &self.covariances
    }

    /// Component precision matrices Σₖ⁻¹.
    pub fn precisions(&self) -> &[Array2<f64>] {
        &self.precisions
    }

    /// Covariance determinants |Σₖ|.
    pub fn determinants(&self) -> &Array1<f64> {
        &self.determinants
    }

    /// Responsibilities γ (N×K), rows sum to 1.
    pub fn responsibilities(&self) -> &Array2<f64> {
        &self.responsibilities
    }

    /// Unnormalized per-row mixture densities from the latest E-step.
    pub fn row_likelihoods(&self) -> &Array1<f64> {
        &self.row_likelihoods
    }

    /// Effective counts Nₖ = Σₙ γₙₖ.
    pub fn effective_counts(&self) -> &Array1<f64> {
        &self.effective_counts
    }

    /// Log-likelihood at initialization and after every sweep.
    pub fn log_likelihood_history(&self) -> &[f64] {
        &self.log_likelihood_history
    }

    /// The dataset the model was fitted on.
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Whether the last `train()` met the epsilon criterion.
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// EM sweeps run so far, across all `train()` calls.
    pub fn n_iter(&self) -> usize {
        self.log_likelihood_history.len().saturating_sub(1)
    }

    /// Gaussian density of component `k` at `point`.
    ///
    /// ```text
    /// (2π)^(-D/2) · |Σₖ|^(-1/2) · exp(-½ (x−μₖ)ᵀ Σₖ⁻¹ (x−μₖ))
    /// ```
    pub fn density(&self, point: ArrayView1<'_, f64>, k: usize) -> Result<f64> {
        Ok(self.log_density(point, k)?.exp())
    }

    /// Natural log of [`density`](Self::density).
    pub fn log_density(&self, point: ArrayView1<'_, f64>, k: usize) -> Result<f64> {
        validate_point(&point, self.data.ncols())?;
        if k >= self.config.n_components {
            return Err(Error::InvalidParameter {
                name: "component",
                message: "index out of range",
            });
        }
        Ok(self.component_log_density(&point, k))
    }

    /// Posterior P(component k | point) for every k.
    pub fn predict_proba(&self, point: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        validate_point(&point, self.data.ncols())?;
        let log_joint = self.log_joint(&point);
        let lse = logsumexp(&log_joint);
        Ok(log_joint.iter().map(|&v| (v - lse).exp()).collect())
    }

    /// Log of the mixture density at `point`.
    pub fn score(&self, point: ArrayView1<'_, f64>) -> Result<f64> {
        validate_point(&point, self.data.ncols())?;
        Ok(logsumexp(&self.log_joint(&point)))
    }

    fn component_log_density(&self, point: &ArrayView1<'_, f64>, k: usize) -> f64 {
        let d = self.data.ncols() as f64;
        let quad = mahalanobis_sq(point, &self.means.row(k), &self.precisions[k]);
        -0.5 * (d * (2.0 * PI).ln() + self.log_determinants[k] + quad)
    }

    /// ln πₖ + ln N(x | μₖ, Σₖ) for every k.
    fn log_joint(&self, point: &ArrayView1<'_, f64>) -> Vec<f64> {
        (0..self.config.n_components)
            .map(|k| self.weights[k].ln() + self.component_log_density(point, k))
            .collect()
    }

    fn set_component(
        &mut self,
        k: usize,
        mean: ArrayView1<'_, f64>,
        cov: Array2<f64>,
        inv: SpdInverse,
    ) {
        self.means.row_mut(k).assign(&mean);
        self.covariances[k] = cov;
        self.precisions[k] = inv.inverse;
        self.determinants[k] = inv.determinant;
        self.log_determinants[k] = inv.log_determinant;
    }

    /// Initial parameters from hard k-means clusters.
    fn seed_from_clusters(
        &mut self,
        centroids: &Array2<f64>,
        members: &[Vec<usize>],
    ) -> Result<()> {
        let n = self.data.nrows() as f64;

        // Empty clusters are settled before any inversion is attempted.
        let empty: Vec<usize> = (0..members.len())
            .filter(|&k| members[k].is_empty())
            .collect();
        if let (Some(&k), DegeneratePolicy::Abort) =
            (empty.first(), self.config.degenerate_policy)
        {
            return Err(Error::DegenerateComponent {
                component: k,
                effective_count: 0.0,
            });
        }

        for (k, rows) in members.iter().enumerate() {
            if rows.is_empty() {
                continue;
            }
            let mean = centroids.row(k);
            let cov = scatter(&self.data, rows, &mean);
            let inv = invert_spd(&cov.view())
                .ok_or(Error::NonInvertibleCovariance { component: k })?;
            self.set_component(k, mean, cov, inv);
            self.effective_counts[k] = rows.len() as f64;
            self.weights[k] = rows.len() as f64 / n;
        }

        self.reseed_components(&empty)
    }

    /// Restart each listed component, then renormalize the weights.
    fn reseed_components(&mut self, components: &[usize]) -> Result<()> {
        if components.is_empty() {
            return Ok(());
        }

        let pooled = pooled_covariance(&self.data);
        let pooled_inv = invert_spd(&pooled.view()).ok_or(Error::NonInvertibleCovariance {
            component: components[0],
        })?;
        let k_total = self.config.n_components as f64;
        for &k in components {
            let row = self.rng.random_range(0..self.data.nrows());
            warn!(
                component = k,
                row,
                effective_count = self.effective_counts[k],
                "reseeding collapsed mixture component"
            );
            let mean = self.data.row(row).to_owned();
            self.set_component(k, mean.view(), pooled.clone(), pooled_inv.clone());
            self.weights[k] = 1.0 / k_total;
        }

        let total = self.weights.sum();
        self.weights /= total;
        Ok(())
    }

    /// Re-estimate π, μ, Σ from the current responsibilities.
    ///
    /// Nothing is written unless every component succeeds (or is reseeded).
    fn m_step(&mut self) -> Result<()> {
        let (n, d) = self.data.dim();
        let k_total = self.config.n_components;
        let counts = self.responsibilities.sum_axis(Axis(0));

        let mut fitted: Vec<Option<(Array1<f64>, Array2<f64>, SpdInverse)>> =
            Vec::with_capacity(k_total);
        let mut collapsed = Vec::new();

        for k in 0..k_total {
            let nk = counts[k];
            if nk.is_nan() || nk < DEGENERATE_MASS {
                match self.config.degenerate_policy {
                    DegeneratePolicy::Abort => {
                        return Err(Error::DegenerateComponent {
                            component: k,
                            effective_count: nk,
                        })
                    }
                    DegeneratePolicy::Reseed => {
                        collapsed.push(k);
                        fitted.push(None);
                        continue;
                    }
                }
            }

            let gamma = self.responsibilities.column(k);
            let mean = gamma.dot(&self.data) / nk;

            let mut cov = Array2::zeros((d, d));
            for (i, x) in self.data.rows().into_iter().enumerate() {
                add_weighted_outer(&mut cov, &x, &mean.view(), gamma[i] / nk);
            }
            let inv = invert_spd(&cov.view())
                .ok_or(Error::NonInvertibleCovariance { component: k })?;
            fitted.push(Some((mean, cov, inv)));
        }

        self.effective_counts.assign(&counts);
        self.weights = counts / n as f64;
        for (k, component) in fitted.into_iter().enumerate() {
            if let Some((mean, cov, inv)) = component {
                self.set_component(k, mean.view(), cov, inv);
            }
        }

        self.reseed_components(&collapsed)
    }

    /// Recompute responsibilities; returns the log-likelihood.
    fn e_step(&mut self) -> f64 {
        let mut log_likelihood = 0.0;

        for i in 0..self.data.nrows() {
            let log_joint = self.log_joint(&self.data.row(i));
            let lse = logsumexp(&log_joint);

            for (k, &v) in log_joint.iter().enumerate() {
                self.responsibilities[[i, k]] = (v - lse).exp();
            }
            self.row_likelihoods[i] = lse.exp();
            log_likelihood += lse;
        }

        self.effective_counts = self.responsibilities.sum_axis(Axis(0));
        log_likelihood
    }

    fn record(&mut self, log_likelihood: f64) {
        self.log_likelihood_history.push(log_likelihood);
        self.loss_history.push(-log_likelihood / self.data.nrows() as f64);
    }
}

impl Trainable for Gmm {
    fn train(&mut self) -> Result<()> {
        self.converged = false;
        let mut prev = self
            .log_likelihood_history
            .last()
            .copied()
            .unwrap_or(f64::NEG_INFINITY);

        for iter in 0..self.config.max_iter {
            self.m_step()?;
            let ll = self.e_step();
            self.record(ll);

            let change = relative_change(prev, ll);
            debug!(
                iteration = iter + 1,
                log_likelihood = ll,
                relative_change = change,
                "EM sweep"
            );

            if change < self.config.epsilon {
                self.converged = true;
                break;
            }
            prev = ll;
        }

        info!(
            n_components = self.config.n_components,
            iterations = self.n_iter(),
            converged = self.converged,
            log_likelihood = ?self.log_likelihood_history.last(),
            "EM finished"
        );
        Ok(())
    }

    fn error_history(&self) -> &[f64] {
        &self.log_likelihood_history
    }

    fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }
}

impl PointClassifier for Gmm {
    /// Component with the highest density at `point` (lowest index on ties).
    fn predict(&self, point: ArrayView1<'_, f64>) -> Result<usize> {
        validate_point(&point, self.data.ncols())?;
        let mut best = 0;
        let mut best_val = f64::NEG_INFINITY;
        for k in 0..self.config.n_components {
            let v = self.component_log_density(&point, k);
            if v > best_val {
                best_val = v;
                best = k;
            }
        }
        Ok(best)
    }

    fn n_clusters(&self) -> usize {
        self.config.n_components
    }
}
