use mixfit::{purity, GmmConfig, KmeansConfig, PointClassifier, Trainable};
use ndarray::Array2;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Two unit-variance blobs at (0,0) and (10,10), 50 points each.
    let mut rng = StdRng::seed_from_u64(2024);
    let noise = Normal::new(0.0, 1.0)?;
    let centers = [[0.0, 0.0], [10.0, 10.0]];

    let mut data = Array2::zeros((100, 2));
    let mut truth = Vec::with_capacity(100);
    for (c, center) in centers.iter().enumerate() {
        for i in 0..50 {
            let row = c * 50 + i;
            data[[row, 0]] = center[0] + noise.sample(&mut rng);
            data[[row, 1]] = center[1] + noise.sample(&mut rng);
            truth.push(c);
        }
    }

    let mut kmeans = KmeansConfig::new(2).with_seed(1).build(data.clone())?;
    kmeans.train()?;
    let labels = kmeans.predict_batch(data.view())?;
    println!("k-means: {} iterations", kmeans.n_iter());
    println!("  centroid shifts: {:?}", kmeans.error_history());
    println!("  purity: {:.3}", purity(&labels, &truth));

    let mut gmm = GmmConfig::new(2)
        .with_max_iter(50)
        .with_epsilon(1e-4)
        .with_seed(1)
        .build(data.clone())?;
    gmm.train()?;
    let labels = gmm.predict_batch(data.view())?;
    println!("gmm: {} sweeps, converged={}", gmm.n_iter(), gmm.converged());
    println!("  log-likelihood: {:?}", gmm.log_likelihood_history());
    println!("  weights: {}", gmm.weights());
    println!("  means:\n{}", gmm.means());
    println!("  purity: {:.3}", purity(&labels, &truth));

    Ok(())
}
