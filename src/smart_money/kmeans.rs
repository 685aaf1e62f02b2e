//! Seeded K-means (Lloyd iterations with k-means++ seeding)
//!
//! All randomness comes from one `ChaCha8Rng` seeded from config, so the
//! same feature matrix always yields the same labels.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{Error, Result};

/// K-means parameters
#[derive(Debug, Clone)]
pub struct KMeans {
    pub k: usize,
    pub n_init: usize,
    pub max_iterations: usize,
    /// Convergence threshold, relative to the mean per-feature variance
    pub tolerance: f64,
    pub seed: u64,
}

/// Best run out of `n_init` restarts
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Sum of squared distances to assigned centroids
    pub inertia: f64,
    pub iterations: usize,
}

impl KMeans {
    pub fn fit(&self, points: &[Vec<f64>]) -> Result<KMeansFit> {
        if self.k == 0 || points.len() < self.k {
            return Err(Error::Internal(format!(
                "cannot form {} clusters from {} points",
                self.k,
                points.len()
            )));
        }

        let tol = self.tolerance * mean_variance(points);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut best: Option<KMeansFit> = None;

        for _ in 0..self.n_init.max(1) {
            let seeds = plus_plus_init(points, self.k, &mut rng);
            let fit = self.lloyd(points, seeds, tol);
            // Strictly better only, so the earliest restart wins ties
            if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }

        best.ok_or_else(|| Error::Internal("k-means produced no fit".to_string()))
    }

    fn lloyd(&self, points: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, tol: f64) -> KMeansFit {
        let dims = points[0].len();
        let mut labels = vec![0usize; points.len()];
        let mut iterations = 0;

        for iter in 0..self.max_iterations {
            iterations = iter + 1;
            for (label, point) in labels.iter_mut().zip(points) {
                *label = nearest(point, &centroids).0;
            }

            let mut sums = vec![vec![0.0; dims]; self.k];
            let mut counts = vec![0usize; self.k];
            for (point, &label) in points.iter().zip(&labels) {
                counts[label] += 1;
                for (s, x) in sums[label].iter_mut().zip(point) {
                    *s += x;
                }
            }

            let mut updated: Vec<Vec<f64>> = sums
                .into_iter()
                .zip(&counts)
                .zip(&centroids)
                .map(|((sum, &count), old)| {
                    if count == 0 {
                        old.clone()
                    } else {
                        sum.into_iter().map(|s| s / count as f64).collect()
                    }
                })
                .collect();
            relocate_empty(points, &labels, &counts, &mut updated);

            let shift: f64 = centroids
                .iter()
                .zip(&updated)
                .map(|(a, b)| squared_distance(a, b))
                .sum();
            centroids = updated;

            if shift <= tol {
                break;
            }
        }

        let mut inertia = 0.0;
        for (label, point) in labels.iter_mut().zip(points) {
            let (idx, dist) = nearest(point, &centroids);
            *label = idx;
            inertia += dist;
        }

        KMeansFit {
            labels,
            centroids,
            inertia,
            iterations,
        }
    }
}

/// k-means++: first seed uniform, later seeds weighted by squared distance
fn plus_plus_init(points: &[Vec<f64>], k: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())].clone());

    while centroids.len() < k {
        let weights: Vec<f64> = points.iter().map(|p| nearest(p, &centroids).1).collect();
        let idx = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            // Every point already coincides with a seed
            Err(_) => rng.gen_range(0..points.len()),
        };
        centroids.push(points[idx].clone());
    }

    centroids
}

/// Move each empty cluster onto the point farthest from its own centroid
fn relocate_empty(
    points: &[Vec<f64>],
    labels: &[usize],
    counts: &[usize],
    centroids: &mut [Vec<f64>],
) {
    let mut taken: Vec<usize> = Vec::new();
    for cluster in 0..counts.len() {
        if counts[cluster] != 0 {
            continue;
        }
        let farthest = points
            .iter()
            .enumerate()
            .filter(|(i, _)| !taken.contains(i))
            .map(|(i, p)| (i, squared_distance(p, &centroids[labels[i]])))
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((i, d)),
            });
        if let Some((i, _)) = farthest {
            taken.push(i);
            centroids[cluster] = points[i].clone();
        }
    }
}

/// Index and squared distance of the closest centroid; ties go to the lowest index
fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn mean_variance(points: &[Vec<f64>]) -> f64 {
    let n = points.len() as f64;
    let dims = points[0].len();
    let mut total = 0.0;
    for d in 0..dims {
        let mean = points.iter().map(|p| p[d]).sum::<f64>() / n;
        total += points.iter().map(|p| (p[d] - mean).powi(2)).sum::<f64>() / n;
    }
    total / dims.max(1) as f64
}
