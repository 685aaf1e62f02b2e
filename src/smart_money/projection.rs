//! Principal component projection
//!
//! Pipeline: scaled features → column centering → SVD → top-k right
//! singular vectors as loadings.

use nalgebra::{DMatrix, SVD};

use crate::error::{Error, Result};

/// Fitted principal component projection
#[derive(Debug, Clone)]
pub struct PrincipalComponents {
    mean: Vec<f64>,
    /// One loading vector per component, strongest first
    components: Vec<Vec<f64>>,
    explained_variance_ratio: Vec<f64>,
}

impl PrincipalComponents {
    /// Fit `n_components` components on row-major samples.
    ///
    /// Loadings are sign-normalized (largest-magnitude entry positive) so
    /// repeated fits on the same data project identically.
    pub fn fit(rows: &[Vec<f64>], n_components: usize) -> Result<Self> {
        let n_samples = rows.len();
        let n_features = rows.first().map(|r| r.len()).unwrap_or(0);
        if n_samples < 2 || n_features == 0 {
            return Err(Error::Internal(format!(
                "PCA needs at least 2 samples, got {} x {}",
                n_samples, n_features
            )));
        }
        let k = n_components.min(n_features).min(n_samples);

        let mut mean = vec![0.0; n_features];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        for m in mean.iter_mut() {
            *m /= n_samples as f64;
        }

        let centered = DMatrix::from_fn(n_samples, n_features, |i, j| rows[i][j] - mean[j]);
        let svd = SVD::new(centered, false, true);
        let v_t = svd
            .v_t
            .as_ref()
            .ok_or_else(|| Error::Internal("SVD did not produce right singular vectors".to_string()))?;

        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| {
            svd.singular_values[b]
                .total_cmp(&svd.singular_values[a])
                .then(a.cmp(&b))
        });

        let total_variance: f64 = svd.singular_values.iter().map(|s| s * s).sum();
        let mut components = Vec::with_capacity(k);
        let mut explained_variance_ratio = Vec::with_capacity(k);

        for &idx in order.iter().take(k) {
            let mut loading: Vec<f64> = v_t.row(idx).iter().copied().collect();
            let pivot = loading
                .iter()
                .copied()
                .fold(0.0_f64, |best, x| if x.abs() > best.abs() { x } else { best });
            if pivot < 0.0 {
                for x in loading.iter_mut() {
                    *x = -*x;
                }
            }
            components.push(loading);

            let s = svd.singular_values[idx];
            explained_variance_ratio.push(if total_variance > 0.0 {
                s * s / total_variance
            } else {
                0.0
            });
        }

        Ok(Self {
            mean,
            components,
            explained_variance_ratio,
        })
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| {
                self.components
                    .iter()
                    .map(|loading| {
                        row.iter()
                            .zip(&self.mean)
                            .zip(loading)
                            .map(|((x, m), w)| (x - m) * w)
                            .sum()
                    })
                    .collect()
            })
            .collect()
    }

    pub fn fit_transform(rows: &[Vec<f64>], n_components: usize) -> Result<(Self, Vec<Vec<f64>>)> {
        let pca = Self::fit(rows, n_components)?;
        let projected = pca.transform(rows);
        Ok((pca, projected))
    }

    pub fn components(&self) -> &[Vec<f64>] {
        &self.components
    }

    pub fn explained_variance_ratio(&self) -> &[f64] {
        &self.explained_variance_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_component_follows_dominant_axis() {
        // Variance almost entirely along the first feature
        let rows: Vec<Vec<f64>> = (0..10)
            .map(|i| vec![i as f64 * 10.0, (i % 2) as f64 * 0.1, 1.0])
            .collect();
        let (pca, projected) = PrincipalComponents::fit_transform(&rows, 2).unwrap();

        let first = &pca.components()[0];
        assert!(first[0] > 0.99);
        assert!(pca.explained_variance_ratio()[0] > 0.99);
        assert_eq!(projected.len(), 10);
        assert_eq!(projected[0].len(), 2);

        // Projection is centered
        let mean_pc1: f64 = projected.iter().map(|p| p[0]).sum::<f64>() / 10.0;
        assert!(mean_pc1.abs() < 1e-9);
    }

    #[test]
    fn test_fit_is_repeatable() {
        let rows = vec![
            vec![0.3, -1.2, 2.0],
            vec![1.1, 0.4, -0.5],
            vec![-0.7, 0.9, 0.1],
            vec![2.2, -0.3, 1.4],
            vec![0.0, 0.0, -1.0],
        ];
        let (_, a) = PrincipalComponents::fit_transform(&rows, 2).unwrap();
        let (_, b) = PrincipalComponents::fit_transform(&rows, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_few_samples() {
        assert!(PrincipalComponents::fit(&[vec![1.0, 2.0]], 2).is_err());
    }
}
