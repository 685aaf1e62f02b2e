//! Robust feature scaling
//!
//! Centers each column on its median and divides by its interquartile
//! range, so a handful of brokers with extreme volume do not dominate the
//! distance metric the way mean/std scaling would let them.

/// Median/IQR scaler fitted on a column-major view of the data
#[derive(Debug, Clone, PartialEq)]
pub struct RobustScaler {
    centers: Vec<f64>,
    scales: Vec<f64>,
}

impl RobustScaler {
    /// Fit on row-major samples. Constant columns get a scale of 1.
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let n_features = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut centers = Vec::with_capacity(n_features);
        let mut scales = Vec::with_capacity(n_features);

        for col in 0..n_features {
            let mut values: Vec<f64> = rows.iter().map(|r| r[col]).collect();
            values.sort_by(|a, b| a.total_cmp(b));

            let median = percentile(&values, 50.0);
            let iqr = percentile(&values, 75.0) - percentile(&values, 25.0);

            centers.push(median);
            scales.push(if iqr > 0.0 && iqr.is_finite() { iqr } else { 1.0 });
        }

        Self { centers, scales }
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| {
                row.iter()
                    .zip(self.centers.iter().zip(&self.scales))
                    .map(|(x, (center, scale))| (x - center) / scale)
                    .collect()
            })
            .collect()
    }

    pub fn fit_transform(rows: &[Vec<f64>]) -> (Self, Vec<Vec<f64>>) {
        let scaler = Self::fit(rows);
        let scaled = scaler.transform(rows);
        (scaler, scaled)
    }

    pub fn centers(&self) -> &[f64] {
        &self.centers
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }
}

/// Linear-interpolated percentile of an ascending slice
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (pct / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}
