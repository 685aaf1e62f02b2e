//! Broker Behavioral Clustering
//!
//! Groups brokers by trading behavior:
//! - Robust-scaled frequency, overnight ratio and log daily volume
//! - Projected onto the leading principal components
//! - Partitioned with seeded K-means
//!
//! The accumulator ("smart money") cluster is the one with the highest mean
//! overnight ratio among clusters with enough members.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::config::ClusteringConfig;
use crate::error::{Error, Result};
use crate::smart_money::features::BrokerFeatures;
use crate::smart_money::kmeans::KMeans;
use crate::smart_money::projection::PrincipalComponents;
use crate::smart_money::scaling::RobustScaler;
use crate::types::BrokerId;

/// Cluster identifier; `UNCLUSTERED` is reserved for models that emit noise points
pub type ClusterId = i32;
pub const UNCLUSTERED: ClusterId = -1;

/// Mean features and size of one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: ClusterId,
    pub member_count: usize,
    pub mean_frequency: f64,
    pub mean_overnight_ratio: f64,
    pub mean_log_avg_daily_volume: f64,
}

/// A clustered broker with its projected coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteredBroker {
    pub features: BrokerFeatures,
    pub cluster_id: ClusterId,
    pub components: Vec<f64>,
}

/// Flat row persisted to the cluster report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterReportRow {
    pub broker_id: BrokerId,
    pub cluster: ClusterId,
    pub is_accumulator: bool,
    pub total_buy: f64,
    pub total_sell: f64,
    pub total_volume: f64,
    pub active_days: u32,
    pub frequency: f64,
    pub net_volume: f64,
    pub overnight_ratio: f64,
    pub avg_daily_volume: f64,
    pub log_avg_daily_volume: f64,
    pub pc1: f64,
    pub pc2: Option<f64>,
}

/// Outcome of clustering one stock's brokers
#[derive(Debug, Clone)]
pub struct ClusteringResult {
    /// broker_id -> cluster_id for every clustered broker
    pub assignment: BTreeMap<BrokerId, ClusterId>,
    pub brokers: Vec<ClusteredBroker>,
    pub summaries: Vec<ClusterSummary>,
    pub accumulator: ClusterId,
    pub inertia: f64,
    pub explained_variance_ratio: Vec<f64>,
}

impl ClusteringResult {
    /// Members of the accumulator cluster
    pub fn smart_brokers(&self) -> BTreeSet<BrokerId> {
        self.members(self.accumulator)
    }

    pub fn members(&self, cluster_id: ClusterId) -> BTreeSet<BrokerId> {
        self.assignment
            .iter()
            .filter(|(_, c)| **c == cluster_id)
            .map(|(b, _)| b.clone())
            .collect()
    }

    pub fn summary(&self, cluster_id: ClusterId) -> Option<&ClusterSummary> {
        self.summaries.iter().find(|s| s.cluster_id == cluster_id)
    }

    pub fn report_rows(&self) -> Vec<ClusterReportRow> {
        self.brokers
            .iter()
            .map(|b| ClusterReportRow {
                broker_id: b.features.broker_id.clone(),
                cluster: b.cluster_id,
                is_accumulator: b.cluster_id == self.accumulator,
                total_buy: b.features.total_buy,
                total_sell: b.features.total_sell,
                total_volume: b.features.total_volume,
                active_days: b.features.active_days,
                frequency: b.features.frequency,
                net_volume: b.features.net_volume,
                overnight_ratio: b.features.overnight_ratio,
                avg_daily_volume: b.features.avg_daily_volume,
                log_avg_daily_volume: b.features.log_avg_daily_volume,
                pc1: b.components.first().copied().unwrap_or(0.0),
                pc2: b.components.get(1).copied(),
            })
            .collect()
    }
}

/// Behavioral clustering engine
pub struct BehaviorClusterer {
    config: ClusteringConfig,
}

impl BehaviorClusterer {
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Cluster the brokers active on at least `min_active_days` days.
    ///
    /// Fails with `DegenerateCluster` when fewer eligible brokers remain
    /// than clusters requested; callers must then skip the smart signal.
    pub fn cluster(&self, stock_id: &str, features: &[BrokerFeatures]) -> Result<ClusteringResult> {
        let eligible: Vec<&BrokerFeatures> = features
            .iter()
            .filter(|f| f.active_days >= self.config.min_active_days)
            .collect();

        let k = self.config.n_clusters;
        if eligible.len() < k {
            warn!(
                stock = %stock_id,
                eligible = eligible.len(),
                clusters = k,
                "Insufficient active brokers, skipping clustering"
            );
            return Err(Error::DegenerateCluster {
                stock_id: stock_id.to_string(),
                reason: format!("{} active brokers < {} clusters", eligible.len(), k),
            });
        }

        let raw: Vec<Vec<f64>> = eligible
            .iter()
            .map(|f| f.clustering_vector().to_vec())
            .collect();
        let (_, scaled) = RobustScaler::fit_transform(&raw);
        let (pca, projected) = PrincipalComponents::fit_transform(&scaled, self.config.n_components)?;

        let model = KMeans {
            k,
            n_init: self.config.n_init,
            max_iterations: self.config.max_iterations,
            tolerance: self.config.tolerance,
            seed: self.config.seed,
        };
        let fit = model.fit(&projected)?;
        debug!(
            stock = %stock_id,
            inertia = fit.inertia,
            iterations = fit.iterations,
            "K-means converged"
        );

        let brokers: Vec<ClusteredBroker> = eligible
            .iter()
            .zip(projected)
            .zip(&fit.labels)
            .map(|((f, components), &label)| ClusteredBroker {
                features: (*f).clone(),
                cluster_id: label as ClusterId,
                components,
            })
            .collect();

        let summaries = summarize(&brokers, k);
        let accumulator = select_accumulator(&summaries, self.config.min_cluster_members)
            .ok_or_else(|| Error::DegenerateCluster {
                stock_id: stock_id.to_string(),
                reason: "no populated cluster".to_string(),
            })?;

        if let Some(s) = summaries.iter().find(|s| s.cluster_id == accumulator) {
            if s.member_count < self.config.min_cluster_members {
                warn!(
                    stock = %stock_id,
                    cluster = accumulator,
                    members = s.member_count,
                    "No cluster meets the member floor, using global overnight-ratio maximum"
                );
            }
            info!(
                stock = %stock_id,
                cluster = accumulator,
                members = s.member_count,
                overnight_ratio = s.mean_overnight_ratio,
                frequency = s.mean_frequency,
                "Accumulator cluster selected"
            );
        }

        let assignment = brokers
            .iter()
            .map(|b| (b.features.broker_id.clone(), b.cluster_id))
            .collect();

        Ok(ClusteringResult {
            assignment,
            brokers,
            summaries,
            accumulator,
            inertia: fit.inertia,
            explained_variance_ratio: pca.explained_variance_ratio().to_vec(),
        })
    }
}

/// Per-cluster feature means and member counts, ordered by cluster id
pub fn summarize(brokers: &[ClusteredBroker], k: usize) -> Vec<ClusterSummary> {
    (0..k as ClusterId)
        .map(|cluster_id| {
            let members: Vec<&BrokerFeatures> = brokers
                .iter()
                .filter(|b| b.cluster_id == cluster_id)
                .map(|b| &b.features)
                .collect();
            let n = members.len();
            let mean = |f: fn(&BrokerFeatures) -> f64| {
                if n == 0 {
                    0.0
                } else {
                    members.iter().map(|m| f(m)).sum::<f64>() / n as f64
                }
            };
            ClusterSummary {
                cluster_id,
                member_count: n,
                mean_frequency: mean(|m| m.frequency),
                mean_overnight_ratio: mean(|m| m.overnight_ratio),
                mean_log_avg_daily_volume: mean(|m| m.log_avg_daily_volume),
            }
        })
        .collect()
}

/// Highest mean overnight ratio among clusters with at least `min_members`;
/// without any such cluster, the highest among all populated clusters.
/// Ties go to the lowest cluster id.
pub fn select_accumulator(summaries: &[ClusterSummary], min_members: usize) -> Option<ClusterId> {
    let best_of = |candidates: Vec<&ClusterSummary>| {
        candidates
            .into_iter()
            .fold(None, |best: Option<&ClusterSummary>, s| match best {
                Some(b)
                    if b.mean_overnight_ratio > s.mean_overnight_ratio
                        || (b.mean_overnight_ratio == s.mean_overnight_ratio
                            && b.cluster_id < s.cluster_id) =>
                {
                    Some(b)
                }
                _ => Some(s),
            })
            .map(|s| s.cluster_id)
    };

    let qualified: Vec<&ClusterSummary> = summaries
        .iter()
        .filter(|s| s.member_count >= min_members)
        .collect();
    if !qualified.is_empty() {
        return best_of(qualified);
    }

    best_of(summaries.iter().filter(|s| s.member_count > 0).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker(id: &str, active_days: u32, frequency: f64, overnight: f64, log_vol: f64) -> BrokerFeatures {
        BrokerFeatures {
            broker_id: id.to_string(),
            total_buy: 0.0,
            total_sell: 0.0,
            total_volume: 0.0,
            active_days,
            frequency,
            net_volume: 0.0,
            overnight_ratio: overnight,
            avg_daily_volume: log_vol.exp_m1(),
            log_avg_daily_volume: log_vol,
        }
    }

    fn summary(cluster_id: ClusterId, member_count: usize, overnight: f64) -> ClusterSummary {
        ClusterSummary {
            cluster_id,
            member_count,
            mean_frequency: 0.5,
            mean_overnight_ratio: overnight,
            mean_log_avg_daily_volume: 5.0,
        }
    }

    fn universe() -> Vec<BrokerFeatures> {
        let mut brokers = Vec::new();
        // Directional accumulators
        for i in 0..4 {
            brokers.push(broker(&format!("ACC{}", i), 20, 0.9, 0.95 - i as f64 * 0.01, 8.0));
        }
        // Day traders: frequent, flat, heavy volume
        for i in 0..4 {
            brokers.push(broker(&format!("DAY{}", i), 25, 1.0, 0.02 + i as f64 * 0.01, 11.0));
        }
        // Occasional retail
        for i in 0..4 {
            brokers.push(broker(&format!("RET{}", i), 3, 0.1, 0.5 + i as f64 * 0.02, 3.0));
        }
        // Mid-size mixed
        for i in 0..4 {
            brokers.push(broker(&format!("MID{}", i), 10, 0.45, 0.3, 6.0 + i as f64 * 0.1));
        }
        // One-day brokers never clustered
        brokers.push(broker("ONCE", 1, 0.04, 1.0, 4.0));
        brokers
    }

    #[test]
    fn test_accumulator_cluster_found() {
        let clusterer = BehaviorClusterer::new(ClusteringConfig::default());
        let result = clusterer.cluster("2330", &universe()).unwrap();

        assert!(!result.assignment.contains_key("ONCE"));
        assert_eq!(result.assignment.len(), 16);

        let smart = result.smart_brokers();
        for i in 0..4 {
            assert!(smart.contains(&format!("ACC{}", i)));
        }
        assert!(!smart.iter().any(|b| b.starts_with("DAY")));

        let acc = result.summary(result.accumulator).unwrap();
        assert_eq!(acc.member_count, smart.len());
        assert!(result.summary(UNCLUSTERED).is_none());
    }

    #[test]
    fn test_clustering_is_deterministic() {
        let clusterer = BehaviorClusterer::new(ClusteringConfig::default());
        let a = clusterer.cluster("2330", &universe()).unwrap();
        let b = clusterer.cluster("2330", &universe()).unwrap();
        assert_eq!(a.assignment, b.assignment);
        assert_eq!(a.accumulator, b.accumulator);
    }

    #[test]
    fn test_too_few_active_brokers() {
        let clusterer = BehaviorClusterer::new(ClusteringConfig::default());
        let features = vec![
            broker("A", 5, 0.5, 0.5, 5.0),
            broker("B", 5, 0.5, 0.4, 5.0),
            broker("C", 5, 0.5, 0.3, 5.0),
            broker("D", 1, 0.1, 0.9, 5.0),
        ];
        let err = clusterer.cluster("2330", &features).unwrap_err();
        assert!(matches!(err, Error::DegenerateCluster { .. }));
    }

    #[test]
    fn test_select_accumulator_respects_member_floor() {
        let summaries = vec![
            summary(0, 2, 0.99),
            summary(1, 5, 0.60),
            summary(2, 3, 0.70),
            summary(3, 10, 0.10),
        ];
        assert_eq!(select_accumulator(&summaries, 3), Some(2));
    }

    #[test]
    fn test_select_accumulator_fallback_and_ties() {
        let small = vec![summary(0, 1, 0.4), summary(1, 2, 0.8), summary(2, 0, 0.0)];
        assert_eq!(select_accumulator(&small, 3), Some(1));

        let tied = vec![summary(0, 4, 0.5), summary(1, 4, 0.7), summary(2, 4, 0.7)];
        assert_eq!(select_accumulator(&tied, 3), Some(1));

        assert_eq!(select_accumulator(&[], 3), None);
    }
}
