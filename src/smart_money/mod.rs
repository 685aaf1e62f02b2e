//! Smart Money Segmentation Module
//!
//! This module classifies brokers by trading behavior:
//! - Per-broker features over an adaptive lookback window
//! - Robust scaling and principal component projection
//! - Seeded K-means partitioning
//! - Accumulator (smart money) cluster selection

pub mod clustering;
pub mod features;
pub mod kmeans;
pub mod projection;
pub mod scaling;

pub use clustering::{
    select_accumulator, BehaviorClusterer, ClusterId, ClusterReportRow, ClusterSummary,
    ClusteredBroker, ClusteringResult, UNCLUSTERED,
};
pub use features::{BrokerFeatures, FeatureExtractor, FeatureWindow};
pub use kmeans::{KMeans, KMeansFit};
pub use projection::PrincipalComponents;
pub use scaling::RobustScaler;
