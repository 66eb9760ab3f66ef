use std::sync::Arc;

use ndarray::Array3;
use tracing::info;

use crate::align::correlation::{CrossCorrelator, NormalizedCrossCorrelation};
use crate::error::Result;
use crate::frame::Dataset;

use super::config::MotionConfig;
use super::partition::{MotionEstimate, PartitionConsensus};

/// A method for estimating per-frame motion in a dataset.
pub trait MotionEstimationStrategy {
    /// Per cycle, a (frames, planes, 2) array of integer (row, col) shifts.
    fn estimate(&self, dataset: &Dataset) -> Result<Vec<Array3<i64>>>;
}

/// Rigid per-plane translation estimated against an incrementally built
/// reference, refined across spatial partitions.
pub struct PlaneTranslation2D {
    config: MotionConfig,
    correlator: Arc<dyn CrossCorrelator>,
}

impl PlaneTranslation2D {
    /// Create an estimator using normalized cross-correlation.
    pub fn new(config: MotionConfig) -> Result<Self> {
        Self::with_correlator(config, Arc::new(NormalizedCrossCorrelation::default()))
    }

    /// Create an estimator backed by a custom correlation primitive.
    pub fn with_correlator(
        config: MotionConfig,
        correlator: Arc<dyn CrossCorrelator>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, correlator })
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Estimate shifts together with their correlations and consensus status.
    pub fn estimate_detailed(&self, dataset: &Dataset) -> Result<MotionEstimate> {
        let workers = self.config.worker_count();
        let grid = self.config.partition_grid();
        info!(
            cycles = dataset.num_cycles(),
            workers,
            grid = ?grid,
            method = %self.config.method,
            "Estimating plane translations"
        );

        let consensus = PartitionConsensus::new(
            grid,
            self.config.displacement_bound(),
            self.correlator.as_ref(),
            workers,
        )?;
        let estimate = consensus.estimate(dataset)?;
        info!(
            partitions = estimate.partitions_evaluated,
            converged = estimate.converged,
            "Motion estimation complete"
        );
        Ok(estimate)
    }
}

impl MotionEstimationStrategy for PlaneTranslation2D {
    fn estimate(&self, dataset: &Dataset) -> Result<Vec<Array3<i64>>> {
        self.estimate_detailed(dataset).map(|e| e.shifts)
    }
}
