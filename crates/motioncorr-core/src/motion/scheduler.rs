use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::{MotionError, Result};
use crate::frame::Dataset;

use super::frame_aligner::FrameAligner;

/// Runs frame alignment over a dataset, one task per frame.
///
/// Cycles are processed in order. Frames within a cycle run concurrently on
/// a dedicated pool, and every task of a cycle finishes before the next
/// cycle is dispatched. The first failing task aborts the run.
pub struct Scheduler {
    pool: ThreadPool,
    workers: usize,
}

impl Scheduler {
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("motioncorr-worker-{i}"))
            .build()
            .map_err(|e| MotionError::ThreadPool(e.to_string()))?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn run(&self, dataset: &Dataset, aligner: &FrameAligner<'_>) -> Result<()> {
        for (cycle, sequence) in dataset.sequences().iter().enumerate() {
            let frames = sequence.num_frames();
            debug!(cycle, frames, workers = self.workers, "Dispatching cycle");

            // Serial runs still go through the pool so nested parallel work
            // in the correlator is capped at `workers` threads.
            self.pool.install(|| {
                if self.workers > 1 {
                    (0..frames)
                        .into_par_iter()
                        .try_for_each(|i| aligner.align_frame(cycle, i, sequence.frame(i)))
                } else {
                    sequence
                        .frames()
                        .enumerate()
                        .try_for_each(|(i, frame)| aligner.align_frame(cycle, i, frame))
                }
            })?;
        }
        Ok(())
    }
}
