use ndarray::{Array2, Array3};
use tracing::{debug, info};

use crate::align::correlation::CrossCorrelator;
use crate::consts::CONSENSUS_DISTANCE_PX;
use crate::error::{MotionError, Result};
use crate::frame::{partition_tiles, Dataset};

use super::accumulator::ReferenceAccumulator;
use super::frame_aligner::FrameAligner;
use super::planes::align_planes;
use super::scheduler::Scheduler;
use super::shared::SharedReference;
use super::shift::{Shift, ShiftRecord};

/// Final displacement estimate for a dataset.
#[derive(Clone, Debug)]
pub struct MotionEstimate {
    /// Per cycle, (frames, planes, 2) integer displacements in (row, col).
    pub shifts: Vec<Array3<i64>>,
    /// Per cycle, (frames, planes) correlation of the returned shifts.
    pub correlations: Vec<Array2<f64>>,
    /// Number of tiles aligned before stopping.
    pub partitions_evaluated: usize,
    /// True if two tiles agreed within the consensus distance.
    pub converged: bool,
}

/// Best and runner-up shifts across tiles for every (cycle, frame, plane).
#[derive(Clone, Debug)]
pub struct Consensus {
    pub first: Vec<Array3<i64>>,
    pub second: Vec<Array3<i64>>,
    pub correlations: Vec<Array2<f64>>,
    /// Mean squared Euclidean distance between first and second shifts.
    pub mean_squared_distance: f64,
}

impl Consensus {
    pub fn agrees(&self) -> bool {
        self.mean_squared_distance < CONSENSUS_DISTANCE_PX * CONSENSUS_DISTANCE_PX
    }
}

/// Picks, per entry, the two highest-scoring tiles. Earlier tiles win ties.
/// Returns `None` with fewer than two records.
pub fn compare_partitions(records: &[ShiftRecord]) -> Option<Consensus> {
    if records.len() < 2 {
        return None;
    }
    let reference = &records[0];

    let mut first = Vec::with_capacity(reference.num_cycles());
    let mut second = Vec::with_capacity(reference.num_cycles());
    let mut correlations = Vec::with_capacity(reference.num_cycles());
    let mut total_sq = 0i64;
    let mut entries = 0usize;

    for (cycle, table) in reference.shifts().iter().enumerate() {
        let (frames, planes) = table.dim();
        let mut best = Array3::<i64>::zeros((frames, planes, 2));
        let mut runner_up = Array3::<i64>::zeros((frames, planes, 2));
        let mut best_corr = Array2::<f64>::zeros((frames, planes));

        for f in 0..frames {
            for p in 0..planes {
                let mut top: Option<(usize, f64)> = None;
                let mut next: Option<(usize, f64)> = None;
                for (t, record) in records.iter().enumerate() {
                    let score = record.correlation(cycle, f, p);
                    if top.map_or(true, |(_, s)| score.total_cmp(&s).is_gt()) {
                        next = top;
                        top = Some((t, score));
                    } else if next.map_or(true, |(_, s)| score.total_cmp(&s).is_gt()) {
                        next = Some((t, score));
                    }
                }
                // Two or more records guarantee both are set.
                let (Some((t1, c1)), Some((t2, _))) = (top, next) else {
                    continue;
                };
                let s1 = records[t1].get(cycle, f, p).unwrap_or_default();
                let s2 = records[t2].get(cycle, f, p).unwrap_or_default();

                best[[f, p, 0]] = s1.dy;
                best[[f, p, 1]] = s1.dx;
                runner_up[[f, p, 0]] = s2.dy;
                runner_up[[f, p, 1]] = s2.dx;
                best_corr[[f, p]] = c1;
                total_sq += s1.squared_distance(s2);
                entries += 1;
            }
        }

        first.push(best);
        second.push(runner_up);
        correlations.push(best_corr);
    }

    let mean_squared_distance = if entries == 0 {
        0.0
    } else {
        total_sq as f64 / entries as f64
    };
    Some(Consensus {
        first,
        second,
        correlations,
        mean_squared_distance,
    })
}

/// Aligns a dataset tile by tile, stopping once the two most confident tiles
/// agree.
pub struct PartitionConsensus<'a> {
    grid: [usize; 2],
    max_displacement: Option<Shift>,
    correlator: &'a dyn CrossCorrelator,
    scheduler: Scheduler,
}

impl<'a> PartitionConsensus<'a> {
    pub fn new(
        grid: [usize; 2],
        max_displacement: Option<Shift>,
        correlator: &'a dyn CrossCorrelator,
        workers: usize,
    ) -> Result<Self> {
        Ok(Self {
            grid,
            max_displacement,
            correlator,
            scheduler: Scheduler::new(workers)?,
        })
    }

    pub fn estimate(&self, dataset: &Dataset) -> Result<MotionEstimate> {
        let tiles = partition_tiles(&dataset.frame_shape(), self.grid)?;
        let mut records: Vec<ShiftRecord> = Vec::with_capacity(tiles.len());
        let mut consensus: Option<Consensus> = None;

        for (index, tile) in tiles.iter().enumerate() {
            info!(
                tile = index,
                of = tiles.len(),
                row = tile.row,
                col = tile.col,
                rows = tile.rows,
                cols = tile.cols,
                "Aligning partition"
            );
            let cropped = dataset.crop(tile)?;
            records.push(self.align_tile(&cropped)?);

            if let Some(result) = compare_partitions(&records) {
                let agrees = result.agrees();
                info!(
                    tiles = records.len(),
                    mean_squared_distance = result.mean_squared_distance,
                    agrees,
                    "Partition consensus"
                );
                consensus = Some(result);
                if agrees {
                    break;
                }
            }
        }

        let partitions_evaluated = records.len();
        match consensus {
            Some(result) => Ok(MotionEstimate {
                converged: result.agrees(),
                shifts: result.first,
                correlations: result.correlations,
                partitions_evaluated,
            }),
            None => {
                let record = records.pop().ok_or(MotionError::EmptyDataset)?;
                let (shifts, correlations) = record.into_arrays();
                Ok(MotionEstimate {
                    shifts,
                    correlations,
                    partitions_evaluated,
                    converged: false,
                })
            }
        }
    }

    /// Run the full alignment pipeline on one cropped tile.
    pub fn align_tile(&self, dataset: &Dataset) -> Result<ShiftRecord> {
        let shape = dataset.frame_shape();
        let shared = SharedReference::new(
            ReferenceAccumulator::new(shape, self.max_displacement),
            ShiftRecord::new(&dataset.frames_per_cycle(), shape.planes),
        );
        let aligner = FrameAligner::new(&shared, self.correlator, self.max_displacement);
        self.scheduler.run(dataset, &aligner)?;

        let (accumulator, mut record) = shared.into_parts();
        let corrections = align_planes(&mut record);
        let (rows, cols) = accumulator.extent();
        debug!(
            rows,
            cols,
            offset = %accumulator.offset(),
            corrections = ?corrections,
            "Tile aligned"
        );
        Ok(record)
    }
}
