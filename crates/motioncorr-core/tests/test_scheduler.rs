mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_abs_diff_eq;
use ndarray::{Array2, ArrayView3};

use motioncorr_core::align::{Alignment, CrossCorrelator, NormalizedCrossCorrelation};
use motioncorr_core::error::{MotionError, Result};
use motioncorr_core::motion::accumulator::ReferenceAccumulator;
use motioncorr_core::motion::frame_aligner::FrameAligner;
use motioncorr_core::motion::scheduler::Scheduler;
use motioncorr_core::motion::shared::SharedReference;
use motioncorr_core::motion::{SearchWindow, Shift, ShiftRecord};

use common::{dataset, noise_plane, sequence_from_planes, CountingCorrelator};

fn identical_frames(frames: usize, planes: usize) -> Vec<Vec<Array2<f32>>> {
    let content: Vec<_> = (0..planes).map(|p| noise_plane(16, 16, p as u64)).collect();
    (0..frames).map(|_| content.clone()).collect()
}

#[test]
fn test_parallel_identical_frames_are_stable() {
    let data = dataset(vec![sequence_from_planes(&identical_frames(12, 2))]);
    let shape = data.frame_shape();
    let shared = SharedReference::new(
        ReferenceAccumulator::new(shape, None),
        ShiftRecord::new(&data.frames_per_cycle(), shape.planes),
    );
    let correlator = CountingCorrelator::default();
    let aligner = FrameAligner::new(&shared, &correlator, None);

    let scheduler = Scheduler::new(4).unwrap();
    scheduler.run(&data, &aligner).unwrap();

    // Exactly one seed per plane, every other plane went through correlation.
    assert_eq!(correlator.calls(), 12 * 2 - 2);

    let (accumulator, record) = shared.into_parts();
    assert_eq!(accumulator.extent(), (16, 16));
    for f in 0..12 {
        for p in 0..2 {
            assert_eq!(record.get(0, f, p), Some(Shift::ZERO));
            assert_abs_diff_eq!(record.correlation(0, f, p), 1.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_later_cycles_align_against_earlier_ones() {
    let first = sequence_from_planes(&identical_frames(1, 1));
    let second = sequence_from_planes(&identical_frames(6, 1));
    let data = dataset(vec![first, second]);
    let shape = data.frame_shape();
    let shared = SharedReference::new(
        ReferenceAccumulator::new(shape, None),
        ShiftRecord::new(&data.frames_per_cycle(), shape.planes),
    );
    let correlator = CountingCorrelator::default();
    let aligner = FrameAligner::new(&shared, &correlator, None);

    Scheduler::new(3).unwrap().run(&data, &aligner).unwrap();

    // Cycle 0 seeded the plane, so every frame of cycle 1 was correlated.
    assert_eq!(correlator.calls(), 6);
}

struct FailingCorrelator;

impl CrossCorrelator for FailingCorrelator {
    fn align(
        &self,
        _reference: ArrayView3<'_, f64>,
        candidate: ArrayView3<'_, f32>,
        _window: Option<SearchWindow>,
    ) -> Result<Alignment> {
        let (rows, cols, _) = candidate.dim();
        Err(MotionError::NoValidPlacement { rows, cols })
    }
}

#[test]
fn test_task_failure_aborts_run() {
    let data = dataset(vec![sequence_from_planes(&identical_frames(8, 1))]);
    let shape = data.frame_shape();
    let shared = SharedReference::new(
        ReferenceAccumulator::new(shape, None),
        ShiftRecord::new(&data.frames_per_cycle(), shape.planes),
    );
    let aligner = FrameAligner::new(&shared, &FailingCorrelator, None);

    let err = Scheduler::new(4).unwrap().run(&data, &aligner).unwrap_err();
    assert!(matches!(err, MotionError::NoValidPlacement { .. }));
}

#[test]
fn test_single_worker_processes_frames_in_order() {
    let base = noise_plane(16, 16, 5);
    let frames = vec![
        vec![common::shifted(&base, 1, 0)],
        vec![base.clone()],
        vec![common::shifted(&base, 0, 2)],
    ];
    let data = dataset(vec![sequence_from_planes(&frames)]);
    let shape = data.frame_shape();
    let shared = SharedReference::new(
        ReferenceAccumulator::new(shape, None),
        ShiftRecord::new(&data.frames_per_cycle(), shape.planes),
    );
    let correlator = CountingCorrelator::default();
    let aligner = FrameAligner::new(&shared, &correlator, None);

    let scheduler = Scheduler::new(1).unwrap();
    assert_eq!(scheduler.workers(), 1);
    scheduler.run(&data, &aligner).unwrap();

    let (_, record) = shared.into_parts();
    // Frame 0 defines the reference; frame 1 sits one row above it.
    assert_eq!(record.get(0, 0, 0), Some(Shift::ZERO));
    assert_eq!(record.get(0, 1, 0), Some(Shift::new(-1, 0)));
    assert_eq!(record.get(0, 2, 0), Some(Shift::new(-1, 2)));
}

#[test]
fn test_worker_count_is_at_least_one() {
    assert_eq!(Scheduler::new(0).unwrap().workers(), 1);
}

/// Records the largest Rayon pool size seen from inside the correlator.
#[derive(Default)]
struct PoolSizeCorrelator {
    inner: NormalizedCrossCorrelation,
    max_threads: AtomicUsize,
}

impl CrossCorrelator for PoolSizeCorrelator {
    fn align(
        &self,
        reference: ArrayView3<'_, f64>,
        candidate: ArrayView3<'_, f32>,
        window: Option<SearchWindow>,
    ) -> Result<Alignment> {
        self.max_threads
            .fetch_max(rayon::current_num_threads(), Ordering::SeqCst);
        self.inner.align(reference, candidate, window)
    }
}

fn pool_size_seen(workers: usize) -> usize {
    let data = dataset(vec![sequence_from_planes(&identical_frames(4, 1))]);
    let shape = data.frame_shape();
    let shared = SharedReference::new(
        ReferenceAccumulator::new(shape, None),
        ShiftRecord::new(&data.frames_per_cycle(), shape.planes),
    );
    let correlator = PoolSizeCorrelator::default();
    let aligner = FrameAligner::new(&shared, &correlator, None);
    Scheduler::new(workers).unwrap().run(&data, &aligner).unwrap();
    correlator.max_threads.load(Ordering::SeqCst)
}

#[test]
fn test_correlation_runs_on_the_worker_pool() {
    assert_eq!(pool_size_seen(1), 1);
    assert_eq!(pool_size_seen(3), 3);
}
