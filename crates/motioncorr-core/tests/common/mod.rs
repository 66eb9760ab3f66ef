#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array2, Array4, Array5, ArrayView3, Axis};

use motioncorr_core::align::{Alignment, CrossCorrelator, NormalizedCrossCorrelation};
use motioncorr_core::error::Result;
use motioncorr_core::frame::{Dataset, Sequence};
use motioncorr_core::motion::{MotionConfig, SearchWindow};

/// Deterministic white-noise plane in [0, 1).
pub fn noise_plane(rows: usize, cols: usize, seed: u64) -> Array2<f32> {
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let mut h = (seed << 48 | (r as u64) << 24 | c as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        h ^= h >> 29;
        h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h ^= h >> 32;
        (h % 1000) as f32 / 1000.0
    })
}

/// Plane displaced by (dy, dx): output pixel (r, c) shows input pixel
/// (r + dy, c + dx). Pixels with no source are NaN.
pub fn shifted(plane: &Array2<f32>, dy: i64, dx: i64) -> Array2<f32> {
    let (rows, cols) = plane.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let sr = r as i64 + dy;
        let sc = c as i64 + dx;
        if sr < 0 || sc < 0 || sr >= rows as i64 || sc >= cols as i64 {
            f32::NAN
        } else {
            plane[[sr as usize, sc as usize]]
        }
    })
}

/// Build a single-channel sequence from `frames[frame][plane]`.
pub fn sequence_from_planes(frames: &[Vec<Array2<f32>>]) -> Sequence {
    let planes = frames[0].len();
    let (rows, cols) = frames[0][0].dim();
    let data = Array4::from_shape_fn((frames.len(), planes, rows, cols), |(f, p, r, c)| {
        frames[f][p][[r, c]]
    });
    Sequence::from_planes(data)
}

/// Single-plane sequence from a list of planes.
pub fn single_plane_sequence(planes: &[Array2<f32>]) -> Sequence {
    let frames: Vec<Vec<Array2<f32>>> = planes.iter().map(|p| vec![p.clone()]).collect();
    sequence_from_planes(&frames)
}

pub fn uniform_sequence(frames: usize, planes: usize, rows: usize, cols: usize) -> Sequence {
    Sequence::new(Array5::from_elem((frames, planes, rows, cols, 1), 0.5))
}

pub fn dataset(sequences: Vec<Sequence>) -> Dataset {
    Dataset::new(sequences).expect("consistent dataset")
}

pub fn config_with_workers(workers: usize) -> MotionConfig {
    MotionConfig {
        n_processes: Some(workers),
        ..Default::default()
    }
}

/// Wraps normalized cross-correlation and counts how often it is called.
#[derive(Default)]
pub struct CountingCorrelator {
    inner: NormalizedCrossCorrelation,
    calls: AtomicUsize,
}

impl CountingCorrelator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CrossCorrelator for CountingCorrelator {
    fn align(
        &self,
        reference: ArrayView3<'_, f64>,
        candidate: ArrayView3<'_, f32>,
        window: Option<SearchWindow>,
    ) -> Result<Alignment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.align(reference, candidate, window)
    }
}

/// Returns scripted placements: call `i` gets `script[i / calls_per_step]`
/// (the last entry repeats).
pub struct ScriptedCorrelator {
    pub script: Vec<Alignment>,
    pub calls_per_step: usize,
    calls: AtomicUsize,
}

impl ScriptedCorrelator {
    pub fn new(script: Vec<Alignment>, calls_per_step: usize) -> Self {
        Self {
            script,
            calls_per_step,
            calls: AtomicUsize::new(0),
        }
    }
}

impl CrossCorrelator for ScriptedCorrelator {
    fn align(
        &self,
        _reference: ArrayView3<'_, f64>,
        _candidate: ArrayView3<'_, f32>,
        _window: Option<SearchWindow>,
    ) -> Result<Alignment> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let step = (call / self.calls_per_step.max(1)).min(self.script.len() - 1);
        Ok(self.script[step])
    }
}

/// Mean recorded shift per plane for one cycle's (frames, planes, 2) array.
pub fn plane_means(shifts: &ndarray::Array3<i64>) -> Vec<(f64, f64)> {
    shifts
        .axis_iter(Axis(1))
        .map(|plane| {
            let n = plane.nrows() as f64;
            let dy = plane.column(0).iter().sum::<i64>() as f64 / n;
            let dx = plane.column(1).iter().sum::<i64>() as f64 / n;
            (dy, dx)
        })
        .collect()
}
