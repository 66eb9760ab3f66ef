use std::cmp::Ordering;

use ndarray::ArrayView3;
use rayon::prelude::*;

use crate::consts::{is_known, EPSILON, MIN_OVERLAP_FRACTION, PARALLEL_PLACEMENT_THRESHOLD};
use crate::error::{MotionError, Result};
use crate::motion::shift::{SearchWindow, Shift};

/// Best placement of a candidate over a reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Alignment {
    /// Reference pixel under the candidate's top-left corner.
    pub shift: Shift,
    pub score: f64,
}

/// Finds the integer placement of `candidate` that best matches `reference`.
///
/// Both images are (rows, cols, channels). `reference` may contain NaN for
/// pixels it knows nothing about. When `window` is given, only placements
/// inside it (inclusive, reference coordinates) may be returned.
pub trait CrossCorrelator: Send + Sync {
    fn align(
        &self,
        reference: ArrayView3<'_, f64>,
        candidate: ArrayView3<'_, f32>,
        window: Option<SearchWindow>,
    ) -> Result<Alignment>;
}

/// Exhaustive normalized cross-correlation over known sample pairs.
#[derive(Clone, Debug)]
pub struct NormalizedCrossCorrelation {
    /// Fraction of the candidate's known samples that must pair with known
    /// reference samples before a placement is scored.
    pub min_overlap_fraction: f64,
}

impl Default for NormalizedCrossCorrelation {
    fn default() -> Self {
        Self {
            min_overlap_fraction: MIN_OVERLAP_FRACTION,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Scored {
    shift: Shift,
    score: f64,
    pairs: usize,
}

/// Higher score wins, then more overlap, then the smaller placement, then
/// row-major order.
fn rank(a: &Scored, b: &Scored) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then(a.pairs.cmp(&b.pairs))
        .then(b.shift.squared_norm().cmp(&a.shift.squared_norm()))
        .then((b.shift.dy, b.shift.dx).cmp(&(a.shift.dy, a.shift.dx)))
}

fn better(a: Scored, b: Scored) -> Scored {
    if rank(&a, &b) == Ordering::Less {
        b
    } else {
        a
    }
}

#[derive(Default)]
struct PairSums {
    n: usize,
    a: f64,
    b: f64,
    aa: f64,
    bb: f64,
    ab: f64,
}

impl PairSums {
    fn push(&mut self, a: f64, b: f64) {
        self.n += 1;
        self.a += a;
        self.b += b;
        self.aa += a * a;
        self.bb += b * b;
        self.ab += a * b;
    }

    /// Pearson correlation; flat overlaps score 0.
    fn correlation(&self) -> f64 {
        let n = self.n as f64;
        let var_a = self.aa - self.a * self.a / n;
        let var_b = self.bb - self.b * self.b / n;
        if var_a <= EPSILON * self.aa || var_b <= EPSILON * self.bb {
            return 0.0;
        }
        let cov = self.ab - self.a * self.b / n;
        (cov / (var_a * var_b).sqrt()).clamp(-1.0, 1.0)
    }
}

impl NormalizedCrossCorrelation {
    fn score_placement(
        &self,
        reference: &ArrayView3<'_, f64>,
        candidate: &ArrayView3<'_, f32>,
        shift: Shift,
        min_pairs: f64,
    ) -> Option<Scored> {
        let (ref_rows, ref_cols, channels) = reference.dim();
        let (cand_rows, cand_cols, _) = candidate.dim();

        let y0 = shift.dy.max(0);
        let y1 = (shift.dy + cand_rows as i64).min(ref_rows as i64);
        let x0 = shift.dx.max(0);
        let x1 = (shift.dx + cand_cols as i64).min(ref_cols as i64);
        if y0 >= y1 || x0 >= x1 {
            return None;
        }

        let mut sums = PairSums::default();
        for y in y0..y1 {
            let cy = (y - shift.dy) as usize;
            for x in x0..x1 {
                let cx = (x - shift.dx) as usize;
                for c in 0..channels {
                    let a = reference[[y as usize, x as usize, c]];
                    let b = candidate[[cy, cx, c]] as f64;
                    if is_known(a) && b.is_finite() {
                        sums.push(a, b);
                    }
                }
            }
        }

        if sums.n < 2 || (sums.n as f64) < min_pairs {
            return None;
        }
        Some(Scored {
            shift,
            score: sums.correlation(),
            pairs: sums.n,
        })
    }
}

impl CrossCorrelator for NormalizedCrossCorrelation {
    fn align(
        &self,
        reference: ArrayView3<'_, f64>,
        candidate: ArrayView3<'_, f32>,
        window: Option<SearchWindow>,
    ) -> Result<Alignment> {
        let (ref_rows, ref_cols, ref_channels) = reference.dim();
        let (cand_rows, cand_cols, cand_channels) = candidate.dim();
        if ref_channels != cand_channels {
            return Err(MotionError::ShapeMismatch {
                expected: vec![ref_rows, ref_cols, ref_channels],
                actual: vec![cand_rows, cand_cols, cand_channels],
            });
        }
        let no_placement = MotionError::NoValidPlacement {
            rows: cand_rows,
            cols: cand_cols,
        };

        let known = candidate.iter().filter(|v| v.is_finite()).count();
        if known == 0 || ref_rows == 0 || ref_cols == 0 {
            return Err(no_placement);
        }
        let min_pairs = self.min_overlap_fraction * known as f64;

        // Every placement with any geometric overlap, clipped to the window.
        let mut lo = Shift::new(1 - cand_rows as i64, 1 - cand_cols as i64);
        let mut hi = Shift::new(ref_rows as i64 - 1, ref_cols as i64 - 1);
        if let Some(w) = window {
            lo = lo.max(w.min);
            hi = hi.min(w.max);
        }
        if lo.dy > hi.dy || lo.dx > hi.dx {
            return Err(no_placement);
        }

        let scan_row = |dy: i64| -> Option<Scored> {
            (lo.dx..=hi.dx)
                .filter_map(|dx| {
                    self.score_placement(&reference, &candidate, Shift::new(dy, dx), min_pairs)
                })
                .reduce(better)
        };

        let row_count = (hi.dy - lo.dy + 1) as usize;
        let best = if row_count >= PARALLEL_PLACEMENT_THRESHOLD {
            (lo.dy..=hi.dy)
                .into_par_iter()
                .filter_map(scan_row)
                .reduce_with(better)
        } else {
            (lo.dy..=hi.dy).filter_map(scan_row).reduce(better)
        };

        best.map(|s| Alignment {
            shift: s.shift,
            score: s.score,
        })
        .ok_or(no_placement)
    }
}
