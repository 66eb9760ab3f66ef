use std::fmt;
use std::ops::{Add, Sub};

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{MotionError, Result};

/// Integer displacement in (row, column) order.
///
/// Also used for accumulator offsets and placements, which live in the same
/// integer coordinate space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shift {
    pub dy: i64,
    pub dx: i64,
}

impl Shift {
    pub const ZERO: Shift = Shift { dy: 0, dx: 0 };

    pub const fn new(dy: i64, dx: i64) -> Self {
        Self { dy, dx }
    }

    pub fn abs(self) -> Self {
        Self::new(self.dy.abs(), self.dx.abs())
    }

    pub fn min(self, other: Shift) -> Self {
        Self::new(self.dy.min(other.dy), self.dx.min(other.dx))
    }

    pub fn max(self, other: Shift) -> Self {
        Self::new(self.dy.max(other.dy), self.dx.max(other.dx))
    }

    /// True if both components are <= the matching components of `bound`.
    pub fn within(self, bound: Shift) -> bool {
        self.dy <= bound.dy && self.dx <= bound.dx
    }

    pub fn squared_distance(self, other: Shift) -> i64 {
        let d = self - other;
        d.dy * d.dy + d.dx * d.dx
    }

    pub fn squared_norm(self) -> i64 {
        self.squared_distance(Shift::ZERO)
    }
}

impl Add for Shift {
    type Output = Shift;

    fn add(self, rhs: Shift) -> Shift {
        Shift::new(self.dy + rhs.dy, self.dx + rhs.dx)
    }
}

impl Sub for Shift {
    type Output = Shift;

    fn sub(self, rhs: Shift) -> Shift {
        Shift::new(self.dy - rhs.dy, self.dx - rhs.dx)
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.dy, self.dx)
    }
}

/// Inclusive rectangle of admissible placements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchWindow {
    pub min: Shift,
    pub max: Shift,
}

impl SearchWindow {
    pub fn new(min: Shift, max: Shift) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, shift: Shift) -> bool {
        self.min.within(shift) && shift.within(self.max)
    }

    pub fn translated(&self, by: Shift) -> Self {
        Self::new(self.min + by, self.max + by)
    }

    /// Window of displacements permitted by `bound` given the span of shifts
    /// already recorded.
    ///
    /// Keeps the whole history within `bound` of every new shift: the lower
    /// edge is `min(max_shift - bound, min_shift)` and the upper edge
    /// `max(min_shift + bound, max_shift)`, per axis.
    pub fn from_history(min_shift: Shift, max_shift: Shift, bound: Shift) -> Self {
        Self::new(
            (max_shift - bound).min(min_shift),
            (min_shift + bound).max(max_shift),
        )
    }
}

impl fmt::Display for SearchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} ..= {}]", self.min, self.max)
    }
}

/// Per-(cycle, frame, plane) shift and correlation records for one run.
#[derive(Clone, Debug)]
pub struct ShiftRecord {
    shifts: Vec<Array2<Option<Shift>>>,
    correlations: Vec<Array2<f64>>,
    span: Option<(Shift, Shift)>,
}

impl ShiftRecord {
    /// Create an empty record with one `(frames, planes)` table per cycle.
    pub fn new(frames_per_cycle: &[usize], planes: usize) -> Self {
        Self {
            shifts: frames_per_cycle
                .iter()
                .map(|&n| Array2::from_elem((n, planes), None))
                .collect(),
            correlations: frames_per_cycle
                .iter()
                .map(|&n| Array2::from_elem((n, planes), f64::NAN))
                .collect(),
            span: None,
        }
    }

    pub fn num_cycles(&self) -> usize {
        self.shifts.len()
    }

    pub fn num_planes(&self) -> usize {
        self.shifts.first().map_or(0, |s| s.ncols())
    }

    pub fn set(
        &mut self,
        cycle: usize,
        frame: usize,
        plane: usize,
        shift: Shift,
        correlation: f64,
    ) -> Result<()> {
        let cycles = self.shifts.len();
        let table = self
            .shifts
            .get_mut(cycle)
            .ok_or_else(|| MotionError::ShapeMismatch {
                expected: vec![cycles],
                actual: vec![cycle],
            })?;
        let dims = table.shape().to_vec();
        let slot = table
            .get_mut((frame, plane))
            .ok_or(MotionError::ShapeMismatch {
                expected: dims,
                actual: vec![frame, plane],
            })?;
        *slot = Some(shift);
        self.correlations[cycle][[frame, plane]] = correlation;
        self.span = Some(match self.span {
            Some((lo, hi)) => (lo.min(shift), hi.max(shift)),
            None => (shift, shift),
        });
        Ok(())
    }

    pub fn get(&self, cycle: usize, frame: usize, plane: usize) -> Option<Shift> {
        self.shifts
            .get(cycle)
            .and_then(|t| t.get((frame, plane)).copied().flatten())
    }

    /// Recorded correlation, NaN when unset.
    pub fn correlation(&self, cycle: usize, frame: usize, plane: usize) -> f64 {
        self.correlations
            .get(cycle)
            .and_then(|t| t.get((frame, plane)).copied())
            .unwrap_or(f64::NAN)
    }

    /// Component-wise (min, max) over every assigned shift.
    pub fn span(&self) -> Option<(Shift, Shift)> {
        self.span
    }

    pub fn shifts(&self) -> &[Array2<Option<Shift>>] {
        &self.shifts
    }

    pub fn correlations(&self) -> &[Array2<f64>] {
        &self.correlations
    }

    /// Subtract `delta` from every assigned shift of `plane`.
    pub fn offset_plane(&mut self, plane: usize, delta: Shift) {
        for table in &mut self.shifts {
            for slot in table.column_mut(plane).iter_mut() {
                if let Some(shift) = slot.as_mut() {
                    *shift = *shift - delta;
                }
            }
        }
        self.span = self
            .shifts
            .iter()
            .flat_map(|t| t.iter().flatten().copied())
            .fold(None, |acc, s| match acc {
                Some((lo, hi)) => Some((Shift::min(lo, s), Shift::max(hi, s))),
                None => Some((s, s)),
            });
    }

    /// Convert into per-cycle `(frames, planes, 2)` shift arrays and
    /// `(frames, planes)` correlation arrays. Unassigned shifts become zero.
    pub fn into_arrays(self) -> (Vec<Array3<i64>>, Vec<Array2<f64>>) {
        let shifts = self
            .shifts
            .iter()
            .map(|table| {
                let (frames, planes) = table.dim();
                Array3::from_shape_fn((frames, planes, 2), |(f, p, axis)| {
                    let s = table[[f, p]].unwrap_or_default();
                    if axis == 0 {
                        s.dy
                    } else {
                        s.dx
                    }
                })
            })
            .collect();
        (shifts, self.correlations)
    }
}
