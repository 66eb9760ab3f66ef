use ndarray::{s, Array3, Array4, ArrayView3, Axis, Zip};
use tracing::debug;

use crate::consts::{MAX_ACCUMULATOR_AREA_FACTOR, UNKNOWN};
use crate::error::{MotionError, Result};
use crate::frame::FrameShape;

use super::shift::Shift;

/// Whether any sample of a plane has been counted into the reference yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneState {
    Empty,
    Seeded,
}

/// Running pixel sums and counts backing the per-plane reference images.
///
/// Arrays are shaped (planes, rows, cols, channels) and share one offset: a
/// plane recorded with shift `s` covers `[offset + s, offset + s + frame)`.
#[derive(Clone, Debug)]
pub struct ReferenceAccumulator {
    sums: Array4<f64>,
    counts: Array4<u32>,
    offset: Shift,
    states: Vec<PlaneState>,
    frame_shape: FrameShape,
}

impl ReferenceAccumulator {
    /// Create an empty accumulator for frames of `frame_shape`.
    ///
    /// With a known displacement bound the arrays are allocated with that
    /// margin on every side, so bounded shifts never trigger growth. The
    /// margin is dropped if it would break the area limit.
    pub fn new(frame_shape: FrameShape, max_displacement: Option<Shift>) -> Self {
        let margin = max_displacement
            .map(|m| m.max(Shift::ZERO))
            .filter(|m| {
                let rows = frame_shape.rows + 2 * m.dy as usize;
                let cols = frame_shape.cols + 2 * m.dx as usize;
                rows * cols <= MAX_ACCUMULATOR_AREA_FACTOR * frame_shape.area()
            })
            .unwrap_or(Shift::ZERO);

        let dims = (
            frame_shape.planes,
            frame_shape.rows + 2 * margin.dy as usize,
            frame_shape.cols + 2 * margin.dx as usize,
            frame_shape.channels,
        );
        Self {
            sums: Array4::zeros(dims),
            counts: Array4::zeros(dims),
            offset: margin,
            states: vec![PlaneState::Empty; frame_shape.planes],
            frame_shape,
        }
    }

    pub fn frame_shape(&self) -> FrameShape {
        self.frame_shape
    }

    pub fn offset(&self) -> Shift {
        self.offset
    }

    /// Current (rows, cols) extent of the accumulator.
    pub fn extent(&self) -> (usize, usize) {
        let (_, rows, cols, _) = self.sums.dim();
        (rows, cols)
    }

    pub fn state(&self, plane: usize) -> Result<PlaneState> {
        self.states
            .get(plane)
            .copied()
            .ok_or(MotionError::PlaneIndexOutOfRange {
                index: plane,
                total: self.states.len(),
            })
    }

    /// Insert the first observation of an empty plane at shift (0, 0). If
    /// every sample is missing the plane remains [`PlaneState::Empty`].
    pub fn seed(&mut self, plane: usize, data: ArrayView3<'_, f32>) -> Result<()> {
        if self.state(plane)? == PlaneState::Seeded {
            return Err(MotionError::PlaneAlreadySeeded(plane));
        }
        self.add(plane, Shift::ZERO, data)
    }

    /// Mean image of `plane`, (rows, cols, channels). Pixels never covered
    /// hold [`UNKNOWN`].
    pub fn reference(&self, plane: usize) -> Result<Array3<f64>> {
        self.state(plane)?;
        let sums = self.sums.index_axis(Axis(0), plane);
        let counts = self.counts.index_axis(Axis(0), plane);
        Ok(Zip::from(&sums).and(&counts).map_collect(|&sum, &count| {
            if count == 0 {
                UNKNOWN
            } else {
                sum / count as f64
            }
        }))
    }

    /// Pad every plane so a frame placed at `shift` fits, moving the offset by
    /// the amount added at the top and left. Returns true if the arrays grew.
    pub fn grow_to_fit(&mut self, shift: Shift) -> Result<bool> {
        let (rows, cols) = self.extent();
        let start = self.offset + shift;

        let top = (-start.dy).max(0) as usize;
        let left = (-start.dx).max(0) as usize;
        let bottom = (start.dy + self.frame_shape.rows as i64 - rows as i64).max(0) as usize;
        let right = (start.dx + self.frame_shape.cols as i64 - cols as i64).max(0) as usize;
        if top == 0 && left == 0 && bottom == 0 && right == 0 {
            return Ok(false);
        }

        let new_rows = rows + top + bottom;
        let new_cols = cols + left + right;
        let frame_area = self.frame_shape.area();
        if new_rows * new_cols > MAX_ACCUMULATOR_AREA_FACTOR * frame_area {
            return Err(MotionError::AccumulatorOverflow {
                rows: new_rows,
                cols: new_cols,
                frame_area,
            });
        }

        let dims = (self.frame_shape.planes, new_rows, new_cols, self.frame_shape.channels);
        let mut sums = Array4::<f64>::zeros(dims);
        let mut counts = Array4::<u32>::zeros(dims);
        sums.slice_mut(s![.., top..top + rows, left..left + cols, ..])
            .assign(&self.sums);
        counts
            .slice_mut(s![.., top..top + rows, left..left + cols, ..])
            .assign(&self.counts);
        self.sums = sums;
        self.counts = counts;
        self.offset = self.offset + Shift::new(top as i64, left as i64);

        debug!(
            rows = new_rows,
            cols = new_cols,
            offset = %self.offset,
            "Accumulator grown"
        );
        Ok(true)
    }

    /// Accumulate `data` (rows, cols, channels) at `shift`. Non-finite samples
    /// are left out of both the sum and the count.
    pub fn add(&mut self, plane: usize, shift: Shift, data: ArrayView3<'_, f32>) -> Result<()> {
        self.state(plane)?;
        let (rows, cols, channels) = data.dim();
        let fs = self.frame_shape;
        if rows != fs.rows || cols != fs.cols || channels != fs.channels {
            return Err(MotionError::ShapeMismatch {
                expected: vec![fs.rows, fs.cols, fs.channels],
                actual: vec![rows, cols, channels],
            });
        }

        let start = self.offset + shift;
        let (ext_rows, ext_cols) = self.extent();
        if start.dy < 0
            || start.dx < 0
            || start.dy as usize + rows > ext_rows
            || start.dx as usize + cols > ext_cols
        {
            return Err(MotionError::PlacementOutsideAccumulator(start));
        }
        let (y, x) = (start.dy as usize, start.dx as usize);

        let mut counted = false;
        Zip::from(self.sums.slice_mut(s![plane, y..y + rows, x..x + cols, ..]))
            .and(self.counts.slice_mut(s![plane, y..y + rows, x..x + cols, ..]))
            .and(&data)
            .for_each(|sum, count, &v| {
                if v.is_finite() {
                    *sum += v as f64;
                    *count += 1;
                    counted = true;
                }
            });
        // A plane stays empty until at least one sample has been counted.
        if counted {
            self.states[plane] = PlaneState::Seeded;
        }
        Ok(())
    }
}
