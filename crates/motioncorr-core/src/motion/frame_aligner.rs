use ndarray::{ArrayView3, ArrayView4, Axis};

use crate::align::correlation::{Alignment, CrossCorrelator};
use crate::consts::BOOTSTRAP_CORRELATION;
use crate::error::{MotionError, Result};

use super::shared::{Claim, SharedReference};
use super::shift::{SearchWindow, Shift};

/// Aligns the planes of single frames against the shared running reference.
pub struct FrameAligner<'a> {
    shared: &'a SharedReference,
    correlator: &'a dyn CrossCorrelator,
    bound: Option<Shift>,
}

impl<'a> FrameAligner<'a> {
    /// `max_displacement` only constrains the search when both components
    /// are positive.
    pub fn new(
        shared: &'a SharedReference,
        correlator: &'a dyn CrossCorrelator,
        max_displacement: Option<Shift>,
    ) -> Self {
        Self {
            shared,
            correlator,
            bound: max_displacement.filter(|m| m.dy > 0 && m.dx > 0),
        }
    }

    /// Align every plane of `frame` (planes, rows, cols, channels) in order.
    pub fn align_frame(&self, cycle: usize, index: usize, frame: ArrayView4<'_, f32>) -> Result<()> {
        for (plane, data) in frame.axis_iter(Axis(0)).enumerate() {
            self.align_plane(cycle, index, plane, data)?;
        }
        Ok(())
    }

    /// Align one plane and fold it into the reference. Returns the recorded
    /// shift (relative to the accumulator offset) and its score.
    pub fn align_plane(
        &self,
        cycle: usize,
        frame: usize,
        plane: usize,
        data: ArrayView3<'_, f32>,
    ) -> Result<Alignment> {
        let snapshot = match self.shared.claim(cycle, frame, plane, data)? {
            Claim::Seeded => {
                return Ok(Alignment {
                    shift: Shift::ZERO,
                    score: BOOTSTRAP_CORRELATION,
                })
            }
            Claim::Align(snapshot) => snapshot,
        };

        let window = self.bound.map(|bound| {
            let (min_shift, max_shift) = snapshot.span.unwrap_or_default();
            SearchWindow::from_history(min_shift, max_shift, bound).translated(snapshot.offset)
        });

        let found = self
            .correlator
            .align(snapshot.image.view(), data, window)?;

        if let (Some(window), Some(bound)) = (window, self.bound) {
            if !window.contains(found.shift) {
                return Err(MotionError::ShiftOutOfBounds {
                    shift: found.shift,
                    window,
                });
            }
            if !(found.shift - snapshot.offset).abs().within(bound) {
                return Err(MotionError::DisplacementExceeded {
                    shift: found.shift,
                    offset: snapshot.offset,
                    bound,
                });
            }
        }

        let shift = found.shift - snapshot.offset;
        self.shared
            .commit(cycle, frame, plane, shift, found.score, data)?;
        Ok(Alignment {
            shift,
            score: found.score,
        })
    }
}
