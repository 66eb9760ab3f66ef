use ndarray::{Array3, ArrayView3};
use parking_lot::Mutex;

use crate::consts::BOOTSTRAP_CORRELATION;
use crate::error::Result;

use super::accumulator::{PlaneState, ReferenceAccumulator};
use super::shift::{Shift, ShiftRecord};

/// Reference state captured for an unlocked correlation search.
#[derive(Clone, Debug)]
pub struct ReferenceSnapshot {
    /// Mean image of the plane, NaN where unknown.
    pub image: Array3<f64>,
    /// Accumulator offset at capture time.
    pub offset: Shift,
    /// (min, max) over all shifts recorded so far.
    pub span: Option<(Shift, Shift)>,
}

/// What a worker got when it claimed a plane.
#[derive(Debug)]
pub enum Claim {
    /// The plane had no counted samples. This one was recorded at (0, 0)
    /// and added; if it was entirely missing the plane is still empty.
    Seeded,
    /// The plane already has a reference; align against the snapshot.
    Align(ReferenceSnapshot),
}

struct RunState {
    accumulator: ReferenceAccumulator,
    record: ShiftRecord,
}

/// Accumulator and shift records for one partition run, shared by every
/// worker behind a single coarse lock.
///
/// Only short array reads and writes happen under the lock. The correlation
/// search between [`claim`](Self::claim) and [`commit`](Self::commit) runs
/// unlocked, so a frame may be aligned against a reference that other
/// workers update before it commits.
pub struct SharedReference {
    state: Mutex<RunState>,
}

impl SharedReference {
    pub fn new(accumulator: ReferenceAccumulator, record: ShiftRecord) -> Self {
        Self {
            state: Mutex::new(RunState {
                accumulator,
                record,
            }),
        }
    }

    /// Seed an empty plane with `data`, or snapshot its current reference.
    pub fn claim(
        &self,
        cycle: usize,
        frame: usize,
        plane: usize,
        data: ArrayView3<'_, f32>,
    ) -> Result<Claim> {
        let mut state = self.state.lock();
        match state.accumulator.state(plane)? {
            PlaneState::Empty => {
                state
                    .record
                    .set(cycle, frame, plane, Shift::ZERO, BOOTSTRAP_CORRELATION)?;
                state.accumulator.seed(plane, data)?;
                Ok(Claim::Seeded)
            }
            PlaneState::Seeded => Ok(Claim::Align(ReferenceSnapshot {
                image: state.accumulator.reference(plane)?,
                offset: state.accumulator.offset(),
                span: state.record.span(),
            })),
        }
    }

    /// Record an aligned plane and add it to the reference, growing the
    /// accumulator first if the placement falls outside it.
    pub fn commit(
        &self,
        cycle: usize,
        frame: usize,
        plane: usize,
        shift: Shift,
        correlation: f64,
        data: ArrayView3<'_, f32>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.record.set(cycle, frame, plane, shift, correlation)?;
        state.accumulator.grow_to_fit(shift)?;
        state.accumulator.add(plane, shift, data)
    }

    /// Current accumulator (offset, extent).
    pub fn geometry(&self) -> (Shift, (usize, usize)) {
        let state = self.state.lock();
        (state.accumulator.offset(), state.accumulator.extent())
    }

    pub fn into_parts(self) -> (ReferenceAccumulator, ShiftRecord) {
        let state = self.state.into_inner();
        (state.accumulator, state.record)
    }
}
