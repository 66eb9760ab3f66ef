use thiserror::Error;

use crate::motion::shift::{SearchWindow, Shift};

#[derive(Error, Debug)]
pub enum MotionError {
    #[error("Unrecognized alignment method: {0}")]
    InvalidMethod(String),

    #[error("Alignment method '{0}' is not implemented")]
    Unimplemented(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("Shift {shift} outside permissible window {window}")]
    ShiftOutOfBounds { shift: Shift, window: SearchWindow },

    #[error("Shift {shift} deviates from offset {offset} by more than {bound}")]
    DisplacementExceeded {
        shift: Shift,
        offset: Shift,
        bound: Shift,
    },

    #[error("Accumulator of {rows}x{cols} would exceed 4x the frame area ({frame_area} px)")]
    AccumulatorOverflow {
        rows: usize,
        cols: usize,
        frame_area: usize,
    },

    #[error("Placement {0} lies outside the accumulator")]
    PlacementOutsideAccumulator(Shift),

    #[error("Plane {0} has already been seeded")]
    PlaneAlreadySeeded(usize),

    #[error("Plane index {index} out of range (total: {total})")]
    PlaneIndexOutOfRange { index: usize, total: usize },

    #[error("No admissible placement for candidate of {rows}x{cols}")]
    NoValidPlacement { rows: usize, cols: usize },

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

pub type Result<T> = std::result::Result<T, MotionError>;
