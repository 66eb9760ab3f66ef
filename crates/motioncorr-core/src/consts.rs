/// Marker stored in reference pixels that no aligned sample has covered yet.
pub const UNKNOWN: f64 = f64::NAN;

/// Correlation score recorded for the plane that seeds an empty reference.
pub const BOOTSTRAP_CORRELATION: f64 = 1.0;

/// Largest accumulator area allowed, as a multiple of the raw frame area.
pub const MAX_ACCUMULATOR_AREA_FACTOR: usize = 4;

/// Two partitions agree once the RMS distance between their shifts drops
/// below this many pixels.
pub const CONSENSUS_DISTANCE_PX: f64 = 2.0;

/// Minimum fraction of the candidate's known samples that must overlap known
/// reference samples for a placement to be scored.
pub const MIN_OVERLAP_FRACTION: f64 = 0.5;

/// Variance, relative to the sum of squares, below which an overlap is
/// treated as flat (correlation 0).
pub const EPSILON: f64 = 1e-10;

/// Default partition grid: the whole frame as a single tile.
pub const DEFAULT_PARTITIONS: [usize; 2] = [1, 1];

/// Minimum number of placement rows to scan with Rayon parallelism.
pub const PARALLEL_PLACEMENT_THRESHOLD: usize = 4;

/// Returns true if a reference sample has been observed at least once.
#[inline]
pub fn is_known(value: f64) -> bool {
    !value.is_nan()
}
