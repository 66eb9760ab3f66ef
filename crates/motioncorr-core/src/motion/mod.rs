pub mod accumulator;
pub mod config;
mod estimator;
pub mod frame_aligner;
pub mod partition;
pub mod planes;
pub mod scheduler;
pub mod shared;
pub mod shift;

pub use config::{AlignmentMethod, MotionConfig};
pub use estimator::{MotionEstimationStrategy, PlaneTranslation2D};
pub use partition::{MotionEstimate, PartitionConsensus};
pub use shift::{SearchWindow, Shift, ShiftRecord};
