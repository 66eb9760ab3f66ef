pub mod correlation;

pub use correlation::{Alignment, CrossCorrelator, NormalizedCrossCorrelation};
