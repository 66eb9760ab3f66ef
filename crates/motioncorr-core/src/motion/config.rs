use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_PARTITIONS;
use crate::error::{MotionError, Result};

use super::shift::Shift;

/// Per-plane displacement estimation method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignmentMethod {
    /// Normalized cross-correlation against the running reference.
    #[default]
    #[serde(rename = "correlation")]
    Correlation,
    /// Enhanced correlation coefficient maximization. Not implemented.
    #[serde(rename = "ECC", alias = "ecc")]
    Ecc,
}

impl fmt::Display for AlignmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Correlation => write!(f, "correlation"),
            Self::Ecc => write!(f, "ECC"),
        }
    }
}

impl FromStr for AlignmentMethod {
    type Err = MotionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "correlation" => Ok(Self::Correlation),
            "ECC" | "ecc" => Ok(Self::Ecc),
            other => Err(MotionError::InvalidMethod(other.to_string())),
        }
    }
}

/// Options for 2D plane-translation motion estimation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Maximum displacement magnitude in [rows, cols]. Unbounded when unset.
    pub max_displacement: Option<[u32; 2]>,
    pub method: AlignmentMethod,
    /// Worker count. Defaults to half the available cores, at least one.
    pub n_processes: Option<usize>,
    /// Partition grid in [rows, cols]. Defaults to a single tile.
    pub partitions: Option<[usize; 2]>,
}

#[derive(Deserialize)]
struct MethodProbe {
    method: Option<String>,
}

impl MotionConfig {
    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<()> {
        match self.method {
            AlignmentMethod::Correlation => {}
            AlignmentMethod::Ecc => {
                return Err(MotionError::Unimplemented(self.method.to_string()));
            }
        }
        if let Some([rows, cols]) = self.partitions {
            if rows == 0 || cols == 0 {
                return Err(MotionError::InvalidConfig(format!(
                    "partitions must be positive, got [{rows}, {cols}]"
                )));
            }
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.n_processes
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get() / 2)
                    .unwrap_or(1)
            })
            .max(1)
    }

    pub fn partition_grid(&self) -> [usize; 2] {
        self.partitions.unwrap_or(DEFAULT_PARTITIONS)
    }

    pub fn displacement_bound(&self) -> Option<Shift> {
        self.max_displacement
            .map(|[dy, dx]| Shift::new(i64::from(dy), i64::from(dx)))
    }

    /// Parse from TOML. An unknown `method` name is reported as
    /// [`MotionError::InvalidMethod`].
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let invalid = |e: toml::de::Error| MotionError::InvalidConfig(e.to_string());
        let probe: MethodProbe = toml::from_str(s).map_err(invalid)?;
        if let Some(method) = probe.method {
            method.parse::<AlignmentMethod>()?;
        }
        toml::from_str(s).map_err(invalid)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MotionError::InvalidConfig(e.to_string()))
    }
}
