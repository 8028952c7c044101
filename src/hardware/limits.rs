// Per-joint position limits, as loaded from the URDF-derived limits file

use std::path::Path;

use serde::Deserialize;

use super::joint::{Joint, JointMap, JOINT_COUNT};

/// Limits closer to zero than this on both ends mark a continuous joint
const CONTINUOUS_EPSILON: f64 = 1e-3;

/// Errors building a set of joint limits
#[derive(Debug, thiserror::Error)]
pub enum LimitsError {
    #[error("Expected {expected} {which} limits, got {got}")]
    WrongLength {
        which: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Non-finite limit for {}", .joint.name())]
    NonFinite { joint: Joint },

    #[error("Lower limit {lower} exceeds upper limit {upper} for {}", .joint.name())]
    Inverted { joint: Joint, lower: f64, upper: f64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse limits: {0}")]
    Parse(#[from] serde_json::Error),
}

/// On-disk format: `{"lower": [...], "upper": [...]}` in joint order
#[derive(Debug, Deserialize)]
struct LimitsFile {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

/// Validated lower/upper position limits for every joint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimits {
    lower: JointMap<f64>,
    upper: JointMap<f64>,
}

impl JointLimits {
    pub fn new(lower: [f64; JOINT_COUNT], upper: [f64; JOINT_COUNT]) -> Result<Self, LimitsError> {
        for joint in Joint::ALL {
            let (lo, hi) = (lower[joint.index()], upper[joint.index()]);
            if !lo.is_finite() || !hi.is_finite() {
                return Err(LimitsError::NonFinite { joint });
            }
            if lo > hi {
                return Err(LimitsError::Inverted {
                    joint,
                    lower: lo,
                    upper: hi,
                });
            }
        }
        Ok(Self {
            lower: JointMap::new(lower),
            upper: JointMap::new(upper),
        })
    }

    pub fn from_slices(lower: &[f64], upper: &[f64]) -> Result<Self, LimitsError> {
        let lower: [f64; JOINT_COUNT] = lower.try_into().map_err(|_| LimitsError::WrongLength {
            which: "lower",
            expected: JOINT_COUNT,
            got: lower.len(),
        })?;
        let upper: [f64; JOINT_COUNT] = upper.try_into().map_err(|_| LimitsError::WrongLength {
            which: "upper",
            expected: JOINT_COUNT,
            got: upper.len(),
        })?;
        Self::new(lower, upper)
    }

    /// No joint is clamped
    pub fn unbounded() -> Self {
        Self {
            lower: JointMap::default(),
            upper: JointMap::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, LimitsError> {
        let file: LimitsFile = serde_json::from_str(json)?;
        Self::from_slices(&file.lower, &file.upper)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LimitsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn lower(&self, joint: Joint) -> f64 {
        self.lower[joint]
    }

    pub fn upper(&self, joint: Joint) -> f64 {
        self.upper[joint]
    }

    /// True when both limits are (near) zero, the URDF convention for a
    /// joint without position limits
    pub fn is_continuous(&self, joint: Joint) -> bool {
        self.lower[joint].abs() < CONTINUOUS_EPSILON && self.upper[joint].abs() < CONTINUOUS_EPSILON
    }

    /// Clamp a position into the joint's range; continuous joints pass through
    pub fn clamp(&self, joint: Joint, value: f64) -> f64 {
        if self.is_continuous(joint) {
            value
        } else {
            value.clamp(self.lower[joint], self.upper[joint])
        }
    }
}

impl Default for JointLimits {
    fn default() -> Self {
        Self::unbounded()
    }
}
