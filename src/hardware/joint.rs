// Joint identifiers and the per-joint storage used by the hardware layer
//
// Joint order is fixed: it is the index into every JointMap, and the order
// joints appear in published state messages.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Number of joints controlled by this layer
pub const JOINT_COUNT: usize = 7;

/// All of the joints on the rover
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    LeftTread,
    RightTread,
    Bin,
    Turntable,
    LowerArm,
    UpperArm,
    Scoop,
}

/// How the controller layer commands a joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandInterface {
    /// Command is a velocity/effort setpoint (treads)
    Effort,
    /// Command is a position setpoint in radians
    Position,
}

impl Joint {
    /// Every joint, in index order
    pub const ALL: [Joint; JOINT_COUNT] = [
        Joint::LeftTread,
        Joint::RightTread,
        Joint::Bin,
        Joint::Turntable,
        Joint::LowerArm,
        Joint::UpperArm,
        Joint::Scoop,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Joint name as it appears in the URDF and controller description
    pub fn name(self) -> &'static str {
        match self {
            Joint::LeftTread => "left_tread_joint",
            Joint::RightTread => "right_tread_joint",
            Joint::Bin => "bin_joint",
            Joint::Turntable => "turntable_joint",
            Joint::LowerArm => "lower_arm_joint",
            Joint::UpperArm => "upper_arm_joint",
            Joint::Scoop => "scoop_joint",
        }
    }

    pub fn interface(self) -> CommandInterface {
        if self.is_drive() {
            CommandInterface::Effort
        } else {
            CommandInterface::Position
        }
    }

    /// Treads are velocity driven, everything else holds a position
    pub fn is_drive(self) -> bool {
        matches!(self, Joint::LeftTread | Joint::RightTread)
    }
}

/// Fixed-size map from every joint to a value
///
/// Always fully populated, so there is no "missing joint" state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointMap<T>([T; JOINT_COUNT]);

impl<T> JointMap<T> {
    pub fn new(values: [T; JOINT_COUNT]) -> Self {
        Self(values)
    }

    pub fn from_fn(mut f: impl FnMut(Joint) -> T) -> Self {
        Self(Joint::ALL.map(&mut f))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Joint, &T)> {
        Joint::ALL.into_iter().zip(self.0.iter())
    }

    pub fn as_array(&self) -> &[T; JOINT_COUNT] {
        &self.0
    }
}

impl<T> Index<Joint> for JointMap<T> {
    type Output = T;

    fn index(&self, joint: Joint) -> &T {
        &self.0[joint.index()]
    }
}

impl<T> IndexMut<Joint> for JointMap<T> {
    fn index_mut(&mut self, joint: Joint) -> &mut T {
        &mut self.0[joint.index()]
    }
}
