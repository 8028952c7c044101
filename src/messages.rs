// Define message types crossing the bus boundary

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::BRUSHLESS_COMMAND_RANGE;
use crate::hardware::{Joint, JointStates};

// Potentiometer readings from sensor board A -> runtime
// Angles in radians, raw (turntable is not yet zeroed)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArduinoAReading {
    pub arm_turntable_pos: f64,
    pub arm_lower_left_pos: f64,
    pub arm_upper_left_pos: f64,
    pub arm_scoop_pos: f64,
    pub bin_left_pos: f64,
    pub bin_right_pos: f64,
}

// Potentiometer readings from sensor board B -> runtime
// Right hand side of the twin arm actuators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArduinoBReading {
    pub arm_lower_right_pos: f64,
    pub arm_upper_right_pos: f64,
}

/// Joint setpoints from the controller layer -> runtime
///
/// Serialized as a map of joint to value, e.g. `{"left_tread": 0.2, "bin": 0.5}`.
/// Joints that are left out keep their previous command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointCommand {
    pub setpoints: BTreeMap<Joint, f64>,
}

impl JointCommand {
    pub fn with(mut self, joint: Joint, value: f64) -> Self {
        self.setpoints.insert(joint, value);
        self
    }
}

// Duty cycles from runtime -> motor boards, one message per write()
// Has default values because a disabled rover sends all zeros
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PwmCommand {
    pub tread_left: f64,
    pub tread_right: f64,
    pub bin_left: f64,
    pub bin_right: f64,
    pub arm_turntable: f64,
    pub arm_lower_left: f64,
    pub arm_lower_right: f64,
    pub arm_upper_left: f64,
    pub arm_upper_right: f64,
    pub arm_scoop: f64,
    pub enabled: bool,
}

impl PwmCommand {
    /// Every actuator stopped, boards told we are disabled
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Tread duties as brushless controller go-to commands (left, right)
    pub fn tread_cango(&self) -> (i32, i32) {
        let to_cmd = |pwm: f64| (pwm * BRUSHLESS_COMMAND_RANGE).round() as i32;
        (to_cmd(self.tread_left), to_cmd(self.tread_right))
    }

    /// Every duty value, for bounds checks
    pub fn duties(&self) -> [f64; 10] {
        [
            self.tread_left,
            self.tread_right,
            self.bin_left,
            self.bin_right,
            self.arm_turntable,
            self.arm_lower_left,
            self.arm_lower_right,
            self.arm_upper_left,
            self.arm_upper_right,
            self.arm_scoop,
        ]
    }
}

/// Feedback for a single joint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointSample {
    pub name: String,
    pub position: f64,
    pub velocity: f64,
    pub effort: f64,
    pub command: f64,
}

/// Joint state published by runtime after every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointStateMsg {
    pub joints: Vec<JointSample>,
}

impl From<&JointStates> for JointStateMsg {
    fn from(states: &JointStates) -> Self {
        let joints = Joint::ALL
            .iter()
            .map(|&joint| JointSample {
                name: joint.name().to_string(),
                position: states.position[joint],
                velocity: states.velocity[joint],
                effort: states.effort[joint],
                command: states.command[joint],
            })
            .collect();
        Self { joints }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Disabled,
}
