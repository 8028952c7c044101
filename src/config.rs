// Timeouts, topics, drivebase scaling
use std::time::Duration;

use crate::hardware::JointLimits;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Longest time step used for acceleration limiting. Stops a stalled loop
// from releasing one huge velocity jump on the next tick.
pub const MAX_TICK_DT: f64 = 0.1;

// Zenoh topics
pub const TOPIC_SENSORS_A: &str = "rover/sensors/arduino_a"; // potentiometer set A
pub const TOPIC_SENSORS_B: &str = "rover/sensors/arduino_b"; // potentiometer set B
pub const TOPIC_LEFT_COUNTER: &str = "rover/drive/left/relcntr"; // relative pulse counts
pub const TOPIC_RIGHT_COUNTER: &str = "rover/drive/right/relcntr";
pub const TOPIC_CMD_JOINTS: &str = "rover/cmd/joints"; // controller setpoints
pub const TOPIC_CMD_ENABLE: &str = "rover/cmd/enable"; // enable gate
pub const TOPIC_CMD_ZERO_TURNTABLE: &str = "rover/cmd/zero_turntable";
pub const TOPIC_MOTOR_OUTPUT: &str = "rover/motor_output"; // actuation
pub const TOPIC_LEFT_CANGO: &str = "rover/drive/left/cmd_cango"; // brushless controller
pub const TOPIC_RIGHT_CANGO: &str = "rover/drive/right/cmd_cango";
pub const TOPIC_JOINT_STATES: &str = "rover/state/joints";
pub const TOPIC_LEFT_VELOCITY: &str = "rover/state/left_tread_velocity";
pub const TOPIC_RIGHT_VELOCITY: &str = "rover/state/right_tread_velocity";
pub const TOPIC_HEALTH: &str = "rover/state/health"; // health status

// Tread travel per relative encoder count per sample (m/s per count)
pub const TREAD_VELOCITY_PER_COUNT: f64 = 0.001;

// Brushless controller command at full duty
pub const BRUSHLESS_COMMAND_RANGE: f64 = 1000.0;

/// Settings chosen at launch
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Run without hardware, mirroring commands back as positions
    pub simulate: bool,
    pub limits: JointLimits,
    pub loop_hz: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            simulate: false,
            limits: JointLimits::unbounded(),
            loop_hz: LOOP_HZ,
        }
    }
}
