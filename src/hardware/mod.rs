// Hardware layer for the rover's seven joints
//
// Provides:
// - Joint identifiers and per-joint storage
// - Joint limit loading and validation
// - Thread-safe tread pulse-count accumulation
// - Setpoint to PWM conversion with acceleration and brownout limiting
// - The RobotInterface read/write cycle

mod accumulator;
mod interface;
pub mod joint;
pub mod limits;
pub mod pwm;

pub use accumulator::VelocityAccumulator;
pub use interface::{JointHandle, JointStates, RobotHardware, RobotInterface};
pub use joint::{CommandInterface, Joint, JointMap, JOINT_COUNT};
pub use limits::{JointLimits, LimitsError};
