// Hardware layer between the controller layer and the rover's actuators
//
// Goes from commanded joint values to bounded actuator duty cycles, with a
// few safety measures on the way, and puts sensor feedback into the joint
// state the controllers consume. One read() and one write() per tick, both
// on the control thread.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::accumulator::VelocityAccumulator;
use super::joint::{CommandInterface, Joint, JointMap};
use super::limits::JointLimits;
use super::pwm::{
    angle_to_pwm, drivebase_velocity_to_pwm, scale_pwm, turntable_angle_to_pwm, twin_angle_to_pwm,
};
use crate::config::{MAX_TICK_DT, TREAD_VELOCITY_PER_COUNT};
use crate::messages::{ArduinoAReading, ArduinoBReading, PwmCommand};

/// Turntable motor is mounted reversed
const TURNTABLE_DIRECTION: f64 = -1.0;
/// Lower arm actuators are mounted backwards
const LOWER_ARM_DIRECTION: f64 = -1.0;

/// Shared joint data surface between this layer and the controller layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointStates {
    /// Populated by the controller layer for us to use
    pub command: JointMap<f64>,
    /// Populated by us for the controller layer to use
    pub position: JointMap<f64>,
    pub velocity: JointMap<f64>,
    pub effort: JointMap<f64>,
}

/// A joint as registered with the controller layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointHandle {
    pub joint: Joint,
    pub name: &'static str,
    pub interface: CommandInterface,
}

/// Capability interface consumed by the control loop
pub trait RobotHardware {
    /// Pull feedback into joint state. Call once per tick before the
    /// controllers run.
    fn read(&mut self);

    /// Turn joint commands into actuator output. Call once per tick after
    /// the controllers have set their commands.
    fn write(&mut self) -> PwmCommand;

    fn joint_states(&self) -> &JointStates;

    fn commands_mut(&mut self) -> &mut JointMap<f64>;

    /// Command a motionless rover: treads stopped, everything else held
    fn clear_commands(&mut self);

    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;
}

/// Hardware interface for the rover's seven joints
pub struct RobotInterface {
    simulate: bool,
    limits: JointLimits,
    states: JointStates,

    // Latest sensor messages, replaced whole on every arrival
    latest_a: Option<ArduinoAReading>,
    latest_b: Option<ArduinoBReading>,

    left_counter: Arc<VelocityAccumulator>,
    right_counter: Arc<VelocityAccumulator>,

    // Used to limit acceleration on the drivebase
    drivebase_v0: (f64, f64),
    last_update: Instant,

    enabled: bool,
    turntable_offset: f64,
}

impl RobotInterface {
    /// Create the interface. Starts disabled.
    ///
    /// `simulate` mirrors commands back as positions instead of reading
    /// hardware, for running against a visualizer.
    pub fn new(simulate: bool, limits: JointLimits) -> Self {
        info!(
            "Creating robot interface ({} mode)",
            if simulate { "simulation" } else { "hardware" }
        );
        Self {
            simulate,
            limits,
            states: JointStates::default(),
            latest_a: None,
            latest_b: None,
            left_counter: Arc::new(VelocityAccumulator::new()),
            right_counter: Arc::new(VelocityAccumulator::new()),
            drivebase_v0: (0.0, 0.0),
            last_update: Instant::now(),
            enabled: false,
            turntable_offset: 0.0,
        }
    }

    /// Every joint with its name and command interface, in index order
    pub fn registered_joints(&self) -> impl Iterator<Item = JointHandle> {
        Joint::ALL.into_iter().map(|joint| JointHandle {
            joint,
            name: joint.name(),
            interface: joint.interface(),
        })
    }

    /// Pulse-count accumulators (left, right) for the bus callbacks to feed
    pub fn velocity_accumulators(&self) -> (Arc<VelocityAccumulator>, Arc<VelocityAccumulator>) {
        (Arc::clone(&self.left_counter), Arc::clone(&self.right_counter))
    }

    /// Store the latest reading from sensor board A
    pub fn on_arduino_a(&mut self, reading: ArduinoAReading) {
        self.latest_a = Some(reading);
    }

    /// Store the latest reading from sensor board B
    pub fn on_arduino_b(&mut self, reading: ArduinoBReading) {
        self.latest_b = Some(reading);
    }

    pub fn is_simulated(&self) -> bool {
        self.simulate
    }

    /// Drivebase velocities (left, right) commanded on the last write
    pub fn drivebase_velocity(&self) -> (f64, f64) {
        self.drivebase_v0
    }

    pub fn turntable_offset(&self) -> f64 {
        self.turntable_offset
    }

    pub fn set_command(&mut self, joint: Joint, value: f64) {
        self.states.command[joint] = value;
    }

    /// Retrieves the position of the bin
    pub fn bin_state(&self) -> f64 {
        self.states.position[Joint::Bin]
    }

    /// Retrieves the arm positions: turntable, lower arm, upper arm, scoop
    pub fn arm_state(&self) -> [f64; 4] {
        [
            self.states.position[Joint::Turntable],
            self.states.position[Joint::LowerArm],
            self.states.position[Joint::UpperArm],
            self.states.position[Joint::Scoop],
        ]
    }

    /// Make the current raw turntable reading the new zero.
    ///
    /// Returns false (and changes nothing) if no reading has arrived yet.
    pub fn zero_turntable(&mut self) -> bool {
        match &self.latest_a {
            Some(reading) => {
                self.turntable_offset = reading.arm_turntable_pos;
                info!("Turntable zeroed at raw angle {:.4}", self.turntable_offset);
                true
            }
            None => {
                warn!("Cannot zero turntable, no sensor reading received yet");
                false
            }
        }
    }

    /// Left and right measurements of a twin joint. The right side falls
    /// back to the left until sensor board B has reported.
    fn twin_readings(&self, joint: Joint) -> Option<(f64, f64)> {
        let a = self.latest_a.as_ref()?;
        let b = self.latest_b.as_ref();
        match joint {
            Joint::LowerArm => Some((
                a.arm_lower_left_pos,
                b.map_or(a.arm_lower_left_pos, |b| b.arm_lower_right_pos),
            )),
            Joint::UpperArm => Some((
                a.arm_upper_left_pos,
                b.map_or(a.arm_upper_left_pos, |b| b.arm_upper_right_pos),
            )),
            Joint::Bin => Some((a.bin_left_pos, a.bin_right_pos)),
            _ => None,
        }
    }

    /// Twin measurements for write(), or the reported position on both
    /// sides when there is no hardware to ask
    fn twin_measured(&self, joint: Joint) -> (f64, f64) {
        if self.simulate {
            let position = self.states.position[joint];
            return (position, position);
        }
        self.twin_readings(joint).unwrap_or_else(|| {
            let position = self.states.position[joint];
            (position, position)
        })
    }

    fn read_drivebase(&mut self) {
        // Always drain so stale counts never leak into the next tick
        let left = self.left_counter.drain_average();
        let right = self.right_counter.drain_average();

        let (left, right) = if self.simulate {
            self.drivebase_v0
        } else {
            let to_velocity = |avg: f64| avg * TREAD_VELOCITY_PER_COUNT;
            (
                left.map_or(self.states.velocity[Joint::LeftTread], to_velocity),
                right.map_or(self.states.velocity[Joint::RightTread], to_velocity),
            )
        };

        for (joint, velocity) in [(Joint::LeftTread, left), (Joint::RightTread, right)] {
            self.states.position[joint] = 0.0;
            self.states.velocity[joint] = velocity;
            self.states.effort[joint] = 0.0;
        }
    }

    fn read_hardware(&mut self) {
        // Hold the previous values until the first reading arrives
        let Some(a) = self.latest_a.clone() else {
            return;
        };

        let twin_mean = |readings: Option<(f64, f64)>| readings.map(|(l, r)| (l + r) / 2.0);
        let lower = twin_mean(self.twin_readings(Joint::LowerArm));
        let upper = twin_mean(self.twin_readings(Joint::UpperArm));
        let bin = twin_mean(self.twin_readings(Joint::Bin));

        let positions = [
            (Joint::Turntable, Some(a.arm_turntable_pos - self.turntable_offset)),
            (Joint::LowerArm, lower),
            (Joint::UpperArm, upper),
            (Joint::Scoop, Some(a.arm_scoop_pos)),
            (Joint::Bin, bin),
        ];
        for (joint, position) in positions {
            if let Some(position) = position {
                self.states.position[joint] = position;
            }
            self.states.velocity[joint] = 0.0;
            self.states.effort[joint] = 0.0;
        }
    }

    fn read_simulated(&mut self) {
        for joint in Joint::ALL.into_iter().filter(|j| !j.is_drive()) {
            self.states.position[joint] = self.limits.clamp(joint, self.states.command[joint]);
            self.states.velocity[joint] = 0.0;
            self.states.effort[joint] = 0.0;
        }
    }

    /// Write using `now` as the tick time
    pub fn write_at(&mut self, now: Instant) -> PwmCommand {
        let dt = now
            .saturating_duration_since(self.last_update)
            .as_secs_f64()
            .min(MAX_TICK_DT);
        self.last_update = now;

        if !self.enabled {
            // Treads are stopped, so the next ramp starts from rest
            self.drivebase_v0 = (0.0, 0.0);
            return PwmCommand::neutral();
        }

        let command = &self.states.command;
        let position = &self.states.position;

        let left = drivebase_velocity_to_pwm(command[Joint::LeftTread], self.drivebase_v0.0, dt);
        let right = drivebase_velocity_to_pwm(command[Joint::RightTread], self.drivebase_v0.1, dt);
        let (tread_left, tread_right) = scale_pwm(left.pwm, right.pwm);

        let (lower_left, lower_right) = self.twin_measured(Joint::LowerArm);
        let (arm_lower_left, arm_lower_right) =
            twin_angle_to_pwm(command[Joint::LowerArm], lower_left, lower_right);
        let (upper_left, upper_right) = self.twin_measured(Joint::UpperArm);
        let (arm_upper_left, arm_upper_right) =
            twin_angle_to_pwm(command[Joint::UpperArm], upper_left, upper_right);

        // Bin actuators are driven together from the averaged position
        let bin = angle_to_pwm(command[Joint::Bin], position[Joint::Bin]);

        let pwm = PwmCommand {
            tread_left,
            tread_right,
            bin_left: bin,
            bin_right: bin,
            arm_turntable: TURNTABLE_DIRECTION
                * turntable_angle_to_pwm(command[Joint::Turntable], position[Joint::Turntable]),
            arm_lower_left: LOWER_ARM_DIRECTION * arm_lower_left,
            arm_lower_right: LOWER_ARM_DIRECTION * arm_lower_right,
            arm_upper_left,
            arm_upper_right,
            arm_scoop: angle_to_pwm(command[Joint::Scoop], position[Joint::Scoop]),
            enabled: true,
        };

        debug!(
            "Drivebase v=({:.3}, {:.3}) pwm=({:.3}, {:.3})",
            left.velocity, right.velocity, tread_left, tread_right
        );
        self.drivebase_v0 = (left.velocity, right.velocity);
        pwm
    }
}

impl RobotHardware for RobotInterface {
    fn read(&mut self) {
        self.read_drivebase();
        if self.simulate {
            self.read_simulated();
        } else {
            self.read_hardware();
        }
    }

    fn write(&mut self) -> PwmCommand {
        self.write_at(Instant::now())
    }

    fn joint_states(&self) -> &JointStates {
        &self.states
    }

    fn commands_mut(&mut self) -> &mut JointMap<f64> {
        &mut self.states.command
    }

    fn clear_commands(&mut self) {
        for joint in Joint::ALL {
            self.states.command[joint] = if joint.is_drive() {
                0.0
            } else {
                self.states.position[joint]
            };
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        if enabled != self.enabled {
            info!("Robot interface {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::JOINT_COUNT;
    use std::time::Duration;

    const EPS: f64 = 1e-9;
    const TICK: Duration = Duration::from_millis(20);

    fn reading_a() -> ArduinoAReading {
        ArduinoAReading {
            arm_turntable_pos: 0.7,
            arm_lower_left_pos: 0.2,
            arm_upper_left_pos: 0.4,
            arm_scoop_pos: -0.3,
            bin_left_pos: 0.1,
            bin_right_pos: 0.3,
        }
    }

    fn hardware() -> RobotInterface {
        let mut robot = RobotInterface::new(false, JointLimits::unbounded());
        robot.on_arduino_a(reading_a());
        robot
    }

    #[test]
    fn test_starts_disabled_and_zeroed() {
        let robot = RobotInterface::new(false, JointLimits::unbounded());
        assert!(!robot.is_enabled());
        assert_eq!(robot.joint_states(), &JointStates::default());
        assert_eq!(robot.drivebase_velocity(), (0.0, 0.0));
    }

    #[test]
    fn test_registered_joints() {
        let robot = hardware();
        let handles: Vec<_> = robot.registered_joints().collect();
        assert_eq!(handles.len(), JOINT_COUNT);
        assert_eq!(handles[0].name, "left_tread_joint");
        assert_eq!(handles[0].interface, CommandInterface::Effort);
        assert_eq!(handles[6].name, "scoop_joint");
        assert_eq!(handles[6].interface, CommandInterface::Position);
    }

    #[test]
    fn test_read_copies_sensor_readings() {
        let mut robot = hardware();
        robot.on_arduino_b(ArduinoBReading {
            arm_lower_right_pos: 0.4,
            arm_upper_right_pos: 0.6,
        });
        robot.read();

        let position = &robot.joint_states().position;
        assert!((position[Joint::Turntable] - 0.7).abs() < EPS);
        assert!((position[Joint::LowerArm] - 0.3).abs() < EPS);
        assert!((position[Joint::UpperArm] - 0.5).abs() < EPS);
        assert!((position[Joint::Scoop] + 0.3).abs() < EPS);
        assert!((position[Joint::Bin] - 0.2).abs() < EPS);
        assert!((robot.bin_state() - 0.2).abs() < EPS);
        assert_eq!(robot.arm_state()[3], position[Joint::Scoop]);
    }

    #[test]
    fn test_read_without_board_b_uses_left_side() {
        let mut robot = hardware();
        robot.read();
        assert!((robot.joint_states().position[Joint::LowerArm] - 0.2).abs() < EPS);
    }

    #[test]
    fn test_read_holds_without_readings() {
        let mut robot = RobotInterface::new(false, JointLimits::unbounded());
        robot.read();
        assert_eq!(robot.joint_states().position, JointMap::default());
    }

    #[test]
    fn test_read_drains_tread_velocity() {
        let mut robot = hardware();
        let (left, right) = robot.velocity_accumulators();
        left.accumulate(100);
        left.accumulate(200);
        right.accumulate(-50);
        robot.read();

        let velocity = robot.joint_states().velocity;
        assert!((velocity[Joint::LeftTread] - 150.0 * TREAD_VELOCITY_PER_COUNT).abs() < EPS);
        assert!((velocity[Joint::RightTread] + 50.0 * TREAD_VELOCITY_PER_COUNT).abs() < EPS);

        // No new counts: hold previous velocity
        robot.read();
        assert_eq!(robot.joint_states().velocity, velocity);
        assert_eq!(left.drain_average(), None);
    }

    #[test]
    fn test_zero_turntable() {
        let mut robot = hardware();
        assert!(robot.zero_turntable());
        robot.read();
        assert!(robot.joint_states().position[Joint::Turntable].abs() < EPS);

        robot.on_arduino_a(ArduinoAReading {
            arm_turntable_pos: 1.0,
            ..reading_a()
        });
        robot.read();
        assert!((robot.joint_states().position[Joint::Turntable] - 0.3).abs() < EPS);
    }

    #[test]
    fn test_zero_turntable_without_reading() {
        let mut robot = RobotInterface::new(false, JointLimits::unbounded());
        assert!(!robot.zero_turntable());
        assert_eq!(robot.turntable_offset(), 0.0);
    }

    #[test]
    fn test_disabled_write_is_neutral() {
        for value in [0.0, 1e6, -1e6] {
            let mut robot = hardware();
            robot.set_enabled(true);
            robot.read();
            for joint in Joint::ALL {
                robot.set_command(joint, value);
            }
            robot.set_enabled(false);
            assert_eq!(robot.write(), PwmCommand::neutral());
            assert_eq!(robot.drivebase_velocity(), (0.0, 0.0));
        }
    }

    #[test]
    fn test_enabled_write_moves_toward_commands() {
        let mut robot = hardware();
        robot.set_enabled(true);
        robot.read();
        robot.set_command(Joint::Scoop, 0.5);
        robot.set_command(Joint::Bin, 0.2);
        robot.set_command(Joint::UpperArm, 1.0);
        robot.set_command(Joint::LowerArm, 1.0);
        robot.set_command(Joint::Turntable, 0.7);

        let pwm = robot.write();
        assert!(pwm.enabled);
        assert!(pwm.arm_scoop > 0.0);
        assert_eq!(pwm.bin_left, 0.0);
        assert_eq!(pwm.bin_right, 0.0);
        assert!(pwm.arm_upper_left > 0.0);
        assert_eq!(pwm.arm_upper_left, pwm.arm_upper_right);
        // Lower arm is mounted backwards
        assert!(pwm.arm_lower_left < 0.0);
        assert_eq!(pwm.arm_lower_left, pwm.arm_lower_right);
        assert_eq!(pwm.arm_turntable, 0.0);
    }

    #[test]
    fn test_drivebase_acceleration_limited() {
        let mut robot = hardware();
        robot.set_enabled(true);
        let start = Instant::now();
        robot.write_at(start);

        robot.set_command(Joint::LeftTread, 0.5);
        robot.set_command(Joint::RightTread, -0.5);
        let mut now = start;
        for _ in 0..10 {
            now += TICK;
            robot.write_at(now);
        }
        // 10 ticks of 20 ms at 1 m/s^2
        let (left, right) = robot.drivebase_velocity();
        assert!((left - 0.2).abs() < 1e-6, "left {}", left);
        assert!((right + 0.2).abs() < 1e-6, "right {}", right);
    }

    #[test]
    fn test_drivebase_long_gap_is_capped() {
        let mut robot = hardware();
        robot.set_enabled(true);
        let start = Instant::now();
        robot.write_at(start);
        robot.set_command(Joint::LeftTread, 0.5);
        robot.write_at(start + Duration::from_secs(5));
        let (left, _) = robot.drivebase_velocity();
        assert!((left - MAX_TICK_DT).abs() < 1e-6);
    }

    #[test]
    fn test_tread_pwm_within_brownout_budget() {
        let mut robot = hardware();
        robot.set_enabled(true);
        let start = Instant::now();
        robot.write_at(start);
        robot.set_command(Joint::LeftTread, 0.5);
        robot.set_command(Joint::RightTread, 0.5);
        let mut now = start;
        let mut pwm = PwmCommand::neutral();
        for _ in 0..100 {
            now += TICK;
            pwm = robot.write_at(now);
        }
        assert!((pwm.tread_left.abs() + pwm.tread_right.abs() - 1.5).abs() < 1e-6);
        assert_eq!(pwm.tread_left, pwm.tread_right);
    }

    #[test]
    fn test_clear_commands_holds_position() {
        let mut robot = hardware();
        robot.read();
        for joint in Joint::ALL {
            robot.set_command(joint, 3.0);
        }
        robot.clear_commands();

        let states = robot.joint_states();
        assert_eq!(states.command[Joint::LeftTread], 0.0);
        assert_eq!(states.command[Joint::RightTread], 0.0);
        for joint in Joint::ALL.into_iter().filter(|j| !j.is_drive()) {
            assert_eq!(states.command[joint], states.position[joint]);
        }

        // Commanding the current position produces no arm motion
        robot.set_enabled(true);
        let pwm = robot.write();
        assert_eq!(pwm.arm_scoop, 0.0);
        assert_eq!(pwm.arm_turntable, 0.0);
        assert_eq!(pwm.bin_left, 0.0);
        assert_eq!(pwm.tread_left, 0.0);
    }

    #[test]
    fn test_simulation_clamps_to_limits() {
        let limits = JointLimits::new([-1.0; JOINT_COUNT], [1.0; JOINT_COUNT]).unwrap();
        let mut robot = RobotInterface::new(true, limits);
        robot.set_command(Joint::LowerArm, 2.0);
        robot.set_command(Joint::Scoop, -0.5);
        robot.read();

        let position = &robot.joint_states().position;
        assert_eq!(position[Joint::LowerArm], 1.0);
        assert_eq!(position[Joint::Scoop], -0.5);
    }

    #[test]
    fn test_simulation_ignores_sensor_readings() {
        let mut robot = RobotInterface::new(true, JointLimits::unbounded());
        robot.on_arduino_a(reading_a());
        robot.set_command(Joint::Turntable, 2.5);
        robot.read();
        assert_eq!(robot.joint_states().position[Joint::Turntable], 2.5);
    }

    #[test]
    fn test_simulation_reports_commanded_tread_velocity() {
        let mut robot = RobotInterface::new(true, JointLimits::unbounded());
        robot.set_enabled(true);
        let start = Instant::now();
        robot.write_at(start);
        robot.set_command(Joint::LeftTread, 0.3);
        robot.write_at(start + TICK);
        robot.read();
        assert!((robot.joint_states().velocity[Joint::LeftTread] - 0.02).abs() < 1e-6);
    }
}
