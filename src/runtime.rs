// Fixed-rate control loop with command watchdog
// Each tick: drain bus messages, read(), apply setpoints, write(), publish.
// If the controller layer stops sending setpoints the watchdog clears
// commands so the treads stop and the arm holds where it is.

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, warn};
use zenoh::sample::Sample;

use crate::config::{
    CMD_TIMEOUT, RuntimeSettings, TOPIC_CMD_ENABLE, TOPIC_CMD_JOINTS, TOPIC_CMD_ZERO_TURNTABLE,
    TOPIC_HEALTH, TOPIC_JOINT_STATES, TOPIC_LEFT_CANGO, TOPIC_LEFT_COUNTER, TOPIC_LEFT_VELOCITY,
    TOPIC_MOTOR_OUTPUT, TOPIC_RIGHT_CANGO, TOPIC_RIGHT_COUNTER, TOPIC_RIGHT_VELOCITY,
    TOPIC_SENSORS_A, TOPIC_SENSORS_B,
};
use crate::hardware::{Joint, RobotHardware, RobotInterface, VelocityAccumulator};
use crate::messages::{
    ArduinoAReading, ArduinoBReading, JointCommand, JointStateMsg, PwmCommand, RuntimeHealth,
};

/// Everything produced by one control tick
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub pwm: PwmCommand,
    pub joint_states: JointStateMsg,
    pub health: RuntimeHealth,
}

pub struct Runtime<H> {
    hardware: H,
    latest_cmd: Option<JointCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl<H: RobotHardware> Runtime<H> {
    pub fn new(hardware: H) -> Self {
        Self {
            hardware,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Process incoming setpoints
    pub fn on_command(&mut self, cmd: JointCommand, now: Instant) {
        debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = now;
    }

    /// Enable or disable actuation. Disabling also clears commands so
    /// re-enabling never jumps to an old setpoint.
    pub fn on_enable(&mut self, enabled: bool) {
        if !enabled {
            self.hardware.clear_commands();
            self.latest_cmd = None;
        }
        self.hardware.set_enabled(enabled);
    }

    /// Copy setpoints into the command array, or clear it if they are stale
    fn apply_commands(&mut self, now: Instant) {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);

        let fresh = self.latest_cmd.as_ref().filter(|_| cmd_age <= CMD_TIMEOUT);

        if let Some(cmd) = fresh {
            if self.health == RuntimeHealth::CmdStale {
                info!("Commands resumed");
            }
            self.health = RuntimeHealth::Ok;
            let commands = self.hardware.commands_mut();
            for (&joint, &value) in &cmd.setpoints {
                commands[joint] = value;
            }
        } else {
            // Watchdog triggered - stop the treads and hold the arm
            if self.health == RuntimeHealth::Ok {
                warn!("Command stale ({:?} old), stopping robot", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            self.latest_cmd = None;
            self.hardware.clear_commands();
        }
    }

    /// Run one control tick
    pub fn step(&mut self, now: Instant) -> TickOutput {
        self.hardware.read();
        self.apply_commands(now);
        let pwm = self.hardware.write();

        let health = if self.hardware.is_enabled() {
            self.health
        } else {
            RuntimeHealth::Disabled
        };

        TickOutput {
            pwm,
            joint_states: JointStateMsg::from(self.hardware.joint_states()),
            health,
        }
    }
}

/// Feed a pulse-count accumulator from a bus sample. Runs on a Zenoh thread.
fn accumulate_sample(accumulator: &VelocityAccumulator, sample: &Sample) {
    let payload = sample.payload().to_bytes();
    match serde_json::from_slice::<i32>(&payload) {
        Ok(delta) => accumulator.accumulate(delta),
        Err(e) => warn!("Failed to parse pulse count on {}: {}", sample.key_expr(), e),
    }
}

pub async fn run(
    settings: RuntimeSettings,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    let hardware = RobotInterface::new(settings.simulate, settings.limits);
    for handle in hardware.registered_joints() {
        debug!("Registered {} ({:?})", handle.name, handle.interface);
    }

    info!("Setting up publishers and subscribers...");
    // Pulse counts are accumulated directly in the callback
    let (left_acc, right_acc) = hardware.velocity_accumulators();
    let _left_counter = session
        .declare_subscriber(TOPIC_LEFT_COUNTER)
        .callback(move |sample| accumulate_sample(&left_acc, &sample))
        .await?;
    let _right_counter = session
        .declare_subscriber(TOPIC_RIGHT_COUNTER)
        .callback(move |sample| accumulate_sample(&right_acc, &sample))
        .await?;

    let sub_sensors_a = session.declare_subscriber(TOPIC_SENSORS_A).await?;
    let sub_sensors_b = session.declare_subscriber(TOPIC_SENSORS_B).await?;
    let sub_cmd = session.declare_subscriber(TOPIC_CMD_JOINTS).await?;
    let sub_enable = session.declare_subscriber(TOPIC_CMD_ENABLE).await?;
    let sub_zero = session.declare_subscriber(TOPIC_CMD_ZERO_TURNTABLE).await?;

    let pub_motor = session.declare_publisher(TOPIC_MOTOR_OUTPUT).await?;
    let pub_left_cango = session.declare_publisher(TOPIC_LEFT_CANGO).await?;
    let pub_right_cango = session.declare_publisher(TOPIC_RIGHT_CANGO).await?;
    let pub_joint_states = session.declare_publisher(TOPIC_JOINT_STATES).await?;
    let pub_left_velocity = session.declare_publisher(TOPIC_LEFT_VELOCITY).await?;
    let pub_right_velocity = session.declare_publisher(TOPIC_RIGHT_VELOCITY).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(hardware);
    let loop_hz = settings.loop_hz.max(1);
    let mut tick = interval(Duration::from_micros(1_000_000 / loop_hz));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout, {}",
        loop_hz,
        CMD_TIMEOUT.as_millis(),
        if settings.simulate { "simulated" } else { "hardware" }
    );
    info!(
        "Subscribed to: {}, {}, {}, {}, {}, {}, {}",
        TOPIC_SENSORS_A,
        TOPIC_SENSORS_B,
        TOPIC_LEFT_COUNTER,
        TOPIC_RIGHT_COUNTER,
        TOPIC_CMD_JOINTS,
        TOPIC_CMD_ENABLE,
        TOPIC_CMD_ZERO_TURNTABLE
    );
    info!("Publishing to: {}, {}, {}", TOPIC_MOTOR_OUTPUT, TOPIC_JOINT_STATES, TOPIC_HEALTH);

    loop {
        tick.tick().await;
        let now = Instant::now();

        // 1. Drain all pending messages (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_sensors_a.try_recv() {
            match serde_json::from_slice::<ArduinoAReading>(&sample.payload().to_bytes()) {
                Ok(reading) => runtime.hardware_mut().on_arduino_a(reading),
                Err(e) => warn!("Failed to parse sensor set A: {}", e),
            }
        }
        while let Ok(Some(sample)) = sub_sensors_b.try_recv() {
            match serde_json::from_slice::<ArduinoBReading>(&sample.payload().to_bytes()) {
                Ok(reading) => runtime.hardware_mut().on_arduino_b(reading),
                Err(e) => warn!("Failed to parse sensor set B: {}", e),
            }
        }
        while let Ok(Some(sample)) = sub_enable.try_recv() {
            match serde_json::from_slice::<bool>(&sample.payload().to_bytes()) {
                Ok(enabled) => runtime.on_enable(enabled),
                Err(e) => warn!("Failed to parse enable request: {}", e),
            }
        }
        while let Ok(Some(_)) = sub_zero.try_recv() {
            runtime.hardware_mut().zero_turntable();
        }
        while let Ok(Some(sample)) = sub_cmd.try_recv() {
            match serde_json::from_slice::<JointCommand>(&sample.payload().to_bytes()) {
                Ok(cmd) => runtime.on_command(cmd, now),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. read -> commands (includes watchdog) -> write
        let output = runtime.step(now);

        // 3. Publish actuation
        pub_motor.put(serde_json::to_string(&output.pwm)?).await?;
        let (left_cango, right_cango) = output.pwm.tread_cango();
        pub_left_cango.put(serde_json::to_string(&left_cango)?).await?;
        pub_right_cango.put(serde_json::to_string(&right_cango)?).await?;

        // 4. Publish state, telemetry and health
        let velocity = runtime.hardware().joint_states().velocity;
        pub_left_velocity.put(serde_json::to_string(&velocity[Joint::LeftTread])?).await?;
        pub_right_velocity.put(serde_json::to_string(&velocity[Joint::RightTread])?).await?;
        pub_joint_states.put(serde_json::to_string(&output.joint_states)?).await?;
        pub_health.put(serde_json::to_string(&output.health)?).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{JOINT_COUNT, JointLimits};

    fn sim_runtime() -> Runtime<RobotInterface> {
        let limits = JointLimits::new([-1.0; JOINT_COUNT], [1.0; JOINT_COUNT]).unwrap();
        Runtime::new(RobotInterface::new(true, limits))
    }

    #[test]
    fn test_starts_stale_and_disabled() {
        let mut runtime = sim_runtime();
        let out = runtime.step(Instant::now());
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
        assert_eq!(out.health, RuntimeHealth::Disabled);
        assert_eq!(out.pwm, PwmCommand::neutral());
        assert_eq!(out.joint_states.joints.len(), JOINT_COUNT);
    }

    #[test]
    fn test_fresh_command_is_applied() {
        let mut runtime = sim_runtime();
        runtime.on_enable(true);
        let now = Instant::now();
        runtime.on_command(JointCommand::default().with(Joint::Scoop, 0.5), now);

        let out = runtime.step(now);
        assert_eq!(out.health, RuntimeHealth::Ok);
        assert!(out.pwm.enabled);
        assert_eq!(runtime.hardware().joint_states().command[Joint::Scoop], 0.5);

        // Simulated position follows the command on the next read
        let out = runtime.step(now + Duration::from_millis(20));
        let scoop = &out.joint_states.joints[Joint::Scoop.index()];
        assert_eq!(scoop.name, "scoop_joint");
        assert_eq!(scoop.position, 0.5);
    }

    #[test]
    fn test_out_of_range_command_clamped() {
        let mut runtime = sim_runtime();
        runtime.on_enable(true);
        let now = Instant::now();
        runtime.on_command(JointCommand::default().with(Joint::UpperArm, 2.0), now);
        runtime.step(now);
        let out = runtime.step(now + Duration::from_millis(20));
        assert_eq!(out.joint_states.joints[Joint::UpperArm.index()].position, 1.0);
    }

    #[test]
    fn test_watchdog_clears_stale_commands() {
        let mut runtime = sim_runtime();
        runtime.on_enable(true);
        let now = Instant::now();
        runtime.on_command(
            JointCommand::default()
                .with(Joint::LeftTread, 0.4)
                .with(Joint::Bin, 0.3),
            now,
        );
        runtime.step(now);
        runtime.step(now + Duration::from_millis(20));
        assert_eq!(runtime.health(), RuntimeHealth::Ok);

        let late = now + CMD_TIMEOUT + Duration::from_millis(1);
        let out = runtime.step(late);
        assert_eq!(out.health, RuntimeHealth::CmdStale);
        let command = &runtime.hardware().joint_states().command;
        assert_eq!(command[Joint::LeftTread], 0.0);
        // Bin holds where it got to
        assert_eq!(command[Joint::Bin], 0.3);
    }

    #[test]
    fn test_disable_forces_neutral() {
        let mut runtime = sim_runtime();
        runtime.on_enable(true);
        let now = Instant::now();
        runtime.on_command(JointCommand::default().with(Joint::LeftTread, 0.5), now);
        runtime.step(now);

        runtime.on_enable(false);
        let out = runtime.step(now + Duration::from_millis(20));
        assert_eq!(out.pwm, PwmCommand::neutral());
        assert_eq!(out.health, RuntimeHealth::Disabled);
    }
}
