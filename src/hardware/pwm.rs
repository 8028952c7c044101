// Setpoint to PWM conversion for the rover's actuators
//
// All functions here are stateless. They bound the output duty cycle only;
// range checking of the inputs is the controller layer's job.

use std::f64::consts::{PI, TAU};

// Single actuator joints (bin, scoop)
/// Error below this is treated as "on target" (radians)
pub const ANGLE_DEADBAND: f64 = 0.01;
/// Error at which output reaches full scale (radians)
pub const ANGLE_FULL_SCALE: f64 = 0.35;
/// Maximum duty for linear actuators
pub const ANGLE_MAX_DUTY: f64 = 0.8;

/// Turntable is geared lower, so it saturates sooner and gets more headroom
pub const TURNTABLE_DEADBAND: f64 = 0.01;
pub const TURNTABLE_FULL_SCALE: f64 = 0.2;
pub const TURNTABLE_MAX_DUTY: f64 = 0.92;

/// Twin actuator joints use a tighter deadband on the averaged angle
pub const TWIN_DEADBAND: f64 = 0.005;
pub const TWIN_FULL_SCALE: f64 = 0.35;
pub const TWIN_MAX_DUTY: f64 = 1.0;

/// Drivebase acceleration limit (m/s^2). Anything more snaps a shaft.
pub const DRIVEBASE_MAX_ACCEL: f64 = 1.0;
/// Velocity at full duty (m/s)
pub const DRIVEBASE_MAX_VELOCITY: f64 = 0.5;
/// Velocities below this are commanded as a full stop (m/s)
pub const DRIVEBASE_DEADBAND: f64 = 0.05;

/// Largest combined |left| + |right| tread duty before the supply browns out
pub const BROWNOUT_BUDGET: f64 = 1.5;

/// Acceleration-limited drivebase output for one side
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriveOutput {
    /// Velocity actually commanded this tick after acceleration limiting (m/s)
    pub velocity: f64,
    /// Duty cycle in [-1, 1]
    pub pwm: f64,
}

/// Proportional duty with a deadband and a saturation limit
fn proportional(error: f64, deadband: f64, full_scale: f64, max_duty: f64) -> f64 {
    if !error.is_finite() || error.abs() <= deadband {
        return 0.0;
    }
    error.signum() * (error.abs() / full_scale).min(max_duty)
}

/// Wrap an angle into (-pi, pi]
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

/// PWM for an independently driven angle joint
pub fn angle_to_pwm(desired: f64, measured: f64) -> f64 {
    proportional(desired - measured, ANGLE_DEADBAND, ANGLE_FULL_SCALE, ANGLE_MAX_DUTY)
}

/// PWM for the turntable, taking the shortest way around
pub fn turntable_angle_to_pwm(desired: f64, measured: f64) -> f64 {
    proportional(
        wrap_angle(desired - measured),
        TURNTABLE_DEADBAND,
        TURNTABLE_FULL_SCALE,
        TURNTABLE_MAX_DUTY,
    )
}

/// PWM for a joint driven by two coupled actuators
///
/// Error is taken against the mean of both sides and the same duty goes to
/// both motors, so the pair never fights itself.
pub fn twin_angle_to_pwm(desired: f64, measured_left: f64, measured_right: f64) -> (f64, f64) {
    let measured = (measured_left + measured_right) / 2.0;
    let duty = proportional(desired - measured, TWIN_DEADBAND, TWIN_FULL_SCALE, TWIN_MAX_DUTY);
    (duty, duty)
}

/// Acceleration-limited drivebase velocity to PWM
///
/// # Arguments
/// * `v_target` - Requested velocity in m/s
/// * `v_previous` - Velocity commanded on the previous tick in m/s
/// * `dt` - Seconds since the previous tick
///
/// # Returns
/// The velocity after limiting the change to `DRIVEBASE_MAX_ACCEL * dt`, and
/// its duty cycle
pub fn drivebase_velocity_to_pwm(v_target: f64, v_previous: f64, dt: f64) -> DriveOutput {
    // Bad setpoints stop the tread
    let v_target = if v_target.is_finite() { v_target } else { 0.0 };
    let max_delta = DRIVEBASE_MAX_ACCEL * dt.max(0.0);
    let velocity = v_previous + (v_target - v_previous).clamp(-max_delta, max_delta);

    let pwm = if velocity.abs() <= DRIVEBASE_DEADBAND {
        0.0
    } else {
        (velocity / DRIVEBASE_MAX_VELOCITY).clamp(-1.0, 1.0)
    };
    DriveOutput { velocity, pwm }
}

/// Shrink a simultaneous pair of duties to fit the brownout budget
///
/// Signs and the a:b ratio are preserved.
pub fn scale_pwm(pwm_a: f64, pwm_b: f64) -> (f64, f64) {
    let total = pwm_a.abs() + pwm_b.abs();
    if total <= BROWNOUT_BUDGET {
        return (pwm_a, pwm_b);
    }
    let scale = BROWNOUT_BUDGET / total;
    (pwm_a * scale, pwm_b * scale)
}
