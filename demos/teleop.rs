// Keyboard teleop: W/S drive, A/D turn, R/F speed, E enable toggle, T zero turntable, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use rover_hw_runtime::config::{TOPIC_CMD_ENABLE, TOPIC_CMD_JOINTS, TOPIC_CMD_ZERO_TURNTABLE};
use rover_hw_runtime::hardware::Joint;
use rover_hw_runtime::messages::JointCommand;

const SPEEDS: [f64; 3] = [0.1, 0.25, 0.5]; // m/s per tread
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_cmd = session.declare_publisher(TOPIC_CMD_JOINTS).await?;
    let pub_enable = session.declare_publisher(TOPIC_CMD_ENABLE).await?;
    let pub_zero = session.declare_publisher(TOPIC_CMD_ZERO_TURNTABLE).await?;

    info!("Controls: W/S=drive, A/D=turn, R/F=speed, E=enable, T=zero turntable, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_cmd, &pub_enable, &pub_zero).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    pub_cmd: &zenoh::pubsub::Publisher<'_>,
    pub_enable: &zenoh::pubsub::Publisher<'_>,
    pub_zero: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut enabled = false;

    // Persistent tread state
    let mut left = 0.0;
    let mut right = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let speed = SPEEDS[speed_idx];

                match code {
                    // Movement - update tread velocities and refresh timestamp
                    KeyCode::Char('w') if pressed => {
                        (left, right) = (speed, speed);
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        (left, right) = (-speed, -speed);
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        (left, right) = (-speed, speed);
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        (left, right) = (speed, -speed);
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('e') if kind == KeyEventKind::Press => {
                        enabled = !enabled;
                        info!("Enabled: {}", enabled);
                        pub_enable.put(serde_json::to_string(&enabled)?).await?;
                    }
                    KeyCode::Char('t') if kind == KeyEventKind::Press => {
                        info!("Zeroing turntable");
                        pub_zero.put("{}").await?;
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset velocities if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            left = 0.0;
            right = 0.0;
        }

        // Always publish at ~50Hz so the runtime watchdog stays fed
        let cmd = JointCommand::default()
            .with(Joint::LeftTread, left)
            .with(Joint::RightTread, right);
        pub_cmd.put(serde_json::to_string(&cmd)?).await?;
    }

    if enabled {
        pub_enable.put(serde_json::to_string(&false)?).await?;
    }
    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
