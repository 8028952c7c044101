// Real-time hardware layer for the rover: joint commands in, actuator duty
// cycles out, sensor feedback back into joint state.

pub mod config;
pub mod hardware;
pub mod messages;
pub mod runtime;
