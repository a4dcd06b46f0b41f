//! Background heartbeat: pins, closes and weekly automatic proposals.

pub mod heartbeat;

pub use heartbeat::{BeatReport, Heartbeat, due_target, trigger_instant};
