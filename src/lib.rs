//! Stimulus Monitor - dual-display stimulus presentation with an operator overlay
//!
//! A single control loop polls probes (keys, timers, device callbacks),
//! draws to the subject's display and mirrors each presented frame to an
//! operator display that carries target markers, the current state, the key
//! legend and a trial scoreboard.

pub mod config;
pub mod error;
pub mod geometry;
pub mod keyboard;
pub mod render;
pub mod report;
pub mod session;
pub mod ui;
pub mod utils;

pub use config::Options;
pub use error::{Result, SessionError};
pub use session::Session;
