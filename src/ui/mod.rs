//! Terminal operator console

mod widgets;

pub use widgets::*;
