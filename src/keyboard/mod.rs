//! Keyboard input: hardware polling, simulated presses and key probes

mod device;
mod probe;

pub use device::{
    normalize, KeyInjector, KeyboardDevice, NoKeyboard, ScriptedKeyboard, SystemKeyboard,
};
pub use probe::{KeyLegend, KeyProbe, KeySpec};
