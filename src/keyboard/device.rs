//! Keyboard hardware sources and the simulated key channel

use device_query::{DeviceQuery, DeviceState, Keycode};
use std::cell::Cell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};

/// Canonical form of a key name: trimmed, lowercase
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Source of the currently held keys
pub trait KeyboardDevice {
    /// Names of all keys held down right now, normalized
    fn pressed_keys(&mut self) -> Vec<String>;
}

/// Real keyboard, polled through `device_query`.
///
/// Key names are the lowercased `device_query` key codes: `space`, `escape`,
/// `a`, `key1`, `lshift`, `numpad0`, ...
pub struct SystemKeyboard {
    state: DeviceState,
}

impl SystemKeyboard {
    pub fn new() -> Self {
        Self {
            state: DeviceState::new(),
        }
    }

    fn key_name(key: Keycode) -> String {
        normalize(&format!("{:?}", key))
    }
}

impl Default for SystemKeyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardDevice for SystemKeyboard {
    fn pressed_keys(&mut self) -> Vec<String> {
        self.state
            .get_keys()
            .into_iter()
            .map(Self::key_name)
            .collect()
    }
}

/// Keyboard with no keys, for sessions driven only by simulated input
#[derive(Debug, Default)]
pub struct NoKeyboard;

impl KeyboardDevice for NoKeyboard {
    fn pressed_keys(&mut self) -> Vec<String> {
        Vec::new()
    }
}

/// Replays prepared hardware states, one per poll; empty once exhausted
#[derive(Debug, Default)]
pub struct ScriptedKeyboard {
    frames: VecDeque<Vec<String>>,
    polls: Rc<Cell<usize>>,
}

impl ScriptedKeyboard {
    pub fn new<I, F, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            frames: frames
                .into_iter()
                .map(|f| f.into_iter().map(|k| normalize(k.as_ref())).collect())
                .collect(),
            polls: Rc::new(Cell::new(0)),
        }
    }

    /// Shared counter of how many times the device was polled
    pub fn poll_counter(&self) -> Rc<Cell<usize>> {
        self.polls.clone()
    }
}

impl KeyboardDevice for ScriptedKeyboard {
    fn pressed_keys(&mut self) -> Vec<String> {
        self.polls.set(self.polls.get() + 1);
        self.frames.pop_front().unwrap_or_default()
    }
}

/// Thread-safe handle onto the simulated key-activity set.
///
/// Other threads (signal handlers, remote bridges) press keys here; the
/// session loop consumes them through key probes.
#[derive(Debug, Clone, Default)]
pub struct KeyInjector {
    pressed: Arc<Mutex<HashSet<String>>>,
}

impl KeyInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, key: &str) {
        self.pressed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize(key));
    }

    pub fn is_empty(&self) -> bool {
        self.pressed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// If any of `keys` is pending, clear the whole set and return the first match
    pub fn take_any(&self, keys: &[String]) -> Option<String> {
        let mut pressed = self.pressed.lock().unwrap_or_else(PoisonError::into_inner);
        let hit = keys.iter().find(|k| pressed.contains(*k)).cloned();
        if hit.is_some() {
            pressed.clear();
        }
        hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_frames_then_empty() {
        let mut kb = ScriptedKeyboard::new([vec!["Space"], vec![]]);
        let polls = kb.poll_counter();
        assert_eq!(kb.pressed_keys(), vec!["space"]);
        assert!(kb.pressed_keys().is_empty());
        assert!(kb.pressed_keys().is_empty());
        assert_eq!(polls.get(), 3);
    }

    #[test]
    fn injector_consumes_whole_set_on_match() {
        let injector = KeyInjector::new();
        injector.press("q");
        injector.press("Escape");
        assert_eq!(injector.take_any(&["x".into()]), None);
        assert!(!injector.is_empty());
        assert_eq!(injector.take_any(&["escape".into()]), Some("escape".into()));
        assert!(injector.is_empty());
    }

    #[test]
    fn injector_is_shared_across_threads() {
        let injector = KeyInjector::new();
        let remote = injector.clone();
        std::thread::spawn(move || remote.press("space"))
            .join()
            .unwrap();
        assert_eq!(injector.take_any(&["space".into()]), Some("space".into()));
    }
}
