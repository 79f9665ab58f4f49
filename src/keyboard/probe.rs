//! Key probes: reusable predicates that report real or simulated key activity

use super::device::normalize;
use crate::error::Result;
use crate::session::{Probe, Session, Signal};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Key name to description mapping shown on the operator display.
///
/// Entries keep their insertion order for display; equality compares the
/// mapping only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyLegend(Vec<(String, String)>);

impl KeyLegend {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (normalize(k.as_ref()), v.into()))
                .collect(),
        )
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn as_map(&self) -> BTreeMap<&str, &str> {
        self.0.iter().map(|(k, d)| (k.as_str(), d.as_str())).collect()
    }

    /// `key - description` per entry
    pub fn lines(&self) -> Vec<String> {
        self.0.iter().map(|(k, d)| format!("{} - {}", k, d)).collect()
    }
}

impl PartialEq for KeyLegend {
    fn eq(&self, other: &Self) -> bool {
        self.as_map() == other.as_map()
    }
}

impl Eq for KeyLegend {}

impl fmt::Display for KeyLegend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join(", "))
    }
}

/// Keys a probe listens for
#[derive(Debug, Clone, PartialEq)]
pub enum KeySpec {
    Keys(Vec<String>),
    /// Keys with descriptions; the probe publishes them as the key legend
    Described(KeyLegend),
}

impl KeySpec {
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Keys(keys.into_iter().map(|k| normalize(k.as_ref())).collect())
    }

    pub fn described<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self::Described(KeyLegend::new(entries))
    }

    fn names(&self) -> Vec<String> {
        match self {
            Self::Keys(keys) => keys.clone(),
            Self::Described(legend) => legend.entries().iter().map(|(k, _)| k.clone()).collect(),
        }
    }
}

/// Probe reporting the first listened-for key that is active.
///
/// Real hardware is checked first. Simulated presses only count while no real
/// key is held, and a simulated match consumes the whole simulated set.
#[derive(Debug, Clone)]
pub struct KeyProbe {
    keys: Vec<String>,
    legend: Option<KeyLegend>,
    legend_published: bool,
    block_until_release: bool,
}

impl KeyProbe {
    pub fn new(spec: KeySpec) -> Self {
        let keys = spec.names();
        let legend = match spec {
            KeySpec::Described(legend) => Some(legend),
            KeySpec::Keys(_) => None,
        };
        Self {
            keys,
            legend,
            legend_published: false,
            block_until_release: false,
        }
    }

    /// After a hardware match, spin until none of the keys is held anymore
    pub fn until_release(mut self) -> Self {
        self.block_until_release = true;
        self
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    fn first_match(&self, down: &[String]) -> Option<String> {
        self.keys.iter().find(|k| down.contains(k)).cloned()
    }

    fn publish_legend(&mut self, session: &mut Session) {
        let Some(legend) = &self.legend else {
            return;
        };
        if !self.legend_published || session.key_legend() != legend {
            session.set_key_legend(legend.clone());
            self.legend_published = true;
        }
    }
}

impl Probe for KeyProbe {
    fn poll(&mut self, session: &mut Session) -> Result<Option<Signal>> {
        self.publish_legend(session);

        let down = session.keyboard_mut().pressed_keys();
        if let Some(hit) = self.first_match(&down) {
            if self.block_until_release {
                loop {
                    std::thread::yield_now();
                    let still = session.keyboard_mut().pressed_keys();
                    if self.first_match(&still).is_none() {
                        break;
                    }
                }
            }
            return Ok(Some(Signal::Key(hit)));
        }

        if down.is_empty() {
            if let Some(hit) = session.key_injector().take_any(&self.keys) {
                return Ok(Some(Signal::Key(hit)));
            }
        }
        Ok(None)
    }
}
