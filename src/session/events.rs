//! Notification registry
//!
//! Subscribers are registered per [`EventKind`] and called synchronously, in
//! registration order, on the thread that runs the session.

use crate::keyboard::KeyLegend;
use crate::render::{DrawCall, TextureId};
use std::collections::HashMap;

/// Names of the notifications a session emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Tick,
    DrawIntercepted,
    StateChanged,
    KeyLegendChanged,
    TrialCountersChanged,
    TargetsChanged,
    Initialized,
}

/// A notification with its payload
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// One multiplexer iteration is about to evaluate its probes
    Tick,
    /// A draw call reached the primary surface; `created` is set for resource creation
    DrawIntercepted {
        call: DrawCall,
        created: Option<TextureId>,
    },
    StateChanged { label: String },
    KeyLegendChanged { legend: KeyLegend },
    /// Categories touched by one increment batch
    TrialCountersChanged { categories: Vec<String> },
    TargetsChanged { count: usize },
    Initialized { size: (u32, u32), mirrored: bool },
}

impl Notification {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Tick => EventKind::Tick,
            Self::DrawIntercepted { .. } => EventKind::DrawIntercepted,
            Self::StateChanged { .. } => EventKind::StateChanged,
            Self::KeyLegendChanged { .. } => EventKind::KeyLegendChanged,
            Self::TrialCountersChanged { .. } => EventKind::TrialCountersChanged,
            Self::TargetsChanged { .. } => EventKind::TargetsChanged,
            Self::Initialized { .. } => EventKind::Initialized,
        }
    }
}

pub type Subscriber = Box<dyn FnMut(&Notification)>;

/// Publish-subscribe registry keyed by event kind
#[derive(Default)]
pub struct EventBus {
    subscribers: HashMap<EventKind, Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: EventKind, callback: impl FnMut(&Notification) + 'static) {
        self.subscribers
            .entry(kind)
            .or_default()
            .push(Box::new(callback));
    }

    pub fn publish(&mut self, notification: &Notification) {
        if let Some(list) = self.subscribers.get_mut(&notification.kind()) {
            for callback in list.iter_mut() {
                callback(notification);
            }
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.get(&kind).map_or(0, Vec::len)
    }
}
