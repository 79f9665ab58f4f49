//! Event multiplexer: polls probes once per loop iteration until one fires

use super::Session;
use crate::error::{Result, SessionError};
use crate::utils::{as_millis_f64, MinMaxExt};
use log::info;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Value reported by a probe that fired
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Name of the key that matched
    Key(String),
    /// Time since the timer was armed
    Elapsed(Duration),
    Value(f64),
    Text(String),
    Flag,
}

impl Signal {
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Key(k) => Some(k),
            _ => None,
        }
    }
}

/// A non-blocking predicate evaluated by [`Session::select`].
///
/// `Ok(None)` means "not yet" and must return quickly. A probe may block
/// only after it has decided to fire.
pub trait Probe {
    fn poll(&mut self, session: &mut Session) -> Result<Option<Signal>>;
}

/// Probe backed by a closure, see [`from_fn`]
pub struct FnProbe<F>(F);

/// Wrap a closure as a probe
pub fn from_fn<F>(f: F) -> FnProbe<F>
where
    F: FnMut(&mut Session) -> Result<Option<Signal>>,
{
    FnProbe(f)
}

impl<F> Probe for FnProbe<F>
where
    F: FnMut(&mut Session) -> Result<Option<Signal>>,
{
    fn poll(&mut self, session: &mut Session) -> Result<Option<Signal>> {
        (self.0)(session)
    }
}

/// Fires once a deadline has passed
#[derive(Debug, Clone, Copy)]
pub struct TimerProbe {
    armed: Instant,
    deadline: Instant,
}

impl TimerProbe {
    pub fn after(delay: Duration) -> Self {
        let now = Instant::now();
        Self {
            armed: now,
            deadline: now + delay,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl Probe for TimerProbe {
    fn poll(&mut self, _session: &mut Session) -> Result<Option<Signal>> {
        let now = Instant::now();
        if now >= self.deadline {
            Ok(Some(Signal::Elapsed(now.duration_since(self.armed))))
        } else {
            Ok(None)
        }
    }
}

/// Accumulated timing of one phase of the loop
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseTiming {
    pub calls: u64,
    pub total: Duration,
    pub max: Option<Duration>,
}

impl PhaseTiming {
    fn record(&mut self, elapsed: Duration) {
        self.calls += 1;
        self.total += elapsed;
        self.max.update_max(elapsed);
    }

    pub fn mean(&self) -> Option<Duration> {
        (self.calls > 0).then(|| self.total / self.calls as u32)
    }
}

/// Timing collected by an instrumented `select` call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectStats {
    pub iterations: u64,
    pub elapsed: Duration,
    /// Tick hook, notification and overlay update
    pub tick: PhaseTiming,
    /// One entry per probe slot
    pub probes: Vec<PhaseTiming>,
    /// 1-based slot that ended the loop
    pub matched: Option<usize>,
}

impl SelectStats {
    fn new(slots: usize) -> Self {
        Self {
            probes: vec![PhaseTiming::default(); slots],
            ..Self::default()
        }
    }

    /// Loop iterations per second
    pub fn frequency_hz(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (secs > 0.0).then(|| self.iterations as f64 / secs)
    }

    fn log_summary(&self) {
        info!(
            "select: {} iterations in {:.2} ms ({}), matched slot {:?}",
            self.iterations,
            as_millis_f64(self.elapsed),
            self.frequency_hz()
                .map_or_else(|| "n/a".to_string(), |hz| format!("{:.0} Hz", hz)),
            self.matched,
        );
        info!(
            "select: tick total {:.3} ms, worst {:.3} ms",
            as_millis_f64(self.tick.total),
            self.tick.max.map_or(0.0, as_millis_f64),
        );
        for (i, slot) in self.probes.iter().enumerate() {
            info!(
                "select: probe {} called {}x, total {:.3} ms, worst {:.3} ms",
                i + 1,
                slot.calls,
                as_millis_f64(slot.total),
                slot.max.map_or(0.0, as_millis_f64),
            );
        }
    }
}

/// A probe paired with the action run when it wins a [`Session::cselect`]
pub struct Arm<'a, R> {
    probe: &'a mut dyn Probe,
    action: Box<dyn FnOnce(&mut Session, Signal) -> Result<R> + 'a>,
}

pub fn arm<'a, R>(
    probe: &'a mut dyn Probe,
    action: impl FnOnce(&mut Session, Signal) -> Result<R> + 'a,
) -> Arm<'a, R> {
    Arm {
        probe,
        action: Box::new(action),
    }
}

impl Session {
    /// Run loop iterations until a probe fires.
    ///
    /// Each iteration calls the tick hook, publishes [`Notification::Tick`]
    /// (which drives the status overlay) and then polls the probes in order.
    /// Returns the 1-based position of the first probe that fired together
    /// with its signal; lower positions win ties.
    ///
    /// [`Notification::Tick`]: crate::session::Notification::Tick
    pub fn select(&mut self, probes: &mut [&mut dyn Probe]) -> Result<(usize, Signal)> {
        if probes.is_empty() {
            return Err(SessionError::invalid("select needs at least one probe"));
        }

        let mut stats = self
            .options
            .select
            .instrument
            .then(|| SelectStats::new(probes.len()));
        let started = Instant::now();

        loop {
            let tick_start = stats.is_some().then(Instant::now);
            self.tick()?;
            if let (Some(s), Some(t)) = (stats.as_mut(), tick_start) {
                s.iterations += 1;
                s.tick.record(t.elapsed());
            }

            for (i, probe) in probes.iter_mut().enumerate() {
                let probe_start = stats.is_some().then(Instant::now);
                let fired = probe.poll(self)?;
                if let (Some(s), Some(t)) = (stats.as_mut(), probe_start) {
                    s.probes[i].record(t.elapsed());
                }

                if let Some(signal) = fired {
                    if let Some(mut s) = stats.take() {
                        s.elapsed = started.elapsed();
                        s.matched = Some(i + 1);
                        s.log_summary();
                        self.last_select_stats = Some(s);
                    }
                    return Ok((i + 1, signal));
                }
            }
        }
    }

    /// `select` over the arms' probes, then run the winning arm's action
    pub fn cselect<R>(&mut self, arms: Vec<Arm<'_, R>>) -> Result<R> {
        if arms.is_empty() {
            return Err(SessionError::invalid("cselect needs at least one probe/action pair"));
        }

        let (mut probes, mut actions): (Vec<_>, Vec<_>) =
            arms.into_iter().map(|a| (a.probe, a.action)).unzip();
        let (slot, signal) = self.select(&mut probes)?;
        let action = actions.swap_remove(slot - 1);
        action(self, signal)
    }
}
