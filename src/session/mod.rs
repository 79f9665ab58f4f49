//! Session controller
//!
//! A [`Session`] owns the display surfaces, the status-overlay state and the
//! notification registry. All mutation happens on the thread that runs
//! [`Session::select`]; other threads reach the loop only through a
//! [`KeyInjector`].

mod events;
mod select;
mod targets;
mod trials;

pub use events::{EventBus, EventKind, Notification, Subscriber};
pub use select::{arm, from_fn, Arm, FnProbe, PhaseTiming, Probe, SelectStats, Signal, TimerProbe};
pub use targets::{resolve, Placement, Shape, Target, TargetStore};
pub use trials::{Outcomes, TrialCount, TrialCounters};

use crate::config::Options;
use crate::error::{Result, SessionError};
use crate::geometry::DisplayGeometry;
use crate::keyboard::{KeyInjector, KeyLegend, KeyboardDevice, NoKeyboard};
use crate::render::{
    Compositor, DirtyFlags, Dispatcher, DrawCall, DrawOutcome, GazeSource, Mirror,
    OverlayContent, OverlayLayout, OverlayStyle, SurfaceId, Toolkit,
};
use crate::report::SessionReport;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Set while a session is initialized; one per process
static ACTIVE: AtomicBool = AtomicBool::new(false);

type TickHook = Box<dyn FnMut() -> Result<()>>;

/// Surfaces and derived layout, present only between initialize and teardown
struct Live {
    toolkit: Box<dyn Toolkit>,
    dispatcher: Dispatcher,
    geometry: DisplayGeometry,
    layout: Option<OverlayLayout>,
}

impl Live {
    /// Open all surfaces and clear the primary to the background. Anything
    /// opened is closed again when a later step fails.
    fn open(options: &Options, mut toolkit: Box<dyn Toolkit>) -> Result<Self> {
        let display = &options.display;
        let primary = toolkit.open_window(display.primary_screen)?;
        let size = match toolkit.surface_size(primary) {
            Ok(size) => size,
            Err(e) => {
                let _ = toolkit.close(primary);
                return Err(e.into());
            }
        };

        let mirror = match display.secondary_screen {
            Some(screen) => match open_mirror(toolkit.as_mut(), screen, size) {
                Ok(mirror) => Some(mirror),
                Err(e) => {
                    let _ = toolkit.close(primary);
                    return Err(e);
                }
            },
            None => None,
        };

        let background = options.background();
        let mut live = Live {
            toolkit,
            dispatcher: Dispatcher::new(primary, mirror, background),
            geometry: DisplayGeometry::new(
                size.0,
                size.1,
                display.screen_width_cm,
                display.view_distance_cm,
            ),
            layout: mirror.map(|_| OverlayLayout::new(size, &options.overlay)),
        };
        let fill = DrawCall::Fill {
            color: background,
            rect: None,
        };
        if let Err(e) = live.toolkit.execute(primary, &fill) {
            let _ = live.close_all();
            return Err(e.into());
        }
        Ok(live)
    }

    /// Close every surface, reporting the first failure
    fn close_all(&mut self) -> Result<()> {
        let mut result = Ok(());
        for surface in self.surfaces() {
            if let Err(e) = self.toolkit.close(surface) {
                warn!("closing {:?} failed: {}", surface, e);
                result = result.and(Err(e.into()));
            }
        }
        result
    }

    fn surfaces(&self) -> Vec<SurfaceId> {
        let mut ids = Vec::with_capacity(3);
        if let Some(mirror) = self.dispatcher.mirror() {
            ids.push(mirror.duplicate);
            ids.push(mirror.secondary);
        }
        ids.push(self.dispatcher.primary());
        ids
    }
}

/// Point-in-time view of a session for consoles and reports
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub initialized: bool,
    pub mirrored: bool,
    pub display_size: Option<(u32, u32)>,
    pub state: String,
    pub legend: Vec<String>,
    pub trials: Vec<(String, TrialCount)>,
    pub targets: usize,
    #[serde(skip)]
    pub dirty: DirtyFlags,
    pub flip_pending: bool,
    pub uptime: Duration,
    pub last_select: Option<SelectStats>,
}

/// The presentation session
pub struct Session {
    options: Options,
    keyboard: Box<dyn KeyboardDevice>,
    injector: KeyInjector,
    live: Option<Live>,
    state: String,
    legend: KeyLegend,
    trials: TrialCounters,
    targets: TargetStore,
    compositor: Compositor,
    bus: EventBus,
    tick_hook: Option<TickHook>,
    gaze: Option<Box<dyn GazeSource>>,
    last_select_stats: Option<SelectStats>,
    started: Instant,
}

impl Session {
    /// Create an uninitialized session with no keyboard attached
    pub fn new(options: Options) -> Self {
        let style = OverlayStyle::from(&options.overlay);
        Self {
            options,
            keyboard: Box::new(NoKeyboard),
            injector: KeyInjector::new(),
            live: None,
            state: String::new(),
            legend: KeyLegend::default(),
            trials: TrialCounters::new(),
            targets: TargetStore::new(),
            compositor: Compositor::new(style),
            bus: EventBus::new(),
            tick_hook: None,
            gaze: None,
            last_select_stats: None,
            started: Instant::now(),
        }
    }

    pub fn with_keyboard(mut self, keyboard: impl KeyboardDevice + 'static) -> Self {
        self.keyboard = Box::new(keyboard);
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn is_initialized(&self) -> bool {
        self.live.is_some()
    }

    /// Open the primary window and, if configured, the secondary window plus
    /// its offscreen duplicate.
    ///
    /// Fails with [`SessionError::GeometryMismatch`] when the two displays
    /// differ in resolution, and with [`SessionError::AlreadyActive`] when
    /// another session is live anywhere in the process.
    pub fn initialize(&mut self, toolkit: Box<dyn Toolkit>) -> Result<()> {
        if self.live.is_some() {
            return Err(SessionError::AlreadyActive);
        }
        self.options.validate()?;
        if ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::AlreadyActive);
        }

        let live = match Live::open(&self.options, toolkit) {
            Ok(live) => live,
            Err(e) => {
                ACTIVE.store(false, Ordering::Release);
                return Err(e);
            }
        };
        let geometry = live.geometry;
        let size = (geometry.width_px, geometry.height_px);
        let mirrored = live.dispatcher.mirror().is_some();
        self.live = Some(live);
        self.compositor.reset();

        info!(
            "session initialized: {}x{} px, {:.1} px/deg, mirror {}",
            size.0,
            size.1,
            geometry.angle_to_pixels(1.0),
            if mirrored { "on" } else { "off" }
        );
        self.emit(Notification::Initialized { size, mirrored });
        Ok(())
    }

    /// Wait for any pending overlay flip, then close every surface.
    /// Does nothing on a session that is not initialized.
    pub fn teardown(&mut self) -> Result<()> {
        let Some(mut live) = self.live.take() else {
            return Ok(());
        };

        if let Some(mirror) = live.dispatcher.mirror().copied() {
            let polls = self
                .compositor
                .await_flip(live.toolkit.as_mut(), mirror.secondary);
            debug!("teardown waited {} flip polls", polls);
        }
        self.compositor.reset();

        let result = live.close_all();
        ACTIVE.store(false, Ordering::Release);
        info!(
            "session torn down after {:.1} s",
            self.started.elapsed().as_secs_f64()
        );
        result
    }

    /// One multiplexer iteration's housekeeping: tick hook, tick
    /// notification, overlay update
    fn tick(&mut self) -> Result<()> {
        if let Some(hook) = self.tick_hook.as_mut() {
            hook()?;
        }
        self.emit(Notification::Tick);

        let Some(live) = self.live.as_mut() else {
            return Ok(());
        };
        let (Some(mirror), Some(layout)) = (live.dispatcher.mirror().copied(), live.layout)
        else {
            return Ok(());
        };
        let content = OverlayContent {
            targets: self.targets.as_slice(),
            state: &self.state,
            legend: &self.legend,
            trials: &self.trials,
        };
        self.compositor.tick(
            live.toolkit.as_mut(),
            &mirror,
            &layout,
            &content,
            self.gaze.as_mut(),
        )?;
        Ok(())
    }

    fn emit(&mut self, notification: Notification) {
        self.compositor.observe(&notification);
        self.bus.publish(&notification);
    }

    /// Issue a draw call against the primary surface
    pub fn screen(&mut self, call: DrawCall) -> Result<DrawOutcome> {
        let live = self.live.as_mut().ok_or(SessionError::NotInitialized)?;
        // only subscribers care about intercepted draws
        let bus = &mut self.bus;
        let listening = bus.subscriber_count(EventKind::DrawIntercepted) > 0;
        let mut announce = |n: Notification| bus.publish(&n);
        let notify: Option<&mut dyn FnMut(Notification)> = if listening {
            Some(&mut announce)
        } else {
            None
        };
        let dispatched = live
            .dispatcher
            .dispatch(live.toolkit.as_mut(), call, notify)?;
        if dispatched.mirrored {
            self.compositor.mark_underlay();
        }
        Ok(dispatched.outcome)
    }

    /// Change the state label; unchanged labels are ignored silently
    pub fn set_state(&mut self, label: impl Into<String>) {
        let label = label.into();
        if label == self.state {
            return;
        }
        debug!("state: {:?} -> {:?}", self.state, label);
        self.state = label.clone();
        self.emit(Notification::StateChanged { label });
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn set_key_legend(&mut self, legend: KeyLegend) {
        debug!("key legend: {}", legend);
        self.legend = legend.clone();
        self.emit(Notification::KeyLegendChanged { legend });
    }

    pub fn key_legend(&self) -> &KeyLegend {
        &self.legend
    }

    /// Record one trial outcome per category; see [`TrialCounters::increment`]
    pub fn set_trial_info<S: AsRef<str>>(
        &mut self,
        categories: &[S],
        outcomes: impl Into<Outcomes>,
    ) -> Result<()> {
        let touched = self.trials.increment(categories, outcomes)?;
        debug!("trials updated: {:?}", touched);
        self.emit(Notification::TrialCountersChanged { categories: touched });
        Ok(())
    }

    pub fn trial_counts(&self) -> &TrialCounters {
        &self.trials
    }

    /// Add targets given in degrees from the screen center
    pub fn add_targets(
        &mut self,
        placements: &[Placement],
        radius_deg: Option<f64>,
    ) -> Result<usize> {
        let geometry = self.geometry()?;
        let resolved = resolve(&geometry, placements, radius_deg)?;
        debug!("adding {} targets", resolved.len());
        self.targets.extend(resolved);
        self.targets_changed();
        Ok(self.targets.len())
    }

    /// Add one circular target
    pub fn plot_target(&mut self, x_deg: f64, y_deg: f64, radius_deg: f64) -> Result<()> {
        self.add_targets(&[Placement::at(x_deg, y_deg)], Some(radius_deg))
            .map(|_| ())
    }

    pub fn clear_targets(&mut self) {
        debug!("clearing {} targets", self.targets.len());
        self.targets.clear();
        self.targets_changed();
    }

    fn targets_changed(&mut self) {
        self.compositor.mark_underlay();
        self.emit(Notification::TargetsChanged {
            count: self.targets.len(),
        });
    }

    pub fn targets(&self) -> &[Target] {
        self.targets.as_slice()
    }

    pub fn geometry(&self) -> Result<DisplayGeometry> {
        self.live
            .as_ref()
            .map(|l| l.geometry)
            .ok_or(SessionError::NotInitialized)
    }

    /// Visual angle in degrees to on-screen pixels
    pub fn angle_to_pixels(&self, degrees: f64) -> Result<f64> {
        Ok(self.geometry()?.angle_to_pixels(degrees))
    }

    pub fn subscribe(&mut self, kind: EventKind, callback: impl FnMut(&Notification) + 'static) {
        self.bus.subscribe(kind, callback);
    }

    /// Callback run at the start of every `select` iteration; an error aborts the loop
    pub fn set_tick_hook(&mut self, hook: impl FnMut() -> Result<()> + 'static) {
        self.tick_hook = Some(Box::new(hook));
    }

    pub fn clear_tick_hook(&mut self) {
        self.tick_hook = None;
    }

    pub fn set_gaze_source(&mut self, source: impl GazeSource + 'static) {
        self.gaze = Some(Box::new(source));
    }

    /// Mark a key as pressed for the next key probe that listens for it
    pub fn simulate_keypress(&self, key: &str) {
        self.injector.press(key);
    }

    /// Handle for pressing simulated keys from other threads
    pub fn key_injector(&self) -> &KeyInjector {
        &self.injector
    }

    pub(crate) fn keyboard_mut(&mut self) -> &mut dyn KeyboardDevice {
        self.keyboard.as_mut()
    }

    /// Timing of the last instrumented `select`, if instrumentation is enabled
    pub fn last_select_stats(&self) -> Option<&SelectStats> {
        self.last_select_stats.as_ref()
    }

    pub fn dirty_flags(&self) -> DirtyFlags {
        self.compositor.dirty()
    }

    pub fn flip_pending(&self) -> bool {
        self.compositor.flip_pending()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let display_size = self
            .live
            .as_ref()
            .map(|l| (l.geometry.width_px, l.geometry.height_px));
        SessionSnapshot {
            initialized: self.live.is_some(),
            mirrored: self
                .live
                .as_ref()
                .is_some_and(|l| l.dispatcher.mirror().is_some()),
            display_size,
            state: self.state.clone(),
            legend: self.legend.lines(),
            trials: self
                .trials
                .sorted()
                .into_iter()
                .map(|(name, count)| (name.to_string(), count))
                .collect(),
            targets: self.targets.len(),
            dirty: self.compositor.dirty(),
            flip_pending: self.compositor.flip_pending(),
            uptime: self.started.elapsed(),
            last_select: self.last_select_stats.clone(),
        }
    }

    pub fn report(&self) -> SessionReport {
        SessionReport::new(&self.snapshot())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("teardown on drop failed: {}", e);
        }
    }
}

/// Open the secondary window and its duplicate, checking both displays match
fn open_mirror(toolkit: &mut dyn Toolkit, screen: usize, size: (u32, u32)) -> Result<Mirror> {
    let secondary = toolkit.open_window(screen)?;
    let secondary_size = toolkit.surface_size(secondary)?;
    if secondary_size != size {
        let _ = toolkit.close(secondary);
        return Err(SessionError::GeometryMismatch {
            primary: size,
            secondary: secondary_size,
        });
    }
    let duplicate = match toolkit.open_offscreen(size.0, size.1) {
        Ok(id) => id,
        Err(e) => {
            let _ = toolkit.close(secondary);
            return Err(e.into());
        }
    };
    Ok(Mirror {
        secondary,
        duplicate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Color;
    use crate::render::{HeadlessToolkit, Operation};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use std::thread;

    static EXCLUSIVE: Mutex<()> = Mutex::new(());

    /// Serializes tests that initialize a session
    fn exclusive() -> MutexGuard<'static, ()> {
        EXCLUSIVE.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn options() -> Options {
        let mut options = Options::with_geometry(53.0, 57.0);
        options.display.secondary_screen = Some(1);
        options
    }

    fn live_session() -> Session {
        let mut s = Session::new(options());
        s.initialize(Box::new(HeadlessToolkit::dual(1024, 768))).unwrap();
        s
    }

    fn record(s: &mut Session, kind: EventKind) -> Rc<RefCell<Vec<Notification>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        s.subscribe(kind, move |n| sink.borrow_mut().push(n.clone()));
        seen
    }

    #[test]
    fn draw_before_initialize_fails() {
        let mut s = Session::new(options());
        assert!(matches!(
            s.screen(DrawCall::flip()),
            Err(SessionError::NotInitialized)
        ));
        assert!(matches!(s.angle_to_pixels(1.0), Err(SessionError::NotInitialized)));
    }

    #[test]
    fn second_session_on_thread_is_rejected() {
        let _guard = exclusive();
        let mut first = live_session();
        let mut second = Session::new(options());
        assert!(matches!(
            second.initialize(Box::new(HeadlessToolkit::dual(1024, 768))),
            Err(SessionError::AlreadyActive)
        ));
        first.teardown().unwrap();
        second
            .initialize(Box::new(HeadlessToolkit::dual(1024, 768)))
            .unwrap();
    }

    #[test]
    fn second_session_on_other_thread_is_rejected() {
        let _guard = exclusive();
        let mut first = live_session();

        let attempt = || {
            thread::spawn(|| {
                let mut other = Session::new(options());
                match other.initialize(Box::new(HeadlessToolkit::dual(1024, 768))) {
                    Ok(()) => "initialized",
                    Err(SessionError::AlreadyActive) => "already active",
                    Err(_) => "other error",
                }
            })
            .join()
            .unwrap()
        };
        assert_eq!(attempt(), "already active");

        first.teardown().unwrap();
        assert_eq!(attempt(), "initialized");
    }

    #[test]
    fn failed_background_fill_closes_surfaces() {
        let _guard = exclusive();
        let toolkit = HeadlessToolkit::dual(800, 600).failing_on("Fill");
        let journal = toolkit.journal();
        let mut s = Session::new(options());
        assert!(matches!(
            s.initialize(Box::new(toolkit)),
            Err(SessionError::Toolkit(_))
        ));
        assert!(!s.is_initialized());
        assert_eq!(journal.count(|e| e.op == Operation::Close), 3);

        // the claim is released, so a fresh session can start
        let mut next = Session::new(options());
        next.initialize(Box::new(HeadlessToolkit::dual(800, 600)))
            .unwrap();
    }

    #[test]
    fn teardown_is_idempotent() {
        let _guard = exclusive();
        let mut s = live_session();
        s.teardown().unwrap();
        s.teardown().unwrap();
        assert!(!s.is_initialized());
    }

    #[test]
    fn initialize_fills_primary_with_background() {
        let _guard = exclusive();
        let toolkit = HeadlessToolkit::dual(800, 600);
        let journal = toolkit.journal();
        let mut options = options();
        options.display.background = [10, 20, 30];
        let mut s = Session::new(options);
        s.initialize(Box::new(toolkit)).unwrap();

        let primary = journal.entries()[0].surface;
        assert!(journal.for_surface(primary).contains(&Operation::Draw(DrawCall::Fill {
            color: Color::rgb(10, 20, 30),
            rect: None
        })));
    }

    #[test]
    fn set_state_notifies_only_on_change() {
        let mut s = Session::new(options());
        let seen = record(&mut s, EventKind::StateChanged);
        s.set_state("fixation");
        s.set_state("fixation");
        s.set_state("response");
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(s.state(), "response");
    }

    #[test]
    fn trial_batch_notifies_once() {
        let mut s = Session::new(options());
        let seen = record(&mut s, EventKind::TrialCountersChanged);
        s.set_trial_info(&["left", "all"], true).unwrap();
        assert_eq!(seen.borrow().len(), 1);
        assert!(s.set_trial_info(&["left", "all"], vec![true]).is_err());
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(s.trial_counts().get("all"), Some(TrialCount { successes: 1, attempts: 1 }));
    }

    #[test]
    fn targets_mark_underlay_and_notify() {
        let _guard = exclusive();
        let mut s = live_session();
        let seen = record(&mut s, EventKind::TargetsChanged);
        s.plot_target(0.0, 0.0, 1.0).unwrap();
        assert!(s.dirty_flags().underlay);
        s.clear_targets();
        assert_eq!(
            *seen.borrow(),
            vec![
                Notification::TargetsChanged { count: 1 },
                Notification::TargetsChanged { count: 0 }
            ]
        );
    }

    #[test]
    fn clear_then_add_yields_exact_count() {
        let _guard = exclusive();
        let mut s = live_session();
        s.add_targets(&[Placement::at(1.0, 1.0), Placement::at(-1.0, 1.0)], Some(0.5))
            .unwrap();
        s.clear_targets();
        let placements = [Placement::at(0.0, 0.0); 3];
        assert_eq!(s.add_targets(&placements, Some(0.5)).unwrap(), 3);
        assert_eq!(s.targets().len(), 3);
    }

    #[test]
    fn mirrored_flip_marks_underlay() {
        let _guard = exclusive();
        let mut s = live_session();
        assert!(!s.dirty_flags().underlay);
        s.screen(DrawCall::flip()).unwrap();
        assert!(s.dirty_flags().underlay);
    }

    #[test]
    fn snapshot_reflects_session() {
        let _guard = exclusive();
        let mut s = live_session();
        s.set_state("cue");
        s.set_trial_info(&["b", "a"], vec![true, false]).unwrap();
        let snap = s.snapshot();
        assert!(snap.initialized && snap.mirrored);
        assert_eq!(snap.display_size, Some((1024, 768)));
        assert_eq!(snap.state, "cue");
        assert_eq!(snap.trials[0].0, "a");
        assert!(snap.dirty.state && snap.dirty.trials);
    }
}
