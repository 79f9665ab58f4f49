//! Integration tests for Stimulus Monitor
//!
//! These tests drive full sessions against the headless toolkit: the select
//! loop, draw mirroring, the status overlay and the teardown handshake.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use stimulus_monitor::config::Options;
use stimulus_monitor::geometry::{Color, Rect};
use stimulus_monitor::keyboard::{KeyLegend, KeyProbe, KeySpec, ScriptedKeyboard};
use stimulus_monitor::render::{
    DrawCall, FlipCheck, HeadlessToolkit, Journal, JournalEntry, Operation, SurfaceId,
};
use stimulus_monitor::session::{from_fn, EventKind, Notification, Placement, Signal};
use stimulus_monitor::{Session, SessionError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

static EXCLUSIVE: Mutex<()> = Mutex::new(());

/// Only one session may be live per process, so session tests take turns
fn exclusive() -> MutexGuard<'static, ()> {
    EXCLUSIVE.lock().unwrap_or_else(PoisonError::into_inner)
}

fn mirrored_options() -> Options {
    let mut options = Options::with_geometry(53.0, 57.0);
    options.display.secondary_screen = Some(1);
    options
}

/// Initialized mirrored session plus the toolkit journal
fn start(toolkit: HeadlessToolkit) -> (Session, Journal) {
    let journal = toolkit.journal();
    let mut session = Session::new(mirrored_options());
    session.initialize(Box::new(toolkit)).unwrap();
    (session, journal)
}

/// Surface ids in open order: primary, secondary, duplicate
fn surfaces(journal: &Journal) -> Vec<SurfaceId> {
    journal
        .entries()
        .into_iter()
        .filter(|e| matches!(e.op, Operation::Open { .. }))
        .map(|e| e.surface)
        .collect()
}

/// Run one select iteration that fires immediately
fn one_tick(session: &mut Session) {
    let mut fire = from_fn(|_| Ok(Some(Signal::Flag)));
    session.select(&mut [&mut fire]).unwrap();
}

fn is_flip_check(entry: &JournalEntry) -> bool {
    matches!(entry.op, Operation::AsyncFlipCheck { .. })
}

fn record(session: &mut Session, kind: EventKind) -> Rc<RefCell<Vec<Notification>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    session.subscribe(kind, move |n| sink.borrow_mut().push(n.clone()));
    seen
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn teardown_waits_out_pending_flip() {
    let _guard = exclusive();
    let toolkit = HeadlessToolkit::dual(800, 600)
        .script_flip_checks([FlipCheck::Pending, FlipCheck::Pending]);
    let (mut session, journal) = start(toolkit);
    one_tick(&mut session);
    assert!(session.flip_pending());

    session.teardown().unwrap();

    let entries = journal.entries();
    assert_eq!(entries.iter().filter(|e| is_flip_check(e)).count(), 3);
    let last_check = entries.iter().rposition(is_flip_check).unwrap();
    let first_close = entries
        .iter()
        .position(|e| e.op == Operation::Close)
        .unwrap();
    assert!(last_check < first_close);
    assert_eq!(journal.count(|e| e.op == Operation::Close), 3);
}

#[test]
fn mismatched_secondary_fails_startup() {
    let _guard = exclusive();
    let toolkit = HeadlessToolkit::new(vec![(1920, 1080), (1280, 1024)]);
    let journal = toolkit.journal();
    let mut session = Session::new(mirrored_options());
    let err = session.initialize(Box::new(toolkit)).unwrap_err();
    assert!(matches!(
        err,
        SessionError::GeometryMismatch {
            primary: (1920, 1080),
            secondary: (1280, 1024)
        }
    ));
    assert!(!session.is_initialized());
    assert_eq!(journal.count(|e| e.op == Operation::Close), 2);

    // The failed attempt must not block a later session
    let mut retry = Session::new(mirrored_options());
    retry
        .initialize(Box::new(HeadlessToolkit::dual(800, 600)))
        .unwrap();
}

#[test]
fn initialized_notification_reports_mirroring() {
    let _guard = exclusive();
    let mut session = Session::new(mirrored_options());
    let seen = record(&mut session, EventKind::Initialized);
    session
        .initialize(Box::new(HeadlessToolkit::dual(640, 480)))
        .unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![Notification::Initialized {
            size: (640, 480),
            mirrored: true
        }]
    );
}

#[test]
fn one_live_session_per_process() {
    let _guard = exclusive();
    let (mut first, _journal) = start(HeadlessToolkit::dual(800, 600));

    let start_elsewhere = || {
        thread::spawn(|| {
            let mut other = Session::new(mirrored_options());
            let result = other.initialize(Box::new(HeadlessToolkit::dual(800, 600)));
            (result.is_ok(), matches!(result, Err(SessionError::AlreadyActive)))
        })
        .join()
        .unwrap()
    };
    assert_eq!(start_elsewhere(), (false, true));

    first.teardown().unwrap();
    assert_eq!(start_elsewhere(), (true, false));
}

#[test]
fn drawing_requires_initialization() {
    let mut session = Session::new(mirrored_options());
    let result = session.screen(DrawCall::Fill {
        color: Color::BLACK,
        rect: None,
    });
    assert!(matches!(result, Err(SessionError::NotInitialized)));
    assert!(matches!(
        session.add_targets(&[Placement::at(0.0, 0.0)], Some(1.0)),
        Err(SessionError::NotInitialized)
    ));
}

// ---------------------------------------------------------------------------
// Dispatch and overlay
// ---------------------------------------------------------------------------

#[test]
fn every_draw_is_announced() {
    let _guard = exclusive();
    let (mut session, _journal) = start(HeadlessToolkit::dual(800, 600));
    let seen = record(&mut session, EventKind::DrawIntercepted);

    session
        .screen(DrawCall::FillOval {
            color: Color::WHITE,
            rect: Rect::sized(20.0, 20.0),
        })
        .unwrap();
    let texture = session
        .screen(DrawCall::MakeTexture {
            width: 1,
            height: 1,
            pixels: vec![255; 4],
        })
        .unwrap()
        .texture()
        .unwrap();
    session.screen(DrawCall::flip()).unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 3);
    assert!(matches!(
        seen[1],
        Notification::DrawIntercepted { created: Some(id), .. } if id == texture
    ));
}

#[test]
fn failing_draw_is_announced_and_propagated() {
    let _guard = exclusive();
    let toolkit = HeadlessToolkit::dual(800, 600).failing_on("Text");
    let (mut session, _journal) = start(toolkit);
    let seen = record(&mut session, EventKind::DrawIntercepted);
    let result = session.screen(DrawCall::Text {
        text: "ready".into(),
        at: Default::default(),
        color: Color::WHITE,
    });
    assert!(matches!(result, Err(SessionError::Toolkit(_))));
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn flipped_frame_reaches_secondary_on_next_tick() {
    let _guard = exclusive();
    let (mut session, journal) = start(HeadlessToolkit::dual(800, 600));
    let ids = surfaces(&journal);
    let (secondary, duplicate) = (ids[1], ids[2]);

    session.screen(DrawCall::flip()).unwrap();
    assert!(session.dirty_flags().underlay);
    journal.clear();
    one_tick(&mut session);

    let ops = journal.for_surface(secondary);
    assert!(matches!(ops[0], Operation::Copy { from, .. } if from == duplicate));
    assert_eq!(ops.last(), Some(&Operation::AsyncFlipBegin));
    assert!(!session.dirty_flags().any());
}

#[test]
fn quiet_tick_redraws_nothing() {
    let _guard = exclusive();
    let (mut session, journal) = start(HeadlessToolkit::dual(800, 600));
    let secondary = surfaces(&journal)[1];
    session.set_state("cue");
    one_tick(&mut session);

    journal.clear();
    one_tick(&mut session);
    assert!(!session.dirty_flags().any());
    let drawn = journal
        .for_surface(secondary)
        .into_iter()
        .filter(|op| matches!(op, Operation::Draw(_) | Operation::Copy { .. }))
        .count();
    assert_eq!(drawn, 0);
}

#[test]
fn targets_are_drawn_over_the_underlay() {
    let _guard = exclusive();
    let (mut session, journal) = start(HeadlessToolkit::dual(800, 600));
    let secondary = surfaces(&journal)[1];
    session.plot_target(-5.0, 0.0, 1.0).unwrap();
    session
        .add_targets(&[Placement::Bounds([1.0, -1.0, 3.0, 1.0])], None)
        .unwrap();
    journal.clear();
    one_tick(&mut session);

    let frames: Vec<_> = journal
        .for_surface(secondary)
        .into_iter()
        .filter(|op| {
            matches!(
                op,
                Operation::Draw(DrawCall::FrameOval { .. } | DrawCall::FrameRect { .. })
            )
        })
        .collect();
    assert_eq!(frames.len(), 2);
    assert!(matches!(frames[0], Operation::Draw(DrawCall::FrameOval { .. })));
}

#[test]
fn offscreen_target_is_clipped_not_dropped() {
    let _guard = exclusive();
    let (mut session, _journal) = start(HeadlessToolkit::dual(800, 600));
    session.plot_target(90.0, 0.0, 1.0).unwrap();
    let target = session.targets()[0];
    assert_eq!(target.rect.right, 800.0);
    assert_eq!(target.rect.left, 800.0);
}

// ---------------------------------------------------------------------------
// Key probes
// ---------------------------------------------------------------------------

#[test]
fn blocking_probe_waits_for_release() {
    let keyboard = ScriptedKeyboard::new([vec!["space"], vec![]]);
    let polls = keyboard.poll_counter();
    let mut session = Session::new(mirrored_options()).with_keyboard(keyboard);
    let mut probe = KeyProbe::new(KeySpec::keys(["space"])).until_release();

    let (slot, signal) = session.select(&mut [&mut probe]).unwrap();
    assert_eq!((slot, signal), (1, Signal::Key("space".into())));
    assert_eq!(polls.get(), 2);
}

#[test]
fn simulated_key_is_consumed() {
    let mut session = Session::new(mirrored_options());
    let mut probe = KeyProbe::new(KeySpec::keys(["q"]));
    session.simulate_keypress("Q");
    session.simulate_keypress("w");

    let (_, signal) = session.select(&mut [&mut probe]).unwrap();
    assert_eq!(signal.key(), Some("q"));
    assert!(session.key_injector().is_empty());
}

#[test]
fn simulated_key_waits_while_hardware_key_is_down() {
    let keyboard = ScriptedKeyboard::new([vec!["shift"], vec!["shift"], vec![]]);
    let mut session = Session::new(mirrored_options()).with_keyboard(keyboard);
    session.simulate_keypress("a");
    let mut probe = KeyProbe::new(KeySpec::keys(["a"]));

    let ticks = Rc::new(Cell::new(0));
    let t = ticks.clone();
    session.set_tick_hook(move || {
        t.set(t.get() + 1);
        Ok(())
    });
    session.select(&mut [&mut probe]).unwrap();
    assert_eq!(ticks.get(), 3);
}

#[test]
fn legend_published_on_first_poll_and_on_change() {
    let mut session = Session::new(mirrored_options());
    let seen = record(&mut session, EventKind::KeyLegendChanged);
    let mut probe = KeyProbe::new(KeySpec::described([("y", "yes"), ("n", "no")]));
    let mut stop = from_fn(|_| Ok(Some(Signal::Flag)));

    session.select(&mut [&mut probe, &mut stop]).unwrap();
    session.select(&mut [&mut probe, &mut stop]).unwrap();
    assert_eq!(seen.borrow().len(), 1);

    session.set_key_legend(KeyLegend::new([("x", "other")]));
    session.select(&mut [&mut probe, &mut stop]).unwrap();
    assert_eq!(seen.borrow().len(), 3);
    assert_eq!(session.key_legend().lines(), vec!["y - yes", "n - no"]);
}

// ---------------------------------------------------------------------------
// Counters and configuration
// ---------------------------------------------------------------------------

#[test]
fn successes_never_exceed_attempts() {
    let mut session = Session::new(mirrored_options());
    let batches: [(&[&str], Vec<bool>); 4] = [
        (&["a", "b"], vec![true, false]),
        (&["a"], vec![false]),
        (&["b", "c"], vec![true, true]),
        (&["a", "b", "c"], vec![true, true, false]),
    ];
    for (categories, outcomes) in batches {
        session.set_trial_info(categories, outcomes).unwrap();
        for (_, count) in session.trial_counts().sorted() {
            assert!(count.successes <= count.attempts);
        }
    }
    let c = session.trial_counts().get("c").unwrap();
    assert_eq!((c.successes, c.attempts), (1, 2));
}

#[test]
fn config_rejects_unknown_and_missing_keys() {
    let _guard = exclusive();
    let unknown = "[display]\nscreen_width_cm = 53.0\nview_distance_cm = 57.0\nrefresh = 60\n";
    assert!(Options::from_toml_str(unknown).is_err());

    let missing = "[display]\nscreen_width_cm = 53.0\n";
    assert!(Options::from_toml_str(missing).is_err());

    let good = "[display]\nscreen_width_cm = 40.0\nview_distance_cm = 60.0\nsecondary_screen = 1\n";
    let options = Options::from_toml_str(good).unwrap();
    let mut session = Session::new(options);
    session
        .initialize(Box::new(HeadlessToolkit::dual(1024, 768)))
        .unwrap();
    assert!(session.snapshot().mirrored);
}
