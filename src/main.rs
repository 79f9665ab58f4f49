//! Stimulus Monitor - demo presentation loop
//!
//! Runs a left/right target task against the in-memory toolkit, reads the
//! real keyboard and shows the session on a terminal operator console.

use anyhow::{Context, Result};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{info, warn};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};
use std::{
    cell::Cell,
    io::{stdout, Stdout},
    rc::Rc,
    time::{Duration, Instant},
};

use stimulus_monitor::{
    config::Options,
    geometry::{Color, Point, Rect},
    keyboard::{KeyProbe, KeySpec, SystemKeyboard},
    render::{DrawCall, HeadlessToolkit},
    session::{arm, TimerProbe},
    ui::{MonitorPanel, ScoreboardPanel, StatusBar},
    Session,
};

type Console = Terminal<CrosstermBackend<Stdout>>;

const TRIALS: usize = 20;
const RESPONSE_WINDOW: Duration = Duration::from_secs(2);
const TARGET_ECCENTRICITY_DEG: f64 = 8.0;

enum Response {
    Key(String),
    Timeout,
}

fn main() -> Result<()> {
    env_logger::init();

    let options = Options::load().unwrap_or_else(|e| {
        warn!("using default options: {}", e);
        let mut options = Options::with_geometry(53.0, 57.0);
        options.display.secondary_screen = Some(1);
        options
    });

    let mut session = Session::new(options).with_keyboard(SystemKeyboard::new());
    session
        .initialize(Box::new(HeadlessToolkit::dual(1920, 1080)))
        .context("initializing displays")?;

    // Ctrl-C ends the run through the same path as the escape key
    let injector = session.key_injector().clone();
    ctrlc::set_handler(move || injector.press("escape"))?;

    let device_ticks = Rc::new(Cell::new(0u64));
    let counter = device_ticks.clone();
    session.set_tick_hook(move || {
        counter.set(counter.get() + 1);
        Ok(())
    });

    let start = Instant::now();
    session.set_gaze_source(move || {
        let t = start.elapsed().as_secs_f64();
        Point::new(960.0 + 300.0 * t.cos(), 540.0 + 200.0 * t.sin())
    });

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(out))?;

    let outcome = run(&mut session, &mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    outcome?;

    let report = session.report();
    session.teardown()?;

    let filename = format!(
        "stimulus_report_{}.json",
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    );
    report.export_json(std::path::Path::new(&filename))?;

    println!("\nStimulus Monitor session complete.");
    for entry in &report.trials {
        println!(
            "  {}: {}/{} ({:.0}%)",
            entry.category, entry.successes, entry.attempts, entry.percent
        );
    }
    println!("Device ticks: {}", device_ticks.get());
    println!("Report written to {}", filename);

    Ok(())
}

fn run(session: &mut Session, terminal: &mut Console) -> Result<()> {
    let mut keys = KeyProbe::new(KeySpec::described([
        ("left", "target on the left"),
        ("right", "target on the right"),
        ("escape", "quit"),
    ]))
    .until_release();

    for trial in 0..TRIALS {
        let side = if trial % 3 == 1 { "left" } else { "right" };
        let x = if side == "left" {
            -TARGET_ECCENTRICITY_DEG
        } else {
            TARGET_ECCENTRICITY_DEG
        };

        session.set_state(format!("trial {} fixation", trial + 1));
        present_fixation(session)?;

        session.plot_target(x, 0.0, 1.5)?;
        session.set_state(format!("trial {} respond", trial + 1));

        let mut timeout = TimerProbe::after(RESPONSE_WINDOW);
        let response = session.cselect(vec![
            arm(&mut keys, |_, signal| {
                Ok(Response::Key(signal.key().unwrap_or_default().to_string()))
            }),
            arm(&mut timeout, |_, _| Ok(Response::Timeout)),
        ])?;
        session.clear_targets();

        match response {
            Response::Key(key) if key == "escape" => {
                info!("run aborted at trial {}", trial + 1);
                break;
            }
            Response::Key(key) => {
                session.set_trial_info(&[side, "all"], key == side)?;
            }
            Response::Timeout => {
                session.set_trial_info(&[side, "all"], false)?;
            }
        }

        draw_console(session, terminal)?;
    }

    session.set_state("done");
    draw_console(session, terminal)
}

fn present_fixation(session: &mut Session) -> Result<()> {
    let geometry = session.geometry()?;
    let dot = Rect::around(geometry.center(), geometry.angle_to_pixels(0.25));
    session.screen(DrawCall::FillOval {
        color: Color::WHITE,
        rect: dot,
    })?;
    session.screen(DrawCall::flip())?;
    Ok(())
}

fn draw_console(session: &Session, terminal: &mut Console) -> Result<()> {
    let snapshot = session.snapshot();
    terminal.draw(|frame| {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(6), Constraint::Length(1)])
            .split(frame.area());
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(rows[0]);

        frame.render_widget(MonitorPanel::new(&snapshot, " Session "), columns[0]);
        frame.render_widget(ScoreboardPanel::new(&snapshot.trials), columns[1]);
        frame.render_widget(
            StatusBar::new(&snapshot).message(Some("left/right to respond, esc to quit")),
            rows[1],
        );
    })?;
    Ok(())
}
