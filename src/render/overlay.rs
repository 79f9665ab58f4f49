//! Operator status overlay
//!
//! The secondary display shows the last presented primary frame with target
//! markers on top, and a text band at the bottom holding the state label, the
//! key legend and the trial scoreboard. Regions are redrawn only when their
//! dirty flag is set, and a new asynchronous flip is never started while the
//! previous one is still in flight.

use super::dispatch::Mirror;
use super::toolkit::{DrawCall, SurfaceId, Toolkit, ToolkitError};
use crate::config::OverlayOptions;
use crate::geometry::{Color, Point, Rect};
use crate::keyboard::KeyLegend;
use crate::session::{Notification, Shape, Target, TrialCounters};
use log::{trace, warn};

/// Source of the current gaze position in primary-surface pixels
pub trait GazeSource {
    fn position(&mut self) -> Point;
}

impl<F: FnMut() -> Point> GazeSource for F {
    fn position(&mut self) -> Point {
        self()
    }
}

/// Which status regions need a redraw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    pub underlay: bool,
    pub state: bool,
    pub legend: bool,
    pub trials: bool,
}

impl DirtyFlags {
    pub fn any(&self) -> bool {
        self.underlay || self.state || self.legend || self.trials
    }
}

/// Region placement on the secondary display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayLayout {
    /// Mirrored area above the text band
    pub viewable: Rect,
    pub state: Rect,
    pub legend: Rect,
    pub scoreboard: Rect,
    /// Text lines that fit in one band column
    pub capacity: usize,
    line_height: f64,
    padding: f64,
}

impl OverlayLayout {
    pub fn new((width, height): (u32, u32), options: &OverlayOptions) -> Self {
        let (w, h) = (width as f64, height as f64);
        let band = (options.status_band_px as f64).min(h);
        let top = h - band;
        let padding = options.padding_px as f64;
        let line_height = options.line_height_px as f64;
        let capacity = ((band - 2.0 * padding) / line_height).floor().max(0.0) as usize;

        Self {
            viewable: Rect::new(0.0, 0.0, w, top),
            state: Rect::new(0.0, top, w * 0.25, h),
            legend: Rect::new(w * 0.25, top, w * 0.625, h),
            scoreboard: Rect::new(w * 0.625, top, w, h),
            capacity,
            line_height,
            padding,
        }
    }

    fn line_origin(&self, region: &Rect, line: usize) -> Point {
        Point::new(
            region.left + self.padding,
            region.top + self.padding + line as f64 * self.line_height,
        )
    }
}

/// Colors and pen sizes of the overlay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub band: Color,
    pub text: Color,
    pub target: Color,
    pub target_pen: f64,
    pub trail_from: Color,
    pub trail_to: Color,
    pub trail_width: f64,
}

impl From<&OverlayOptions> for OverlayStyle {
    fn from(o: &OverlayOptions) -> Self {
        Self {
            band: Color::BLACK,
            text: o.text_color.into(),
            target: o.target_color.into(),
            target_pen: o.target_pen_px,
            trail_from: o.trail_from.into(),
            trail_to: o.trail_to.into(),
            trail_width: o.trail_width_px,
        }
    }
}

/// Everything the overlay displays, borrowed from the session
pub struct OverlayContent<'a> {
    pub targets: &'a [Target],
    pub state: &'a str,
    pub legend: &'a KeyLegend,
    pub trials: &'a TrialCounters,
}

/// Redraws the secondary display from dirty flags
#[derive(Debug)]
pub struct Compositor {
    style: OverlayStyle,
    dirty: DirtyFlags,
    flip_pending: bool,
    last_gaze: Option<Point>,
}

impl Compositor {
    pub fn new(style: OverlayStyle) -> Self {
        Self {
            style,
            dirty: DirtyFlags::default(),
            flip_pending: false,
            last_gaze: None,
        }
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn flip_pending(&self) -> bool {
        self.flip_pending
    }

    /// Set the dirty flag a domain notification affects
    pub fn observe(&mut self, notification: &Notification) {
        match notification {
            Notification::TargetsChanged { .. } => self.dirty.underlay = true,
            Notification::StateChanged { .. } => self.dirty.state = true,
            Notification::KeyLegendChanged { .. } => self.dirty.legend = true,
            Notification::TrialCountersChanged { .. } => self.dirty.trials = true,
            _ => {}
        }
    }

    /// A new primary frame was copied to the duplicate surface
    pub fn mark_underlay(&mut self) {
        self.dirty.underlay = true;
    }

    /// Poll the pending flip without blocking; `true` when a new one may start.
    /// A failed query counts as finished so a lost flip cannot wedge the overlay.
    fn flip_settled(&mut self, toolkit: &mut dyn Toolkit, secondary: SurfaceId) -> bool {
        if !self.flip_pending {
            return true;
        }
        match toolkit.async_flip_done(secondary) {
            Ok(done) => {
                self.flip_pending = !done;
                done
            }
            Err(e) => {
                warn!("flip status query failed, assuming idle: {}", e);
                self.flip_pending = false;
                true
            }
        }
    }

    /// One overlay update. Returns the regions redrawn, or `None` when skipped
    /// because the previous flip is still pending.
    pub fn tick(
        &mut self,
        toolkit: &mut dyn Toolkit,
        mirror: &Mirror,
        layout: &OverlayLayout,
        content: &OverlayContent<'_>,
        gaze: Option<&mut Box<dyn GazeSource>>,
    ) -> Result<Option<DirtyFlags>, ToolkitError> {
        let screen = mirror.secondary;
        if !self.flip_settled(toolkit, screen) {
            return Ok(None);
        }

        let redrawn = self.dirty;
        if self.dirty.underlay {
            toolkit.copy_region(
                mirror.duplicate,
                screen,
                Some(layout.viewable),
                Some(layout.viewable),
            )?;
            for target in content.targets {
                toolkit.execute(screen, &self.target_call(target))?;
            }
            self.dirty.underlay = false;
        }

        if self.dirty.state {
            self.draw_lines(toolkit, screen, layout, &layout.state, &[content.state.to_string()])?;
            self.dirty.state = false;
        }

        if self.dirty.legend {
            self.draw_lines(toolkit, screen, layout, &layout.legend, &content.legend.lines())?;
            self.dirty.legend = false;
        }

        if self.dirty.trials {
            let lines = content.trials.scoreboard_lines();
            self.draw_lines(toolkit, screen, layout, &layout.scoreboard, &lines)?;
            self.dirty.trials = false;
        }

        if let Some(source) = gaze {
            let current = source.position().clamp_to(&layout.viewable);
            toolkit.execute(screen, &self.trail_call(current))?;
            self.last_gaze = Some(current);
        }

        toolkit.begin_async_flip(screen)?;
        self.flip_pending = true;
        if redrawn.any() {
            trace!("overlay redrew {:?}", redrawn);
        }
        Ok(Some(redrawn))
    }

    /// Busy-poll until the pending flip completes. Returns the number of polls.
    pub fn await_flip(&mut self, toolkit: &mut dyn Toolkit, secondary: SurfaceId) -> usize {
        let mut polls = 0;
        while self.flip_pending {
            polls += 1;
            if !self.flip_settled(toolkit, secondary) {
                std::hint::spin_loop();
            }
        }
        polls
    }

    /// Forget per-display state after the surfaces are gone
    pub fn reset(&mut self) {
        self.dirty = DirtyFlags::default();
        self.flip_pending = false;
    }

    fn target_call(&self, target: &Target) -> DrawCall {
        let (color, rect, pen_width) = (self.style.target, target.rect, self.style.target_pen);
        match target.shape {
            Shape::Oval => DrawCall::FrameOval { color, rect, pen_width },
            Shape::Rect => DrawCall::FrameRect { color, rect, pen_width },
        }
    }

    fn trail_call(&self, current: Point) -> DrawCall {
        match self.last_gaze {
            Some(previous) => DrawCall::Lines {
                points: vec![previous, current],
                colors: vec![self.style.trail_from, self.style.trail_to],
                width: self.style.trail_width,
            },
            None => DrawCall::Dots {
                points: vec![current],
                colors: vec![self.style.trail_to],
                size: self.style.trail_width,
            },
        }
    }

    /// Clear a band region and write as many lines as fit; the rest are dropped
    fn draw_lines(
        &self,
        toolkit: &mut dyn Toolkit,
        screen: SurfaceId,
        layout: &OverlayLayout,
        region: &Rect,
        lines: &[String],
    ) -> Result<(), ToolkitError> {
        toolkit.execute(
            screen,
            &DrawCall::Fill {
                color: self.style.band,
                rect: Some(*region),
            },
        )?;
        for (i, line) in lines.iter().take(layout.capacity).enumerate() {
            toolkit.execute(
                screen,
                &DrawCall::Text {
                    text: line.clone(),
                    at: layout.line_origin(region, i),
                    color: self.style.text,
                },
            )?;
        }
        Ok(())
    }
}
