//! Operator console widgets

use crate::session::{SessionSnapshot, TrialCount};
use crate::utils::as_millis_f64;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Session state, key legend and targets
pub struct MonitorPanel<'a> {
    snapshot: &'a SessionSnapshot,
    title: &'a str,
}

impl<'a> MonitorPanel<'a> {
    pub fn new(snapshot: &'a SessionSnapshot, title: &'a str) -> Self {
        Self { snapshot, title }
    }
}

impl<'a> Widget for MonitorPanel<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title(self.title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White));

        let inner = block.inner(area);
        block.render(area, buf);

        let label = Style::default().fg(Color::White).add_modifier(Modifier::BOLD);
        let state = if self.snapshot.state.is_empty() {
            "-"
        } else {
            self.snapshot.state.as_str()
        };
        let mut lines = vec![
            Line::from(vec![
                Span::styled("State: ", label),
                Span::styled(state, Style::default().fg(Color::Cyan)),
            ]),
            Line::from(vec![
                Span::styled("Targets: ", label),
                Span::raw(self.snapshot.targets.to_string()),
            ]),
            Line::from(Span::styled("Keys:", label)),
        ];
        let key_style = Style::default().fg(Color::Yellow);
        lines.extend(
            self.snapshot
                .legend
                .iter()
                .map(|entry| Line::from(Span::styled(format!("  {}", entry), key_style))),
        );

        for (i, line) in lines.iter().enumerate() {
            if i as u16 >= inner.height {
                break;
            }
            buf.set_line(inner.x, inner.y + i as u16, line, inner.width);
        }
    }
}

/// Trial scoreboard with per-category success rates
pub struct ScoreboardPanel<'a> {
    trials: &'a [(String, TrialCount)],
}

impl<'a> ScoreboardPanel<'a> {
    pub fn new(trials: &'a [(String, TrialCount)]) -> Self {
        Self { trials }
    }

    fn rate_color(count: &TrialCount) -> Color {
        match count.percent() {
            p if p >= 75.0 => Color::Green,
            p if p >= 50.0 => Color::Yellow,
            _ => Color::Red,
        }
    }
}

impl<'a> Widget for ScoreboardPanel<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title("Trials")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White));

        let inner = block.inner(area);
        block.render(area, buf);

        let mut y = inner.y;
        for (name, count) in self.trials {
            if y >= inner.y + inner.height {
                break;
            }

            let line = Line::from(vec![
                Span::styled(
                    format!("{}: ", name),
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                ),
                Span::styled(count.to_string(), Style::default().fg(Self::rate_color(count))),
            ]);

            buf.set_line(inner.x, y, &line, inner.width);
            y += 1;
        }
    }
}

/// Status bar widget
pub struct StatusBar<'a> {
    snapshot: &'a SessionSnapshot,
    message: Option<&'a str>,
}

impl<'a> StatusBar<'a> {
    pub fn new(snapshot: &'a SessionSnapshot) -> Self {
        Self {
            snapshot,
            message: None,
        }
    }

    pub fn message(mut self, message: Option<&'a str>) -> Self {
        self.message = message;
        self
    }
}

impl<'a> Widget for StatusBar<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bg_style = Style::default().bg(Color::DarkGray).fg(Color::White);
        for x in area.x..area.x + area.width {
            buf.set_string(x, area.y, " ", bg_style);
        }

        let display = match self.snapshot.display_size {
            Some((w, h)) if self.snapshot.mirrored => format!("{}x{} mirrored", w, h),
            Some((w, h)) => format!("{}x{}", w, h),
            None => "not initialized".to_string(),
        };
        let left = format!(" {} ", display);
        buf.set_string(area.x, area.y, &left, bg_style.add_modifier(Modifier::BOLD));

        if let Some(msg) = self.message {
            let msg_style = Style::default().bg(Color::DarkGray).fg(Color::Yellow);
            let msg_x = area.x + (area.width / 2).saturating_sub(msg.len() as u16 / 2);
            buf.set_string(msg_x, area.y, msg, msg_style);
        }

        let worst_tick = self
            .snapshot
            .last_select
            .as_ref()
            .and_then(|s| s.tick.max)
            .map_or_else(|| "-".to_string(), |d| format!("{:.2} ms", as_millis_f64(d)));
        let right = format!(
            " flip {} | tick {} | {}s ",
            if self.snapshot.flip_pending { "pending" } else { "idle" },
            worst_tick,
            self.snapshot.uptime.as_secs()
        );
        let right_x = area.x + area.width.saturating_sub(right.len() as u16);
        buf.set_string(right_x, area.y, &right, bg_style);
    }
}
