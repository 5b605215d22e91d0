//! Prayer times screen rendering
//!
//! Renders the day's six times with the current prayer highlighted, the
//! countdown to the next one, both calendar dates and the location.

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::{App, AppState};
use crate::data::{PrayerName, PrayerTimesData};
use crate::time::format_prayer_time;

/// Renders the whole screen for the current state
pub fn render(frame: &mut Frame, app: &App) {
    match &app.state {
        AppState::Loading => render_message(frame, "Loading prayer times...", Color::Cyan),
        AppState::Error(reason) => render_message(frame, reason, Color::Red),
        AppState::Ready => render_ready(frame, app),
    }

    if app.show_help {
        super::help_overlay::render(frame);
    }
}

/// Renders a single centered message
fn render_message(frame: &mut Frame, message: &str, color: Color) {
    let area = frame.area();

    // Center the message vertically
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(45),
            Constraint::Length(3),
            Constraint::Percentage(45),
        ])
        .split(area);

    let text = Paragraph::new(message.to_string())
        .style(Style::default().fg(color))
        .alignment(Alignment::Center);

    frame.render_widget(text, chunks[1]);
}

fn render_ready(frame: &mut Frame, app: &App) {
    let Some(data) = &app.data else {
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Header
            Constraint::Length(4), // Countdown
            Constraint::Min(8),    // Prayer list
            Constraint::Length(1), // Help text
        ])
        .split(frame.area());

    render_header(frame, data, chunks[0]);
    render_countdown(frame, app, chunks[1]);
    render_prayers(frame, app, data, chunks[2]);
    render_footer(frame, app, chunks[3]);
}

/// Location plus Gregorian and Hijri dates
fn render_header(frame: &mut Frame, data: &PrayerTimesData, area: Rect) {
    let gregorian = &data.date.gregorian;
    let separator = "─".repeat((area.width as usize).saturating_sub(2));

    let lines = vec![
        Line::from(vec![
            Span::styled(
                "PRAYERCLOCK",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(data.location.label(), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::styled(
                format!(
                    "{} {} {} {}",
                    gregorian.weekday, gregorian.day, gregorian.month, gregorian.year
                ),
                Style::default().fg(Color::White),
            ),
            Span::raw("  "),
            Span::styled(
                data.date.hijri.formatted(),
                Style::default().fg(Color::Yellow),
            ),
        ]),
        Line::from(Span::styled(
            format!("{} · Asr: {}", data.meta.method.name, data.meta.school),
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(Span::styled(
            separator,
            Style::default().fg(Color::DarkGray),
        )),
    ];

    frame.render_widget(Paragraph::new(lines), area);
}

fn render_countdown(frame: &mut Frame, app: &App, area: Rect) {
    let lines = match &app.countdown {
        Some(state) => vec![
            Line::from(vec![
                Span::styled("Now: ", Style::default().fg(Color::Gray)),
                Span::styled(
                    state.current.display_name(),
                    Style::default()
                        .fg(Color::Green)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled("   Next: ", Style::default().fg(Color::Gray)),
                Span::styled(state.next.display_name(), Style::default().fg(Color::Cyan)),
            ]),
            Line::from(Span::styled(
                state.formatted.to_string(),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )),
        ],
        None => vec![Line::from(Span::styled(
            "--:--:--",
            Style::default().fg(Color::DarkGray),
        ))],
    };

    let paragraph = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(paragraph, area);
}

fn render_prayers(frame: &mut Frame, app: &App, data: &PrayerTimesData, area: Rect) {
    let current = app.countdown.as_ref().map(|c| c.current);

    let lines: Vec<Line> = data
        .prayers
        .iter()
        .map(|prayer| {
            let is_current = current == Some(prayer.key);
            let marker = if is_current { "▶ " } else { "  " };
            let style = if is_current {
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD)
            } else if prayer.key == PrayerName::Sunrise {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::White)
            };

            Line::from(vec![
                Span::styled(marker, style),
                Span::styled(format!("{:<10}", prayer.name), style),
                Span::styled(format!("{:<8}", prayer.name_arabic), style),
                Span::styled(
                    format!("{:>9}", format_prayer_time(&prayer.time, app.time_format)),
                    style,
                ),
            ])
        })
        .collect();

    let block = Block::default()
        .title(" Prayer Times ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// Key hints with data freshness
fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::styled(
        "r refresh · t 12h/24h · ? help · q quit",
        Style::default().fg(Color::DarkGray),
    )];

    if app.refreshing {
        spans.push(Span::styled("  Refreshing…", Style::default().fg(Color::Cyan)));
    } else if app.is_stale {
        spans.push(Span::styled("  ⚠ Stale data", Style::default().fg(Color::Yellow)));
    } else if let Some(at) = app.last_refresh {
        spans.push(Span::styled(
            format!("  Updated {}", at.format("%H:%M")),
            Style::default().fg(Color::DarkGray),
        ));
    }

    if let Some(error) = &app.last_error {
        spans.push(Span::styled(
            format!("  {}", error),
            Style::default().fg(Color::Red),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
