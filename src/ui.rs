//! Terminal UI rendering
//!
//! This module handles all UI rendering using Ratatui: the creation form,
//! the tracked creation, the quick-action panel, toasts and modals.

use crate::app::{App, ConfirmAction, FormField, InputMode};
use crate::notify::{Notification, Severity};
use crate::panel_api::QuickAction;
use crate::tracker::{TrackerPhase, TrackerSnapshot};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Gauge, Paragraph, Wrap},
    Frame,
};
use std::time::Duration;

const TOAST_WIDTH: u16 = 48;
const TOAST_HEIGHT: u16 = 3;

/// Captions cycled while a creation is tracked.
const PROVISIONING_STEPS: [&str; 7] = [
    "Preparing environment...",
    "Allocating CPU & RAM...",
    "Creating virtual disk...",
    "Installing operating system...",
    "Configuring network...",
    "Booting virtual machine...",
    "Finalizing setup...",
];
const STEP_PERIOD: Duration = Duration::from_secs(20);

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(0)
        .constraints([
            Constraint::Length(3), // Title & Status Bar
            Constraint::Min(12),   // Form and tracking panels
            Constraint::Length(2), // Command hints
        ])
        .split(frame.area());

    draw_title_and_status(frame, chunks[0], app);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    draw_creation_form(frame, body[0], app);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(9), Constraint::Min(6)])
        .split(body[1]);

    draw_tracker_panel(frame, right[0], app);
    draw_quick_actions(frame, right[1], app);

    draw_command_hints(frame, chunks[2], app);

    match &app.input_mode {
        InputMode::Confirmation { message, action } => {
            draw_confirmation_modal(frame, message, action);
        }
        InputMode::Help => draw_help_modal(frame),
        InputMode::Normal | InputMode::Editing(_) => {}
    }

    draw_toasts(frame, &app.queue.visible());
}

fn draw_title_and_status(frame: &mut Frame, area: Rect, app: &App) {
    let panel_status = if app.panel_reachable {
        "Reachable"
    } else {
        "Unreachable"
    };

    let status_text = match app.tracker_snapshot() {
        Some(snapshot) if !snapshot.phase.is_terminal() => {
            format!("Tracking {}", snapshot.operation_id)
        }
        _ if app.lock.is_engaged() => "Submitting".to_string(),
        _ => "Idle".to_string(),
    };

    let title_text = format!(
        " PROVTRACK │ {} │ Panel: {} │ {} ",
        app.panel_url, panel_status, status_text
    );

    let title = Paragraph::new(title_text)
        .style(Style::default().fg(Color::White).bg(Color::DarkGray))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .border_type(BorderType::Rounded),
        )
        .alignment(Alignment::Center);

    frame.render_widget(title, area);
}

fn draw_creation_form(frame: &mut Frame, area: Rect, app: &App) {
    let locked = app.lock.is_engaged();
    let mut content = vec![Line::from("")];

    for (idx, field) in FormField::ALL.iter().enumerate() {
        if *field == FormField::Serial {
            continue;
        }

        let focused = idx == app.focus % FormField::ALL.len();
        let editing = matches!(app.input_mode, InputMode::Editing(f) if f == *field);
        let disabled = app.is_field_disabled(*field);

        let value_style = if disabled {
            Style::default().fg(Color::DarkGray)
        } else if editing {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };

        let marker = if focused { " ▶ " } else { "   " };
        let cursor = if editing { "_" } else { "" };

        content.push(Line::from(vec![
            Span::styled(marker, Style::default().fg(Color::Green)),
            Span::styled(
                format!("{:<14}", field.label()),
                Style::default().fg(Color::Cyan),
            ),
            Span::styled(format!("{}{}", app.field_value(*field), cursor), value_style),
        ]));
        content.push(Line::from(""));
    }

    let button = if locked {
        Span::styled(
            "[ Create VM ]  (locked)",
            Style::default().fg(Color::DarkGray),
        )
    } else {
        Span::styled(
            "[ Create VM ]  press c",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )
    };
    content.push(Line::from(vec![Span::raw("   "), button]));

    let border_color = if locked { Color::DarkGray } else { Color::White };
    let form = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border_color))
            .border_type(BorderType::Rounded)
            .title(" New Virtual Machine "),
    );

    frame.render_widget(form, area);
}

fn phase_label(phase: TrackerPhase) -> (&'static str, Color) {
    match phase {
        TrackerPhase::Pending => ("⏳ Waiting for the panel", Color::Yellow),
        TrackerPhase::Reporting => ("⌛ Reporting progress", Color::Yellow),
        TrackerPhase::Ready => ("✅ Ready", Color::Green),
        TrackerPhase::Error => ("❌ Failed", Color::Red),
        TrackerPhase::Timeout => ("⚠️  Timed out", Color::Yellow),
        TrackerPhase::Cancelled => ("🚫 Tracking stopped", Color::DarkGray),
    }
}

fn draw_tracker_panel(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .border_type(BorderType::Rounded)
        .title(" Creation Progress ");

    let Some(snapshot) = app.tracker_snapshot() else {
        let idle = Paragraph::new("No creation in progress.")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(idle, area);
        return;
    };

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(inner);

    let caption = match app.tracking_since {
        Some(since) if !snapshot.phase.is_terminal() => Some(provisioning_caption(since.elapsed())),
        _ => None,
    };
    frame.render_widget(Paragraph::new(tracker_lines(&snapshot, caption)), rows[0]);

    let ratio = if snapshot.max_attempts == 0 {
        0.0
    } else {
        (snapshot.attempt as f64 / snapshot.max_attempts as f64).clamp(0.0, 1.0)
    };
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(phase_label(snapshot.phase).1))
        .label(format!(
            "check {}/{}",
            snapshot.attempt, snapshot.max_attempts
        ))
        .ratio(ratio);
    frame.render_widget(gauge, rows[1]);
}

pub fn provisioning_caption(elapsed: Duration) -> &'static str {
    let step = (elapsed.as_secs() / STEP_PERIOD.as_secs()) as usize;
    PROVISIONING_STEPS[step % PROVISIONING_STEPS.len()]
}

fn tracker_lines(snapshot: &TrackerSnapshot, caption: Option<&'static str>) -> Vec<Line<'static>> {
    let (label, color) = phase_label(snapshot.phase);
    let mut lines = vec![
        Line::from(vec![
            Span::styled("VM      ", Style::default().fg(Color::Cyan)),
            Span::styled(
                snapshot.operation_id.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("State   ", Style::default().fg(Color::Cyan)),
            Span::styled(label, Style::default().fg(color)),
        ]),
        Line::from(vec![
            Span::styled("Server  ", Style::default().fg(Color::Cyan)),
            Span::raw(
                snapshot
                    .last_status
                    .clone()
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]),
    ];
    if let Some(caption) = caption {
        lines.push(Line::from(Span::styled(
            caption,
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::ITALIC),
        )));
    }
    lines
}

fn draw_quick_actions(frame: &mut Frame, area: Rect, app: &App) {
    let focused = app.focused_field() == FormField::Serial;
    let editing = matches!(app.input_mode, InputMode::Editing(FormField::Serial));
    let displayed = app
        .display_status
        .try_read()
        .ok()
        .and_then(|status| status.clone())
        .unwrap_or_else(|| "-".to_string());

    let mut content = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled(
                if focused { " ▶ " } else { "   " },
                Style::default().fg(Color::Green),
            ),
            Span::styled("Serial        ", Style::default().fg(Color::Cyan)),
            Span::styled(
                format!("{}{}", app.serial, if editing { "_" } else { "" }),
                if editing {
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                },
            ),
        ]),
        Line::from(vec![
            Span::raw("   "),
            Span::styled("Status        ", Style::default().fg(Color::Cyan)),
            Span::raw(displayed),
        ]),
        Line::from(""),
    ];

    let keys: Vec<Span> = QuickAction::ALL
        .iter()
        .flat_map(|action| {
            vec![
                Span::styled(
                    format!("[{}] ", quick_action_key(*action)),
                    Style::default().fg(Color::Yellow),
                ),
                Span::raw(format!("{}  ", action.as_str())),
            ]
        })
        .collect();
    let mut line = vec![Span::raw("   ")];
    line.extend(keys);
    content.push(Line::from(line));

    let panel = Paragraph::new(content)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .border_type(BorderType::Rounded)
                .title(" Quick Actions "),
        )
        .wrap(Wrap { trim: false });

    frame.render_widget(panel, area);
}

pub fn quick_action_key(action: QuickAction) -> char {
    match action {
        QuickAction::Start => 's',
        QuickAction::Stop => 'S',
        QuickAction::Reset => 'r',
        QuickAction::Refresh => 'f',
    }
}

fn draw_command_hints(frame: &mut Frame, area: Rect, app: &App) {
    let hints = match &app.input_mode {
        InputMode::Normal => vec![Line::from(vec![
            Span::styled("[Tab ↑/↓] ", Style::default().fg(Color::Yellow)),
            Span::raw("Field  "),
            Span::styled("[Enter] ", Style::default().fg(Color::Green)),
            Span::raw("Edit  "),
            Span::styled("[c] ", Style::default().fg(Color::Green)),
            Span::raw("Create  "),
            Span::styled("[x] ", Style::default().fg(Color::Yellow)),
            Span::raw("Stop tracking  "),
            Span::styled("[?] ", Style::default().fg(Color::Cyan)),
            Span::raw("Help  "),
            Span::styled("[q] ", Style::default().fg(Color::Red)),
            Span::raw("Quit"),
        ])],
        InputMode::Editing(_) => vec![Line::from(vec![
            Span::styled("[Enter/Esc] ", Style::default().fg(Color::Green)),
            Span::raw("Done  "),
            Span::styled("[Backspace] ", Style::default().fg(Color::Yellow)),
            Span::raw("Delete"),
        ])],
        InputMode::Confirmation { .. } => vec![Line::from(vec![
            Span::styled("[Enter/Y] ", Style::default().fg(Color::Green)),
            Span::raw("Confirm  "),
            Span::styled("[Esc/N] ", Style::default().fg(Color::Red)),
            Span::raw("Cancel"),
        ])],
        InputMode::Help => vec![Line::from(vec![
            Span::styled("[Any Key] ", Style::default().fg(Color::Yellow)),
            Span::raw("Close"),
        ])],
    };

    // A pending message replaces the hints until the next key press
    let lines = match &app.message {
        Some(message) => vec![Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Gray),
        ))],
        None => hints,
    };

    let hints_widget = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::TOP)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .alignment(Alignment::Center);

    frame.render_widget(hints_widget, area);
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Info => Color::Cyan,
        Severity::Success => Color::Green,
        Severity::Warning => Color::Yellow,
        Severity::Error => Color::Red,
    }
}

fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "ℹ",
        Severity::Success => "✅",
        Severity::Warning => "⚠️",
        Severity::Error => "❌",
    }
}

/// Stacks toasts in the top-right corner, oldest first, as many as fit.
fn draw_toasts(frame: &mut Frame, toasts: &[Notification]) {
    let area = frame.area();
    let width = TOAST_WIDTH.min(area.width);
    let x = area.x + area.width.saturating_sub(width + 1);
    let mut y = area.y + 1;

    for toast in toasts {
        if y + TOAST_HEIGHT > area.y + area.height {
            break;
        }
        let rect = Rect {
            x,
            y,
            width,
            height: TOAST_HEIGHT,
        };
        frame.render_widget(Clear, rect);

        let color = severity_color(toast.event.severity);
        let widget = Paragraph::new(Line::from(vec![
            Span::styled(
                format!("{} ", severity_icon(toast.event.severity)),
                Style::default().fg(color),
            ),
            Span::raw(toast.event.message.clone()),
        ]))
        .block(
            Block::default()
                .borders(Borders::LEFT | Borders::TOP | Borders::BOTTOM)
                .border_type(BorderType::Thick)
                .border_style(Style::default().fg(color)),
        )
        .wrap(Wrap { trim: true });

        frame.render_widget(widget, rect);
        y += TOAST_HEIGHT;
    }
}

fn centered_rect(width_percent: u16, height_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100 - height_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100 - width_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn draw_confirmation_modal(frame: &mut Frame, message: &str, action: &ConfirmAction) {
    let area = centered_rect(60, 30, frame.area());
    frame.render_widget(Clear, area);

    let title = match action {
        ConfirmAction::Quick {
            action: QuickAction::Stop,
            ..
        } => " Stop Machine ",
        ConfirmAction::Quick {
            action: QuickAction::Reset,
            ..
        } => " ⚠️  Reset Machine ",
        ConfirmAction::Quick { .. } => " Confirm ",
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .border_type(BorderType::Rounded);

    let content = vec![
        Line::from(""),
        Line::from(message),
        Line::from(""),
        Line::from(vec![
            Span::styled("Press ", Style::default().fg(Color::White)),
            Span::styled(
                "Enter/Y",
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(" to confirm or ", Style::default().fg(Color::White)),
            Span::styled(
                "Esc/N",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
            Span::styled(" to cancel", Style::default().fg(Color::White)),
        ]),
    ];

    let paragraph = Paragraph::new(content)
        .block(block)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    frame.render_widget(paragraph, area);
}

fn draw_help_modal(frame: &mut Frame) {
    let area = centered_rect(60, 60, frame.area());
    frame.render_widget(Clear, area);

    let text = "Keyboard Shortcuts:\n\
        \n\
        Form:\n\
          Tab/↑/↓     - Select field\n\
          Enter       - Edit field\n\
          c           - Create VM\n\
          x           - Stop tracking the current creation\n\
        \n\
        Quick actions (by serial):\n\
          s           - Start\n\
          S           - Stop\n\
          r           - Reset\n\
          f           - Refresh status\n\
        \n\
        System:\n\
          ?/h         - This help\n\
          q/Q         - Quit";

    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .title(" Help ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .border_type(BorderType::Rounded),
        )
        .wrap(Wrap { trim: false });

    frame.render_widget(paragraph, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quick_action_keys_are_distinct() {
        let mut keys: Vec<char> = QuickAction::ALL.iter().map(|a| quick_action_key(*a)).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), QuickAction::ALL.len());
    }

    #[test]
    fn test_tracker_lines_show_last_status() {
        let snapshot = TrackerSnapshot {
            operation_id: "vm-1".to_string(),
            attempt: 3,
            max_attempts: 120,
            phase: TrackerPhase::Pending,
            last_status: Some("creating".to_string()),
        };
        let lines = tracker_lines(&snapshot, None);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2].spans[1].content, "creating");

        let lines = tracker_lines(&snapshot, Some(provisioning_caption(Duration::ZERO)));
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3].spans[0].content, "Preparing environment...");
    }

    #[test]
    fn test_provisioning_caption_rotates_every_twenty_seconds() {
        assert_eq!(provisioning_caption(Duration::from_secs(19)), "Preparing environment...");
        assert_eq!(provisioning_caption(Duration::from_secs(20)), "Allocating CPU & RAM...");
        assert_eq!(provisioning_caption(Duration::from_secs(125)), "Finalizing setup...");
        // Wraps around after the last step
        assert_eq!(provisioning_caption(Duration::from_secs(140)), "Preparing environment...");
    }
}
