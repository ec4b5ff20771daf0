// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Rendering for the review shell.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;

use crate::store::Severity;

use super::app::{App, StepStatus};

pub(super) fn draw(frame: &mut Frame<'_>, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_tracker(frame, chunks[0], app);
    draw_body(frame, chunks[1], app);
    draw_status(frame, chunks[2], app);
}

fn step_span(label: &str, state: &StepStatus) -> Span<'static> {
    let (marker, style) = match state {
        StepStatus::Pending => ("[ ]", Style::default().fg(Color::DarkGray)),
        StepStatus::Running => ("[~]", Style::default().fg(Color::Yellow)),
        StepStatus::Done => ("[x]", Style::default().fg(Color::Green)),
        StepStatus::Failed => ("[!]", Style::default().fg(Color::Red)),
    };
    Span::styled(format!(" {} {} ", marker, label), style)
}

fn draw_tracker(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let line = Line::from(vec![
        step_span("parse", &app.parse.status),
        step_span("embed", &app.embed.status),
        step_span("review", &app.review.status),
        Span::raw("  "),
        Span::styled(app.current_detail(), Style::default().fg(Color::Gray)),
    ]);

    let tracker = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("coderev"));
    frame.render_widget(tracker, area);
}

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Critical => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        Severity::High => Style::default().fg(Color::Red),
        Severity::Medium => Style::default().fg(Color::Yellow),
        Severity::Low => Style::default().fg(Color::Blue),
        Severity::Info => Style::default().fg(Color::Gray),
    }
}

fn draw_body(frame: &mut Frame<'_>, area: Rect, app: &App) {
    if app.issues.is_empty() {
        let message = if app.finished {
            "No issues found."
        } else {
            "Reviewing..."
        };
        let placeholder = Paragraph::new(message)
            .block(Block::default().borders(Borders::ALL).title("Issues"));
        frame.render_widget(placeholder, area);
        return;
    }

    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let items: Vec<ListItem<'_>> = app
        .issues
        .iter()
        .map(|issue| {
            let mark = if issue.is_valid { "+" } else { " " };
            ListItem::new(Line::from(vec![
                Span::raw(format!("{} ", mark)),
                Span::styled(
                    format!("{:<8}", issue.severity.as_str()),
                    severity_style(issue.severity),
                ),
                Span::raw(format!(" {}", issue.title)),
            ]))
        })
        .collect();

    let mut state = ListState::default();
    state.select(Some(app.selected));

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            "Issues ({}/{})",
            app.selected + 1,
            app.issues.len()
        )))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    frame.render_stateful_widget(list, halves[0], &mut state);

    let detail = app.selected_detail();
    let paragraph = Paragraph::new(detail)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0))
        .block(Block::default().borders(Borders::ALL).title("Detail"));
    frame.render_widget(paragraph, halves[1]);
}

fn draw_status(frame: &mut Frame<'_>, area: Rect, app: &App) {
    let text = if let Some(error) = &app.error {
        Line::from(Span::styled(
            format!(" error: {}", error),
            Style::default().fg(Color::Red),
        ))
    } else if app.finished {
        Line::from(Span::raw(
            " j/k navigate  a accept  r reject  u/d scroll  q quit",
        ))
    } else {
        Line::from(Span::raw(" q cancel"))
    };
    frame.render_widget(Paragraph::new(text), area);
}
