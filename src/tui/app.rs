// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shell state machine and event loop.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tracing::warn;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::review::{Orchestrator, ProgressEvent, ReviewOptions, ReviewOutcome, ReviewPhase};
use crate::store::{Issue, ReviewRepo, ReviewSummary};

use super::ui;

/// State of one tracker step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// Progress of one pipeline phase as last reported.
#[derive(Debug, Clone)]
pub struct PhaseProgress {
    pub status: StepStatus,
    pub detail: String,
    pub done: usize,
    pub total: usize,
}

impl Default for PhaseProgress {
    fn default() -> Self {
        Self {
            status: StepStatus::Pending,
            detail: String::new(),
            done: 0,
            total: 0,
        }
    }
}

/// Shell application state. The shell observes orchestrator progress; it
/// never mutates review state beyond the accept/reject toggle.
pub struct App {
    pub parse: PhaseProgress,
    pub embed: PhaseProgress,
    pub review: PhaseProgress,
    pub issues: Vec<Issue>,
    pub selected: usize,
    pub scroll: u16,
    pub summary: Option<ReviewSummary>,
    pub error: Option<String>,
    pub finished: bool,
    pub should_quit: bool,
}

impl App {
    pub fn new() -> Self {
        Self {
            parse: PhaseProgress::default(),
            embed: PhaseProgress::default(),
            review: PhaseProgress::default(),
            issues: Vec::new(),
            selected: 0,
            scroll: 0,
            summary: None,
            error: None,
            finished: false,
            should_quit: false,
        }
    }

    /// Fold a progress event into the tracker. Later phases imply earlier
    /// ones finished.
    pub fn apply_progress(&mut self, event: ProgressEvent) {
        let update = |phase: &mut PhaseProgress, event: &ProgressEvent| {
            phase.status = StepStatus::Running;
            phase.detail = event.detail.clone();
            phase.done = event.done;
            phase.total = event.total;
        };

        match event.phase {
            ReviewPhase::Parsing => update(&mut self.parse, &event),
            ReviewPhase::Embedding => {
                self.parse.status = StepStatus::Done;
                update(&mut self.embed, &event);
            }
            ReviewPhase::Reviewing => {
                self.parse.status = StepStatus::Done;
                self.embed.status = StepStatus::Done;
                update(&mut self.review, &event);
            }
            ReviewPhase::Completed => {
                self.parse.status = StepStatus::Done;
                self.embed.status = StepStatus::Done;
                self.review.status = StepStatus::Done;
                self.review.detail = event.detail;
                self.finished = true;
            }
            ReviewPhase::Failed => {
                self.error = Some(event.detail);
                self.finished = true;
                for phase in [&mut self.parse, &mut self.embed, &mut self.review] {
                    if phase.status == StepStatus::Running {
                        phase.status = StepStatus::Failed;
                    }
                }
            }
        }
    }

    /// Load the finished review's issues into the browser.
    pub fn load_outcome(&mut self, outcome: &ReviewOutcome) {
        self.issues = outcome.issues.clone();
        self.summary = Some(outcome.summary.clone());
        self.selected = 0;
        self.scroll = 0;
        self.finished = true;
    }

    pub fn next_issue(&mut self) {
        if !self.issues.is_empty() && self.selected + 1 < self.issues.len() {
            self.selected += 1;
            self.scroll = 0;
        }
    }

    pub fn prev_issue(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll = 0;
        }
    }

    pub fn selected_issue(&self) -> Option<&Issue> {
        self.issues.get(self.selected)
    }

    /// Rendered markdown-ish detail for the selected issue.
    pub fn selected_detail(&self) -> String {
        match self.selected_issue() {
            Some(issue) => {
                let mut out = format!(
                    "{} [{}] lines {}-{}\n\n{}\n",
                    issue.title,
                    issue.severity.as_str(),
                    issue.line_start,
                    issue.line_end,
                    issue.description
                );
                if !issue.affected_code.is_empty() {
                    out.push_str(&format!("\nAffected code:\n{}\n", issue.affected_code));
                }
                if !issue.suggestion.is_empty() {
                    out.push_str(&format!("\nSuggestion:\n{}\n", issue.suggestion));
                }
                if !issue.code_snippet.is_empty() {
                    out.push_str(&format!("\nProposed fix:\n{}\n", issue.code_snippet));
                }
                out
            }
            None => String::new(),
        }
    }

    pub fn current_detail(&self) -> String {
        for phase in [&self.review, &self.embed, &self.parse] {
            if phase.status == StepStatus::Running {
                if phase.total > 0 {
                    return format!("{} ({}/{})", phase.detail, phase.done, phase.total);
                }
                return phase.detail.clone();
            }
        }
        if self.finished {
            self.review.detail.clone()
        } else {
            String::new()
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard restoring the terminal on drop, including on panic paths.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

/// Spawn a blocking task that forwards crossterm events into a channel.
fn spawn_input(tx: mpsc::UnboundedSender<KeyEvent>) {
    tokio::task::spawn_blocking(move || loop {
        if event::poll(Duration::from_millis(50)).unwrap_or(false) {
            if let Ok(CrosstermEvent::Key(key)) = event::read() {
                if tx.send(key).is_err() {
                    return;
                }
            }
        } else if tx.is_closed() {
            return;
        }
    });
}

/// Run a review under the interactive shell.
///
/// Returns the outcome when the review completed, `None` when the user
/// cancelled before completion.
pub async fn run_shell(
    orchestrator: Orchestrator,
    options: ReviewOptions,
    store: Arc<dyn ReviewRepo>,
    cancel: CancelToken,
) -> Result<Option<ReviewOutcome>> {
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let orchestrator = orchestrator.with_progress(progress_tx);

    let mut review_task = tokio::spawn(async move { orchestrator.run(options).await });
    let mut review_done = false;

    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    spawn_input(input_tx);

    let _guard = TerminalGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    let mut app = App::new();
    let mut outcome: Option<ReviewOutcome> = None;
    let mut tick = tokio::time::interval(Duration::from_millis(100));

    loop {
        terminal.draw(|frame| ui::draw(frame, &app))?;

        tokio::select! {
            _ = tick.tick() => {}
            Some(event) = progress_rx.recv() => {
                app.apply_progress(event);
                // Drain whatever else queued up between frames.
                while let Ok(event) = progress_rx.try_recv() {
                    app.apply_progress(event);
                }
            }
            result = &mut review_task, if !review_done => {
                review_done = true;
                match result {
                    Ok(Ok(finished)) => {
                        app.load_outcome(&finished);
                        outcome = Some(finished);
                    }
                    Ok(Err(err)) if err.is_cancelled() => {
                        app.should_quit = true;
                    }
                    Ok(Err(err)) => {
                        app.error = Some(err.to_string());
                        app.finished = true;
                    }
                    Err(join_err) => {
                        app.error = Some(format!("review task panicked: {}", join_err));
                        app.finished = true;
                    }
                }
            }
            Some(key) = input_rx.recv() => {
                handle_key(&mut app, key, &store, &cancel);
            }
        }

        if app.should_quit {
            break;
        }
    }

    // Propagate cancellation to anything still in flight.
    cancel.cancel();
    if !review_done {
        review_task.abort();
    }

    Ok(outcome)
}

fn handle_key(app: &mut App, key: KeyEvent, store: &Arc<dyn ReviewRepo>, cancel: &CancelToken) {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            cancel.cancel();
            app.should_quit = true;
        }
        KeyCode::Char('q') | KeyCode::Esc => {
            cancel.cancel();
            app.should_quit = true;
        }
        KeyCode::Char('j') | KeyCode::Down => app.next_issue(),
        KeyCode::Char('k') | KeyCode::Up => app.prev_issue(),
        KeyCode::Char('d') | KeyCode::PageDown => {
            app.scroll = app.scroll.saturating_add(4);
        }
        KeyCode::Char('u') | KeyCode::PageUp => {
            app.scroll = app.scroll.saturating_sub(4);
        }
        KeyCode::Char('a') => set_valid(app, store, true),
        KeyCode::Char('r') => set_valid(app, store, false),
        _ => {}
    }
}

fn set_valid(app: &mut App, store: &Arc<dyn ReviewRepo>, is_valid: bool) {
    let Some(issue) = app.issues.get_mut(app.selected) else {
        return;
    };
    if let Err(err) = store.set_issue_valid(&issue.id, is_valid) {
        warn!(error = %err, "failed to persist issue toggle");
        return;
    }
    issue.is_valid = is_valid;
}
