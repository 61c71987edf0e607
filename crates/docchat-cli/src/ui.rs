//! TUI implementation for docchat

use crossterm::event::{Event, EventStream, MouseEventKind};
use docchat_core::{ControllerHandle, Controls, Role, Snapshot, Turn, TurnStatus};
use docchat_tui::{
    Theme,
    input::{Action, event_to_action},
    widgets::{ChatMessage, InputBox, MessageList, MessageState, Spinner, message_list, spinner},
};
use futures::StreamExt;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};
use std::io::{self, Stdout};
use std::time::Instant;

use crate::utils::{time_label, truncate_chars};

/// Map a turn to the message the list widget draws
pub fn turn_to_message(turn: &Turn, time: String) -> ChatMessage {
    let content = turn.content().unwrap_or_default();
    let message = match (turn.role(), turn.status()) {
        (Role::User, _) => ChatMessage::user(content),
        (Role::Assistant, Some(TurnStatus::Pending)) => ChatMessage::thinking(),
        (Role::Assistant, Some(TurnStatus::Cancelled)) => {
            ChatMessage::assistant(content).with_state(MessageState::Paused)
        }
        (Role::Assistant, Some(TurnStatus::Failed)) => {
            ChatMessage::assistant(content).with_state(MessageState::Error)
        }
        (Role::Assistant, _) => ChatMessage::assistant(content),
    };
    message.with_time(time)
}

/// Key hints for the status line
pub fn control_hints(controls: Controls) -> &'static str {
    match controls {
        Controls::Send => "Enter: send │ Ctrl+Q: quit",
        Controls::PauseOrStop => "Ctrl+P: pause │ Esc: stop │ Ctrl+Q: quit",
        Controls::Resume => "Ctrl+R: resume │ Esc: discard │ Enter: ask new",
    }
}

/// TUI application state
pub struct TuiState {
    /// Messages rendered from the latest snapshot
    messages: Vec<ChatMessage>,
    snapshot: Snapshot,
    input: InputBox,
    /// Line offset; `usize::MAX` means stick to the bottom
    scroll: usize,
    /// One-off hint shown in the status line until the next action
    notice: Option<String>,
    theme: Theme,
    handle: ControllerHandle,
    spinner_start: Instant,
    base_url: String,
}

impl TuiState {
    pub fn new(handle: ControllerHandle, base_url: String, theme: Theme) -> Self {
        let mut input = InputBox::new().with_placeholder("Ask a question about your documents...");
        input.set_focused(true);

        let mut state = Self {
            messages: vec![],
            snapshot: handle.snapshot(),
            input,
            scroll: usize::MAX,
            notice: None,
            theme,
            handle,
            spinner_start: Instant::now(),
            base_url,
        };
        state.apply_snapshot(state.snapshot.clone());
        state
    }

    /// Re-render messages from a freshly published snapshot
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        if snapshot.in_flight && !self.snapshot.in_flight {
            self.spinner_start = Instant::now();
        }
        if snapshot.turns.len() != self.messages.len()
            || snapshot.last_turn() != self.snapshot.last_turn()
        {
            self.scroll_to_bottom();
        }

        self.messages = snapshot
            .turns
            .iter()
            .map(|turn| turn_to_message(turn, time_label(turn.created_at())))
            .collect();
        self.snapshot = snapshot;
    }

    fn is_busy(&self) -> bool {
        self.snapshot.in_flight
    }

    fn scroll_to_bottom(&mut self) {
        // Resolved against the content height at render time
        self.scroll = usize::MAX;
    }

    /// Forward an intent; a closed controller ends the UI
    fn forward(&self, result: docchat_core::Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "controller unavailable");
                false
            }
        }
    }

    /// Handle a keyboard action. Returns `false` to quit.
    pub fn handle_action(&mut self, action: Action, width: u16) -> bool {
        self.notice = None;

        match action {
            Action::Submit => {
                if self.input.content().trim().is_empty() {
                    return true;
                }
                if self.snapshot.controls() == Controls::PauseOrStop {
                    self.notice = Some("Still answering. Ctrl+P to pause, Esc to stop".to_string());
                    return true;
                }
                let question = self.input.take();
                self.scroll_to_bottom();
                self.forward(self.handle.submit(question))
            }
            Action::Pause => {
                if self.snapshot.controls() != Controls::PauseOrStop {
                    self.notice = Some("Nothing to pause".to_string());
                    return true;
                }
                self.forward(self.handle.pause())
            }
            Action::Resume => {
                if self.snapshot.controls() != Controls::Resume {
                    self.notice = Some("Nothing to resume".to_string());
                    return true;
                }
                self.forward(self.handle.resume())
            }
            Action::Stop => self.forward(self.handle.stop()),
            Action::Interrupt => {
                if !self.is_busy() {
                    return false;
                }
                self.forward(self.handle.stop())
            }
            Action::Quit => false,
            Action::PageUp => {
                self.scroll = self.scroll.saturating_sub(10);
                true
            }
            Action::PageDown => {
                self.scroll = self.scroll.saturating_add(10);
                true
            }
            other => {
                self.input.handle_action(&other, width);
                true
            }
        }
    }

    fn handle_scroll(&mut self, kind: MouseEventKind) {
        match kind {
            MouseEventKind::ScrollUp => self.scroll = self.scroll.saturating_sub(3),
            MouseEventKind::ScrollDown => self.scroll = self.scroll.saturating_add(3),
            _ => {}
        }
    }

    /// Status text on the left of the status line
    fn status_text(&self) -> String {
        if let Some(notice) = &self.notice {
            return notice.clone();
        }
        match self.snapshot.controls() {
            Controls::PauseOrStop => {
                let question = self
                    .snapshot
                    .turns
                    .iter()
                    .rev()
                    .find(|t| t.is_user())
                    .and_then(Turn::content)
                    .unwrap_or_default();
                format!("Answering \"{}\"", truncate_chars(question, 40))
            }
            Controls::Resume => "Paused".to_string(),
            Controls::Send => "Ready".to_string(),
        }
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),    // Messages
                Constraint::Length(1), // Status
                Constraint::Length(3), // Input
            ])
            .split(frame.area());

        self.render_messages(frame, chunks[0]);
        self.render_status(frame, chunks[1]);
        self.input.render(chunks[2], frame.buffer_mut(), &self.theme);
    }

    fn render_messages(&mut self, frame: &mut Frame, area: Rect) {
        let title = format!(" docchat │ {} ", self.base_url);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.border_style())
            .title(title);

        let inner = block.inner(area);
        frame.render_widget(block, area);

        if inner.height == 0 {
            return;
        }
        if self.messages.is_empty() {
            frame.render_widget(self.welcome(), inner);
            return;
        }

        let content_height =
            message_list::calculate_message_height(&self.messages, inner.width as usize);
        let max_scroll = content_height.saturating_sub(inner.height as usize);
        self.scroll = self.scroll.min(max_scroll);

        let list = MessageList::new(&self.messages, &self.theme)
            .scroll(self.scroll)
            .spinner_start(self.spinner_start);
        frame.render_widget(list, inner);

        if content_height > inner.height as usize {
            let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("↑"))
                .end_symbol(Some("↓"))
                .track_symbol(Some("│"))
                .thumb_symbol("█");

            let mut scrollbar_state = ScrollbarState::new(content_height)
                .position(self.scroll)
                .viewport_content_length(inner.height as usize);

            frame.render_stateful_widget(scrollbar, inner, &mut scrollbar_state);
        }
    }

    /// Shown when the conversation has no turns yet (greeting disabled)
    fn welcome(&self) -> Paragraph<'static> {
        let key = |k: &'static str, what: &'static str| {
            Line::from(vec![
                Span::styled(format!("    {:<10}", k), Style::default().fg(Color::Cyan)),
                Span::styled(what, Style::default().fg(Color::White)),
            ])
        };

        Paragraph::new(vec![
            Line::from(""),
            Line::from(vec![
                Span::styled(
                    "  docchat",
                    Style::default()
                        .fg(Color::White)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(" - ask your documents", Style::default().fg(Color::DarkGray)),
            ]),
            Line::from(""),
            Line::from(Span::styled(
                format!("  Session: {}", self.snapshot.session_id),
                Style::default().fg(Color::DarkGray),
            )),
            Line::from(""),
            Line::from(Span::styled("  Keybindings", Style::default().fg(Color::Yellow))),
            Line::from(""),
            key("Enter", "Send question"),
            key("Ctrl+P", "Pause answer"),
            key("Ctrl+R", "Resume paused answer"),
            key("Esc", "Stop and discard answer"),
            key("Ctrl+C", "Stop / Quit"),
            key("PgUp/Dn", "Scroll history"),
        ])
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let left = self.status_text();
        let right = control_hints(self.snapshot.controls());

        let left_width = left.chars().count() + if self.is_busy() { 2 } else { 0 };
        let right_width = right.chars().count();
        let available = area.width as usize;

        if self.is_busy() {
            let spinner = Spinner::new(&left, &self.theme).with_start_time(self.spinner_start);
            frame.render_widget(spinner, area);
        } else {
            let style = if self.notice.is_some() || self.snapshot.paused {
                self.theme.warning_style()
            } else {
                self.theme.dim_style()
            };
            frame.render_widget(Paragraph::new(Span::styled(left, style)), area);
        }

        if left_width + right_width + 2 <= available {
            let hints = Rect {
                x: area.x + (available - right_width) as u16,
                width: right_width as u16,
                ..area
            };
            frame.render_widget(Paragraph::new(Span::styled(right, self.theme.dim_style())), hints);
        }
    }
}

/// Run the TUI until the user quits
pub async fn run_tui(handle: ControllerHandle, base_url: String, theme: Theme) -> anyhow::Result<()> {
    use crossterm::{
        event::{DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    };
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture, EnableBracketedPaste)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let mut state = TuiState::new(handle, base_url, theme);
    let result = event_loop(&mut terminal, &mut state).await;

    // Restore the terminal even if the loop failed
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    state: &mut TuiState,
) -> anyhow::Result<()> {
    let mut snapshots = state.handle.watch();
    let mut event_stream = EventStream::new();
    let mut tick_interval = tokio::time::interval(spinner::FRAME_INTERVAL);

    loop {
        terminal.draw(|frame| state.render(frame))?;
        let width = terminal.size()?.width;

        tokio::select! {
            biased;

            changed = snapshots.changed() => {
                if changed.is_err() {
                    // Controller is gone
                    return Ok(());
                }
                let snapshot = snapshots.borrow_and_update().clone();
                state.apply_snapshot(snapshot);
            }

            event = event_stream.next() => {
                match event {
                    Some(Ok(Event::Mouse(mouse))) => state.handle_scroll(mouse.kind),
                    Some(Ok(event)) => {
                        let Some(action) = event_to_action(event) else {
                            continue;
                        };
                        if !state.handle_action(action, width) {
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => return Err(anyhow::anyhow!("Event error: {}", e)),
                    None => return Ok(()),
                }
            }

            // Spinner animation
            _ = tick_interval.tick(), if state.is_busy() => {}
        }
    }
}
