use crate::app::{Action, App, ViewState};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use flow_client::AccessNode;
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use std::io;
use std::time::Duration;

/// Cursor over the actions offered for the current session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionMenu {
    selected: usize,
}

impl ActionMenu {
    /// Selected action, clamped to what is currently offered
    pub fn selected(&self, actions: &[Action]) -> Option<Action> {
        actions.get(self.selected.min(actions.len().saturating_sub(1))).copied()
    }

    /// Move to the next action (wraps around)
    pub fn next(&mut self, actions: &[Action]) {
        if !actions.is_empty() {
            self.selected = (self.selected.min(actions.len() - 1) + 1) % actions.len();
        }
    }

    /// Move to the previous action (wraps around)
    pub fn prev(&mut self, actions: &[Action]) {
        if !actions.is_empty() {
            let current = self.selected.min(actions.len() - 1);
            self.selected = if current == 0 {
                actions.len() - 1
            } else {
                current - 1
            };
        }
    }

    pub fn reset(&mut self) {
        self.selected = 0;
    }
}

/// Poll for keyboard events with a timeout
pub fn poll_event(timeout: Duration) -> io::Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}

/// Check if a key event matches a specific key code
pub fn is_key(event: &Event, code: KeyCode) -> bool {
    matches!(
        event,
        Event::Key(KeyEvent { code: c, kind: KeyEventKind::Press, .. }) if *c == code
    )
}

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Quit,
    Next,
    Prev,
    Run(Action),
    None,
}

pub fn map_input(event: &Event, menu: &ActionMenu, actions: &[Action]) -> Input {
    if is_key(event, KeyCode::Char('q')) || is_key(event, KeyCode::Esc) {
        return Input::Quit;
    }
    if is_key(event, KeyCode::Down) || is_key(event, KeyCode::Tab) || is_key(event, KeyCode::Right) {
        return Input::Next;
    }
    if is_key(event, KeyCode::Up) || is_key(event, KeyCode::BackTab) || is_key(event, KeyCode::Left) {
        return Input::Prev;
    }
    if is_key(event, KeyCode::Enter) {
        return menu.selected(actions).map_or(Input::None, Input::Run);
    }
    actions
        .iter()
        .find(|a| is_key(event, KeyCode::Char(a.key())))
        .map_or(Input::None, |a| Input::Run(*a))
}

/// Drive the UI until the user quits. Must be called inside a Tokio runtime; flows run on
/// spawned tasks while this loop keeps drawing.
pub fn run<N: AccessNode + ?Sized + 'static>(app: App<N>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_loop<B: Backend, N: AccessNode + ?Sized + 'static>(
    terminal: &mut Terminal<B>,
    mut app: App<N>,
) -> Result<()> {
    let title = app.client().config().app_title().to_string();
    let mut menu = ActionMenu::default();
    app.start();

    loop {
        let before = app.actions();
        app.drain();
        if app.actions() != before {
            menu.reset();
        }

        terminal.draw(|f| render(f, &title, app.state(), app.actions(), &menu))?;

        let Some(event) = poll_event(Duration::from_millis(100))? else {
            continue;
        };
        match map_input(&event, &menu, app.actions()) {
            Input::Quit => break,
            Input::Next => menu.next(app.actions()),
            Input::Prev => menu.prev(app.actions()),
            Input::Run(action) => app.perform(action),
            Input::None => {}
        }
    }

    app.shutdown();
    Ok(())
}

pub fn render(f: &mut Frame, title: &str, state: &ViewState, actions: &[Action], menu: &ActionMenu) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Footer
        ])
        .split(f.area());

    let header = Paragraph::new(Line::from(vec![Span::styled(
        "Flow App",
        Style::default().fg(Color::White),
    )]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(title.to_string())
            .title_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
    );
    f.render_widget(header, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[1]);
    render_session(f, body[0], state);
    render_actions(f, body[1], actions, menu);

    let footer = Paragraph::new(state.status_message.as_str())
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .wrap(Wrap { trim: true });
    f.render_widget(footer, chunks[2]);
}

fn render_session(f: &mut Frame, area: Rect, state: &ViewState) {
    let label = Style::default().fg(Color::Cyan);
    let mut lines = Vec::new();

    if state.session.is_logged_in() {
        let address = state
            .session
            .addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "No Address".to_string());
        lines.push(Line::from(vec![
            Span::styled("Address: ", label),
            Span::raw(address),
        ]));
        lines.push(Line::from(vec![
            Span::styled("Profile Name: ", label),
            Span::styled(
                state.profile_name.clone(),
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            ),
        ]));
        if let Some(id) = state.last_tx {
            lines.push(Line::from(vec![
                Span::styled("Last Transaction: ", label),
                Span::raw(id.short()),
            ]));
            let status = state
                .last_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "SUBMITTED".to_string());
            lines.push(Line::from(vec![
                Span::styled("Status: ", label),
                Span::styled(status, Style::default().fg(Color::Yellow)),
            ]));
        }
    } else {
        lines.push(Line::from("Not logged in"));
    }

    let session = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Session")
                .title_style(Style::default().fg(Color::Green)),
        )
        .wrap(Wrap { trim: true });
    f.render_widget(session, area);
}

fn render_actions(f: &mut Frame, area: Rect, actions: &[Action], menu: &ActionMenu) {
    let items: Vec<ListItem> = actions
        .iter()
        .map(|a| ListItem::new(format!("[{}] {}", a.key(), a.label())))
        .collect();
    let mut list_state = ListState::default();
    list_state.select(menu.selected(actions).and_then(|s| actions.iter().position(|a| *a == s)));

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Actions (Enter to run, q to quit)"),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    f.render_stateful_widget(list, area, &mut list_state);
}
