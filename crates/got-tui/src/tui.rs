//! Ratatui frontend for the Game of Three client.
//!
//! Pure UI module: terminal lifecycle, rendering, and input → intent mapping.
//! All game state lives in [`got_core::game_state`] and all networking in
//! `got-client`. This module has no networking dependencies.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use std::io::{self, Stdout};

use got_core::game_state::{
    ClientGameState, GameEvent, LogCategory, Outcome, Phase, Selection, SessionView,
};
use got_core::protocol::Move;

const NAME_LIMIT: usize = 31;
const SPINNER: [&str; 8] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧"];

// ---------------------------------------------------------------------------
// UserIntent: result of processing user input
// ---------------------------------------------------------------------------

/// The result of processing a user input event.
#[derive(Debug, PartialEq, Eq)]
pub enum UserIntent {
    None,
    Quit,
    /// Register (or resume) under the given name.
    Start(String),
    Select(Move),
    /// Submit this move, staging it first if needed.
    Confirm(Move),
    ClearSelection,
    CancelSearch,
    PlayAgain,
    MainMenu,
    Retry,
    /// Local feedback message. The event loop routes it through
    /// `ClientController::add_message`.
    Feedback(String, LogCategory),
}

// ---------------------------------------------------------------------------
// TUI-only state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TuiState {
    /// Name typed on the main menu.
    name_input: String,
    /// Highlighted index into [`Move::ALL`].
    highlighted: usize,
    show_help: bool,
    frame: usize,
}

impl TuiState {
    fn highlighted_move(&self) -> Move {
        Move::ALL[self.highlighted % Move::ALL.len()]
    }

    fn step(&mut self, forward: bool) -> Move {
        let len = Move::ALL.len();
        self.highlighted = if forward {
            (self.highlighted + 1) % len
        } else {
            (self.highlighted + len - 1) % len
        };
        self.highlighted_move()
    }

    fn highlight(&mut self, delta: Move) {
        if let Some(i) = Move::ALL.iter().position(|m| *m == delta) {
            self.highlighted = i;
        }
    }

    fn handle_key(&mut self, code: KeyCode, gs: &ClientGameState) -> UserIntent {
        if self.show_help {
            if matches!(code, KeyCode::Esc | KeyCode::F(1)) {
                self.show_help = false;
            }
            return UserIntent::None;
        }
        if code == KeyCode::F(1) {
            self.show_help = true;
            return UserIntent::None;
        }

        match &gs.phase {
            Phase::Idle => self.handle_menu_key(code),
            Phase::Registering | Phase::Searching => match code {
                KeyCode::Esc => UserIntent::CancelSearch,
                KeyCode::Char('q') => UserIntent::Quit,
                _ => UserIntent::None,
            },
            Phase::Playing => self.handle_game_key(code, gs),
            Phase::Finished(_) => match code {
                KeyCode::Char('n') => UserIntent::PlayAgain,
                KeyCode::Char('m') => UserIntent::MainMenu,
                KeyCode::Esc | KeyCode::Char('q') => UserIntent::Quit,
                _ => UserIntent::None,
            },
            Phase::Failed(_) => match code {
                KeyCode::Char('r') => UserIntent::Retry,
                KeyCode::Char('m') => UserIntent::MainMenu,
                KeyCode::Esc | KeyCode::Char('q') => UserIntent::Quit,
                _ => UserIntent::None,
            },
        }
    }

    fn handle_menu_key(&mut self, code: KeyCode) -> UserIntent {
        match code {
            KeyCode::Esc => UserIntent::Quit,
            KeyCode::Enter => {
                let name = self.name_input.trim();
                if name.is_empty() {
                    UserIntent::Feedback("Please enter your name".into(), LogCategory::Error)
                } else {
                    UserIntent::Start(name.to_string())
                }
            }
            KeyCode::Backspace => {
                self.name_input.pop();
                UserIntent::None
            }
            KeyCode::Char(c) if !c.is_control() => {
                if self.name_input.chars().count() < NAME_LIMIT {
                    self.name_input.push(c);
                }
                UserIntent::None
            }
            _ => UserIntent::None,
        }
    }

    fn handle_game_key(&mut self, code: KeyCode, gs: &ClientGameState) -> UserIntent {
        match code {
            KeyCode::Esc | KeyCode::Char('q') => UserIntent::Quit,
            KeyCode::Char('m') => UserIntent::MainMenu,
            KeyCode::Backspace => UserIntent::ClearSelection,
            KeyCode::Left | KeyCode::Right if gs.can_move() => {
                UserIntent::Select(self.step(code == KeyCode::Right))
            }
            KeyCode::Char(c @ '1'..='3') => {
                let delta = Move::ALL[(c as usize) - ('1' as usize)];
                self.highlight(delta);
                UserIntent::Select(delta)
            }
            KeyCode::Enter => {
                let delta = gs.selection.pending().unwrap_or(self.highlighted_move());
                UserIntent::Confirm(delta)
            }
            _ => UserIntent::None,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API: Tui struct
// ---------------------------------------------------------------------------

/// Owns the ratatui terminal and all UI-layer state.
///
/// The client orchestrator ([`crate::client`]) calls [`Tui::render`] each
/// frame and [`Tui::poll_and_handle_input`] to process keyboard events.
pub struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    state: TuiState,
}

impl Tui {
    /// Set up the terminal (raw mode, alternate screen) and return a ready `Tui`.
    pub fn setup(name: &str) -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self {
            terminal,
            state: TuiState {
                name_input: name.trim().chars().take(NAME_LIMIT).collect(),
                ..TuiState::default()
            },
        })
    }

    /// Restore the terminal to its original state.
    pub fn teardown(&mut self) -> io::Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }

    pub fn render(&mut self, gs: &ClientGameState) -> io::Result<()> {
        self.state.frame = self.state.frame.wrapping_add(1);
        self.terminal.draw(|f| ui(f, gs, &self.state))?;
        Ok(())
    }

    /// Poll for a keyboard event and, if one is available, translate it into
    /// a [`UserIntent`]. Never blocks.
    pub fn poll_and_handle_input(&mut self, gs: &ClientGameState) -> io::Result<UserIntent> {
        if !event::poll(std::time::Duration::from_millis(0))? {
            return Ok(UserIntent::None);
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            return Ok(UserIntent::None);
        };
        if kind != KeyEventKind::Press {
            return Ok(UserIntent::None);
        }
        Ok(self.state.handle_key(code, gs))
    }

    /// Keep the highlighted button on the staged move.
    pub fn on_selection_changed(&mut self, gs: &ClientGameState) {
        if let Some(delta) = gs.selection.pending() {
            self.state.highlight(delta);
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn ui(frame: &mut Frame, gs: &ClientGameState, tui: &TuiState) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(11),   // Screen
            Constraint::Length(8), // Log
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    match &gs.phase {
        Phase::Idle => render_menu(frame, gs, tui, main_layout[0]),
        Phase::Registering => render_waiting(frame, tui, "Registering…", main_layout[0]),
        Phase::Searching => render_waiting(frame, tui, "Looking for an opponent…", main_layout[0]),
        Phase::Playing => match &gs.view {
            Some(view) => render_board(frame, gs, view, tui, main_layout[0]),
            None => render_waiting(frame, tui, "Loading game…", main_layout[0]),
        },
        Phase::Finished(outcome) => render_finished(frame, gs, *outcome, main_layout[0]),
        Phase::Failed(message) => render_failed(frame, message, main_layout[0]),
    }

    render_messages(frame, gs, main_layout[1]);

    let mut status_spans = vec![
        Span::styled("F1", Style::default().fg(Color::Cyan).bold()),
        Span::raw(": Help | "),
        Span::styled("ESC", Style::default().fg(Color::Cyan).bold()),
        Span::raw(": "),
        Span::raw(match gs.phase {
            Phase::Registering | Phase::Searching => "Cancel",
            _ => "Quit",
        }),
    ];
    if !gs.our_name.is_empty() {
        status_spans.push(Span::raw(" | You: "));
        status_spans.push(Span::styled(
            gs.our_name.as_str(),
            Style::default().fg(Color::Cyan),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(status_spans)), main_layout[2]);

    if tui.show_help {
        render_help_popup(frame);
    }
}

fn screen_block(title: &str, color: Color) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(format!(" {title} "))
        .title_style(Style::default().fg(color).bold())
}

fn render_menu(frame: &mut Frame, gs: &ClientGameState, tui: &TuiState, area: Rect) {
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "GAME OF THREE",
            Style::default().fg(Color::Yellow).bold(),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("Your name: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}_", tui.name_input),
                Style::default().fg(Color::Cyan).bold(),
            ),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "Press Enter to play",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let title = if gs.our_player_id.is_some() { "Welcome back" } else { "Main menu" };
    let menu = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(screen_block(title, Color::Blue));
    frame.render_widget(menu, area);
}

fn render_waiting(frame: &mut Frame, tui: &TuiState, label: &str, area: Rect) {
    let spinner = SPINNER[(tui.frame / 2) % SPINNER.len()];
    let lines = vec![
        Line::from(""),
        Line::from(""),
        Line::from(Span::styled(
            format!("{spinner} {label}"),
            Style::default().fg(Color::Yellow).bold(),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "Esc to cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let widget = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(screen_block("Matchmaking", Color::Yellow));
    frame.render_widget(widget, area);
}

fn render_board(
    frame: &mut Frame,
    gs: &ClientGameState,
    view: &SessionView,
    tui: &TuiState,
    area: Rect,
) {
    let (banner, banner_style) = if view.is_our_turn() {
        (
            "YOUR TURN".to_string(),
            Style::default().fg(Color::Black).bg(Color::Green).bold(),
        )
    } else {
        (
            format!("Waiting for {}", view.opponent_name),
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled(view.our_name.clone(), Style::default().fg(Color::Cyan).bold()),
            Span::styled("  vs  ", Style::default().fg(Color::Gray)),
            Span::styled(view.opponent_name.clone(), Style::default().fg(Color::White).bold()),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            view.value.to_string(),
            Style::default().fg(Color::Magenta).bold(),
        )),
        Line::from(""),
        Line::from(Span::styled(format!(" {banner} "), banner_style)),
        Line::from(""),
        move_buttons(gs, view, tui),
    ];

    if let Some(error) = &gs.error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            error.as_str(),
            Style::default().fg(Color::Red),
        )));
    }

    let board = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(screen_block(&format!("Game {}", view.game_id), Color::Magenta));
    frame.render_widget(board, area);
}

fn move_buttons(gs: &ClientGameState, view: &SessionView, tui: &TuiState) -> Line<'static> {
    let enabled = view.can_move();
    let mut spans = Vec::new();
    for (i, delta) in Move::ALL.into_iter().enumerate() {
        let preview = match delta.preview(view.value) {
            Some(next) => format!("→ {next}"),
            None => "✗".to_string(),
        };
        let label = format!(" [{}] {delta} {preview} ", i + 1);

        let style = match gs.selection {
            Selection::Submitting(m) if m == delta => {
                Style::default().fg(Color::Black).bg(Color::Yellow).bold()
            }
            Selection::Selected(m) if m == delta => {
                Style::default().fg(Color::Black).bg(Color::Cyan).bold()
            }
            _ if !enabled => Style::default().fg(Color::DarkGray),
            _ if tui.highlighted == i => Style::default().fg(Color::Cyan).bold(),
            _ => Style::default().fg(Color::White),
        };
        if i > 0 {
            spans.push(Span::raw("  "));
        }
        spans.push(Span::styled(label, style));
    }
    if gs.selection.is_submitting() {
        spans.push(Span::styled("  sending…", Style::default().fg(Color::Yellow)));
    }
    Line::from(spans)
}

fn render_finished(frame: &mut Frame, gs: &ClientGameState, outcome: Outcome, area: Rect) {
    let (banner, color) = match outcome {
        Outcome::Won => ("YOU WON!".to_string(), Color::Green),
        _ => {
            let winner = gs
                .view
                .as_ref()
                .map(|v| v.winner_name().to_string())
                .unwrap_or_default();
            if winner.is_empty() {
                ("You lost.".to_string(), Color::Red)
            } else {
                (format!("You lost. {winner} wins."), Color::Red)
            }
        }
    };
    let lines = vec![
        Line::from(""),
        Line::from(""),
        Line::from(Span::styled(banner, Style::default().fg(color).bold())),
        Line::from(""),
        Line::from(Span::styled(
            "n: play again   m: main menu   q: quit",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let widget = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(screen_block("Game over", color));
    frame.render_widget(widget, area);
}

fn render_failed(frame: &mut Frame, message: &str, area: Rect) {
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            message.to_string(),
            Style::default().fg(Color::Red).bold(),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "r: retry   m: main menu   q: quit",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let widget = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(screen_block("Error", Color::Red));
    frame.render_widget(widget, area);
}

/// Format a structured [`GameEvent`] for the log panel.
fn format_event(event: &GameEvent) -> String {
    match event {
        GameEvent::Registered { player_id } => format!("Registered as {player_id}"),
        GameEvent::Resumed { player_id } => format!("Welcome back ({player_id})"),
        GameEvent::Searching => "Searching for an opponent...".to_string(),
        GameEvent::WaitingForOpponent { game_id } => {
            format!("Game {game_id} created, waiting for an opponent")
        }
        GameEvent::MatchFound { opponent, .. } => format!("Matched against {opponent}"),
        GameEvent::YourTurn { value } => format!("Your turn, number is {value}"),
        GameEvent::OpponentTurn { name, value } => format!("{name}'s turn, number is {value}"),
        GameEvent::MoveSent { delta } => format!("Sending {delta}"),
        GameEvent::MoveAccepted { delta } => format!("Played {delta}"),
        GameEvent::MoveRejected { message } => message.clone(),
        GameEvent::GameOver { won: true, .. } => "You won!".to_string(),
        GameEvent::GameOver { winner_name, .. } => format!("{winner_name} won the game"),
        GameEvent::GameVanished => "The game no longer exists, searching again".to_string(),
        GameEvent::Failed { message } => message.clone(),
        GameEvent::Text { text, .. } => text.clone(),
    }
}

fn render_messages(frame: &mut Frame, gs: &ClientGameState, area: Rect) {
    let messages: Vec<ListItem> = gs
        .events
        .iter()
        .rev()
        .take(area.height.saturating_sub(2) as usize)
        .rev()
        .map(|ev| {
            let style = match ev.category() {
                LogCategory::System => Style::default().fg(Color::Yellow),
                LogCategory::Action => Style::default().fg(Color::White),
                LogCategory::Winner => Style::default().fg(Color::Green).bold(),
                LogCategory::Error => Style::default().fg(Color::Red),
                LogCategory::Info => Style::default().fg(Color::Gray),
            };
            ListItem::new(Span::styled(format_event(ev), style))
        })
        .collect();

    let messages_list = List::new(messages).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(" Log ")
            .title_style(Style::default().fg(Color::DarkGray)),
    );

    frame.render_widget(messages_list, area);
}

fn render_help_popup(frame: &mut Frame) {
    let area = centered_rect(60, 80, frame.area());

    frame.render_widget(Clear, area);

    let section = |title: &'static str| {
        Line::from(Span::styled(title, Style::default().fg(Color::Cyan).bold()))
    };
    let help_text = Text::from(vec![
        Line::from(Span::styled("CONTROLS", Style::default().fg(Color::Yellow).bold())),
        Line::from(""),
        section("  GAME"),
        Line::from("  Left/Right    Choose a move"),
        Line::from("  1 / 2 / 3     Choose -1 / 0 / +1"),
        Line::from("  Enter         Submit the chosen move"),
        Line::from("  Backspace     Clear the choice"),
        Line::from(""),
        section("  AFTER A GAME"),
        Line::from("  n             Play again"),
        Line::from("  m             Main menu"),
        Line::from("  r             Retry after an error"),
        Line::from(""),
        section("  SYSTEM"),
        Line::from("  F1            Toggle this help"),
        Line::from("  ESC           Cancel search / Quit"),
        Line::from("  q             Quit"),
        Line::from(""),
        Line::from(Span::styled(
            "Press ESC or F1 to close",
            Style::default().fg(Color::DarkGray),
        )),
    ]);

    let help = Paragraph::new(help_text).wrap(Wrap { trim: true }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Help ")
            .title_style(Style::default().fg(Color::Cyan).bold())
            .style(Style::default().bg(Color::Black)),
    );

    frame.render_widget(help, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
