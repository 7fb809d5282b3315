use std::io;
use std::sync::Arc;

use anyhow::Result;
use crossterm::cursor;
use crossterm::event::DisableBracketedPaste;
use crossterm::event::DisableMouseCapture;
use crossterm::event::EnableBracketedPaste;
use crossterm::event::EnableMouseCapture;
use crossterm::terminal::disable_raw_mode;
use crossterm::terminal::enable_raw_mode;
use crossterm::terminal::EnterAlternateScreen;
use crossterm::terminal::LeaveAlternateScreen;
use ratatui::backend::CrosstermBackend;
use ratatui::prelude::*;
use ratatui::widgets::Block;
use ratatui::widgets::BorderType;
use ratatui::widgets::Borders;
use ratatui::widgets::Padding;
use ratatui::widgets::Paragraph;
use ratatui::widgets::Scrollbar;
use ratatui::widgets::ScrollbarOrientation;
use ratatui::widgets::Wrap;
use ratatui::Frame;
use ratatui::Terminal;
use tokio::sync::mpsc;

use crate::domain::models::Action;
use crate::domain::models::Event;
use crate::domain::models::Loading;
use crate::domain::models::Role;
use crate::domain::models::TextArea;
use crate::domain::models::PLACEHOLDER_TEXT;
use crate::domain::services::events::EventsService;
use crate::domain::services::AppState;
use crate::domain::services::Dashboard;
use crate::domain::services::MonitorState;

fn panel(title: &str) -> Block<'_> {
    return Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(title)
        .padding(Padding::new(1, 1, 0, 0));
}

fn render_sidebar<B: Backend>(frame: &mut Frame<B>, rect: Rect, app_state: &AppState) {
    let snapshot = &app_state.snapshot;
    let label = Style::default().add_modifier(Modifier::BOLD);

    let mut lines = vec![];
    match &snapshot.project {
        Some(project) => {
            lines.push(Line::from(Span::styled("Repository", label)));
            lines.push(Line::from(project.repo_name().to_string()));
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled("Last sync", label)));
            lines.push(Line::from(project.short_commit()));
        }
        None => {
            lines.push(Line::from("No repository connected."));
            lines.push(Line::from(""));
            lines.push(Line::from("Paste a GitHub URL below and press Enter."));
        }
    }

    if let Some(webhook_url) = &snapshot.webhook_url {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Webhook", label)));
        lines.push(Line::from(webhook_url.to_string()));
    }

    if !snapshot.risks.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Risks", label)));
        for risk in &snapshot.risks {
            lines.push(Line::from(vec![
                Span::styled(
                    format!("[{}] ", risk.risk_type),
                    Style::default().fg(Color::Red),
                ),
                Span::raw(risk.description.to_string()),
            ]));
        }
    }

    frame.render_widget(
        Paragraph::new(lines)
            .block(panel("Lumis"))
            .wrap(Wrap { trim: false }),
        rect,
    );
}

fn render_ingestion<B: Backend>(frame: &mut Frame<B>, rect: Rect, app_state: &AppState) {
    let snapshot = &app_state.snapshot;
    let mut lines = vec![];

    if let Some(status) = &snapshot.ingestion_status {
        lines.push(Line::from(vec![
            Span::styled("Step: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(status.step.to_string()),
        ]));
        lines.push(Line::from(""));

        let visible = rect.height.saturating_sub(5) as usize;
        let skip = status.logs.len().saturating_sub(visible);
        for log in status.logs.iter().skip(skip) {
            lines.push(Line::from(Span::styled(
                format!("> {log}"),
                Style::default().fg(Color::DarkGray),
            )));
        }
    } else {
        lines.push(Line::from("Initializing..."));
    }

    if let MonitorState::Failed { error, .. } = &snapshot.ingestion_state {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!(
                "Ingestion failed: {}",
                error.as_deref().unwrap_or("unknown error")
            ),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(Span::styled(
            "Press Esc to dismiss.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    frame.render_widget(
        Paragraph::new(lines)
            .block(panel("Ingestion"))
            .wrap(Wrap { trim: false }),
        rect,
    );
}

fn render_chat<B: Backend>(frame: &mut Frame<B>, rect: Rect, app_state: &mut AppState) {
    let lines = app_state
        .lines
        .iter()
        .map(|line| {
            let color = match line.role {
                Role::User => Color::Cyan,
                Role::Assistant => Color::Green,
            };

            let mut style = Style::default();
            if line.header {
                style = style.fg(color).add_modifier(Modifier::BOLD);
            } else if line.placeholder {
                style = style.fg(Color::DarkGray).add_modifier(Modifier::ITALIC);
            }

            return Line::from(Span::styled(line.text.to_string(), style));
        })
        .collect::<Vec<Line>>();

    frame.render_widget(
        Paragraph::new(lines)
            .block(panel("Chat"))
            .scroll((app_state.scroll.position, 0)),
        rect,
    );
    frame.render_stateful_widget(
        Scrollbar::new(ScrollbarOrientation::VerticalRight),
        rect.inner(&Margin {
            vertical: 1,
            horizontal: 0,
        }),
        &mut app_state.scroll.scrollbar_state,
    );
}

async fn start_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    dashboard: &Dashboard,
    app_state: &mut AppState,
    tx: mpsc::UnboundedSender<Action>,
    events: &mut EventsService,
) -> Result<()> {
    let mut textarea = TextArea::with_title(app_state.input_title());
    let loading = Loading::new(PLACEHOLDER_TEXT);

    loop {
        app_state.sync(dashboard.snapshot());

        terminal.draw(|frame| {
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints(vec![Constraint::Length(36), Constraint::Min(1)])
                .split(frame.size());

            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints(vec![
                    Constraint::Min(1),
                    Constraint::Length(1),
                    Constraint::Max(4),
                ])
                .split(columns[1]);

            render_sidebar(frame, columns[0], app_state);

            if app_state.shows_ingestion() {
                render_ingestion(frame, rows[0], app_state);
            } else {
                if rows[0].width != app_state.last_known_width
                    || rows[0].height != app_state.last_known_height
                {
                    app_state.set_rect(rows[0]);
                }
                render_chat(frame, rows[0], app_state);
            }

            if let Some(notice) = &app_state.notice {
                frame.render_widget(
                    Paragraph::new(notice.to_string()).style(Style::default().fg(Color::Yellow)),
                    rows[1],
                );
            }

            if app_state.snapshot.waiting {
                loading.render(frame, rows[2]);
            } else {
                textarea.set_block(TextArea::block(app_state.input_title()));
                frame.render_widget(textarea.widget(), rows[2]);
            }
        })?;

        match events.next().await? {
            Event::KeyboardCharInput(input) => {
                textarea.input(input);
            }
            Event::KeyboardPaste(text) => {
                for (idx, line) in text.replace('\r', "").split('\n').enumerate() {
                    if idx > 0 {
                        textarea.insert_newline();
                    }
                    textarea.insert_str(line);
                }
            }
            Event::KeyboardEnter() => {
                let input_str = textarea.lines().join("\n");
                if let Some(action) = app_state.submit(&input_str) {
                    tx.send(action)?;
                    textarea = TextArea::with_title(app_state.input_title());
                }
            }
            event => {
                let (should_break, action) = app_state.handle_event(event);
                if let Some(action) = action {
                    tx.send(action)?;
                }
                if should_break {
                    break;
                }
            }
        }
    }

    return Ok(());
}

pub fn destruct_terminal_for_panic() {
    let _ = disable_raw_mode();
    let _ = crossterm::execute!(
        io::stdout(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableBracketedPaste
    );
    let _ = crossterm::execute!(io::stdout(), cursor::Show);
}

pub async fn start(
    dashboard: Arc<Dashboard>,
    tx: mpsc::UnboundedSender<Action>,
    rx: mpsc::UnboundedReceiver<Event>,
) -> Result<()> {
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    enable_raw_mode()?;
    crossterm::execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableBracketedPaste
    )?;
    let term_backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(term_backend)?;

    let mut app_state = AppState::default();
    let mut events = EventsService::new(rx);
    let res = start_loop(&mut terminal, &dashboard, &mut app_state, tx, &mut events).await;

    disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;

    return res;
}
