//! TUI rendering with ratatui

use chrono::Utc;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use super::{App, ViewMode, main_layout};
use crate::agent::{AgentState, AgentView, Snapshot};
use crate::orchestrator::Banner;

/// Render the entire application
pub fn render(frame: &mut Frame, app: &App, snapshot: &Snapshot) {
    let banner = app.orchestrator.banner();
    let chunks = main_layout(frame.area(), banner.is_some());

    render_header(frame, app, snapshot, chunks[0]);
    match (app.view_mode(), snapshot.focused()) {
        (ViewMode::Detail, Some(agent)) => render_detail(frame, agent, chunks[1]),
        _ => render_list(frame, snapshot, chunks[1]),
    }
    if let Some(banner) = banner {
        render_banner(frame, banner, chunks[2]);
    }
    render_input(frame, app, snapshot, chunks[3]);
    render_key_help(frame, app, chunks[4]);

    if app.show_help {
        render_help(frame);
    }
}

fn state_style(state: AgentState) -> Style {
    match state {
        AgentState::Starting => Style::default().fg(Color::Gray),
        AgentState::Working => Style::default().fg(Color::Green),
        AgentState::NeedsInput => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        AgentState::Done => Style::default().fg(Color::DarkGray),
        AgentState::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

fn render_header(frame: &mut Frame, app: &App, snapshot: &Snapshot, area: Rect) {
    let mut text = format!(
        " Atelier  {} agents  {} working",
        snapshot.len(),
        snapshot.count_in(AgentState::Working)
    );
    let waiting = snapshot.count_in(AgentState::NeedsInput);
    if waiting > 0 {
        text.push_str(&format!("  {} need input", waiting));
    }
    if app.orchestrator.is_processing() {
        text.push_str("  dispatching...");
    }

    let header = Paragraph::new(text).style(Style::default().fg(Color::White).bg(Color::DarkGray));
    frame.render_widget(header, area);
}

/// Summary if the classifier produced one, else the last line of output
fn headline(agent: &AgentView) -> &str {
    if !agent.status.summary.is_empty() {
        return &agent.status.summary;
    }
    agent
        .status
        .last_output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

fn render_list(frame: &mut Frame, snapshot: &Snapshot, area: Rect) {
    let block = Block::default().title(" Agents ").borders(Borders::ALL);

    if snapshot.is_empty() {
        let empty = Paragraph::new("No agents running. Describe a task below and press Enter.")
            .style(Style::default().fg(Color::Gray))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = snapshot
        .agents
        .iter()
        .enumerate()
        .map(|(i, agent)| {
            let (icon, label) = App::state_display(agent.status.state);
            let style = state_style(agent.status.state);
            let number = if i < 9 { format!("{} ", i + 1) } else { "  ".to_string() };

            ListItem::new(Line::from(vec![
                Span::styled(number, Style::default().fg(Color::DarkGray)),
                Span::styled(icon, style),
                Span::raw(" "),
                Span::styled(
                    agent.config.id.as_str(),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw("  "),
                Span::styled(label, style),
                Span::raw("  "),
                Span::styled(headline(agent), Style::default().fg(Color::Gray)),
            ]))
        })
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}

fn render_detail(frame: &mut Frame, agent: &AgentView, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7), // Agent info
            Constraint::Min(3),    // Output
        ])
        .split(area);

    let (icon, label) = App::state_display(agent.status.state);
    let running = App::format_duration(Utc::now() - agent.started_at);
    let dim = Style::default().fg(Color::DarkGray);
    let info = vec![
        Line::from(vec![Span::styled("Task:    ", dim), Span::raw(agent.config.task.as_str())]),
        Line::from(vec![
            Span::styled("State:   ", dim),
            Span::styled(format!("{} {}", icon, label), state_style(agent.status.state)),
            Span::styled(format!("  ({} running)", running), dim),
        ]),
        Line::from(vec![Span::styled("Summary: ", dim), Span::raw(agent.status.summary.as_str())]),
        Line::from(vec![
            Span::styled("Agent:   ", dim),
            Span::raw(agent.config.kind.to_string()),
            Span::styled(
                format!("  in {}", agent.config.working_directory.display()),
                dim,
            ),
        ]),
        Line::from(vec![
            Span::styled("Tools:   ", dim),
            Span::raw(
                agent
                    .config
                    .tools
                    .as_ref()
                    .map(|tools| tools.join(", "))
                    .unwrap_or_else(|| "default".to_string()),
            ),
        ]),
    ];
    let info_block = Block::default()
        .title(format!(" {} ", agent.config.id))
        .borders(Borders::ALL);
    frame.render_widget(Paragraph::new(info).block(info_block), chunks[0]);

    // Show the end of the buffer: keep as many trailing lines as fit
    let visible = chunks[1].height.saturating_sub(2) as usize;
    let lines: Vec<&str> = agent.output.lines().collect();
    let tail = lines[lines.len().saturating_sub(visible)..].join("\n");
    let output = Paragraph::new(tail)
        .block(Block::default().title(" Output ").borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    frame.render_widget(output, chunks[1]);
}

fn render_banner(frame: &mut Frame, banner: &Banner, area: Rect) {
    let style = match banner {
        Banner::Error(_) => Style::default().fg(Color::White).bg(Color::Red),
        Banner::Clarification(_) => Style::default().fg(Color::Black).bg(Color::Yellow),
    };
    frame.render_widget(Paragraph::new(format!(" {} ", banner.text())).style(style), area);
}

fn render_input(frame: &mut Frame, app: &App, snapshot: &Snapshot, area: Rect) {
    let title = match (app.view_mode(), snapshot.focused()) {
        (ViewMode::Detail, Some(agent)) => format!(" Message to {} ", agent.config.id),
        _ => " New task ".to_string(),
    };
    let input = Paragraph::new(app.input.as_str())
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(input, area);

    if !app.show_help {
        let typed = app.input.chars().count() as u16;
        let x = (area.x + 1 + typed).min(area.right().saturating_sub(2));
        frame.set_cursor_position((x, area.y + 1));
    }
}

fn render_key_help(frame: &mut Frame, app: &App, area: Rect) {
    let help = match app.view_mode() {
        ViewMode::List => " Enter: dispatch │ 1-9: focus │ Esc: clear │ ?: help │ Ctrl+C: quit ",
        ViewMode::Detail => " Enter: send │ Esc: back │ Ctrl+K: kill │ Ctrl+C: quit ",
    };
    frame.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::Black).bg(Color::Gray)),
        area,
    );
}

/// Render the help overlay centered on screen
fn render_help(frame: &mut Frame) {
    let area = centered_rect(60, 60, frame.area());
    let text = vec![
        Line::from(Span::styled("Atelier", Style::default().add_modifier(Modifier::BOLD))),
        Line::from(""),
        Line::from("Type a request and press Enter. It is split into tasks and"),
        Line::from("each task gets its own agent."),
        Line::from(""),
        Line::from("  1-9       focus an agent (with an empty input line)"),
        Line::from("  Enter     dispatch, or send to the focused agent"),
        Line::from("  Esc       back to the list / clear input"),
        Line::from("  Ctrl+K    kill the focused agent"),
        Line::from("  Ctrl+C    quit and stop all agents"),
        Line::from(""),
        Line::from("Statuses refresh every few seconds."),
    ];
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(text).block(Block::default().title(" Help ").borders(Borders::ALL)),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
