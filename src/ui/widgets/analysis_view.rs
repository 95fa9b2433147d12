// src/ui/widgets/analysis_view.rs

use crate::app::{App, AppState, SPINNER_CHARS};
use phishguard::core::models::ProbeResult;
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};

pub fn render_analysis_view(frame: &mut Frame, app: &mut App, area: Rect) {
    let main_block = Block::default()
        .borders(Borders::ALL)
        .title("Findings (Navigate with ↑ ↓)");

    if app.state != AppState::Finished {
        let content = match app.state {
            AppState::Analyzing => {
                let spinner_char = SPINNER_CHARS[app.spinner_frame % SPINNER_CHARS.len()];
                Paragraph::new(Line::from(vec![
                    Span::styled(format!("{} ", spinner_char), Style::default().fg(Color::Cyan)),
                    Span::raw("Running probes... Please wait."),
                ]))
            }
            _ => Paragraph::new("Findings will appear here..."),
        };
        frame.render_widget(content.alignment(Alignment::Center).block(main_block), area);
        return;
    }

    if let Some(error) = &app.error {
        let text = Text::from(vec![
            Line::from(""),
            Line::from("REQUEST REJECTED".bold().fg(Color::Red)),
            Line::from(""),
            Line::from(error.as_str()),
        ]);
        let p = Paragraph::new(text).alignment(Alignment::Center).wrap(Wrap { trim: true });
        frame.render_widget(p.block(main_block), area);
        return;
    }

    let inner_area = main_block.inner(area);
    frame.render_widget(main_block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(40), Constraint::Min(0)])
        .split(inner_area);

    let items: Vec<ListItem> = app
        .findings
        .iter()
        .map(|f| {
            let style = if f.probe_failed {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::Yellow)
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("[{}] ", f.probe), Style::default().fg(Color::DarkGray)),
                Span::styled(f.message.clone(), style),
            ]))
        })
        .collect();

    let findings_list = List::new(items)
        .block(Block::default())
        .highlight_style(Style::new().bg(Color::DarkGray).add_modifier(Modifier::BOLD));
    frame.render_stateful_widget(findings_list, chunks[0], &mut app.analysis_list_state);

    let detail_block = Block::default().borders(Borders::TOP).title("Details");
    match app.selected_probe() {
        Some(probe) => {
            let p = Paragraph::new(probe_details(probe)).wrap(Wrap { trim: false }).block(detail_block);
            frame.render_widget(p, chunks[1]);
        }
        None => render_placeholder_details(frame, app, detail_block, chunks[1]),
    }
}

fn probe_details(probe: &ProbeResult) -> Text<'static> {
    let status = if probe.failed {
        "failed".red().bold()
    } else {
        "completed".green()
    };
    let mut lines = vec![
        Line::from(vec![Span::raw("Probe: "), Span::styled(probe.name.clone(), Style::new().bold())]),
        Line::from(vec![Span::raw("Status: "), status]),
        Line::from(format!(
            "Score contribution: {}   Duration: {} ms",
            probe.score_contribution,
            probe.duration.as_millis()
        )),
        Line::from(""),
        Line::from("DATA:".yellow().bold()),
    ];
    let data = serde_json::to_string_pretty(&probe.data).unwrap_or_default();
    lines.extend(data.lines().map(|l| Line::from(l.to_string())));
    Text::from(lines)
}

fn render_placeholder_details(frame: &mut Frame, app: &App, block: Block, area: Rect) {
    let text = if app.findings.is_empty() {
        Text::from(vec![
            Line::from(""),
            Line::from("✓ NO WARNINGS RAISED".bold().fg(Color::Green)),
            Line::from(""),
            Line::from("None of the probes found anything suspicious about this URL."),
        ])
    } else {
        Text::from("Select an item above to see details.")
    };
    let p = Paragraph::new(text).alignment(Alignment::Center).block(block);
    frame.render_widget(p, area);
}
