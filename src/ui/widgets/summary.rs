// src/ui/widgets/summary.rs

use crate::app::{App, AppState};
use phishguard::core::models::RiskLevel;
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, Gauge, Paragraph},
};

fn risk_color(level: RiskLevel) -> Color {
    match level {
        RiskLevel::Low => Color::Green,
        RiskLevel::Medium => Color::Yellow,
        RiskLevel::High => Color::Red,
    }
}

/// Verdict overview: score, band, animated gauge and per-probe status.
pub fn render_summary(frame: &mut Frame, app: &App, area: Rect) {
    let summary_container = Block::default().borders(Borders::ALL).title("Verdict");
    frame.render_widget(summary_container, area);

    let summary_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Score & band
            Constraint::Length(1), // Gauge
            Constraint::Length(1), // Spacer
            Constraint::Length(6), // Probes
            Constraint::Length(1), // Spacer
            Constraint::Min(0),    // Target
        ])
        .split(area);

    if app.state != AppState::Finished {
        return;
    }
    let Some(report) = &app.report else {
        return;
    };
    let verdict = report.verdict();
    let color = risk_color(verdict.risk_level);

    let score_text = Text::from(vec![
        Line::from("Risk Score".bold()),
        Line::from(format!("{} ({} risk)", verdict.total_score, verdict.risk_level)).style(Style::default().fg(color)),
    ]);
    frame.render_widget(Paragraph::new(score_text).alignment(Alignment::Center), summary_chunks[0]);

    // The gauge tracks the animated score so the bar fills up after a run.
    let shown = RiskLevel::from_score(app.displayed_score);
    let score_gauge = Gauge::default()
        .percent(u16::try_from(app.displayed_score.min(100)).unwrap_or(100))
        .label("")
        .style(Style::default().fg(risk_color(shown)));
    frame.render_widget(score_gauge, summary_chunks[1]);

    let probe_lines: Vec<Line> = report
        .probes()
        .iter()
        .map(|probe| {
            let (icon, style) = if probe.failed {
                ("✗", Style::default().fg(Color::Red))
            } else {
                ("✓", Style::default().fg(Color::Green))
            };
            Line::from(vec![
                Span::styled(format!("{} ", icon), style),
                Span::raw(format!("{:<13}", probe.name)),
                Span::styled(format!("+{}", probe.score_contribution), Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();
    let probes_block = Block::default().title("PROBES".bold());
    frame.render_widget(Paragraph::new(probe_lines).block(probes_block), summary_chunks[3]);

    let target_block = Block::default().title("TARGET".bold());
    let target_text = Text::from(vec![
        Line::from(report.target().domain().to_string()).style(Style::default().fg(Color::Cyan)),
        Line::from(format!("{} warnings", verdict.warnings.len())),
    ]);
    frame.render_widget(Paragraph::new(target_text).block(target_block), summary_chunks[5]);
}
