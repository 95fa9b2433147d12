// src/ui/layout.rs

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Screen regions, computed once per frame.
pub struct AppLayout {
    pub input: Rect,
    pub report: Rect,
    pub summary: Rect,
    pub footer: Rect,
    /// Zero-sized when the log panel is hidden.
    pub log_panel: Rect,
}

/// Findings take the left column. The verdict sits top right, with the log
/// tail stacked under it when shown.
pub fn create_layout(area: Rect, show_logs: bool) -> AppLayout {
    let [input, content, footer] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    let [report, side] = Layout::horizontal([Constraint::Percentage(62), Constraint::Percentage(38)]).areas(content);

    let (summary, log_panel) = if show_logs {
        let [summary, logs] = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(14), Constraint::Min(5)])
            .areas(side);
        (summary, logs)
    } else {
        (side, Rect::default())
    };

    AppLayout { input, report, summary, footer, log_panel }
}
