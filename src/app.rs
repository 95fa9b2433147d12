// src/app.rs

use phishguard::core::error::AnalyzeError;
use phishguard::core::models::{ProbeResult, Report};
use phishguard::logging::log_file_path;
use ratatui::widgets::{ListState, ScrollbarState};

pub const SPINNER_CHARS: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// How many trailing log lines the log panel keeps.
const LOG_TAIL: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Disclaimer,
    Idle,
    Analyzing,
    Finished,
}

/// One warning from the report, tagged with the probe that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub probe: String,
    pub message: String,
    pub probe_failed: bool,
}

pub struct App {
    pub should_quit: bool,
    pub state: AppState,
    pub input: String,
    pub report: Option<Report>,
    pub error: Option<String>,
    pub findings: Vec<Finding>,
    pub analysis_list_state: ListState,
    pub show_logs: bool,
    pub log_content: Vec<String>,
    pub log_horizontal_scroll: usize,
    pub log_horizontal_scroll_state: ScrollbarState,
    pub spinner_frame: usize,
    /// Animated towards the verdict score on every tick.
    pub displayed_score: u32,
}

impl App {
    pub fn new() -> Self {
        Self {
            should_quit: false,
            state: AppState::Disclaimer,
            input: String::new(),
            report: None,
            error: None,
            findings: Vec::new(),
            analysis_list_state: ListState::default(),
            show_logs: false,
            log_content: Vec::new(),
            log_horizontal_scroll: 0,
            log_horizontal_scroll_state: ScrollbarState::default(),
            spinner_frame: 0,
            displayed_score: 0,
        }
    }

    pub fn acknowledge_disclaimer(&mut self) {
        self.state = AppState::Idle;
    }

    /// The typed target, with `https://` assumed when no scheme was given.
    pub fn target_url(&self) -> String {
        let raw = self.input.trim();
        if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        }
    }

    pub fn start_analysis(&mut self) {
        self.state = AppState::Analyzing;
        self.report = None;
        self.error = None;
        self.findings.clear();
        self.analysis_list_state.select(None);
        self.displayed_score = 0;
    }

    pub fn finish_analysis(&mut self, outcome: Result<Report, AnalyzeError>) {
        self.state = AppState::Finished;
        match outcome {
            Ok(report) => {
                self.findings = collect_findings(&report);
                self.analysis_list_state.select(if self.findings.is_empty() { None } else { Some(0) });
                self.report = Some(report);
            }
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    /// The probe behind the highlighted finding.
    pub fn selected_probe(&self) -> Option<&ProbeResult> {
        let finding = self.findings.get(self.analysis_list_state.selected()?)?;
        self.report.as_ref()?.probe(&finding.probe)
    }

    pub fn select_next(&mut self) {
        if self.findings.is_empty() {
            return;
        }
        let next = match self.analysis_list_state.selected() {
            Some(i) if i + 1 < self.findings.len() => i + 1,
            _ => 0,
        };
        self.analysis_list_state.select(Some(next));
    }

    pub fn select_previous(&mut self) {
        if self.findings.is_empty() {
            return;
        }
        let previous = match self.analysis_list_state.selected() {
            Some(0) | None => self.findings.len() - 1,
            Some(i) => i - 1,
        };
        self.analysis_list_state.select(Some(previous));
    }

    pub fn toggle_logs(&mut self) {
        self.show_logs = !self.show_logs;
        if self.show_logs {
            self.refresh_logs();
        }
    }

    pub fn scroll_logs_left(&mut self) {
        self.log_horizontal_scroll = self.log_horizontal_scroll.saturating_sub(4);
        self.log_horizontal_scroll_state = self.log_horizontal_scroll_state.position(self.log_horizontal_scroll);
    }

    pub fn scroll_logs_right(&mut self) {
        self.log_horizontal_scroll = self.log_horizontal_scroll.saturating_add(4);
        self.log_horizontal_scroll_state = self.log_horizontal_scroll_state.position(self.log_horizontal_scroll);
    }

    pub fn on_tick(&mut self) {
        if self.state == AppState::Analyzing {
            self.spinner_frame = (self.spinner_frame + 1) % SPINNER_CHARS.len();
        }
        if let Some(report) = &self.report {
            let target = report.verdict().total_score;
            if self.displayed_score < target {
                self.displayed_score += 1;
            }
        }
        if self.show_logs {
            self.refresh_logs();
        }
    }

    fn refresh_logs(&mut self) {
        let Ok(content) = std::fs::read_to_string(log_file_path()) else {
            return;
        };
        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(LOG_TAIL);
        self.log_content = lines[start..].iter().map(|l| l.to_string()).collect();
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn reset(&mut self) {
        self.state = AppState::Idle;
        self.input.clear();
        self.report = None;
        self.error = None;
        self.findings.clear();
        self.analysis_list_state = ListState::default();
        self.displayed_score = 0;
    }
}

fn collect_findings(report: &Report) -> Vec<Finding> {
    report
        .probes()
        .iter()
        .flat_map(|probe| {
            probe.warnings.iter().map(move |w| Finding {
                probe: probe.name.clone(),
                message: w.clone(),
                probe_failed: probe.failed,
            })
        })
        .collect()
}
