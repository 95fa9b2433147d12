// src/main.rs

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use phishguard::config::Config;
use phishguard::core::error::AnalyzeError;
use phishguard::core::models::{AnalyzeRequest, Report};
use phishguard::core::net::NetContext;
use phishguard::core::orchestrator::Orchestrator;
use phishguard::core::probes::build_orchestrator;
use phishguard::logging::initialize_logging;
use ratatui::prelude::*;
use serde_json::json;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{error, info};

mod app;
mod ui;

use app::{App, AppState};

/// Exit status for a rejected request (bad or missing URL).
const EXIT_CLIENT_ERROR: i32 = 2;
/// Exit status for a failure on our side.
const EXIT_INTERNAL_ERROR: i32 = 1;

type Outcome = Result<Report, AnalyzeError>;

#[derive(Parser)]
#[command(name = "phishguard", version, about = "Scores URLs for phishing risk")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive terminal UI (default)
    Tui,
    /// Analyze one URL and print the JSON report.
    /// Without URL, reads `{"url": ...}` from stdin.
    Analyze {
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    initialize_logging()?;
    let config = Config::from_env()?;
    std::fs::create_dir_all(&config.screenshot_dir).wrap_err_with(|| {
        format!("Could not create screenshot directory {}", config.screenshot_dir.display())
    })?;
    let net = NetContext::new(&config).wrap_err("Could not build the HTTP client")?;
    let orchestrator = Arc::new(build_orchestrator(&config, net));
    info!(probes = ?orchestrator.probe_names(), "PhishGuard started.");

    match cli.command.unwrap_or(Command::Tui) {
        Command::Tui => run_tui(orchestrator).await,
        Command::Analyze { url } => run_headless(orchestrator, url).await,
    }
}

async fn run_headless(orchestrator: Arc<Orchestrator>, url: Option<String>) -> Result<()> {
    let request = match url {
        Some(url) => AnalyzeRequest { url: Some(url) },
        None => {
            let mut body = String::new();
            tokio::io::stdin().read_to_string(&mut body).await.wrap_err("Could not read stdin")?;
            match serde_json::from_str::<AnalyzeRequest>(&body) {
                Ok(request) => request,
                Err(e) => {
                    println!("{}", json!({ "error": format!("invalid request body: {}", e) }));
                    std::process::exit(EXIT_CLIENT_ERROR);
                }
            }
        }
    };

    match orchestrator.submit(request).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", json!({ "error": e.to_string() }));
            if e.is_client_error() {
                info!(error = %e, "Request rejected.");
                std::process::exit(EXIT_CLIENT_ERROR);
            }
            error!(error = %e, "Analysis failed.");
            std::process::exit(EXIT_INTERNAL_ERROR);
        }
    }
}

async fn run_tui(orchestrator: Arc<Orchestrator>) -> Result<()> {
    stdout().execute(EnterAlternateScreen)?;
    enable_raw_mode()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let result = event_loop(&mut terminal, orchestrator).await;

    stdout().execute(LeaveAlternateScreen)?;
    disable_raw_mode()?;
    result
}

async fn event_loop<B: Backend>(terminal: &mut Terminal<B>, orchestrator: Arc<Orchestrator>) -> Result<()> {
    let mut app = App::new();
    let (tx, mut rx) = mpsc::channel::<Outcome>(1);

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        if event::poll(Duration::from_millis(100))? {
            handle_events(&mut app, &tx, &orchestrator)?;
        }

        if let Ok(outcome) = rx.try_recv() {
            app.finish_analysis(outcome);
        }
        app.on_tick();
    }
    Ok(())
}

fn handle_events(app: &mut App, tx: &mpsc::Sender<Outcome>, orchestrator: &Arc<Orchestrator>) -> Result<()> {
    let Event::Key(key) = event::read()? else {
        return Ok(());
    };
    if key.kind != KeyEventKind::Press {
        return Ok(());
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        app.quit();
        return Ok(());
    }

    match app.state {
        AppState::Disclaimer => match key.code {
            KeyCode::Enter => app.acknowledge_disclaimer(),
            KeyCode::Esc => app.quit(),
            _ => {}
        },
        AppState::Idle => handle_idle_input(app, key.code, tx, orchestrator),
        AppState::Analyzing => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => app.quit(),
            KeyCode::Char('l') => app.toggle_logs(),
            _ => {}
        },
        AppState::Finished => handle_finished_input(app, key.code),
    }
    Ok(())
}

fn handle_idle_input(app: &mut App, key_code: KeyCode, tx: &mpsc::Sender<Outcome>, orchestrator: &Arc<Orchestrator>) {
    match key_code {
        KeyCode::Esc => app.quit(),
        KeyCode::Char(c) => app.input.push(c),
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Enter => {
            if app.input.trim().is_empty() {
                return;
            }
            let request = AnalyzeRequest { url: Some(app.target_url()) };
            app.start_analysis();

            let tx = tx.clone();
            let orchestrator = Arc::clone(orchestrator);
            tokio::spawn(async move {
                let outcome = orchestrator.submit(request).await;
                let _ = tx.send(outcome).await;
            });
        }
        _ => {}
    }
}

fn handle_finished_input(app: &mut App, key_code: KeyCode) {
    match key_code {
        KeyCode::Char('q') | KeyCode::Esc => app.quit(),
        KeyCode::Char('n') => app.reset(),
        KeyCode::Char('l') => app.toggle_logs(),
        KeyCode::Up => app.select_previous(),
        KeyCode::Down => app.select_next(),
        KeyCode::Left => app.scroll_logs_left(),
        KeyCode::Right => app.scroll_logs_right(),
        _ => {}
    }
}
