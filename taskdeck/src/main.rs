//! `TaskDeck` — a shared task deck for meeting rooms.
//!
//! Launches the TUI and connects to a sync hub so everyone on the same
//! account sees one task list. Configuration via CLI flags, environment
//! variables, or config file (`~/.config/taskdeck/config.toml`).
//!
//! ```bash
//! # Offline scratch session
//! cargo run --bin taskdeck -- --offline
//!
//! # Connect to a hub
//! cargo run --bin taskdeck -- --hub ws://127.0.0.1:9400/ws \
//!     --account-id acct-9 --meeting-id standup
//!
//! # Or via environment variables
//! TASKDECK_HUB=ws://127.0.0.1:9400/ws TASKDECK_ACCOUNT=acct-9 cargo run
//! ```

use std::io;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use taskdeck::app::App;
use taskdeck::config::{CliArgs, ClientConfig};
use taskdeck::effects::{Chime, NullChime, TerminalBell};
use taskdeck::net::{self, NetCommand, NetConfig, NetEvent};
use taskdeck::session::SessionKeys;
use taskdeck::ui;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("taskdeck: {e}");
            std::process::exit(1);
        }
    };

    // Initialize logging before terminal setup (logs go to file, not stdout).
    let _log_guard = init_logging(&config.log_filter, config.log_file.as_deref());

    tracing::info!("taskdeck starting");

    let keys = SessionKeys::resolve(config.account_id.as_deref(), config.meeting_id.as_deref());
    let net_config = NetConfig {
        hub_url: config.hub_url.clone(),
        keys,
    };

    // Connect before the terminal goes raw so errors print cleanly.
    let (cmd_tx, evt_rx) = match net::spawn_net(net_config).await {
        Ok(channels) => channels,
        Err(e) => {
            eprintln!("taskdeck: could not reach the hub: {e}");
            eprintln!("taskdeck: pass --offline to work without one");
            std::process::exit(1);
        }
    };

    // Set up terminal.
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app.
    let result = run_app(&mut terminal, &config, cmd_tx, evt_rx).await;

    // Restore terminal.
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    tracing::info!("taskdeck exiting");
    result
}

/// Initialize file-based logging.
///
/// Logs are written to a file (never stdout, since ratatui owns the
/// terminal). Returns a [`WorkerGuard`] that must be held until shutdown to
/// ensure all buffered log entries are flushed.
fn init_logging(filter: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = dirs::data_dir().map_or_else(
        || std::env::temp_dir().join("taskdeck.log"),
        |dir| dir.join("taskdeck").join("taskdeck.log"),
    );
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    std::fs::create_dir_all(log_dir).ok()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Main application loop.
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    config: &ClientConfig,
    cmd_tx: mpsc::Sender<NetCommand>,
    mut evt_rx: mpsc::Receiver<NetEvent>,
) -> io::Result<()> {
    let (timer_tx, mut timer_rx) = mpsc::unbounded_channel();
    let (draft_tx, mut draft_rx) = mpsc::unbounded_channel();
    let chime: Arc<dyn Chime> = if config.quiet {
        Arc::new(NullChime)
    } else {
        Arc::new(TerminalBell)
    };
    let mut app = App::new(config.display_name.clone(), chime, timer_tx, draft_tx);

    loop {
        // Step 1: Draw the UI frame.
        terminal.draw(|frame| ui::draw(frame, &app))?;

        // Step 2: Apply everything the background tasks produced
        // (non-blocking). Applying an event can itself produce a
        // follow-up command, e.g. a queued add released by a name save.
        while let Ok(event) = evt_rx.try_recv() {
            let follow_up = app.apply_net_event(event);
            forward(&mut app, &cmd_tx, follow_up);
        }
        while let Ok(event) = timer_rx.try_recv() {
            let follow_up = app.apply_timer_event(event);
            forward(&mut app, &cmd_tx, follow_up);
        }
        while let Ok(commit) = draft_rx.try_recv() {
            let follow_up = app.apply_draft_commit(commit);
            forward(&mut app, &cmd_tx, follow_up);
        }

        // Step 3: Advance timer ownership and banner countdowns.
        app.tick();

        // Step 4: Poll for terminal input events.
        if event::poll(config.poll_timeout)?
            && let Event::Key(key) = event::read()?
        {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let command = app.handle_key_event(key);
            forward(&mut app, &cmd_tx, command);
        }

        if app.should_quit {
            // Send shutdown command to the session task.
            let _ = cmd_tx.try_send(NetCommand::Shutdown);
            return Ok(());
        }
    }
}

/// Forward a command to the session task, surfacing backpressure.
fn forward(app: &mut App, tx: &mpsc::Sender<NetCommand>, command: Option<NetCommand>) {
    let Some(command) = command else { return };
    match tx.try_send(command) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            app.show_flash("network busy — try again");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            app.show_flash("connection lost");
        }
    }
}
