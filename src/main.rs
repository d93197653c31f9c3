mod app;
mod cli;
mod clipboard;
mod config;
mod host;
mod logging;
mod modal_ui;
mod modals;
mod panel;
mod placeholder;
mod render;
mod resolver;
mod stages;
mod store;
mod templates;
mod ui;

use std::io;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::{DefaultTerminal, Terminal};
use tracing::{debug, info, warn};

use crate::app::{App, handle_main_input};
use crate::cli::Cli;
use crate::clipboard::ArboardClipboard;
use crate::config::{ConfigWatcher, LoadedConfig};
use crate::host::HostService;
use crate::logging::LoggingContext;
use crate::modals::{handle_help_modal_input, handle_stage_editor_input};
use crate::panel::Panel;
use crate::store::{MemoryStorage, SqliteStorage, Storage};
use crate::ui::draw_ui;

/// Open the configured database, or an in-memory store for `--ephemeral` runs.
fn open_storage(loaded: &LoadedConfig, ephemeral: bool) -> Result<Box<dyn Storage + Send>> {
    if ephemeral {
        debug!("storage_ephemeral");
        return Ok(Box::new(MemoryStorage::new()));
    }
    let path = loaded.config.storage_path();
    let storage = SqliteStorage::open(&path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    Ok(Box::new(storage))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let start_time = Instant::now();

    // Load configuration first: it carries the log level
    let loaded_config = config::load_config();

    // Initialize logging before anything else touches storage
    let (logging, logging_error) = match logging::init(&loaded_config.config.logging.level) {
        Ok(ctx) => {
            logging::cleanup_old_logs(&ctx.log_directory);
            (Some(ctx), None)
        }
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {}", e);
            (None, Some(e.message))
        }
    };

    debug!(
        config_path = %loaded_config.config_path.display(),
        status = ?loaded_config.status,
        "config_loaded"
    );

    let storage = open_storage(&loaded_config, cli.ephemeral)?;

    let result = match cli.command {
        Some(command) => {
            let mut clipboard = ArboardClipboard::new();
            cli::run(
                command,
                storage.as_ref(),
                &loaded_config.config,
                &mut clipboard,
                &mut io::stdout().lock(),
            )
        }
        None => run_tui(storage, loaded_config, logging.as_ref(), logging_error),
    };

    if let Some(ctx) = &logging {
        info!(
            session_id = %ctx.session_id,
            duration_secs = start_time.elapsed().as_secs_f64(),
            "session_end"
        );
    }

    result
}

fn run_tui(
    storage: Box<dyn Storage + Send>,
    loaded_config: LoadedConfig,
    logging: Option<&LoggingContext>,
    logging_error: Option<String>,
) -> Result<()> {
    let recent_limit = loaded_config.config.history.recent_agents_limit;
    let (link, host_thread) = host::spawn(move || {
        HostService::new(storage, Box::new(ArboardClipboard::new()), recent_limit)
    })
    .context("Failed to start host thread")?;

    let panel = Panel::new(link, loaded_config.config.agents.clone());
    let mut app = App::new(panel, loaded_config);
    app.logging_error = logging_error;
    if let Some(ctx) = logging {
        app.session_id = Some(ctx.session_id.clone());
        app.log_directory = Some(ctx.log_directory.clone());
        app.log_level_handle = Some(ctx.reload_handle.clone());
    }
    match ConfigWatcher::new(&app.config_path, app.project_config_path.as_deref()) {
        Ok(watcher) => app.config_watcher = Some(watcher),
        Err(e) => warn!(error = %e, "config_watch_failed"),
    }

    // Setup terminal
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;
    let terminal = Terminal::new(ratatui::backend::CrosstermBackend::new(stdout))
        .context("Failed to create terminal")?;

    let result = run_app(terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;

    // Dropping the panel hangs up the channel; let queued saves finish.
    drop(app);
    if host_thread.join().is_err() {
        warn!("host_thread_panicked");
    }

    result
}

fn run_app(mut terminal: DefaultTerminal, app: &mut App) -> Result<()> {
    loop {
        app.poll_host();
        app.poll_config();

        terminal.draw(|f| draw_ui(f, app))?;

        // Short timeout keeps host responses and config reloads flowing
        if crossterm::event::poll(Duration::from_millis(50))? {
            let Event::Key(key) = crossterm::event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }

            if app.show_help_modal {
                handle_help_modal_input(app, key.code);
            } else if app.stage_editor_state.is_some() {
                handle_stage_editor_input(app, key.code, key.modifiers);
            } else {
                handle_main_input(app, key.code, key.modifiers);
            }
        }

        if app.should_quit {
            debug!("quit_requested");
            return Ok(());
        }
    }
}
