//! prayerclock - Daily prayer times with a live countdown
//!
//! A terminal UI application that shows the day's prayer times for the
//! configured or detected location and counts down to the next prayer.

use std::fs::OpenOptions;
use std::io;
use std::panic;
use std::path::Path;
use std::process;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use clap::Parser;
use crossterm::{
    event::{self, DisableFocusChange, EnableFocusChange, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use prayerclock::app::{App, AppState};
use prayerclock::cli::{Cli, StartupConfig};
use prayerclock::client::{FetchOptions, FetchRequest};
use prayerclock::config::Config;
use prayerclock::countdown::{current_and_next, CountdownEngine, CountdownHandle};
use prayerclock::data::{LocationInfo, PrayerTimesData};
use prayerclock::refresh::{self, RefreshConfig, RefreshHandle, RefreshMessage};
use prayerclock::services::Services;
use prayerclock::time::{format_prayer_time, Clock, SystemClock, TimeFormat};
use prayerclock::ui;

const LOG_FILE: &str = "prayerclock.log";

/// Sets up a panic hook that restores the terminal before printing the panic message.
/// This ensures the terminal is usable even if the application panics.
fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // Attempt to restore the terminal
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), DisableFocusChange, LeaveAlternateScreen);
        // Call the original panic hook
        original_hook(panic_info);
    }));
}

/// Installs the tracing subscriber
///
/// The TUI owns the screen, so interactive runs log to a file in the cache
/// directory. `--once` runs log to stderr.
fn init_logging(to_stderr: bool, cache_dir: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("prayerclock=info"));

    if to_stderr {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
        return;
    }

    let Some(dir) = cache_dir else {
        return;
    };
    if std::fs::create_dir_all(dir).is_err() {
        return;
    }
    if let Ok(file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))
    {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init();
    }
}

/// Prints the day's times to stdout
async fn run_once(
    services: &Services,
    request: &FetchRequest,
    location: &LocationInfo,
    format: TimeFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = FetchOptions {
        prefetch_next_day: false,
        ..FetchOptions::default()
    };
    let data = services
        .client
        .fetch(request, options)
        .await?
        .ok_or("No prayer times available")?;

    print_day(&data, location, format);

    if request.date == services.client.today() {
        let now = SystemClock.now_ms();
        if let Some(state) = current_and_next(&data.prayers, now, services.tz) {
            println!();
            println!(
                "Now: {}  Next: {} in {}",
                state.current.display_name(),
                state.next.display_name(),
                state.formatted
            );
        }
    }
    Ok(())
}

fn print_day(data: &PrayerTimesData, location: &LocationInfo, format: TimeFormat) {
    let gregorian = &data.date.gregorian;
    println!("{}", location.label());
    println!(
        "{} {} {} {}  ({})",
        gregorian.weekday,
        gregorian.day,
        gregorian.month,
        gregorian.year,
        data.date.hijri.formatted()
    );
    println!("{} · Asr: {}", data.meta.method.name, data.meta.school);
    println!();
    for prayer in &data.prayers {
        println!(
            "  {:<10}{:>9}",
            prayer.name,
            format_prayer_time(&prayer.time, format)
        );
    }
}

/// Runs the interactive terminal UI until the user quits
async fn run_tui(
    services: &Services,
    request: Option<FetchRequest>,
    follow_date: bool,
    format: TimeFormat,
    location_error: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    // Set up panic hook to restore terminal on crash
    setup_panic_hook();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(format);
    let countdown = CountdownHandle::spawn(CountdownEngine::new(Arc::new(SystemClock), services.tz));
    let mut refresh_handle = None;

    match (request, location_error) {
        (Some(request), _) => {
            // First paint from the synchronous cache tiers
            app.show_cached(&services.client, &request);
            terminal.draw(|f| ui::render(f, &app))?;

            app.load(&services.client, &request).await;
            if let Some(data) = &app.data {
                countdown.set_prayers(data.prayers.clone());
                countdown.start();
            }

            let config = RefreshConfig {
                follow_date,
                ..RefreshConfig::default()
            };
            refresh_handle = Some(RefreshHandle::spawn(
                services.client.clone(),
                request,
                config,
            ));
        }
        (None, reason) => {
            app.state = AppState::Error(reason.unwrap_or_else(|| "Location unavailable".to_string()));
        }
    }

    // Main event loop
    loop {
        app.set_countdown(countdown.state());

        // Render UI
        terminal.draw(|f| ui::render(f, &app))?;

        // Poll for terminal events with 100ms timeout
        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) => app.handle_key(key),
                Event::FocusLost => countdown.set_visible(false),
                Event::FocusGained => countdown.set_visible(true),
                _ => {}
            }
        }

        if let Some(handle) = refresh_handle.as_mut() {
            if app.take_refresh_request() {
                handle.request_refresh();
            }
            while let Some(message) = refresh::try_recv(handle) {
                if let RefreshMessage::Updated { data, .. } = &message {
                    countdown.set_prayers(data.prayers.clone());
                    countdown.start();
                }
                app.apply_refresh(message);
            }
        }

        // Check if we should quit
        if app.should_quit {
            break;
        }
    }

    countdown.shutdown();
    if let Some(handle) = refresh_handle {
        handle.shutdown().await;
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableFocusChange, LeaveAlternateScreen)?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    let startup = match StartupConfig::from_cli(&cli, config) {
        Ok(startup) => startup,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };

    init_logging(startup.once, startup.config.cache_dir().as_deref());
    info!(version = env!("CARGO_PKG_VERSION"), "Starting prayerclock");

    let services = Services::from_config(&startup.config)?;
    if startup.clear_cache {
        services.client.clear_cache().await;
        services.location.clear();
        info!("Cache cleared");
    }

    let date: NaiveDate = startup.date.unwrap_or_else(|| services.client.today());
    let located = services.locate().await;
    let format = startup.config.time_format;

    let result = if startup.once {
        match &located {
            Ok(location) => {
                let request = services.request_for(location, date);
                run_once(&services, &request, location, format).await
            }
            Err(e) => Err(e.to_string().into()),
        }
    } else {
        let (request, location_error) = match &located {
            Ok(location) => (Some(services.request_for(location, date)), None),
            Err(e) => {
                warn!(error = %e, "Could not determine location");
                (None, Some(e.to_string()))
            }
        };
        run_tui(&services, request, startup.date.is_none(), format, location_error).await
    };

    if startup.stats {
        println!("{}", serde_json::to_string_pretty(&services.client.cache_stats())?);
    }

    result
}
