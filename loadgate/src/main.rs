//! loadgate - busy indicator and key combo demo.
//!
//! # Commands
//!
//! - `loadgate simulate`: Run a scripted workload and print indicator events
//! - `loadgate watch`: Drive tasks and the combo from the keyboard
//!
//! # Environment Variables
//!
//! See the [`config`](loadgate::config) module for available configuration options.

use std::future::Future;
use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::signal;
use tokio::sync::{broadcast::error::RecvError, mpsc, oneshot};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use loadgate::app::Loadgate;
use loadgate::config::Config;
use loadgate::keys::KeyFeed;
use loadgate::types::IndicatorEvent;

/// Extra time the simulation keeps running after the last task could end.
const SIMULATION_TAIL_MS: u64 = 500;

/// loadgate - flicker-free busy indicator coordination.
///
/// Turns task start/end signals into show, progress and hide events and
/// detects a timed key combo that toggles debug mode.
#[derive(Parser, Debug)]
#[command(name = "loadgate")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    LOADGATE_FLASH_THRESHOLD_MS  Minimum active / visible time (default: 2000)
    LOADGATE_COMBO_TIMEOUT_MS    Combo time limit (default: 3000)
    LOADGATE_COMBO_KEYS          Comma-separated combo (default: a,s,d,f)
    LOADGATE_BUS_CAPACITY        Bus capacity (default: 1000)

EXAMPLES:
    # Three overlapping 2.5s tasks
    loadgate simulate --tasks 3 --duration-ms 2500

    # Short tasks that should never show the indicator
    loadgate simulate --tasks 2 --duration-ms 300 --stagger-ms 100

    # Interactive: '+' starts a task, '-' ends one, 'q' quits
    loadgate watch
")]
struct Cli {
    /// Write logs to stderr as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scripted workload and print indicator events.
    Simulate {
        /// Number of tasks to start.
        #[arg(short, long, default_value_t = 3)]
        tasks: u32,

        /// How long each task runs.
        #[arg(short, long, default_value_t = 2500)]
        duration_ms: u64,

        /// Delay between task starts.
        #[arg(short, long, default_value_t = 400)]
        stagger_ms: u64,

        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Drive tasks and the key combo from the keyboard.
    ///
    /// '+' starts a task, '-' ends one, the combo keys toggle debug mode,
    /// 'q' or Ctrl+C quits.
    Watch {
        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_json);

    // One logical timeline: everything runs on a single thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Command::Simulate {
            tasks,
            duration_ms,
            stagger_ms,
            json,
        } => runtime.block_on(run_simulation(
            config,
            tasks,
            Duration::from_millis(duration_ms),
            Duration::from_millis(stagger_ms),
            json,
        )),
        Command::Watch { json } => runtime.block_on(run_watch(config, json)),
    }
}

/// Runs the simulate command.
async fn run_simulation(
    config: Config,
    tasks: u32,
    duration: Duration,
    stagger: Duration,
    json: bool,
) -> Result<()> {
    let (app, mut events) = Loadgate::start(&config).context("Failed to start loadgate")?;

    info!(tasks, duration_ms = duration.as_millis(), "Starting simulation");

    let signals = app.signals().clone();
    tokio::spawn(async move {
        for task in 0..tasks {
            let signals = signals.clone();
            tokio::spawn(async move {
                debug!(task, "Task started");
                signals.track_future(sleep(duration)).await;
                debug!(task, "Task ended");
            });
            sleep(stagger).await;
        }
    });

    let deadline = Instant::now()
        + stagger * tasks
        + duration
        + config.flash_threshold * 2
        + Duration::from_millis(SIMULATION_TAIL_MS);

    let shown = relay_events(&mut events, wait_for_shutdown(), deadline, |event| {
        print_event(event, json, false)
    })
    .await?;

    info!(display_cycles = shown, "Simulation finished");
    Ok(())
}

/// Passes indicator events to `on_event` until `shutdown` completes,
/// `deadline` passes or the channel closes. Returns how many times the
/// indicator was shown.
async fn relay_events<F>(
    events: &mut mpsc::Receiver<IndicatorEvent>,
    shutdown: F,
    deadline: Instant,
    mut on_event: impl FnMut(&IndicatorEvent) -> Result<()>,
) -> Result<u32>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let expired = sleep_until(deadline);
    tokio::pin!(expired);

    let mut shown = 0u32;
    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            () = &mut expired => break,
            event = events.recv() => match event {
                Some(event) => {
                    if matches!(event, IndicatorEvent::Show(_)) {
                        shown += 1;
                    }
                    on_event(&event)?;
                }
                None => break,
            },
        }
    }

    Ok(shown)
}

/// Runs the watch command.
async fn run_watch(config: Config, json: bool) -> Result<()> {
    let (app, mut events) = Loadgate::start(&config).context("Failed to start loadgate")?;
    let mut keys = app.keys().subscribe();
    let mut debug_changes = app.debug_mode().subscribe();

    let _raw = RawMode::enable().context("Failed to enable raw terminal mode")?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let feed = tokio::spawn(KeyFeed::new(app.keys().clone(), shutdown_rx).run());

    print_line("'+' start task, '-' end task, combo toggles debug mode, 'q' quits", true)?;

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            key = keys.recv() => match key {
                Ok(key) => match key.as_str() {
                    "+" => app.signals().started(),
                    "-" => app.signals().ended(),
                    "q" | "C-c" => break,
                    _ => {}
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Key input lagged"),
                Err(RecvError::Closed) => break,
            },
            event = events.recv() => match event {
                Some(event) => print_event(&event, json, true)?,
                None => break,
            },
            changed = debug_changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let enabled = *debug_changes.borrow_and_update();
                print_line(&format!("debug mode {}", if enabled { "on" } else { "off" }), true)?;
            }
        }
    }

    let _ = shutdown_tx.send(());
    match feed.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Key feed failed"),
        Err(e) => warn!(error = %e, "Key feed task panicked"),
    }

    Ok(())
}

/// Prints one indicator event.
fn print_event(event: &IndicatorEvent, json: bool, raw: bool) -> Result<()> {
    let line = if json {
        serde_json::to_string(event).context("Failed to serialize event")?
    } else {
        match event {
            IndicatorEvent::Show(stats) => {
                format!("show      {}/{} ({}%)", stats.completed, stats.total, stats.percent())
            }
            IndicatorEvent::Progress(stats) => {
                format!("progress  {}/{} ({}%)", stats.completed, stats.total, stats.percent())
            }
            IndicatorEvent::Hide => "hide".to_string(),
        }
    };
    print_line(&line, raw)
}

/// Writes a line to stdout. Raw mode needs an explicit carriage return.
fn print_line(line: &str, raw: bool) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if raw {
        write!(stdout, "{line}\r\n")?;
    } else {
        writeln!(stdout, "{line}")?;
    }
    stdout.flush()?;
    Ok(())
}

/// Keeps the terminal in raw mode until dropped.
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Initializes the logging subsystem.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_level(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadgate::types::LoadStats;

    fn show() -> IndicatorEvent {
        IndicatorEvent::Show(LoadStats {
            total: 1,
            completed: 0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn relay_stops_when_shutdown_fires() {
        let (tx, mut events) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            tx.send(show()).await.unwrap();
            tx.send(IndicatorEvent::Hide).await.unwrap();
            sleep(Duration::from_millis(10)).await;
            shutdown_tx.send(()).unwrap();
            sleep(Duration::from_millis(10)).await;
            let _ = tx.send(show()).await;
        });

        let shutdown = async {
            let _ = shutdown_rx.await;
        };
        let deadline = Instant::now() + Duration::from_secs(60);
        let mut seen = Vec::new();
        let shown = relay_events(&mut events, shutdown, deadline, |event| {
            seen.push(*event);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(shown, 1);
        assert_eq!(seen, vec![show(), IndicatorEvent::Hide]);
    }

    #[tokio::test(start_paused = true)]
    async fn relay_stops_at_deadline() {
        let (_tx, mut events) = mpsc::channel::<IndicatorEvent>(8);
        let start = Instant::now();
        let deadline = start + Duration::from_secs(1);

        let shown = relay_events(&mut events, std::future::pending(), deadline, |_| Ok(()))
            .await
            .unwrap();

        assert_eq!(shown, 0);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_millis(1005));
    }

    #[tokio::test(start_paused = true)]
    async fn relay_propagates_output_errors() {
        let (tx, mut events) = mpsc::channel(8);
        tx.send(show()).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        let result = relay_events(&mut events, std::future::pending(), deadline, |_| {
            Err(anyhow::anyhow!("stdout closed"))
        })
        .await;

        assert!(result.is_err());
    }
}
