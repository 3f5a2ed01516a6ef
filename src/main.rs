use alarm_monitor::{logging, AlarmMonitor, EventQuery, MonitorConfig, Notification, Timestamp};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (JSON).  Defaults to the per-user config dir.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Event database, overriding the configured path.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a serial port until Ctrl-C or the connection is lost.
    Monitor {
        /// Port name, e.g. COM3 or /dev/ttyUSB0.
        #[arg(long, short)]
        port: String,
        /// Baud rate, overriding the configured one.
        #[arg(long, short)]
        baud: Option<u32>,
    },
    /// Print stored events, newest first.
    History {
        /// Inclusive lower bound, `YYYY-MM-DD HH:MM:SS`.
        #[arg(long)]
        from: Option<String>,
        /// Inclusive upper bound, `YYYY-MM-DD HH:MM:SS`.
        #[arg(long)]
        to: Option<String>,
        /// First day to include (`YYYY-MM-DD`).
        #[arg(long, conflicts_with = "from")]
        from_date: Option<NaiveDate>,
        /// Last day to include (`YYYY-MM-DD`).
        #[arg(long, conflicts_with = "to")]
        to_date: Option<NaiveDate>,
        #[arg(long, short)]
        limit: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = MonitorConfig::load_or_default(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    logging::init(&config.log_level).map_err(|e| e as Box<dyn std::error::Error>)?;
    tracing::debug!(database = %config.database_path.display(), "Configuration loaded.");

    match cli.command {
        Commands::Monitor { port, baud } => {
            if let Some(baud) = baud {
                config.serial.baud_rate = baud;
            }
            run_monitor(config, &port).await?
        }
        Commands::History {
            from,
            to,
            from_date,
            to_date,
            limit,
        } => {
            let mut query = EventQuery::all();
            if let Some(day) = from_date {
                query = query.with_from(Timestamp::start_of_day(day));
            }
            if let Some(day) = to_date {
                query = query.with_to(Timestamp::end_of_day(day));
            }
            if let Some(from) = from {
                query = query.with_from(from);
            }
            if let Some(to) = to {
                query = query.with_to(to);
            }
            if let Some(limit) = limit {
                query = query.with_limit(limit);
            }
            print_history(config, &query).await?
        }
    }

    Ok(())
}

async fn run_monitor(config: MonitorConfig, port: &str) -> Result<(), Box<dyn std::error::Error>> {
    let monitor = AlarmMonitor::open(config).await?;
    let mut notifications = monitor.subscribe();
    monitor.connect_default(port).await?;
    tracing::info!(port, "Monitoring; press Ctrl-C to stop.");

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            received = notifications.recv() => match received {
                Ok(Notification::ConnectionLost { port, reason }) => {
                    tracing::error!(%port, %reason, "Connection lost.");
                    break Err(format!("connection to {} lost: {}", port, reason));
                }
                Ok(Notification::StateChanged { new_state, latest_event }) => match latest_event {
                    Some(event) => tracing::info!(state = %new_state, id = event.id, at = %event.timestamp, "Alarm state changed."),
                    None => tracing::warn!(state = %new_state, "Alarm state changed; event not stored."),
                },
                Ok(Notification::AlertRaised { handle }) => tracing::warn!(%handle, "ALARM ACTIVE"),
                Ok(Notification::AlertCleared { handle }) => tracing::info!(%handle, "Alarm cleared."),
                Ok(Notification::StoreDegraded { message }) => tracing::error!(%message, "Event store degraded."),
                Ok(other) => tracing::debug!(?other, "Notification."),
                Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "Notification stream lagged."),
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    monitor.disconnect().await;
    outcome.map_err(Into::into)
}

async fn print_history(config: MonitorConfig, query: &EventQuery) -> Result<(), Box<dyn std::error::Error>> {
    let monitor = AlarmMonitor::open(config).await?;
    let events = monitor.query_with(query).await?;
    for event in &events {
        println!("{:>6}  {}  {}", event.id, event.timestamp, event.kind);
    }
    tracing::debug!(count = events.len(), "History printed.");
    Ok(())
}
