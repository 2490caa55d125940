use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use salon_ops::actions::{ActionResponse, Actions};
use salon_ops::auth::{Role, UserContext};
use salon_ops::config::AppConfig;
use salon_ops::db::establish_connection;
use salon_ops::feed::{DemoFeed, FeedMessage, FeedState};
use salon_ops::logging::{init_logging, OperationTimer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and booking feed
    Serve {
        /// Interface to bind, overrides the config
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, overrides the config
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Create or upgrade the database schema
    Migrate,
    /// Print availability for a staff member on a day
    Slots {
        /// Staff member id
        #[arg(short, long)]
        staff_id: String,

        /// Day to inspect (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,

        /// Appointment length in minutes; prints bookable slots instead of the day summary
        #[arg(long)]
        duration: Option<u32>,
    },
    /// Write the calendar file of an appointment
    ExportIcs {
        /// Appointment id
        #[arg(short, long)]
        appointment_id: String,

        /// Output file, defaults to appointment-<code>.ics
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print fabricated feed traffic
    DemoFeed {
        /// Messages to generate
        #[arg(short, long, default_value = "10")]
        count: usize,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    let log_level = config.get_log_level();
    let log_file = config.logging.file_path.as_ref().map(PathBuf::from);
    let _guard = init_logging(
        Some(log_level.as_str()),
        Some(config.logging.format.as_str()),
        log_file.as_deref(),
    )?;

    info!("Starting salon-ops");

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await?,
        Commands::Migrate => migrate(&config)?,
        Commands::Slots {
            staff_id,
            date,
            duration,
        } => print_slots(config, &staff_id, &date, duration).await?,
        Commands::ExportIcs {
            appointment_id,
            output,
        } => export_ics(config, &appointment_id, output).await?,
        Commands::DemoFeed { count, seed } => demo_feed(&config, count, seed)?,
    }

    Ok(())
}

fn open_actions(config: AppConfig) -> Result<Actions> {
    let db = establish_connection(&config)?;
    Ok(Actions::new(db, config))
}

/// Unwrap an action envelope into an anyhow error carrying its message
fn envelope<T>(response: ActionResponse<T>) -> Result<T> {
    response.into_result().map_err(|e| anyhow!(e))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{value}', expected YYYY-MM-DD"))
}

async fn serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;

    let actions = open_actions(config)?;
    salon_ops::server::serve(actions, addr).await
}

fn migrate(config: &AppConfig) -> Result<()> {
    let timer = OperationTimer::new("migrate");
    let db = establish_connection(config)?;
    db.get_connection()
        .context("Database opened but no connection could be checked out")?;
    info!(url = %config.get_database_url(), "Schema is up to date");
    timer.finish();
    Ok(())
}

async fn print_slots(config: AppConfig, staff_id: &str, date: &str, duration: Option<u32>) -> Result<()> {
    let date = parse_date(date)?;
    let actions = open_actions(config)?;

    let output = if let Some(duration) = duration {
        let staff = envelope(actions.get_staff_by_id(staff_id).await)?;
        let slots = envelope(
            actions
                .get_available_time_slots(&staff.salon_id, date, duration, Some(staff_id.to_string()))
                .await,
        )?;
        let open = slots.iter().filter(|s| s.available).count();
        info!(total = slots.len(), open, "Slots computed");
        serde_json::to_string_pretty(&slots)?
    } else {
        let calendar = envelope(actions.get_availability_calendar(staff_id, date, date).await)?;
        serde_json::to_string_pretty(&calendar)?
    };

    println!("{output}");
    Ok(())
}

async fn export_ics(config: AppConfig, appointment_id: &str, output: Option<PathBuf>) -> Result<()> {
    let actions = open_actions(config)?;
    let operator = UserContext::new("cli", None, Role::Admin);
    let file = envelope(actions.get_booking_calendar(&operator, appointment_id).await)?;

    let path = output.unwrap_or_else(|| PathBuf::from(&file.file_name));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(&path, file.content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), "Calendar exported");
    println!("{}", path.display());
    Ok(())
}

fn demo_feed(config: &AppConfig, count: usize, seed: Option<u64>) -> Result<()> {
    let mut demo = seed.map_or_else(DemoFeed::default, DemoFeed::seeded);
    let mut state = FeedState::new(config.feed.max_feed_items);
    let today = Local::now().date_naive();

    for i in 0..count {
        let message = if i == 0 {
            FeedMessage::Capacity(demo.capacity(today))
        } else if let Some(conflict) = (i % 5 == 0).then(|| demo.maybe_conflict()).flatten() {
            FeedMessage::Conflict(conflict)
        } else {
            FeedMessage::BookingUpdate(demo.update())
        };
        println!("{}", serde_json::to_string(&message)?);
        state.apply(message, Utc::now().timestamp_millis());
    }

    if !state.conflicts().is_empty() {
        warn!(conflicts = state.conflicts().len(), "Demo feed produced conflicts");
    }
    info!(
        items = state.items().len(),
        unread = state.unread_count(),
        "Demo feed finished"
    );
    Ok(())
}
