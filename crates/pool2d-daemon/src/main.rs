//! 2D Pool Daemon
//!
//! Runs the slot scheduler (lock at the lock minute, settle from the settle
//! minute) and exposes the administrative operations as subcommands.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use pool2d_core::config::{Config, load_config};
use pool2d_core::slot::SlotCode;
use pool2d_daemon::draws::DrawEntry;
use pool2d_daemon::scheduler::spawn_scheduler;
use pool2d_daemon::services::Services;
use pool2d_daemon::storage::Database;
use pool2d_daemon::submission::{LineInput, Submission, submit};

#[derive(Parser, Debug)]
#[command(name = "pool2d-daemon")]
#[command(version, about = "2D pool daemon - slot locking and settlement")]
struct Args {
    /// Database file path
    #[arg(long, global = true, env = "POOL2D_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, global = true, env = "POOL2D_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true, env = "POOL2D_LOG_JSON")]
    log_json: bool,

    /// Directory holding a `.pool2d/settings.json` project config.
    #[arg(long, global = true, env = "POOL2D_PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until Ctrl+C or SIGTERM.
    Run,

    /// Settle the most recent slot past its lock time.
    Settle,

    /// Settle one market of one slot.
    SettleOne {
        /// Slot code, e.g. 20250906/1950
        #[arg(long)]
        code: SlotCode,
        #[arg(long)]
        market: String,
    },

    /// Lock one slot, or every overdue slot that still has active bets.
    Lock {
        #[arg(long)]
        code: Option<SlotCode>,
    },

    /// Delete and recompute every market's winning records of a slot.
    Resettle {
        #[arg(long)]
        code: SlotCode,
    },

    /// Record the draw result of one (slot, market).
    RecordDraw {
        #[arg(long)]
        code: SlotCode,
        #[arg(long)]
        market: String,
        /// Head number
        #[arg(long)]
        head: String,
        /// Comma-separated special numbers
        #[arg(long, default_value = "")]
        specials: String,
        /// Size class (big/small); derived from the head when omitted
        #[arg(long)]
        size: Option<String>,
        /// Parity class (odd/even); derived from the head when omitted
        #[arg(long)]
        parity: Option<String>,
    },

    /// Submit bets as one order.
    Bet {
        #[arg(long)]
        agent: i64,
        /// Target slot (repeatable); defaults to the next open slot
        #[arg(long = "code")]
        codes: Vec<SlotCode>,
        /// Market symbol (repeatable)
        #[arg(long = "market", required = true)]
        markets: Vec<String>,
        /// `NUMBER=n1,n,big,small,odd,even` (repeatable)
        #[arg(long = "line", required = true)]
        lines: Vec<LineInput>,
    },

    /// Delete an order that has not been locked yet.
    DeleteOrder {
        #[arg(long)]
        order: String,
        #[arg(long)]
        agent: i64,
    },

    /// List the slots of a day with their lock state.
    Slots {
        /// Day as YYYY-MM-DD; defaults to today in the slot timezone
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// List winning records of a slot or of an agent.
    Winnings {
        #[arg(long, required_unless_present = "agent")]
        code: Option<SlotCode>,
        #[arg(long)]
        market: Option<String>,
        #[arg(long, conflicts_with = "code")]
        agent: Option<i64>,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.project_dir.as_deref())?;
    if let Some(level) = &args.log_level {
        config.daemon.log_level.clone_from(level);
    }
    if let Some(path) = &args.db_path {
        config.daemon.database_path = Some(path.clone());
    }

    let log_filter =
        pool2d_core::tracing_init::default_filter("pool2d_daemon", &config.daemon.log_level);
    pool2d_core::tracing_init::init_tracing(&log_filter, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        timezone = %config.clock.timezone,
        markets = config.markets.symbols.len(),
        "Starting pool2d-daemon"
    );

    let db_path = match &config.daemon.database_path {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    info!(path = %db_path.display(), "Opening database");
    let db = Database::open(&db_path).await?;
    let services = Services::new(db, &config)?;
    let clock = config.clock.slot_clock()?;

    match args.command {
        Command::Run => run(&services, &config).await?,
        Command::Settle => {
            let report = services.engine.settle_due(&clock.now()).await?;
            print_json(&report)?;
        }
        Command::SettleOne { code, market } => {
            let market = config
                .markets
                .resolve(&market)
                .ok_or_else(|| anyhow::anyhow!("unknown market '{market}'"))?;
            let report = services.engine.settle_market(&code, market).await?;
            print_json(&report)?;
        }
        Command::Lock { code } => {
            let now = clock.now();
            let locked = match code {
                Some(code) => vec![(code, services.bets.mark_locked(&code, &now).await?)],
                None => services.bets.lock_overdue(&now, None).await?,
            };
            let locked: Vec<_> = locked
                .into_iter()
                .map(|(code, rows)| serde_json::json!({ "code": code, "locked": rows }))
                .collect();
            print_json(&locked)?;
        }
        Command::Resettle { code } => {
            let report = services.engine.resettle_slot(&code).await?;
            print_json(&report)?;
        }
        Command::RecordDraw {
            code,
            market,
            head,
            specials,
            size,
            parity,
        } => {
            let entry = DrawEntry {
                head: &head,
                specials: &specials,
                size: size.as_deref(),
                parity: parity.as_deref(),
            };
            let draw = services.draws.record_draw(&code, &market, &entry).await?;
            print_json(&draw)?;
        }
        Command::Bet {
            agent,
            codes,
            markets,
            lines,
        } => {
            let now = clock.now();
            let codes = if codes.is_empty() {
                vec![clock.next_slot(&now)]
            } else {
                codes
            };
            let submission = Submission {
                agent_id: agent,
                codes,
                markets,
                lines,
            };
            let receipt = submit(&services.bets, &submission, &now).await?;
            info!(order_code = %receipt.order_code, "{}", receipt.summary());
            print_json(&receipt)?;
        }
        Command::DeleteOrder { order, agent } => {
            let rows = services
                .bets
                .mark_deleted(&order, agent, &clock.now())
                .await?;
            print_json(&serde_json::json!({ "order_code": order, "deleted": rows }))?;
        }
        Command::Slots { date } => {
            let now = clock.now();
            let date = date.unwrap_or_else(|| now.date_naive());
            print_json(&clock.slots_for_day(date, &now))?;
        }
        Command::Winnings {
            code,
            market,
            agent,
            limit,
        } => {
            let records = match (agent, code) {
                (Some(agent), _) => services.db.list_winnings_for_agent(agent, limit).await?,
                (None, Some(code)) => {
                    services
                        .db
                        .list_winnings(&code.to_string(), market.as_deref())
                        .await?
                }
                (None, None) => anyhow::bail!("either --code or --agent is required"),
            };
            print_json(&records)?;
        }
    }

    Ok(())
}

/// Drive the scheduler until a shutdown signal arrives.
async fn run(services: &Services, config: &Config) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = spawn_scheduler(
        services.scheduler(config),
        Duration::from_secs(config.scheduler.tick_secs),
        shutdown_rx,
    );

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    info!(
        tick_secs = config.scheduler.tick_secs,
        lock_minute = config.clock.lock_minute,
        settle_minute = config.scheduler.settle_minute,
        "Scheduler running"
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = handle.await;

    info!("Daemon stopped");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Default database path: the config directory's `pool2d.db`, else
/// ~/.pool2d/pool2d.db
fn default_db_path() -> anyhow::Result<PathBuf> {
    if let Some(path) = pool2d_core::config::database_path() {
        return Ok(path);
    }
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".pool2d").join("pool2d.db"))
}
