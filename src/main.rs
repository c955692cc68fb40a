use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use junket_office::commands::{agents, customers, records, settings, staff, trips};
use junket_office::db::Database;
use junket_office::services::crypto::SecretBox;
use junket_office::services::refresher::TripRefresher;
use junket_office::services::rest::RestTripSource;
use junket_office::services::state::AppState;

const DATA_DIR_ENV: &str = "JUNKET_DATA_DIR";
const LOG_ENV: &str = "JUNKET_LOG";

#[derive(Debug, Parser)]
#[command(name = "junket-office", about = "Trip accounting and agent profit sharing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Trip(TripCommand),
    #[command(subcommand)]
    Customer(CustomerCommand),
    #[command(subcommand)]
    Agent(AgentCommand),
    #[command(subcommand)]
    Staff(StaffCommand),
    #[command(subcommand)]
    Record(RecordCommand),
    /// Print a trip's report every time it changes.
    Watch {
        trip_id: String,
        /// Poll the configured backend instead of the local database.
        #[arg(long)]
        remote: bool,
    },
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Debug, Subcommand)]
enum TripCommand {
    Create {
        name: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    List,
    Report {
        trip_id: String,
    },
    /// Set an agent's share of the trip result.
    Share {
        trip_id: String,
        agent_id: String,
        percentage: f64,
    },
    /// Take an agent out of the trip's profit sharing.
    Unshare {
        trip_id: String,
        agent_id: String,
        /// Keep the agent on the trip but inactive.
        #[arg(long)]
        deactivate: bool,
    },
    Expense {
        trip_id: String,
        amount: f64,
        category: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        by: Option<String>,
    },
    Status {
        trip_id: String,
        status: String,
    },
    AddCustomer {
        trip_id: String,
        customer_id: String,
        #[arg(long)]
        rate: Option<f64>,
    },
}

#[derive(Debug, Subcommand)]
enum CustomerCommand {
    Create {
        name: String,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        rate: Option<f64>,
    },
    List {
        #[arg(long)]
        agent: Option<String>,
    },
    Totals {
        customer_id: String,
        #[arg(long)]
        since: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum AgentCommand {
    Create {
        name: String,
        #[arg(long)]
        rate: Option<f64>,
    },
    List,
    Profit {
        agent_id: String,
    },
}

#[derive(Debug, Subcommand)]
enum StaffCommand {
    Create {
        name: String,
        #[arg(long)]
        role: Option<String>,
    },
    List,
}

#[derive(Debug, Subcommand)]
enum RecordCommand {
    Rolling {
        customer_id: String,
        rolling: f64,
        #[arg(allow_negative_numbers = true)]
        win_loss: f64,
        #[arg(long)]
        staff: String,
        #[arg(long)]
        trip: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        buy_in: f64,
        #[arg(long, default_value_t = 0.0)]
        buy_out: f64,
        #[arg(long)]
        game: Option<String>,
        #[arg(long)]
        venue: Option<String>,
        #[arg(long)]
        table: Option<String>,
    },
    Cash {
        customer_id: String,
        /// `buy-in` or `buy-out`
        direction: String,
        amount: f64,
        #[arg(long)]
        staff: String,
        #[arg(long)]
        trip: Option<String>,
        #[arg(long)]
        venue: Option<String>,
        #[arg(long)]
        table: Option<String>,
    },
    /// Read a photographed table receipt and record its session.
    Receipt {
        customer_id: String,
        image: PathBuf,
        #[arg(long)]
        staff: String,
        #[arg(long)]
        trip: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    Show,
    Set {
        #[arg(long)]
        backend_url: Option<String>,
        #[arg(long)]
        backend_key: Option<String>,
        #[arg(long)]
        openai_key: Option<String>,
        #[arg(long)]
        poll_interval: Option<u64>,
        #[arg(long)]
        numeric_mode: Option<String>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_state() -> Result<AppState> {
    let data_dir = std::env::var(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"));
    std::fs::create_dir_all(&data_dir).with_context(|| format!("create {}", data_dir.display()))?;

    let db = Database::new(data_dir.join("junket.sqlite"))?;
    let loaded = settings::load_settings(&db);
    info!(data_dir = %data_dir.display(), mode = loaded.numeric_mode.as_str(), "database opened");
    Ok(AppState::new(db, loaded, SecretBox::from_env()))
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Command errors come back as plain strings.
fn surface<T>(result: Result<T, String>) -> Result<T> {
    result.map_err(|e| anyhow!(e))
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("junket-office: {:#}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let state = open_state()?;

    match cli.command {
        Command::Trip(command) => run_trip(command, &state).await,
        Command::Customer(command) => match command {
            CustomerCommand::Create { name, agent, rate } => {
                let payload = customers::CreateCustomerPayload {
                    name,
                    agent_id: agent,
                    rolling_percentage: rate,
                };
                print(&surface(customers::create_customer(payload, &state).await)?)
            }
            CustomerCommand::List { agent } => {
                print(&surface(customers::list_customers(agent.as_deref(), &state).await)?)
            }
            CustomerCommand::Totals { customer_id, since } => print(&surface(
                customers::get_customer_totals(&customer_id, since.as_deref(), &state).await,
            )?),
        },
        Command::Agent(command) => match command {
            AgentCommand::Create { name, rate } => {
                let payload = agents::CreateAgentPayload {
                    name,
                    commission_rate: rate,
                };
                print(&surface(agents::create_agent(payload, &state).await)?)
            }
            AgentCommand::List => print(&surface(agents::list_agents(&state).await)?),
            AgentCommand::Profit { agent_id } => print(&surface(agents::get_agent_profit(&agent_id, &state).await)?),
        },
        Command::Staff(command) => match command {
            StaffCommand::Create { name, role } => {
                print(&surface(staff::create_staff(staff::CreateStaffPayload { name, role }, &state).await)?)
            }
            StaffCommand::List => print(&surface(staff::list_staff(&state).await)?),
        },
        Command::Record(command) => run_record(command, &state).await,
        Command::Watch { trip_id, remote } => watch(&trip_id, remote, &state).await,
        Command::Settings(command) => match command {
            SettingsCommand::Show => print(&surface(settings::get_settings(&state).await)?),
            SettingsCommand::Set {
                backend_url,
                backend_key,
                openai_key,
                poll_interval,
                numeric_mode,
            } => {
                let payload = settings::SettingsPayload {
                    backend_url,
                    backend_api_key: backend_key,
                    openai_api_key: openai_key,
                    poll_interval_secs: poll_interval,
                    numeric_mode,
                };
                print(&surface(settings::save_settings(payload, &state).await)?)
            }
        },
    }
}

async fn run_trip(command: TripCommand, state: &AppState) -> Result<()> {
    match command {
        TripCommand::Create {
            name,
            start,
            end,
            status,
        } => {
            let payload = trips::CreateTripPayload {
                name,
                start_date: start,
                end_date: end,
                status,
            };
            print(&surface(trips::create_trip(payload, state).await)?)
        }
        TripCommand::List => print(&surface(trips::list_trips(state).await)?),
        TripCommand::Report { trip_id } => print(&surface(trips::get_trip_statistics(&trip_id, state).await)?),
        TripCommand::Share {
            trip_id,
            agent_id,
            percentage,
        } => {
            let payload = trips::UpdateSharePayload {
                trip_id,
                agent_id,
                share_percentage: percentage,
            };
            print(&surface(trips::update_agent_commission(payload, state).await)?)
        }
        TripCommand::Unshare {
            trip_id,
            agent_id,
            deactivate,
        } => {
            let sharing = if deactivate {
                trips::deactivate_trip_agent(&trip_id, &agent_id, state).await
            } else {
                trips::remove_trip_agent(&trip_id, &agent_id, state).await
            };
            print(&surface(sharing)?)
        }
        TripCommand::Expense {
            trip_id,
            amount,
            category,
            description,
            by,
        } => {
            let payload = trips::AddExpensePayload {
                trip_id,
                amount,
                category,
                description,
                recorded_by: by,
            };
            print(&surface(trips::add_expense(payload, state).await)?)
        }
        TripCommand::Status { trip_id, status } => {
            surface(trips::set_trip_status(&trip_id, &status, state).await)?;
            println!("{} is now {}", trip_id, status.trim().to_ascii_lowercase());
            Ok(())
        }
        TripCommand::AddCustomer {
            trip_id,
            customer_id,
            rate,
        } => {
            let payload = trips::AddTripCustomerPayload {
                trip_id: trip_id.clone(),
                customer_id: customer_id.clone(),
                rolling_percentage: rate,
            };
            surface(trips::add_trip_customer(payload, state).await)?;
            print(&surface(trips::sync_trip_customer(&trip_id, &customer_id, state).await)?)
        }
    }
}

async fn run_record(command: RecordCommand, state: &AppState) -> Result<()> {
    match command {
        RecordCommand::Rolling {
            customer_id,
            rolling,
            win_loss,
            staff,
            trip,
            buy_in,
            buy_out,
            game,
            venue,
            table,
        } => {
            let payload = records::RollingPayload {
                customer_id,
                trip_id: trip,
                staff_id: staff,
                rolling_amount: rolling,
                win_loss,
                buy_in_amount: buy_in,
                buy_out_amount: buy_out,
                game_type: game,
                venue,
                table_number: table,
            };
            print(&surface(records::record_rolling(payload, state).await)?)
        }
        RecordCommand::Cash {
            customer_id,
            direction,
            amount,
            staff,
            trip,
            venue,
            table,
        } => {
            let payload = records::CashPayload {
                customer_id,
                trip_id: trip,
                staff_id: staff,
                direction,
                amount,
                venue,
                table_number: table,
            };
            print(&surface(records::record_buy_in_out(payload, state).await)?)
        }
        RecordCommand::Receipt {
            customer_id,
            image,
            staff,
            trip,
        } => {
            let bytes = std::fs::read(&image).with_context(|| format!("read {}", image.display()))?;
            let payload = records::ReceiptPayload {
                customer_id,
                trip_id: trip,
                staff_id: staff,
                image: bytes,
                mime_type: mime_type(&image).to_string(),
            };
            print(&surface(records::record_rolling_from_receipt(payload, state).await)?)
        }
    }
}

fn mime_type(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Streams reports for one trip until interrupted.
async fn watch(trip_id: &str, remote: bool, state: &AppState) -> Result<()> {
    let interval = state.poll_interval()?;
    let refresher = if remote {
        let current = surface(settings::get_settings(state).await)?;
        let url = current
            .backend_url
            .ok_or_else(|| anyhow!("No backend URL configured"))?;
        let key = match current.backend_api_key {
            Some(sealed) => state.secrets.open(&sealed).context("open backend key")?,
            None => return Err(anyhow!("No backend key configured")),
        };
        let source = Arc::new(RestTripSource::new(&url, &key));
        Arc::new(TripRefresher::new(source, current.numeric_mode))
    } else {
        state.refresher.clone()
    };

    let mut rx = refresher.subscribe(trip_id)?;
    let poller = if remote {
        Some(refresher.spawn_polling(trip_id, interval))
    } else {
        state.watch_trip(trip_id)?;
        None
    };
    info!(trip_id, remote, "watching trip, press Ctrl-C to stop");
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = rx.borrow_and_update().clone();
                if let Some(report) = report {
                    print(&*report)?;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(rx);
    if let Some(poller) = poller {
        poller.abort();
    }
    state.unwatch_trip(trip_id)?;
    Ok(())
}
