use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deptsched_cli::cli::protocol::parse_record_ref;
use deptsched_cli::cli::{CliCommand, CliConfig, Fixture, Response, Session};
use deptsched_core::tracing_setup::init_tracing_with_default;

#[derive(Parser)]
#[command(name = "deptsched")]
#[command(about = "Department schedule aggregation and record discussions")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short)]
    pretty: bool,

    /// Path to JSON config file (contains fixture, core settings)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// JSON store seed; overrides the config file's fixture
    #[arg(long, short = 'f')]
    fixture: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered categories
    Categories,

    /// Aggregate a schedule across all sources
    Agenda {
        /// User whose personal meetings are included (defaults to the store identity)
        #[arg(long, short = 'u')]
        user: Option<String>,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: Option<String>,
        /// Last day, YYYY-MM-DD (inclusive)
        #[arg(long)]
        to: Option<String>,
        /// Only items with exactly this priority
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        priority: Option<u8>,
        /// Annotate items with unread counts for this viewer
        #[arg(long)]
        with_unread: Option<String>,
    },

    /// Refresh an agenda on the auto-refresh timer
    Watch {
        #[arg(long, short = 'u')]
        user: Option<String>,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        /// Snapshots to collect, the first being immediate
        #[arg(long, default_value_t = 2)]
        ticks: u32,
    },

    /// Unread counts for several records
    Unread {
        /// Viewer id (defaults to the store identity)
        #[arg(long)]
        viewer: Option<String>,
        /// Records as RECORD:CATEGORY
        #[arg(required = true, value_parser = parse_record_ref)]
        records: Vec<(String, String)>,
    },

    /// Show a record's discussion
    Thread {
        record: String,
        category: String,
        /// Mark incoming messages read for this viewer
        #[arg(long)]
        mark_read_as: Option<String>,
    },

    /// Post a message to a record's discussion
    Send {
        record: String,
        category: String,
        content: String,
        /// Sender id (defaults to the store identity)
        #[arg(long)]
        sender: Option<String>,
    },
}

impl From<Commands> for CliCommand {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Categories => CliCommand::Categories,
            Commands::Agenda {
                user,
                from,
                to,
                priority,
                with_unread,
            } => CliCommand::Agenda {
                user,
                from,
                to,
                priority,
                with_unread,
            },
            Commands::Watch {
                user,
                from,
                to,
                ticks,
            } => CliCommand::Watch {
                user,
                from,
                to,
                ticks,
            },
            Commands::Unread { viewer, records } => CliCommand::Unread { viewer, records },
            Commands::Thread {
                record,
                category,
                mark_read_as,
            } => CliCommand::Thread {
                record,
                category,
                mark_read_as,
            },
            Commands::Send {
                record,
                category,
                content,
                sender,
            } => CliCommand::Send {
                record,
                category,
                sender,
                content,
            },
        }
    }
}

fn main() {
    init_tracing_with_default("warn");
    let cli = Cli::parse();
    let pretty = cli.pretty;

    let response = match run(cli) {
        Ok(result) => Response::success(result),
        Err(e) => Response::from_error(&e),
    };
    let ok = response.ok;

    let output = if pretty {
        serde_json::to_string_pretty(&response)
    } else {
        serde_json::to_string(&response)
    };
    match output {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
    if !ok {
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<serde_json::Value> {
    let config = CliConfig::resolve(cli.config.as_deref())?;
    let fixture_path = cli
        .fixture
        .or_else(|| config.fixture.clone())
        .context("No store fixture: pass --fixture or set \"fixture\" in the config file")?;
    let store = Fixture::load(&fixture_path)?.into_store();
    let session = Session::new(store, config.core_config());

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(session.execute(cli.command.into()))
}
