//! Portfolio advisor CLI.
//!
//! ```bash
//! # one symbol: report table plus terminal summary
//! portfolio-advisor analyze -i input.csv -o stock_analysis.csv
//!
//! # every row: Dashboard table and JSON snapshot
//! portfolio-advisor batch -i input.csv -s settings.csv -o dashboard.csv
//!
//! # view a Dashboard
//! portfolio-advisor dashboard -i dashboard.csv
//! portfolio-advisor tui
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;

mod advice;
mod analysis;
mod comfy_table;
mod error;
mod exchange_rate;
mod forecast;
mod indicators;
mod live_quote;
mod portfolio;
mod price_history;
mod profit;
mod report;
mod settings;
mod storage_utils;
mod tui;

use analysis::{BatchJob, SingleJob, Sources};
use exchange_rate::ExchangeRateClient;
use forecast::ForecastAnchor;
use live_quote::{CapitalClient, LiveQuoteSource};
use price_history::YahooHistory;
use report::RunSnapshot;
use settings::Settings;

#[derive(Parser)]
#[command(name = "portfolio-advisor")]
#[command(
    about = "RSI advice, 7-day trend forecast and profit estimates for a stock portfolio",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Directory for the JSON run snapshot (default: `storage/` next to the binary)
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    /// Forecast anchor override (last-observed, current-date)
    #[arg(long, global = true)]
    anchor: Option<ForecastAnchor>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one row of the input table
    Analyze {
        #[arg(short, long, default_value = "input.csv")]
        input: PathBuf,

        /// Settings table (defaults apply when omitted)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        #[arg(short, long, default_value = "stock_analysis.csv")]
        output: PathBuf,

        /// 1-based data row (default: first complete row)
        #[arg(long)]
        row: Option<usize>,
    },

    /// Analyze every row and write the Dashboard table
    Batch {
        #[arg(short, long, default_value = "input.csv")]
        input: PathBuf,

        #[arg(short, long, default_value = "settings.csv")]
        settings: PathBuf,

        #[arg(short, long, default_value = "dashboard.csv")]
        output: PathBuf,
    },

    /// Print a Dashboard table with live advice and breakdowns
    Dashboard {
        #[arg(short, long, default_value = "dashboard.csv")]
        input: PathBuf,
    },

    /// Interactive Dashboard viewer (F5 reruns the batch)
    Tui {
        #[arg(short, long, default_value = "dashboard.csv")]
        dashboard: PathBuf,

        /// Input table used when rerunning the batch
        #[arg(short, long, default_value = "input.csv")]
        input: PathBuf,

        #[arg(short, long, default_value = "settings.csv")]
        settings: PathBuf,
    },

    /// Brokerage handshake for one symbol; prints the raw price payload
    Quote {
        symbol: String,

        #[arg(short, long)]
        settings: Option<PathBuf>,
    },
}

fn init_logging(quiet: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    // the TUI owns the terminal
    if quiet {
        builder.with_writer(std::io::sink).init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
}

/// Batch run against Yahoo, exchangerate.host and, when enabled, Capital.com.
/// Shared by `batch` and the TUI's F5.
pub(crate) async fn run_batch_job(job: &BatchJob, today: NaiveDate) -> Result<RunSnapshot> {
    let settings = settings::load_settings(&job.settings)?;
    let history = YahooHistory::new()?;
    let live = analysis::brokerage(&settings);
    let sources = Sources {
        history: &history,
        live: live.as_ref().map(|c| c as &dyn LiveQuoteSource),
    };
    let rates = ExchangeRateClient::new();
    analysis::run_analysis_pipeline(job, &settings, &sources, &rates, today).await
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(matches!(cli.command, Commands::Tui { .. }));

    let storage_dir = match cli.storage_dir {
        Some(dir) => dir,
        None => storage_utils::beside_executable("storage")?,
    };
    let today = chrono::Local::now().date_naive();

    match cli.command {
        Commands::Analyze {
            input,
            settings,
            output,
            row,
        } => {
            let settings = match settings {
                Some(path) => settings::load_settings(&path)?,
                None => Settings::default(),
            };
            let job = SingleJob {
                input,
                output,
                row,
                anchor: cli.anchor,
            };
            let history = YahooHistory::new()?;
            let live = analysis::brokerage(&settings);
            let sources = Sources {
                history: &history,
                live: live.as_ref().map(|c| c as &dyn LiveQuoteSource),
            };
            let rates = ExchangeRateClient::new();
            let analysis =
                analysis::run_single_pipeline(&job, &settings, &sources, &rates, today).await?;
            comfy_table::print_symbol_report(&analysis.result, &settings.currency_symbol);
            println!("\nReport written to {}", job.output.display());
        }

        Commands::Batch {
            input,
            settings,
            output,
        } => {
            let job = BatchJob {
                input,
                settings,
                dashboard: output,
                storage_dir,
                anchor: cli.anchor,
            };
            let snapshot = run_batch_job(&job, today).await?;
            comfy_table::print_dashboard(
                &analysis::dashboard_of(&snapshot),
                &snapshot.currency_symbol,
                &snapshot.data_sources(),
            );
            comfy_table::print_run_totals(&snapshot.summary, &snapshot.currency_symbol);
            println!("\nDashboard written to {}", job.dashboard.display());
        }

        Commands::Dashboard { input } => {
            let table = report::load_dashboard(&input)?;
            let (sources, currency_symbol) = match report::find_snapshot(&storage_dir).await {
                Ok(snapshot) => (snapshot.data_sources(), snapshot.currency_symbol),
                Err(_) => (HashMap::new(), String::new()),
            };
            comfy_table::print_dashboard(&table, &currency_symbol, &sources);
        }

        Commands::Tui {
            dashboard,
            input,
            settings,
        } => {
            let job = BatchJob {
                input,
                settings,
                dashboard,
                storage_dir,
                anchor: cli.anchor,
            };
            tui::run_tui(job).await?;
        }

        Commands::Quote { symbol, settings } => {
            let settings = match settings {
                Some(path) => settings::load_settings(&path)?,
                None => Settings::default(),
            };
            let credentials = settings.capital_credentials().ok_or_else(|| {
                anyhow::anyhow!("no Capital API key in settings or CAPITAL_API_KEY")
            })?;
            let client = CapitalClient::new(credentials);

            let session = client.open_session().await?;
            info!("brokerage session opened");
            let payload = client.prices(&session, &symbol).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }

    Ok(())
}
