use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use ratatui::DefaultTerminal;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

mod assist;
mod controller;
mod dataset;
mod domain;
mod filter;
mod index;
mod inputter;
mod inventory;
mod loader;
mod model;
mod tokenizer;
mod ui;

use assist::{HttpPromptExecutor, PredictionRequest, SummaryRequest};
use controller::Controller;
use domain::{AVConfig, AVError};
use loader::Source;
use model::{Model, Status};
use ui::AssetUI;

/// Browse, filter and search asset inventories in the terminal.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// CSV, parquet or arrow file, or an http(s) URL serving CSV
    source: Option<String>,

    /// Upper bound for the width of a single column
    #[arg(long, default_value_t = 40)]
    max_column_width: usize,

    /// Milliseconds to wait for a key press before redrawing
    #[arg(long, default_value_t = 100)]
    event_poll_time: u64,

    /// Write logs to this file (level from RUST_LOG, default info)
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask the assistant a free form question
    Chat {
        query: String,
        #[command(flatten)]
        service: ServiceArgs,
    },
    /// Predict whether an asset is about to fail
    Predict {
        #[arg(long)]
        asset_id: String,
        #[arg(long)]
        historical_data: String,
        #[arg(long)]
        realtime_metrics: String,
        #[command(flatten)]
        service: ServiceArgs,
    },
    /// Executive summary of inventory totals
    Summary {
        /// Count the assets of this file or URL instead of passing --total-assets
        #[arg(long, required_unless_present = "total_assets")]
        source: Option<String>,
        #[arg(long)]
        total_assets: Option<u64>,
        #[arg(long)]
        high_risk_items: u64,
        #[arg(long)]
        repair_costs: f64,
        #[command(flatten)]
        service: ServiceArgs,
    },
}

#[derive(clap::Args, Debug)]
struct ServiceArgs {
    /// Prompt service endpoint
    #[arg(long, env = "ASSETVIEW_PROMPT_ENDPOINT")]
    endpoint: String,

    #[arg(long, env = "ASSETVIEW_PROMPT_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some(path) = &cli.log {
        init_logging(path);
    }

    let result = match &cli.command {
        Some(command) => run_command(command),
        None => run_tui(&cli),
    };
    match result {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn init_logging(path: &Path) {
    let file = match File::create(path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Can not open log file {}: {e}", path.display());
            return;
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .with(ErrorLayer::default())
        .try_init();
    if let Err(e) = result {
        eprintln!("Can not initialise logging: {e}");
    }
}

fn run_command(command: &Command) -> Result<(), AVError> {
    match command {
        Command::Chat { query, service } => {
            let executor = HttpPromptExecutor::new(&service.endpoint, service.api_key.clone())?;
            let reply = assist::chat(&executor, query)?;
            println!("{}", reply.response);
        }
        Command::Predict {
            asset_id,
            historical_data,
            realtime_metrics,
            service,
        } => {
            let executor = HttpPromptExecutor::new(&service.endpoint, service.api_key.clone())?;
            let request = PredictionRequest {
                asset_id: asset_id.clone(),
                historical_data: historical_data.clone(),
                realtime_metrics: realtime_metrics.clone(),
            };
            let prediction = assist::predict(&executor, &request)?;
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
        Command::Summary {
            source,
            total_assets,
            high_risk_items,
            repair_costs,
            service,
        } => {
            let request = summary_request(
                source.as_deref(),
                *total_assets,
                *high_risk_items,
                *repair_costs,
            )?;
            let executor = HttpPromptExecutor::new(&service.endpoint, service.api_key.clone())?;
            let summary = assist::summarize(&executor, &request)?;
            println!("{}", summary.summary);
        }
    }
    Ok(())
}

// An explicit total wins over counting the records of `source`.
fn summary_request(
    source: Option<&str>,
    total_assets: Option<u64>,
    high_risk_items: u64,
    repair_costs: f64,
) -> Result<SummaryRequest, AVError> {
    let total_assets = match (total_assets, source) {
        (Some(total), _) => total,
        (None, Some(source)) => loader::load(&Source::parse(source)?)?.len() as u64,
        (None, None) => {
            return Err(AVError::LoadingFailed(
                "either --total-assets or --source is needed".into(),
            ));
        }
    };
    info!("Summary for {total_assets} assets");
    Ok(SummaryRequest {
        total_assets,
        high_risk_items,
        repair_costs,
    })
}

fn run_tui(cli: &Cli) -> Result<(), AVError> {
    let cfg = AVConfig::default()
        .with_max_column_width(cli.max_column_width)
        .with_event_poll_time(cli.event_poll_time);

    let mut terminal = ratatui::init();
    let result = run_loop(&mut terminal, &cfg, cli.source.as_deref());
    ratatui::restore();
    result
}

fn run_loop(
    terminal: &mut DefaultTerminal,
    cfg: &AVConfig,
    source: Option<&str>,
) -> Result<(), AVError> {
    info!("Starting assetview with {:?}", cfg);
    let size = terminal.size()?;
    let mut model = Model::init(cfg, size.width as usize, size.height as usize);
    if let Some(source) = source {
        model.load(source);
    }

    let ui = AssetUI::new();
    let controller = Controller::new(cfg);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map to a Message. Without one the model still
        // picks up finished background loads.
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }
    info!("Quitting");

    Ok(())
}
