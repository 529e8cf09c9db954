pub mod aggregate;
pub mod catalog;
pub mod cli;
pub mod coerce;
pub mod data;
pub mod filter;
pub mod ingest;
pub mod io_utils;
pub mod metrics;
pub mod schema;
pub mod session;
pub mod table;
pub mod text;
pub mod view;

use std::{
    env, fs,
    io::{self, Write},
    path::Path,
    sync::OnceLock,
};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use itertools::Itertools;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands, FilterArgs, InputArgs, OutputFormat, ViewSelection},
    filter::FilterState,
    ingest::{IngestError, IngestOptions},
    schema::{ValidationMode, ValidationStatus},
    session::{Session, UploadOutcome},
    view::ViewDefinition,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("placement_metrics", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Views => handle_views(),
        Commands::Schema(args) => handle_schema(&args),
        Commands::Validate(args) => handle_validate(&args),
        Commands::Aggregate(args) => handle_aggregate(&args),
        Commands::Export(args) => handle_export(&args),
    }
}

fn handle_views() -> Result<()> {
    let headers = ["view", "mode", "required columns", "description"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = catalog::all()
        .iter()
        .map(|view| {
            vec![
                view.name().to_string(),
                mode_label(view.schema.mode()).to_string(),
                view.schema.required_columns().join(", "),
                view.description.clone(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    Ok(())
}

fn handle_schema(args: &cli::SchemaArgs) -> Result<()> {
    let view = load_view(&args.selection)?;
    let yaml = view.to_yaml_string()?;
    write_output(args.output.as_deref(), &yaml)?;
    if let Some(path) = &args.output {
        info!("View '{}' written to {:?}", view.name(), path);
    }
    Ok(())
}

fn handle_validate(args: &cli::ValidateArgs) -> Result<()> {
    let view = load_view(&args.selection)?;
    let options = ingest_options(&args.input)?;
    info!(
        "Validating '{}' against view '{}' with delimiter '{}'",
        args.input.input.display(),
        view.name(),
        printable_delimiter(options.delimiter)
    );
    match ingest::ingest_path(&args.input.input, &view.schema, &options) {
        Ok(ingested) => {
            println!(
                "{}: {} row(s), {} column(s)",
                status_label(ingested.report.status),
                ingested.dataset.len(),
                ingested.dataset.headers().len()
            );
            if !ingested.report.missing.is_empty() {
                println!("missing: {}", ingested.report.missing.join(", "));
            }
            Ok(())
        }
        Err(IngestError::MissingRequiredColumns { missing, .. }) => {
            println!("{}", status_label(ValidationStatus::HardFail));
            println!("missing: {}", missing.join(", "));
            bail!(
                "'{}' cannot be loaded into view '{}'",
                args.input.input.display(),
                view.name()
            )
        }
        Err(err) => Err(err.into()),
    }
}

fn handle_aggregate(args: &cli::AggregateArgs) -> Result<()> {
    let view = load_view(&args.selection)?;
    let mut session = open_session(view, &args.input)?;
    session.set_filter(filter_state(&args.filter)?);
    debug!("Filter fingerprint {}", session.filter().fingerprint());
    let result = session
        .result()
        .ok_or_else(|| anyhow!("No dataset loaded"))?;
    info!(
        "View '{}' aggregated {} of {} row(s)",
        result.view, result.rows_matched, result.rows_total
    );
    let rendered = match args.format {
        OutputFormat::Table => table::render_result(&result),
        OutputFormat::Json => {
            let mut json =
                serde_json::to_string_pretty(&*result).context("Serializing result to JSON")?;
            json.push('\n');
            json
        }
    };
    write_output(args.output.as_deref(), &rendered)
}

fn handle_export(args: &cli::ExportArgs) -> Result<()> {
    let view = load_view(&args.selection)?;
    let mut session = open_session(view, &args.input)?;
    session.set_filter(filter_state(&args.filter)?);
    let dataset = session
        .dataset()
        .cloned()
        .ok_or_else(|| anyhow!("No dataset loaded"))?;

    let delimiter = args
        .output_delimiter
        .unwrap_or(io_utils::DEFAULT_CSV_DELIMITER);
    let mut writer = io_utils::open_csv_writer(args.output.as_deref(), delimiter)?;
    writer
        .write_record(dataset.headers())
        .context("Writing export header")?;
    let mut written = 0usize;
    for row in session
        .filtered_rows()
        .into_iter()
        .take(args.limit.unwrap_or(usize::MAX))
    {
        let record = dataset
            .headers()
            .iter()
            .map(|header| row.string(header))
            .collect::<Vec<_>>();
        writer
            .write_record(record.iter().map(|value| value.as_bytes()))
            .with_context(|| format!("Writing export row {}", written + 1))?;
        written += 1;
    }
    writer.flush().context("Flushing export output")?;
    info!(
        "Exported {} of {} row(s) from '{}'",
        written,
        dataset.len(),
        dataset.source()
    );
    Ok(())
}

fn load_view(selection: &ViewSelection) -> Result<ViewDefinition> {
    match (&selection.view, &selection.view_file) {
        (_, Some(path)) => {
            ViewDefinition::load(path).with_context(|| format!("Loading view from {path:?}"))
        }
        (Some(name), None) => catalog::find(name).ok_or_else(|| {
            anyhow!(
                "Unknown view '{name}'. Available views: {}",
                catalog::VIEW_NAMES.iter().join(", ")
            )
        }),
        (None, None) => bail!("Select a view with --view or --view-file"),
    }
}

fn ingest_options(input: &InputArgs) -> Result<IngestOptions> {
    let encoding = io_utils::resolve_encoding(input.input_encoding.as_deref())?;
    Ok(IngestOptions {
        delimiter: input.delimiter.unwrap_or(io_utils::DEFAULT_CSV_DELIMITER),
        encoding,
    })
}

fn open_session(view: ViewDefinition, input: &InputArgs) -> Result<Session> {
    let options = ingest_options(input)?;
    let mut session = Session::new(view, options);
    let outcome = session
        .upload_path(&input.input)
        .with_context(|| format!("Loading {:?}", input.input))?;
    if let UploadOutcome::Installed { warnings, .. } = outcome {
        for warning in warnings {
            info!("{warning}");
        }
    }
    Ok(session)
}

fn filter_state(args: &FilterArgs) -> Result<FilterState> {
    let mut state = FilterState::new();
    filter::parse_filters(&args.filters, &mut state)?;
    if let Some(search) = &args.search {
        state = state.search(search.as_str());
    }
    Ok(state)
}

fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) if !io_utils::is_dash(path) => {
            fs::write(path, content).with_context(|| format!("Writing output to {path:?}"))
        }
        _ => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(content.as_bytes())
                .context("Writing to stdout")?;
            stdout.flush().context("Flushing stdout")
        }
    }
}

fn mode_label(mode: ValidationMode) -> &'static str {
    match mode {
        ValidationMode::Strict => "strict",
        ValidationMode::Lenient => "lenient",
    }
}

fn status_label(status: ValidationStatus) -> &'static str {
    match status {
        ValidationStatus::Ok => "ok",
        ValidationStatus::SoftWarn => "soft-warn",
        ValidationStatus::HardFail => "hard-fail",
    }
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
