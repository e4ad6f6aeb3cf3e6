//! jwrap CLI - Virtual property grouping for JSON records
//!
//! This binary provides command-line interfaces for:
//! - reshape: apply a TOML layout to JSON/NDJSON records
//! - inspect: print the resolved layout of a TOML layout file

use clap::{ArgAction, Parser, Subcommand};
use jwrap_core::{
    DynamicLayout, FilterOutAllExcept, FilterPredicate, FilterProvider, JsonRecord, LayoutConfig,
    RenderContext, SerializeAllExcept,
};
use rayon::prelude::*;
use serde_json::Value;
use std::error::Error;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "jwrap")]
#[command(about = "Nest JSON record fields under virtual wrapper properties")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reshape JSON/NDJSON records with a layout
    ///
    /// Examples:
    ///   jwrap reshape events.ndjson --layout layout.toml
    ///   jwrap reshape events.json --layout layout.toml --view Public --exclude secret
    Reshape {
        /// Input file (JSON array or NDJSON)
        input: PathBuf,
        /// Layout file (TOML)
        #[arg(long)]
        layout: PathBuf,
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Active view
        #[arg(long)]
        view: Option<String>,
        /// Comma-separated names the filter suppresses
        #[arg(long, value_delimiter = ',', conflicts_with = "only")]
        exclude: Vec<String>,
        /// Comma-separated names the filter keeps (virtual properties included)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
        /// Filter id to register --exclude/--only under (defaults to the layout's)
        #[arg(long)]
        filter_id: Option<String>,
        /// Fail when the layout names a filter id with no registered filter
        #[arg(long)]
        strict_filters: bool,
        /// Explicitly treat input as NDJSON (overrides extension detection)
        #[arg(long, conflicts_with = "json_array")]
        ndjson: bool,
        /// Explicitly treat input as JSON array (overrides extension detection)
        #[arg(long)]
        json_array: bool,
        /// Write a JSON array instead of NDJSON
        #[arg(long)]
        output_array: bool,
    },
    /// Print the resolved layout as JSON
    Inspect {
        /// Layout file (TOML)
        #[arg(long)]
        layout: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum InputFormat {
    Ndjson,
    JsonArray,
}

/// Filter selection from the command line
struct FilterArgs {
    exclude: Vec<String>,
    only: Vec<String>,
    filter_id: Option<String>,
    strict: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Reshape {
            input,
            layout,
            output,
            view,
            exclude,
            only,
            filter_id,
            strict_filters,
            ndjson,
            json_array,
            output_array,
        } => {
            let format = resolve_input_format(&input, ndjson, json_array);
            let filters = FilterArgs {
                exclude,
                only,
                filter_id,
                strict: strict_filters,
            };
            handle_reshape(
                &input,
                format,
                &layout,
                output,
                view.as_deref(),
                filters,
                output_array,
            )?;
        }
        Commands::Inspect { layout } => {
            handle_inspect(&layout)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: a tracing subscriber is already installed");
    }
}

fn handle_reshape(
    input: &Path,
    format: InputFormat,
    layout_path: &Path,
    output: Option<PathBuf>,
    view: Option<&str>,
    filters: FilterArgs,
    output_array: bool,
) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    let layout = load_layout(layout_path)?;
    let ctx = build_context(&layout, view, filters)?;
    let records = read_records(input, format)?;
    debug!(records = records.len(), ?format, "read input records");

    let rendered = records
        .par_iter()
        .enumerate()
        .map(|(index, record)| {
            layout
                .render(record, &ctx)
                .map_err(|e| format!("record {}: {}", index + 1, e))
        })
        .collect::<Result<Vec<JsonRecord>, String>>()?;

    let target = output
        .as_ref()
        .map_or_else(|| "stdout".to_string(), |path| path.display().to_string());
    open_output(output.as_deref())
        .and_then(|sink| write_records(sink, &rendered, output_array))
        .map_err(|e| format!("failed to write {}: {}", target, e))?;

    info!(
        records = rendered.len(),
        elapsed = ?start.elapsed(),
        "reshaped records"
    );
    Ok(())
}

fn open_output(path: Option<&Path>) -> jwrap_core::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    })
}

/// Write rendered records as NDJSON, or as a single JSON array
fn write_records<W: Write>(
    sink: W,
    records: &[JsonRecord],
    as_array: bool,
) -> jwrap_core::Result<()> {
    let mut writer = BufWriter::new(sink);
    if as_array {
        serde_json::to_writer(&mut writer, records)?;
        writer.write_all(b"\n")?;
    } else {
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn handle_inspect(layout_path: &Path) -> Result<(), Box<dyn Error>> {
    let layout = load_layout(layout_path)?;
    println!("{}", serde_json::to_string_pretty(&layout.summary())?);
    Ok(())
}

fn load_layout(path: &Path) -> Result<DynamicLayout, Box<dyn Error>> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read layout {}: {}", path.display(), e))?;
    let config = LayoutConfig::from_toml_str(&text)
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    let layout = config
        .build()
        .map_err(|e| format!("invalid layout {}: {}", path.display(), e))?;
    Ok(layout)
}

fn build_context(
    layout: &DynamicLayout,
    view: Option<&str>,
    args: FilterArgs,
) -> Result<RenderContext, Box<dyn Error>> {
    let mut ctx = RenderContext::new();
    if let Some(name) = view {
        ctx = ctx.with_view(layout.view(name));
    }

    let predicate: Option<Arc<dyn FilterPredicate>> = if !args.exclude.is_empty() {
        Some(Arc::new(SerializeAllExcept::new(args.exclude)))
    } else if !args.only.is_empty() {
        Some(Arc::new(FilterOutAllExcept::new(args.only)))
    } else {
        None
    };

    let mut provider = FilterProvider::new().with_fail_on_unknown_id(args.strict);
    let id = args
        .filter_id
        .or_else(|| layout.filter_id().map(str::to_string));
    match (predicate, id) {
        (Some(predicate), Some(id)) => {
            if layout.filter_id() != Some(id.as_str()) {
                warn!(id = %id, "filter id is not used by the layout");
            }
            provider.add_filter(id, predicate);
        }
        (Some(_), None) => {
            return Err("--exclude/--only need a filter id: set `filter` in the layout or pass --filter-id".into());
        }
        (None, _) => {}
    }

    Ok(ctx.with_filter_provider(Arc::new(provider)))
}

fn resolve_input_format(path: &Path, force_ndjson: bool, force_json_array: bool) -> InputFormat {
    if force_ndjson {
        return InputFormat::Ndjson;
    }
    if force_json_array {
        return InputFormat::JsonArray;
    }

    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_ascii_lowercase())
    {
        Some(ext) if ext == "json" => InputFormat::JsonArray,
        _ => InputFormat::Ndjson,
    }
}

fn read_records(path: &Path, format: InputFormat) -> Result<Vec<JsonRecord>, Box<dyn Error>> {
    let reader = BufReader::new(
        File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?,
    );

    match format {
        InputFormat::JsonArray => match serde_json::from_reader(reader)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| into_record(item, index + 1))
                .collect(),
            _ => Err("input is not a JSON array".into()),
        },
        InputFormat::Ndjson => {
            let mut records = Vec::new();
            for (index, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let value: Value = serde_json::from_str(&line)
                    .map_err(|e| format!("line {}: {}", index + 1, e))?;
                records.push(into_record(value, index + 1)?);
            }
            Ok(records)
        }
    }
}

fn into_record(value: Value, position: usize) -> Result<JsonRecord, Box<dyn Error>> {
    match value {
        Value::Object(record) => Ok(record),
        _ => Err(format!("record {} is not a JSON object", position).into()),
    }
}
