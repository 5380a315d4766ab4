//! CSDL Convert CLI
//!
//! Command-line interface for converting CSDL JSON metadata and resolving
//! metadata paths.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use csdl_convert::{
    convert, load_document, resolve_context, resolve_data_model_path, Capabilities,
    ConvertedMetadata, JsonSource,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "csdl-convert")]
#[command(about = "Convert CSDL JSON metadata and resolve metadata paths")]
#[command(version)]
struct Cli {
    /// Log conversion steps to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the linked metadata graph
    Convert {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print the parsed annotation lists
    Annotations {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Resolve a metadata path (e.g. /Products/$NavigationPropertyBinding/Supplier/Name)
    Resolve {
        #[command(flatten)]
        model: ModelArgs,

        /// Absolute metadata path
        path: String,

        /// Path of the enclosing context
        #[arg(long)]
        context: Option<String>,

        /// Drop the target unless the path ends on a service object
        #[arg(long)]
        only_service_objects: bool,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// CSDL JSON metadata file
    metadata: PathBuf,

    /// Separate annotation table (default: $Annotations of the schema)
    #[arg(long)]
    annotations: Option<PathBuf>,

    /// JSON file with capability flags ({"Chart": false, ...})
    #[arg(long)]
    capabilities: Option<PathBuf>,

    /// Disable charts
    #[arg(long)]
    no_chart: bool,

    /// Disable micro charts
    #[arg(long)]
    no_micro_chart: bool,

    /// Disable intent based navigation
    #[arg(long)]
    no_intent_navigation: bool,
}

#[derive(Args)]
struct OutputArgs {
    /// Output file (stdout if not specified)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Convert { model, output } => {
            load_model(&model).and_then(|meta| write_json(&meta.to_json(), &output))
        }
        Commands::Annotations { model, output } => {
            load_model(&model).and_then(|meta| write_json(meta.annotation_lists(), &output))
        }
        Commands::Resolve {
            model,
            path,
            context,
            only_service_objects,
            output,
        } => load_model(&model).and_then(|meta| {
            run_resolve(&meta, &path, context.as_deref(), only_service_objects, &output)
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("csdl_convert=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_model(args: &ModelArgs) -> Result<ConvertedMetadata, u8> {
    let capabilities = load_capabilities(args)?;
    let source = JsonSource::from_files(&args.metadata, args.annotations.as_deref()).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    convert(Arc::new(source), capabilities).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

fn load_capabilities(args: &ModelArgs) -> Result<Capabilities, u8> {
    let mut capabilities = match &args.capabilities {
        Some(path) => read_capabilities(path)?,
        None => Capabilities::default(),
    };
    if args.no_chart {
        capabilities = capabilities.chart(false);
    }
    if args.no_micro_chart {
        capabilities = capabilities.micro_chart(false);
    }
    if args.no_intent_navigation {
        capabilities = capabilities.intent_based_navigation(false);
    }
    Ok(capabilities)
}

fn read_capabilities(path: &Path) -> Result<Capabilities, u8> {
    let document = load_document(path).map_err(|e| {
        eprintln!("Error loading capabilities: {}", e);
        e.exit_code() as u8
    })?;
    serde_json::from_value(document).map_err(|e| {
        eprintln!("Error: invalid capabilities in {}: {}", path.display(), e);
        2u8
    })
}

fn run_resolve(
    meta: &ConvertedMetadata,
    path: &str,
    context: Option<&str>,
    only_service_objects: bool,
    output: &OutputArgs,
) -> Result<(), u8> {
    let outer = context.map(|context| {
        let resolved = resolve_context(context, meta, true);
        resolve_data_model_path(&resolved, meta, None, false)
    });

    let resolved = resolve_context(path, meta, true);
    let model_path = resolve_data_model_path(&resolved, meta, outer, only_service_objects);
    write_json(&model_path.to_json(), output)?;

    if model_path.target_object.is_none() {
        eprintln!("Error: path not resolved: {}", path);
        return Err(1);
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(value: &T, output: &OutputArgs) -> Result<(), u8> {
    let json_output = if output.pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match &output.output {
        Some(path) => {
            std::fs::write(path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}
