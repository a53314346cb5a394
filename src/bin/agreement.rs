#![forbid(unsafe_code)]

use std::error::Error;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use partition_agreement::config::{AgreementConfig, IndexPolicy};
use partition_agreement::error::{AgreementError, ErrorDocument};
use partition_agreement::evaluation::run_synthetic_suite;
use partition_agreement::orchestrator::score_source;
use partition_agreement::reconcile::AssignmentReconciler;
use partition_agreement::request::{AgreementRequest, LabelSource};

#[derive(Parser)]
#[command(name = "agreement", version, about = "Cross-method partition agreement")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score pairwise agreement for a request document
    Score {
        /// Request JSON (stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Report JSON (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Config JSON; overrides any config embedded in the request
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum)]
        index_policy: Option<PolicyArg>,
        /// Include per-pair contingency tables
        #[arg(long)]
        contingency: bool,
        /// Omit per-point visualization data
        #[arg(long)]
        no_visualization: bool,
        /// Score the three pairs one after another
        #[arg(long)]
        sequential: bool,
        /// Include the full error source chain on failure
        #[arg(long)]
        diagnostics: bool,
    },
    /// Expand aggregate counts into aligned label sequences
    Reconcile {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        weight_scale: Option<f64>,
    },
    /// Run synthetic evaluation suite
    Eval {
        #[arg(long)]
        case: Option<String>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Print the default configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Auto,
    Dense,
    Sparse,
}

impl From<PolicyArg> for IndexPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Auto => IndexPolicy::Auto,
            PolicyArg::Dense => IndexPolicy::Dense,
            PolicyArg::Sparse => IndexPolicy::Sparse,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let diagnostics = matches!(
        cli.command,
        Commands::Score {
            diagnostics: true,
            ..
        }
    );

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let doc = ErrorDocument::from_error(err.as_ref(), error_kind(err.as_ref()), diagnostics);
            let rendered = serde_json::to_string(&doc)
                .unwrap_or_else(|_| format!("{{\"error\":{:?},\"kind\":\"internal\"}}", doc.error));
            eprintln!("{rendered}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Score {
            input,
            out,
            config,
            index_policy,
            contingency,
            no_visualization,
            sequential,
            diagnostics: _,
        } => {
            let request = AgreementRequest::from_json(&read_input(input.as_deref())?)?;
            let (source, embedded) = request.into_parts()?;

            let mut cfg = match config {
                Some(path) => AgreementConfig::from_path(path)?,
                None => embedded.unwrap_or_default(),
            };
            if let Some(policy) = index_policy {
                cfg.index_policy = policy.into();
            }
            if contingency {
                cfg.include_contingency_tables = true;
            }
            if no_visualization {
                cfg.include_visualization = false;
            }
            if sequential {
                cfg.parallel = false;
            }

            let report = score_source(source, &cfg)?;
            write_output(out.as_deref(), &report)?;
        }
        Commands::Reconcile {
            input,
            out,
            weight_scale,
        } => {
            let request = AgreementRequest::from_json(&read_input(input.as_deref())?)?;
            let (source, embedded) = request.into_parts()?;
            let LabelSource::Aggregates(sources) = source else {
                return Err(AgreementError::input_shape(
                    "reconcile expects aggregates or conceptResults",
                )
                .into());
            };
            let mut cfg = embedded.unwrap_or_default();
            if let Some(scale) = weight_scale {
                cfg.weight_scale = scale;
            }
            cfg.validate()?;
            let reconciled = AssignmentReconciler::new(cfg.weight_scale).reconcile(&sources)?;
            write_output(out.as_deref(), &reconciled)?;
        }
        Commands::Eval { case, out } => {
            let results = run_synthetic_suite(case.as_deref())?;
            let mut file = File::create(out)?;
            for result in &results {
                let line = serde_json::to_string(result)?;
                writeln!(file, "{line}")?;
            }
        }
        Commands::Config => {
            write_output(None, &AgreementConfig::default())?;
        }
    }
    Ok(())
}

fn error_kind(err: &(dyn Error + 'static)) -> &'static str {
    if let Some(agreement) = err.downcast_ref::<AgreementError>() {
        agreement.kind().as_str()
    } else if err.is::<serde_json::Error>() {
        "invalid_json"
    } else if err.is::<io::Error>() {
        "io"
    } else {
        "internal"
    }
}

fn read_input(path: Option<&Path>) -> Result<String, io::Error> {
    match path {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut raw = String::new();
            io::stdin().read_to_string(&mut raw)?;
            Ok(raw)
        }
    }
}

fn write_output<T: serde::Serialize>(path: Option<&Path>, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    match path {
        Some(path) => std::fs::write(path, json),
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}")
        }
    }
}
