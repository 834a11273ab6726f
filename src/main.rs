//! aix_builder CLI
//!
//! Commands: build, coverage, optimize, sign, validate, history, deps.
//! Exits non-zero when a build fails or a validation report is invalid.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use tokio::sync::watch;

use aix_builder::models::format_size;
use aix_builder::{
    flush_all_logs, initialize_logging, report, BuildOrchestrator, BuildRequest, BuilderConfig,
    HistoryStore, OptimizeOptions, ProcessRunner, Reportable, SettingsManager, SigningOptions,
    ValidateOptions, ValidationPipeline,
};

#[derive(Parser)]
#[command(name = "aix_builder", version)]
#[command(about = "Build and validate App Inventor extension projects")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to the global settings file)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for full and parsed log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Mirror log records to stderr (debug level)
    #[arg(long, global = true)]
    echo_logs: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
    Html,
}

#[derive(Args)]
struct BuildArgs {
    /// Extension project directory
    project: PathBuf,

    /// Remove build and dist directories first
    #[arg(long)]
    clean: bool,

    /// Ask the toolchain for verbose output
    #[arg(long)]
    verbose: bool,

    /// Extra build property, passed as -Dname=value
    #[arg(short = 'D', value_name = "NAME=VALUE", value_parser = parse_property)]
    property: Vec<(String, String)>,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

impl BuildArgs {
    fn request(&self) -> BuildRequest {
        self.property.iter().fold(
            BuildRequest::new(&self.project)
                .with_clean(self.clean)
                .with_verbose(self.verbose),
            |request, (name, value)| request.with_property(name, value),
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build a toolchain target (default: package)
    Build {
        #[command(flatten)]
        args: BuildArgs,

        #[arg(short, long, default_value = aix_builder::models::DEFAULT_TARGET)]
        target: String,
    },

    /// Run the test-coverage target
    Coverage {
        #[command(flatten)]
        args: BuildArgs,
    },

    /// Run the package-optimized target
    Optimize {
        #[command(flatten)]
        args: BuildArgs,

        /// Shrink with ProGuard
        #[arg(long)]
        proguard: bool,

        /// Optimization level (0-3)
        #[arg(long, default_value_t = 1)]
        level: u8,
    },

    /// Run the package-signed target
    Sign {
        #[command(flatten)]
        args: BuildArgs,

        #[arg(long)]
        keystore: PathBuf,

        #[arg(long)]
        alias: String,

        #[arg(long)]
        store_password: Option<String>,

        #[arg(long)]
        key_password: Option<String>,
    },

    /// Validate a project
    Validate {
        project: PathBuf,

        /// Include a real clean/compile/package dry-run
        #[arg(long)]
        build: bool,

        /// Include advisory source checks
        #[arg(long)]
        quality: bool,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show recorded builds
    History {
        project: PathBuf,

        /// Print aggregates instead of records
        #[arg(long)]
        stats: bool,

        /// Delete the history file
        #[arg(long, conflicts_with = "stats")]
        clear: bool,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// List library jars
    Deps {
        project: PathBuf,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{}'", raw)),
    }
}

fn render<R: Reportable>(item: &R, format: Format) -> anyhow::Result<String> {
    Ok(match format {
        Format::Text => report::to_text(item),
        Format::Json => report::to_structured(item)?,
        Format::Html => report::to_document(item),
    })
}

fn exit_code(passed: bool) -> ExitCode {
    if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Runner whose subprocesses are killed on Ctrl-C.
fn cancellable_runner() -> ProcessRunner {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("[Main] Interrupt received, cancelling toolchain processes");
            let _ = cancel_tx.send(true);
        }
    });
    ProcessRunner::with_cancellation(cancel_rx)
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<BuilderConfig> {
    let config = match path {
        Some(path) => SettingsManager::load_from(path),
        None => SettingsManager::load(),
    };
    config.context("Failed to load settings")
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(cli.config.as_ref())?;
    let runner = cancellable_runner();

    match cli.command {
        Commands::Build { args, target } => {
            let orchestrator = BuildOrchestrator::new(config).with_runner(runner);
            let result = orchestrator
                .build_extension(args.request().with_target(target))
                .await?;
            print!("{}", render(&result, args.format)?);
            Ok(exit_code(result.success))
        }

        Commands::Coverage { args } => {
            let orchestrator = BuildOrchestrator::new(config).with_runner(runner);
            let result = orchestrator.build_with_coverage(args.request()).await?;
            print!("{}", render(&result, args.format)?);
            Ok(exit_code(result.success))
        }

        Commands::Optimize {
            args,
            proguard,
            level,
        } => {
            let orchestrator = BuildOrchestrator::new(config).with_runner(runner);
            let result = orchestrator
                .build_optimized(args.request(), OptimizeOptions { proguard, level })
                .await?;
            print!("{}", render(&result, args.format)?);
            Ok(exit_code(result.success))
        }

        Commands::Sign {
            args,
            keystore,
            alias,
            store_password,
            key_password,
        } => {
            let orchestrator = BuildOrchestrator::new(config).with_runner(runner);
            let options = SigningOptions {
                keystore,
                alias,
                store_password,
                key_password,
            };
            let result = orchestrator.sign_extension(args.request(), options).await?;
            print!("{}", render(&result, args.format)?);
            Ok(exit_code(result.success))
        }

        Commands::Validate {
            project,
            build,
            quality,
            format,
        } => {
            let pipeline = ValidationPipeline::new(config).with_runner(runner);
            let options = ValidateOptions {
                build,
                code_quality: quality,
            };
            let findings = pipeline.validate_all(&project, options).await;
            print!("{}", render(&findings, format)?);
            Ok(exit_code(findings.valid))
        }

        Commands::History {
            project,
            stats,
            clear,
            format,
        } => {
            let store = HistoryStore::for_project(&project, &config);
            if clear {
                store.clear().await?;
                println!("Cleared {}", store.path().display());
            } else if stats {
                let stats = store.stats();
                match format {
                    Format::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                    _ => {
                        println!("Builds:    {}", stats.total);
                        println!("Succeeded: {}", stats.succeeded);
                        println!("Failed:    {}", stats.failed);
                        println!("Average:   {} ms", stats.average_duration_ms);
                        if let Some(last) = stats.last_success {
                            println!("Last success: {}", last.to_rfc3339());
                        }
                    }
                }
            } else {
                let records = store.try_load()?;
                match format {
                    Format::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                    _ => {
                        for record in &records {
                            println!(
                                "{}  {:<7}  {:>8} ms  {}",
                                record.timestamp.to_rfc3339(),
                                if record.success { "OK" } else { "FAILED" },
                                record.duration,
                                record
                                    .artifact
                                    .as_ref()
                                    .map(|a| a.name.as_str())
                                    .unwrap_or("-")
                            );
                        }
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Deps { project, format } => {
            let pipeline = ValidationPipeline::new(config);
            let deps = pipeline
                .scan_dependencies(&project)
                .with_context(|| format!("Failed to scan libraries of {}", project.display()))?;
            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&deps)?),
                _ => {
                    for dep in &deps {
                        println!(
                            "{:<32} {:<12} {:>10}  {}",
                            dep.name,
                            dep.version.as_deref().unwrap_or("-"),
                            format_size(dep.size),
                            dep.file_name
                        );
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(aix_builder::system::default_log_dir);
    let echo = cli.echo_logs.then_some(LevelFilter::Debug);
    if let Err(e) = initialize_logging(log_dir, LevelFilter::Debug, echo) {
        eprintln!("[Main] WARNING: logging unavailable: {}", e);
    }

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("[Main] {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    };

    flush_all_logs();
    code
}
