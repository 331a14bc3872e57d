use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use nesforge_core::{
    AppConfig,
    diagnostics::init_tracing_with_options,
    fingerprint::write_report,
    fixtures::demo_project,
    generate_report, library,
    persistence::{load_project, save_project},
};

#[derive(Debug, Parser)]
#[command(name = "nesforge-cli")]
#[command(about = "Headless tools for nesforge project files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Overrides the configured log directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Writes the built-in demo project.
    Demo {
        #[arg(long, default_value = "data/demo.nesf")]
        output: PathBuf,
    },
    /// Writes a JSON fingerprint of a project.
    Report {
        input: PathBuf,
        #[arg(long, default_value = "data/reports/report.json")]
        output: PathBuf,
    },
    /// Imports the songs of `source` into `host` and saves `host`.
    Merge {
        host: PathBuf,
        source: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Drops instruments, arpeggios and samples no song uses.
    Cleanup {
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Imports every `.dmc` file found in the given or configured directories.
    ImportSamples {
        project: PathBuf,
        #[arg(long)]
        directory: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_or_default();
    let log_dir = cli.log_dir.unwrap_or_else(|| config.paths.logs_dir.clone());
    let _telemetry = init_tracing_with_options(
        &log_dir,
        &config.diagnostics.trace_file_prefix,
        &config.diagnostics.rust_log_filter,
    )?;

    match cli.command {
        Commands::Demo { output } => {
            let mut project = demo_project();
            save_project(&output, &mut project)?;
            tracing::info!(path = %output.display(), "demo project written");
        }
        Commands::Report { input, output } => {
            let mut project = load_project(&input)?;
            let report = generate_report(&mut project)?;
            write_report(&output, &report)?;
            tracing::info!(path = %output.display(), "document report generated");
        }
        Commands::Merge {
            host,
            source,
            output,
        } => {
            let mut project = load_project(&host)?;
            let foreign = load_project(&source)?;
            let report = project
                .merge_songs(foreign)
                .with_context(|| format!("failed to merge {}", source.display()))?;
            for warning in report.warnings() {
                println!("warning: {warning}");
            }
            save_project(output.as_deref().unwrap_or(&host), &mut project)?;
            tracing::info!(songs = report.imported_songs.len(), "merge complete");
        }
        Commands::Cleanup { input, output } => {
            let mut project = load_project(&input)?;
            project.cleanup();
            save_project(output.as_deref().unwrap_or(&input), &mut project)?;
        }
        Commands::ImportSamples { project, directory } => {
            let directories = if directory.is_empty() {
                config.paths.sample_directories.clone()
            } else {
                directory
            };
            let mut document = load_project(&project)?;
            let mut imported = 0;
            for directory in &directories {
                imported += library::import_directory(&mut document, directory)?.len();
            }
            save_project(&project, &mut document)?;
            tracing::info!(imported, "samples imported");
        }
    }

    Ok(())
}
