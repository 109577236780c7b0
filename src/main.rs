use anyhow::{anyhow, Context};
use cademycode_etl::config::{ContactInfoPolicy, DuplicateKeyPolicy, FillPolicy, PipelineConfig};
use cademycode_etl::pipeline::{Pipeline, PipelineOutput};
use cademycode_etl::source::{SqliteSource, TableSource};
use cademycode_etl::{logging, metrics};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::io;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "cademycode_etl")]
#[command(about = "Flattens the cademycode student, course and job tables into one dataset")]
#[command(version = "0.1.0")]
struct Cli {
    /// TOML config file (defaults to ./cademycode.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Disable the rolling JSON log file
    #[arg(long, global = true)]
    no_file_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full extract, normalize and join pipeline
    Run {
        /// SQLite database to read from
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long, value_enum)]
        fill_policy: Option<FillPolicy>,
        #[arg(long, value_enum)]
        contact_info_policy: Option<ContactInfoPolicy>,
        #[arg(long, value_enum)]
        duplicate_key_policy: Option<DuplicateKeyPolicy>,
        /// Date ages are computed against (YYYY-MM-DD), defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// How to print the joined table on stdout
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
        /// Print at most this many rows
        #[arg(long)]
        limit: Option<usize>,
        /// Write a Prometheus text snapshot here after the run
        #[arg(long)]
        metrics_file: Option<PathBuf>,
    },
    /// Show row counts and columns of the three source tables
    Inspect {
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Summary,
    Json,
    Csv,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = PipelineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if cli.no_file_log {
        config.logging.file_logging = false;
    }
    let _guard = logging::init_logging(&config.logging);

    match cli.command {
        Commands::Run {
            db,
            fill_policy,
            contact_info_policy,
            duplicate_key_policy,
            as_of,
            format,
            limit,
            metrics_file,
        } => {
            if let Some(db) = db {
                config.database = db;
            }
            if let Some(p) = fill_policy {
                config.fill_policy = p;
            }
            if let Some(p) = contact_info_policy {
                config.contact_info_policy = p;
            }
            if let Some(p) = duplicate_key_policy {
                config.duplicate_key_policy = p;
            }
            if metrics_file.is_some() {
                metrics::init().map_err(|e| anyhow!(e.to_string()))?;
            }

            let mut pipeline = Pipeline::new(config);
            if let Some(date) = as_of {
                pipeline = pipeline.with_reference_date(date);
            }
            let result = pipeline.run();

            if let Some(path) = &metrics_file {
                match metrics::write_snapshot(path) {
                    Ok(_) => info!("Wrote metrics snapshot to {}", path.display()),
                    Err(e) => warn!("Failed to write metrics snapshot to {}: {}", path.display(), e),
                }
            }

            let output = match result {
                Ok(output) => output,
                Err(e) => {
                    error!("Pipeline run failed: {}", e);
                    return Err(e.into());
                }
            };
            print_output(&output, format, limit)?;
        }
        Commands::Inspect { db } => {
            if let Some(db) = db {
                config.database = db;
            }
            let tables = SqliteSource::new(&config.database).read_tables(&config.tables)?;
            println!("📋 Source tables in {}:", config.database.display());
            for table in [&tables.students, &tables.courses, &tables.jobs] {
                println!("   {} ({} rows)", table.name, table.len());
                println!("      columns: {}", table.columns.join(", "));
            }
        }
    }

    Ok(())
}

fn print_output(output: &PipelineOutput, format: OutputFormat, limit: Option<usize>) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => output.table.write_json_lines(io::stdout().lock(), limit)?,
        OutputFormat::Csv => output.table.write_csv(io::stdout().lock(), limit)?,
        OutputFormat::Summary => {
            let stats = &output.stats;
            println!("\n📊 Pipeline results (run {}, as of {}):", stats.run_id, stats.as_of);
            println!("   Students read: {}", stats.students_read);
            println!("   Courses read: {} ({} after sentinel)", stats.courses_read, stats.courses_augmented);
            println!("   Jobs read: {}", stats.jobs_read);
            println!("   Rows joined: {}", stats.rows_joined);
            println!("   Columns: {}", output.table.columns().len());
            println!("   Elapsed: {} ms", stats.elapsed_ms);

            if !output.report.is_empty() {
                println!("\n⚠️  Data-quality findings:");
                for (kind, count) in output.report.counts_by_kind() {
                    println!("   - {}: {}", kind, count);
                }
            }
            if let Some(n) = limit {
                println!();
                output.table.write_csv(io::stdout().lock(), Some(n))?;
            }
        }
    }
    Ok(())
}
