use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;

use sheet_sifter::config::{load_dedup_config, load_filter_config, DedupConfig, SourceConfig};
use sheet_sifter::data::loader::LoadOptions;
use sheet_sifter::pipeline::{remove_duplicates, FilterJob};
use sheet_sifter::report::FilterReport;

#[derive(Parser)]
#[command(name = "sheet-sifter")]
#[command(about = "Filter spreadsheet rows and remove near-duplicate facility records")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep the rows of a table that match a filter expression
    Filter {
        /// JSON filter file: an array of conditions/groups, or a full filter config
        #[arg(short, long)]
        filters: PathBuf,

        /// Input table (overrides `input` in the filter file)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Zero-based row holding the column names
        #[arg(long)]
        header_row: Option<usize>,

        /// Sheet to read from a workbook
        #[arg(long)]
        sheet: Option<String>,

        /// Where to save the filtered rows (.xlsx, .csv or .parquet)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Default format for date conditions, e.g. %d/%m/%Y
        #[arg(long)]
        date_format: Option<String>,

        /// Print the sorted distinct values of this column (repeatable)
        #[arg(long = "unique")]
        unique: Vec<String>,

        /// Number of rows to preview
        #[arg(long, default_value_t = 5)]
        preview: usize,
    },

    /// Remove primary rows whose name matches a name in the reference tables
    Dedup {
        /// JSON dedup config; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Table to remove rows from
        #[arg(long)]
        primary: Option<PathBuf>,

        /// Zero-based header row of the primary table
        #[arg(long)]
        primary_header_row: Option<usize>,

        /// Reference table (repeatable; replaces the configured list)
        #[arg(long = "reference")]
        references: Vec<PathBuf>,

        /// Header row of each --reference, by position (missing ones are 0)
        #[arg(long = "reference-header-row")]
        reference_header_rows: Vec<usize>,

        /// Column holding the facility name in every table
        #[arg(short, long)]
        key_column: Option<String>,

        /// Similarity threshold, 0-100
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(0..=100))]
        threshold: Option<u32>,

        /// Where to save the removed rows
        #[arg(long)]
        removed_output: Option<PathBuf>,

        /// Where to save the kept rows
        #[arg(long)]
        filtered_output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Filter {
            filters,
            input,
            header_row,
            sheet,
            output,
            date_format,
            unique,
            preview,
        } => {
            let mut config = load_filter_config(&filters)?;
            if date_format.is_some() {
                config.date_format = date_format;
            }

            let source = match (input, config.input.take()) {
                (Some(path), _) => SourceConfig {
                    path,
                    options: LoadOptions::default(),
                },
                (None, Some(source)) => source,
                (None, None) => bail!("no input table: pass --input or set `input` in {}", filters.display()),
            };
            let mut load = source.options;
            if let Some(row) = header_row {
                load.header_row = row;
            }
            if sheet.is_some() {
                load.sheet = sheet;
            }

            let job = FilterJob {
                input: source.path,
                load,
                filters: config.filter_items(),
                output: output.or(config.output.take()),
                sheet_name: config.sheet_name.take(),
            };
            info!("Filtering {}", job.input.display());
            let run = job
                .run()
                .with_context(|| format!("filtering {}", job.input.display()))?;

            let mut report_columns = config.report_columns;
            report_columns.extend(unique);
            let report = FilterReport::new(&run.table, run.input_rows, run.output, &report_columns, preview);
            println!("{report}");
        }
        Commands::Dedup {
            config,
            primary,
            primary_header_row,
            references,
            reference_header_rows,
            key_column,
            threshold,
            removed_output,
            filtered_output,
        } => {
            let mut settings = match &config {
                Some(path) => load_dedup_config(path)?,
                None => DedupConfig::default(),
            };
            if let Some(path) = primary {
                settings.primary.path = path;
            }
            if let Some(row) = primary_header_row {
                settings.primary.options.header_row = row;
            }
            if !references.is_empty() {
                settings.references = references
                    .into_iter()
                    .enumerate()
                    .map(|(i, path)| {
                        SourceConfig::new(path, reference_header_rows.get(i).copied().unwrap_or(0))
                    })
                    .collect();
            }
            if let Some(column) = key_column {
                settings.key_column = column;
            }
            if let Some(t) = threshold {
                settings.threshold = t;
            }
            if let Some(path) = removed_output {
                settings.removed_output = path;
            }
            if filtered_output.is_some() {
                settings.filtered_output = filtered_output;
            }

            println!("Checking for similar {}s ...", settings.key_column);
            let run = remove_duplicates(&settings).context("removing duplicates")?;
            println!("{}", run.report(&settings.key_column));
        }
    }

    Ok(())
}
