//! Chart data builder
//!
//! Run with: `cargo run --bin make-charts`
//!
//! Configuration comes from the environment:
//!   DATABASE_PATH     SQLite file holding the star schema (default: data/processed/olist.sqlite)
//!   STAR_SCHEMA       schema alias the tables live under (default: mart)
//!   TOP_N             categories in the revenue ranking (default: 15)
//!   MAX_COHORT_MONTH  largest cohort month offset (default: 12)
//!   OUTPUT_DIR        where tables are written (default: docs/charts)
//!   OUTPUT_FORMAT     csv or json (default: csv)

use std::process::ExitCode;
use storefront_analytics::sink::format_currency_short;
use storefront_analytics::{run, CsvSink, JsonSink, OutputFormat, RunConfig, VisualizationSink};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // RUST_LOG=debug also prints the generated SQL.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = match RunConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut sink: Box<dyn VisualizationSink> = match config.output_format {
        OutputFormat::Csv => Box::new(CsvSink::new(&config.output_dir)),
        OutputFormat::Json => Box::new(JsonSink::new(&config.output_dir)),
    };

    match run(&config, sink.as_mut()) {
        Ok(report) => {
            let total: f64 = report.monthly_revenue.iter().map(|m| m.revenue).sum();
            println!("Revenue expression:  {}", report.expressions.revenue);
            println!("Months:              {}", report.monthly_revenue.len());
            println!("Total revenue:       {}", format_currency_short(total));
            if let Some(top) = report.top_categories.first() {
                println!(
                    "Top category:        {} ({})",
                    top.category,
                    format_currency_short(top.revenue)
                );
            }
            println!("Cohorts:             {}", report.cohort_matrix.cohorts().len());
            println!("Saved charts to:     {}", config.output_dir.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}
