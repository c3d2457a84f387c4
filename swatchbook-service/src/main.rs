use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod api;
mod config;
mod error;
mod extraction;
mod ingestion;
mod service;

use crate::config::{StaticConfig, load_static_config};
use crate::extraction::{ExtractionReport, extract_catalog};
use crate::service::{SwatchbookService, zip_directory};

#[derive(Parser)]
#[command(version, about = "Fabric swatch extraction from supplier catalog PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Extract one catalog from the command line
    Extract {
        /// Catalog PDF to read
        pdf: PathBuf,
        /// Output directory (default: extraction_<timestamp> under the output root)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// First page to process, 1-based
        #[arg(long)]
        first_page: Option<u32>,
        /// Last page to process, inclusive
        #[arg(long)]
        last_page: Option<u32>,
        /// Also write a zip archive of the output next to it
        #[arg(long)]
        zip: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    let cli = Cli::parse();
    let static_config = load_static_config()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(static_config).await,
        Command::Extract {
            pdf,
            output,
            first_page,
            last_page,
            zip,
        } => {
            let mut extraction = static_config.extraction.clone();
            if let Some(first) = first_page {
                extraction.first_page = first;
            }
            if last_page.is_some() {
                extraction.last_page = last_page;
            }
            let output = output.unwrap_or_else(|| {
                static_config.storage.output_root.join(format!(
                    "extraction_{}",
                    chrono::Local::now().format("%Y%m%d_%H%M%S")
                ))
            });

            let report = {
                let pdf = pdf.clone();
                let output = output.clone();
                tokio::task::spawn_blocking(move || extract_catalog(&pdf, &output, extraction))
                    .await?
            }
            .map_err(|e| e.detailed_message())?;

            print_summary(&report, &output);
            if zip {
                let archive = output.with_extension("zip");
                let files = zip_directory(&output, &archive).map_err(|e| e.detailed_message())?;
                println!("Archive:   {} ({} files)", archive.display(), files);
            }
            Ok(())
        }
    }
}

async fn serve(static_config: StaticConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Starting swatchbook service v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        host = %static_config.server.host,
        port = static_config.server.port,
        "Static configuration loaded"
    );

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder unavailable, /metrics will be empty");
            None
        }
    };

    let addr = format!("{}:{}", static_config.server.host, static_config.server.port);
    let service = Arc::new(SwatchbookService::new(Arc::new(static_config))?);
    let app = api::router(service, metrics);

    // Start the server
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn print_summary(report: &ExtractionReport, output: &std::path::Path) {
    println!("Output:    {}", output.display());
    println!(
        "Swatches:  {} extracted / {} expected ({} auto-fixed)",
        report.total_extracted, report.total_expected, report.total_fixed
    );
    for (strategy, count) in &report.fixes_by_strategy {
        println!("  {strategy}: {count}");
    }
    println!(
        "Checks:    {} passed, {} warned, {} failed of {}",
        report.validations_passed,
        report.validations_warned,
        report.validations_failed,
        report.validations_total
    );
    println!(
        "Result:    {}",
        if report.passed { "PASS" } else { "FAIL" }
    );
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("swatchbook_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
