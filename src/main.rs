use clap::Parser;

mod cli;
mod config;
mod ingest;
mod products;
mod scrape;

use config::Config;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = cli::Args::parse();

    let base_path = std::env::var("PRODSCOUT_HOME").unwrap_or_else(|_| ".".to_string());
    let config = Config::load_with(&base_path);

    match args.command {
        cli::Command::Scrape {
            query,
            max_products,
            review_count,
            output,
        } => {
            let records = run_scrape(&config, &query, max_products, review_count)?;
            let path = products::save_to_csv(&records, &output, &config.output_dir)?;
            println!("{} products saved to {}", records.len(), path.display());
            Ok(())
        }

        cli::Command::Ingest { file, no_verify } => {
            let path = products::resolve_csv_path(&file, &config.output_dir);
            let pipeline = ingest::IngestionPipeline::new(&config);
            let report = pipeline.run(&path, !no_verify)?;
            println!(
                "{} rows read, {} documents upserted into '{}'",
                report.rows, report.upserted, config.ingest.collection
            );
            Ok(())
        }

        cli::Command::Query { text, limit } => {
            let hits = ingest::similarity_query(&config, &text, limit)?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
            Ok(())
        }
    }
}

#[cfg(feature = "headless")]
fn run_scrape(
    config: &Config,
    query: &str,
    max_products: usize,
    review_count: usize,
) -> anyhow::Result<Vec<products::ProductRecord>> {
    let factory = scrape::headless::ChromeFactory::new();
    scrape::scrape_products(&factory, query, max_products, review_count, &config.scraper)
}

#[cfg(not(feature = "headless"))]
fn run_scrape(
    _config: &Config,
    _query: &str,
    _max_products: usize,
    _review_count: usize,
) -> anyhow::Result<Vec<products::ProductRecord>> {
    anyhow::bail!("this build has no browser support; rebuild with the 'headless' feature")
}
