use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape product listings and reviews into a CSV file
    Scrape {
        /// Free-text search query, e.g. "iphone 14"
        query: String,

        /// Maximum number of products to scrape
        #[clap(short, long, default_value = "5")]
        max_products: usize,

        /// Reviews to fetch per product
        #[clap(short, long, default_value = "2")]
        review_count: usize,

        /// Output CSV file; a bare filename lands in the output directory
        #[clap(short, long, default_value = "product_reviews.csv")]
        output: String,
    },
    /// Load a scraped CSV into the vector store
    Ingest {
        /// CSV file to ingest; a bare filename is looked up in the output
        /// directory
        #[clap(short, long, default_value = "product_reviews.csv")]
        file: String,

        /// Skip the post-ingest sample similarity query
        #[clap(long, default_value = "false")]
        no_verify: bool,
    },
    /// Run a similarity query against the ingested collection
    Query {
        /// Query text
        text: String,

        /// Maximum hits to return
        #[clap(short, long, default_value = "5")]
        limit: usize,
    },
}
