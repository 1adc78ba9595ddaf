use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_OUTPUT_DIR: &str = "data";

const DEFAULT_SEARCH_URL: &str = "https://www.flipkart.com/search?q=";
const DEFAULT_BASE_URL: &str = "https://www.flipkart.com";
const DEFAULT_SETTLE_SECS: u64 = 3;
const DEFAULT_SCROLL_PASSES: u32 = 3;
const DEFAULT_SCROLL_SETTLE_SECS: u64 = 2;

/// Default embedding model (bge-base offers +13% accuracy vs MiniLM)
const DEFAULT_EMBEDDING_MODEL: &str = "bge-base-en-v1.5";
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

const DEFAULT_COLLECTION: &str = "product_reviews";
const DEFAULT_BATCH_SIZE: usize = 32;
const DEFAULT_SAMPLE_QUERY: &str = "is this product worth buying?";
const DEFAULT_TOP_K: usize = 3;

/// CSS selector lists used against the storefront markup.
///
/// Redundancy is intentional: the storefront serves several templates and
/// rotates class names, so each field carries every selector observed to
/// work. First selector with a hit wins.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Selectors {
    #[serde(default = "default_product_cards")]
    pub product_cards: Vec<String>,
    #[serde(default = "default_title")]
    pub title: Vec<String>,
    #[serde(default = "default_price")]
    pub price: Vec<String>,
    #[serde(default = "default_rating")]
    pub rating: Vec<String>,
    #[serde(default = "default_reviews_label")]
    pub reviews_label: Vec<String>,
    #[serde(default = "default_review_blocks")]
    pub review_blocks: Vec<String>,
    #[serde(default = "default_overlay_close")]
    pub overlay_close: Vec<String>,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            product_cards: default_product_cards(),
            title: default_title(),
            price: default_price(),
            rating: default_rating(),
            reviews_label: default_reviews_label(),
            review_blocks: default_review_blocks(),
            overlay_close: default_overlay_close(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_product_cards() -> Vec<String> {
    strings(&["div[data-id]", "div._1AtVbE", "div._2kHMtA", "div._4ddWXP"])
}

fn default_title() -> Vec<String> {
    strings(&["div._4rR01T", "a.s1Q9rs", "div.KzDlHZ", "a.IRpwTa"])
}

fn default_price() -> Vec<String> {
    strings(&["div._30jeq3", "div.Nx9bqj"])
}

fn default_rating() -> Vec<String> {
    strings(&["div._3LWZlK", "div.XQDdHH"])
}

fn default_reviews_label() -> Vec<String> {
    strings(&["span._2_R_DZ", "span.Wphh3N"])
}

fn default_review_blocks() -> Vec<String> {
    strings(&["div.t-ZTKy", "div.ZmyHeo", "div._6K-7Co", "div._11pzQk"])
}

fn default_overlay_close() -> Vec<String> {
    strings(&["button._2KpZ6l._2doB4z", "span._30XB9F"])
}

/// Scraper tuning. Settle delays and scroll counts are empirical for the
/// target storefront's current front end; expect periodic retuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default = "default_search_url")]
    pub search_url: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Wait after navigation for client-side rendering, in seconds.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,

    /// Scroll-to-end passes on a product page to trigger lazy review loads.
    #[serde(default = "default_scroll_passes")]
    pub scroll_passes: u32,

    /// Wait after each scroll pass, in seconds.
    #[serde(default = "default_scroll_settle_secs")]
    pub scroll_settle_secs: u64,

    #[serde(default)]
    pub selectors: Selectors,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            base_url: default_base_url(),
            settle_secs: DEFAULT_SETTLE_SECS,
            scroll_passes: DEFAULT_SCROLL_PASSES,
            scroll_settle_secs: DEFAULT_SCROLL_SETTLE_SECS,
            selectors: Selectors::default(),
        }
    }
}

fn default_search_url() -> String {
    DEFAULT_SEARCH_URL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_settle_secs() -> u64 {
    DEFAULT_SETTLE_SECS
}

fn default_scroll_passes() -> u32 {
    DEFAULT_SCROLL_PASSES
}

fn default_scroll_settle_secs() -> u64 {
    DEFAULT_SCROLL_SETTLE_SECS
}

/// Configuration for the local embedding model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

/// Ingestion pipeline settings. Vector-store credentials come from the
/// environment, not from this file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Documents per upsert batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Query text used for the post-ingest verification search.
    #[serde(default = "default_sample_query")]
    pub sample_query: String,

    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            sample_query: DEFAULT_SAMPLE_QUERY.to_string(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_sample_query() -> String {
    DEFAULT_SAMPLE_QUERY.to_string()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            scraper: ScraperConfig::default(),
            embedding: EmbeddingConfig::default(),
            ingest: IngestConfig::default(),
            base_path: String::new(),
        }
    }
}

fn default_output_dir() -> String {
    DEFAULT_OUTPUT_DIR.to_string()
}

impl Config {
    fn validate(&mut self) {
        if self.output_dir.is_empty() {
            self.output_dir = default_output_dir();
        }

        if !self.scraper.search_url.starts_with("http") {
            panic!(
                "scraper.search_url must be an http(s) URL, got '{}'",
                self.scraper.search_url
            );
        }

        if !self.scraper.base_url.starts_with("http") {
            panic!(
                "scraper.base_url must be an http(s) URL, got '{}'",
                self.scraper.base_url
            );
        }

        if self.ingest.batch_size == 0 {
            panic!("ingest.batch_size must be greater than 0");
        }

        if self.ingest.top_k == 0 {
            panic!("ingest.top_k must be greater than 0");
        }

        if self.embedding.download_timeout_secs == 0 {
            panic!("embedding.download_timeout_secs must be greater than 0");
        }
    }

    pub fn load_with(base_path: &str) -> Self {
        let config_path = Path::new(base_path).join("config.yaml");

        // create new if does not exist
        if std::fs::metadata(&config_path).is_err() {
            std::fs::create_dir_all(base_path).expect("cannot create config directory");
            std::fs::write(
                &config_path,
                serde_yml::to_string(&Self::default()).unwrap().as_bytes(),
            )
            .expect("cannot write default config");
        }

        let config_str =
            std::fs::read_to_string(&config_path).expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let config_path = Path::new(&self.base_path).join("config.yaml");

        let config_str = serde_yml::to_string(&self).unwrap();
        std::fs::write(config_path, config_str.as_bytes()).expect("cannot write config");
    }

    /// Directory for cached embedding model files.
    pub fn model_cache_dir(&self) -> PathBuf {
        Path::new(&self.output_dir).to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_loads_defaults() {
        let config: Config = serde_yml::from_str("{}").unwrap();
        assert_eq!(config.output_dir, "data");
        assert_eq!(config.scraper.scroll_passes, 3);
        assert_eq!(config.ingest.collection, "product_reviews");
        assert!(!config.scraper.selectors.product_cards.is_empty());
    }

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let config: Config = serde_yml::from_str("scraper:\n  scroll_passes: 7\n").unwrap();
        assert_eq!(config.scraper.scroll_passes, 7);
        assert_eq!(config.scraper.settle_secs, 3);
    }

    #[test]
    fn test_load_creates_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap().to_string();

        let config = Config::load_with(&base);
        assert_eq!(config.output_dir, "data");
        assert!(dir.path().join("config.yaml").exists());
    }

    #[test]
    #[should_panic(expected = "batch_size")]
    fn test_zero_batch_size_panics() {
        let mut config: Config = serde_yml::from_str("ingest:\n  batch_size: 0\n").unwrap();
        config.validate();
    }
}
