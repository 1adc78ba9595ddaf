//! Ingestion pipeline: scraped CSV -> retrieval documents -> embeddings ->
//! vector store, with an optional verification query at the end.

pub mod embeddings;
pub mod store;

use std::path::Path;

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::products::{self, ProductRecord};
use embeddings::{EmbeddingError, EmbeddingModel};
use store::{SearchHit, StoreCredentials, StoreError, StoredDocument, VectorStore};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to load CSV: {0}")]
    Load(String),

    #[error("no ingestable rows in {0}")]
    EmptyDataset(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A CSV row shaped for retrieval: review text as content, the other five
/// columns as metadata.
#[derive(Clone, Debug)]
pub struct ReviewDocument {
    pub id: String,
    pub content: String,
    pub metadata: serde_json::Value,
}

/// Deterministic document id, so re-ingesting the same row replaces its
/// document instead of adding a duplicate.
pub fn document_id(record: &ProductRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.product_id.as_bytes());
    hasher.update(record.top_reviews.as_bytes());
    let digest = hasher.finalize();

    digest
        .iter()
        .take(16)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Turn records into retrieval documents. Sentinel review text still
/// ingests; only rows with empty content are dropped.
pub fn transform_records(records: &[ProductRecord]) -> Vec<ReviewDocument> {
    records
        .iter()
        .filter_map(|record| {
            let content = record.top_reviews.trim();
            if content.is_empty() {
                log::warn!(
                    "skipping row '{}': empty review content",
                    record.product_id
                );
                return None;
            }

            Some(ReviewDocument {
                id: document_id(record),
                content: content.to_string(),
                metadata: json!({
                    "product_id": record.product_id,
                    "product_title": record.product_title,
                    "rating": record.rating,
                    "total_reviews": record.total_reviews,
                    "price": record.price,
                }),
            })
        })
        .collect()
}

#[derive(Debug)]
pub struct IngestReport {
    pub rows: usize,
    pub documents: usize,
    pub upserted: usize,
}

pub struct IngestionPipeline<'a> {
    config: &'a Config,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Run the full pipeline against one CSV file.
    pub fn run(&self, csv_path: &Path, verify: bool) -> Result<IngestReport, IngestError> {
        let records = products::load_from_csv(csv_path)
            .map_err(|err| IngestError::Load(err.to_string()))?;
        log::info!("{} rows loaded from {}", records.len(), csv_path.display());

        let documents = transform_records(&records);
        if documents.is_empty() {
            return Err(IngestError::EmptyDataset(csv_path.display().to_string()));
        }

        let model = self.load_model()?;
        log::info!(
            "embedding {} documents with '{}'",
            documents.len(),
            model.name()
        );

        let store = self.open_store()?;
        store.ensure_collection(model.dimensions())?;

        let mut upserted = 0;
        for chunk in documents.chunks(self.config.ingest.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|doc| doc.content.clone()).collect();
            let vectors = model.embed_batch(&texts)?;

            let stored: Vec<StoredDocument> = chunk
                .iter()
                .zip(vectors)
                .map(|(doc, vector)| StoredDocument {
                    id: doc.id.clone(),
                    vector,
                    content: doc.content.clone(),
                    metadata: doc.metadata.clone(),
                })
                .collect();

            upserted += store.upsert(&stored)?;
            log::info!("upserted {upserted}/{} documents", documents.len());
        }

        if verify {
            self.verify(&model, &store)?;
        }

        Ok(IngestReport {
            rows: records.len(),
            documents: documents.len(),
            upserted,
        })
    }

    /// Sample similarity query against the freshly-loaded collection.
    fn verify(&self, model: &EmbeddingModel, store: &VectorStore) -> Result<(), IngestError> {
        let query = &self.config.ingest.sample_query;
        let vector = model.embed(query)?;
        let hits = store.similarity_search(&vector, self.config.ingest.top_k)?;

        if hits.is_empty() {
            log::warn!("verification query '{query}' returned no hits");
        }
        for (pos, hit) in hits.iter().enumerate() {
            log::info!(
                "verify hit #{}: id={} score={:?} content={}",
                pos + 1,
                hit.id,
                hit.score,
                hit.content
            );
        }

        Ok(())
    }

    fn load_model(&self) -> Result<EmbeddingModel, IngestError> {
        let embedding = &self.config.embedding;
        let timeout = std::time::Duration::from_secs(embedding.download_timeout_secs);

        Ok(EmbeddingModel::new(
            &embedding.model,
            self.config.model_cache_dir(),
            Some(timeout),
        )?)
    }

    fn open_store(&self) -> Result<VectorStore, IngestError> {
        let credentials = StoreCredentials::from_env()?;
        Ok(VectorStore::new(
            credentials,
            &self.config.ingest.collection,
        )?)
    }
}

/// Standalone similarity query for the `query` subcommand: embeds the text
/// and searches the configured collection.
pub fn similarity_query(
    config: &Config,
    text: &str,
    limit: usize,
) -> Result<Vec<SearchHit>, IngestError> {
    let pipeline = IngestionPipeline::new(config);
    let model = pipeline.load_model()?;
    let store = pipeline.open_store()?;

    let vector = model.embed(text)?;
    Ok(store.similarity_search(&vector, limit)?)
}
