//! Thin blocking client for a Data-API-shaped vector store.
//!
//! The store is an external HTTPS service addressed by endpoint, token and
//! keyspace from the environment. All commands are JSON POSTs; API-level
//! errors come back in an `errors` array on an otherwise-200 response.

use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

const ENDPOINT_VAR: &str = "VECTOR_DB_API_ENDPOINT";
const TOKEN_VAR: &str = "VECTOR_DB_APPLICATION_TOKEN";
const KEYSPACE_VAR: &str = "VECTOR_DB_KEYSPACE";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("missing credential {0} in environment")]
    MissingCredential(&'static str),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store API error: {0}")]
    Api(String),
}

#[derive(Clone, Debug)]
pub struct StoreCredentials {
    pub endpoint: String,
    pub token: String,
    pub keyspace: String,
}

impl StoreCredentials {
    pub fn from_env() -> Result<Self, StoreError> {
        Ok(Self {
            endpoint: require_env(ENDPOINT_VAR)?,
            token: require_env(TOKEN_VAR)?,
            keyspace: require_env(KEYSPACE_VAR)?,
        })
    }
}

fn require_env(key: &'static str) -> Result<String, StoreError> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or(StoreError::MissingCredential(key))
}

/// Document as it lives in the collection: review text as content, the
/// other CSV columns as metadata.
#[derive(Clone, Debug, Serialize)]
pub struct StoredDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "$vector")]
    pub vector: Vec<f32>,
    pub content: String,
    pub metadata: Value,
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub metadata: Value,
    pub score: Option<f32>,
}

pub struct VectorStore {
    client: reqwest::blocking::Client,
    credentials: StoreCredentials,
    collection: String,
}

impl VectorStore {
    pub fn new(credentials: StoreCredentials, collection: &str) -> Result<Self, StoreError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            credentials,
            collection: collection.to_string(),
        })
    }

    fn keyspace_url(&self) -> String {
        format!(
            "{}/api/json/v1/{}",
            self.credentials.endpoint.trim_end_matches('/'),
            self.credentials.keyspace
        )
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.keyspace_url(), self.collection)
    }

    fn post(&self, url: &str, body: &Value) -> Result<Value, StoreError> {
        let resp = self
            .client
            .post(url)
            .header("Token", &self.credentials.token)
            .json(body)
            .send()?;

        let value: Value = resp.json()?;

        if let Some(errors) = value.get("errors").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                let message = errors[0]
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown");
                return Err(StoreError::Api(message.to_string()));
            }
        }

        Ok(value)
    }

    /// Create the collection if it doesn't exist. Idempotent on the API side.
    pub fn ensure_collection(&self, dimensions: usize) -> Result<(), StoreError> {
        log::info!(
            "ensuring collection '{}' ({dimensions} dims)",
            self.collection
        );
        self.post(
            &self.keyspace_url(),
            &create_collection_command(&self.collection, dimensions),
        )?;
        Ok(())
    }

    /// Write documents one by one as replace-with-upsert, so re-ingesting
    /// the same rows overwrites instead of duplicating.
    pub fn upsert(&self, documents: &[StoredDocument]) -> Result<usize, StoreError> {
        let url = self.collection_url();

        let mut written = 0;
        for document in documents {
            self.post(&url, &replace_command(document))?;
            written += 1;
        }

        Ok(written)
    }

    /// Vector similarity search, highest scores first.
    pub fn similarity_search(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let value = self.post(&self.collection_url(), &search_command(vector, limit))?;

        let hits = value
            .pointer("/data/documents")
            .and_then(|docs| docs.as_array())
            .map(|docs| docs.iter().map(parse_hit).collect())
            .unwrap_or_default();

        Ok(hits)
    }
}

fn parse_hit(doc: &Value) -> SearchHit {
    SearchHit {
        id: doc
            .get("_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        content: doc
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        metadata: doc.get("metadata").cloned().unwrap_or(Value::Null),
        score: doc
            .get("$similarity")
            .and_then(|v| v.as_f64())
            .map(|v| v as f32),
    }
}

fn create_collection_command(name: &str, dimensions: usize) -> Value {
    json!({
        "createCollection": {
            "name": name,
            "options": {
                "vector": { "dimension": dimensions, "metric": "cosine" }
            }
        }
    })
}

fn replace_command(document: &StoredDocument) -> Value {
    json!({
        "findOneAndReplace": {
            "filter": { "_id": document.id },
            "replacement": document,
            "options": { "upsert": true }
        }
    })
}

fn search_command(vector: &[f32], limit: usize) -> Value {
    json!({
        "find": {
            "sort": { "$vector": vector },
            "options": { "limit": limit, "includeSimilarity": true }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> StoredDocument {
        StoredDocument {
            id: "abc123".to_string(),
            vector: vec![0.1, 0.2],
            content: "review1 || review2".to_string(),
            metadata: json!({ "product_id": "itmABC123" }),
        }
    }

    #[test]
    fn test_create_collection_command_shape() {
        let cmd = create_collection_command("product_reviews", 768);
        assert_eq!(cmd["createCollection"]["name"], "product_reviews");
        assert_eq!(
            cmd["createCollection"]["options"]["vector"]["dimension"],
            768
        );
        assert_eq!(
            cmd["createCollection"]["options"]["vector"]["metric"],
            "cosine"
        );
    }

    #[test]
    fn test_replace_command_shape() {
        let cmd = replace_command(&document());
        let replace = &cmd["findOneAndReplace"];

        assert_eq!(replace["filter"]["_id"], "abc123");
        assert_eq!(replace["options"]["upsert"], true);
        assert_eq!(replace["replacement"]["_id"], "abc123");
        assert_eq!(replace["replacement"]["content"], "review1 || review2");
        assert_eq!(
            replace["replacement"]["metadata"]["product_id"],
            "itmABC123"
        );
        assert!(replace["replacement"]["$vector"].is_array());
    }

    #[test]
    fn test_search_command_shape() {
        let cmd = search_command(&[0.5, 0.5], 3);
        assert_eq!(cmd["find"]["options"]["limit"], 3);
        assert_eq!(cmd["find"]["options"]["includeSimilarity"], true);
        assert_eq!(cmd["find"]["sort"]["$vector"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_parse_hit_tolerates_missing_fields() {
        let hit = parse_hit(&json!({ "_id": "x" }));
        assert_eq!(hit.id, "x");
        assert!(hit.content.is_empty());
        assert!(hit.score.is_none());
    }
}
