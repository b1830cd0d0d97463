use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::cache::embedding::EmbeddingCache;
use crate::error::SearchError;
use crate::models::PassageMetadata;
use crate::search::filter::MetadataFilter;
use crate::search::passages::PassageStore;

/// Embeddings computed concurrently during ingestion.
const INGEST_CONCURRENCY: usize = 4;

/// Distance metric a vector backend reports.
///
/// The similarity conversion is only meaningful if this matches how the
/// backend was actually configured; nothing checks that at runtime.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`, in `[0, 2]`.
    #[default]
    Cosine,
    /// Squared Euclidean distance, in `[0, inf)`.
    L2,
    /// `1 - dot(a, b)`.
    #[serde(alias = "ip")]
    InnerProduct,
}

impl DistanceMetric {
    /// Convert a backend distance into a similarity (higher = closer).
    pub fn to_similarity(self, distance: f32) -> f32 {
        match self {
            DistanceMetric::Cosine | DistanceMetric::InnerProduct => 1.0 - distance,
            DistanceMetric::L2 => 1.0 / (1.0 + distance.max(0.0)),
        }
    }

    /// Distance between two vectors under this metric.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
            DistanceMetric::InnerProduct => 1.0 - dot(a, b),
            DistanceMetric::L2 => {
                if a.len() != b.len() {
                    return f32::INFINITY;
                }
                a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
            }
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" | "euclidean" => Ok(DistanceMetric::L2),
            "ip" | "inner_product" | "dot" => Ok(DistanceMetric::InnerProduct),
            other => anyhow::bail!("Unknown distance metric: {other}"),
        }
    }
}

/// One nearest-neighbour result from a vector backend.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub distance: f32,
    pub metadata: PassageMetadata,
    pub content: String,
}

/// External vector-similarity backend.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Metric the returned distances are expressed in.
    fn metric(&self) -> DistanceMetric;

    /// Number of records currently held.
    async fn count(&self) -> Result<usize>;

    /// Bulk-load records. All four vectors are parallel.
    async fn add(
        &self,
        ids: Vec<String>,
        vectors: Vec<Vec<f32>>,
        metadatas: Vec<PassageMetadata>,
        contents: Vec<String>,
    ) -> Result<()>;

    /// The `k` records nearest to `vector` among those matching `filter`,
    /// closest first.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorMatch>>;
}

/// A stored vector entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    id: String,
    metadata: PassageMetadata,
    content: String,
    embedding: Vec<f32>,
}

/// Exhaustive-scan vector store with optional disk persistence.
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<VectorEntry>>,
    metric: DistanceMetric,
    persist_path: Option<PathBuf>,
}

impl InMemoryVectorStore {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            metric,
            persist_path: None,
        }
    }

    /// Open a persisted store in `vector_dir`, or start an empty one there.
    pub fn open_or_create(vector_dir: &Path, metric: DistanceMetric) -> Result<Self> {
        std::fs::create_dir_all(vector_dir)?;
        let persist_path = vector_dir.join("vectors.json");

        let entries = if persist_path.exists() {
            let data = std::fs::read_to_string(&persist_path)
                .context("Failed to read vector store")?;
            serde_json::from_str(&data).context("Failed to parse vector store")?
        } else {
            Vec::new()
        };

        Ok(Self {
            entries: RwLock::new(entries),
            metric,
            persist_path: Some(persist_path),
        })
    }

    fn persist(&self, data: String) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[async_trait]
impl VectorBackend for InMemoryVectorStore {
    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().len())
    }

    async fn add(
        &self,
        ids: Vec<String>,
        vectors: Vec<Vec<f32>>,
        metadatas: Vec<PassageMetadata>,
        contents: Vec<String>,
    ) -> Result<()> {
        anyhow::ensure!(
            ids.len() == vectors.len() && ids.len() == metadatas.len() && ids.len() == contents.len(),
            "add() arguments must be parallel: {} ids, {} vectors, {} metadatas, {} contents",
            ids.len(),
            vectors.len(),
            metadatas.len(),
            contents.len()
        );

        let data = {
            let mut entries = self.entries.write();
            let dim = entries
                .first()
                .map(|e| e.embedding.len())
                .or_else(|| vectors.first().map(Vec::len));
            if let Some(dim) = dim {
                anyhow::ensure!(
                    vectors.iter().all(|v| v.len() == dim),
                    "Embedding dimension mismatch: store holds {dim}-dimensional vectors"
                );
            }

            // Existing ids are kept as-is.
            let mut known: HashSet<String> = entries.iter().map(|e| e.id.clone()).collect();
            for (((id, embedding), metadata), content) in
                ids.into_iter().zip(vectors).zip(metadatas).zip(contents)
            {
                if !known.insert(id.clone()) {
                    continue;
                }
                entries.push(VectorEntry {
                    id,
                    metadata,
                    content,
                    embedding,
                });
            }

            if self.persist_path.is_none() {
                return Ok(());
            }
            serde_json::to_string(&*entries)?
        };

        self.persist(data)
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorMatch>> {
        let entries = self.entries.read();
        if let Some(stored) = entries.iter().find(|e| e.embedding.len() != vector.len()) {
            anyhow::bail!(
                "Embedding dimension mismatch: query has {} dimensions, stored passage {} has {}",
                vector.len(),
                stored.id,
                stored.embedding.len()
            );
        }

        let mut scored: Vec<(f32, &VectorEntry)> = entries
            .iter()
            .filter(|e| filter.matches(&e.metadata))
            .map(|e| (self.metric.distance(vector, &e.embedding), e))
            .collect();

        // Sort ascending by distance
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, e)| VectorMatch {
                id: e.id.clone(),
                distance,
                metadata: e.metadata.clone(),
                content: e.content.clone(),
            })
            .collect())
    }
}

/// A backend match converted to similarity.
#[derive(Debug, Clone)]
pub struct SemanticMatch {
    pub id: String,
    pub similarity: f32,
    pub metadata: PassageMetadata,
    pub content: String,
}

/// Outcome of loading the passage store into the vector backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Records held by the backend after ingestion.
    pub count: usize,
    /// True if the backend already held records and nothing was added.
    pub already_present: bool,
}

/// Wraps a [`VectorBackend`], converting its distances to similarities.
pub struct SemanticIndex {
    backend: Arc<dyn VectorBackend>,
}

impl SemanticIndex {
    pub fn new(backend: Arc<dyn VectorBackend>) -> Self {
        Self { backend }
    }

    /// Embed and load every passage, unless the backend already holds records.
    pub async fn ingest(
        &self,
        store: &PassageStore,
        embeddings: &EmbeddingCache,
    ) -> crate::error::Result<IngestReport> {
        let existing = self
            .backend
            .count()
            .await
            .map_err(SearchError::provider("vector_backend"))?;
        if existing > 0 {
            tracing::info!("Vector backend already has {existing} passages; skipping ingestion");
            return Ok(IngestReport {
                count: existing,
                already_present: true,
            });
        }

        tracing::info!("Vector backend empty; ingesting {} passages", store.len());

        let vectors: Vec<Vec<f32>> = stream::iter(store.iter())
            .map(|p| embeddings.embed(&p.content))
            .buffered(INGEST_CONCURRENCY)
            .map_ok(|v| v.as_ref().clone())
            .try_collect()
            .await?;

        let ids = store.iter().map(|p| p.id.clone()).collect();
        let metadatas = store.iter().map(|p| p.metadata.clone()).collect();
        let contents = store.iter().map(|p| p.content.clone()).collect();

        self.backend
            .add(ids, vectors, metadatas, contents)
            .await
            .map_err(SearchError::provider("vector_backend"))?;

        let count = self
            .backend
            .count()
            .await
            .map_err(SearchError::provider("vector_backend"))?;
        tracing::info!("Ingested {count} passages into the vector backend");

        Ok(IngestReport {
            count,
            already_present: false,
        })
    }

    /// The `k` nearest passages matching `filter`, most similar first.
    pub async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> crate::error::Result<Vec<SemanticMatch>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let metric = self.backend.metric();
        let matches = self
            .backend
            .query(vector, k, filter)
            .await
            .map_err(SearchError::provider("vector_backend"))?;

        Ok(matches
            .into_iter()
            .map(|m| SemanticMatch {
                id: m.id,
                similarity: metric.to_similarity(m.distance),
                metadata: m.metadata,
                content: m.content,
            })
            .collect())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
