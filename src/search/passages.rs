use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, SearchError};
use crate::models::{PassageMetadata, PassageRecord};

/// Record shape written by the external chunker.
#[derive(Debug, Deserialize)]
struct SourceRecord {
    id: Option<String>,
    content: String,
    #[serde(default)]
    metadata: PassageMetadata,
}

/// Immutable, ordered passage collection. Position `i` is the passage's
/// identity for every index built on top of the store.
#[derive(Debug)]
pub struct PassageStore {
    passages: Vec<Arc<PassageRecord>>,
    positions: HashMap<String, usize>,
}

impl PassageStore {
    /// Load passages from a JSON array file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SearchError::Initialization(format!(
                "{} not found; run chunking first",
                path.display()
            )));
        }

        let data = std::fs::read_to_string(path).map_err(|e| {
            SearchError::Initialization(format!("failed to read {}: {e}", path.display()))
        })?;

        let records: Vec<SourceRecord> = serde_json::from_str(&data).map_err(|e| {
            SearchError::Initialization(format!("malformed passage source {}: {e}", path.display()))
        })?;

        let passages = records
            .into_iter()
            .enumerate()
            .map(|(i, r)| PassageRecord {
                id: r.id.unwrap_or_else(|| i.to_string()),
                content: r.content,
                metadata: r.metadata,
            })
            .collect();

        let store = Self::from_records(passages)?;
        tracing::info!("Loaded {} passages from {}", store.len(), path.display());
        Ok(store)
    }

    /// Build a store from records already in memory, keeping their order.
    pub fn from_records(records: Vec<PassageRecord>) -> Result<Self> {
        let mut positions = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if positions.insert(record.id.clone(), i).is_some() {
                return Err(SearchError::Initialization(format!(
                    "duplicate passage id '{}'",
                    record.id
                )));
            }
        }

        Ok(Self {
            passages: records.into_iter().map(Arc::new).collect(),
            positions,
        })
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Arc<PassageRecord>> {
        self.passages.get(position)
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PassageRecord>> {
        self.passages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_source(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("chunks.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_preserves_order_and_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(
            dir.path(),
            r#"[
                {"id": "a.pdf_chunk1", "content": "first", "metadata": {"source": "a.pdf", "chunk_index": 1, "doc_type": "pdf"}},
                {"id": "a.pdf_chunk2", "content": "second", "metadata": {"source": "a.pdf", "chunk_index": 2, "doc_type": "pdf"}}
            ]"#,
        );

        let store = PassageStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap().content, "first");
        assert_eq!(store.get(1).unwrap().id, "a.pdf_chunk2");
        assert_eq!(store.position_of("a.pdf_chunk2"), Some(1));
    }

    #[test]
    fn test_missing_id_defaults_to_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(
            dir.path(),
            r#"[{"content": "x", "metadata": {"source": "t"}}, {"content": "y", "metadata": {"source": "t"}}]"#,
        );
        let store = PassageStore::load(&path).unwrap();
        assert_eq!(store.get(1).unwrap().id, "1");
    }

    #[test]
    fn test_missing_file_is_initialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PassageStore::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, SearchError::Initialization(_)));
    }

    #[test]
    fn test_malformed_json_is_initialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(dir.path(), r#"{"not": "an array"}"#);
        let err = PassageStore::load(&path).unwrap_err();
        assert!(matches!(err, SearchError::Initialization(_)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(
            dir.path(),
            r#"[{"id": "x", "content": "a"}, {"id": "x", "content": "b"}]"#,
        );
        let err = PassageStore::load(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_empty_source_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(dir.path(), "[]");
        let store = PassageStore::load(&path).unwrap();
        assert!(store.is_empty());
    }
}
