use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::*;
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Term};

use crate::error::Result;
use crate::models::ScoredPassage;
use crate::search::filter::MetadataFilter;
use crate::search::passages::PassageStore;

/// BM25 lexical index over the passage store, built on an in-RAM tantivy index.
///
/// Every passage is indexed with its store position, so scores can be
/// reported aligned with the store: `score(..)[i]` belongs to `store.get(i)`.
pub struct Bm25Index {
    store: Arc<PassageStore>,
    index: Index,
    reader: IndexReader,
    // Field handles
    f_position: Field,
    f_content: Field,
}

impl Bm25Index {
    /// Index every passage of the store, once.
    pub fn build(store: Arc<PassageStore>) -> Result<Self> {
        let mut schema_builder = Schema::builder();
        let f_position =
            schema_builder.add_u64_field("position", NumericOptions::default() | STORED);
        // The default text analyzer lower-cases tokens.
        let f_content = schema_builder.add_text_field("content", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        // A single indexing thread keeps segment layout deterministic.
        let mut writer: IndexWriter = index.writer_with_num_threads(1, 50_000_000)?;
        for (position, passage) in store.iter().enumerate() {
            writer.add_document(doc!(
                f_position => position as u64,
                f_content => passage.content.clone(),
            ))?;
        }
        writer.commit()?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        tracing::info!("Built BM25 index over {} passages", store.len());

        Ok(Self {
            store,
            index,
            reader,
            f_position,
            f_content,
        })
    }

    /// Split text into the lower-cased tokens the index was built with.
    pub fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        let mut analyzer = self.index.tokenizer_for_field(self.f_content)?;
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }
        Ok(tokens)
    }

    /// BM25 score of every passage against the query tokens, aligned by store position.
    ///
    /// Passages sharing no term with the query score exactly zero.
    pub fn score(&self, query_tokens: &[String]) -> Result<Vec<f32>> {
        let n = self.store.len();
        let mut scores = vec![0.0f32; n];
        if n == 0 || query_tokens.is_empty() {
            return Ok(scores);
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = query_tokens
            .iter()
            .map(|token| {
                let term = Term::from_field_text(self.f_content, token);
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(n))?;

        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let position = doc
                .get_first(self.f_position)
                .and_then(|v| v.as_u64())
                .map(|p| p as usize);

            match position {
                Some(p) if p < n => scores[p] = score,
                _ => tracing::warn!("BM25 hit without a valid store position; ignored"),
            }
        }

        Ok(scores)
    }

    /// Top `top_k` passages by BM25 score among those matching `filter`.
    ///
    /// Ties keep ascending store order.
    pub fn keyword_search(
        &self,
        query: &str,
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredPassage>> {
        let tokens = self.tokenize(query)?;
        let scores = self.score(&tokens)?;

        let mut hits: Vec<ScoredPassage> = self
            .store
            .iter()
            .zip(scores)
            .filter(|(passage, _)| filter.matches(&passage.metadata))
            .map(|(passage, score)| ScoredPassage {
                passage: Arc::clone(passage),
                score,
            })
            .collect();

        // Stable sort: equal scores stay in store order.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PassageMetadata, PassageRecord};

    fn passage(i: usize, content: &str, doc_type: &str) -> PassageRecord {
        PassageRecord {
            id: i.to_string(),
            content: content.to_string(),
            metadata: PassageMetadata {
                source: "t".to_string(),
                chunk_index: i,
                doc_type: doc_type.to_string(),
                ..Default::default()
            },
        }
    }

    fn build(contents: &[&str]) -> Bm25Index {
        let records = contents
            .iter()
            .enumerate()
            .map(|(i, c)| passage(i, c, "txt"))
            .collect();
        Bm25Index::build(Arc::new(PassageStore::from_records(records).unwrap())).unwrap()
    }

    #[test]
    fn test_keyword_search_alice() {
        let index = build(&["Alice works at OpenAI", "Bob lives in the UK"]);
        let hits = index.keyword_search("Alice", 1, &MetadataFilter::new()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].passage.metadata.chunk_index, 0);
    }

    #[test]
    fn test_keyword_search_bob() {
        let index = build(&["Alice works at OpenAI", "Bob lives in the UK"]);
        let hits = index.keyword_search("Bob", 1, &MetadataFilter::new()).unwrap();
        assert_eq!(hits[0].passage.metadata.chunk_index, 1);
    }

    #[test]
    fn test_tokenize_lowercases() {
        let index = build(&["x"]);
        let tokens = index.tokenize("Alice WORKS").unwrap();
        assert_eq!(tokens, vec!["alice".to_string(), "works".to_string()]);
    }

    #[test]
    fn test_scores_aligned_and_zero_without_overlap() {
        let index = build(&["red apple", "green pear", "apple pie"]);
        let scores = index.score(&index.tokenize("apple").unwrap()).unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores[0] > 0.0);
        assert_eq!(scores[1], 0.0);
        assert!(scores[2] > 0.0);
    }

    #[test]
    fn test_term_frequency_is_sublinear() {
        let index = build(&["apple pear pear pear", "apple apple apple apple", "plum"]);
        let scores = index.score(&["apple".to_string()]).unwrap();
        assert!(scores[1] > scores[0]);
        assert!(scores[1] < 4.0 * scores[0]);
    }

    #[test]
    fn test_long_documents_penalized() {
        let index = build(&[
            "apple",
            "apple banana cherry date elderberry fig grape",
            "plum",
        ]);
        let scores = index.score(&["apple".to_string()]).unwrap();
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn test_empty_query_scores_zero() {
        let index = build(&["anything"]);
        let scores = index.score(&[]).unwrap();
        assert_eq!(scores, vec![0.0]);
    }

    #[test]
    fn test_ties_keep_store_order() {
        let index = build(&["nothing here", "also nothing", "still nothing"]);
        let hits = index.keyword_search("zebra", 3, &MetadataFilter::new()).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.passage.metadata.chunk_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_filter_applied_before_truncation() {
        let records = vec![
            passage(0, "apple apple", "html"),
            passage(1, "apple", "pdf"),
            passage(2, "pear", "pdf"),
        ];
        let index =
            Bm25Index::build(Arc::new(PassageStore::from_records(records).unwrap())).unwrap();
        let filter = MetadataFilter::new().with("doc_type", "pdf");
        let hits = index.keyword_search("apple", 1, &filter).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].passage.id, "1");
    }

    #[test]
    fn test_top_k_larger_than_retained_returns_retained() {
        let records = vec![passage(0, "a", "pdf"), passage(1, "b", "html")];
        let index =
            Bm25Index::build(Arc::new(PassageStore::from_records(records).unwrap())).unwrap();
        let filter = MetadataFilter::new().with("doc_type", "pdf");
        let hits = index.keyword_search("a", 10, &filter).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_empty_store() {
        let index = build(&[]);
        let hits = index.keyword_search("x", 5, &MetadataFilter::new()).unwrap();
        assert!(hits.is_empty());
    }
}
