//! Search index over per-course section documents.
//!
//! The [`SectionIndex`] trait is the seam between the pipeline, the tools
//! and a concrete backend. Two backends exist:
//!
//! - **[`SqliteIndex`]** (default): stores documents as JSON next to the
//!   relational tables and scores vectors by brute-force cosine similarity.
//! - **[`ElasticIndex`]**: talks to an Elasticsearch cluster over HTTP with
//!   `dense_vector` fields and approximate kNN.

mod elastic;
mod sqlite;

pub use elastic::ElasticIndex;
pub use sqlite::SqliteIndex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::IndexConfig;
use crate::models::{SectionDocument, SectionField};

/// Outcome of indexing one batch. Per-document failures are counted in
/// `errors`; a failure of the whole batch is an `Err` instead.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub indexed: usize,
    pub errors: usize,
}

/// One matching document, projected to a single field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionHit {
    pub course_id: String,
    pub course_name: String,
    pub field: SectionField,
    pub value: Option<serde_json::Value>,
    pub score: f32,
}

impl SectionHit {
    fn project(doc: &SectionDocument, field: SectionField, score: f32) -> Self {
        Self {
            course_id: doc.course_id.clone(),
            course_name: doc.course_name.clone(),
            field,
            value: field.value_of(doc),
            score,
        }
    }
}

#[async_trait]
pub trait SectionIndex: Send + Sync {
    /// Backend name, for logs and CLI output.
    fn name(&self) -> &str;

    /// Creates the index if it does not exist yet.
    async fn ensure_index(&self) -> Result<()>;

    /// Indexes documents keyed by course id, replacing existing ones.
    async fn index_batch(&self, docs: &[SectionDocument]) -> Result<BatchReport>;

    /// Documents for `course_id` holding a non-empty `field`, at most 3.
    async fn get_field(&self, course_id: &str, field: SectionField) -> Result<Vec<SectionHit>>;

    /// Nearest neighbours of `vector` on the field's vector, best first.
    async fn knn(
        &self,
        field: SectionField,
        vector: &[f32],
        k: usize,
        num_candidates: usize,
    ) -> Result<Vec<SectionHit>>;

    /// Every indexed document, ordered by course id.
    async fn all_documents(&self) -> Result<Vec<SectionDocument>>;
}

/// Maximum hits returned by [`SectionIndex::get_field`].
pub const FIELD_HITS: usize = 3;

/// Indexes `docs` in batches of `batch_size`.
///
/// Stops at the first failed batch; documents from earlier batches stay
/// indexed.
pub async fn bulk_index(
    index: &dyn SectionIndex,
    docs: &[SectionDocument],
    batch_size: usize,
) -> Result<Vec<BatchReport>> {
    if batch_size == 0 {
        bail!("index batch_size must be > 0");
    }

    let mut reports = Vec::new();
    for (i, batch) in docs.chunks(batch_size).enumerate() {
        let report = match index.index_batch(batch).await {
            Ok(report) => report,
            Err(e) => {
                let kept: usize = reports.iter().map(|r: &BatchReport| r.indexed).sum();
                bail!(
                    "index batch {} failed ({} documents from earlier batches kept): {}",
                    i + 1,
                    kept,
                    e
                );
            }
        };
        if report.errors > 0 {
            warn!(batch = i + 1, errors = report.errors, "index batch had errors");
        } else {
            info!(batch = i + 1, indexed = report.indexed, "indexed batch");
        }
        reports.push(report);
    }
    Ok(reports)
}

/// Builds the configured backend. The SQLite backend shares `pool`.
pub fn create_index(config: &IndexConfig, pool: SqlitePool) -> Result<Box<dyn SectionIndex>> {
    match config.backend.as_str() {
        "sqlite" => Ok(Box::new(SqliteIndex::new(pool))),
        "elasticsearch" => Ok(Box::new(ElasticIndex::new(config)?)),
        other => bail!(
            "Unknown index backend: '{}'. Available: sqlite, elasticsearch",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FlakyIndex {
        fail_on_batch: usize,
        batches: Mutex<usize>,
    }

    #[async_trait]
    impl SectionIndex for FlakyIndex {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn ensure_index(&self) -> Result<()> {
            Ok(())
        }
        async fn index_batch(&self, docs: &[SectionDocument]) -> Result<BatchReport> {
            let mut n = self.batches.lock().unwrap();
            *n += 1;
            if *n == self.fail_on_batch {
                bail!("connection reset");
            }
            Ok(BatchReport {
                indexed: docs.len(),
                errors: 0,
            })
        }
        async fn get_field(&self, _: &str, _: SectionField) -> Result<Vec<SectionHit>> {
            Ok(vec![])
        }
        async fn knn(&self, _: SectionField, _: &[f32], _: usize, _: usize) -> Result<Vec<SectionHit>> {
            Ok(vec![])
        }
        async fn all_documents(&self) -> Result<Vec<SectionDocument>> {
            Ok(vec![])
        }
    }

    fn doc(id: usize) -> SectionDocument {
        SectionDocument {
            course_id: format!("10500{:04}", id),
            course_name: format!("Asignatura {}", id),
            description: String::new(),
            description_vector: vec![],
            prior_knowledge: String::new(),
            prior_knowledge_vector: vec![],
            competencies: vec![],
            competencies_vector: vec![],
            syllabus: vec![],
        }
    }

    #[tokio::test]
    async fn test_bulk_index_splits_into_batches() {
        let index = FlakyIndex {
            fail_on_batch: usize::MAX,
            batches: Mutex::new(0),
        };
        let docs: Vec<_> = (0..120).map(doc).collect();
        let reports = bulk_index(&index, &docs, 50).await.unwrap();
        let sizes: Vec<usize> = reports.iter().map(|r| r.indexed).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
    }

    #[tokio::test]
    async fn test_bulk_index_surfaces_failed_batch() {
        let index = FlakyIndex {
            fail_on_batch: 2,
            batches: Mutex::new(0),
        };
        let docs: Vec<_> = (0..120).map(doc).collect();
        let err = bulk_index(&index, &docs, 50).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("batch 2"), "{msg}");
        assert!(msg.contains("50 documents"), "{msg}");
        assert_eq!(*index.batches.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_bulk_index_rejects_zero_batch() {
        let index = FlakyIndex {
            fail_on_batch: usize::MAX,
            batches: Mutex::new(0),
        };
        assert!(bulk_index(&index, &[doc(1)], 0).await.is_err());
    }
}
