use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use super::{BatchReport, SectionHit, SectionIndex, FIELD_HITS};
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{SectionDocument, SectionField};

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS section_documents (
        course_id TEXT PRIMARY KEY,
        course_name TEXT NOT NULL,
        body_json TEXT NOT NULL,
        indexed_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS section_vectors (
        course_id TEXT NOT NULL,
        field TEXT NOT NULL,
        dims INTEGER NOT NULL,
        vector BLOB NOT NULL,
        PRIMARY KEY (course_id, field),
        FOREIGN KEY (course_id) REFERENCES section_documents(course_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_section_vectors_field ON section_vectors(field)",
];

/// Section index kept in the same SQLite database as the relational store.
///
/// Documents are stored as JSON without their vectors; vectors live in
/// `section_vectors` and are scanned exhaustively on kNN queries.
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn write_document(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        doc: &SectionDocument,
    ) -> Result<()> {
        let mut body = doc.clone();
        body.description_vector.clear();
        body.prior_knowledge_vector.clear();
        body.competencies_vector.clear();
        let body_json = serde_json::to_string(&body)?;

        sqlx::query(
            r#"
            INSERT INTO section_documents (course_id, course_name, body_json, indexed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(course_id) DO UPDATE SET
                course_name = excluded.course_name,
                body_json = excluded.body_json,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(&doc.course_id)
        .bind(&doc.course_name)
        .bind(&body_json)
        .bind(Utc::now().timestamp())
        .execute(&mut **tx)
        .await?;

        sqlx::query("DELETE FROM section_vectors WHERE course_id = ?")
            .bind(&doc.course_id)
            .execute(&mut **tx)
            .await?;

        for field in SectionField::ALL {
            let (Some(name), vector) = (field.vector_field(), field.vector_of(doc)) else {
                continue;
            };
            if vector.is_empty() {
                continue;
            }
            sqlx::query(
                "INSERT INTO section_vectors (course_id, field, dims, vector) VALUES (?, ?, ?, ?)",
            )
            .bind(&doc.course_id)
            .bind(name)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl SectionIndex for SqliteIndex {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn ensure_index(&self) -> Result<()> {
        for statement in TABLES {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn index_batch(&self, docs: &[SectionDocument]) -> Result<BatchReport> {
        let mut tx = self.pool.begin().await?;
        let mut report = BatchReport::default();

        for doc in docs {
            match Self::write_document(&mut tx, doc).await {
                Ok(()) => report.indexed += 1,
                Err(e) => {
                    warn!(course_id = %doc.course_id, error = %e, "failed to index document");
                    report.errors += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(report)
    }

    async fn get_field(&self, course_id: &str, field: SectionField) -> Result<Vec<SectionHit>> {
        let rows = sqlx::query(
            "SELECT body_json FROM section_documents WHERE course_id = ? LIMIT ?",
        )
        .bind(course_id)
        .bind(FIELD_HITS as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::new();
        for row in rows {
            let body: String = row.get("body_json");
            let doc: SectionDocument = serde_json::from_str(&body)?;
            if field.value_of(&doc).is_some() {
                hits.push(SectionHit::project(&doc, field, 1.0));
            }
        }
        Ok(hits)
    }

    async fn knn(
        &self,
        field: SectionField,
        vector: &[f32],
        k: usize,
        _num_candidates: usize,
    ) -> Result<Vec<SectionHit>> {
        let Some(vector_field) = field.vector_field() else {
            return Ok(Vec::new());
        };

        // Exhaustive scan; num_candidates only matters for approximate backends.
        let rows = sqlx::query(
            r#"
            SELECT d.body_json, v.vector
            FROM section_vectors v
            JOIN section_documents d ON d.course_id = v.course_id
            WHERE v.field = ?
            "#,
        )
        .bind(vector_field)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("vector");
            let stored = blob_to_vec(&blob);
            if stored.len() != vector.len() {
                continue;
            }
            let body: String = row.get("body_json");
            let doc: SectionDocument = serde_json::from_str(&body)?;
            scored.push((cosine_similarity(vector, &stored), doc));
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .iter()
            .map(|(score, doc)| SectionHit::project(doc, field, *score))
            .collect())
    }

    async fn all_documents(&self) -> Result<Vec<SectionDocument>> {
        let rows = sqlx::query("SELECT body_json FROM section_documents ORDER BY course_id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<SectionDocument> {
                let body: String = row.get("body_json");
                Ok(serde_json::from_str(&body)?)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::Competency;

    async fn index() -> (tempfile::TempDir, SqliteIndex) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("guides.sqlite"))
            .await
            .unwrap();
        let index = SqliteIndex::new(pool);
        index.ensure_index().await.unwrap();
        index.ensure_index().await.unwrap();
        (tmp, index)
    }

    fn doc(id: &str, description: &str, vector: Vec<f32>) -> SectionDocument {
        SectionDocument {
            course_id: id.into(),
            course_name: format!("Asignatura {id}"),
            description: description.into(),
            description_vector: vector,
            prior_knowledge: String::new(),
            prior_knowledge_vector: vec![],
            competencies: vec![Competency {
                code: "CG01".into(),
                text: "Capacidad de análisis".into(),
            }],
            competencies_vector: vec![],
            syllabus: vec![],
        }
    }

    #[tokio::test]
    async fn test_get_field_requires_non_empty_value() {
        let (_tmp, index) = index().await;
        let report = index
            .index_batch(&[doc("105000006", "Procesos y memoria", vec![])])
            .await
            .unwrap();
        assert_eq!(report, BatchReport { indexed: 1, errors: 0 });

        let hits = index
            .get_field("105000006", SectionField::Description)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].value, Some(serde_json::json!("Procesos y memoria")));

        assert!(index
            .get_field("105000006", SectionField::PriorKnowledge)
            .await
            .unwrap()
            .is_empty());
        assert!(index
            .get_field("999999999", SectionField::Description)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_knn_orders_by_similarity_and_reindex_replaces() {
        let (_tmp, index) = index().await;
        index
            .index_batch(&[
                doc("105000001", "redes", vec![0.0, 1.0]),
                doc("105000002", "sistemas", vec![1.0, 0.1]),
                doc("105000003", "sin vector", vec![]),
            ])
            .await
            .unwrap();

        let hits = index
            .knn(SectionField::Description, &[1.0, 0.0], 5, 100)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.course_id.as_str()).collect();
        assert_eq!(ids, vec!["105000002", "105000001"]);
        assert!(hits[0].score > hits[1].score);

        index
            .index_batch(&[doc("105000002", "sistemas", vec![])])
            .await
            .unwrap();
        let hits = index
            .knn(SectionField::Description, &[1.0, 0.0], 5, 100)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let all = index.all_documents().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|d| d.description_vector.is_empty()));
        assert!(index
            .knn(SectionField::Syllabus, &[1.0, 0.0], 5, 100)
            .await
            .unwrap()
            .is_empty());
    }
}
