use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{BatchReport, SectionHit, SectionIndex, FIELD_HITS};
use crate::config::IndexConfig;
use crate::models::{SectionDocument, SectionField};

/// Upper bound for [`SectionIndex::all_documents`] on this backend.
const MAX_EXPORT_DOCS: usize = 10_000;

/// Section index stored in an Elasticsearch cluster.
pub struct ElasticIndex {
    client: reqwest::Client,
    base_url: String,
    name: String,
}

impl ElasticIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let base_url = config
            .url
            .clone()
            .context("index.url is required for the elasticsearch backend")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            name: config.name.clone(),
        })
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.base_url, self.name)
    }

    async fn search(&self, body: &Value) -> Result<Value> {
        let resp = self
            .client
            .post(format!("{}/_search", self.index_url()))
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("elasticsearch search failed ({}): {}", status, text);
        }
        Ok(resp.json().await?)
    }
}

/// Index mapping: ids as keywords, texts analysed, vectors as cosine
/// `dense_vector`s whose dimensions are taken from the first document.
pub(crate) fn index_mapping() -> Value {
    let vector = json!({ "type": "dense_vector", "index": true, "similarity": "cosine" });
    json!({
        "mappings": {
            "properties": {
                "course_id": { "type": "keyword" },
                "course_name": { "type": "text" },
                "description": { "type": "text" },
                "description_vector": vector,
                "prior_knowledge": { "type": "text" },
                "prior_knowledge_vector": vector,
                "competencies": {
                    "properties": {
                        "code": { "type": "keyword" },
                        "text": { "type": "text" }
                    }
                },
                "competencies_vector": vector,
                "syllabus": { "type": "object", "enabled": false }
            }
        }
    })
}

/// Document body sent to the cluster. Empty vectors are left out since a
/// `dense_vector` field rejects them.
pub(crate) fn document_body(doc: &SectionDocument) -> Result<Value> {
    let mut body = serde_json::to_value(doc)?;
    if let Value::Object(map) = &mut body {
        for field in SectionField::ALL {
            if let Some(name) = field.vector_field() {
                if field.vector_of(doc).is_empty() {
                    map.remove(name);
                }
            }
        }
    }
    Ok(body)
}

/// NDJSON payload for the `_bulk` endpoint.
pub(crate) fn bulk_payload(index: &str, docs: &[SectionDocument]) -> Result<String> {
    let mut out = String::new();
    for doc in docs {
        let action = json!({ "index": { "_index": index, "_id": doc.course_id } });
        out.push_str(&action.to_string());
        out.push('\n');
        out.push_str(&document_body(doc)?.to_string());
        out.push('\n');
    }
    Ok(out)
}

/// Counts items of a `_bulk` response that were not stored.
pub(crate) fn bulk_report(response: &Value) -> BatchReport {
    let mut report = BatchReport::default();
    let items = response["items"].as_array().cloned().unwrap_or_default();
    for item in &items {
        let status = item["index"]["status"].as_u64().unwrap_or(500);
        if (200..300).contains(&status) {
            report.indexed += 1;
        } else {
            report.errors += 1;
        }
    }
    report
}

pub(crate) fn parse_hits(response: &Value, field: SectionField) -> Result<Vec<SectionHit>> {
    let hits = response["hits"]["hits"].as_array().cloned().unwrap_or_default();
    hits.iter()
        .map(|hit| -> Result<SectionHit> {
            let doc: SectionDocument = serde_json::from_value(hit["_source"].clone())
                .context("unexpected document shape in search response")?;
            let score = hit["_score"].as_f64().unwrap_or(0.0) as f32;
            Ok(SectionHit::project(&doc, field, score))
        })
        .collect()
}

fn vector_excludes() -> Value {
    json!({ "excludes": ["description_vector", "prior_knowledge_vector", "competencies_vector"] })
}

#[async_trait]
impl SectionIndex for ElasticIndex {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn ensure_index(&self) -> Result<()> {
        let head = self.client.head(self.index_url()).send().await?;
        if head.status().is_success() {
            return Ok(());
        }
        if head.status() != reqwest::StatusCode::NOT_FOUND {
            bail!("elasticsearch index check failed ({})", head.status());
        }

        let resp = self
            .client
            .put(self.index_url())
            .json(&index_mapping())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            // Another process may have created it in between.
            if !text.contains("resource_already_exists_exception") {
                bail!("elasticsearch index creation failed ({}): {}", status, text);
            }
        }
        Ok(())
    }

    async fn index_batch(&self, docs: &[SectionDocument]) -> Result<BatchReport> {
        if docs.is_empty() {
            return Ok(BatchReport::default());
        }
        let payload = bulk_payload(&self.name, docs)?;
        let resp = self
            .client
            .post(format!("{}/_bulk", self.base_url))
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("elasticsearch bulk request failed ({}): {}", status, text);
        }
        let body: Value = resp.json().await?;
        Ok(bulk_report(&body))
    }

    async fn get_field(&self, course_id: &str, field: SectionField) -> Result<Vec<SectionHit>> {
        let query = json!({
            "size": FIELD_HITS,
            "_source": vector_excludes(),
            "query": {
                "bool": {
                    "filter": [
                        { "term": { "course_id": course_id } },
                        { "exists": { "field": field.as_str() } }
                    ]
                }
            }
        });
        let response = self.search(&query).await?;
        Ok(parse_hits(&response, field)?
            .into_iter()
            .filter(|hit| hit.value.is_some())
            .collect())
    }

    async fn knn(
        &self,
        field: SectionField,
        vector: &[f32],
        k: usize,
        num_candidates: usize,
    ) -> Result<Vec<SectionHit>> {
        let Some(vector_field) = field.vector_field() else {
            return Ok(Vec::new());
        };
        let query = json!({
            "knn": {
                "field": vector_field,
                "query_vector": vector,
                "k": k,
                "num_candidates": num_candidates.max(k)
            },
            "_source": vector_excludes()
        });
        let response = self.search(&query).await?;
        parse_hits(&response, field)
    }

    async fn all_documents(&self) -> Result<Vec<SectionDocument>> {
        let query = json!({
            "size": MAX_EXPORT_DOCS,
            "_source": vector_excludes(),
            "sort": [{ "course_id": "asc" }],
            "query": { "match_all": {} }
        });
        let response = self.search(&query).await?;
        let hits = response["hits"]["hits"].as_array().cloned().unwrap_or_default();
        hits.into_iter()
            .map(|hit| -> Result<SectionDocument> {
                Ok(serde_json::from_value(hit["_source"].clone())?)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> SectionDocument {
        SectionDocument {
            course_id: "105000006".into(),
            course_name: "Sistemas Operativos".into(),
            description: "Procesos".into(),
            description_vector: vec![0.5, 0.5],
            prior_knowledge: String::new(),
            prior_knowledge_vector: vec![],
            competencies: vec![],
            competencies_vector: vec![],
            syllabus: vec![],
        }
    }

    #[test]
    fn test_bulk_payload_is_ndjson_keyed_by_course() {
        let payload = bulk_payload("course_sections", &[doc()]).unwrap();
        let lines: Vec<&str> = payload.lines().collect();
        assert_eq!(lines.len(), 2);

        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_id"], "105000006");
        assert_eq!(action["index"]["_index"], "course_sections");

        let body: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(body["description_vector"], json!([0.5, 0.5]));
        assert!(body.get("prior_knowledge_vector").is_none());
        assert!(body.get("competencies_vector").is_none());
    }

    #[test]
    fn test_bulk_report_counts_item_errors() {
        let response = json!({
            "errors": true,
            "items": [
                { "index": { "status": 201 } },
                { "index": { "status": 200 } },
                { "index": { "status": 400, "error": { "type": "mapper_parsing_exception" } } }
            ]
        });
        assert_eq!(bulk_report(&response), BatchReport { indexed: 2, errors: 1 });
    }

    #[test]
    fn test_parse_hits_projects_field() {
        let response = json!({
            "hits": { "hits": [
                { "_score": 0.93, "_source": {
                    "course_id": "105000006",
                    "course_name": "Sistemas Operativos",
                    "description": "Procesos",
                    "prior_knowledge": ""
                } }
            ] }
        });
        let hits = parse_hits(&response, SectionField::Description).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].value, Some(json!("Procesos")));
        assert!((hits[0].score - 0.93).abs() < 1e-6);
    }

    #[test]
    fn test_mapping_declares_vector_fields() {
        let mapping = index_mapping();
        let props = &mapping["mappings"]["properties"];
        assert_eq!(props["course_id"]["type"], "keyword");
        assert_eq!(props["competencies_vector"]["type"], "dense_vector");
    }

    #[test]
    fn test_requires_url() {
        assert!(ElasticIndex::new(&IndexConfig::default()).is_err());
    }
}
