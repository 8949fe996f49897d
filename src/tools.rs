//! Agent tools over the relational store and the section index.
//!
//! Every tool is read-only, takes scalar arguments and answers `null` or
//! `[]` when there is no data. Tools are registered in a [`ToolRegistry`]
//! and dispatched by the HTTP server through `POST /tools/{name}`.
//!
//! ```text
//!   resolve_course_id ─┐
//!   fetch_meta         │
//!   fetch_faculty      ├── catalog (SQLite)
//!   fetch_bibliography │
//!   fetch_program      │
//!   fetch_school      ─┘
//!   fetch_description    ─┐
//!   fetch_prior_knowledge │
//!   fetch_competencies    ├── SectionIndex
//!   fetch_syllabus        │
//!   search_sections      ─┘ (+ EmbeddingProvider)
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::catalog;
use crate::config::Config;
use crate::embedding::{embed_one, EmbeddingProvider};
use crate::index::{SectionHit, SectionIndex};
use crate::models::SectionField;

/// A callable tool exposed to the conversational agent.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name, used as `POST /tools/{name}`.
    fn name(&self) -> &str;

    /// One line the agent reads to decide whether to call the tool.
    fn description(&self) -> &str;

    /// JSON Schema for the parameters, in OpenAI function-calling form.
    fn parameters_schema(&self) -> Value;

    /// Runs the tool with parameters already validated against
    /// [`parameters_schema`](Tool::parameters_schema).
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Services a tool may read from. Built once by the server and shared.
pub struct ToolContext {
    pool: SqlitePool,
    index: Arc<dyn SectionIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: Arc<Config>,
}

impl ToolContext {
    pub fn new(
        pool: SqlitePool,
        index: Arc<dyn SectionIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            pool,
            index,
            embedder,
            config,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Accepts either a course id or a course name.
    pub async fn resolve(&self, course: &str) -> Result<Option<String>> {
        catalog::resolve_course_id(&self.pool, course).await
    }

    /// First indexed value of `field` for the course, if any.
    pub async fn section(&self, course: &str, field: SectionField) -> Result<Option<Value>> {
        let Some(course_id) = self.resolve(course).await? else {
            return Ok(None);
        };
        let hits = self.index.get_field(&course_id, field).await?;
        Ok(hits.into_iter().find_map(|hit| hit.value))
    }

    /// Semantic search over one section field.
    pub async fn search(&self, query: &str, field: SectionField, k: usize) -> Result<Vec<SectionHit>> {
        if !self.config.embedding.is_enabled() {
            bail!("semantic search unavailable: embedding provider is disabled");
        }
        if field.vector_field().is_none() {
            bail!("invalid field '{}': it has no embedding", field.as_str());
        }
        let vector = embed_one(self.embedder.as_ref(), query).await?;
        self.index
            .knn(field, &vector, k, self.config.index.num_candidates)
            .await
    }
}

/// Serializable tool info for the `/tools/list` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn course_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "course_id": { "type": "string", "description": description }
        },
        "required": ["course_id"]
    })
}

fn course_param(params: &Value) -> Result<&str> {
    let course = params["course_id"].as_str().unwrap_or("").trim();
    if course.is_empty() {
        bail!("course_id must not be empty");
    }
    Ok(course)
}

// ============ resolve_course_id ============

pub struct ResolveCourseTool;

#[async_trait]
impl Tool for ResolveCourseTool {
    fn name(&self) -> &str {
        "resolve_course_id"
    }

    fn description(&self) -> &str {
        "Find the course id for a course code or (partial) course name"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Course code (6-9 digits) or name" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = params["query"].as_str().unwrap_or("");
        if query.trim().is_empty() {
            bail!("query must not be empty");
        }
        Ok(json!(ctx.resolve(query).await?))
    }
}

// ============ relational lookups ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogLookup {
    Meta,
    Faculty,
    Bibliography,
    Program,
    School,
}

/// Point lookups answered from the relational store.
pub struct CatalogTool(pub CatalogLookup);

#[async_trait]
impl Tool for CatalogTool {
    fn name(&self) -> &str {
        match self.0 {
            CatalogLookup::Meta => "fetch_meta",
            CatalogLookup::Faculty => "fetch_faculty",
            CatalogLookup::Bibliography => "fetch_bibliography",
            CatalogLookup::Program => "fetch_program",
            CatalogLookup::School => "fetch_school",
        }
    }

    fn description(&self) -> &str {
        match self.0 {
            CatalogLookup::Meta => "Credits, year, semester and language of a course",
            CatalogLookup::Faculty => "Teachers of a course with their email addresses",
            CatalogLookup::Bibliography => "Bibliography of a course (up to 20 references)",
            CatalogLookup::Program => "Degree programs that include a course",
            CatalogLookup::School => "Schools offering a course",
        }
    }

    fn parameters_schema(&self) -> Value {
        course_schema("Course id or name")
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let course = course_param(&params)?;
        let Some(id) = ctx.resolve(course).await? else {
            return Ok(match self.0 {
                CatalogLookup::Meta => Value::Null,
                _ => json!([]),
            });
        };

        let pool = ctx.pool();
        Ok(match self.0 {
            CatalogLookup::Meta => serde_json::to_value(catalog::course_meta(pool, &id).await?)?,
            CatalogLookup::Faculty => {
                serde_json::to_value(catalog::course_faculty(pool, &id).await?)?
            }
            CatalogLookup::Bibliography => {
                serde_json::to_value(catalog::course_bibliography(pool, &id).await?)?
            }
            CatalogLookup::Program => {
                serde_json::to_value(catalog::course_programs(pool, &id).await?)?
            }
            CatalogLookup::School => {
                serde_json::to_value(catalog::course_schools(pool, &id).await?)?
            }
        })
    }
}

// ============ section lookups ============

/// Reads one section of a course from the search index.
pub struct SectionTool(pub SectionField);

#[async_trait]
impl Tool for SectionTool {
    fn name(&self) -> &str {
        match self.0 {
            SectionField::Description => "fetch_description",
            SectionField::PriorKnowledge => "fetch_prior_knowledge",
            SectionField::Competencies => "fetch_competencies",
            SectionField::Syllabus => "fetch_syllabus",
        }
    }

    fn description(&self) -> &str {
        match self.0 {
            SectionField::Description => "Description of a course",
            SectionField::PriorKnowledge => "Recommended prior knowledge for a course",
            SectionField::Competencies => "Competencies of a course as code/text pairs",
            SectionField::Syllabus => "Syllabus of a course as a topic tree",
        }
    }

    fn parameters_schema(&self) -> Value {
        course_schema("Course id or name")
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let course = course_param(&params)?;
        let value = ctx.section(course, self.0).await?;
        Ok(match (self.0, value) {
            (_, Some(v)) => v,
            (SectionField::Competencies | SectionField::Syllabus, None) => json!([]),
            (_, None) => Value::Null,
        })
    }
}

// ============ search_sections ============

pub struct SearchSectionsTool;

#[async_trait]
impl Tool for SearchSectionsTool {
    fn name(&self) -> &str {
        "search_sections"
    }

    fn description(&self) -> &str {
        "Find courses whose description, prior knowledge or competencies match a query"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Free-text query" },
                "field": {
                    "type": "string",
                    "enum": ["description", "prior_knowledge", "competencies"],
                    "default": "description"
                },
                "k": { "type": "integer", "description": "Max results", "default": 5 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = params["query"].as_str().unwrap_or("");
        if query.trim().is_empty() {
            bail!("query must not be empty");
        }
        let field: SectionField = params["field"].as_str().unwrap_or("description").parse()?;
        let k = params["k"].as_u64().unwrap_or(5).clamp(1, 50) as usize;

        let hits = ctx.search(query, field, k).await?;
        Ok(serde_json::to_value(hits)?)
    }
}

// ============ Registry ============

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry with every course tool.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ResolveCourseTool));
        for lookup in [
            CatalogLookup::Meta,
            CatalogLookup::Faculty,
            CatalogLookup::Bibliography,
            CatalogLookup::Program,
            CatalogLookup::School,
        ] {
            registry.register(Box::new(CatalogTool(lookup)));
        }
        for field in SectionField::ALL {
            registry.register(Box::new(SectionTool(field)));
        }
        registry.register(Box::new(SearchSectionsTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks `params` against a tool's JSON Schema and fills in defaults.
///
/// Only the subset the tools use is enforced: required keys, primitive
/// types and enums.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let params_obj = match params {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => bail!("invalid parameters: expected an object, got {}", json_type_name(other)),
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for field in required {
        if !params_obj.contains_key(field) {
            bail!("missing required parameter: {}", field);
        }
    }

    let mut result = params_obj.clone();
    for (name, prop) in &properties {
        let Some(value) = params_obj.get(name) else {
            if let Some(default) = prop.get("default") {
                result.insert(name.clone(), default.clone());
            }
            continue;
        };

        if let Some(expected) = prop.get("type").and_then(|t| t.as_str()) {
            let ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                _ => true,
            };
            if !ok {
                bail!(
                    "parameter '{}' must be of type '{}', got {}",
                    name,
                    expected,
                    json_type_name(value)
                );
            }
        }

        if let Some(allowed) = prop.get("enum").and_then(|e| e.as_array()) {
            if !allowed.contains(value) {
                let names: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                bail!(
                    "parameter '{}' must be one of [{}], got {}",
                    name,
                    names.join(", "),
                    value
                );
            }
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use crate::db;
    use crate::embedding::DisabledProvider;
    use crate::layout::fixtures::sample_guide;
    use crate::guide::GuideExtractor;
    use crate::index::{bulk_index, SqliteIndex};
    use crate::migrate::migrate;
    use crate::patterns::Patterns;
    use crate::store::{RelationalBatch, RelationalStore};

    #[test]
    fn test_registry_has_every_tool() {
        let registry = ToolRegistry::with_builtins();
        let names: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec![
                "resolve_course_id",
                "fetch_meta",
                "fetch_faculty",
                "fetch_bibliography",
                "fetch_program",
                "fetch_school",
                "fetch_description",
                "fetch_prior_knowledge",
                "fetch_competencies",
                "fetch_syllabus",
                "search_sections",
            ]
        );
        assert!(registry.find("fetch_syllabus").is_some());
        assert!(registry.find("fetch_everything").is_none());
    }

    #[test]
    fn test_validate_params() {
        let schema = SearchSectionsTool.parameters_schema();

        let filled = validate_params(&schema, &json!({ "query": "redes" })).unwrap();
        assert_eq!(filled["field"], "description");
        assert_eq!(filled["k"], 5);

        let err = validate_params(&schema, &json!({})).unwrap_err();
        assert!(err.to_string().contains("missing required parameter: query"));

        let err = validate_params(&schema, &json!({ "query": "x", "field": "syllabus" })).unwrap_err();
        assert!(err.to_string().contains("must be one of"));

        let err = validate_params(&schema, &json!({ "query": 3 })).unwrap_err();
        assert!(err.to_string().contains("must be of type 'string'"));
    }

    async fn context(tmp: &tempfile::TempDir) -> ToolContext {
        let config_path = tmp.path().join("guides.toml");
        std::fs::write(
            &config_path,
            format!(
                "[db]\npath = \"{}\"\n",
                tmp.path().join("guides.sqlite").display()
            ),
        )
        .unwrap();
        let config = load_config(&config_path).unwrap();

        let pool = db::connect(&config).await.unwrap();
        migrate(&pool).await.unwrap();
        let index = SqliteIndex::new(pool.clone());
        index.ensure_index().await.unwrap();

        let extractor = GuideExtractor::new(
            Patterns::compile(&config.patterns).unwrap(),
            config.extraction.clone(),
        )
        .unwrap();
        let layout = crate::layout::PdfLayout::from_bytes(&sample_guide()).unwrap();
        let doc = crate::layout::normalize(layout, &config.extraction);
        let guide = extractor.extract(&doc).unwrap();

        let mut batch = RelationalBatch::new();
        batch.add(&guide, vec![]);
        RelationalStore::new(pool.clone()).write(&batch).await.unwrap();
        bulk_index(&index, &[guide.section_document()], 50).await.unwrap();

        ToolContext::new(
            pool,
            Arc::new(index),
            Arc::new(DisabledProvider),
            Arc::new(config),
        )
    }

    #[tokio::test]
    async fn test_tools_answer_from_both_sinks() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = context(&tmp).await;
        let ctx = &ctx;
        let registry = ToolRegistry::with_builtins();

        let call = |name: &'static str, params: Value| {
            let tool = registry.find(name).unwrap();
            let params = validate_params(&tool.parameters_schema(), &params).unwrap();
            async move { tool.execute(params, ctx).await }
        };

        let id = call("resolve_course_id", json!({ "query": "sistemas operativos" }))
            .await
            .unwrap();
        assert_eq!(id, json!("105000006"));

        let meta = call("fetch_meta", json!({ "course_id": "105000006" })).await.unwrap();
        assert_eq!(meta["language"], "Castellano");

        let faculty = call("fetch_faculty", json!({ "course_id": "Sistemas Operativos" }))
            .await
            .unwrap();
        assert_eq!(faculty.as_array().unwrap().len(), 4);
        assert_eq!(faculty[0]["name"], "Ana García");

        let description = call("fetch_description", json!({ "course_id": "105000006" }))
            .await
            .unwrap();
        assert!(description.as_str().unwrap().contains("gestión de procesos"));

        let syllabus = call("fetch_syllabus", json!({ "course_id": "105000006" })).await.unwrap();
        assert_eq!(syllabus.as_array().unwrap().len(), 3);

        let missing = call("fetch_meta", json!({ "course_id": "Astrofísica" })).await.unwrap();
        assert_eq!(missing, Value::Null);
        let missing = call("fetch_bibliography", json!({ "course_id": "999999999" }))
            .await
            .unwrap();
        assert_eq!(missing, json!([]));
        let missing = call("fetch_competencies", json!({ "course_id": "999999999" }))
            .await
            .unwrap();
        assert_eq!(missing, json!([]));

        let err = call("fetch_school", json!({ "course_id": "  " })).await.unwrap_err();
        assert!(err.to_string().contains("must not be empty"));

        let err = call("search_sections", json!({ "query": "memoria" })).await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
