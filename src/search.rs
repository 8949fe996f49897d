use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, embed_one};
use crate::index::{self, SectionHit};
use crate::models::SectionField;

/// Longest excerpt printed per hit, in characters.
const EXCERPT_CHARS: usize = 240;

pub async fn run_search(config: &Config, query: &str, field: SectionField, k: usize) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }
    if field.vector_field().is_none() {
        bail!(
            "Field '{}' is not searchable. Use description, prior_knowledge or competencies.",
            field.as_str()
        );
    }

    let pool = db::connect(config).await?;
    let section_index = index::create_index(&config.index, pool.clone())?;
    let provider = embedding::create_provider(&config.embedding)?;
    let vector = embed_one(provider.as_ref(), query).await?;

    let hits = section_index
        .knn(field, &vector, k, config.index.num_candidates)
        .await?;

    if hits.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {} {}", i + 1, hit.score, hit.course_id, hit.course_name);
        println!("    {}: \"{}\"", field.as_str(), excerpt(hit));
        println!();
    }

    pool.close().await;
    Ok(())
}

fn excerpt(hit: &SectionHit) -> String {
    let text = match &hit.value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|c| c.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    };
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > EXCERPT_CHARS {
        let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}
