//! Ingestion pipeline orchestration.
//!
//! Coordinates a batch run: scan → extract → enrich → embed → relational
//! write → index. Documents are processed one after another; a guide that
//! cannot be read or has no metadata table is counted as failed and the
//! run moves on to the next file.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::enrich::{Enricher, ScholarClient};
use crate::guide::{GuideExtraction, GuideExtractor};
use crate::index::{self, bulk_index, SectionIndex};
use crate::migrate;
use crate::models::SectionDocument;
use crate::patterns::Patterns;
use crate::store::{RelationalBatch, RelationalStore, WriteReport};

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub skip_enrichment: bool,
    pub dry_run: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub found: usize,
    pub extracted: usize,
    pub failed: Vec<(PathBuf, String)>,
    pub references_resolved: usize,
    pub embedded: usize,
    pub relational: WriteReport,
    pub indexed: usize,
    pub index_errors: usize,
}

/// Every `.pdf` under `dir`, sorted by path.
pub fn scan_guides(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("guide directory does not exist: {}", dir.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_pdf = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// The sinks and services one run writes through.
pub struct Ingestor<'a> {
    pub extractor: &'a GuideExtractor,
    pub enricher: Option<Enricher>,
    pub embedder: Option<&'a dyn EmbeddingProvider>,
    pub store: &'a RelationalStore,
    pub index: &'a dyn SectionIndex,
    pub batch_size: usize,
}

impl Ingestor<'_> {
    pub async fn ingest(&mut self, files: &[PathBuf], dry_run: bool) -> Result<IngestSummary> {
        let mut summary = IngestSummary {
            found: files.len(),
            ..Default::default()
        };
        let mut batch = RelationalBatch::new();
        let mut documents = Vec::new();

        for path in files {
            let guide = match self.extractor.extract_file(path) {
                Ok(guide) => guide,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping guide");
                    summary.failed.push((path.clone(), e.to_string()));
                    continue;
                }
            };
            summary.extracted += 1;
            info!(path = %path.display(), course = %guide.course.id, "extracted guide");

            if dry_run {
                continue;
            }

            let references = match self.enricher.as_mut() {
                Some(enricher) => enricher.enrich(&guide.bibliography).await,
                None => Vec::new(),
            };
            summary.references_resolved += references.len();

            let doc = self.section_document(&guide).await;
            if !doc.description_vector.is_empty()
                || !doc.prior_knowledge_vector.is_empty()
                || !doc.competencies_vector.is_empty()
            {
                summary.embedded += 1;
            }

            batch.add(&guide, references);
            documents.push(doc);
        }

        if dry_run || batch.is_empty() {
            return Ok(summary);
        }

        summary.relational = self.store.write(&batch).await?;

        let reports = bulk_index(self.index, &documents, self.batch_size).await?;
        summary.indexed = reports.iter().map(|r| r.indexed).sum();
        summary.index_errors = reports.iter().map(|r| r.errors).sum();

        Ok(summary)
    }

    /// Builds the search document, embedding the non-empty section texts.
    /// Embedding failures leave the vectors empty.
    async fn section_document(&self, guide: &GuideExtraction) -> SectionDocument {
        let mut doc = guide.section_document();
        let Some(embedder) = self.embedder else {
            return doc;
        };

        let competencies = guide.competency_text().unwrap_or_default();
        let texts = [
            doc.description.clone(),
            doc.prior_knowledge.clone(),
            competencies,
        ];
        let wanted: Vec<usize> = (0..texts.len())
            .filter(|&i| !texts[i].trim().is_empty())
            .collect();
        if wanted.is_empty() {
            return doc;
        }
        let inputs: Vec<String> = wanted.iter().map(|&i| texts[i].clone()).collect();

        match embedder.embed(&inputs).await {
            Ok(vectors) => {
                for (slot, vector) in wanted.into_iter().zip(vectors) {
                    match slot {
                        0 => doc.description_vector = vector,
                        1 => doc.prior_knowledge_vector = vector,
                        _ => doc.competencies_vector = vector,
                    }
                }
            }
            Err(e) => {
                warn!(course = %doc.course_id, error = %e, "embedding failed; indexing without vectors");
            }
        }
        doc
    }
}

pub async fn run_ingest(config: &Config, dir: &Path, options: &IngestOptions) -> Result<()> {
    let mut files = scan_guides(dir)?;
    if let Some(limit) = options.limit {
        files.truncate(limit);
    }

    let extractor = GuideExtractor::new(
        Patterns::compile(&config.patterns)?,
        config.extraction.clone(),
    )?;

    if options.dry_run {
        let pool = db::connect(config).await?;
        let store = RelationalStore::new(pool.clone());
        let index = index::create_index(&config.index, pool.clone())?;
        let mut ingestor = Ingestor {
            extractor: &extractor,
            enricher: None,
            embedder: None,
            store: &store,
            index: index.as_ref(),
            batch_size: config.index.batch_size,
        };
        let summary = ingestor.ingest(&files, true).await?;
        println!("ingest {} (dry-run)", dir.display());
        println!("  guides found: {}", summary.found);
        println!("  extracted: {}", summary.extracted);
        println!("  failed: {}", summary.failed.len());
        pool.close().await;
        return Ok(());
    }

    let pool = db::connect(config).await?;
    migrate::migrate(&pool).await?;
    let store = RelationalStore::new(pool.clone());
    let index = index::create_index(&config.index, pool.clone())?;
    index.ensure_index().await?;

    let provider = embedding::create_provider(&config.embedding)?;
    let embedder = config
        .embedding
        .is_enabled()
        .then_some(provider.as_ref());

    let enricher = if config.enrichment.enabled && !options.skip_enrichment {
        Some(Enricher::new(
            Box::new(ScholarClient::new(&config.enrichment)?),
            &config.enrichment,
        ))
    } else {
        None
    };

    let mut ingestor = Ingestor {
        extractor: &extractor,
        enricher,
        embedder,
        store: &store,
        index: index.as_ref(),
        batch_size: config.index.batch_size,
    };
    let summary = ingestor.ingest(&files, false).await?;
    let enrichment_tripped = ingestor
        .enricher
        .as_ref()
        .is_some_and(|e| e.is_tripped());

    println!("ingest {}", dir.display());
    println!("  guides found: {}", summary.found);
    println!("  extracted: {}", summary.extracted);
    println!("  failed: {}", summary.failed.len());
    for (path, error) in &summary.failed {
        println!("    {}: {}", path.display(), error);
    }
    println!("  courses written: {}", summary.relational.courses);
    println!("  programs written: {}", summary.relational.programs);
    println!("  schools written: {}", summary.relational.schools);
    println!("  faculty written: {}", summary.relational.faculty);
    println!("  bibliography written: {}", summary.relational.bibliography);
    println!("  links written: {}", summary.relational.links);
    if config.enrichment.enabled && !options.skip_enrichment {
        println!("  references resolved: {}", summary.references_resolved);
        if enrichment_tripped {
            println!("  enrichment: stopped after a failed lookup");
        }
    }
    if config.embedding.is_enabled() {
        println!("  documents embedded: {}", summary.embedded);
    }
    println!("  documents indexed: {} ({})", summary.indexed, index.name());
    println!("  index errors: {}", summary.index_errors);
    println!("ok");

    pool.close().await;
    Ok(())
}
