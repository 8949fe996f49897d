//! One learning guide from PDF to records.
//!
//! [`GuideExtractor`] runs the extraction chain over a normalized document:
//! the metadata table below the anchor heading, the named text sections,
//! the syllabus outline and the stitched faculty and bibliography tables.
//! The metadata table is mandatory; every other piece degrades to empty
//! values when the template drifts.

use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::{Config, ExtractionConfig};
use crate::error::ExtractError;
use crate::layout::{load_document, NormalizedDocument};
use crate::models::{
    BibliographyRow, Competency, Course, Faculty, Program, School, SectionDocument, StudyType,
    TopicNode,
};
use crate::outline::{extract_syllabus_lines, structure_outline};
use crate::patterns::{MetadataKeys, Patterns};
use crate::records::{bibliography_rows, faculty_rows, parse_competencies};
use crate::section::{drop_lines_containing, SectionLocator, SectionMatch, SectionOutcome};
use crate::stitch::{stitch, tables_by_page};
use crate::table::{recover_table, KeyValueRecord, TableRecord};

/// How each text section was located; reported by `guides inspect`.
#[derive(Debug, Clone, Serialize)]
pub struct SectionOutcomes {
    pub description: SectionOutcome,
    pub prior_knowledge: SectionOutcome,
    pub competencies: SectionOutcome,
    pub syllabus_found: bool,
}

/// Everything extracted from one guide.
#[derive(Debug, Clone, Serialize)]
pub struct GuideExtraction {
    pub course: Course,
    pub program: Option<Program>,
    pub school: Option<School>,
    pub faculty: Vec<Faculty>,
    pub bibliography: Vec<BibliographyRow>,
    pub description: String,
    pub prior_knowledge: String,
    pub competencies: Vec<Competency>,
    pub syllabus: Vec<TopicNode>,
    pub outcomes: SectionOutcomes,
}

impl GuideExtraction {
    /// The search-side document, without vectors.
    pub fn section_document(&self) -> SectionDocument {
        SectionDocument {
            course_id: self.course.id.clone(),
            course_name: self.course.name.clone(),
            description: self.description.clone(),
            description_vector: Vec::new(),
            prior_knowledge: self.prior_knowledge.clone(),
            prior_knowledge_vector: Vec::new(),
            competencies: self.competencies.clone(),
            competencies_vector: Vec::new(),
            syllabus: self.syllabus.clone(),
        }
    }

    /// Competency texts joined by a space, or `None` when there are none.
    pub fn competency_text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .competencies
            .iter()
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join(" "))
        }
    }
}

pub struct GuideExtractor {
    patterns: Patterns,
    extraction: ExtractionConfig,
    description: SectionLocator,
    prior_knowledge: SectionLocator,
    competencies: SectionLocator,
}

impl GuideExtractor {
    pub fn new(patterns: Patterns, extraction: ExtractionConfig) -> Result<Self, ExtractError> {
        let sections = &patterns.config.sections;
        Ok(Self {
            description: SectionLocator::new(&sections.description)?,
            prior_knowledge: SectionLocator::new(&sections.prior_knowledge)?,
            competencies: SectionLocator::new(&sections.competencies)?,
            patterns,
            extraction,
        })
    }

    pub fn extract_file(&self, path: &Path) -> Result<GuideExtraction, ExtractError> {
        let doc = load_document(path, &self.extraction)?;
        debug!(path = %path.display(), pages = doc.page_count(), "loaded guide");
        self.extract(&doc)
    }

    pub fn extract(&self, doc: &NormalizedDocument) -> Result<GuideExtraction, ExtractError> {
        let config = &self.patterns.config;

        let metadata = metadata_record(recover_table(
            doc,
            &self.patterns.metadata_anchor,
            &self.patterns.metadata_tokens,
        )?);
        let (course, program, school) =
            map_metadata(&metadata, &config.metadata_keys, config.school_ontology_ref.as_deref())?;

        let body = doc.text_from(self.extraction.skip_pages);

        let description = self.description.locate(&body);
        let prior_knowledge = self.prior_knowledge.locate(&body);
        let competencies = self.competencies.locate(&body);

        let mut prior_text = located_text(&course.id, "prior_knowledge", &prior_knowledge);
        if let Some(needle) = &config.sections.prior_knowledge.drop_lines_containing {
            prior_text = drop_lines_containing(&prior_text, needle);
        }
        let competency_text = located_text(&course.id, "competencies", &competencies);

        let syllabus_lines = extract_syllabus_lines(&body, &self.patterns.syllabus_heading);
        if syllabus_lines.is_none() {
            warn!(course = %course.id, "syllabus heading not found");
        }
        let syllabus = syllabus_lines
            .as_deref()
            .map(|lines| structure_outline(lines))
            .unwrap_or_default();

        let tables = tables_by_page(doc);
        let faculty = stitch(&tables, &config.faculty_headers)
            .map(|t| faculty_rows(&t, &config.columns))
            .unwrap_or_default();
        let bibliography = stitch(&tables, &config.bibliography_headers)
            .map(|t| bibliography_rows(&t, &config.columns, &config.bibliography_type))
            .unwrap_or_default();

        debug!(
            course = %course.id,
            faculty = faculty.len(),
            bibliography = bibliography.len(),
            topics = syllabus.len(),
            "extracted guide"
        );

        Ok(GuideExtraction {
            outcomes: SectionOutcomes {
                description: description.outcome,
                prior_knowledge: prior_knowledge.outcome,
                competencies: competencies.outcome,
                syllabus_found: syllabus_lines.is_some(),
            },
            description: located_text(&course.id, "description", &description),
            prior_knowledge: prior_text,
            competencies: parse_competencies(
                &competency_text,
                &self.patterns.competency_code,
                &self.patterns.competency_split,
            ),
            course,
            program,
            school,
            faculty,
            bibliography,
            syllabus,
        })
    }
}

/// Text of a located section; a whole-document fallback yields nothing.
fn located_text(course_id: &str, section: &str, m: &SectionMatch) -> String {
    if m.is_located() {
        m.text.clone()
    } else {
        warn!(course = %course_id, section, "section headings not found");
        String::new()
    }
}

/// Reads any table shape as key/value pairs: the first two cells of each row.
fn metadata_record(record: TableRecord) -> KeyValueRecord {
    match record {
        TableRecord::KeyValue(kv) => kv,
        TableRecord::Grid { headers, rows } => {
            let mut kv = KeyValueRecord::default();
            for row in headers.into_iter().chain(rows) {
                if let [key, value, ..] = row.as_slice() {
                    if !key.is_empty() {
                        kv.insert(key.clone(), value.clone());
                    }
                }
            }
            kv
        }
    }
}

/// Splits `"<code> - <name>"`. A value without the separator is used as
/// both code and name.
fn split_code_name(value: &str) -> Option<(String, String)> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Some(match value.split_once(" - ") {
        Some((code, name)) => (code.trim().to_string(), name.trim().to_string()),
        None => (value.to_string(), value.to_string()),
    })
}

fn map_metadata(
    kv: &KeyValueRecord,
    keys: &MetadataKeys,
    ontology_ref: Option<&str>,
) -> Result<(Course, Option<Program>, Option<School>), ExtractError> {
    let field = |key: &str| kv.get(key).unwrap_or("").trim().to_string();

    let (id, name) = kv
        .get(&keys.course)
        .and_then(|v| v.trim().split_once(" - "))
        .map(|(id, name)| (id.trim().to_string(), name.trim().to_string()))
        .filter(|(id, _)| !id.is_empty())
        .ok_or_else(|| ExtractError::MissingField(keys.course.clone()))?;

    let program = split_code_name(&field(&keys.program)).map(|(id, name)| Program {
        study_type: StudyType::from_program_name(&name),
        id,
        name,
    });
    let school = split_code_name(&field(&keys.school)).map(|(id, name)| School {
        id,
        name,
        ontology_ref: ontology_ref.map(String::from),
    });

    let course = Course {
        id,
        name,
        credits: field(&keys.credits)
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string(),
        academic_year: field(&keys.academic_year),
        semester: field(&keys.semester),
        language: field(&keys.language),
        program_id: program.as_ref().map(|p| p.id.clone()),
    };

    Ok((course, program, school))
}

/// CLI entry point for `guides inspect`: extracts one guide and prints the
/// result as JSON without touching any store.
pub fn run_inspect(config: &Config, path: &Path) -> anyhow::Result<()> {
    let extractor = GuideExtractor::new(
        Patterns::compile(&config.patterns)?,
        config.extraction.clone(),
    )?;
    let guide = extractor
        .extract_file(path)
        .with_context(|| format!("Failed to extract {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&guide)?);
    Ok(())
}
