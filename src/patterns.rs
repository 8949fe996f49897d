//! Named anchor and column patterns for the learning-guide template.
//!
//! Every heading the extractor searches for, every table header set and
//! every metadata key lives here so that a template revision is a config
//! change. [`PatternConfig`] is the `[patterns]` TOML section; [`Patterns`]
//! holds the compiled regexes used at extraction time.

use regex::Regex;
use serde::Deserialize;

use crate::error::ExtractError;

/// One named section: an optional title heading plus optional start/end
/// sub-headings, all given as literal heading text.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct SectionPattern {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    /// Lines containing this text are removed from the sliced section.
    #[serde(default)]
    pub drop_lines_containing: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SectionPatterns {
    #[serde(default = "default_description")]
    pub description: SectionPattern,
    #[serde(default = "default_competencies")]
    pub competencies: SectionPattern,
    #[serde(default = "default_prior_knowledge")]
    pub prior_knowledge: SectionPattern,
}

impl Default for SectionPatterns {
    fn default() -> Self {
        Self {
            description: default_description(),
            competencies: default_competencies(),
            prior_knowledge: default_prior_knowledge(),
        }
    }
}

fn section(title: &str, start: &str, end: &str) -> SectionPattern {
    SectionPattern {
        title: Some(title.to_string()),
        start: Some(start.to_string()),
        end: Some(end.to_string()),
        drop_lines_containing: None,
    }
}

fn default_description() -> SectionPattern {
    section(
        "Descripción de la asignatura y temario",
        "Descripción de la asignatura",
        "Temario de la asignatura",
    )
}

fn default_competencies() -> SectionPattern {
    section(
        "Competencias y resultados de aprendizaje",
        "Competencias",
        "Resultados del aprendizaje",
    )
}

fn default_prior_knowledge() -> SectionPattern {
    SectionPattern {
        drop_lines_containing: Some("Competencias y resultados de aprendizaje".to_string()),
        ..section(
            "Conocimientos previos recomendados",
            "Asignaturas previas que se recomienda haber cursado",
            "Competencias",
        )
    }
}

/// Column names as printed in the table header rows.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ColumnNames {
    #[serde(default = "default_col_name")]
    pub name: String,
    #[serde(default = "default_col_kind")]
    pub kind: String,
    #[serde(default = "default_col_notes")]
    pub notes: String,
    #[serde(default = "default_col_email")]
    pub email: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            name: default_col_name(),
            kind: default_col_kind(),
            notes: default_col_notes(),
            email: default_col_email(),
        }
    }
}

fn default_col_name() -> String {
    "Nombre".to_string()
}
fn default_col_kind() -> String {
    "Tipo".to_string()
}
fn default_col_notes() -> String {
    "Observaciones".to_string()
}
fn default_col_email() -> String {
    "Correo electrónico".to_string()
}

/// Keys of the course metadata key/value table.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MetadataKeys {
    #[serde(default = "default_key_course")]
    pub course: String,
    #[serde(default = "default_key_credits")]
    pub credits: String,
    #[serde(default = "default_key_year")]
    pub academic_year: String,
    #[serde(default = "default_key_semester")]
    pub semester: String,
    #[serde(default = "default_key_language")]
    pub language: String,
    #[serde(default = "default_key_program")]
    pub program: String,
    #[serde(default = "default_key_school")]
    pub school: String,
}

impl Default for MetadataKeys {
    fn default() -> Self {
        Self {
            course: default_key_course(),
            credits: default_key_credits(),
            academic_year: default_key_year(),
            semester: default_key_semester(),
            language: default_key_language(),
            program: default_key_program(),
            school: default_key_school(),
        }
    }
}

fn default_key_course() -> String {
    "Nombre de la asignatura".to_string()
}
fn default_key_credits() -> String {
    "No de créditos".to_string()
}
fn default_key_year() -> String {
    "Curso".to_string()
}
fn default_key_semester() -> String {
    "Semestre".to_string()
}
fn default_key_language() -> String {
    "Idioma de impartición".to_string()
}
fn default_key_program() -> String {
    "Titulación".to_string()
}
fn default_key_school() -> String {
    "Centro responsable de la titulación".to_string()
}

/// The `[patterns]` config section.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PatternConfig {
    #[serde(default = "default_metadata_anchor")]
    pub metadata_anchor: String,
    #[serde(default = "default_metadata_tokens")]
    pub metadata_tokens: Vec<String>,
    #[serde(default = "default_syllabus_heading")]
    pub syllabus_heading: String,
    #[serde(default)]
    pub sections: SectionPatterns,
    #[serde(default = "default_bibliography_headers")]
    pub bibliography_headers: Vec<String>,
    #[serde(default = "default_faculty_headers")]
    pub faculty_headers: Vec<String>,
    #[serde(default)]
    pub columns: ColumnNames,
    #[serde(default = "default_bibliography_type")]
    pub bibliography_type: String,
    #[serde(default)]
    pub metadata_keys: MetadataKeys,
    #[serde(default = "default_competency_code")]
    pub competency_code: String,
    #[serde(default = "default_competency_split")]
    pub competency_split: String,
    #[serde(default = "default_school_ontology_ref")]
    pub school_ontology_ref: Option<String>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            metadata_anchor: default_metadata_anchor(),
            metadata_tokens: default_metadata_tokens(),
            syllabus_heading: default_syllabus_heading(),
            sections: SectionPatterns::default(),
            bibliography_headers: default_bibliography_headers(),
            faculty_headers: default_faculty_headers(),
            columns: ColumnNames::default(),
            bibliography_type: default_bibliography_type(),
            metadata_keys: MetadataKeys::default(),
            competency_code: default_competency_code(),
            competency_split: default_competency_split(),
            school_ontology_ref: default_school_ontology_ref(),
        }
    }
}

fn default_metadata_anchor() -> String {
    r"1\.1\.\s*Datos\s+de\s+la\s+asignatura".to_string()
}
fn default_metadata_tokens() -> Vec<String> {
    ["1.1.", "Datos", "de", "la", "asignatura"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_syllabus_heading() -> String {
    r"\b\d+\.\d+\.\s*Temario\s+de\s+la\s+asignatura\b".to_string()
}
fn default_bibliography_headers() -> Vec<String> {
    vec!["nombre".into(), "tipo".into(), "observaciones".into()]
}
fn default_faculty_headers() -> Vec<String> {
    vec!["nombre".into(), "correo electrónico".into()]
}
fn default_bibliography_type() -> String {
    "Bibliografía".to_string()
}
fn default_competency_code() -> String {
    r"\n?([A-Z]{2}\d+)\s*-\s*".to_string()
}
fn default_competency_split() -> String {
    r"\n?[A-Z]{2}\d+\s*-\s*".to_string()
}
fn default_school_ontology_ref() -> Option<String> {
    Some(
        "http://es.dbpedia.org/resource/Escuela_Técnica_Superior_de_Ingeniería_de_Sistemas_Informáticos_(Universidad_Politécnica_de_Madrid)"
            .to_string(),
    )
}

/// Compiled form of [`PatternConfig`].
#[derive(Debug, Clone)]
pub struct Patterns {
    pub metadata_anchor: Regex,
    pub metadata_tokens: Vec<String>,
    pub syllabus_heading: Regex,
    pub competency_code: Regex,
    pub competency_split: Regex,
    pub config: PatternConfig,
}

impl Patterns {
    pub fn compile(config: &PatternConfig) -> Result<Self, ExtractError> {
        Ok(Self {
            metadata_anchor: compile_named("metadata_anchor", &config.metadata_anchor)?,
            metadata_tokens: config.metadata_tokens.clone(),
            syllabus_heading: compile_named("syllabus_heading", &config.syllabus_heading)?,
            competency_code: compile_named("competency_code", &config.competency_code)?,
            competency_split: compile_named("competency_split", &config.competency_split)?,
            config: config.clone(),
        })
    }
}

fn compile_named(name: &str, pattern: &str) -> Result<Regex, ExtractError> {
    Regex::new(pattern).map_err(|source| ExtractError::Pattern {
        name: name.to_string(),
        source,
    })
}
