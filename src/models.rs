//! Entity records produced by extraction and shared by every sink.
//!
//! The relational store, the search index and the graph export all read
//! these types; table and field naming for each sink is handled where the
//! sink is written.

use serde::{Deserialize, Serialize};

pub use crate::outline::TopicNode;

/// A course, keyed by the numeric code printed in the guide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub credits: String,
    pub academic_year: String,
    pub semester: String,
    pub language: String,
    pub program_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudyType {
    #[serde(rename = "Grado")]
    Grado,
    #[serde(rename = "Máster")]
    Master,
}

impl StudyType {
    /// Programs whose name mentions "Grado" are bachelor degrees; all others
    /// are master degrees.
    pub fn from_program_name(name: &str) -> Self {
        if name.contains("Grado") {
            StudyType::Grado
        } else {
            StudyType::Master
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StudyType::Grado => "Grado",
            StudyType::Master => "Máster",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub name: String,
    pub study_type: StudyType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct School {
    pub id: String,
    pub name: String,
    pub ontology_ref: Option<String>,
}

/// A teacher listed in a guide. The email is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faculty {
    pub name: String,
    pub email: String,
}

/// A bibliography row as printed in the guide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibliographyRow {
    pub name: String,
    pub kind: String,
    pub notes: String,
}

/// A bibliography reference resolved through enrichment. The title is the
/// natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibliographyEntry {
    pub title: String,
    pub authors: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competency {
    pub code: String,
    pub text: String,
}

/// The searchable side of a course: section texts and their embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionDocument {
    pub course_id: String,
    pub course_name: String,
    pub description: String,
    #[serde(default)]
    pub description_vector: Vec<f32>,
    pub prior_knowledge: String,
    #[serde(default)]
    pub prior_knowledge_vector: Vec<f32>,
    #[serde(default)]
    pub competencies: Vec<Competency>,
    #[serde(default)]
    pub competencies_vector: Vec<f32>,
    #[serde(default)]
    pub syllabus: Vec<TopicNode>,
}

/// Searchable text fields of a [`SectionDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionField {
    Description,
    PriorKnowledge,
    Competencies,
    Syllabus,
}

impl SectionField {
    pub const ALL: [SectionField; 4] = [
        SectionField::Description,
        SectionField::PriorKnowledge,
        SectionField::Competencies,
        SectionField::Syllabus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionField::Description => "description",
            SectionField::PriorKnowledge => "prior_knowledge",
            SectionField::Competencies => "competencies",
            SectionField::Syllabus => "syllabus",
        }
    }

    /// Name of the vector field used for similarity search, if the field
    /// carries one.
    pub fn vector_field(&self) -> Option<&'static str> {
        match self {
            SectionField::Description => Some("description_vector"),
            SectionField::PriorKnowledge => Some("prior_knowledge_vector"),
            SectionField::Competencies => Some("competencies_vector"),
            SectionField::Syllabus => None,
        }
    }

    /// Extracts the field as a JSON value, or `None` when it holds no data.
    pub fn value_of(&self, doc: &SectionDocument) -> Option<serde_json::Value> {
        match self {
            SectionField::Description => non_empty_text(&doc.description),
            SectionField::PriorKnowledge => non_empty_text(&doc.prior_knowledge),
            SectionField::Competencies if doc.competencies.is_empty() => None,
            SectionField::Competencies => serde_json::to_value(&doc.competencies).ok(),
            SectionField::Syllabus if doc.syllabus.is_empty() => None,
            SectionField::Syllabus => serde_json::to_value(&doc.syllabus).ok(),
        }
    }

    /// Vector stored for the field, empty when none.
    pub fn vector_of<'a>(&self, doc: &'a SectionDocument) -> &'a [f32] {
        match self {
            SectionField::Description => &doc.description_vector,
            SectionField::PriorKnowledge => &doc.prior_knowledge_vector,
            SectionField::Competencies => &doc.competencies_vector,
            SectionField::Syllabus => &[],
        }
    }
}

fn non_empty_text(s: &str) -> Option<serde_json::Value> {
    if s.trim().is_empty() {
        None
    } else {
        Some(serde_json::Value::String(s.to_string()))
    }
}

impl std::str::FromStr for SectionField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "description" => Ok(SectionField::Description),
            "prior_knowledge" => Ok(SectionField::PriorKnowledge),
            "competencies" => Ok(SectionField::Competencies),
            "syllabus" => Ok(SectionField::Syllabus),
            other => anyhow::bail!(
                "invalid section field '{}': expected description, prior_knowledge, competencies or syllabus",
                other
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_study_type_from_program_name() {
        assert_eq!(
            StudyType::from_program_name("Grado en Ingeniería del Software"),
            StudyType::Grado
        );
        assert_eq!(
            StudyType::from_program_name("Máster Universitario en Ingeniería Web"),
            StudyType::Master
        );
        assert_eq!(serde_json::to_string(&StudyType::Master).unwrap(), "\"Máster\"");
    }

    #[test]
    fn test_section_field_parse_and_value() {
        let field: SectionField = "Prior_Knowledge".parse().unwrap();
        assert_eq!(field, SectionField::PriorKnowledge);
        assert!("temario".parse::<SectionField>().is_err());

        let doc = SectionDocument {
            course_id: "105000006".into(),
            course_name: "Sistemas Operativos".into(),
            description: "Procesos y memoria".into(),
            description_vector: vec![1.0, 0.0],
            prior_knowledge: "  ".into(),
            prior_knowledge_vector: vec![],
            competencies: vec![],
            competencies_vector: vec![],
            syllabus: vec![],
        };
        assert_eq!(
            SectionField::Description.value_of(&doc),
            Some(serde_json::json!("Procesos y memoria"))
        );
        assert_eq!(SectionField::PriorKnowledge.value_of(&doc), None);
        assert_eq!(SectionField::Competencies.value_of(&doc), None);
        assert_eq!(SectionField::Description.vector_of(&doc), &[1.0, 0.0]);
    }
}
