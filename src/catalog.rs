//! Read side of the relational store.
//!
//! Point lookups by course id back the agent tools; [`snapshot`] reads
//! every table for the knowledge-graph export.

use anyhow::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{BibliographyEntry, Course, Faculty, Program, School, StudyType};

/// Lower-cases and strips diacritics so names compare accent-insensitively.
pub fn fold_text(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// True for 6 to 9 ASCII digits, the shape of a course code.
pub fn looks_like_course_id(s: &str) -> bool {
    (6..=9).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Resolves a course code or a (partial) course name to a course id.
///
/// A query of 6 to 9 digits is returned as is. Otherwise the shortest
/// course name containing the query, ignoring case and accents, wins.
pub async fn resolve_course_id(pool: &SqlitePool, query: &str) -> Result<Option<String>> {
    let q = query.trim();
    if q.is_empty() {
        return Ok(None);
    }
    if looks_like_course_id(q) {
        return Ok(Some(q.to_string()));
    }

    let pattern = format!("%{}%", escape_like(&fold_text(q)));
    let id: Option<String> = sqlx::query_scalar(
        "SELECT id FROM courses WHERE name_folded LIKE ? ESCAPE '\\' ORDER BY length(name) ASC, name ASC LIMIT 1",
    )
    .bind(pattern)
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

/// Basic course metadata returned by `fetch_meta`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseMeta {
    pub id: String,
    pub name: String,
    pub credits: String,
    pub academic_year: String,
    pub semester: String,
    pub language: String,
}

pub async fn course_meta(pool: &SqlitePool, course_id: &str) -> Result<Option<CourseMeta>> {
    let row = sqlx::query(
        "SELECT id, name, credits, academic_year, semester, language FROM courses WHERE id = ?",
    )
    .bind(course_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| CourseMeta {
        id: row.get("id"),
        name: row.get("name"),
        credits: row.get("credits"),
        academic_year: row.get("academic_year"),
        semester: row.get("semester"),
        language: row.get("language"),
    }))
}

pub async fn course_faculty(pool: &SqlitePool, course_id: &str) -> Result<Vec<Faculty>> {
    let rows = sqlx::query(
        r#"
        SELECT f.name, f.email
        FROM faculty f
        JOIN faculty_courses fc ON fc.faculty_id = f.id
        WHERE fc.course_id = ?
        ORDER BY f.name
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(faculty_from_row).collect())
}

/// At most 20 references, ordered by title.
pub async fn course_bibliography(
    pool: &SqlitePool,
    course_id: &str,
) -> Result<Vec<BibliographyEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT b.title, b.authors, b.url
        FROM bibliography b
        JOIN bibliography_courses bc ON bc.bibliography_id = b.id
        WHERE bc.course_id = ?
        ORDER BY b.title
        LIMIT 20
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(bibliography_from_row).collect())
}

pub async fn course_programs(pool: &SqlitePool, course_id: &str) -> Result<Vec<Program>> {
    let rows = sqlx::query(
        r#"
        SELECT p.id, p.name, p.study_type
        FROM programs p
        JOIN program_courses pc ON pc.program_id = p.id
        WHERE pc.course_id = ?
        ORDER BY p.name
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(program_from_row).collect())
}

/// Schools offering any program that includes the course.
pub async fn course_schools(pool: &SqlitePool, course_id: &str) -> Result<Vec<School>> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT s.id, s.name, s.ontology_ref
        FROM schools s
        JOIN program_schools ps ON ps.school_id = s.id
        JOIN program_courses pc ON pc.program_id = ps.program_id
        WHERE pc.course_id = ?
        ORDER BY s.name
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(school_from_row).collect())
}

fn faculty_from_row(row: &SqliteRow) -> Faculty {
    Faculty {
        name: row.get("name"),
        email: row.get::<Option<String>, _>("email").unwrap_or_default(),
    }
}

fn bibliography_from_row(row: &SqliteRow) -> BibliographyEntry {
    BibliographyEntry {
        title: row.get("title"),
        authors: row.get("authors"),
        url: row.get("url"),
    }
}

fn program_from_row(row: &SqliteRow) -> Program {
    let study_type: String = row.get("study_type");
    Program {
        id: row.get("id"),
        name: row.get("name"),
        study_type: StudyType::from_program_name(&study_type),
    }
}

fn school_from_row(row: &SqliteRow) -> School {
    School {
        id: row.get("id"),
        name: row.get("name"),
        ontology_ref: row.get("ontology_ref"),
    }
}

/// Every relational row, for export.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    pub schools: Vec<School>,
    pub programs: Vec<Program>,
    pub courses: Vec<Course>,
    pub faculty: Vec<(i64, Faculty)>,
    pub bibliography: Vec<(i64, BibliographyEntry)>,
    pub program_schools: Vec<(String, String)>,
    pub program_courses: Vec<(String, String)>,
    pub faculty_courses: Vec<(i64, String)>,
    pub bibliography_courses: Vec<(i64, String)>,
}

pub async fn snapshot(pool: &SqlitePool) -> Result<CatalogSnapshot> {
    let schools = sqlx::query("SELECT id, name, ontology_ref FROM schools ORDER BY id")
        .fetch_all(pool)
        .await?
        .iter()
        .map(school_from_row)
        .collect();

    let programs = sqlx::query("SELECT id, name, study_type FROM programs ORDER BY id")
        .fetch_all(pool)
        .await?
        .iter()
        .map(program_from_row)
        .collect();

    let courses = sqlx::query(
        "SELECT id, name, credits, academic_year, semester, language, program_id FROM courses ORDER BY id",
    )
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| Course {
        id: row.get("id"),
        name: row.get("name"),
        credits: row.get("credits"),
        academic_year: row.get("academic_year"),
        semester: row.get("semester"),
        language: row.get("language"),
        program_id: row.get("program_id"),
    })
    .collect();

    let faculty = sqlx::query("SELECT id, name, email FROM faculty ORDER BY id")
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| (row.get("id"), faculty_from_row(row)))
        .collect();

    let bibliography = sqlx::query("SELECT id, title, authors, url FROM bibliography ORDER BY id")
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| (row.get("id"), bibliography_from_row(row)))
        .collect();

    Ok(CatalogSnapshot {
        schools,
        programs,
        courses,
        faculty,
        bibliography,
        program_schools: sqlx::query_as("SELECT program_id, school_id FROM program_schools")
            .fetch_all(pool)
            .await?,
        program_courses: sqlx::query_as("SELECT program_id, course_id FROM program_courses")
            .fetch_all(pool)
            .await?,
        faculty_courses: sqlx::query_as("SELECT faculty_id, course_id FROM faculty_courses")
            .fetch_all(pool)
            .await?,
        bibliography_courses: sqlx::query_as(
            "SELECT bibliography_id, course_id FROM bibliography_courses",
        )
        .fetch_all(pool)
        .await?,
    })
}
