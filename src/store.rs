//! Write side of the relational store.
//!
//! Extractions are collected into a [`RelationalBatch`], which removes
//! duplicates within the run, and [`RelationalStore::write`] commits the
//! whole batch in one transaction. Rows that already exist are left
//! untouched (`INSERT OR IGNORE`), so re-ingesting a guide is harmless.

use anyhow::{Context, Result};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;

use crate::catalog::fold_text;
use crate::guide::GuideExtraction;
use crate::models::{BibliographyEntry, Course, Faculty, Program, School};

/// Rows gathered from one ingest run, deduplicated by natural key.
#[derive(Debug, Default)]
pub struct RelationalBatch {
    pub courses: Vec<Course>,
    pub programs: Vec<Program>,
    pub schools: Vec<School>,
    pub faculty: Vec<Faculty>,
    pub bibliography: Vec<BibliographyEntry>,
    pub program_schools: Vec<(String, String)>,
    pub program_courses: Vec<(String, String)>,
    /// `(faculty, course_id)`; the faculty row id is resolved at write time.
    pub faculty_courses: Vec<(Faculty, String)>,
    /// `(title, course_id)`
    pub bibliography_courses: Vec<(String, String)>,
    seen: Seen,
}

#[derive(Debug, Default)]
struct Seen {
    courses: HashSet<String>,
    programs: HashSet<String>,
    schools: HashSet<String>,
    faculty: HashSet<String>,
    bibliography: HashSet<String>,
    links: HashSet<(&'static str, String, String)>,
}

/// Faculty without an email fall back to their name as the key.
fn faculty_key(f: &Faculty) -> String {
    if f.email.is_empty() {
        format!("name:{}", f.name)
    } else {
        format!("email:{}", f.email.to_lowercase())
    }
}

impl RelationalBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    /// Adds one guide and the bibliography entries resolved for it.
    pub fn add(&mut self, guide: &GuideExtraction, references: Vec<BibliographyEntry>) {
        let course_id = guide.course.id.clone();

        if self.seen.courses.insert(course_id.clone()) {
            self.courses.push(guide.course.clone());
        }

        if let Some(program) = &guide.program {
            if self.seen.programs.insert(program.id.clone()) {
                self.programs.push(program.clone());
            }
            self.link("program_courses", &program.id, &course_id);
        }

        if let Some(school) = &guide.school {
            if self.seen.schools.insert(school.id.clone()) {
                self.schools.push(school.clone());
            }
            if let Some(program) = &guide.program {
                self.link("program_schools", &program.id, &school.id);
            }
        }

        for member in &guide.faculty {
            let key = faculty_key(member);
            if self.seen.faculty.insert(key.clone()) {
                self.faculty.push(member.clone());
            }
            if self
                .seen
                .links
                .insert(("faculty_courses", key, course_id.clone()))
            {
                self.faculty_courses.push((member.clone(), course_id.clone()));
            }
        }

        for entry in references {
            if entry.title.is_empty() {
                continue;
            }
            if self
                .seen
                .links
                .insert(("bibliography_courses", entry.title.clone(), course_id.clone()))
            {
                self.bibliography_courses
                    .push((entry.title.clone(), course_id.clone()));
            }
            if self.seen.bibliography.insert(entry.title.clone()) {
                self.bibliography.push(entry);
            }
        }
    }

    fn link(&mut self, table: &'static str, left: &str, right: &str) {
        if !self
            .seen
            .links
            .insert((table, left.to_string(), right.to_string()))
        {
            return;
        }
        let pair = (left.to_string(), right.to_string());
        match table {
            "program_courses" => self.program_courses.push(pair),
            "program_schools" => self.program_schools.push(pair),
            _ => {}
        }
    }
}

/// Rows actually inserted by a write; existing rows are not counted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub courses: u64,
    pub programs: u64,
    pub schools: u64,
    pub faculty: u64,
    pub bibliography: u64,
    pub links: u64,
}

pub struct RelationalStore {
    pool: SqlitePool,
}

impl RelationalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn write(&self, batch: &RelationalBatch) -> Result<WriteReport> {
        let mut tx = self.pool.begin().await?;
        let mut report = WriteReport::default();

        for program in &batch.programs {
            report.programs += sqlx::query(
                "INSERT OR IGNORE INTO programs (id, name, study_type) VALUES (?, ?, ?)",
            )
            .bind(&program.id)
            .bind(&program.name)
            .bind(program.study_type.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        for school in &batch.schools {
            report.schools += sqlx::query(
                "INSERT OR IGNORE INTO schools (id, name, ontology_ref) VALUES (?, ?, ?)",
            )
            .bind(&school.id)
            .bind(&school.name)
            .bind(&school.ontology_ref)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        for course in &batch.courses {
            report.courses += sqlx::query(
                r#"
                INSERT OR IGNORE INTO courses
                    (id, name, name_folded, credits, academic_year, semester, language, program_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&course.id)
            .bind(&course.name)
            .bind(fold_text(&course.name))
            .bind(&course.credits)
            .bind(&course.academic_year)
            .bind(&course.semester)
            .bind(&course.language)
            .bind(&course.program_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("inserting course {}", course.id))?
            .rows_affected();
        }

        for member in &batch.faculty {
            report.faculty += insert_faculty(&mut tx, member).await?;
        }

        for entry in &batch.bibliography {
            report.bibliography += sqlx::query(
                "INSERT OR IGNORE INTO bibliography (title, authors, url) VALUES (?, ?, ?)",
            )
            .bind(&entry.title)
            .bind(&entry.authors)
            .bind(&entry.url)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        for (program_id, school_id) in &batch.program_schools {
            report.links += sqlx::query(
                "INSERT OR IGNORE INTO program_schools (program_id, school_id) VALUES (?, ?)",
            )
            .bind(program_id)
            .bind(school_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        for (program_id, course_id) in &batch.program_courses {
            report.links += sqlx::query(
                "INSERT OR IGNORE INTO program_courses (program_id, course_id) VALUES (?, ?)",
            )
            .bind(program_id)
            .bind(course_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        for (member, course_id) in &batch.faculty_courses {
            let result = if member.email.is_empty() {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO faculty_courses (faculty_id, course_id)
                    SELECT id, ? FROM faculty WHERE email IS NULL AND name = ?
                    "#,
                )
                .bind(course_id)
                .bind(&member.name)
                .execute(&mut *tx)
                .await?
            } else {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO faculty_courses (faculty_id, course_id)
                    SELECT id, ? FROM faculty WHERE email = ?
                    "#,
                )
                .bind(course_id)
                .bind(member.email.to_lowercase())
                .execute(&mut *tx)
                .await?
            };
            report.links += result.rows_affected();
        }

        for (title, course_id) in &batch.bibliography_courses {
            report.links += sqlx::query(
                r#"
                INSERT OR IGNORE INTO bibliography_courses (bibliography_id, course_id)
                SELECT id, ? FROM bibliography WHERE title = ?
                "#,
            )
            .bind(course_id)
            .bind(title)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        Ok(report)
    }
}

async fn insert_faculty(tx: &mut Transaction<'_, Sqlite>, member: &Faculty) -> Result<u64> {
    let result = if member.email.is_empty() {
        // NULL emails never collide on the unique index, so dedup by name.
        sqlx::query(
            r#"
            INSERT INTO faculty (name, email)
            SELECT ?, NULL
            WHERE NOT EXISTS (SELECT 1 FROM faculty WHERE email IS NULL AND name = ?)
            "#,
        )
        .bind(&member.name)
        .bind(&member.name)
        .execute(&mut **tx)
        .await?
    } else {
        sqlx::query("INSERT OR IGNORE INTO faculty (name, email) VALUES (?, ?)")
            .bind(&member.name)
            .bind(member.email.to_lowercase())
            .execute(&mut **tx)
            .await?
    };
    Ok(result.rows_affected())
}
