//! Relational schema: five entity tables and four link tables.
//!
//! Every statement is `CREATE ... IF NOT EXISTS`, so running the
//! migrations against an existing database is a no-op.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS programs (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        study_type TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS schools (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        ontology_ref TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS courses (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        name_folded TEXT NOT NULL,
        credits TEXT NOT NULL DEFAULT '',
        academic_year TEXT NOT NULL DEFAULT '',
        semester TEXT NOT NULL DEFAULT '',
        language TEXT NOT NULL DEFAULT '',
        program_id TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS faculty (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bibliography (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL UNIQUE,
        authors TEXT NOT NULL DEFAULT '',
        url TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS program_schools (
        program_id TEXT NOT NULL,
        school_id TEXT NOT NULL,
        PRIMARY KEY (program_id, school_id),
        FOREIGN KEY (program_id) REFERENCES programs(id),
        FOREIGN KEY (school_id) REFERENCES schools(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS program_courses (
        program_id TEXT NOT NULL,
        course_id TEXT NOT NULL,
        PRIMARY KEY (program_id, course_id),
        FOREIGN KEY (program_id) REFERENCES programs(id),
        FOREIGN KEY (course_id) REFERENCES courses(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS faculty_courses (
        faculty_id INTEGER NOT NULL,
        course_id TEXT NOT NULL,
        PRIMARY KEY (faculty_id, course_id),
        FOREIGN KEY (faculty_id) REFERENCES faculty(id),
        FOREIGN KEY (course_id) REFERENCES courses(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bibliography_courses (
        bibliography_id INTEGER NOT NULL,
        course_id TEXT NOT NULL,
        PRIMARY KEY (bibliography_id, course_id),
        FOREIGN KEY (bibliography_id) REFERENCES bibliography(id),
        FOREIGN KEY (course_id) REFERENCES courses(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_courses_name_folded ON courses(name_folded)",
    "CREATE INDEX IF NOT EXISTS idx_faculty_name ON faculty(name)",
    "CREATE INDEX IF NOT EXISTS idx_program_courses_course ON program_courses(course_id)",
    "CREATE INDEX IF NOT EXISTS idx_faculty_courses_course ON faculty_courses(course_id)",
    "CREATE INDEX IF NOT EXISTS idx_bibliography_courses_course ON bibliography_courses(course_id)",
];

/// Creates the relational schema on an open pool.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}
