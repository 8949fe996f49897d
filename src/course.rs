//! `guides course`: everything known about one course.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::catalog::{self, CourseMeta};
use crate::config::Config;
use crate::db;
use crate::index::{self, SectionIndex};
use crate::models::{BibliographyEntry, Faculty, Program, School, SectionField};

/// Relational facts plus the indexed sections of a course.
#[derive(Debug, Serialize)]
pub struct CourseReport {
    pub meta: CourseMeta,
    pub programs: Vec<Program>,
    pub schools: Vec<School>,
    pub faculty: Vec<Faculty>,
    pub bibliography: Vec<BibliographyEntry>,
    pub description: Option<String>,
    pub prior_knowledge: Option<String>,
    pub competencies: Option<Value>,
    pub syllabus: Option<Value>,
}

async fn section(
    section_index: &dyn SectionIndex,
    course_id: &str,
    field: SectionField,
) -> Result<Option<Value>> {
    let hits = section_index.get_field(course_id, field).await?;
    Ok(hits.into_iter().find_map(|h| h.value))
}

fn as_text(value: Option<Value>) -> Option<String> {
    value.and_then(|v| v.as_str().map(String::from))
}

/// Resolves `query` like `resolve_course_id` and gathers the course.
/// `None` when nothing matches.
pub async fn course_report(
    pool: &SqlitePool,
    section_index: &dyn SectionIndex,
    query: &str,
) -> Result<Option<CourseReport>> {
    let Some(id) = catalog::resolve_course_id(pool, query).await? else {
        return Ok(None);
    };
    let Some(meta) = catalog::course_meta(pool, &id).await? else {
        return Ok(None);
    };

    Ok(Some(CourseReport {
        programs: catalog::course_programs(pool, &id).await?,
        schools: catalog::course_schools(pool, &id).await?,
        faculty: catalog::course_faculty(pool, &id).await?,
        bibliography: catalog::course_bibliography(pool, &id).await?,
        description: as_text(section(section_index, &id, SectionField::Description).await?),
        prior_knowledge: as_text(section(section_index, &id, SectionField::PriorKnowledge).await?),
        competencies: section(section_index, &id, SectionField::Competencies).await?,
        syllabus: section(section_index, &id, SectionField::Syllabus).await?,
        meta,
    }))
}

/// CLI entry point: prints the course report, or exits non-zero when no
/// course matches.
pub async fn run_course(config: &Config, query: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let section_index = index::create_index(&config.index, pool.clone())?;

    let report = match course_report(&pool, section_index.as_ref(), query).await? {
        Some(r) => r,
        None => {
            pool.close().await;
            eprintln!("Error: no course matches '{}'", query);
            std::process::exit(1);
        }
    };

    let meta = &report.meta;
    println!("--- Course ---");
    println!("id:            {}", meta.id);
    println!("name:          {}", meta.name);
    println!("credits:       {}", meta.credits);
    println!("academic year: {}", meta.academic_year);
    println!("semester:      {}", meta.semester);
    println!("language:      {}", meta.language);
    for p in &report.programs {
        println!("program:       {} - {} ({})", p.id, p.name, p.study_type.as_str());
    }
    for s in &report.schools {
        println!("school:        {} - {}", s.id, s.name);
    }
    println!();

    println!("--- Faculty ({}) ---", report.faculty.len());
    for f in &report.faculty {
        if f.email.is_empty() {
            println!("{}", f.name);
        } else {
            println!("{} <{}>", f.name, f.email);
        }
    }
    println!();

    if !report.bibliography.is_empty() {
        println!("--- Bibliography ({}) ---", report.bibliography.len());
        for b in &report.bibliography {
            println!("{} / {}", b.title, b.authors);
        }
        println!();
    }

    if let Some(description) = &report.description {
        println!("--- Description ---");
        println!("{}", description);
        println!();
    }
    if let Some(prior) = &report.prior_knowledge {
        println!("--- Prior knowledge ---");
        println!("{}", prior);
        println!();
    }
    if let Some(Value::Array(items)) = &report.competencies {
        println!("--- Competencies ({}) ---", items.len());
        for c in items {
            println!(
                "{} - {}",
                c["code"].as_str().unwrap_or(""),
                c["text"].as_str().unwrap_or("")
            );
        }
        println!();
    }
    if let Some(Value::Array(topics)) = &report.syllabus {
        println!("--- Syllabus ---");
        print_topics(topics, 0);
    }

    pool.close().await;
    Ok(())
}

fn print_topics(topics: &[Value], depth: usize) {
    for t in topics {
        println!(
            "{}{} {}",
            "  ".repeat(depth),
            t["number"].as_str().unwrap_or(""),
            t["title"].as_str().unwrap_or("")
        );
        if let Some(Value::Array(children)) = t.get("subtopics") {
            print_topics(children, depth + 1);
        }
    }
}
