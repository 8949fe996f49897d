//! Knowledge-graph export as N-Triples.
//!
//! Relational rows become typed resources (`Escuela`, `Titulacion`,
//! `Asignatura`, `Profesor`, `RecursoBibliografico`) linked by object
//! properties; indexed section texts are attached to the course resource
//! as literals. Output goes to a file, or to a SPARQL endpoint as
//! `INSERT DATA` updates.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::catalog::{self, CatalogSnapshot};
use crate::config::{Config, GraphConfig};
use crate::db;
use crate::index;
use crate::models::{SectionDocument, TopicNode};

const RDF_TYPE: &str = "<http://www.w3.org/1999/02/22-rdf-syntax-ns#type>";

/// Escapes a string for use inside a quoted N-Triples literal.
pub fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Builds triples under one namespace.
pub struct TripleBuilder<'a> {
    ns: &'a str,
    triples: Vec<String>,
}

impl<'a> TripleBuilder<'a> {
    pub fn new(ns: &'a str) -> Self {
        Self {
            ns,
            triples: Vec::new(),
        }
    }

    pub fn resource(&self, class: &str, id: &str) -> String {
        format!("<{}{}/{}>", self.ns, class, id)
    }

    fn predicate(&self, name: &str) -> String {
        format!("<{}{}>", self.ns, name)
    }

    fn typed(&mut self, subject: &str, class: &str) {
        let object = format!("<{}{}>", self.ns, class);
        self.triples.push(format!("{} {} {} .", subject, RDF_TYPE, object));
    }

    fn literal(&mut self, subject: &str, predicate: &str, value: &str) {
        let p = self.predicate(predicate);
        self.triples
            .push(format!("{} {} \"{}\" .", subject, p, escape_literal(value)));
    }

    /// Skips empty values.
    fn optional(&mut self, subject: &str, predicate: &str, value: &str) {
        if !value.trim().is_empty() {
            self.literal(subject, predicate, value);
        }
    }

    fn link(&mut self, subject: &str, predicate: &str, object: &str) {
        let p = self.predicate(predicate);
        self.triples.push(format!("{} {} {} .", subject, p, object));
    }

    pub fn add_catalog(&mut self, snapshot: &CatalogSnapshot) {
        for school in &snapshot.schools {
            let s = self.resource("Escuela", &school.id);
            self.typed(&s, "Escuela");
            self.literal(&s, "nombre", &school.name);
            self.literal(&s, "codigo", &school.id);
            if let Some(r) = &school.ontology_ref {
                self.optional(&s, "entidad_dbpedia", r);
            }
        }

        for program in &snapshot.programs {
            let s = self.resource("Titulacion", &program.id);
            self.typed(&s, "Titulacion");
            self.literal(&s, "nombre", &program.name);
            self.literal(&s, "codigoTitulacion", &program.id);
            self.literal(&s, "tipo", program.study_type.as_str());
        }

        for course in &snapshot.courses {
            let s = self.resource("Asignatura", &course.id);
            self.typed(&s, "Asignatura");
            self.literal(&s, "nombre", &course.name);
            self.optional(&s, "creditosECTS", &course.credits);
            self.optional(&s, "semestre", &course.semester);
            self.optional(&s, "idioma", &course.language);
        }

        for (id, member) in &snapshot.faculty {
            let s = self.resource("Profesor", &id.to_string());
            self.typed(&s, "Profesor");
            self.literal(&s, "nombre", &member.name);
            self.optional(&s, "correo", &member.email);
        }

        for (id, entry) in &snapshot.bibliography {
            let s = self.resource("RecursoBibliografico", &id.to_string());
            self.typed(&s, "RecursoBibliografico");
            self.literal(&s, "titulo", &entry.title);
            self.literal(&s, "autor", &entry.authors);
            self.optional(&s, "direccionURL", &entry.url);
        }

        for (program_id, school_id) in &snapshot.program_schools {
            let s = self.resource("Escuela", school_id);
            let o = self.resource("Titulacion", program_id);
            self.link(&s, "imparteTitulacion", &o);
        }
        for (program_id, course_id) in &snapshot.program_courses {
            let s = self.resource("Titulacion", program_id);
            let o = self.resource("Asignatura", course_id);
            self.link(&s, "incluyeAsignatura", &o);
        }
        for (faculty_id, course_id) in &snapshot.faculty_courses {
            let s = self.resource("Asignatura", course_id);
            let o = self.resource("Profesor", &faculty_id.to_string());
            self.link(&s, "tieneProfesor", &o);
        }
        for (bibliography_id, course_id) in &snapshot.bibliography_courses {
            let s = self.resource("Asignatura", course_id);
            let o = self.resource("RecursoBibliografico", &bibliography_id.to_string());
            self.link(&s, "usaRecurso", &o);
        }
    }

    /// Section texts hang off the course resource.
    pub fn add_sections(&mut self, doc: &SectionDocument) {
        let s = self.resource("Asignatura", &doc.course_id);
        self.literal(&s, "descripcion", &doc.description);
        self.literal(&s, "conocimientosPrevios", &doc.prior_knowledge);
        for competency in &doc.competencies {
            self.literal(&s, "competencia", &competency.text);
            self.literal(&s, "codigoCompetencia", &competency.code);
        }
        for topic in &doc.syllabus {
            self.literal(&s, "tema", &topic.title);
            self.add_subtopics(&s, topic);
        }
    }

    fn add_subtopics(&mut self, subject: &str, topic: &TopicNode) {
        for sub in &topic.subtopics {
            self.literal(subject, "subtema", &sub.title);
            self.add_subtopics(subject, sub);
        }
    }

    pub fn finish(self) -> Vec<String> {
        self.triples
    }
}

/// Posts `triples` as `INSERT DATA` updates of `batch_size` triples each.
/// A batch not answered with 204 is logged and counted; later batches are
/// still sent.
pub async fn push_sparql(config: &GraphConfig, endpoint: &str, triples: &[String]) -> Result<usize> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;

    let mut failed = 0;
    for (i, batch) in triples.chunks(config.batch_size.max(1)).enumerate() {
        let update = format!("INSERT DATA {{ {} }}", batch.join("\n"));
        let response = client
            .post(endpoint)
            .form(&[("update", update.as_str())])
            .send()
            .await
            .with_context(|| format!("sending triple batch {}", i + 1))?;

        let status = response.status();
        if status.as_u16() == 204 {
            info!(batch = i + 1, triples = batch.len(), "uploaded triple batch");
        } else {
            let text = response.text().await.unwrap_or_default();
            warn!(batch = i + 1, status = %status, body = %text, "triple batch rejected");
            failed += 1;
        }
    }
    Ok(failed)
}

pub async fn run_export_triples(config: &Config, out: Option<&Path>, push: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let snapshot = catalog::snapshot(&pool).await?;
    let section_index = index::create_index(&config.index, pool.clone())?;
    let documents = section_index.all_documents().await?;

    let mut builder = TripleBuilder::new(&config.graph.namespace);
    builder.add_catalog(&snapshot);
    for doc in &documents {
        builder.add_sections(doc);
    }
    let triples = builder.finish();

    if push {
        let endpoint = config
            .graph
            .endpoint
            .as_deref()
            .context("graph.endpoint must be set to push triples")?;
        let failed = push_sparql(&config.graph, endpoint, &triples).await?;
        let batches = triples.len().div_ceil(config.graph.batch_size.max(1));
        println!("export triples -> {}", endpoint);
        println!("  triples: {}", triples.len());
        println!("  batches: {} ({} failed)", batches, failed);
    }

    match out {
        Some(path) => {
            let mut body = triples.join("\n");
            body.push('\n');
            std::fs::write(path, body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("export triples -> {}", path.display());
            println!("  triples: {}", triples.len());
        }
        None if !push => {
            for t in &triples {
                println!("{}", t);
            }
        }
        None => {}
    }

    pool.close().await;
    Ok(())
}
