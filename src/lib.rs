//! # Syllabus Harness
//!
//! Extracts structured course metadata from learning-guide PDFs and serves
//! it to a conversational agent.
//!
//! Each guide goes through layout normalization, section location, table
//! recovery and outline structuring. Relational facts (courses, programs,
//! schools, faculty, bibliography) land in SQLite; section texts and their
//! embeddings land in a search index. Both are exposed through a CLI and an
//! HTTP tool server, and can be exported as an RDF knowledge graph.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────┐   ┌─────────────┐
//! │  PDFs    │──▶│ layout → section     │──▶│ SQLite      │
//! │ (guides) │   │ table → stitch       │   │ relational  │
//! └──────────┘   │ outline → records    │   └──────┬──────┘
//!                └──────────┬───────────┘          │
//!                           ▼                      │
//!                  ┌─────────────────┐             │
//!                  │ SectionIndex    │◀────────────┤
//!                  │ sqlite / elastic│             │
//!                  └────────┬────────┘             │
//!                           ▼                      ▼
//!                     ┌──────────┐          ┌──────────┐
//!                     │  tools   │          │ triples  │
//!                     │  (HTTP)  │          │ (N-Tri.) │
//!                     └──────────┘          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! guides init                          # create tables and index
//! guides ingest ./pdfs                 # extract, enrich, embed, store
//! guides course "sistemas operativos"  # look a course up
//! guides serve tools                   # start the HTTP tool server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`layout`] | PDF loading and page normalization |
//! | [`section`] | Heading-bounded section location |
//! | [`table`] | Table detection and normalization |
//! | [`stitch`] | Multi-page table continuation |
//! | [`outline`] | Syllabus extraction and topic tree |
//! | [`records`] | Competency, bibliography and faculty records |
//! | [`guide`] | One guide from PDF to records |
//! | [`enrich`] | Bibliography lookup with a circuit breaker |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] / [`catalog`] | Relational writes and lookups |
//! | [`index`] | Section search index backends |
//! | [`ingest`] | Batch ingestion pipeline |
//! | [`tools`] / [`server`] | Agent tools and their HTTP server |
//! | [`triples`] | Knowledge-graph export |

pub mod catalog;
pub mod config;
pub mod course;
pub mod db;
pub mod embedding;
pub mod enrich;
pub mod error;
pub mod guide;
pub mod index;
pub mod ingest;
pub mod layout;
pub mod migrate;
pub mod models;
pub mod outline;
pub mod patterns;
pub mod records;
pub mod search;
pub mod section;
pub mod server;
pub mod stitch;
pub mod store;
pub mod table;
pub mod tools;
pub mod triples;
