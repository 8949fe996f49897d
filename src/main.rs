//! # Syllabus Harness CLI (`guides`)
//!
//! ## Usage
//!
//! ```bash
//! guides --config ./config/guides.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `guides init` | Create the relational tables and the section index |
//! | `guides ingest <dir>` | Extract every guide under a directory and store it |
//! | `guides inspect <pdf>` | Print one guide's extraction as JSON |
//! | `guides course "<query>"` | Show a course by id or name |
//! | `guides search "<query>"` | Semantic search over course sections |
//! | `guides export triples` | Export the knowledge graph as N-Triples |
//! | `guides serve tools` | Start the HTTP tool server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use syllabus_harness::ingest::IngestOptions;
use syllabus_harness::models::SectionField;
use syllabus_harness::{config, course, guide, index, ingest, migrate, search, server, triples};

/// Syllabus Harness CLI: extracts course metadata from learning-guide PDFs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/guides.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "guides",
    about = "Extract course metadata from learning-guide PDFs and serve it to agents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/guides.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the relational schema and the section index.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Ingest every PDF guide under a directory.
    ///
    /// Guides are processed one at a time; a guide that cannot be read is
    /// reported and skipped.
    Ingest {
        /// Directory scanned recursively for `.pdf` files.
        dir: PathBuf,

        /// Do not look bibliography entries up on the web.
        #[arg(long)]
        skip_enrichment: bool,

        /// Extract only; write nothing.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of guides to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the extraction of one guide as JSON.
    Inspect {
        /// Path to the guide PDF.
        pdf: PathBuf,
    },

    /// Show a course by id or (partial) name.
    Course {
        /// Course id (6-9 digits) or name.
        query: String,
    },

    /// Semantic search over course sections.
    ///
    /// Requires an embedding provider to be configured.
    Search {
        /// The search query string.
        query: String,

        /// Section to search: description, prior_knowledge or competencies.
        #[arg(long, default_value = "description")]
        field: SectionField,

        /// Maximum number of results.
        #[arg(long, default_value_t = 5)]
        k: usize,
    },

    /// Export data.
    Export {
        #[command(subcommand)]
        target: ExportTarget,
    },

    /// Start a server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

#[derive(Subcommand)]
enum ExportTarget {
    /// Export the knowledge graph as N-Triples.
    ///
    /// Without `--out` or `--push` the triples are printed to stdout.
    Triples {
        /// Write the triples to this file.
        #[arg(long)]
        out: Option<PathBuf>,

        /// POST the triples to `[graph].endpoint` as SPARQL updates.
        #[arg(long)]
        push: bool,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// Start the HTTP tool server on `[server].bind`.
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            let pool = syllabus_harness::db::connect(&cfg).await?;
            let section_index = index::create_index(&cfg.index, pool.clone())?;
            section_index.ensure_index().await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            dir,
            skip_enrichment,
            dry_run,
            limit,
        } => {
            let options = IngestOptions {
                skip_enrichment,
                dry_run,
                limit,
            };
            ingest::run_ingest(&cfg, &dir, &options).await?;
        }
        Commands::Inspect { pdf } => {
            guide::run_inspect(&cfg, &pdf)?;
        }
        Commands::Course { query } => {
            course::run_course(&cfg, &query).await?;
        }
        Commands::Search { query, field, k } => {
            search::run_search(&cfg, &query, field, k).await?;
        }
        Commands::Export { target } => match target {
            ExportTarget::Triples { out, push } => {
                triples::run_export_triples(&cfg, out.as_deref(), push).await?;
            }
        },
        Commands::Serve { service } => match service {
            ServeService::Tools => {
                server::run_server(&cfg).await?;
            }
        },
    }

    Ok(())
}
