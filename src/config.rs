use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::patterns::{PatternConfig, Patterns};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub patterns: PatternConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where section documents are indexed.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_backend")]
    pub backend: String,
    /// Base URL of the Elasticsearch cluster (elasticsearch backend only).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default = "default_bulk_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_num_candidates")]
    pub num_candidates: usize,
    #[serde(default = "default_index_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            url: None,
            name: default_index_name(),
            batch_size: default_bulk_batch_size(),
            num_candidates: default_num_candidates(),
            timeout_secs: default_index_timeout_secs(),
        }
    }
}

fn default_index_backend() -> String {
    "sqlite".to_string()
}
fn default_index_name() -> String {
    "course_sections".to_string()
}
fn default_bulk_batch_size() -> usize {
    50
}
fn default_num_candidates() -> usize {
    100
}
fn default_index_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Page cropping applied before any text is read.
#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_margin")]
    pub margin_top: f64,
    #[serde(default = "default_margin")]
    pub margin_bottom: f64,
    /// Leading pages (cover and index) never searched for sections.
    #[serde(default = "default_skip_pages")]
    pub skip_pages: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            margin_top: default_margin(),
            margin_bottom: default_margin(),
            skip_pages: default_skip_pages(),
        }
    }
}

fn default_margin() -> f64 {
    60.0
}
fn default_skip_pages() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,
    #[serde(default = "default_scholar_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay_secs: default_min_delay(),
            max_delay_secs: default_max_delay(),
            base_url: default_scholar_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_min_delay() -> f64 {
    5.0
}
fn default_max_delay() -> f64 {
    20.0
}
fn default_scholar_url() -> String {
    "https://scholar.google.com/scholar".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
        .to_string()
}

/// Knowledge-graph export target.
#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    /// SPARQL update endpoint used by `export triples --push`.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_graph_batch")]
    pub batch_size: usize,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            batch_size: default_graph_batch(),
            namespace: default_namespace(),
        }
    }
}

fn default_graph_batch() -> usize {
    50
}
fn default_namespace() -> String {
    "http://upm.es/ontology/".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate index
    match config.index.backend.as_str() {
        "sqlite" => {}
        "elasticsearch" => {
            if config.index.url.is_none() {
                anyhow::bail!("index.url must be set when backend is 'elasticsearch'");
            }
        }
        other => anyhow::bail!(
            "Unknown index backend: '{}'. Must be sqlite or elasticsearch.",
            other
        ),
    }
    if config.index.batch_size == 0 {
        anyhow::bail!("index.batch_size must be > 0");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    // Validate extraction
    if config.extraction.margin_top < 0.0 || config.extraction.margin_bottom < 0.0 {
        anyhow::bail!("extraction margins must be >= 0");
    }

    // Validate enrichment
    let e = &config.enrichment;
    if e.min_delay_secs < 0.0 || e.max_delay_secs < e.min_delay_secs {
        anyhow::bail!("enrichment delays must satisfy 0 <= min_delay_secs <= max_delay_secs");
    }

    if config.graph.batch_size == 0 {
        anyhow::bail!("graph.batch_size must be > 0");
    }

    Patterns::compile(&config.patterns).context("Invalid [patterns] section")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let cfg = parse("[db]\npath = \"./data/guides.sqlite\"\n").unwrap();
        assert_eq!(cfg.index.backend, "sqlite");
        assert_eq!(cfg.index.batch_size, 50);
        assert_eq!(cfg.extraction.margin_top, 60.0);
        assert_eq!(cfg.extraction.skip_pages, 2);
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.graph.namespace, "http://upm.es/ontology/");
        assert_eq!(cfg.patterns.bibliography_type, "Bibliografía");
    }

    #[test]
    fn test_elasticsearch_requires_url() {
        let err = parse("[db]\npath = \"x.sqlite\"\n[index]\nbackend = \"elasticsearch\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("index.url"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = parse("[db]\npath = \"x.sqlite\"\n[index]\nbackend = \"solr\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown index backend"));
    }

    #[test]
    fn test_enabled_embedding_requires_dims_and_model() {
        let err = parse("[db]\npath = \"x.sqlite\"\n[embedding]\nprovider = \"openai\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_inverted_delays_rejected() {
        let err = parse(
            "[db]\npath = \"x.sqlite\"\n[enrichment]\nmin_delay_secs = 10.0\nmax_delay_secs = 1.0\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("enrichment delays"));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let err = parse("[db]\npath = \"x.sqlite\"\n[patterns]\nmetadata_anchor = \"(unclosed\"\n")
            .unwrap_err();
        assert!(format!("{:#}", err).contains("metadata_anchor"));
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/guides.example.toml");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:7341");
        assert_eq!(cfg.patterns, PatternConfig::default());
        assert!(cfg.enrichment.enabled);
    }
}
