//! Bibliography enrichment through a scholarly search page.
//!
//! Each bibliography row printed in a guide is looked up by name and the
//! first search hit supplies a clean title, authors and a link. Lookups are
//! spaced by a random delay, and the first failure trips a breaker that
//! disables enrichment for the remainder of the run.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::Rng;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::EnrichmentConfig;
use crate::models::{BibliographyEntry, BibliographyRow};

/// Resolves a free-text reference into a bibliography entry.
#[async_trait]
pub trait BibliographyLookup: Send + Sync {
    /// `Ok(None)` means the search returned no usable hit.
    async fn lookup(&self, query: &str) -> Result<Option<BibliographyEntry>>;
}

/// Markers the search page prepends to result titles.
const TITLE_TAGS: [&str; 6] = ["[PDF]", "[LIBRO]", "[B]", "[CITAS]", "[C]", "[HTML]"];

pub struct ScholarClient {
    client: reqwest::Client,
    base_url: String,
}

impl ScholarClient {
    pub fn new(config: &EnrichmentConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl BibliographyLookup for ScholarClient {
    async fn lookup(&self, query: &str) -> Result<Option<BibliographyEntry>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query)])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() != 200 {
            bail!("scholar search returned {}", status);
        }

        let html = response.text().await?;
        Ok(parse_first_result(&html))
    }
}

fn text_of(el: scraper::ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads the first result block of a search page.
pub fn parse_first_result(html: &str) -> Option<BibliographyEntry> {
    let doc = Html::parse_document(html);
    let result_sel = Selector::parse(".gs_r.gs_or.gs_scl").ok()?;
    let title_sel = Selector::parse(".gs_rt").ok()?;
    let byline_sel = Selector::parse(".gs_a").ok()?;
    let link_sel = Selector::parse("a[href]").ok()?;

    let item = doc.select(&result_sel).next()?;
    let title_el = item.select(&title_sel).next();

    let title = title_el.map(|el| clean_title(&text_of(el))).unwrap_or_default();
    if title.is_empty() {
        return None;
    }

    let authors = item
        .select(&byline_sel)
        .next()
        .map(|el| authors_from_byline(&text_of(el)))
        .unwrap_or_default();
    let url = title_el
        .and_then(|el| el.select(&link_sel).next())
        .and_then(|a| a.value().attr("href"))
        .unwrap_or("")
        .to_string();

    Some(BibliographyEntry { title, authors, url })
}

/// Removes result-type markers and collapses whitespace.
pub fn clean_title(raw: &str) -> String {
    let mut title = raw.to_string();
    for tag in TITLE_TAGS {
        title = title.replace(tag, "");
    }
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The author list is everything before the first dash of the byline.
pub fn authors_from_byline(byline: &str) -> String {
    byline.split('-').next().unwrap_or("").trim().to_string()
}

/// Throttled, breaker-guarded enrichment for a whole run.
pub struct Enricher {
    lookup: Box<dyn BibliographyLookup>,
    min_delay_secs: f64,
    max_delay_secs: f64,
    lookups: usize,
    tripped: bool,
}

impl Enricher {
    pub fn new(lookup: Box<dyn BibliographyLookup>, config: &EnrichmentConfig) -> Self {
        Self {
            lookup,
            min_delay_secs: config.min_delay_secs,
            max_delay_secs: config.max_delay_secs,
            lookups: 0,
            tripped: false,
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    fn next_delay(&self) -> Duration {
        if self.max_delay_secs <= 0.0 {
            return Duration::ZERO;
        }
        let secs = rand::thread_rng().gen_range(self.min_delay_secs..=self.max_delay_secs);
        Duration::from_secs_f64(secs)
    }

    /// Resolves `rows` in order. Rows without a hit are skipped; after a
    /// failed lookup nothing more is looked up in this run.
    pub async fn enrich(&mut self, rows: &[BibliographyRow]) -> Vec<BibliographyEntry> {
        let mut entries = Vec::new();

        for row in rows {
            if self.tripped {
                break;
            }

            if self.lookups > 0 {
                let delay = self.next_delay();
                if !delay.is_zero() {
                    debug!(delay_ms = delay.as_millis() as u64, "waiting before lookup");
                    tokio::time::sleep(delay).await;
                }
            }
            self.lookups += 1;

            match self.lookup.lookup(&row.name).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => debug!(reference = %row.name, "no search hit"),
                Err(e) => {
                    warn!(reference = %row.name, error = %e, "bibliography lookup failed; disabling enrichment for this run");
                    self.tripped = true;
                }
            }
        }

        if !entries.is_empty() {
            info!(resolved = entries.len(), requested = rows.len(), "enriched bibliography");
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const PAGE: &str = r#"
        <html><body>
          <div class="gs_r gs_or gs_scl">
            <h3 class="gs_rt"><span class="gs_ctg2">[LIBRO]</span>
              <a href="https://example.org/os">Operating  system concepts</a></h3>
            <div class="gs_a">A Silberschatz, PB Galvin, G Gagne - 2018 - Wiley</div>
          </div>
          <div class="gs_r gs_or gs_scl">
            <h3 class="gs_rt"><a href="https://example.org/other">Otro</a></h3>
          </div>
        </body></html>"#;

    #[test]
    fn test_parse_first_result() {
        let entry = parse_first_result(PAGE).unwrap();
        assert_eq!(entry.title, "Operating system concepts");
        assert_eq!(entry.authors, "A Silberschatz, PB Galvin, G Gagne");
        assert_eq!(entry.url, "https://example.org/os");
    }

    #[test]
    fn test_page_without_results() {
        assert!(parse_first_result("<html><body><p>nada</p></body></html>").is_none());
    }

    #[test]
    fn test_clean_title_strips_markers() {
        assert_eq!(clean_title("[PDF] [HTML]  Modern   operating systems"), "Modern operating systems");
    }

    struct FailingAfter {
        calls: Arc<AtomicUsize>,
        fail_on: usize,
    }

    #[async_trait]
    impl BibliographyLookup for FailingAfter {
        async fn lookup(&self, query: &str) -> Result<Option<BibliographyEntry>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == self.fail_on {
                bail!("blocked");
            }
            Ok(Some(BibliographyEntry {
                title: query.to_uppercase(),
                authors: String::new(),
                url: String::new(),
            }))
        }
    }

    fn rows(names: &[&str]) -> Vec<BibliographyRow> {
        names
            .iter()
            .map(|n| BibliographyRow {
                name: n.to_string(),
                kind: "Bibliografía".into(),
                notes: String::new(),
            })
            .collect()
    }

    fn no_delay() -> EnrichmentConfig {
        EnrichmentConfig {
            min_delay_secs: 0.0,
            max_delay_secs: 0.0,
            ..EnrichmentConfig::default()
        }
    }

    #[tokio::test]
    async fn test_failure_trips_breaker_for_rest_of_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lookup = FailingAfter {
            calls: calls.clone(),
            fail_on: 1,
        };
        let mut enricher = Enricher::new(Box::new(lookup), &no_delay());

        let first = enricher.enrich(&rows(&["a", "b", "c"])).await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].title, "A");
        assert!(enricher.is_tripped());

        let second = enricher.enrich(&rows(&["d"])).await;
        assert!(second.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
