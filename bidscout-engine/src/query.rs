//! Query Generator.
//!
//! Each hop type maps to a fixed strategy of primary and fallback query
//! templates. Results whose title or snippet match the exclusion denylist are
//! dropped before any page is fetched.

use tracing::{debug, warn};

use bidscout_model::{HopType, SignalType};

use crate::config::QueryConfig;
use crate::fetcher::{EvidenceFetcher, FetchError, SearchResult};

/// Search behaviour for one hop type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HopStrategy {
    /// Search engine passed to the provider
    pub engine: &'static str,
    /// Queries tried first
    pub primary: &'static [&'static str],
    /// Queries tried in order after the primaries
    pub fallbacks: &'static [&'static str],
    /// Credibility assigned to evidence from this hop
    pub default_credibility: f64,
    /// Signal type used when the evaluator names none
    pub default_signal_type: SignalType,
}

const RFP_PRIMARY: &[&str] = &["\"{entity}\" RFP", "\"{entity}\" request for proposal"];
const RFP_FALLBACK: &[&str] = &[
    "\"{entity}\" tender",
    "\"{entity}\" procurement opportunity",
    "site:linkedin.com \"{entity}\" procurement",
];
const PDF_PRIMARY: &[&str] = &["\"{entity}\" tender filetype:pdf"];
const PDF_FALLBACK: &[&str] = &[
    "\"{entity}\" invitation to tender filetype:pdf",
    "\"{entity}\" annual report filetype:pdf",
];
const OFFICIAL_PRIMARY: &[&str] = &["\"{entity}\" official site digital strategy"];
const OFFICIAL_FALLBACK: &[&str] = &["\"{entity}\" technology partners", "\"{entity}\" suppliers"];
const PRESS_PRIMARY: &[&str] = &["\"{entity}\" announces partnership"];
const PRESS_FALLBACK: &[&str] = &[
    "\"{entity}\" selects platform",
    "\"{entity}\" press release technology",
];
const CAREERS_PRIMARY: &[&str] = &["\"{entity}\" careers digital"];
const CAREERS_FALLBACK: &[&str] = &["\"{entity}\" jobs CRM", "site:linkedin.com/jobs \"{entity}\""];

impl HopStrategy {
    /// Strategy for a hop type.
    pub fn for_hop(hop: HopType) -> Self {
        let (engine, primary, fallbacks) = match hop {
            HopType::RfpPage => ("google", RFP_PRIMARY, RFP_FALLBACK),
            HopType::PdfDocument => ("google", PDF_PRIMARY, PDF_FALLBACK),
            HopType::OfficialSite => ("google", OFFICIAL_PRIMARY, OFFICIAL_FALLBACK),
            HopType::PressRelease => ("google_news", PRESS_PRIMARY, PRESS_FALLBACK),
            HopType::CareersPage => ("google", CAREERS_PRIMARY, CAREERS_FALLBACK),
        };

        Self {
            engine,
            primary,
            fallbacks,
            default_credibility: hop.default_credibility(),
            default_signal_type: hop.default_signal_type(),
        }
    }
}

/// One rendered query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedQuery {
    /// Query text
    pub text: String,
    /// Search engine
    pub engine: &'static str,
    /// Whether this came from the fallback list
    pub is_fallback: bool,
}

/// Drops search results that are structurally unrelated to procurement.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    phrases: Vec<String>,
}

impl ExclusionFilter {
    /// Create a filter from denylisted phrases.
    pub fn new(phrases: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether a result should be dropped.
    pub fn excludes(&self, result: &SearchResult) -> bool {
        let title = result.title.to_lowercase();
        let snippet = result.snippet.to_lowercase();
        self.phrases
            .iter()
            .any(|p| title.contains(p.as_str()) || snippet.contains(p.as_str()))
    }

    /// Keep only results that pass the filter.
    pub fn apply(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        results.into_iter().filter(|r| !self.excludes(r)).collect()
    }
}

/// Result of running one hop.
#[derive(Debug, Clone, PartialEq)]
pub enum HopOutcome {
    /// A page yielded usable content
    Content {
        /// Query that found it
        query: String,
        /// Page URL
        url: String,
        /// Extracted text
        content: String,
        /// Characters fetched
        chars: usize,
    },
    /// Every query was exhausted without usable content
    NoProgress {
        /// Last query tried
        query: String,
        /// Why the hop produced nothing
        reason: String,
    },
}

/// Builds queries and runs hops against a fetcher.
pub struct QueryGenerator {
    filter: ExclusionFilter,
    results_per_query: usize,
}

impl QueryGenerator {
    /// Create a generator from configuration.
    pub fn new(config: &QueryConfig) -> Self {
        Self {
            filter: ExclusionFilter::new(&config.exclusions),
            results_per_query: config.results_per_query.max(1),
        }
    }

    /// Ordered queries for a hop: primaries, then fallbacks.
    pub fn queries(&self, hop: HopType, entity_name: &str) -> Vec<PlannedQuery> {
        let strategy = HopStrategy::for_hop(hop);
        let render = |template: &str, is_fallback: bool| PlannedQuery {
            text: template.replace("{entity}", entity_name),
            engine: strategy.engine,
            is_fallback,
        };

        strategy
            .primary
            .iter()
            .map(|t| render(*t, false))
            .chain(strategy.fallbacks.iter().map(|t| render(*t, true)))
            .collect()
    }

    /// The exclusion filter in use.
    pub fn filter(&self) -> &ExclusionFilter {
        &self.filter
    }

    /// Try queries in order until one yields fetchable content.
    ///
    /// Fetch and search errors are logged and skipped; exhaustion is a
    /// `NoProgress` outcome, not an error.
    pub async fn run_hop(
        &self,
        fetcher: &dyn EvidenceFetcher,
        hop: HopType,
        entity_name: &str,
    ) -> HopOutcome {
        let queries = self.queries(hop, entity_name);
        let mut last_query = String::new();
        let mut last_error: Option<FetchError> = None;

        for planned in queries {
            last_query = planned.text.clone();

            let results = match fetcher.search(&planned.text, planned.engine).await {
                Ok(results) => results,
                Err(err) => {
                    warn!(hop = %hop, query = %planned.text, error = %err, "Search failed");
                    last_error = Some(err);
                    continue;
                }
            };

            let total = results.len();
            let usable = self.filter.apply(results);
            debug!(
                hop = %hop,
                query = %planned.text,
                fallback = planned.is_fallback,
                total,
                usable = usable.len(),
                "Search results"
            );

            for result in usable.into_iter().take(self.results_per_query) {
                match fetcher.fetch(&result.url).await {
                    Ok(page) if !page.is_empty() => {
                        return HopOutcome::Content {
                            query: planned.text,
                            url: result.url,
                            chars: page.chars,
                            content: page.content,
                        };
                    }
                    Ok(_) => debug!(url = %result.url, "Empty page"),
                    Err(err) => {
                        warn!(url = %result.url, error = %err, "Fetch failed");
                        last_error = Some(err);
                    }
                }
            }
        }

        let reason = match last_error {
            Some(err) => format!("queries exhausted, last error: {}", err),
            None => "queries exhausted without usable results".to_string(),
        };
        HopOutcome::NoProgress {
            query: last_query,
            reason,
        }
    }
}
