use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hop::HopType;

/// One piece of supporting evidence attached to a hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Source label, normally the host of `url`
    pub source: String,
    /// Credibility of the source (0.0 - 1.0)
    pub credibility_score: f64,
    /// Where the evidence was fetched from
    pub url: String,
    /// When the evidence was collected
    pub date: DateTime<Utc>,
    /// Relevant excerpt of the fetched content
    pub excerpt: String,
    /// Hop type that produced the evidence
    pub hop_type: HopType,
    /// Signal category the evaluator attributed the evidence to
    pub category: String,
}

impl EvidenceItem {
    /// Build an evidence item using the hop type's default credibility.
    pub fn new(
        url: impl Into<String>,
        excerpt: impl Into<String>,
        hop_type: HopType,
        category: impl Into<String>,
    ) -> Self {
        let url = url.into();
        Self {
            source: source_from_url(&url),
            credibility_score: hop_type.default_credibility(),
            url,
            date: Utc::now(),
            excerpt: excerpt.into(),
            hop_type,
            category: category.into(),
        }
    }

    /// Override the credibility score (clamped to 0.0 - 1.0).
    pub fn with_credibility(mut self, credibility: f64) -> Self {
        self.credibility_score = credibility.clamp(0.0, 1.0);
        self
    }
}

/// Extract the host part of a URL, falling back to the raw string.
fn source_from_url(url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    without_scheme
        .split(['/', '?', '#'])
        .next()
        .filter(|host| !host.is_empty())
        .unwrap_or(url)
        .trim_start_matches("www.")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_from_url() {
        assert_eq!(source_from_url("https://www.example.org/tenders/1"), "example.org");
        assert_eq!(source_from_url("http://club.com?x=1"), "club.com");
        assert_eq!(source_from_url("not a url"), "not a url");
    }

    #[test]
    fn test_credibility_clamped() {
        let item = EvidenceItem::new("https://a.com", "text", HopType::RfpPage, "CRM")
            .with_credibility(1.7);
        assert_eq!(item.credibility_score, 1.0);
    }
}
