//! Citation policy and rendering.
//!
//! Raw citation URIs come out of the retrieval response in whatever shape
//! the knowledge base stored them (`s3://` object keys, web URLs, metadata
//! strings). [`CitationPolicy::finalize`] turns them into the list shown to
//! the student:
//!
//! 1. alias resolution (a known object key becomes its public URL)
//! 2. well-formedness (absolute URL; `https` only when required)
//! 3. de-duplication in first-seen order
//! 4. the keyword fallback table
//! 5. the [`MAX_CITATIONS`] cap
//!
//! [`format_answer`] then appends the markdown "Sources" section.

use std::collections::HashSet;
use std::fmt::Write as _;

use serde::Deserialize;
use url::Url;

/// Upper bound on citations attached to one answer.
pub const MAX_CITATIONS: usize = 5;

/// Public URL of the Math Placement FAQ held in the knowledge base.
pub const DEFAULT_CANONICAL_URI: &str = "https://math.calpoly.edu/math-placement";

/// Label used for the canonical knowledge-base document.
pub const CANONICAL_LABEL: &str = "Math Placement KB";

/// Label used for any other secure citation.
pub const GENERIC_LABEL: &str = "Source";

/// When the keyword fallback may attach its citation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Attach whenever a keyword matches and the canonical document is not
    /// already cited, even if other citations were found.
    #[default]
    Always,
    /// Attach only when retrieval produced no usable citation at all.
    WhenEmpty,
}

/// One row of the keyword → fallback source table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FallbackRule {
    /// Case-insensitive substrings matched against the question.
    pub keywords: Vec<String>,
    /// Citation attached when a keyword matches.
    pub uri: String,
    /// Link label used when rendering `uri`.
    #[serde(default)]
    pub label: Option<String>,
}

impl FallbackRule {
    /// Whether any keyword occurs in the (already lower-cased) question.
    fn matches(&self, question_lower: &str) -> bool {
        self.keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .any(|k| !k.is_empty() && question_lower.contains(&k))
    }
}

/// Citation filtering and fallback policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CitationPolicy {
    /// Public URI of the canonical knowledge-base document.
    pub canonical_uri: String,
    /// Other spellings of the canonical document (e.g. its `s3://` key in
    /// the knowledge-base bucket). Citations equal to an alias are rewritten
    /// to [`CitationPolicy::canonical_uri`].
    pub canonical_aliases: Vec<String>,
    /// Drop citations whose scheme is not `https`.
    pub require_https: bool,
    /// When the fallback table may fire.
    pub fallback_mode: FallbackMode,
    /// Keyword → fallback source table, checked in order; first match wins.
    pub fallback: Vec<FallbackRule>,
}

impl Default for CitationPolicy {
    fn default() -> Self {
        Self {
            canonical_uri: DEFAULT_CANONICAL_URI.to_owned(),
            canonical_aliases: Vec::new(),
            require_https: false,
            fallback_mode: FallbackMode::default(),
            fallback: vec![FallbackRule {
                keywords: [
                    "policy",
                    "requirement",
                    "mape",
                    "placement",
                    "exam",
                    "aleks",
                    "prerequisite",
                ]
                .into_iter()
                .map(str::to_owned)
                .collect(),
                uri: DEFAULT_CANONICAL_URI.to_owned(),
                label: Some(CANONICAL_LABEL.to_owned()),
            }],
        }
    }
}

impl CitationPolicy {
    /// Map an alias of the canonical document to the canonical URI.
    fn resolve<'a>(&'a self, uri: &'a str) -> &'a str {
        if self.canonical_aliases.iter().any(|a| a == uri) {
            &self.canonical_uri
        } else {
            uri
        }
    }

    /// Whether `uri` is an absolute URL acceptable under this policy.
    pub fn is_well_formed(&self, uri: &str) -> bool {
        match Url::parse(uri) {
            Ok(parsed) => {
                if self.require_https {
                    parsed.scheme() == "https"
                } else {
                    !parsed.cannot_be_a_base()
                }
            }
            Err(_) => false,
        }
    }

    /// Filter, de-duplicate, apply the fallback table, and cap `raw`.
    ///
    /// The result never holds more than [`MAX_CITATIONS`] entries and never
    /// holds the same URI twice.
    pub fn finalize<I, S>(&self, raw: I, question: &str) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut citations: Vec<String> = Vec::new();
        for uri in raw {
            let trimmed = uri.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            let resolved = self.resolve(trimmed);
            if !self.is_well_formed(resolved) {
                tracing::debug!(uri = resolved, "dropping malformed citation");
                continue;
            }
            if seen.insert(resolved.to_owned()) {
                citations.push(resolved.to_owned());
            }
        }

        if let Some(rule) = self.fallback_for(&citations, question) {
            if !citations.iter().any(|c| c == &rule.uri) {
                citations.truncate(MAX_CITATIONS.saturating_sub(1));
                tracing::debug!(uri = %rule.uri, "attaching fallback citation");
                citations.push(rule.uri.clone());
            }
        }

        citations.truncate(MAX_CITATIONS);
        citations
    }

    /// The fallback rule that applies to this question, if any.
    fn fallback_for(&self, citations: &[String], question: &str) -> Option<&FallbackRule> {
        if citations.iter().any(|c| c == &self.canonical_uri) {
            return None;
        }
        if self.fallback_mode == FallbackMode::WhenEmpty && !citations.is_empty() {
            return None;
        }
        let question_lower = question.to_lowercase();
        self.fallback.iter().find(|rule| rule.matches(&question_lower))
    }

    /// Link label for a secure citation.
    pub fn label_for(&self, uri: &str) -> &str {
        if uri == self.canonical_uri {
            return CANONICAL_LABEL;
        }
        self.fallback
            .iter()
            .find(|rule| rule.uri == uri)
            .and_then(|rule| rule.label.as_deref())
            .unwrap_or(GENERIC_LABEL)
    }
}

/// Append a markdown "Sources" section to `answer`.
///
/// Returns `answer` unchanged when `citations` is empty. `https` URIs render
/// as labelled links, anything else as a plain bullet.
pub fn format_answer(answer: &str, citations: &[String], policy: &CitationPolicy) -> String {
    let mut out = answer.to_owned();
    if citations.is_empty() {
        return out;
    }

    out.push_str("\n\n**Sources:**");
    for uri in citations {
        let secure = Url::parse(uri).is_ok_and(|u| u.scheme() == "https");
        if secure {
            let _ = write!(out, "\n- [{}]({uri})", policy.label_for(uri));
        } else {
            let _ = write!(out, "\n- {uri}");
        }
    }
    out
}
