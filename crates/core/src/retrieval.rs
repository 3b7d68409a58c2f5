//! Question Retrieval
//!
//! Similarity search over the interview question corpus. The orchestrator only
//! depends on the [`RetrievalIndex`] contract; two implementations are provided:
//! an in-process [`QuestionBank`] ranked with fuzzy matching, and an
//! [`HttpRetrievalIndex`] that delegates to an external search service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// A ranked search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
    /// Stable topic identifier, when the corpus carries one.
    pub identifier: Option<String>,
}

impl Passage {
    pub fn new(content: impl Into<String>, identifier: Option<&str>) -> Self {
        Self {
            content: content.into(),
            identifier: identifier.map(str::to_string),
        }
    }
}

/// Contract for any similarity-search backend.
///
/// An empty result is a normal outcome, not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Passage>>;
}

/// How question and reference answer are laid out inside a passage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassageFormat {
    pub question_prefix: String,
    pub answer_marker: String,
}

impl Default for PassageFormat {
    fn default() -> Self {
        Self {
            question_prefix: "Interview question:".to_string(),
            answer_marker: "Reference answer:".to_string(),
        }
    }
}

impl PassageFormat {
    /// Renders a bank entry the same way the search corpus stores it.
    pub fn render(&self, question: &str, answer: &str) -> String {
        format!(
            "{} {}\n{} {}",
            self.question_prefix, question, self.answer_marker, answer
        )
    }

    /// Splits passage content into `(question, reference_answer)`.
    ///
    /// Without an answer marker the whole content is the question and the
    /// reference answer is empty.
    pub fn split(&self, content: &str) -> (String, String) {
        let (question, answer) = match content.split_once(self.answer_marker.as_str()) {
            Some((q, a)) if !self.answer_marker.is_empty() => (q, a.trim()),
            _ => (content, ""),
        };
        let question = question.trim();
        let question = question
            .strip_prefix(self.question_prefix.as_str())
            .unwrap_or(question)
            .trim();
        (question.to_string(), answer.to_string())
    }
}

/// A single record of the question bank file.
#[derive(Debug, Clone, Deserialize)]
pub struct BankEntry {
    pub topic: String,
    pub content: String,
}

/// In-process question corpus ranked by fuzzy score against the query.
pub struct QuestionBank {
    passages: Vec<(String, Passage)>,
    matcher: SkimMatcherV2,
}

impl QuestionBank {
    pub fn new(entries: Vec<BankEntry>, format: &PassageFormat) -> Self {
        let passages = entries
            .into_iter()
            .map(|entry| {
                let haystack = format!("{} {}", entry.topic, entry.content);
                let passage = Passage::new(
                    format.render(&entry.topic, &entry.content),
                    Some(entry.topic.as_str()),
                );
                (haystack, passage)
            })
            .collect();
        Self {
            passages,
            matcher: SkimMatcherV2::default().ignore_case(),
        }
    }

    /// Loads a JSON array of `{topic, content}` records.
    pub fn load(path: impl AsRef<Path>, format: &PassageFormat) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read question bank '{}'", path.display()))?;
        let entries: Vec<BankEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse question bank '{}'", path.display()))?;
        info!(questions = entries.len(), "Question bank loaded");
        Ok(Self::new(entries, format))
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

#[async_trait]
impl RetrievalIndex for QuestionBank {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Passage>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let mut scored: Vec<(i64, usize)> = self
            .passages
            .iter()
            .enumerate()
            .filter_map(|(i, (haystack, _))| {
                self.matcher.fuzzy_match(haystack, query).map(|score| (score, i))
            })
            .collect();
        // Stable sort keeps file order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, i)| self.passages[i].1.clone())
            .collect())
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
}

#[derive(Deserialize)]
struct SearchHit {
    content: String,
    #[serde(default)]
    metadata: Option<SearchHitMetadata>,
}

#[derive(Deserialize)]
struct SearchHitMetadata {
    #[serde(default)]
    topic: Option<String>,
}

/// Delegates search to an HTTP service exposing `POST {base}/search`.
pub struct HttpRetrievalIndex {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRetrievalIndex {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RetrievalIndex for HttpRetrievalIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Passage>> {
        let hits: Vec<SearchHit> = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&SearchRequest { query, top_k })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("Malformed search response")?;

        Ok(hits
            .into_iter()
            .map(|hit| Passage {
                content: hit.content,
                identifier: hit.metadata.and_then(|m| m.topic),
            })
            .collect())
    }
}
