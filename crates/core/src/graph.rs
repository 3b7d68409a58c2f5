//! Knowledge Graph
//!
//! A static, read-only set of `(head, relation, tail, topic)` facts loaded once
//! at startup. The interviewer uses it to hop from a concept the candidate
//! mentioned to related concepts worth asking about next.
//!
//! Entity lookups go through an [`EntityMatcher`] so the matching policy can be
//! swapped without touching the caller. The default policy is a loose,
//! case-insensitive substring match that tolerates noisy entity extraction.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Maximum number of facts returned by [`KnowledgeGraph::facts_about`].
pub const MAX_FACTS: usize = 5;

/// Failures while loading the graph source. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Failed to read knowledge graph '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse knowledge graph '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A single edge of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    #[serde(default)]
    pub head: String,
    #[serde(default)]
    pub relation: String,
    #[serde(default)]
    pub tail: String,
    /// The interview topic the fact was mined from.
    #[serde(default, alias = "source_topic")]
    pub topic: String,
}

impl Fact {
    pub fn new(head: &str, relation: &str, tail: &str, topic: &str) -> Self {
        Self {
            head: head.to_string(),
            relation: relation.to_string(),
            tail: tail.to_string(),
            topic: topic.to_string(),
        }
    }
}

impl std::fmt::Display for Fact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] --({})--> [{}]", self.head, self.relation, self.tail)
    }
}

/// Decides whether a fact endpoint refers to the entity being looked up.
pub trait EntityMatcher: Send + Sync {
    /// `key` is already lowercased and trimmed.
    fn matches(&self, endpoint: &str, key: &str) -> bool;
}

/// Case-insensitive substring containment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringMatcher;

impl EntityMatcher for SubstringMatcher {
    fn matches(&self, endpoint: &str, key: &str) -> bool {
        endpoint.to_lowercase().contains(key)
    }
}

/// The loaded graph: ordered facts plus the derived entity set.
pub struct KnowledgeGraph {
    facts: Vec<Fact>,
    entities: Vec<String>,
    matcher: Box<dyn EntityMatcher>,
}

impl KnowledgeGraph {
    /// Builds a graph with the default substring matching policy.
    pub fn from_facts(facts: Vec<Fact>) -> Self {
        Self::with_matcher(facts, SubstringMatcher)
    }

    pub fn with_matcher(facts: Vec<Fact>, matcher: impl EntityMatcher + 'static) -> Self {
        let mut seen = HashSet::new();
        let mut entities = Vec::new();
        for fact in &facts {
            for endpoint in [&fact.head, &fact.tail] {
                let trimmed = endpoint.trim();
                if !trimmed.is_empty() && seen.insert(trimmed.to_string()) {
                    entities.push(trimmed.to_string());
                }
            }
        }
        Self {
            facts,
            entities,
            matcher: Box::new(matcher),
        }
    }

    /// Reads a JSON array of facts from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| GraphError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let facts: Vec<Fact> = serde_json::from_str(&raw).map_err(|source| GraphError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        let graph = Self::from_facts(facts);
        info!(
            facts = graph.facts.len(),
            entities = graph.entities.len(),
            "Knowledge graph loaded"
        );
        Ok(graph)
    }

    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    /// Every distinct head or tail, trimmed, in first-seen order.
    pub fn all_entities(&self) -> &[String] {
        &self.entities
    }

    /// Entities one hop away from `entity`, in either direction.
    ///
    /// A fact whose head matches contributes its tail; otherwise a fact whose
    /// tail matches contributes its head. Duplicates are dropped keeping the
    /// first occurrence. Empty input yields nothing.
    pub fn neighbors_of(&self, entity: &str) -> Vec<String> {
        let key = entity.trim().to_lowercase();
        if key.is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        self.facts
            .iter()
            .filter_map(|fact| {
                if self.matcher.matches(&fact.head, &key) {
                    Some(fact.tail.clone())
                } else if self.matcher.matches(&fact.tail, &key) {
                    Some(fact.head.clone())
                } else {
                    None
                }
            })
            .filter(|neighbor| seen.insert(neighbor.clone()))
            .collect()
    }

    /// Up to [`MAX_FACTS`] facts touching `entity`, formatted for display.
    pub fn facts_about(&self, entity: &str) -> Vec<String> {
        let key = entity.trim().to_lowercase();
        if key.is_empty() {
            return Vec::new();
        }
        self.facts
            .iter()
            .filter(|fact| {
                self.matcher.matches(&fact.head, &key) || self.matcher.matches(&fact.tail, &key)
            })
            .take(MAX_FACTS)
            .map(ToString::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample() -> KnowledgeGraph {
        KnowledgeGraph::from_facts(vec![
            Fact::new("JVM", "manages", "Garbage Collection", "jvm basics"),
            Fact::new("Garbage Collection", "uses", "G1", "gc"),
            Fact::new("HashMap", "backed by", "Red-Black Tree", "collections"),
            Fact::new("ConcurrentHashMap", "extends idea of", "HashMap", "collections"),
            Fact::new(" JVM ", "runs", "Bytecode", "jvm basics"),
        ])
    }

    #[test]
    fn test_entities_are_trimmed_and_unique() {
        let graph = sample();
        assert_eq!(
            graph.all_entities(),
            &[
                "JVM",
                "Garbage Collection",
                "G1",
                "HashMap",
                "Red-Black Tree",
                "ConcurrentHashMap",
                "Bytecode"
            ]
        );
        for entity in graph.all_entities() {
            assert!(graph.facts().iter().any(|f| f.head.trim() == entity || f.tail.trim() == entity));
        }
    }

    #[test]
    fn test_neighbors_both_directions() {
        let graph = sample();
        assert_eq!(graph.neighbors_of("garbage collection"), vec!["JVM", "G1"]);
    }

    #[test]
    fn test_neighbors_substring_match_and_dedup() {
        let graph = sample();
        // "hashmap" matches both "HashMap" and "ConcurrentHashMap".
        assert_eq!(
            graph.neighbors_of("HashMap"),
            vec!["Red-Black Tree", "HashMap"]
        );
        assert_eq!(graph.neighbors_of("jvm"), vec!["Garbage Collection", "Bytecode"]);
    }

    #[test]
    fn test_neighbors_empty_input() {
        let graph = sample();
        assert!(graph.neighbors_of("").is_empty());
        assert!(graph.neighbors_of("   ").is_empty());
        assert!(graph.neighbors_of("Kubernetes").is_empty());
    }

    #[test]
    fn test_facts_about_formats_and_limits() {
        let mut facts = Vec::new();
        for i in 0..8 {
            facts.push(Fact::new("Redis", "supports", &format!("Feature{}", i), "redis"));
        }
        let graph = KnowledgeGraph::from_facts(facts);
        let lines = graph.facts_about("redis");
        assert_eq!(lines.len(), MAX_FACTS);
        assert_eq!(lines[0], "[Redis] --(supports)--> [Feature0]");
    }

    #[test]
    fn test_custom_matcher() {
        struct Exact;
        impl EntityMatcher for Exact {
            fn matches(&self, endpoint: &str, key: &str) -> bool {
                endpoint.trim().to_lowercase() == key
            }
        }
        let graph = KnowledgeGraph::with_matcher(
            vec![
                Fact::new("HashMap", "backed by", "Red-Black Tree", ""),
                Fact::new("ConcurrentHashMap", "extends idea of", "HashMap", ""),
            ],
            Exact,
        );
        assert_eq!(
            graph.neighbors_of("hashmap"),
            vec!["Red-Black Tree", "ConcurrentHashMap"]
        );
    }

    #[test]
    fn test_load_accepts_source_topic_alias() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"head": "TCP", "relation": "uses", "tail": "Three-way Handshake", "source_topic": "networking"}}]"#
        )
        .unwrap();

        let graph = KnowledgeGraph::load(file.path()).unwrap();
        assert_eq!(graph.facts()[0].topic, "networking");
        assert_eq!(graph.all_entities().len(), 2);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let err = KnowledgeGraph::load("/definitely/not/here.json").err().unwrap();
        assert!(matches!(err, GraphError::Read { .. }));
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = KnowledgeGraph::load(file.path()).err().unwrap();
        assert!(matches!(err, GraphError::Parse { .. }));
        assert!(err.to_string().starts_with("Failed to parse knowledge graph"));
    }
}
