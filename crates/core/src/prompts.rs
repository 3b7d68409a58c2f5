//! Prompt Templates
//!
//! Every language-model call made by the interviewer is driven by a named
//! Markdown template. The templates in the repository's `prompts/` directory
//! are compiled in as defaults; a deployment can override any of them by
//! placing `<key>.md` in its own prompts directory.

use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub const SPEECH_CORRECTION: &str = "speech_correction";
pub const OUTLINE_SELECTION: &str = "outline_selection";
pub const ENTITY_EXTRACTION: &str = "entity_extraction";
pub const COMPOSE_RESPONSE: &str = "compose_response";
pub const FINAL_REPORT: &str = "final_report";
pub const CLOSING_SUMMARY: &str = "closing_summary";
pub const DIRECT_INTERVIEW: &str = "direct_interview";

const BUILTIN: [(&str, &str); 7] = [
    (SPEECH_CORRECTION, include_str!("../../../prompts/speech_correction.md")),
    (OUTLINE_SELECTION, include_str!("../../../prompts/outline_selection.md")),
    (ENTITY_EXTRACTION, include_str!("../../../prompts/entity_extraction.md")),
    (COMPOSE_RESPONSE, include_str!("../../../prompts/compose_response.md")),
    (FINAL_REPORT, include_str!("../../../prompts/final_report.md")),
    (CLOSING_SUMMARY, include_str!("../../../prompts/closing_summary.md")),
    (DIRECT_INTERVIEW, include_str!("../../../prompts/direct_interview.md")),
];

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Missing prompt template: '{0}'")]
    Missing(String),
    #[error("Failed to read prompts directory: {0}")]
    Io(#[from] std::io::Error),
}

/// A keyed set of prompt templates.
#[derive(Debug, Clone)]
pub struct Prompts {
    templates: HashMap<String, String>,
}

impl Default for Prompts {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Prompts {
    /// The compiled-in templates.
    pub fn builtin() -> Self {
        Self {
            templates: BUILTIN
                .iter()
                .map(|(key, text)| (key.to_string(), text.to_string()))
                .collect(),
        }
    }

    /// Built-in templates overridden by any `*.md` file found in `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, PromptError> {
        let mut prompts = Self::builtin();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
                if let Some(key) = path.file_stem().and_then(|s| s.to_str()) {
                    let content = std::fs::read_to_string(&path)?;
                    info!(template = key, "Loaded prompt override");
                    prompts.templates.insert(key.to_string(), content);
                }
            }
        }
        Ok(prompts)
    }

    pub fn get(&self, key: &str) -> Result<&str, PromptError> {
        self.templates
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| PromptError::Missing(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_every_key() {
        let prompts = Prompts::builtin();
        for (key, _) in BUILTIN {
            assert!(!prompts.get(key).unwrap().trim().is_empty(), "{key} is empty");
        }
        assert!(prompts.get(COMPOSE_RESPONSE).unwrap().contains("{nextQ}"));
        assert!(prompts.get(COMPOSE_RESPONSE).unwrap().contains("{expectedAnswer}"));
        assert!(prompts.get(SPEECH_CORRECTION).unwrap().contains("{lastQuestion}"));
        assert!(prompts.get(OUTLINE_SELECTION).unwrap().contains("{entities}"));
    }

    #[test]
    fn test_unknown_key() {
        let err = Prompts::builtin().get("nope").unwrap_err();
        assert_eq!(err.to_string(), "Missing prompt template: 'nope'");
    }

    #[test]
    fn test_from_dir_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("final_report.md"), "Custom report").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let prompts = Prompts::from_dir(dir.path()).unwrap();
        assert_eq!(prompts.get(FINAL_REPORT).unwrap(), "Custom report");
        assert!(prompts.get("notes").is_err());
        assert!(prompts.get(ENTITY_EXTRACTION).unwrap().contains("None"));
    }

    #[test]
    fn test_from_missing_dir() {
        assert!(matches!(
            Prompts::from_dir(Path::new("/no/such/prompts")),
            Err(PromptError::Io(_))
        ));
    }
}
