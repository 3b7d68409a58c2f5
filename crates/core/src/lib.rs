//! Graph-guided technical interview engine.
//!
//! The [`interviewer::Interviewer`] drives each interview session turn by turn,
//! combining a static [`graph::KnowledgeGraph`], a [`retrieval::RetrievalIndex`]
//! of candidate questions and an [`llm_client::LLMClient`].

pub mod graph;
pub mod interviewer;
pub mod llm_client;
pub mod prompts;
pub mod retrieval;
pub mod session;
pub mod speech;

pub use interviewer::{InterviewSettings, Interviewer, TurnOutcome};
