//! Dialogue Orchestrator
//!
//! Drives a graph-guided technical interview one turn at a time. Each turn
//! corrects the candidate's transcript, then either plans the interview
//! outline from the candidate's background, hops through the knowledge graph
//! to a related question, falls back to the next outline entry, or closes the
//! interview with a report.
//!
//! No failure of an external collaborator ever escapes a turn: every
//! language-model or retrieval error degrades to a fallback and the interview
//! carries on.

use crate::graph::KnowledgeGraph;
use crate::llm_client::{ChatTurn, LLMClient, TurnPurpose};
use crate::prompts::{self, Prompts};
use crate::retrieval::{Passage, PassageFormat, RetrievalIndex};
use crate::session::{SessionHandle, SessionSnapshot, SessionState, SessionStore, Stage};
use anyhow::{Result, anyhow};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Input that (re)starts an interview, matched case-insensitively.
pub const START_SENTINEL: &str = "START";

pub const GREETING: &str = "Hello! I'm your interviewer today. Which role are you applying for, \
and could you briefly walk me through your technical background?";

pub const CLOSED_MESSAGE: &str =
    "The interview has concluded. Thank you for taking part. Please start a new session to begin again.";

pub const REPORT_FALLBACK: &str = "The interview has ended, thank you for taking part. \
A detailed report could not be generated right now; please contact the administrator.";

pub const EXHAUSTED_LEAD_IN: &str =
    "Alright, that wraps up the technical part of today's interview. Here is my summary:\n";

/// Stands in for the reference answer when the question being composed is the first one.
pub const NO_PRIOR_ANSWER: &str =
    "No prior answer: this is the opening question, there is nothing to evaluate yet.";

const COMPOSE_FALLBACK: &str = "Sorry, I lost my train of thought for a moment. Let's move on.";

const DIRECT_FALLBACK: &str =
    "Sorry, I'm having trouble with my notes right now. Could you repeat that in a moment?";

/// Tunables of the interview flow.
#[derive(Debug, Clone)]
pub struct InterviewSettings {
    /// Outline entries that must yield questions before the final report.
    pub keyword_threshold: usize,
    /// Candidates requested per retrieval.
    pub top_k: usize,
    /// Length of the content prefix used as identifier when a passage has none.
    pub id_prefix_chars: usize,
    /// Upper bound on each external call.
    pub call_timeout: Duration,
    /// Cap on how many graph entities are offered when planning the outline.
    pub max_outline_entities: usize,
    pub passage_format: PassageFormat,
}

impl Default for InterviewSettings {
    fn default() -> Self {
        Self {
            keyword_threshold: 2,
            top_k: 5,
            id_prefix_chars: 15,
            call_timeout: Duration::from_secs(60),
            max_outline_entities: 300,
            passage_format: PassageFormat::default(),
        }
    }
}

/// What a turn hands back to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    /// The candidate's utterance after speech correction.
    pub corrected_user_text: String,
    /// What the interviewer says next.
    pub reply: String,
}

impl TurnOutcome {
    fn new(corrected_user_text: &str, reply: impl Into<String>) -> Self {
        Self {
            corrected_user_text: corrected_user_text.to_string(),
            reply: reply.into(),
        }
    }
}

/// A retrieved passage that has not been shown in this session yet.
#[derive(Debug, Clone)]
struct Candidate {
    id: String,
    passage: Passage,
}

/// The interview state machine, shared by all sessions.
pub struct Interviewer {
    graph: Arc<KnowledgeGraph>,
    index: Arc<dyn RetrievalIndex>,
    llm: Arc<dyn LLMClient>,
    prompts: Prompts,
    sessions: SessionStore,
    settings: InterviewSettings,
}

impl Interviewer {
    pub fn new(
        graph: Arc<KnowledgeGraph>,
        index: Arc<dyn RetrievalIndex>,
        llm: Arc<dyn LLMClient>,
        prompts: Prompts,
        sessions: SessionStore,
        settings: InterviewSettings,
    ) -> Self {
        Self {
            graph,
            index,
            llm,
            prompts,
            sessions,
            settings,
        }
    }

    /// Current state of a session, if it exists.
    pub async fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let handle = self.sessions.get(session_id)?;
        let state = handle.lock().await;
        Some(state.snapshot())
    }

    /// Processes one candidate utterance and returns the corrected transcript
    /// with the interviewer's next utterance.
    ///
    /// Turns for the same session are serialized on the session's lock.
    #[instrument(name = "interview_turn", skip(self, utterance), fields(session_id = %session_id, model = %model))]
    pub async fn handle_turn(&self, session_id: &str, model: &str, utterance: &str) -> TurnOutcome {
        let handle = self.checkout(session_id).await;
        let mut session = handle.lock().await;
        session.touch();
        let outcome = self.step(&mut session, session_id, model, utterance).await;
        info!(stage = ?session.stage(), "Turn complete");
        outcome
    }

    /// A single free-form turn against a fine-tuned interviewer model, with no
    /// graph or outline guidance.
    #[instrument(name = "direct_turn", skip(self, utterance), fields(session_id = %session_id, model = %model))]
    pub async fn direct_turn(&self, session_id: &str, model: &str, utterance: &str) -> String {
        let handle = self.checkout(session_id).await;
        let mut session = handle.lock().await;
        session.touch();

        let turn = ChatTurn::new(TurnPurpose::Direct, model, utterance)
            .system(self.template(prompts::DIRECT_INTERVIEW))
            .memory(session_id);
        match self.ask(turn).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => DIRECT_FALLBACK.to_string(),
            Err(e) => {
                warn!(error = ?e, "Direct interview turn failed");
                DIRECT_FALLBACK.to_string()
            }
        }
    }

    /// Looks up the session and cleans up whatever the store evicted to make
    /// room. Evicted sessions stay locked until their memory is forgotten.
    async fn checkout(&self, session_id: &str) -> SessionHandle {
        let checkout = self.sessions.checkout(session_id);
        for eviction in checkout.evicted {
            debug!(evicted = %eviction.id(), "Dropping conversation memory of evicted session");
            self.llm.forget(eviction.id()).await;
            self.sessions.release(eviction);
        }
        checkout.session
    }

    async fn step(
        &self,
        session: &mut SessionState,
        session_id: &str,
        model: &str,
        utterance: &str,
    ) -> TurnOutcome {
        if session.is_finished() {
            return TurnOutcome::new(utterance, CLOSED_MESSAGE);
        }

        if session.outline_keywords_handled >= self.settings.keyword_threshold {
            info!(
                handled = session.outline_keywords_handled,
                "Keyword threshold reached; producing final report"
            );
            return self
                .finish_with_report(session, session_id, model, utterance)
                .await;
        }

        if utterance.trim().eq_ignore_ascii_case(START_SENTINEL) {
            info!("Start sentinel received; greeting candidate");
            session.stage = Stage::AwaitingBackground;
            session.last_question = GREETING.to_string();
            return TurnOutcome::new(utterance, GREETING);
        }

        let text = self.correct_transcript(session, model, utterance).await;

        match session.stage {
            // A session that skipped the handshake treats its first message as the background.
            Stage::New | Stage::AwaitingBackground => {
                self.plan_outline(session, session_id, model, &text).await
            }
            Stage::Looping => self.follow_up(session, session_id, model, &text).await,
            Stage::Finished => TurnOutcome::new(&text, CLOSED_MESSAGE),
        }
    }

    /// Repairs misrecognized technical terms using the last question as context.
    async fn correct_transcript(&self, session: &SessionState, model: &str, raw: &str) -> String {
        if session.last_question.is_empty() {
            return raw.to_string();
        }
        let turn = ChatTurn::new(TurnPurpose::Correction, model, raw)
            .system(self.template(prompts::SPEECH_CORRECTION))
            .param("lastQuestion", session.last_question.clone());
        match self.ask(turn).await {
            Ok(corrected) if !corrected.trim().is_empty() => {
                let corrected = corrected.trim().to_string();
                debug!(raw = %raw, corrected = %corrected, "Transcript corrected");
                corrected
            }
            Ok(_) => raw.to_string(),
            Err(e) => {
                warn!(error = ?e, "Speech correction failed; using raw transcript");
                raw.to_string()
            }
        }
    }

    /// Derives the outline from the candidate's background and asks the first question.
    async fn plan_outline(
        &self,
        session: &mut SessionState,
        session_id: &str,
        model: &str,
        background: &str,
    ) -> TurnOutcome {
        let entities = self
            .graph
            .all_entities()
            .iter()
            .take(self.settings.max_outline_entities)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let turn = ChatTurn::new(TurnPurpose::Outline, model, background)
            .system(self.template(prompts::OUTLINE_SELECTION))
            .param("entities", entities);
        let raw = match self.ask(turn).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = ?e, "Outline selection failed; continuing with an empty outline");
                String::new()
            }
        };

        let outline = parse_outline(&raw);
        info!(outline = ?outline, "Interview outline fixed");
        session.begin_loop(outline);
        self.advance_outline(session, session_id, model, background)
            .await
    }

    /// Follows the graph from the concept the candidate just talked about; falls
    /// back to the outline when no neighbor has an unused question.
    async fn follow_up(
        &self,
        session: &mut SessionState,
        session_id: &str,
        model: &str,
        answer: &str,
    ) -> TurnOutcome {
        let entity = self.extract_entity(model, answer).await;
        let neighbors = entity
            .as_deref()
            .map(|e| self.graph.neighbors_of(e))
            .unwrap_or_default();
        debug!(entity = ?entity, neighbors = ?neighbors, "Graph neighbors");

        for neighbor in &neighbors {
            if let Some(candidate) = self.find_unused(session, neighbor).await {
                debug!(
                    neighbor = %neighbor,
                    facts = ?self.graph.facts_about(neighbor),
                    "Graph hop found a new question"
                );
                return self
                    .compose(session, session_id, model, answer, candidate)
                    .await;
            }
        }

        debug!("Graph path exhausted; moving to the next outline entry");
        // The current entry has already produced a question.
        session.advance_outline();
        self.advance_outline(session, session_id, model, answer)
            .await
    }

    /// Walks the outline from the current index until an entry yields an unused
    /// question, or closes the interview when the outline runs out.
    async fn advance_outline(
        &self,
        session: &mut SessionState,
        session_id: &str,
        model: &str,
        user_text: &str,
    ) -> TurnOutcome {
        loop {
            let Some(entry) = session.current_outline_entry().map(str::to_string) else {
                info!(
                    outline_index = session.outline_index,
                    "Outline exhausted; closing interview"
                );
                return self
                    .finish_exhausted(session, session_id, model, user_text)
                    .await;
            };

            if let Some(candidate) = self.find_unused(session, &entry).await {
                session.outline_keywords_handled += 1;
                debug!(entry = %entry, handled = session.outline_keywords_handled, "Outline entry yielded a question");

                if session.outline_keywords_handled >= self.settings.keyword_threshold {
                    info!("Keyword threshold reached mid-turn; producing final report");
                    return self
                        .finish_with_report(session, session_id, model, user_text)
                        .await;
                }
                return self
                    .compose(session, session_id, model, user_text, candidate)
                    .await;
            }

            session.advance_outline();
        }
    }

    /// Searches the index and returns the first candidate not yet shown.
    ///
    /// Nothing is marked here; a candidate becomes used when it is composed
    /// into a reply.
    async fn find_unused(&self, session: &SessionState, query: &str) -> Option<Candidate> {
        let search = self.index.search(query, self.settings.top_k);
        let passages = match tokio::time::timeout(self.settings.call_timeout, search).await {
            Ok(Ok(passages)) => passages,
            Ok(Err(e)) => {
                warn!(error = ?e, query = %query, "Retrieval failed; treating as no result");
                return None;
            }
            Err(_) => {
                warn!(query = %query, "Retrieval timed out; treating as no result");
                return None;
            }
        };

        for (rank, passage) in passages.into_iter().enumerate() {
            let id = question_id(&passage, self.settings.id_prefix_chars);
            if session.used_question_ids.contains(&id) {
                debug!(query = %query, rank, id = %id, "Candidate already asked; skipping");
                continue;
            }
            debug!(query = %query, rank, id = %id, "Candidate selected");
            return Some(Candidate { id, passage });
        }
        debug!(query = %query, "Every candidate was already asked");
        None
    }

    /// Evaluates the previous answer and asks the candidate's question.
    async fn compose(
        &self,
        session: &mut SessionState,
        session_id: &str,
        model: &str,
        user_text: &str,
        candidate: Candidate,
    ) -> TurnOutcome {
        let (question, reference) = self
            .settings
            .passage_format
            .split(&candidate.passage.content);
        let expected = if session.last_expected_answer.is_empty() {
            NO_PRIOR_ANSWER.to_string()
        } else {
            session.last_expected_answer.clone()
        };

        let turn = ChatTurn::new(TurnPurpose::Composition, model, user_text)
            .system(self.template(prompts::COMPOSE_RESPONSE))
            .param("nextQ", question.clone())
            .param("expectedAnswer", expected)
            .memory(session_id);
        let reply = match self.ask(turn).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => format!("{} {}", COMPOSE_FALLBACK, question),
            Err(e) => {
                warn!(error = ?e, "Response composition failed; asking the raw question");
                format!("{} {}", COMPOSE_FALLBACK, question)
            }
        };

        session.used_question_ids.insert(candidate.id);
        session.last_expected_answer = reference;
        session.last_question = reply.clone();
        TurnOutcome::new(user_text, reply)
    }

    /// Closes the interview with a holistic report over the conversation so far.
    async fn finish_with_report(
        &self,
        session: &mut SessionState,
        session_id: &str,
        model: &str,
        user_text: &str,
    ) -> TurnOutcome {
        session.stage = Stage::Finished;
        let turn = ChatTurn::new(TurnPurpose::Report, model, user_text)
            .system(self.template(prompts::FINAL_REPORT))
            .memory(session_id);
        let report = match self.ask(turn).await {
            Ok(report) if !report.trim().is_empty() => report.trim().to_string(),
            Ok(_) => REPORT_FALLBACK.to_string(),
            Err(e) => {
                warn!(error = ?e, "Final report generation failed");
                REPORT_FALLBACK.to_string()
            }
        };
        session.last_question = report.clone();
        TurnOutcome::new(user_text, report)
    }

    /// Closes the interview because no outline entry has questions left.
    async fn finish_exhausted(
        &self,
        session: &mut SessionState,
        session_id: &str,
        model: &str,
        user_text: &str,
    ) -> TurnOutcome {
        session.stage = Stage::Finished;
        let turn = ChatTurn::new(TurnPurpose::Report, model, user_text)
            .system(self.template(prompts::CLOSING_SUMMARY))
            .memory(session_id);
        let reply = match self.ask(turn).await {
            Ok(summary) if !summary.trim().is_empty() => {
                format!("{}{}", EXHAUSTED_LEAD_IN, summary.trim())
            }
            Ok(_) => REPORT_FALLBACK.to_string(),
            Err(e) => {
                warn!(error = ?e, "Closing summary generation failed");
                REPORT_FALLBACK.to_string()
            }
        };
        session.last_question = reply.clone();
        TurnOutcome::new(user_text, reply)
    }

    /// Extracts the single core technical term from an answer.
    async fn extract_entity(&self, model: &str, answer: &str) -> Option<String> {
        let turn = ChatTurn::new(TurnPurpose::Extraction, model, answer)
            .system(self.template(prompts::ENTITY_EXTRACTION));
        match self.ask(turn).await {
            Ok(raw) => clean_entity(&raw),
            Err(e) => {
                warn!(error = ?e, "Entity extraction failed");
                None
            }
        }
    }

    /// Runs a chat turn under the configured timeout.
    async fn ask(&self, turn: ChatTurn) -> Result<String> {
        let purpose = turn.purpose;
        match tokio::time::timeout(self.settings.call_timeout, self.llm.chat(turn)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "{:?} call timed out after {:?}",
                purpose,
                self.settings.call_timeout
            )),
        }
    }

    fn template(&self, key: &str) -> String {
        match self.prompts.get(key) {
            Ok(template) => template.to_string(),
            Err(e) => {
                warn!(error = %e, "Using an empty system prompt");
                String::new()
            }
        }
    }
}

/// Stable identifier of a passage: its topic metadata, or else a trimmed
/// prefix of its content.
fn question_id(passage: &Passage, prefix_chars: usize) -> String {
    match passage.identifier.as_deref() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => passage
            .content
            .chars()
            .take(prefix_chars)
            .collect::<String>()
            .trim()
            .to_string(),
    }
}

/// Splits a model's comma-separated concept list into outline entries.
fn parse_outline(raw: &str) -> Vec<String> {
    let mut outline: Vec<String> = Vec::new();
    for item in raw.split([',', '，', '、', '\n']) {
        let item = strip_list_marker(item.trim())
            .trim()
            .trim_matches(['"', '\'', '`', '“', '”'])
            .trim();
        if !item.is_empty() && !outline.iter().any(|e| e == item) {
            outline.push(item.to_string());
        }
    }
    outline
}

/// Drops a leading `1.`, `2)`, `-` or `*` list marker.
fn strip_list_marker(item: &str) -> &str {
    let digits = item.len() - item.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        if let Some(rest) = item[digits..].strip_prefix(['.', ')']) {
            return rest;
        }
    }
    item.strip_prefix(['-', '*']).unwrap_or(item)
}

/// Reduces a model's extraction reply to a bare term, or `None`.
fn clean_entity(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut term = line;
    for prefix in ["Entity:", "entity:", "ENTITY:", "实体：", "实体:"] {
        if let Some(rest) = term.strip_prefix(prefix) {
            term = rest;
        }
    }
    let term = term
        .trim()
        .trim_matches([
            '"', '\'', '`', '“', '”', '.', '。', ',', '，', '(', ')', '（', '）', '[', ']', '*',
        ])
        .trim();
    if term.is_empty() || term.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(term.to_string())
    }
}
