use anyhow::{Context, Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// What a chat turn is for. Used for logging and to tell turns apart in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPurpose {
    Correction,
    Outline,
    Extraction,
    Composition,
    Report,
    Direct,
}

/// A single templated chat turn.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub purpose: TurnPurpose,
    pub model: String,
    /// System prompt with `{name}` placeholders filled from `params`.
    pub system_template: String,
    pub params: Vec<(String, String)>,
    pub user_message: String,
    /// When set, prior turns recorded under this key are replayed as context.
    pub memory_key: Option<String>,
}

impl ChatTurn {
    pub fn new(purpose: TurnPurpose, model: &str, user_message: impl Into<String>) -> Self {
        Self {
            purpose,
            model: model.to_string(),
            system_template: String::new(),
            params: Vec::new(),
            user_message: user_message.into(),
            memory_key: None,
        }
    }

    pub fn system(mut self, template: impl Into<String>) -> Self {
        self.system_template = template.into();
        self
    }

    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    pub fn memory(mut self, key: &str) -> Self {
        self.memory_key = Some(key.to_string());
        self
    }

    /// The system template with every `{name}` placeholder substituted.
    pub fn rendered_system(&self) -> String {
        render_template(&self.system_template, &self.params)
    }
}

/// Substitutes `{name}` placeholders. Unknown placeholders are left as-is.
pub fn render_template(template: &str, params: &[(String, String)]) -> String {
    params
        .iter()
        .fold(template.to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{}}}", name), value)
        })
}

/// A generic client for interacting with an LLM.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Runs one chat turn and returns the assistant's text.
    async fn chat(&self, turn: ChatTurn) -> Result<String>;

    /// Drops the conversation history recorded under `memory_key`.
    async fn forget(&self, memory_key: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Role {
    User,
    Assistant,
}

/// Conversation history per memory key. Each key keeps at most `window`
/// messages; older ones are dropped as new exchanges are recorded.
pub struct ConversationMemory {
    window: usize,
    histories: Mutex<HashMap<String, Vec<(Role, String)>>>,
}

impl ConversationMemory {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            histories: Mutex::new(HashMap::new()),
        }
    }

    async fn recent(&self, key: &str) -> Vec<(Role, String)> {
        let histories = self.histories.lock().await;
        histories
            .get(key)
            .map(|h| h[h.len().saturating_sub(self.window)..].to_vec())
            .unwrap_or_default()
    }

    async fn record(&self, key: &str, user: &str, assistant: &str) {
        let mut histories = self.histories.lock().await;
        let history = histories.entry(key.to_string()).or_default();
        history.push((Role::User, user.to_string()));
        history.push((Role::Assistant, assistant.to_string()));
        let excess = history.len().saturating_sub(self.window);
        history.drain(..excess);
    }

    async fn forget(&self, key: &str) {
        self.histories.lock().await.remove(key);
    }

    pub async fn len(&self, key: &str) -> usize {
        self.histories
            .lock()
            .await
            .get(key)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// An implementation of `LLMClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    memory: ConversationMemory,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `memory_window` - How many recorded messages are replayed for memory-scoped turns.
    pub fn new(config: OpenAIConfig, memory_window: usize) -> Self {
        Self {
            client: Client::with_config(config),
            memory: ConversationMemory::new(memory_window),
        }
    }

    async fn build_messages(&self, turn: &ChatTurn) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();
        let system = turn.rendered_system();
        if !system.trim().is_empty() {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()?
                    .into(),
            );
        }
        if let Some(key) = &turn.memory_key {
            for (role, content) in self.memory.recent(key).await {
                match role {
                    Role::User => messages.push(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(content)
                            .build()?
                            .into(),
                    ),
                    Role::Assistant => messages.push(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .content(content)
                            .build()?
                            .into(),
                    ),
                }
            }
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(turn.user_message.clone())
                .build()?
                .into(),
        );
        Ok(messages)
    }
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn chat(&self, turn: ChatTurn) -> Result<String> {
        let messages = self.build_messages(&turn).await?;
        debug!(purpose = ?turn.purpose, model = %turn.model, messages = messages.len(), "Sending chat turn");

        let request = CreateChatCompletionRequestArgs::default()
            .model(&turn.model)
            .messages(messages)
            .build()?;

        let response: CreateChatCompletionResponse = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .context("No response choice from LLM")?
            .message
            .content
            .clone()
            .ok_or_else(|| anyhow!("LLM response had no text content."))?;

        if let Some(key) = &turn.memory_key {
            self.memory.record(key, &turn.user_message, &content).await;
        }
        Ok(content)
    }

    async fn forget(&self, memory_key: &str) {
        self.memory.forget(memory_key).await;
    }
}
