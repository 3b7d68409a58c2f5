//! Speech adapters used by the transport layer to turn audio into candidate
//! text and interviewer replies back into audio. The interviewer itself only
//! ever sees text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::error;

/// Text returned to the interviewer when transcription fails.
pub const TRANSCRIPTION_FAILED: &str = "(speech recognition failed)";

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String>;
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Transcribes audio, degrading to [`TRANSCRIPTION_FAILED`] on error.
pub async fn transcribe_or_placeholder(
    stt: &dyn SpeechToText,
    audio: Vec<u8>,
    file_name: &str,
) -> String {
    match stt.transcribe(audio, file_name).await {
        Ok(text) => text,
        Err(e) => {
            error!(error = ?e, "Speech-to-text failed");
            TRANSCRIPTION_FAILED.to_string()
        }
    }
}

/// Synthesizes speech, degrading to empty audio on error.
pub async fn synthesize_or_silence(tts: &dyn TextToSpeech, text: &str) -> Vec<u8> {
    match tts.synthesize(text).await {
        Ok(audio) => audio,
        Err(e) => {
            error!(error = ?e, "Text-to-speech failed");
            Vec::new()
        }
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Whisper-style transcription endpoint taking a multipart `file` upload.
pub struct HttpSpeechToText {
    client: reqwest::Client,
    url: String,
}

impl HttpSpeechToText {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl SpeechToText for HttpSpeechToText {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String> {
        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio).file_name(file_name.to_string()),
            )
            .text("model", "base");

        let response: TranscriptionResponse = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("Malformed transcription response")?;
        Ok(response.text)
    }
}

/// TTS bridge answering `GET {url}?text=...` with raw audio bytes.
pub struct HttpTextToSpeech {
    client: reqwest::Client,
    url: String,
}

impl HttpTextToSpeech {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl TextToSpeech for HttpTextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let bytes = self
            .client
            .get(&self.url)
            .query(&[("text", text)])
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct Broken;

    #[async_trait]
    impl SpeechToText for Broken {
        async fn transcribe(&self, _audio: Vec<u8>, _file_name: &str) -> Result<String> {
            Err(anyhow!("connection refused"))
        }
    }

    #[async_trait]
    impl TextToSpeech for Broken {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
            Err(anyhow!("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_failures_degrade() {
        assert_eq!(
            transcribe_or_placeholder(&Broken, vec![1, 2, 3], "a.wav").await,
            TRANSCRIPTION_FAILED
        );
        assert!(synthesize_or_silence(&Broken, "hello").await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_endpoints_are_errors() {
        let stt = HttpSpeechToText::new("http://127.0.0.1:9/asr");
        assert!(stt.transcribe(vec![0], "a.wav").await.is_err());
        let tts = HttpTextToSpeech::new("http://127.0.0.1:9/tts");
        assert!(tts.synthesize("hi").await.is_err());
    }
}
