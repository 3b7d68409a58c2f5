//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the interviewer and the speech adapters.

use crate::config::Config;
use interviewer_core::{
    Interviewer,
    speech::{SpeechToText, TextToSpeech},
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub interviewer: Arc<Interviewer>,
    /// Absent when no transcription service is configured.
    pub stt: Option<Arc<dyn SpeechToText>>,
    /// Absent when no synthesis service is configured.
    pub tts: Option<Arc<dyn TextToSpeech>>,
    pub config: Arc<Config>,
}
