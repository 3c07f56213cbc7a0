//! Shell-facing collaborator contracts.
//!
//! # Responsibility
//! - Define the interfaces the core consumes from its embedding shell:
//!   audio output, media probing, confirmation prompts, board identity.
//! - Ship inert baseline implementations for embedding and tests.
//!
//! # Invariants
//! - The core never talks to platform audio/UI directly; everything goes
//!   through these traits.

use crate::model::card::CardId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Playback parameters handed to the audio output.
///
/// `gain` is the effective value after ducking; the base volume stays in
/// the card record.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub card_id: CardId,
    pub file_name: String,
    pub gain: f64,
    pub rate: f64,
    pub looped: bool,
    pub priority: bool,
}

/// Audio playback surface provided by the shell.
///
/// At most one playback is addressed per card id; starting a new one for
/// the same card replaces the previous.
pub trait AudioOutput {
    fn play(&mut self, request: &PlaybackRequest);
    fn stop(&mut self, card_id: &str);
    /// Adjusts the gain of an already-running playback.
    fn set_gain(&mut self, card_id: &str, gain: f64);
    fn stop_all(&mut self);
}

/// Errors from duration probing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The shell cannot decode this payload at all.
    Unsupported(String),
    /// Decoding started and failed.
    Failed(String),
}

impl Display for ProbeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported(name) => write!(f, "unsupported media file: {name}"),
            Self::Failed(message) => write!(f, "media probe failed: {message}"),
        }
    }
}

impl Error for ProbeError {}

/// Decodes audio payload metadata on behalf of the migration queue.
pub trait MediaProbe {
    fn probe_duration_ms(&mut self, file_name: &str, bytes: &[u8]) -> Result<u64, ProbeError>;
}

/// External board identity resolution (URL routing stays outside the core).
pub trait BoardContext {
    fn board_id(&self) -> String;
}

/// Combined shell surface passed into board manager entry points.
pub trait BoardHost {
    fn audio(&mut self) -> &mut dyn AudioOutput;
    fn probe(&mut self) -> &mut dyn MediaProbe;
    /// Modal confirmation for destructive operations.
    fn confirm(&mut self, message: &str) -> bool;
}

/// Audio output that swallows every request.
#[derive(Debug, Default)]
pub struct NullAudioOutput;

impl AudioOutput for NullAudioOutput {
    fn play(&mut self, _request: &PlaybackRequest) {}
    fn stop(&mut self, _card_id: &str) {}
    fn set_gain(&mut self, _card_id: &str, _gain: f64) {}
    fn stop_all(&mut self) {}
}

/// Probe that reports every payload as unsupported.
#[derive(Debug, Default)]
pub struct NullProbe;

impl MediaProbe for NullProbe {
    fn probe_duration_ms(&mut self, file_name: &str, _bytes: &[u8]) -> Result<u64, ProbeError> {
        Err(ProbeError::Unsupported(file_name.to_string()))
    }
}

/// Fixed board identity for embedding without URL routing.
#[derive(Debug, Clone)]
pub struct FixedBoardContext(pub String);

impl BoardContext for FixedBoardContext {
    fn board_id(&self) -> String {
        self.0.clone()
    }
}

/// Baseline host: silent audio, no probing, fixed prompt answer.
#[derive(Debug, Default)]
pub struct SilentHost {
    audio: NullAudioOutput,
    probe: NullProbe,
    /// Answer returned for every confirmation prompt.
    pub accept_prompts: bool,
}

impl SilentHost {
    pub fn accepting() -> Self {
        Self {
            accept_prompts: true,
            ..Self::default()
        }
    }
}

impl BoardHost for SilentHost {
    fn audio(&mut self) -> &mut dyn AudioOutput {
        &mut self.audio
    }

    fn probe(&mut self) -> &mut dyn MediaProbe {
        &mut self.probe
    }

    fn confirm(&mut self, _message: &str) -> bool {
        self.accept_prompts
    }
}
