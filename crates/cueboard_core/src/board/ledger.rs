//! Playback bookkeeping and priority ducking.
//!
//! # Responsibility
//! - Track which cards are audible and at what base gain.
//! - Attenuate non-priority playbacks while any priority playback is live.
//!
//! # Invariants
//! - The ledger is the single owner of effective gains; card records keep
//!   base volumes only.
//! - Gains are restored as soon as the last priority playback ends.

use crate::host::{AudioOutput, PlaybackRequest};
use crate::model::card::CardId;
use std::collections::BTreeMap;

/// Attenuation applied to non-priority playbacks while priority audio runs.
pub const PRIORITY_DUCK_FACTOR: f64 = 0.25;

#[derive(Debug, Clone, Copy)]
struct ActivePlayback {
    base_gain: f64,
    priority: bool,
}

/// Active playback set with ducking math.
#[derive(Debug, Default)]
pub struct PlaybackLedger {
    active: BTreeMap<CardId, ActivePlayback>,
}

impl PlaybackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_ducking(&self) -> bool {
        self.active.values().any(|playback| playback.priority)
    }

    fn effective_gain(&self, playback: ActivePlayback) -> f64 {
        if !playback.priority && self.is_ducking() {
            playback.base_gain * PRIORITY_DUCK_FACTOR
        } else {
            playback.base_gain
        }
    }

    /// Starts (or retriggers) one playback and reconciles everyone's gain.
    pub fn start(&mut self, request: PlaybackRequest, audio: &mut dyn AudioOutput) {
        let entry = ActivePlayback {
            base_gain: request.gain,
            priority: request.priority,
        };
        self.active.insert(request.card_id.clone(), entry);

        let effective = self.effective_gain(entry);
        audio.play(&PlaybackRequest {
            gain: effective,
            ..request.clone()
        });
        self.reapply_gains(audio, Some(&request.card_id));
    }

    /// Explicit stop for one card.
    pub fn stop(&mut self, card_id: &str, audio: &mut dyn AudioOutput) {
        audio.stop(card_id);
        if self.active.remove(card_id).is_some() {
            self.reapply_gains(audio, None);
        }
    }

    /// Natural end-of-file notification from the shell.
    pub fn finished(&mut self, card_id: &str, audio: &mut dyn AudioOutput) {
        if self.active.remove(card_id).is_some() {
            self.reapply_gains(audio, None);
        }
    }

    pub fn stop_all(&mut self, audio: &mut dyn AudioOutput) {
        audio.stop_all();
        self.active.clear();
    }

    fn reapply_gains(&self, audio: &mut dyn AudioOutput, except: Option<&str>) {
        for (card_id, playback) in &self.active {
            if Some(card_id.as_str()) == except {
                continue;
            }
            audio.set_gain(card_id, self.effective_gain(*playback));
        }
    }
}
