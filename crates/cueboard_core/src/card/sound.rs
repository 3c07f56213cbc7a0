//! Sound button card.
//!
//! # Responsibility
//! - Expose play/stop commands over the card's uploaded file list.
//! - Describe playback through effects; the shell's audio output and the
//!   manager's ledger do the actual work.
//!
//! # Invariants
//! - Preload never mutates selection state; sequential advance happens in
//!   execute only.
//! - Cards with an empty file list degrade to the zero ticket and produce
//!   no playback effects.

use super::{CardEffect, CardVariant, CommandDecl, ProbeTask};
use crate::command::{command_id, Ticket};
use crate::host::PlaybackRequest;
use crate::model::card::{CardData, CardKind, CardRecord, JsonMap, SoundData};
use log::debug;
use rand::Rng;
use serde_json::{json, Value};
use std::time::Instant;

pub const SOUND_TEMPLATE: &str = "card-sound";

pub const ACTION_PLAY: &str = "play";
pub const ACTION_STOP: &str = "stop";

/// Display name of the play command for one title.
pub fn play_command_name(title: &str) -> String {
    format!("Play {title}")
}

/// Display name of the stop command for one title.
pub fn stop_command_name(title: &str) -> String {
    format!("Stop {title}")
}

/// Sound card runtime state.
#[derive(Debug, Default)]
pub struct SoundCard {
    /// Next sequential file index (ignored while shuffling).
    next_index: usize,
}

impl SoundCard {
    pub fn new() -> Self {
        Self::default()
    }

    fn pick_index(&self, data: &SoundData) -> Option<usize> {
        if data.files.is_empty() {
            return None;
        }
        if data.shuffle {
            Some(rand::thread_rng().gen_range(0..data.files.len()))
        } else {
            Some(self.next_index % data.files.len())
        }
    }
}

fn sound_data(record: &CardRecord) -> Option<&SoundData> {
    match &record.data {
        CardData::Sound(data) => Some(data),
        _ => None,
    }
}

impl CardVariant for SoundCard {
    fn kind(&self) -> CardKind {
        CardKind::Sound
    }

    fn template(&self) -> Option<&'static str> {
        Some(SOUND_TEMPLATE)
    }

    fn register_commands(&self, record: &CardRecord) -> Vec<CommandDecl> {
        vec![
            CommandDecl {
                action: ACTION_PLAY,
                name: play_command_name(&record.title),
                preload: true,
                execute: true,
            },
            // Stop needs no parameters; it deliberately skips the preload
            // phase and rides the zero ticket.
            CommandDecl {
                action: ACTION_STOP,
                name: stop_command_name(&record.title),
                preload: false,
                execute: true,
            },
        ]
    }

    fn preload(&self, record: &CardRecord, action: &str, options: &JsonMap) -> Value {
        if action != ACTION_PLAY {
            return Value::Null;
        }
        let Some(data) = sound_data(record) else {
            return Value::Null;
        };
        let Some(index) = self.pick_index(data) else {
            return Value::Null;
        };
        let file = &data.files[index];

        let mut args = JsonMap::new();
        args.insert("file".to_string(), json!(file.name));
        args.insert("gain".to_string(), json!(data.volume));
        args.insert("rate".to_string(), json!(data.playback_rate));
        // Caller options win over derived defaults (e.g. a ducked gain).
        for (key, value) in options {
            args.insert(key.clone(), value.clone());
        }

        json!({
            "duration_ms": file.duration_ms.unwrap_or(0),
            "args": Value::Object(args),
        })
    }

    fn execute(
        &mut self,
        record: &mut CardRecord,
        action: &str,
        ticket: &Ticket,
        _now: Instant,
    ) -> Vec<CardEffect> {
        let Some(data) = sound_data(record) else {
            return Vec::new();
        };

        match action {
            ACTION_PLAY => {
                if data.files.is_empty() {
                    debug!(
                        "event=sound_play module=card status=skipped reason=no_files card={}",
                        record.id
                    );
                    return Vec::new();
                }

                let requested = ticket.args.get("file").and_then(Value::as_str);
                let index = requested
                    .and_then(|name| data.files.iter().position(|file| file.name == name))
                    .or_else(|| self.pick_index(data))
                    .unwrap_or(0);
                if !data.shuffle {
                    self.next_index = index + 1;
                }

                let file = &data.files[index];
                let gain = ticket
                    .args
                    .get("gain")
                    .and_then(Value::as_f64)
                    .unwrap_or(data.volume);
                let rate = ticket
                    .args
                    .get("rate")
                    .and_then(Value::as_f64)
                    .unwrap_or(data.playback_rate);

                vec![CardEffect::StartPlayback(PlaybackRequest {
                    card_id: record.id.clone(),
                    file_name: file.name.clone(),
                    gain,
                    rate,
                    looped: data.looped,
                    priority: data.priority,
                })]
            }
            ACTION_STOP => vec![CardEffect::StopPlayback {
                card_id: record.id.clone(),
            }],
            _ => Vec::new(),
        }
    }

    fn attach(&mut self, record: &CardRecord) -> Vec<CardEffect> {
        let Some(data) = sound_data(record) else {
            return Vec::new();
        };
        let mut effects = Vec::new();

        for file in &data.files {
            if file.duration_ms.is_none() {
                effects.push(CardEffect::ScheduleProbe(ProbeTask {
                    card_id: record.id.clone(),
                    file_name: file.name.clone(),
                }));
            }
        }

        if data.autoplay {
            effects.push(CardEffect::RunCommand {
                command_id: command_id(&record.id, &play_command_name(&record.title)),
                options: JsonMap::new(),
            });
        }

        effects
    }

    fn view_detail(&self, record: &CardRecord) -> String {
        let Some(data) = sound_data(record) else {
            return String::new();
        };
        let mut flags = Vec::new();
        if data.shuffle {
            flags.push("shuffle");
        }
        if data.looped {
            flags.push("loop");
        }
        if data.priority {
            flags.push("priority");
        }
        let suffix = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        format!(
            "{} file(s), vol {:.0}%{}",
            data.files.len(),
            data.volume * 100.0,
            suffix
        )
    }

    fn destroy(&mut self, record: &CardRecord) -> Vec<CardEffect> {
        vec![CardEffect::StopPlayback {
            card_id: record.id.clone(),
        }]
    }
}
