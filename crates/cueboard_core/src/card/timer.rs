//! Timer card.
//!
//! # Responsibility
//! - Run countdown/stopwatch state over explicit `tick` calls.
//! - Fire bound start/end sound commands through the two-phase protocol.
//!
//! # Invariants
//! - Time never advances outside `tick(now)`; there is no hidden clock.
//! - A countdown fires its end binding exactly once per elapse.
//! - Stopwatch mode never fires the end binding.

use super::{CardEffect, CardVariant, CommandDecl};
use crate::command::Ticket;
use crate::model::card::{CardData, CardKind, CardRecord, JsonMap, TimerData, TimerMode};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

pub const TIMER_TEMPLATE: &str = "card-timer";

pub const ACTION_START: &str = "start";
pub const ACTION_PAUSE: &str = "pause";
pub const ACTION_RESET: &str = "reset";

pub fn start_command_name(title: &str) -> String {
    format!("Start {title}")
}

pub fn pause_command_name(title: &str) -> String {
    format!("Pause {title}")
}

pub fn reset_command_name(title: &str) -> String {
    format!("Reset {title}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running {
        started_at: Instant,
        /// `None` while counting up (stopwatch).
        ends_at: Option<Instant>,
    },
    Paused {
        elapsed: Duration,
    },
}

/// Timer card runtime state.
#[derive(Debug)]
pub struct TimerCard {
    state: RunState,
}

impl Default for TimerCard {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
        }
    }
}

impl TimerCard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running { .. })
    }
}

fn timer_data(record: &CardRecord) -> Option<&TimerData> {
    match &record.data {
        CardData::Timer(data) => Some(data),
        _ => None,
    }
}

fn binding_effect(binding: &Option<String>) -> Option<CardEffect> {
    binding.as_ref().map(|command_id| CardEffect::RunCommand {
        command_id: command_id.clone(),
        options: JsonMap::new(),
    })
}

impl CardVariant for TimerCard {
    fn kind(&self) -> CardKind {
        CardKind::Timer
    }

    fn template(&self) -> Option<&'static str> {
        Some(TIMER_TEMPLATE)
    }

    fn register_commands(&self, record: &CardRecord) -> Vec<CommandDecl> {
        vec![
            CommandDecl {
                action: ACTION_START,
                name: start_command_name(&record.title),
                preload: true,
                execute: true,
            },
            CommandDecl {
                action: ACTION_PAUSE,
                name: pause_command_name(&record.title),
                preload: false,
                execute: true,
            },
            CommandDecl {
                action: ACTION_RESET,
                name: reset_command_name(&record.title),
                preload: false,
                execute: true,
            },
        ]
    }

    fn preload(&self, record: &CardRecord, action: &str, _options: &JsonMap) -> Value {
        if action != ACTION_START {
            return Value::Null;
        }
        let Some(data) = timer_data(record) else {
            return Value::Null;
        };
        json!({ "duration_ms": data.duration_ms, "args": {} })
    }

    fn execute(
        &mut self,
        record: &mut CardRecord,
        action: &str,
        _ticket: &Ticket,
        now: Instant,
    ) -> Vec<CardEffect> {
        let Some(data) = timer_data(record) else {
            return Vec::new();
        };

        match action {
            ACTION_START => {
                let ends_at = match data.mode {
                    TimerMode::Countdown => {
                        Some(now + Duration::from_millis(data.duration_ms))
                    }
                    TimerMode::Stopwatch => None,
                };
                self.state = RunState::Running {
                    started_at: now,
                    ends_at,
                };
                binding_effect(&data.start_command).into_iter().collect()
            }
            ACTION_PAUSE => {
                if let RunState::Running { started_at, .. } = self.state {
                    self.state = RunState::Paused {
                        elapsed: now.saturating_duration_since(started_at),
                    };
                }
                Vec::new()
            }
            ACTION_RESET => {
                self.state = RunState::Idle;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn tick(&mut self, record: &CardRecord, now: Instant) -> Vec<CardEffect> {
        let Some(data) = timer_data(record) else {
            return Vec::new();
        };
        let RunState::Running {
            ends_at: Some(ends_at),
            ..
        } = self.state
        else {
            return Vec::new();
        };
        if now < ends_at {
            return Vec::new();
        }

        self.state = if data.looped {
            RunState::Running {
                started_at: now,
                ends_at: Some(now + Duration::from_millis(data.duration_ms)),
            }
        } else {
            RunState::Idle
        };

        binding_effect(&data.end_command).into_iter().collect()
    }

    fn view_detail(&self, record: &CardRecord) -> String {
        let Some(data) = timer_data(record) else {
            return String::new();
        };
        let mode = match data.mode {
            TimerMode::Countdown => "countdown",
            TimerMode::Stopwatch => "stopwatch",
        };
        let state = match self.state {
            RunState::Idle => "idle",
            RunState::Running { .. } => "running",
            RunState::Paused { .. } => "paused",
        };
        format!("{mode} {}s, {state}", data.duration_ms / 1000)
    }

    fn destroy(&mut self, _record: &CardRecord) -> Vec<CardEffect> {
        self.state = RunState::Idle;
        Vec::new()
    }
}
