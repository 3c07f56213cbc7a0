//! Command and ticket value objects for cross-card actions.
//!
//! # Responsibility
//! - Define the ephemeral command descriptors broadcast between cards.
//! - Define the two-phase preload/execute ticket shape and its lenient
//!   normalization rules.
//!
//! # Invariants
//! - A command id is `<cardId>:<display name>` and unique within one
//!   broadcast list.
//! - Malformed ticket values normalize to the zero ticket; they never fail
//!   the caller.

use crate::model::card::{CardId, JsonMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Builds one command id from its owner card and display name.
pub fn command_id(card_id: &str, name: &str) -> String {
    format!("{card_id}:{name}")
}

/// Splits a command id into `(card id, display name)`.
///
/// Card ids never contain `:`, so the first separator is authoritative.
pub fn split_command_id(id: &str) -> Option<(&str, &str)> {
    id.split_once(':')
}

/// Broadcast descriptor for one exposed command.
///
/// Ephemeral: rebuilt whenever the owning card's command list changes and
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// `<cardId>:<name>`.
    pub id: String,
    /// Card owning the executable behavior.
    pub target_card: CardId,
    /// Display label; embeds the owning card's current title.
    pub name: String,
}

impl CommandSpec {
    pub fn new(target_card: impl Into<CardId>, name: impl Into<String>) -> Self {
        let target_card = target_card.into();
        let name = name.into();
        Self {
            id: command_id(&target_card, &name),
            target_card,
            name,
        }
    }
}

/// Execution parameters handed from a command's preload phase to execute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub args: JsonMap,
}

impl Ticket {
    /// The safe substitute: zero duration, empty args.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Builds a ticket with args only.
    pub fn with_args(args: JsonMap) -> Self {
        Self {
            duration_ms: 0,
            args,
        }
    }

    /// Leniently parses a preload result into a ticket.
    ///
    /// `Null` means "no preload provided" and yields the zero ticket.
    /// Objects may omit either field; wrong field types or non-object shapes
    /// are malformed and yield `None` so the caller can log before
    /// substituting `Ticket::zero()`.
    pub fn from_value(value: &Value) -> Option<Ticket> {
        match value {
            Value::Null => Some(Ticket::zero()),
            Value::Object(map) => {
                let duration_ms = match map.get("duration_ms") {
                    None => 0,
                    Some(Value::Number(number)) => number.as_u64()?,
                    Some(_) => return None,
                };
                let args = match map.get("args") {
                    None => JsonMap::new(),
                    Some(Value::Object(args)) => args.clone(),
                    Some(_) => return None,
                };
                Some(Ticket { duration_ms, args })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{command_id, split_command_id, CommandSpec, Ticket};
    use serde_json::json;

    #[test]
    fn command_id_round_trips_through_split() {
        let id = command_id("sound-1", "Play Rain");
        assert_eq!(split_command_id(&id), Some(("sound-1", "Play Rain")));
    }

    #[test]
    fn split_uses_first_separator_for_names_with_colons() {
        assert_eq!(
            split_command_id("timer-2:Start: round one"),
            Some(("timer-2", "Start: round one"))
        );
    }

    #[test]
    fn spec_embeds_owner_and_name_in_id() {
        let spec = CommandSpec::new("sound-9", "Play Alarm");
        assert_eq!(spec.id, "sound-9:Play Alarm");
        assert_eq!(spec.target_card, "sound-9");
    }

    #[test]
    fn null_preload_value_is_the_zero_ticket() {
        let ticket = Ticket::from_value(&json!(null)).expect("null normalizes");
        assert_eq!(ticket, Ticket::zero());
    }

    #[test]
    fn object_value_parses_with_missing_fields_defaulted() {
        let ticket = Ticket::from_value(&json!({"duration_ms": 1200}))
            .expect("partial object normalizes");
        assert_eq!(ticket.duration_ms, 1200);
        assert!(ticket.args.is_empty());
    }

    #[test]
    fn malformed_shapes_are_reported_for_substitution() {
        assert!(Ticket::from_value(&json!("not a ticket")).is_none());
        assert!(Ticket::from_value(&json!({"duration_ms": "soon"})).is_none());
        assert!(Ticket::from_value(&json!({"args": 5})).is_none());
    }
}
