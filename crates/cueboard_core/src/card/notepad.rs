//! Notepad card.
//!
//! The simplest variant: free text, no commands, no runtime resources. It
//! exercises every default of the card contract.

use super::CardVariant;
use crate::model::card::{CardData, CardKind, CardRecord};

pub const NOTEPAD_TEMPLATE: &str = "card-notepad";

const PREVIEW_MAX_CHARS: usize = 80;

#[derive(Debug, Default)]
pub struct NotepadCard;

impl NotepadCard {
    pub fn new() -> Self {
        Self
    }
}

impl CardVariant for NotepadCard {
    fn kind(&self) -> CardKind {
        CardKind::Notepad
    }

    fn template(&self) -> Option<&'static str> {
        Some(NOTEPAD_TEMPLATE)
    }

    fn view_detail(&self, record: &CardRecord) -> String {
        let CardData::Notepad(data) = &record.data else {
            return String::new();
        };
        let first_line = data.text.lines().next().unwrap_or("");
        let mut preview: String = first_line.chars().take(PREVIEW_MAX_CHARS).collect();
        if first_line.chars().count() > PREVIEW_MAX_CHARS {
            preview.push_str("...");
        }
        preview
    }
}
