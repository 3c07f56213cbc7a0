//! Static card factory registry.
//!
//! # Responsibility
//! - Resolve a card type tag to its factory (default data + variant
//!   constructor).
//! - Keep the "lazy by type" ergonomics as an implementation detail of a
//!   compile-time table.
//!
//! # Invariants
//! - The table covers the closed `CardKind` set; unknown string tags log
//!   and resolve to the no-implementation sentinel (`None`).
//! - Resolution never fails loudly; callers must handle an absent factory
//!   before use.

use super::notepad::NotepadCard;
use super::sound::SoundCard;
use super::timer::TimerCard;
use super::CardVariant;
use crate::model::card::{CardData, CardKind};
use log::{error, warn};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// Constructor bundle for one card kind.
pub struct CardFactory {
    pub kind: CardKind,
    /// Default persisted payload; its tag must equal `kind`.
    pub default_data: fn() -> CardData,
    pub build: fn() -> Box<dyn CardVariant>,
}

static FACTORIES: Lazy<BTreeMap<CardKind, CardFactory>> = Lazy::new(|| {
    let mut table = BTreeMap::new();
    table.insert(
        CardKind::Sound,
        CardFactory {
            kind: CardKind::Sound,
            default_data: || CardData::default_for(CardKind::Sound),
            build: || Box::new(SoundCard::new()),
        },
    );
    table.insert(
        CardKind::Timer,
        CardFactory {
            kind: CardKind::Timer,
            default_data: || CardData::default_for(CardKind::Timer),
            build: || Box::new(TimerCard::new()),
        },
    );
    table.insert(
        CardKind::Notepad,
        CardFactory {
            kind: CardKind::Notepad,
            default_data: || CardData::default_for(CardKind::Notepad),
            build: || Box::new(NotepadCard::new()),
        },
    );
    table
});

/// Resolves one kind to its factory.
pub fn resolve(kind: CardKind) -> Option<&'static CardFactory> {
    let factory = FACTORIES.get(&kind);
    if factory.is_none() {
        // A kind outside the table means a variant was added without
        // registration; surface it instead of panicking mid-load.
        error!("event=registry_resolve module=card status=missing kind={kind}");
    }
    factory
}

/// Resolves one string tag; unknown tags log and return `None`.
pub fn resolve_tag(tag: &str) -> Option<&'static CardFactory> {
    match CardKind::parse(tag) {
        Some(kind) => resolve(kind),
        None => {
            warn!("event=registry_resolve module=card status=unknown_tag tag={tag}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve, resolve_tag};
    use crate::model::card::CardKind;

    #[test]
    fn every_kind_resolves_with_matching_default_data() {
        for kind in CardKind::all() {
            let factory = resolve(*kind).expect("known kind resolves");
            assert_eq!(factory.kind, *kind);
            assert_eq!((factory.default_data)().kind(), *kind);
            assert_eq!((factory.build)().kind(), *kind);
        }
    }

    #[test]
    fn unknown_tag_resolves_to_sentinel() {
        assert!(resolve_tag("webcam").is_none());
        assert!(resolve_tag("").is_none());
    }

    #[test]
    fn known_tags_resolve() {
        assert!(resolve_tag("sound").is_some());
        assert!(resolve_tag("timer").is_some());
        assert!(resolve_tag("notepad").is_some());
    }
}
