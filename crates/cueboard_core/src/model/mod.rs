//! Canonical persisted data model for board cards.
//!
//! # Responsibility
//! - Define the card record shapes shared by all card variants.
//! - Keep one storage shape per card type so records round-trip as plain
//!   JSON documents through the storage gateway.
//!
//! # Invariants
//! - Every card is identified by a stable, type-prefixed `CardId`.
//! - A card's `id` prefix always agrees with its `type` tag.

pub mod card;
