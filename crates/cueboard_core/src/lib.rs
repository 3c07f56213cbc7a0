//! Core domain logic for Cueboard.
//! This crate is the single source of truth for board business invariants.

pub mod board;
pub mod card;
pub mod command;
pub mod host;
pub mod layout;
pub mod logging;
pub mod model;
pub mod render;
pub mod store;
pub mod transfer;

pub use board::{BoardError, BoardManager, BoardPhase, BoardResult};
pub use card::{registry, Card, CardEffect, CardError, CardVariant, CardView, CommandDecl};
pub use command::{CommandSpec, Ticket};
pub use host::{
    AudioOutput, BoardContext, BoardHost, FixedBoardContext, MediaProbe, PlaybackRequest,
    SilentHost,
};
pub use layout::{LayoutNode, LayoutTree, NodeKind};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::card::{CardData, CardId, CardKind, CardRecord, JsonMap};
pub use render::{DropOutcome, DropRequest, GridRenderer, RenderPass};
pub use store::{
    open_store, open_store_in_memory, MemoryStore, Partition, SqliteStore, StorageGateway,
    StoreError, StoreResult,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
