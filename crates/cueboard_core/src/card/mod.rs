//! Card base lifecycle and command dispatch.
//!
//! # Responsibility
//! - Implement the generic card contract shared by every variant:
//!   construction merge, persistence, command registration/rebuild, safe
//!   preload/execute dispatch, destruction.
//! - Define the `CardVariant` capability set concrete kinds implement.
//!
//! # Invariants
//! - A card cannot exist without a resolved template; template resolution
//!   failure aborts construction.
//! - The command list is rebuilt on construction and on every title change,
//!   because display names embed the title.
//! - Command faults (unknown id, malformed ticket, partially-defined
//!   command) degrade to safe defaults and are logged, never raised.

use crate::command::{command_id, CommandSpec, Ticket};
use crate::host::PlaybackRequest;
use crate::model::card::{
    merge_patch, mint_card_id, record_from_map, record_to_map, CardData, CardDataError, CardId,
    CardKind, CardRecord, CardValidationError, JsonMap,
};
use crate::store::{StorageGateway, StoreError};
use log::warn;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub mod notepad;
pub mod registry;
pub mod sound;
pub mod timer;

pub use registry::CardFactory;

pub type CardResult<T> = Result<T, CardError>;

/// Errors from card lifecycle operations.
#[derive(Debug)]
pub enum CardError {
    /// The variant has no visual template; the card cannot exist.
    MissingTemplate(CardKind),
    /// A factory's default data disagrees with its registered kind.
    DefaultDataKind { factory: CardKind, data: CardKind },
    Validation(CardValidationError),
    Data(CardDataError),
    Store(StoreError),
}

impl Display for CardError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTemplate(kind) => {
                write!(f, "card kind `{kind}` has no template")
            }
            Self::DefaultDataKind { factory, data } => write!(
                f,
                "factory for `{factory}` produced default data of kind `{data}`"
            ),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Data(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CardError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Data(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CardValidationError> for CardError {
    fn from(value: CardValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<CardDataError> for CardError {
    fn from(value: CardDataError) -> Self {
        Self::Data(value)
    }
}

impl From<StoreError> for CardError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// One command a variant exposes, with dispatch metadata.
///
/// `name` is the display label (it embeds the title); `action` is the stable
/// internal key dispatch runs on. A command may omit either phase: a missing
/// preload yields the zero ticket, a missing execute is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDecl {
    pub action: &'static str,
    pub name: String,
    pub preload: bool,
    pub execute: bool,
}

/// Deferred work a variant hands back to the board manager.
///
/// Cards never hold references to siblings or the manager; cross-card and
/// shell-facing actions travel as effects instead.
#[derive(Debug, Clone, PartialEq)]
pub enum CardEffect {
    /// Two-phase invocation of another card's command.
    RunCommand { command_id: String, options: JsonMap },
    StartPlayback(PlaybackRequest),
    StopPlayback { card_id: CardId },
    /// Ask the manager to remove a card (confirmation included).
    RemoveCard(CardId),
    /// Queue a background duration probe.
    ScheduleProbe(ProbeTask),
    /// Command set changed outside a title update.
    CommandsChanged,
}

/// One pending background metadata probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTask {
    pub card_id: CardId,
    pub file_name: String,
}

/// Pure view projection of one card for the grid renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct CardView {
    pub id: CardId,
    pub kind: CardKind,
    pub title: String,
    /// Template key the shell instantiates for this card.
    pub template: &'static str,
    /// Variant-specific summary line.
    pub detail: String,
}

/// Outcome of one `update_data` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataUpdate {
    /// The merge changed the title; commands were rebuilt and the manager
    /// should re-broadcast.
    pub title_changed: bool,
}

/// Capability set each concrete card kind implements.
///
/// Defaults are deliberate: a variant without commands, attach wiring, or
/// teardown work implements nothing extra.
pub trait CardVariant {
    fn kind(&self) -> CardKind;

    /// Visual template key; `None` makes construction fail.
    fn template(&self) -> Option<&'static str>;

    /// Commands this card exposes, derived from the current record.
    fn register_commands(&self, _record: &CardRecord) -> Vec<CommandDecl> {
        Vec::new()
    }

    /// Preload phase: produce raw ticket data without side effects.
    fn preload(&self, _record: &CardRecord, _action: &str, _options: &JsonMap) -> Value {
        Value::Null
    }

    /// Execute phase: perform the action described by the ticket.
    fn execute(
        &mut self,
        _record: &mut CardRecord,
        _action: &str,
        _ticket: &Ticket,
        _now: Instant,
    ) -> Vec<CardEffect> {
        Vec::new()
    }

    /// Interaction wiring at board attach time (autoplay, probe scheduling).
    fn attach(&mut self, _record: &CardRecord) -> Vec<CardEffect> {
        Vec::new()
    }

    /// Cooperative time advance.
    fn tick(&mut self, _record: &CardRecord, _now: Instant) -> Vec<CardEffect> {
        Vec::new()
    }

    /// Receives the board-wide command list after each broadcast.
    fn refresh_available_commands(&mut self, _commands: &[CommandSpec]) {}

    /// Summary line re-rendered from data.
    fn view_detail(&self, record: &CardRecord) -> String;

    /// Releases runtime resources (playbacks, runs).
    fn destroy(&mut self, _record: &CardRecord) -> Vec<CardEffect> {
        Vec::new()
    }
}

/// One live card: record, resolved template, command list, variant behavior.
pub struct Card {
    record: CardRecord,
    template: &'static str,
    commands: Vec<CommandDecl>,
    variant: Box<dyn CardVariant>,
}

impl std::fmt::Debug for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Card")
            .field("record", &self.record)
            .field("template", &self.template)
            .field("commands", &self.commands)
            .field("variant", &format_args!("<dyn CardVariant>"))
            .finish()
    }
}

impl Card {
    /// Creates a brand-new card from a factory: default data, minted id.
    pub fn create(factory: &CardFactory) -> CardResult<Card> {
        let data = (factory.default_data)();
        if data.kind() != factory.kind {
            return Err(CardError::DefaultDataKind {
                factory: factory.kind,
                data: data.kind(),
            });
        }
        let record = CardRecord {
            id: mint_card_id(factory.kind),
            title: factory.kind.default_title().to_string(),
            data,
        };
        Self::build((factory.build)(), record)
    }

    /// Rehydrates a card from a persisted record body.
    ///
    /// Default data and the persisted document are shallow-merged with
    /// persisted values winning, so records written by older versions pick
    /// up newly added fields.
    pub fn from_persisted(factory: &CardFactory, body: &JsonMap) -> CardResult<Card> {
        let defaults = CardRecord {
            id: String::new(),
            title: factory.kind.default_title().to_string(),
            data: (factory.default_data)(),
        };
        let mut map = record_to_map(&defaults)?;
        for (key, value) in body {
            map.insert(key.clone(), value.clone());
        }
        let record = record_from_map(map)?;
        Self::build((factory.build)(), record)
    }

    fn build(variant: Box<dyn CardVariant>, record: CardRecord) -> CardResult<Card> {
        record.validate()?;
        let Some(template) = variant.template() else {
            return Err(CardError::MissingTemplate(record.kind()));
        };
        let mut card = Card {
            record,
            template,
            commands: Vec::new(),
            variant,
        };
        card.rebuild_commands();
        Ok(card)
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn kind(&self) -> CardKind {
        self.record.kind()
    }

    pub fn title(&self) -> &str {
        &self.record.title
    }

    pub fn record(&self) -> &CardRecord {
        &self.record
    }

    pub fn template(&self) -> &'static str {
        self.template
    }

    /// Shallow-merges `patch` into the record and persists the result.
    ///
    /// In-memory data is authoritative between saves: the merge commits
    /// before the save, and a failing save is reported without rollback.
    /// An empty patch is a complete no-op (no save). The UI is not
    /// refreshed here; callers re-render explicitly.
    pub fn update_data(
        &mut self,
        patch: &JsonMap,
        store: &mut dyn StorageGateway,
    ) -> CardResult<DataUpdate> {
        if patch.is_empty() {
            return Ok(DataUpdate::default());
        }

        let mut map = record_to_map(&self.record)?;
        merge_patch(&mut map, patch);
        let merged = record_from_map(map.clone())?;
        merged.validate()?;

        let title_changed = merged.title != self.record.title;
        self.record = merged;
        if title_changed {
            self.rebuild_commands();
        }

        store.save(&self.record.id, &map)?;
        Ok(DataUpdate { title_changed })
    }

    /// Current broadcast descriptors for this card's commands.
    pub fn command_specs(&self) -> Vec<CommandSpec> {
        self.commands
            .iter()
            .map(|command| CommandSpec::new(self.record.id.clone(), command.name.clone()))
            .collect()
    }

    /// Resolves one command this card owns by full command id.
    pub fn find_command(&self, target: &str) -> Option<&CommandDecl> {
        self.commands
            .iter()
            .find(|command| command_id(&self.record.id, &command.name) == target)
    }

    /// Preload phase with safe-default substitution.
    ///
    /// Unknown commands and malformed preload results yield the zero ticket;
    /// a command registered without a preload phase does too.
    pub fn preload_command(&self, target: &str, options: &JsonMap) -> Ticket {
        let Some(command) = self.find_command(target) else {
            warn!(
                "event=command_preload module=card status=missing card={} command={target}",
                self.record.id
            );
            return Ticket::zero();
        };
        if !command.preload {
            return Ticket::zero();
        }

        let raw = self.variant.preload(&self.record, command.action, options);
        match Ticket::from_value(&raw) {
            Some(ticket) => ticket,
            None => {
                warn!(
                    "event=command_preload module=card status=malformed card={} command={target}",
                    self.record.id
                );
                Ticket::zero()
            }
        }
    }

    /// Execute phase; the ticket passes through unchanged.
    ///
    /// An unknown command id is logged and yields `None`; a command without
    /// an execute phase is a successful no-op.
    pub fn execute_command(
        &mut self,
        target: &str,
        ticket: &Ticket,
        now: Instant,
    ) -> Option<Vec<CardEffect>> {
        let (action, runnable) = match self.find_command(target) {
            Some(command) => (command.action, command.execute),
            None => {
                warn!(
                    "event=command_execute module=card status=missing card={} command={target}",
                    self.record.id
                );
                return None;
            }
        };
        if !runnable {
            return Some(Vec::new());
        }
        Some(self.variant.execute(&mut self.record, action, ticket, now))
    }

    pub fn attach(&mut self) -> Vec<CardEffect> {
        self.variant.attach(&self.record)
    }

    pub fn tick(&mut self, now: Instant) -> Vec<CardEffect> {
        self.variant.tick(&self.record, now)
    }

    pub fn refresh_available_commands(&mut self, commands: &[CommandSpec]) {
        self.variant.refresh_available_commands(commands);
    }

    /// Re-renders the visual projection from current data.
    pub fn view(&self) -> CardView {
        CardView {
            id: self.record.id.clone(),
            kind: self.record.kind(),
            title: self.record.title.clone(),
            template: self.template,
            detail: self.variant.view_detail(&self.record),
        }
    }

    /// Releases runtime resources; the record itself is untouched.
    pub fn destroy(&mut self) -> Vec<CardEffect> {
        self.variant.destroy(&self.record)
    }

    fn rebuild_commands(&mut self) {
        self.commands = self.variant.register_commands(&self.record);
    }
}

#[cfg(test)]
mod tests {
    use super::{Card, CardError, CardVariant, CommandDecl};
    use crate::command::Ticket;
    use crate::model::card::{CardData, CardKind, CardRecord, JsonMap, NotepadData};
    use serde_json::{json, Value};

    struct TemplateLess;

    impl CardVariant for TemplateLess {
        fn kind(&self) -> CardKind {
            CardKind::Notepad
        }

        fn template(&self) -> Option<&'static str> {
            None
        }

        fn view_detail(&self, _record: &CardRecord) -> String {
            String::new()
        }
    }

    struct HalfDefined;

    impl CardVariant for HalfDefined {
        fn kind(&self) -> CardKind {
            CardKind::Notepad
        }

        fn template(&self) -> Option<&'static str> {
            Some("card-test")
        }

        fn register_commands(&self, record: &CardRecord) -> Vec<CommandDecl> {
            vec![
                CommandDecl {
                    action: "exec-only",
                    name: format!("Run {}", record.title),
                    preload: false,
                    execute: true,
                },
                CommandDecl {
                    action: "broken-preload",
                    name: format!("Break {}", record.title),
                    preload: true,
                    execute: false,
                },
            ]
        }

        fn preload(&self, _record: &CardRecord, _action: &str, _options: &JsonMap) -> Value {
            json!("definitely not a ticket")
        }

        fn view_detail(&self, _record: &CardRecord) -> String {
            String::new()
        }
    }

    fn build(variant: impl CardVariant + 'static) -> Result<Card, CardError> {
        let record = CardRecord {
            id: "notepad-test-1".to_string(),
            title: "Scratch".to_string(),
            data: CardData::Notepad(NotepadData::default()),
        };
        Card::build(Box::new(variant), record)
    }

    #[test]
    fn missing_template_is_fatal_at_construction() {
        let err = build(TemplateLess).expect_err("template-less variant must not construct");
        assert!(matches!(err, CardError::MissingTemplate(CardKind::Notepad)));
    }

    #[test]
    fn command_without_preload_yields_zero_ticket() {
        let card = build(HalfDefined).expect("card should construct");
        let ticket = card.preload_command("notepad-test-1:Run Scratch", &JsonMap::new());
        assert_eq!(ticket, Ticket::zero());
    }

    #[test]
    fn malformed_preload_result_is_substituted() {
        let card = build(HalfDefined).expect("card should construct");
        let ticket = card.preload_command("notepad-test-1:Break Scratch", &JsonMap::new());
        assert_eq!(ticket, Ticket::zero());
    }

    #[test]
    fn command_without_execute_is_a_noop() {
        let mut card = build(HalfDefined).expect("card should construct");
        let effects = card
            .execute_command(
                "notepad-test-1:Break Scratch",
                &Ticket::zero(),
                std::time::Instant::now(),
            )
            .expect("registered command resolves");
        assert!(effects.is_empty());
    }

    #[test]
    fn unknown_command_execute_resolves_to_none() {
        let mut card = build(HalfDefined).expect("card should construct");
        assert!(card
            .execute_command(
                "notepad-test-1:Nope",
                &Ticket::zero(),
                std::time::Instant::now()
            )
            .is_none());
    }
}
