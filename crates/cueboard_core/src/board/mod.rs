//! Board orchestration.
//!
//! # Responsibility
//! - Own every live card, the layout tree, the command broadcast, the
//!   playback ledger, and the probe queue.
//! - Drive the board lifecycle: load, card add/remove, command routing,
//!   cooperative ticking, import/export, wipe.
//!
//! # Invariants
//! - Lifecycle is linear: `Uninitialized -> Loading -> Ready`.
//! - Every non-sentinel layout node corresponds to exactly one live card;
//!   card and node removal happen inside one call with no interleaving.
//! - A card is removed from the live map before any dependent work runs,
//!   so nothing acts on a destroyed card.
//! - Broadcast flushes re-derive the command list from currently-live
//!   cards, never from a snapshot captured at registration time.

use crate::card::{registry, Card, CardEffect, CardError, ProbeTask};
use crate::command::{split_command_id, CommandSpec, Ticket};
use crate::host::{BoardContext, BoardHost};
use crate::layout::{LayoutNode, LayoutTree, GRID_LAYOUT_RECORD_ID, ROOT_NODE_ID};
use crate::model::card::{record_to_map, CardData, CardId, JsonMap};
use crate::render::{DropOutcome, DropRequest, GridRenderer, RenderPass};
use crate::store::{Partition, StorageGateway, StoreError};
use crate::transfer::{self, TransferError};
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub mod broadcast;
pub mod ledger;

use broadcast::CommandBroadcast;
use ledger::PlaybackLedger;

/// Config record holding the board display title.
pub const BOARD_TITLE_RECORD_ID: &str = "board-title";
/// Config record holding the persisted theme name.
pub const BOARD_THEME_RECORD_ID: &str = "board-theme";

pub const DEFAULT_BOARD_TITLE: &str = "Untitled board";
pub const DEFAULT_THEME: &str = "classic";

/// Upper bound on effect-triggered command chains per dispatch.
///
/// A mis-bound pair of cards can otherwise chase each other forever.
pub const EFFECT_CHAIN_LIMIT: usize = 8;

pub type BoardResult<T> = Result<T, BoardError>;

/// Board lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardPhase {
    Uninitialized,
    Loading,
    Ready,
}

impl Display for BoardPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Ready => "ready",
        };
        f.write_str(text)
    }
}

/// Errors from board orchestration.
#[derive(Debug)]
pub enum BoardError {
    /// Operation requires the `Ready` phase.
    NotReady(BoardPhase),
    AlreadyInitialized,
    /// Board title is blank after trim.
    InvalidTitle,
    Store(StoreError),
    Card(CardError),
    Transfer(TransferError),
}

impl Display for BoardError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReady(phase) => write!(f, "board is not ready (phase: {phase})"),
            Self::AlreadyInitialized => write!(f, "board is already initialized"),
            Self::InvalidTitle => write!(f, "board title must not be blank"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Card(err) => write!(f, "{err}"),
            Self::Transfer(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BoardError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Card(err) => Some(err),
            Self::Transfer(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for BoardError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<CardError> for BoardError {
    fn from(value: CardError) -> Self {
        Self::Card(value)
    }
}

impl From<TransferError> for BoardError {
    fn from(value: TransferError) -> Self {
        Self::Transfer(value)
    }
}

/// Orchestrator owning all cards and board-wide state.
pub struct BoardManager<S: StorageGateway> {
    phase: BoardPhase,
    board_id: String,
    title: String,
    theme: String,
    store: S,
    cards: BTreeMap<CardId, Card>,
    layout: LayoutTree,
    renderer: GridRenderer,
    broadcast: CommandBroadcast,
    /// Flat command list as of the last broadcast flush.
    commands: Vec<CommandSpec>,
    broadcasts_delivered: u64,
    probes: VecDeque<ProbeTask>,
    ledger: PlaybackLedger,
}

impl<S: StorageGateway> BoardManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            phase: BoardPhase::Uninitialized,
            board_id: String::new(),
            title: DEFAULT_BOARD_TITLE.to_string(),
            theme: DEFAULT_THEME.to_string(),
            store,
            cards: BTreeMap::new(),
            layout: LayoutTree::new(),
            renderer: GridRenderer::new(),
            broadcast: CommandBroadcast::new(),
            commands: Vec::new(),
            broadcasts_delivered: 0,
            probes: VecDeque::new(),
            ledger: PlaybackLedger::new(),
        }
    }

    /// Flat board-wide command list as of the last broadcast.
    pub fn available_commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    /// Number of broadcasts delivered so far (diagnostics).
    pub fn broadcasts_delivered(&self) -> u64 {
        self.broadcasts_delivered
    }

    pub fn phase(&self) -> BoardPhase {
        self.phase
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    pub fn card(&self, id: &str) -> Option<&Card> {
        self.cards.get(id)
    }

    pub fn card_ids(&self) -> Vec<CardId> {
        self.cards.keys().cloned().collect()
    }

    pub fn layout(&self) -> &LayoutTree {
        &self.layout
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pending_probe_count(&self) -> usize {
        self.probes.len()
    }

    pub fn is_rearranging(&self) -> bool {
        self.renderer.is_rearranging()
    }

    pub fn set_rearranging(&mut self, active: bool) {
        self.renderer.set_rearranging(active);
    }

    /// Linear board bring-up: identity, title, theme, cards, layout,
    /// broadcast. Each step completes before the next begins.
    ///
    /// A single card failing to build is logged and skipped; the rest of
    /// the board loads.
    pub fn initialize(
        &mut self,
        ctx: &dyn BoardContext,
        host: &mut dyn BoardHost,
        now: Instant,
    ) -> BoardResult<()> {
        if self.phase != BoardPhase::Uninitialized {
            return Err(BoardError::AlreadyInitialized);
        }
        self.phase = BoardPhase::Loading;
        self.board_id = ctx.board_id();
        info!(
            "event=board_init module=board status=start board={}",
            self.board_id
        );

        match self.load_state(host, now) {
            Ok(()) => {
                self.phase = BoardPhase::Ready;
                info!(
                    "event=board_init module=board status=ok board={} cards={}",
                    self.board_id,
                    self.cards.len()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=board_init module=board status=error board={} error={}",
                    self.board_id, err
                );
                Err(err)
            }
        }
    }

    fn load_state(&mut self, host: &mut dyn BoardHost, now: Instant) -> BoardResult<()> {
        self.title = config_text(&self.store, BOARD_TITLE_RECORD_ID, DEFAULT_BOARD_TITLE)?;
        self.theme = config_text(&self.store, BOARD_THEME_RECORD_ID, DEFAULT_THEME)?;

        self.cards.clear();
        for body in self.store.list(Partition::Cards)? {
            let tag = body
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let Some(factory) = registry::resolve_tag(&tag) else {
                continue;
            };
            match Card::from_persisted(factory, &body) {
                Ok(card) => {
                    self.cards.insert(card.id().to_string(), card);
                }
                Err(err) => {
                    // One broken record must not take the board down.
                    error!(
                        "event=card_load module=board status=skipped id={} error={}",
                        body.get("id").and_then(Value::as_str).unwrap_or("?"),
                        err
                    );
                }
            }
        }

        self.layout = match self.store.get(GRID_LAYOUT_RECORD_ID)? {
            Some(map) => match LayoutTree::from_record_map(map) {
                Ok(tree) => tree,
                Err(err) => {
                    warn!(
                        "event=layout_load module=board status=reset error={}",
                        err
                    );
                    LayoutTree::new()
                }
            },
            None => LayoutTree::new(),
        };
        if self.reconcile_layout() {
            self.save_layout()?;
        }

        let mut effects = Vec::new();
        for card in self.cards.values_mut() {
            effects.extend(card.attach());
        }
        self.process_effects(effects, host, now);

        self.flush_commands_now();
        Ok(())
    }

    /// Re-establishes the node-per-live-card invariant after a load.
    fn reconcile_layout(&mut self) -> bool {
        let mut changed = self.layout.ensure_panel();

        for (node_id, _) in self.layout.card_nodes() {
            if !self.cards.contains_key(&node_id) {
                warn!(
                    "event=layout_reconcile module=board status=pruned node={node_id}"
                );
                self.layout.remove_node(&node_id);
                changed = true;
            }
        }

        let unlisted: Vec<(CardId, crate::model::card::CardKind)> = self
            .cards
            .values()
            .filter(|card| !self.layout.contains(card.id()))
            .map(|card| (card.id().to_string(), card.kind()))
            .collect();
        for (id, kind) in unlisted {
            self.layout
                .insert_node(LayoutNode::card(id, kind), ROOT_NODE_ID, None);
            changed = true;
        }

        changed
    }

    fn save_layout(&mut self) -> Result<(), StoreError> {
        let map = self.layout.to_record_map();
        self.store.save(GRID_LAYOUT_RECORD_ID, &map)
    }

    fn ensure_ready(&self) -> BoardResult<()> {
        if self.phase != BoardPhase::Ready {
            return Err(BoardError::NotReady(self.phase));
        }
        Ok(())
    }

    /// Creates a card of `tag`, persists it, and places its layout node.
    ///
    /// An unknown tag is a logged no-op (`Ok(None)`). When the requested
    /// parent is missing the node falls back to appending under root so the
    /// card never ends up without a node.
    pub fn add_card(
        &mut self,
        tag: &str,
        parent_id: Option<&str>,
        index: Option<usize>,
        host: &mut dyn BoardHost,
        now: Instant,
    ) -> BoardResult<Option<CardId>> {
        self.ensure_ready()?;
        let Some(factory) = registry::resolve_tag(tag) else {
            return Ok(None);
        };

        let card = Card::create(factory)?;
        let id = card.id().to_string();
        let kind = card.kind();
        let body = record_to_map(card.record()).map_err(CardError::from)?;
        self.store.save(&id, &body)?;
        self.cards.insert(id.clone(), card);

        let parent = parent_id.unwrap_or(ROOT_NODE_ID);
        if !self.layout.insert_node(LayoutNode::card(id.clone(), kind), parent, index) {
            self.layout
                .insert_node(LayoutNode::card(id.clone(), kind), ROOT_NODE_ID, None);
        }
        self.save_layout()?;

        let effects = match self.cards.get_mut(&id) {
            Some(card) => card.attach(),
            None => Vec::new(),
        };
        self.process_effects(effects, host, now);
        self.broadcast.mark(now);

        info!("event=card_add module=board status=ok id={id} kind={kind}");
        Ok(Some(id))
    }

    /// Removes one card everywhere: live map, commands, storage, layout.
    ///
    /// Unknown ids are a no-op without storage calls. The live-map removal
    /// happens first so nothing can act on the card mid-teardown; all four
    /// removals run inside this one call.
    pub fn remove_card(
        &mut self,
        id: &str,
        host: &mut dyn BoardHost,
        now: Instant,
    ) -> BoardResult<bool> {
        self.ensure_ready()?;
        let Some(title) = self.cards.get(id).map(|card| card.title().to_string()) else {
            debug!("event=card_remove module=board status=noop id={id}");
            return Ok(false);
        };

        if !host.confirm(&format!("Delete card \"{title}\"?")) {
            debug!("event=card_remove module=board status=declined id={id}");
            return Ok(false);
        }

        let Some(mut card) = self.cards.remove(id) else {
            return Ok(false);
        };
        let effects = card.destroy();
        drop(card);
        self.process_effects(effects, host, now);

        self.store.delete(id)?;
        self.layout.remove_node(id);
        self.save_layout()?;
        self.broadcast.mark(now);

        info!("event=card_remove module=board status=ok id={id}");
        Ok(true)
    }

    /// Applies a data patch to one card; re-broadcasts on title change.
    pub fn update_card(&mut self, id: &str, patch: &JsonMap, now: Instant) -> BoardResult<bool> {
        self.ensure_ready()?;
        let Some(card) = self.cards.get_mut(id) else {
            debug!("event=card_update module=board status=noop id={id}");
            return Ok(false);
        };
        let outcome = card.update_data(patch, &mut self.store)?;
        if outcome.title_changed {
            self.broadcast.mark(now);
        }
        Ok(true)
    }

    /// Two-phase command entry point: preload, then execute the ticket.
    pub fn handle_command(
        &mut self,
        command_id: &str,
        options: &JsonMap,
        host: &mut dyn BoardHost,
        now: Instant,
    ) -> BoardResult<()> {
        self.ensure_ready()?;
        let ticket = self.preload_command(command_id, options);
        self.execute_command(command_id, ticket, host, now);
        Ok(())
    }

    /// Preload against the live target card.
    ///
    /// Stale or malformed command ids degrade to the zero ticket.
    pub fn preload_command(&self, command_id: &str, options: &JsonMap) -> Ticket {
        let Some((card_id, _)) = split_command_id(command_id) else {
            warn!(
                "event=command_preload module=board status=malformed command={command_id}"
            );
            return Ticket::zero();
        };
        let Some(card) = self.cards.get(card_id) else {
            warn!(
                "event=command_preload module=board status=stale command={command_id}"
            );
            return Ticket::zero();
        };
        card.preload_command(command_id, options)
    }

    /// Execute against the live target card, passing the ticket through.
    pub fn execute_command(
        &mut self,
        command_id: &str,
        ticket: Ticket,
        host: &mut dyn BoardHost,
        now: Instant,
    ) {
        if let Some(effects) = self.dispatch_execute(command_id, &ticket, now) {
            self.process_effects(effects, host, now);
        }
    }

    fn dispatch_execute(
        &mut self,
        command_id: &str,
        ticket: &Ticket,
        now: Instant,
    ) -> Option<Vec<CardEffect>> {
        let Some((card_id, _)) = split_command_id(command_id) else {
            warn!(
                "event=command_execute module=board status=malformed command={command_id}"
            );
            return None;
        };
        let Some(card) = self.cards.get_mut(card_id) else {
            warn!(
                "event=command_execute module=board status=stale command={command_id}"
            );
            return None;
        };
        card.execute_command(command_id, ticket, now)
    }

    fn process_effects(
        &mut self,
        effects: Vec<CardEffect>,
        host: &mut dyn BoardHost,
        now: Instant,
    ) {
        let mut queue: VecDeque<CardEffect> = effects.into();
        let mut chained = 0usize;

        while let Some(effect) = queue.pop_front() {
            match effect {
                CardEffect::RunCommand {
                    command_id,
                    options,
                } => {
                    chained += 1;
                    if chained > EFFECT_CHAIN_LIMIT {
                        warn!(
                            "event=command_chain module=board status=capped command={command_id} limit={EFFECT_CHAIN_LIMIT}"
                        );
                        continue;
                    }
                    let ticket = self.preload_command(&command_id, &options);
                    if let Some(more) = self.dispatch_execute(&command_id, &ticket, now) {
                        queue.extend(more);
                    }
                }
                CardEffect::StartPlayback(request) => self.ledger.start(request, host.audio()),
                CardEffect::StopPlayback { card_id } => self.ledger.stop(&card_id, host.audio()),
                CardEffect::RemoveCard(card_id) => {
                    if let Err(err) = self.remove_card(&card_id, host, now) {
                        error!(
                            "event=card_remove module=board status=error id={card_id} error={err}"
                        );
                    }
                }
                CardEffect::ScheduleProbe(task) => {
                    if !self.probes.contains(&task) {
                        self.probes.push_back(task);
                    }
                }
                CardEffect::CommandsChanged => self.broadcast.mark(now),
            }
        }
    }

    /// Cooperative scheduler entry point.
    ///
    /// Flushes a due command broadcast, advances timers, and processes at
    /// most one probe task; the one-at-a-time probe cadence is the yield
    /// that keeps the interface responsive.
    pub fn tick(&mut self, host: &mut dyn BoardHost, now: Instant) -> BoardResult<()> {
        self.ensure_ready()?;

        if self.broadcast.due(now) {
            self.flush_commands_now();
        }

        let mut effects = Vec::new();
        for card in self.cards.values_mut() {
            effects.extend(card.tick(now));
        }
        if !effects.is_empty() {
            self.process_effects(effects, host, now);
        }

        self.process_one_probe(host);
        Ok(())
    }

    /// Rebuilds the flat command list from live cards and delivers it.
    fn flush_commands_now(&mut self) {
        self.broadcast.clear();
        let specs: Vec<CommandSpec> = self
            .cards
            .values()
            .flat_map(|card| card.command_specs())
            .collect();
        for card in self.cards.values_mut() {
            card.refresh_available_commands(&specs);
        }
        debug!(
            "event=command_broadcast module=board status=ok commands={} cards={}",
            specs.len(),
            self.cards.len()
        );
        self.commands = specs;
        self.broadcasts_delivered += 1;
    }

    fn process_one_probe(&mut self, host: &mut dyn BoardHost) {
        let Some(task) = self.probes.pop_front() else {
            return;
        };

        // The card (or the file) may be gone by the time its turn comes.
        let bytes = match self.cards.get(&task.card_id) {
            Some(card) => match &card.record().data {
                CardData::Sound(data) => data
                    .files
                    .iter()
                    .find(|file| file.name == task.file_name)
                    .map(|file| file.bytes.clone()),
                _ => None,
            },
            None => None,
        };
        let Some(bytes) = bytes else {
            debug!(
                "event=probe module=board status=skipped card={} file={}",
                task.card_id, task.file_name
            );
            return;
        };

        match host.probe().probe_duration_ms(&task.file_name, &bytes) {
            Ok(duration_ms) => self.apply_probed_duration(&task, duration_ms),
            Err(err) => {
                // Skipped, not fatal to the queue.
                warn!(
                    "event=probe module=board status=failed card={} file={} error={}",
                    task.card_id, task.file_name, err
                );
            }
        }
    }

    fn apply_probed_duration(&mut self, task: &ProbeTask, duration_ms: u64) {
        let Some(card) = self.cards.get_mut(&task.card_id) else {
            return;
        };
        let CardData::Sound(data) = &card.record().data else {
            return;
        };

        let mut files = data.files.clone();
        let Some(file) = files.iter_mut().find(|file| file.name == task.file_name) else {
            return;
        };
        file.duration_ms = Some(duration_ms);

        let files_value = match serde_json::to_value(&files) {
            Ok(value) => value,
            Err(err) => {
                error!(
                    "event=probe module=board status=error card={} error={}",
                    task.card_id, err
                );
                return;
            }
        };
        let mut patch = JsonMap::new();
        patch.insert("files".to_string(), files_value);
        if let Err(err) = card.update_data(&patch, &mut self.store) {
            error!(
                "event=probe module=board status=save_failed card={} error={}",
                task.card_id, err
            );
        }
    }

    /// Shell signal: a playback reached its natural end.
    pub fn playback_finished(&mut self, card_id: &str, host: &mut dyn BoardHost) {
        self.ledger.finished(card_id, host.audio());
    }

    /// Projects the current layout tree into a render pass.
    pub fn render(&self) -> RenderPass {
        self.renderer.render(&self.layout, &self.cards)
    }

    /// Applies one rearrange drop, persists the tree, and re-renders.
    pub fn complete_drop(&mut self, request: &DropRequest) -> (DropOutcome, RenderPass) {
        let outcome = self.renderer.complete_drop(&mut self.layout, request, |tree| {
            let map = tree.to_record_map();
            self.store.save(GRID_LAYOUT_RECORD_ID, &map)
        });
        (outcome, self.render())
    }

    /// Renames the board and persists the title config record.
    pub fn rename_board(&mut self, title: &str) -> BoardResult<()> {
        self.ensure_ready()?;
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(BoardError::InvalidTitle);
        }
        self.title = trimmed.to_string();
        save_config_text(&mut self.store, BOARD_TITLE_RECORD_ID, trimmed)?;
        Ok(())
    }

    /// Persists the selected theme name; theme mechanics live in the shell.
    pub fn set_theme(&mut self, theme: &str) -> BoardResult<()> {
        self.ensure_ready()?;
        self.theme = theme.to_string();
        save_config_text(&mut self.store, BOARD_THEME_RECORD_ID, theme)?;
        Ok(())
    }

    /// Serializes every persisted record for download.
    pub fn export_board(&self) -> BoardResult<String> {
        self.ensure_ready()?;
        Ok(transfer::export_json(&self.store)?)
    }

    /// Replaces board contents from an export file.
    ///
    /// The file is parsed and validated before any mutation; a declined
    /// confirmation or a failing parse leaves prior state untouched.
    pub fn import_board(
        &mut self,
        text: &str,
        host: &mut dyn BoardHost,
        now: Instant,
    ) -> BoardResult<bool> {
        self.ensure_ready()?;
        let staged = transfer::parse_import(text)?;
        if !host.confirm(&format!(
            "Replace this board with {} imported record(s)?",
            staged.records.len()
        )) {
            return Ok(false);
        }

        self.ledger.stop_all(host.audio());
        for card in self.cards.values_mut() {
            let _ = card.destroy();
        }
        self.cards.clear();
        self.probes.clear();

        transfer::apply_import(&mut self.store, &staged)?;

        self.phase = BoardPhase::Loading;
        let reload = self.load_state(host, now);
        self.phase = BoardPhase::Ready;
        reload?;

        info!(
            "event=board_import module=board status=ok records={} migrated={}",
            staged.records.len(),
            staged.migrated
        );
        Ok(true)
    }

    /// Clears both partitions and resets the board to an empty default.
    pub fn wipe_board(&mut self, host: &mut dyn BoardHost, _now: Instant) -> BoardResult<bool> {
        self.ensure_ready()?;
        if !host.confirm("Wipe every card and setting on this board?") {
            return Ok(false);
        }

        self.ledger.stop_all(host.audio());
        for card in self.cards.values_mut() {
            let _ = card.destroy();
        }
        self.cards.clear();
        self.probes.clear();
        self.store.clear()?;

        self.layout = LayoutTree::new();
        self.title = DEFAULT_BOARD_TITLE.to_string();
        self.theme = DEFAULT_THEME.to_string();
        self.flush_commands_now();

        info!("event=board_wipe module=board status=ok board={}", self.board_id);
        Ok(true)
    }
}

fn config_text<S: StorageGateway>(
    store: &S,
    record_id: &str,
    default: &str,
) -> Result<String, StoreError> {
    Ok(store
        .get(record_id)?
        .and_then(|map| {
            map.get("value")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| default.to_string()))
}

fn save_config_text<S: StorageGateway>(
    store: &mut S,
    record_id: &str,
    value: &str,
) -> Result<(), StoreError> {
    let body = json!({ "id": record_id, "value": value });
    match body {
        Value::Object(map) => store.save(record_id, &map),
        // json! with an object literal always builds an object.
        _ => Ok(()),
    }
}
