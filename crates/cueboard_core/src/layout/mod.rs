//! Hierarchical board layout tree.
//!
//! # Responsibility
//! - Own the ordered card/container hierarchy projected onto the grid.
//! - Provide find/insert/remove/move operations with no partial mutation.
//! - Serialize to the plain `grid-layout` record and rehydrate from it.
//!
//! # Invariants
//! - The root container node is always present and never removed.
//! - Only container nodes carry children.
//! - Failed inserts and moves leave the tree exactly as it was.

use crate::model::card::{CardKind, JsonMap};
use log::warn;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Reserved id of the always-present root container.
pub const ROOT_NODE_ID: &str = "root";
/// Reserved sentinel id rendered as the fixed control panel.
pub const CONTROL_PANEL_NODE_ID: &str = "control-panel";
/// Storage id of the persisted layout record.
pub const GRID_LAYOUT_RECORD_ID: &str = "grid-layout";

/// Node type tag; mirrors the card type for leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Sound,
    Timer,
    Notepad,
    /// Container marker; the only kind allowed to carry children.
    Group,
    /// Fixed control panel sentinel.
    Panel,
}

impl NodeKind {
    pub fn from_card(kind: CardKind) -> Self {
        match kind {
            CardKind::Sound => Self::Sound,
            CardKind::Timer => Self::Timer,
            CardKind::Notepad => Self::Notepad,
        }
    }

    /// The card kind this node mirrors, when it is a card leaf.
    pub fn as_card(self) -> Option<CardKind> {
        match self {
            Self::Sound => Some(CardKind::Sound),
            Self::Timer => Some(CardKind::Timer),
            Self::Notepad => Some(CardKind::Notepad),
            Self::Group | Self::Panel => None,
        }
    }

    pub fn is_container(self) -> bool {
        matches!(self, Self::Group)
    }
}

/// One layout tree entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNode {
    /// Card id for leaves, reserved sentinel otherwise.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Ordered children; meaningful for containers only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LayoutNode>,
}

impl LayoutNode {
    /// Leaf node mirroring one card.
    pub fn card(id: impl Into<String>, kind: CardKind) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::from_card(kind),
            children: Vec::new(),
        }
    }

    /// Container node.
    pub fn group(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Group,
            children: Vec::new(),
        }
    }

    /// The fixed control panel sentinel.
    pub fn panel() -> Self {
        Self {
            id: CONTROL_PANEL_NODE_ID.to_string(),
            kind: NodeKind::Panel,
            children: Vec::new(),
        }
    }
}

/// Persisted layout record shape: `{ id: "grid-layout", layout: {...} }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutRecord {
    pub id: String,
    pub layout: LayoutNode,
}

/// Failures rehydrating a persisted layout document.
#[derive(Debug)]
pub enum LayoutDataError {
    /// Document root is not the reserved root container.
    WrongRoot(String),
    Invalid(String),
}

impl Display for LayoutDataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongRoot(id) => write!(f, "layout root must be `{ROOT_NODE_ID}`, got `{id}`"),
            Self::Invalid(message) => write!(f, "invalid layout data: {message}"),
        }
    }
}

impl Error for LayoutDataError {}

/// Owned layout tree with a distinguished root container.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutTree {
    root: LayoutNode,
}

impl Default for LayoutTree {
    fn default() -> Self {
        let mut root = LayoutNode::group(ROOT_NODE_ID);
        root.children.push(LayoutNode::panel());
        Self { root }
    }
}

impl LayoutTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only root access for projection.
    pub fn root(&self) -> &LayoutNode {
        &self.root
    }

    /// Depth-first search from root.
    pub fn find_node(&self, id: &str) -> Option<&LayoutNode> {
        find_in(&self.root, id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find_node(id).is_some()
    }

    /// Ids and kinds of every card leaf, in tree order.
    pub fn card_nodes(&self) -> Vec<(String, CardKind)> {
        let mut nodes = Vec::new();
        collect_cards(&self.root, &mut nodes);
        nodes
    }

    /// Inserts `node` into `parent_id`'s children at a clamped index.
    ///
    /// `None` appends; out-of-range indexes clamp to append. A missing or
    /// non-container parent, or a duplicate node id, is logged and leaves
    /// the tree unmodified.
    pub fn insert_node(
        &mut self,
        node: LayoutNode,
        parent_id: &str,
        index: Option<usize>,
    ) -> bool {
        if node.id == ROOT_NODE_ID {
            warn!("event=layout_insert module=layout status=rejected reason=reserved_id id={ROOT_NODE_ID}");
            return false;
        }
        if self.contains(&node.id) {
            warn!(
                "event=layout_insert module=layout status=rejected reason=duplicate_id id={}",
                node.id
            );
            return false;
        }
        let Some(parent) = find_in_mut(&mut self.root, parent_id) else {
            warn!(
                "event=layout_insert module=layout status=rejected reason=parent_missing parent={parent_id}"
            );
            return false;
        };
        if !parent.kind.is_container() {
            warn!(
                "event=layout_insert module=layout status=rejected reason=parent_not_container parent={parent_id}"
            );
            return false;
        }

        let clamped = index
            .unwrap_or(parent.children.len())
            .min(parent.children.len());
        parent.children.insert(clamped, node);
        true
    }

    /// Removes the node (and its whole subtree) by id.
    ///
    /// Returns the detached node, or `None` when the id is absent (no-op).
    /// The root container is never removed.
    pub fn remove_node(&mut self, id: &str) -> Option<LayoutNode> {
        if id == ROOT_NODE_ID {
            warn!("event=layout_remove module=layout status=rejected reason=reserved_id id={ROOT_NODE_ID}");
            return None;
        }
        remove_in(&mut self.root, id)
    }

    /// Relocates one node as remove-then-insert at the new position.
    ///
    /// The two steps run as one unit: when the insert target is invalid
    /// (missing parent, parent inside the moved subtree, non-container
    /// parent) the node is restored at its original position and `false`
    /// is returned.
    pub fn move_node(&mut self, id: &str, parent_id: &str, index: Option<usize>) -> bool {
        let Some((original_parent, original_index)) = self.locate(id) else {
            warn!("event=layout_move module=layout status=rejected reason=node_missing id={id}");
            return false;
        };
        let Some(node) = self.remove_node(id) else {
            return false;
        };

        if self.insert_node(node.clone(), parent_id, index) {
            return true;
        }

        // Restore; the original parent is still present because only this
        // node was detached.
        if !self.insert_node(node, &original_parent, Some(original_index)) {
            warn!(
                "event=layout_move module=layout status=error reason=restore_failed id={id} parent={original_parent}"
            );
        }
        false
    }

    /// Parent id and child index of one node.
    pub fn locate(&self, id: &str) -> Option<(String, usize)> {
        locate_in(&self.root, id)
    }

    /// Guarantees the control panel sentinel sits under root.
    ///
    /// Returns whether the tree changed.
    pub fn ensure_panel(&mut self) -> bool {
        if self.contains(CONTROL_PANEL_NODE_ID) {
            return false;
        }
        self.root.children.insert(0, LayoutNode::panel());
        true
    }

    /// Serializes to the persisted `grid-layout` record document.
    pub fn to_record_map(&self) -> JsonMap {
        let record = LayoutRecord {
            id: GRID_LAYOUT_RECORD_ID.to_string(),
            layout: self.root.clone(),
        };
        match serde_json::to_value(&record) {
            Ok(serde_json::Value::Object(map)) => map,
            // Layout records are plain data and always serialize; an empty
            // map would only appear if that stops holding.
            _ => JsonMap::new(),
        }
    }

    /// Rehydrates a tree from the persisted record document.
    pub fn from_record_map(map: JsonMap) -> Result<Self, LayoutDataError> {
        let record: LayoutRecord = serde_json::from_value(serde_json::Value::Object(map))
            .map_err(|err| LayoutDataError::Invalid(err.to_string()))?;
        if record.layout.id != ROOT_NODE_ID || !record.layout.kind.is_container() {
            return Err(LayoutDataError::WrongRoot(record.layout.id));
        }
        Ok(Self {
            root: record.layout,
        })
    }
}

fn find_in<'a>(node: &'a LayoutNode, id: &str) -> Option<&'a LayoutNode> {
    if node.id == id {
        return Some(node);
    }
    node.children.iter().find_map(|child| find_in(child, id))
}

fn find_in_mut<'a>(node: &'a mut LayoutNode, id: &str) -> Option<&'a mut LayoutNode> {
    if node.id == id {
        return Some(node);
    }
    node.children
        .iter_mut()
        .find_map(|child| find_in_mut(child, id))
}

fn remove_in(node: &mut LayoutNode, id: &str) -> Option<LayoutNode> {
    if let Some(position) = node.children.iter().position(|child| child.id == id) {
        return Some(node.children.remove(position));
    }
    node.children
        .iter_mut()
        .find_map(|child| remove_in(child, id))
}

fn locate_in(node: &LayoutNode, id: &str) -> Option<(String, usize)> {
    if let Some(position) = node.children.iter().position(|child| child.id == id) {
        return Some((node.id.clone(), position));
    }
    node.children.iter().find_map(|child| locate_in(child, id))
}

fn collect_cards(node: &LayoutNode, out: &mut Vec<(String, CardKind)>) {
    if let Some(kind) = node.kind.as_card() {
        out.push((node.id.clone(), kind));
    }
    for child in &node.children {
        collect_cards(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::{LayoutNode, LayoutTree, CONTROL_PANEL_NODE_ID, ROOT_NODE_ID};
    use crate::model::card::CardKind;

    #[test]
    fn default_tree_has_root_and_panel() {
        let tree = LayoutTree::new();
        assert!(tree.contains(ROOT_NODE_ID));
        assert!(tree.contains(CONTROL_PANEL_NODE_ID));
        assert_eq!(tree.root().children[0].id, CONTROL_PANEL_NODE_ID);
    }

    #[test]
    fn inserting_at_index_zero_twice_orders_latest_first() {
        let mut tree = LayoutTree::new();
        tree.root_children_clear_for_test();
        assert!(tree.insert_node(
            LayoutNode::card("sound-A", CardKind::Sound),
            ROOT_NODE_ID,
            Some(0)
        ));
        assert!(tree.insert_node(
            LayoutNode::card("timer-B", CardKind::Timer),
            ROOT_NODE_ID,
            Some(0)
        ));

        let ids: Vec<&str> = tree
            .root()
            .children
            .iter()
            .map(|node| node.id.as_str())
            .collect();
        assert_eq!(ids, ["timer-B", "sound-A"]);
    }

    #[test]
    fn out_of_range_index_clamps_to_append() {
        let mut tree = LayoutTree::new();
        assert!(tree.insert_node(
            LayoutNode::card("sound-A", CardKind::Sound),
            ROOT_NODE_ID,
            Some(99)
        ));
        assert_eq!(
            tree.root().children.last().map(|node| node.id.as_str()),
            Some("sound-A")
        );
    }

    #[test]
    fn insert_fails_without_mutation_for_missing_parent() {
        let mut tree = LayoutTree::new();
        let before = tree.clone();
        assert!(!tree.insert_node(
            LayoutNode::card("sound-A", CardKind::Sound),
            "group-missing",
            None
        ));
        assert_eq!(tree, before);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut tree = LayoutTree::new();
        tree.insert_node(
            LayoutNode::card("sound-A", CardKind::Sound),
            ROOT_NODE_ID,
            None,
        );
        assert!(tree.remove_node("sound-A").is_some());
        let after_first = tree.clone();
        assert!(tree.remove_node("sound-A").is_none());
        assert_eq!(tree, after_first);
    }

    #[test]
    fn removing_a_container_removes_its_subtree() {
        let mut tree = LayoutTree::new();
        tree.insert_node(LayoutNode::group("group-1"), ROOT_NODE_ID, None);
        tree.insert_node(
            LayoutNode::card("sound-A", CardKind::Sound),
            "group-1",
            None,
        );
        assert!(tree.remove_node("group-1").is_some());
        assert!(!tree.contains("sound-A"));
    }

    #[test]
    fn move_into_own_subtree_restores_original_position() {
        let mut tree = LayoutTree::new();
        tree.insert_node(LayoutNode::group("group-1"), ROOT_NODE_ID, None);
        tree.insert_node(LayoutNode::group("group-2"), "group-1", None);
        let before = tree.clone();

        assert!(!tree.move_node("group-1", "group-2", None));
        assert_eq!(tree, before);
    }

    #[test]
    fn record_round_trip_preserves_ids_types_and_order() {
        let mut tree = LayoutTree::new();
        tree.insert_node(LayoutNode::group("group-1"), ROOT_NODE_ID, None);
        tree.insert_node(
            LayoutNode::card("sound-A", CardKind::Sound),
            "group-1",
            None,
        );
        tree.insert_node(
            LayoutNode::card("timer-B", CardKind::Timer),
            "group-1",
            Some(0),
        );

        let map = tree.to_record_map();
        let restored = LayoutTree::from_record_map(map).expect("layout record rehydrates");
        assert_eq!(restored, tree);
    }

    impl LayoutTree {
        // Drops the default panel so ordering assertions read cleanly.
        fn root_children_clear_for_test(&mut self) {
            self.root.children.clear();
        }
    }
}
