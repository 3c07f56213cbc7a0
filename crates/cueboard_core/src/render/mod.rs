//! Grid projection of the layout tree.
//!
//! # Responsibility
//! - Project the layout tree into an ordered slot list the shell paints.
//! - Own rearrange mode and turn drop gestures into tree moves plus a
//!   persistence callback.
//!
//! # Invariants
//! - Slots appear in tree order, depth-first; the control panel sentinel
//!   always renders.
//! - A completed drop persists the tree before the caller re-renders, so
//!   the painted grid always matches the saved tree.

use crate::card::Card;
use crate::layout::{LayoutNode, LayoutTree, NodeKind};
use crate::model::card::CardId;
use crate::store::StoreResult;
use log::{debug, error, warn};
use std::collections::BTreeMap;

/// One paintable grid entry.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSlot {
    pub node_id: String,
    pub kind: NodeKind,
    /// Nesting depth under root; direct children render at 0.
    pub depth: usize,
    /// Card view projection; `None` for the panel and containers.
    pub view: Option<crate::card::CardView>,
}

/// Full output of one render: what the shell paints.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPass {
    pub rearranging: bool,
    pub slots: Vec<RenderSlot>,
}

/// One drop gesture in rearrange mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropRequest {
    pub node_id: String,
    pub target_parent: String,
    pub index: Option<usize>,
}

/// Result of handling one drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// Rearrange mode was off; nothing happened.
    Ignored,
    /// The move target was invalid; the tree is unchanged.
    Rejected,
    Moved,
}

/// Projects the layout tree onto the visual surface.
#[derive(Debug, Default)]
pub struct GridRenderer {
    rearranging: bool,
}

impl GridRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_rearranging(&self) -> bool {
        self.rearranging
    }

    pub fn set_rearranging(&mut self, active: bool) {
        self.rearranging = active;
    }

    /// Walks the tree depth-first and emits one slot per node.
    ///
    /// A card node without a live card is a reconciliation gap; it is
    /// logged and skipped rather than painted empty.
    pub fn render(&self, tree: &LayoutTree, cards: &BTreeMap<CardId, Card>) -> RenderPass {
        let mut slots = Vec::new();
        for child in &tree.root().children {
            project(child, 0, cards, &mut slots);
        }
        RenderPass {
            rearranging: self.rearranging,
            slots,
        }
    }

    /// Applies one drop as remove-then-insert, then persists the tree.
    ///
    /// The persist callback runs only after a successful move; a persist
    /// failure is logged centrally and still reported as `Moved` so the
    /// follow-up re-render keeps the grid aligned with the in-memory tree.
    pub fn complete_drop<F>(
        &self,
        tree: &mut LayoutTree,
        request: &DropRequest,
        persist: F,
    ) -> DropOutcome
    where
        F: FnOnce(&LayoutTree) -> StoreResult<()>,
    {
        if !self.rearranging {
            debug!(
                "event=grid_drop module=render status=ignored node={}",
                request.node_id
            );
            return DropOutcome::Ignored;
        }

        if !tree.move_node(&request.node_id, &request.target_parent, request.index) {
            warn!(
                "event=grid_drop module=render status=rejected node={} parent={}",
                request.node_id, request.target_parent
            );
            return DropOutcome::Rejected;
        }

        if let Err(err) = persist(tree) {
            error!(
                "event=grid_drop module=render status=persist_error node={} error={}",
                request.node_id, err
            );
        }
        DropOutcome::Moved
    }
}

fn project(
    node: &LayoutNode,
    depth: usize,
    cards: &BTreeMap<CardId, Card>,
    slots: &mut Vec<RenderSlot>,
) {
    let view = match node.kind.as_card() {
        Some(_) => match cards.get(&node.id) {
            Some(card) => Some(card.view()),
            None => {
                warn!(
                    "event=grid_render module=render status=orphan_node node={}",
                    node.id
                );
                return;
            }
        },
        None => None,
    };

    slots.push(RenderSlot {
        node_id: node.id.clone(),
        kind: node.kind,
        depth,
        view,
    });

    for child in &node.children {
        project(child, depth + 1, cards, slots);
    }
}

#[cfg(test)]
mod tests {
    use super::{DropOutcome, DropRequest, GridRenderer};
    use crate::layout::{LayoutNode, LayoutTree, NodeKind, CONTROL_PANEL_NODE_ID, ROOT_NODE_ID};
    use crate::model::card::CardKind;
    use std::collections::BTreeMap;

    #[test]
    fn panel_renders_and_orphan_card_nodes_are_skipped() {
        let renderer = GridRenderer::new();
        let mut tree = LayoutTree::new();
        tree.insert_node(
            LayoutNode::card("sound-ghost", CardKind::Sound),
            ROOT_NODE_ID,
            None,
        );

        let pass = renderer.render(&tree, &BTreeMap::new());
        assert_eq!(pass.slots.len(), 1);
        assert_eq!(pass.slots[0].node_id, CONTROL_PANEL_NODE_ID);
        assert_eq!(pass.slots[0].kind, NodeKind::Panel);
    }

    #[test]
    fn drop_outside_rearrange_mode_is_ignored() {
        let renderer = GridRenderer::new();
        let mut tree = LayoutTree::new();
        tree.insert_node(
            LayoutNode::card("sound-a", CardKind::Sound),
            ROOT_NODE_ID,
            None,
        );
        let before = tree.clone();

        let outcome = renderer.complete_drop(
            &mut tree,
            &DropRequest {
                node_id: "sound-a".to_string(),
                target_parent: ROOT_NODE_ID.to_string(),
                index: Some(0),
            },
            |_| Ok(()),
        );
        assert_eq!(outcome, DropOutcome::Ignored);
        assert_eq!(tree, before);
    }

    #[test]
    fn drop_moves_node_and_invokes_persist() {
        let mut renderer = GridRenderer::new();
        renderer.set_rearranging(true);
        let mut tree = LayoutTree::new();
        tree.insert_node(
            LayoutNode::card("sound-a", CardKind::Sound),
            ROOT_NODE_ID,
            None,
        );
        tree.insert_node(
            LayoutNode::card("timer-b", CardKind::Timer),
            ROOT_NODE_ID,
            None,
        );

        let mut persisted = false;
        let outcome = renderer.complete_drop(
            &mut tree,
            &DropRequest {
                node_id: "timer-b".to_string(),
                target_parent: ROOT_NODE_ID.to_string(),
                index: Some(0),
            },
            |_| {
                persisted = true;
                Ok(())
            },
        );
        assert_eq!(outcome, DropOutcome::Moved);
        assert!(persisted);
        assert_eq!(tree.root().children[0].id, "timer-b");
    }
}
