//! The per-function flow-control tree (`spec.md` §3 `FlowControlNode`,
//! §4.8, §9 "Forward branches"). Mirrors the AST's structural block nesting
//! and owns the patch lists `break`/`continue`/`case`/`goto` resolve
//! against.

use serde::{Deserialize, Serialize};

use crate::id::{FlowControlId, InstructionIndex, SymbolId};

/// A variable-length array whose scope exit must route through exactly one
/// `SCOPE_POP` referencing its head element (`spec.md` Invariant 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlaElement {
    pub head_identifier: SymbolId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchList {
    pub targets: Vec<InstructionIndex>,
}

impl PatchList {
    pub fn push(&mut self, index: InstructionIndex) {
        self.targets.push(index);
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FlowControlNode {
    Block {
        data_elements: Vec<SymbolId>,
        vl_arrays: Vec<VlaElement>,
    },
    If,
    Switch {
        /// `(value, patch)` in declaration order; a case whose value
        /// duplicates an earlier one (by `ConstValue::value_equal`) is an
        /// `AnalysisError`, checked by the caller before insertion.
        cases: Vec<(crate::constval::ConstValue, InstructionIndex)>,
        default_patch: Option<InstructionIndex>,
        /// `break` inside a `switch` exits the switch itself, not any
        /// enclosing loop, so it needs its own patch list.
        break_patch_list: PatchList,
    },
    Loop {
        continue_patch_list: PatchList,
        break_patch_list: PatchList,
    },
    For {
        continue_patch_list: PatchList,
        break_patch_list: PatchList,
    },
}

impl FlowControlNode {
    pub fn new_block() -> Self {
        FlowControlNode::Block {
            data_elements: Vec::new(),
            vl_arrays: Vec::new(),
        }
    }

    pub fn contains_vla(&self) -> bool {
        matches!(self, FlowControlNode::Block { vl_arrays, .. } if !vl_arrays.is_empty())
    }

    pub fn continue_targets(&mut self) -> Option<&mut PatchList> {
        match self {
            FlowControlNode::Loop { continue_patch_list, .. }
            | FlowControlNode::For { continue_patch_list, .. } => Some(continue_patch_list),
            _ => None,
        }
    }

    pub fn break_targets(&mut self) -> Option<&mut PatchList> {
        match self {
            FlowControlNode::Loop { break_patch_list, .. }
            | FlowControlNode::For { break_patch_list, .. }
            | FlowControlNode::Switch { break_patch_list, .. } => Some(break_patch_list),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowControlEntry {
    pub id: FlowControlId,
    pub parent: Option<FlowControlId>,
    pub node: FlowControlNode,
}

/// Per-function tree; `astir-translate`'s statement lowerer pushes a new
/// entry on entering a structural block and pops on exit, always operating
/// on the innermost (last-pushed) node for patch-list lookups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowControlTree {
    entries: Vec<FlowControlEntry>,
    stack: Vec<FlowControlId>,
}

impl FlowControlTree {
    pub fn push(&mut self, node: FlowControlNode) -> FlowControlId {
        let id = FlowControlId(self.entries.len() as u32);
        let parent = self.stack.last().copied();
        self.entries.push(FlowControlEntry { id, parent, node });
        self.stack.push(id);
        id
    }

    pub fn pop(&mut self) -> Option<FlowControlId> {
        self.stack.pop()
    }

    pub fn current(&self) -> Option<FlowControlId> {
        self.stack.last().copied()
    }

    pub fn get(&self, id: FlowControlId) -> Option<&FlowControlEntry> {
        self.entries.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: FlowControlId) -> Option<&mut FlowControlEntry> {
        self.entries.get_mut(id.0 as usize)
    }

    /// Walks from the innermost open node outward, looking for the nearest
    /// enclosing loop to resolve `continue`/`break` against.
    pub fn innermost_loop(&self) -> Option<FlowControlId> {
        let mut cursor = self.current();
        while let Some(id) = cursor {
            let entry = self.get(id)?;
            if matches!(entry.node, FlowControlNode::Loop { .. } | FlowControlNode::For { .. }) {
                return Some(id);
            }
            cursor = entry.parent;
        }
        None
    }

    pub fn innermost_switch(&self) -> Option<FlowControlId> {
        let mut cursor = self.current();
        while let Some(id) = cursor {
            let entry = self.get(id)?;
            if matches!(entry.node, FlowControlNode::Switch { .. }) {
                return Some(id);
            }
            cursor = entry.parent;
        }
        None
    }

    /// `break`'s target: the nearest enclosing loop or `switch`, whichever
    /// is innermost (unlike `continue`, which only ever sees loops).
    pub fn innermost_breakable(&self) -> Option<FlowControlId> {
        let mut cursor = self.current();
        while let Some(id) = cursor {
            let entry = self.get(id)?;
            if matches!(
                entry.node,
                FlowControlNode::Loop { .. } | FlowControlNode::For { .. } | FlowControlNode::Switch { .. }
            ) {
                return Some(id);
            }
            cursor = entry.parent;
        }
        None
    }
}
