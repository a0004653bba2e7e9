//! ledger.rs
//! Per-step memo of node values.

use crate::store::NodeId;

/// Slot state for one node within the current step.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Empty,
    /// On the evaluation stack; a second request means a same-step cycle.
    Pending,
    Ready(f64),
}

/// Dense step cache indexed by `NodeId`.
///
/// Cleared at the start of every step; a node is evaluated at most once between
/// two clears.
#[derive(Debug, Clone)]
pub struct StepCache {
    values: Vec<Slot>,
}

impl StepCache {
    pub fn new(size: usize) -> Self {
        Self { values: vec![Slot::Empty; size] }
    }

    pub fn clear(&mut self) {
        self.values.fill(Slot::Empty);
    }

    #[inline(always)]
    pub fn get(&self, node_id: NodeId) -> Option<f64> {
        match self.values.get(node_id.index()) {
            Some(Slot::Ready(v)) => Some(*v),
            _ => None,
        }
    }

    #[inline(always)]
    pub(crate) fn is_pending(&self, node_id: NodeId) -> bool {
        matches!(self.values.get(node_id.index()), Some(Slot::Pending))
    }

    pub(crate) fn mark_pending(&mut self, node_id: NodeId) {
        self.slot(node_id, Slot::Pending);
    }

    pub fn insert(&mut self, node_id: NodeId, value: f64) {
        self.slot(node_id, Slot::Ready(value));
    }

    /// Abandons a pending evaluation that failed.
    pub(crate) fn release(&mut self, node_id: NodeId) {
        if self.is_pending(node_id) {
            self.slot(node_id, Slot::Empty);
        }
    }

    /// Dense copy of every slot; nodes not evaluated this step read as NaN.
    pub fn snapshot(&self) -> Vec<f64> {
        self.values
            .iter()
            .map(|s| match s {
                Slot::Ready(v) => *v,
                _ => f64::NAN,
            })
            .collect()
    }

    fn slot(&mut self, node_id: NodeId, slot: Slot) {
        let idx = node_id.index();
        if idx >= self.values.len() {
            self.values.resize(idx + 1, Slot::Empty);
        }
        self.values[idx] = slot;
    }
}
