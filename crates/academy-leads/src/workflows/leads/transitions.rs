use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use super::domain::LeadStatus;

/// Raised when a requested status change has no edge in the table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("lead cannot move from {from} to {to}")]
    Illegal { from: LeadStatus, to: LeadStatus },
}

/// Directed adjacency map of legal single-step status changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    edges: BTreeMap<LeadStatus, BTreeSet<LeadStatus>>,
}

impl TransitionTable {
    /// The lead lifecycle: `converted` is absorbing, `lost` only returns to `new`.
    pub fn standard() -> Self {
        use LeadStatus::*;

        let rows: [(LeadStatus, &[LeadStatus]); 5] = [
            (New, &[Contacted, Lost]),
            (Contacted, &[Qualified, Lost]),
            (Qualified, &[Converted, Contacted, Lost]),
            (Lost, &[New]),
            (Converted, &[]),
        ];

        let edges = rows
            .into_iter()
            .map(|(from, targets)| (from, targets.iter().copied().collect()))
            .collect();

        Self { edges }
    }

    pub fn allows(&self, from: LeadStatus, to: LeadStatus) -> bool {
        self.edges
            .get(&from)
            .map(|targets| targets.contains(&to))
            .unwrap_or(false)
    }

    pub fn next_statuses(&self, from: LeadStatus) -> BTreeSet<LeadStatus> {
        self.edges.get(&from).cloned().unwrap_or_default()
    }

    pub fn is_terminal(&self, status: LeadStatus) -> bool {
        self.edges
            .get(&status)
            .map(BTreeSet::is_empty)
            .unwrap_or(true)
    }

    pub fn ensure(&self, from: LeadStatus, to: LeadStatus) -> Result<(), TransitionError> {
        if self.allows(from, to) {
            Ok(())
        } else {
            Err(TransitionError::Illegal { from, to })
        }
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}

pub(crate) fn standard_table() -> &'static TransitionTable {
    static TABLE: OnceLock<TransitionTable> = OnceLock::new();
    TABLE.get_or_init(TransitionTable::standard)
}

pub fn is_valid_status_transition(from: LeadStatus, to: LeadStatus) -> bool {
    standard_table().allows(from, to)
}

/// True when no transition leaves `status`.
pub fn is_terminal(status: LeadStatus) -> bool {
    standard_table().is_terminal(status)
}

pub fn get_next_statuses(from: LeadStatus) -> BTreeSet<LeadStatus> {
    standard_table().next_statuses(from)
}

pub fn ensure_transition(from: LeadStatus, to: LeadStatus) -> Result<(), TransitionError> {
    standard_table().ensure(from, to)
}
