//! Collecting per-conflict choices before they are applied

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::models::{EntityKind, Resolution, SyncConflict};

/// Choices for a set of pending conflicts.
///
/// Resolution is all-or-nothing: [`Self::into_plan`] refuses to produce a
/// plan until every conflict has a side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictResolver {
    conflicts: Vec<SyncConflict>,
    choices: HashMap<(EntityKind, String), Resolution>,
}

impl ConflictResolver {
    pub fn new(conflicts: Vec<SyncConflict>) -> Self {
        Self {
            conflicts,
            choices: HashMap::new(),
        }
    }

    pub fn conflicts(&self) -> &[SyncConflict] {
        &self.conflicts
    }

    /// Record a side for one conflict
    pub fn choose(&mut self, kind: EntityKind, id: &str, resolution: Resolution) -> Result<()> {
        if !self
            .conflicts
            .iter()
            .any(|conflict| conflict.kind == kind && conflict.id == id)
        {
            return Err(Error::NotFound(format!("no pending conflict for {kind} {id}")));
        }
        self.choices.insert((kind, id.to_string()), resolution);
        Ok(())
    }

    /// Use the same side for every conflict
    pub fn choose_all(&mut self, resolution: Resolution) {
        for conflict in &self.conflicts {
            self.choices.insert(conflict.key(), resolution);
        }
    }

    pub fn choice(&self, kind: EntityKind, id: &str) -> Option<Resolution> {
        self.choices.get(&(kind, id.to_string())).copied()
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &SyncConflict> {
        self.conflicts
            .iter()
            .filter(|conflict| !self.choices.contains_key(&conflict.key()))
    }

    pub fn is_complete(&self) -> bool {
        self.unresolved().next().is_none()
    }

    /// Pair each conflict with its side, rejecting partial choices
    pub fn into_plan(self) -> Result<Vec<(SyncConflict, Resolution)>> {
        let missing = self.unresolved().count();
        if missing > 0 {
            return Err(Error::Conflict(format!(
                "{missing} conflict(s) still need a resolution"
            )));
        }

        let Self {
            conflicts,
            mut choices,
        } = self;
        Ok(conflicts
            .into_iter()
            .filter_map(|conflict| {
                let resolution = choices.remove(&conflict.key())?;
                Some((conflict, resolution))
            })
            .collect())
    }
}
