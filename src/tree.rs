//! Condition tree: the enabled conditions indexed by id, plus the reverse
//! adjacency (parent id → child ids) the evaluator walks.

use log::debug;

use crate::condition::{Condition, Family, FilterKind};
use crate::error::ConfigError;
use crate::types::{McVersion, MAX_CONDITIONS};

/// Read-only tree shared by all workers of a search.
#[derive(Debug, Clone)]
pub struct ConditionTree {
    /// Dense by id; `condvec[0]` is the synthetic root, unused ids hold a
    /// default (kind `None`) condition.
    condvec: Vec<Condition>,
    /// Child ids per id, in input order.
    references: Vec<Vec<usize>>,
    mc: McVersion,
}

impl ConditionTree {
    /// Build the tree for `mc`.
    ///
    /// Disabled conditions are ignored. Every enabled condition is validated
    /// (`Condition::apply`), ids must be unique and in `1..100`, and every
    /// relative chain must reach the root without revisiting a node.
    pub fn build(conditions: &[Condition], mc: McVersion) -> Result<Self, ConfigError> {
        let enabled: Vec<&Condition> = conditions.iter().filter(|c| !c.is_disabled()).collect();

        let mut size = 1;
        for c in &enabled {
            if c.save < 1 || c.save as usize >= MAX_CONDITIONS {
                return Err(ConfigError::InvalidSave(c.save));
            }
            size = size.max(c.save as usize + 1);
        }

        let mut condvec = vec![Condition::default(); size];
        let mut present = vec![false; size];
        present[0] = true;
        for c in &enabled {
            let id = c.save as usize;
            if present[id] {
                return Err(ConfigError::DuplicateSave(c.save));
            }
            let mut c = (*c).clone();
            c.apply(mc)?;
            condvec[id] = c;
            present[id] = true;
        }

        let mut references = vec![Vec::new(); size];
        for c in &enabled {
            let parent = c.relative;
            if parent < 0 || parent as usize >= size || !present[parent as usize] {
                debug!(
                    "condition {} is unreachable: parent {} is not enabled",
                    c.save, parent
                );
                continue;
            }
            references[parent as usize].push(c.save as usize);
        }

        // every relative chain must terminate at the root
        for c in &enabled {
            let mut seen = vec![false; size];
            let mut id = c.save as usize;
            while id != 0 {
                if seen[id] {
                    return Err(ConfigError::Cycle(c.save));
                }
                seen[id] = true;
                let parent = condvec[id].relative;
                if parent < 0 || parent as usize >= size || !present[parent as usize] {
                    break;
                }
                id = parent as usize;
            }
        }

        debug!(
            "condition tree built for {}: {} enabled of {} conditions",
            mc,
            enabled.len(),
            conditions.len()
        );
        Ok(Self {
            condvec,
            references,
            mc,
        })
    }

    /// Tree containing only the root.
    pub fn empty(mc: McVersion) -> Self {
        Self {
            condvec: vec![Condition::default()],
            references: vec![Vec::new()],
            mc,
        }
    }

    pub fn mc(&self) -> McVersion {
        self.mc
    }

    /// Size of the id space (max enabled id + 1).
    pub fn len(&self) -> usize {
        self.condvec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references[0].is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&Condition> {
        self.condvec.get(id)
    }

    pub fn condition(&self, id: usize) -> &Condition {
        &self.condvec[id]
    }

    /// Children of `id` in evaluation order.
    pub fn children(&self, id: usize) -> &[usize] {
        self.references.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Conditions reachable from the root, depth first.
    pub fn reachable(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.children(0).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    /// Reachable script conditions.
    pub fn scripts(&self) -> impl Iterator<Item = &Condition> + '_ {
        self.reachable()
            .into_iter()
            .map(move |id| &self.condvec[id])
            .filter(|c| c.info().family == Family::Script)
    }

    /// Whether the id names an enabled condition.
    pub fn contains(&self, id: usize) -> bool {
        id == 0 || self.condvec.get(id).is_some_and(|c| c.kind != FilterKind::None)
    }

    /// Multi-line description, one summary per reachable condition.
    pub fn describe(&self) -> String {
        self.reachable()
            .into_iter()
            .map(|id| self.condvec[id].summary())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
