//! Search output protocol.
//!
//! Everything the driver reports to the outside world. The CLI prints one
//! [`SearchEvent`] per line as JSON; other consumers can deserialize the
//! same lines.
//!
//! ## Design rules
//!
//! 1. Every type is `Serialize + Deserialize` with snake_case JSON.
//! 2. Positions are block coordinates; unresolved nodes are omitted, never
//!    sent as sentinel values.
//! 3. Every line carries the `search` label so concatenated outputs of
//!    several runs stay separable.

use serde::{Deserialize, Serialize};

use crate::types::{McVersion, Pos};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One output line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEvent {
    pub search: String,
    #[serde(flatten)]
    pub payload: SearchPayload,
}

impl SearchEvent {
    pub fn new(search: impl Into<String>, payload: SearchPayload) -> Self {
        Self {
            search: search.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SearchPayload {
    Started(SearchStarted),
    Hit(SearchHit),
    Finished(SearchReport),
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStarted {
    pub mc: McVersion,
    pub threads: usize,
    /// Conditions in the tree, including the root.
    pub conditions: usize,
}

/// A node position resolved for a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPos {
    /// Condition id (`save`) the position belongs to.
    pub id: usize,
    pub x: i32,
    pub z: i32,
}

/// A seed that satisfied the whole tree at the authoritative pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positions: Vec<ResolvedPos>,
}

impl SearchHit {
    /// Build a hit from a per-node path buffer, dropping unresolved slots.
    pub fn from_path(seed: u64, path: &[Pos]) -> Self {
        let positions = path
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_invalid())
            .map(|(id, p)| ResolvedPos { id, x: p.x, z: p.z })
            .collect();
        Self { seed, positions }
    }

    pub fn position(&self, id: usize) -> Option<Pos> {
        self.positions
            .iter()
            .find(|r| r.id == id)
            .map(|r| Pos::new(r.x, r.z))
    }
}

/// Summary emitted when a search ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub hits: Vec<SearchHit>,
    /// Candidates evaluated, counting each 48-bit prefix and each expanded
    /// full seed once.
    pub tested: u64,
    /// The search was stopped from outside before covering its input.
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl SearchReport {
    pub fn seeds(&self) -> Vec<u64> {
        self.hits.iter().map(|h| h.seed).collect()
    }
}
