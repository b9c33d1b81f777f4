//! Core search types shared across all modules.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lower 48 bits of a seed: the part that drives structure placement.
pub const MASK48: u64 = (1 << 48) - 1;

/// Upper bound on instance positions a single node can resolve.
pub const MAX_INSTANCES: usize = 4096;

/// Condition ids are `0..MAX_CONDITIONS`; id 0 is the implicit root.
pub const MAX_CONDITIONS: usize = 100;

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Horizontal block position.
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Pos {
    pub x: i32,
    pub z: i32,
}

impl Pos {
    /// Marker written into output buffers for positions that must not be used.
    pub const INVALID: Pos = Pos { x: -1, z: -1 };

    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn is_invalid(&self) -> bool {
        *self == Self::INVALID
    }

    /// Squared distance to `other`, widened so it cannot overflow.
    pub fn dist_sq(&self, other: Pos) -> i64 {
        let dx = self.x as i64 - other.x as i64;
        let dz = self.z as i64 - other.z as i64;
        dx * dx + dz * dz
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

// ---------------------------------------------------------------------------
// Verdicts & passes
// ---------------------------------------------------------------------------

/// Outcome of evaluating a node, ordered worst to best.
///
/// Combinators compare verdicts by this ordering: an AND keeps the minimum,
/// an OR keeps the maximum.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Unsatisfiable; no stricter pass can change this.
    Failed,
    /// The predicate could not be decided at this pass.
    MaybeInvalid,
    /// Plausible, but the resolved position needs a stricter pass.
    MaybeValid,
    /// Confirmed at the precision of the current pass.
    Ok,
}

impl Verdict {
    pub fn is_failed(self) -> bool {
        self == Verdict::Failed
    }
}

/// Verification strictness, cheapest first.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPass {
    /// Only the lower 48 bits are meaningful; statistical checks only.
    Fast48,
    /// Exact checks that depend on the lower 48 bits.
    Full48,
    /// Full seed; authoritative.
    Full64,
}

// ---------------------------------------------------------------------------
// World description
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Overworld,
    Nether,
    End,
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dimension::Overworld => "overworld",
            Dimension::Nether => "nether",
            Dimension::End => "end",
        };
        f.write_str(name)
    }
}

/// Game release the generator emulates. Ordered oldest to newest.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum McVersion {
    #[serde(rename = "1.7")]
    V1_7,
    #[serde(rename = "1.8")]
    V1_8,
    #[serde(rename = "1.9")]
    V1_9,
    #[serde(rename = "1.10")]
    V1_10,
    #[serde(rename = "1.11")]
    V1_11,
    #[serde(rename = "1.12")]
    V1_12,
    #[serde(rename = "1.13")]
    V1_13,
    #[serde(rename = "1.14")]
    V1_14,
    #[serde(rename = "1.15")]
    V1_15,
    #[serde(rename = "1.16")]
    V1_16,
    #[serde(rename = "1.17")]
    V1_17,
    #[serde(rename = "1.18")]
    V1_18,
    #[serde(rename = "1.19")]
    V1_19,
    #[serde(rename = "1.20")]
    V1_20,
    #[serde(rename = "1.21")]
    V1_21,
}

impl McVersion {
    pub const NEWEST: McVersion = McVersion::V1_21;

    const ALL: [(McVersion, &'static str); 15] = [
        (McVersion::V1_7, "1.7"),
        (McVersion::V1_8, "1.8"),
        (McVersion::V1_9, "1.9"),
        (McVersion::V1_10, "1.10"),
        (McVersion::V1_11, "1.11"),
        (McVersion::V1_12, "1.12"),
        (McVersion::V1_13, "1.13"),
        (McVersion::V1_14, "1.14"),
        (McVersion::V1_15, "1.15"),
        (McVersion::V1_16, "1.16"),
        (McVersion::V1_17, "1.17"),
        (McVersion::V1_18, "1.18"),
        (McVersion::V1_19, "1.19"),
        (McVersion::V1_20, "1.20"),
        (McVersion::V1_21, "1.21"),
    ];

    pub fn as_str(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(v, _)| *v == self)
            .map(|(_, s)| *s)
            .unwrap_or("?")
    }
}

impl FromStr for McVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|(_, name)| *name == s.trim())
            .map(|(v, _)| *v)
            .ok_or_else(|| format!("unknown version '{}'", s))
    }
}

impl std::fmt::Display for McVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Search configuration
// ---------------------------------------------------------------------------

/// Which seeds the driver visits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SearchMode {
    /// Test each listed seed at the authoritative pass.
    Seeds { seeds: Vec<u64> },
    /// Scan 48-bit candidates in `start..end`, expanding survivors over
    /// `upper` values of the top 16 bits.
    Range48 { start: u64, end: u64, upper: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Game release to emulate.
    pub mc: McVersion,
    /// Large-biomes world option.
    pub large_biomes: bool,
    /// Number of worker threads (each owns one evaluation environment).
    pub threads: usize,
    /// Stop after this many hits (0 = unlimited).
    pub max_results: usize,
    /// Origin the tree is evaluated against.
    pub origin: Pos,
    /// Run the (costly) 1.18+ terrain estimate for structure viability.
    pub estimate_terrain: bool,
    /// Seed selection.
    pub mode: SearchMode,
    /// Conditions, hex encoded.
    pub conditions: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            mc: McVersion::NEWEST,
            large_biomes: false,
            threads: 4,
            max_results: 0,
            origin: Pos::new(0, 0),
            estimate_terrain: false,
            mode: SearchMode::Range48 {
                start: 0,
                end: 1 << 20,
                upper: 1,
            },
            conditions: Vec::new(),
        }
    }
}
