//! World oracle: the deterministic generation queries the evaluator consumes.
//!
//! The evaluator never reimplements biome layering, structure placement or
//! noise sampling. It asks a [`WorldOracle`] and combines the answers.
//! Expensive per-seed state (layer caches, noise tables) lives in the
//! oracle's associated [`WorldOracle::Generator`], one per worker, and is
//! re-initialised lazily by [`OracleState`](crate::env::OracleState).

use crate::quad::QuadCatalog;
use crate::types::{Dimension, McVersion, Pos, MASK48};

/// Biome ids used by the evaluator. Ids ≥ 128 are "extended" ids and are
/// addressed through the `_m` masks of a condition.
pub mod biome {
    pub const OCEAN: i32 = 0;
    pub const PLAINS: i32 = 1;
    pub const DESERT: i32 = 2;
    pub const MOUNTAINS: i32 = 3;
    pub const FOREST: i32 = 4;
    pub const TAIGA: i32 = 5;
    pub const SWAMP: i32 = 6;
    pub const RIVER: i32 = 7;
    pub const NETHER_WASTES: i32 = 8;
    pub const THE_END: i32 = 9;
    pub const FROZEN_OCEAN: i32 = 10;
    pub const SNOWY_TUNDRA: i32 = 12;
    pub const JUNGLE: i32 = 21;
    pub const DEEP_OCEAN: i32 = 24;
    pub const SAVANNA: i32 = 35;
    pub const BADLANDS: i32 = 37;
    pub const WARM_OCEAN: i32 = 44;
    pub const COLD_OCEAN: i32 = 46;
    pub const SOUL_SAND_VALLEY: i32 = 170;
    pub const CRIMSON_FOREST: i32 = 171;
    pub const WARPED_FOREST: i32 = 172;
    pub const BASALT_DELTAS: i32 = 173;
    pub const MEADOW: i32 = 177;
}

// ---------------------------------------------------------------------------
// Structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum StructureType {
    DesertPyramid,
    JunglePyramid,
    SwampHut,
    Igloo,
    Village,
    OceanRuin,
    Shipwreck,
    Monument,
    Mansion,
    Outpost,
    RuinedPortal,
    RuinedPortalNether,
    AncientCity,
    Treasure,
    Mineshaft,
    DesertWell,
    TrailRuins,
    Fortress,
    Bastion,
    EndCity,
    EndGateway,
}

impl StructureType {
    pub fn dimension(self) -> Dimension {
        match self {
            StructureType::Fortress
            | StructureType::Bastion
            | StructureType::RuinedPortalNether => Dimension::Nether,
            StructureType::EndCity | StructureType::EndGateway => Dimension::End,
            _ => Dimension::Overworld,
        }
    }
}

/// Region grid of a structure type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureConfig {
    pub salt: u64,
    /// Region side in chunks (32 for most, 1 for per-chunk features).
    pub region_size: i32,
    /// Chunks inside a region in which the start may be placed.
    pub chunk_range: i32,
    /// Large structures use the triangular placement distribution.
    pub large: bool,
}

/// Variant properties of a generated structure start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructureVariant {
    pub abandoned: bool,
    pub basement: bool,
    pub giant: bool,
    /// Biome the variant was chosen for.
    pub biome: i32,
    /// Index of the start piece.
    pub start: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceKind {
    FortressStart,
    BridgeCrossing,
    EndShip,
    Other,
}

/// One bounding-boxed piece of a multi-piece structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub kind: PieceKind,
    /// Minimum corner (x, y, z).
    pub bb0: (i32, i32, i32),
    /// Maximum corner (x, y, z).
    pub bb1: (i32, i32, i32),
}

/// Progress through the stronghold rings of a seed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StrongholdCursor {
    /// Current stronghold (approximate until refined by the oracle).
    pub pos: Pos,
    /// Generation angle of the current ring slot, radians.
    pub angle: f64,
    /// Ring of the current stronghold, starting at 0.
    pub ring: i32,
    /// Strongholds resolved so far.
    pub index: i32,
    /// Oracle-private iteration state.
    pub rng: u64,
}

// ---------------------------------------------------------------------------
// Climate & layers
// ---------------------------------------------------------------------------

/// Climate noise parameters, in the index order used by `limok`/`limex`.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum ClimateParam {
    Temperature,
    Humidity,
    Continentalness,
    Erosion,
    Depth,
    Weirdness,
}

impl ClimateParam {
    pub const COUNT: usize = 6;

    pub fn from_index(i: usize) -> Option<ClimateParam> {
        match i {
            0 => Some(ClimateParam::Temperature),
            1 => Some(ClimateParam::Humidity),
            2 => Some(ClimateParam::Continentalness),
            3 => Some(ClimateParam::Erosion),
            4 => Some(ClimateParam::Depth),
            5 => Some(ClimateParam::Weirdness),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Pre-1.18 layer stack entry points the evaluator can query directly.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LegacyLayer {
    /// Biomes with rivers applied, 1:4.
    River4,
    /// Ocean temperature, 1:256.
    OceanTemp256,
    /// Temperature category, 1:1024.
    Temperature1024,
}

/// Which list of quad constellation bases to scan for.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum QuadBaseSet {
    HutIdeal,
    HutClassic,
    HutNormal,
    HutBarely,
    /// 48-bit monument bases with ≥ 90% quality.
    Monument90,
}

/// Constellation quality of a quad-hut base, best first.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum QuadTier {
    Ideal,
    Classic,
    Normal,
    Barely,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Deterministic generation queries.
///
/// Stateless queries take `&self`. Queries that need initialised noise or
/// layer state take the per-worker [`WorldOracle::Generator`], which the
/// evaluator prepares through [`WorldOracle::apply_seed`],
/// [`WorldOracle::init_climate`] and [`WorldOracle::init_surface`] before use.
pub trait WorldOracle: Send + Sync + 'static {
    /// Mutable generator state owned by one worker.
    type Generator: Send;

    fn new_generator(&self, mc: McVersion, large: bool) -> Self::Generator;

    /// Prepare biome generation of `dim` for `seed`.
    fn apply_seed(&self, g: &mut Self::Generator, dim: Dimension, seed: u64);

    /// Update only the Voronoi hash after the upper seed bits changed.
    fn refresh_voronoi(&self, g: &mut Self::Generator, seed: u64);

    /// Prepare a single climate parameter with at most `octaves` octaves.
    fn init_climate(
        &self,
        g: &mut Self::Generator,
        seed: u64,
        large: bool,
        param: ClimateParam,
        octaves: i32,
    );

    /// Prepare the surface noise of `dim` for `seed`.
    fn init_surface(&self, g: &mut Self::Generator, dim: Dimension, seed: u64);

    // -- biomes & noise ------------------------------------------------------

    /// Biome id at cell `(x, y, z)` of a grid with `scale` blocks per cell.
    fn biome_at(&self, g: &mut Self::Generator, scale: i32, x: i32, y: i32, z: i32) -> i32;

    /// Value of a legacy layer at a cell of that layer's grid.
    fn layer_at(&self, g: &mut Self::Generator, layer: LegacyLayer, seed: u64, x: i32, z: i32)
        -> i32;

    /// Raw climate noise at a 1:4 cell.
    fn climate_at(&self, g: &mut Self::Generator, param: ClimateParam, x: i32, z: i32) -> f64;

    /// Approximate surface height at a 1:4 cell.
    fn approx_height(&self, g: &mut Self::Generator, x: i32, z: i32) -> f32;

    fn spawn(&self, g: &mut Self::Generator) -> Pos;

    // -- structures ----------------------------------------------------------

    fn structure_config(&self, st: StructureType, mc: McVersion) -> Option<StructureConfig>;

    /// Attempted start of `st` in region `(rx, rz)`, if the region has one.
    fn structure_pos(&self, st: StructureType, mc: McVersion, seed: u64, rx: i32, rz: i32)
        -> Option<Pos>;

    /// Whether viability checks for `st` need the full 64-bit seed.
    ///
    /// Overworld biomes depend on all 64 bits; nether and end generation
    /// only on the lower 48.
    fn requires_full_seed(&self, st: StructureType) -> bool {
        st.dimension() == Dimension::Overworld
    }

    /// Biome id the start at `(x, z)` generates in, or `None` when the
    /// position is not viable.
    fn viable_structure_biome(
        &self,
        st: StructureType,
        g: &mut Self::Generator,
        x: i32,
        z: i32,
    ) -> Option<i32>;

    fn viable_end_city_terrain(&self, g: &mut Self::Generator, x: i32, z: i32) -> bool;

    /// Terrain estimate for 1.18+ structures.
    fn viable_structure_terrain(
        &self,
        st: StructureType,
        g: &mut Self::Generator,
        x: i32,
        z: i32,
    ) -> bool;

    fn variant(
        &self,
        st: StructureType,
        mc: McVersion,
        seed: u64,
        x: i32,
        z: i32,
        biome: i32,
    ) -> StructureVariant;

    fn structure_pieces(
        &self,
        st: StructureType,
        mc: McVersion,
        seed: u64,
        cx: i32,
        cz: i32,
    ) -> Vec<Piece>;

    /// Mineshafts in the chunk rectangle, written to `out`. Returns the
    /// number written.
    #[allow(clippy::too_many_arguments)]
    fn mineshafts(
        &self,
        mc: McVersion,
        seed: u64,
        cx1: i32,
        cz1: i32,
        cx2: i32,
        cz2: i32,
        out: &mut [Pos],
    ) -> usize;

    /// Approximate first stronghold; `cursor.pos` is the first guess.
    fn stronghold_start(&self, mc: McVersion, seed: u64) -> StrongholdCursor;

    /// Resolve the next stronghold into `cursor.pos`. Returns `false` once
    /// every stronghold has been produced.
    fn stronghold_next(&self, cursor: &mut StrongholdCursor, g: &mut Self::Generator) -> bool;

    fn is_slime_chunk(&self, seed: u64, cx: i32, cz: i32) -> bool;

    // -- quad constellations -------------------------------------------------

    fn quad_bases(&self, set: QuadBaseSet) -> &[u64];

    /// Regions `(rx, rz)` in the given window whose lower-left region starts
    /// a quad constellation with one of `bases` (compared on `lbit` bits).
    /// Results go to `out`; returns the number written.
    #[allow(clippy::too_many_arguments)]
    fn scan_for_quads(
        &self,
        cfg: &StructureConfig,
        radius: i32,
        seed48: u64,
        bases: &[u64],
        lbit: u32,
        salt: u64,
        x: i32,
        z: i32,
        w: i32,
        h: i32,
        out: &mut [Pos],
    ) -> usize;

    /// Enclosing radius of the constellation for `base`, or 0 when `base`
    /// does not produce one within `radius`.
    fn quad_base_radius(&self, cfg: &StructureConfig, base: u64, radius: i32) -> f64;

    fn quad_hut_tier(&self, cst: u64) -> QuadTier;

    /// Spawning-space quality of a quad-monument base.
    fn quad_monument_quality(&self, s48: u64) -> i32;

    /// Start of a structure for a bare region seed.
    fn feature_pos(&self, cfg: &StructureConfig, s48: u64, rx: i32, rz: i32) -> Pos;

    /// Best standing position for four structures with the given spawn box
    /// extents, plus the number of spawning spaces in reach.
    fn optimal_afk(&self, p: &[Pos; 4], ax: i32, ay: i32, az: i32) -> (Pos, i32);

    /// Process-wide memo of known constellations.
    fn quad_catalog(&self) -> &QuadCatalog;

    /// Region seed of `seed` shifted by `(rx, rz)` regions.
    fn move_structure(&self, seed: u64, rx: i32, rz: i32) -> u64 {
        seed.wrapping_sub((rx as i64).wrapping_mul(341_873_128_712) as u64)
            .wrapping_sub((rz as i64).wrapping_mul(132_897_987_541) as u64)
            & MASK48
    }
}
