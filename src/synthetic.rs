//! Synthetic world oracle.
//!
//! A deterministic stand-in for a real generator. In [`Fill::Hashed`] mode
//! every query answers from a hash of its inputs, so any seed produces a
//! plausible world. In [`Fill::Empty`] mode nothing exists until it is
//! placed through the `set_*` methods. Overrides take precedence in both
//! modes and may be added while the oracle is shared between workers.

use std::collections::{HashMap, HashSet};
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::oracle::{
    biome, ClimateParam, LegacyLayer, Piece, QuadBaseSet, QuadTier, StrongholdCursor,
    StructureConfig, StructureType, StructureVariant, WorldOracle,
};
use crate::quad::QuadCatalog;
use crate::types::{Dimension, McVersion, Pos, MASK48};

/// Hut constellations, best tier first; each tier includes the better ones.
const HUT_BASES: [u64; 4] = [0x1_a2b3, 0x4_c5d6, 0x7_e8f9, 0xa_0b1c];

/// Monument bases; the first exceeds 95% quality, the second 90%.
const MONUMENT_BASES: [u64; 2] = [0x2f_1234_5678, 0x61_8765_4321];

/// Largest region window a quad scan inspects; wider scans are centered.
const MAX_SCAN_SIDE: i32 = 1024;

/// Strongholds per ring from 1.9 on.
const RING_SIZES: [i32; 8] = [3, 6, 10, 15, 21, 28, 36, 9];

/// Palette the hashed mode draws overworld biomes from.
const OVERWORLD_PALETTE: [i32; 10] = [
    biome::PLAINS,
    biome::DESERT,
    biome::FOREST,
    biome::TAIGA,
    biome::SWAMP,
    biome::SAVANNA,
    biome::JUNGLE,
    biome::OCEAN,
    biome::MOUNTAINS,
    biome::SNOWY_TUNDRA,
];

const NETHER_PALETTE: [i32; 5] = [
    biome::NETHER_WASTES,
    biome::SOUL_SAND_VALLEY,
    biome::CRIMSON_FOREST,
    biome::WARPED_FOREST,
    biome::BASALT_DELTAS,
];

/// What exists where no override applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    Hashed,
    Empty,
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn hash(seed: u64, a: i32, b: i32, salt: u64) -> u64 {
    let cell = ((a as u32 as u64) << 32) | b as u32 as u64;
    mix(mix(seed ^ salt.rotate_left(17)).wrapping_add(cell))
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Rect {
    x1: i32,
    z1: i32,
    x2: i32,
    z2: i32,
}

impl Rect {
    fn contains(&self, x: i32, z: i32) -> bool {
        x >= self.x1 && x <= self.x2 && z >= self.z1 && z <= self.z2
    }
}

#[derive(Debug, Clone)]
struct BiomeRect {
    seed: Option<u64>,
    dim: Dimension,
    rect: Rect,
    id: i32,
}

#[derive(Debug, Clone)]
struct ClimateRect {
    seed: Option<u64>,
    param: ClimateParam,
    rect: Rect,
    value: f64,
}

#[derive(Debug, Default)]
struct Overrides {
    /// `(type, seed48, rx, rz)` → start, `None` for a forced empty region.
    structures: HashMap<(StructureType, u64, i32, i32), Option<Pos>>,
    unviable: HashSet<(StructureType, Pos)>,
    variants: HashMap<(StructureType, Pos), StructureVariant>,
    pieces: HashMap<(StructureType, i32, i32), Vec<Piece>>,
    /// Later entries win.
    biomes: Vec<BiomeRect>,
    climate: Vec<ClimateRect>,
    height: Option<f32>,
    spawns: HashMap<u64, Pos>,
    strongholds: HashMap<u64, Vec<Pos>>,
    slime: HashSet<(u64, i32, i32)>,
    mineshafts: HashSet<(u64, i32, i32)>,
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Per-worker state: records what the evaluator prepared.
#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    pub mc: McVersion,
    pub large: bool,
    pub seed: u64,
    pub dim: Option<Dimension>,
    pub surface: Option<Dimension>,
    /// Climate parameters initialised for `seed`.
    pub climate: Vec<ClimateParam>,
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

pub struct SyntheticOracle {
    fill: Fill,
    overrides: RwLock<Overrides>,
    calls: AtomicUsize,
    catalog: QuadCatalog,
}

impl SyntheticOracle {
    pub fn new(fill: Fill) -> Self {
        Self {
            fill,
            overrides: RwLock::new(Overrides::default()),
            calls: AtomicUsize::new(0),
            catalog: QuadCatalog::new(),
        }
    }

    /// Hash-filled world.
    pub fn hashed() -> Self {
        Self::new(Fill::Hashed)
    }

    /// World with nothing in it.
    pub fn empty() -> Self {
        Self::new(Fill::Empty)
    }

    pub fn fill(&self) -> Fill {
        self.fill
    }

    /// Oracle queries answered so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::Relaxed);
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    // -----------------------------------------------------------------------
    // Placement
    // -----------------------------------------------------------------------

    /// Place a start of `st` at `pos` for every seed sharing the lower 48
    /// bits of `seed`.
    pub fn set_structure(&self, st: StructureType, seed: u64, pos: Pos) {
        let (rx, rz) = self.region_of(st, pos);
        self.overrides
            .write()
            .structures
            .insert((st, seed & MASK48, rx, rz), Some(pos));
    }

    /// Force region `(rx, rz)` of `st` to be empty.
    pub fn clear_region(&self, st: StructureType, seed: u64, rx: i32, rz: i32) {
        self.overrides
            .write()
            .structures
            .insert((st, seed & MASK48, rx, rz), None);
    }

    /// Make the start of `st` at `pos` fail every viability check.
    pub fn set_unviable(&self, st: StructureType, pos: Pos) {
        self.overrides.write().unviable.insert((st, pos));
    }

    pub fn set_variant(&self, st: StructureType, pos: Pos, variant: StructureVariant) {
        self.overrides.write().variants.insert((st, pos), variant);
    }

    pub fn set_pieces(&self, st: StructureType, pos: Pos, pieces: Vec<Piece>) {
        self.overrides
            .write()
            .pieces
            .insert((st, pos.x >> 4, pos.z >> 4), pieces);
    }

    /// Paint biome `id` over a block rectangle of `dim`, for one seed or
    /// for all of them.
    pub fn set_biome(&self, seed: Option<u64>, dim: Dimension, x1: i32, z1: i32, x2: i32, z2: i32, id: i32) {
        self.overrides.write().biomes.push(BiomeRect {
            seed,
            dim,
            rect: Rect { x1, z1, x2, z2 },
            id,
        });
    }

    /// Raw climate noise `value` over a block rectangle.
    pub fn set_climate(
        &self,
        seed: Option<u64>,
        param: ClimateParam,
        x1: i32,
        z1: i32,
        x2: i32,
        z2: i32,
        value: f64,
    ) {
        self.overrides.write().climate.push(ClimateRect {
            seed,
            param,
            rect: Rect { x1, z1, x2, z2 },
            value,
        });
    }

    pub fn set_height(&self, y: f32) {
        self.overrides.write().height = Some(y);
    }

    pub fn set_spawn(&self, seed: u64, pos: Pos) {
        self.overrides.write().spawns.insert(seed, pos);
    }

    /// Exact strongholds of a 48-bit seed, in generation order.
    pub fn set_strongholds(&self, seed: u64, list: Vec<Pos>) {
        self.overrides.write().strongholds.insert(seed & MASK48, list);
    }

    pub fn set_slime_chunk(&self, seed: u64, cx: i32, cz: i32) {
        self.overrides.write().slime.insert((seed & MASK48, cx, cz));
    }

    pub fn set_mineshaft(&self, seed: u64, cx: i32, cz: i32) {
        self.overrides.write().mineshafts.insert((seed & MASK48, cx, cz));
    }

    fn region_of(&self, st: StructureType, pos: Pos) -> (i32, i32) {
        let size = self
            .structure_table(st)
            .map_or(32, |sc| sc.region_size)
            .max(1)
            << 4;
        (pos.x.div_euclid(size), pos.z.div_euclid(size))
    }

    fn structure_table(&self, st: StructureType) -> Option<StructureConfig> {
        use StructureType as S;
        let (salt, region_size, chunk_range, large) = match st {
            S::DesertPyramid => (14_357_617, 32, 24, false),
            S::JunglePyramid => (14_357_619, 32, 24, false),
            S::SwampHut => (14_357_620, 32, 24, false),
            S::Igloo => (14_357_618, 32, 24, false),
            S::Village => (10_387_312, 34, 26, false),
            S::OceanRuin => (14_357_621, 20, 12, false),
            S::Shipwreck => (165_745_295, 24, 20, false),
            S::Monument => (10_387_313, 32, 27, true),
            S::Mansion => (10_387_319, 80, 60, true),
            S::Outpost => (165_745_296, 32, 24, false),
            S::RuinedPortal => (34_222_645, 40, 25, false),
            S::RuinedPortalNether => (34_222_645, 25, 15, false),
            S::AncientCity => (20_083_232, 24, 16, false),
            S::Treasure => (10_387_320, 1, 1, false),
            S::DesertWell => (40_002, 1, 1, false),
            S::TrailRuins => (83_469_867, 34, 26, false),
            S::Fortress => (30_084_232, 27, 23, false),
            S::Bastion => (30_084_232, 27, 23, false),
            S::EndCity => (10_387_313, 20, 9, true),
            S::EndGateway => (40_013, 1, 1, false),
            S::Mineshaft => return None,
        };
        Some(StructureConfig {
            salt,
            region_size,
            chunk_range,
            large,
        })
    }

    // -----------------------------------------------------------------------
    // Answers
    // -----------------------------------------------------------------------

    fn biome_lookup(&self, seed: u64, dim: Dimension, bx: i32, bz: i32) -> i32 {
        let key = if dim == Dimension::Overworld { seed } else { seed & MASK48 };
        let ov = self.overrides.read();
        let hit = ov.biomes.iter().rev().find(|b| {
            b.dim == dim
                && b.seed.map_or(true, |s| {
                    let s = if dim == Dimension::Overworld { s } else { s & MASK48 };
                    s == key
                })
                && b.rect.contains(bx, bz)
        });
        if let Some(b) = hit {
            return b.id;
        }
        match (self.fill, dim) {
            (Fill::Empty, Dimension::Overworld) => biome::PLAINS,
            (Fill::Empty, Dimension::Nether) => biome::NETHER_WASTES,
            (_, Dimension::End) => biome::THE_END,
            (Fill::Hashed, Dimension::Overworld) => {
                let h = hash(key, bx >> 8, bz >> 8, 1);
                OVERWORLD_PALETTE[(h % OVERWORLD_PALETTE.len() as u64) as usize]
            }
            (Fill::Hashed, Dimension::Nether) => {
                let h = hash(key, bx >> 7, bz >> 7, 2);
                NETHER_PALETTE[(h % NETHER_PALETTE.len() as u64) as usize]
            }
        }
    }

    fn stronghold_at(&self, mc: McVersion, seed: u64, index: i32) -> Option<(Pos, f64, i32)> {
        let seed48 = seed & MASK48;
        if let Some(list) = self.overrides.read().strongholds.get(&seed48) {
            let p = *list.get(index as usize)?;
            let mut ring = 0;
            let mut first = 0;
            for (r, &n) in RING_SIZES.iter().enumerate() {
                if index < first + n {
                    ring = r as i32;
                    break;
                }
                first += n;
            }
            return Some((p, (p.z as f64).atan2(p.x as f64), ring));
        }

        let base = (hash(seed48, 0, 0, 3) % 1_000_000) as f64 / 1_000_000.0 * TAU;
        if mc < McVersion::V1_9 {
            if index >= 3 {
                return None;
            }
            let angle = base + TAU * index as f64 / 3.0;
            let r = 640.0 + (hash(seed48, index, 0, 4) % 512) as f64;
            return Some((ring_pos(angle, r), angle, 0));
        }

        let mut first = 0;
        for (ring, &n) in RING_SIZES.iter().enumerate() {
            if index < first + n {
                let slot = index - first;
                let angle = base + ring as f64 + TAU * slot as f64 / n as f64;
                let r = 1408.0 + 3072.0 * ring as f64 + (hash(seed48, index, 1, 4) % 1280) as f64;
                return Some((ring_pos(angle, r), angle, ring as i32));
            }
            first += n;
        }
        None
    }
}

/// Chunk-centered position at `angle` and radius `r`.
fn ring_pos(angle: f64, r: f64) -> Pos {
    let x = (angle.cos() * r).round() as i32;
    let z = (angle.sin() * r).round() as i32;
    Pos::new(((x >> 4) << 4) + 8, ((z >> 4) << 4) + 8)
}

impl Default for SyntheticOracle {
    fn default() -> Self {
        Self::hashed()
    }
}

impl WorldOracle for SyntheticOracle {
    type Generator = SyntheticGenerator;

    fn new_generator(&self, mc: McVersion, large: bool) -> SyntheticGenerator {
        SyntheticGenerator {
            mc,
            large,
            seed: 0,
            dim: None,
            surface: None,
            climate: Vec::new(),
        }
    }

    fn apply_seed(&self, g: &mut SyntheticGenerator, dim: Dimension, seed: u64) {
        self.tick();
        g.seed = seed;
        g.dim = Some(dim);
        g.surface = None;
        g.climate.clear();
        if dim == Dimension::Overworld && g.mc >= McVersion::V1_18 {
            g.climate = (0..ClimateParam::COUNT).filter_map(ClimateParam::from_index).collect();
        }
    }

    fn refresh_voronoi(&self, g: &mut SyntheticGenerator, seed: u64) {
        self.tick();
        g.seed = seed;
    }

    fn init_climate(
        &self,
        g: &mut SyntheticGenerator,
        seed: u64,
        large: bool,
        param: ClimateParam,
        _octaves: i32,
    ) {
        self.tick();
        if g.seed != seed {
            g.climate.clear();
        }
        g.seed = seed;
        g.large = large;
        if !g.climate.contains(&param) {
            g.climate.push(param);
        }
    }

    fn init_surface(&self, g: &mut SyntheticGenerator, dim: Dimension, seed: u64) {
        self.tick();
        g.seed = seed;
        g.surface = Some(dim);
    }

    fn biome_at(&self, g: &mut SyntheticGenerator, scale: i32, x: i32, _y: i32, z: i32) -> i32 {
        self.tick();
        let Some(dim) = g.dim else {
            return -1;
        };
        self.biome_lookup(g.seed, dim, x.saturating_mul(scale), z.saturating_mul(scale))
    }

    fn layer_at(&self, g: &mut SyntheticGenerator, layer: LegacyLayer, seed: u64, x: i32, z: i32) -> i32 {
        self.tick();
        match layer {
            LegacyLayer::River4 => {
                self.biome_lookup(g.seed, Dimension::Overworld, x.saturating_mul(4), z.saturating_mul(4))
            }
            LegacyLayer::OceanTemp256 => {
                let id = self.biome_lookup(
                    seed & MASK48,
                    Dimension::Overworld,
                    x.saturating_mul(256),
                    z.saturating_mul(256),
                );
                match id {
                    biome::OCEAN | biome::DEEP_OCEAN | biome::WARM_OCEAN | biome::COLD_OCEAN
                    | biome::FROZEN_OCEAN => id,
                    _ if self.fill == Fill::Empty => biome::OCEAN,
                    _ => [biome::WARM_OCEAN, biome::OCEAN, biome::COLD_OCEAN]
                        [(hash(seed & MASK48, x, z, 5) % 3) as usize],
                }
            }
            LegacyLayer::Temperature1024 => match self.fill {
                Fill::Empty => 1,
                Fill::Hashed => (hash(g.seed, x, z, 6) % 9) as i32,
            },
        }
    }

    fn climate_at(&self, g: &mut SyntheticGenerator, param: ClimateParam, x: i32, z: i32) -> f64 {
        self.tick();
        if !g.climate.contains(&param) {
            return f64::NAN;
        }
        let (bx, bz) = (x.saturating_mul(4), z.saturating_mul(4));
        let ov = self.overrides.read();
        let hit = ov.climate.iter().rev().find(|c| {
            c.param == param && c.seed.map_or(true, |s| s == g.seed) && c.rect.contains(bx, bz)
        });
        if let Some(c) = hit {
            return c.value;
        }
        match self.fill {
            Fill::Empty => 0.0,
            Fill::Hashed => {
                let h = hash(g.seed, x >> 4, z >> 4, 7 + param.index() as u64);
                (h % 20_001) as f64 / 10_000.0 - 1.0
            }
        }
    }

    fn approx_height(&self, g: &mut SyntheticGenerator, x: i32, z: i32) -> f32 {
        self.tick();
        if let Some(y) = self.overrides.read().height {
            return y;
        }
        match self.fill {
            Fill::Empty => 64.0,
            Fill::Hashed => 40.0 + (hash(g.seed, x >> 2, z >> 2, 13) % 80) as f32,
        }
    }

    fn spawn(&self, g: &mut SyntheticGenerator) -> Pos {
        self.tick();
        if let Some(&p) = self.overrides.read().spawns.get(&g.seed) {
            return p;
        }
        match self.fill {
            Fill::Empty => Pos::new(0, 0),
            Fill::Hashed => {
                let h = hash(g.seed, 0, 0, 14);
                Pos::new((h % 512) as i32 - 256, ((h >> 16) % 512) as i32 - 256)
            }
        }
    }

    fn structure_config(&self, st: StructureType, mc: McVersion) -> Option<StructureConfig> {
        self.tick();
        let since = match st {
            StructureType::Outpost => McVersion::V1_14,
            StructureType::Bastion => McVersion::V1_16,
            StructureType::RuinedPortal | StructureType::RuinedPortalNether => McVersion::V1_16,
            StructureType::AncientCity => McVersion::V1_19,
            StructureType::TrailRuins => McVersion::V1_20,
            StructureType::Shipwreck | StructureType::OceanRuin | StructureType::Treasure => {
                McVersion::V1_13
            }
            StructureType::Monument | StructureType::Mansion => McVersion::V1_8,
            StructureType::EndCity | StructureType::EndGateway => McVersion::V1_9,
            _ => McVersion::V1_7,
        };
        if mc < since {
            return None;
        }
        self.structure_table(st)
    }

    fn structure_pos(&self, st: StructureType, mc: McVersion, seed: u64, rx: i32, rz: i32) -> Option<Pos> {
        self.tick();
        let seed48 = seed & MASK48;
        if let Some(&p) = self.overrides.read().structures.get(&(st, seed48, rx, rz)) {
            return p;
        }
        if self.fill == Fill::Empty {
            return None;
        }
        let sc = self.structure_table(st)?;
        let _ = mc;
        let h = hash(seed48, rx, rz, sc.salt);
        if h % 4 == 0 {
            return None;
        }
        let span = (sc.chunk_range.max(1) as u64) * 16;
        let size = sc.region_size << 4;
        Some(Pos::new(
            rx.wrapping_mul(size).wrapping_add(((h >> 8) % span) as i32),
            rz.wrapping_mul(size).wrapping_add(((h >> 24) % span) as i32),
        ))
    }

    fn viable_structure_biome(&self, st: StructureType, g: &mut SyntheticGenerator, x: i32, z: i32) -> Option<i32> {
        self.tick();
        if self.overrides.read().unviable.contains(&(st, Pos::new(x, z))) {
            return None;
        }
        let dim = g.dim?;
        if dim != st.dimension() {
            return None;
        }
        Some(self.biome_lookup(g.seed, dim, x, z))
    }

    fn viable_end_city_terrain(&self, g: &mut SyntheticGenerator, x: i32, z: i32) -> bool {
        self.tick();
        g.surface == Some(Dimension::End)
            && !self
                .overrides
                .read()
                .unviable
                .contains(&(StructureType::EndCity, Pos::new(x, z)))
    }

    fn viable_structure_terrain(&self, st: StructureType, _g: &mut SyntheticGenerator, x: i32, z: i32) -> bool {
        self.tick();
        !self.overrides.read().unviable.contains(&(st, Pos::new(x, z)))
    }

    fn variant(
        &self,
        st: StructureType,
        _mc: McVersion,
        seed: u64,
        x: i32,
        z: i32,
        biome: i32,
    ) -> StructureVariant {
        self.tick();
        if let Some(&v) = self.overrides.read().variants.get(&(st, Pos::new(x, z))) {
            return v;
        }
        match self.fill {
            Fill::Empty => StructureVariant {
                biome,
                ..StructureVariant::default()
            },
            Fill::Hashed => {
                let h = hash(seed & MASK48, x, z, 15);
                StructureVariant {
                    abandoned: h % 50 == 0,
                    basement: (h >> 8) % 2 == 0,
                    giant: (h >> 16) % 20 == 0,
                    biome,
                    start: ((h >> 24) % 3) as i32,
                }
            }
        }
    }

    fn structure_pieces(&self, st: StructureType, _mc: McVersion, _seed: u64, cx: i32, cz: i32) -> Vec<Piece> {
        self.tick();
        self.overrides
            .read()
            .pieces
            .get(&(st, cx, cz))
            .cloned()
            .unwrap_or_default()
    }

    fn mineshafts(
        &self,
        _mc: McVersion,
        seed: u64,
        cx1: i32,
        cz1: i32,
        cx2: i32,
        cz2: i32,
        out: &mut [Pos],
    ) -> usize {
        self.tick();
        let seed48 = seed & MASK48;
        let ov = self.overrides.read();
        let mut n = 0;
        for cz in cz1..=cz2 {
            for cx in cx1..=cx2 {
                if n >= out.len() {
                    return n;
                }
                let hit = ov.mineshafts.contains(&(seed48, cx, cz))
                    || (self.fill == Fill::Hashed && hash(seed48, cx, cz, 16) % 250 == 0);
                if hit {
                    out[n] = Pos::new(cx << 4, cz << 4);
                    n += 1;
                }
            }
        }
        n
    }

    fn stronghold_start(&self, mc: McVersion, seed: u64) -> StrongholdCursor {
        self.tick();
        let (pos, angle, ring) = self.stronghold_at(mc, seed, 0).unwrap_or_default();
        StrongholdCursor {
            pos,
            angle,
            ring,
            index: 0,
            rng: seed & MASK48,
        }
    }

    fn stronghold_next(&self, cursor: &mut StrongholdCursor, g: &mut SyntheticGenerator) -> bool {
        self.tick();
        let mc = g.mc;
        let seed = cursor.rng & MASK48;
        match self.stronghold_at(mc, seed, cursor.index) {
            Some((pos, angle, ring)) => {
                cursor.pos = pos;
                cursor.angle = angle;
                cursor.ring = ring;
                cursor.index += 1;
                true
            }
            None => false,
        }
    }

    fn is_slime_chunk(&self, seed: u64, cx: i32, cz: i32) -> bool {
        self.tick();
        let seed48 = seed & MASK48;
        if self.overrides.read().slime.contains(&(seed48, cx, cz)) {
            return true;
        }
        self.fill == Fill::Hashed && hash(seed48, cx, cz, 17) % 10 == 0
    }

    fn quad_bases(&self, set: QuadBaseSet) -> &[u64] {
        match set {
            QuadBaseSet::HutIdeal => &HUT_BASES[..1],
            QuadBaseSet::HutClassic => &HUT_BASES[..2],
            QuadBaseSet::HutNormal => &HUT_BASES[..3],
            QuadBaseSet::HutBarely => &HUT_BASES,
            QuadBaseSet::Monument90 => &MONUMENT_BASES,
        }
    }

    fn scan_for_quads(
        &self,
        _cfg: &StructureConfig,
        _radius: i32,
        seed48: u64,
        bases: &[u64],
        lbit: u32,
        salt: u64,
        x: i32,
        z: i32,
        w: i32,
        h: i32,
        out: &mut [Pos],
    ) -> usize {
        self.tick();
        let lmask = if lbit >= 64 { u64::MAX } else { (1u64 << lbit) - 1 };
        let (x, w) = clamp_window(x, w);
        let (z, h) = clamp_window(z, h);
        let mut n = 0;
        for rz in z..z.saturating_add(h) {
            for rx in x..x.saturating_add(w) {
                if n >= out.len() {
                    return n;
                }
                let s = self.move_structure(seed48, -rx, -rz).wrapping_add(salt) & lmask;
                if bases.contains(&s) {
                    out[n] = Pos::new(rx, rz);
                    n += 1;
                }
            }
        }
        n
    }

    fn quad_base_radius(&self, _cfg: &StructureConfig, base: u64, _radius: i32) -> f64 {
        self.tick();
        if HUT_BASES.contains(&(base & 0xfffff)) {
            120.0 + (HUT_BASES.iter().position(|&b| b == base & 0xfffff).unwrap_or(0) as f64)
        } else if MONUMENT_BASES.contains(&(base & MASK48)) {
            150.0
        } else {
            0.0
        }
    }

    fn quad_hut_tier(&self, cst: u64) -> QuadTier {
        match HUT_BASES.iter().position(|&b| b == cst & 0xfffff) {
            Some(0) => QuadTier::Ideal,
            Some(1) => QuadTier::Classic,
            Some(2) => QuadTier::Normal,
            _ => QuadTier::Barely,
        }
    }

    fn quad_monument_quality(&self, s48: u64) -> i32 {
        self.tick();
        match MONUMENT_BASES.iter().position(|&b| b == s48 & MASK48) {
            Some(0) => 13_000,
            Some(_) => 12_500,
            None => 0,
        }
    }

    fn feature_pos(&self, cfg: &StructureConfig, s48: u64, rx: i32, rz: i32) -> Pos {
        let span = (cfg.chunk_range.max(1) as u64) * 16;
        let size = cfg.region_size << 4;
        let h = hash(s48 & MASK48, rx, rz, 18);
        Pos::new(
            rx * size + (h % span) as i32,
            rz * size + ((h >> 20) % span) as i32,
        )
    }

    fn optimal_afk(&self, p: &[Pos; 4], ax: i32, ay: i32, az: i32) -> (Pos, i32) {
        let sx: i64 = p.iter().map(|q| q.x as i64).sum();
        let sz: i64 = p.iter().map(|q| q.z as i64).sum();
        let center = Pos::new((sx / 4) as i32 + ax / 2, (sz / 4) as i32 + az / 2);
        (center, 4 * ax * az.max(1) * ay.max(1))
    }

    fn quad_catalog(&self) -> &QuadCatalog {
        &self.catalog
    }
}

/// Limit a scan window to [`MAX_SCAN_SIDE`] cells around its middle.
fn clamp_window(start: i32, len: i32) -> (i32, i32) {
    if len <= MAX_SCAN_SIDE {
        return (start, len.max(0));
    }
    let mid = start as i64 + len as i64 / 2;
    ((mid - MAX_SCAN_SIDE as i64 / 2) as i32, MAX_SCAN_SIDE)
}
