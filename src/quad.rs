//! Quad constellations: four like structures close enough to be worked from
//! one standing position.
//!
//! Known constellations are enumerated once per process from the oracle's
//! base tables and memoised in a [`QuadCatalog`]. The evaluator only reads
//! them through [`quad_hut`] and [`quad_monument`].

use std::collections::HashMap;

use log::debug;
use parking_lot::RwLock;

use crate::env::OracleState;
use crate::oracle::{QuadBaseSet, QuadTier, StructureConfig, StructureType, WorldOracle};
use crate::types::{McVersion, Pos, MASK48};

/// Bits of a quad-hut constellation constant.
pub const HUT_CONSTELLATION_MASK: u64 = 0xfffff;

/// Step between candidate seeds sharing the same lower 20 bits.
const HUT_SEED_STEP: u64 = 0x10_0000;

/// Candidates tried per constellation before giving up on it.
const HUT_SEED_ATTEMPTS: u64 = 1 << 16;

/// Search radius for constellations of a seed, in blocks.
const WORLD_RADIUS: i32 = 30_000_000;

/// Maximum constellations [`find_quad_structures`] reports.
const MAX_QUADS: usize = 1000;

/// Static description of one constellation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadInfo {
    /// Defining constant: 20-bit hut constellation or 48-bit monument base.
    pub c: u64,
    /// Member structure positions relative to the lower-left region.
    pub p: [Pos; 4],
    /// Best standing position, relative to the lower-left region.
    pub afk: Pos,
    /// Spawning spaces in reach of `afk`.
    pub spcnt: i32,
    /// Enclosing radius of the four structures.
    pub rad: f64,
    /// Hut tier; `None` for monuments.
    pub tier: Option<QuadTier>,
    pub st: StructureType,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Process-wide memo of known constellations, built under the write lock by
/// the first lookup and never evicted. Lookups after that share the read lock.
#[derive(Debug, Default)]
pub struct QuadCatalog {
    huts: RwLock<Option<HashMap<u64, QuadInfo>>>,
    monuments: RwLock<Option<HashMap<u64, QuadInfo>>>,
}

impl QuadCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries memoised so far as `(huts, monuments)`; `None` until built.
    pub fn sizes(&self) -> (Option<usize>, Option<usize>) {
        (
            self.huts.read().as_ref().map(HashMap::len),
            self.monuments.read().as_ref().map(HashMap::len),
        )
    }
}

/// Salt-free placement config of `st` for the newest release.
fn base_config<O: WorldOracle + ?Sized>(oracle: &O, st: StructureType) -> Option<StructureConfig> {
    oracle
        .structure_config(st, McVersion::NEWEST)
        .map(|sc| StructureConfig { salt: 0, ..sc })
}

/// Read `key` from a memo table, building the table first if no lookup has.
fn lookup(
    table: &RwLock<Option<HashMap<u64, QuadInfo>>>,
    key: u64,
    build: impl FnOnce() -> HashMap<u64, QuadInfo>,
) -> Option<QuadInfo> {
    if let Some(map) = table.read().as_ref() {
        return map.get(&key).copied();
    }
    let mut guard = table.write();
    // another worker may have built it while we waited
    guard.get_or_insert_with(build).get(&key).copied()
}

/// Look up the hut constellation `cst` (lower 20 bits of the region seed).
pub fn quad_hut<O: WorldOracle + ?Sized>(oracle: &O, cst: u64) -> Option<QuadInfo> {
    lookup(&oracle.quad_catalog().huts, cst & HUT_CONSTELLATION_MASK, || build_huts(oracle))
}

/// Look up the monument base `s48`.
pub fn quad_monument<O: WorldOracle + ?Sized>(oracle: &O, s48: u64) -> Option<QuadInfo> {
    lookup(&oracle.quad_catalog().monuments, s48 & MASK48, || build_monuments(oracle))
}

fn build_huts<O: WorldOracle + ?Sized>(oracle: &O) -> HashMap<u64, QuadInfo> {
    let mut out = HashMap::new();
    let Some(sc) = base_config(oracle, StructureType::SwampHut) else {
        return out;
    };
    let bases = oracle.quad_bases(QuadBaseSet::HutBarely);

    for &cst in bases {
        // find one concrete seed realising this constellation
        let found = (0..HUT_SEED_ATTEMPTS)
            .map(|i| cst.wrapping_add(i * HUT_SEED_STEP))
            .find_map(|s| {
                let mut hit = [Pos::default(); 1];
                if oracle.scan_for_quads(&sc, 128, s, bases, 20, 0, 0, 0, 1, 1, &mut hit) == 0 {
                    return None;
                }
                let rad = oracle.quad_base_radius(&sc, s, 160);
                (rad != 0.0).then_some((s, rad))
            });
        let Some((s, rad)) = found else {
            debug!("no seed realises hut constellation {:05x}", cst);
            continue;
        };

        let p = corners(oracle, &sc, s);
        let (afk, spcnt) = oracle.optimal_afk(&p, 7, 7, 9);
        out.insert(
            cst,
            QuadInfo {
                c: cst,
                p,
                afk,
                spcnt,
                rad,
                tier: Some(oracle.quad_hut_tier(cst)),
                st: StructureType::SwampHut,
            },
        );
    }
    debug!("quad-hut catalog built: {} constellations", out.len());
    out
}

fn build_monuments<O: WorldOracle + ?Sized>(oracle: &O) -> HashMap<u64, QuadInfo> {
    let mut out = HashMap::new();
    let Some(sc) = base_config(oracle, StructureType::Monument) else {
        return out;
    };

    for &s in oracle.quad_bases(QuadBaseSet::Monument90) {
        let p = corners(oracle, &sc, s);
        let (afk, spcnt) = oracle.optimal_afk(&p, 58, 0, 58);
        out.insert(
            s,
            QuadInfo {
                c: s,
                p,
                afk: Pos::new(afk.x - 29, afk.z - 29),
                spcnt,
                rad: oracle.quad_base_radius(&sc, s, 160),
                tier: None,
                st: StructureType::Monument,
            },
        );
    }
    debug!("quad-monument catalog built: {} bases", out.len());
    out
}

fn corners<O: WorldOracle + ?Sized>(oracle: &O, sc: &StructureConfig, s: u64) -> [Pos; 4] {
    [
        oracle.feature_pos(sc, s, 0, 0),
        oracle.feature_pos(sc, s, 0, 1),
        oracle.feature_pos(sc, s, 1, 0),
        oracle.feature_pos(sc, s, 1, 1),
    ]
}

// ---------------------------------------------------------------------------
// Per-seed listing
// ---------------------------------------------------------------------------

/// List every viable quad constellation of `st` (swamp huts or monuments)
/// for the current seed of `world`, within ±30M blocks.
///
/// Member positions are absolute; a constellation is reported only when all
/// four structures pass the biome viability check.
pub fn find_quad_structures<O: WorldOracle>(
    world: &mut OracleState<O>,
    st: StructureType,
) -> Vec<QuadInfo> {
    let (radius, set, lbit, mask) = match st {
        StructureType::SwampHut => (128, QuadBaseSet::HutBarely, 20, HUT_CONSTELLATION_MASK),
        StructureType::Monument => (160, QuadBaseSet::Monument90, 48, MASK48),
        _ => return Vec::new(),
    };
    let oracle = world.oracle().clone();
    let (mc, seed) = (world.mc(), world.seed());
    let Some(sc) = oracle.structure_config(st, mc) else {
        return Vec::new();
    };

    let r = WORLD_RADIUS / 512;
    let mut regions = vec![Pos::default(); MAX_QUADS];
    let n = oracle.scan_for_quads(
        &sc,
        radius,
        seed & MASK48,
        oracle.quad_bases(set),
        lbit,
        sc.salt,
        -r,
        -r,
        2 * r,
        2 * r,
        &mut regions,
    );
    regions.truncate(n);

    world.init_for_dim(st.dimension());
    let mut out = Vec::new();
    for qr in regions {
        let mut p = [Pos::default(); 4];
        let offsets = [(0, 0), (0, 1), (1, 0), (1, 1)];
        let mut viable = true;
        for (slot, (dx, dz)) in p.iter_mut().zip(offsets) {
            match oracle.structure_pos(st, mc, seed, qr.x + dx, qr.z + dz) {
                Some(pos) if oracle.viable_structure_biome(st, world.generator(), pos.x, pos.z).is_some() => {
                    *slot = pos;
                }
                _ => {
                    viable = false;
                    break;
                }
            }
        }
        if !viable {
            continue;
        }

        let (afk, spcnt) = match st {
            StructureType::SwampHut => oracle.optimal_afk(&p, 7, 7, 9),
            _ => {
                let (afk, n) = oracle.optimal_afk(&p, 58, 0, 58);
                (Pos::new(afk.x - 29, afk.z - 29), n)
            }
        };
        let base = oracle.move_structure(seed, -qr.x, -qr.z);
        let c = base.wrapping_add(sc.salt) & mask;
        out.push(QuadInfo {
            c,
            p,
            afk,
            spcnt,
            rad: oracle.quad_base_radius(&sc, base, 160),
            tier: (st == StructureType::SwampHut).then(|| oracle.quad_hut_tier(c)),
            st,
        });
    }
    out
}
