//! Structure variant checks: abandoned villages, igloo basements, end
//! ships, dense fortress crossings and specific start pieces.

use crate::condition::{
    Condition, VAR_ABANDONED, VAR_BASEMENT, VAR_DENSE_BB, VAR_ENDSHIP, VAR_NOT, VAR_WITH_START,
};
use crate::env::OracleState;
use crate::oracle::{biome, Piece, PieceKind, StructureType, StructureVariant, WorldOracle};
use crate::types::{Dimension, McVersion, Pos};

/// A selectable start piece. `varstart` bit `i` selects `START_PIECES[i]`.
#[derive(Debug, Clone, Copy)]
pub struct StartPiece {
    pub st: StructureType,
    pub start: i32,
    /// Required biome, -1 for any.
    pub biome: i32,
    /// Required giant flag (ruined portals), -1 for any.
    pub giant: i32,
    pub name: &'static str,
}

const fn piece(st: StructureType, start: i32, biome: i32, giant: i32, name: &'static str) -> StartPiece {
    StartPiece {
        st,
        start,
        biome,
        giant,
        name,
    }
}

pub const START_PIECES: &[StartPiece] = &[
    piece(StructureType::Village, 0, biome::PLAINS, -1, "plains fountain"),
    piece(StructureType::Village, 1, biome::PLAINS, -1, "plains meeting point 1"),
    piece(StructureType::Village, 2, biome::PLAINS, -1, "plains meeting point 2"),
    piece(StructureType::Village, 0, biome::DESERT, -1, "desert meeting point 1"),
    piece(StructureType::Village, 1, biome::DESERT, -1, "desert meeting point 2"),
    piece(StructureType::Village, 2, biome::DESERT, -1, "desert meeting point 3"),
    piece(StructureType::Village, 0, biome::SAVANNA, -1, "savanna meeting point 1"),
    piece(StructureType::Village, 1, biome::SAVANNA, -1, "savanna meeting point 2"),
    piece(StructureType::Village, 0, biome::TAIGA, -1, "taiga meeting point 1"),
    piece(StructureType::Village, 1, biome::TAIGA, -1, "taiga meeting point 2"),
    piece(StructureType::Village, 0, biome::SNOWY_TUNDRA, -1, "snowy meeting point 1"),
    piece(StructureType::Village, 1, biome::SNOWY_TUNDRA, -1, "snowy meeting point 2"),
    piece(StructureType::Bastion, 0, -1, -1, "housing units"),
    piece(StructureType::Bastion, 1, -1, -1, "hoglin stables"),
    piece(StructureType::Bastion, 2, -1, -1, "treasure room"),
    piece(StructureType::Bastion, 3, -1, -1, "bridge"),
    piece(StructureType::RuinedPortal, 0, -1, 0, "portal 1"),
    piece(StructureType::RuinedPortal, 1, -1, 0, "portal 2"),
    piece(StructureType::RuinedPortal, 2, -1, 0, "portal 3"),
    piece(StructureType::RuinedPortal, 0, -1, 1, "giant portal 1"),
    piece(StructureType::RuinedPortal, 1, -1, 1, "giant portal 2"),
    piece(StructureType::RuinedPortal, 2, -1, 1, "giant portal 3"),
    piece(StructureType::RuinedPortalNether, 0, -1, 0, "nether portal 1"),
    piece(StructureType::RuinedPortalNether, 1, -1, 0, "nether portal 2"),
    piece(StructureType::RuinedPortalNether, 0, -1, 1, "nether giant portal 1"),
];

/// Village biomes tried before the biome of a start is known; the plains
/// variant also covers meadows.
pub const VILLAGE_BIOMES: [i32; 5] = [
    biome::PLAINS,
    biome::DESERT,
    biome::SAVANNA,
    biome::TAIGA,
    biome::SNOWY_TUNDRA,
];

/// Whether the structure at `pos` matches the variant flags of `c`.
///
/// For dense fortresses `pos` is moved onto the crossing that satisfied
/// the check.
pub fn is_variant_ok<O: WorldOracle>(
    c: &Condition,
    world: &mut OracleState<O>,
    st: StructureType,
    varbiome: i32,
    pos: &mut Pos,
) -> bool {
    let oracle = world.oracle().clone();
    let (mc, seed) = (world.mc(), world.seed());
    let negate = c.varflags & VAR_NOT != 0;

    let sv = match st {
        StructureType::Village => {
            if mc < McVersion::V1_10 {
                return true;
            }
            let sv = oracle.variant(st, mc, seed, pos.x, pos.z, varbiome);
            if c.varflags & VAR_ABANDONED != 0 && sv.abandoned == negate {
                return false;
            }
            if c.varflags & VAR_WITH_START == 0 || mc < McVersion::V1_14 {
                return true;
            }
            sv
        }
        StructureType::Bastion => {
            if mc <= McVersion::V1_15 {
                return true;
            }
            let sv = oracle.variant(st, mc, seed, pos.x, pos.z, -1);
            if c.varflags & VAR_WITH_START == 0 {
                return true;
            }
            sv
        }
        StructureType::RuinedPortal | StructureType::RuinedPortalNether => {
            if mc <= McVersion::V1_15 {
                return true;
            }
            let dim = if st == StructureType::RuinedPortal {
                Dimension::Overworld
            } else {
                Dimension::Nether
            };
            world.init_for_dim(dim);
            let id = oracle.biome_at(world.generator(), 4, (pos.x >> 2) + 2, 0, (pos.z >> 2) + 2);
            let sv = oracle.variant(st, mc, seed, pos.x, pos.z, id);
            if c.varflags & VAR_WITH_START == 0 {
                return true;
            }
            sv
        }
        StructureType::Igloo => {
            if c.varflags & VAR_BASEMENT == 0 {
                return true;
            }
            let sv = oracle.variant(st, mc, seed, pos.x, pos.z, -1);
            return sv.basement != negate;
        }
        StructureType::EndCity => {
            if c.varflags & VAR_ENDSHIP == 0 {
                return true;
            }
            let pieces = oracle.structure_pieces(st, mc, seed, pos.x >> 4, pos.z >> 4);
            let has_ship = pieces.iter().any(|p| p.kind == PieceKind::EndShip);
            return has_ship != negate;
        }
        StructureType::Fortress => {
            if c.varflags & VAR_DENSE_BB == 0 {
                return true;
            }
            let pieces = oracle.structure_pieces(st, mc, seed, pos.x >> 4, pos.z >> 4);
            return match dense_crossing(&pieces) {
                Some(p) => {
                    *pos = p;
                    true
                }
                None => false,
            };
        }
        _ => return true,
    };

    start_matches(c.varstart, st, &sv)
}

/// Any start piece selected by `varstart` matches the generated variant.
fn start_matches(varstart: u64, st: StructureType, sv: &StructureVariant) -> bool {
    let mut bits = varstart;
    while bits != 0 {
        let idx = bits.trailing_zeros() as usize;
        bits &= bits - 1;
        let Some(sp) = START_PIECES.get(idx) else {
            continue;
        };
        if sp.st != st || sp.start != sv.start {
            continue;
        }
        if sp.biome != -1 && sp.biome != sv.biome {
            continue;
        }
        if sp.giant != -1 && sp.giant != sv.giant as i32 {
            continue;
        }
        return true;
    }
    false
}

/// Find a fortress start or crossing at the corner of a dense block of
/// crossings: at least four crossings on the same level touching it.
fn dense_crossing(pieces: &[Piece]) -> Option<Pos> {
    let crossings: Vec<&Piece> = pieces
        .iter()
        .filter(|p| matches!(p.kind, PieceKind::FortressStart | PieceKind::BridgeCrossing))
        .collect();
    if crossings.len() < 4 {
        return None;
    }

    crossings.iter().find_map(|a| {
        let adjacent = crossings
            .iter()
            .filter(|b| {
                a.bb0.1 == b.bb0.1
                    && (a.bb1.0 == b.bb1.0 || a.bb1.0 + 1 == b.bb0.0)
                    && (a.bb1.2 == b.bb1.2 || a.bb1.2 + 1 == b.bb0.2)
            })
            .count();
        (adjacent >= 4).then(|| Pos::new(a.bb1.0, a.bb1.2))
    })
}
