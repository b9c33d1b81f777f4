//! Structure-like leaves: region scans, quad constellations, mineshafts,
//! spawn, strongholds and slime chunks.

use std::f64::consts::PI;

use super::{put, remove_origin, span, Collect, Instances, LeafQuery, Outcome};
use crate::condition::Condition;
use crate::env::OracleState;
use crate::oracle::{QuadBaseSet, QuadTier, StructureType, WorldOracle};
use crate::quad;
use crate::types::{Dimension, McVersion, Pos, SearchPass, Verdict, MASK48, MAX_INSTANCES};
use crate::variant::{is_variant_ok, VILLAGE_BIOMES};

/// Stronghold positions are snapped to a chunk center and may sit up to
/// this far from their ring radius.
const STRONGHOLD_SLACK: i64 = 112 + 8;

// ---------------------------------------------------------------------------
// Quad constellations
// ---------------------------------------------------------------------------

pub(super) fn quad_hut<O: WorldOracle>(q: LeafQuery<'_, O>, tier: QuadTier) -> Outcome {
    let limit = q.limit();
    let LeafQuery {
        at,
        world,
        cond,
        info,
        area,
        cent,
        scratch,
        ..
    } = q;
    let oracle = world.oracle().clone();
    let (mc, seed) = (world.mc(), world.seed());
    let Some(sc) = info.structure.and_then(|st| oracle.structure_config(st, mc)) else {
        return Outcome::failed();
    };
    let set = match tier {
        QuadTier::Ideal => QuadBaseSet::HutIdeal,
        QuadTier::Classic => QuadBaseSet::HutClassic,
        QuadTier::Normal => QuadBaseSet::HutNormal,
        QuadTier::Barely => QuadBaseSet::HutBarely,
    };

    let (rx1, rz1, rx2, rz2) = area.cells(9);
    let n = oracle.scan_for_quads(
        &sc,
        128,
        seed & MASK48,
        oracle.quad_bases(set),
        20,
        sc.salt,
        rx1,
        rz1,
        rx2.saturating_sub(rx1).saturating_add(1),
        rz2.saturating_sub(rz1).saturating_add(1),
        scratch,
    );

    let mut icnt = 0;
    for r in scratch.iter().take(n).copied() {
        let s = oracle.move_structure(seed, -r.x, -r.z);
        let Some(qi) = quad::quad_hut(&*oracle, s.wrapping_add(sc.salt)) else {
            continue;
        };
        if qi.tier.map_or(true, |t| t > tier) {
            continue;
        }
        let pc = Pos::new((r.x << 9).wrapping_add(qi.afk.x), (r.z << 9).wrapping_add(qi.afk.z));
        if (cond.skipref && pc == at) || !area.contains(at, pc) {
            continue;
        }
        // several constellations are not averaged, the first one stands in
        if let Some(slot) = cent.get_mut(icnt) {
            *slot = pc;
        }
        icnt += 1;
        match limit {
            Some(max) if icnt >= max => return Outcome::new(Verdict::Ok, icnt),
            None => break,
            _ => {}
        }
    }
    if icnt > 0 {
        Outcome::new(Verdict::Ok, icnt)
    } else {
        Outcome::failed()
    }
}

pub(super) fn quad_monument<O: WorldOracle>(q: LeafQuery<'_, O>, percent: i32) -> Outcome {
    let limit = q.limit();
    let LeafQuery {
        at,
        world,
        cond,
        info,
        area,
        cent,
        scratch,
        ..
    } = q;
    let oracle = world.oracle().clone();
    let (mc, seed) = (world.mc(), world.seed());
    let Some(sc) = info.structure.and_then(|st| oracle.structure_config(st, mc)) else {
        return Outcome::failed();
    };
    let qual = 58 * 58 * 4 * percent / 100;

    let (rx1, rz1, rx2, rz2) = area.cells(9);
    // one constellation is all a monument condition needs
    let n = oracle.scan_for_quads(
        &sc,
        160,
        seed & MASK48,
        oracle.quad_bases(QuadBaseSet::Monument90),
        48,
        sc.salt,
        rx1,
        rz1,
        rx2.saturating_sub(rx1).saturating_add(1),
        rz2.saturating_sub(rz1).saturating_add(1),
        &mut scratch[..1],
    );

    let mut icnt = 0;
    for r in scratch.iter().take(n).copied() {
        let s = oracle.move_structure(seed, -r.x, -r.z).wrapping_add(sc.salt);
        if oracle.quad_monument_quality(s) < qual {
            continue;
        }
        let Some(qi) = quad::quad_monument(&*oracle, s) else {
            continue;
        };
        let pc = Pos::new((r.x << 9).wrapping_add(qi.afk.x), (r.z << 9).wrapping_add(qi.afk.z));
        if (cond.skipref && pc == at) || !area.contains(at, pc) {
            continue;
        }
        put(&mut cent[icnt..], pc);
        icnt += 1;
        match limit {
            Some(max) if icnt >= max => return Outcome::new(Verdict::Ok, icnt),
            None => break,
            _ => {}
        }
    }
    if icnt > 0 {
        Outcome::new(Verdict::Ok, icnt)
    } else {
        Outcome::failed()
    }
}

// ---------------------------------------------------------------------------
// Region scan
// ---------------------------------------------------------------------------

/// Every generated structure type placed on a region grid.
pub(super) fn structures<O: WorldOracle>(q: LeafQuery<'_, O>) -> Outcome {
    let LeafQuery {
        at,
        world,
        cond,
        info,
        area,
        collect,
        cent,
        ..
    } = q;
    let oracle = world.oracle().clone();
    let (mc, seed, pass) = (world.mc(), world.seed(), world.pass());
    let Some(st) = info.structure else {
        return Outcome::failed();
    };
    let Some(sc) = oracle.structure_config(st, mc) else {
        return Outcome::failed();
    };

    let (rx1, rz1, rx2, rz2) = match sc.region_size {
        32 => area.cells(9),
        1 => area.cells(4),
        size => area.cells_div(size << 4),
    };
    let authoritative = pass == SearchPass::Full64
        || (pass == SearchPass::Full48 && !oracle.requires_full_seed(st));

    let mut found = Instances::new(cent, collect);
    'scan: for rz in rz1..=rz2 {
        if world.stopped() {
            break;
        }
        for rx in rx1..=rx2 {
            let Some(mut pc) = oracle.structure_pos(st, mc, seed, rx, rz) else {
                continue;
            };
            if (cond.skipref && pc == at) || !area.contains(at, pc) {
                continue;
            }
            if authoritative {
                if world.stopped() {
                    return Outcome::failed();
                }
                if !is_viable(world, cond, st, info.dim, &mut pc) {
                    continue;
                }
            }
            if found.push(pc) {
                break 'scan;
            }
        }
    }

    let icnt = found.len();
    if cond.count <= 0 {
        // exclusion: only an authoritative pass may reject
        found.set_center(area.center());
        return if icnt == 0 {
            Outcome::new(Verdict::Ok, 1)
        } else if authoritative {
            Outcome::failed()
        } else {
            Outcome::new(Verdict::MaybeValid, 1)
        };
    }
    if (icnt as i64) < cond.count as i64 {
        return Outcome::failed();
    }

    let count = match collect {
        Collect::Upto(_) => found.stored(),
        Collect::Center => {
            if let Some(mean) = found.mean() {
                found.set_center(mean);
            }
            1
        }
    };
    if authoritative {
        Outcome::new(Verdict::Ok, count)
    } else if cond.count as i64 != span(rx1, rx2) * span(rz1, rz2) {
        // a partial cluster has no known center until the full seed is checked
        Outcome::new(Verdict::MaybeInvalid, count)
    } else {
        Outcome::new(Verdict::MaybeValid, count)
    }
}

/// Biome, terrain and variant viability of a start at `pc`.
fn is_viable<O: WorldOracle>(
    world: &mut OracleState<O>,
    cond: &Condition,
    st: StructureType,
    dim: Dimension,
    pc: &mut Pos,
) -> bool {
    let oracle = world.oracle().clone();
    let mc = world.mc();

    if st == StructureType::Village && cond.varflags != 0 {
        // abandoned variants can be rejected before the biome is known
        let tries = if mc <= McVersion::V1_13 { 1 } else { VILLAGE_BIOMES.len() };
        if !VILLAGE_BIOMES[..tries]
            .iter()
            .any(|&b| is_variant_ok(cond, world, st, b, pc))
        {
            return false;
        }
    }

    world.init_for_dim(dim);
    let Some(id) = oracle.viable_structure_biome(st, world.generator(), pc.x, pc.z) else {
        return false;
    };
    if st == StructureType::EndCity {
        world.prepare_surface(Dimension::End);
        if !oracle.viable_end_city_terrain(world.generator(), pc.x, pc.z) {
            return false;
        }
    }
    if cond.varflags != 0 && !is_variant_ok(cond, world, st, id, pc) {
        return false;
    }
    if mc >= McVersion::V1_18
        && world.options().estimate_terrain
        && !oracle.viable_structure_terrain(st, world.generator(), pc.x, pc.z)
    {
        return false;
    }
    true
}

// ---------------------------------------------------------------------------
// Mineshafts
// ---------------------------------------------------------------------------

pub(super) fn mineshafts<O: WorldOracle>(q: LeafQuery<'_, O>) -> Outcome {
    let LeafQuery {
        at,
        world,
        cond,
        area,
        collect,
        cent,
        scratch,
        ..
    } = q;
    let oracle = world.oracle().clone();
    let (mc, seed) = (world.mc(), world.seed());
    let (cx1, cz1, cx2, cz2) = area.cells(4);

    if let (Collect::Upto(max), true) = (collect, cond.count > 0) {
        let max = max.min(cent.len());
        let mut icnt = oracle.mineshafts(mc, seed, cx1, cz1, cx2, cz2, &mut cent[..max]);
        if area.rsq != 0 {
            let mut j = 0;
            for i in 0..icnt {
                if cent[i].dist_sq(at) < area.rsq {
                    cent[j] = cent[i];
                    j += 1;
                }
            }
            icnt = j;
        }
        if cond.skipref {
            icnt = remove_origin(cent, icnt, at);
        }
        return if icnt as i64 >= cond.count as i64 {
            Outcome::new(Verdict::Ok, icnt)
        } else {
            Outcome::new(Verdict::Failed, icnt)
        };
    }

    let n = oracle.mineshafts(mc, seed, cx1, cz1, cx2, cz2, &mut scratch[..MAX_INSTANCES]);
    if (n as i64) < cond.count as i64 {
        return Outcome::failed();
    }
    let mut found = Instances::new(cent, Collect::Center);
    for &p in scratch.iter().take(n) {
        if area.rsq != 0 && p.dist_sq(at) >= area.rsq {
            continue;
        }
        if cond.skipref && p == at {
            continue;
        }
        found.push(p);
    }
    if cond.count <= 0 {
        found.set_center(area.center());
        if found.len() == 0 {
            return Outcome::new(Verdict::Ok, 1);
        }
    } else if found.len() as i64 >= cond.count as i64 {
        if let Some(mean) = found.mean() {
            found.set_center(mean);
        }
        return Outcome::new(Verdict::Ok, 1);
    }
    Outcome::failed()
}

// ---------------------------------------------------------------------------
// Spawn & strongholds
// ---------------------------------------------------------------------------

pub(super) fn spawn<O: WorldOracle>(q: LeafQuery<'_, O>) -> Outcome {
    let LeafQuery {
        at,
        world,
        cond,
        area,
        cent,
        ..
    } = q;
    put(cent, Pos::new(0, 0));
    if world.pass() != SearchPass::Full64 {
        return Outcome::new(Verdict::MaybeInvalid, 1);
    }
    if world.stopped() {
        return Outcome::failed();
    }

    let oracle = world.oracle().clone();
    world.init_for_dim(Dimension::Overworld);
    let pc = oracle.spawn(world.generator());
    if !area.contains(at, pc) || (cond.skipref && pc == at) {
        return Outcome::failed();
    }
    put(cent, pc);
    Outcome::new(Verdict::Ok, 1)
}

pub(super) fn first_stronghold<O: WorldOracle>(q: LeafQuery<'_, O>) -> Outcome {
    let LeafQuery {
        at,
        world,
        cond,
        area,
        cent,
        ..
    } = q;
    let pc = world
        .oracle()
        .stronghold_start(world.mc(), world.seed())
        .pos;
    put(cent, pc);
    if !area.contains(at, pc) || (cond.skipref && pc == at) {
        return Outcome::new(Verdict::Failed, 1);
    }
    Outcome::new(Verdict::Ok, 1)
}

/// Distance along one axis from the origin to the interval `a..=b`.
fn axis_gap(a: i64, b: i64) -> i64 {
    if a <= 0 && b >= 0 {
        0
    } else {
        a.abs().min(b.abs())
    }
}

pub(super) fn strongholds<O: WorldOracle>(q: LeafQuery<'_, O>) -> Outcome {
    let limit = q.limit();
    let LeafQuery {
        at,
        world,
        cond,
        area,
        collect,
        cent,
        ..
    } = q;
    let oracle = world.oracle().clone();
    let (mc, seed) = (world.mc(), world.seed());

    // stronghold positions sit at chunk offset (8, 8); pre-select without it
    let (x1, z1, x2, z2) = if cond.rmax > 0 {
        let r = cond.rmax as i64;
        (at.x as i64 - r - 8, at.z as i64 - r - 8, at.x as i64 + r - 8, at.z as i64 + r - 8)
    } else {
        (
            cond.x1 as i64 + at.x as i64 - 8,
            cond.z1 as i64 + at.z as i64 - 8,
            cond.x2 as i64 + at.x as i64 - 8,
            cond.z2 as i64 + at.z as i64 - 8,
        )
    };
    let gx = (axis_gap(x1, x2) - STRONGHOLD_SLACK).max(0);
    let gz = (axis_gap(z1, z2) - STRONGHOLD_SLACK).max(0);
    let rmin_sq = gx * gx + gz * gz;
    let fx = x1.abs().max(x2.abs()) + STRONGHOLD_SLACK;
    let fz = z1.abs().max(z2.abs()) + STRONGHOLD_SLACK;
    let rmax_sq = fx * fx + fz * fz;

    let (x1, z1, x2, z2) = (x1 + 8, z1 + 8, x2 + 8, z2 + 8);
    put(
        cent,
        Pos::new(((x1 + x2) >> 1) as i32, ((z1 + z2) >> 1) as i32),
    );
    let absent = || {
        if cond.count <= 0 {
            Outcome::new(Verdict::Ok, 1)
        } else {
            Outcome::failed()
        }
    };

    // 1.8-: r = 640 + [0,1]*512 (+/-112)
    // 1.9+: r = 1408 + 3072*n + 1280*[0,1] (+/-112)
    let (ring, r1, r2) = if mc < McVersion::V1_9 {
        if rmax_sq < 640 * 640 || rmin_sq > 1152 * 1152 {
            return absent();
        }
        (0, 640.0, 1152.0)
    } else {
        if rmax_sq < 1408 * 1408 {
            return absent();
        }
        let rmin = (rmin_sq as f64).sqrt();
        let rmax = (rmax_sq as f64).sqrt();
        let ring = ((rmax - 1408.0) / 3072.0) as i32;
        // an area narrower than the gap between rings may fall between them
        if rmax - rmin < (3072 - 1280) as f64 && rmin > (1408 + 1280) as f64 + 3072.0 * ring as f64 {
            return absent();
        }
        (ring, 1408.0, (1408 + 1280) as f64)
    };
    if ring == 0
        && !is_inner_ring_ok(
            &*oracle,
            mc,
            seed,
            (
                (x1 - STRONGHOLD_SLACK) as f64,
                (z1 - STRONGHOLD_SLACK) as f64,
                (x2 + STRONGHOLD_SLACK) as f64,
                (z2 + STRONGHOLD_SLACK) as f64,
            ),
            r1,
            r2,
        )
    {
        return absent();
    }

    if world.pass() != SearchPass::Full64 {
        return Outcome::new(Verdict::MaybeInvalid, 1);
    }

    let mut cursor = oracle.stronghold_start(mc, seed);
    world.init_for_dim(Dimension::Overworld);
    let mut found = Instances::new(cent, collect);
    while oracle.stronghold_next(&mut cursor, world.generator()) {
        if world.stopped() {
            break;
        }
        let p = cursor.pos;
        if area.contains(at, p) && !(cond.skipref && p == at) {
            if cond.count <= 0 {
                return Outcome::failed();
            }
            if found.push(p) && limit.is_some() {
                return Outcome::new(Verdict::Ok, found.stored());
            }
        }
        if cursor.ring > ring {
            break;
        }
    }

    if cond.count <= 0 {
        return Outcome::new(Verdict::Ok, 1);
    }
    let count = match collect {
        Collect::Upto(_) => found.stored(),
        Collect::Center => {
            if let Some(mean) = found.mean() {
                found.set_center(mean);
            }
            1
        }
    };
    if found.len() as i64 >= cond.count as i64 {
        Outcome::new(Verdict::Ok, count)
    } else {
        Outcome::new(Verdict::Failed, count)
    }
}

/// Whether any inner-ring stronghold can fall into `rect`: the first one
/// lies inside it, or one of the other two generation angles crosses it
/// between radii `r1` and `r2`.
fn is_inner_ring_ok<O: WorldOracle + ?Sized>(
    oracle: &O,
    mc: McVersion,
    seed: u64,
    rect: (f64, f64, f64, f64),
    r1: f64,
    r2: f64,
) -> bool {
    let cursor = oracle.stronghold_start(mc, seed);
    let (x1, z1, x2, z2) = rect;
    let p = cursor.pos;
    if (p.x as f64) >= x1 && (p.x as f64) <= x2 && (p.z as f64) >= z1 && (p.z as f64) <= z2 {
        return true;
    }
    [2.0 * PI / 3.0, 4.0 * PI / 3.0].iter().any(|offset| {
        let (s, c) = (cursor.angle + offset).sin_cos();
        intersect_rect_line(rect, (c * r1, s * r1), (c * r2, s * r2))
    })
}

fn intersect_line_line(a1: (f64, f64), a2: (f64, f64), b1: (f64, f64), b2: (f64, f64)) -> bool {
    let (ax, az) = (a2.0 - a1.0, a2.1 - a1.1);
    let (bx, bz) = (b2.0 - b1.0, b2.1 - b1.1);
    let det = ax * bz - az * bx;
    if det == 0.0 {
        return false;
    }
    let (cx, cz) = (b1.0 - a1.0, b1.1 - a1.1);
    let t = (cx * az - cz * ax) / det;
    if !(0.0..=1.0).contains(&t) {
        return false;
    }
    let u = (cx * bz - cz * bx) / det;
    (0.0..=1.0).contains(&u)
}

/// Does the segment `l1 -> l2` touch the rectangle.
fn intersect_rect_line(rect: (f64, f64, f64, f64), l1: (f64, f64), l2: (f64, f64)) -> bool {
    let (x1, z1, x2, z2) = rect;
    let inside = |p: (f64, f64)| p.0 >= x1 && p.0 <= x2 && p.1 >= z1 && p.1 <= z2;
    if inside(l1) || inside(l2) {
        return true;
    }
    let edges = [
        ((x1, z1), (x1, z2)),
        ((x1, z2), (x2, z2)),
        ((x2, z2), (x2, z1)),
        ((x2, z1), (x1, z1)),
    ];
    edges
        .iter()
        .any(|&(e1, e2)| intersect_line_line(l1, l2, e1, e2))
}

// ---------------------------------------------------------------------------
// Slime chunks
// ---------------------------------------------------------------------------

pub(super) fn slime<O: WorldOracle>(q: LeafQuery<'_, O>) -> Outcome {
    let LeafQuery {
        at,
        world,
        cond,
        area,
        collect,
        cent,
        ..
    } = q;
    let oracle = world.oracle().clone();
    let seed = world.seed();
    let (cx1, cz1, cx2, cz2) = area.cells(4);

    let mut found = Instances::new(cent, collect);
    for cz in cz1..=cz2 {
        if world.stopped() {
            return Outcome::failed();
        }
        for cx in cx1..=cx2 {
            if cond.skipref && cx == at.x >> 4 && cz == at.z >> 4 {
                continue;
            }
            let origin = Pos::new(cx << 4, cz << 4);
            if area.rsq != 0 && !area.contains(at, origin) {
                continue;
            }
            if !oracle.is_slime_chunk(seed, cx, cz) {
                continue;
            }
            if cond.count <= 0 {
                return Outcome::failed();
            }
            let p = match collect {
                Collect::Upto(_) => origin,
                Collect::Center => Pos::new(cx, cz),
            };
            if found.push(p) {
                return Outcome::new(Verdict::Ok, found.stored());
            }
        }
    }

    if cond.count <= 0 {
        found.set_center(area.center());
        return Outcome::new(Verdict::Ok, 1);
    }
    let icnt = found.len();
    let count = match collect {
        Collect::Upto(_) => found.stored(),
        Collect::Center => {
            if icnt > 0 {
                let (sx, sz) = found.sums();
                let n = icnt as i64;
                found.set_center(Pos::new(((sx << 4) / n + 8) as i32, ((sz << 4) / n + 8) as i32));
            }
            1
        }
    };
    if icnt as i64 >= cond.count as i64 {
        Outcome::new(Verdict::Ok, count)
    } else {
        Outcome::new(Verdict::Failed, count)
    }
}
