//! Biome rasters: legacy layers, temperature categories, biome filters and
//! biome region centers.

use log::debug;

use super::{put, remove_origin, span, Collect, LeafQuery, Outcome};
use crate::condition::BiomeTally;
use crate::oracle::{LegacyLayer, WorldOracle};
use crate::types::{Dimension, McVersion, Pos, SearchPass, Verdict};

/// Cells in a connected biome region beyond which growth stops counting.
const MAX_REGION_CELLS: usize = 1 << 16;

/// Largest raster a biome-center query reads; bigger areas fail outright.
const MAX_CENTER_CELLS: u64 = 1 << 22;

/// Grid shift of a biome step, `None` for unsupported steps.
fn step_shift(step: i32) -> Option<u32> {
    match step {
        1 => Some(0),
        4 => Some(2),
        16 => Some(4),
        64 => Some(6),
        256 => Some(8),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Legacy layers
// ---------------------------------------------------------------------------

pub(super) fn layer<O: WorldOracle>(q: LeafQuery<'_, O>, layer: LegacyLayer) -> Outcome {
    let LeafQuery {
        at,
        world,
        cond,
        area,
        cent,
        ..
    } = q;
    let mc = world.mc();
    if mc > McVersion::V1_17 {
        return Outcome::failed();
    }
    let shift = match layer {
        LegacyLayer::River4 => 2,
        LegacyLayer::OceanTemp256 => 8,
        LegacyLayer::Temperature1024 => 10,
    };
    put(cent, area.center());

    match world.pass() {
        SearchPass::Fast48 => return Outcome::new(Verdict::MaybeValid, 1),
        // ocean temperatures only depend on the lower 48 bits
        SearchPass::Full48 if !(mc >= McVersion::V1_13 && layer == LegacyLayer::OceanTemp256) => {
            return Outcome::new(Verdict::MaybeValid, 1)
        }
        _ => {}
    }

    let oracle = world.oracle().clone();
    let seed = world.seed();
    world.init_for_dim(Dimension::Overworld);
    let (x1, z1, x2, z2) = area.cells(shift);
    let mut tally = BiomeTally::new(&cond.filter);
    'scan: for z in z1..=z2 {
        if world.stopped() {
            return Outcome::failed();
        }
        for x in x1..=x2 {
            if !area.holds_cell(at, shift, x, z) {
                continue;
            }
            if tally.observe(oracle.layer_at(world.generator(), layer, seed, x, z)) {
                break 'scan;
            }
        }
    }
    if tally.satisfied() {
        Outcome::new(Verdict::Ok, 1)
    } else {
        Outcome::new(Verdict::Failed, 1)
    }
}

/// Minimum number of 1:1024 cells per temperature category.
pub(super) fn temps<O: WorldOracle>(q: LeafQuery<'_, O>) -> Outcome {
    let LeafQuery {
        at,
        world,
        cond,
        area,
        cent,
        ..
    } = q;
    if world.mc() > McVersion::V1_17 {
        return Outcome::failed();
    }
    put(cent, area.center());
    if world.pass() != SearchPass::Full64 {
        return Outcome::new(Verdict::MaybeValid, 1);
    }

    let oracle = world.oracle().clone();
    let seed = world.seed();
    world.init_for_dim(Dimension::Overworld);
    let (x1, z1, x2, z2) = area.cells(10);
    let mut counts = [0i32; crate::condition::TEMP_CATEGORIES];
    for z in z1..=z2 {
        if world.stopped() {
            return Outcome::failed();
        }
        for x in x1..=x2 {
            if !area.holds_cell(at, 10, x, z) {
                continue;
            }
            let cat = oracle.layer_at(world.generator(), LegacyLayer::Temperature1024, seed, x, z);
            if let Some(n) = usize::try_from(cat).ok().and_then(|i| counts.get_mut(i)) {
                *n += 1;
            }
        }
    }
    if counts.iter().zip(cond.temps.iter()).all(|(have, need)| have >= need) {
        Outcome::new(Verdict::Ok, 1)
    } else {
        Outcome::new(Verdict::Failed, 1)
    }
}

// ---------------------------------------------------------------------------
// Biome filters
// ---------------------------------------------------------------------------

pub(super) fn biomes<O: WorldOracle>(q: LeafQuery<'_, O>) -> Outcome {
    let LeafQuery {
        at,
        world,
        cond,
        info,
        area,
        cent,
        ..
    } = q;
    let Some(mut shift) = step_shift(cond.step) else {
        return Outcome::failed();
    };
    put(cent, area.center());

    let pass = world.pass();
    if pass == SearchPass::Fast48 {
        return Outcome::new(Verdict::MaybeValid, 1);
    }
    // 1:1 is voronoi-scrambled with the full seed in every dimension
    if pass != SearchPass::Full64 && (info.dep64 || shift == 0) {
        return Outcome::new(Verdict::MaybeValid, 1);
    }

    let mut y = if shift == 0 { cond.y } else { cond.y >> 2 };
    if shift == 0 && cond.filter.approx {
        shift = 2;
        y = cond.y >> 2;
    }

    let oracle = world.oracle().clone();
    world.init_for_dim(info.dim);
    let (x1, z1, x2, z2) = area.cells(shift);
    let scale = 1 << shift;
    let mut tally = BiomeTally::new(&cond.filter);
    'scan: for z in z1..=z2 {
        if world.stopped() {
            return Outcome::failed();
        }
        for x in x1..=x2 {
            if !area.holds_cell(at, shift, x, z) {
                continue;
            }
            if tally.observe(oracle.biome_at(world.generator(), scale, x, y, z)) {
                break 'scan;
            }
        }
    }
    if tally.satisfied() {
        Outcome::new(Verdict::Ok, 1)
    } else {
        Outcome::new(Verdict::Failed, 1)
    }
}

// ---------------------------------------------------------------------------
// Biome centers
// ---------------------------------------------------------------------------

/// Centers of connected regions of `biome_id` with at least
/// `biome_size - tol` cells, at the grid scale of the kind.
pub(super) fn centers<O: WorldOracle>(q: LeafQuery<'_, O>) -> Outcome {
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
    put(cent, area.center());
    if world.pass() != SearchPass::Full64 {
        return Outcome::new(Verdict::MaybeInvalid, 1);
    }

    let shift = if info.grid >= 256 { 8 } else { 2 };
    let scale = 1i32 << shift;
    let y = cond.y >> 2;
    let oracle = world.oracle().clone();
    world.init_for_dim(info.dim);

    let (x1, z1, x2, z2) = area.cells(shift);
    let (w, h) = (span(x1, x2) as u64, span(z1, z2) as u64);
    if w * h > MAX_CENTER_CELLS {
        debug!(
            "biome-center area of {}x{} cells exceeds {}, failing",
            w, h, MAX_CENTER_CELLS
        );
        return Outcome::failed();
    }
    let (w, h) = (w as usize, h as usize);
    let mut ids = Vec::with_capacity(w * h);
    for z in z1..=z2 {
        if world.stopped() {
            return Outcome::failed();
        }
        for x in x1..=x2 {
            ids.push(oracle.biome_at(world.generator(), scale, x, y, z));
        }
    }

    let min_cells = (cond.biome_size - cond.tol as i32).max(1) as usize;
    let mut visited = vec![false; ids.len()];
    let mut stack = Vec::new();
    let mut found: Vec<Pos> = Vec::new();
    for start in 0..ids.len() {
        if visited[start] || ids[start] != cond.biome_id {
            continue;
        }
        // flood fill one 4-connected region
        visited[start] = true;
        stack.push(start);
        let (mut n, mut sx, mut sz) = (0usize, 0i64, 0i64);
        while let Some(i) = stack.pop() {
            let (cx, cz) = (i % w, i / w);
            if n < MAX_REGION_CELLS {
                n += 1;
                sx += cx as i64;
                sz += cz as i64;
            }
            let neighbours = [
                (cx > 0).then(|| i - 1),
                (cx + 1 < w).then(|| i + 1),
                (cz > 0).then(|| i - w),
                (cz + 1 < h).then(|| i + w),
            ];
            for j in neighbours.into_iter().flatten() {
                if !visited[j] && ids[j] == cond.biome_id {
                    visited[j] = true;
                    stack.push(j);
                }
            }
        }
        if n < min_cells {
            continue;
        }
        let cx = (x1 as i64 + sx / n as i64) * scale as i64;
        let cz = (z1 as i64 + sz / n as i64) * scale as i64;
        let p = Pos::new(cx as i32, cz as i32);
        if area.rsq != 0 && !area.contains(at, p) {
            continue;
        }
        found.push(p);
    }

    if cond.count <= 0 {
        return if found.iter().any(|p| !(cond.skipref && *p == at)) {
            Outcome::new(Verdict::Failed, 1)
        } else {
            Outcome::new(Verdict::Ok, 1)
        };
    }

    match collect {
        Collect::Upto(max) => {
            let n = found.len().min(max.max(1)).min(cent.len());
            cent[..n].copy_from_slice(&found[..n]);
            let n = if cond.skipref { remove_origin(cent, n, at) } else { n };
            if n as i64 >= cond.count as i64 {
                Outcome::new(Verdict::Ok, n)
            } else {
                Outcome::new(Verdict::Failed, n)
            }
        }
        Collect::Center => {
            let kept: Vec<Pos> = found
                .into_iter()
                .filter(|p| !(cond.skipref && *p == at))
                .collect();
            if (kept.len() as i64) < cond.count as i64 {
                return Outcome::failed();
            }
            let n = kept.len() as i64;
            let sx: i64 = kept.iter().map(|p| p.x as i64).sum();
            let sz: i64 = kept.iter().map(|p| p.z as i64).sum();
            let half = (scale / 2) as i64;
            put(cent, Pos::new((sx / n + half) as i32, (sz / n + half) as i32));
            Outcome::new(Verdict::Ok, 1)
        }
    }
}
