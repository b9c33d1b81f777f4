//! Climate noise leaves (1.18+): extreme location, range confinement and
//! surface height.

use super::{put, LeafQuery, Outcome};
use crate::condition::{E_LOCATE_MAX, E_LOCATE_MIN, E_TEST_LOWER, E_TEST_UPPER, FLG_INVERT, FLG_IN_RANGE};
use crate::oracle::{ClimateParam, WorldOracle};
use crate::types::{Dimension, McVersion, Pos, SearchPass, Verdict};

/// Parameters in the order they are confined, cheapest rejections first.
const CONFINE_ORDER: [ClimateParam; 5] = [
    ClimateParam::Temperature,
    ClimateParam::Humidity,
    ClimateParam::Weirdness,
    ClimateParam::Erosion,
    ClimateParam::Continentalness,
];

/// Noise values are compared in units of 1/10000.
const NOISE_UNIT: f64 = 10000.0;

/// Lower and upper bound tested by a noise condition; untested sides are
/// unbounded.
pub(super) fn test_bounds(minmax: u8, vmin: f64, vmax: f64) -> (f64, f64) {
    let lo = if minmax & E_TEST_LOWER != 0 { vmin } else { f64::NEG_INFINITY };
    let hi = if minmax & E_TEST_UPPER != 0 { vmax } else { f64::INFINITY };
    (lo, hi)
}

/// Locate the minimum or maximum of one climate parameter and test it.
pub(super) fn minmax<O: WorldOracle>(q: LeafQuery<'_, O>) -> Outcome {
    let LeafQuery {
        at,
        world,
        cond,
        area,
        cent,
        ..
    } = q;
    let Some(param) = ClimateParam::from_index(cond.para as usize) else {
        return Outcome::failed();
    };
    if world.mc() <= McVersion::V1_17 {
        return Outcome::failed();
    }
    if world.pass() != SearchPass::Full64 {
        return Outcome::new(Verdict::MaybeInvalid, 0);
    }

    let oracle = world.oracle().clone();
    world.init_for_noise(param, cond.octave as i32);
    let (x1, z1, x2, z2) = area.cells(2);
    let (mut vmin, mut vmax) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut posmin, mut posmax) = (at, at);
    for z in z1..=z2 {
        if world.stopped() {
            return Outcome::failed();
        }
        for x in x1..=x2 {
            if !area.holds_cell(at, 2, x, z) {
                continue;
            }
            let v = oracle.climate_at(world.generator(), param, x, z) * NOISE_UNIT;
            if v < vmin {
                vmin = v;
                posmin = Pos::new(x, z);
            }
            if v > vmax {
                vmax = v;
                posmax = Pos::new(x, z);
            }
        }
    }

    let (lo, hi) = test_bounds(cond.minmax, cond.vmin, cond.vmax);
    let evalmin = if cond.minmax & E_LOCATE_MIN != 0 { vmin } else { vmax };
    let evalmax = if cond.minmax & E_LOCATE_MAX != 0 { vmax } else { vmin };
    let rejected = if cond.flags & FLG_INVERT != 0 {
        evalmin > lo && evalmax < hi
    } else {
        evalmin < lo || evalmax > hi
    };
    if rejected {
        return Outcome::failed();
    }

    let p = if cond.minmax & E_LOCATE_MIN != 0 {
        Pos::new(posmin.x << 2, posmin.z << 2)
    } else if cond.minmax & E_LOCATE_MAX != 0 {
        Pos::new(posmax.x << 2, posmax.z << 2)
    } else {
        at
    };
    put(cent, p);
    Outcome::new(Verdict::Ok, 1)
}

/// Confine the range of every limited climate parameter over the area.
pub(super) fn confine<O: WorldOracle>(q: LeafQuery<'_, O>) -> Outcome {
    let LeafQuery {
        at,
        world,
        cond,
        area,
        cent,
        ..
    } = q;
    if world.mc() <= McVersion::V1_17 {
        return Outcome::failed();
    }
    put(cent, area.center());
    if world.pass() != SearchPass::Full64 {
        return Outcome::new(Verdict::MaybeValid, 1);
    }

    let oracle = world.oracle().clone();
    world.init_for_dim(Dimension::Overworld);
    let (x1, z1, x2, z2) = area.cells(2);
    let full = [i32::MIN, i32::MAX];
    for param in CONFINE_ORDER {
        let i = param.index();
        let (ok, ex) = (cond.limok[i], cond.limex[i]);
        if ok == full && ex == full {
            continue;
        }
        let (exmin, exmax) = (ex[0] as f64, ex[1] as f64);
        let (mut pmin, mut pmax) = (f64::INFINITY, f64::NEG_INFINITY);
        for z in z1..=z2 {
            if world.stopped() {
                return Outcome::failed();
            }
            for x in x1..=x2 {
                if !area.holds_cell(at, 2, x, z) {
                    continue;
                }
                let v = oracle.climate_at(world.generator(), param, x, z) * NOISE_UNIT;
                if v < exmin || v > exmax {
                    return Outcome::new(Verdict::Failed, 1);
                }
                pmin = pmin.min(v);
                pmax = pmax.max(v);
            }
        }
        if pmin > ok[1] as f64 || pmax < ok[0] as f64 {
            return Outcome::new(Verdict::Failed, 1);
        }
        if pmin < exmin || pmax > exmax {
            return Outcome::new(Verdict::Failed, 1);
        }
    }
    Outcome::new(Verdict::Ok, 1)
}

/// Approximate surface height at the first corner of the area.
pub(super) fn height<O: WorldOracle>(q: LeafQuery<'_, O>) -> Outcome {
    let LeafQuery {
        world,
        cond,
        area,
        cent,
        ..
    } = q;
    put(cent, Pos::new(area.x1, area.z1));
    if world.pass() != SearchPass::Full64 {
        return Outcome::new(Verdict::MaybeValid, 1);
    }

    let oracle = world.oracle().clone();
    world.init_for_dim(Dimension::Overworld);
    world.prepare_surface(Dimension::Overworld);
    let y = oracle.approx_height(world.generator(), area.x1 >> 2, area.z1 >> 2);
    let [ymin, ymax] = cond.limok[ClimateParam::Depth.index()];
    let (ymin, ymax) = (ymin as f32, ymax as f32);
    let valid = if cond.flags & FLG_IN_RANGE != 0 {
        y >= ymin && y <= ymax
    } else {
        y <= ymin || y >= ymax
    };
    if valid {
        Outcome::new(Verdict::Ok, 1)
    } else {
        Outcome::new(Verdict::Failed, 1)
    }
}
