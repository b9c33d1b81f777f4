//! Monte-Carlo presence tests for biomes and climate noise.
//!
//! Random 1:4 cells of the area are drawn until a normal-approximation
//! confidence interval around the hit rate lies entirely above or below
//! the requested coverage.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::climate::test_bounds;
use super::{put, Collect, LeafQuery, Outcome};
use crate::condition::{FilterKind, FLG_INVERT};
use crate::oracle::{ClimateParam, WorldOracle};
use crate::types::{Dimension, McVersion, Pos, SearchPass, Verdict, MAX_INSTANCES};

/// Samples drawn before the interval is trusted.
const MIN_SAMPLES: usize = 8;

/// Hard cap on drawn cells, including those rejected by a radius.
const MAX_DRAWS: usize = 1 << 16;

/// Upper standard normal quantile for the tail probability `p` in (0, 0.5].
///
/// Abramowitz & Stegun 26.2.23, absolute error below 4.5e-4.
fn normal_quantile(p: f64) -> f64 {
    let t = (-2.0 * p.ln()).sqrt();
    let num = 2.515517 + 0.802853 * t + 0.010328 * t * t;
    let den = 1.0 + 1.432788 * t + 0.189269 * t * t + 0.001308 * t * t * t;
    t - num / den
}

/// Sequential test of "hit rate ≥ coverage" at the given confidence.
#[derive(Debug, Clone, Copy)]
struct Estimate {
    coverage: f64,
    z: f64,
    n: usize,
    hits: usize,
}

impl Estimate {
    fn new(coverage: f64, confidence: f64) -> Self {
        Self {
            coverage,
            z: normal_quantile((1.0 - confidence) / 2.0),
            n: 0,
            hits: 0,
        }
    }

    fn record(&mut self, hit: bool) {
        self.n += 1;
        self.hits += hit as usize;
    }

    fn rate(&self) -> f64 {
        (self.hits as f64 + 0.5) / (self.n as f64 + 1.0)
    }

    /// `Some(accepted)` once the interval excludes the coverage.
    fn decided(&self) -> Option<bool> {
        if self.n < MIN_SAMPLES {
            return None;
        }
        let p = self.rate();
        let half = self.z * (p * (1.0 - p) / self.n as f64).sqrt();
        if p - half >= self.coverage {
            Some(true)
        } else if p + half < self.coverage {
            Some(false)
        } else {
            None
        }
    }
}

pub(super) fn sample<O: WorldOracle>(q: LeafQuery<'_, O>) -> Outcome {
    let LeafQuery {
        at,
        world,
        cond,
        area,
        collect,
        cent,
        ..
    } = q;
    if world.pass() != SearchPass::Full64 {
        return Outcome::new(Verdict::MaybeInvalid, 0);
    }
    let (confidence, coverage) = (cond.confidence as f64, cond.coverage as f64);
    if !(confidence > 0.0 && confidence < 1.0) || !(coverage > 0.0 && coverage < 1.0) {
        return Outcome::failed();
    }
    let noise = cond.kind == FilterKind::NoiseSample;
    if noise && world.mc() <= McVersion::V1_17 {
        return Outcome::failed();
    }
    let param = if noise {
        match ClimateParam::from_index(cond.para as usize) {
            Some(p) => Some(p),
            None => return Outcome::failed(),
        }
    } else {
        None
    };

    let oracle = world.oracle().clone();
    match param {
        Some(p) => world.init_for_noise(p, cond.octave as i32),
        None => world.init_for_dim(Dimension::Overworld),
    }
    let (lo, hi) = test_bounds(cond.minmax, cond.vmin, cond.vmax);
    let invert = cond.flags & FLG_INVERT != 0;
    let y = cond.y >> 2;

    let (x1, z1, x2, z2) = area.cells(2);
    if x2 < x1 || z2 < z1 {
        return Outcome::failed();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(world.seed());
    let mut est = Estimate::new(coverage, confidence);
    let (mut sx, mut sz) = (0i64, 0i64);
    let mut stored = 0usize;
    let mut accepted = None;

    for _ in 0..MAX_DRAWS {
        if world.stopped() {
            return Outcome::failed();
        }
        let x = rng.gen_range(x1..=x2);
        let z = rng.gen_range(z1..=z2);
        let p = Pos::new(x << 2, z << 2);
        if area.rsq != 0 && p.dist_sq(at) >= area.rsq {
            continue;
        }

        let hit = match param {
            Some(param) => {
                let v = oracle.climate_at(world.generator(), param, x, z) * 10000.0;
                (v > lo && v < hi) != invert
            }
            None => cond.filter.include.contains(oracle.biome_at(world.generator(), 4, x, y, z)),
        };
        est.record(hit);
        if hit {
            sx += p.x as i64;
            sz += p.z as i64;
            if stored < MAX_INSTANCES.min(cent.len()) {
                cent[stored] = p;
                stored += 1;
            }
        }
        accepted = est.decided();
        if accepted.is_some() {
            break;
        }
    }
    let ok = accepted.unwrap_or(est.n > 0 && est.rate() >= coverage);

    let count = match collect {
        Collect::Upto(_) if cond.count == 1 => stored,
        _ if est.hits > 0 => {
            let n = est.hits as i64;
            put(cent, Pos::new((sx / n + 2) as i32, (sz / n + 2) as i32));
            1
        }
        _ => {
            put(cent, at);
            1
        }
    };
    if ok {
        Outcome::new(Verdict::Ok, count)
    } else {
        Outcome::new(Verdict::Failed, count)
    }
}
