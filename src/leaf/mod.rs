//! Oracle-backed leaf predicates.
//!
//! [`test_cond_at`] converts a condition's area to absolute coordinates and
//! dispatches on its [`Family`]. Each handler either collects individual
//! instance positions (up to a limit) or reduces them to one center.

mod biome;
mod climate;
mod sample;
mod structure;

use crate::condition::{Condition, Family, FilterInfo};
use crate::env::OracleState;
use crate::oracle::WorldOracle;
use crate::types::{Pos, Verdict};

/// What the caller wants back in `cent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Collect {
    /// One center position in `cent[0]`.
    Center,
    /// Up to this many instance positions; `Upto(0)` stops at the first.
    Upto(usize),
}

/// Verdict of a leaf plus the number of positions written to `cent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Outcome {
    pub verdict: Verdict,
    pub count: usize,
}

impl Outcome {
    pub fn new(verdict: Verdict, count: usize) -> Self {
        Self { verdict, count }
    }

    pub fn failed() -> Self {
        Self::new(Verdict::Failed, 0)
    }
}

// ---------------------------------------------------------------------------
// Area
// ---------------------------------------------------------------------------

/// Absolute search area: a rectangle, optionally restricted to a disc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Area {
    pub x1: i32,
    pub z1: i32,
    pub x2: i32,
    pub z2: i32,
    /// Exclusive squared radius bound, 0 for a plain rectangle.
    pub rsq: i64,
}

impl Area {
    pub fn of(cond: &Condition, at: Pos) -> Self {
        if cond.rmax > 0 {
            let r = cond.rmax - 1;
            Self {
                x1: at.x.saturating_sub(r),
                z1: at.z.saturating_sub(r),
                x2: at.x.saturating_add(r),
                z2: at.z.saturating_add(r),
                rsq: (r as i64) * (r as i64) + 1,
            }
        } else {
            Self {
                x1: cond.x1.saturating_add(at.x),
                z1: cond.z1.saturating_add(at.z),
                x2: cond.x2.saturating_add(at.x),
                z2: cond.z2.saturating_add(at.z),
                rsq: 0,
            }
        }
    }

    /// Whether `p` lies inside the area around `at`.
    pub fn contains(&self, at: Pos, p: Pos) -> bool {
        if self.rsq != 0 {
            p.dist_sq(at) < self.rsq
        } else {
            p.x >= self.x1 && p.x <= self.x2 && p.z >= self.z1 && p.z <= self.z2
        }
    }

    pub fn center(&self) -> Pos {
        Pos::new(
            ((self.x1 as i64 + self.x2 as i64) >> 1) as i32,
            ((self.z1 as i64 + self.z2 as i64) >> 1) as i32,
        )
    }

    /// Cell bounds `(x1, z1, x2, z2)` on a grid of `1 << shift` blocks.
    pub fn cells(&self, shift: u32) -> (i32, i32, i32, i32) {
        (self.x1 >> shift, self.z1 >> shift, self.x2 >> shift, self.z2 >> shift)
    }

    /// Whether the origin of cell `(x, z)` on a grid of `1 << shift` lies
    /// in the disc, if the area has one.
    pub fn holds_cell(&self, at: Pos, shift: u32, x: i32, z: i32) -> bool {
        self.rsq == 0 || self.contains(at, Pos::new(x << shift, z << shift))
    }

    /// Cell bounds on a grid of `size` blocks.
    pub fn cells_div(&self, size: i32) -> (i32, i32, i32, i32) {
        (
            self.x1.div_euclid(size),
            self.z1.div_euclid(size),
            self.x2.div_euclid(size),
            self.z2.div_euclid(size),
        )
    }
}

/// Number of cells in `x1..=x2`, at least 0.
pub(crate) fn span(a: i32, b: i32) -> i64 {
    (b as i64 - a as i64 + 1).max(0)
}

// ---------------------------------------------------------------------------
// Instance accumulator
// ---------------------------------------------------------------------------

/// Collects instances into `cent` or sums them for an average.
pub(crate) struct Instances<'a> {
    cent: &'a mut [Pos],
    collect: Collect,
    n: usize,
    sx: i64,
    sz: i64,
}

impl<'a> Instances<'a> {
    pub fn new(cent: &'a mut [Pos], collect: Collect) -> Self {
        Self {
            cent,
            collect,
            n: 0,
            sx: 0,
            sz: 0,
        }
    }

    /// Record one instance. Returns `true` once the requested number of
    /// instances has been collected.
    pub fn push(&mut self, p: Pos) -> bool {
        self.n += 1;
        match self.collect {
            Collect::Center => {
                self.sx += p.x as i64;
                self.sz += p.z as i64;
                false
            }
            Collect::Upto(max) => {
                if let Some(slot) = self.cent.get_mut(self.n - 1) {
                    *slot = p;
                }
                self.n >= max
            }
        }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    /// Average of the summed instances, if any.
    pub fn mean(&self) -> Option<Pos> {
        if self.n == 0 {
            return None;
        }
        let n = self.n as i64;
        Some(Pos::new((self.sx / n) as i32, (self.sz / n) as i32))
    }

    pub fn sums(&self) -> (i64, i64) {
        (self.sx, self.sz)
    }

    /// Positions actually stored in `cent`.
    pub fn stored(&self) -> usize {
        self.n.min(self.cent.len())
    }

    pub fn set_center(&mut self, p: Pos) {
        if let Some(slot) = self.cent.first_mut() {
            *slot = p;
        }
    }
}

/// Write `p` into the first slot of `cent`.
pub(crate) fn put(cent: &mut [Pos], p: Pos) {
    if let Some(slot) = cent.first_mut() {
        *slot = p;
    }
}

/// Remove the first instance equal to `at` by swapping in the last one.
/// Returns the new length.
pub(crate) fn remove_origin(cent: &mut [Pos], n: usize, at: Pos) -> usize {
    let n = n.min(cent.len());
    match cent[..n].iter().position(|p| *p == at) {
        Some(i) => {
            cent[i] = cent[n - 1];
            n - 1
        }
        None => n,
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// One leaf evaluation.
pub(crate) struct LeafQuery<'a, O: WorldOracle> {
    pub at: Pos,
    pub world: &'a mut OracleState<O>,
    pub cond: &'a Condition,
    pub info: FilterInfo,
    pub area: Area,
    pub collect: Collect,
    /// Output positions.
    pub cent: &'a mut [Pos],
    /// Scratch for instances that are only averaged.
    pub scratch: &'a mut [Pos],
}

impl<O: WorldOracle> LeafQuery<'_, O> {
    /// Requested instance limit, or `None` when averaging.
    pub fn limit(&self) -> Option<usize> {
        match self.collect {
            Collect::Center => None,
            Collect::Upto(n) => Some(n),
        }
    }
}

/// Test `cond` with `at` as origin at the environment's current pass.
pub(crate) fn test_cond_at<O: WorldOracle>(
    at: Pos,
    world: &mut OracleState<O>,
    cond: &Condition,
    collect: Collect,
    cent: &mut [Pos],
    scratch: &mut [Pos],
) -> Outcome {
    let info = cond.info();
    let q = LeafQuery {
        at,
        world,
        cond,
        info,
        area: Area::of(cond, at),
        collect,
        cent,
        scratch,
    };

    match info.family {
        Family::Root
        | Family::Spiral
        | Family::ScaleToNether
        | Family::ScaleToOverworld
        | Family::Or
        | Family::Not
        | Family::Script => Outcome::new(Verdict::Ok, 0),
        Family::QuadHut(tier) => structure::quad_hut(q, tier),
        Family::QuadMonument(percent) => structure::quad_monument(q, percent),
        Family::Structure => structure::structures(q),
        Family::Mineshaft => structure::mineshafts(q),
        Family::Spawn => structure::spawn(q),
        Family::FirstStronghold => structure::first_stronghold(q),
        Family::Stronghold => structure::strongholds(q),
        Family::Slime => structure::slime(q),
        Family::Sample => sample::sample(q),
        Family::Layer(layer) => biome::layer(q, layer),
        Family::Temps => biome::temps(q),
        Family::Biome => biome::biomes(q),
        Family::BiomeCenter => biome::centers(q),
        Family::ClimateMinMax => climate::minmax(q),
        Family::ClimateNoise => climate::confine(q),
        Family::Height => climate::height(q),
        Family::Retired => Outcome::failed(),
    }
}
