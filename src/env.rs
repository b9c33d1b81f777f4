//! Per-worker evaluation environment.
//!
//! An [`EvalEnv`] is owned by exactly one worker. It binds a shared
//! [`ConditionTree`] to a seed and keeps the oracle's expensive generator
//! state, re-initialising parts of it only when the requested dimension or
//! noise parameter actually changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use crate::error::ConfigError;
use crate::oracle::{ClimateParam, WorldOracle};
use crate::script::{Script, ScriptRegistry};
use crate::tree::ConditionTree;
use crate::types::{Dimension, McVersion, Pos, SearchPass, MASK48, MAX_INSTANCES};

/// Switches shared by every environment of a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvOptions {
    /// Run the 1.18+ terrain estimate for structure viability.
    pub estimate_terrain: bool,
}

// ---------------------------------------------------------------------------
// Oracle state
// ---------------------------------------------------------------------------

/// The oracle plus this worker's generator and what it is initialised for.
pub struct OracleState<O: WorldOracle> {
    oracle: Arc<O>,
    g: O::Generator,
    mc: McVersion,
    large: bool,
    seed: u64,
    pass: SearchPass,
    stop: Arc<AtomicBool>,
    options: EnvOptions,

    /// Seed and dimension last applied to the generator.
    gen_seed: u64,
    gen_dim: Option<Dimension>,
    /// Dimension the surface noise is prepared for.
    surf_dim: Option<Dimension>,
    /// Single climate parameter initialised, with its octave limit.
    climate: Option<(ClimateParam, i32)>,
    /// Every climate parameter is initialised for `gen_seed`.
    climate_full: bool,
}

impl<O: WorldOracle> OracleState<O> {
    fn new(oracle: Arc<O>, stop: Arc<AtomicBool>, options: EnvOptions) -> Self {
        let mc = McVersion::NEWEST;
        let g = oracle.new_generator(mc, false);
        Self {
            oracle,
            g,
            mc,
            large: false,
            seed: 0,
            pass: SearchPass::Fast48,
            stop,
            options,
            gen_seed: 0,
            gen_dim: None,
            surf_dim: None,
            climate: None,
            climate_full: false,
        }
    }

    fn reset(&mut self, mc: McVersion, large: bool) {
        self.g = self.oracle.new_generator(mc, large);
        self.mc = mc;
        self.large = large;
        self.seed = 0;
        self.gen_seed = 0;
        self.gen_dim = None;
        self.surf_dim = None;
        self.climate = None;
        self.climate_full = false;
    }

    pub fn oracle(&self) -> &Arc<O> {
        &self.oracle
    }

    pub fn generator(&mut self) -> &mut O::Generator {
        &mut self.g
    }

    pub fn mc(&self) -> McVersion {
        self.mc
    }

    pub fn large(&self) -> bool {
        self.large
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn pass(&self) -> SearchPass {
        self.pass
    }

    pub fn options(&self) -> EnvOptions {
        self.options
    }

    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Make biome generation of `dim` valid for the current seed.
    ///
    /// Outside the overworld only the lower 48 bits matter. When just the
    /// upper bits changed on 1.15+, refreshing the Voronoi hash suffices.
    pub fn init_for_dim(&mut self, dim: Dimension) {
        let mask = if dim == Dimension::Overworld { u64::MAX } else { MASK48 };
        if self.gen_dim != Some(dim) || (self.seed & mask) != (self.gen_seed & mask) {
            self.oracle.apply_seed(&mut self.g, dim, self.seed);
            self.gen_seed = self.seed;
            self.gen_dim = Some(dim);
            self.surf_dim = None;
            self.climate = None;
            self.climate_full = dim == Dimension::Overworld && self.mc >= McVersion::V1_18;
        } else if self.mc >= McVersion::V1_15 && self.seed != self.gen_seed {
            self.oracle.refresh_voronoi(&mut self.g, self.seed);
            self.gen_seed = self.seed;
        }
    }

    /// Make climate parameter `param` valid with at most `octaves` octaves
    /// (`<= 0` for all of them).
    pub fn init_for_noise(&mut self, param: ClimateParam, octaves: i32) {
        let octaves = if octaves <= 0 { i32::MAX } else { octaves };
        if self.climate == Some((param, octaves)) {
            return;
        }
        if self.seed == self.gen_seed && self.climate_full {
            return;
        }
        self.oracle
            .init_climate(&mut self.g, self.seed, self.large, param, octaves);
        self.climate = Some((param, octaves));
    }

    /// Make the surface noise of `dim` valid for the current seed.
    pub fn prepare_surface(&mut self, dim: Dimension) {
        if self.surf_dim != Some(dim) {
            self.oracle.init_surface(&mut self.g, dim, self.seed);
            self.surf_dim = Some(dim);
        }
    }
}

// ---------------------------------------------------------------------------
// Position arena
// ---------------------------------------------------------------------------

/// Instance buffers, one fixed-capacity slot per node id.
///
/// Slot 0 belongs to the root, which never queries the oracle, so leaves
/// use it as scratch.
#[derive(Debug, Clone)]
pub struct PosArena {
    buf: Vec<Pos>,
    nodes: usize,
}

impl PosArena {
    pub fn new(nodes: usize) -> Self {
        let nodes = nodes.max(1);
        Self {
            buf: vec![Pos::default(); nodes * MAX_INSTANCES],
            nodes,
        }
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn slot(&self, node: usize) -> &[Pos] {
        &self.buf[node * MAX_INSTANCES..(node + 1) * MAX_INSTANCES]
    }

    pub fn slot_mut(&mut self, node: usize) -> &mut [Pos] {
        &mut self.buf[node * MAX_INSTANCES..(node + 1) * MAX_INSTANCES]
    }

    /// Borrow the slot of `node` (≥ 1) together with the scratch slot.
    pub fn split(&mut self, node: usize) -> (&mut [Pos], &mut [Pos]) {
        let (head, tail) = self.buf.split_at_mut(node.max(1) * MAX_INSTANCES);
        (&mut tail[..MAX_INSTANCES], &mut head[..MAX_INSTANCES])
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Everything one worker needs to evaluate the tree against candidates.
pub struct EvalEnv<O: WorldOracle> {
    pub(crate) world: OracleState<O>,
    pub(crate) tree: Arc<ConditionTree>,
    pub(crate) arena: PosArena,
    /// Position buffer for scripts evaluated without a caller path.
    pub(crate) script_buf: Vec<Pos>,
    pub(crate) scripts: HashMap<u64, Box<dyn Script<O>>>,
}

impl<O: WorldOracle> EvalEnv<O> {
    pub fn new(oracle: Arc<O>, stop: Arc<AtomicBool>) -> Self {
        Self::with_options(oracle, stop, EnvOptions::default())
    }

    pub fn with_options(oracle: Arc<O>, stop: Arc<AtomicBool>, options: EnvOptions) -> Self {
        let tree = Arc::new(ConditionTree::empty(McVersion::NEWEST));
        Self {
            world: OracleState::new(oracle, stop, options),
            arena: PosArena::new(tree.len()),
            script_buf: vec![Pos::INVALID; tree.len()],
            tree,
            scripts: HashMap::new(),
        }
    }

    /// Bind to `tree` for version `mc`, loading every script the tree uses.
    ///
    /// Fails when a script is not registered, fails to load, or depends on
    /// a condition that is not enabled.
    pub fn init(
        &mut self,
        mc: McVersion,
        large: bool,
        tree: Arc<ConditionTree>,
        registry: &ScriptRegistry<O>,
    ) -> Result<(), ConfigError> {
        self.world.reset(mc, large);
        self.scripts.clear();

        for c in tree.scripts() {
            if self.scripts.contains_key(&c.hash) {
                continue;
            }
            let script = match registry.load(c.hash) {
                None => {
                    return Err(ConfigError::MissingScript {
                        save: c.save,
                        hash: c.hash,
                    })
                }
                Some(Err(message)) => return Err(ConfigError::ScriptLoad { save: c.save, message }),
                Some(Ok(script)) => script,
            };
            for &dep in c.deps.iter().take_while(|&&d| d != 0) {
                if !tree.contains(dep as usize) {
                    return Err(ConfigError::MissingDependency {
                        save: c.save,
                        dep: dep as i32,
                    });
                }
            }
            debug!(
                "condition {}: loaded script {:016x} ({})",
                c.save,
                c.hash,
                registry.name(c.hash).unwrap_or("?")
            );
            self.scripts.insert(c.hash, script);
        }

        if self.arena.nodes() < tree.len() {
            self.arena = PosArena::new(tree.len());
        }
        self.script_buf.clear();
        self.script_buf.resize(tree.len(), Pos::INVALID);
        self.tree = tree;
        Ok(())
    }

    /// Point the environment at a new seed. Generator state is refreshed
    /// lazily on the next query that needs it.
    pub fn set_seed(&mut self, seed: u64) {
        self.world.seed = seed;
        self.world.climate = None;
    }

    pub fn seed(&self) -> u64 {
        self.world.seed
    }

    pub fn tree(&self) -> &Arc<ConditionTree> {
        &self.tree
    }

    pub fn world(&mut self) -> &mut OracleState<O> {
        &mut self.world
    }

    pub(crate) fn set_pass(&mut self, pass: SearchPass) {
        self.world.pass = pass;
    }

    /// Whether the script with this hash is loaded.
    pub fn has_script(&self, hash: u64) -> bool {
        self.scripts.contains_key(&hash)
    }

    pub fn stopped(&self) -> bool {
        self.world.stopped()
    }
}
