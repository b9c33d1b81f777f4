//! Scripted predicates.
//!
//! A script condition refers to its source by a 64-bit hash. The registry
//! maps hashes to factories; each worker environment instantiates its own
//! script state at `init` so nothing is shared between workers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::condition::Condition;
use crate::env::OracleState;
use crate::oracle::WorldOracle;
use crate::types::{Pos, SearchPass, Verdict};

/// Arguments of one script invocation.
#[derive(Debug)]
pub struct ScriptCall<'a> {
    pub at: Pos,
    pub pass: SearchPass,
    /// Resolved positions of the other conditions, indexed by id.
    pub positions: &'a [Pos],
    pub condition: &'a Condition,
}

/// A loaded script predicate.
pub trait Script<O: WorldOracle>: Send {
    /// Refine the verdict of the children that ran before it.
    fn check(&mut self, call: &ScriptCall<'_>, world: &mut OracleState<O>) -> Verdict;
}

impl<O, F> Script<O> for F
where
    O: WorldOracle,
    F: FnMut(&ScriptCall<'_>, &mut OracleState<O>) -> Verdict + Send,
{
    fn check(&mut self, call: &ScriptCall<'_>, world: &mut OracleState<O>) -> Verdict {
        self(call, world)
    }
}

type Factory<O> = Arc<dyn Fn() -> Result<Box<dyn Script<O>>, String> + Send + Sync>;

struct Entry<O: WorldOracle> {
    name: String,
    factory: Factory<O>,
}

impl<O: WorldOracle> Clone for Entry<O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

/// Hash of a script source: the first eight bytes (little endian) of its
/// MD5 digest.
pub fn script_hash(source: &str) -> u64 {
    let digest = md5::compute(source.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.0[..8]);
    u64::from_le_bytes(bytes)
}

/// Known scripts by hash.
pub struct ScriptRegistry<O: WorldOracle> {
    entries: HashMap<u64, Entry<O>>,
}

impl<O: WorldOracle> ScriptRegistry<O> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a factory under the hash of `source`. Returns the hash.
    pub fn register<F>(&mut self, name: impl Into<String>, source: &str, factory: F) -> u64
    where
        F: Fn() -> Result<Box<dyn Script<O>>, String> + Send + Sync + 'static,
    {
        let hash = script_hash(source);
        self.insert(hash, name, factory);
        hash
    }

    /// Register a factory under an explicit hash.
    pub fn insert<F>(&mut self, hash: u64, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn Script<O>>, String> + Send + Sync + 'static,
    {
        self.entries.insert(
            hash,
            Entry {
                name: name.into(),
                factory: Arc::new(factory),
            },
        );
    }

    pub fn contains(&self, hash: u64) -> bool {
        self.entries.contains_key(&hash)
    }

    pub fn name(&self, hash: u64) -> Option<&str> {
        self.entries.get(&hash).map(|e| e.name.as_str())
    }

    /// Instantiate the script for `hash`. `None` when it is not registered.
    pub fn load(&self, hash: u64) -> Option<Result<Box<dyn Script<O>>, String>> {
        self.entries.get(&hash).map(|e| (e.factory)())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<O: WorldOracle> Default for ScriptRegistry<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: WorldOracle> Clone for ScriptRegistry<O> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}
