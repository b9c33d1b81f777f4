//! Seedsift
//!
//! Evaluates trees of spatial conditions against procedurally generated
//! worlds to decide which seeds satisfy them.
//!
//! ## Architecture
//!
//! ```text
//! SearchDriver  (driver.rs)           ← worker pool, stop flag, hit list
//!   └── EvalEnv  (env.rs)             ← one per worker, lazy generator state
//!         ├── ConditionTree (tree.rs) ← validated conditions + adjacency
//!         ├── evaluate / test_tree_at (eval.rs)
//!         │     └── leaf predicates  (leaf/)
//!         └── WorldOracle  (oracle.rs) ← generation queries
//!               └── SyntheticOracle (synthetic.rs)
//! ```
//!
//! Every node answers with a [`Verdict`]. Cheap passes
//! ([`SearchPass::Fast48`], [`SearchPass::Full48`]) may only prune; the
//! authoritative [`SearchPass::Full64`] always answers `Ok` or `Failed`.
//! Conditions travel as fixed-layout hex strings ([`Condition::to_hex`]),
//! and search results as JSON lines ([`protocol`]).

// Core evaluation is always available.
pub mod condition;
pub mod env;
pub mod error;
pub mod eval;
pub mod oracle;
pub mod protocol;
pub mod quad;
pub mod script;
pub mod synthetic;
pub mod tree;
pub mod types;
pub mod variant;

mod leaf;

// The worker pool requires the `driver` feature.
#[cfg(feature = "driver")]
pub mod driver;

// Convenience re-exports
pub use condition::{Condition, FilterKind};
#[cfg(feature = "driver")]
pub use driver::SearchDriver;
pub use env::{EnvOptions, EvalEnv};
pub use error::{ConditionError, ConfigError};
pub use eval::{evaluate, test_tree_at};
pub use oracle::WorldOracle;
pub use protocol::{SearchHit, SearchReport};
pub use script::{Script, ScriptCall, ScriptRegistry};
pub use synthetic::SyntheticOracle;
pub use tree::ConditionTree;
pub use types::{Dimension, McVersion, Pos, SearchConfig, SearchMode, SearchPass, Verdict};
