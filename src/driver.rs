//! SearchDriver – fans candidate seeds out to a pool of blocking workers.
//!
//! Each worker owns one [`EvalEnv`] and walks a stripe of the candidate
//! space. 48-bit range searches pre-test every prefix at
//! [`SearchPass::Full48`] and only expand survivors over the upper 16 bits,
//! which are then tested at the authoritative [`SearchPass::Full64`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::condition::Condition;
use crate::env::{EnvOptions, EvalEnv};
use crate::eval::test_tree_at;
use crate::oracle::WorldOracle;
use crate::protocol::{SearchHit, SearchReport};
use crate::script::ScriptRegistry;
use crate::tree::ConditionTree;
use crate::types::{Pos, SearchConfig, SearchMode, SearchPass, Verdict, MASK48};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State every worker of one run writes to.
struct Shared {
    hits: Mutex<Vec<SearchHit>>,
    tested: AtomicU64,
    stop: Arc<AtomicBool>,
    /// Set when `max_results` was reached, as opposed to an outside stop.
    saturated: AtomicBool,
    max_results: usize,
    sink: Option<mpsc::UnboundedSender<SearchHit>>,
}

impl Shared {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn record(&self, hit: SearchHit) {
        let mut hits = self.hits.lock();
        if self.max_results > 0 && hits.len() >= self.max_results {
            return;
        }
        if let Some(sink) = &self.sink {
            // receiver may have gone away; the report still carries the hit
            let _ = sink.send(hit.clone());
        }
        hits.push(hit);
        if self.max_results > 0 && hits.len() >= self.max_results {
            self.saturated.store(true, Ordering::Relaxed);
            self.stop.store(true, Ordering::Relaxed);
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct SearchDriver<O: WorldOracle> {
    config: SearchConfig,
    oracle: Arc<O>,
    tree: Arc<ConditionTree>,
    scripts: ScriptRegistry<O>,
    stop: Arc<AtomicBool>,
    sink: Option<mpsc::UnboundedSender<SearchHit>>,
}

impl<O: WorldOracle> SearchDriver<O> {
    pub fn new(
        config: SearchConfig,
        oracle: Arc<O>,
        tree: Arc<ConditionTree>,
        scripts: ScriptRegistry<O>,
    ) -> Self {
        Self {
            config,
            oracle,
            tree,
            scripts,
            stop: Arc::new(AtomicBool::new(false)),
            sink: None,
        }
    }

    /// Decode `config.conditions` and build the tree for `config.mc`.
    pub fn from_config(config: SearchConfig, oracle: Arc<O>, scripts: ScriptRegistry<O>) -> Result<Self> {
        let conditions = config
            .conditions
            .iter()
            .enumerate()
            .map(|(i, hex)| Condition::from_hex(hex).with_context(|| format!("condition #{} does not decode", i)))
            .collect::<Result<Vec<_>>>()?;
        let tree = ConditionTree::build(&conditions, config.mc).context("invalid condition tree")?;
        Ok(Self::new(config, oracle, Arc::new(tree), scripts))
    }

    /// Flag that stops the run when set; workers poll it between candidates
    /// and inside long scans.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Stream hits as they are found, in addition to the final report.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SearchHit> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sink = Some(tx);
        rx
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn tree(&self) -> &Arc<ConditionTree> {
        &self.tree
    }

    /// Run the search to completion, cancellation, or `max_results`.
    pub async fn run(self) -> Result<SearchReport> {
        let started = Instant::now();
        let threads = self.config.threads.max(1);
        let options = EnvOptions {
            estimate_terrain: self.config.estimate_terrain,
        };

        // Build every environment up front so configuration errors surface
        // before any work is spawned.
        let mut envs = Vec::with_capacity(threads);
        for _ in 0..threads {
            let mut env = EvalEnv::with_options(self.oracle.clone(), self.stop.clone(), options);
            env.init(
                self.config.mc,
                self.config.large_biomes,
                self.tree.clone(),
                &self.scripts,
            )
            .context("failed to initialise evaluation environment")?;
            envs.push(env);
        }

        info!(
            "search starting: mc={}, threads={}, conditions={}",
            self.config.mc,
            threads,
            self.tree.len()
        );

        let shared = Arc::new(Shared {
            hits: Mutex::new(Vec::new()),
            tested: AtomicU64::new(0),
            stop: self.stop.clone(),
            saturated: AtomicBool::new(false),
            max_results: self.config.max_results,
            sink: self.sink,
        });

        let mut handles = Vec::with_capacity(threads);
        for (index, env) in envs.into_iter().enumerate() {
            let shared = shared.clone();
            let mode = self.config.mode.clone();
            let origin = self.config.origin;
            handles.push(tokio::task::spawn_blocking(move || {
                let span = tracing::info_span!("worker", index);
                let _enter = span.enter();
                work(index, threads, env, &mode, origin, &shared);
            }));
        }
        for handle in handles {
            handle.await.context("search worker panicked")?;
        }

        let mut hits = std::mem::take(&mut *shared.hits.lock());
        hits.sort_by_key(|h| h.seed);
        let cancelled = shared.stopped() && !shared.saturated.load(Ordering::Relaxed);
        let report = SearchReport {
            hits,
            tested: shared.tested.load(Ordering::Relaxed),
            cancelled,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        if cancelled {
            warn!("search cancelled after {} candidates", report.tested);
        }
        info!(
            "search finished: {} hits in {} candidates ({} ms)",
            report.hits.len(),
            report.tested,
            report.elapsed_ms
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

fn work<O: WorldOracle>(
    index: usize,
    threads: usize,
    mut env: EvalEnv<O>,
    mode: &SearchMode,
    origin: Pos,
    shared: &Shared,
) {
    let mut path = vec![Pos::INVALID; env.tree().len()];
    match mode {
        SearchMode::Seeds { seeds } => {
            for &seed in seeds.iter().skip(index).step_by(threads) {
                if shared.stopped() {
                    break;
                }
                check_full(&mut env, seed, origin, &mut path, shared);
            }
        }
        SearchMode::Range48 { start, end, upper } => {
            let (start, end) = (*start & MASK48, (*end).min(MASK48 + 1));
            let mut survivors = 0u64;
            for s48 in (start..end).skip(index).step_by(threads) {
                if shared.stopped() {
                    break;
                }
                env.set_seed(s48);
                shared.tested.fetch_add(1, Ordering::Relaxed);
                if test_tree_at(origin, &mut env, SearchPass::Full48, None).is_failed() {
                    continue;
                }
                survivors += 1;
                for hi in 0..(*upper).min(1 << 16) as u64 {
                    if shared.stopped() {
                        break;
                    }
                    check_full(&mut env, s48 | (hi << 48), origin, &mut path, shared);
                }
            }
            debug!("worker {}: {} 48-bit survivors", index, survivors);
        }
    }
}

fn check_full<O: WorldOracle>(env: &mut EvalEnv<O>, seed: u64, origin: Pos, path: &mut [Pos], shared: &Shared) {
    env.set_seed(seed);
    shared.tested.fetch_add(1, Ordering::Relaxed);
    path.fill(Pos::INVALID);
    if test_tree_at(origin, env, SearchPass::Full64, Some(&mut *path)) == Verdict::Ok {
        debug!("seed {} matches", seed as i64);
        shared.record(SearchHit::from_path(seed, path));
    }
}
