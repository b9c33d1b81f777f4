//! Condition tree evaluation.
//!
//! [`evaluate`] walks the tree from the root once for one origin and pass.
//! Combinator nodes (spiral, scaling, OR, NOT, scripts) never query the
//! oracle themselves; every other node resolves its own predicate through
//! the leaf catalog and then either branches over its instances or ANDs its
//! children against one averaged center.
//!
//! When a path buffer is supplied, every visited node that reaches
//! [`Verdict::MaybeValid`] or better writes the position it resolved to at
//! index `save`. Nodes the walk does not reach are left untouched.

use std::collections::HashMap;

use log::trace;

use crate::condition::{Branch, Family};
use crate::env::{EvalEnv, OracleState, PosArena};
use crate::leaf::{test_cond_at, Area, Collect};
use crate::oracle::WorldOracle;
use crate::script::{Script, ScriptCall};
use crate::tree::ConditionTree;
use crate::types::{Pos, SearchPass, Verdict, MAX_INSTANCES};

/// Default spiral lattice step in blocks.
const SPIRAL_STEP: i32 = 512;

/// Evaluate the tree bound to `env` with `at` as origin at `pass`.
///
/// `path`, when given, is indexed by condition id and should hold at least
/// `env.tree().len()` entries; writes past its end are dropped.
pub fn evaluate<O: WorldOracle>(
    at: Pos,
    env: &mut EvalEnv<O>,
    pass: SearchPass,
    path: Option<&mut [Pos]>,
) -> Verdict {
    env.set_pass(pass);
    let EvalEnv {
        world,
        tree,
        arena,
        script_buf,
        scripts,
    } = env;
    let mut walker = Walker {
        tree: &**tree,
        world,
        arena,
        script_buf,
        scripts,
    };
    walker.node(0, at, path)
}

/// Search entry point: a silent [`SearchPass::Fast48`] pre-pass, then the
/// requested pass.
///
/// A candidate the cheap pass rejects is never evaluated at the stricter
/// pass.
pub fn test_tree_at<O: WorldOracle>(
    at: Pos,
    env: &mut EvalEnv<O>,
    pass: SearchPass,
    path: Option<&mut [Pos]>,
) -> Verdict {
    if pass != SearchPass::Fast48 && evaluate(at, env, SearchPass::Fast48, None).is_failed() {
        trace!("seed {}: rejected by the 48-bit pre-pass", env.seed());
        return Verdict::Failed;
    }
    evaluate(at, env, pass, path)
}

// ---------------------------------------------------------------------------
// Walker
// ---------------------------------------------------------------------------

struct Walker<'a, O: WorldOracle> {
    tree: &'a ConditionTree,
    world: &'a mut OracleState<O>,
    arena: &'a mut PosArena,
    script_buf: &'a mut Vec<Pos>,
    scripts: &'a mut HashMap<u64, Box<dyn Script<O>>>,
}

fn write(path: &mut Option<&mut [Pos]>, id: usize, p: Pos) {
    if let Some(slot) = path.as_deref_mut().and_then(|buf| buf.get_mut(id)) {
        *slot = p;
    }
}

impl<O: WorldOracle> Walker<'_, O> {
    fn node(&mut self, id: usize, at: Pos, path: Option<&mut [Pos]>) -> Verdict {
        if self.world.stopped() {
            return Verdict::Failed;
        }
        let tree = self.tree;
        let info = tree.condition(id).info();
        let children = tree.children(id);

        match info.family {
            Family::Spiral => self.spiral(id, at, path),
            Family::ScaleToNether => self.scaled(id, Pos::new(at.x / 8, at.z / 8), path),
            Family::ScaleToOverworld => self.scaled(
                id,
                Pos::new(at.x.saturating_mul(8), at.z.saturating_mul(8)),
                path,
            ),
            Family::Or => self.any(id, at, path),
            Family::Not => self.not(id, at, path),
            Family::Script => self.script(id, at, path),
            Family::Root if children.is_empty() => Verdict::Ok,
            Family::Root => {
                let mut path = path;
                let st = self.all(children, at, Verdict::Ok, path.as_deref_mut());
                if st >= Verdict::MaybeValid {
                    write(&mut path, id, at);
                }
                st
            }
            _ if children.is_empty() => self.leaf(id, at, path),
            _ if info.branch == Branch::None
                || (info.branch == Branch::Cluster && tree.condition(id).count != 1) =>
            {
                self.averaged(id, at, path)
            }
            _ => self.branching(id, at, path),
        }
    }

    /// AND of `children` at `at`, starting from `st`.
    fn all(
        &mut self,
        children: &[usize],
        at: Pos,
        mut st: Verdict,
        mut path: Option<&mut [Pos]>,
    ) -> Verdict {
        for &b in children {
            if st == Verdict::Failed {
                break;
            }
            let sta = self.node(b, at, path.as_deref_mut());
            if self.world.stopped() {
                return Verdict::Failed;
            }
            st = st.min(sta);
        }
        st
    }

    fn spiral(&mut self, id: usize, at: Pos, mut path: Option<&mut [Pos]>) -> Verdict {
        let tree = self.tree;
        let cond = tree.condition(id);
        let children = tree.children(id);
        let step = if cond.step > 0 { cond.step } else { SPIRAL_STEP };
        let area = Area::of(cond, at);
        let (rx1, rz1, rx2, rz2) = area.cells_div(step);

        let mut st = Verdict::Failed;
        let (mut rx, mut rz) = ((rx1 + rx2) >> 1, (rz1 + rz2) >> 1);
        let (mut dx, mut dz) = (1, 0);
        let (mut i, mut dl) = (0, 1);
        loop {
            let inx = rx >= rx1 && rx <= rx2;
            let inz = rz >= rz1 && rz <= rz2;
            if !inx && !inz {
                break;
            }
            if inx && inz {
                let pos = Pos::new(rx.saturating_mul(step), rz.saturating_mul(step));
                let inside = if area.rsq != 0 {
                    pos.dist_sq(at) < area.rsq
                } else {
                    pos.x >= area.x1 && pos.x <= area.x2 && pos.z >= area.z1 && pos.z <= area.z2
                };
                if inside {
                    let mut sta = self.all(children, pos, Verdict::Ok, path.as_deref_mut());
                    if self.world.stopped() {
                        return Verdict::Failed;
                    }
                    // the spiral moves on, so this position may still be superseded
                    if sta == Verdict::MaybeValid {
                        sta = Verdict::MaybeInvalid;
                    }
                    st = st.max(sta);
                    if st >= Verdict::MaybeValid {
                        write(&mut path, id, pos);
                    }
                    if st == Verdict::Ok {
                        return st;
                    }
                }
            }
            rx += dx;
            rz += dz;
            i += 1;
            if i == dl {
                i = 0;
                (dx, dz) = (-dz, dx);
                if dz == 0 {
                    dl += 1;
                }
            }
        }
        st
    }

    fn scaled(&mut self, id: usize, pos: Pos, mut path: Option<&mut [Pos]>) -> Verdict {
        let tree = self.tree;
        let st = self.all(tree.children(id), pos, Verdict::Ok, path.as_deref_mut());
        if st >= Verdict::MaybeValid {
            write(&mut path, id, pos);
        }
        st
    }

    fn any(&mut self, id: usize, at: Pos, mut path: Option<&mut [Pos]>) -> Verdict {
        let tree = self.tree;
        let children = tree.children(id);
        if children.is_empty() {
            write(&mut path, id, Pos::INVALID);
            return Verdict::Ok;
        }

        let mut st = Verdict::Failed;
        let mut b_ok = None;
        for &b in children {
            let sta = self.node(b, at, path.as_deref_mut());
            if self.world.stopped() {
                return Verdict::Failed;
            }
            st = st.max(sta);
            if st >= Verdict::MaybeValid {
                b_ok = Some(b);
            }
            if st == Verdict::Ok {
                break;
            }
        }
        if st >= Verdict::MaybeValid {
            write(&mut path, id, at);
            // stale sibling positions must not leak into later conditions
            for &b in children.iter().filter(|&&b| Some(b) != b_ok) {
                write(&mut path, b, Pos::INVALID);
            }
        }
        st
    }

    fn not(&mut self, id: usize, at: Pos, mut path: Option<&mut [Pos]>) -> Verdict {
        let tree = self.tree;
        let children = tree.children(id);
        if children.is_empty() {
            return Verdict::Failed;
        }
        let mut st = Verdict::Ok;
        for &b in children {
            let sta = self.node(b, at, path.as_deref_mut());
            if self.world.stopped() {
                return Verdict::Failed;
            }
            match sta {
                Verdict::Ok => return Verdict::Failed,
                Verdict::Failed => return Verdict::Ok,
                _ if sta > st => st = sta,
                _ => {}
            }
        }
        st
    }

    fn script(&mut self, id: usize, at: Pos, path: Option<&mut [Pos]>) -> Verdict {
        let tree = self.tree;
        if !self.scripts.contains_key(&tree.condition(id).hash) {
            return Verdict::Ok;
        }

        // the script reads sibling positions, so it always gets a buffer
        match path {
            Some(buf) => self.script_with(id, at, buf),
            None => {
                let mut buf = std::mem::take(self.script_buf);
                buf.clear();
                buf.resize(tree.len(), Pos::INVALID);
                let st = self.script_with(id, at, &mut buf);
                *self.script_buf = buf;
                st
            }
        }
    }

    fn script_with(&mut self, id: usize, at: Pos, buf: &mut [Pos]) -> Verdict {
        let tree = self.tree;
        let cond = tree.condition(id);

        let mut st = Verdict::Ok;
        for &b in tree.children(id) {
            let sta = self.node(b, at, Some(&mut *buf));
            if self.world.stopped() {
                return Verdict::Failed;
            }
            if sta < st {
                st = sta;
                if st == Verdict::Failed {
                    return st;
                }
            }
        }
        if st <= Verdict::MaybeInvalid {
            return st;
        }

        let call = ScriptCall {
            at,
            pass: self.world.pass(),
            positions: buf,
            condition: cond,
        };
        let Some(script) = self.scripts.get_mut(&cond.hash) else {
            return st;
        };
        let sta = script.check(&call, self.world);
        if self.world.stopped() {
            return Verdict::Failed;
        }
        st.min(sta)
    }

    /// Node without children: its own predicate decides.
    fn leaf(&mut self, id: usize, at: Pos, mut path: Option<&mut [Pos]>) -> Verdict {
        let tree = self.tree;
        let cond = tree.condition(id);
        let (inst, scratch) = self.arena.split(id);
        let out = test_cond_at(
            at,
            self.world,
            cond,
            Collect::Upto(cond.count.max(0) as usize),
            inst,
            scratch,
        );
        let st = out.verdict;
        if st >= Verdict::MaybeValid {
            // several instances only have a defined position once confirmed
            let p = if out.count == 1 || (out.count > 1 && st == Verdict::Ok) {
                inst[0]
            } else {
                Pos::INVALID
            };
            write(&mut path, id, p);
        }
        st
    }

    /// Children evaluated against the center of all instances.
    fn averaged(&mut self, id: usize, at: Pos, mut path: Option<&mut [Pos]>) -> Verdict {
        let tree = self.tree;
        let cond = tree.condition(id);
        let (inst, scratch) = self.arena.split(id);
        let out = test_cond_at(at, self.world, cond, Collect::Center, inst, scratch);
        if matches!(out.verdict, Verdict::Failed | Verdict::MaybeInvalid) {
            return out.verdict;
        }
        let pos = inst[0];

        let st = self.all(tree.children(id), pos, out.verdict, path.as_deref_mut());
        if st >= Verdict::MaybeValid {
            write(&mut path, id, pos);
        }
        st
    }

    /// Children evaluated once per instance; the best instance wins.
    fn branching(&mut self, id: usize, at: Pos, mut path: Option<&mut [Pos]>) -> Verdict {
        let tree = self.tree;
        let cond = tree.condition(id);
        let children = tree.children(id);
        let (inst, scratch) = self.arena.split(id);
        let out = test_cond_at(
            at,
            self.world,
            cond,
            Collect::Upto(MAX_INSTANCES),
            inst,
            scratch,
        );
        let mut st = out.verdict;
        if matches!(st, Verdict::Failed | Verdict::MaybeInvalid) {
            return st;
        }

        let mut sta = Verdict::Failed;
        let mut iok = 0;
        for i in 0..out.count.min(MAX_INSTANCES) {
            // children use other slots, so this node's instances stay put
            let pos = self.arena.slot(id)[i];
            let stb = self.all(children, pos, Verdict::Ok, path.as_deref_mut());
            if self.world.stopped() {
                return Verdict::Failed;
            }
            if stb > sta {
                sta = stb;
                if sta >= Verdict::MaybeValid {
                    iok = i;
                }
            }
            if sta >= st {
                break;
            }
        }
        st = st.min(sta);
        if st >= Verdict::MaybeValid {
            write(&mut path, id, self.arena.slot(id)[iok]);
        }
        st
    }
}
