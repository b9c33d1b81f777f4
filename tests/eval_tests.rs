//! Tree evaluation tests against the synthetic world

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use seedsift::condition::{Condition, FilterKind, VAR_ABANDONED};
    use seedsift::env::{EvalEnv, OracleState};
    use seedsift::error::ConfigError;
    use seedsift::oracle::{biome, StructureType, StructureVariant};
    use seedsift::script::{script_hash, Script, ScriptCall, ScriptRegistry};
    use seedsift::synthetic::SyntheticOracle;
    use seedsift::tree::ConditionTree;
    use seedsift::types::{Dimension, McVersion, Pos, SearchPass, Verdict};
    use seedsift::{evaluate, test_tree_at};

    const SEED: u64 = 0x1234_5678_9abc;

    /// Village condition covering exactly one village region at the origin.
    fn village(save: i32, relative: i32, count: i32) -> Condition {
        Condition::new(FilterKind::Village, save, relative)
            .with_rect(0, 0, 543, 543)
            .with_count(count)
    }

    fn env_with(
        oracle: &Arc<SyntheticOracle>,
        conds: &[Condition],
        mc: McVersion,
        scripts: &ScriptRegistry<SyntheticOracle>,
    ) -> Result<EvalEnv<SyntheticOracle>, ConfigError> {
        let tree = ConditionTree::build(conds, mc)?;
        let mut env = EvalEnv::new(oracle.clone(), Arc::new(AtomicBool::new(false)));
        env.init(mc, false, Arc::new(tree), scripts)?;
        env.set_seed(SEED);
        Ok(env)
    }

    fn env_for(oracle: &Arc<SyntheticOracle>, conds: &[Condition]) -> EvalEnv<SyntheticOracle> {
        env_with(oracle, conds, McVersion::V1_21, &ScriptRegistry::new()).expect("environment initialises")
    }

    fn fresh_path(env: &EvalEnv<SyntheticOracle>) -> Vec<Pos> {
        vec![Pos::INVALID; env.tree().len()]
    }

    /// Script factory around a plain closure over the call.
    fn script_fn<F>(f: F) -> impl Fn() -> Result<Box<dyn Script<SyntheticOracle>>, String> + Send + Sync + 'static
    where
        F: Fn(&ScriptCall<'_>) -> Verdict + Clone + Send + Sync + 'static,
    {
        move || {
            let f = f.clone();
            Ok(Box::new(move |call: &ScriptCall<'_>, _world: &mut OracleState<SyntheticOracle>| f(call))
                as Box<dyn Script<SyntheticOracle>>)
        }
    }

    // -----------------------------------------------------------------------
    // Root and combinators
    // -----------------------------------------------------------------------

    #[test]
    fn empty_tree_accepts_every_seed() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let mut env = env_for(&oracle, &[]);
        for pass in [SearchPass::Fast48, SearchPass::Full48, SearchPass::Full64] {
            assert_eq!(evaluate(Pos::new(0, 0), &mut env, pass, None), Verdict::Ok);
        }
    }

    #[test]
    fn empty_or_accepts_and_marks_no_position() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let mut env = env_for(&oracle, &[Condition::new(FilterKind::LogicOr, 1, 0)]);
        let mut path = fresh_path(&env);
        let v = evaluate(Pos::new(5, 5), &mut env, SearchPass::Full64, Some(&mut path[..]));
        assert_eq!(v, Verdict::Ok);
        assert_eq!(path[1], Pos::INVALID);
        assert_eq!(path[0], Pos::new(5, 5));
    }

    #[test]
    fn empty_not_rejects() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let mut env = env_for(&oracle, &[Condition::new(FilterKind::LogicNot, 1, 0)]);
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Failed);
    }

    #[test]
    fn not_inverts_decisive_children() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let conds = [Condition::new(FilterKind::LogicNot, 1, 0), village(2, 1, 1)];
        let mut env = env_for(&oracle, &conds);
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Ok);

        oracle.set_structure(StructureType::Village, SEED, Pos::new(100, 200));
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Failed);
    }

    #[test]
    fn or_clears_positions_of_losing_branches() {
        let oracle = Arc::new(SyntheticOracle::empty());
        oracle.set_slime_chunk(SEED, 1, 1);
        let slime = Condition::new(FilterKind::Slime, 3, 1).with_rect(0, 0, 63, 63);
        let conds = [Condition::new(FilterKind::LogicOr, 1, 0), village(2, 1, 1), slime];
        let mut env = env_for(&oracle, &conds);

        let mut path = vec![Pos::new(7, 7); env.tree().len()];
        let v = evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, Some(&mut path[..]));
        assert_eq!(v, Verdict::Ok);
        assert_eq!(path[1], Pos::new(0, 0));
        assert_eq!(path[2], Pos::INVALID, "failed branch must not keep a stale position");
        assert_eq!(path[3], Pos::new(16, 16));
    }

    #[test]
    fn scale_to_nether_divides_origin() {
        let oracle = Arc::new(SyntheticOracle::empty());
        oracle.set_slime_chunk(SEED, 2, 1);
        let conds = [
            Condition::new(FilterKind::ScaleToNether, 1, 0),
            Condition::new(FilterKind::Slime, 2, 1).with_rect(0, 0, 15, 15),
        ];
        let mut env = env_for(&oracle, &conds);
        let mut path = fresh_path(&env);
        let v = evaluate(Pos::new(160, 80), &mut env, SearchPass::Full64, Some(&mut path[..]));
        assert_eq!(v, Verdict::Ok);
        assert_eq!(path[1], Pos::new(20, 10));
        assert_eq!(path[2], Pos::new(32, 16));
    }

    #[test]
    fn scale_to_nether_truncates_negative_origin() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let conds = [
            Condition::new(FilterKind::ScaleToNether, 1, 0),
            Condition::new(FilterKind::LogicOr, 2, 1),
        ];
        let mut env = env_for(&oracle, &conds);
        let mut path = fresh_path(&env);
        evaluate(Pos::new(-12, -20), &mut env, SearchPass::Full64, Some(&mut path[..]));
        assert_eq!(path[1], Pos::new(-1, -2));
    }

    #[test]
    fn scale_to_overworld_multiplies_origin() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let conds = [
            Condition::new(FilterKind::ScaleToOverworld, 1, 0),
            Condition::new(FilterKind::LogicOr, 2, 1),
        ];
        let mut env = env_for(&oracle, &conds);
        let mut path = fresh_path(&env);
        evaluate(Pos::new(3, -2), &mut env, SearchPass::Full64, Some(&mut path[..]));
        assert_eq!(path[1], Pos::new(24, -16));
    }

    // -----------------------------------------------------------------------
    // Spiral
    // -----------------------------------------------------------------------

    fn spiral_tree() -> [Condition; 2] {
        let mut spiral = Condition::new(FilterKind::Spiral, 1, 0).with_rect(-512, -512, 512, 512);
        spiral.step = 512;
        let mut no_desert = Condition::new(FilterKind::Biome, 2, 1).with_rect(0, 0, 15, 15);
        no_desert.step = 4;
        no_desert.biome_to_excl = 1 << biome::DESERT;
        [spiral, no_desert]
    }

    #[test]
    fn spiral_returns_first_accepted_lattice_point() {
        let oracle = Arc::new(SyntheticOracle::empty());
        // desert over the center and its east neighbour
        oracle.set_biome(None, Dimension::Overworld, -16, -16, 600, 16, biome::DESERT);
        let mut env = env_for(&oracle, &spiral_tree());
        let mut path = fresh_path(&env);
        let v = test_tree_at(Pos::new(0, 0), &mut env, SearchPass::Full64, Some(&mut path[..]));
        assert_eq!(v, Verdict::Ok);
        // the third point of the walk: (0,0), (1,0), (1,1)
        assert_eq!(path[1], Pos::new(512, 512));
        assert_eq!(path[2], Pos::new(519, 519));
    }

    #[test]
    fn spiral_demotes_undecided_children() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let mut env = env_for(&oracle, &spiral_tree());
        let v = evaluate(Pos::new(0, 0), &mut env, SearchPass::Full48, None);
        assert_eq!(v, Verdict::MaybeInvalid);
    }

    #[test]
    fn spiral_fails_when_no_point_passes() {
        let oracle = Arc::new(SyntheticOracle::empty());
        oracle.set_biome(None, Dimension::Overworld, -2000, -2000, 2000, 2000, biome::DESERT);
        let mut env = env_for(&oracle, &spiral_tree());
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Failed);
    }

    // -----------------------------------------------------------------------
    // Structures through the tree
    // -----------------------------------------------------------------------

    #[test]
    fn missing_village_fails_authoritatively() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let mut env = env_for(&oracle, &[village(1, 0, 1)]);
        assert_eq!(test_tree_at(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Failed);
    }

    #[test]
    fn placed_village_resolves_its_position() {
        let oracle = Arc::new(SyntheticOracle::empty());
        oracle.set_structure(StructureType::Village, SEED, Pos::new(100, 200));
        let mut env = env_for(&oracle, &[village(1, 0, 1)]);

        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Fast48, None), Verdict::MaybeValid);
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full48, None), Verdict::MaybeValid);

        let mut path = fresh_path(&env);
        let v = test_tree_at(Pos::new(0, 0), &mut env, SearchPass::Full64, Some(&mut path[..]));
        assert_eq!(v, Verdict::Ok);
        assert_eq!(path[1], Pos::new(100, 200));
        assert_eq!(path[0], Pos::new(0, 0));
    }

    #[test]
    fn village_is_shared_by_all_upper_bits() {
        let oracle = Arc::new(SyntheticOracle::empty());
        oracle.set_structure(StructureType::Village, SEED, Pos::new(100, 200));
        let mut env = env_for(&oracle, &[village(1, 0, 1)]);
        env.set_seed(SEED | (0xbeef << 48));
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Ok);
    }

    #[test]
    fn unviable_village_only_fails_at_full_seed() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let pos = Pos::new(100, 200);
        oracle.set_structure(StructureType::Village, SEED, pos);
        oracle.set_unviable(StructureType::Village, pos);
        let mut env = env_for(&oracle, &[village(1, 0, 1)]);
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Fast48, None), Verdict::MaybeValid);
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Failed);
    }

    #[test]
    fn partial_cluster_is_undecided_before_full_seed() {
        let oracle = Arc::new(SyntheticOracle::empty());
        oracle.set_structure(StructureType::Village, SEED, Pos::new(100, 200));
        // two regions wide, one village wanted
        let c = Condition::new(FilterKind::Village, 1, 0).with_rect(0, 0, 1087, 543);
        let mut env = env_for(&oracle, &[c]);
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Fast48, None), Verdict::MaybeInvalid);
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Ok);
    }

    #[test]
    fn abandoned_variant_is_required() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let pos = Pos::new(100, 200);
        oracle.set_structure(StructureType::Village, SEED, pos);
        let mut c = village(1, 0, 1);
        c.varflags = VAR_ABANDONED;
        let mut env = env_for(&oracle, &[c]);
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Failed);

        oracle.set_variant(
            StructureType::Village,
            pos,
            StructureVariant {
                abandoned: true,
                biome: biome::PLAINS,
                ..StructureVariant::default()
            },
        );
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Ok);
    }

    #[test]
    fn branching_children_are_relative_to_each_instance() {
        let oracle = Arc::new(SyntheticOracle::empty());
        oracle.set_structure(StructureType::Village, SEED, Pos::new(100, 200));
        oracle.set_structure(StructureType::SwampHut, SEED, Pos::new(300, 300));
        let hut = Condition::new(FilterKind::Hut, 2, 1).with_rect(-100, -200, 411, 311);
        let mut env = env_for(&oracle, &[village(1, 0, 1), hut]);
        let mut path = fresh_path(&env);
        let v = test_tree_at(Pos::new(0, 0), &mut env, SearchPass::Full64, Some(&mut path[..]));
        assert_eq!(v, Verdict::Ok);
        assert_eq!(path[1], Pos::new(100, 200));
        assert_eq!(path[2], Pos::new(300, 300));
    }

    // -----------------------------------------------------------------------
    // Exclusion
    // -----------------------------------------------------------------------

    #[test]
    fn exclusion_accepts_empty_area() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let mut env = env_for(&oracle, &[village(1, 0, 0)]);
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Ok);
    }

    #[test]
    fn exclusion_only_rejects_when_authoritative() {
        let oracle = Arc::new(SyntheticOracle::empty());
        oracle.set_structure(StructureType::Village, SEED, Pos::new(100, 200));
        let mut env = env_for(&oracle, &[village(1, 0, 0)]);
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Fast48, None), Verdict::MaybeValid);
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full48, None), Verdict::MaybeValid);
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Failed);
    }

    #[test]
    fn nether_exclusion_is_decided_on_48_bits() {
        let oracle = Arc::new(SyntheticOracle::empty());
        oracle.set_structure(StructureType::Fortress, SEED, Pos::new(100, 100));
        let c = Condition::new(FilterKind::Fortress, 1, 0)
            .with_rect(0, 0, 431, 431)
            .with_count(0);
        let mut env = env_for(&oracle, &[c]);
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full48, None), Verdict::Failed);
    }

    // -----------------------------------------------------------------------
    // Pass properties
    // -----------------------------------------------------------------------

    fn mixed_tree() -> Vec<Condition> {
        let mut forest = Condition::new(FilterKind::Biome, 3, 0).with_rect(-64, -64, 64, 64);
        forest.step = 16;
        forest.biome_to_find = 1 << biome::FOREST;
        vec![
            Condition::new(FilterKind::Village, 1, 0)
                .with_rect(-1088, -1088, 1087, 1087)
                .with_count(2),
            Condition::new(FilterKind::Outpost, 2, 1).with_rect(-512, -512, 512, 512),
            forest,
            Condition::new(FilterKind::Spawn, 4, 0).with_radius(300),
        ]
    }

    #[test]
    fn full_pass_is_always_decisive() {
        let oracle = Arc::new(SyntheticOracle::hashed());
        let mut env = env_for(&oracle, &mixed_tree());
        for seed in 0..48u64 {
            env.set_seed(seed * 0x9e37_79b9);
            let v = evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None);
            assert!(
                matches!(v, Verdict::Ok | Verdict::Failed),
                "seed {}: undecided {:?}",
                seed,
                v
            );
        }
    }

    #[test]
    fn cheap_rejection_implies_full_rejection() {
        let oracle = Arc::new(SyntheticOracle::hashed());
        let mut env = env_for(&oracle, &mixed_tree());
        for seed in 0..48u64 {
            env.set_seed(seed.wrapping_mul(0x5851_f42d_4c95_7f2d));
            let fast = evaluate(Pos::new(0, 0), &mut env, SearchPass::Fast48, None);
            let full48 = evaluate(Pos::new(0, 0), &mut env, SearchPass::Full48, None);
            let full = evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None);
            if fast == Verdict::Failed || full48 == Verdict::Failed {
                assert_eq!(full, Verdict::Failed, "seed {}", seed);
            }
        }
    }

    #[test]
    fn evaluation_is_repeatable() {
        let oracle = Arc::new(SyntheticOracle::hashed());
        let mut env = env_for(&oracle, &mixed_tree());
        for seed in [1u64, 77, 4242, 0xdead_beef] {
            env.set_seed(seed);
            let mut a = fresh_path(&env);
            let mut b = fresh_path(&env);
            let va = evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, Some(&mut a));
            let vb = evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, Some(&mut b));
            assert_eq!(va, vb);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn prepass_rejection_skips_the_full_pass() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let mut env = env_for(&oracle, &[village(1, 0, 1)]);

        oracle.reset_calls();
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Fast48, None), Verdict::Failed);
        let fast_calls = oracle.calls();

        oracle.reset_calls();
        assert_eq!(test_tree_at(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Failed);
        assert_eq!(oracle.calls(), fast_calls);
    }

    // -----------------------------------------------------------------------
    // Scripts
    // -----------------------------------------------------------------------

    #[test]
    fn script_sees_positions_of_its_children() {
        let oracle = Arc::new(SyntheticOracle::empty());
        oracle.set_structure(StructureType::Village, SEED, Pos::new(100, 200));
        let mut scripts = ScriptRegistry::new();
        let hash = scripts.register(
            "village at 100,200",
            "return pos[2] == (100, 200)",
            script_fn(|call: &ScriptCall<'_>| {
                if call.positions.get(2) == Some(&Pos::new(100, 200)) {
                    Verdict::Ok
                } else {
                    Verdict::Failed
                }
            }),
        );
        let mut script = Condition::new(FilterKind::Script, 1, 0);
        script.hash = hash;
        let mut env = env_with(&oracle, &[script, village(2, 1, 1)], McVersion::V1_21, &scripts).unwrap();

        assert!(env.has_script(hash));
        assert_eq!(test_tree_at(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Ok);
    }

    #[test]
    fn script_is_skipped_when_children_fail() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut scripts = ScriptRegistry::new();
        let hash = scripts.register(
            "counter",
            "count()",
            script_fn(move |_call: &ScriptCall<'_>| {
                counter.fetch_add(1, Ordering::Relaxed);
                Verdict::Ok
            }),
        );
        let mut script = Condition::new(FilterKind::Script, 1, 0);
        script.hash = hash;
        let mut env = env_with(&oracle, &[script, village(2, 1, 1)], McVersion::V1_21, &scripts).unwrap();
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Failed);
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn script_can_stop_the_search() {
        let oracle = Arc::new(SyntheticOracle::empty());
        oracle.set_structure(StructureType::Village, SEED, Pos::new(100, 200));
        oracle.set_structure(StructureType::SwampHut, SEED, Pos::new(300, 300));

        let stop = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut scripts = ScriptRegistry::new();
        let (flag, counter) = (stop.clone(), calls.clone());
        let hash = scripts.register("stopper", "stop()", move || {
            let (flag, counter) = (flag.clone(), counter.clone());
            Ok(Box::new(
                move |_call: &ScriptCall<'_>, _world: &mut OracleState<SyntheticOracle>| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    flag.store(true, Ordering::Relaxed);
                    Verdict::Ok
                },
            ) as Box<dyn Script<SyntheticOracle>>)
        });

        let hut = Condition::new(FilterKind::Hut, 2, 1).with_rect(-100, -200, 411, 311);
        let mut script = Condition::new(FilterKind::Script, 3, 2);
        script.hash = hash;
        let tree = ConditionTree::build(&[village(1, 0, 1), hut, script], McVersion::V1_21).unwrap();
        let mut env = EvalEnv::new(oracle.clone(), stop.clone());
        env.init(McVersion::V1_21, false, Arc::new(tree), &scripts).unwrap();
        env.set_seed(SEED);

        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Failed);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(env.stopped());

        // a stopped environment answers without touching the world
        oracle.reset_calls();
        assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Failed);
        assert_eq!(oracle.calls(), 0);
    }

    #[test]
    fn stop_skips_remaining_or_branches() {
        let oracle = Arc::new(SyntheticOracle::empty());
        oracle.set_structure(StructureType::Village, SEED, Pos::new(100, 200));

        let stop = Arc::new(AtomicBool::new(false));
        let mut scripts = ScriptRegistry::new();
        let flag = stop.clone();
        let hash = scripts.register("undecided stopper", "stop(); return maybe", move || {
            let flag = flag.clone();
            Ok(Box::new(
                move |_call: &ScriptCall<'_>, _world: &mut OracleState<SyntheticOracle>| {
                    flag.store(true, Ordering::Relaxed);
                    Verdict::MaybeValid
                },
            ) as Box<dyn Script<SyntheticOracle>>)
        });

        let mut script = Condition::new(FilterKind::Script, 2, 1);
        script.hash = hash;
        let conds = [Condition::new(FilterKind::LogicOr, 1, 0), script, village(3, 1, 1)];
        let tree = ConditionTree::build(&conds, McVersion::V1_21).unwrap();
        let mut env = EvalEnv::new(oracle.clone(), stop.clone());
        env.init(McVersion::V1_21, false, Arc::new(tree), &scripts).unwrap();
        env.set_seed(SEED);

        oracle.reset_calls();
        let mut path = fresh_path(&env);
        let v = evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, Some(&mut path[..]));
        assert_eq!(v, Verdict::Failed);
        // the village branch after the script is never looked at
        assert_eq!(oracle.calls(), 0);
        assert_eq!(path[3], Pos::INVALID);
    }

    #[test]
    fn scripts_without_a_path_start_from_a_clean_buffer() {
        let oracle = Arc::new(SyntheticOracle::empty());
        oracle.set_structure(StructureType::Village, SEED, Pos::new(100, 200));
        let mut scripts = ScriptRegistry::new();
        let first = scripts.register("pass", "return ok", script_fn(|_call: &ScriptCall<'_>| Verdict::Ok));
        let second = scripts.register(
            "sees nothing of the first",
            "return pos[2] == invalid",
            script_fn(|call: &ScriptCall<'_>| {
                if call.positions.len() == 4 && call.positions[2] == Pos::INVALID {
                    Verdict::Ok
                } else {
                    Verdict::Failed
                }
            }),
        );

        let mut a = Condition::new(FilterKind::Script, 1, 0);
        a.hash = first;
        let mut b = Condition::new(FilterKind::Script, 3, 0);
        b.hash = second;
        let mut env = env_with(&oracle, &[a, village(2, 1, 1), b], McVersion::V1_21, &scripts).unwrap();

        for _ in 0..3 {
            assert_eq!(evaluate(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Ok);
            assert_eq!(test_tree_at(Pos::new(0, 0), &mut env, SearchPass::Full64, None), Verdict::Ok);
        }
    }

    #[test]
    fn unregistered_script_is_a_config_error() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let mut script = Condition::new(FilterKind::Script, 1, 0);
        script.hash = 99;
        let result = env_with(&oracle, &[script], McVersion::V1_21, &ScriptRegistry::new());
        assert!(matches!(
            result,
            Err(ConfigError::MissingScript { save: 1, hash: 99 })
        ));
    }

    #[test]
    fn failing_script_factory_is_reported() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let mut scripts = ScriptRegistry::new();
        let hash = scripts.register("broken", "syntax error(", || Err("line 1: unexpected eof".to_string()));
        let mut script = Condition::new(FilterKind::Script, 4, 0);
        script.hash = hash;
        match env_with(&oracle, &[script], McVersion::V1_21, &scripts) {
            Err(ConfigError::ScriptLoad { save, message }) => {
                assert_eq!(save, 4);
                assert!(message.contains("unexpected eof"));
            }
            other => panic!("expected a load error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn script_dependencies_must_be_enabled() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let mut scripts = ScriptRegistry::new();
        let hash = scripts.register("needs 7", "pos[7]", script_fn(|_call: &ScriptCall<'_>| Verdict::Ok));
        let mut script = Condition::new(FilterKind::Script, 1, 0);
        script.hash = hash;
        script.deps[0] = 7;
        let result = env_with(&oracle, &[script.clone()], McVersion::V1_21, &scripts);
        assert!(matches!(
            result,
            Err(ConfigError::MissingDependency { save: 1, dep: 7 })
        ));

        let slime = Condition::new(FilterKind::Slime, 7, 0).with_rect(0, 0, 15, 15);
        assert!(env_with(&oracle, &[script, slime], McVersion::V1_21, &scripts).is_ok());
    }

    #[test]
    fn unreachable_scripts_are_not_loaded() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let mut orphan = Condition::new(FilterKind::Script, 2, 9);
        orphan.hash = 1234;
        assert!(env_with(&oracle, &[village(1, 0, 1), orphan], McVersion::V1_21, &ScriptRegistry::new()).is_ok());
    }

    #[test]
    fn script_hash_is_stable() {
        assert_eq!(script_hash("return true"), script_hash("return true"));
        assert_ne!(script_hash("return true"), script_hash("return false"));
    }
}
