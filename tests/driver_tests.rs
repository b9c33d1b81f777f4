//! SearchDriver and output protocol tests

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use seedsift::condition::{Condition, FilterKind};
    use seedsift::oracle::StructureType;
    use seedsift::protocol::{ResolvedPos, SearchEvent, SearchHit, SearchPayload, SearchReport};
    use seedsift::script::ScriptRegistry;
    use seedsift::synthetic::SyntheticOracle;
    use seedsift::tree::ConditionTree;
    use seedsift::types::{McVersion, Pos, SearchConfig, SearchMode};
    use seedsift::SearchDriver;

    fn village() -> Condition {
        Condition::new(FilterKind::Village, 1, 0).with_rect(0, 0, 543, 543)
    }

    fn config(mode: SearchMode, threads: usize) -> SearchConfig {
        SearchConfig {
            mc: McVersion::V1_21,
            threads,
            mode,
            ..Default::default()
        }
    }

    fn driver(
        oracle: &Arc<SyntheticOracle>,
        conds: &[Condition],
        cfg: SearchConfig,
    ) -> SearchDriver<SyntheticOracle> {
        let tree = ConditionTree::build(conds, cfg.mc).expect("valid tree");
        SearchDriver::new(cfg, oracle.clone(), Arc::new(tree), ScriptRegistry::new())
    }

    fn village_at(seed: u64) -> Arc<SyntheticOracle> {
        let oracle = Arc::new(SyntheticOracle::empty());
        oracle.set_structure(StructureType::Village, seed, Pos::new(100, 100));
        oracle
    }

    // -----------------------------------------------------------------------
    // Seed lists
    // -----------------------------------------------------------------------

    #[test]
    fn seed_list_reports_matching_seeds() {
        let oracle = village_at(5);
        let d = driver(
            &oracle,
            &[village()],
            config(SearchMode::Seeds { seeds: vec![1, 2, 5, 7] }, 2),
        );
        let report = tokio_test::block_on(d.run()).expect("search runs");
        assert_eq!(report.seeds(), vec![5]);
        assert_eq!(report.tested, 4);
        assert!(!report.cancelled);

        let hit = &report.hits[0];
        assert_eq!(hit.position(0), Some(Pos::new(0, 0)));
        assert_eq!(hit.position(1), Some(Pos::new(100, 100)));
    }

    #[test]
    fn hits_are_sorted_by_seed() {
        let oracle = Arc::new(SyntheticOracle::empty());
        for seed in [9, 3, 6] {
            oracle.set_structure(StructureType::Village, seed, Pos::new(100, 100));
        }
        let d = driver(
            &oracle,
            &[village()],
            config(SearchMode::Seeds { seeds: vec![9, 1, 6, 3] }, 3),
        );
        let report = tokio_test::block_on(d.run()).unwrap();
        assert_eq!(report.seeds(), vec![3, 6, 9]);
    }

    // -----------------------------------------------------------------------
    // 48-bit ranges
    // -----------------------------------------------------------------------

    #[test]
    fn range_expands_surviving_prefixes() {
        let oracle = village_at(3);
        let mode = SearchMode::Range48 {
            start: 0,
            end: 16,
            upper: 2,
        };
        let d = driver(&oracle, &[village()], config(mode, 1));
        let report = tokio_test::block_on(d.run()).unwrap();
        assert_eq!(report.seeds(), vec![3, 3 | (1 << 48)]);
        // 16 prefixes plus two expanded full seeds
        assert_eq!(report.tested, 18);
    }

    #[test]
    fn range_without_matches_is_empty() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let mode = SearchMode::Range48 {
            start: 100,
            end: 110,
            upper: 4,
        };
        let d = driver(&oracle, &[village()], config(mode, 2));
        let report = tokio_test::block_on(d.run()).unwrap();
        assert!(report.hits.is_empty());
        assert_eq!(report.tested, 10);
    }

    // -----------------------------------------------------------------------
    // Stopping
    // -----------------------------------------------------------------------

    #[test]
    fn max_results_stops_without_cancelling() {
        let oracle = village_at(5);
        let mut cfg = config(
            SearchMode::Seeds {
                seeds: vec![5, 5 | (1 << 48), 5 | (2 << 48)],
            },
            1,
        );
        cfg.max_results = 1;
        let report = tokio_test::block_on(driver(&oracle, &[village()], cfg).run()).unwrap();
        assert_eq!(report.hits.len(), 1);
        assert!(!report.cancelled);
    }

    #[test]
    fn outside_stop_cancels() {
        let oracle = village_at(5);
        let d = driver(
            &oracle,
            &[village()],
            config(SearchMode::Seeds { seeds: vec![5, 6] }, 1),
        );
        d.stop_handle().store(true, Ordering::Relaxed);
        let report = tokio_test::block_on(d.run()).unwrap();
        assert!(report.cancelled);
        assert!(report.hits.is_empty());
        assert_eq!(report.tested, 0);
    }

    #[test]
    fn subscribers_receive_hits() {
        let oracle = village_at(5);
        let mut d = driver(
            &oracle,
            &[village()],
            config(SearchMode::Seeds { seeds: vec![4, 5] }, 1),
        );
        let mut rx = d.subscribe();
        let report = tokio_test::block_on(d.run()).unwrap();
        let streamed = rx.try_recv().expect("hit was streamed");
        assert_eq!(streamed, report.hits[0]);
        assert!(rx.try_recv().is_err());
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    #[test]
    fn missing_script_fails_before_searching() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let mut script = Condition::new(FilterKind::Script, 1, 0);
        script.hash = 99;
        let d = driver(
            &oracle,
            &[script],
            config(SearchMode::Seeds { seeds: vec![1] }, 1),
        );
        assert!(tokio_test::block_on(d.run()).is_err());
    }

    #[test]
    fn conditions_are_decoded_from_hex() {
        let oracle = village_at(7);
        let mut cfg = config(SearchMode::Seeds { seeds: vec![6, 7] }, 1);
        cfg.conditions = vec![village().to_hex()];
        let d = SearchDriver::from_config(cfg, oracle.clone(), ScriptRegistry::new()).expect("config decodes");
        assert_eq!(d.tree().len(), 2);
        let report = tokio_test::block_on(d.run()).unwrap();
        assert_eq!(report.seeds(), vec![7]);
    }

    #[test]
    fn undecodable_condition_is_rejected() {
        let oracle = Arc::new(SyntheticOracle::empty());
        let mut cfg = config(SearchMode::Seeds { seeds: vec![1] }, 1);
        cfg.conditions = vec!["zz".into()];
        assert!(SearchDriver::from_config(cfg, oracle, ScriptRegistry::new()).is_err());
    }

    // -----------------------------------------------------------------------
    // Protocol
    // -----------------------------------------------------------------------

    #[test]
    fn hit_drops_unresolved_positions() {
        let path = [Pos::new(0, 0), Pos::INVALID, Pos::new(-32, 48)];
        let hit = SearchHit::from_path(42, &path);
        assert_eq!(
            hit.positions,
            vec![
                ResolvedPos { id: 0, x: 0, z: 0 },
                ResolvedPos { id: 2, x: -32, z: 48 }
            ]
        );
        assert_eq!(hit.position(1), None);
    }

    #[test]
    fn hit_event_json_shape() {
        let hit = SearchHit::from_path(42, &[Pos::new(8, -8)]);
        let event = SearchEvent::new("north", SearchPayload::Hit(hit.clone()));
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["event"], "hit");
        assert_eq!(v["search"], "north");
        assert_eq!(v["seed"], 42);
        assert_eq!(v["positions"][0]["x"], 8);

        let back: SearchEvent = serde_json::from_value(v).unwrap();
        match back.payload {
            SearchPayload::Hit(h) => assert_eq!(h, hit),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn empty_positions_are_omitted() {
        let hit = SearchHit::from_path(1, &[Pos::INVALID]);
        let v = serde_json::to_value(&hit).unwrap();
        assert!(v.get("positions").is_none());
    }

    #[test]
    fn finished_event_carries_report() {
        let report = SearchReport {
            hits: vec![SearchHit::from_path(3, &[])],
            tested: 18,
            cancelled: false,
            elapsed_ms: 5,
        };
        let event = SearchEvent::new("r", SearchPayload::Finished(report));
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["event"], "finished");
        assert_eq!(v["tested"], 18);
        assert_eq!(v["hits"][0]["seed"], 3);
    }
}
