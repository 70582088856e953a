mod common;

use std::sync::Arc;

use common::*;
use pretty_assertions::assert_eq;
use stratum_graph::{GraphOutput, Ref, RefDefKey, UnitKey};
use stratum_store::{
    abs_ref_filter_fn, by_def_path, by_ref_def, by_units, FsTreeStore, RefFilter, StoreError,
    TreeImporter, TreeStore, UnitStore,
};

/// A commit with two units: `u1` defines `P` and holds a same-unit ref to
/// `Y`; `u2` defines `P` and `Y` and refs `u1`'s `P` across units.
fn two_unit_tree() -> FsTreeStore {
    let tree = FsTreeStore::new(mem_fs(), "", "r1", "c1");

    let u1 = GraphOutput {
        defs: vec![def("P", "a.go", 0), def("Y", "a.go", 30)],
        refs: vec![own_ref("Y", "a.go", 50)],
        ..GraphOutput::default()
    };
    tree.import_unit(&unit("t", "u1"), u1).unwrap();

    let u2 = GraphOutput {
        defs: vec![def("P", "b.go", 0), def("Y", "b.go", 30)],
        refs: vec![cross_ref("P", "u1", "b.go", 60)],
        ..GraphOutput::default()
    };
    tree.import_unit(&unit("t", "u2"), u2).unwrap();

    tree
}

#[test]
fn units_are_listed_from_manifests() {
    let tree = two_unit_tree();
    let mut units = tree.units(&token()).unwrap();
    units.sort_by_key(|u| u.name.clone());
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].key(), UnitKey::new("t", "u1"));
    assert_eq!(units[1].key(), UnitKey::new("t", "u2"));
}

#[test]
fn def_path_fans_out_across_units() {
    let tree = two_unit_tree();
    let filters = vec![by_def_path("P") as Arc<dyn stratum_store::DefFilter>];
    let mut defs = tree.defs(&token(), &filters).unwrap();
    sort_defs(&mut defs);

    assert_eq!(defs.len(), 2);
    assert_eq!(defs[0].unit, "u1");
    assert_eq!(defs[1].unit, "u2");
    for d in &defs {
        assert_eq!(d.path, "P");
        assert_eq!(d.unit_type, "t");
        assert_eq!(d.repo, "r1");
        assert_eq!(d.commit_id, "c1");
    }
}

#[test]
fn by_units_collapses_the_fan_out() {
    let tree = two_unit_tree();
    let filters = vec![
        by_units([UnitKey::new("t", "u2")]) as Arc<dyn stratum_store::DefFilter>,
        by_def_path("P"),
    ];
    let defs = tree.defs(&token(), &filters).unwrap();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].unit, "u2");

    // Two disagreeing unit restrictions intersect to nothing.
    let filters = vec![
        by_units([UnitKey::new("t", "u1")]) as Arc<dyn stratum_store::DefFilter>,
        by_units([UnitKey::new("t", "u2")]),
    ];
    assert!(tree.defs(&token(), &filters).unwrap().is_empty());
}

#[test]
fn implied_unit_ref_resolves_at_the_tree_tier() {
    let tree = two_unit_tree();

    // u1's ref to Y names no unit on disk; asking for refs to
    // (u1, Y) must still find it.
    let filters: Vec<Arc<dyn RefFilter>> = vec![by_ref_def(RefDefKey {
        def_unit_type: "t".to_string(),
        def_unit: "u1".to_string(),
        def_path: "Y".to_string(),
        ..RefDefKey::default()
    })];
    let refs = tree.refs(&token(), &filters).unwrap();

    assert_eq!(refs.len(), 1);
    let r = &refs[0];
    assert_eq!(r.unit, "u1");
    assert_eq!(r.def_unit, "u1");
    assert_eq!(r.def_path, "Y");
    assert_eq!((r.start, r.end), (50, 54));
}

#[test]
fn cross_unit_refs_keep_their_explicit_referent() {
    let tree = two_unit_tree();

    let filters: Vec<Arc<dyn RefFilter>> = vec![by_ref_def(RefDefKey {
        def_unit_type: "t".to_string(),
        def_unit: "u1".to_string(),
        def_path: "P".to_string(),
        ..RefDefKey::default()
    })];
    let mut refs = tree.refs(&token(), &filters).unwrap();
    sort_refs(&mut refs);

    // u1's own def-less ref list has no ref to P; u2 refs it across
    // units.
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].unit, "u2");
    assert_eq!(refs[0].def_unit, "u1");
}

#[test]
fn abs_ref_filters_see_expanded_scope() {
    let tree = two_unit_tree();

    let filters: Vec<Arc<dyn RefFilter>> = vec![abs_ref_filter_fn(|r: &Ref| {
        assert!(!r.repo.is_empty(), "abs filter saw a scope-blanked ref");
        assert!(!r.def_unit.is_empty());
        r.unit == "u1"
    })];
    let refs = tree.refs(&token(), &filters).unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].unit, "u1");
}

#[test]
fn unknown_implied_unit_filters_are_refused() {
    struct Sneaky;
    impl RefFilter for Sneaky {
        fn select_ref(&self, _: &Ref) -> bool {
            true
        }
        fn implied_unit_capable(&self) -> bool {
            true
        }
        fn name(&self) -> &'static str {
            "Sneaky"
        }
    }

    let tree = two_unit_tree();
    let filters: Vec<Arc<dyn RefFilter>> = vec![Arc::new(Sneaky)];
    let err = tree.refs(&token(), &filters).unwrap_err();
    assert!(
        matches!(err, StoreError::UnrecognizedFilter { filter: "Sneaky" }),
        "{err:?}"
    );
}

#[test]
fn missing_commit_dir_is_not_exist() {
    let tree = FsTreeStore::new(mem_fs(), "absent", "r1", "c1");
    let err = tree.defs(&token(), &[]).unwrap_err();
    assert!(err.is_not_exist(), "{err:?}");
}

#[test]
fn reimporting_one_unit_replaces_only_that_unit() {
    let tree = two_unit_tree();

    let replacement = GraphOutput {
        defs: vec![def("Q", "c.go", 0)],
        ..GraphOutput::default()
    };
    tree.import_unit(&unit("t", "u1"), replacement).unwrap();

    let mut defs = tree.defs(&token(), &[]).unwrap();
    sort_defs(&mut defs);
    let paths: Vec<(&str, &str)> = defs
        .iter()
        .map(|d| (d.unit.as_str(), d.path.as_str()))
        .collect();
    assert_eq!(paths, [("u1", "Q"), ("u2", "P"), ("u2", "Y")]);
}

#[test]
fn all_scope_fields_are_populated_on_fan_out() {
    // Every record of every unit carries the full scope prefix.
    let tree = two_unit_tree();
    let refs = tree.refs(&token(), &[]).unwrap();
    assert_eq!(refs.len(), 2);
    for r in &refs {
        assert_eq!(r.repo, "r1");
        assert_eq!(r.commit_id, "c1");
        assert_eq!(r.unit_type, "t");
        assert!(!r.unit.is_empty());
        assert_eq!(r.def_repo, "r1");
        assert!(!r.def_unit.is_empty());
    }
}
