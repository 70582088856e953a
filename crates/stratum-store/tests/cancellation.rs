mod common;

use common::*;
use stratum_graph::GraphOutput;
use stratum_store::{
    CancellationToken, FsTreeStore, StoreError, TreeImporter, UnitStore,
};

fn tree_with_units(n: usize) -> FsTreeStore {
    let tree = FsTreeStore::new(mem_fs(), "", "r1", "c1");
    for i in 0..n {
        let bundle = GraphOutput {
            defs: vec![def(&format!("p{i}"), "a.go", i as u32)],
            refs: vec![own_ref(&format!("p{i}"), "a.go", 100 + i as u32)],
            ..GraphOutput::default()
        };
        tree.import_unit(&unit("t", &format!("u{i}")), bundle).unwrap();
    }
    tree
}

#[test]
fn a_cancelled_token_stops_the_query() {
    let tree = tree_with_units(100);
    let token = CancellationToken::new();
    token.cancel();

    let err = tree.refs(&token, &[]).unwrap_err();
    assert!(matches!(err, StoreError::Cancelled), "{err:?}");
    let err = tree.defs(&token, &[]).unwrap_err();
    assert!(matches!(err, StoreError::Cancelled), "{err:?}");
}

#[test]
fn a_fresh_token_is_reusable_across_queries() {
    let tree = tree_with_units(8);
    let token = CancellationToken::new();

    assert_eq!(tree.refs(&token, &[]).unwrap().len(), 8);
    assert_eq!(tree.defs(&token, &[]).unwrap().len(), 8);

    token.cancel();
    assert!(matches!(
        tree.refs(&token, &[]),
        Err(StoreError::Cancelled)
    ));
}

#[test]
fn cancellation_mid_fan_out_returns_cancelled_not_partial_data() {
    // Cancel from a worker thread while a wide fan-out is in flight; the
    // query must either complete fully or report Cancelled, never return
    // a partial merge.
    let tree = tree_with_units(64);
    let token = CancellationToken::new();

    let cancel_token = token.clone();
    let canceller = std::thread::spawn(move || {
        cancel_token.cancel();
    });

    match tree.refs(&token, &[]) {
        Ok(refs) => assert_eq!(refs.len(), 64),
        Err(err) => assert!(matches!(err, StoreError::Cancelled), "{err:?}"),
    }
    canceller.join().unwrap();
}
