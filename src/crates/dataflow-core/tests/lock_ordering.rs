//! Property tests for the lock network
//!
//! Any number of dispatches locking overlapping sets of inputs, requested in
//! any order, must all complete and never hold the same input at once.

use dataflow_core::{Definition, Input, InputId, LockNetwork};
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const POOL: usize = 6;

fn pool() -> Vec<InputId> {
    let locked = Definition::new("resource", "str").with_lock(true);
    (0..POOL)
        .map(|i| Input::new(format!("r{}", i), &locked).uid())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn overlapping_lock_sets_never_deadlock(
        requests in prop::collection::vec(prop::collection::vec(0..POOL, 1..=POOL), 2..8)
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        let ids = pool();
        let network = Arc::new(LockNetwork::new());
        let held: Arc<Vec<AtomicBool>> = Arc::new((0..POOL).map(|_| AtomicBool::new(false)).collect());
        let violations = Arc::new(AtomicUsize::new(0));

        let finished = runtime.block_on(async {
            let mut tasks = tokio::task::JoinSet::new();
            for request in requests.clone() {
                let network = network.clone();
                let held = held.clone();
                let violations = violations.clone();
                let wanted: Vec<InputId> = request.iter().map(|i| ids[*i]).collect();
                tasks.spawn(async move {
                    let guard = network.acquire_ids(wanted).await;
                    let mut taken = request.clone();
                    taken.sort();
                    taken.dedup();
                    for i in &taken {
                        if held[*i].swap(true, Ordering::SeqCst) {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    for i in &taken {
                        held[*i].store(false, Ordering::SeqCst);
                    }
                    drop(guard);
                });
            }
            tokio::time::timeout(Duration::from_secs(10), async {
                while tasks.join_next().await.is_some() {}
            })
            .await
            .is_ok()
        });

        prop_assert!(finished, "lock acquisition deadlocked");
        prop_assert_eq!(violations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn guards_lock_in_ascending_order(request in prop::collection::vec(0..POOL, 0..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let ids = pool();
        let network = LockNetwork::new();
        let wanted: Vec<InputId> = request.iter().map(|i| ids[*i]).collect();
        let guard = runtime.block_on(network.acquire_ids(wanted.clone()));

        let mut expected = wanted;
        expected.sort();
        expected.dedup();
        prop_assert_eq!(guard.ids(), expected.as_slice());
        prop_assert_eq!(guard.is_empty(), request.is_empty());
    }
}
