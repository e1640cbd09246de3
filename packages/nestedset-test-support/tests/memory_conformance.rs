use nestedset_core::{MemoryRowStore, TreeConfig};
use nestedset_test_support::run_all;

#[test]
fn memory_store_passes_conformance() {
    run_all(&mut |_: &TreeConfig| MemoryRowStore::new());
}
