use std::sync::Arc;

use tensorplan::{Allocator, CpuRuntime, Runtime};

fn new_allocator() -> Allocator {
    let runtime: Arc<dyn Runtime> = CpuRuntime::new();
    Allocator::new(runtime)
}

#[test]
fn aligned_size_rounds_up_to_the_granularity() {
    let allocator = new_allocator();
    let alignment = allocator.alignment();
    for size in 0..100usize {
        let aligned = allocator.aligned_size(size);
        assert!(aligned >= size);
        assert_eq!(aligned % alignment, 0);
        assert!(aligned - size < alignment);
    }
}

#[test]
fn first_fit_reuses_a_freed_block() {
    let mut allocator = new_allocator();
    assert_eq!(allocator.alloc(10), 0);
    assert_eq!(allocator.alloc(20), 16);
    assert_eq!(allocator.used(), 40);
    assert_eq!(allocator.peak(), 40);

    allocator.free(0, 10);
    assert_eq!(allocator.used(), 40);

    assert_eq!(allocator.alloc(16), 0);
    assert_eq!(allocator.used(), 40);
    assert_eq!(allocator.peak(), 40);
}

#[test]
fn splitting_a_large_free_block_leaves_the_remainder_reusable() {
    let mut allocator = new_allocator();
    let a = allocator.alloc(16);
    let b = allocator.alloc(16);
    let c = allocator.alloc(16);
    assert_eq!((a, b, c), (0, 16, 32));

    allocator.free(a, 16);
    allocator.free(b, 16);
    // Merged hole [0, 32); a 24-byte request splits it.
    assert_eq!(allocator.alloc(24), 0);
    assert_eq!(allocator.alloc(8), 24);
    assert_eq!(allocator.used(), 48);
}

#[test]
fn allocated_ranges_stay_pairwise_disjoint() {
    let mut allocator = new_allocator();
    let mut live: Vec<(usize, usize)> = Vec::new();
    let sizes = [40usize, 8, 24, 64, 16, 8, 120, 32];
    for (round, &size) in sizes.iter().enumerate() {
        let offset = allocator.alloc(size);
        live.push((offset, allocator.aligned_size(size)));
        if round % 3 == 2 {
            let (freed_offset, freed_size) = live.remove(0);
            allocator.free(freed_offset, freed_size);
        }
        for (i, &(oi, si)) in live.iter().enumerate() {
            for &(oj, sj) in live.iter().skip(i + 1) {
                assert!(
                    oi + si <= oj || oj + sj <= oi,
                    "overlap between [{oi}, {}) and [{oj}, {})",
                    oi + si,
                    oj + sj
                );
            }
        }
    }
}

#[test]
fn peak_keeps_the_high_water_mark_across_tail_reclamation() {
    let mut allocator = new_allocator();
    let a = allocator.alloc(32);
    let b = allocator.alloc(64);
    assert_eq!(allocator.peak(), 96);

    // Freeing the tail block shrinks `used` but never `peak`.
    allocator.free(b, 64);
    assert_eq!(allocator.used(), 32);
    assert_eq!(allocator.peak(), 96);

    allocator.free(a, 32);
    assert_eq!(allocator.used(), 0);
    assert_eq!(allocator.peak(), 96);

    let buffer = allocator.commit();
    assert_eq!(buffer.len(), 96);
}

#[test]
fn peak_is_monotonically_non_decreasing() {
    let mut allocator = new_allocator();
    let mut last_peak = 0;
    let a = allocator.alloc(16);
    for _ in 0..4 {
        let b = allocator.alloc(48);
        assert!(allocator.peak() >= last_peak);
        last_peak = allocator.peak();
        allocator.free(b, 48);
        assert!(allocator.peak() >= last_peak);
    }
    allocator.free(a, 16);
    assert_eq!(allocator.peak(), last_peak);
}

#[test]
fn commit_is_idempotent() {
    let mut allocator = new_allocator();
    allocator.alloc(24);
    let first = allocator.commit();
    let second = allocator.commit();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
#[should_panic(expected = "free of unknown offset")]
fn freeing_an_unknown_offset_is_a_contract_violation() {
    let mut allocator = new_allocator();
    allocator.alloc(16);
    allocator.free(8, 8);
}

#[test]
#[should_panic(expected = "double free")]
fn double_free_is_a_contract_violation() {
    let mut allocator = new_allocator();
    allocator.alloc(16);
    allocator.alloc(16);
    allocator.free(0, 16);
    allocator.free(0, 16);
}

#[test]
#[should_panic(expected = "alloc after the arena pointer was committed")]
fn alloc_after_commit_is_a_contract_violation() {
    let mut allocator = new_allocator();
    allocator.alloc(16);
    allocator.commit();
    allocator.alloc(16);
}

#[test]
#[should_panic(expected = "free after the arena pointer was committed")]
fn free_after_commit_is_a_contract_violation() {
    let mut allocator = new_allocator();
    allocator.alloc(16);
    allocator.commit();
    allocator.free(0, 16);
}
