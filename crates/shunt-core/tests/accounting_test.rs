//! Accounting scenarios against the real allocator.

mod common;

use common::SystemHeap;
use shunt_core::{AccountingContext, Balance};
use std::sync::Arc;

#[test]
fn test_allocate_then_free_leaves_balance_unchanged() {
    let ctx = AccountingContext::new();
    let heap = SystemHeap;
    let before = ctx.stats().balance();
    unsafe {
        let p = ctx.allocate(&heap, 257);
        ctx.free(&heap, p);
    }
    assert_eq!(ctx.stats().balance(), before);
}

#[test]
fn test_balance_is_sum_of_live_blocks() {
    let ctx = AccountingContext::new();
    let heap = SystemHeap;
    let mut live = Vec::new();
    let mut expected = 0;
    unsafe {
        for (i, size) in [1usize, 24, 100, 4096, 7, 65536].into_iter().enumerate() {
            let p = ctx.allocate(&heap, size);
            if i % 2 == 0 {
                ctx.free(&heap, p);
            } else {
                expected += shunt_core::usable_size(p);
                live.push(p);
            }
        }
        assert_eq!(ctx.stats().balance(), Balance::Leaked(expected));
        for p in live {
            ctx.free(&heap, p);
        }
    }
    assert_eq!(ctx.stats().balance(), Balance::Leaked(0));
}

#[test]
fn test_concurrent_allocate_free_balances() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 1000;
    const SIZE: usize = 48;

    let ctx = Arc::new(AccountingContext::new());
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            std::thread::spawn(move || {
                for _ in 0..ROUNDS {
                    unsafe {
                        let p = ctx.allocate(&SystemHeap, SIZE);
                        assert!(!p.is_null());
                        ctx.free(&SystemHeap, p);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = ctx.stats();
    assert!(stats.allocated >= THREADS * ROUNDS * SIZE);
    assert_eq!(stats.allocated, stats.freed);
}

#[test]
fn test_realloc_chain_balances_after_free() {
    let ctx = AccountingContext::new();
    let heap = SystemHeap;
    unsafe {
        let mut p = ctx.allocate(&heap, 16);
        for size in [64, 1 << 20, 32, 8] {
            p = ctx.resize(&heap, p, size);
            assert!(!p.is_null());
        }
        ctx.free(&heap, p);
    }
    assert_eq!(ctx.stats().balance(), Balance::Leaked(0));
}
