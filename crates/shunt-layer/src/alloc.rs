//! Allocator hooks: `malloc`, `calloc`, `realloc`, `free`, and `exit` for
//! the report.
//!
//! Re-entered calls (the binder's own lookup, logging, config loading)
//! bypass accounting. Before an original is bound they are served from the
//! bootstrap arena, and arena blocks are never handed to the real allocator.

use crate::state::{self, ACCOUNTING};
use libc::{c_int, c_void, size_t};
use shunt_core::bootstrap::BOOTSTRAP;
use shunt_core::log::StackWriter;
use shunt_core::{hook_trace, Heap, Hook};

intercept! {
    fn malloc(size: size_t) -> *mut c_void as MALLOC / IT_MALLOC => malloc_body;
    fn calloc(count: size_t, size: size_t) -> *mut c_void as CALLOC / IT_CALLOC => calloc_body;
    fn realloc(ptr: *mut c_void, size: size_t) -> *mut c_void as REALLOC / IT_REALLOC => realloc_body;
    fn free(ptr: *mut c_void) -> () as FREE / IT_FREE => free_body;
    fn exit(status: c_int) -> ! as EXIT / IT_EXIT => exit_body;
}

/// The process allocator, reached through the bound originals.
pub(crate) struct RealHeap;

unsafe impl Heap for RealHeap {
    unsafe fn allocate(&self, size: usize) -> *mut c_void {
        (MALLOC.original())(size)
    }

    unsafe fn allocate_zeroed(&self, count: usize, size: usize) -> *mut c_void {
        (CALLOC.original())(count, size)
    }

    unsafe fn resize(&self, ptr: *mut c_void, size: usize) -> *mut c_void {
        (REALLOC.original())(ptr, size)
    }

    unsafe fn free(&self, ptr: *mut c_void) {
        (FREE.original())(ptr)
    }

    unsafe fn usable_size(&self, ptr: *mut c_void) -> usize {
        shunt_core::usable_size(ptr)
    }
}

unsafe fn malloc_body(size: size_t) -> *mut c_void {
    MALLOC.intercept(
        |_| ACCOUNTING.allocate(&RealHeap, size),
        |hook| match hook.resolved() {
            Some(malloc) => malloc(size),
            None => BOOTSTRAP.allocate(size),
        },
    )
}

unsafe fn calloc_body(count: size_t, size: size_t) -> *mut c_void {
    CALLOC.intercept(
        |_| ACCOUNTING.allocate_zeroed(&RealHeap, count, size),
        |hook| match hook.resolved() {
            Some(calloc) => calloc(count, size),
            None => BOOTSTRAP.allocate_zeroed(count, size),
        },
    )
}

unsafe fn realloc_body(ptr: *mut c_void, size: size_t) -> *mut c_void {
    if BOOTSTRAP.contains(ptr) {
        return BOOTSTRAP.relocate(ptr, size, |n| malloc_body(n));
    }
    REALLOC.intercept(
        |_| ACCOUNTING.resize(&RealHeap, ptr, size),
        |hook| match hook.resolved() {
            Some(realloc) => realloc(ptr, size),
            None if ptr.is_null() => BOOTSTRAP.allocate(size),
            // A live heap block implies the allocator is already bound.
            None => std::ptr::null_mut(),
        },
    )
}

unsafe fn free_body(ptr: *mut c_void) {
    if ptr.is_null() || BOOTSTRAP.contains(ptr) {
        return;
    }
    FREE.intercept(
        |_| ACCOUNTING.free(&RealHeap, ptr),
        |hook| {
            if let Some(free) = hook.resolved() {
                free(ptr)
            }
        },
    )
}

unsafe fn exit_body(status: c_int) -> ! {
    let exit = EXIT.intercept(
        |exit| {
            if state::report_enabled() {
                write_report();
            }
            exit
        },
        Hook::original,
    );
    exit(status)
}

/// Print the exit report to stderr without touching the heap.
fn write_report() {
    let stats = ACCOUNTING.stats();
    let color = state::report_color();
    let mut buf = [0u8; 512];
    let mut out = StackWriter::new(&mut buf);
    if stats.write_report(&mut out, color).is_err() || out.is_truncated() {
        hook_trace!("exit report truncated");
    }
    shunt_core::log::write_stderr(out.as_bytes());
}
