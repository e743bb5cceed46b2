//! # shunt-core
//!
//! The machinery behind the shunt interposition layer, independent of the
//! exported symbols themselves:
//!
//! - [`binder`]: lazily bound pointers to original definitions
//! - [`registrar`]: how the loader routes a name to its replacement
//! - [`hook`]: the per-symbol interceptor shell
//! - [`guard`], [`bootstrap`], [`sync`], [`log`]: re-entrancy safe plumbing
//! - [`accounting`], [`redirect`]: the two policies
//!
//! Everything here is usable against the real libc, which is how it is
//! tested; the `shunt-layer` crate wires it to exported symbols.

pub mod accounting;
pub mod binder;
pub mod bootstrap;
pub mod guard;
pub mod hook;
pub mod log;
pub mod redirect;
pub mod registrar;
pub mod sync;

pub use accounting::{AccountingContext, AllocationStats, Balance, Heap, ShrinkAccounting};
pub use binder::{BindError, OriginalFn};
pub use guard::HookGuard;
pub use hook::{Hook, Intercept};
pub use redirect::{FileApi, ReadMode, RedirectError, Redirector};
pub use registrar::{ActiveRegistrar, InterposeEntry, Registrar, Strategy};

use libc::c_void;

/// Size of the allocator block at `ptr`, which may exceed what was requested.
///
/// # Safety
/// `ptr` must be null or a live block from the system allocator.
#[cfg(target_vendor = "apple")]
pub unsafe fn usable_size(ptr: *mut c_void) -> usize {
    libc::malloc_size(ptr)
}

/// Size of the allocator block at `ptr`, which may exceed what was requested.
///
/// # Safety
/// `ptr` must be null or a live block from the system allocator.
#[cfg(not(target_vendor = "apple"))]
pub unsafe fn usable_size(ptr: *mut c_void) -> usize {
    libc::malloc_usable_size(ptr)
}
