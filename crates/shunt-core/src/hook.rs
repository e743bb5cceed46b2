//! The interceptor shell: per-symbol plumbing between an exported replacement
//! and the policy body it runs.

use crate::binder::{BindError, OriginalFn};
use crate::guard::HookGuard;
use crate::registrar::{ActiveRegistrar, InterposeEntry, Registrar};
use std::ffi::CStr;

/// Binding and registration state for one intercepted symbol.
///
/// `F` is the symbol's `unsafe extern "C" fn(..)` type. A `Hook` is meant to
/// live in a `static`, one per symbol per process.
pub struct Hook<F> {
    binding: OriginalFn<F>,
    entry: Option<&'static InterposeEntry>,
}

impl<F: Copy> Hook<F> {
    pub const fn new(name: &'static CStr) -> Self {
        Self {
            binding: OriginalFn::new(name),
            entry: None,
        }
    }

    /// Attach the interpose table entry that routes this symbol.
    pub const fn with_entry(self, entry: &'static InterposeEntry) -> Self {
        Self {
            binding: self.binding,
            entry: Some(entry),
        }
    }

    pub fn name(&self) -> &'static CStr {
        self.binding.name()
    }

    pub fn binding(&self) -> &OriginalFn<F> {
        &self.binding
    }

    pub fn entry(&self) -> Option<&'static InterposeEntry> {
        self.entry
    }

    #[inline]
    pub fn original(&self) -> F {
        ActiveRegistrar::original(self)
    }

    /// The original if it is available without a lookup.
    #[inline]
    pub fn resolved(&self) -> Option<F> {
        ActiveRegistrar::cached(self)
    }

    /// Run `body` with the original definition, or `reentered` when the
    /// current thread is already inside a hook body.
    #[inline]
    pub fn intercept<R>(&self, body: impl FnOnce(F) -> R, reentered: impl FnOnce(&Self) -> R) -> R {
        match HookGuard::enter() {
            Some(_guard) => body(self.original()),
            None => reentered(self),
        }
    }

    /// Like [`intercept`](Self::intercept), but `body` runs without holding
    /// the guard. Calls the original makes into other hooks (the allocator,
    /// for stdio buffers) then run their policy. A thread already inside a
    /// hook body still takes `reentered`.
    #[inline]
    pub fn intercept_unguarded<R>(&self, body: impl FnOnce(F) -> R, reentered: impl FnOnce(&Self) -> R) -> R {
        if HookGuard::is_active() {
            reentered(self)
        } else {
            body(self.original())
        }
    }
}

/// Type-erased view of a [`Hook`], so hooks of different signatures can sit
/// in one capability table.
pub trait Intercept: Sync {
    fn symbol(&self) -> &'static CStr;

    /// Resolve the original now rather than on first call.
    fn prepare(&self) -> Result<(), BindError>;

    fn is_bound(&self) -> bool;
}

impl<F: Copy> Intercept for Hook<F> {
    fn symbol(&self) -> &'static CStr {
        self.name()
    }

    fn prepare(&self) -> Result<(), BindError> {
        if self.resolved().is_some() {
            return Ok(());
        }
        self.binding.try_resolve().map(|_| ())
    }

    fn is_bound(&self) -> bool {
        self.resolved().is_some()
    }
}

/// Resolve every hook in `table`, stopping at the first missing symbol.
pub fn prepare_all(table: &[&dyn Intercept]) -> Result<usize, BindError> {
    for hook in table {
        hook.prepare()?;
    }
    Ok(table.len())
}
