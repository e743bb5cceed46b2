//! How the loader is told to route a public name to our replacement, and
//! where the replacement finds the original afterwards.
//!
//! Policies and the shell only ever go through [`ActiveRegistrar`]; which
//! strategy it names is decided by the target platform at build time.

use crate::binder::cast_fn;
use crate::hook::Hook;

/// One `{replacement, original}` pair as dyld reads it from the
/// `__DATA,__interpose` section.
#[repr(C)]
pub struct InterposeEntry {
    pub new_func: *const (),
    pub old_func: *const (),
}

unsafe impl Sync for InterposeEntry {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Exported strong definition of the public name + `dlsym(RTLD_NEXT)`.
    AliasResolve,
    /// Declarative table consumed by the loader at bind time.
    LinkTable,
}

pub trait Registrar {
    const STRATEGY: Strategy;

    /// The original definition, resolving it if needed.
    fn original<F: Copy>(hook: &Hook<F>) -> F;

    /// The original definition if it is available without any lookup.
    fn cached<F: Copy>(hook: &Hook<F>) -> Option<F>;
}

pub struct AliasResolve;

impl Registrar for AliasResolve {
    const STRATEGY: Strategy = Strategy::AliasResolve;

    #[inline]
    fn original<F: Copy>(hook: &Hook<F>) -> F {
        hook.binding().get()
    }

    #[inline]
    fn cached<F: Copy>(hook: &Hook<F>) -> Option<F> {
        hook.binding().resolved()
    }
}

pub struct LinkTable;

impl LinkTable {
    fn table_original<F: Copy>(hook: &Hook<F>) -> Option<F> {
        let entry = hook.entry()?;
        if entry.old_func.is_null() {
            return None;
        }
        // SAFETY: the entry's `old_func` is the platform definition of the
        // hooked name, whose signature `F` is checked where the entry is built.
        Some(unsafe { cast_fn(entry.old_func.cast()) })
    }
}

impl Registrar for LinkTable {
    const STRATEGY: Strategy = Strategy::LinkTable;

    // The loader has already bound `old_func`; the binder is only a fallback
    // for hooks declared without a table entry.
    #[inline]
    fn original<F: Copy>(hook: &Hook<F>) -> F {
        match Self::table_original(hook) {
            Some(f) => f,
            None => hook.binding().get(),
        }
    }

    #[inline]
    fn cached<F: Copy>(hook: &Hook<F>) -> Option<F> {
        Self::table_original(hook).or_else(|| hook.binding().resolved())
    }
}

#[cfg(target_vendor = "apple")]
pub type ActiveRegistrar = LinkTable;

#[cfg(not(target_vendor = "apple"))]
pub type ActiveRegistrar = AliasResolve;

#[cfg(test)]
mod tests {
    use super::*;
    use libc::c_char;

    type StrlenFn = unsafe extern "C" fn(*const c_char) -> usize;

    unsafe extern "C" fn fake_strlen(_: *const c_char) -> usize {
        42
    }

    static STRLEN_ENTRY: InterposeEntry = InterposeEntry {
        new_func: fake_strlen as *const (),
        old_func: libc::strlen as *const (),
    };

    #[test]
    fn test_alias_resolve_uses_binder() {
        let hook: Hook<StrlenFn> = Hook::new(c"strlen");
        assert!(AliasResolve::cached(&hook).is_none());
        let strlen = AliasResolve::original(&hook);
        assert_eq!(unsafe { strlen(c"abc".as_ptr()) }, 3);
        assert!(AliasResolve::cached(&hook).is_some());
    }

    #[test]
    fn test_link_table_reads_old_func_without_lookup() {
        let hook: Hook<StrlenFn> = Hook::new(c"strlen").with_entry(&STRLEN_ENTRY);
        let strlen = LinkTable::cached(&hook).expect("table entry");
        assert_eq!(unsafe { strlen(c"abcd".as_ptr()) }, 4);
        // The binder was never consulted.
        assert!(hook.binding().resolved().is_none());
    }

    #[test]
    fn test_link_table_falls_back_to_binder() {
        let hook: Hook<StrlenFn> = Hook::new(c"strlen");
        assert!(LinkTable::cached(&hook).is_none());
        let strlen = LinkTable::original(&hook);
        assert_eq!(unsafe { strlen(c"ab".as_ptr()) }, 2);
    }

    #[test]
    fn test_active_strategy_matches_platform() {
        let expected = if cfg!(target_vendor = "apple") {
            Strategy::LinkTable
        } else {
            Strategy::AliasResolve
        };
        assert_eq!(ActiveRegistrar::STRATEGY, expected);
    }
}
