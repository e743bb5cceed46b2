//! Lazily bound pointers to the original definition of a symbol.

use libc::c_void;
use std::ffi::CStr;
use std::marker::PhantomData;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("original symbol `{symbol}` not found")]
    NotFound { symbol: &'static str },
}

/// Process-wide cell holding the next definition of `name` below this
/// library in link order.
///
/// `F` must be the `unsafe extern "C" fn(..)` type of the symbol. The cell is
/// populated at most once per value: concurrent first calls may each run
/// `dlsym`, but they all publish the same address.
pub struct OriginalFn<F> {
    ptr: AtomicPtr<c_void>,
    name: &'static CStr,
    _fn: PhantomData<fn() -> F>,
}

impl<F: Copy> OriginalFn<F> {
    pub const fn new(name: &'static CStr) -> Self {
        assert!(mem::size_of::<F>() == mem::size_of::<*mut c_void>());
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
            name,
            _fn: PhantomData,
        }
    }

    pub fn name(&self) -> &'static CStr {
        self.name
    }

    /// Cached original, without resolving.
    #[inline]
    pub fn resolved(&self) -> Option<F> {
        let p = self.ptr.load(Ordering::Acquire);
        if p.is_null() {
            None
        } else {
            // SAFETY: only non-null dlsym results for `name` are ever stored.
            Some(unsafe { cast_fn(p) })
        }
    }

    pub fn try_resolve(&self) -> Result<F, BindError> {
        if let Some(f) = self.resolved() {
            return Ok(f);
        }
        // dlsym may allocate; the caller is expected to hold a HookGuard so
        // those allocations take the re-entered path.
        let p = unsafe { libc::dlsym(libc::RTLD_NEXT, self.name.as_ptr()) };
        if p.is_null() {
            return Err(BindError::NotFound {
                symbol: self.name.to_str().unwrap_or("<non-utf8>"),
            });
        }
        self.ptr.store(p, Ordering::Release);
        // SAFETY: `p` is the non-null address of `name`.
        Ok(unsafe { cast_fn(p) })
    }

    /// Cached original, resolving on first use. Aborts the process if the
    /// symbol has no further definition.
    #[inline]
    pub fn get(&self) -> F {
        match self.resolved() {
            Some(f) => f,
            None => match self.try_resolve() {
                Ok(f) => f,
                Err(_) => fatal_unresolved(self.name),
            },
        }
    }
}

/// Reinterpret a symbol address as the function pointer type `F`.
///
/// # Safety
/// `p` must be non-null and point at a function whose ABI matches `F`.
#[inline]
pub(crate) unsafe fn cast_fn<F: Copy>(p: *const c_void) -> F {
    debug_assert!(!p.is_null());
    mem::transmute_copy(&p)
}

/// Write a diagnostic with a raw `write(2)` and abort.
#[cold]
pub fn fatal_unresolved(name: &CStr) -> ! {
    const PREFIX: &[u8] = b"shunt: cannot resolve original symbol `";
    const SUFFIX: &[u8] = b"`, aborting\n";
    unsafe {
        let name = name.to_bytes();
        libc::write(2, PREFIX.as_ptr().cast(), PREFIX.len());
        libc::write(2, name.as_ptr().cast(), name.len());
        libc::write(2, SUFFIX.as_ptr().cast(), SUFFIX.len());
        libc::abort()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libc::c_char;

    type StrlenFn = unsafe extern "C" fn(*const c_char) -> usize;

    #[test]
    fn test_unresolved_until_first_use() {
        let binding: OriginalFn<StrlenFn> = OriginalFn::new(c"strlen");
        assert!(binding.resolved().is_none());

        let strlen = binding.get();
        assert_eq!(unsafe { strlen(c"shunt".as_ptr()) }, 5);
        assert!(binding.resolved().is_some());
    }

    #[test]
    fn test_resolution_is_cached() {
        let binding: OriginalFn<StrlenFn> = OriginalFn::new(c"strlen");
        let first = binding.try_resolve().unwrap();
        let second = binding.try_resolve().unwrap();
        assert_eq!(first as usize, second as usize);
    }

    #[test]
    fn test_missing_symbol_reports_name() {
        let binding: OriginalFn<StrlenFn> = OriginalFn::new(c"shunt_symbol_that_does_not_exist");
        let err = binding.try_resolve().unwrap_err();
        assert_eq!(
            err,
            BindError::NotFound {
                symbol: "shunt_symbol_that_does_not_exist"
            }
        );
        assert!(binding.resolved().is_none());
    }

    #[test]
    fn test_concurrent_first_resolution_agrees() {
        static BINDING: OriginalFn<StrlenFn> = OriginalFn::new(c"strlen");
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| BINDING.get() as usize))
            .collect();
        let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));
    }
}
