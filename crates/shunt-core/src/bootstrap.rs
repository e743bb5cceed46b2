//! Static bump arena serving allocations made before the real allocator is
//! bound.
//!
//! `dlsym` may itself call `malloc`/`calloc` while the allocator hooks are
//! resolving their originals. Those nested calls land here. Blocks are never
//! reused, so freeing one is a no-op and the arena only ever grows.

use libc::c_void;
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const ARENA_SIZE: usize = 64 * 1024;
const ALIGN: usize = 16;
/// Each block is preceded by a header recording its requested size.
const HEADER: usize = ALIGN;

#[repr(C, align(16))]
struct Buffer<const N: usize>([u8; N]);

pub struct BootstrapArena<const N: usize = ARENA_SIZE> {
    buf: UnsafeCell<Buffer<N>>,
    used: AtomicUsize,
}

// Disjoint blocks are handed out through an atomic bump pointer.
unsafe impl<const N: usize> Sync for BootstrapArena<N> {}

pub static BOOTSTRAP: BootstrapArena = BootstrapArena::new();

impl<const N: usize> BootstrapArena<N> {
    pub const fn new() -> Self {
        Self {
            buf: UnsafeCell::new(Buffer([0; N])),
            used: AtomicUsize::new(0),
        }
    }

    fn base(&self) -> *mut u8 {
        self.buf.get().cast()
    }

    /// Bytes consumed so far, headers included.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    pub fn contains(&self, p: *const c_void) -> bool {
        let base = self.base() as usize;
        let p = p as usize;
        p >= base && p < base + N
    }

    /// Returns null once the arena is exhausted.
    pub fn allocate(&self, size: usize) -> *mut c_void {
        let Some(total) = size
            .checked_add(HEADER + ALIGN - 1)
            .map(|n| n & !(ALIGN - 1))
        else {
            return ptr::null_mut();
        };
        let mut offset = self.used.load(Ordering::Relaxed);
        loop {
            if total > N - offset {
                return ptr::null_mut();
            }
            match self.used.compare_exchange_weak(
                offset,
                offset + total,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => offset = current,
            }
        }
        // SAFETY: [offset, offset + total) is now owned by this call alone.
        unsafe {
            let block = self.base().add(offset);
            block.cast::<usize>().write(size);
            block.add(HEADER).cast()
        }
    }

    /// Arena memory starts zeroed and is never reused.
    pub fn allocate_zeroed(&self, count: usize, size: usize) -> *mut c_void {
        match count.checked_mul(size) {
            Some(total) => self.allocate(total),
            None => ptr::null_mut(),
        }
    }

    /// Requested size of an arena block.
    ///
    /// # Safety
    /// `p` must have been returned by `allocate` on this arena.
    pub unsafe fn block_size(&self, p: *const c_void) -> usize {
        p.cast::<u8>().sub(HEADER).cast::<usize>().read()
    }

    /// Move an arena block into memory obtained from `allocate`.
    ///
    /// # Safety
    /// `p` must have been returned by `allocate` on this arena.
    pub unsafe fn relocate(
        &self,
        p: *const c_void,
        size: usize,
        allocate: impl FnOnce(usize) -> *mut c_void,
    ) -> *mut c_void {
        let new = allocate(size);
        if !new.is_null() {
            let len = self.block_size(p).min(size);
            ptr::copy_nonoverlapping(p.cast::<u8>(), new.cast::<u8>(), len);
        }
        new
    }
}

impl<const N: usize> Default for BootstrapArena<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_are_aligned_and_disjoint() {
        let arena: BootstrapArena<1024> = BootstrapArena::new();
        let a = arena.allocate(3);
        let b = arena.allocate(40);
        assert_eq!(a as usize % ALIGN, 0);
        assert_eq!(b as usize % ALIGN, 0);
        assert!(b as usize >= a as usize + 3);
        assert!(arena.contains(a) && arena.contains(b));
        assert_eq!(unsafe { arena.block_size(b) }, 40);
    }

    #[test]
    fn test_exhaustion_returns_null() {
        let arena: BootstrapArena<64> = BootstrapArena::new();
        assert!(!arena.allocate(16).is_null());
        assert!(arena.allocate(64).is_null());
        assert!(arena.allocate(usize::MAX).is_null());
        assert!(arena.allocate_zeroed(usize::MAX, 2).is_null());
    }

    #[test]
    fn test_zeroed_allocation() {
        let arena: BootstrapArena<256> = BootstrapArena::new();
        let p = arena.allocate_zeroed(4, 8).cast::<u8>();
        let bytes = unsafe { std::slice::from_raw_parts(p, 32) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_relocate_copies_contents() {
        let arena: BootstrapArena<256> = BootstrapArena::new();
        let p = arena.allocate(5);
        unsafe { ptr::copy_nonoverlapping(b"hello".as_ptr(), p.cast::<u8>(), 5) };

        let mut dest = [0u8; 16];
        let moved = unsafe { arena.relocate(p, 16, |_| dest.as_mut_ptr().cast()) };
        assert_eq!(moved.cast::<u8>(), dest.as_mut_ptr());
        assert_eq!(&dest[..5], b"hello");
        assert!(!arena.contains(moved));
    }

    #[test]
    fn test_foreign_pointer_not_contained() {
        let arena: BootstrapArena<64> = BootstrapArena::new();
        let local = 0u64;
        assert!(!arena.contains((&local as *const u64).cast()));
    }
}
