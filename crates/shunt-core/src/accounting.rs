//! Allocation accounting: running totals of bytes handed out and returned by
//! the allocator, and the report printed when the process exits.

use libc::c_void;
use shunt_config::{AccountingConfig, ColorChoice, ShrinkPolicy};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

pub const START_COLOR: &str = "\x1b[01;33m";
pub const END_COLOR: &str = "\x1b[0m";

/// The allocator the accounting wraps.
///
/// # Safety
/// Implementations must behave like the C allocator functions of the same
/// name; `usable_size` is only called with live blocks from this heap.
pub unsafe trait Heap {
    unsafe fn allocate(&self, size: usize) -> *mut c_void;
    unsafe fn allocate_zeroed(&self, count: usize, size: usize) -> *mut c_void;
    unsafe fn resize(&self, ptr: *mut c_void, size: usize) -> *mut c_void;
    unsafe fn free(&self, ptr: *mut c_void);
    unsafe fn usable_size(&self, ptr: *mut c_void) -> usize;
}

/// How an in-place shrink is booked against `freed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ShrinkAccounting {
    /// Add the released bytes.
    #[default]
    Accumulate = 0,
    /// Replace the running total with the released bytes.
    Overwrite = 1,
}

impl From<ShrinkPolicy> for ShrinkAccounting {
    fn from(policy: ShrinkPolicy) -> Self {
        match policy {
            ShrinkPolicy::Accumulate => ShrinkAccounting::Accumulate,
            ShrinkPolicy::Overwrite => ShrinkAccounting::Overwrite,
        }
    }
}

/// Process-scoped accounting state. Lock-free; every update is a single
/// atomic operation, so it can be shared by all threads and touched from
/// inside the allocator hooks.
pub struct AccountingContext {
    allocated: AtomicUsize,
    freed: AtomicUsize,
    enabled: AtomicBool,
    shrink: AtomicU8,
}

impl AccountingContext {
    pub const fn new() -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            freed: AtomicUsize::new(0),
            enabled: AtomicBool::new(true),
            shrink: AtomicU8::new(ShrinkAccounting::Accumulate as u8),
        }
    }

    pub fn with_shrink(self, shrink: ShrinkAccounting) -> Self {
        self.set_shrink(shrink);
        self
    }

    pub fn configure(&self, config: &AccountingConfig) {
        self.enabled.store(config.enabled, Ordering::Relaxed);
        self.set_shrink(config.shrink.into());
    }

    pub fn set_shrink(&self, shrink: ShrinkAccounting) {
        self.shrink.store(shrink as u8, Ordering::Relaxed);
    }

    pub fn shrink(&self) -> ShrinkAccounting {
        match self.shrink.load(Ordering::Relaxed) {
            1 => ShrinkAccounting::Overwrite,
            _ => ShrinkAccounting::Accumulate,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> AllocationStats {
        AllocationStats {
            allocated: self.allocated.load(Ordering::Acquire),
            freed: self.freed.load(Ordering::Acquire),
        }
    }

    fn add_allocated(&self, n: usize) {
        self.allocated.fetch_add(n, Ordering::AcqRel);
    }

    fn add_freed(&self, n: usize) {
        self.freed.fetch_add(n, Ordering::AcqRel);
    }

    /// # Safety
    /// As for `malloc`.
    pub unsafe fn allocate<H: Heap>(&self, heap: &H, size: usize) -> *mut c_void {
        let p = heap.allocate(size);
        if !p.is_null() && self.is_enabled() {
            self.add_allocated(heap.usable_size(p));
        }
        p
    }

    /// # Safety
    /// As for `calloc`.
    pub unsafe fn allocate_zeroed<H: Heap>(&self, heap: &H, count: usize, size: usize) -> *mut c_void {
        let p = heap.allocate_zeroed(count, size);
        if !p.is_null() && self.is_enabled() {
            self.add_allocated(heap.usable_size(p));
        }
        p
    }

    /// # Safety
    /// As for `free`.
    pub unsafe fn free<H: Heap>(&self, heap: &H, ptr: *mut c_void) {
        if !ptr.is_null() && self.is_enabled() {
            self.add_freed(heap.usable_size(ptr));
        }
        heap.free(ptr);
    }

    /// # Safety
    /// As for `realloc`.
    pub unsafe fn resize<H: Heap>(&self, heap: &H, ptr: *mut c_void, size: usize) -> *mut c_void {
        if !self.is_enabled() {
            return heap.resize(ptr, size);
        }
        let old = if ptr.is_null() { 0 } else { heap.usable_size(ptr) };
        let result = heap.resize(ptr, size);

        if result.is_null() {
            // realloc(p, 0) may release `p` and return null; any other null
            // leaves `p` untouched.
            if size == 0 && !ptr.is_null() {
                self.add_freed(old);
            }
            return result;
        }

        let new = heap.usable_size(result);
        if ptr.is_null() {
            self.add_allocated(new);
        } else if result == ptr {
            self.book_in_place(old, new);
        } else {
            self.add_freed(old);
            self.add_allocated(new);
        }
        result
    }

    fn book_in_place(&self, old: usize, new: usize) {
        if new > old {
            self.add_allocated(new - old);
            return;
        }
        match self.shrink() {
            ShrinkAccounting::Accumulate => self.add_freed(old - new),
            ShrinkAccounting::Overwrite => self.freed.store(old - new, Ordering::Release),
        }
    }
}

impl Default for AccountingContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationStats {
    pub allocated: usize,
    pub freed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Balance {
    Leaked(usize),
    FreedExtra(usize),
}

impl AllocationStats {
    pub fn balance(&self) -> Balance {
        if self.allocated >= self.freed {
            Balance::Leaked(self.allocated - self.freed)
        } else {
            Balance::FreedExtra(self.freed - self.allocated)
        }
    }

    /// Render the exit report. Only `fmt` machinery is used, so writing into
    /// a stack buffer never allocates.
    pub fn write_report<W: fmt::Write>(&self, out: &mut W, color: bool) -> fmt::Result {
        if color {
            out.write_str(START_COLOR)?;
        }
        out.write_str("\n\nProgram Allocation Stats\n")?;
        writeln!(out, "  allocated {} bytes", self.allocated)?;
        writeln!(out, "      freed {} bytes", self.freed)?;
        match self.balance() {
            Balance::Leaked(n) => writeln!(out, "     leaked {n} bytes")?,
            Balance::FreedExtra(n) => writeln!(out, "      freed {n} extra bytes")?,
        }
        if color {
            out.write_str(END_COLOR)?;
        }
        Ok(())
    }
}

/// Whether the report should be colored, given the choice and whether
/// stderr is a terminal.
pub fn use_color(choice: ColorChoice, stderr_is_tty: bool) -> bool {
    match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => stderr_is_tty,
    }
}

#[cfg(test)]
pub(crate) mod test_heap {
    use super::Heap;
    use libc::c_void;

    /// The real libc allocator; test binaries are not interposed.
    pub struct LibcHeap;

    unsafe impl Heap for LibcHeap {
        unsafe fn allocate(&self, size: usize) -> *mut c_void {
            libc::malloc(size)
        }
        unsafe fn allocate_zeroed(&self, count: usize, size: usize) -> *mut c_void {
            libc::calloc(count, size)
        }
        unsafe fn resize(&self, ptr: *mut c_void, size: usize) -> *mut c_void {
            libc::realloc(ptr, size)
        }
        unsafe fn free(&self, ptr: *mut c_void) {
            libc::free(ptr)
        }
        unsafe fn usable_size(&self, ptr: *mut c_void) -> usize {
            crate::usable_size(ptr)
        }
    }
}
