//! I/O hooks feeding the redirector.
//!
//! `open` is variadic. On Linux the trailing mode travels in a register, so
//! fixed-arity exports read it directly and drop it unless the flags create
//! a file. On Darwin the variadic entry lives in C (`c/variadic_open.c`) and
//! calls [`shunt_open_impl`] with the mode already extracted. The remaining
//! hooks are declared with `intercept!`.
//!
//! The bodies do not hold the recursion guard: buffers libc allocates inside
//! `fopen` and releases inside `fclose` go through the allocator hooks and are
//! accounted like any other block.

use crate::state;
use libc::{c_char, c_int, c_uint, c_void, mode_t, size_t, ssize_t, FILE};
use shunt_core::redirect::set_errno;
use shunt_core::{hook_debug, FileApi, Hook};
use std::ptr;

type OpenFn = unsafe extern "C" fn(*const c_char, c_int, ...) -> c_int;
type FopenFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut FILE;

const _: OpenFn = libc::open;
#[cfg(all(target_os = "linux", target_env = "gnu"))]
const _: OpenFn = libc::open64;

pub static OPEN: Hook<OpenFn> = {
    let hook = Hook::new(c"open");
    #[cfg(target_vendor = "apple")]
    let hook = hook.with_entry(&IT_OPEN);
    hook
};

#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub static OPEN64: Hook<OpenFn> = Hook::new(c"open64");

#[cfg(target_vendor = "apple")]
extern "C" {
    fn shunt_open_variadic(path: *const c_char, flags: c_int, ...) -> c_int;
}

#[cfg(target_vendor = "apple")]
#[link_section = "__DATA,__interpose"]
#[used]
static IT_OPEN: shunt_core::InterposeEntry = shunt_core::InterposeEntry {
    new_func: shunt_open_variadic as *const (),
    old_func: libc::open as *const (),
};

intercept! {
    fn fopen(path: *const c_char, mode: *const c_char) -> *mut FILE as FOPEN / IT_FOPEN => fopen_body;
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn fopen64(path: *const c_char, mode: *const c_char) -> *mut FILE as FOPEN64 / IT_FOPEN64 => fopen64_body;
    fn read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t as READ / IT_READ => read_body;
    fn fread(ptr: *mut c_void, size: size_t, nitems: size_t, stream: *mut FILE) -> size_t as FREAD / IT_FREAD => fread_body;
    fn close(fd: c_int) -> c_int as CLOSE / IT_CLOSE => close_body;
    fn fclose(stream: *mut FILE) -> c_int as FCLOSE / IT_FCLOSE => fclose_body;
}

/// The process I/O functions, reached through the bound originals.
/// `open` is the flavour the caller came in through.
pub(crate) struct RealFiles {
    open: &'static Hook<OpenFn>,
}

impl RealFiles {
    const fn via(open: &'static Hook<OpenFn>) -> Self {
        Self { open }
    }
}

unsafe impl FileApi for RealFiles {
    unsafe fn open(&self, path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
        (self.open.original())(path, flags, mode as c_uint)
    }

    // Not intercepted, so the libc names are the originals.
    unsafe fn fdopen(&self, fd: c_int, mode: *const c_char) -> *mut FILE {
        libc::fdopen(fd, mode)
    }

    unsafe fn read(&self, fd: c_int, buf: *mut c_void, count: usize) -> ssize_t {
        (READ.original())(fd, buf, count)
    }

    unsafe fn fread(&self, ptr: *mut c_void, size: usize, nitems: usize, stream: *mut FILE) -> usize {
        (FREAD.original())(ptr, size, nitems, stream)
    }

    unsafe fn fileno(&self, stream: *mut FILE) -> c_int {
        libc::fileno(stream)
    }

    unsafe fn close(&self, fd: c_int) -> c_int {
        (CLOSE.original())(fd)
    }

    unsafe fn fclose(&self, stream: *mut FILE) -> c_int {
        (FCLOSE.original())(stream)
    }
}

#[cfg(target_vendor = "apple")]
#[no_mangle]
pub unsafe extern "C" fn shunt_open_impl(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    open_via(&OPEN, path, flags, mode)
}

#[cfg(not(target_vendor = "apple"))]
#[no_mangle]
pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    open_via(&OPEN, path, flags, creation_mode(flags, mode))
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[no_mangle]
pub unsafe extern "C" fn open64(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    open_via(&OPEN64, path, flags, creation_mode(flags, mode))
}

/// The mode argument is only meaningful when `flags` create a file.
#[cfg(not(target_vendor = "apple"))]
fn creation_mode(flags: c_int, mode: mode_t) -> mode_t {
    if flags & libc::O_CREAT != 0 || flags & libc::O_TMPFILE == libc::O_TMPFILE {
        mode
    } else {
        0
    }
}

unsafe fn open_via(hook: &'static Hook<OpenFn>, path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    hook.intercept_unguarded(
        |open| match state::redirector() {
            Some(redirector) => redirector.open(&RealFiles::via(hook), path, flags, mode),
            None => open(path, flags, mode as c_uint),
        },
        |hook| (hook.original())(path, flags, mode as c_uint),
    )
}

unsafe fn fopen_body(path: *const c_char, mode: *const c_char) -> *mut FILE {
    fopen_via(&FOPEN, &OPEN, path, mode)
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
unsafe fn fopen64_body(path: *const c_char, mode: *const c_char) -> *mut FILE {
    fopen_via(&FOPEN64, &OPEN64, path, mode)
}

unsafe fn fopen_via(
    hook: &Hook<FopenFn>,
    open: &'static Hook<OpenFn>,
    path: *const c_char,
    mode: *const c_char,
) -> *mut FILE {
    hook.intercept_unguarded(
        |fopen| match state::redirector() {
            Some(redirector) => match redirector.fopen(&RealFiles::via(open), path, mode) {
                Ok(stream) => stream,
                Err(e) => {
                    hook_debug!("fopen rejected: {}", e);
                    set_errno(e.errno());
                    ptr::null_mut()
                }
            },
            None => fopen(path, mode),
        },
        |hook| (hook.original())(path, mode),
    )
}

unsafe fn read_body(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
    READ.intercept_unguarded(
        |read| match state::redirector() {
            Some(redirector) => redirector.read(&RealFiles::via(&OPEN), fd, buf, count),
            None => read(fd, buf, count),
        },
        |hook| (hook.original())(fd, buf, count),
    )
}

unsafe fn fread_body(ptr: *mut c_void, size: size_t, nitems: size_t, stream: *mut FILE) -> size_t {
    FREAD.intercept_unguarded(
        |fread| match state::redirector() {
            Some(redirector) => redirector.fread(&RealFiles::via(&OPEN), ptr, size, nitems, stream),
            None => fread(ptr, size, nitems, stream),
        },
        |hook| (hook.original())(ptr, size, nitems, stream),
    )
}

unsafe fn close_body(fd: c_int) -> c_int {
    CLOSE.intercept_unguarded(
        |close| match state::redirector() {
            Some(redirector) => redirector.close(&RealFiles::via(&OPEN), fd),
            None => close(fd),
        },
        |hook| (hook.original())(fd),
    )
}

unsafe fn fclose_body(stream: *mut FILE) -> c_int {
    FCLOSE.intercept_unguarded(
        |fclose| match state::redirector() {
            Some(redirector) => redirector.fclose(&RealFiles::via(&OPEN), stream),
            None => fclose(stream),
        },
        |hook| (hook.original())(stream),
    )
}
