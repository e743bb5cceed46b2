//! libc-backed originals shared by the integration tests. The test binary
//! is not interposed, so calling libc directly reaches the real functions.

#![allow(dead_code)]

use libc::{c_char, c_int, c_void, mode_t, ssize_t, FILE};
use shunt_core::{FileApi, Heap};

pub struct SystemHeap;

unsafe impl Heap for SystemHeap {
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
        shunt_core::usable_size(ptr)
    }
}

pub struct SystemFiles;

unsafe impl FileApi for SystemFiles {
    unsafe fn open(&self, path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
        libc::open(path, flags, mode as libc::c_uint)
    }
    unsafe fn fdopen(&self, fd: c_int, mode: *const c_char) -> *mut FILE {
        libc::fdopen(fd, mode)
    }
    unsafe fn read(&self, fd: c_int, buf: *mut c_void, count: usize) -> ssize_t {
        libc::read(fd, buf, count)
    }
    unsafe fn fread(&self, ptr: *mut c_void, size: usize, nitems: usize, stream: *mut FILE) -> usize {
        libc::fread(ptr, size, nitems, stream)
    }
    unsafe fn fileno(&self, stream: *mut FILE) -> c_int {
        libc::fileno(stream)
    }
    unsafe fn close(&self, fd: c_int) -> c_int {
        libc::close(fd)
    }
    unsafe fn fclose(&self, stream: *mut FILE) -> c_int {
        libc::fclose(stream)
    }
}
