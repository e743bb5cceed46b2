//! File redirection: descriptors opened on matching paths have their reads
//! served from synthetic content instead of the file on disk.
//!
//! Opening is never replaced. The real `open` runs and its descriptor is
//! returned unchanged; a matching path only adds a registry entry, which the
//! raw and buffered read paths consult by descriptor number. Closing the
//! descriptor (or its stream) removes the entry.

mod mode;
mod registry;
mod rule;

pub use mode::{decode_mode, DecodedMode, StreamAccess};
pub use registry::{RedirectEntry, RedirectRegistry};
pub use rule::{first_match, PathMatch, RedirectRule, SyntheticContent};

use crate::{hook_debug, hook_warn};
use libc::{c_char, c_int, c_void, mode_t, ssize_t, FILE};
use shunt_config::{ReadPolicy, RedirectConfig, MAX_REDIRECT_CAPACITY};
use std::ffi::CStr;
use std::ptr;

/// Permission bits passed to `open` for streams created by `fopen`.
pub const STREAM_CREATE_MODE: mode_t = 0o666;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RedirectError {
    #[error("invalid stream mode")]
    InvalidMode,
    #[error("redirect registry full ({capacity} entries)")]
    RegistryFull { capacity: usize },
}

impl RedirectError {
    pub fn errno(&self) -> c_int {
        match self {
            RedirectError::InvalidMode => libc::EINVAL,
            RedirectError::RegistryFull { .. } => libc::EMFILE,
        }
    }
}

/// How successive reads of a redirected descriptor are served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadMode {
    /// Consume the content from the entry's cursor; 0 at the end.
    #[default]
    Stream,
    /// Every read returns the content plus a trailing NUL from the start,
    /// cut to the caller's length.
    Repeat,
}

impl From<ReadPolicy> for ReadMode {
    fn from(policy: ReadPolicy) -> Self {
        match policy {
            ReadPolicy::Stream => ReadMode::Stream,
            ReadPolicy::Repeat => ReadMode::Repeat,
        }
    }
}

/// The original I/O primitives the redirector forwards to.
///
/// # Safety
/// Implementations must behave like the C functions of the same names.
pub unsafe trait FileApi {
    unsafe fn open(&self, path: *const c_char, flags: c_int, mode: mode_t) -> c_int;
    unsafe fn fdopen(&self, fd: c_int, mode: *const c_char) -> *mut FILE;
    unsafe fn read(&self, fd: c_int, buf: *mut c_void, count: usize) -> ssize_t;
    unsafe fn fread(&self, ptr: *mut c_void, size: usize, nitems: usize, stream: *mut FILE) -> usize;
    unsafe fn fileno(&self, stream: *mut FILE) -> c_int;
    unsafe fn close(&self, fd: c_int) -> c_int;
    unsafe fn fclose(&self, stream: *mut FILE) -> c_int;
}

/// Process-scoped redirection state: the rules and the live descriptors.
pub struct Redirector<const N: usize = MAX_REDIRECT_CAPACITY> {
    rules: Vec<RedirectRule>,
    registry: RedirectRegistry<N>,
    reads: ReadMode,
}

impl<const N: usize> Redirector<N> {
    pub fn new(rules: Vec<RedirectRule>, capacity: usize, reads: ReadMode) -> Self {
        Self {
            rules,
            registry: RedirectRegistry::new(capacity),
            reads,
        }
    }

    pub fn from_config(config: &RedirectConfig) -> Self {
        let rules = config.rules.iter().map(RedirectRule::from_config).collect();
        Self::new(rules, config.capacity, config.reads.into())
    }

    pub fn rules(&self) -> &[RedirectRule] {
        &self.rules
    }

    pub fn registry(&self) -> &RedirectRegistry<N> {
        &self.registry
    }

    pub fn read_mode(&self) -> ReadMode {
        self.reads
    }

    /// Open through the original and register the descriptor if `path`
    /// matches a rule.
    ///
    /// # Safety
    /// As for `open`.
    pub unsafe fn open<A: FileApi>(&self, api: &A, path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
        let fd = api.open(path, flags, mode);
        if fd < 0 || path.is_null() || self.rules.is_empty() {
            return fd;
        }
        let path = CStr::from_ptr(path).to_bytes();
        if let Some(index) = first_match(&self.rules, path) {
            let size = self.rules[index].content().len();
            match self.registry.register(fd, index, size) {
                Ok(()) => hook_debug!("redirect fd={} rule={} size={}", fd, index, size),
                // Fail closed: the caller keeps reading the real file.
                Err(e) => hook_warn!("not redirecting fd={}: {}", fd, e),
            }
        }
        fd
    }

    /// Decode `mode`, open through [`Redirector::open`] and wrap the
    /// descriptor in a stream.
    ///
    /// # Safety
    /// As for `fopen`.
    pub unsafe fn fopen<A: FileApi>(&self, api: &A, path: *const c_char, mode: *const c_char) -> Result<*mut FILE, RedirectError> {
        if mode.is_null() {
            return Err(RedirectError::InvalidMode);
        }
        let decoded = decode_mode(CStr::from_ptr(mode).to_bytes())?;
        let fd = self.open(api, path, decoded.flags, STREAM_CREATE_MODE);
        if fd < 0 {
            return Ok(ptr::null_mut());
        }
        let stream = api.fdopen(fd, mode);
        if stream.is_null() {
            let saved = errno();
            self.close(api, fd);
            set_errno(saved);
        }
        Ok(stream)
    }

    /// # Safety
    /// As for `read`.
    pub unsafe fn read<A: FileApi>(&self, api: &A, fd: c_int, buf: *mut c_void, count: usize) -> ssize_t {
        match self.serve(fd, buf.cast(), count) {
            Some(n) => n as ssize_t,
            None => api.read(fd, buf, count),
        }
    }

    /// Returns the number of complete items copied. The registry is
    /// consulted once, so an entry evicted concurrently means a real read.
    ///
    /// # Safety
    /// As for `fread`.
    pub unsafe fn fread<A: FileApi>(&self, api: &A, ptr: *mut c_void, size: usize, nitems: usize, stream: *mut FILE) -> usize {
        if stream.is_null() {
            return api.fread(ptr, size, nitems, stream);
        }
        let fd = api.fileno(stream);
        let requested = size.saturating_mul(nitems);
        match self.serve(fd, ptr.cast(), requested) {
            Some(n) => n.checked_div(size).unwrap_or(0),
            None => api.fread(ptr, size, nitems, stream),
        }
    }

    /// # Safety
    /// As for `close`.
    pub unsafe fn close<A: FileApi>(&self, api: &A, fd: c_int) -> c_int {
        if self.registry.evict(fd).is_some() {
            hook_debug!("evict fd={}", fd);
        }
        api.close(fd)
    }

    /// # Safety
    /// As for `fclose`.
    pub unsafe fn fclose<A: FileApi>(&self, api: &A, stream: *mut FILE) -> c_int {
        if !stream.is_null() {
            let fd = api.fileno(stream);
            if fd >= 0 && self.registry.evict(fd).is_some() {
                hook_debug!("evict fd={} on fclose", fd);
            }
        }
        api.fclose(stream)
    }

    /// Copy synthetic content for `fd` into `buf`; `None` if `fd` is not
    /// redirected.
    unsafe fn serve(&self, fd: c_int, buf: *mut u8, count: usize) -> Option<usize> {
        let rules = &self.rules;
        let reads = self.reads;
        self.registry.with_entry(fd, |entry| {
            if count == 0 || buf.is_null() {
                return 0;
            }
            let content = rules[entry.rule].content();
            let out = std::slice::from_raw_parts_mut(buf, count);
            match reads {
                ReadMode::Stream => {
                    let n = content.copy_to(entry.cursor, out);
                    entry.cursor += n;
                    n
                }
                ReadMode::Repeat => {
                    let n = content.copy_to(0, out);
                    if n < out.len() {
                        out[n] = 0;
                        n + 1
                    } else {
                        n
                    }
                }
            }
        })
    }
}

#[cfg(target_os = "linux")]
unsafe fn errno_location() -> *mut c_int {
    libc::__errno_location()
}

#[cfg(target_vendor = "apple")]
unsafe fn errno_location() -> *mut c_int {
    libc::__error()
}

pub fn errno() -> c_int {
    unsafe { *errno_location() }
}

pub fn set_errno(value: c_int) {
    unsafe { *errno_location() = value }
}

#[cfg(test)]
pub(crate) mod test_files {
    use super::FileApi;
    use libc::{c_char, c_int, c_void, mode_t, ssize_t, FILE};

    /// The real libc I/O functions; test binaries are not interposed.
    pub struct LibcFiles;

    unsafe impl FileApi for LibcFiles {
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
}
