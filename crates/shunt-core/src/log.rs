//! Diagnostics that are safe to emit from inside a hook.
//!
//! Nothing here allocates: messages are formatted into a stack buffer by
//! [`StackWriter`], appended to the in-memory ring [`LOGGER`], and mirrored to
//! fd 2 with a raw `write` when debug output is on.

use libc::c_void;
pub use shunt_config::LogLevel;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

pub static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);
pub static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

pub fn set_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn set_debug(enabled: bool) {
    DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level as u8 <= LOG_LEVEL.load(Ordering::Relaxed)
}

/// Record a formatted line in the ring and, in debug mode, on stderr.
pub fn emit(msg: &str) {
    LOGGER.log(msg);
    if DEBUG_ENABLED.load(Ordering::Relaxed) {
        write_stderr(msg.as_bytes());
    }
}

pub fn pid() -> libc::pid_t {
    unsafe { libc::getpid() }
}

pub fn write_stderr(bytes: &[u8]) {
    unsafe {
        libc::write(2, bytes.as_ptr().cast::<c_void>(), bytes.len());
    }
}

/// Formats a hook diagnostic on the stack and records it.
#[macro_export]
macro_rules! hook_log_at_level {
    ($level:expr, $tag:literal, $($arg:tt)*) => {{
        if $crate::log::enabled($level) {
            // Either acquires the guard or the caller already holds it.
            let _guard = $crate::guard::HookGuard::enter();
            use std::fmt::Write as _;
            let mut buf = [0u8; 512];
            let mut w = $crate::log::StackWriter::new(&mut buf);
            let _ = write!(w, "[shunt][{}][{}] ", $crate::log::pid(), $tag);
            let _ = write!(w, $($arg)*);
            let _ = writeln!(w);
            $crate::log::emit(w.as_str());
        }
    }};
}

#[macro_export]
macro_rules! hook_trace { ($($arg:tt)*) => { $crate::hook_log_at_level!($crate::log::LogLevel::Trace, "TRACE", $($arg)*) }; }
#[macro_export]
macro_rules! hook_debug { ($($arg:tt)*) => { $crate::hook_log_at_level!($crate::log::LogLevel::Debug, "DEBUG", $($arg)*) }; }
#[macro_export]
macro_rules! hook_warn { ($($arg:tt)*) => { $crate::hook_log_at_level!($crate::log::LogLevel::Warn, "WARN", $($arg)*) }; }

/// `fmt::Write` over a fixed byte buffer. Output past the end is dropped.
pub struct StackWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> StackWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// Truncation may split a multi-byte character; the valid prefix is kept.
    pub fn as_str(&self) -> &str {
        match std::str::from_utf8(self.as_bytes()) {
            Ok(s) => s,
            Err(e) => {
                let valid = &self.buf[..e.valid_up_to()];
                std::str::from_utf8(valid).unwrap_or("")
            }
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.pos == self.buf.len()
    }
}

impl fmt::Write for StackWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let n = bytes.len().min(self.buf.len() - self.pos);
        self.buf[self.pos..self.pos + n].copy_from_slice(&bytes[..n]);
        self.pos += n;
        Ok(())
    }
}

pub const LOG_BUF_SIZE: usize = 64 * 1024;

/// Ring buffer of recent hook diagnostics.
pub struct Logger<const N: usize = LOG_BUF_SIZE> {
    buffer: [AtomicU8; N],
    head: AtomicUsize,
}

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicU8 = AtomicU8::new(0);

pub static LOGGER: Logger = Logger::new();

impl<const N: usize> Logger<N> {
    pub const fn new() -> Self {
        Self {
            buffer: [ZERO; N],
            head: AtomicUsize::new(0),
        }
    }

    pub fn log(&self, msg: &str) {
        let bytes = msg.as_bytes();
        if bytes.len() > N {
            return;
        }
        let start = self.head.fetch_add(bytes.len(), Ordering::AcqRel);
        for (i, &b) in bytes.iter().enumerate() {
            self.buffer[(start + i) % N].store(b, Ordering::Relaxed);
        }
    }

    /// Total bytes ever logged.
    pub fn written(&self) -> usize {
        self.head.load(Ordering::Acquire)
    }

    /// Copy the most recent bytes, oldest first, into `out`.
    pub fn copy_recent(&self, out: &mut [u8]) -> usize {
        let head = self.written();
        let len = head.min(N).min(out.len());
        let start = head - len;
        for (i, slot) in out[..len].iter_mut().enumerate() {
            *slot = self.buffer[(start + i) % N].load(Ordering::Relaxed);
        }
        len
    }

    /// Write the retained contents to stderr.
    pub fn dump(&self) {
        self.dump_to(write_stderr);
    }

    /// Hand the retained contents to `sink`, oldest first, in stack-sized
    /// chunks.
    pub fn dump_to(&self, mut sink: impl FnMut(&[u8])) {
        let head = self.written();
        let mut chunk = [0u8; 256];
        let mut pos = head.saturating_sub(N);
        while pos < head {
            let n = (head - pos).min(chunk.len());
            for (i, slot) in chunk[..n].iter_mut().enumerate() {
                *slot = self.buffer[(pos + i) % N].load(Ordering::Relaxed);
            }
            sink(&chunk[..n]);
            pos += n;
        }
    }
}

impl<const N: usize> Default for Logger<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn test_stack_writer_truncates() {
        let mut buf = [0u8; 8];
        let mut w = StackWriter::new(&mut buf);
        write!(w, "allocated {} bytes", 1024).unwrap();
        assert_eq!(w.as_str(), "allocate");
        assert!(w.is_truncated());
    }

    #[test]
    fn test_stack_writer_keeps_valid_prefix() {
        let mut buf = [0u8; 2];
        let mut w = StackWriter::new(&mut buf);
        w.write_str("aé").unwrap();
        // 'é' is two bytes; only its first byte fits after 'a'.
        assert_eq!(w.as_str(), "a");
    }

    #[test]
    fn test_ring_keeps_latest_bytes() {
        let logger: Logger<8> = Logger::new();
        logger.log("abcdef");
        logger.log("ghij");
        let mut out = [0u8; 16];
        let n = logger.copy_recent(&mut out);
        assert_eq!(&out[..n], b"cdefghij");
        assert_eq!(logger.written(), 10);
    }

    #[test]
    fn test_dump_replays_retained_bytes_in_order() {
        let logger: Logger<300> = Logger::new();
        logger.log(&"x".repeat(200));
        logger.log(&"y".repeat(200));

        let mut dumped = Vec::new();
        logger.dump_to(|chunk| dumped.extend_from_slice(chunk));
        assert_eq!(dumped.len(), 300);
        assert!(dumped[..100].iter().all(|&b| b == b'x'));
        assert!(dumped[100..].iter().all(|&b| b == b'y'));
    }

    #[test]
    fn test_oversized_message_is_dropped() {
        let logger: Logger<4> = Logger::new();
        logger.log("too long");
        assert_eq!(logger.written(), 0);
    }

    #[test]
    fn test_level_filter() {
        assert!(!enabled(LogLevel::Off));
        set_level(LogLevel::Info);
        assert!(enabled(LogLevel::Warn));
        assert!(enabled(LogLevel::Info));
        assert!(!enabled(LogLevel::Debug));
        set_level(LogLevel::Warn);
    }
}
