use super::RedirectError;
use crate::sync::RecursiveMutex;
use libc::c_int;

/// A descriptor whose reads are served from a rule's synthetic content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectEntry {
    pub fd: c_int,
    /// Index of the matching rule.
    pub rule: usize,
    /// Length of the synthetic content.
    pub size: usize,
    /// Next byte to serve.
    pub cursor: usize,
}

impl RedirectEntry {
    const VACANT: RedirectEntry = RedirectEntry {
        fd: -1,
        rule: 0,
        size: 0,
        cursor: 0,
    };

    pub fn remaining(&self) -> usize {
        self.size.saturating_sub(self.cursor)
    }
}

struct Entries<const N: usize> {
    slots: [RedirectEntry; N],
    len: usize,
}

impl<const N: usize> Entries<N> {
    fn position(&self, fd: c_int) -> Option<usize> {
        self.slots[..self.len].iter().position(|e| e.fd == fd)
    }
}

/// Fixed-capacity table of redirected descriptors, in registration order.
///
/// Storage for `N` entries is inline and `limit` (at most `N`) caps how many
/// may be live at once. No operation allocates, so the table can be used
/// from inside the I/O hooks.
pub struct RedirectRegistry<const N: usize> {
    entries: RecursiveMutex<Entries<N>>,
    limit: usize,
}

impl<const N: usize> RedirectRegistry<N> {
    pub const fn new(limit: usize) -> Self {
        Self {
            entries: RecursiveMutex::new(Entries {
                slots: [RedirectEntry::VACANT; N],
                len: 0,
            }),
            limit: if limit < N { limit } else { N },
        }
    }

    pub fn capacity(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start serving `fd` from `rule`. A descriptor number is live at most
    /// once, so an existing entry for `fd` is replaced and its cursor reset.
    pub fn register(&self, fd: c_int, rule: usize, size: usize) -> Result<(), RedirectError> {
        let entry = RedirectEntry {
            fd,
            rule,
            size,
            cursor: 0,
        };
        let mut entries = self.entries.lock();
        if let Some(i) = entries.position(fd) {
            entries.slots[i] = entry;
            return Ok(());
        }
        if entries.len >= self.limit {
            return Err(RedirectError::RegistryFull {
                capacity: self.limit,
            });
        }
        let len = entries.len;
        entries.slots[len] = entry;
        entries.len += 1;
        Ok(())
    }

    pub fn lookup(&self, fd: c_int) -> Option<RedirectEntry> {
        let entries = self.entries.lock();
        entries.position(fd).map(|i| entries.slots[i])
    }

    /// Run `f` on the entry for `fd` while holding the registry lock.
    pub fn with_entry<R>(&self, fd: c_int, f: impl FnOnce(&mut RedirectEntry) -> R) -> Option<R> {
        let mut entries = self.entries.lock();
        let i = entries.position(fd)?;
        Some(f(&mut entries.slots[i]))
    }

    /// Forget `fd`, keeping the remaining entries in order.
    pub fn evict(&self, fd: c_int) -> Option<RedirectEntry> {
        let mut entries = self.entries.lock();
        let i = entries.position(fd)?;
        let removed = entries.slots[i];
        let len = entries.len;
        entries.slots.copy_within(i + 1..len, i);
        entries.len -= 1;
        let last = entries.len;
        entries.slots[last] = RedirectEntry::VACANT;
        Some(removed)
    }

    /// Descriptors currently registered, in registration order.
    pub fn descriptors(&self, out: &mut [c_int]) -> usize {
        let entries = self.entries.lock();
        let n = entries.len.min(out.len());
        for (slot, entry) in out.iter_mut().zip(&entries.slots[..n]) {
            *slot = entry.fd;
        }
        n
    }
}
