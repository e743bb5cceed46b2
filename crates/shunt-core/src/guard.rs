use libc::c_void;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

// Lock-free key storage instead of OnceLock: a mutex here could be re-entered
// from the allocator hooks during library init. Stores `key + 1`; 0 = unset.
static RECURSION_KEY: AtomicUsize = AtomicUsize::new(0);
/// Set while the key is being created, so nested hook calls on any thread
/// treat themselves as re-entered. A call on another thread in that window
/// is forwarded without running its policy, so its allocation goes
/// unaccounted. `HookGuard::init` from the load-time constructor closes the
/// window before the host starts threads.
static CREATING_KEY: AtomicBool = AtomicBool::new(false);

fn recursion_key() -> Option<libc::pthread_key_t> {
    let stored = RECURSION_KEY.load(Ordering::Acquire);
    if stored != 0 {
        return Some((stored - 1) as libc::pthread_key_t);
    }

    if CREATING_KEY.swap(true, Ordering::AcqRel) {
        return None;
    }
    // Another thread may have finished between our load and the swap.
    let stored = RECURSION_KEY.load(Ordering::Acquire);
    let key = if stored != 0 {
        Some((stored - 1) as libc::pthread_key_t)
    } else {
        let mut key: libc::pthread_key_t = 0;
        if unsafe { libc::pthread_key_create(&mut key, None) } == 0 {
            RECURSION_KEY.store(key as usize + 1, Ordering::Release);
            Some(key)
        } else {
            None
        }
    };
    CREATING_KEY.store(false, Ordering::Release);
    key
}

/// Marks the current thread as running a hook body.
///
/// At most one guard exists per thread. While it is alive, any intercepted
/// call made by the same thread fails to enter and takes the shell's
/// re-entered path instead of running the policy again. If the TLS key
/// cannot be created no guard is ever granted, so every hook degrades to a
/// plain forwarder.
pub struct HookGuard {
    key: libc::pthread_key_t,
}

impl HookGuard {
    pub fn enter() -> Option<Self> {
        let key = recursion_key()?;
        unsafe {
            if !libc::pthread_getspecific(key).is_null() {
                return None;
            }
            libc::pthread_setspecific(key, ptr::dangling::<c_void>());
        }
        Some(HookGuard { key })
    }

    /// Whether the current thread is inside a hook body.
    pub fn is_active() -> bool {
        match RECURSION_KEY.load(Ordering::Acquire) {
            0 => false,
            stored => unsafe {
                !libc::pthread_getspecific((stored - 1) as libc::pthread_key_t).is_null()
            },
        }
    }

    /// Create the TLS key ahead of the first hook call.
    pub fn init() -> bool {
        recursion_key().is_some()
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        unsafe { libc::pthread_setspecific(self.key, ptr::null()) };
    }
}
