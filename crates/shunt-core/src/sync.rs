use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, Ordering};

const UNINIT: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

/// Recursive mutex over raw pthread primitives.
///
/// Locking never allocates, so it is usable from inside allocator hooks, and
/// the owning thread may lock again without deadlocking. The pthread mutex
/// is set up lazily on first lock because a recursive attribute cannot be
/// expressed as a static initializer on every platform.
///
/// Callers must not hold two guards of the same mutex and mutate through
/// both.
pub struct RecursiveMutex<T> {
    raw: UnsafeCell<libc::pthread_mutex_t>,
    state: AtomicU8,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for RecursiveMutex<T> {}
unsafe impl<T: Send> Sync for RecursiveMutex<T> {}

impl<T> RecursiveMutex<T> {
    pub const fn new(data: T) -> Self {
        Self {
            raw: UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER),
            state: AtomicU8::new(UNINIT),
            data: UnsafeCell::new(data),
        }
    }

    fn ensure_init(&self) {
        if self.state.load(Ordering::Acquire) == READY {
            return;
        }
        match self
            .state
            .compare_exchange(UNINIT, INITIALIZING, Ordering::Acquire, Ordering::Acquire)
        {
            Ok(_) => {
                unsafe {
                    let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
                    libc::pthread_mutexattr_init(&mut attr);
                    libc::pthread_mutexattr_settype(&mut attr, libc::PTHREAD_MUTEX_RECURSIVE);
                    libc::pthread_mutex_init(self.raw.get(), &attr);
                    libc::pthread_mutexattr_destroy(&mut attr);
                }
                self.state.store(READY, Ordering::Release);
            }
            Err(_) => {
                while self.state.load(Ordering::Acquire) != READY {
                    std::hint::spin_loop();
                }
            }
        }
    }

    pub fn lock(&self) -> RecursiveMutexGuard<'_, T> {
        self.ensure_init();
        unsafe {
            libc::pthread_mutex_lock(self.raw.get());
        }
        RecursiveMutexGuard { mutex: self }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T> Drop for RecursiveMutex<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == READY {
            unsafe {
                libc::pthread_mutex_destroy(self.raw.get());
            }
        }
    }
}

pub struct RecursiveMutexGuard<'a, T> {
    mutex: &'a RecursiveMutex<T>,
}

impl<T> Deref for RecursiveMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for RecursiveMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for RecursiveMutexGuard<'_, T> {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_mutex_unlock(self.mutex.raw.get());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_relock_on_same_thread() {
        let mutex = RecursiveMutex::new(1u32);
        let outer = mutex.lock();
        let inner = mutex.lock();
        assert_eq!(*outer + *inner, 2);
    }

    #[test]
    fn test_excludes_other_threads() {
        let mutex = Arc::new(RecursiveMutex::new(0usize));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        *mutex.lock() += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*mutex.lock(), 4000);
    }
}
