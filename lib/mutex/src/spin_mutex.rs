use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

use crate::MutexSupport;

/// A spinlock parameterised over a [`MutexSupport`] flavour.
#[derive(Debug)]
pub struct SpinMutex<T: ?Sized, S: MutexSupport> {
    lock: AtomicBool,
    _marker: PhantomData<S>,
    data: UnsafeCell<T>,
}

/// Guard handed out by [`SpinMutex::lock`]; releases the lock on drop.
///
/// The guard is a named type rather than an opaque `impl DerefMut` so that
/// callers can hand it across helpers, in particular to drop it for the
/// duration of an operation that must not run under the lock.
pub struct SpinMutexGuard<'a, T: ?Sized, S: MutexSupport> {
    mutex: &'a SpinMutex<T, S>,
    support_guard: S::GuardData,
}

unsafe impl<T: ?Sized + Send, S: MutexSupport> Sync for SpinMutex<T, S> {}
unsafe impl<T: ?Sized + Send, S: MutexSupport> Send for SpinMutex<T, S> {}

impl<T, S: MutexSupport> SpinMutex<T, S> {
    /// Constructs a `SpinMutex`.
    pub const fn new(data: T) -> Self {
        SpinMutex {
            lock: AtomicBool::new(false),
            _marker: PhantomData,
            data: UnsafeCell::new(data),
        }
    }

    /// Consumes the mutex and returns the data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized, S: MutexSupport> SpinMutex<T, S> {
    /// Waits until the lock looks unlocked before retrying.
    #[inline(always)]
    fn wait_unlock(&self) {
        let mut try_count = 0usize;
        while self.lock.load(Ordering::Relaxed) {
            core::hint::spin_loop();
            try_count += 1;
            if try_count == 0x1000_0000 {
                log::error!("dead lock!!");
                panic!("Mutex: deadlock detected, try_count > {:#x}", try_count);
            }
        }
    }

    /// Takes the lock, spinning until it is available.
    #[inline(always)]
    pub fn lock(&self) -> SpinMutexGuard<'_, T, S> {
        let support_guard = S::before_lock();
        loop {
            self.wait_unlock();
            if self
                .lock
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
        SpinMutexGuard {
            mutex: self,
            support_guard,
        }
    }

    /// Mutable access without locking; the exclusive borrow rules out
    /// contention.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: ?Sized, S: MutexSupport> Deref for SpinMutexGuard<'_, T, S> {
    type Target = T;
    #[inline(always)]
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized, S: MutexSupport> DerefMut for SpinMutexGuard<'_, T, S> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized, S: MutexSupport> Drop for SpinMutexGuard<'_, T, S> {
    /// Dropping the guard releases the lock it was created from.
    #[inline(always)]
    fn drop(&mut self) {
        self.mutex.lock.store(false, Ordering::Release);
        S::after_unlock(&mut self.support_guard);
    }
}
