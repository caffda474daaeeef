#![cfg_attr(not(test), no_std)]

mod spin_mutex;

pub use spin_mutex::{SpinMutex, SpinMutexGuard};

/// A spinlock for short critical sections with interrupts left alone.
pub type SpinLock<T> = SpinMutex<T, Spin>;

/// A spinlock that masks supervisor interrupts while held.
#[cfg(target_arch = "riscv64")]
pub type SpinNoIrqLock<T> = SpinMutex<T, SpinNoIrq>;

/// Low-level support for a spinlock flavour.
pub trait MutexSupport {
    /// Guard data
    type GuardData;
    /// Called before taking the lock
    fn before_lock() -> Self::GuardData;
    /// Called when the guard drops
    fn after_unlock(_: &mut Self::GuardData);
}

/// Plain spinning, no interrupt management.
#[derive(Debug)]
pub struct Spin;

impl MutexSupport for Spin {
    type GuardData = ();
    #[inline(always)]
    fn before_lock() -> Self::GuardData {}
    #[inline(always)]
    fn after_unlock(_: &mut Self::GuardData) {}
}

/// Restores the supervisor interrupt-enable state it captured on creation.
#[cfg(target_arch = "riscv64")]
pub struct SieGuard(bool);

#[cfg(target_arch = "riscv64")]
impl SieGuard {
    fn new() -> Self {
        use riscv::register::sstatus;
        let old_ie = sstatus::read().sie();
        unsafe {
            sstatus::clear_sie();
        }
        Self(old_ie)
    }
}

#[cfg(target_arch = "riscv64")]
impl Drop for SieGuard {
    fn drop(&mut self) {
        if self.0 {
            unsafe {
                riscv::register::sstatus::set_sie();
            }
        }
    }
}

/// Spinning with supervisor interrupts masked for the lifetime of the guard.
#[cfg(target_arch = "riscv64")]
#[derive(Debug)]
pub struct SpinNoIrq;

#[cfg(target_arch = "riscv64")]
impl MutexSupport for SpinNoIrq {
    type GuardData = SieGuard;
    #[inline(always)]
    fn before_lock() -> Self::GuardData {
        SieGuard::new()
    }
    #[inline(always)]
    fn after_unlock(_: &mut Self::GuardData) {}
}
