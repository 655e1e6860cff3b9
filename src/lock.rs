use std::sync::atomic::{AtomicBool, Ordering};
use crossbeam::utils::Backoff;
use parking_lot::lock_api::{GuardSend, RawMutex};


/// Лок по умолчанию.
pub type DefaultLock = parking_lot::RawMutex;

/// Спин-лок для пулов, где задержка пробуждения важнее расхода CPU.
pub struct SpinLock {
    locked: AtomicBool,
}

// SAFETY: `locked` переходит false -> true только через compare_exchange с
// Acquire, поэтому лок в каждый момент удерживает не больше одного владельца.
// GuardSend допустим: флаг не привязан к потоку, отпустить его может любой.
unsafe impl RawMutex for SpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: SpinLock = SpinLock {
        locked: AtomicBool::new(false),
    };

    type GuardMarker = GuardSend;

    fn lock(&self) {
        let backoff = Backoff::new();
        while !self.try_lock() {
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    // SAFETY: по контракту lock_api вызывается только владельцем лока.
    // Release-запись публикует изменения, сделанные под локом, следующему
    // захвату с Acquire.
    #[inline]
    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::lock_api::Mutex;
    use std::{sync::Arc, thread};

    #[test]
    fn spin_lock_is_exclusive() {
        let counter = Arc::new(Mutex::<SpinLock, usize>::new(0));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        *counter.lock() += 1;
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(*counter.lock(), 40_000);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = SpinLock::INIT;
        lock.lock();
        assert!(!lock.try_lock());
        unsafe { lock.unlock() };
        assert!(lock.try_lock());
    }
}
