use kernel_sync::{IrqGuard, SpinLock, SyncOnceCell};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::{panic, thread};

#[test]
fn basic_lock_and_raii() {
    let l = SpinLock::named("test/basic", 0_u32);

    {
        let mut g = l.lock();
        *g = 41;
        assert_eq!(g.lock_name(), "test/basic");
        assert!(l.is_locked());
    }

    // lock again; previous drop must have unlocked
    assert!(!l.is_locked());
    {
        let mut g = l.lock();
        *g += 1;
        assert_eq!(*g, 42);
    }
}

#[test]
fn lock_irq_excludes_and_releases() {
    let l = SpinLock::named("test/irq", 0_u32);
    {
        let mut g = l.lock_irq();
        *g += 7;
        assert_eq!(g.lock_name(), "test/irq");
        assert!(l.is_locked());
        assert!(l.try_lock().is_none());
        // Hosted builds never own the interrupt flag.
        assert!(!g.masked_interrupts());
    }
    assert!(!l.is_locked());
    assert_eq!(*l.lock(), 7);

    // Nested interrupt guards restore in reverse order.
    let outer = IrqGuard::new();
    let inner = IrqGuard::new();
    assert!(!inner.were_enabled());
    drop(inner);
    drop(outer);
}

#[test]
fn lock_irq_contends_with_plain_lock() {
    let l = Arc::new(SpinLock::new(0_usize));
    let threads: Vec<_> = (0..4)
        .map(|i| {
            let l = Arc::clone(&l);
            thread::spawn(move || {
                for _ in 0..1000 {
                    if i % 2 == 0 {
                        *l.lock_irq() += 1;
                    } else {
                        *l.lock() += 1;
                    }
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(*l.lock(), 4000);
}

#[test]
fn try_lock_semantics() {
    let l = SpinLock::new(1u8);

    let g1 = l.try_lock();
    assert!(g1.is_some());
    assert_eq!(**g1.as_ref().unwrap(), 1);

    // while held, neither try_lock nor a bounded spin may succeed
    assert!(l.try_lock().is_none());
    assert!(l.try_lock_for(64).is_none());

    drop(g1);
    assert!(l.try_lock_for(0).is_some());
}

#[test]
fn with_lock_works_and_unlocks() {
    let l = SpinLock::new(Vec::<u64>::new());
    let len = l.with_lock(|v| {
        v.push(0x1000);
        v.push(0x2000);
        v.len()
    });
    assert_eq!(len, 2);

    let got = l.with_lock(|v| v.clone());
    assert_eq!(got, vec![0x1000, 0x2000]);
}

#[test]
fn get_mut_and_into_inner() {
    let mut l = SpinLock::new(vec![1, 2, 3]);
    l.get_mut().push(4);
    assert_eq!(l.lock().as_slice(), &[1, 2, 3, 4]);
    assert_eq!(l.into_inner(), vec![1, 2, 3, 4]);
}

#[test]
fn contended_increments_are_exact_and_exclusive() {
    let threads = 8;
    let iters = 5_000;

    let lock = Arc::new(SpinLock::named("test/contended", 0usize));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let mut handles = Vec::with_capacity(threads);
    for _ in 0..threads {
        let lock = Arc::clone(&lock);
        let in_cs = Arc::clone(&in_cs);
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            start.wait();
            for _ in 0..iters {
                lock.with_lock(|v| {
                    let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(prev, 0, "mutual exclusion violated");
                    *v += 1;
                    in_cs.fetch_sub(1, Ordering::SeqCst);
                });
                thread::yield_now();
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(lock.with_lock(|v| *v), threads * iters);
    assert_eq!(in_cs.load(Ordering::SeqCst), 0);
}

#[test]
fn contention_is_counted() {
    let lock = Arc::new(SpinLock::new(()));
    let held = lock.lock();

    let waiter = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            let _g = lock.lock();
        })
    };

    // give the waiter a chance to hit the slow path
    while lock.contention_count() == 0 {
        thread::yield_now();
    }
    drop(held);
    waiter.join().unwrap();
    assert!(lock.contention_count() >= 1);
}

#[test]
fn lock_is_released_on_panic() {
    let l = SpinLock::new(0u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err(), "expected panic");

    assert_eq!(l.with_lock(|v| *v), 123);
}

#[test]
fn spinlock_is_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    let l = SpinLock::new(0u8);
    takes_sync(&l);
}

#[test]
fn once_cell_set_only_once() {
    let cell = SyncOnceCell::new();
    assert!(cell.get().is_none());
    assert!(cell.set(7u32).is_ok());
    assert_eq!(cell.set(8), Err(8));
    assert_eq!(cell.get(), Some(&7));
    assert_eq!(*cell.get_or_init(|| 9), 7);
}

#[test]
fn once_cell_races_have_single_winner() {
    let cell = Arc::new(SyncOnceCell::new());
    let inits = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let cell = Arc::clone(&cell);
            let inits = Arc::clone(&inits);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                *cell.get_or_init(|| {
                    inits.fetch_add(1, Ordering::SeqCst);
                    i
                })
            })
        })
        .collect();

    let seen: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(inits.load(Ordering::SeqCst), 1);
    assert!(seen.iter().all(|v| *v == seen[0]));
}

#[test]
fn once_cell_drops_its_value() {
    let drops = Arc::new(AtomicUsize::new(0));

    struct Tracked(Arc<AtomicUsize>);
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    {
        let cell = SyncOnceCell::new();
        assert!(cell.set(Tracked(Arc::clone(&drops))).is_ok());
    }
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}
