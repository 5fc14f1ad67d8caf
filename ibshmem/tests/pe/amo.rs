use std::collections::HashSet;

use super::helpers::run_pes;
use ibshmem::{ContextOptions, ShmemError};

// ============================================================================
// Contention
// ============================================================================

#[test]
fn test_amo_add_many_threads_many_pes() {
    const THREADS: u64 = 8;
    let counts = run_pes(4, |host| {
        let n = host.n_pes();
        let counter = host.malloc_array::<u64>(1).unwrap();
        host.ctx().barrier_all().unwrap();

        std::thread::scope(|s| {
            for t in 0..THREADS {
                s.spawn(move || {
                    for pe in 0..n {
                        host.ctx().amo_add(counter, t, pe).unwrap();
                    }
                    host.ctx().quiet().unwrap();
                });
            }
        });
        host.ctx().barrier_all().unwrap();
        host.heap().read::<u64>(counter).unwrap()
    });

    let expected = (THREADS - 1) * THREADS / 2 * 4;
    assert_eq!(counts, vec![expected; 4]);
}

#[test]
fn test_fetch_inc_hands_out_distinct_tickets() {
    let tickets = run_pes(4, |host| {
        let next = host.malloc_array::<i32>(1).unwrap();
        host.ctx().barrier_all().unwrap();
        let mine: Vec<i32> = (0..25)
            .map(|_| host.ctx().amo_fetch_inc::<i32>(next, 0).unwrap())
            .collect();
        host.ctx().barrier_all().unwrap();
        if host.my_pe() == 0 {
            assert_eq!(host.heap().read::<i32>(next).unwrap(), 100);
        }
        mine
    });

    let all: HashSet<i32> = tickets.iter().flatten().copied().collect();
    assert_eq!(all.len(), 100);
    assert_eq!(all, (0..100).collect());
    for mine in &tickets {
        assert!(mine.windows(2).all(|w| w[0] < w[1]), "tickets not increasing");
    }
}

#[test]
fn test_fetch_cas_single_winner() {
    let won = run_pes(5, |host| {
        let lock = host.malloc_array::<i64>(1).unwrap();
        host.ctx().barrier_all().unwrap();

        let me = host.my_pe() as i64;
        let prev = host.ctx().amo_fetch_cas(lock, me + 1, 0i64, 0).unwrap();
        host.ctx().barrier_all().unwrap();

        let holder: i64 = host.ctx().amo_fetch(lock, 0).unwrap();
        assert!((1..=5).contains(&holder));
        (prev == 0, holder == me + 1)
    });

    assert_eq!(won.iter().filter(|(w, _)| *w).count(), 1);
    for (w, holds) in won {
        assert_eq!(w, holds);
    }
}

// ============================================================================
// Single-PE semantics
// ============================================================================

#[test]
fn test_set_swap_fetch_cas() {
    run_pes(2, |host| {
        let me = host.my_pe();
        let peer = 1 - me;
        let word = host.malloc_array::<u32>(2).unwrap();
        host.ctx().barrier_all().unwrap();

        if me == 0 {
            let ctx = host.ctx();
            ctx.amo_set(word, 10u32, peer).unwrap();
            ctx.amo_add(word, 5u32, peer).unwrap();
            ctx.amo_inc::<u32>(word, peer).unwrap();
            assert_eq!(ctx.amo_fetch::<u32>(word, peer).unwrap(), 16);

            assert_eq!(ctx.amo_swap(word, 40u32, peer).unwrap(), 16);
            ctx.amo_cas(word, 99u32, 7u32, peer).unwrap();
            assert_eq!(ctx.amo_fetch_cas(word, 41u32, 40u32, peer).unwrap(), 40);
            assert_eq!(ctx.amo_fetch_add(word, u32::MAX, peer).unwrap(), 41);
            assert_eq!(ctx.amo_fetch::<u32>(word, peer).unwrap(), 40);

            // Wrapping below zero.
            let second = word.index::<u32>(1);
            assert_eq!(ctx.amo_fetch_add(second, u32::MAX, peer).unwrap(), 0);
            assert_eq!(ctx.amo_fetch::<u32>(second, peer).unwrap(), u32::MAX);
        }
        host.ctx().barrier_all().unwrap();
        if me == 1 {
            assert_eq!(host.heap().read::<u32>(word).unwrap(), 40);
        }
    });
}

#[test]
fn test_signed_fetch_add() {
    run_pes(1, |host| {
        let v = host.malloc_array::<i32>(1).unwrap();
        host.heap().write::<i32>(v, 3).unwrap();
        assert_eq!(host.ctx().amo_fetch_add(v, -5i32, 0).unwrap(), 3);
        assert_eq!(host.ctx().amo_fetch::<i32>(v, 0).unwrap(), -2);
    });
}

#[test]
fn test_amo_fetch_allowed_on_nostore_context() {
    run_pes(1, |host| {
        let v = host.malloc_array::<u64>(1).unwrap();
        host.heap().write::<u64>(v, 77).unwrap();
        let ctx = host.create_context(ContextOptions::NOSTORE).unwrap();
        assert_eq!(ctx.amo_fetch::<u64>(v, 0).unwrap(), 77);
        ctx.destroy().unwrap();
    });
}

// ============================================================================
// Contract violations
// ============================================================================

#[test]
fn test_unsupported_width_aborts_job() {
    run_pes(1, |host| {
        let v = host.malloc_array::<i16>(1).unwrap();
        let err = host.ctx().amo_add(v, 1i16, 0).unwrap_err();
        assert!(matches!(err, ShmemError::UnsupportedAtomicWidth { width: 2 }));
        assert!(host.job().is_aborted());
        assert!(matches!(
            host.ctx().amo_add(v, 1i16, 0),
            Err(ShmemError::JobAborted(_))
        ));
    });
}

#[test]
fn test_misaligned_atomic_aborts_job() {
    run_pes(1, |host| {
        let v = host.malloc_array::<u64>(2).unwrap();
        let err = host.ctx().amo_fetch_add(v.offset(4), 1u64, 0).unwrap_err();
        assert!(matches!(err, ShmemError::Misaligned { align: 8, .. }));
        assert!(host.job().is_aborted());
    });
}
