use super::helpers::run_pes;
use ibshmem::{Cmp, ContextOptions};

// ============================================================================
// fence
// ============================================================================

#[test]
fn test_fence_orders_data_before_flag() {
    run_pes(2, |host| {
        let me = host.my_pe();
        let data = host.malloc_array::<u64>(64).unwrap();
        let flag = host.malloc_array::<u64>(1).unwrap();
        host.ctx().barrier_all().unwrap();

        for round in 1..=20u64 {
            if me == 0 {
                let payload = vec![round; 64];
                host.ctx().put_nbi(data, &payload, 1).unwrap();
                host.ctx().fence().unwrap();
                host.ctx().p(flag, round, 1).unwrap();
            } else {
                host.wait_until(flag, Cmp::Ge, round).unwrap();
                let mut got = [0u64; 64];
                host.heap().read_slice(data, &mut got).unwrap();
                assert!(got.iter().all(|&v| v >= round), "round {round}: data behind flag");
            }
            host.ctx().barrier_all().unwrap();
        }
    });
}

// ============================================================================
// quiet
// ============================================================================

#[test]
fn test_quiet_from_many_threads() {
    run_pes(2, |host| {
        let me = host.my_pe();
        let slots = host.malloc_array::<u32>(4 * 100).unwrap();
        host.ctx().barrier_all().unwrap();

        std::thread::scope(|s| {
            for t in 0..4usize {
                s.spawn(move || {
                    for i in 0..100usize {
                        let at = slots.index::<u32>(t * 100 + i);
                        host.ctx().put_nbi(at, &[(t * 1000 + i) as u32], 1 - me).unwrap();
                        if i % 10 == 9 {
                            host.ctx().quiet().unwrap();
                        }
                    }
                    host.ctx().quiet().unwrap();
                });
            }
        });
        assert_eq!(host.ctx().outstanding().unwrap(), 0);
        host.ctx().barrier_all().unwrap();

        let mut got = vec![0u32; 400];
        host.heap().read_slice(slots, &mut got).unwrap();
        for t in 0..4 {
            for i in 0..100 {
                assert_eq!(got[t * 100 + i], (t * 1000 + i) as u32);
            }
        }
    });
}

#[test]
fn test_quiet_only_covers_its_context() {
    run_pes(2, |host| {
        let me = host.my_pe();
        let dest = host.malloc_array::<i64>(8).unwrap();
        let ctx = host.create_context(ContextOptions::PRIVATE).unwrap();
        host.ctx().barrier_all().unwrap();

        if me == 0 {
            ctx.put_nbi(dest, &[5i64; 8], 1).unwrap();
            host.ctx().quiet().unwrap();
            ctx.quiet().unwrap();
            assert_eq!(ctx.outstanding().unwrap(), 0);
            assert!(ctx.completed().unwrap() >= 1);
        }
        host.ctx().barrier_all().unwrap();
        if me == 1 {
            let mut got = [0i64; 8];
            host.heap().read_slice(dest, &mut got).unwrap();
            assert_eq!(got, [5; 8]);
        }
        ctx.destroy().unwrap();
    });
}

// ============================================================================
// Barriers
// ============================================================================

#[test]
fn test_barrier_all_rounds() {
    for n in [1u32, 2, 3, 5, 8] {
        run_pes(n, |host| {
            let counter = host.malloc_array::<i64>(1).unwrap();
            host.ctx().barrier_all().unwrap();
            for round in 1..=10i64 {
                host.ctx().amo_add(counter, 1i64, 0).unwrap();
                host.ctx().barrier_all().unwrap();
                if host.my_pe() == 0 {
                    let seen = host.heap().read::<i64>(counter).unwrap();
                    assert_eq!(seen, round * host.n_pes() as i64);
                }
                host.ctx().barrier_all().unwrap();
            }
        });
    }
}

#[test]
fn test_sync_all_stress() {
    run_pes(5, |host| {
        for _ in 0..200 {
            host.ctx().sync_all().unwrap();
        }
    });
}

#[test]
fn test_barrier_on_created_context() {
    run_pes(3, |host| {
        let flag = host.malloc_array::<u32>(1).unwrap();
        let ctx = host
            .create_context(ContextOptions::SERIALIZED | ContextOptions::PRIVATE)
            .unwrap();
        ctx.put_nbi(flag, &[1u32], (host.my_pe() + 1) % host.n_pes())
            .unwrap();
        ctx.barrier_all().unwrap();
        assert_eq!(host.heap().read::<u32>(flag).unwrap(), 1);
        ctx.destroy().unwrap();
        host.ctx().barrier_all().unwrap();
    });
}

// ============================================================================
// Context teardown
// ============================================================================

#[test]
fn test_destroy_drains_outstanding() {
    run_pes(2, |host| {
        let me = host.my_pe();
        let dest = host.malloc_array::<u8>(4096).unwrap();
        host.ctx().barrier_all().unwrap();
        if me == 0 {
            let ctx = host.create_context(ContextOptions::NONE).unwrap();
            for chunk in 0..16usize {
                ctx.putmem_nbi(dest.offset(chunk as u64 * 256), &[chunk as u8; 256], 1)
                    .unwrap();
            }
            ctx.destroy().unwrap();
        }
        host.ctx().barrier_all().unwrap();
        if me == 1 {
            let mut got = vec![0u8; 4096];
            host.heap().read_bytes(dest, &mut got).unwrap();
            assert!(got.chunks(256).enumerate().all(|(c, b)| b.iter().all(|&x| x == c as u8)));
        }
    });
}

#[test]
fn test_drop_drains_outstanding() {
    run_pes(2, |host| {
        let me = host.my_pe();
        let dest = host.malloc_array::<u64>(32).unwrap();
        host.ctx().barrier_all().unwrap();
        if me == 0 {
            let ctx = host.create_context(ContextOptions::NONE).unwrap();
            ctx.put_nbi(dest, &[0xabu64; 32], 1).unwrap();
            drop(ctx);
        }
        host.ctx().barrier_all().unwrap();
        if me == 1 {
            let mut got = [0u64; 32];
            host.heap().read_slice(dest, &mut got).unwrap();
            assert_eq!(got, [0xab; 32]);
        }
    });
}
