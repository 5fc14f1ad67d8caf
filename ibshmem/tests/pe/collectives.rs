use super::helpers::run_pes;
use ibshmem::{
    BCAST_SYNC_SIZE, ContextOptions, REDUCE_SYNC_SIZE, ReduceOp, SYNC_VALUE, ShmemError,
    reduce_wrk_len,
};

// ============================================================================
// broadcast
// ============================================================================

#[test]
fn test_broadcast_leaves_root_dest_untouched() {
    run_pes(4, |host| {
        let me = host.my_pe();
        let src = host.malloc_array::<i32>(16).unwrap();
        let dst = host.malloc_array::<i32>(16).unwrap();
        let psync = host.malloc_array::<i64>(BCAST_SYNC_SIZE).unwrap();
        host.heap().write_slice(src, &[me as i32 * 10; 16]).unwrap();
        host.heap().write_slice(dst, &[-1i32; 16]).unwrap();
        host.ctx().barrier_all().unwrap();

        host.ctx()
            .broadcast::<i32>(dst, src, 16, 2, 0, 0, 4, psync)
            .unwrap();

        let mut got = [0i32; 16];
        host.heap().read_slice(dst, &mut got).unwrap();
        if me == 2 {
            assert_eq!(got, [-1; 16]);
        } else {
            assert_eq!(got, [20; 16], "PE {me}");
        }
    });
}

#[test]
fn test_broadcast_strided_subset() {
    run_pes(6, |host| {
        let me = host.my_pe();
        let src = host.malloc_array::<u64>(4).unwrap();
        let dst = host.malloc_array::<u64>(4).unwrap();
        let psync = host.malloc_array::<i64>(BCAST_SYNC_SIZE).unwrap();
        host.heap().write_slice(src, &[100 + me as u64; 4]).unwrap();
        host.ctx().barrier_all().unwrap();

        // PEs 1, 3 and 5; root ordinal 1 is PE 3.
        if me % 2 == 1 {
            host.ctx()
                .broadcast::<u64>(dst, src, 4, 1, 1, 1, 3, psync)
                .unwrap();
        }
        host.ctx().barrier_all().unwrap();

        let mut got = [0u64; 4];
        host.heap().read_slice(dst, &mut got).unwrap();
        match me {
            1 | 5 => assert_eq!(got, [103; 4]),
            _ => assert_eq!(got, [0; 4], "PE {me}"),
        }
    });
}

#[test]
fn test_broadcast_reuses_sync_array() {
    run_pes(4, |host| {
        let me = host.my_pe();
        let n = host.n_pes();
        let src = host.malloc_array::<f64>(8).unwrap();
        let dst = host.malloc_array::<f64>(8).unwrap();
        let psync = host.malloc_array::<i64>(BCAST_SYNC_SIZE).unwrap();
        host.ctx().barrier_all().unwrap();

        for round in 0..12u32 {
            let root = round % n;
            let value = f64::from(round * 100 + me);
            host.heap().write_slice(src, &[value; 8]).unwrap();
            host.ctx()
                .broadcast::<f64>(dst, src, 8, root, 0, 0, n, psync)
                .unwrap();
            if me != root {
                let mut got = [0.0f64; 8];
                host.heap().read_slice(dst, &mut got).unwrap();
                assert_eq!(got, [f64::from(round * 100 + root); 8], "round {round}");
            }
        }
        host.ctx().barrier_all().unwrap();

        let mut words = [1i64; BCAST_SYNC_SIZE];
        host.heap().read_slice(psync, &mut words).unwrap();
        assert_eq!(words, [SYNC_VALUE; BCAST_SYNC_SIZE]);
    });
}

#[test]
fn test_broadcast_team_fills_root() {
    run_pes(3, |host| {
        let me = host.my_pe();
        let src = host.malloc_array::<u8>(5).unwrap();
        let dst = host.malloc_array::<u8>(5).unwrap();
        host.heap().write_bytes(src, &[me as u8 + 1; 5]).unwrap();
        host.ctx().barrier_all().unwrap();

        let world = host.team_world();
        host.ctx()
            .broadcast_team::<u8>(world, dst, src, 5, 0)
            .unwrap();
        let mut got = [0u8; 5];
        host.heap().read_bytes(dst, &mut got).unwrap();
        assert_eq!(got, [1; 5], "PE {me}");
    });
}

#[test]
fn test_broadcast_mismatch_aborts_job() {
    let results = run_pes(3, |host| {
        let me = host.my_pe();
        let src = host.malloc_array::<i64>(8).unwrap();
        let dst = host.malloc_array::<i64>(8).unwrap();
        let psync = host.malloc_array::<i64>(BCAST_SYNC_SIZE).unwrap();
        host.ctx().barrier_all().unwrap();

        let nelems = if me == 2 { 5 } else { 4 };
        let res = host
            .ctx()
            .broadcast::<i64>(dst, src, nelems, 0, 0, 0, 3, psync);
        (me, res)
    });

    for (me, res) in results {
        match (me, res) {
            (0, Err(ShmemError::CollectiveMismatch { operation, leader })) => {
                assert_eq!(operation, "broadcast");
                assert_eq!(leader, 0);
            }
            (_, Err(ShmemError::CollectiveMismatch { .. } | ShmemError::JobAborted(_))) => {}
            (me, other) => panic!("PE {me}: unexpected {other:?}"),
        }
    }
}

#[test]
fn test_broadcast_root_disagreement_aborts_job() {
    let results = run_pes(3, |host| {
        let me = host.my_pe();
        let src = host.malloc_array::<u32>(4).unwrap();
        let dst = host.malloc_array::<u32>(4).unwrap();
        let psync = host.malloc_array::<i64>(BCAST_SYNC_SIZE).unwrap();
        host.ctx().barrier_all().unwrap();

        let root = if me == 0 { 0 } else { 1 };
        host.ctx()
            .broadcast::<u32>(dst, src, 4, root, 0, 0, 3, psync)
    });

    for (me, res) in results.into_iter().enumerate() {
        assert!(
            matches!(
                res,
                Err(ShmemError::CollectiveMismatch { .. } | ShmemError::JobAborted(_))
            ),
            "PE {me}: {res:?}"
        );
    }
}

// ============================================================================
// to_all
// ============================================================================

#[test]
fn test_to_all_sum_in_place() {
    run_pes(4, |host| {
        let me = host.my_pe() as i64;
        const N: usize = 100;
        let buf = host.malloc_array::<i64>(N).unwrap();
        let wrk = host.malloc_array::<i64>(reduce_wrk_len(N)).unwrap();
        let psync = host.malloc_array::<i64>(REDUCE_SYNC_SIZE).unwrap();
        let vals: Vec<i64> = (0..N as i64).map(|i| me * 1000 + i).collect();
        host.heap().write_slice(buf, &vals).unwrap();
        host.ctx().barrier_all().unwrap();

        host.ctx()
            .to_all::<i64>(ReduceOp::Sum, buf, buf, N, 0, 0, 4, wrk, psync)
            .unwrap();

        let mut got = vec![0i64; N];
        host.heap().read_slice(buf, &mut got).unwrap();
        let expected: Vec<i64> = (0..N as i64).map(|i| 4 * i + 6000).collect();
        assert_eq!(got, expected);
    });
}

#[test]
fn test_to_all_float_sum_is_reproducible() {
    const N: usize = 6;
    fn contribution(pe: u32) -> [f64; N] {
        let p = f64::from(pe);
        [1e16 * (p - 1.5), 0.1 * p, 1.0 / (p + 3.0), -2.5e-8 * p, 3.3, 1e-300]
    }

    let results = run_pes(4, |host| {
        let src = host.malloc_array::<f64>(N).unwrap();
        let dst = host.malloc_array::<f64>(N).unwrap();
        let wrk = host.malloc_array::<f64>(reduce_wrk_len(N)).unwrap();
        let psync = host.malloc_array::<i64>(REDUCE_SYNC_SIZE).unwrap();
        host.heap().write_slice(src, &contribution(host.my_pe())).unwrap();
        host.ctx().barrier_all().unwrap();

        let mut runs = Vec::new();
        for _ in 0..3 {
            host.ctx()
                .to_all::<f64>(ReduceOp::Sum, dst, src, N, 0, 0, 4, wrk, psync)
                .unwrap();
            let mut got = [0.0f64; N];
            host.heap().read_slice(dst, &mut got).unwrap();
            runs.push(got.map(f64::to_bits));
        }
        runs
    });

    let mut expected = contribution(0);
    for pe in 1..4 {
        for (acc, v) in expected.iter_mut().zip(contribution(pe)) {
            *acc += v;
        }
    }
    let expected = expected.map(f64::to_bits);
    for runs in results {
        for run in runs {
            assert_eq!(run, expected);
        }
    }
}

#[test]
fn test_to_all_min_max_on_range() {
    run_pes(5, |host| {
        let me = host.my_pe();
        let src = host.malloc_array::<i16>(3).unwrap();
        let dst = host.malloc_array::<i16>(3).unwrap();
        let wrk = host.malloc_array::<i16>(reduce_wrk_len(3)).unwrap();
        let psync = host.malloc_array::<i64>(REDUCE_SYNC_SIZE).unwrap();
        let v = me as i16;
        host.heap().write_slice(src, &[v, -v, v * v]).unwrap();
        host.ctx().barrier_all().unwrap();

        // PEs 0, 2 and 4.
        if me % 2 == 0 {
            host.ctx()
                .to_all::<i16>(ReduceOp::Max, dst, src, 3, 0, 1, 3, wrk, psync)
                .unwrap();
            let mut got = [0i16; 3];
            host.heap().read_slice(dst, &mut got).unwrap();
            assert_eq!(got, [4, 0, 16]);

            host.ctx()
                .to_all::<i16>(ReduceOp::Min, dst, src, 3, 0, 1, 3, wrk, psync)
                .unwrap();
            host.heap().read_slice(dst, &mut got).unwrap();
            assert_eq!(got, [0, -4, 0]);
        }
        host.ctx().barrier_all().unwrap();
    });
}

#[test]
fn test_to_all_unregistered_work_array() {
    let results = run_pes(2, |host| {
        let src = host.malloc_array::<u32>(4).unwrap();
        let psync = host.malloc_array::<i64>(REDUCE_SYNC_SIZE).unwrap();
        // Far enough past the allocation frontier to fall off the heap.
        let wrk = src.offset(host.config().heap_size as u64);
        host.ctx()
            .to_all::<u32>(ReduceOp::Or, src, src, 4, 0, 0, 2, wrk, psync)
    });
    for res in results {
        assert!(matches!(res, Err(ShmemError::Unregistered { .. })), "{res:?}");
    }
}

// ============================================================================
// Teams
// ============================================================================

#[test]
fn test_split_even_pes_and_reduce() {
    run_pes(6, |host| {
        let me = host.my_pe();
        let src = host.malloc_array::<u64>(2).unwrap();
        let dst = host.malloc_array::<u64>(2).unwrap();
        host.heap().write_slice(src, &[me as u64 + 1, 1u64 << me]).unwrap();

        let world = host.team_world();
        assert_eq!(world.n_pes(), 6);
        assert_eq!(world.my_pe(), me);

        let evens = host.team_split_strided(world, 0, 2, 3).unwrap();
        assert_eq!(evens.is_some(), me % 2 == 0);
        if let Some(team) = evens {
            assert_eq!(team.members(), &[0, 2, 4]);
            assert_eq!(team.my_pe(), me / 2);
            assert_eq!(team.translate_pe(2), Some(4));
            assert_eq!(team.translate_pe(3), None);

            host.ctx().sync_team(&team).unwrap();
            host.ctx()
                .to_all_team::<u64>(&team, ReduceOp::Prod, dst, src, 1)
                .unwrap();
            assert_eq!(host.heap().read::<u64>(dst).unwrap(), 15);
            let (dst1, src1) = (dst.index::<u64>(1), src.index::<u64>(1));
            host.ctx()
                .to_all_team::<u64>(&team, ReduceOp::Or, dst1, src1, 1)
                .unwrap();
            assert_eq!(host.heap().read::<u64>(dst.index::<u64>(1)).unwrap(), 0b10101);
            host.ctx().sync_team(&team).unwrap();
        }
        host.ctx().barrier_all().unwrap();
    });
}

#[test]
fn test_team_collectives_on_nostore_context() {
    run_pes(3, |host| {
        let me = host.my_pe();
        let src = host.malloc_array::<i64>(4).unwrap();
        let dst = host.malloc_array::<i64>(4).unwrap();
        host.heap().write_slice(src, &[me as i64 + 1; 4]).unwrap();
        host.ctx().barrier_all().unwrap();

        let ctx = host.create_context(ContextOptions::NOSTORE).unwrap();
        let world = host.team_world();
        ctx.sync_team(world).unwrap();
        ctx.to_all_team::<i64>(world, ReduceOp::Sum, dst, src, 4).unwrap();
        let mut got = [0i64; 4];
        host.heap().read_slice(dst, &mut got).unwrap();
        assert_eq!(got, [6; 4]);
        ctx.sync_team(world).unwrap();
        ctx.sync_all().unwrap();
        assert!(!host.job().is_aborted());
        ctx.destroy().unwrap();
    });
}

#[test]
fn test_consecutive_splits_get_distinct_sync() {
    run_pes(4, |host| {
        let me = host.my_pe();
        let buf = host.malloc_array::<i32>(1).unwrap();
        let world = host.team_world();
        let low = host.team_split_strided(world, 0, 1, 2).unwrap();
        let high = host.team_split_strided(world, 2, 1, 2).unwrap();
        assert_eq!(low.is_some(), me < 2);
        assert_eq!(high.is_some(), me >= 2);

        let team = low.or(high).unwrap();
        host.heap().write::<i32>(buf, me as i32).unwrap();
        host.ctx()
            .broadcast_team::<i32>(&team, buf, buf, 1, 1)
            .unwrap();
        let expected = if me < 2 { 1 } else { 3 };
        assert_eq!(host.heap().read::<i32>(buf).unwrap(), expected);

        // Split of a split.
        let solo = host.team_split_strided(&team, 0, 1, 1).unwrap();
        assert_eq!(solo.is_some(), team.my_pe() == 0);
        if let Some(solo) = solo {
            host.ctx().sync_team(&solo).unwrap();
            assert_eq!(solo.n_pes(), 1);
        }
        host.ctx().barrier_all().unwrap();
    });
}

#[test]
fn test_float_xor_rejected() {
    run_pes(1, |host| {
        let buf = host.malloc_array::<f32>(2).unwrap();
        let err = host
            .ctx()
            .to_all_team::<f32>(host.team_world(), ReduceOp::Xor, buf, buf, 2)
            .unwrap_err();
        assert!(matches!(err, ShmemError::UnsupportedOp { .. }));
        assert!(host.job().is_aborted());
    });
}

#[test]
fn test_bad_split_rejected() {
    run_pes(1, |host| {
        let err = host
            .team_split_strided(host.team_world(), 0, 1, 2)
            .unwrap_err();
        assert!(matches!(err, ShmemError::InvalidActiveSet { .. }));
    });
}
