use std::time::Duration;

use super::helpers::run_pes;
use ibshmem::{Cmp, ShmemError};

// ============================================================================
// Blocking waits
// ============================================================================

#[test]
fn test_wait_until_sees_delayed_put() {
    run_pes(2, |host| {
        let me = host.my_pe();
        let ivar = host.malloc_array::<i64>(1).unwrap();
        host.ctx().barrier_all().unwrap();
        if me == 0 {
            std::thread::sleep(Duration::from_millis(30));
            host.ctx().p(ivar, 42i64, 1).unwrap();
        } else {
            host.wait_until(ivar, Cmp::Eq, 42i64).unwrap();
            assert_eq!(host.heap().read::<i64>(ivar).unwrap(), 42);
        }
        host.ctx().barrier_all().unwrap();
    });
}

#[test]
fn test_wait_until_all_skips_excluded() {
    run_pes(2, |host| {
        let me = host.my_pe();
        let ivars = host.malloc_array::<u32>(4).unwrap();
        host.ctx().barrier_all().unwrap();
        if me == 0 {
            // Index 2 is never written; its waiter excludes it.
            for i in [0usize, 1, 3] {
                host.ctx().p(ivars.index::<u32>(i), 1u32, 1).unwrap();
            }
        } else {
            let status = [0, 0, 1, 0];
            host.wait_until_all(ivars, 4, Some(&status[..]), Cmp::Eq, 1u32)
                .unwrap();
            assert!(!host.test_all(ivars, 4, None, Cmp::Eq, 1u32).unwrap());
            assert!(host.test_all(ivars, 4, Some(&status[..]), Cmp::Eq, 1u32).unwrap());
        }
        host.ctx().barrier_all().unwrap();
    });
}

#[test]
fn test_wait_until_any_returns_lowest_ready() {
    run_pes(1, |host| {
        let ivars = host.malloc_array::<i32>(5).unwrap();
        host.heap().write_slice(ivars, &[0, 0, 9, 0, 9]).unwrap();
        let i = host.wait_until_any(ivars, 5, None, Cmp::Gt, 5i32).unwrap();
        assert_eq!(i, Some(2));
        let status = [0, 0, 1, 0, 0];
        let i = host
            .wait_until_any(ivars, 5, Some(&status[..]), Cmp::Gt, 5i32)
            .unwrap();
        assert_eq!(i, Some(4));
    });
}

#[test]
fn test_wait_until_some_collects_every_ready_index() {
    run_pes(2, |host| {
        let me = host.my_pe();
        let ivars = host.malloc_array::<u64>(6).unwrap();
        host.ctx().barrier_all().unwrap();
        if me == 0 {
            host.ctx().put(ivars.index::<u64>(1), &[7u64], 1).unwrap();
            host.ctx().put(ivars.index::<u64>(4), &[7u64], 1).unwrap();
        }
        host.ctx().barrier_all().unwrap();
        if me == 1 {
            let mut idx = [usize::MAX; 6];
            let n = host
                .wait_until_some(ivars, 6, &mut idx, None, Cmp::Ne, 0u64)
                .unwrap();
            assert_eq!(&idx[..n], &[1, 4]);
        }
    });
}

#[test]
fn test_vector_variants() {
    run_pes(1, |host| {
        let ivars = host.malloc_array::<i16>(4).unwrap();
        host.heap().write_slice(ivars, &[1i16, -2, 3, -4]).unwrap();
        let targets = [1i16, -2, 0, 0];

        let status = [0, 0, 1, 1];
        host.wait_until_all_vector(ivars, 4, Some(&status[..]), Cmp::Eq, &targets)
            .unwrap();
        assert_eq!(
            host.wait_until_any_vector(ivars, 4, None, Cmp::Lt, &targets)
                .unwrap(),
            Some(3)
        );
        let mut idx = [0usize; 4];
        let n = host
            .wait_until_some_vector(ivars, 4, &mut idx, None, Cmp::Gt, &targets)
            .unwrap();
        assert_eq!(&idx[..n], &[2]);

        assert!(host.test_all_vector(ivars, 2, None, Cmp::Eq, &targets).unwrap());
        assert_eq!(
            host.test_any_vector(ivars, 4, None, Cmp::Ge, &[5i16; 4]).unwrap(),
            None
        );
        let n = host
            .test_some_vector(ivars, 4, &mut idx, None, Cmp::Le, &targets)
            .unwrap();
        assert_eq!(&idx[..n], &[0, 1, 3]);
    });
}

// ============================================================================
// Non-blocking tests
// ============================================================================

#[test]
fn test_never_blocks() {
    run_pes(1, |host| {
        let ivars = host.malloc_array::<f64>(3).unwrap();
        host.heap().write_slice(ivars, &[0.5f64, 1.5, 2.5]).unwrap();

        assert!(!host.test(ivars, Cmp::Gt, 1.0f64).unwrap());
        assert!(host.test(ivars.index::<f64>(1), Cmp::Gt, 1.0f64).unwrap());
        assert_eq!(host.test_any(ivars, 3, None, Cmp::Ge, 3.0f64).unwrap(), None);
        assert_eq!(host.test_any(ivars, 3, None, Cmp::Ge, 2.0f64).unwrap(), Some(2));

        let mut idx = [0usize; 3];
        assert_eq!(
            host.test_some(ivars, 3, &mut idx, None, Cmp::Lt, 0.0f64).unwrap(),
            0
        );
        let n = host
            .test_some(ivars, 3, &mut idx, None, Cmp::Ne, 1.5f64)
            .unwrap();
        assert_eq!(&idx[..n], &[0, 2]);
    });
}

#[test]
fn test_all_excluded() {
    run_pes(1, |host| {
        let ivars = host.malloc_array::<i64>(3).unwrap();
        let status = [1, 1, 1];
        let mut idx = [0usize; 3];

        // Would block forever if any index were active.
        host.wait_until_all(ivars, 3, Some(&status[..]), Cmp::Eq, 1i64)
            .unwrap();
        assert_eq!(
            host.wait_until_any(ivars, 3, Some(&status[..]), Cmp::Eq, 1i64)
                .unwrap(),
            None
        );
        assert_eq!(
            host.wait_until_some(ivars, 3, &mut idx, Some(&status[..]), Cmp::Eq, 1i64)
                .unwrap(),
            0
        );
        assert!(host.test_all(ivars, 3, Some(&status[..]), Cmp::Eq, 1i64).unwrap());
        assert_eq!(
            host.test_any(ivars, 3, Some(&status[..]), Cmp::Eq, 0i64).unwrap(),
            None
        );
    });
}

// ============================================================================
// Contract violations
// ============================================================================

#[test]
fn test_invalid_comparison_code_aborts_job() {
    run_pes(1, |host| {
        assert_eq!(host.cmp_from_code(3).unwrap(), Cmp::Ge);
        assert!(!host.job().is_aborted());
        let err = host.cmp_from_code(17).unwrap_err();
        assert!(matches!(err, ShmemError::InvalidComparison(17)));
        assert!(host.job().is_aborted());
    });
}

#[test]
fn test_short_status_aborts_job() {
    run_pes(1, |host| {
        let ivars = host.malloc_array::<u32>(4).unwrap();
        let err = host
            .test_all(ivars, 4, Some(&[0, 0][..]), Cmp::Eq, 0u32)
            .unwrap_err();
        assert!(matches!(
            err,
            ShmemError::BufferTooSmall {
                what: "status",
                needed: 4,
                actual: 2
            }
        ));
        assert!(host.job().is_aborted());
    });
}

#[test]
fn test_waiter_released_by_abort() {
    run_pes(2, |host| {
        let ivar = host.malloc_array::<u64>(1).unwrap();
        if host.my_pe() == 0 {
            std::thread::sleep(Duration::from_millis(20));
            host.job().abort(0, "giving up");
        } else {
            let err = host.wait_until(ivar, Cmp::Eq, 1u64).unwrap_err();
            assert!(matches!(err, ShmemError::JobAborted(ref r) if r.contains("giving up")));
        }
    });
}
