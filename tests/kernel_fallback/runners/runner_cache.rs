use std::sync::{Arc, Barrier};
use std::thread;

use anyhow::{anyhow, Result};
use kernel_fallback::legacy::AttrValueMap;
use kernel_fallback::{Code, DType, Location, OpKernelRunner, OpKernelRunnerCache};

use crate::common::{self, Harness};

fn same_runner(a: &Arc<dyn OpKernelRunner>, b: &Arc<dyn OpKernelRunner>) -> bool {
    Arc::as_ptr(a) as *const u8 == Arc::as_ptr(b) as *const u8
}

#[test]
fn concurrent_lookups_construct_once() -> Result<()> {
    let harness = Arc::new(Harness::new()?);
    let cache = Arc::new(OpKernelRunnerCache::default());
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles = (0..threads)
        .map(|_| {
            let harness = Arc::clone(&harness);
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<Arc<dyn OpKernelRunner>> {
                let attrs = common::t_attr(DType::I32);
                let state = harness.request_state()?;
                barrier.wait();
                let runner = cache.get_or_create(
                    &Location::new(3),
                    "Counted",
                    common::CPU,
                    1,
                    &|map: &mut AttrValueMap| attrs.fill_attr_value_map(map),
                    state,
                )?;
                Ok(runner)
            })
        })
        .collect::<Vec<_>>();

    let mut runners = Vec::new();
    for handle in handles {
        let runner = handle
            .join()
            .map_err(|_| anyhow!("lookup thread panicked"))??;
        runners.push(runner);
    }
    assert_eq!(harness.kernels.constructions(), 1);
    assert_eq!(cache.len(), 1);
    for runner in &runners[1..] {
        assert!(same_runner(&runners[0], runner));
    }
    Ok(())
}

#[test]
fn distinct_signatures_get_distinct_runners() -> Result<()> {
    let harness = Harness::new()?;
    let state = harness.request_state()?;
    let cache = OpKernelRunnerCache::default();
    let lookup = |location: u64, dtype: DType| {
        let attrs = common::t_attr(dtype);
        cache.get_or_create(
            &Location::new(location),
            "Counted",
            common::CPU,
            1,
            &|map: &mut AttrValueMap| attrs.fill_attr_value_map(map),
            state,
        )
    };
    let first = lookup(1, DType::I32)?;
    let repeat = lookup(1, DType::I32)?;
    let other_dtype = lookup(1, DType::F32)?;
    let other_location = lookup(2, DType::I32)?;

    assert!(same_runner(&first, &repeat));
    assert!(!same_runner(&first, &other_dtype));
    assert!(!same_runner(&first, &other_location));
    assert_eq!(harness.kernels.constructions(), 3);
    assert_eq!(cache.len(), 3);
    Ok(())
}

#[test]
fn failed_construction_is_retried() -> Result<()> {
    let harness = Harness::new()?;
    let state = harness.request_state()?;
    let cache = OpKernelRunnerCache::default();
    let lookup = || {
        cache.get_or_create(
            &Location::new(5),
            "Flaky",
            common::CPU,
            1,
            &|_: &mut AttrValueMap| -> Result<()> { Ok(()) },
            state,
        )
    };

    let err = match lookup() {
        Ok(_) => return Err(anyhow!("first construction should fail")),
        Err(err) => err,
    };
    assert_eq!(err.code(), Code::Unimplemented);
    assert!(cache.is_empty());

    let runner = lookup()?;
    assert_eq!(runner.op_kernel().name(), "Flaky");
    assert_eq!(cache.len(), 1);
    Ok(())
}

#[test]
fn attribute_builder_errors_are_invalid_argument() -> Result<()> {
    let harness = Harness::new()?;
    let state = harness.request_state()?;
    let cache = OpKernelRunnerCache::default();
    let result = cache.get_or_create(
        &Location::new(6),
        "Counted",
        common::CPU,
        1,
        &|_: &mut AttrValueMap| -> Result<()> { Err(anyhow!("bad attrs")) },
        state,
    );
    let err = match result {
        Ok(_) => return Err(anyhow!("expected an attribute error")),
        Err(err) => err,
    };
    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(harness.kernels.constructions(), 0);
    Ok(())
}
