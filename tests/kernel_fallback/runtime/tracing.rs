use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use kernel_fallback::logging::add_log_listener;
use kernel_fallback::runtime::{encode_metadata, TraceEventKind, TracingLevel};
use kernel_fallback::{execute_op, set_resource, DType, FallbackConfig, FallbackTensor, TensorValue};

use crate::common::{self, Harness};

fn traced(level: TracingLevel) -> Result<Harness> {
    Harness::with_config(FallbackConfig {
        tracing_level: Some(level),
        ..Default::default()
    })
}

fn op_metadata(harness: &Harness) -> Result<String> {
    harness
        .host
        .trace_events()
        .into_iter()
        .find(|event| event.kind == TraceEventKind::OpExecute)
        .map(|event| event.metadata)
        .ok_or_else(|| anyhow!("no op execution event recorded"))
}

#[test]
fn debug_level_records_inputs_and_attrs() -> Result<()> {
    let harness = traced(TracingLevel::Debug)?;
    harness.create(0, "AddV2", 2, common::t_attr(DType::I32))?;
    let results = execute_op(
        &harness.exec_ctx,
        &[common::scalar_arg(3i32), common::scalar_arg(4i32)],
        1,
        0,
        "AddV2",
    );
    common::wait_tensor(&results[0])?;
    assert_eq!(
        op_metadata(&harness)?,
        "#id=1,long_name=test/op,input0=int32[],input1=int32[],attrs=T=int32#"
    );
    let events = harness.host.trace_events();
    assert!(events
        .iter()
        .any(|event| event.kind == TraceEventKind::CreateOp && event.name == "AddV2"));
    Ok(())
}

#[test]
fn default_level_records_request_id_only() -> Result<()> {
    let harness = traced(TracingLevel::Default)?;
    harness.create(0, "AddV2", 2, common::t_attr(DType::I32))?;
    let results = execute_op(
        &harness.exec_ctx,
        &[common::scalar_arg(3i32), common::scalar_arg(4i32)],
        1,
        0,
        "AddV2",
    );
    common::wait_tensor(&results[0])?;
    assert_eq!(op_metadata(&harness)?, "#id=1#");
    Ok(())
}

#[test]
fn verbose_level_adds_long_name() -> Result<()> {
    let harness = traced(TracingLevel::Verbose)?;
    harness.create(0, "AddV2", 2, common::t_attr(DType::I32))?;
    execute_op(
        &harness.exec_ctx,
        &[common::scalar_arg(3i32), common::scalar_arg(4i32)],
        1,
        0,
        "AddV2",
    );
    assert_eq!(op_metadata(&harness)?, "#id=1,long_name=test/op#");
    Ok(())
}

#[test]
fn tracing_off_records_nothing() -> Result<()> {
    let harness = Harness::new()?;
    harness.create(0, "AddV2", 2, common::t_attr(DType::I32))?;
    common::wait_chain(&set_resource(
        &harness.exec_ctx,
        &common::ready_chain(),
        &FallbackTensor::new(TensorValue::scalar(1i32)),
        0,
    ))?;
    execute_op(
        &harness.exec_ctx,
        &[common::scalar_arg(3i32), common::scalar_arg(4i32)],
        1,
        0,
        "AddV2",
    );
    assert!(harness.host.trace_events().is_empty());
    Ok(())
}

#[test]
fn trace_events_serialize() -> Result<()> {
    let harness = traced(TracingLevel::Default)?;
    common::wait_chain(&set_resource(
        &harness.exec_ctx,
        &common::ready_chain(),
        &FallbackTensor::new(TensorValue::scalar(1i32)),
        2,
    ))?;
    let events = harness.host.trace_events();
    assert_eq!(events.len(), 1);
    let json = serde_json::to_value(&events[0])?;
    assert_eq!(json["kind"], "resource_write");
    assert_eq!(json["name"], "set_resource[2]");
    Ok(())
}

#[test]
fn trace_sink_keeps_newest_events() -> Result<()> {
    let harness = Harness::with_config(FallbackConfig {
        tracing_level: Some(TracingLevel::Default),
        trace_capacity: 4,
        ..Default::default()
    })?;
    let chain = common::ready_chain();
    for index in 0..10 {
        common::wait_chain(&set_resource(
            &harness.exec_ctx,
            &chain,
            &FallbackTensor::new(TensorValue::scalar(index as i32)),
            index,
        ))?;
    }
    let names = harness
        .host
        .trace_events()
        .into_iter()
        .map(|event| event.name)
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        ["set_resource[6]", "set_resource[7]", "set_resource[8]", "set_resource[9]"]
    );
    assert_eq!(harness.host.dropped_trace_count(), 6);

    assert_eq!(harness.host.take_trace_events().len(), 4);
    assert!(harness.host.trace_events().is_empty());
    Ok(())
}

#[test]
fn zero_capacity_sink_retains_nothing() -> Result<()> {
    let harness = Harness::with_config(FallbackConfig {
        tracing_level: Some(TracingLevel::Debug),
        trace_capacity: 0,
        ..Default::default()
    })?;
    harness.create(0, "AddV2", 2, common::t_attr(DType::I32))?;
    assert!(harness.host.trace_events().is_empty());
    assert_eq!(harness.host.dropped_trace_count(), 1);
    Ok(())
}

#[test]
fn metadata_encoding() -> Result<()> {
    assert_eq!(encode_metadata::<&str, &str>(&[]), "##");
    assert_eq!(encode_metadata(&[("a", 1), ("b", 2)]), "#a=1,b=2#");
    assert_eq!(TracingLevel::from_ident("full")?, TracingLevel::Debug);
    assert_eq!(TracingLevel::from_ident("medium")?, TracingLevel::Verbose);
    assert!(TracingLevel::from_ident("loud").is_err());
    Ok(())
}

#[test]
fn placement_logging_reaches_listeners() -> Result<()> {
    let messages = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&messages);
    add_log_listener(move |msg| {
        sink.lock().expect("sink mutex poisoned").push(msg.to_string());
    });

    let harness = Harness::new()?;
    harness.create(0, "Identity", 1, common::t_attr(DType::I32))?;
    harness.request_state()?.set_log_device_placement(true);
    let results = execute_op(&harness.exec_ctx, &[common::scalar_arg(1i32)], 1, 0, "Identity");
    common::wait_tensor(&results[0])?;

    let expected = "Executing op Identity in device /job:localhost/replica:0/task:0/device:CPU:0";
    let messages = messages.lock().expect("sink mutex poisoned");
    assert!(messages.iter().any(|msg| msg == expected));
    Ok(())
}
