// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use monty::{ExcType, Monty, MontyError, ResourceLimits, RunOutcome, StartOptions, Value};

#[test]
fn allocation_limit_faults_runaway_builders() {
    let code = "\nitems = []\nwhile True:\n    items.append([])\n";
    let m = Monty::new(code).unwrap();
    let limits = ResourceLimits::unlimited().with_max_allocations(100);
    let err = m
        .start_with(StartOptions::default().limits(limits))
        .unwrap_err();
    match err {
        MontyError::Fault(fault) => {
            assert_eq!(fault.exception().class(), ExcType::MemoryError);
        }
        other => panic!("expected fault, got {other:?}"),
    }
}

#[test]
fn memory_error_is_script_visible() {
    let code = "\nitems = []\ntry:\n    while True:\n        items.append([])\nexcept MemoryError:\n    r = 'out of allocations'\nr\n";
    let m = Monty::new(code).unwrap();
    let limits = ResourceLimits::unlimited().with_max_allocations(100);
    let outcome = m
        .start_with(StartOptions::default().limits(limits))
        .unwrap();
    match outcome {
        RunOutcome::Complete(result) => {
            assert_eq!(result.into_output(), Value::from("out of allocations"))
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[test]
fn allocation_counter_spans_the_whole_run() {
    // Unlike steps, allocations accumulate across suspensions.
    let code = "\na = [1]\nb = f()\nc = [2]\nc\n";
    let m = Monty::builder(code)
        .external_functions(["f"])
        .build()
        .unwrap();

    // Generous ceiling: both halves fit.
    let limits = ResourceLimits::unlimited().with_max_allocations(10);
    let outcome = m
        .start_with(StartOptions::default().limits(limits))
        .unwrap();
    let progress = match outcome {
        RunOutcome::Snapshot(p) => p,
        other => panic!("expected suspension, got {other:?}"),
    };
    let result = progress.resume_return(Value::None).unwrap();
    assert!(matches!(result, RunOutcome::Complete(_)));

    // A ceiling of one is spent before the suspension, so the second list
    // cannot allocate after resume.
    let limits = ResourceLimits::unlimited().with_max_allocations(1);
    let progress = match m.start_with(StartOptions::default().limits(limits)).unwrap() {
        RunOutcome::Snapshot(p) => p,
        other => panic!("expected suspension, got {other:?}"),
    };
    let err = progress.resume_return(Value::None).unwrap_err();
    match err {
        MontyError::Fault(fault) => {
            assert_eq!(fault.exception().class(), ExcType::MemoryError)
        }
        other => panic!("expected fault, got {other:?}"),
    }
}

#[test]
fn unlimited_by_default() {
    let code = "\nitems = []\ni = 0\nwhile i < 500:\n    items.append([i])\n    i = i + 1\nlen(items)\n";
    let m = Monty::new(code).unwrap();
    let outcome = m.start().unwrap();
    match outcome {
        RunOutcome::Complete(result) => assert_eq!(result.into_output(), Value::Int(500)),
        other => panic!("expected completion, got {other:?}"),
    }
}
