// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use monty::{ExcType, Monty, MontyError, ResourceLimits, RunOutcome, StartOptions, Value};

fn fault_class(err: MontyError) -> ExcType {
    match err {
        MontyError::Fault(fault) => fault.exception().class(),
        other => panic!("expected fault, got {other:?}"),
    }
}

#[test]
fn step_limit_faults_unbounded_loops() {
    let m = Monty::new("while True:\n    pass\n").unwrap();
    let limits = ResourceLimits::unlimited().with_max_steps(10_000);
    let err = m
        .start_with(StartOptions::default().limits(limits))
        .unwrap_err();
    match err {
        MontyError::Fault(fault) => {
            let exc = fault.exception();
            assert_eq!(exc.class(), ExcType::RuntimeError);
            assert_eq!(exc.message(), "execution step limit exceeded");
        }
        other => panic!("expected fault, got {other:?}"),
    }
}

#[test]
fn step_limit_is_script_visible() {
    let code = "\ntry:\n    while True:\n        pass\nexcept RuntimeError as e:\n    r = str(e)\nr\n";
    let m = Monty::new(code).unwrap();
    let limits = ResourceLimits::unlimited().with_max_steps(10_000);
    let outcome = m
        .start_with(StartOptions::default().limits(limits))
        .unwrap();
    match outcome {
        RunOutcome::Complete(result) => {
            assert_eq!(
                result.into_output(),
                Value::from("execution step limit exceeded")
            );
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[test]
fn step_counter_resets_per_invocation() {
    // A run that suspends partway must not carry its step spend into the
    // resumed invocation: each half fits the budget, their sum does not.
    let code = "\ni = 0\nwhile i < 50:\n    i = i + 1\nx = f()\nj = 0\nwhile j < 50:\n    j = j + 1\nj\n";
    let m = Monty::builder(code)
        .external_functions(["f"])
        .build()
        .unwrap();
    let limits = ResourceLimits::unlimited().with_max_steps(700);
    let outcome = m
        .start_with(StartOptions::default().limits(limits))
        .unwrap();
    let progress = match outcome {
        RunOutcome::Snapshot(p) => p,
        other => panic!("expected suspension, got {other:?}"),
    };
    let result = progress.resume_return(Value::None).unwrap();
    match result {
        RunOutcome::Complete(result) => assert_eq!(result.into_output(), Value::Int(50)),
        other => panic!("expected completion, got {other:?}"),
    }
}

#[test]
fn depth_limit_faults_builtin_calls() {
    let m = Monty::new("len([1])").unwrap();
    let limits = ResourceLimits::unlimited().with_max_depth(0);
    let err = m
        .start_with(StartOptions::default().limits(limits))
        .unwrap_err();
    assert_eq!(fault_class(err), ExcType::RecursionError);
}

#[test]
fn depth_limit_allows_shallow_calls() {
    // filter drives its predicate through a nested call, needing depth 2.
    let m = Monty::new("list(filter(abs, [0, 1, 2]))").unwrap();
    let limits = ResourceLimits::unlimited().with_max_depth(2);
    let outcome = m
        .start_with(StartOptions::default().limits(limits))
        .unwrap();
    match outcome {
        RunOutcome::Complete(result) => assert_eq!(result.output().repr_str(), "[1, 2]"),
        other => panic!("expected completion, got {other:?}"),
    }
}

#[test]
fn recursion_error_is_catchable() {
    let code = "\ntry:\n    print('hi')\nexcept RecursionError:\n    r = 'too deep'\nr\n";
    let m = Monty::new(code).unwrap();
    let limits = ResourceLimits::unlimited().with_max_depth(0);
    let outcome = m
        .start_with(StartOptions::default().limits(limits))
        .unwrap();
    match outcome {
        RunOutcome::Complete(result) => {
            assert_eq!(result.into_output(), Value::from("too deep"))
        }
        other => panic!("expected completion, got {other:?}"),
    }
}
