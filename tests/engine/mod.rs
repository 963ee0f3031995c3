// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use monty::{
    exception_with_message, ExcType, Monty, MontyError, MontySnapshot, ResourceLimits,
    ResumeWith, RunOutcome, StartOptions, Value,
};

fn complete(outcome: RunOutcome) -> Value {
    match outcome {
        RunOutcome::Complete(c) => c.into_output(),
        RunOutcome::Snapshot(s) => panic!("expected completion, suspended at {s:?}"),
    }
}

fn snapshot(outcome: RunOutcome) -> MontySnapshot {
    match outcome {
        RunOutcome::Snapshot(s) => s,
        RunOutcome::Complete(c) => panic!("expected suspension, completed with {c:?}"),
    }
}

#[test]
fn start_no_external_functions_returns_complete() {
    let m = Monty::new("1 + 2").unwrap();
    assert_eq!(complete(m.start().unwrap()), Value::Int(3));
}

#[test]
fn start_with_external_function_returns_snapshot() {
    let m = Monty::builder("func()")
        .external_functions(["func"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());
    assert_eq!(progress.script_name(), "main.py");
    assert_eq!(progress.function_name(), "func");
    assert!(progress.args().is_empty());
    assert!(progress.kwargs().is_empty());
}

#[test]
fn start_custom_script_name() {
    let m = Monty::builder("func()")
        .script_name("custom.py")
        .external_functions(["func"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());
    assert_eq!(progress.script_name(), "custom.py");
}

#[test]
fn start_snapshot_resume_returns_complete() {
    let m = Monty::builder("func()")
        .external_functions(["func"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());
    let result = progress.resume(ResumeWith::return_value(42)).unwrap();
    assert_eq!(complete(result), Value::Int(42));
}

#[test]
fn start_snapshot_with_args() {
    let m = Monty::builder("func(1, 2, 3)")
        .external_functions(["func"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());
    assert_eq!(
        progress.args(),
        &[Value::Int(1), Value::Int(2), Value::Int(3)]
    );
    assert!(progress.kwargs().is_empty());
}

#[test]
fn start_snapshot_with_kwargs() {
    let m = Monty::builder("func(a=1, b=\"two\")")
        .external_functions(["func"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());
    assert!(progress.args().is_empty());
    assert_eq!(progress.kwargs().get("a"), Some(&Value::Int(1)));
    assert_eq!(progress.kwargs().get("b"), Some(&Value::from("two")));
    let keys: Vec<&String> = progress.kwargs().keys().collect();
    assert_eq!(keys, ["a", "b"]);
}

#[test]
fn start_snapshot_with_mixed_args_kwargs() {
    let m = Monty::builder("func(1, 2, x=\"hello\", y=True)")
        .external_functions(["func"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());
    assert_eq!(progress.args(), &[Value::Int(1), Value::Int(2)]);
    assert_eq!(progress.kwargs().get("x"), Some(&Value::from("hello")));
    assert_eq!(progress.kwargs().get("y"), Some(&Value::Bool(true)));
}

#[test]
fn start_multiple_external_calls() {
    let m = Monty::builder("a() + b()")
        .external_functions(["a", "b"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());
    assert_eq!(progress.function_name(), "a");

    let progress = snapshot(progress.resume(ResumeWith::return_value(10)).unwrap());
    assert_eq!(progress.function_name(), "b");

    let result = complete(progress.resume(ResumeWith::return_value(5)).unwrap());
    assert_eq!(result, Value::Int(15));
}

#[test]
fn start_chain_of_external_calls() {
    let m = Monty::builder("c() + c() + c()")
        .external_functions(["c"])
        .build()
        .unwrap();
    let mut call_count = 0i64;
    let mut outcome = m.start().unwrap();
    loop {
        match outcome {
            RunOutcome::Snapshot(progress) => {
                assert_eq!(progress.function_name(), "c");
                call_count += 1;
                outcome = progress.resume(ResumeWith::return_value(call_count)).unwrap();
            }
            RunOutcome::Complete(result) => {
                assert_eq!(result.into_output(), Value::Int(6));
                break;
            }
        }
    }
    assert_eq!(call_count, 3);
}

#[test]
fn start_with_inputs() {
    let m = Monty::builder("process(x)")
        .inputs(["x"])
        .external_functions(["process"])
        .build()
        .unwrap();
    let mut inputs = IndexMap::new();
    inputs.insert("x".to_string(), Value::Int(100));
    let progress = snapshot(m.start_with(StartOptions::default().inputs(inputs)).unwrap());
    assert_eq!(progress.function_name(), "process");
    assert_eq!(progress.args(), &[Value::Int(100)]);
}

#[test]
fn start_ignores_unknown_inputs() {
    let m = Monty::builder("1 + 2").inputs(["x"]).build().unwrap();
    let mut inputs = IndexMap::new();
    inputs.insert("x".to_string(), Value::Int(1));
    inputs.insert("unknown".to_string(), Value::Int(2));
    let result = complete(m.start_with(StartOptions::default().inputs(inputs)).unwrap());
    assert_eq!(result, Value::Int(3));
}

#[test]
fn start_with_limits() {
    let m = Monty::new("1 + 2").unwrap();
    let limits = ResourceLimits::unlimited().with_max_allocations(1000);
    let result = complete(m.start_with(StartOptions::default().limits(limits)).unwrap());
    assert_eq!(result, Value::Int(3));
}

#[test]
fn start_with_print_callback() {
    let output: Rc<RefCell<Vec<(String, String)>>> = Rc::new(RefCell::new(vec![]));
    let sink = output.clone();

    let m = Monty::new("print(\"hello\")").unwrap();
    let options = StartOptions::default().print_callback(Box::new(move |stream, text| {
        sink.borrow_mut().push((stream.to_string(), text.to_string()));
    }));
    let result = complete(m.start_with(options).unwrap());
    assert_eq!(result, Value::None);
    assert_eq!(
        *output.borrow(),
        vec![
            ("stdout".to_string(), "hello".to_string()),
            ("stdout".to_string(), "\n".to_string())
        ]
    );
}

#[test]
fn print_tokenization_with_two_arguments() {
    let output: Rc<RefCell<Vec<(String, String)>>> = Rc::new(RefCell::new(vec![]));
    let sink = output.clone();

    let m = Monty::new("print(1, 2)").unwrap();
    let options = StartOptions::default().print_callback(Box::new(move |stream, text| {
        sink.borrow_mut().push((stream.to_string(), text.to_string()));
    }));
    complete(m.start_with(options).unwrap());
    let expected: Vec<(String, String)> = [("stdout", "1"), ("stdout", " "), ("stdout", "2"), ("stdout", "\n")]
        .iter()
        .map(|(s, t)| (s.to_string(), t.to_string()))
        .collect();
    assert_eq!(*output.borrow(), expected);
}

#[test]
fn resume_cannot_be_called_twice() {
    let m = Monty::builder("func()")
        .external_functions(["func"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());

    progress.resume(ResumeWith::return_value(1)).unwrap();

    let err = progress.resume(ResumeWith::return_value(2)).unwrap_err();
    match err {
        MontyError::Runtime(msg) => assert_eq!(msg, "Progress already resumed"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn resume_complex_return_value() {
    let m = Monty::builder("func()")
        .external_functions(["func"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());
    let value = Value::from_json_str(r#"{"a": [1, 2, 3], "b": {"nested": true}}"#).unwrap();
    let result = complete(progress.resume(ResumeWith::return_value(value.clone())).unwrap());
    assert_eq!(result, value);
}

#[test]
fn resume_with_none() {
    let m = Monty::builder("func()")
        .external_functions(["func"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());
    let result = complete(progress.resume(ResumeWith::return_value(Value::None)).unwrap());
    assert_eq!(result, Value::None);
}

#[test]
fn invalid_resume_args() {
    let m = Monty::builder("func()")
        .external_functions(["func"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());

    // Neither argument.
    let err = progress.resume(ResumeWith::default()).unwrap_err();
    match err {
        MontyError::Type(msg) => {
            assert_eq!(msg, "resume() accepts either return_value or exception, not both")
        }
        other => panic!("unexpected error {other:?}"),
    }

    // Both arguments.
    let err = progress
        .resume(ResumeWith {
            return_value: Some(Value::Int(42)),
            exception: Some(exception_with_message(ExcType::ValueError, "error")),
        })
        .unwrap_err();
    match err {
        MontyError::Type(msg) => {
            assert_eq!(msg, "resume() accepts either return_value or exception, not both")
        }
        other => panic!("unexpected error {other:?}"),
    }

    // Invalid arguments never consume the snapshot.
    let result = complete(progress.resume(ResumeWith::return_value(7)).unwrap());
    assert_eq!(result, Value::Int(7));
}

#[test]
fn snapshot_repr() {
    let m = Monty::builder("func(1, x=2)")
        .external_functions(["func"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());
    assert_eq!(
        format!("{progress:?}"),
        "MontySnapshot(script_name='main.py', function_name='func', args=(1,), kwargs={'x': 2})"
    );
}

#[test]
fn complete_repr() {
    let m = Monty::new("42").unwrap();
    let outcome = m.start().unwrap();
    match &outcome {
        RunOutcome::Complete(result) => {
            assert_eq!(format!("{result:?}"), "MontyComplete(output=42)")
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn start_can_reuse_session() {
    let m = Monty::builder("func(x)")
        .inputs(["x"])
        .external_functions(["func"])
        .build()
        .unwrap();

    for (input, reply) in [(1i64, 10i64), (2, 20)] {
        let mut inputs = IndexMap::new();
        inputs.insert("x".to_string(), Value::Int(input));
        let progress = snapshot(m.start_with(StartOptions::default().inputs(inputs)).unwrap());
        assert_eq!(progress.args(), &[Value::Int(input)]);
        let result = complete(progress.resume(ResumeWith::return_value(reply)).unwrap());
        assert_eq!(result, Value::Int(reply));
    }
}

#[test]
fn start_is_pure_across_invocations() {
    let m = Monty::new("[x * x for x in range(4)]").unwrap();
    let first = complete(m.start().unwrap());
    let second = complete(m.start().unwrap());
    assert_eq!(first, second);
    assert_eq!(first.repr_str(), "[0, 1, 4, 9]");
}

#[test]
fn start_returns_complete_for_various_types() {
    for (code, expected) in [
        ("1", "1"),
        ("\"hello\"", "'hello'"),
        ("[1, 2, 3]", "[1, 2, 3]"),
        ("{\"a\": 1}", "{'a': 1}"),
        ("None", "None"),
        ("True", "True"),
    ] {
        let m = Monty::new(code).unwrap();
        let result = complete(m.start().unwrap());
        assert_eq!(result.repr_str(), expected, "source: {code}");
    }
}

#[test]
fn resume_with_exception_caught() {
    let code = "\ntry:\n    result = external_func()\nexcept ValueError:\n    caught = True\ncaught\n";
    let m = Monty::builder(code)
        .external_functions(["external_func"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());
    let result = complete(
        progress
            .resume(ResumeWith::exception(exception_with_message(
                ExcType::ValueError,
                "test error",
            )))
            .unwrap(),
    );
    assert_eq!(result, Value::Bool(true));
}

#[test]
fn resume_exception_propagates_uncaught() {
    let m = Monty::builder("external_func()")
        .external_functions(["external_func"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());
    let err = progress
        .resume(ResumeWith::exception(exception_with_message(
            ExcType::ValueError,
            "uncaught error",
        )))
        .unwrap_err();
    match err {
        MontyError::Fault(fault) => {
            let inner = fault.exception();
            assert_eq!(inner.class(), ExcType::ValueError);
            assert_eq!(inner.args(), &[Value::from("uncaught error")]);
            assert!(!inner.traceback().is_empty());
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn resume_exception_matches_by_hierarchy() {
    // An exception delivered via resume is catchable iff the clause names
    // its class or an ancestor.
    let code = "\ntry:\n    f()\nexcept LookupError:\n    how = 'ancestor'\nhow\n";
    let m = Monty::builder(code)
        .external_functions(["f"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());
    let result = complete(
        progress
            .resume(ResumeWith::exception(exception_with_message(
                ExcType::KeyError,
                "missing",
            )))
            .unwrap(),
    );
    assert_eq!(result, Value::from("ancestor"));

    let progress = snapshot(m.start().unwrap());
    let err = progress
        .resume(ResumeWith::exception(exception_with_message(
            ExcType::TypeError,
            "not a lookup error",
        )))
        .unwrap_err();
    assert!(matches!(err, MontyError::Fault(_)));
}

#[test]
fn resume_exception_in_nested_try() {
    let code = "\nouter_caught = False\nfinally_ran = False\ntry:\n    try:\n        external_func()\n    except TypeError:\n        pass\n    finally:\n        finally_ran = True\nexcept ValueError:\n    outer_caught = True\n(outer_caught, finally_ran)\n";
    let m = Monty::builder(code)
        .external_functions(["external_func"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());
    let result = complete(
        progress
            .resume(ResumeWith::exception(exception_with_message(
                ExcType::ValueError,
                "propagates to outer",
            )))
            .unwrap(),
    );
    assert_eq!(result.repr_str(), "(True, True)");
}

#[test]
fn syntax_error_at_build_time() {
    let err = Monty::new("nonlocal x").unwrap_err();
    match err {
        MontyError::Fault(fault) => {
            let exc = fault.exception();
            assert_eq!(exc.class(), ExcType::SyntaxError);
            assert_eq!(
                exc.message(),
                "nonlocal declaration not allowed at module level"
            );
            assert_eq!(exc.traceback()[0].line, 1);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn uncaught_exception_has_traceback() {
    let m = Monty::builder("x = 1\nraise ValueError('boom')\n")
        .script_name("script.py")
        .build()
        .unwrap();
    let err = m.start().unwrap_err();
    match err {
        MontyError::Fault(fault) => {
            let exc = fault.exception();
            assert_eq!(exc.class(), ExcType::ValueError);
            let frames = exc.traceback();
            assert_eq!(&*frames[0].script, "script.py");
            assert_eq!(frames[0].line, 2);
            assert_eq!(frames[0].text, "raise ValueError('boom')");
            let rendered = fault.traceback();
            assert!(rendered.starts_with("Traceback (most recent call last):"));
            assert!(rendered.ends_with("ValueError: boom"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn getenv_reads_sandboxed_environment() {
    let mut env = IndexMap::new();
    env.insert("HOME".to_string(), "/home/sandbox".to_string());
    let m = Monty::builder("import os\nos.getenv('HOME')\n")
        .env(env)
        .build()
        .unwrap();
    let result = complete(m.start().unwrap());
    assert_eq!(result, Value::from("/home/sandbox"));

    let m = Monty::new("import os\nos.getenv('HOME', 'missing')\n").unwrap();
    assert_eq!(complete(m.start().unwrap()), Value::from("missing"));
}

#[test]
fn dropping_snapshot_cancels_run() {
    let m = Monty::builder("func()")
        .external_functions(["func"])
        .build()
        .unwrap();
    let progress = snapshot(m.start().unwrap());
    drop(progress);
    // The session is still usable.
    let progress = snapshot(m.start().unwrap());
    assert_eq!(progress.function_name(), "func");
}
