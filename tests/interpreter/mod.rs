// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use monty::{Monty, MontyError, RunOutcome, StartOptions, Value};
use serde::Deserialize;
use test_generator::test_resources;

/// One scripted scenario: source plus the expected terminal state.
#[derive(Deserialize)]
struct TestCase {
    note: String,
    source: String,
    /// Expected output compared structurally (json-compatible values).
    #[serde(default)]
    output: Option<Value>,
    /// Expected output compared by repr, for tuples/sets and friends.
    #[serde(default)]
    repr: Option<String>,
    /// Expected uncaught exception, rendered as `Class: message`.
    #[serde(default)]
    error: Option<String>,
    /// Expected print callback invocations, in order.
    #[serde(default)]
    prints: Option<Vec<(String, String)>>,
}

#[derive(Deserialize)]
struct TestFile {
    cases: Vec<TestCase>,
}

#[test_resources("tests/interpreter/cases/**/*.yaml")]
fn interpreter_case(resource: &str) {
    run_file(resource).unwrap();
}

fn run_file(path: &str) -> Result<()> {
    let yaml = std::fs::read_to_string(path)?;
    let file: TestFile = serde_yaml::from_str(&yaml)?;
    for case in &file.cases {
        run_case(case).with_context(|| format!("case `{}` in {path}", case.note))?;
    }
    Ok(())
}

fn run_case(case: &TestCase) -> Result<()> {
    let m = Monty::new(case.source.as_str())
        .map_err(|e| anyhow::anyhow!("build failed: {e}"))?;

    let prints: Rc<RefCell<Vec<(String, String)>>> = Rc::new(RefCell::new(vec![]));
    let sink = prints.clone();
    let options = StartOptions::default().print_callback(Box::new(move |stream, text| {
        sink.borrow_mut().push((stream.to_string(), text.to_string()));
    }));

    let outcome = m.start_with(options);
    match (&case.error, outcome) {
        (Some(expected), Err(MontyError::Fault(fault))) => {
            let rendered = fault.exception().to_string();
            if &rendered != expected {
                bail!("expected error `{expected}`, got `{rendered}`");
            }
        }
        (Some(expected), Ok(outcome)) => {
            bail!("expected error `{expected}`, but run finished with {outcome:?}")
        }
        (None, Err(e)) => bail!("unexpected fault: {e}"),
        (None, Ok(RunOutcome::Snapshot(s))) => bail!("unexpected suspension at {s:?}"),
        (None, Ok(RunOutcome::Complete(result))) => {
            if let Some(expected) = &case.output {
                if result.output() != expected {
                    bail!(
                        "expected output {}, got {}",
                        expected.repr_str(),
                        result.output().repr_str()
                    );
                }
            }
            if let Some(expected) = &case.repr {
                let actual = result.output().repr_str();
                if &actual != expected {
                    bail!("expected repr `{expected}`, got `{actual}`");
                }
            }
        }
        (Some(_), Err(other)) => bail!("expected script fault, got host error: {other}"),
    }
    if let Some(expected) = &case.prints {
        let actual = prints.borrow();
        if &*actual != expected {
            bail!("expected prints {expected:?}, got {actual:?}");
        }
    }
    Ok(())
}
