// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The host interface: sessions, snapshots, results, and the fault
//! wrapper.

use crate::compiler::{Compiler, Program};
use crate::exceptions::{Exc, ExcType, ExceptionValue};
use crate::interpreter::{Interpreter, Outcome, PendingCall, PrintCallback, PrintTarget};
use crate::lexer::Source;
use crate::limits::{ResourceLimits, ResourceTracker};
use crate::parser::Parser;
use crate::value::Value;
use crate::Rc;

use core::cell::RefCell;
use core::fmt;

use indexmap::IndexMap;

/// Host-facing failure of a session operation.
///
/// The first two variants are host-API misuse, surfaced synchronously
/// with fixed messages and never wrapping a script exception. `Fault`
/// carries an uncaught script exception.
#[derive(Debug, thiserror::Error)]
pub enum MontyError {
    /// Invalid arguments to a session API, e.g. bad `resume` arguments.
    #[error("{0}")]
    Type(String),
    /// Invalid session state, e.g. resuming a consumed snapshot.
    #[error("{0}")]
    Runtime(String),
    /// An uncaught script exception.
    #[error(transparent)]
    Fault(#[from] MontyRuntimeError),
}

/// Wrapper for script exceptions that escape `start`/`resume`; the inner
/// instance is preserved intact.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{exc}")]
pub struct MontyRuntimeError {
    exc: Exc,
}

impl MontyRuntimeError {
    pub(crate) fn new(exc: Exc) -> Self {
        Self { exc }
    }

    /// The underlying exception instance: class, args, traceback.
    pub fn exception(&self) -> &ExceptionValue {
        &self.exc
    }

    /// The source-language style traceback rendering.
    pub fn traceback(&self) -> String {
        self.exc.format_traceback()
    }
}

/// A sandboxed script session bound to one source text.
///
/// A session may be started any number of times; every `start` evaluates
/// from fresh state.
///
/// ```
/// # use monty::{Monty, RunOutcome};
/// # fn main() -> Result<(), monty::MontyError> {
/// let m = Monty::new("1 + 2")?;
/// match m.start()? {
///     RunOutcome::Complete(result) => assert_eq!(result.output().repr_str(), "3"),
///     RunOutcome::Snapshot(_) => unreachable!("no external functions declared"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Monty {
    program: Rc<Program>,
    script_name: Rc<str>,
    inputs: Vec<String>,
    external_functions: Vec<String>,
    env: Rc<IndexMap<String, String>>,
}

/// Configures and builds a [`Monty`] session.
pub struct MontyBuilder {
    code: String,
    script_name: String,
    inputs: Vec<String>,
    external_functions: Vec<String>,
    env: IndexMap<String, String>,
}

impl MontyBuilder {
    /// The name decorating traceback frames and snapshot descriptions.
    pub fn script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = name.into();
        self
    }

    /// Names bound in the module scope from the values passed to `start`.
    pub fn inputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = names.into_iter().map(Into::into).collect();
        self
    }

    /// Names whose calls suspend the evaluator and hand control to the
    /// host.
    pub fn external_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.external_functions = names.into_iter().map(Into::into).collect();
        self
    }

    /// The sandboxed environment map backing `os.getenv`.
    pub fn env(mut self, env: IndexMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Parses and compiles the source. Syntax errors surface here, before
    /// any evaluation.
    pub fn build(self) -> Result<Monty, MontyError> {
        let source = Source::from_contents(self.script_name.clone(), self.code)
            .map_err(fault_from_error)?;
        let stmts = Parser::new(&source)
            .and_then(|mut p| p.parse_module())
            .map_err(fault_from_error)?;
        let program = Compiler::new(source, &self.script_name)
            .compile_module(&stmts)
            .map_err(fault_from_error)?;
        Ok(Monty {
            program: Rc::new(program),
            script_name: Rc::from(self.script_name.as_str()),
            inputs: self.inputs,
            external_functions: self.external_functions,
            env: Rc::new(self.env),
        })
    }
}

fn fault_from_error(err: crate::exceptions::Raised) -> MontyError {
    MontyError::Fault(MontyRuntimeError::new(err.into_exc()))
}

/// Options for one `start` invocation.
#[derive(Default)]
pub struct StartOptions {
    /// Values for the session's declared input names. Unknown names are
    /// ignored.
    pub inputs: IndexMap<String, Value>,
    pub limits: ResourceLimits,
    pub print_callback: Option<PrintCallback>,
}

impl StartOptions {
    pub fn inputs(mut self, inputs: IndexMap<String, Value>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn print_callback(mut self, callback: PrintCallback) -> Self {
        self.print_callback = Some(callback);
        self
    }
}

/// Terminal state of a `start`/`resume` invocation.
#[derive(Debug)]
pub enum RunOutcome {
    Complete(MontyComplete),
    Snapshot(MontySnapshot),
}

impl RunOutcome {
    /// The completed output, if evaluation ran to completion.
    pub fn output(&self) -> Option<&Value> {
        match self {
            RunOutcome::Complete(complete) => Some(complete.output()),
            RunOutcome::Snapshot(_) => None,
        }
    }

    pub fn snapshot(self) -> Option<MontySnapshot> {
        match self {
            RunOutcome::Snapshot(snapshot) => Some(snapshot),
            RunOutcome::Complete(_) => None,
        }
    }
}

/// A finished evaluation: the value of the last top-level expression
/// statement, else `None`.
pub struct MontyComplete {
    output: Value,
}

impl MontyComplete {
    pub fn output(&self) -> &Value {
        &self.output
    }

    pub fn into_output(self) -> Value {
        self.output
    }
}

impl fmt::Debug for MontyComplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MontyComplete(output={})", self.output.repr_str())
    }
}

impl fmt::Display for MontyComplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Arguments to [`MontySnapshot::resume`]: exactly one of `return_value`
/// or `exception`.
#[derive(Default)]
pub struct ResumeWith {
    pub return_value: Option<Value>,
    pub exception: Option<Exc>,
}

impl ResumeWith {
    pub fn return_value(value: impl Into<Value>) -> Self {
        Self {
            return_value: Some(value.into()),
            exception: None,
        }
    }

    pub fn exception(exc: Exc) -> Self {
        Self {
            return_value: None,
            exception: Some(exc),
        }
    }
}

/// A single-use continuation paused at an external-function call.
///
/// Describes the pending call (callee name, evaluated positional and
/// keyword arguments) and resumes exactly once; any further resume fails
/// with `RuntimeError` semantics.
pub struct MontySnapshot {
    script_name: Rc<str>,
    call: PendingCall,
    state: RefCell<Option<Interpreter>>,
}

impl MontySnapshot {
    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn function_name(&self) -> &str {
        &self.call.function
    }

    /// Evaluated positional arguments, in source order.
    pub fn args(&self) -> &[Value] {
        &self.call.args
    }

    /// Evaluated keyword arguments, in source order.
    pub fn kwargs(&self) -> &IndexMap<String, Value> {
        &self.call.kwargs
    }

    /// Continues evaluation with either the call's return value or an
    /// exception raised at the call site.
    pub fn resume(&self, with: ResumeWith) -> Result<RunOutcome, MontyError> {
        let state = match (with.return_value, with.exception) {
            (Some(value), None) => Resume::Value(value),
            (None, Some(exc)) => Resume::Exception(exc),
            _ => {
                return Err(MontyError::Type(
                    "resume() accepts either return_value or exception, not both".to_string(),
                ))
            }
        };
        let mut interpreter = self
            .state
            .borrow_mut()
            .take()
            .ok_or_else(|| MontyError::Runtime("Progress already resumed".to_string()))?;
        let outcome = match state {
            Resume::Value(value) => interpreter.resume_value(value),
            Resume::Exception(exc) => interpreter.resume_exception(exc),
        };
        finish(self.script_name.clone(), interpreter, outcome)
    }

    /// Shorthand for resuming with a return value.
    pub fn resume_return(&self, value: impl Into<Value>) -> Result<RunOutcome, MontyError> {
        self.resume(ResumeWith::return_value(value))
    }

    /// Shorthand for resuming with an exception.
    pub fn resume_raise(&self, class: ExcType, args: Vec<Value>) -> Result<RunOutcome, MontyError> {
        self.resume(ResumeWith::exception(ExceptionValue::new(class, args)))
    }
}

enum Resume {
    Value(Value),
    Exception(Exc),
}

impl fmt::Debug for MontySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MontySnapshot(script_name='{}', function_name='{}', args={}, kwargs={})",
            self.script_name,
            self.call.function,
            Value::new_tuple(self.call.args.clone()).repr_str(),
            kwargs_repr(&self.call.kwargs),
        )
    }
}

impl fmt::Display for MontySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn kwargs_repr(kwargs: &IndexMap<String, Value>) -> String {
    let parts: Vec<String> = kwargs
        .iter()
        .map(|(k, v)| {
            format!(
                "{}: {}",
                crate::value::repr_string(k),
                v.repr_str()
            )
        })
        .collect();
    format!("{{{}}}", parts.join(", "))
}

impl Monty {
    /// Builds a session with default settings: script name `main.py`, no
    /// inputs, no external functions.
    pub fn new(code: impl Into<String>) -> Result<Monty, MontyError> {
        Monty::builder(code).build()
    }

    pub fn builder(code: impl Into<String>) -> MontyBuilder {
        MontyBuilder {
            code: code.into(),
            script_name: "main.py".to_string(),
            inputs: vec![],
            external_functions: vec![],
            env: IndexMap::new(),
        }
    }

    /// Runs the script until it completes, suspends at an external call,
    /// or faults.
    pub fn start(&self) -> Result<RunOutcome, MontyError> {
        self.start_with(StartOptions::default())
    }

    pub fn start_with(&self, options: StartOptions) -> Result<RunOutcome, MontyError> {
        let print = match options.print_callback {
            Some(callback) => PrintTarget::Callback(callback),
            None => PrintTarget::Standard,
        };
        let mut interpreter = Interpreter::new(
            self.program.clone(),
            ResourceTracker::new(options.limits),
            print,
            self.env.clone(),
        );
        for name in &self.external_functions {
            interpreter.bind_global(name, Value::ExternalFunction(Rc::from(name.as_str())));
        }
        // Only declared input names are bound; unknown keys are ignored.
        for name in &self.inputs {
            if let Some(value) = options.inputs.get(name) {
                interpreter.bind_global(name, value.clone());
            }
        }
        let outcome = interpreter.run();
        finish(self.script_name.clone(), interpreter, outcome)
    }
}

fn finish(
    script_name: Rc<str>,
    interpreter: Interpreter,
    outcome: Result<Outcome, Exc>,
) -> Result<RunOutcome, MontyError> {
    match outcome {
        Ok(Outcome::Complete(output)) => Ok(RunOutcome::Complete(MontyComplete { output })),
        Ok(Outcome::Suspended(call)) => Ok(RunOutcome::Snapshot(MontySnapshot {
            script_name,
            call,
            state: RefCell::new(Some(interpreter)),
        })),
        Err(exc) => Err(MontyError::Fault(MontyRuntimeError::new(exc))),
    }
}

/// Builds an exception instance for `resume(exception=..)` and tests.
pub fn exception(class: ExcType, args: Vec<Value>) -> Exc {
    ExceptionValue::new(class, args)
}

/// Builds an exception with a single string message.
pub fn exception_with_message(class: ExcType, msg: impl Into<String>) -> Exc {
    ExceptionValue::with_message(class, msg)
}
