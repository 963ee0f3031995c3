// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::value::Value;
use crate::Rc;

use core::cell::{Cell, RefCell};
use core::fmt;

use lazy_static::lazy_static;

/// Class tags of the built-in exception hierarchy.
///
/// The hierarchy is a fixed tree rooted at [`ExcType::BaseException`];
/// `isinstance` style matching walks precomputed ancestor bitsets rather
/// than the tree itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ExcType {
    BaseException,
    SystemExit,
    KeyboardInterrupt,
    Exception,
    ArithmeticError,
    OverflowError,
    ZeroDivisionError,
    LookupError,
    IndexError,
    KeyError,
    RuntimeError,
    NotImplementedError,
    RecursionError,
    AttributeError,
    AssertionError,
    MemoryError,
    NameError,
    SyntaxError,
    OSError,
    TimeoutError,
    ImportError,
    ModuleNotFoundError,
    TypeError,
    ValueError,
    StopIteration,
}

const EXC_TYPE_COUNT: usize = 25;

const ALL_EXC_TYPES: [ExcType; EXC_TYPE_COUNT] = [
    ExcType::BaseException,
    ExcType::SystemExit,
    ExcType::KeyboardInterrupt,
    ExcType::Exception,
    ExcType::ArithmeticError,
    ExcType::OverflowError,
    ExcType::ZeroDivisionError,
    ExcType::LookupError,
    ExcType::IndexError,
    ExcType::KeyError,
    ExcType::RuntimeError,
    ExcType::NotImplementedError,
    ExcType::RecursionError,
    ExcType::AttributeError,
    ExcType::AssertionError,
    ExcType::MemoryError,
    ExcType::NameError,
    ExcType::SyntaxError,
    ExcType::OSError,
    ExcType::TimeoutError,
    ExcType::ImportError,
    ExcType::ModuleNotFoundError,
    ExcType::TypeError,
    ExcType::ValueError,
    ExcType::StopIteration,
];

lazy_static! {
    // ANCESTORS[t] has bit p set iff p is t or an ancestor of t.
    static ref ANCESTORS: [u32; EXC_TYPE_COUNT] = {
        let mut masks = [0u32; EXC_TYPE_COUNT];
        for t in ALL_EXC_TYPES {
            let mut mask = 0u32;
            let mut cur = Some(t);
            while let Some(c) = cur {
                mask |= 1 << (c as u32);
                cur = c.parent();
            }
            masks[t as usize] = mask;
        }
        masks
    };
}

impl ExcType {
    /// Immediate superclass, `None` only for `BaseException`.
    pub const fn parent(self) -> Option<ExcType> {
        use ExcType::*;
        Some(match self {
            BaseException => return None,
            SystemExit | KeyboardInterrupt | Exception => BaseException,
            ArithmeticError | LookupError | RuntimeError | AttributeError | AssertionError
            | MemoryError | NameError | SyntaxError | OSError | ImportError | TypeError
            | ValueError | StopIteration => Exception,
            OverflowError | ZeroDivisionError => ArithmeticError,
            IndexError | KeyError => LookupError,
            NotImplementedError | RecursionError => RuntimeError,
            TimeoutError | ModuleNotFoundError => OSError,
        })
    }

    pub fn is_subtype_of(self, other: ExcType) -> bool {
        ANCESTORS[self as usize] & (1 << (other as u32)) != 0
    }

    pub const fn name(self) -> &'static str {
        use ExcType::*;
        match self {
            BaseException => "BaseException",
            SystemExit => "SystemExit",
            KeyboardInterrupt => "KeyboardInterrupt",
            Exception => "Exception",
            ArithmeticError => "ArithmeticError",
            OverflowError => "OverflowError",
            ZeroDivisionError => "ZeroDivisionError",
            LookupError => "LookupError",
            IndexError => "IndexError",
            KeyError => "KeyError",
            RuntimeError => "RuntimeError",
            NotImplementedError => "NotImplementedError",
            RecursionError => "RecursionError",
            AttributeError => "AttributeError",
            AssertionError => "AssertionError",
            MemoryError => "MemoryError",
            NameError => "NameError",
            SyntaxError => "SyntaxError",
            OSError => "OSError",
            TimeoutError => "TimeoutError",
            ImportError => "ImportError",
            ModuleNotFoundError => "ModuleNotFoundError",
            TypeError => "TypeError",
            ValueError => "ValueError",
            StopIteration => "StopIteration",
        }
    }

    pub fn from_name(name: &str) -> Option<ExcType> {
        ALL_EXC_TYPES.iter().copied().find(|t| t.name() == name)
    }

    pub const fn all() -> &'static [ExcType] {
        &ALL_EXC_TYPES
    }
}

/// One entry of an exception's traceback, innermost last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracebackFrame {
    pub script: Rc<str>,
    pub line: u32,
    /// Trimmed text of the source line, used when rendering the traceback.
    pub text: String,
}

/// A raised (or raisable) exception instance.
///
/// `cause`/`context`/`traceback` use interior mutability: frames are
/// appended while the exception unwinds and the chain pointers are filled
/// in at raise time. Once the exception has been caught they are no longer
/// touched.
#[derive(Debug)]
pub struct ExceptionValue {
    class: ExcType,
    args: Rc<[Value]>,
    cause: RefCell<Option<Exc>>,
    context: RefCell<Option<Exc>>,
    suppress_context: Cell<bool>,
    traceback: RefCell<Vec<TracebackFrame>>,
}

pub type Exc = Rc<ExceptionValue>;

impl ExceptionValue {
    pub fn new(class: ExcType, args: Vec<Value>) -> Exc {
        Rc::new(ExceptionValue {
            class,
            args: args.into(),
            cause: RefCell::new(None),
            context: RefCell::new(None),
            suppress_context: Cell::new(false),
            traceback: RefCell::new(Vec::new()),
        })
    }

    pub fn with_message(class: ExcType, msg: impl Into<String>) -> Exc {
        Self::new(class, vec![Value::from(msg.into())])
    }

    pub const fn class(&self) -> ExcType {
        self.class
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn args_tuple(&self) -> Value {
        Value::Tuple(self.args.clone())
    }

    pub fn cause(&self) -> Option<Exc> {
        self.cause.borrow().clone()
    }

    pub fn context(&self) -> Option<Exc> {
        self.context.borrow().clone()
    }

    pub fn set_cause(&self, cause: Option<Exc>) {
        *self.cause.borrow_mut() = cause;
    }

    pub fn set_context(&self, context: Exc) {
        if self.suppress_context.get() {
            return;
        }
        let mut slot = self.context.borrow_mut();
        if slot.is_none() {
            *slot = Some(context);
        }
    }

    /// `raise X from None`: implicit context is neither recorded nor
    /// rendered.
    pub fn suppress_context(&self) {
        self.suppress_context.set(true);
        *self.context.borrow_mut() = None;
    }

    pub fn traceback(&self) -> Vec<TracebackFrame> {
        self.traceback.borrow().clone()
    }

    pub fn push_frame(&self, frame: TracebackFrame) {
        let mut tb = self.traceback.borrow_mut();
        if tb.last() != Some(&frame) {
            tb.push(frame);
        }
    }

    pub fn has_traceback(&self) -> bool {
        !self.traceback.borrow().is_empty()
    }

    /// The exception's message: `str(args[0])` for a single argument,
    /// the argument tuple rendering otherwise. `KeyError` shows the repr
    /// of the missing key, like the source language.
    pub fn message(&self) -> String {
        match &*self.args {
            [] => String::new(),
            [Value::Str(s)] if self.class != ExcType::KeyError => s.to_string(),
            [v] => v.repr_str(),
            args => {
                let parts: Vec<String> = args.iter().map(Value::repr_str).collect();
                format!("({})", parts.join(", "))
            }
        }
    }

    /// Renders `Traceback (most recent call last): ...` like the source
    /// language does, innermost frame last.
    pub fn format_traceback(&self) -> String {
        let mut out = String::new();
        if let Some(context) = self.context() {
            if self.cause().is_none() {
                out.push_str(&context.format_traceback());
                out.push_str(
                    "\nDuring handling of the above exception, another exception occurred:\n\n",
                );
            }
        }
        if let Some(cause) = self.cause() {
            out.push_str(&cause.format_traceback());
            out.push_str("\nThe above exception was the direct cause of the following exception:\n\n");
        }
        out.push_str("Traceback (most recent call last):\n");
        for frame in self.traceback.borrow().iter() {
            out.push_str(&format!(
                "  File \"{}\", line {}, in <module>\n",
                frame.script, frame.line
            ));
            if !frame.text.is_empty() {
                out.push_str(&format!("    {}\n", frame.text));
            }
        }
        out.push_str(&self.to_string());
        out
    }
}

impl fmt::Display for ExceptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = self.message();
        if msg.is_empty() {
            write!(f, "{}", self.class.name())
        } else {
            write!(f, "{}: {}", self.class.name(), msg)
        }
    }
}

/// Script-level exception in flight.
///
/// Evaluator, parser, and builtin `Result`s all carry `Raised`; the
/// engine's handler machinery and the host boundary unwrap it back into
/// the instance. Exception payloads are session-local `Rc` values, so
/// this deliberately is not a `Send` error type.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct Raised(pub Exc);

impl Raised {
    pub fn class(&self) -> ExcType {
        self.0.class()
    }

    pub fn message(&self) -> String {
        self.0.message()
    }

    pub fn into_exc(self) -> Exc {
        self.0
    }
}

/// The evaluator-wide result type. The error parameter is overridable so
/// the alias composes with `fmt::Error` and host error types.
pub type Result<T, E = Raised> = core::result::Result<T, E>;

/// Raise a fresh exception of `class` with a string message.
pub fn raise(class: ExcType, msg: impl Into<String>) -> Raised {
    Raised(ExceptionValue::with_message(class, msg))
}

/// Raise an existing exception instance.
pub fn raise_exc(exc: Exc) -> Raised {
    Raised(exc)
}

/// Shorthands used throughout the evaluator and builtins.
pub fn type_error(msg: impl Into<String>) -> Raised {
    raise(ExcType::TypeError, msg)
}

pub fn value_error(msg: impl Into<String>) -> Raised {
    raise(ExcType::ValueError, msg)
}

pub fn name_error(name: &str) -> Raised {
    raise(ExcType::NameError, format!("name '{name}' is not defined"))
}

pub fn attribute_error(type_name: &str, attr: &str) -> Raised {
    raise(
        ExcType::AttributeError,
        format!("'{type_name}' object has no attribute '{attr}'"),
    )
}

pub fn not_iterable(type_name: &str) -> Raised {
    type_error(format!("'{type_name}' object is not iterable"))
}

pub fn not_callable(type_name: &str) -> Raised {
    type_error(format!("'{type_name}' object is not callable"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_ancestors() {
        assert!(ExcType::ZeroDivisionError.is_subtype_of(ExcType::ArithmeticError));
        assert!(ExcType::ZeroDivisionError.is_subtype_of(ExcType::Exception));
        assert!(ExcType::ZeroDivisionError.is_subtype_of(ExcType::BaseException));
        assert!(!ExcType::ZeroDivisionError.is_subtype_of(ExcType::LookupError));

        assert!(ExcType::KeyError.is_subtype_of(ExcType::LookupError));
        assert!(ExcType::RecursionError.is_subtype_of(ExcType::RuntimeError));
        assert!(ExcType::TimeoutError.is_subtype_of(ExcType::OSError));
        assert!(ExcType::ModuleNotFoundError.is_subtype_of(ExcType::OSError));

        assert!(!ExcType::SystemExit.is_subtype_of(ExcType::Exception));
        assert!(ExcType::SystemExit.is_subtype_of(ExcType::BaseException));

        assert!(ExcType::ValueError.is_subtype_of(ExcType::ValueError));
    }

    #[test]
    fn names_round_trip() {
        for t in ExcType::all() {
            assert_eq!(ExcType::from_name(t.name()), Some(*t));
        }
        assert_eq!(ExcType::from_name("FooError"), None);
    }

    #[test]
    fn message_forms() {
        let e = ExceptionValue::with_message(ExcType::ValueError, "bad value");
        assert_eq!(e.to_string(), "ValueError: bad value");

        let e = ExceptionValue::new(ExcType::TypeError, vec![]);
        assert_eq!(e.to_string(), "TypeError");

        let e = ExceptionValue::new(
            ExcType::OSError,
            vec![Value::Int(2), Value::from("No such file")],
        );
        assert_eq!(e.to_string(), "OSError: (2, 'No such file')");
    }
}
