// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(unknown_lints)]
// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod ast;
mod builtins;
mod compiler;
mod engine;
mod exceptions;
mod interpreter;
mod lexer;
mod limits;
mod number;
mod parser;
mod value;

pub use engine::{
    exception, exception_with_message, Monty, MontyBuilder, MontyComplete, MontyError,
    MontyRuntimeError, MontySnapshot, ResumeWith, RunOutcome, StartOptions,
};
pub use exceptions::{Exc, ExcType, ExceptionValue, TracebackFrame};
pub use interpreter::{PrintCallback, PrintTarget};
pub use lexer::Source;
pub use limits::ResourceLimits;
pub use value::{Class, Value};

pub(crate) use std::rc::Rc;
