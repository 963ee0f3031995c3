// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::only_kwargs;
use crate::builtins::{BuiltinDef, Kwargs, Registry};
use crate::exceptions::{type_error, Result};
use crate::interpreter::Interpreter;
use crate::value::{StreamKind, Value};

pub fn register(m: &mut Registry) {
    m.insert("print", BuiltinDef { name: "print", fcn: print });
}

/// `print(*args, sep=' ', end='\n', file=sys.stdout)`.
///
/// Every argument text, separator, and terminator is a separate callback
/// invocation, so a host harness observes the exact tokenization.
fn print(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    only_kwargs("print", kwargs, &["sep", "end", "file"])?;
    let sep = match kwargs.get("sep") {
        None | Some(Value::None) => " ".to_string(),
        Some(Value::Str(s)) => s.to_string(),
        Some(other) => {
            return Err(type_error(format!(
                "sep must be None or a string, not {}",
                other.type_name()
            )))
        }
    };
    let end = match kwargs.get("end") {
        None | Some(Value::None) => "\n".to_string(),
        Some(Value::Str(s)) => s.to_string(),
        Some(other) => {
            return Err(type_error(format!(
                "end must be None or a string, not {}",
                other.type_name()
            )))
        }
    };
    let stream = match kwargs.get("file") {
        None | Some(Value::None) | Some(Value::TextStream(StreamKind::Stdout)) => "stdout",
        Some(Value::TextStream(StreamKind::Stderr)) => "stderr",
        Some(other) => {
            return Err(type_error(format!(
                "'{}' object has no attribute 'write'",
                other.type_name()
            )))
        }
    };
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            vm.print.emit(stream, &sep);
        }
        let text = arg.str_value();
        vm.print.emit(stream, &text);
    }
    vm.print.emit(stream, &end);
    Ok(Value::None)
}
