// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{ensure_args_count, no_kwargs};
use crate::builtins::{BuiltinDef, Kwargs, Registry};
use crate::exceptions::{not_callable, type_error, Result};
use crate::interpreter::Interpreter;
use crate::value::{IterValue, Value};
use crate::Rc;

use core::cell::RefCell;


pub fn register(m: &mut Registry) {
    m.insert("filter", BuiltinDef { name: "filter", fcn: filter });
}

fn filter(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    filter_impl(vm, args, kwargs)
}

/// `filter(predicate, iterable)`: lazy, but the predicate and iterable
/// are validated eagerly. Only `None` and builtin callables are accepted
/// as predicates; user-defined functions do not execute.
pub(crate) fn filter_impl(
    vm: &mut Interpreter,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_count("filter", args, 2)?;
    no_kwargs("filter", kwargs)?;
    let predicate = match &args[0] {
        Value::None => None,
        callable @ (Value::Builtin(_) | Value::Class(_) | Value::BoundMethod(_)) => {
            Some(Box::new(callable.clone()))
        }
        Value::Function(_) | Value::ExternalFunction(_) => {
            return Err(type_error(
                "filter() predicate must be None or a builtin function \
                 (user-defined functions not yet supported)",
            ))
        }
        other => return Err(not_callable(other.type_name())),
    };
    let inner = vm.make_iter(args[1].clone())?;
    vm.tracker.allocate()?;
    Ok(Value::Iterator(Rc::new(RefCell::new(IterValue::Filter {
        predicate,
        inner,
    }))))
}
