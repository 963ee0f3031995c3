// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{ensure_args_count, ensure_args_range, no_kwargs, only_kwargs};
use crate::builtins::{BuiltinDef, Kwargs, Registry};
use crate::exceptions::{type_error, Raised, Result};
use crate::interpreter::Interpreter;
use crate::value::{cmp_values, Value};

use core::cell::RefCell;
use core::cmp::Ordering;

pub fn register(m: &mut Registry) {
    m.insert("all", BuiltinDef { name: "all", fcn: all });
    m.insert("any", BuiltinDef { name: "any", fcn: any });
    m.insert("len", BuiltinDef { name: "len", fcn: len });
    m.insert("sorted", BuiltinDef { name: "sorted", fcn: sorted });
}

fn all(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("all", args, 1)?;
    no_kwargs("all", kwargs)?;
    let it = vm.make_iter(args[0].clone())?;
    while let Some(v) = vm.iter_next(&it)? {
        if !v.is_truthy() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn any(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("any", args, 1)?;
    no_kwargs("any", kwargs)?;
    let it = vm.make_iter(args[0].clone())?;
    while let Some(v) = vm.iter_next(&it)? {
        if v.is_truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn len(_vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("len", args, 1)?;
    no_kwargs("len", kwargs)?;
    match args[0].length() {
        Some(n) => Ok(Value::Int(n as i64)),
        None => Err(type_error(format!(
            "object of type '{}' has no len()",
            args[0].type_name()
        ))),
    }
}

fn sorted(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("sorted", args, 1, 1)?;
    only_kwargs("sorted", kwargs, &["reverse", "key"])?;
    let reverse = kwargs.get("reverse").map(Value::is_truthy).unwrap_or(false);
    let key = match kwargs.get("key") {
        None | Some(Value::None) => None,
        Some(callable @ (Value::Builtin(_) | Value::Class(_) | Value::BoundMethod(_))) => {
            Some(callable.clone())
        }
        Some(other) => {
            return Err(type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            )))
        }
    };

    let items = vm.collect_iterable(args[0].clone())?;
    let mut decorated: Vec<(Value, Value)> = Vec::with_capacity(items.len());
    for item in items {
        let k = match &key {
            Some(f) => vm.call_simple(f, vec![item.clone()])?,
            None => item.clone(),
        };
        decorated.push((k, item));
    }

    // Errors inside the comparator are stashed and re-raised after; the
    // sort itself must stay infallible.
    let failure: RefCell<Option<Raised>> = RefCell::new(None);
    decorated.sort_by(|a, b| {
        if failure.borrow().is_some() {
            return Ordering::Equal;
        }
        match cmp_values(&a.0, &b.0, 0) {
            // A reversed comparator keeps the sort stable for descending
            // order, unlike sort-then-reverse.
            Ok(ord) => {
                if reverse {
                    ord.reverse()
                } else {
                    ord
                }
            }
            Err(e) => {
                *failure.borrow_mut() = Some(e);
                Ordering::Equal
            }
        }
    });
    if let Some(e) = failure.into_inner() {
        return Err(e);
    }
    vm.tracker.allocate()?;
    Ok(Value::new_list(
        decorated.into_iter().map(|(_, v)| v).collect(),
    ))
}
