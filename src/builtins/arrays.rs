// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `list` and `tuple` method tables.

use crate::builtins::utils::{ensure_args_count, ensure_args_range, no_kwargs, only_kwargs};
use crate::builtins::{Kwargs, MethodTable};
use crate::exceptions::{raise, value_error, ExcType, Raised, Result};
use crate::interpreter::Interpreter;
use crate::value::{cmp_values, eq_values, Value};
use crate::Rc;

use core::cell::RefCell;
use core::cmp::Ordering;

use lazy_static::lazy_static;

lazy_static! {
    pub(crate) static ref LIST_METHODS: MethodTable = {
        let mut m = MethodTable::new();
        m.insert("append", append as _);
        m.insert("clear", clear as _);
        m.insert("copy", copy as _);
        m.insert("count", count as _);
        m.insert("extend", extend as _);
        m.insert("index", index as _);
        m.insert("insert", insert as _);
        m.insert("pop", pop as _);
        m.insert("remove", remove as _);
        m.insert("reverse", reverse as _);
        m.insert("sort", sort as _);
        m
    };
    pub(crate) static ref TUPLE_METHODS: MethodTable = {
        let mut m = MethodTable::new();
        m.insert("count", tuple_count as _);
        m.insert("index", tuple_index as _);
        m
    };
}

fn recv_list(recv: &Value) -> &Rc<RefCell<Vec<Value>>> {
    match recv {
        Value::List(list) => list,
        other => unreachable!("list method on {other:?}"),
    }
}

fn append(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("append", args, 1)?;
    no_kwargs("append", kwargs)?;
    recv_list(recv).borrow_mut().push(args[0].clone());
    Ok(Value::None)
}

fn extend(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("extend", args, 1)?;
    no_kwargs("extend", kwargs)?;
    let items = vm.collect_iterable(args[0].clone())?;
    recv_list(recv).borrow_mut().extend(items);
    Ok(Value::None)
}

fn insert(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("insert", args, 2)?;
    no_kwargs("insert", kwargs)?;
    let list = recv_list(recv);
    let len = list.borrow().len() as i64;
    let mut at = crate::builtins::utils::ensure_int(&args[0])?;
    if at < 0 {
        at += len;
    }
    let at = at.clamp(0, len) as usize;
    list.borrow_mut().insert(at, args[1].clone());
    Ok(Value::None)
}

fn pop(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("pop", args, 0, 1)?;
    no_kwargs("pop", kwargs)?;
    let list = recv_list(recv);
    let len = list.borrow().len() as i64;
    if len == 0 {
        return Err(raise(ExcType::IndexError, "pop from empty list"));
    }
    let mut at = match args.first() {
        Some(v) => crate::builtins::utils::ensure_int(v)?,
        None => len - 1,
    };
    if at < 0 {
        at += len;
    }
    if at < 0 || at >= len {
        return Err(raise(ExcType::IndexError, "pop index out of range"));
    }
    Ok(list.borrow_mut().remove(at as usize))
}

fn remove(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("remove", args, 1)?;
    no_kwargs("remove", kwargs)?;
    let list = recv_list(recv);
    let at = {
        let items = list.borrow();
        let mut found = None;
        for (i, item) in items.iter().enumerate() {
            if eq_values(item, &args[0], 0)? {
                found = Some(i);
                break;
            }
        }
        found
    };
    match at {
        Some(i) => {
            list.borrow_mut().remove(i);
            Ok(Value::None)
        }
        None => Err(value_error("list.remove(x): x not in list")),
    }
}

fn clear(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("clear", args, 0)?;
    no_kwargs("clear", kwargs)?;
    recv_list(recv).borrow_mut().clear();
    Ok(Value::None)
}

fn seq_index(items: &[Value], target: &Value, what: &str) -> Result<Value> {
    for (i, item) in items.iter().enumerate() {
        if eq_values(item, target, 0)? {
            return Ok(Value::Int(i as i64));
        }
    }
    Err(value_error(match what {
        "list" => format!("{} is not in list", target.repr_str()),
        _ => "tuple.index(x): x not in tuple".to_string(),
    }))
}

fn index(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("index", args, 1)?;
    no_kwargs("index", kwargs)?;
    let items = recv_list(recv).borrow().clone();
    seq_index(&items, &args[0], "list")
}

fn seq_count(items: &[Value], target: &Value) -> Result<Value> {
    let mut n = 0i64;
    for item in items {
        if eq_values(item, target, 0)? {
            n += 1;
        }
    }
    Ok(Value::Int(n))
}

fn count(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("count", args, 1)?;
    no_kwargs("count", kwargs)?;
    let items = recv_list(recv).borrow().clone();
    seq_count(&items, &args[0])
}

fn reverse(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("reverse", args, 0)?;
    no_kwargs("reverse", kwargs)?;
    recv_list(recv).borrow_mut().reverse();
    Ok(Value::None)
}

fn sort(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("sort", args, 0)?;
    only_kwargs("sort", kwargs, &["reverse"])?;
    let descending = kwargs.get("reverse").map(Value::is_truthy).unwrap_or(false);
    let mut items = recv_list(recv).borrow().clone();
    let failure: RefCell<Option<Raised>> = RefCell::new(None);
    items.sort_by(|a, b| {
        if failure.borrow().is_some() {
            return Ordering::Equal;
        }
        match cmp_values(a, b, 0) {
            Ok(ord) => {
                if descending {
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
    *recv_list(recv).borrow_mut() = items;
    Ok(Value::None)
}

fn copy(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("copy", args, 0)?;
    no_kwargs("copy", kwargs)?;
    vm.tracker.allocate()?;
    Ok(Value::new_list(recv_list(recv).borrow().clone()))
}

fn tuple_items(recv: &Value) -> Vec<Value> {
    match recv {
        Value::Tuple(items) => items.to_vec(),
        other => unreachable!("tuple method on {other:?}"),
    }
}

fn tuple_index(
    _vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_count("index", args, 1)?;
    no_kwargs("index", kwargs)?;
    seq_index(&tuple_items(recv), &args[0], "tuple")
}

fn tuple_count(
    _vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_count("count", args, 1)?;
    no_kwargs("count", kwargs)?;
    seq_count(&tuple_items(recv), &args[0])
}
