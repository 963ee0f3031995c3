// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `dict` method table.

use crate::builtins::utils::{ensure_args_count, ensure_args_range, no_kwargs};
use crate::builtins::{Kwargs, MethodTable};
use crate::exceptions::{raise, raise_exc, type_error, ExcType, ExceptionValue, Result};
use crate::interpreter::Interpreter;
use crate::value::Value;
use crate::Rc;

use core::cell::RefCell;

use indexmap::IndexMap;
use lazy_static::lazy_static;

lazy_static! {
    pub(crate) static ref METHODS: MethodTable = {
        let mut m = MethodTable::new();
        m.insert("clear", clear as _);
        m.insert("copy", copy as _);
        m.insert("get", get as _);
        m.insert("items", items as _);
        m.insert("keys", keys as _);
        m.insert("pop", pop as _);
        m.insert("popitem", popitem as _);
        m.insert("setdefault", setdefault as _);
        m.insert("update", update as _);
        m.insert("values", values as _);
        m
    };
}

fn recv_dict(recv: &Value) -> &Rc<RefCell<IndexMap<Value, Value>>> {
    match recv {
        Value::Dict(map) => map,
        other => unreachable!("dict method on {other:?}"),
    }
}

fn get(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("get", args, 1, 2)?;
    no_kwargs("get", kwargs)?;
    args[0].check_hashable()?;
    Ok(match recv_dict(recv).borrow().get(&args[0]) {
        Some(v) => v.clone(),
        None => args.get(1).cloned().unwrap_or(Value::None),
    })
}

fn keys(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("keys", args, 0)?;
    no_kwargs("keys", kwargs)?;
    vm.tracker.allocate()?;
    Ok(Value::new_list(
        recv_dict(recv).borrow().keys().cloned().collect(),
    ))
}

fn values(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("values", args, 0)?;
    no_kwargs("values", kwargs)?;
    vm.tracker.allocate()?;
    Ok(Value::new_list(
        recv_dict(recv).borrow().values().cloned().collect(),
    ))
}

fn items(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("items", args, 0)?;
    no_kwargs("items", kwargs)?;
    vm.tracker.allocate()?;
    Ok(Value::new_list(
        recv_dict(recv)
            .borrow()
            .iter()
            .map(|(k, v)| Value::new_tuple(vec![k.clone(), v.clone()]))
            .collect(),
    ))
}

fn pop(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("pop", args, 1, 2)?;
    no_kwargs("pop", kwargs)?;
    args[0].check_hashable()?;
    match recv_dict(recv).borrow_mut().shift_remove(&args[0]) {
        Some(v) => Ok(v),
        None => match args.get(1) {
            Some(default) => Ok(default.clone()),
            None => Err(raise_exc(ExceptionValue::new(
                ExcType::KeyError,
                vec![args[0].clone()],
            ))),
        },
    }
}

fn popitem(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("popitem", args, 0)?;
    no_kwargs("popitem", kwargs)?;
    match recv_dict(recv).borrow_mut().pop() {
        Some((k, v)) => Ok(Value::new_tuple(vec![k, v])),
        None => Err(raise(ExcType::KeyError, "popitem(): dictionary is empty")),
    }
}

fn setdefault(
    _vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_range("setdefault", args, 1, 2)?;
    no_kwargs("setdefault", kwargs)?;
    args[0].check_hashable()?;
    let default = args.get(1).cloned().unwrap_or(Value::None);
    let map = recv_dict(recv);
    let mut map = map.borrow_mut();
    Ok(map.entry(args[0].clone()).or_insert(default).clone())
}

fn update(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("update", args, 0, 1)?;
    let map = recv_dict(recv).clone();
    if let Some(v) = args.first() {
        match v {
            Value::Dict(src) => {
                if Rc::ptr_eq(&map, src) {
                    return Ok(Value::None);
                }
                let entries: Vec<(Value, Value)> = src
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let mut map = map.borrow_mut();
                for (k, v) in entries {
                    map.insert(k, v);
                }
            }
            other => {
                let items = vm.collect_iterable(other.clone())?;
                for (i, item) in items.into_iter().enumerate() {
                    let pair = match &item {
                        Value::Tuple(p) => p.to_vec(),
                        Value::List(p) => p.borrow().clone(),
                        _ => {
                            return Err(type_error(format!(
                                "cannot convert dictionary update sequence element #{i} to a sequence"
                            )))
                        }
                    };
                    if pair.len() != 2 {
                        return Err(crate::exceptions::value_error(format!(
                            "dictionary update sequence element #{i} has length {}; 2 is required",
                            pair.len()
                        )));
                    }
                    pair[0].check_hashable()?;
                    map.borrow_mut().insert(pair[0].clone(), pair[1].clone());
                }
            }
        }
    }
    for (k, v) in kwargs {
        map.borrow_mut().insert(Value::from(k.as_str()), v.clone());
    }
    Ok(Value::None)
}

fn clear(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("clear", args, 0)?;
    no_kwargs("clear", kwargs)?;
    recv_dict(recv).borrow_mut().clear();
    Ok(Value::None)
}

fn copy(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("copy", args, 0)?;
    no_kwargs("copy", kwargs)?;
    vm.tracker.allocate()?;
    Ok(Value::new_dict(recv_dict(recv).borrow().clone()))
}
