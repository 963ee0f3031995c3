// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `set` and `frozenset` method tables.

use crate::builtins::utils::{ensure_args_count, no_kwargs};
use crate::builtins::{Kwargs, MethodTable};
use crate::exceptions::{raise, raise_exc, ExcType, ExceptionValue, Result};
use crate::interpreter::Interpreter;
use crate::value::Value;
use crate::Rc;

use core::cell::RefCell;

use indexmap::IndexSet;
use lazy_static::lazy_static;

lazy_static! {
    pub(crate) static ref SET_METHODS: MethodTable = {
        let mut m = MethodTable::new();
        m.insert("add", add as _);
        m.insert("clear", clear as _);
        m.insert("copy", copy as _);
        m.insert("difference", difference as _);
        m.insert("discard", discard as _);
        m.insert("intersection", intersection as _);
        m.insert("issubset", issubset as _);
        m.insert("issuperset", issuperset as _);
        m.insert("pop", pop as _);
        m.insert("remove", remove as _);
        m.insert("union", union as _);
        m
    };
    pub(crate) static ref FROZEN_METHODS: MethodTable = {
        let mut m = MethodTable::new();
        m.insert("copy", copy as _);
        m.insert("difference", difference as _);
        m.insert("intersection", intersection as _);
        m.insert("issubset", issubset as _);
        m.insert("issuperset", issuperset as _);
        m.insert("union", union as _);
        m
    };
}

fn recv_set(recv: &Value) -> &Rc<RefCell<IndexSet<Value>>> {
    match recv {
        Value::Set(set) => set,
        other => unreachable!("set method on {other:?}"),
    }
}

fn items_of(recv: &Value) -> IndexSet<Value> {
    match recv {
        Value::Set(set) => set.borrow().clone(),
        Value::FrozenSet(set) => (**set).clone(),
        other => unreachable!("set method on {other:?}"),
    }
}

fn operand_set(vm: &mut Interpreter, v: &Value) -> Result<IndexSet<Value>> {
    match v {
        Value::Set(set) => Ok(set.borrow().clone()),
        Value::FrozenSet(set) => Ok((**set).clone()),
        other => {
            let mut out = IndexSet::new();
            for item in vm.collect_iterable(other.clone())? {
                item.check_hashable()?;
                out.insert(item);
            }
            Ok(out)
        }
    }
}

fn wrap_like(recv: &Value, out: IndexSet<Value>) -> Value {
    if matches!(recv, Value::FrozenSet(_)) {
        Value::FrozenSet(Rc::new(out))
    } else {
        Value::new_set(out)
    }
}

fn add(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("add", args, 1)?;
    no_kwargs("add", kwargs)?;
    args[0].check_hashable()?;
    recv_set(recv).borrow_mut().insert(args[0].clone());
    Ok(Value::None)
}

fn remove(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("remove", args, 1)?;
    no_kwargs("remove", kwargs)?;
    args[0].check_hashable()?;
    if recv_set(recv).borrow_mut().shift_remove(&args[0]) {
        Ok(Value::None)
    } else {
        Err(raise_exc(ExceptionValue::new(
            ExcType::KeyError,
            vec![args[0].clone()],
        )))
    }
}

fn discard(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("discard", args, 1)?;
    no_kwargs("discard", kwargs)?;
    args[0].check_hashable()?;
    recv_set(recv).borrow_mut().shift_remove(&args[0]);
    Ok(Value::None)
}

fn pop(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("pop", args, 0)?;
    no_kwargs("pop", kwargs)?;
    let set = recv_set(recv);
    let first = set.borrow().first().cloned();
    match first {
        Some(v) => {
            set.borrow_mut().shift_remove(&v);
            Ok(v)
        }
        None => Err(raise(ExcType::KeyError, "pop from an empty set")),
    }
}

fn clear(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("clear", args, 0)?;
    no_kwargs("clear", kwargs)?;
    recv_set(recv).borrow_mut().clear();
    Ok(Value::None)
}

fn copy(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("copy", args, 0)?;
    no_kwargs("copy", kwargs)?;
    vm.tracker.allocate()?;
    Ok(wrap_like(recv, items_of(recv)))
}

fn union(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    no_kwargs("union", kwargs)?;
    let mut out = items_of(recv);
    for arg in args {
        out.extend(operand_set(vm, arg)?);
    }
    vm.tracker.allocate()?;
    Ok(wrap_like(recv, out))
}

fn intersection(
    vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    no_kwargs("intersection", kwargs)?;
    let mut out = items_of(recv);
    for arg in args {
        let other = operand_set(vm, arg)?;
        out.retain(|v| other.contains(v));
    }
    vm.tracker.allocate()?;
    Ok(wrap_like(recv, out))
}

fn difference(
    vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    no_kwargs("difference", kwargs)?;
    let mut out = items_of(recv);
    for arg in args {
        let other = operand_set(vm, arg)?;
        out.retain(|v| !other.contains(v));
    }
    vm.tracker.allocate()?;
    Ok(wrap_like(recv, out))
}

fn issubset(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("issubset", args, 1)?;
    no_kwargs("issubset", kwargs)?;
    let other = operand_set(vm, &args[0])?;
    Ok(Value::Bool(items_of(recv).is_subset(&other)))
}

fn issuperset(
    vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_count("issuperset", args, 1)?;
    no_kwargs("issuperset", kwargs)?;
    let other = operand_set(vm, &args[0])?;
    Ok(Value::Bool(items_of(recv).is_superset(&other)))
}
