// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `isinstance`/`hasattr`/`id`/`hash` and the type-object constructors.

use crate::builtins::utils::{ensure_args_count, ensure_args_range, no_kwargs, only_kwargs};
use crate::builtins::{sequences, BuiltinDef, Kwargs, Registry};
use crate::exceptions::{
    raise, type_error, value_error, ExcType, ExceptionValue, Result,
};
use crate::interpreter::Interpreter;
use crate::number;
use crate::value::{Class, IterValue, RangeValue, SliceValue, Value};
use crate::Rc;

use core::cell::RefCell;

use indexmap::{IndexMap, IndexSet};

pub fn register(m: &mut Registry) {
    m.insert("hasattr", BuiltinDef { name: "hasattr", fcn: hasattr });
    m.insert("hash", BuiltinDef { name: "hash", fcn: hash });
    m.insert("id", BuiltinDef { name: "id", fcn: id });
    m.insert("isinstance", BuiltinDef { name: "isinstance", fcn: isinstance });
}

fn hasattr(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("hasattr", args, 2)?;
    no_kwargs("hasattr", kwargs)?;
    let name = match &args[1] {
        Value::Str(s) => s.clone(),
        other => {
            return Err(type_error(format!(
                "attribute name must be string, not '{}'",
                other.type_name()
            )))
        }
    };
    // Only a failed lookup is swallowed; other errors propagate.
    match crate::builtins::lookup_attr(vm, &args[0], &name) {
        Ok(_) => Ok(Value::Bool(true)),
        Err(err) if err.class() == ExcType::AttributeError => Ok(Value::Bool(false)),
        Err(err) => Err(err),
    }
}

fn hash(_vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("hash", args, 1)?;
    no_kwargs("hash", kwargs)?;
    args[0].check_hashable()?;
    use core::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    args[0].hash(&mut h);
    Ok(Value::Int(h.finish() as i64))
}

fn id(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("id", args, 1)?;
    no_kwargs("id", kwargs)?;
    Ok(Value::Int(vm.id_of(&args[0])))
}

fn isinstance(_vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("isinstance", args, 2)?;
    no_kwargs("isinstance", kwargs)?;
    Ok(Value::Bool(isinstance_check(&args[0], &args[1])?))
}

fn isinstance_check(v: &Value, spec: &Value) -> Result<bool> {
    match spec {
        Value::Class(class) => Ok(value_isinstance(v, *class)),
        Value::Tuple(items) => {
            for item in items.iter() {
                if isinstance_check(v, item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(type_error(format!(
            "isinstance() arg 2 must be a type or tuple of types, not {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn value_isinstance(v: &Value, class: Class) -> bool {
    match class {
        Class::Object => true,
        Class::Exc(t) => matches!(v, Value::Exception(e) if e.class().is_subtype_of(t)),
        // The numeric tower: bool is a subtype of int.
        Class::Int => matches!(v, Value::Int(_) | Value::Bool(_)),
        Class::Type => matches!(v, Value::Class(_)),
        class => v.class() == class,
    }
}

/// Calling a type object: dispatches to the appropriate constructor.
pub(crate) fn construct(
    vm: &mut Interpreter,
    class: Class,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    match class {
        Class::Bool => {
            ensure_args_range("bool", args, 0, 1)?;
            no_kwargs("bool", kwargs)?;
            Ok(Value::Bool(args.first().map(Value::is_truthy).unwrap_or(false)))
        }
        Class::Int => construct_int(args, kwargs),
        Class::Float => construct_float(args, kwargs),
        Class::Str => {
            ensure_args_range("str", args, 0, 1)?;
            no_kwargs("str", kwargs)?;
            Ok(match args.first() {
                Some(v) => Value::from(v.str_value()),
                None => Value::from(""),
            })
        }
        Class::Bytes => construct_bytes(vm, args, kwargs),
        Class::List => {
            ensure_args_range("list", args, 0, 1)?;
            no_kwargs("list", kwargs)?;
            vm.tracker.allocate()?;
            let items = match args.first() {
                Some(v) => vm.collect_iterable(v.clone())?,
                None => vec![],
            };
            Ok(Value::new_list(items))
        }
        Class::Tuple => {
            ensure_args_range("tuple", args, 0, 1)?;
            no_kwargs("tuple", kwargs)?;
            match args.first() {
                Some(Value::Tuple(items)) => Ok(Value::Tuple(items.clone())),
                Some(v) => {
                    vm.tracker.allocate()?;
                    Ok(Value::new_tuple(vm.collect_iterable(v.clone())?))
                }
                None => Ok(Value::empty_tuple()),
            }
        }
        Class::Dict => construct_dict(vm, args, kwargs),
        Class::Set => {
            ensure_args_range("set", args, 0, 1)?;
            no_kwargs("set", kwargs)?;
            vm.tracker.allocate()?;
            Ok(Value::new_set(collect_set(vm, args.first())?))
        }
        Class::FrozenSet => {
            ensure_args_range("frozenset", args, 0, 1)?;
            no_kwargs("frozenset", kwargs)?;
            vm.tracker.allocate()?;
            Ok(Value::FrozenSet(Rc::new(collect_set(vm, args.first())?)))
        }
        Class::Range => construct_range(vm, args, kwargs),
        Class::Slice => construct_slice(vm, args, kwargs),
        Class::Enumerate => construct_enumerate(vm, args, kwargs),
        Class::Reversed => construct_reversed(vm, args, kwargs),
        Class::Zip => construct_zip(vm, args, kwargs),
        Class::Filter => sequences::filter_impl(vm, args, kwargs),
        Class::Object => {
            ensure_args_count("object", args, 0)?;
            no_kwargs("object", kwargs)?;
            Ok(Value::Object(Rc::new(())))
        }
        Class::Type => {
            ensure_args_count("type", args, 1)?;
            no_kwargs("type", kwargs)?;
            Ok(Value::Class(args[0].class()))
        }
        Class::NoneType => {
            ensure_args_count("NoneType", args, 0)?;
            Ok(Value::None)
        }
        Class::PosixPath => crate::builtins::pathlib::construct(vm, args, kwargs),
        Class::Exc(t) => {
            no_kwargs(t.name(), kwargs)?;
            Ok(Value::Exception(ExceptionValue::new(t, args.to_vec())))
        }
        Class::Function | Class::Module | Class::TextIOWrapper => Err(type_error(format!(
            "cannot create '{}' instances",
            class.name()
        ))),
    }
}

fn construct_int(args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("int", args, 0, 2)?;
    only_kwargs("int", kwargs, &["base"])?;
    let base = match (args.get(1), kwargs.get("base")) {
        (Some(_), Some(_)) => {
            return Err(type_error(
                "argument for int() given by name ('base') and position (2)",
            ))
        }
        (Some(v), None) | (None, Some(v)) => Some(crate::builtins::utils::ensure_int(v)?),
        (None, None) => None,
    };
    let v = match args.first() {
        Some(v) => v,
        None => return Ok(Value::Int(0)),
    };
    if let Some(base) = base {
        let s = match v {
            Value::Str(s) => s,
            other => {
                return Err(type_error(format!(
                    "int() can't convert non-string with explicit base: '{}'",
                    other.type_name()
                )))
            }
        };
        if base != 0 && !(2..=36).contains(&base) {
            return Err(value_error("int() base must be >= 2 and <= 36, or 0"));
        }
        return parse_int(s, base);
    }
    match v {
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => {
            if f.is_nan() {
                Err(value_error("cannot convert float NaN to integer"))
            } else if f.is_infinite() || *f < i64::MIN as f64 || *f > i64::MAX as f64 {
                Err(raise(
                    ExcType::OverflowError,
                    "cannot convert float infinity to integer",
                ))
            } else {
                Ok(Value::Int(f.trunc() as i64))
            }
        }
        Value::Str(s) => parse_int(s, 10),
        other => Err(type_error(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn parse_int(s: &str, base: i64) -> Result<Value> {
    let original = s;
    let trimmed = s.trim();
    let (sign, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (base, digits) = match (base, rest.get(..2)) {
        (16 | 0, Some("0x" | "0X")) => (16, &rest[2..]),
        (8 | 0, Some("0o" | "0O")) => (8, &rest[2..]),
        (2 | 0, Some("0b" | "0B")) => (2, &rest[2..]),
        (0, _) => (10, rest),
        (b, _) => (b, rest),
    };
    let digits: String = digits.chars().filter(|c| *c != '_').collect();
    let invalid = || {
        value_error(format!(
            "invalid literal for int() with base {base}: {}",
            crate::value::repr_string(original)
        ))
    };
    if digits.is_empty() {
        return Err(invalid());
    }
    i64::from_str_radix(&digits, base as u32)
        .map(|i| Value::Int(sign * i))
        .map_err(|_| invalid())
}

fn construct_float(args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("float", args, 0, 1)?;
    no_kwargs("float", kwargs)?;
    let v = match args.first() {
        Some(v) => v,
        None => return Ok(Value::Float(0.0)),
    };
    match v {
        Value::Bool(b) => Ok(Value::Float(*b as i64 as f64)),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Str(s) => {
            let trimmed = s.trim();
            let normalized: String = trimmed.chars().filter(|c| *c != '_').collect();
            let lowered = normalized.to_ascii_lowercase();
            let parsed = match lowered.trim_start_matches(['+', '-']) {
                "inf" | "infinity" => {
                    let inf = f64::INFINITY;
                    Some(if lowered.starts_with('-') { -inf } else { inf })
                }
                "nan" => Some(f64::NAN),
                _ => normalized.parse::<f64>().ok(),
            };
            parsed.map(Value::Float).ok_or_else(|| {
                value_error(format!(
                    "could not convert string to float: {}",
                    crate::value::repr_string(s)
                ))
            })
        }
        other => Err(type_error(format!(
            "float() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn construct_bytes(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("bytes", args, 0, 1)?;
    no_kwargs("bytes", kwargs)?;
    match args.first() {
        None => Ok(Value::Bytes(Rc::from(&[] as &[u8]))),
        Some(Value::Bytes(b)) => Ok(Value::Bytes(b.clone())),
        Some(Value::Str(_)) => Err(type_error("string argument without an encoding")),
        Some(Value::Int(n)) => {
            if *n < 0 {
                return Err(value_error("negative count"));
            }
            vm.tracker.allocate()?;
            Ok(Value::Bytes(vec![0u8; *n as usize].into()))
        }
        Some(other) => {
            let items = vm.collect_iterable(other.clone())?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let i = match number::as_int_operand(&item) {
                    Some(i) => i,
                    None => {
                        return Err(type_error(format!(
                            "'{}' object cannot be interpreted as an integer",
                            item.type_name()
                        )))
                    }
                };
                if !(0..=255).contains(&i) {
                    return Err(value_error("bytes must be in range(0, 256)"));
                }
                out.push(i as u8);
            }
            vm.tracker.allocate()?;
            Ok(Value::Bytes(out.into()))
        }
    }
}

fn construct_dict(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("dict", args, 0, 1)?;
    vm.tracker.allocate()?;
    let mut map = IndexMap::new();
    if let Some(v) = args.first() {
        match v {
            Value::Dict(src) => {
                for (k, val) in src.borrow().iter() {
                    map.insert(k.clone(), val.clone());
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
                        return Err(value_error(format!(
                            "dictionary update sequence element #{i} has length {}; 2 is required",
                            pair.len()
                        )));
                    }
                    pair[0].check_hashable()?;
                    map.insert(pair[0].clone(), pair[1].clone());
                }
            }
        }
    }
    for (k, v) in kwargs {
        map.insert(Value::from(k.as_str()), v.clone());
    }
    Ok(Value::new_dict(map))
}

fn collect_set(vm: &mut Interpreter, arg: Option<&Value>) -> Result<IndexSet<Value>> {
    let mut set = IndexSet::new();
    if let Some(v) = arg {
        for item in vm.collect_iterable(v.clone())? {
            item.check_hashable()?;
            set.insert(item);
        }
    }
    Ok(set)
}

fn construct_range(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    no_kwargs("range", kwargs)?;
    if args.is_empty() || args.len() > 3 {
        return Err(type_error(format!(
            "range expected at most 3 arguments, got {}",
            args.len()
        )));
    }
    let int_arg = |v: &Value| match number::as_int_operand(v) {
        Some(i) => Ok(i),
        None => Err(type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            v.type_name()
        ))),
    };
    let (start, stop, step) = match args.len() {
        1 => (0, int_arg(&args[0])?, 1),
        2 => (int_arg(&args[0])?, int_arg(&args[1])?, 1),
        _ => (int_arg(&args[0])?, int_arg(&args[1])?, int_arg(&args[2])?),
    };
    if step == 0 {
        return Err(value_error("range() arg 3 must not be zero"));
    }
    vm.tracker.allocate()?;
    Ok(Value::Range(Rc::new(RangeValue { start, stop, step })))
}

fn construct_slice(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    no_kwargs("slice", kwargs)?;
    if args.is_empty() {
        return Err(type_error("slice expected at least 1 argument, got 0"));
    }
    if args.len() > 3 {
        return Err(type_error(format!(
            "slice expected at most 3 arguments, got {}",
            args.len()
        )));
    }
    let field = |v: &Value| match v {
        Value::None => None,
        other => Some(other.clone()),
    };
    vm.tracker.allocate()?;
    let slice = match args.len() {
        1 => SliceValue {
            start: None,
            stop: field(&args[0]),
            step: None,
        },
        2 => SliceValue {
            start: field(&args[0]),
            stop: field(&args[1]),
            step: None,
        },
        _ => SliceValue {
            start: field(&args[0]),
            stop: field(&args[1]),
            step: field(&args[2]),
        },
    };
    Ok(Value::Slice(Rc::new(slice)))
}

fn construct_enumerate(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("enumerate", args, 1, 2)?;
    only_kwargs("enumerate", kwargs, &["start"])?;
    let start = match (args.get(1), kwargs.get("start")) {
        (Some(_), Some(_)) => {
            return Err(type_error(
                "argument for enumerate() given by name ('start') and position (2)",
            ))
        }
        (Some(v), None) | (None, Some(v)) => crate::builtins::utils::ensure_int(v)?,
        (None, None) => 0,
    };
    let inner = vm.make_iter(args[0].clone())?;
    vm.tracker.allocate()?;
    Ok(Value::Iterator(Rc::new(RefCell::new(IterValue::Enumerate {
        inner,
        count: start,
    }))))
}

fn construct_reversed(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("reversed", args, 1)?;
    no_kwargs("reversed", kwargs)?;
    let items = match &args[0] {
        Value::List(list) => list.borrow().clone(),
        Value::Tuple(items) => items.to_vec(),
        Value::Str(s) => s.chars().map(|c| Value::from(c.to_string())).collect(),
        Value::Bytes(b) => b.iter().map(|&x| Value::Int(x as i64)).collect(),
        Value::Range(r) => (0..r.len())
            .map(|i| Value::Int(r.nth(i).expect("in range")))
            .collect(),
        other => {
            return Err(type_error(format!(
                "argument to reversed() must be a sequence, not {}",
                other.type_name()
            )))
        }
    };
    vm.tracker.allocate()?;
    Ok(Value::Iterator(Rc::new(RefCell::new(IterValue::Reversed {
        items,
        pos: 0,
    }))))
}

fn construct_zip(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    no_kwargs("zip", kwargs)?;
    let mut iters = Vec::with_capacity(args.len());
    for arg in args {
        iters.push(vm.make_iter(arg.clone())?);
    }
    vm.tracker.allocate()?;
    Ok(Value::Iterator(Rc::new(RefCell::new(IterValue::Zip {
        iters,
    }))))
}
