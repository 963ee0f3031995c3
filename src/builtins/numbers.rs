// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{ensure_args_count, ensure_args_range, no_kwargs, only_kwargs};
use crate::builtins::{BuiltinDef, Kwargs, Registry};
use crate::exceptions::{raise, type_error, value_error, ExcType, Result};
use crate::interpreter::Interpreter;
use crate::number;
use crate::value::{cmp_values, Value};

use core::cmp::Ordering;


pub fn register(m: &mut Registry) {
    m.insert("abs", BuiltinDef { name: "abs", fcn: abs });
    m.insert("divmod", BuiltinDef { name: "divmod", fcn: divmod });
    m.insert("max", BuiltinDef { name: "max", fcn: max });
    m.insert("min", BuiltinDef { name: "min", fcn: min });
    m.insert("pow", BuiltinDef { name: "pow", fcn: pow });
    m.insert("round", BuiltinDef { name: "round", fcn: round });
    m.insert("sum", BuiltinDef { name: "sum", fcn: sum });
}

fn abs(_vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("abs", args, 1)?;
    no_kwargs("abs", kwargs)?;
    number::abs(&args[0]).unwrap_or_else(|| {
        Err(type_error(format!(
            "bad operand type for abs(): '{}'",
            args[0].type_name()
        )))
    })
}

fn divmod(_vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("divmod", args, 2)?;
    no_kwargs("divmod", kwargs)?;
    match number::divmod(&args[0], &args[1]) {
        Some(result) => {
            let (q, r) = result?;
            Ok(Value::new_tuple(vec![q, r]))
        }
        None => Err(type_error(format!(
            "unsupported operand type(s) for divmod(): '{}' and '{}'",
            args[0].type_name(),
            args[1].type_name()
        ))),
    }
}

fn pow(_vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("pow", args, 2, 3)?;
    no_kwargs("pow", kwargs)?;
    if args.len() == 3 {
        let ints: Option<Vec<i64>> = args.iter().map(number::as_int_operand).collect();
        let ints = ints.ok_or_else(|| {
            type_error("pow() 3rd argument not allowed unless all arguments are integers")
        })?;
        return number::pow_mod(ints[0], ints[1], ints[2]);
    }
    number::pow(&args[0], &args[1]).unwrap_or_else(|| {
        Err(type_error(format!(
            "unsupported operand type(s) for ** or pow(): '{}' and '{}'",
            args[0].type_name(),
            args[1].type_name()
        )))
    })
}

fn round(_vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("round", args, 1, 2)?;
    only_kwargs("round", kwargs, &["ndigits"])?;
    let ndigits = match (args.get(1), kwargs.get("ndigits")) {
        (Some(_), Some(_)) => {
            return Err(type_error("argument for round() given by name ('ndigits') and position (2)"))
        }
        (Some(v), None) | (None, Some(v)) => match v {
            Value::None => None,
            other => Some(crate::builtins::utils::ensure_int(other)?),
        },
        (None, None) => None,
    };
    match &args[0] {
        Value::Bool(b) => Ok(match ndigits {
            None => Value::Int(*b as i64),
            Some(_) => Value::Int(*b as i64),
        }),
        Value::Int(i) => Ok(match ndigits {
            None => Value::Int(*i),
            Some(n) if n >= 0 => Value::Int(*i),
            Some(n) => {
                let factor = 10i64.checked_pow(n.unsigned_abs().min(20) as u32);
                match factor {
                    Some(f) => {
                        let half = f / 2;
                        let rem = i.rem_euclid(f);
                        let down = i - rem;
                        let rounded = if rem > half || (rem == half && (down / f) % 2 != 0) {
                            down + f
                        } else {
                            down
                        };
                        Value::Int(rounded)
                    }
                    None => Value::Int(0),
                }
            }
        }),
        Value::Float(f) => {
            let rounded = match ndigits {
                None => {
                    let r = round_half_even(*f);
                    if r.is_nan() {
                        return Err(value_error("cannot convert float NaN to integer"));
                    }
                    if r.is_infinite() || r < i64::MIN as f64 || r > i64::MAX as f64 {
                        return Err(raise(
                            ExcType::OverflowError,
                            "cannot convert float infinity to integer",
                        ));
                    }
                    return Ok(Value::Int(r as i64));
                }
                Some(n) => {
                    let factor = 10f64.powi(n.clamp(-308, 308) as i32);
                    round_half_even(f * factor) / factor
                }
            };
            Ok(Value::Float(rounded))
        }
        other => Err(type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

/// Round-half-to-even, the source language's default rounding mode.
fn round_half_even(f: f64) -> f64 {
    let floor = f.floor();
    let diff = f - floor;
    if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

fn sum(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("sum", args, 1, 2)?;
    only_kwargs("sum", kwargs, &["start"])?;
    let mut total = match (args.get(1), kwargs.get("start")) {
        (Some(v), None) | (None, Some(v)) => v.clone(),
        (None, None) => Value::Int(0),
        (Some(_), Some(_)) => {
            return Err(type_error("sum() takes at most 2 arguments (3 given)"))
        }
    };
    if matches!(total, Value::Str(_)) {
        return Err(type_error(
            "sum() can't sum strings [use ''.join(seq) instead]",
        ));
    }
    let items = vm.collect_iterable(args[0].clone())?;
    for item in items {
        total = match number::add(&total, &item) {
            Some(r) => r?,
            None => {
                return Err(type_error(format!(
                    "unsupported operand type(s) for +: '{}' and '{}'",
                    total.type_name(),
                    item.type_name()
                )))
            }
        };
    }
    Ok(total)
}

fn max(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    extremum(vm, args, kwargs, "max", Ordering::Greater)
}

fn min(vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    extremum(vm, args, kwargs, "min", Ordering::Less)
}

fn extremum(
    vm: &mut Interpreter,
    args: &[Value],
    kwargs: &Kwargs,
    fcn: &str,
    wanted: Ordering,
) -> Result<Value> {
    only_kwargs(fcn, kwargs, &["default"])?;
    if args.is_empty() {
        return Err(type_error(format!(
            "{fcn} expected at least 1 argument, got 0"
        )));
    }
    let items = if args.len() == 1 {
        vm.collect_iterable(args[0].clone())?
    } else {
        args.to_vec()
    };
    if items.is_empty() {
        return match kwargs.get("default") {
            Some(default) => Ok(default.clone()),
            None => Err(value_error(format!("{fcn}() arg is an empty sequence"))),
        };
    }
    let mut best = items[0].clone();
    for item in &items[1..] {
        if cmp_values(item, &best, 0)? == wanted {
            best = item.clone();
        }
    }
    Ok(best)
}
