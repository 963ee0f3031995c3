// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::Kwargs;
use crate::exceptions::{type_error, Result};
use crate::value::Value;

pub fn ensure_args_count(fcn: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        let plural = if expected == 1 { "argument" } else { "arguments" };
        return Err(type_error(format!(
            "{fcn}() takes exactly {expected} {plural} ({} given)",
            args.len()
        )));
    }
    Ok(())
}

pub fn ensure_args_range(fcn: &str, args: &[Value], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        return Err(type_error(format!(
            "{fcn}() takes from {min} to {max} arguments ({} given)",
            args.len()
        )));
    }
    Ok(())
}

pub fn no_kwargs(fcn: &str, kwargs: &Kwargs) -> Result<()> {
    match kwargs.keys().next() {
        Some(key) => Err(type_error(format!(
            "{fcn}() takes no keyword arguments (got '{key}')"
        ))),
        None => Ok(()),
    }
}

/// Rejects keyword arguments outside the allowed set; returns nothing.
pub fn only_kwargs(fcn: &str, kwargs: &Kwargs, allowed: &[&str]) -> Result<()> {
    for key in kwargs.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(type_error(format!(
                "'{key}' is an invalid keyword argument for {fcn}()"
            )));
        }
    }
    Ok(())
}

pub fn ensure_int(v: &Value) -> Result<i64> {
    match crate::number::as_int_operand(v) {
        Some(i) => Ok(i),
        None => Err(type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            v.type_name()
        ))),
    }
}

pub fn ensure_str<'a>(fcn: &str, v: &'a Value) -> Result<&'a str> {
    match v {
        Value::Str(s) => Ok(&**s),
        other => Err(type_error(format!(
            "{fcn}() argument must be str, not '{}'",
            other.type_name()
        ))),
    }
}
