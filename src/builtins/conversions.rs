// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{ensure_args_count, ensure_int, ensure_str, no_kwargs};
use crate::builtins::{BuiltinDef, Kwargs, Registry};
use crate::exceptions::{type_error, value_error, Result};
use crate::interpreter::Interpreter;
use crate::value::Value;


pub fn register(m: &mut Registry) {
    m.insert("bin", BuiltinDef { name: "bin", fcn: bin });
    m.insert("chr", BuiltinDef { name: "chr", fcn: chr });
    m.insert("hex", BuiltinDef { name: "hex", fcn: hex });
    m.insert("oct", BuiltinDef { name: "oct", fcn: oct });
    m.insert("ord", BuiltinDef { name: "ord", fcn: ord });
    m.insert("repr", BuiltinDef { name: "repr", fcn: repr });
}

fn bin(_vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("bin", args, 1)?;
    no_kwargs("bin", kwargs)?;
    let i = ensure_int(&args[0])?;
    Ok(Value::from(if i < 0 {
        format!("-0b{:b}", i.unsigned_abs())
    } else {
        format!("0b{i:b}")
    }))
}

fn hex(_vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("hex", args, 1)?;
    no_kwargs("hex", kwargs)?;
    let i = ensure_int(&args[0])?;
    Ok(Value::from(if i < 0 {
        format!("-0x{:x}", i.unsigned_abs())
    } else {
        format!("0x{i:x}")
    }))
}

fn oct(_vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("oct", args, 1)?;
    no_kwargs("oct", kwargs)?;
    let i = ensure_int(&args[0])?;
    Ok(Value::from(if i < 0 {
        format!("-0o{:o}", i.unsigned_abs())
    } else {
        format!("0o{i:o}")
    }))
}

fn chr(_vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("chr", args, 1)?;
    no_kwargs("chr", kwargs)?;
    let i = ensure_int(&args[0])?;
    let c = u32::try_from(i)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| value_error("chr() arg not in range(0x110000)"))?;
    Ok(Value::from(c.to_string()))
}

fn ord(_vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("ord", args, 1)?;
    no_kwargs("ord", kwargs)?;
    let s = ensure_str("ord", &args[0]).map_err(|_| {
        type_error(format!(
            "ord() expected string of length 1, but {} found",
            args[0].type_name()
        ))
    })?;
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Int(c as i64)),
        _ => Err(type_error(format!(
            "ord() expected a character, but string of length {} found",
            s.chars().count()
        ))),
    }
}

fn repr(_vm: &mut Interpreter, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("repr", args, 1)?;
    no_kwargs("repr", kwargs)?;
    Ok(Value::from(args[0].repr_str()))
}
