// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `str` and `bytes` method tables.

use crate::builtins::utils::{ensure_args_count, ensure_args_range, no_kwargs};
use crate::builtins::{Kwargs, MethodTable};
use crate::exceptions::{type_error, value_error, Result};
use crate::interpreter::Interpreter;
use crate::value::Value;
use crate::Rc;

use lazy_static::lazy_static;

lazy_static! {
    pub(crate) static ref METHODS: MethodTable = {
        let mut m = MethodTable::new();
        m.insert("capitalize", capitalize as _);
        m.insert("count", count as _);
        m.insert("encode", encode as _);
        m.insert("endswith", endswith as _);
        m.insert("find", find as _);
        m.insert("index", index as _);
        m.insert("isalnum", isalnum as _);
        m.insert("isalpha", isalpha as _);
        m.insert("isdigit", isdigit as _);
        m.insert("islower", islower as _);
        m.insert("isspace", isspace as _);
        m.insert("isupper", isupper as _);
        m.insert("join", join as _);
        m.insert("lower", lower as _);
        m.insert("lstrip", lstrip as _);
        m.insert("removeprefix", removeprefix as _);
        m.insert("removesuffix", removesuffix as _);
        m.insert("replace", replace as _);
        m.insert("rfind", rfind as _);
        m.insert("rsplit", rsplit as _);
        m.insert("rstrip", rstrip as _);
        m.insert("split", split as _);
        m.insert("startswith", startswith as _);
        m.insert("strip", strip as _);
        m.insert("swapcase", swapcase as _);
        m.insert("title", title as _);
        m.insert("upper", upper as _);
        m.insert("zfill", zfill as _);
        m
    };
    pub(crate) static ref BYTES_METHODS: MethodTable = {
        let mut m = MethodTable::new();
        m.insert("count", bytes_count as _);
        m.insert("decode", bytes_decode as _);
        m.insert("endswith", bytes_endswith as _);
        m.insert("find", bytes_find as _);
        m.insert("hex", bytes_hex as _);
        m.insert("startswith", bytes_startswith as _);
        m
    };
}

fn recv_str(recv: &Value) -> &str {
    match recv {
        Value::Str(s) => s,
        other => unreachable!("str method on {other:?}"),
    }
}

fn recv_bytes(recv: &Value) -> &[u8] {
    match recv {
        Value::Bytes(b) => b,
        other => unreachable!("bytes method on {other:?}"),
    }
}

fn str_arg<'a>(method: &str, v: &'a Value) -> Result<&'a str> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(type_error(format!(
            "{method}: argument must be str, not {}",
            other.type_name()
        ))),
    }
}

fn upper(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("upper", args, 0)?;
    no_kwargs("upper", kwargs)?;
    Ok(Value::from(recv_str(recv).to_uppercase()))
}

fn lower(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("lower", args, 0)?;
    no_kwargs("lower", kwargs)?;
    Ok(Value::from(recv_str(recv).to_lowercase()))
}

fn capitalize(
    _vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_count("capitalize", args, 0)?;
    no_kwargs("capitalize", kwargs)?;
    let s = recv_str(recv);
    let mut chars = s.chars();
    Ok(Value::from(match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }))
}

fn title(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("title", args, 0)?;
    no_kwargs("title", kwargs)?;
    let mut out = String::new();
    let mut at_word_start = true;
    for c in recv_str(recv).chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    Ok(Value::from(out))
}

fn swapcase(
    _vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_count("swapcase", args, 0)?;
    no_kwargs("swapcase", kwargs)?;
    let out: String = recv_str(recv)
        .chars()
        .flat_map(|c| {
            if c.is_uppercase() {
                c.to_lowercase().collect::<Vec<_>>()
            } else {
                c.to_uppercase().collect::<Vec<_>>()
            }
        })
        .collect();
    Ok(Value::from(out))
}

fn strip_impl(recv: &Value, args: &[Value], which: u8) -> Result<Value> {
    let s = recv_str(recv);
    let chars: Option<Vec<char>> = match args.first() {
        None | Some(Value::None) => None,
        Some(v) => Some(str_arg("strip", v)?.chars().collect()),
    };
    let matches = |c: char| match &chars {
        None => c.is_whitespace(),
        Some(set) => set.contains(&c),
    };
    let out = match which {
        0 => s.trim_matches(|c| matches(c)),
        1 => s.trim_start_matches(|c| matches(c)),
        _ => s.trim_end_matches(|c| matches(c)),
    };
    Ok(Value::from(out))
}

fn strip(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("strip", args, 0, 1)?;
    no_kwargs("strip", kwargs)?;
    strip_impl(recv, args, 0)
}

fn lstrip(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("lstrip", args, 0, 1)?;
    no_kwargs("lstrip", kwargs)?;
    strip_impl(recv, args, 1)
}

fn rstrip(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("rstrip", args, 0, 1)?;
    no_kwargs("rstrip", kwargs)?;
    strip_impl(recv, args, 2)
}

fn split_impl(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs, reverse: bool) -> Result<Value> {
    ensure_args_range("split", args, 0, 2)?;
    crate::builtins::utils::only_kwargs("split", kwargs, &["sep", "maxsplit"])?;
    let sep = match (args.first(), kwargs.get("sep")) {
        (None, None) | (Some(Value::None), _) | (None, Some(Value::None)) => None,
        (Some(v), _) | (None, Some(v)) => Some(str_arg("split", v)?.to_string()),
    };
    if let Some(sep) = &sep {
        if sep.is_empty() {
            return Err(value_error("empty separator"));
        }
    }
    let maxsplit = match (args.get(1), kwargs.get("maxsplit")) {
        (None, None) => -1,
        (Some(v), _) | (None, Some(v)) => crate::builtins::utils::ensure_int(v)?,
    };
    let s = recv_str(recv);
    let parts: Vec<String> = match &sep {
        None => {
            // Whitespace runs, no empty parts.
            let parts: Vec<String> = s.split_whitespace().map(str::to_string).collect();
            if maxsplit >= 0 && parts.len() as i64 > maxsplit + 1 {
                // Re-split keeping the tail intact.
                let mut kept: Vec<String> = vec![];
                let mut rest = s.trim_start();
                for _ in 0..maxsplit {
                    match rest.find(char::is_whitespace) {
                        Some(at) => {
                            kept.push(rest[..at].to_string());
                            rest = rest[at..].trim_start();
                        }
                        None => break,
                    }
                }
                if !rest.is_empty() {
                    kept.push(rest.trim_end().to_string());
                }
                kept
            } else {
                parts
            }
        }
        Some(sep) => {
            if maxsplit < 0 {
                s.split(sep.as_str()).map(str::to_string).collect()
            } else if reverse {
                let mut parts: Vec<String> =
                    s.rsplitn(maxsplit as usize + 1, sep.as_str()).map(str::to_string).collect();
                parts.reverse();
                parts
            } else {
                s.splitn(maxsplit as usize + 1, sep.as_str()).map(str::to_string).collect()
            }
        }
    };
    vm.tracker.allocate()?;
    Ok(Value::new_list(parts.into_iter().map(Value::from).collect()))
}

fn split(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    split_impl(vm, recv, args, kwargs, false)
}

fn rsplit(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    split_impl(vm, recv, args, kwargs, true)
}

fn join(vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("join", args, 1)?;
    no_kwargs("join", kwargs)?;
    let sep = recv_str(recv);
    let items = vm.collect_iterable(args[0].clone())?;
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        let part = match item {
            Value::Str(s) => s,
            other => {
                return Err(type_error(format!(
                    "sequence item {i}: expected str instance, {} found",
                    other.type_name()
                )))
            }
        };
        if i > 0 {
            out.push_str(sep);
        }
        out.push_str(part);
    }
    Ok(Value::from(out))
}

fn affix_matches(s: &str, affix: &Value, end: bool) -> Result<bool> {
    match affix {
        Value::Str(a) => Ok(if end { s.ends_with(&**a) } else { s.starts_with(&**a) }),
        Value::Tuple(items) => {
            for item in items.iter() {
                if affix_matches(s, item, end)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(type_error(format!(
            "{} first arg must be str or a tuple of str, not {}",
            if end { "endswith" } else { "startswith" },
            other.type_name()
        ))),
    }
}

fn startswith(
    _vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_count("startswith", args, 1)?;
    no_kwargs("startswith", kwargs)?;
    Ok(Value::Bool(affix_matches(recv_str(recv), &args[0], false)?))
}

fn endswith(
    _vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_count("endswith", args, 1)?;
    no_kwargs("endswith", kwargs)?;
    Ok(Value::Bool(affix_matches(recv_str(recv), &args[0], true)?))
}

fn replace(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("replace", args, 2, 3)?;
    no_kwargs("replace", kwargs)?;
    let s = recv_str(recv);
    let old = str_arg("replace", &args[0])?;
    let new = str_arg("replace", &args[1])?;
    let count = match args.get(2) {
        Some(v) => crate::builtins::utils::ensure_int(v)?,
        None => -1,
    };
    Ok(Value::from(if count < 0 {
        s.replace(old, new)
    } else {
        s.replacen(old, new, count as usize)
    }))
}

/// Character offset of a byte position.
fn char_index(s: &str, byte_pos: usize) -> i64 {
    s[..byte_pos].chars().count() as i64
}

fn find(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("find", args, 1)?;
    no_kwargs("find", kwargs)?;
    let s = recv_str(recv);
    let sub = str_arg("find", &args[0])?;
    Ok(Value::Int(match s.find(sub) {
        Some(at) => char_index(s, at),
        None => -1,
    }))
}

fn rfind(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("rfind", args, 1)?;
    no_kwargs("rfind", kwargs)?;
    let s = recv_str(recv);
    let sub = str_arg("rfind", &args[0])?;
    Ok(Value::Int(match s.rfind(sub) {
        Some(at) => char_index(s, at),
        None => -1,
    }))
}

fn index(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("index", args, 1)?;
    no_kwargs("index", kwargs)?;
    let s = recv_str(recv);
    let sub = str_arg("index", &args[0])?;
    match s.find(sub) {
        Some(at) => Ok(Value::Int(char_index(s, at))),
        None => Err(value_error("substring not found")),
    }
}

fn count(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("count", args, 1)?;
    no_kwargs("count", kwargs)?;
    let s = recv_str(recv);
    let sub = str_arg("count", &args[0])?;
    if sub.is_empty() {
        return Ok(Value::Int(s.chars().count() as i64 + 1));
    }
    Ok(Value::Int(s.matches(sub).count() as i64))
}

fn is_class(
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
    fcn: &str,
    pred: impl Fn(char) -> bool,
) -> Result<Value> {
    ensure_args_count(fcn, args, 0)?;
    no_kwargs(fcn, kwargs)?;
    let s = recv_str(recv);
    Ok(Value::Bool(!s.is_empty() && s.chars().all(pred)))
}

fn isdigit(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    is_class(recv, args, kwargs, "isdigit", |c| c.is_ascii_digit())
}

fn isalpha(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    is_class(recv, args, kwargs, "isalpha", char::is_alphabetic)
}

fn isalnum(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    is_class(recv, args, kwargs, "isalnum", char::is_alphanumeric)
}

fn isspace(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    is_class(recv, args, kwargs, "isspace", char::is_whitespace)
}

fn islower(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("islower", args, 0)?;
    no_kwargs("islower", kwargs)?;
    let s = recv_str(recv);
    let has_cased = s.chars().any(|c| c.is_lowercase() || c.is_uppercase());
    Ok(Value::Bool(
        has_cased && !s.chars().any(char::is_uppercase),
    ))
}

fn isupper(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("isupper", args, 0)?;
    no_kwargs("isupper", kwargs)?;
    let s = recv_str(recv);
    let has_cased = s.chars().any(|c| c.is_lowercase() || c.is_uppercase());
    Ok(Value::Bool(
        has_cased && !s.chars().any(char::is_lowercase),
    ))
}

fn encode(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_range("encode", args, 0, 1)?;
    crate::builtins::utils::only_kwargs("encode", kwargs, &["encoding"])?;
    let encoding = match (args.first(), kwargs.get("encoding")) {
        (None, None) => "utf-8".to_string(),
        (Some(v), _) | (None, Some(v)) => str_arg("encode", v)?.to_lowercase(),
    };
    match encoding.as_str() {
        "utf-8" | "utf8" | "ascii" => {}
        other => return Err(value_error(format!("unknown encoding: {other}"))),
    }
    let s = recv_str(recv);
    if encoding.starts_with("ascii") && !s.is_ascii() {
        return Err(value_error(
            "'ascii' codec can't encode character: ordinal not in range(128)",
        ));
    }
    Ok(Value::Bytes(s.as_bytes().into()))
}

fn zfill(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("zfill", args, 1)?;
    no_kwargs("zfill", kwargs)?;
    let width = crate::builtins::utils::ensure_int(&args[0])?.max(0) as usize;
    let s = recv_str(recv);
    let len = s.chars().count();
    if len >= width {
        return Ok(recv.clone());
    }
    let fill = "0".repeat(width - len);
    Ok(Value::from(
        if let Some(rest) = s.strip_prefix(['-', '+']) {
            format!("{}{}{}", &s[..1], fill, rest)
        } else {
            format!("{fill}{s}")
        },
    ))
}

fn removeprefix(
    _vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_count("removeprefix", args, 1)?;
    no_kwargs("removeprefix", kwargs)?;
    let s = recv_str(recv);
    let prefix = str_arg("removeprefix", &args[0])?;
    Ok(match s.strip_prefix(prefix) {
        Some(rest) => Value::from(rest),
        None => recv.clone(),
    })
}

fn removesuffix(
    _vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_count("removesuffix", args, 1)?;
    no_kwargs("removesuffix", kwargs)?;
    let s = recv_str(recv);
    let suffix = str_arg("removesuffix", &args[0])?;
    Ok(match s.strip_suffix(suffix) {
        Some(rest) => Value::from(rest),
        None => recv.clone(),
    })
}

// ----------------------------------------------------------------------
// bytes methods
// ----------------------------------------------------------------------

fn bytes_arg<'a>(method: &str, v: &'a Value) -> Result<&'a [u8]> {
    match v {
        Value::Bytes(b) => Ok(b),
        other => Err(type_error(format!(
            "{method}: a bytes-like object is required, not '{}'",
            other.type_name()
        ))),
    }
}

fn bytes_decode(
    _vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_range("decode", args, 0, 1)?;
    crate::builtins::utils::only_kwargs("decode", kwargs, &["encoding"])?;
    let b = recv_bytes(recv);
    match core::str::from_utf8(b) {
        Ok(s) => Ok(Value::from(s)),
        Err(e) => Err(value_error(format!(
            "'utf-8' codec can't decode byte in position {}: invalid start byte",
            e.valid_up_to()
        ))),
    }
}

fn bytes_hex(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("hex", args, 0)?;
    no_kwargs("hex", kwargs)?;
    let out: String = recv_bytes(recv).iter().map(|b| format!("{b:02x}")).collect();
    Ok(Value::from(out))
}

fn bytes_startswith(
    _vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_count("startswith", args, 1)?;
    no_kwargs("startswith", kwargs)?;
    let prefix = bytes_arg("startswith", &args[0])?;
    Ok(Value::Bool(recv_bytes(recv).starts_with(prefix)))
}

fn bytes_endswith(
    _vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_count("endswith", args, 1)?;
    no_kwargs("endswith", kwargs)?;
    let suffix = bytes_arg("endswith", &args[0])?;
    Ok(Value::Bool(recv_bytes(recv).ends_with(suffix)))
}

fn bytes_find(_vm: &mut Interpreter, recv: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
    ensure_args_count("find", args, 1)?;
    no_kwargs("find", kwargs)?;
    let b = recv_bytes(recv);
    let sub = bytes_arg("find", &args[0])?;
    if sub.is_empty() {
        return Ok(Value::Int(0));
    }
    Ok(Value::Int(
        b.windows(sub.len())
            .position(|w| w == sub)
            .map(|i| i as i64)
            .unwrap_or(-1),
    ))
}

fn bytes_count(
    _vm: &mut Interpreter,
    recv: &Value,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value> {
    ensure_args_count("count", args, 1)?;
    no_kwargs("count", kwargs)?;
    let b = recv_bytes(recv);
    let sub = bytes_arg("count", &args[0])?;
    if sub.is_empty() {
        return Ok(Value::Int(b.len() as i64 + 1));
    }
    let mut n = 0i64;
    let mut i = 0usize;
    while i + sub.len() <= b.len() {
        if &b[i..i + sub.len()] == sub {
            n += 1;
            i += sub.len();
        } else {
            i += 1;
        }
    }
    Ok(Value::Int(n))
}
